//! `terraform` client. Every command runs inside the artifact directory.

use super::runner::{run_success, strings};
use super::{ProvisioningEngine, ToolError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TerraformClient {
    binary: String,
    init_timeout: Duration,
    apply_timeout: Duration,
}

impl Default for TerraformClient {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
            init_timeout: Duration::from_secs(300),
            apply_timeout: Duration::from_secs(1800),
        }
    }
}

impl TerraformClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different binary, e.g. `tofu`.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn exec(&self, dir: &Path, args: Vec<String>, timeout: Duration) -> Result<String, ToolError> {
        let output = run_success(&self.binary, &args, Some(dir), timeout).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub(crate) fn apply_args(targets: &[String]) -> Vec<String> {
    let mut args = strings(&["apply", "-auto-approve", "-input=false", "-no-color"]);
    args.extend(targets.iter().map(|t| format!("-target={}", t)));
    args
}

/// Output values from `terraform output -json`.
pub(crate) fn parse_outputs(raw: &str) -> Result<BTreeMap<String, Value>, ToolError> {
    let parsed: BTreeMap<String, Value> = serde_json::from_str(raw)
        .map_err(|e| ToolError::unexpected("terraform output -json", e.to_string()))?;
    Ok(parsed
        .into_iter()
        .map(|(name, mut entry)| (name, entry["value"].take()))
        .collect())
}

#[async_trait]
impl ProvisioningEngine for TerraformClient {
    async fn init(&self, dir: &Path) -> Result<(), ToolError> {
        self.exec(dir, strings(&["init", "-input=false", "-no-color"]), self.init_timeout)
            .await?;
        Ok(())
    }

    async fn validate(&self, dir: &Path) -> Result<(), ToolError> {
        self.exec(dir, strings(&["validate", "-no-color"]), self.init_timeout)
            .await?;
        Ok(())
    }

    async fn plan(&self, dir: &Path) -> Result<String, ToolError> {
        self.exec(
            dir,
            strings(&["plan", "-input=false", "-no-color"]),
            self.apply_timeout,
        )
        .await
    }

    async fn apply(&self, dir: &Path, targets: &[String]) -> Result<(), ToolError> {
        tracing::info!(
            "Applying {}",
            if targets.is_empty() {
                "all modules".to_string()
            } else {
                targets.join(", ")
            }
        );
        self.exec(dir, apply_args(targets), self.apply_timeout).await?;
        Ok(())
    }

    async fn destroy(&self, dir: &Path) -> Result<(), ToolError> {
        self.exec(
            dir,
            strings(&["destroy", "-auto-approve", "-input=false", "-no-color"]),
            self.apply_timeout,
        )
        .await?;
        Ok(())
    }

    async fn outputs(&self, dir: &Path) -> Result<BTreeMap<String, Value>, ToolError> {
        let raw = self
            .exec(dir, strings(&["output", "-json"]), self.init_timeout)
            .await?;
        parse_outputs(&raw)
    }
}
