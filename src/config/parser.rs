use super::{ApplicationManifest, DeploymentManifest};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_APP_MANIFEST: &str = "stackup.app.json";

/// Both input manifests for one environment.
#[derive(Debug, Clone)]
pub struct ManifestSet {
    pub environment: String,
    pub app: ApplicationManifest,
    pub deploy: DeploymentManifest,
    pub app_path: PathBuf,
    pub deploy_path: PathBuf,
}

/// Locates and parses manifests relative to a work directory.
pub struct ManifestLoader {
    work_dir: PathBuf,
}

impl ManifestLoader {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn default_app_path(&self) -> PathBuf {
        self.work_dir.join(DEFAULT_APP_MANIFEST)
    }

    pub fn default_deploy_path(&self, environment: &str) -> PathBuf {
        self.work_dir.join(format!("deploy.{}.json", environment))
    }

    /// Load both manifests. Explicit paths are taken relative to the work directory.
    pub fn load(
        &self,
        environment: &str,
        app_path: Option<&Path>,
        deploy_path: Option<&Path>,
    ) -> Result<ManifestSet> {
        let app_path = app_path
            .map(|p| self.work_dir.join(p))
            .unwrap_or_else(|| self.default_app_path());
        let deploy_path = deploy_path
            .map(|p| self.work_dir.join(p))
            .unwrap_or_else(|| self.default_deploy_path(environment));

        let app: ApplicationManifest = load_json(&app_path, "application manifest")?;
        let deploy: DeploymentManifest = load_json(&deploy_path, "deployment manifest")?;
        tracing::debug!(
            "Loaded {} and {}",
            app_path.display(),
            deploy_path.display()
        );

        Ok(ManifestSet {
            environment: environment.to_string(),
            app,
            deploy,
            app_path,
            deploy_path,
        })
    }
}

fn load_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read {} '{}': {}",
            what,
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Parse(format!("{} '{}': {}", what, path.display(), e)))
}
