//! Configuration parsing, merging and validation.
//!
//! - `app` - Application manifest (`ApplicationManifest`)
//! - `deploy` - Deployment manifest (`DeploymentManifest`, `Provider`, `DeploymentType`)
//! - `resolved` - The merged tree (`ResolvedConfiguration`, `Endpoint`)
//! - `merger` - Manifest merging (`Merger`)
//! - `parser` - Manifest discovery and JSON loading
//! - `validation` - Accumulated validation issues

mod app;
mod deploy;
pub(crate) mod merger;
mod parser;
mod resolved;
mod validation;

pub use app::*;
pub use deploy::*;
pub use merger::{deep_merge, Merger};
pub use parser::*;
pub use resolved::*;
pub use validation::*;

/// Merges two inline JSON manifests for the `dev` environment.
#[cfg(test)]
pub(crate) fn resolved_from_json(app: &str, deploy: &str) -> ResolvedConfiguration {
    let registry = crate::provisioning::StrategyRegistry::new();
    let app: ApplicationManifest = serde_json::from_str(app).unwrap();
    let deploy: DeploymentManifest = serde_json::from_str(deploy).unwrap();
    Merger::new(&registry, "dev").merge(&app, &deploy).unwrap()
}
