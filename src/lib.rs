//! # Stackup
//!
//! A deployment orchestrator that turns a layered application description into a
//! running set of services on Kubernetes, and keeps a workstation wired up to it
//! through `kubectl port-forward`.
//!
//! ## Features
//!
//! - **Layered manifests**: an environment-independent application manifest merged
//!   with a `deploy.<env>.json` deployment manifest into one typed tree
//! - **References**: `${ref:path}` tokens and `{ "$ref": path }` entries that let one
//!   component point at another component's resolved address or secret
//! - **Provisioning strategies**: per-technology container specs, endpoints and
//!   resources, including a distributed mode for multi-role middleware
//! - **Terraform artifacts**: generated `*.tf.json` modules with dependency edges
//! - **Two-phase apply**: values discovered during the first apply (load balancer
//!   addresses) are synchronised back and re-applied when they change
//! - **Port forwarding**: conflict-free local ports, readiness waits and PID tracking
//!
//! ## Quick Start
//!
//! ```no_run
//! use stackup::{DeployOptions, ManifestLoader, Orchestrator};
//!
//! # async fn example() -> Result<(), stackup::Error> {
//! let loader = ManifestLoader::new(".");
//! let manifests = loader.load("dev", None, None)?;
//!
//! let orchestrator = Orchestrator::builder()
//!     .manifests(manifests)
//!     .work_dir(".")
//!     .build()?;
//!
//! let report = orchestrator.deploy(DeployOptions::default()).await?;
//! println!("applied {} time(s)", report.apply_count);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod external;
pub mod orchestrator;
pub mod port;
pub mod provisioning;
pub mod reference;
pub mod state;

pub use config::{
    ApplicationManifest, DeploymentManifest, ManifestLoader, ManifestSet, Merger, Provider,
    ResolvedConfiguration,
};
pub use error::{Error, Result};
pub use orchestrator::{DeployOptions, DeployReport, Orchestrator, Stage};
pub use provisioning::StrategyRegistry;
