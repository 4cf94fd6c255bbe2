//! Run state on disk.
//!
//! Everything a run persists lives under `<workdir>/.stackup/<env>/`:
//!
//! - `resolved.json` - the resolved configuration, reused by the next run
//! - `resolved.host.json` - the same tree with workstation-reachable addresses
//! - `terraform/` - generated artifacts and the engine's own state
//! - `port-forward.<namespace>.json` - tracked forwarder processes
//! - `.lock` - advisory lock held for the duration of a run

mod host_view;
mod lock;
mod paths;
mod store;

pub use host_view::{build_host_view, detect_lan_address, refresh_public_urls};
pub use lock::RunLock;
pub use paths::{RunPaths, STATE_DIR};
pub use store::{load_json, save_json, write_atomic};
