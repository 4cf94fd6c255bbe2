mod deploy;
mod destroy;
mod generate_config;
mod plan;
mod port_forward;
mod restart;
mod validate;

pub use deploy::run_deploy;
pub use destroy::run_destroy;
pub use generate_config::run_generate_config;
pub use plan::run_plan;
pub use port_forward::{run_port_forward, run_update_public_urls};
pub use restart::run_restart;
pub use validate::run_validate;
