use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackup", version)]
#[command(about = "Stackup - Deploy layered application manifests to Kubernetes")]
pub struct Cli {
    /// Environment to operate on (selects deploy.<env>.json)
    #[arg(short, long, default_value = "dev", global = true)]
    pub env: String,

    /// Application manifest (defaults to stackup.app.json)
    #[arg(long, global = true)]
    pub app: Option<PathBuf>,

    /// Deployment manifest (defaults to deploy.<env>.json)
    #[arg(long, global = true)]
    pub deploy: Option<PathBuf>,

    /// Working directory holding the manifests and .stackup/
    #[arg(short, long, global = true)]
    pub workdir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge the manifests, resolve references and write the resolved configuration
    GenerateConfig,
    /// Provision the environment and forward its ports
    Deploy {
        /// Tear down an existing deployment in the namespace first
        #[arg(long)]
        force: bool,

        /// Generate artifacts and print the engine's plan without applying
        #[arg(long)]
        plan_only: bool,
    },
    /// Destroy the environment and remove its local state
    Destroy,
    /// Rolling restart of deployments
    Restart {
        /// Deployments to restart, comma separated (defaults to all)
        #[arg(short, long, value_delimiter = ',')]
        target: Vec<String>,
    },
    /// Re-create local port forwards for the last deployment
    PortForward,
    /// Show what a deploy would create, without calling any external tool
    Plan {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute public URLs in the host view for the current LAN address
    UpdatePublicUrls,
    /// Validate the manifests without deploying
    Validate,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_name = "SHELL")]
        shell: clap_complete::Shell,
    },
}
