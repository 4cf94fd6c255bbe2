mod cli;
mod commands;
mod output;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use stackup::{Error as StackupError, ManifestLoader, Orchestrator};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(err) = e.downcast_ref::<StackupError>() {
            eprintln!("Error: {}", err);
            if let Some(suggestion) = err.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // ── Commands that need no manifests ─────────────────────────────
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    // ── Load manifests ──────────────────────────────────────────────
    let work_dir = match cli.workdir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let manifests = ManifestLoader::new(work_dir.clone()).load(
        &cli.env,
        cli.app.as_deref(),
        cli.deploy.as_deref(),
    )?;
    let orchestrator = Orchestrator::builder()
        .manifests(manifests)
        .work_dir(work_dir)
        .build()?;

    let out = output::CliOutput;
    match cli.command {
        Commands::GenerateConfig => commands::run_generate_config(&orchestrator, &out)?,
        Commands::Deploy { force, plan_only } => {
            commands::run_deploy(&orchestrator, force, plan_only, &out).await?
        }
        Commands::Destroy => commands::run_destroy(&orchestrator, &out).await?,
        Commands::Restart { target } => commands::run_restart(&orchestrator, &target, &out).await?,
        Commands::PortForward => commands::run_port_forward(&orchestrator, &out).await?,
        Commands::Plan { json } => commands::run_plan(&orchestrator, json, &out)?,
        Commands::UpdatePublicUrls => commands::run_update_public_urls(&orchestrator, &out)?,
        Commands::Validate => commands::run_validate(&orchestrator, &out)?,
        Commands::Completions { .. } => unreachable!("handled before loading manifests"),
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
