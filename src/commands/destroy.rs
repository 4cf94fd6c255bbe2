use crate::output::UserOutput;
use stackup::Orchestrator;

pub async fn run_destroy(orchestrator: &Orchestrator, out: &dyn UserOutput) -> anyhow::Result<()> {
    out.status(&format!(
        "Destroying '{}' (namespace {})...",
        orchestrator.environment(),
        orchestrator.namespace()
    ));
    orchestrator.destroy().await?;
    out.success("Environment destroyed and local state removed");
    Ok(())
}
