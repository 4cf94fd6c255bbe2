use crate::output::UserOutput;
use stackup::Orchestrator;

pub async fn run_restart(
    orchestrator: &Orchestrator,
    targets: &[String],
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    if targets.is_empty() {
        out.status("Restarting all deployments...");
    } else {
        out.status(&format!("Restarting: {}", targets.join(", ")));
    }

    let restarted = orchestrator.restart(targets).await?;
    if restarted.is_empty() {
        out.warning(&format!(
            "No live deployments in namespace {}",
            orchestrator.namespace()
        ));
        return Ok(());
    }
    for deployment in &restarted {
        out.status(&format!("  ✓ {}", deployment));
    }
    out.success(&format!("Restarted {} deployment(s)", restarted.len()));
    Ok(())
}
