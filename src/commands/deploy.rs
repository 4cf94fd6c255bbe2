use super::port_forward::print_mapping;
use crate::output::UserOutput;
use stackup::{DeployOptions, Orchestrator};

pub async fn run_deploy(
    orchestrator: &Orchestrator,
    force: bool,
    plan_only: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    out.status(&format!(
        "Deploying '{}' to namespace {}...",
        orchestrator.environment(),
        orchestrator.namespace()
    ));

    let report = orchestrator.deploy(DeployOptions { force, plan_only }).await?;

    if let Some(plan) = &report.plan {
        out.blank();
        out.status(plan);
        out.blank();
        out.success(&format!(
            "Artifacts written to {} (not applied)",
            orchestrator.paths().artifacts().display()
        ));
        return Ok(());
    }

    out.blank();
    for stage in &report.stages_completed {
        out.status(&format!("  ✓ {}", stage));
    }
    if report.discovered_changes > 0 {
        out.status(&format!(
            "  {} discovered value(s) applied in a second pass",
            report.discovered_changes
        ));
    }

    if let Some(mapping) = &report.port_mapping {
        out.blank();
        print_mapping(mapping, out);
    }

    out.blank();
    out.success(&format!(
        "Deployed {} ({} apply cycle(s))",
        orchestrator.namespace(),
        report.apply_count
    ));
    out.status(&format!(
        "Host view: {}",
        orchestrator.paths().host_view().display()
    ));
    Ok(())
}
