use crate::output::UserOutput;
use stackup::Orchestrator;

pub fn run_validate(orchestrator: &Orchestrator, out: &dyn UserOutput) -> anyhow::Result<()> {
    let manifests = orchestrator.manifests();
    out.status(&format!(
        "Validating {} against {}...",
        manifests.deploy_path.display(),
        manifests.app_path.display()
    ));

    let config = orchestrator.validate()?;

    out.success("Manifests are valid");
    out.blank();
    out.status(&format!(
        "Provider: {}  Namespace: {}",
        config.provider, config.namespace
    ));
    out.status(&format!("Components: {}", config.components.len()));
    for (name, component) in &config.components {
        out.status(&format!(
            "  - {} ({})",
            name,
            component.deployment_type.as_str()
        ));
        for (mw_name, mw) in &component.middleware_dependencies {
            let state = if mw.enabled { mw.deployment_type.as_str() } else { "disabled" };
            out.status(&format!("      {} [{}, {}]", mw_name, mw.technology, state));
        }
    }
    Ok(())
}
