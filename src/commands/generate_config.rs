use crate::output::UserOutput;
use stackup::Orchestrator;

pub fn run_generate_config(orchestrator: &Orchestrator, out: &dyn UserOutput) -> anyhow::Result<()> {
    let config = orchestrator.generate_config()?;
    let middleware = config.iter_middleware().filter(|(_, _, mw)| mw.enabled).count();
    out.success(&format!(
        "Resolved {} component(s) and {} middleware entr{} into {}",
        config.components.len(),
        middleware,
        if middleware == 1 { "y" } else { "ies" },
        orchestrator.paths().resolved().display()
    ));
    Ok(())
}
