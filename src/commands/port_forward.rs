use crate::output::UserOutput;
use stackup::port::PortMapping;
use stackup::Orchestrator;

pub(super) fn print_mapping(mapping: &PortMapping, out: &dyn UserOutput) {
    if mapping.is_empty() {
        out.status("No endpoints forwarded");
        return;
    }
    out.status("Forwarded endpoints:");
    let width = mapping
        .forwards
        .iter()
        .map(|f| f.endpoint.to_string().len())
        .max()
        .unwrap_or(0);
    for forward in &mapping.forwards {
        out.status(&format!(
            "  {:<width$}  localhost:{:<5} -> {}:{}",
            forward.endpoint.to_string(),
            forward.local_port,
            forward.service,
            forward.remote_port,
            width = width
        ));
    }
}

pub async fn run_port_forward(orchestrator: &Orchestrator, out: &dyn UserOutput) -> anyhow::Result<()> {
    out.status(&format!(
        "Forwarding ports for namespace {}...",
        orchestrator.namespace()
    ));
    let mapping = orchestrator.port_forward().await?;
    out.blank();
    print_mapping(&mapping, out);
    out.blank();
    out.success(&format!(
        "Host view written to {}",
        orchestrator.paths().host_view().display()
    ));
    Ok(())
}

pub fn run_update_public_urls(orchestrator: &Orchestrator, out: &dyn UserOutput) -> anyhow::Result<()> {
    let changed = orchestrator.update_public_urls()?;
    if changed == 0 {
        out.status("Public URLs are up to date");
    } else {
        out.success(&format!("Updated {} public URL(s)", changed));
    }
    Ok(())
}
