use crate::output::UserOutput;
use serde_json::json;
use stackup::Orchestrator;

pub fn run_plan(orchestrator: &Orchestrator, json: bool, out: &dyn UserOutput) -> anyhow::Result<()> {
    let plan = orchestrator.plan()?;

    if json {
        let modules: Vec<_> = plan
            .modules
            .iter()
            .map(|m| json!({ "name": m.name, "kind": m.kind.dir(), "dependsOn": m.depends_on }))
            .collect();
        let exposures: Vec<_> = plan
            .exposures
            .iter()
            .map(|e| {
                json!({
                    "endpoint": e.endpoint.to_string(),
                    "service": e.service,
                    "port": e.port,
                    "targetPort": e.target_port,
                    "public": e.public,
                })
            })
            .collect();
        let unresolved: Vec<String> = plan.unresolved.iter().map(ToString::to_string).collect();
        let doc = json!({
            "environment": plan.environment,
            "namespace": plan.namespace,
            "provider": plan.provider.as_str(),
            "modules": modules,
            "outputs": plan.outputs,
            "exposures": exposures,
            "unresolved": unresolved,
        });
        out.status(&serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    out.status(&format!(
        "Plan for '{}' → namespace {} ({})",
        plan.environment,
        plan.namespace,
        plan.provider.as_str()
    ));
    out.blank();
    out.status(&format!("Modules ({}):", plan.modules.len()));
    for module in &plan.modules {
        if module.depends_on.is_empty() {
            out.status(&format!("  {} [{}]", module.name, module.kind.dir()));
        } else {
            out.status(&format!(
                "  {} [{}] after {}",
                module.name,
                module.kind.dir(),
                module.depends_on.join(", ")
            ));
        }
    }

    if !plan.exposures.is_empty() {
        out.blank();
        out.status("Endpoints:");
        for exposure in &plan.exposures {
            out.status(&format!(
                "  {} -> {}:{}{}",
                exposure.endpoint,
                exposure.service,
                exposure.port,
                if exposure.public { " (public)" } else { "" }
            ));
        }
    }

    if !plan.outputs.is_empty() {
        out.blank();
        out.status(&format!("Discovered after apply: {}", plan.outputs.join(", ")));
    }
    if !plan.unresolved.is_empty() {
        out.blank();
        out.warning(&format!(
            "{} endpoint(s) only get a value once deployed",
            plan.unresolved.len()
        ));
    }
    Ok(())
}
