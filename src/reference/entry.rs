use super::{ReferencePath, ReferenceTarget};
use crate::config::{
    deep_merge, DeployMiddleware, DeploymentManifest, IssueCode, MiddlewareEntry,
    StructuredReference, ValidationIssue,
};

/// Expands every `{ "$ref": ... }` middleware entry into an inline entry.
///
/// The referenced entry is cloned, `config` overrides are deep-merged over it
/// and `dependencies` replace the referenced list. References to references are
/// followed. Entries that fail to expand are reported and replaced with a
/// disabled placeholder so the rest of the manifest can still be validated.
pub fn expand_structured_references(
    deploy: &DeploymentManifest,
) -> (DeploymentManifest, Vec<ValidationIssue>) {
    let mut expanded = deploy.clone();
    let mut issues = Vec::new();

    for (component, entry_component) in expanded.components.iter_mut() {
        for (name, entry) in entry_component.middleware_dependencies.iter_mut() {
            let MiddlewareEntry::Reference(reference) = entry else {
                continue;
            };
            let mut stack = vec![ReferencePath::entry(component.as_str(), name.as_str())];
            let inline = match expand(deploy, reference, &mut stack) {
                Ok(mw) => mw,
                Err((code, message)) => {
                    issues.push(ValidationIssue::new(
                        component.as_str(),
                        Some(name),
                        code,
                        message,
                    ));
                    DeployMiddleware {
                        use_strategy: Some("generic".to_string()),
                        config: Some(Default::default()),
                        ..Default::default()
                    }
                }
            };
            *entry = MiddlewareEntry::Inline(inline);
        }
    }

    (expanded, issues)
}

fn expand(
    deploy: &DeploymentManifest,
    reference: &StructuredReference,
    stack: &mut Vec<ReferencePath>,
) -> Result<DeployMiddleware, (IssueCode, String)> {
    let path: ReferencePath = reference
        .target
        .parse()
        .map_err(|e: crate::Error| (IssueCode::InvalidReferencePath, e.to_string()))?;
    if path.target != ReferenceTarget::Entry {
        return Err((
            IssueCode::InvalidReferencePath,
            format!("'$ref' must point at a whole middleware entry, got '{}'", path),
        ));
    }
    if let Some(pos) = stack.iter().position(|p| p == &path) {
        let mut chain: Vec<String> = stack[pos..].iter().map(ToString::to_string).collect();
        chain.push(path.to_string());
        return Err((
            IssueCode::ReferenceCycle,
            format!("reference cycle: {}", chain.join(" -> ")),
        ));
    }

    let target = deploy
        .components
        .get(&path.component)
        .and_then(|c| c.middleware_dependencies.get(&path.middleware))
        .ok_or_else(|| {
            (
                IssueCode::UnresolvedReference,
                format!("'{}' does not exist", path),
            )
        })?;

    let mut base = match target {
        MiddlewareEntry::Inline(mw) => mw.clone(),
        MiddlewareEntry::Reference(next) => {
            stack.push(path);
            let resolved = expand(deploy, next, stack)?;
            stack.pop();
            resolved
        }
    };

    if let Some(overrides) = &reference.config {
        deep_merge(base.config.get_or_insert_with(Default::default), overrides);
    }
    if let Some(dependencies) = &reference.dependencies {
        base.dependencies = dependencies.clone();
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(json: &str) -> DeploymentManifest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn clones_target_and_applies_overrides() {
        let deploy = manifest(
            r#"{ "provider": "local", "components": {
                "main": { "middlewareDependencies": {
                    "mainDb": { "use": "postgresql", "version": "16",
                                "config": { "database": "appdb", "user": "app" },
                                "dependencies": ["components.main.middlewareDependencies.cache.endpoint"] },
                    "cache": { "use": "redis" } } },
                "worker": { "middlewareDependencies": {
                    "db": { "$ref": "components.main.middlewareDependencies.mainDb",
                            "config": { "database": "worker" },
                            "dependencies": [] } } } } }"#,
        );
        let (expanded, issues) = expand_structured_references(&deploy);
        assert!(issues.is_empty());

        let db = expanded.components["worker"].middleware_dependencies["db"]
            .as_inline()
            .unwrap();
        assert_eq!(db.use_strategy.as_deref(), Some("postgresql"));
        assert_eq!(db.version.as_deref(), Some("16"));
        assert_eq!(
            serde_json::Value::Object(db.config.clone().unwrap()),
            json!({ "database": "worker", "user": "app" })
        );
        assert!(db.dependencies.is_empty());
    }

    #[test]
    fn follows_reference_chains() {
        let deploy = manifest(
            r#"{ "provider": "local", "components": { "main": { "middlewareDependencies": {
                "a": { "$ref": "components.main.middlewareDependencies.b" },
                "b": { "$ref": "components.main.middlewareDependencies.c", "config": { "x": 1 } },
                "c": { "use": "redis", "config": { "x": 0, "y": 2 } } } } } }"#,
        );
        let (expanded, issues) = expand_structured_references(&deploy);
        assert!(issues.is_empty());
        let a = expanded.components["main"].middleware_dependencies["a"]
            .as_inline()
            .unwrap();
        assert_eq!(a.use_strategy.as_deref(), Some("redis"));
        assert_eq!(a.config.as_ref().unwrap()["x"], 1);
        assert_eq!(a.config.as_ref().unwrap()["y"], 2);
    }

    #[test]
    fn reports_cycles_and_missing_targets() {
        let deploy = manifest(
            r#"{ "provider": "local", "components": { "main": { "middlewareDependencies": {
                "a": { "$ref": "components.main.middlewareDependencies.b" },
                "b": { "$ref": "components.main.middlewareDependencies.a" },
                "c": { "$ref": "components.main.middlewareDependencies.nope" },
                "d": { "$ref": "components.main.middlewareDependencies.c.endpoint" } } } } }"#,
        );
        let (_, issues) = expand_structured_references(&deploy);
        let codes: Vec<IssueCode> = issues.iter().map(|i| i.code).collect();
        assert_eq!(
            codes,
            vec![
                IssueCode::ReferenceCycle,
                IssueCode::ReferenceCycle,
                IssueCode::UnresolvedReference,
                IssueCode::InvalidReferencePath,
            ]
        );
        assert!(issues[0].message.contains(
            "components.main.middlewareDependencies.a -> components.main.middlewareDependencies.b -> components.main.middlewareDependencies.a"
        ));
    }
}
