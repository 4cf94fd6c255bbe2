use super::{ReferencePath, ReferenceTarget};
use crate::artifact::naming;
use crate::config::{DeploymentType, IssueCode, ResolvedConfiguration, ValidationErrors, ValidationIssue};
use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

static REF_TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

fn ref_token_regex() -> &'static Regex {
    REF_TOKEN_REGEX
        .get_or_init(|| Regex::new(r"\$\{ref:([^}]+)\}").expect("static regex pattern is valid"))
}

/// Whether a string still contains `${ref:...}` tokens.
pub fn contains_reference(value: &str) -> bool {
    ref_token_regex().is_match(value)
}

/// A value the provisioning engine only knows after it has applied a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactHandle {
    pub module: String,
    pub output: String,
}

impl ArtifactHandle {
    /// Terraform interpolation that reads this output.
    pub fn expression(&self) -> String {
        format!("${{module.{}.{}}}", self.module, self.output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    Literal(String),
    Deferred(ArtifactHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub path: ReferencePath,
    pub kind: ReferenceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupError {
    MissingComponent,
    MissingEntry,
    Disabled,
    MissingEndpoint,
    NoValue,
    /// Public address of a cloud endpoint, discovered by the first apply.
    Pending,
    MissingField,
    WholeEntry,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LookupError::MissingComponent => "component does not exist",
            LookupError::MissingEntry => "middleware dependency does not exist",
            LookupError::Disabled => "middleware dependency is disabled in this environment",
            LookupError::MissingEndpoint => "endpoint does not exist",
            LookupError::NoValue => "endpoint has no value yet",
            LookupError::Pending => "public address is not known until after apply",
            LookupError::MissingField => "config field does not exist",
            LookupError::WholeEntry => "whole-entry references are only valid as `$ref` entries",
        };
        f.write_str(text)
    }
}

/// Looks a path up in the tree. Config fields come back unresolved.
fn lookup(
    config: &ResolvedConfiguration,
    path: &ReferencePath,
) -> std::result::Result<ReferenceKind, LookupError> {
    let component = config
        .components
        .get(&path.component)
        .ok_or(LookupError::MissingComponent)?;
    let mw = component
        .middleware_dependencies
        .get(&path.middleware)
        .ok_or(LookupError::MissingEntry)?;
    if !mw.enabled {
        return Err(LookupError::Disabled);
    }

    match &path.target {
        ReferenceTarget::Entry => Err(LookupError::WholeEntry),
        ReferenceTarget::EndpointValue(name) | ReferenceTarget::EndpointPublicUrl(name) => {
            let endpoint = mw.endpoints.get(name).ok_or(LookupError::MissingEndpoint)?;
            let known = match &path.target {
                ReferenceTarget::EndpointPublicUrl(_) => endpoint.public_url.clone(),
                _ => endpoint.value.clone(),
            };
            match known {
                Some(value) => Ok(ReferenceKind::Literal(value)),
                None if matches!(path.target, ReferenceTarget::EndpointPublicUrl(_))
                    && config.provider.is_cloud()
                    && endpoint.public_access
                    && mw.deployment_type == DeploymentType::Container =>
                {
                    Err(LookupError::Pending)
                }
                None if mw.deployment_type == DeploymentType::Managed => {
                    Ok(ReferenceKind::Deferred(ArtifactHandle {
                        module: naming::cloud_module_name(&path.component, &path.middleware),
                        output: "endpoint".to_string(),
                    }))
                }
                None => Err(LookupError::NoValue),
            }
        }
        ReferenceTarget::ConfigField(field) => match mw.config.get(field) {
            None | Some(Value::Null) => Err(LookupError::MissingField),
            Some(Value::String(s)) => Ok(ReferenceKind::Literal(s.clone())),
            Some(other) => Ok(ReferenceKind::Literal(other.to_string())),
        },
    }
}

/// Every reference declared in `dependencies` lists, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct RefMap {
    entries: BTreeMap<ReferencePath, Reference>,
}

impl RefMap {
    /// Builds the map from every component's and middleware's `dependencies`.
    ///
    /// In lenient mode endpoints without a value yet are skipped instead of
    /// being reported.
    pub fn build(config: &ResolvedConfiguration, strict: bool) -> (RefMap, Vec<ValidationIssue>) {
        let mut map = RefMap::default();
        let mut issues = Vec::new();

        for (c, component) in &config.components {
            let declared = component.dependencies.iter().chain(
                component
                    .middleware_dependencies
                    .values()
                    .filter(|mw| mw.enabled)
                    .flat_map(|mw| mw.dependencies.iter()),
            );
            for raw in declared {
                let path = match raw.parse::<ReferencePath>() {
                    Ok(path) => path,
                    Err(e) => {
                        issues.push(ValidationIssue::new(
                            c,
                            Some(raw),
                            IssueCode::InvalidReferencePath,
                            e.to_string(),
                        ));
                        continue;
                    }
                };
                match lookup(config, &path) {
                    Ok(ReferenceKind::Literal(raw_value)) if contains_reference(&raw_value) => {
                        let mut stack = vec![path.clone()];
                        let resolved = ReferenceResolver::new(strict).resolve_str(
                            &raw_value,
                            config,
                            &mut stack,
                            c,
                            &mut issues,
                        );
                        map.insert(Reference {
                            path,
                            kind: ReferenceKind::Literal(resolved),
                        });
                    }
                    Ok(kind) => map.insert(Reference { path, kind }),
                    Err(LookupError::NoValue) if !strict => {}
                    Err(LookupError::Pending) => {}
                    Err(e) => issues.push(ValidationIssue::new(
                        c,
                        Some(raw),
                        IssueCode::UnresolvedReference,
                        e.to_string(),
                    )),
                }
            }
        }

        (map, issues)
    }

    pub fn insert(&mut self, reference: Reference) {
        self.entries.insert(reference.path.clone(), reference);
    }

    pub fn get(&self, path: &ReferencePath) -> Option<&Reference> {
        self.entries.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.entries.values()
    }

    pub fn deferred(&self) -> impl Iterator<Item = (&ReferencePath, &ArtifactHandle)> {
        self.entries.values().filter_map(|r| match &r.kind {
            ReferenceKind::Deferred(handle) => Some((&r.path, handle)),
            ReferenceKind::Literal(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replaces `${ref:path}` tokens in every string of the tree.
///
/// Chains are followed until no token is left. Tokens pointing at a managed
/// resource whose endpoint is not known yet become Terraform output
/// expressions. Resolving an already-resolved tree changes nothing.
pub struct ReferenceResolver {
    strict: bool,
}

impl ReferenceResolver {
    /// `strict` reports tokens whose target has no value yet; otherwise they are kept.
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn strict() -> Self {
        Self::new(true)
    }

    pub fn lenient() -> Self {
        Self::new(false)
    }

    pub fn resolve(&self, config: &mut ResolvedConfiguration) -> Result<()> {
        let issues = self.resolve_collecting(config);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(ValidationErrors::from(issues)))
        }
    }

    pub(crate) fn resolve_collecting(
        &self,
        config: &mut ResolvedConfiguration,
    ) -> Vec<ValidationIssue> {
        let snapshot = config.clone();
        let mut issues = Vec::new();

        for (c, component) in config.components.iter_mut() {
            for (m, mw) in component.middleware_dependencies.iter_mut() {
                if !mw.enabled {
                    continue;
                }
                for (field, value) in mw.config.iter_mut() {
                    let mut stack = vec![ReferencePath::config_field(c, m, field)];
                    self.resolve_value(value, &snapshot, &mut stack, c, &mut issues);
                }
                for value in mw.env.values_mut() {
                    *value = self.resolve_str(value, &snapshot, &mut Vec::new(), c, &mut issues);
                }
            }
            for value in component.env.values_mut() {
                *value = self.resolve_str(value, &snapshot, &mut Vec::new(), c, &mut issues);
            }
            for value in component.app_config.values_mut() {
                self.resolve_value(value, &snapshot, &mut Vec::new(), c, &mut issues);
            }
            for service in component.external_services.values_mut() {
                for value in service.config.values_mut() {
                    self.resolve_value(value, &snapshot, &mut Vec::new(), c, &mut issues);
                }
            }
        }

        issues
    }

    fn resolve_value(
        &self,
        value: &mut Value,
        snapshot: &ResolvedConfiguration,
        stack: &mut Vec<ReferencePath>,
        component: &str,
        issues: &mut Vec<ValidationIssue>,
    ) {
        match value {
            Value::String(s) => *s = self.resolve_str(s, snapshot, stack, component, issues),
            Value::Array(items) => {
                for item in items {
                    self.resolve_value(item, snapshot, stack, component, issues);
                }
            }
            Value::Object(map) => {
                for item in map.values_mut() {
                    self.resolve_value(item, snapshot, stack, component, issues);
                }
            }
            _ => {}
        }
    }

    fn resolve_str(
        &self,
        input: &str,
        snapshot: &ResolvedConfiguration,
        stack: &mut Vec<ReferencePath>,
        component: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> String {
        let re = ref_token_regex();
        if !re.is_match(input) {
            return input.to_string();
        }

        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in re.captures_iter(input) {
            let Some(token) = caps.get(0) else {
                continue;
            };
            out.push_str(&input[last..token.start()]);
            last = token.end();

            let raw_path = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let replacement = match raw_path.parse::<ReferencePath>() {
                Ok(path) => self.resolve_path(&path, snapshot, stack, component, issues),
                Err(e) => {
                    issues.push(ValidationIssue::new(
                        component,
                        Some(raw_path),
                        IssueCode::InvalidReferencePath,
                        e.to_string(),
                    ));
                    None
                }
            };
            out.push_str(replacement.as_deref().unwrap_or(token.as_str()));
        }
        out.push_str(&input[last..]);
        out
    }

    fn resolve_path(
        &self,
        path: &ReferencePath,
        snapshot: &ResolvedConfiguration,
        stack: &mut Vec<ReferencePath>,
        component: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<String> {
        if let Some(pos) = stack.iter().position(|p| p == path) {
            let mut chain: Vec<String> = stack[pos..].iter().map(ToString::to_string).collect();
            chain.push(path.to_string());
            issues.push(ValidationIssue::new(
                component,
                None,
                IssueCode::ReferenceCycle,
                format!("reference cycle: {}", chain.join(" -> ")),
            ));
            return None;
        }

        match lookup(snapshot, path) {
            Ok(ReferenceKind::Literal(raw)) => {
                stack.push(path.clone());
                let resolved = self.resolve_str(&raw, snapshot, stack, component, issues);
                stack.pop();
                Some(resolved)
            }
            Ok(ReferenceKind::Deferred(handle)) => Some(handle.expression()),
            Err(LookupError::NoValue) if !self.strict => None,
            Err(LookupError::Pending) => None,
            Err(e) => {
                issues.push(ValidationIssue::new(
                    component,
                    Some(&path.to_string()),
                    IssueCode::UnresolvedReference,
                    e.to_string(),
                ));
                None
            }
        }
    }
}

/// Replaces every `${ref:...}` token left in the tree with an empty string.
/// Returns how many strings held one.
pub fn blank_unresolved(config: &mut ResolvedConfiguration) -> usize {
    fn blank_str(s: &mut String) -> usize {
        if !contains_reference(s) {
            return 0;
        }
        *s = ref_token_regex().replace_all(s, "").into_owned();
        1
    }
    fn blank_value(value: &mut Value) -> usize {
        match value {
            Value::String(s) => blank_str(s),
            Value::Array(items) => items.iter_mut().map(blank_value).sum(),
            Value::Object(map) => map.values_mut().map(blank_value).sum(),
            _ => 0,
        }
    }

    let mut count = 0;
    for component in config.components.values_mut() {
        count += component.env.values_mut().map(blank_str).sum::<usize>();
        count += component.app_config.values_mut().map(blank_value).sum::<usize>();
        for mw in component.middleware_dependencies.values_mut() {
            count += mw.env.values_mut().map(blank_str).sum::<usize>();
            count += mw.config.values_mut().map(blank_value).sum::<usize>();
        }
        for service in component.external_services.values_mut() {
            count += service.config.values_mut().map(blank_value).sum::<usize>();
        }
    }
    count
}
