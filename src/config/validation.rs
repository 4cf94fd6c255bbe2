use super::merger::deep_merge;
use super::{ApplicationManifest, DeploymentManifest, DeploymentType, MiddlewareEntry};
use crate::provisioning::StrategyRegistry;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Machine-readable category of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingComponent,
    MissingDependency,
    MissingRequiredField,
    IllegalDeploymentType,
    MissingUseField,
    UnsupportedManagedTechnology,
    InvalidReferencePath,
    UnresolvedReference,
    ReferenceCycle,
    MissingEndpointValue,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::MissingComponent => "missing_component",
            IssueCode::MissingDependency => "missing_dependency",
            IssueCode::MissingRequiredField => "missing_required_field",
            IssueCode::IllegalDeploymentType => "illegal_deployment_type",
            IssueCode::MissingUseField => "missing_use_field",
            IssueCode::UnsupportedManagedTechnology => "unsupported_managed_technology",
            IssueCode::InvalidReferencePath => "invalid_reference_path",
            IssueCode::UnresolvedReference => "unresolved_reference",
            IssueCode::ReferenceCycle => "reference_cycle",
            IssueCode::MissingEndpointValue => "missing_endpoint_value",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ValidationIssue {
    pub component: String,
    /// Middleware, external service or field the issue is about.
    pub subject: Option<String>,
    pub code: IssueCode,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        component: impl Into<String>,
        subject: Option<&str>,
        code: IssueCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            subject: subject.map(str::to_string),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "[{}] {}: {}", self.code, subject, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// Every issue found in one validation pass, grouped by component for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn with_code(&self, code: IssueCode) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.code == code).collect()
    }

    pub fn by_component(&self) -> BTreeMap<&str, Vec<&ValidationIssue>> {
        let mut grouped: BTreeMap<&str, Vec<&ValidationIssue>> = BTreeMap::new();
        for issue in &self.issues {
            grouped.entry(issue.component.as_str()).or_default().push(issue);
        }
        grouped
    }
}

impl From<Vec<ValidationIssue>> for ValidationErrors {
    fn from(mut issues: Vec<ValidationIssue>) -> Self {
        issues.sort();
        issues.dedup();
        Self { issues }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.issues.len() == 1 { "issue" } else { "issues" };
        write!(f, "Configuration is invalid ({} {}):", self.issues.len(), noun)?;
        for (component, issues) in self.by_component() {
            write!(f, "\n  {}:", component)?;
            for issue in issues {
                write!(f, "\n    - {}", issue)?;
            }
        }
        Ok(())
    }
}

/// Checks both manifests against each other and returns every issue found.
///
/// `deploy` must already have its structured `$ref` entries expanded.
pub fn validate_manifests(
    app: &ApplicationManifest,
    deploy: &DeploymentManifest,
    registry: &StrategyRegistry,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (name, app_component) in &app.components {
        let Some(deploy_component) = deploy.components.get(name) else {
            issues.push(ValidationIssue::new(
                name,
                None,
                IssueCode::MissingComponent,
                format!("component '{}' has no entry in the deployment manifest", name),
            ));
            continue;
        };

        for (mw_name, app_mw) in &app_component.middleware_dependencies {
            let Some(entry) = deploy_component
                .middleware_dependencies
                .get(mw_name)
                .and_then(MiddlewareEntry::as_inline)
            else {
                issues.push(ValidationIssue::new(
                    name,
                    Some(mw_name),
                    IssueCode::MissingDependency,
                    format!("{} dependency is not configured for this environment", app_mw.technology),
                ));
                continue;
            };
            if entry.config_is_empty_object() {
                continue;
            }
            check_required(
                &mut issues,
                name,
                mw_name,
                &app_mw.required,
                &app_mw.config,
                entry.config.as_ref(),
            );
        }

        for (svc_name, app_svc) in &app_component.external_services {
            let Some(entry) = deploy_component.external_services.get(svc_name) else {
                issues.push(ValidationIssue::new(
                    name,
                    Some(svc_name),
                    IssueCode::MissingDependency,
                    format!("external service ({}) is not configured", app_svc.provider),
                ));
                continue;
            };
            if matches!(&entry.config, Some(map) if map.is_empty()) {
                continue;
            }
            check_required(
                &mut issues,
                name,
                svc_name,
                &app_svc.required,
                &app_svc.config,
                entry.config.as_ref(),
            );
        }

        if let Some(requirements) = &app_component.app_config {
            match &deploy_component.app_config {
                None if !requirements.required.is_empty() => issues.push(ValidationIssue::new(
                    name,
                    Some("appConfig"),
                    IssueCode::MissingDependency,
                    "application config is required but not configured",
                )),
                None => {}
                Some(entry) if matches!(&entry.config, Some(map) if map.is_empty()) => {}
                Some(entry) => check_required(
                    &mut issues,
                    name,
                    "appConfig",
                    &requirements.required,
                    &requirements.config,
                    entry.config.as_ref(),
                ),
            }
        }
    }

    for (name, component) in &deploy.components {
        if !DeploymentType::legal_for_component(deploy.provider).contains(&component.deployment_type)
        {
            issues.push(ValidationIssue::new(
                name,
                None,
                IssueCode::IllegalDeploymentType,
                format!(
                    "components cannot use deploymentType '{}' on provider '{}'",
                    component.deployment_type, deploy.provider
                ),
            ));
        }

        let app_component = app.components.get(name);
        for (mw_name, entry) in &component.middleware_dependencies {
            let Some(mw) = entry.as_inline() else {
                continue;
            };
            if !DeploymentType::legal_for_middleware(deploy.provider).contains(&mw.deployment_type) {
                issues.push(ValidationIssue::new(
                    name,
                    Some(mw_name),
                    IssueCode::IllegalDeploymentType,
                    format!(
                        "middleware cannot use deploymentType '{}' on provider '{}'",
                        mw.deployment_type, deploy.provider
                    ),
                ));
                continue;
            }

            let app_technology = app_component
                .and_then(|c| c.middleware_dependencies.get(mw_name))
                .map(|m| m.technology.as_str());

            match mw.deployment_type {
                DeploymentType::Container if mw.use_strategy.is_none() => {
                    issues.push(ValidationIssue::new(
                        name,
                        Some(mw_name),
                        IssueCode::MissingUseField,
                        "containerized middleware must name the technology it runs via `use`",
                    ));
                }
                DeploymentType::Managed => {
                    let technology = mw.use_strategy.as_deref().or(app_technology);
                    let supported = technology
                        .map(|t| registry.create_or_generic(t))
                        .and_then(|s| s.managed_kind(deploy.provider))
                        .is_some();
                    if !supported {
                        issues.push(ValidationIssue::new(
                            name,
                            Some(mw_name),
                            IssueCode::UnsupportedManagedTechnology,
                            format!(
                                "'{}' has no managed offering on provider '{}'",
                                technology.unwrap_or("unknown"),
                                deploy.provider
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    issues
}

fn check_required(
    issues: &mut Vec<ValidationIssue>,
    component: &str,
    subject: &str,
    required: &[String],
    defaults: &Map<String, Value>,
    overrides: Option<&Map<String, Value>>,
) {
    if required.is_empty() {
        return;
    }
    let mut merged = defaults.clone();
    if let Some(overrides) = overrides {
        deep_merge(&mut merged, overrides);
    }
    for field in required {
        let present = merged.get(field).is_some_and(|v| !v.is_null());
        if !present {
            issues.push(ValidationIssue::new(
                component,
                Some(subject),
                IssueCode::MissingRequiredField,
                format!("required field '{}' is missing", field),
            ));
        }
    }
}
