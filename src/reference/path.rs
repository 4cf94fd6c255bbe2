use crate::config::EndpointKey;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// What a reference path points at inside a middleware entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceTarget {
    /// The whole entry. Only meaningful for structured `$ref` entries.
    Entry,
    EndpointValue(String),
    EndpointPublicUrl(String),
    ConfigField(String),
}

/// A parsed `components.<c>.middlewareDependencies.<m>[...]` path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferencePath {
    pub component: String,
    pub middleware: String,
    pub target: ReferenceTarget,
}

impl ReferencePath {
    pub fn entry(component: impl Into<String>, middleware: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            middleware: middleware.into(),
            target: ReferenceTarget::Entry,
        }
    }

    pub fn endpoint(
        component: impl Into<String>,
        middleware: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            middleware: middleware.into(),
            target: ReferenceTarget::EndpointValue(endpoint.into()),
        }
    }

    pub fn config_field(
        component: impl Into<String>,
        middleware: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            middleware: middleware.into(),
            target: ReferenceTarget::ConfigField(field.into()),
        }
    }

    /// The endpoint this path reads from, if it reads from one.
    pub fn endpoint_key(&self) -> Option<EndpointKey> {
        match &self.target {
            ReferenceTarget::EndpointValue(e) | ReferenceTarget::EndpointPublicUrl(e) => {
                Some(EndpointKey {
                    component: self.component.clone(),
                    middleware: Some(self.middleware.clone()),
                    endpoint: e.clone(),
                })
            }
            _ => None,
        }
    }
}

impl FromStr for ReferencePath {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidReferencePath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = raw.trim().split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty path segment"));
        }
        if parts.len() < 4 || parts[0] != "components" || parts[2] != "middlewareDependencies" {
            return Err(invalid(
                "expected components.<component>.middlewareDependencies.<middleware>",
            ));
        }

        let target = match &parts[4..] {
            [] => ReferenceTarget::Entry,
            ["endpoint"] => ReferenceTarget::EndpointValue("main".to_string()),
            ["endpoints", name, "value"] => ReferenceTarget::EndpointValue(name.to_string()),
            ["endpoints", name, "publicUrl"] => {
                ReferenceTarget::EndpointPublicUrl(name.to_string())
            }
            ["config", field] => ReferenceTarget::ConfigField(field.to_string()),
            _ => {
                return Err(invalid(
                    "must end in .endpoint, .endpoints.<name>.value, .endpoints.<name>.publicUrl or .config.<field>",
                ))
            }
        };

        Ok(Self {
            component: parts[1].to_string(),
            middleware: parts[3].to_string(),
            target,
        })
    }
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "components.{}.middlewareDependencies.{}",
            self.component, self.middleware
        )?;
        match &self.target {
            ReferenceTarget::Entry => Ok(()),
            ReferenceTarget::EndpointValue(e) => write!(f, ".endpoints.{}.value", e),
            ReferenceTarget::EndpointPublicUrl(e) => write!(f, ".endpoints.{}.publicUrl", e),
            ReferenceTarget::ConfigField(field) => write!(f, ".config.{}", field),
        }
    }
}
