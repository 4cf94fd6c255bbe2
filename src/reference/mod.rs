//! Cross-component references.
//!
//! Two syntaxes exist at the manifest boundary:
//!
//! - inline tokens, `"${ref:components.main.middlewareDependencies.mainDb.endpoint}"`,
//!   allowed inside any string value;
//! - structured entries, `{ "$ref": "components.main.middlewareDependencies.mainDb" }`,
//!   which clone a whole middleware entry.
//!
//! Internally both parse to [`ReferencePath`].

mod entry;
mod path;
mod resolver;

pub use entry::expand_structured_references;
pub use path::{ReferencePath, ReferenceTarget};
pub use resolver::{
    blank_unresolved, contains_reference, ArtifactHandle, RefMap, Reference, ReferenceKind, ReferenceResolver,
};

use crate::config::{ResolvedConfiguration, ValidationIssue};

/// Reference problems that can be detected before anything is provisioned.
///
/// Targets whose endpoint value is only known later are not reported.
pub fn check_references(config: &ResolvedConfiguration) -> Vec<ValidationIssue> {
    let mut scratch = config.clone();
    let mut issues = ReferenceResolver::lenient().resolve_collecting(&mut scratch);
    let (_, dependency_issues) = RefMap::build(config, false);
    issues.extend(dependency_issues);
    issues
}
