use crate::port::PortMapping;
use std::fmt;

/// Pipeline stages of a deploy run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    LoadAndValidate,
    ProvisionCloudDependencies,
    ValidateCloudDependencyReadiness,
    FillContainerEndpoints,
    GenerateArtifacts,
    Apply,
    SyncDiscoveredValuesFromApply,
    RegenerateArtifacts,
    ReApply,
    SetupLocalPortForwarding,
    PersistHostView,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::LoadAndValidate => "LoadAndValidate",
            Stage::ProvisionCloudDependencies => "ProvisionCloudDependencies",
            Stage::ValidateCloudDependencyReadiness => "ValidateCloudDependencyReadiness",
            Stage::FillContainerEndpoints => "FillContainerEndpoints",
            Stage::GenerateArtifacts => "GenerateArtifacts",
            Stage::Apply => "Apply",
            Stage::SyncDiscoveredValuesFromApply => "SyncDiscoveredValuesFromApply",
            Stage::RegenerateArtifacts => "RegenerateArtifacts",
            Stage::ReApply => "ReApply",
            Stage::SetupLocalPortForwarding => "SetupLocalPortForwarding",
            Stage::PersistHostView => "PersistHostView",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Tear down an existing deployment in the namespace instead of aborting.
    pub force: bool,
    /// Stop after artifact generation and return the engine's plan.
    pub plan_only: bool,
}

/// What a deploy run did.
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub stages_completed: Vec<Stage>,
    /// Full applies of the artifact set; targeted cloud applies are not counted.
    pub apply_count: u32,
    /// Discovered values that differed from the persisted configuration.
    pub discovered_changes: usize,
    pub port_mapping: Option<PortMapping>,
    pub plan: Option<String>,
}

impl DeployReport {
    pub(crate) fn complete(&mut self, stage: Stage) {
        tracing::debug!("Stage {} complete", stage);
        self.stages_completed.push(stage);
    }

    pub fn reached(&self, stage: Stage) -> bool {
        self.stages_completed.contains(&stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered_like_the_pipeline() {
        assert!(Stage::LoadAndValidate < Stage::ProvisionCloudDependencies);
        assert!(Stage::Apply < Stage::SyncDiscoveredValuesFromApply);
        assert!(Stage::ReApply < Stage::SetupLocalPortForwarding);
        assert_eq!(Stage::ReApply.to_string(), "ReApply");
    }
}
