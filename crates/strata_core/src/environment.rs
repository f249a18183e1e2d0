//! Deployment target identity.

use serde::{Deserialize, Serialize};

use strata_config::ProjectConfig;

/// Account and region a stack is deployed into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentEnvironment {
    pub account: String,
    pub region: String,
}

impl DeploymentEnvironment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    /// Environment derived from the project section.
    pub fn from_project(project: &ProjectConfig) -> Self {
        Self::new(&project.account, &project.region)
    }

    /// Same account, different region.
    pub fn with_region(&self, region: impl Into<String>) -> Self {
        Self::new(&self.account, region)
    }
}

impl std::fmt::Display for DeploymentEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "aws://{}/{}", self.account, self.region)
    }
}
