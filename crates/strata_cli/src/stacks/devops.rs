//! Infrastructure code repository.
//!
//! Declares the repository `<prefix>-cdk` holding the project's own
//! infrastructure code. With a `SonarQube` mapping, commits to it are
//! scanned like the application repository.

use serde_json::json;
use tracing::info;

use strata_core::{BaseStack, CoreError, CoreResult, Resource, StackBody};

use super::devsecops::{declare_scan_pipeline, ScanSettings, SCAN_SETTINGS_FIELD};
use super::sonarqube::ENDPOINT_PARAMETER;

const REPO_SUFFIX: &str = "cdk";

#[derive(Debug, Default)]
pub struct DevOpsStack;

impl DevOpsStack {
    /// Name of the repository declared for `prefix`.
    pub fn repository_name(prefix: &str) -> String {
        format!("{}-{}", prefix, REPO_SUFFIX)
    }
}

impl StackBody for DevOpsStack {
    type Error = CoreError;

    fn build(&mut self, stack: &mut BaseStack<'_>) -> CoreResult<()> {
        let prefix = stack.context().project_prefix();
        let repo_name = Self::repository_name(&prefix);
        let settings: Option<ScanSettings> = stack.config().deserialize(SCAN_SETTINGS_FIELD)?;

        let repository = stack.declare(
            &["cdk-git"],
            Resource::new("AWS::CodeCommit::Repository")
                .property("RepositoryName", json!(repo_name))
                .property("RepositoryDescription", json!(format!("Infrastructure code of {}", prefix))),
        )?;
        let arn = stack.token(&repository, "Arn");
        stack.put_variable("RepositoryArn", arn);

        match settings {
            Some(settings) => {
                let sonar_host = stack.get_parameter(&format!("{}-{}", prefix, ENDPOINT_PARAMETER))?;
                declare_scan_pipeline(stack, &settings, &repo_name, &sonar_host)?;
            }
            None => info!("{}: no SonarQube mapping, {} is not scanned", stack.canonical_name(), repo_name),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_name() {
        assert_eq!(DevOpsStack::repository_name("DevSecOpsDemo"), "DevSecOpsDemo-cdk");
    }
}
