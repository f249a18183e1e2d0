//! Source repository stack.

use serde_json::json;
use tracing::info;

use strata_core::{BaseStack, CoreError, CoreResult, Resource, StackBody};

/// Project parameter holding the repository name.
pub const REPO_PARAMETER: &str = "repo";

pub(crate) const REPO_NAME_FIELD: &str = "RepoName";

/// Declares the repository named by `RepoName` and publishes it as the
/// project parameter `repo`.
#[derive(Debug, Default)]
pub struct RepoStack;

impl StackBody for RepoStack {
    type Error = CoreError;

    fn build(&mut self, stack: &mut BaseStack<'_>) -> CoreResult<()> {
        let repo_name = stack.config().require_str(REPO_NAME_FIELD)?.to_string();
        let description = format!("Source repository of {}", stack.context().project_prefix());

        let repository = stack.declare(
            &[repo_name.as_str(), "Repository"],
            Resource::new("AWS::CodeCommit::Repository")
                .property("RepositoryName", json!(repo_name))
                .property("RepositoryDescription", json!(description)),
        )?;

        let arn = stack.token(&repository, "Arn");
        stack.put_variable("RepositoryArn", arn);
        let key = stack.put_parameter(REPO_PARAMETER, repo_name.clone())?;

        info!("{}: repository {} published as {}", stack.canonical_name(), repo_name, key);
        Ok(())
    }
}
