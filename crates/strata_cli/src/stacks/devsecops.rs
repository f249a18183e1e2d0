//! Static analysis pipeline.
//!
//! Declares a build project that scans the repository published by the
//! repository stack against the analysis service, and an event rule that
//! starts it on every commit to the tracked branch. The same pipeline can
//! be attached to any repository through [`declare_scan_pipeline`].

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use strata_core::{BaseStack, CoreError, CoreResult, Resource, StackBody};

use super::repo::REPO_PARAMETER;
use super::sonarqube::ENDPOINT_PARAMETER;

const SCAN_COMMAND: &str = "npx sonarqube-scanner -Dsonar.projectKey=$SONAR_PROJECT_KEY -Dsonar.sources=. \
-Dsonar.host.url=$SONAR_HOST -Dsonar.login=$SONAR_TOKEN";
const BUILD_IMAGE: &str = "aws/codebuild/standard:5.0";
const DEFAULT_BRANCH: &str = "master";

pub(crate) const SCAN_SETTINGS_FIELD: &str = "SonarQube";

/// The `SonarQube` mapping of the stack configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScanSettings {
    #[serde(rename = "SONAR_PROJECT_KEY")]
    pub project_key: String,
    /// Secrets Manager reference of the analysis token.
    #[serde(rename = "SONAR_TOKEN_ARN")]
    pub token_arn: String,
    #[serde(rename = "Branch", default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

#[derive(Debug, Default)]
pub struct DevSecOpsStack;

impl StackBody for DevSecOpsStack {
    type Error = CoreError;

    fn build(&mut self, stack: &mut BaseStack<'_>) -> CoreResult<()> {
        let settings: ScanSettings = stack.config().require(SCAN_SETTINGS_FIELD)?;
        let prefix = stack.context().project_prefix();
        let repo_name = stack.get_parameter(&format!("{}-{}", prefix, REPO_PARAMETER))?;
        let sonar_host = stack.get_parameter(&format!("{}-{}", prefix, ENDPOINT_PARAMETER))?;

        declare_scan_pipeline(stack, &settings, &repo_name, &sonar_host)
    }
}

/// Declare a build project scanning `repo_name` against `sonar_host`, and
/// the rule starting it on every commit to the tracked branch.
pub(crate) fn declare_scan_pipeline(
    stack: &mut BaseStack<'_>,
    settings: &ScanSettings,
    repo_name: &str,
    sonar_host: &str,
) -> CoreResult<()> {
    let env = stack.environment().clone();
    let repo_arn = format!("arn:aws:codecommit:{}:{}:{}", env.region, env.account, repo_name);
    let clone_url = format!("https://git-codecommit.{}.amazonaws.com/v1/repos/{}", env.region, repo_name);
    let stack_name = stack.canonical_name().to_string();
    let scan_id = format!("{}ScanBuild", stack_name);

    let build_role = stack.declare(
        &[scan_id.as_str(), "Role"],
        Resource::new("AWS::IAM::Role")
            .property("AssumeRolePolicyDocument", assume_role("codebuild.amazonaws.com"))
            .property(
                "Policies",
                json!([{
                    "PolicyName": "ScanBuild",
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [
                            {
                                "Effect": "Allow",
                                "Action": ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
                                "Resource": format!(
                                    "arn:aws:logs:{}:{}:log-group:/aws/codebuild/*",
                                    env.region, env.account
                                )
                            },
                            { "Effect": "Allow", "Action": "codecommit:GitPull", "Resource": repo_arn },
                            {
                                "Effect": "Allow",
                                "Action": "secretsmanager:GetSecretValue",
                                "Resource": settings.token_arn
                            }
                        ]
                    }
                }]),
            ),
    )?;

    let buildspec = json!({
        "version": "0.2",
        "phases": { "build": { "commands": [SCAN_COMMAND] } }
    });

    let project = stack.declare(
        &[scan_id.as_str()],
        Resource::new("AWS::CodeBuild::Project")
            .property("Name", json!(format!("{}Scan", stack_name)))
            .property("ServiceRole", json!({ "Fn::GetAtt": [build_role, "Arn"] }))
            .property(
                "Source",
                json!({
                    "Type": "CODECOMMIT",
                    "Location": clone_url,
                    "BuildSpec": serde_json::to_string_pretty(&buildspec)?
                }),
            )
            .property("SourceVersion", json!(format!("refs/heads/{}", settings.branch)))
            .property("Artifacts", json!({ "Type": "NO_ARTIFACTS" }))
            .property(
                "Environment",
                json!({
                    "Type": "LINUX_CONTAINER",
                    "Image": BUILD_IMAGE,
                    "ComputeType": "BUILD_GENERAL1_SMALL",
                    "PrivilegedMode": true,
                    "ImagePullCredentialsType": "CODEBUILD",
                    "EnvironmentVariables": [
                        { "Name": "SONAR_HOST", "Type": "PLAINTEXT", "Value": sonar_host },
                        { "Name": "SONAR_PROJECT_KEY", "Type": "PLAINTEXT", "Value": settings.project_key },
                        { "Name": "SONAR_TOKEN", "Type": "SECRETS_MANAGER", "Value": settings.token_arn }
                    ]
                }),
            ),
    )?;

    let events_role = stack.declare(
        &[scan_id.as_str(), "EventsRole"],
        Resource::new("AWS::IAM::Role")
            .property("AssumeRolePolicyDocument", assume_role("events.amazonaws.com"))
            .property(
                "Policies",
                json!([{
                    "PolicyName": "StartScanBuild",
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Effect": "Allow",
                            "Action": "codebuild:StartBuild",
                            "Resource": { "Fn::GetAtt": [project, "Arn"] }
                        }]
                    }
                }]),
            ),
    )?;

    stack.declare(
        &["CodeCommit-Repository", "onCommit"],
        Resource::new("AWS::Events::Rule")
            .property("State", json!("ENABLED"))
            .property(
                "EventPattern",
                json!({
                    "source": ["aws.codecommit"],
                    "resources": [repo_arn],
                    "detail-type": ["CodeCommit Repository State Change"],
                    "detail": {
                        "event": ["referenceCreated", "referenceUpdated"],
                        "referenceName": [settings.branch]
                    }
                }),
            )
            .property(
                "Targets",
                json!([{
                    "Id": "Target0",
                    "Arn": { "Fn::GetAtt": [project, "Arn"] },
                    "RoleArn": { "Fn::GetAtt": [events_role, "Arn"] }
                }]),
            ),
    )?;

    info!(
        "{}: scan project {}Scan on {}@{} against {}",
        stack_name, stack_name, repo_name, settings.branch, sonar_host
    );
    Ok(())
}

fn assume_role(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole"
        }]
    })
}
