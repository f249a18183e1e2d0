//! Integration tests for template inclusion stacks.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use strata_config::{AppConfig, ConfigTree};
use strata_core::{construct_stack, AppContext, BaseStack, CoreError, InMemoryParameterStore, Resource};
use strata_iac::{
    IacError, IacResult, IncludedTemplate, TemplateDescriptor, TemplateSource, TemplateStack, TemplateStackHooks,
};
use tempfile::{tempdir, TempDir};

const YAML_TEMPLATE: &str = r#"
AWSTemplateFormatVersion: "2010-09-09"
Description: Shared bucket
Parameters:
  Env:
    Type: String
    Default: dev
  Retention:
    Type: Number
    Default: 7
Conditions:
  IsProd: !Equals [ !Ref Env, prod ]
Resources:
  Bucket:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: !Sub "${AWS::StackName}-${Env}"
  Topic:
    Type: AWS::SNS::Topic
    Condition: IsProd
    DependsOn: Bucket
Outputs:
  BucketArn:
    Value: !GetAtt Bucket.Arn
    Export:
      Name: !Sub "${AWS::StackName}-BucketArn"
"#;

fn context() -> AppContext {
    let tree = ConfigTree::new(json!({
        "Project": {"Name": "DevSecOps", "Stage": "Demo", "Account": "1", "Region": "ap-northeast-2"},
        "Stack": {"Template": {"Name": "TemplateStack"}}
    }));
    AppContext::new(AppConfig::from_tree(tree).unwrap(), Arc::new(InMemoryParameterStore::new()))
}

fn write_template(name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    (dir, path)
}

struct Hooks {
    source: TemplateSource,
    ready_calls: usize,
    saw_template: Option<bool>,
    extra_resource: bool,
}

impl Hooks {
    fn new(source: TemplateSource) -> Self {
        Self {
            source,
            ready_calls: 0,
            saw_template: None,
            extra_resource: false,
        }
    }
}

impl TemplateStackHooks for Hooks {
    fn load_template_descriptor(&mut self, _stack: &BaseStack<'_>) -> IacResult<TemplateSource> {
        Ok(self.source.clone())
    }

    fn on_ready(&mut self, stack: &mut BaseStack<'_>, template: Option<&IncludedTemplate>) -> IacResult<()> {
        self.ready_calls += 1;
        self.saw_template = Some(template.is_some());

        if self.extra_resource {
            if let Some(template) = template {
                let bucket = template.resource("Bucket").map(|_| "Bucket").unwrap_or_default();
                stack.declare_as(
                    "BucketPolicy",
                    Resource::new("AWS::S3::BucketPolicy").property("Bucket", json!({ "Ref": bucket })),
                )?;
            }
        }
        Ok(())
    }
}

#[test]
fn test_absent_template_still_runs_on_ready() {
    let mut ctx = context();
    let mut body = TemplateStack::new(Hooks::new(TemplateSource::Absent));
    construct_stack(&mut ctx, "Template", &mut body).unwrap();

    assert_eq!(body.hooks().ready_calls, 1);
    assert_eq!(body.hooks().saw_template, Some(false));
    assert!(body.included().is_none());
    assert_eq!(ctx.stacks()[0].graph().resource_count(), 0);
}

#[test]
fn test_yaml_template_merged_with_overrides() {
    let (_dir, path) = write_template("bucket.yaml", YAML_TEMPLATE);
    let descriptor = TemplateDescriptor::new(&path)
        .parameter("Env", "prod")
        .parameter("Retention", 30);

    let mut hooks = Hooks::new(TemplateSource::Include(descriptor));
    hooks.extra_resource = true;
    let mut body = TemplateStack::new(hooks);
    let mut ctx = context();
    construct_stack(&mut ctx, "Template", &mut body).unwrap();

    let included = body.included().unwrap();
    assert_eq!(included.parameter("Env").unwrap()["Default"], json!("prod"));
    assert_eq!(included.parameter("Retention").unwrap()["Default"], json!(30));
    assert_eq!(included.resource_count(), 2);

    let template = ctx.stack("DevSecOpsDemo-TemplateStack").unwrap().template().unwrap();
    assert_eq!(template["Description"], json!("Shared bucket"));
    assert_eq!(template["Parameters"]["Env"]["Default"], json!("prod"));
    assert_eq!(
        template["Conditions"]["IsProd"],
        json!({"Fn::Equals": [{"Ref": "Env"}, "prod"]})
    );
    assert_eq!(
        template["Resources"]["Bucket"]["Properties"]["BucketName"],
        json!({"Fn::Sub": "${AWS::StackName}-${Env}"})
    );
    assert_eq!(template["Resources"]["Topic"]["Condition"], json!("IsProd"));
    assert_eq!(template["Resources"]["Topic"]["DependsOn"], json!(["Bucket"]));
    assert_eq!(
        template["Outputs"]["BucketArn"]["Value"],
        json!({"Fn::GetAtt": ["Bucket", "Arn"]})
    );
    assert_eq!(
        template["Resources"]["BucketPolicy"]["Properties"]["Bucket"],
        json!({"Ref": "Bucket"})
    );
}

#[test]
fn test_json_template() {
    let (_dir, path) = write_template(
        "queue.json",
        r#"{"Parameters": {"Name": {"Type": "String"}}, "Resources": {"Queue": {"Type": "AWS::SQS::Queue"}}}"#,
    );

    let mut ctx = context();
    let mut body = TemplateStack::new(Hooks::new(TemplateSource::Include(
        TemplateDescriptor::new(&path).parameter("Name", "jobs"),
    )));
    construct_stack(&mut ctx, "Template", &mut body).unwrap();

    let template = ctx.stacks()[0].template().unwrap();
    assert_eq!(template["Resources"]["Queue"]["Type"], json!("AWS::SQS::Queue"));
    assert_eq!(template["Parameters"]["Name"]["Default"], json!("jobs"));
}

#[test]
fn test_unknown_parameter_override_fails() {
    let (_dir, path) = write_template("bucket.yaml", YAML_TEMPLATE);

    let mut ctx = context();
    let mut body = TemplateStack::new(Hooks::new(TemplateSource::Include(
        TemplateDescriptor::new(&path).parameter("Missing", "x"),
    )));
    let err = construct_stack(&mut ctx, "Template", &mut body).unwrap_err();

    assert!(matches!(err, IacError::UnknownTemplateParameter { ref key, .. } if key == "Missing"));
    assert_eq!(body.hooks().ready_calls, 0);
    assert!(ctx.stacks().is_empty());
}

#[test]
fn test_missing_template_file() {
    let mut ctx = context();
    let mut body = TemplateStack::new(Hooks::new(TemplateSource::Include(TemplateDescriptor::new(
        "/nonexistent/template.yaml",
    ))));
    let err = construct_stack(&mut ctx, "Template", &mut body).unwrap_err();
    assert!(matches!(err, IacError::TemplateNotFound(_)));
}

#[test]
fn test_duplicate_logical_id_rejected() {
    let (_dir, path) = write_template("bucket.yaml", YAML_TEMPLATE);

    struct Clashing {
        path: PathBuf,
    }

    impl TemplateStackHooks for Clashing {
        fn load_template_descriptor(&mut self, _stack: &BaseStack<'_>) -> IacResult<TemplateSource> {
            Ok(TemplateSource::Include(TemplateDescriptor::new(&self.path)))
        }

        fn on_ready(&mut self, stack: &mut BaseStack<'_>, _template: Option<&IncludedTemplate>) -> IacResult<()> {
            stack.declare_as("Bucket", Resource::new("AWS::S3::Bucket"))?;
            Ok(())
        }
    }

    let mut ctx = context();
    let err = construct_stack(&mut ctx, "Template", &mut TemplateStack::new(Clashing { path })).unwrap_err();
    assert!(matches!(err, IacError::Core(CoreError::DuplicateLogicalId { .. })));
}
