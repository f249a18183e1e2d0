//! Integration tests for strata_core.

use std::sync::Arc;

use serde_json::json;
use strata_config::{AppConfig, ConfigTree};
use strata_core::{
    construct_stack, AppContext, BaseStack, CoreError, CoreResult, FileParameterStore,
    InMemoryParameterStore, ParameterStore, StackBody,
};
use tempfile::tempdir;

fn config() -> AppConfig {
    AppConfig::from_tree(ConfigTree::new(json!({
        "Project": {
            "Name": "DevSecOps",
            "Stage": "Demo",
            "Account": "123456789012",
            "Region": "ap-northeast-2"
        },
        "Stack": {
            "Producer": {"Name": "ProducerStack"},
            "Consumer": {"Name": "ConsumerStack"},
            "Failing": {"Name": "FailingStack"}
        }
    })))
    .unwrap()
}

struct Producer {
    value: String,
}

impl StackBody for Producer {
    type Error = CoreError;

    fn build(&mut self, stack: &mut BaseStack<'_>) -> CoreResult<()> {
        stack.put_variable("Endpoint", "first");
        stack.put_variable("Endpoint", self.value.clone());
        stack.export_output("Endpoint", self.value.clone())?;
        Ok(())
    }
}

#[derive(Default)]
struct Consumer {
    seen_variable: Option<String>,
    seen_parameter: Option<String>,
}

impl StackBody for Consumer {
    type Error = CoreError;

    fn build(&mut self, stack: &mut BaseStack<'_>) -> CoreResult<()> {
        self.seen_variable = Some(stack.get_qualified_variable("DevSecOpsDemo-ProducerStack/Endpoint")?);
        self.seen_parameter = Some(stack.get_parameter("DevSecOpsDemo-ProducerStack-Endpoint")?);
        Ok(())
    }
}

struct Failing;

impl StackBody for Failing {
    type Error = CoreError;

    fn build(&mut self, stack: &mut BaseStack<'_>) -> CoreResult<()> {
        stack.put_variable("Half", "written");
        stack.config().require_str("DoesNotExist")?;
        Ok(())
    }
}

#[test]
fn test_later_stack_sees_last_written_value() {
    let mut ctx = AppContext::new(config(), Arc::new(InMemoryParameterStore::new()));

    construct_stack(&mut ctx, "Producer", &mut Producer { value: "http://sonar:9000".into() }).unwrap();

    let mut consumer = Consumer::default();
    construct_stack(&mut ctx, "Consumer", &mut consumer).unwrap();

    assert_eq!(consumer.seen_variable.as_deref(), Some("http://sonar:9000"));
    assert_eq!(consumer.seen_parameter.as_deref(), Some("http://sonar:9000"));
}

#[test]
fn test_reading_before_producer_fails() {
    let mut ctx = AppContext::new(config(), Arc::new(InMemoryParameterStore::new()));

    let err = construct_stack(&mut ctx, "Consumer", &mut Consumer::default()).unwrap_err();
    assert!(matches!(err, CoreError::UnresolvedVariable(ref k) if k == "DevSecOpsDemo-ProducerStack/Endpoint"));
    assert!(ctx.stacks().is_empty());
}

#[test]
fn test_failed_stack_registers_nothing() {
    let mut ctx = AppContext::new(config(), Arc::new(InMemoryParameterStore::new()));

    let err = construct_stack(&mut ctx, "Failing", &mut Failing).unwrap_err();
    assert!(matches!(err, CoreError::Config(_)));
    assert!(ctx.stacks().is_empty());
    assert!(ctx.variables().is_empty());
}

#[test]
fn test_duplicate_stack_rejected() {
    let mut ctx = AppContext::new(config(), Arc::new(InMemoryParameterStore::new()));
    let mut producer = Producer { value: "v".into() };

    construct_stack(&mut ctx, "Producer", &mut producer).unwrap();
    let err = construct_stack(&mut ctx, "Producer", &mut producer).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateStack(_)));
    assert_eq!(ctx.stacks().len(), 1);
}

#[test]
fn test_values_cross_runs_through_file_store() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("parameters.json");

    {
        let store = Arc::new(FileParameterStore::new(&store_path));
        let mut ctx = AppContext::new(config(), store);
        construct_stack(&mut ctx, "Producer", &mut Producer { value: "v1".into() }).unwrap();
        ctx.synthesize(&dir.path().join("out")).unwrap();
    }

    let store = Arc::new(FileParameterStore::new(&store_path));
    assert_eq!(
        store.get("DevSecOpsDemo-ProducerStack-Endpoint").unwrap(),
        Some("v1".to_string())
    );

    let mut ctx = AppContext::new(config(), store);
    let mut consumer = Consumer::default();
    construct_stack(&mut ctx, "Consumer", &mut consumer).unwrap();
    assert_eq!(consumer.seen_parameter.as_deref(), Some("v1"));
}

#[test]
fn test_export_declares_output() {
    let mut ctx = AppContext::new(config(), Arc::new(InMemoryParameterStore::new()));
    construct_stack(&mut ctx, "Producer", &mut Producer { value: "v".into() }).unwrap();

    let template = ctx.stack("DevSecOpsDemo-ProducerStack").unwrap().template().unwrap();
    assert_eq!(
        template["Outputs"]["Endpoint"]["Export"]["Name"],
        json!("DevSecOpsDemo-ProducerStack-Endpoint")
    );
    assert_eq!(template["Outputs"]["Endpoint"]["Value"], json!("v"));
}
