//! Integration tests for network stacks.

use std::sync::Arc;

use serde_json::{json, Value};
use strata_config::{AppConfig, ConfigTree};
use strata_core::{construct_stack, AppContext, BaseStack, InMemoryParameterStore};
use strata_iac::{
    create_vpc, IacError, IacResult, IngressSource, NetworkImport, NetworkSizing, NetworkSource,
    SecurityGroupTier, TierRole, TopologyOrigin, VpcNetwork, VpcStack, VpcStackHooks,
};

fn context(stacks: Value) -> AppContext {
    let tree = ConfigTree::new(json!({
        "Project": {
            "Name": "DevSecOps",
            "Stage": "Demo",
            "Account": "123456789012",
            "Region": "ap-northeast-2"
        },
        "Lookups": {
            "Networks": [
                {
                    "VpcId": "vpc-0legacy",
                    "Name": "legacy-net",
                    "Cidr": "10.50.0.0/16",
                    "AvailabilityZones": ["ap-northeast-2a", "ap-northeast-2c"],
                    "NatGateways": 2
                }
            ]
        },
        "Stack": stacks
    }));
    AppContext::new(AppConfig::from_tree(tree).unwrap(), Arc::new(InMemoryParameterStore::new()))
}

struct Hooks {
    source: NetworkSource,
    ready_calls: usize,
    network: Option<VpcNetwork>,
}

impl Hooks {
    fn new(source: NetworkSource) -> Self {
        Self {
            source,
            ready_calls: 0,
            network: None,
        }
    }
}

impl VpcStackHooks for Hooks {
    fn lookup_legacy_network(&mut self, _stack: &BaseStack<'_>) -> IacResult<NetworkSource> {
        Ok(self.source.clone())
    }

    fn on_ready(&mut self, _stack: &mut BaseStack<'_>, network: &VpcNetwork) -> IacResult<()> {
        self.ready_calls += 1;
        self.network = Some(network.clone());
        Ok(())
    }
}

fn security_groups(ctx: &AppContext, stack: &str) -> Vec<Value> {
    let template = ctx.stack(stack).unwrap().template().unwrap();
    template["Resources"]
        .as_object()
        .unwrap()
        .values()
        .filter(|r| r["Type"] == json!("AWS::EC2::SecurityGroup"))
        .cloned()
        .collect()
}

#[test]
fn test_fresh_network_two_zones() {
    let mut ctx = context(json!({
        "VpcInfra": {
            "Name": "VpcInfraStack",
            "VPCName": "MainVPC",
            "VPCMaxAzs": 2,
            "VPCCIDR": "10.0.0.0/16",
            "NATGatewayCount": 1
        }
    }));

    let mut body = VpcStack::new(Hooks::new(NetworkSource::Absent));
    construct_stack(&mut ctx, "VpcInfra", &mut body).unwrap();

    let (hooks, network) = body.into_parts();
    assert_eq!(hooks.ready_calls, 1);
    let network = network.unwrap();
    let topology = &network.topology;

    assert_eq!(topology.origin, TopologyOrigin::Created);
    assert_eq!(topology.name, "DevSecOpsDemo-VpcInfraStack/MainVPC");
    assert_eq!(topology.zone_count(), 2);
    assert_eq!(topology.nat_gateways, 1);
    assert_eq!(topology.tier_names(), vec!["NET", "WAS", "RDS"]);
    for (tier, mask) in [("NET", "/24"), ("WAS", "/20"), ("RDS", "/24")] {
        let subnets = topology.tier(tier);
        assert_eq!(subnets.len(), 2);
        assert!(subnets.iter().all(|s| s.cidr.ends_with(mask)));
    }

    let tiers = &network.tiers;
    assert_eq!(tiers.created_count(), 3);
    assert_eq!(tiers.rule_count(), 5);
    assert!(tiers.web.rules().iter().all(|r| r.source == IngressSource::AnyIpv4));
    assert!(tiers.iter().all(|t| t.group_id().starts_with("${Token[DevSecOpsDemo-VpcInfraStack.")
        && t.group_id().ends_with(".GroupId]}")));

    let template = ctx.stack("DevSecOpsDemo-VpcInfraStack").unwrap().template().unwrap();
    let resources = template["Resources"].as_object().unwrap();
    let count = |ty: &str| resources.values().filter(|r| r["Type"] == json!(ty)).count();
    assert_eq!(count("AWS::EC2::VPC"), 1);
    assert_eq!(count("AWS::EC2::Subnet"), 6);
    assert_eq!(count("AWS::EC2::NatGateway"), 1);
    assert_eq!(count("AWS::EC2::SecurityGroup"), 3);
    assert!(template["Metadata"]["Strata::Network"].is_object());
}

#[test]
fn test_fresh_network_policy_chain() {
    let mut ctx = context(json!({
        "VpcInfra": {
            "Name": "VpcInfraStack",
            "VPCName": "MainVPC",
            "VPCMaxAzs": 2,
            "VPCCIDR": "10.0.0.0/16",
            "NATGatewayCount": 1
        }
    }));
    construct_stack(&mut ctx, "VpcInfra", &mut VpcStack::new(Hooks::new(NetworkSource::Absent))).unwrap();

    let groups = security_groups(&ctx, "DevSecOpsDemo-VpcInfraStack");
    let by_description = |d: &str| {
        groups
            .iter()
            .find(|g| g["Properties"]["GroupDescription"] == json!(d))
            .cloned()
            .unwrap()
    };

    let web = by_description("security group for a web server");
    let ingress = web["Properties"]["SecurityGroupIngress"].as_array().unwrap();
    assert_eq!(ingress.len(), 2);
    assert!(ingress.iter().all(|r| r["CidrIp"] == json!("0.0.0.0/0")));

    let backend = by_description("security group for a backend server");
    let ingress = backend["Properties"]["SecurityGroupIngress"].as_array().unwrap();
    let ports: Vec<u64> = ingress.iter().map(|r| r["FromPort"].as_u64().unwrap()).collect();
    assert_eq!(ports, vec![80, 8080]);
    assert!(ingress.iter().all(|r| r.get("CidrIp").is_none()));
    assert!(ingress.iter().all(|r| r["SourceSecurityGroupId"]["Fn::GetAtt"][1] == json!("GroupId")));

    let database = by_description("security group for a database server");
    let ingress = database["Properties"]["SecurityGroupIngress"].as_array().unwrap();
    assert_eq!(ingress.len(), 1);
    assert_eq!(ingress[0]["FromPort"], json!(3306));
}

#[test]
fn test_import_by_name_with_backend_binding() {
    let mut ctx = context(json!({"App": {"Name": "AppStack"}}));

    let import = NetworkImport::by_name("legacy-net").with_backend_tier("sg-123");
    let mut body = VpcStack::new(Hooks::new(NetworkSource::Import(import)));
    construct_stack(&mut ctx, "App", &mut body).unwrap();

    let network = body.network().unwrap();
    assert_eq!(network.topology.origin, TopologyOrigin::ImportedByName);
    assert_eq!(network.topology.vpc_id, "vpc-0legacy");

    assert_eq!(
        network.tiers.backend,
        SecurityGroupTier::Imported {
            role: TierRole::Backend,
            group_id: "sg-123".to_string()
        }
    );
    assert!(network.tiers.backend.rules().is_empty());
    assert!(!network.tiers.web.is_imported());
    assert!(!network.tiers.database.is_imported());
    assert_eq!(network.tiers.created_count(), 2);

    let groups = security_groups(&ctx, "DevSecOpsDemo-AppStack");
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g["Properties"]["VpcId"] == json!("vpc-0legacy")));

    let database = groups
        .iter()
        .find(|g| g["Properties"]["GroupDescription"] == json!("security group for a database server"))
        .unwrap();
    assert_eq!(
        database["Properties"]["SecurityGroupIngress"][0]["SourceSecurityGroupId"],
        json!("sg-123")
    );

    let template = ctx.stack("DevSecOpsDemo-AppStack").unwrap().template().unwrap();
    assert!(template.get("Metadata").is_none());
}

#[test]
fn test_import_with_all_tiers_adds_no_rules() {
    let mut ctx = context(json!({"App": {"Name": "AppStack"}}));

    let import = NetworkImport::by_id("vpc-0legacy")
        .with_web_tier("sg-1")
        .with_backend_tier("sg-2")
        .with_database_tier("sg-3");
    let mut body = VpcStack::new(Hooks::new(NetworkSource::Import(import)));
    construct_stack(&mut ctx, "App", &mut body).unwrap();

    let network = body.network().unwrap();
    assert_eq!(network.topology.origin, TopologyOrigin::ImportedById);
    assert_eq!(network.tiers.created_count(), 0);
    assert_eq!(network.tiers.rule_count(), 0);
    assert!(security_groups(&ctx, "DevSecOpsDemo-AppStack").is_empty());
}

#[test]
fn test_import_of_network_created_earlier_in_run() {
    let mut ctx = context(json!({
        "VpcInfra": {
            "Name": "VpcInfraStack",
            "VPCName": "MainVPC",
            "VPCMaxAzs": 2,
            "VPCCIDR": "10.0.0.0/16",
            "NATGatewayCount": 1
        },
        "App": {"Name": "AppStack"}
    }));
    construct_stack(&mut ctx, "VpcInfra", &mut VpcStack::new(Hooks::new(NetworkSource::Absent))).unwrap();

    let import = NetworkImport::by_name("DevSecOpsDemo-VpcInfraStack/MainVPC");
    let mut body = VpcStack::new(Hooks::new(NetworkSource::Import(import)));
    construct_stack(&mut ctx, "App", &mut body).unwrap();

    let topology = &body.network().unwrap().topology;
    assert_eq!(topology.origin, TopologyOrigin::ImportedByName);
    assert_eq!(topology.zone_count(), 2);
    assert!(topology.vpc_id.starts_with("${Token[DevSecOpsDemo-VpcInfraStack."));

    let groups = security_groups(&ctx, "DevSecOpsDemo-AppStack");
    assert!(groups.iter().all(|g| g["Properties"]["VpcId"] == json!(topology.vpc_id)));
}

#[test]
fn test_unknown_network_fails() {
    let mut ctx = context(json!({"App": {"Name": "AppStack"}}));
    let mut body = VpcStack::new(Hooks::new(NetworkSource::Import(NetworkImport::by_name("nope"))));

    let err = construct_stack(&mut ctx, "App", &mut body).unwrap_err();
    assert!(matches!(err, IacError::NetworkNotFound(_)));
    assert_eq!(body.hooks().ready_calls, 0);
    assert!(ctx.stacks().is_empty());
}

#[test]
fn test_ambiguous_import_fails_stack() {
    let mut ctx = context(json!({"App": {"Name": "AppStack"}}));
    let import = NetworkImport {
        vpc_id: Some("vpc-0legacy".into()),
        vpc_name: Some("legacy-net".into()),
        ..NetworkImport::default()
    };
    let mut body = VpcStack::new(Hooks::new(NetworkSource::Import(import)));

    let err = construct_stack(&mut ctx, "App", &mut body).unwrap_err();
    assert!(matches!(err, IacError::AmbiguousImport(_)));
    assert!(ctx.stacks().is_empty());
}

#[test]
fn test_zero_zones_is_fatal_and_declares_nothing() {
    let ctx = context(json!({"VpcInfra": {"Name": "VpcInfraStack"}}));
    let mut stack = BaseStack::new(&ctx, ctx.stack_config("VpcInfra").unwrap()).unwrap();

    let err = create_vpc(&mut stack, &NetworkSizing::new("MainVPC", 0, "10.0.0.0/16", 1)).unwrap_err();
    assert!(matches!(err, IacError::FatalTopology(_)));

    let err = create_vpc(&mut stack, &NetworkSizing::new("MainVPC", 2, "", 1)).unwrap_err();
    assert!(matches!(err, IacError::FatalTopology(_)));

    assert_eq!(stack.graph().resource_count(), 0);
}

#[test]
fn test_fatal_sizing_registers_no_stack() {
    let mut ctx = context(json!({
        "VpcInfra": {
            "Name": "VpcInfraStack",
            "VPCName": "MainVPC",
            "VPCMaxAzs": 0,
            "VPCCIDR": "10.0.0.0/16",
            "NATGatewayCount": 1
        }
    }));
    let mut body = VpcStack::new(Hooks::new(NetworkSource::Absent));

    let err = construct_stack(&mut ctx, "VpcInfra", &mut body).unwrap_err();
    assert!(matches!(err, IacError::FatalTopology(_)));
    assert!(ctx.stacks().is_empty());
    assert_eq!(body.hooks().ready_calls, 0);
}

#[test]
fn test_missing_sizing_field_is_config_error() {
    let mut ctx = context(json!({
        "VpcInfra": {"Name": "VpcInfraStack", "VPCName": "MainVPC", "VPCMaxAzs": 2}
    }));
    let mut body = VpcStack::new(Hooks::new(NetworkSource::Absent));

    let err = construct_stack(&mut ctx, "VpcInfra", &mut body).unwrap_err();
    assert!(matches!(err, IacError::Config(_)));
}

#[test]
fn test_zero_nat_gateways_accepted() {
    let mut ctx = context(json!({
        "VpcInfra": {
            "Name": "VpcInfraStack",
            "VPCName": "MainVPC",
            "VPCMaxAzs": 1,
            "VPCCIDR": "10.0.0.0/16",
            "NATGatewayCount": 0
        }
    }));
    let mut body = VpcStack::new(Hooks::new(NetworkSource::Absent));
    construct_stack(&mut ctx, "VpcInfra", &mut body).unwrap();
    assert_eq!(body.network().unwrap().topology.nat_gateways, 0);
}
