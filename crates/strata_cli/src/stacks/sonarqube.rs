//! Code analysis service.
//!
//! Runs SonarQube on a container cluster backed by a serverless Aurora
//! PostgreSQL database, inside the network created by the infra stack. The
//! service endpoint is exported and published as the project parameter
//! `SonarqubeAPIEndpoint`.

use serde_json::{json, Value};
use tracing::info;

use strata_config::StackConfig;
use strata_core::{BaseStack, Resource, StackDescriptor};
use strata_iac::{
    IacResult, NetworkImport, NetworkSource, TierRole, VpcNetwork, VpcStackHooks,
};

use super::vpc_infra::VPC_NAME_VARIABLE;

pub const ENDPOINT_PARAMETER: &str = "SonarqubeAPIEndpoint";

const CONSTRUCT_ID: &str = "SonarQube";
const CONTAINER_NAME: &str = "sonarqube";
const CONTAINER_PORT: u16 = 9000;
const DATABASE_PORT: u16 = 5432;
const DATABASE_NAME: &str = "sonarqube";
const DATABASE_USER: &str = "postgres";
const IMAGE_REPOSITORY: &str = "public.ecr.aws/docker/library/sonarqube";
const ANY_IPV4: &str = "0.0.0.0/0";

/// Task sizing and image, from `Cpu`, `MemoryMiB` and `ImageTag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SonarQubeSettings {
    pub cpu: u32,
    pub memory_mib: u32,
    pub image_tag: String,
}

impl Default for SonarQubeSettings {
    fn default() -> Self {
        Self {
            cpu: 1024,
            memory_mib: 2048,
            image_tag: "community".to_string(),
        }
    }
}

impl SonarQubeSettings {
    pub fn from_config(config: &StackConfig) -> IacResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            cpu: config.optional_u32("Cpu")?.unwrap_or(defaults.cpu),
            memory_mib: config.optional_u32("MemoryMiB")?.unwrap_or(defaults.memory_mib),
            image_tag: config
                .optional_str("ImageTag")
                .map(str::to_string)
                .unwrap_or(defaults.image_tag),
        })
    }

    pub fn image(&self) -> String {
        format!("{}:{}", IMAGE_REPOSITORY, self.image_tag)
    }
}

/// Network hooks of the analysis service stack. The network and its tiers
/// are imported from the infra stack.
#[derive(Debug)]
pub struct SonarQubeHooks {
    infra: StackDescriptor,
    endpoint: Option<String>,
}

impl SonarQubeHooks {
    pub fn new(infra: StackDescriptor) -> Self {
        Self { infra, endpoint: None }
    }

    /// Service endpoint, once the stack has been built.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

impl VpcStackHooks for SonarQubeHooks {
    fn lookup_legacy_network(&mut self, stack: &BaseStack<'_>) -> IacResult<NetworkSource> {
        let variable = |name: &str| stack.get_qualified_variable(&self.infra.variable_key(name));

        let import = NetworkImport::by_name(variable(VPC_NAME_VARIABLE)?)
            .with_web_tier(variable(TierRole::Web.binding_id())?)
            .with_backend_tier(variable(TierRole::Backend.binding_id())?)
            .with_database_tier(variable(TierRole::Database.binding_id())?);

        Ok(NetworkSource::Import(import))
    }

    fn on_ready(&mut self, stack: &mut BaseStack<'_>, network: &VpcNetwork) -> IacResult<()> {
        let settings = SonarQubeSettings::from_config(stack.config())?;
        let topology = &network.topology;
        let vpc = topology.vpc_ref(stack.canonical_name());
        let public_subnets = topology.subnet_refs(stack.canonical_name(), "NET")?;
        let private_subnets = topology.subnet_refs(stack.canonical_name(), "WAS")?;
        let region = stack.environment().region.clone();

        let cluster = stack.declare(&[CONSTRUCT_ID, "cluster"], Resource::new("AWS::ECS::Cluster"))?;

        // Database
        let db_sg = stack.declare(
            &[CONSTRUCT_ID, "sonarqube-sg"],
            security_group(
                "Aurora Security Group",
                &vpc,
                vec![json!({
                    "IpProtocol": "tcp",
                    "FromPort": DATABASE_PORT,
                    "ToPort": DATABASE_PORT,
                    "CidrIp": ANY_IPV4,
                    "Description": "SonarDBAurora"
                })],
            ),
        )?;

        let subnet_group = stack.declare(
            &[CONSTRUCT_ID, "aurora-cluster", "Subnets"],
            Resource::new("AWS::RDS::DBSubnetGroup")
                .property("DBSubnetGroupDescription", json!("Subnets for aurora-cluster database"))
                .property("SubnetIds", json!(private_subnets)),
        )?;

        let secret = stack.declare(
            &[CONSTRUCT_ID, "aurora-cluster", "Secret"],
            Resource::new("AWS::SecretsManager::Secret").property(
                "GenerateSecretString",
                json!({
                    "SecretStringTemplate": json!({ "username": DATABASE_USER }).to_string(),
                    "GenerateStringKey": "password",
                    "PasswordLength": 30,
                    "ExcludeCharacters": " %+~`#$&*()|[]{}:;<>?!'/@\"\\"
                }),
            ),
        )?;

        let aurora = stack.declare(
            &[CONSTRUCT_ID, "aurora-cluster"],
            Resource::new("AWS::RDS::DBCluster")
                .property("Engine", json!("aurora-postgresql"))
                .property("EngineMode", json!("serverless"))
                .property("EngineVersion", json!("10.18"))
                .property("DatabaseName", json!(DATABASE_NAME))
                .property("DBSubnetGroupName", json!({ "Ref": subnet_group }))
                .property("VpcSecurityGroupIds", json!([{ "Fn::GetAtt": [db_sg, "GroupId"] }]))
                .property("MasterUsername", secret_field(&secret, "username"))
                .property("MasterUserPassword", secret_field(&secret, "password"))
                .property("StorageEncrypted", json!(true))
                .attribute("DeletionPolicy", json!("Snapshot"))
                .attribute("UpdateReplacePolicy", json!("Snapshot")),
        )?;

        // Task
        let log_group = stack.declare(
            &[CONSTRUCT_ID, "sonarqube-task", "LogGroup"],
            Resource::new("AWS::Logs::LogGroup")
                .attribute("DeletionPolicy", json!("Retain"))
                .attribute("UpdateReplacePolicy", json!("Retain")),
        )?;

        let execution_role = stack.declare(
            &[CONSTRUCT_ID, "sonarqube-task", "ExecutionRole"],
            Resource::new("AWS::IAM::Role")
                .property("AssumeRolePolicyDocument", assume_role("ecs-tasks.amazonaws.com"))
                .property(
                    "ManagedPolicyArns",
                    json!(["arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy"]),
                )
                .property(
                    "Policies",
                    json!([{
                        "PolicyName": "ReadDatabaseSecret",
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [{
                                "Effect": "Allow",
                                "Action": ["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
                                "Resource": { "Ref": secret }
                            }]
                        }
                    }]),
                ),
        )?;

        let task = stack.declare(
            &[CONSTRUCT_ID, "sonarqube-task"],
            Resource::new("AWS::ECS::TaskDefinition")
                .property("RequiresCompatibilities", json!(["EC2", "FARGATE"]))
                .property("NetworkMode", json!("awsvpc"))
                .property("Cpu", json!(settings.cpu.to_string()))
                .property("Memory", json!(settings.memory_mib.to_string()))
                .property("ExecutionRoleArn", json!({ "Fn::GetAtt": [execution_role, "Arn"] }))
                .property(
                    "ContainerDefinitions",
                    json!([{
                        "Name": CONTAINER_NAME,
                        "Image": settings.image(),
                        "Essential": true,
                        "Memory": settings.memory_mib,
                        "Command": ["-Dsonar.search.javaAdditionalOpts=-Dnode.store.allow_mmap=false"],
                        "PortMappings": [{ "ContainerPort": CONTAINER_PORT, "Protocol": "tcp" }],
                        "Ulimits": [{ "Name": "nofile", "SoftLimit": 65536, "HardLimit": 65536 }],
                        "Environment": [{
                            "Name": "sonar.jdbc.url",
                            "Value": { "Fn::Join": ["", [
                                "jdbc:postgresql://",
                                { "Fn::GetAtt": [aurora, "Endpoint.Address"] },
                                ":",
                                { "Fn::GetAtt": [aurora, "Endpoint.Port"] },
                                format!("/{}", DATABASE_NAME)
                            ]] }
                        }],
                        "Secrets": [
                            { "Name": "sonar.jdbc.password", "ValueFrom": secret_arn_field(&secret, "password") },
                            { "Name": "sonar.jdbc.username", "ValueFrom": secret_arn_field(&secret, "username") }
                        ],
                        "LogConfiguration": {
                            "LogDriver": "awslogs",
                            "Options": {
                                "awslogs-group": { "Ref": log_group },
                                "awslogs-stream-prefix": CONTAINER_NAME,
                                "awslogs-region": region
                            }
                        }
                    }]),
                ),
        )?;

        // Load balanced service
        let lb_sg = stack.declare(
            &[CONSTRUCT_ID, "sonarqube-service", "LB", "SecurityGroup"],
            security_group(
                "Load balancer for the SonarQube service",
                &vpc,
                vec![json!({
                    "IpProtocol": "tcp",
                    "FromPort": 80,
                    "ToPort": 80,
                    "CidrIp": ANY_IPV4,
                    "Description": "Allow from anyone on port 80"
                })],
            ),
        )?;

        let service_sg = stack.declare(
            &[CONSTRUCT_ID, "sonarqube-service", "Service", "SecurityGroup"],
            security_group(
                "SonarQube service tasks",
                &vpc,
                vec![json!({
                    "IpProtocol": "tcp",
                    "FromPort": CONTAINER_PORT,
                    "ToPort": CONTAINER_PORT,
                    "SourceSecurityGroupId": { "Fn::GetAtt": [lb_sg, "GroupId"] },
                    "Description": "Load balancer to target"
                })],
            ),
        )?;

        let load_balancer = stack.declare(
            &[CONSTRUCT_ID, "sonarqube-service", "LB"],
            Resource::new("AWS::ElasticLoadBalancingV2::LoadBalancer")
                .property("Type", json!("application"))
                .property("Scheme", json!("internet-facing"))
                .property("Subnets", json!(public_subnets))
                .property("SecurityGroups", json!([{ "Fn::GetAtt": [lb_sg, "GroupId"] }])),
        )?;

        let target_group = stack.declare(
            &[CONSTRUCT_ID, "sonarqube-service", "LB", "PublicListener", "ECSGroup"],
            Resource::new("AWS::ElasticLoadBalancingV2::TargetGroup")
                .property("Port", json!(80))
                .property("Protocol", json!("HTTP"))
                .property("TargetType", json!("ip"))
                .property("VpcId", vpc.clone()),
        )?;

        let listener = stack.declare(
            &[CONSTRUCT_ID, "sonarqube-service", "LB", "PublicListener"],
            Resource::new("AWS::ElasticLoadBalancingV2::Listener")
                .property("LoadBalancerArn", json!({ "Ref": load_balancer }))
                .property("Port", json!(80))
                .property("Protocol", json!("HTTP"))
                .property(
                    "DefaultActions",
                    json!([{ "Type": "forward", "TargetGroupArn": { "Ref": target_group } }]),
                ),
        )?;

        stack.declare(
            &[CONSTRUCT_ID, "sonarqube-service", "Service"],
            Resource::new("AWS::ECS::Service")
                .property("Cluster", json!({ "Ref": cluster }))
                .property("TaskDefinition", json!({ "Ref": task }))
                .property("LaunchType", json!("FARGATE"))
                .property("DesiredCount", json!(1))
                .property(
                    "LoadBalancers",
                    json!([{
                        "ContainerName": CONTAINER_NAME,
                        "ContainerPort": CONTAINER_PORT,
                        "TargetGroupArn": { "Ref": target_group }
                    }]),
                )
                .property(
                    "NetworkConfiguration",
                    json!({
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": "DISABLED",
                            "Subnets": private_subnets,
                            "SecurityGroups": [{ "Fn::GetAtt": [service_sg, "GroupId"] }]
                        }
                    }),
                )
                .depends_on(listener),
        )?;

        let endpoint = format!("http://{}", stack.token(&load_balancer, "DNSName"));
        stack.export_output(ENDPOINT_PARAMETER, endpoint.clone())?;
        stack.put_parameter(ENDPOINT_PARAMETER, endpoint.clone())?;

        info!(
            "{}: SonarQube {} ({} cpu, {} MiB) at {}",
            stack.canonical_name(),
            settings.image(),
            settings.cpu,
            settings.memory_mib,
            endpoint
        );
        self.endpoint = Some(endpoint);
        Ok(())
    }
}

fn security_group(description: &str, vpc: &Value, ingress: Vec<Value>) -> Resource {
    Resource::new("AWS::EC2::SecurityGroup")
        .property("GroupDescription", json!(description))
        .property("VpcId", vpc.clone())
        .property(
            "SecurityGroupEgress",
            json!([{
                "CidrIp": ANY_IPV4,
                "IpProtocol": "-1",
                "Description": "Allow all outbound traffic by default"
            }]),
        )
        .property("SecurityGroupIngress", Value::Array(ingress))
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

fn secret_field(secret: &str, field: &str) -> Value {
    json!({
        "Fn::Join": ["", [
            "{{resolve:secretsmanager:",
            { "Ref": secret },
            format!(":SecretString:{}::}}}}", field)
        ]]
    })
}

fn secret_arn_field(secret: &str, field: &str) -> Value {
    json!({ "Fn::Join": ["", [{ "Ref": secret }, format!(":{}::", field)]] })
}
