//! Network topology: sizing, subnet allocation and fresh VPC declaration.
//!
//! A freshly created network always carries three subnet tiers, one subnet
//! per tier per availability zone:
//!
//! | tier | kind              | mask |
//! |------|-------------------|------|
//! | NET  | public            | /24  |
//! | WAS  | private, NAT      | /20  |
//! | RDS  | private, isolated | /24  |

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use strata_config::StackConfig;
use strata_core::{BaseStack, Resource};

use crate::error::{IacError, IacResult};

/// Metadata key under which a stack records the topology it owns.
pub const NETWORK_METADATA_KEY: &str = "Strata::Network";

/// Configuration fields read by [`NetworkSizing::from_config`].
pub const VPC_NAME_FIELD: &str = "VPCName";
pub const VPC_MAX_AZS_FIELD: &str = "VPCMaxAzs";
pub const VPC_CIDR_FIELD: &str = "VPCCIDR";
pub const NAT_GATEWAY_COUNT_FIELD: &str = "NATGatewayCount";

const MAX_ZONES: u32 = 26;
const MIN_SUBNET_MASK: u8 = 16;
const MAX_SUBNET_MASK: u8 = 28;

/// Routing class of a subnet tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubnetKind {
    Public,
    PrivateWithNat,
    PrivateIsolated,
}

impl SubnetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetKind::Public => "Public",
            SubnetKind::PrivateWithNat => "Private",
            SubnetKind::PrivateIsolated => "Isolated",
        }
    }
}

/// One subnet tier of a fresh network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetTier {
    pub name: &'static str,
    pub kind: SubnetKind,
    pub mask: u8,
}

/// Fixed tiering for every created network, in allocation order.
pub const SUBNET_TIERS: [SubnetTier; 3] = [
    SubnetTier {
        name: "NET",
        kind: SubnetKind::Public,
        mask: 24,
    },
    SubnetTier {
        name: "WAS",
        kind: SubnetKind::PrivateWithNat,
        mask: 20,
    },
    SubnetTier {
        name: "RDS",
        kind: SubnetKind::PrivateIsolated,
        mask: 24,
    },
];

/// Subnet of a topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub tier: String,
    pub kind: SubnetKind,
    pub zone: String,
    pub cidr: String,
    /// Logical id when declared by this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_id: Option<String>,
    /// Physical id, or a token for subnets declared by this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
}

/// How a topology came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyOrigin {
    Created,
    ImportedById,
    ImportedByName,
}

/// A resolved network. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTopology {
    pub name: String,
    pub vpc_id: String,
    pub cidr: String,
    pub zones: Vec<String>,
    pub nat_gateways: u32,
    pub subnets: Vec<Subnet>,
    pub origin: TopologyOrigin,
    /// Owning stack and logical id when created in this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_logical_id: Option<String>,
}

impl NetworkTopology {
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn is_imported(&self) -> bool {
        self.origin != TopologyOrigin::Created
    }

    /// Subnets of one tier, in zone order.
    pub fn tier(&self, name: &str) -> Vec<&Subnet> {
        self.subnets.iter().filter(|s| s.tier == name).collect()
    }

    /// Tier names in declaration order, without duplicates.
    pub fn tier_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for subnet in &self.subnets {
            if !names.contains(&subnet.tier.as_str()) {
                names.push(&subnet.tier);
            }
        }
        names
    }

    /// `SubnetId` references for one tier, usable from within `stack`.
    ///
    /// Fails when the tier has no subnets or a subnet carries no identifier.
    pub fn subnet_refs(&self, stack: &str, tier: &str) -> IacResult<Vec<Value>> {
        let subnets = self.tier(tier);
        if subnets.is_empty() {
            return Err(IacError::NetworkNotFound(format!(
                "network {} has no {} subnets",
                self.name, tier
            )));
        }

        subnets
            .into_iter()
            .map(|subnet| match (&self.owner, &subnet.logical_id, &subnet.subnet_id) {
                (Some(owner), Some(id), _) if owner == stack => Ok(json!({ "Ref": id })),
                (_, _, Some(subnet_id)) => Ok(json!(subnet_id)),
                _ => Err(IacError::NetworkNotFound(format!(
                    "{} subnet of network {} in {} has no SubnetId",
                    tier, self.name, subnet.zone
                ))),
            })
            .collect()
    }

    /// Reference usable as a `VpcId` property from within `stack`.
    pub fn vpc_ref(&self, stack: &str) -> Value {
        match (&self.owner, &self.vpc_logical_id) {
            (Some(owner), Some(id)) if owner == stack => json!({ "Ref": id }),
            _ => json!(self.vpc_id),
        }
    }
}

/// Sizing of a fresh network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSizing {
    pub base_name: String,
    pub zone_count: u32,
    pub cidr: String,
    pub nat_gateways: u32,
}

impl NetworkSizing {
    pub fn new(base_name: impl Into<String>, zone_count: u32, cidr: impl Into<String>, nat_gateways: u32) -> Self {
        Self {
            base_name: base_name.into(),
            zone_count,
            cidr: cidr.into(),
            nat_gateways,
        }
    }

    /// Read `VPCName`, `VPCMaxAzs`, `VPCCIDR` and `NATGatewayCount`.
    /// All four are required.
    pub fn from_config(config: &StackConfig) -> IacResult<Self> {
        Ok(Self {
            base_name: config.require_str(VPC_NAME_FIELD)?.to_string(),
            zone_count: config.require_u32(VPC_MAX_AZS_FIELD)?,
            cidr: config.require_str(VPC_CIDR_FIELD)?.to_string(),
            nat_gateways: config.require_u32(NAT_GATEWAY_COUNT_FIELD)?,
        })
    }

    fn validate(&self) -> IacResult<Ipv4Network> {
        if self.zone_count == 0 || self.cidr.trim().is_empty() {
            return Err(IacError::FatalTopology(format!(
                "{} needs {} > 0 and a non-empty {} (got {} zones, block {:?})",
                self.base_name, VPC_MAX_AZS_FIELD, VPC_CIDR_FIELD, self.zone_count, self.cidr
            )));
        }
        if self.base_name.trim().is_empty() {
            return Err(IacError::FatalTopology(format!("{} must not be empty", VPC_NAME_FIELD)));
        }

        let block = self.cidr.trim().parse::<Ipv4Network>().map_err(|e| {
            IacError::FatalTopology(format!("{} is not an IPv4 address block: {}", self.cidr, e))
        })?;

        // Host bits are dropped.
        Ipv4Network::new(block.network(), block.prefix()).map_err(|e| IacError::FatalTopology(e.to_string()))
    }
}

/// Availability zone names for a region: `<region>a`, `<region>b`, ...
pub fn zone_names(region: &str, count: u32) -> Vec<String> {
    let count = if count > MAX_ZONES {
        warn!("Zone count {} capped at {}", count, MAX_ZONES);
        MAX_ZONES
    } else {
        count
    };

    (0..count)
        .map(|i| format!("{}{}", region, (b'a' + i as u8) as char))
        .collect()
}

/// A planned subnet block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetPlan {
    pub tier: SubnetTier,
    pub zone: String,
    pub cidr: Ipv4Network,
}

/// Allocate one block per tier per zone from `block`.
///
/// Tiers are allocated in order; within a tier, zones in order. Each block
/// starts at the next address aligned to its own size.
pub fn plan_subnets(block: Ipv4Network, tiers: &[SubnetTier], zones: &[String]) -> IacResult<Vec<SubnetPlan>> {
    let start = u64::from(u32::from(block.network()));
    let end = start + (1u64 << (32 - u32::from(block.prefix())));
    let mut next = start;
    let mut plans = Vec::with_capacity(tiers.len() * zones.len());

    for tier in tiers {
        if tier.mask < MIN_SUBNET_MASK || tier.mask > MAX_SUBNET_MASK {
            return Err(IacError::FatalTopology(format!(
                "subnet mask /{} for {} must be between /{} and /{}",
                tier.mask, tier.name, MIN_SUBNET_MASK, MAX_SUBNET_MASK
            )));
        }
        let size = 1u64 << (32 - u32::from(tier.mask));

        for zone in zones {
            let aligned = (next + size - 1) / size * size;
            if aligned + size > end {
                return Err(IacError::FatalTopology(format!(
                    "address block {} is too small for {} /{} subnets in {} zones",
                    block,
                    tier.name,
                    tier.mask,
                    zones.len()
                )));
            }

            let cidr = Ipv4Network::new(Ipv4Addr::from(aligned as u32), tier.mask)
                .map_err(|e| IacError::FatalTopology(e.to_string()))?;
            plans.push(SubnetPlan {
                tier: *tier,
                zone: zone.clone(),
                cidr,
            });
            next = aligned + size;
        }
    }

    Ok(plans)
}

/// Declare a fresh network on `stack`.
///
/// Sizing and allocation are checked before anything is declared, so a
/// failure leaves the stack's graph untouched.
pub fn create_vpc(stack: &mut BaseStack<'_>, sizing: &NetworkSizing) -> IacResult<NetworkTopology> {
    let block = sizing.validate()?;
    let zones = zone_names(&stack.environment().region, sizing.zone_count);
    let plans = plan_subnets(block, &SUBNET_TIERS, &zones)?;

    let nat_count = sizing.nat_gateways.min(zones.len() as u32);
    if sizing.nat_gateways == 0 {
        warn!(
            "{}: no NAT gateways, WAS subnets have no outbound route",
            sizing.base_name
        );
    } else if nat_count < sizing.nat_gateways {
        warn!(
            "{}: {} NAT gateways requested, limited to {} zones",
            sizing.base_name, sizing.nat_gateways, nat_count
        );
    }

    let canonical = stack.canonical_name().to_string();
    let base = sizing.base_name.as_str();
    let name = format!("{}/{}", canonical, base);

    let vpc_id = stack.declare(
        &[base],
        Resource::new("AWS::EC2::VPC")
            .property("CidrBlock", json!(block.to_string()))
            .property("EnableDnsHostnames", json!(true))
            .property("EnableDnsSupport", json!(true))
            .property("InstanceTenancy", json!("default"))
            .property("Tags", name_tag(&name)),
    )?;
    let vpc_ref = json!({ "Ref": vpc_id });

    let igw_id = stack.declare(
        &[base, "IGW"],
        Resource::new("AWS::EC2::InternetGateway").property("Tags", name_tag(&name)),
    )?;
    let attachment_id = stack.declare(
        &[base, "VPCGW"],
        Resource::new("AWS::EC2::VPCGatewayAttachment")
            .property("VpcId", vpc_ref.clone())
            .property("InternetGatewayId", json!({ "Ref": igw_id })),
    )?;

    let mut subnets = Vec::with_capacity(plans.len());
    let mut nat_ids: Vec<String> = Vec::new();
    let mut zone_index = 0usize;
    let mut current_tier = "";

    for plan in &plans {
        if plan.tier.name != current_tier {
            current_tier = plan.tier.name;
            zone_index = 0;
        }
        zone_index += 1;

        let subnet_name = format!("{}Subnet{}", plan.tier.name, zone_index);
        let subnet_path = format!("{}/{}", name, subnet_name);
        let subnet_id = stack.declare(
            &[base, subnet_name.as_str(), "Subnet"],
            Resource::new("AWS::EC2::Subnet")
                .property("VpcId", vpc_ref.clone())
                .property("CidrBlock", json!(plan.cidr.to_string()))
                .property("AvailabilityZone", json!(plan.zone))
                .property("MapPublicIpOnLaunch", json!(plan.tier.kind == SubnetKind::Public))
                .property(
                    "Tags",
                    json!([
                        { "Key": "Name", "Value": subnet_path },
                        { "Key": "strata:subnet-name", "Value": plan.tier.name },
                        { "Key": "strata:subnet-type", "Value": plan.tier.kind.as_str() }
                    ]),
                ),
        )?;

        let table_id = stack.declare(
            &[base, subnet_name.as_str(), "RouteTable"],
            Resource::new("AWS::EC2::RouteTable")
                .property("VpcId", vpc_ref.clone())
                .property("Tags", name_tag(&subnet_path)),
        )?;
        stack.declare(
            &[base, subnet_name.as_str(), "RouteTableAssociation"],
            Resource::new("AWS::EC2::SubnetRouteTableAssociation")
                .property("RouteTableId", json!({ "Ref": table_id }))
                .property("SubnetId", json!({ "Ref": subnet_id })),
        )?;

        match plan.tier.kind {
            SubnetKind::Public => {
                stack.declare(
                    &[base, subnet_name.as_str(), "DefaultRoute"],
                    Resource::new("AWS::EC2::Route")
                        .property("RouteTableId", json!({ "Ref": table_id }))
                        .property("DestinationCidrBlock", json!("0.0.0.0/0"))
                        .property("GatewayId", json!({ "Ref": igw_id }))
                        .depends_on(attachment_id.clone()),
                )?;

                if (nat_ids.len() as u32) < nat_count {
                    let eip_id = stack.declare(
                        &[base, subnet_name.as_str(), "EIP"],
                        Resource::new("AWS::EC2::EIP").property("Domain", json!("vpc")),
                    )?;
                    let nat_id = stack.declare(
                        &[base, subnet_name.as_str(), "NATGateway"],
                        Resource::new("AWS::EC2::NatGateway")
                            .property("SubnetId", json!({ "Ref": subnet_id }))
                            .property("AllocationId", json!({ "Fn::GetAtt": [eip_id, "AllocationId"] }))
                            .property("Tags", name_tag(&subnet_path)),
                    )?;
                    nat_ids.push(nat_id);
                }
            }
            SubnetKind::PrivateWithNat => {
                if !nat_ids.is_empty() {
                    let nat_id = &nat_ids[(zone_index - 1) % nat_ids.len()];
                    stack.declare(
                        &[base, subnet_name.as_str(), "DefaultRoute"],
                        Resource::new("AWS::EC2::Route")
                            .property("RouteTableId", json!({ "Ref": table_id }))
                            .property("DestinationCidrBlock", json!("0.0.0.0/0"))
                            .property("NatGatewayId", json!({ "Ref": nat_id })),
                    )?;
                }
            }
            SubnetKind::PrivateIsolated => {}
        }

        debug!("{}: {} {} in {}", canonical, subnet_name, plan.cidr, plan.zone);
        subnets.push(Subnet {
            tier: plan.tier.name.to_string(),
            kind: plan.tier.kind,
            zone: plan.zone.clone(),
            cidr: plan.cidr.to_string(),
            subnet_id: Some(stack.token(&subnet_id, "SubnetId")),
            logical_id: Some(subnet_id),
        });
    }

    let topology = NetworkTopology {
        vpc_id: stack.token(&vpc_id, "VpcId"),
        name,
        cidr: block.to_string(),
        zones,
        nat_gateways: nat_ids.len() as u32,
        subnets,
        origin: TopologyOrigin::Created,
        owner: Some(canonical),
        vpc_logical_id: Some(vpc_id),
    };

    info!(
        "Created network {} ({}, {} zones, {} NAT gateways)",
        topology.name,
        topology.cidr,
        topology.zone_count(),
        topology.nat_gateways
    );
    Ok(topology)
}

fn name_tag(name: &str) -> Value {
    json!([{ "Key": "Name", "Value": name }])
}
