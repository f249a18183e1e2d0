//! Resolution of existing networks for import.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use strata_config::ConfigError;
use strata_core::AppContext;

use crate::error::{IacError, IacResult};
use crate::network::{NetworkTopology, Subnet, SubnetKind, TopologyOrigin, NETWORK_METADATA_KEY};

/// Configuration path of cached network lookups.
pub const LOOKUPS_PATH: &str = "Lookups.Networks";

/// Resolves an existing network by identifier or by name.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkLookup {
    fn by_id(&self, vpc_id: &str) -> IacResult<NetworkTopology>;

    fn by_name(&self, name: &str) -> IacResult<NetworkTopology>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CachedNetwork {
    vpc_id: String,
    #[serde(default)]
    name: Option<String>,
    cidr: String,
    #[serde(default)]
    availability_zones: Vec<String>,
    #[serde(default)]
    nat_gateways: u32,
    #[serde(default)]
    subnets: Vec<CachedSubnet>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CachedSubnet {
    tier: String,
    #[serde(rename = "Type")]
    kind: SubnetKind,
    zone: String,
    cidr: String,
    #[serde(default)]
    subnet_id: Option<String>,
}

impl From<CachedNetwork> for NetworkTopology {
    fn from(cached: CachedNetwork) -> Self {
        NetworkTopology {
            name: cached.name.unwrap_or_else(|| cached.vpc_id.clone()),
            vpc_id: cached.vpc_id,
            cidr: cached.cidr,
            zones: cached.availability_zones,
            nat_gateways: cached.nat_gateways,
            subnets: cached
                .subnets
                .into_iter()
                .map(|s| Subnet {
                    tier: s.tier,
                    kind: s.kind,
                    zone: s.zone,
                    cidr: s.cidr,
                    logical_id: None,
                    subnet_id: s.subnet_id,
                })
                .collect(),
            origin: TopologyOrigin::ImportedById,
            owner: None,
            vpc_logical_id: None,
        }
    }
}

/// Networks known to a synthesis run: cached lookups from configuration and
/// topologies created by stacks already committed.
#[derive(Debug, Clone, Default)]
pub struct NetworkCatalog {
    networks: Vec<NetworkTopology>,
}

impl NetworkCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, topology: NetworkTopology) -> Self {
        self.networks.push(topology);
        self
    }

    /// Build the catalog for `ctx`.
    pub fn from_context(ctx: &AppContext) -> IacResult<Self> {
        let mut catalog = Self::new();

        if let Some(cached) = ctx.config().tree().get(LOOKUPS_PATH) {
            let cached = parse_cached_networks(cached).map_err(|e| {
                IacError::Config(ConfigError::InvalidValue {
                    section: "Lookups".to_string(),
                    field: "Networks".to_string(),
                    message: e.to_string(),
                })
            })?;
            catalog.networks.extend(cached);
        }

        for stack in ctx.stacks() {
            if let Some(recorded) = stack.graph().metadata(NETWORK_METADATA_KEY) {
                let topology: NetworkTopology = serde_json::from_value(recorded.clone())?;
                catalog.networks.push(topology);
            }
        }

        debug!("Network catalog holds {} networks", catalog.networks.len());
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    fn find(&self, origin: TopologyOrigin, matches: impl Fn(&NetworkTopology) -> bool) -> Option<NetworkTopology> {
        // Later entries shadow earlier ones.
        self.networks.iter().rev().find(|n| matches(n)).map(|n| {
            let mut found = n.clone();
            found.origin = origin;
            found
        })
    }
}

impl NetworkLookup for NetworkCatalog {
    fn by_id(&self, vpc_id: &str) -> IacResult<NetworkTopology> {
        self.find(TopologyOrigin::ImportedById, |n| n.vpc_id == vpc_id)
            .ok_or_else(|| IacError::NetworkNotFound(format!("no network with id {}", vpc_id)))
    }

    fn by_name(&self, name: &str) -> IacResult<NetworkTopology> {
        self.find(TopologyOrigin::ImportedByName, |n| n.name == name)
            .ok_or_else(|| IacError::NetworkNotFound(format!("no network named {}", name)))
    }
}

/// Parse a `Lookups.Networks` entry list outside a context.
pub fn parse_cached_networks(value: &Value) -> IacResult<Vec<NetworkTopology>> {
    let cached: Vec<CachedNetwork> = serde_json::from_value(value.clone())?;
    Ok(cached.into_iter().map(NetworkTopology::from).collect())
}
