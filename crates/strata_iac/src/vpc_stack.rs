//! Network stacks.
//!
//! [`VpcStack`] wraps caller hooks into a [`StackBody`]. Construction picks
//! one of two branches, once:
//!
//! 1. [`VpcStackHooks::lookup_legacy_network`] returns
//!    [`NetworkSource::Absent`]: a fresh network is declared from the
//!    stack's sizing.
//! 2. It returns [`NetworkSource::Import`]: the network is resolved by id or
//!    by name through a [`NetworkLookup`].
//!
//! In both branches the security tiers are derived next, then
//! [`VpcStackHooks::on_ready`] runs exactly once.

use serde::Deserialize;
use tracing::info;

use strata_core::{BaseStack, StackBody};

use crate::error::{IacError, IacResult};
use crate::lookup::{NetworkCatalog, NetworkLookup};
use crate::network::{create_vpc, NetworkSizing, NetworkTopology, NETWORK_METADATA_KEY};
use crate::security::{derive_tiers, SecurityTiers, TierImports};

/// Descriptor of an existing network to reuse.
///
/// Exactly one of `vpc_id` and `vpc_name` must be set; empty strings count
/// as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkImport {
    #[serde(default, alias = "VPCID")]
    pub vpc_id: Option<String>,
    #[serde(default, alias = "VPCName")]
    pub vpc_name: Option<String>,
    #[serde(default, rename = "WebserverSG")]
    pub web_tier_id: Option<String>,
    #[serde(default, rename = "BackendServerSG")]
    pub backend_tier_id: Option<String>,
    #[serde(default, rename = "DbserverSG")]
    pub database_tier_id: Option<String>,
}

/// Which key an import resolves by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportTarget<'a> {
    Id(&'a str),
    Name(&'a str),
}

impl NetworkImport {
    pub fn by_id(vpc_id: impl Into<String>) -> Self {
        Self {
            vpc_id: Some(vpc_id.into()),
            ..Self::default()
        }
    }

    pub fn by_name(vpc_name: impl Into<String>) -> Self {
        Self {
            vpc_name: Some(vpc_name.into()),
            ..Self::default()
        }
    }

    pub fn with_web_tier(mut self, group_id: impl Into<String>) -> Self {
        self.web_tier_id = Some(group_id.into());
        self
    }

    pub fn with_backend_tier(mut self, group_id: impl Into<String>) -> Self {
        self.backend_tier_id = Some(group_id.into());
        self
    }

    pub fn with_database_tier(mut self, group_id: impl Into<String>) -> Self {
        self.database_tier_id = Some(group_id.into());
        self
    }

    /// The lookup key, or `AmbiguousImport` when both or neither are set.
    pub fn target(&self) -> IacResult<ImportTarget<'_>> {
        let id = self.vpc_id.as_deref().filter(|s| !s.trim().is_empty());
        let name = self.vpc_name.as_deref().filter(|s| !s.trim().is_empty());

        match (id, name) {
            (Some(id), None) => Ok(ImportTarget::Id(id)),
            (None, Some(name)) => Ok(ImportTarget::Name(name)),
            (Some(id), Some(name)) => Err(IacError::AmbiguousImport(format!(
                "both id {} and name {} given; supply exactly one",
                id, name
            ))),
            (None, None) => Err(IacError::AmbiguousImport(
                "neither a network id nor a network name given".to_string(),
            )),
        }
    }

    pub fn tier_imports(&self) -> TierImports {
        TierImports {
            web: self.web_tier_id.clone(),
            backend: self.backend_tier_id.clone(),
            database: self.database_tier_id.clone(),
        }
    }
}

/// Result of [`VpcStackHooks::lookup_legacy_network`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkSource {
    /// Build a fresh network.
    Absent,
    /// Reuse an existing one.
    Import(NetworkImport),
}

/// A resolved network together with its security tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcNetwork {
    pub topology: NetworkTopology,
    pub tiers: SecurityTiers,
}

/// Extension points of a network stack.
pub trait VpcStackHooks {
    /// Decide between importing and creating.
    fn lookup_legacy_network(&mut self, stack: &BaseStack<'_>) -> IacResult<NetworkSource>;

    /// Sizing for a fresh network. Reads `VPCName`, `VPCMaxAzs`, `VPCCIDR`
    /// and `NATGatewayCount` from the stack configuration by default.
    fn network_sizing(&mut self, stack: &BaseStack<'_>) -> IacResult<NetworkSizing> {
        NetworkSizing::from_config(stack.config())
    }

    /// Declare resources against the finished network.
    fn on_ready(&mut self, stack: &mut BaseStack<'_>, network: &VpcNetwork) -> IacResult<()>;
}

/// Resolve an import through `lookup`.
pub fn import_network(lookup: &dyn NetworkLookup, import: &NetworkImport) -> IacResult<NetworkTopology> {
    let topology = match import.target()? {
        ImportTarget::Id(id) => lookup.by_id(id)?,
        ImportTarget::Name(name) => lookup.by_name(name)?,
    };
    info!("Imported network {} ({})", topology.name, topology.vpc_id);
    Ok(topology)
}

/// Network stack body driving a set of hooks.
pub struct VpcStack<H> {
    hooks: H,
    lookup: Option<Box<dyn NetworkLookup>>,
    network: Option<VpcNetwork>,
}

impl<H: VpcStackHooks> VpcStack<H> {
    pub fn new(hooks: H) -> Self {
        Self {
            hooks,
            lookup: None,
            network: None,
        }
    }

    /// Resolve imports through `lookup` instead of the context catalog.
    pub fn with_lookup(mut self, lookup: Box<dyn NetworkLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// The network, once construction has completed.
    pub fn network(&self) -> Option<&VpcNetwork> {
        self.network.as_ref()
    }

    pub fn into_parts(self) -> (H, Option<VpcNetwork>) {
        (self.hooks, self.network)
    }

    fn resolve(&mut self, stack: &mut BaseStack<'_>) -> IacResult<(NetworkTopology, TierImports)> {
        match self.hooks.lookup_legacy_network(stack)? {
            NetworkSource::Absent => {
                let sizing = self.hooks.network_sizing(stack)?;
                Ok((create_vpc(stack, &sizing)?, TierImports::default()))
            }
            NetworkSource::Import(import) => {
                let topology = match &self.lookup {
                    Some(lookup) => import_network(lookup.as_ref(), &import)?,
                    None => import_network(&NetworkCatalog::from_context(stack.context())?, &import)?,
                };
                Ok((topology, import.tier_imports()))
            }
        }
    }
}

impl<H: VpcStackHooks> StackBody for VpcStack<H> {
    type Error = IacError;

    fn build(&mut self, stack: &mut BaseStack<'_>) -> IacResult<()> {
        let (topology, imports) = self.resolve(stack)?;
        let tiers = derive_tiers(stack, &topology, &imports)?;

        if !topology.is_imported() {
            stack
                .graph_mut()
                .set_metadata(NETWORK_METADATA_KEY, serde_json::to_value(&topology)?);
        }

        let network = VpcNetwork { topology, tiers };
        self.hooks.on_ready(stack, &network)?;
        self.network = Some(network);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::MockNetworkLookup;

    #[test]
    fn test_import_target() {
        assert_eq!(NetworkImport::by_id("vpc-1").target().unwrap(), ImportTarget::Id("vpc-1"));
        assert_eq!(
            NetworkImport::by_name("legacy-net").target().unwrap(),
            ImportTarget::Name("legacy-net")
        );
    }

    #[test]
    fn test_ambiguous_import() {
        let both = NetworkImport {
            vpc_id: Some("vpc-1".into()),
            vpc_name: Some("legacy-net".into()),
            ..NetworkImport::default()
        };
        assert!(matches!(both.target(), Err(IacError::AmbiguousImport(_))));

        let neither = NetworkImport::default().with_web_tier("sg-1");
        assert!(matches!(neither.target(), Err(IacError::AmbiguousImport(_))));

        let empty_strings = NetworkImport {
            vpc_id: Some(String::new()),
            vpc_name: Some("  ".into()),
            ..NetworkImport::default()
        };
        assert!(matches!(empty_strings.target(), Err(IacError::AmbiguousImport(_))));
    }

    #[test]
    fn test_empty_id_falls_to_name() {
        let import = NetworkImport {
            vpc_id: Some(String::new()),
            vpc_name: Some("legacy-net".into()),
            ..NetworkImport::default()
        };
        assert_eq!(import.target().unwrap(), ImportTarget::Name("legacy-net"));
    }

    #[test]
    fn test_ambiguous_import_never_queries_lookup() {
        let mut lookup = MockNetworkLookup::new();
        lookup.expect_by_id().never();
        lookup.expect_by_name().never();

        let err = import_network(&lookup, &NetworkImport::default()).unwrap_err();
        assert!(matches!(err, IacError::AmbiguousImport(_)));
    }

    #[test]
    fn test_import_by_id_queries_lookup_once() {
        let mut lookup = MockNetworkLookup::new();
        lookup.expect_by_name().never();
        lookup
            .expect_by_id()
            .withf(|id| id == "vpc-0abc")
            .times(1)
            .returning(|id| {
                Ok(NetworkTopology {
                    name: "shared".to_string(),
                    vpc_id: id.to_string(),
                    cidr: "10.9.0.0/16".to_string(),
                    zones: vec!["us-east-1a".to_string()],
                    nat_gateways: 1,
                    subnets: Vec::new(),
                    origin: crate::network::TopologyOrigin::ImportedById,
                    owner: None,
                    vpc_logical_id: None,
                })
            });

        let topology = import_network(&lookup, &NetworkImport::by_id("vpc-0abc")).unwrap();
        assert_eq!(topology.name, "shared");
        assert!(topology.is_imported());
        assert_eq!(topology.vpc_ref("any"), serde_json::json!("vpc-0abc"));
    }

    #[test]
    fn test_import_descriptor_from_config() {
        let import: NetworkImport = serde_json::from_value(serde_json::json!({
            "VPCName": "legacy-net",
            "BackendServerSG": "sg-123"
        }))
        .unwrap();
        assert_eq!(import.target().unwrap(), ImportTarget::Name("legacy-net"));
        assert_eq!(import.tier_imports().backend.as_deref(), Some("sg-123"));
        assert_eq!(import.tier_imports().web, None);
    }
}
