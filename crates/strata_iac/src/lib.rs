//! # strata_iac
//!
//! Network topology and template inclusion stacks for Strata.
//!
//! This crate builds on the stack lifecycle of `strata_core` with two
//! specialised stack bodies:
//!
//! - [`VpcStack`]: imports or creates a network, then derives the web,
//!   backend and database security tiers
//! - [`TemplateStack`]: optionally includes an externally authored template
//!   with parameter overrides
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{construct_stack, BaseStack};
//! use strata_iac::{IacResult, NetworkSource, VpcNetwork, VpcStack, VpcStackHooks};
//!
//! struct Infra;
//!
//! impl VpcStackHooks for Infra {
//!     fn lookup_legacy_network(&mut self, _stack: &BaseStack<'_>) -> IacResult<NetworkSource> {
//!         Ok(NetworkSource::Absent)
//!     }
//!
//!     fn on_ready(&mut self, stack: &mut BaseStack<'_>, network: &VpcNetwork) -> IacResult<()> {
//!         stack.put_variable("VpcName", network.topology.name.clone());
//!         Ok(())
//!     }
//! }
//!
//! construct_stack(&mut ctx, "VpcInfra", &mut VpcStack::new(Infra))?;
//! ```

pub mod cfn_include;
pub mod error;
pub mod lookup;
pub mod network;
pub mod security;
pub mod template;
pub mod vpc_stack;

pub use cfn_include::{
    include_template, IncludedTemplate, TemplateDescriptor, TemplateParameter, TemplateSource, TemplateStack,
    TemplateStackHooks,
};
pub use error::{IacError, IacResult};
pub use lookup::{NetworkCatalog, NetworkLookup, LOOKUPS_PATH};
pub use network::{
    create_vpc, plan_subnets, zone_names, NetworkSizing, NetworkTopology, Subnet, SubnetKind, SubnetTier,
    TopologyOrigin, NETWORK_METADATA_KEY, SUBNET_TIERS,
};
pub use security::{
    derive_tiers, ingress_policy, IngressRule, IngressSource, SecurityGroupTier, SecurityTiers, TierImports, TierRole,
};
pub use template::CfnTemplate;
pub use vpc_stack::{import_network, ImportTarget, NetworkImport, NetworkSource, VpcNetwork, VpcStack, VpcStackHooks};
