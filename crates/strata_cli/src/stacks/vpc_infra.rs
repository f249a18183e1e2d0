//! Shared network stack.
//!
//! Builds the base network with its web, backend and database tiers and
//! publishes their identifiers for the stacks that follow. An optional
//! `LegacyVpc` mapping reuses an existing network instead.

use strata_core::BaseStack;
use strata_iac::{IacResult, NetworkImport, NetworkSource, TierRole, VpcNetwork, VpcStackHooks};

/// Variable holding the network name.
pub const VPC_NAME_VARIABLE: &str = "VpcName";

pub(crate) const LEGACY_VPC_FIELD: &str = "LegacyVpc";

#[derive(Debug, Default)]
pub struct VpcInfraHooks;

impl VpcStackHooks for VpcInfraHooks {
    fn lookup_legacy_network(&mut self, stack: &BaseStack<'_>) -> IacResult<NetworkSource> {
        Ok(match stack.config().deserialize::<NetworkImport>(LEGACY_VPC_FIELD)? {
            Some(import) => NetworkSource::Import(import),
            None => NetworkSource::Absent,
        })
    }

    fn on_ready(&mut self, stack: &mut BaseStack<'_>, network: &VpcNetwork) -> IacResult<()> {
        stack.put_variable(VPC_NAME_VARIABLE, network.topology.name.clone());

        for role in TierRole::ALL {
            let tier = network.tiers.get(role);
            stack.put_variable(role.binding_id(), tier.group_id());
        }
        Ok(())
    }
}
