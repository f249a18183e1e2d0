//! Three-tier security group chain.
//!
//! Trust flows strictly external -> web -> backend -> database:
//!
//! - web accepts TCP 80 and 443 from any IPv4 address
//! - backend accepts TCP 80 and 8080 from the web tier only
//! - database accepts TCP 3306 from the backend tier only
//!
//! A tier bound to an existing group id gets no rules; the existing group is
//! trusted as-is.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use strata_core::{BaseStack, Resource};

use crate::error::{IacError, IacResult};
use crate::network::NetworkTopology;

const ANY_IPV4: &str = "0.0.0.0/0";

/// Position of a tier in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TierRole {
    Web,
    Backend,
    Database,
}

impl TierRole {
    pub const ALL: [TierRole; 3] = [TierRole::Web, TierRole::Backend, TierRole::Database];

    /// Construct id of a freshly created group.
    pub fn construct_id(&self) -> &'static str {
        match self {
            TierRole::Web => "web-server-sg",
            TierRole::Backend => "backend-server-sg",
            TierRole::Database => "database-server-sg",
        }
    }

    /// Construct id of a group bound by identifier. Also the variable name
    /// under which network stacks publish the group id.
    pub fn binding_id(&self) -> &'static str {
        match self {
            TierRole::Web => "WebserverSG",
            TierRole::Backend => "BackendServerSG",
            TierRole::Database => "DbserverSG",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TierRole::Web => "security group for a web server",
            TierRole::Backend => "security group for a backend server",
            TierRole::Database => "security group for a database server",
        }
    }
}

/// Where inbound traffic may come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngressSource {
    AnyIpv4,
    /// Another tier of the chain.
    Tier(TierRole),
}

/// One inbound TCP rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub port: u16,
    pub source: IngressSource,
    pub description: String,
}

impl IngressRule {
    fn tcp(port: u16, source: IngressSource, description: impl Into<String>) -> Self {
        Self {
            port,
            source,
            description: description.into(),
        }
    }
}

/// Fixed ingress policy for a freshly created tier.
pub fn ingress_policy(role: TierRole) -> Vec<IngressRule> {
    match role {
        TierRole::Web => vec![
            IngressRule::tcp(80, IngressSource::AnyIpv4, "allow HTTP traffic from anywhere"),
            IngressRule::tcp(443, IngressSource::AnyIpv4, "allow HTTPS traffic from anywhere"),
        ],
        TierRole::Backend => vec![
            IngressRule::tcp(
                80,
                IngressSource::Tier(TierRole::Web),
                "allow traffic on port 80 from the webserver security group",
            ),
            IngressRule::tcp(
                8080,
                IngressSource::Tier(TierRole::Web),
                "allow traffic on port 8080 from the webserver security group",
            ),
        ],
        TierRole::Database => vec![IngressRule::tcp(
            3306,
            IngressSource::Tier(TierRole::Backend),
            "allow traffic on port 3306 from the backend server security group",
        )],
    }
}

/// A resolved tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityGroupTier {
    /// Bound to an existing group; no rules were added.
    Imported { role: TierRole, group_id: String },
    /// Declared by this stack with the fixed policy.
    Created {
        role: TierRole,
        logical_id: String,
        group_id: String,
        rules: Vec<IngressRule>,
    },
}

impl SecurityGroupTier {
    pub fn role(&self) -> TierRole {
        match self {
            SecurityGroupTier::Imported { role, .. } | SecurityGroupTier::Created { role, .. } => *role,
        }
    }

    /// Group id, or a token resolving to it for created groups.
    pub fn group_id(&self) -> &str {
        match self {
            SecurityGroupTier::Imported { group_id, .. } | SecurityGroupTier::Created { group_id, .. } => group_id,
        }
    }

    pub fn is_imported(&self) -> bool {
        matches!(self, SecurityGroupTier::Imported { .. })
    }

    pub fn rules(&self) -> &[IngressRule] {
        match self {
            SecurityGroupTier::Imported { .. } => &[],
            SecurityGroupTier::Created { rules, .. } => rules,
        }
    }

    /// Reference usable inside the declaring stack's template.
    fn reference(&self) -> Value {
        match self {
            SecurityGroupTier::Imported { group_id, .. } => json!(group_id),
            SecurityGroupTier::Created { logical_id, .. } => json!({ "Fn::GetAtt": [logical_id, "GroupId"] }),
        }
    }
}

/// Tier ids supplied by an import descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierImports {
    pub web: Option<String>,
    pub backend: Option<String>,
    pub database: Option<String>,
}

impl TierImports {
    fn get(&self, role: TierRole) -> Option<&str> {
        let id = match role {
            TierRole::Web => &self.web,
            TierRole::Backend => &self.backend,
            TierRole::Database => &self.database,
        };
        id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

/// The web, backend and database tiers of a network stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityTiers {
    pub web: SecurityGroupTier,
    pub backend: SecurityGroupTier,
    pub database: SecurityGroupTier,
}

impl SecurityTiers {
    pub fn get(&self, role: TierRole) -> &SecurityGroupTier {
        match role {
            TierRole::Web => &self.web,
            TierRole::Backend => &self.backend,
            TierRole::Database => &self.database,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecurityGroupTier> {
        [&self.web, &self.backend, &self.database].into_iter()
    }

    pub fn created_count(&self) -> usize {
        self.iter().filter(|t| !t.is_imported()).count()
    }

    pub fn rule_count(&self) -> usize {
        self.iter().map(|t| t.rules().len()).sum()
    }
}

/// Bind or create the three tiers against `topology`, in chain order.
pub fn derive_tiers(
    stack: &mut BaseStack<'_>,
    topology: &NetworkTopology,
    imports: &TierImports,
) -> IacResult<SecurityTiers> {
    let web = resolve_tier(stack, topology, imports, TierRole::Web, None)?;
    let backend = resolve_tier(stack, topology, imports, TierRole::Backend, Some(&web))?;
    let database = resolve_tier(stack, topology, imports, TierRole::Database, Some(&backend))?;
    let tiers = SecurityTiers { web, backend, database };

    info!(
        "{}: security tiers ready ({} created, {} bound)",
        stack.canonical_name(),
        tiers.created_count(),
        3 - tiers.created_count()
    );
    Ok(tiers)
}

fn resolve_tier(
    stack: &mut BaseStack<'_>,
    topology: &NetworkTopology,
    imports: &TierImports,
    role: TierRole,
    upstream: Option<&SecurityGroupTier>,
) -> IacResult<SecurityGroupTier> {
    match imports.get(role) {
        Some(group_id) => {
            debug!("{}: {} bound to {}", stack.canonical_name(), role.binding_id(), group_id);
            Ok(SecurityGroupTier::Imported {
                role,
                group_id: group_id.to_string(),
            })
        }
        None => create_tier(stack, topology, role, upstream),
    }
}

fn create_tier(
    stack: &mut BaseStack<'_>,
    topology: &NetworkTopology,
    role: TierRole,
    upstream: Option<&SecurityGroupTier>,
) -> IacResult<SecurityGroupTier> {
    let rules = ingress_policy(role);
    let ingress = ingress_entries(&rules, upstream)?;

    let resource = Resource::new("AWS::EC2::SecurityGroup")
        .property("GroupDescription", json!(role.description()))
        .property("VpcId", topology.vpc_ref(stack.canonical_name()))
        .property(
            "SecurityGroupEgress",
            json!([{
                "CidrIp": ANY_IPV4,
                "IpProtocol": "-1",
                "Description": "Allow all outbound traffic by default"
            }]),
        )
        .property("SecurityGroupIngress", Value::Array(ingress));

    let logical_id = stack.declare(&[role.construct_id()], resource)?;
    let group_id = stack.token(&logical_id, "GroupId");

    Ok(SecurityGroupTier::Created {
        role,
        logical_id,
        group_id,
        rules,
    })
}

/// Inline ingress for `rules`. A tier-sourced rule needs `upstream` to be
/// that tier.
fn ingress_entries(rules: &[IngressRule], upstream: Option<&SecurityGroupTier>) -> IacResult<Vec<Value>> {
    rules
        .iter()
        .map(|rule| {
            let mut entry = json!({
                "IpProtocol": "tcp",
                "FromPort": rule.port,
                "ToPort": rule.port,
                "Description": rule.description,
            });
            match &rule.source {
                IngressSource::AnyIpv4 => entry["CidrIp"] = json!(ANY_IPV4),
                IngressSource::Tier(source) => {
                    let tier = upstream.filter(|t| t.role() == *source).ok_or_else(|| {
                        IacError::FatalTopology(format!(
                            "ingress on port {} needs the {} tier as its source",
                            rule.port,
                            source.binding_id()
                        ))
                    })?;
                    entry["SourceSecurityGroupId"] = tier.reference();
                }
            }
            Ok(entry)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_is_a_chain() {
        let web = ingress_policy(TierRole::Web);
        assert_eq!(web.iter().map(|r| r.port).collect::<Vec<_>>(), vec![80, 443]);
        assert!(web.iter().all(|r| r.source == IngressSource::AnyIpv4));

        let backend = ingress_policy(TierRole::Backend);
        assert_eq!(backend.iter().map(|r| r.port).collect::<Vec<_>>(), vec![80, 8080]);
        assert!(backend.iter().all(|r| r.source == IngressSource::Tier(TierRole::Web)));

        let database = ingress_policy(TierRole::Database);
        assert_eq!(database.len(), 1);
        assert_eq!(database[0].port, 3306);
        assert_eq!(database[0].source, IngressSource::Tier(TierRole::Backend));
    }

    #[test]
    fn test_blank_import_ids_are_ignored() {
        let imports = TierImports {
            web: Some("  ".into()),
            backend: Some("sg-123".into()),
            database: None,
        };
        assert_eq!(imports.get(TierRole::Web), None);
        assert_eq!(imports.get(TierRole::Backend), Some("sg-123"));
        assert_eq!(imports.get(TierRole::Database), None);
    }

    #[test]
    fn test_imported_tier_has_no_rules() {
        let tier = SecurityGroupTier::Imported {
            role: TierRole::Database,
            group_id: "sg-1".into(),
        };
        assert!(tier.rules().is_empty());
        assert_eq!(tier.reference(), json!("sg-1"));
    }

    #[test]
    fn test_ingress_needs_matching_upstream() {
        let web = SecurityGroupTier::Imported {
            role: TierRole::Web,
            group_id: "sg-web".into(),
        };
        let backend = ingress_entries(&ingress_policy(TierRole::Backend), Some(&web)).unwrap();
        assert_eq!(backend[0]["SourceSecurityGroupId"], json!("sg-web"));

        let rules = ingress_policy(TierRole::Database);
        assert!(matches!(ingress_entries(&rules, Some(&web)), Err(IacError::FatalTopology(_))));
        assert!(matches!(ingress_entries(&rules, None), Err(IacError::FatalTopology(_))));
    }
}
