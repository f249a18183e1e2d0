//! Deployable stacks and the order they are composed in.

use anyhow::{Context, Result};
use tracing::{info, warn};

use strata_config::{AppConfig, ConfigError};
use strata_core::{construct_stack, AppContext, StackDescriptor};
use strata_iac::{NetworkSizing, TemplateDescriptor, TemplateStack, VpcStack};

pub mod devops;
pub mod devsecops;
pub mod repo;
pub mod sonarqube;
pub mod template;
pub mod vpc_infra;

pub use devops::DevOpsStack;
pub use devsecops::{DevSecOpsStack, ScanSettings};
pub use repo::RepoStack;
pub use sonarqube::{SonarQubeHooks, SonarQubeSettings};
pub use template::IncludedTemplateHooks;
pub use vpc_infra::VpcInfraHooks;

pub const VPC_INFRA_SECTION: &str = "VpcInfra";
pub const SONARQUBE_SECTION: &str = "SonarQube";
pub const REPOSITORY_SECTION: &str = "Repository";
pub const DEVSECOPS_SECTION: &str = "DevSecOps";
pub const DEVOPS_SECTION: &str = "DevOps";
pub const TEMPLATE_SECTION: &str = "IncludedTemplate";

/// Stack sections in instantiation order.
pub const STACK_ORDER: [&str; 6] = [
    VPC_INFRA_SECTION,
    SONARQUBE_SECTION,
    REPOSITORY_SECTION,
    DEVSECOPS_SECTION,
    DEVOPS_SECTION,
    TEMPLATE_SECTION,
];

/// A stack the configuration asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStack {
    pub section: String,
    pub canonical_name: String,
}

/// Resolve the stacks a run would construct, without constructing them.
pub fn plan(config: &AppConfig) -> Result<Vec<PlannedStack>> {
    if !config.has_stack(VPC_INFRA_SECTION) {
        return Err(ConfigError::MissingSection(format!("Stack.{}", VPC_INFRA_SECTION)).into());
    }

    let prefix = config.project().prefix();
    let mut planned = Vec::new();

    for section in STACK_ORDER {
        if !config.has_stack(section) {
            continue;
        }
        let stack = config.stack(section)?;
        planned.push(PlannedStack {
            section: section.to_string(),
            canonical_name: format!("{}-{}", prefix, stack.name()),
        });
    }

    for section in config.stack_sections() {
        if !STACK_ORDER.iter().any(|known| *known == section) {
            warn!("Stack.{} has no matching stack and is ignored", section);
        }
    }

    Ok(planned)
}

/// Check the fields a stack section needs, without constructing it.
pub fn check(config: &AppConfig, section: &str) -> Result<()> {
    let stack = config.stack(section)?;
    match section {
        VPC_INFRA_SECTION => {
            if !stack.has(vpc_infra::LEGACY_VPC_FIELD) {
                NetworkSizing::from_config(&stack)?;
            }
        }
        SONARQUBE_SECTION => {
            SonarQubeSettings::from_config(&stack)?;
        }
        REPOSITORY_SECTION => {
            stack.require_str(repo::REPO_NAME_FIELD)?;
        }
        DEVSECOPS_SECTION => {
            stack.require::<ScanSettings>(devsecops::SCAN_SETTINGS_FIELD)?;
        }
        DEVOPS_SECTION => {
            stack.deserialize::<ScanSettings>(devsecops::SCAN_SETTINGS_FIELD)?;
        }
        TEMPLATE_SECTION => {
            if let Some(descriptor) = stack.deserialize::<TemplateDescriptor>(template::TEMPLATE_FIELD)? {
                if !descriptor.template_path.exists() {
                    return Err(strata_iac::IacError::TemplateNotFound(descriptor.template_path).into());
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Construct every configured stack on `ctx`, in order.
pub fn instantiate(ctx: &mut AppContext) -> Result<Vec<StackDescriptor>> {
    let planned = plan(ctx.config())?;
    let mut built = Vec::with_capacity(planned.len());

    let infra = construct_stack(ctx, VPC_INFRA_SECTION, &mut VpcStack::new(VpcInfraHooks::default()))
        .with_context(|| format!("Failed to construct stack {}", VPC_INFRA_SECTION))?;
    built.push(infra.clone());

    for entry in planned.iter().skip(1) {
        let section = entry.section.as_str();
        let descriptor = match section {
            SONARQUBE_SECTION => {
                construct_stack(ctx, section, &mut VpcStack::new(SonarQubeHooks::new(infra.clone())))
                    .map_err(anyhow::Error::from)
            }
            REPOSITORY_SECTION => construct_stack(ctx, section, &mut RepoStack).map_err(anyhow::Error::from),
            DEVSECOPS_SECTION => construct_stack(ctx, section, &mut DevSecOpsStack).map_err(anyhow::Error::from),
            DEVOPS_SECTION => construct_stack(ctx, section, &mut DevOpsStack).map_err(anyhow::Error::from),
            TEMPLATE_SECTION => construct_stack(ctx, section, &mut TemplateStack::new(IncludedTemplateHooks))
                .map_err(anyhow::Error::from),
            other => Err(anyhow::anyhow!("no stack registered for section {}", other)),
        }
        .with_context(|| format!("Failed to construct stack {}", section))?;
        built.push(descriptor);
    }

    info!("Constructed {} stacks", built.len());
    Ok(built)
}
