//! # strata_cli
//!
//! The `strata` command and the deployable stacks it composes.
//!
//! Stacks are instantiated in a fixed order against one [`AppContext`]:
//!
//! 1. `VpcInfra`: fresh network and security tiers
//! 2. `SonarQube`: code analysis service inside that network
//! 3. `Repository`: source repository
//! 4. `DevSecOps`: scan project triggered by commits
//! 5. `IncludedTemplate`: optional externally authored template
//!
//! [`AppContext`]: strata_core::AppContext

pub mod commands;
pub mod stacks;

use strata_config::ConfigError;
use strata_core::CoreError;
use strata_iac::IacError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const CONFIG_ERROR: u8 = 2;
    pub const TOPOLOGY_ERROR: u8 = 3;
    pub const UNRESOLVED_VARIABLE: u8 = 4;
    pub const TEMPLATE_ERROR: u8 = 5;

    /// Map an error to its exit code using the first typed error in the
    /// chain.
    pub fn categorize(error: &anyhow::Error) -> u8 {
        for cause in error.chain() {
            if let Some(e) = cause.downcast_ref::<IacError>() {
                return Self::for_iac(e);
            }
            if let Some(e) = cause.downcast_ref::<CoreError>() {
                return Self::for_core(e);
            }
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::CONFIG_ERROR;
            }
        }
        Self::GENERAL_ERROR
    }

    fn for_core(error: &CoreError) -> u8 {
        match error {
            CoreError::Config(_) | CoreError::InvalidStackName(_) => Self::CONFIG_ERROR,
            CoreError::UnresolvedVariable(_) => Self::UNRESOLVED_VARIABLE,
            _ => Self::GENERAL_ERROR,
        }
    }

    fn for_iac(error: &IacError) -> u8 {
        match error {
            IacError::FatalTopology(_) | IacError::AmbiguousImport(_) | IacError::NetworkNotFound(_) => {
                Self::TOPOLOGY_ERROR
            }
            IacError::TemplateNotFound(_)
            | IacError::InvalidTemplate { .. }
            | IacError::UnknownTemplateParameter { .. }
            | IacError::Yaml(_) => Self::TEMPLATE_ERROR,
            IacError::Config(_) => Self::CONFIG_ERROR,
            IacError::Core(e) => Self::for_core(e),
            IacError::Io(_) | IacError::Json(_) => Self::GENERAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes() {
        let config = anyhow::Error::new(ConfigError::SourceNotSet("APP_CONFIG".into()));
        assert_eq!(ExitCodes::categorize(&config), ExitCodes::CONFIG_ERROR);

        let topology = anyhow::Error::new(IacError::FatalTopology("zone count is 0".into()));
        assert_eq!(ExitCodes::categorize(&topology), ExitCodes::TOPOLOGY_ERROR);

        let unresolved = anyhow::Error::new(IacError::Core(CoreError::UnresolvedVariable("x".into())));
        assert_eq!(ExitCodes::categorize(&unresolved), ExitCodes::UNRESOLVED_VARIABLE);

        let template = Err::<(), _>(IacError::TemplateNotFound("t.yaml".into()))
            .context("stack IncludedTemplate")
            .unwrap_err();
        assert_eq!(ExitCodes::categorize(&template), ExitCodes::TEMPLATE_ERROR);

        let other = anyhow::anyhow!("something else");
        assert_eq!(ExitCodes::categorize(&other), ExitCodes::GENERAL_ERROR);
    }
}
