//! # strata_config
//!
//! Configuration tree loading for Strata.
//!
//! A synthesis run is driven by one configuration file, located through an
//! environment variable (`APP_CONFIG` by default). The file may be JSON,
//! YAML or TOML; it is parsed into a [`ConfigTree`], `${VAR}` placeholders
//! are substituted from the environment, and the result is validated into an
//! [`AppConfig`].
//!
//! ## Layout
//!
//! ```yaml
//! Project:
//!   Name: DevSecOps
//!   Stage: Demo
//!   Account: "123456789012"
//!   Region: ap-northeast-2
//! Stack:
//!   VpcInfra:
//!     Name: VpcInfraStack
//!     VPCName: MainVPC
//!     VPCMaxAzs: 2
//!     VPCCIDR: 10.0.0.0/16
//!     NATGatewayCount: 1
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use strata_config::{AppConfig, ConfigLoader, DEFAULT_CONFIG_KEY};
//!
//! let tree = ConfigLoader::new().load_from_env(DEFAULT_CONFIG_KEY).unwrap();
//! let config = AppConfig::from_tree(tree).unwrap();
//! let vpc = config.stack("VpcInfra").unwrap();
//! println!("{} -> {}", config.project().prefix(), vpc.name());
//! ```

pub mod error;
pub mod loader;
pub mod project;
pub mod tree;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigFormat, ConfigLoader, DEFAULT_CONFIG_KEY};
pub use project::{AppConfig, ProjectConfig, PROJECT_SECTION, STACK_SECTION};
pub use tree::{ConfigTree, StackConfig, STACK_NAME_FIELD, UPDATE_REGION_FIELD};
