//! Configuration for the certd service and CLI.
//!
//! Layered, later layers win:
//! 1. Defaults (from code)
//! 2. Config file (`certd.toml`)
//! 3. Environment variables (`CERTD_*` prefix, `__` between sections)
//!
//! ```no_run
//! use certd_core::config::ConfigLoader;
//!
//! let config = ConfigLoader::load_default()?;
//! let registry = config.build_registry();
//! # Ok::<(), certd_core::config::ConfigError>(())
//! ```
pub mod error;
pub mod loader;

pub use error::{ConfigError, Result};
pub use loader::{
    AdminConfig, AppConfig, ConfigLoader, IssuerConfig, RegistryConfig, ServiceConfig,
    VerificationConfig,
};
