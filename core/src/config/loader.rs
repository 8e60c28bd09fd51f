use crate::config::error::{ConfigError, Result};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::admin::{DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME, StaticCredentials};
use crate::issuance::{DEFAULT_MAX_ID_ATTEMPTS, Issuer};
use crate::registry::Registry;
use crate::verification::{TokioDelay, Verifier};

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub issuer: IssuerConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Socket and lifecycle settings for `certd-service`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Socket path override; defaults to `$XDG_RUNTIME_DIR/certd.sock`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    /// Exit after this many idle seconds with no open connections (0 = never)
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Organization stamped on new certificates
    #[serde(default = "default_organization")]
    pub organization: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Cosmetic delay before each lookup, in milliseconds
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
}

/// The static admin credential pair
#[derive(Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,

    #[serde(default = "default_admin_password")]
    pub password: String,
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Load the three demo certificates at startup
    #[serde(default = "default_true")]
    pub seed: bool,

    /// Id candidates tried before issuance fails
    #[serde(default = "default_max_id_attempts")]
    pub max_id_attempts: u32,
}

// Default value functions
fn default_organization() -> String {
    crate::DEFAULT_ISSUER.to_string()
}
fn default_latency_ms() -> u64 {
    500
}
fn default_admin_username() -> String {
    DEFAULT_ADMIN_USERNAME.to_string()
}
fn default_admin_password() -> String {
    DEFAULT_ADMIN_PASSWORD.to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_id_attempts() -> u32 {
    DEFAULT_MAX_ID_ATTEMPTS
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            idle_timeout_secs: 0,
        }
    }
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            organization: default_organization(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password: default_admin_password(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            seed: default_true(),
            max_id_attempts: default_max_id_attempts(),
        }
    }
}

impl AppConfig {
    /// Reject values that would leave a flow unusable
    pub fn validate(&self) -> Result<()> {
        if self.issuer.organization.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "issuer.organization must not be empty".to_string(),
            ));
        }
        if self.admin.username.is_empty() || self.admin.password.is_empty() {
            return Err(ConfigError::ValidationError(
                "admin.username and admin.password must not be empty".to_string(),
            ));
        }
        if self.registry.max_id_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "registry.max_id_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_registry(&self) -> Registry {
        if self.registry.seed {
            Registry::seeded()
        } else {
            Registry::empty()
        }
    }

    pub fn build_issuer(&self) -> Issuer {
        Issuer::new(
            self.issuer.organization.clone(),
            self.registry.max_id_attempts,
        )
    }

    pub fn build_verifier(&self) -> Verifier {
        Verifier::new(
            Arc::new(TokioDelay),
            Duration::from_millis(self.verification.latency_ms),
        )
    }

    pub fn build_credentials(&self) -> StaticCredentials {
        StaticCredentials::new(self.admin.username.clone(), self.admin.password.clone())
    }
}

/// Configuration loader with layered merging support
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults (from Default implementations)
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (CERTD_ prefix)
    pub fn load(&self) -> Result<AppConfig> {
        let mut builder = Config::builder();

        // Layer 1: defaults serialized to JSON as the base source
        let defaults = AppConfig::default();
        let defaults_json = serde_json::to_string(&defaults)?;
        builder = builder.add_source(File::from_str(
            &defaults_json,
            ::config::FileFormat::Json,
        ));

        // Layer 2: config file
        if let Some(ref path) = self.config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            } else {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
        }

        // Layer 3: environment, e.g. CERTD_VERIFICATION__LATENCY_MS=0
        builder = builder.add_source(
            Environment::with_prefix("CERTD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Locate the default config file in standard locations:
    /// 1. Current directory: ./certd.toml
    /// 2. XDG config: ~/.config/certd/config.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./certd.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("certd").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<AppConfig> {
        let loader = if let Some(config_path) = Self::find_config_file() {
            tracing::debug!("Using config file {}", config_path.display());
            ConfigLoader::new().with_file(config_path)
        } else {
            ConfigLoader::new()
        };

        loader.load()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("certd.toml");
        std::fs::write(&config_path, contents).expect("Failed to write temp file");
        (temp_dir, config_path)
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.issuer.organization, "0x0 PIR4T3S Team");
        assert_eq!(config.verification.latency_ms, 500);
        assert_eq!(config.admin.username, "admin");
        assert_eq!(config.admin.password, "admin123");
        assert!(config.registry.seed);
        assert_eq!(config.registry.max_id_attempts, 16);
        assert_eq!(config.service.socket_path, None);
        assert_eq!(config.service.idle_timeout_secs, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_with_defaults_only() {
        let config = ConfigLoader::new()
            .load()
            .expect("Failed to load default config");
        assert_eq!(config.verification.latency_ms, 500);
        assert!(config.registry.seed);
    }

    #[test]
    #[serial]
    fn test_load_with_toml_file() {
        let (_dir, path) = write_config(
            r#"
[service]
socket_path = "/tmp/certd-test.sock"
idle_timeout_secs = 120

[issuer]
organization = "Example Org"

[verification]
latency_ms = 0

[registry]
seed = false
"#,
        );

        let config = ConfigLoader::new()
            .with_file(&path)
            .load()
            .expect("Failed to load config");

        assert_eq!(
            config.service.socket_path,
            Some(PathBuf::from("/tmp/certd-test.sock"))
        );
        assert_eq!(config.service.idle_timeout_secs, 120);
        assert_eq!(config.issuer.organization, "Example Org");
        assert_eq!(config.verification.latency_ms, 0);
        assert!(!config.registry.seed);
        assert!(config.build_registry().is_empty());
        assert_eq!(config.build_issuer().organization(), "Example Org");
        assert_eq!(config.build_verifier().latency(), Duration::ZERO);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let (_dir, path) = write_config(
            r#"
[verification]
latency_ms = 250

[admin]
username = "ops"
"#,
        );

        unsafe {
            env::set_var("CERTD_VERIFICATION__LATENCY_MS", "10");
        }

        let result = ConfigLoader::new().with_file(&path).load();

        unsafe {
            env::remove_var("CERTD_VERIFICATION__LATENCY_MS");
        }

        let config = result.expect("Failed to load config");
        assert_eq!(config.verification.latency_ms, 10);
        // File value should be preserved for non-overridden fields
        assert_eq!(config.admin.username, "ops");
        assert_eq!(config.admin.password, "admin123");
    }

    #[test]
    fn test_missing_file_error() {
        let result = ConfigLoader::new()
            .with_file("/nonexistent/certd.toml")
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    #[serial]
    fn test_rejects_zero_id_attempts() {
        let (_dir, path) = write_config("[registry]\nmax_id_attempts = 0\n");
        let result = ConfigLoader::new().with_file(&path).load();
        let err = result.expect_err("zero attempts should be rejected");
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("max_id_attempts"));
    }

    #[test]
    fn test_rejects_blank_organization() {
        let mut config = AppConfig::default();
        config.issuer.organization = "   ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_admin_debug_redacts_password() {
        let rendered = format!("{:?}", AdminConfig::default());
        assert!(!rendered.contains("admin123"));
    }

    #[test]
    fn test_built_credentials_use_configured_pair() {
        use crate::admin::CredentialVerifier;

        let mut config = AppConfig::default();
        config.admin.username = "ops".to_string();
        config.admin.password = "hunter2".to_string();
        let creds = config.build_credentials();
        assert!(creds.verify("ops", "hunter2"));
        assert!(!creds.verify("admin", "admin123"));
    }
}
