//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The file path
//! defaults to `config.yaml` and can be changed with `-f` or the `OBC_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. **YAML config file** - base configuration
//! 2. **Environment variables** - variables prefixed with `OBC_` override YAML values
//! 3. **DATABASE_URL** - overrides `database.url` if set
//!
//! Nested values use double underscores, e.g. `OBC_AUTH__NATIVE__ALLOW_REGISTRATION=true`.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use openbioc::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//! println!("Server will bind to {}", config.bind_address());
//! # Ok(())
//! # }
//! ```
//!
//! ## Sections
//!
//! - **Server**: `host`, `port`, `dashboard_url`
//! - **Database**: `database.url`, `database.max_connections`
//! - **Authentication**: `auth.native`, `auth.security` (JWT and CORS)
//! - **Email**: `email` (SMTP or file transport) for validation and password reset mails
//! - **Catalog**: `catalog.edit_allocation_retries`
//! - **Trees**: `tree` context tags used in rendered tree ids

use std::time::Duration;

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::catalog::TreeConfig;
use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "OBC_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL of the web frontend, used to build the links sent by email
    pub dashboard_url: String,
    /// Set from the DATABASE_URL environment variable, folded into `database.url` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub database: DatabaseConfig,
    /// Secret key for JWT signing (required when native auth is enabled)
    pub secret_key: Option<String>,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    pub auth: AuthConfig,
    /// Email configuration for validation and password reset mails
    pub email: EmailConfig,
    pub catalog: CatalogConfig,
    /// Context tags used when rendering trees
    pub tree: TreeConfig,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// How many times a create is attempted when it loses an edit number race
    pub edit_allocation_retries: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Native username/password authentication
    pub native: NativeAuthConfig,
    /// Security settings (JWT, CORS)
    pub security: SecurityConfig,
}

/// Native username/password authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NativeAuthConfig {
    /// Enable native authentication (login/registration)
    pub enabled: bool,
    /// Allow new users to self-register
    pub allow_registration: bool,
    /// Password validation rules
    pub password: PasswordConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
    /// How long password reset tokens are valid
    #[serde(with = "humantime_serde")]
    pub password_reset_token_duration: Duration,
    /// Refuse logins until the account's email address has been validated
    pub email_validation_required: bool,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Session timeout duration
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Cookie name for session token
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
}

/// Password validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

/// Security configuration for JWT and CORS.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// JWT token expiry duration
    #[serde(with = "humantime_serde")]
    pub jwt_expiry: Duration,
    pub cors: CorsConfig,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification: either `*` or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// Email configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
// Note: Cannot use deny_unknown_fields here due to #[serde(flatten)] on transport
pub struct EmailConfig {
    #[serde(flatten)]
    pub transport: EmailTransportConfig,
    pub from_email: String,
    pub from_name: String,
    pub reply_to: Option<String>,
}

/// Email transport configuration - either SMTP or file-based for testing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    },
    /// Write emails to files (for development/testing)
    File { path: String },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8200,
            dashboard_url: "http://localhost:5173".to_string(),
            database_url: None,
            database: DatabaseConfig::default(),
            secret_key: None,
            enable_otel_export: false,
            auth: AuthConfig::default(),
            email: EmailConfig::default(),
            catalog: CatalogConfig::default(),
            tree: TreeConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/openbioc".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            edit_allocation_retries: 3,
        }
    }
}

impl Default for NativeAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_registration: true,
            password: PasswordConfig::default(),
            session: SessionConfig::default(),
            password_reset_token_duration: Duration::from_secs(2 * 60 * 60),
            email_validation_required: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(24 * 60 * 60),
            cookie_name: "obc_session".to_string(),
            cookie_secure: true,
            cookie_same_site: "strict".to_string(),
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 6,
            max_length: 128,
            // Argon2id RFC recommendations
            argon2_memory_kib: 19456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_expiry: Duration::from_secs(24 * 60 * 60),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Url::parse("http://localhost:5173").into_iter().map(CorsOrigin::Url).collect(),
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            transport: EmailTransportConfig::default(),
            from_email: "noreply@example.com".to_string(),
            from_name: "OpenBio Catalog".to_string(),
            reply_to: None,
        }
    }
}

impl Default for EmailTransportConfig {
    fn default() -> Self {
        Self::File {
            path: "./emails".to_string(),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let native = &self.auth.native;
        if native.enabled {
            if self.secret_key.is_none() {
                return Err(Error::Internal {
                    operation: "Config validation: Native authentication is enabled but secret_key is not configured. \
                     Please set OBC_SECRET_KEY environment variable or add secret_key to config file."
                        .to_string(),
                });
            }

            if native.password.min_length > native.password.max_length {
                return Err(Error::Internal {
                    operation: format!(
                        "Config validation: Invalid password configuration: min_length ({}) cannot be greater than max_length ({})",
                        native.password.min_length, native.password.max_length
                    ),
                });
            }

            if native.password.min_length < 1 {
                return Err(Error::Internal {
                    operation: "Config validation: Invalid password configuration: min_length must be at least 1".to_string(),
                });
            }
        }

        if self.auth.security.jwt_expiry.as_secs() < 300 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too short (minimum 5 minutes)".to_string(),
            });
        }

        if self.auth.security.jwt_expiry.as_secs() > 86400 * 30 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too long (maximum 30 days)".to_string(),
            });
        }

        let cors = &self.auth.security.cors;
        if cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        let has_wildcard = cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        if self.catalog.edit_allocation_retries == 0 {
            return Err(Error::Internal {
                operation: "Config validation: catalog.edit_allocation_retries must be at least 1".to_string(),
            });
        }

        let tags = self.tree.tags();
        if tags.iter().any(|tag| tag.is_empty()) || self.tree.root_marker.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: tree tags and root_marker cannot be empty".to_string(),
            });
        }
        for (i, tag) in tags.iter().enumerate() {
            if tags[i + 1..].contains(tag) {
                return Err(Error::Internal {
                    operation: format!("Config validation: tree tag '{tag}' is used for more than one tree"),
                });
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("OBC_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args() -> Args {
        Args {
            config: "test.yaml".to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
port: 9000
dashboard_url: https://catalog.example.org
"#,
            )?;

            jail.set_env("OBC_HOST", "127.0.0.1");
            jail.set_env("OBC_PORT", "8080");

            let config = Config::load(&args())?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.dashboard_url, "https://catalog.example.org");
            assert_eq!(config.bind_address(), "127.0.0.1:8080");

            Ok(())
        });
    }

    #[test]
    fn test_database_url_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
database:
  url: postgres://yaml/openbioc
  max_connections: 4
"#,
            )?;
            jail.set_env("DATABASE_URL", "postgres://env/openbioc");

            let config = Config::load(&args())?;
            assert_eq!(config.database.url, "postgres://env/openbioc");
            assert_eq!(config.database.max_connections, 4);
            assert!(config.database_url.is_none());

            Ok(())
        });
    }

    #[test]
    fn test_auth_and_catalog_sections() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: "test-secret-key-for-testing"
auth:
  native:
    allow_registration: false
    password_reset_token_duration: 30m
    password:
      min_length: 12
  security:
    jwt_expiry: "2h"
catalog:
  edit_allocation_retries: 5
tree:
  search_tool: st
"#,
            )?;

            let config = Config::load(&args())?;

            assert!(config.auth.native.enabled);
            assert!(!config.auth.native.allow_registration);
            assert_eq!(config.auth.native.password.min_length, 12);
            assert_eq!(config.auth.native.password.max_length, 128);
            assert_eq!(config.auth.native.password_reset_token_duration, Duration::from_secs(30 * 60));
            assert_eq!(config.auth.security.jwt_expiry, Duration::from_secs(2 * 60 * 60));
            assert_eq!(config.catalog.edit_allocation_retries, 5);
            assert_eq!(config.tree.search_tool, "st");
            assert_eq!(config.tree.dependency_tool, "2");

            Ok(())
        });
    }

    #[test]
    fn test_email_transport_from_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
email:
  type: smtp
  host: smtp.example.org
  port: 587
  username: mailer
  password: secret
  use_tls: true
  from_email: catalog@example.org
  from_name: Catalog
"#,
            )?;

            let config = Config::load(&args())?;
            assert!(matches!(
                config.email.transport,
                EmailTransportConfig::Smtp { ref host, port: 587, .. } if host == "smtp.example.org"
            ));
            assert_eq!(config.email.from_email, "catalog@example.org");

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\nunknown_section: 1\n")?;
            assert!(Config::load(&args()).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.auth.native.password.min_length, 6);
        assert_eq!(config.auth.native.password_reset_token_duration, Duration::from_secs(2 * 60 * 60));
        assert_eq!(config.catalog.edit_allocation_retries, 3);
        assert_eq!(config.tree, TreeConfig::default());
    }

    #[test]
    fn test_config_validation_native_auth_missing_secret() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("secret_key is not configured"));
    }

    #[test]
    fn test_config_validation_invalid_password_length() {
        let mut config = Config {
            secret_key: Some("test-key".to_string()),
            ..Default::default()
        };
        config.auth.native.password.min_length = 10;
        config.auth.native.password.max_length = 5;

        assert!(config.validate().unwrap_err().to_string().contains("min_length"));
    }

    #[test]
    fn test_config_validation_colliding_tree_tags() {
        let mut config = Config {
            secret_key: Some("test-key".to_string()),
            ..Default::default()
        };
        config.tree.variables = config.tree.dependency_tool.clone();

        assert!(config.validate().unwrap_err().to_string().contains("more than one tree"));
    }

    #[test]
    fn test_config_validation_wildcard_with_credentials() {
        let mut config = Config {
            secret_key: Some("test-key".to_string()),
            ..Default::default()
        };
        config.auth.security.cors.allowed_origins = vec![CorsOrigin::Wildcard];

        assert!(config.validate().unwrap_err().to_string().contains("wildcard"));
        config.auth.security.cors.allow_credentials = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_valid_config() {
        let config = Config {
            secret_key: Some("test-secret-key".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
