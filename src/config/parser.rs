//! Configuration parser for loading catalog configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, CatalogSyncError, Result};
use std::path::Path;
use tracing::{debug, info};

use super::spec::{CatalogConfig, ConnectionConfig};

/// Environment variable overriding `connection.endpoint`.
pub const ENV_ENDPOINT: &str = "CATALOG_ENDPOINT";

/// Configuration parser for loading catalog configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<CatalogConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(CatalogSyncError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CatalogSyncError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<CatalogConfig> {
        debug!("Parsing YAML configuration");

        let config: CatalogConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            CatalogSyncError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration (catalog: {}, catalog_v1: {})",
            config.catalog.is_some(),
            config.catalog_v1.is_some()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<CatalogConfig> {
        let mut config = self.load_file(path)?;
        apply_env_overrides(&mut config.connection, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                CatalogSyncError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Reads the access secret from the variable named by `connection.secret_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is not set.
    pub fn get_secret(connection: &ConnectionConfig) -> Result<String> {
        std::env::var(&connection.secret_env).map_err(|_| {
            CatalogSyncError::Config(ConfigError::MissingEnvVar {
                name: connection.secret_env.clone(),
            })
        })
    }
}

/// Applies environment overrides to the connection settings.
fn apply_env_overrides(connection: &mut ConnectionConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(endpoint) = lookup(ENV_ENDPOINT) {
        debug!("Overriding connection.endpoint from environment");
        connection.endpoint = endpoint;
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["catalog.yaml", "catalog.yml", "schema.yaml", "schema.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(CatalogSyncError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Generation, RetentionPolicy};

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
catalog:
  collections:
    C1: {}
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        let (generation, section) = config.active_section().unwrap();
        assert_eq!(generation, Generation::Current);
        assert_eq!(section.collections.len(), 1);
        assert_eq!(section.retention_policy, RetentionPolicy::Destroy);
        assert_eq!(config.connection.page_size, 64);
    }

    #[test]
    fn test_parse_full_legacy_config() {
        let yaml = r#"
connection:
  endpoint: https://catalog.example.com
  page_size: 100
  concurrency: 2

catalog_v1:
  retention_policy: retain
  collections:
    users:
      history_days: 30
  indexes:
    users_by_email:
      source: Collection("users")
      terms:
        - field: data.email
      unique: true
  functions:
    login:
      body: 'Query(Lambda(["email", "password"], Login(Match(Index("users_by_email"), Var("email")), {password: Var("password")})))'
      role: Role("auth")
  roles:
    auth:
      privileges:
        - resource: Function("login")
          actions:
            call: true
      membership:
        - resource: Collection("users")
"#;
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        let (generation, section) = config.active_section().unwrap();
        assert_eq!(generation, Generation::Legacy);
        assert_eq!(section.retention_policy, RetentionPolicy::Retain);
        assert_eq!(section.object_count(), 4);
        assert_eq!(section.indexes["users_by_email"].unique, Some(true));
        assert_eq!(config.connection.endpoint, "https://catalog.example.com");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let yaml = r"
catalog:
  functions:
    f:
      body: x
      bdoy: y
";
        let result = ConfigParser::new().parse_yaml(yaml, None);
        assert!(matches!(
            result,
            Err(CatalogSyncError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_load_file_and_find() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, "catalog:\n  roles:\n    reader: {}\n").unwrap();

        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, path);

        let config = ConfigParser::new().load_file(&found).unwrap();
        assert!(config.catalog.unwrap().roles.contains_key("reader"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigParser::new().load_file("/nonexistent/catalog.yaml");
        assert!(matches!(
            result,
            Err(CatalogSyncError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_endpoint_override() {
        let mut connection = ConnectionConfig::default();
        apply_env_overrides(&mut connection, |name| {
            (name == ENV_ENDPOINT).then(|| String::from("https://override"))
        });
        assert_eq!(connection.endpoint, "https://override");
    }
}
