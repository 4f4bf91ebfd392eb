//! Mapper configuration loaded from a YAML file keyed by environment.
//!
//! ```yaml
//! development:
//!   clients:
//!     default:
//!       database: bands_development
//!       hosts:
//!         - localhost:27017
//!   options:
//!     app_name: bands
//!     log_level: :debug
//! ```

use serde::{Deserialize, Deserializer, de};
use std::{collections::BTreeMap, env, fmt, path::Path, str::FromStr};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Variable consulted for the environment name when none is given explicitly.
pub const ENVIRONMENT_VARIABLE: &str = "DOCMAP_ENV";
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_HOST: &str = "localhost:27017";
pub const DEFAULT_CLIENT: &str = "default";

/// Settings for a single named client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

impl ClientSettings {
    /// Connection string for the client: the configured `uri`, or one built from `hosts`.
    pub fn dsn(&self) -> String {
        if let Some(uri) = &self.uri {
            return uri.clone();
        }

        if self.hosts.is_empty() {
            format!("mongodb://{}", DEFAULT_HOST)
        } else {
            format!("mongodb://{}", self.hosts.join(","))
        }
    }
}

/// Global mapper options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapperOptions {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            app_name: None,
            log_level: LogLevel::Info,
        }
    }
}

/// Log verbosity, written either plainly (`debug`) or symbol style (`:debug`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = DocumentStoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim_start_matches(':').to_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" | "fatal" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(DocumentStoreError::Configuration(format!(
                "unknown log level {}",
                value
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", log::LevelFilter::from(*self))
    }
}

#[derive(Debug, Deserialize)]
struct EnvironmentSettings {
    clients: Option<BTreeMap<String, ClientSettings>>,
    #[serde(default)]
    options: MapperOptions,
}

/// Clients and options of one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapperConfig {
    clients: BTreeMap<String, ClientSettings>,
    options: MapperOptions,
}

impl MapperConfig {
    /// Configuration pointing the default client at `database` on the local host.
    pub fn connect_to(database: &str) -> Self {
        let client = ClientSettings {
            database: Some(database.to_string()),
            hosts: vec![DEFAULT_HOST.to_string()],
            uri: None,
        };

        Self {
            clients: BTreeMap::from([(DEFAULT_CLIENT.to_string(), client)]),
            options: MapperOptions::default(),
        }
    }

    /// Parses the section for `environment` out of a YAML document.
    ///
    /// Without an explicit environment the `DOCMAP_ENV` variable is used, falling back to
    /// `development`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if the YAML is malformed, the
    /// environment is absent, the `clients` section is missing or an option is unknown.
    pub fn from_yaml_str(yaml: &str, environment: Option<&str>) -> DocumentStoreResult<Self> {
        let environment = environment
            .map(str::to_string)
            .or_else(|| env::var(ENVIRONMENT_VARIABLE).ok())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        let mut environments: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml)?;
        let section = environments
            .remove(&environment)
            .ok_or_else(|| DocumentStoreError::Configuration(format!(
                "no configuration for environment {}",
                environment
            )))?;

        let settings: EnvironmentSettings = serde_yaml::from_value(section)?;
        let clients = settings
            .clients
            .ok_or_else(|| DocumentStoreError::Configuration(format!(
                "no clients configured for environment {}",
                environment
            )))?;

        Ok(Self {
            clients,
            options: settings.options,
        })
    }

    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>, environment: Option<&str>) -> DocumentStoreResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml, environment)
    }

    /// Whether a `default` client is configured.
    pub fn configured(&self) -> bool {
        self.clients.contains_key(DEFAULT_CLIENT)
    }

    pub fn clients(&self) -> &BTreeMap<String, ClientSettings> {
        &self.clients
    }

    pub fn client(&self, name: &str) -> Option<&ClientSettings> {
        self.clients.get(name)
    }

    pub fn default_client(&self) -> Option<&ClientSettings> {
        self.client(DEFAULT_CLIENT)
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    /// Database name of client `name`, falling back to the application name.
    pub fn database(&self, name: &str) -> DocumentStoreResult<String> {
        self.client(name)
            .and_then(|client| client.database.clone())
            .or_else(|| self.options.app_name.clone())
            .ok_or_else(|| DocumentStoreError::Configuration(format!(
                "no database configured for client {}",
                name
            )))
    }

    /// Sets the `log` facade's maximum level to the configured one.
    pub fn apply_log_level(&self) {
        log::set_max_level(self.options.log_level.into());
    }
}
