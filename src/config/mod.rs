//! Configuration Module
//!
//! Provides TOML-based configuration for PgRelay with support for:
//! - One bridge definition per file (`[bridge]`, `[rabbitmq]`, `[postgres]`)
//! - File-path and glob arguments on the command line
//! - Environment variable substitution inside config files
//! - Required-key validation before any bridge starts

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use config::{File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

#[cfg(test)]
mod tests;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading a config file
    Io { path: PathBuf, source: std::io::Error },
    /// Parse error from the config builder
    Config {
        path: PathBuf,
        source: config::ConfigError,
    },
    /// TOML parsing error (direct string parse)
    Parse(toml::de::Error),
    /// Required keys missing or empty
    MissingKeys {
        path: PathBuf,
        keys: Vec<&'static str>,
    },
    /// Semantic validation error
    Validation(String),
    /// Invalid glob pattern on the command line
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
    /// A pattern resolved to no config files
    NoMatches(String),
    /// Two config files define a bridge with the same name
    DuplicateName(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "could not read {}: {}", path.display(), source)
            }
            ConfigError::Config { path, source } => {
                write!(f, "could not parse {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "parse error: {}", e),
            ConfigError::MissingKeys { path, keys } => write!(
                f,
                "missing or empty configuration options in {}: {}",
                path.display(),
                keys.join(", ")
            ),
            ConfigError::Validation(msg) => write!(f, "validation error: {}", msg),
            ConfigError::Pattern { pattern, source } => {
                write!(f, "invalid glob pattern '{}': {}", pattern, source)
            }
            ConfigError::NoMatches(pattern) => {
                write!(f, "no config files match '{}'", pattern)
            }
            ConfigError::DuplicateName(name) => {
                write!(f, "duplicate bridge name '{}'", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Validated configuration for a single bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Unique bridge name, used in logs
    pub name: String,
    /// Broker target
    pub rabbitmq: RabbitMqConfig,
    /// Database target
    pub postgres: PostgresConfig,
}

/// RabbitMQ broker target for a bridge
#[derive(Debug, Clone)]
pub struct RabbitMqConfig {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    /// Exchange to publish to. May be empty, in which case messages go to
    /// the broker's default exchange and no declaration is issued.
    pub exchange: String,
    pub exchange_type: String,
    pub username: String,
    pub password: String,
    /// Optional queue to declare before publishing
    pub queue: Option<String>,
}

/// PostgreSQL database target for a bridge
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Notification channel to LISTEN on
    pub channel: String,
    pub username: String,
    pub password: String,
}

// Deserialization targets. Every key is optional here so that a validation
// pass can report all missing keys at once instead of failing on the first.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBridgeConfig {
    bridge: RawBridgeSection,
    rabbitmq: RawRabbitMqSection,
    postgres: RawPostgresSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBridgeSection {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRabbitMqSection {
    host: Option<String>,
    port: Option<u16>,
    vhost: Option<String>,
    exchange: Option<String>,
    exchange_type: Option<String>,
    username: Option<String>,
    password: Option<String>,
    queue: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPostgresSection {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    channel: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

fn require_str(
    value: Option<String>,
    key: &'static str,
    missing: &mut Vec<&'static str>,
) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => {
            missing.push(key);
            String::new()
        }
    }
}

fn require_port(value: Option<u16>, key: &'static str, missing: &mut Vec<&'static str>) -> u16 {
    match value {
        Some(v) => v,
        None => {
            missing.push(key);
            0
        }
    }
}

/// Check that a channel name is a plain SQL identifier. The LISTEN command
/// interpolates the channel name, so anything else is rejected up front.
fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl RawBridgeConfig {
    fn into_config(self, path: &Path) -> Result<BridgeConfig, ConfigError> {
        let mut missing = Vec::new();

        let name = require_str(self.bridge.name, "bridge.name", &mut missing);
        let rabbitmq = RabbitMqConfig {
            host: require_str(self.rabbitmq.host, "rabbitmq.host", &mut missing),
            port: require_port(self.rabbitmq.port, "rabbitmq.port", &mut missing),
            vhost: require_str(self.rabbitmq.vhost, "rabbitmq.vhost", &mut missing),
            // The exchange key must be present but its value may be empty
            // (publish to the default exchange).
            exchange: match self.rabbitmq.exchange {
                Some(v) => v,
                None => {
                    missing.push("rabbitmq.exchange");
                    String::new()
                }
            },
            exchange_type: require_str(
                self.rabbitmq.exchange_type,
                "rabbitmq.exchange_type",
                &mut missing,
            ),
            username: require_str(self.rabbitmq.username, "rabbitmq.username", &mut missing),
            password: require_str(self.rabbitmq.password, "rabbitmq.password", &mut missing),
            queue: self.rabbitmq.queue,
        };
        let postgres = PostgresConfig {
            host: require_str(self.postgres.host, "postgres.host", &mut missing),
            port: require_port(self.postgres.port, "postgres.port", &mut missing),
            database: require_str(self.postgres.database, "postgres.database", &mut missing),
            channel: require_str(self.postgres.channel, "postgres.channel", &mut missing),
            username: require_str(self.postgres.username, "postgres.username", &mut missing),
            password: require_str(self.postgres.password, "postgres.password", &mut missing),
        };

        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys {
                path: path.to_path_buf(),
                keys: missing,
            });
        }

        if !is_sql_identifier(&postgres.channel) {
            return Err(ConfigError::Validation(format!(
                "postgres.channel '{}' is not a valid identifier",
                postgres.channel
            )));
        }

        Ok(BridgeConfig {
            name,
            rabbitmq,
            postgres,
        })
    }
}

impl BridgeConfig {
    /// Load one bridge configuration from a TOML file, with `${VAR}` and
    /// `${VAR:-default}` environment substitution applied to the file
    /// contents before parsing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Parsing config file {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let substituted = substitute_env_vars(&content);

        let cfg = config::Config::builder()
            .add_source(File::from_str(&substituted, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError::Config {
                path: path.to_path_buf(),
                source: e,
            })?;
        let raw: RawBridgeConfig = cfg.try_deserialize().map_err(|e| ConfigError::Config {
            path: path.to_path_buf(),
            source: e,
        })?;

        raw.into_config(path)
    }

    /// Parse a bridge configuration from a string (for testing, no env var
    /// substitution).
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawBridgeConfig = toml::from_str(content)?;
        raw.into_config(Path::new("<inline>"))
    }
}

/// Expand the command-line file/glob arguments into a concrete file list.
/// A pattern that matches nothing is a fatal startup error.
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();
    for pattern in patterns {
        let matches = glob::glob(pattern).map_err(|e| ConfigError::Pattern {
            pattern: pattern.clone(),
            source: e,
        })?;
        let mut matched_any = false;
        for entry in matches {
            match entry {
                Ok(path) => {
                    matched_any = true;
                    files.push(path);
                }
                Err(e) => {
                    return Err(ConfigError::Io {
                        path: e.path().to_path_buf(),
                        source: e.into_error(),
                    })
                }
            }
        }
        if !matched_any {
            return Err(ConfigError::NoMatches(pattern.clone()));
        }
    }
    Ok(files)
}

/// Load every bridge configuration named by the command-line arguments.
///
/// Bridge names must be unique across all loaded files; a duplicate is a
/// fatal startup error rather than a silent last-write-wins overwrite.
pub fn load_all(patterns: &[String]) -> Result<Vec<BridgeConfig>, ConfigError> {
    let files = expand_patterns(patterns)?;
    let mut configs = Vec::with_capacity(files.len());
    let mut seen = HashSet::new();
    for path in files {
        let config = BridgeConfig::load(&path)?;
        if !seen.insert(config.name.clone()) {
            return Err(ConfigError::DuplicateName(config.name));
        }
        configs.push(config);
    }
    Ok(configs)
}
