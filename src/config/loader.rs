//! Configuration loading from disk and the environment.
//!
//! Priority: explicit builder options > environment variables > config file > defaults.
//! The first two layers live here; builder options are applied by
//! [`ServerBuilder`](crate::lifecycle::ServerBuilder).

use std::fs;
use std::path::Path;

use crate::config::schema::{parse_host_list, CertificateFilesConfig, LogFormat, ServerConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Prefix shared by every environment variable the server reads.
pub const ENV_PREFIX: &str = "SERVE_";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { key: String, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { key, value } => {
                write!(f, "Invalid value {:?} for environment variable {}", value, key)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ServerConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load the optional config file, then overlay the process environment.
///
/// The merged result is validated again since the environment may have
/// enabled TLS without supplying its settings.
pub fn load(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration file");
            load_config(path)?
        }
        None => ServerConfig::default(),
    };

    apply_env(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay `SERVE_*` environment variables onto `config`.
pub fn apply_env(config: &mut ServerConfig) -> Result<(), ConfigError> {
    apply_env_from(config, |key| std::env::var(key).ok())
}

/// Overlay environment-style settings read through `lookup`.
///
/// Only keys that are present override the existing value.
pub fn apply_env_from<F>(config: &mut ServerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

    if let Some(host) = var("HOST") {
        config.host = host;
    }
    if let Some(port) = var("PORT") {
        config.port = parse_env("PORT", &port)?;
    }
    if let Some(enabled) = var("TLS") {
        config.tls.enabled = parse_bool("TLS", &enabled)?;
    }
    if let Some(dir) = var("ACME_CACHE_DIR") {
        config.tls.autocert.cache_dir = dir;
    }
    if let Some(hosts) = var("ACME_HOSTS") {
        config.tls.autocert.hosts = parse_host_list(&hosts);
    }
    if let Some(contact) = var("ACME_CONTACT") {
        config.tls.autocert.contact = parse_host_list(&contact);
    }
    if let Some(staging) = var("ACME_STAGING") {
        config.tls.autocert.staging = parse_bool("ACME_STAGING", &staging)?;
    }

    match (var("TLS_CERT"), var("TLS_KEY")) {
        (Some(cert_path), Some(key_path)) => {
            config.tls.certificate = Some(CertificateFilesConfig { cert_path, key_path });
        }
        (Some(cert_path), None) => match config.tls.certificate.as_mut() {
            Some(files) => files.cert_path = cert_path,
            None => {
                return Err(ConfigError::Env {
                    key: format!("{}TLS_KEY", ENV_PREFIX),
                    value: String::new(),
                })
            }
        },
        (None, Some(key_path)) => match config.tls.certificate.as_mut() {
            Some(files) => files.key_path = key_path,
            None => {
                return Err(ConfigError::Env {
                    key: format!("{}TLS_CERT", ENV_PREFIX),
                    value: String::new(),
                })
            }
        },
        (None, None) => {}
    }

    if let Some(format) = var("LOG_FORMAT") {
        config.observability.log_format = parse_env::<LogFormat>("LOG_FORMAT", &format)?;
    }
    if let Some(addr) = var("METRICS_ADDRESS") {
        config.observability.metrics_enabled = !addr.trim().is_empty();
        config.observability.metrics_address = addr;
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: format!("{}{}", ENV_PREFIX, name),
        value: value.to_string(),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Env {
            key: format!("{}{}", ENV_PREFIX, name),
            value: value.to_string(),
        }),
    }
}
