//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for a server instance.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host or IP to bind. Empty binds all interfaces.
    pub host: String,

    /// TCP port. 0 asks the OS for an ephemeral port.
    pub port: u16,

    /// TLS settings.
    pub tls: TlsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8080,
            tls: TlsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// The `host:port` string handed to the OS when binding.
    pub fn bind_address(&self) -> String {
        bind_address(&self.host, self.port)
    }
}

/// Format a bind address. IPv6 literals get brackets; an empty host means
/// every IPv4 interface.
pub fn bind_address(host: &str, port: u16) -> String {
    let host = host.trim();
    if host.is_empty() {
        format!("0.0.0.0:{}", port)
    } else if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct TlsConfig {
    /// Terminate TLS on the listener.
    pub enabled: bool,

    /// ACME certificate management. Used unless `certificate` is set.
    pub autocert: AutoCertConfig,

    /// Static certificate files, bypassing ACME.
    pub certificate: Option<CertificateFilesConfig>,
}

/// ACME (autocert) settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AutoCertConfig {
    /// Directory where issued certificates and the account key are cached.
    pub cache_dir: String,

    /// Host names certificates may be issued for.
    pub hosts: Vec<String>,

    /// Contact e-mail addresses registered with the authority.
    pub contact: Vec<String>,

    /// Use the authority's staging directory.
    pub staging: bool,
}

/// PEM certificate chain and private key on disk.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CertificateFilesConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log output format.
    pub log_format: LogFormat,

    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Address of the scrape endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Split a comma separated host list, trimming each entry and dropping
/// entries that are empty after trimming.
pub fn parse_host_list(raw: &str) -> Vec<String> {
    normalize_hosts(raw.split(','))
}

/// Trim host entries and drop empty ones.
pub fn normalize_hosts<I, S>(hosts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    hosts
        .into_iter()
        .map(|h| h.as_ref().trim().to_string())
        .filter(|h| !h.is_empty())
        .collect()
}
