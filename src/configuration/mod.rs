use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

mod error;
pub mod watcher;

use crate::authority::kubernetes;
use crate::identity;
pub use error::Error;

#[derive(Clone, Debug, Deserialize)]
pub struct Configuration {
    pub server: ServerConfig,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub identity: identity::Config,
    pub authority: kubernetes::Config,
    #[serde(default)]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    #[serde(default = "ServerConfig::default_query_timeout")]
    pub query_timeout: u64,
    #[serde(default = "ServerConfig::default_query_timeout_grace_period")]
    pub query_timeout_grace_period: u64,
    /// Upper bound for a single identity resolution, review calls included.
    #[serde(default = "ServerConfig::default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    pub tls: Option<ServerTlsConfig>,
}

impl ServerConfig {
    fn default_port() -> u16 {
        8000
    }

    fn default_query_timeout() -> u64 {
        3600
    }

    fn default_query_timeout_grace_period() -> u64 {
        60
    }

    fn default_resolve_timeout_ms() -> u64 {
        10_000
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ServerTlsConfig {
    pub server_certificate_bundle: String,
    pub server_private_key: String,
    pub client_ca_bundle: Option<String>,
}

impl ServerTlsConfig {
    fn resolve_paths(&mut self, base_dir: &Path) {
        let paths = [
            Some(&mut self.server_certificate_bundle),
            Some(&mut self.server_private_key),
            self.client_ca_bundle.as_mut(),
        ];
        for path in paths.into_iter().flatten() {
            *path = resolve_path(base_dir, &*path).to_string_lossy().into_owned();
        }
    }
}

/// Anchors a relative path from the configuration file at the directory holding that file.
pub fn resolve_path(base_dir: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "GlobalConfig::default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            worker_threads: GlobalConfig::default_worker_threads(),
        }
    }
}

impl GlobalConfig {
    fn default_worker_threads() -> usize {
        4
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub tracing: Option<TracingConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TracingConfig {
    pub endpoint: String,
    pub sampling_rate: f64,
}

impl Configuration {
    /// Loads the file at `path`; relative file paths inside it are taken from its directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)?;
        let mut config = Self::load_from_str(&config_str)?;

        let base_dir = path.parent().unwrap_or(Path::new("."));
        if let Some(tls) = config.server.tls.as_mut() {
            tls.resolve_paths(base_dir);
        }
        config.authority.resolve_paths(base_dir);

        Ok(config)
    }

    pub fn load_from_str(slice: &str) -> Result<Self, Error> {
        let config: Configuration = toml::from_str(slice).map_err(|e| {
            println!("Configuration file format error:");
            println!("{e}");
            Error::ConfigurationFileFormat(e.to_string())
        })?;

        if config.identity.username_claim_field.is_empty() {
            return Err(Error::Identity(
                "username_claim_field must not be empty".to_string(),
            ));
        }

        if config.server.resolve_timeout_ms == 0 {
            return Err(Error::ConfigurationFileFormat(
                "server.resolve_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if config.global.worker_threads == 0 {
            return Err(Error::ConfigurationFileFormat(
                "global.worker_threads must be greater than zero".to_string(),
            ));
        }

        config.authority.validate()?;

        Ok(config)
    }
}
