//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Result, TollgateError};
use crate::ratelimit::{Algorithm, LimitConfig};

/// Prefix for environment overrides, e.g. `TOLLGATE__SERVER__LISTEN_ADDR`.
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Header carrying the client identifier, set by a trusted proxy.
    /// When unset, clients are identified by peer address.
    #[serde(default)]
    pub identity_header: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            identity_header: None,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Windowing algorithm
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests admitted per client per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Evict clients idle this long. Defaults to two windows.
    #[serde(default)]
    pub idle_ttl_ms: Option<u64>,

    /// How often the eviction sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            idle_ttl_ms: None,
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u64 {
    5
}

fn default_sweep_interval() -> u64 {
    30_000
}

impl RateLimitingConfig {
    /// The limit these settings describe.
    pub fn limit(&self) -> LimitConfig {
        LimitConfig::new(Duration::from_millis(self.window_ms), self.max_requests)
    }

    /// Explicit idle TTL, if configured.
    pub fn idle_ttl(&self) -> Option<Duration> {
        self.idle_ttl_ms.map(Duration::from_millis)
    }

    /// Interval between eviction sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl TollgateConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from defaults, an optional YAML file, and
    /// `TOLLGATE__*` environment variables, in increasing priority.
    /// `PORT` then overrides the listen port.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: TollgateConfig = builder.build()?.try_deserialize()?;
        config.apply_port(std::env::var("PORT").ok().as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Override the listen port from a `PORT`-style value.
    pub fn apply_port(&mut self, port: Option<&str>) -> Result<()> {
        let Some(port) = port else {
            return Ok(());
        };
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|e| TollgateError::Config(format!("Invalid PORT {:?}: {}", port, e)))?;
        self.server.listen_addr.set_port(port);
        Ok(())
    }

    /// Check that the configuration describes a usable service.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.limit().validate()?;
        if self.rate_limiting.sweep_interval_ms == 0 {
            return Err(TollgateError::Config(
                "sweep_interval_ms must be positive".to_string(),
            ));
        }
        if let Some(ttl) = self.rate_limiting.idle_ttl_ms {
            if ttl < self.rate_limiting.window_ms {
                // Evicting a client inside its window would reset its quota.
                warn!(
                    idle_ttl_ms = ttl,
                    window_ms = self.rate_limiting.window_ms,
                    "idle_ttl_ms is shorter than the window"
                );
            }
        }
        Ok(())
    }
}
