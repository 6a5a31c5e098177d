use axum::http::HeaderValue;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub process_sampler: ProcessSamplerConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed cross-origin sources; a single "*" allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origins() -> Vec<String> {
    [
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:3001",
        "http://127.0.0.1:3001",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Capacity of the bandwidth history ring (one point per tick).
    #[serde(default = "default_history_length")]
    pub history_length: usize,
    /// Reserved. Connections missing from an enumeration are dropped immediately.
    #[serde(default = "default_stale_connection_grace_secs")]
    pub stale_connection_grace_secs: u64,
    /// How often to log app stats (subscribers, tick totals) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            history_length: default_history_length(),
            stale_connection_grace_secs: default_stale_connection_grace_secs(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_history_length() -> usize {
    30
}

fn default_stale_connection_grace_secs() -> u64 {
    5
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessSamplerConfig {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Budget for one invocation; the child is killed past it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProcessSamplerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_command() -> String {
    "nettop".into()
}

fn default_args() -> Vec<String> {
    ["-P", "-L", "1", "-J", "bytes_in,bytes_out", "-x"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Frames queued per WebSocket subscriber; a subscriber whose queue is full is dropped.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

fn default_subscriber_buffer() -> usize {
    16
}

impl AppConfig {
    /// Load from `$CONFIG_FILE`, else `config.toml` if present, else built-in defaults;
    /// then apply `HOST` / `PORT` from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::load_from_path(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from_path(DEFAULT_CONFIG_PATH)?
            }
            Err(_) => {
                tracing::info!("No config file; using defaults");
                AppConfig::default()
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HOST` and `PORT` from the given lookup (the process environment in `load`).
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("PORT must be a port number, got {:?}: {}", port, e))?;
        }
        Ok(())
    }

    /// True when any origin may connect.
    pub fn cors_allows_any(&self) -> bool {
        self.server.cors_origins.iter().any(|o| o == "*")
    }

    /// Origins as header values; validated at load time.
    pub fn cors_header_values(&self) -> Vec<HeaderValue> {
        self.server
            .cors_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");
        for origin in &self.server.cors_origins {
            anyhow::ensure!(
                HeaderValue::from_str(origin).is_ok(),
                "server.cors_origins contains an invalid origin: {:?}",
                origin
            );
        }
        anyhow::ensure!(
            self.monitoring.tick_interval_ms > 0,
            "monitoring.tick_interval_ms must be > 0, got {}",
            self.monitoring.tick_interval_ms
        );
        anyhow::ensure!(
            self.monitoring.history_length > 0,
            "monitoring.history_length must be > 0, got {}",
            self.monitoring.history_length
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        anyhow::ensure!(
            !self.process_sampler.command.is_empty(),
            "process_sampler.command must be non-empty"
        );
        anyhow::ensure!(
            self.process_sampler.timeout_ms > 0,
            "process_sampler.timeout_ms must be > 0, got {}",
            self.process_sampler.timeout_ms
        );
        anyhow::ensure!(
            self.publishing.subscriber_buffer > 0,
            "publishing.subscriber_buffer must be > 0, got {}",
            self.publishing.subscriber_buffer
        );
        Ok(())
    }
}
