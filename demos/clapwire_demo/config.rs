use std::time::Duration;

use clapwire::{IpNet, LogConfig, Masked};
use serde::{Deserialize, Serialize};

/// Configuration for the demo `serve` command.
///
/// Every leaf becomes a flag (`--listen-addr`, `--log-level`, ...) and an
/// env var (`CLAPWIRE_DEMO_LISTEN_ADDR`, `CLAPWIRE_DEMO_LOG_LEVEL`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServeConfig {
    pub log: LogConfig,

    /// Address to listen on.
    pub listen_addr: String,

    /// Idle timeout, e.g. `90s` or `1h30m`.
    pub idle_timeout: Duration,

    /// Network allowed to connect, e.g. `10.0.0.0/8`.
    pub allow_from: Option<IpNet>,

    /// Extra names to greet, comma separated from env or flags.
    pub greet: Vec<String>,

    /// Shared secret. Never printed.
    pub token: Masked<String>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            listen_addr: "127.0.0.1:8080".into(),
            idle_timeout: Duration::from_secs(90),
            allow_from: None,
            greet: Vec::new(),
            token: Masked::default(),
        }
    }
}

/// Configuration for `paths`; it has no settings of its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {}
