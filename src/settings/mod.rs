//! Application configuration
//!
//! Sections mirror `config/default.toml`. The core section deserializes
//! straight into [`CoreConfig`]; server and reconnect settings are turned
//! into a [`TransportConfig`].

mod loader;

pub use loader::{load_config, DEFAULT_CONFIG};
#[cfg(test)]
pub(crate) use loader::parse_toml;

use anyhow::{bail, Result};
use flowlens_core::CoreConfig;
use flowlens_transport::{BackoffPolicy, TransportConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Project in focus at startup
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub core: CoreConfig,
    pub server: ServerSettings,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

/// Server endpoints and timings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub ws_url: String,
    pub api_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    30
}

/// Socket reconnect schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// 0 = unlimited
    pub max_attempts: u32,
    pub jitter: bool,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            max_attempts: policy.max_attempts,
            jitter: policy.jitter,
        }
    }
}

impl ReconnectSettings {
    fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new()
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_multiplier(self.multiplier)
            .with_max_attempts(self.max_attempts)
            .with_jitter(self.jitter)
    }
}

impl AppConfig {
    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.server.ws_url.trim().is_empty() {
            bail!("server.ws_url must not be empty");
        }
        if self.server.api_url.trim().is_empty() {
            bail!("server.api_url must not be empty");
        }
        if self.server.request_timeout_secs == 0 {
            bail!("server.request_timeout_secs must be at least 1");
        }
        if self.reconnect.multiplier < 1.0 {
            bail!(
                "reconnect.multiplier must be >= 1.0 (got {})",
                self.reconnect.multiplier
            );
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            bail!("reconnect.initial_delay_ms exceeds reconnect.max_delay_ms");
        }
        if self.core.history_cap == 0 {
            bail!("core.history_cap must be at least 1");
        }
        Ok(())
    }

    /// Startup project, with the empty string meaning none
    #[must_use]
    pub fn project(&self) -> Option<String> {
        self.project_id.clone().filter(|p| !p.is_empty())
    }

    /// Transport settings
    #[must_use]
    pub fn transport(&self) -> TransportConfig {
        TransportConfig::new()
            .with_ws_url(self.server.ws_url.clone())
            .with_api_url(self.server.api_url.clone())
            .with_token(self.server.token.clone())
            .with_heartbeat_interval(Duration::from_secs(self.server.heartbeat_interval_secs))
            .with_request_timeout(Duration::from_secs(self.server.request_timeout_secs))
            .with_reconnect(self.reconnect.policy())
    }
}
