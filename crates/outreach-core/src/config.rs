use crate::backoff::BackoffConfig;
use crate::error::{OutreachError, Result};
use crate::ledger::InDoubtPolicy;
use crate::paths;
use crate::types::Channel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
    /// Maximum number of due leads fetched per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub in_doubt: InDoubtPolicy,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

fn default_lease_ttl() -> u64 {
    300
}

fn default_batch_size() -> usize {
    50
}

fn default_render_timeout() -> u64 {
    30
}

fn default_dispatch_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_tick_interval() -> u64 {
    60
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: default_lease_ttl(),
            batch_size: default_batch_size(),
            render_timeout_secs: default_render_timeout(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            max_retries: default_max_retries(),
            backoff: BackoffConfig::default(),
            in_doubt: InDoubtPolicy::default(),
            tick_interval_secs: default_tick_interval(),
        }
    }
}

impl OrchestratorConfig {
    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_ttl_secs.min(i64::MAX as u64) as i64)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

// ---------------------------------------------------------------------------
// ChannelBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelBackend {
    /// JSON POST to a provider endpoint.
    Http {
        endpoint: String,
        /// Environment variable holding the bearer token.
        #[serde(default)]
        token_env: Option<String>,
        /// Sender identity passed through to the provider.
        #[serde(default)]
        from: Option<String>,
    },
    /// Append each message as a JSON line to a local file.
    Outbox { path: String },
}

fn default_channels() -> BTreeMap<String, ChannelBackend> {
    Channel::all()
        .iter()
        .map(|c| {
            (
                c.as_str().to_string(),
                ChannelBackend::Outbox {
                    path: format!("{}/{}.jsonl", paths::OUTBOX_DIR, c.as_str()),
                },
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default = "default_channels")]
    pub channels: BTreeMap<String, ChannelBackend>,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            orchestrator: OrchestratorConfig::default(),
            channels: default_channels(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(OutreachError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Configured backends with their parsed channel. Unknown keys are
    /// skipped here and reported by [`Config::validate`].
    pub fn channel_backends(&self) -> Vec<(Channel, &ChannelBackend)> {
        self.channels
            .iter()
            .filter_map(|(k, b)| Channel::from_str(k).ok().map(|c| (c, b)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };
        let o = &self.orchestrator;

        for key in self.channels.keys() {
            if Channel::from_str(key).is_err() {
                warn(
                    WarnLevel::Warning,
                    format!("unknown channel '{key}' in channels"),
                );
            }
        }
        for (key, backend) in &self.channels {
            match backend {
                ChannelBackend::Http { endpoint, .. } if endpoint.trim().is_empty() => warn(
                    WarnLevel::Error,
                    format!("channel '{key}' has an empty endpoint"),
                ),
                ChannelBackend::Outbox { path } if path.trim().is_empty() => warn(
                    WarnLevel::Error,
                    format!("channel '{key}' has an empty outbox path"),
                ),
                _ => {}
            }
        }
        if o.batch_size == 0 {
            warn(
                WarnLevel::Error,
                "orchestrator.batch_size is 0; ticks will process nothing".into(),
            );
        }
        if o.lease_ttl_secs == 0 {
            warn(
                WarnLevel::Error,
                "orchestrator.lease_ttl_secs is 0; leases expire immediately".into(),
            );
        }
        if o.backoff.base_delay_secs > o.backoff.max_delay_secs {
            warn(
                WarnLevel::Warning,
                format!(
                    "orchestrator.backoff.base_delay_secs ({}) exceeds max_delay_secs ({})",
                    o.backoff.base_delay_secs, o.backoff.max_delay_secs
                ),
            );
        }
        if o.lease_ttl_secs > 0
            && o.lease_ttl_secs <= o.render_timeout_secs + o.dispatch_timeout_secs
        {
            warn(
                WarnLevel::Warning,
                "orchestrator.lease_ttl_secs is shorter than one render plus dispatch; \
                 leases may expire mid-tick"
                    .into(),
            );
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
