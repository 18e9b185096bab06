//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config
//! file. They are deserialized directly and converted into the
//! application-layer policies through the `*_policy()` methods.
//!
//! Example configuration:
//!
//! ```toml
//! [gather]
//! min_count = 2
//! max_count = 6
//! failure_mode = "adaptive"
//!
//! [[voices]]
//! provider = "openai"
//! model = "gpt-4o"
//! role = "You argue from first principles."
//! fallbacks = ["openai/gpt-4o-mini"]
//!
//! [providers.openai]
//! base_url = "https://api.openai.com/v1"
//! api_key_env = "OPENAI_API_KEY"
//! ```

use chorus_application::{FailureMode, GatherPolicy, MonitorConfig, RoundPolicy, SessionPolicy};
use chorus_domain::{DomainError, VoiceIdentity, VoiceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Voice roster
    pub voices: Vec<FileVoiceConfig>,
    /// Dialogue round sequence ([[rounds]] entries)
    pub rounds: Vec<chorus_domain::RoundSpec>,
    /// Gathering policy
    pub gather: FileGatherConfig,
    /// Round aggregation settings
    pub round: FileRoundConfig,
    /// Session-level settings
    pub session: FileSessionConfig,
    /// Infrastructure monitor settings
    pub monitor: FileMonitorConfig,
    /// Provider endpoints keyed by provider name
    pub providers: BTreeMap<String, FileProviderConfig>,
    /// Directory for checkpoint files; `None` disables checkpointing
    pub checkpoint_dir: Option<String>,
    /// JSONL event log path; `None` keeps events on tracing only
    pub event_log: Option<String>,
}

/// One `[[voices]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileVoiceConfig {
    pub provider: String,
    pub model: String,
    pub role: Option<String>,
    pub temperature: f64,
    /// Fallback identities as `provider/model` strings
    pub fallbacks: Vec<String>,
}

impl Default for FileVoiceConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            role: None,
            temperature: 0.7,
            fallbacks: Vec::new(),
        }
    }
}

impl FileVoiceConfig {
    pub fn to_spec(&self) -> Result<VoiceSpec, DomainError> {
        if self.provider.is_empty() || self.model.is_empty() {
            return Err(DomainError::InvalidIdentity(
                "voice entry needs both provider and model".to_string(),
            ));
        }
        let mut spec = VoiceSpec::new(VoiceIdentity::new(&self.provider, &self.model))
            .with_temperature(self.temperature);
        if let Some(role) = &self.role {
            spec = spec.with_role(role);
        }
        for fallback in &self.fallbacks {
            spec = spec.with_fallback(fallback.parse()?);
        }
        Ok(spec)
    }
}

/// `[gather]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileGatherConfig {
    pub min_count: usize,
    pub max_count: usize,
    pub failure_mode: FailureMode,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub exponential_backoff: bool,
}

impl Default for FileGatherConfig {
    fn default() -> Self {
        let policy = GatherPolicy::default();
        Self {
            min_count: policy.min_count,
            max_count: policy.max_count,
            failure_mode: policy.failure_mode,
            retry_attempts: policy.retry_attempts,
            retry_backoff_ms: policy.retry_backoff.as_millis() as u64,
            exponential_backoff: policy.exponential_backoff,
        }
    }
}

impl FileGatherConfig {
    pub fn to_policy(&self) -> GatherPolicy {
        GatherPolicy {
            min_count: self.min_count,
            max_count: self.max_count,
            failure_mode: self.failure_mode,
            retry_attempts: self.retry_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            exponential_backoff: self.exponential_backoff,
        }
    }
}

/// `[round]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRoundConfig {
    pub emergence_threshold: f64,
    pub minimum_perspectives: usize,
}

impl Default for FileRoundConfig {
    fn default() -> Self {
        let policy = RoundPolicy::default();
        Self {
            emergence_threshold: policy.emergence_threshold,
            minimum_perspectives: policy.minimum_perspectives,
        }
    }
}

/// `[session]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSessionConfig {
    pub consensus_threshold: f64,
    pub consensus_window: usize,
    pub checkpoint_interval: usize,
}

impl Default for FileSessionConfig {
    fn default() -> Self {
        let policy = SessionPolicy::default();
        Self {
            consensus_threshold: policy.consensus_threshold,
            consensus_window: policy.consensus_window,
            checkpoint_interval: policy.checkpoint_interval,
        }
    }
}

/// `[monitor]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMonitorConfig {
    pub enabled: bool,
    pub tick_secs: u64,
    pub degrading_threshold: f64,
    pub critical_threshold: f64,
    pub max_healing_attempts: u32,
    pub correlated_threshold: usize,
}

impl Default for FileMonitorConfig {
    fn default() -> Self {
        let config = MonitorConfig::default();
        Self {
            enabled: true,
            tick_secs: config.tick_interval.as_secs(),
            degrading_threshold: config.degrading_threshold,
            critical_threshold: config.critical_threshold,
            max_healing_attempts: config.max_healing_attempts,
            correlated_threshold: config.correlated_threshold,
        }
    }
}

impl FileMonitorConfig {
    pub fn to_config(&self) -> Option<MonitorConfig> {
        if !self.enabled {
            return None;
        }
        Some(MonitorConfig {
            tick_interval: Duration::from_secs(self.tick_secs),
            degrading_threshold: self.degrading_threshold,
            critical_threshold: self.critical_threshold,
            max_healing_attempts: self.max_healing_attempts,
            correlated_threshold: self.correlated_threshold,
            ..MonitorConfig::default()
        })
    }
}

/// One `[providers.<name>]` entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProviderConfig {
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Serve canned replies instead of HTTP (offline/demo provider)
    pub static_replies: Vec<String>,
}

impl FileConfig {
    /// Resolve the configured voice roster into specs.
    pub fn voice_specs(&self) -> Result<Vec<VoiceSpec>, DomainError> {
        self.voices.iter().map(FileVoiceConfig::to_spec).collect()
    }

    /// Assemble the complete session policy from the file sections.
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            gather: self.gather.to_policy(),
            round: RoundPolicy {
                emergence_threshold: self.round.emergence_threshold,
                minimum_perspectives: self.round.minimum_perspectives,
            },
            consensus_threshold: self.session.consensus_threshold,
            consensus_window: self.session.consensus_window,
            checkpoint_interval: self.session.checkpoint_interval,
            monitor: self.monitor.to_config(),
            ..SessionPolicy::default()
        }
    }
}
