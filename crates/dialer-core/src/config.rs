//! # Dialer Configuration
//!
//! Configuration for the dialer core, grouped into sections the same way the
//! rest of the engine is grouped:
//!
//! - **[`GeneralConfig`]**: service identity and capacity limits
//! - **[`GatewayConfig`]**: callback URLs, caller id and how customers reach the agent
//! - **[`DialingConfig`]**: batch sizes and recycling behaviour
//! - **[`DetectionConfig`]**: what to do with UNKNOWN detection results and other live calls
//! - **[`QueueConfig`]**: queue scope and hold signal
//! - **[`EventsConfig`]**: listener channel sizing
//!
//! Every section has production-usable defaults, so a partial JSON or YAML
//! file only needs to name what it changes.
//!
//! ```rust
//! use dialer_core::config::{DialerConfig, UnknownOutcomePolicy, QueueScope};
//!
//! let mut config = DialerConfig::default();
//! config.gateway.callback_base_url = "https://dialer.example.com".to_string();
//! config.detection.unknown_outcome = UnknownOutcomePolicy::Reject;
//! config.queue.scope = QueueScope::Global;
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{DialerError, Result};
use crate::types::CampaignId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DialerConfig {
    pub general: GeneralConfig,

    pub gateway: GatewayConfig,

    pub dialing: DialingConfig,

    pub detection: DetectionConfig,

    pub queue: QueueConfig,

    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Name used in logs
    pub service_name: String,

    /// Maximum number of campaigns that may be open (NEW or ACTIVE) at once
    pub max_active_campaigns: usize,

    /// Keep ENDED campaigns registered for snapshots and dispositions until
    /// `remove_campaign` is called. When false, ending a campaign removes it.
    pub retain_ended_campaigns: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Public base URL the provider calls back into
    pub callback_base_url: String,

    /// Number presented to the customer
    pub caller_id: String,

    /// Base name of the conference agents and customers meet in
    pub conference_name: String,

    /// How a connected customer is bridged to the agent
    pub agent_connection: AgentConnection,

    /// Ask the provider for asynchronous human/machine detection
    pub detection_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentConnection {
    /// Redirect the customer into the campaign conference the agent sits in
    Conference,
    /// Dial the agent identity directly from the customer leg
    DirectToAgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialingConfig {
    /// Contacts claimed by `start` and by batch requests without an explicit size
    pub batch_dial_count: usize,

    /// Upper bound applied to any requested batch size
    pub max_batch_size: usize,

    /// Whether contacts that reached an agent are dialed again on a recycling pass
    pub recycle_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub unknown_outcome: UnknownOutcomePolicy,

    pub connect_policy: ConnectPolicy,
}

/// Decision applied when the provider cannot tell human from machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownOutcomePolicy {
    /// Treat as HUMAN and connect
    Connect,
    /// Treat as MACHINE and hang up
    Reject,
}

/// What happens to the other live calls of a campaign once one customer is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectPolicy {
    /// Hang up every other in-flight or queued call of the campaign
    HangUpOthers,
    /// Leave them dialing/queued; the agent pulls the next one with `agent_ready`
    HoldOthers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub scope: QueueScope,

    /// Looping hold signal played while a customer waits
    pub hold_music_url: String,

    /// Provider-side queue name prefix, followed by the campaign id
    pub queue_name_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueScope {
    /// One FIFO per campaign
    PerCampaign,
    /// A single FIFO shared by every campaign
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Per-listener-channel capacity; slow listeners lag past this
    pub channel_capacity: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            service_name: "dialer-core".to_string(),
            max_active_campaigns: 1000,
            retain_ended_campaigns: true,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            callback_base_url: "http://localhost:8000".to_string(),
            caller_id: "+15550100000".to_string(),
            conference_name: "SalesDialerConference".to_string(),
            agent_connection: AgentConnection::Conference,
            detection_enabled: true,
        }
    }
}

impl Default for DialingConfig {
    fn default() -> Self {
        Self {
            batch_dial_count: 5,
            max_batch_size: 50,
            recycle_completed: false,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            unknown_outcome: UnknownOutcomePolicy::Connect,
            connect_policy: ConnectPolicy::HangUpOthers,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            scope: QueueScope::PerCampaign,
            hold_music_url: "https://twimlets.com/holdmusic?Bucket=com.twilio.music.classical".to_string(),
            queue_name_prefix: "campaign_".to_string(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { channel_capacity: 256 }
    }
}

impl GatewayConfig {
    /// Conference reference used for one campaign's agent
    pub fn conference_for(&self, campaign_id: &CampaignId) -> String {
        format!("{}-{}", self.conference_name, campaign_id)
    }
}

impl QueueConfig {
    pub fn queue_name_for(&self, campaign_id: &CampaignId) -> String {
        match self.scope {
            QueueScope::PerCampaign => format!("{}{}", self.queue_name_prefix, campaign_id),
            QueueScope::Global => format!("{}all", self.queue_name_prefix),
        }
    }
}

impl FromStr for UnknownOutcomePolicy {
    type Err = DialerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "connect" | "human" => Ok(UnknownOutcomePolicy::Connect),
            "reject" | "machine" => Ok(UnknownOutcomePolicy::Reject),
            other => Err(DialerError::configuration(format!("invalid unknown-outcome policy '{}'", other))),
        }
    }
}

impl FromStr for QueueScope {
    type Err = DialerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_campaign" | "campaign" => Ok(QueueScope::PerCampaign),
            "global" => Ok(QueueScope::Global),
            other => Err(DialerError::configuration(format!("invalid queue scope '{}'", other))),
        }
    }
}

impl FromStr for ConnectPolicy {
    type Err = DialerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hang_up_others" | "hangup_others" => Ok(ConnectPolicy::HangUpOthers),
            "hold_others" => Ok(ConnectPolicy::HoldOthers),
            other => Err(DialerError::configuration(format!("invalid connect policy '{}'", other))),
        }
    }
}

impl DialerConfig {
    pub fn validate(&self) -> Result<()> {
        let base = &self.gateway.callback_base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(DialerError::configuration(format!(
                "callback_base_url must be an http(s) URL, got '{}'",
                base
            )));
        }

        if self.gateway.conference_name.is_empty() {
            return Err(DialerError::configuration("conference_name cannot be empty"));
        }

        if self.dialing.batch_dial_count == 0 {
            return Err(DialerError::configuration("batch_dial_count must be greater than 0"));
        }

        if self.dialing.max_batch_size < self.dialing.batch_dial_count {
            return Err(DialerError::configuration(
                "max_batch_size cannot be smaller than batch_dial_count",
            ));
        }

        if self.general.max_active_campaigns == 0 {
            return Err(DialerError::configuration("max_active_campaigns must be greater than 0"));
        }

        if self.events.channel_capacity == 0 {
            return Err(DialerError::configuration("channel_capacity must be greater than 0"));
        }

        Ok(())
    }

    /// Build a configuration from defaults overridden by `DIALER_*` environment variables.
    ///
    /// `BASE_URL` is accepted as a fallback for `DIALER_CALLBACK_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = env_var("DIALER_CALLBACK_BASE_URL").or_else(|| env_var("BASE_URL")) {
            config.gateway.callback_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(caller_id) = env_var("DIALER_CALLER_ID") {
            config.gateway.caller_id = caller_id;
        }
        if let Some(name) = env_var("DIALER_CONFERENCE_NAME") {
            config.gateway.conference_name = name;
        }
        if let Some(count) = env_var("DIALER_BATCH_DIAL_COUNT") {
            config.dialing.batch_dial_count = count.parse().map_err(|_| {
                DialerError::configuration(format!("DIALER_BATCH_DIAL_COUNT is not a number: '{}'", count))
            })?;
            if config.dialing.max_batch_size < config.dialing.batch_dial_count {
                config.dialing.max_batch_size = config.dialing.batch_dial_count;
            }
        }
        if let Some(policy) = env_var("DIALER_UNKNOWN_OUTCOME") {
            config.detection.unknown_outcome = policy.parse()?;
        }
        if let Some(policy) = env_var("DIALER_CONNECT_POLICY") {
            config.detection.connect_policy = policy.parse()?;
        }
        if let Some(scope) = env_var("DIALER_QUEUE_SCOPE") {
            config.queue.scope = scope.parse()?;
        }
        if let Some(url) = env_var("DIALER_HOLD_MUSIC_URL") {
            config.queue.hold_music_url = url;
        }
        if let Some(retain) = env_var("DIALER_RETAIN_ENDED_CAMPAIGNS") {
            config.general.retain_ended_campaigns = retain.trim().parse().map_err(|_| {
                DialerError::configuration(format!("DIALER_RETAIN_ENDED_CAMPAIGNS is not true/false: '{}'", retain))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON (`.json`) or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DialerError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .map_err(|e| DialerError::configuration(format!("invalid JSON config: {}", e)))?,
            _ => serde_yaml::from_str(&contents)
                .map_err(|e| DialerError::configuration(format!("invalid YAML config: {}", e)))?,
        };

        config.validate()?;
        Ok(config)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = DialerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dialing.batch_dial_count, 5);
        assert_eq!(config.detection.unknown_outcome, UnknownOutcomePolicy::Connect);
        assert_eq!(config.detection.connect_policy, ConnectPolicy::HangUpOthers);
        assert_eq!(config.queue.scope, QueueScope::PerCampaign);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = DialerConfig::default();
        config.dialing.batch_dial_count = 0;
        assert!(config.validate().is_err());

        let mut config = DialerConfig::default();
        config.gateway.callback_base_url = "ftp://nope".to_string();
        assert!(config.validate().is_err());

        let mut config = DialerConfig::default();
        config.dialing.max_batch_size = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "detection:\n  unknown_outcome: reject\nqueue:\n  scope: global\n";
        let config: DialerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.detection.unknown_outcome, UnknownOutcomePolicy::Reject);
        assert_eq!(config.queue.scope, QueueScope::Global);
        assert_eq!(config.dialing.batch_dial_count, 5);
        assert_eq!(config.gateway.agent_connection, AgentConnection::Conference);
    }

    #[test]
    fn test_queue_and_conference_names() {
        let config = DialerConfig::default();
        let campaign = CampaignId::from("cmp-1");
        assert_eq!(config.queue.queue_name_for(&campaign), "campaign_cmp-1");
        assert_eq!(config.gateway.conference_for(&campaign), "SalesDialerConference-cmp-1");
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("DIALER_CALLBACK_BASE_URL", "https://dialer.example.com/");
        std::env::set_var("DIALER_BATCH_DIAL_COUNT", "8");
        std::env::set_var("DIALER_UNKNOWN_OUTCOME", "reject");
        std::env::set_var("DIALER_QUEUE_SCOPE", "global");

        let config = DialerConfig::from_env().unwrap();
        assert_eq!(config.gateway.callback_base_url, "https://dialer.example.com");
        assert_eq!(config.dialing.batch_dial_count, 8);
        assert_eq!(config.detection.unknown_outcome, UnknownOutcomePolicy::Reject);
        assert_eq!(config.queue.scope, QueueScope::Global);

        std::env::set_var("DIALER_BATCH_DIAL_COUNT", "many");
        assert!(DialerConfig::from_env().is_err());

        for var in [
            "DIALER_CALLBACK_BASE_URL",
            "DIALER_BATCH_DIAL_COUNT",
            "DIALER_UNKNOWN_OUTCOME",
            "DIALER_QUEUE_SCOPE",
        ] {
            std::env::remove_var(var);
        }
    }
}
