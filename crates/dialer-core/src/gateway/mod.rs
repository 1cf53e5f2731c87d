//! # Telephony Gateway Seam
//!
//! The dialer never talks to a telephony provider directly. Everything it
//! needs from one (placing a call, hanging up, moving a call into the
//! agent's conference) goes through [`GatewayClient`], and everything the
//! provider tells it comes back as a [`ProviderCallback`].
//!
//! Gateway calls only return an acknowledgement. Whether a call was
//! answered, by whom, and how it ended arrives later, out of order and
//! possibly more than once, through the callback URLs carried in the
//! [`DialRequest`].

pub mod loopback;

pub use loopback::{GatewayCommand, LoopbackGateway};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::DialerError;
use crate::session::CallEvent;
use crate::types::{AgentId, CallId, CampaignId, DetectionOutcome, PhoneNumber, SessionId, TerminationReason};

/// Failures reported by a gateway client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The provider cannot be reached at all
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The provider refused our credentials
    #[error("gateway refused credentials: {0}")]
    Unauthorized(String),

    /// The provider refused this one request (bad number, unknown call)
    #[error("request rejected by gateway: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Systemic failures end the campaign; per-call rejections do not
    pub fn is_systemic(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Unauthorized(_))
    }
}

/// Callback URLs the provider posts to for one call attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackUrls {
    pub status: String,
    pub detection: String,
    pub queue_join: String,
    /// Called when the call leaves the wait queue
    pub queue_action: String,
}

impl CallbackUrls {
    pub fn build(base_url: &str, campaign_id: &CampaignId, session_id: &SessionId) -> Self {
        let base = base_url.trim_end_matches('/');
        let query = format!("campaign_id={}&session_id={}", campaign_id, session_id);
        Self {
            status: format!("{}/api/voice/status?{}", base, query),
            detection: format!("{}/api/voice/amd-status?{}", base, query),
            queue_join: format!("{}/api/voice/customer-queue?{}", base, query),
            queue_action: format!("{}/api/voice/queue-action?{}", base, query),
        }
    }
}

/// Everything a gateway needs to place one outbound call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialRequest {
    pub phone: PhoneNumber,
    pub campaign_id: CampaignId,
    pub session_id: SessionId,
    pub caller_id: String,
    /// Ask the provider to run asynchronous human/machine detection
    pub detection_requested: bool,
    pub callbacks: CallbackUrls,
}

/// Acknowledgement of an accepted dial request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialAck {
    pub call_id: CallId,
}

/// Outbound control surface of a telephony provider
#[async_trait]
pub trait GatewayClient: Send + Sync + fmt::Debug {
    /// Place a call. Returns as soon as the provider accepts the request.
    async fn dial(&self, request: DialRequest) -> Result<DialAck, GatewayError>;

    async fn hangup(&self, call_id: &CallId) -> Result<(), GatewayError>;

    /// Move a live call into a named conference
    async fn redirect_to_conference(&self, call_id: &CallId, conference: &str) -> Result<(), GatewayError>;

    /// Bridge a live call straight to an agent identity
    async fn connect_to_agent(&self, call_id: &CallId, agent: &AgentId) -> Result<(), GatewayError>;
}

/// Call status strings as reported by the provider's status callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderCallStatus {
    Initiated,
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

impl ProviderCallStatus {
    /// Session event this status drives, if any
    pub fn to_event(self) -> Option<CallEvent> {
        match self {
            ProviderCallStatus::Initiated | ProviderCallStatus::Queued => None,
            ProviderCallStatus::Ringing => Some(CallEvent::Ringing),
            ProviderCallStatus::InProgress => Some(CallEvent::Answered),
            ProviderCallStatus::Completed => Some(CallEvent::Complete),
            ProviderCallStatus::Busy => Some(CallEvent::ProviderFailure(TerminationReason::Busy)),
            ProviderCallStatus::NoAnswer => Some(CallEvent::ProviderFailure(TerminationReason::NoAnswer)),
            ProviderCallStatus::Failed => Some(CallEvent::ProviderFailure(TerminationReason::Failed)),
            ProviderCallStatus::Canceled => Some(CallEvent::ProviderFailure(TerminationReason::Canceled)),
        }
    }
}

impl FromStr for ProviderCallStatus {
    type Err = DialerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_lowercase().as_str() {
            "initiated" => ProviderCallStatus::Initiated,
            "queued" => ProviderCallStatus::Queued,
            "ringing" => ProviderCallStatus::Ringing,
            "in-progress" | "answered" => ProviderCallStatus::InProgress,
            "completed" => ProviderCallStatus::Completed,
            "busy" => ProviderCallStatus::Busy,
            "no-answer" => ProviderCallStatus::NoAnswer,
            "failed" => ProviderCallStatus::Failed,
            "canceled" | "cancelled" => ProviderCallStatus::Canceled,
            other => {
                return Err(DialerError::validation(format!("unknown provider call status '{}'", other)))
            }
        };
        Ok(status)
    }
}

/// What a provider callback reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallbackKind {
    /// The customer picked up and the call is joining the wait queue
    Answered,
    /// Asynchronous human/machine analysis finished
    Detection {
        outcome: DetectionOutcome,
        /// Provider `AnsweredBy` value the outcome was mapped from
        #[serde(default)]
        answered_by: Option<String>,
    },
    /// Plain call status change
    Status { status: ProviderCallStatus },
    /// The call left the provider's wait queue (`QueueResult`)
    QueueLeft { reason: String },
}

/// One inbound notification from the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCallback {
    pub session_id: SessionId,
    #[serde(default)]
    pub call_id: Option<CallId>,
    #[serde(flatten)]
    pub kind: CallbackKind,
}

impl ProviderCallback {
    pub fn answered(session_id: SessionId, call_id: Option<CallId>) -> Self {
        Self {
            session_id,
            call_id,
            kind: CallbackKind::Answered,
        }
    }

    pub fn detection(session_id: SessionId, call_id: Option<CallId>, outcome: DetectionOutcome) -> Self {
        Self {
            session_id,
            call_id,
            kind: CallbackKind::Detection {
                outcome,
                answered_by: None,
            },
        }
    }

    /// Detection callback carrying the provider's raw `AnsweredBy` value
    pub fn answered_by(session_id: SessionId, call_id: Option<CallId>, answered_by: &str) -> Self {
        Self {
            session_id,
            call_id,
            kind: CallbackKind::Detection {
                outcome: DetectionOutcome::from_provider(answered_by),
                answered_by: Some(answered_by.trim().to_string()),
            },
        }
    }

    pub fn queue_left(session_id: SessionId, call_id: Option<CallId>, reason: &str) -> Self {
        Self {
            session_id,
            call_id,
            kind: CallbackKind::QueueLeft {
                reason: reason.to_string(),
            },
        }
    }

    pub fn status(session_id: SessionId, call_id: Option<CallId>, status: ProviderCallStatus) -> Self {
        Self {
            session_id,
            call_id,
            kind: CallbackKind::Status { status },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_urls_carry_correlation_ids() {
        let campaign = CampaignId::from("cmp-1");
        let session = SessionId::from("session-9");
        let urls = CallbackUrls::build("https://dialer.example.com/", &campaign, &session);
        assert_eq!(
            urls.status,
            "https://dialer.example.com/api/voice/status?campaign_id=cmp-1&session_id=session-9"
        );
        assert!(urls.detection.contains("/api/voice/amd-status?"));
        assert!(urls.queue_join.ends_with("session_id=session-9"));
        assert!(urls.queue_action.contains("/api/voice/queue-action?"));
    }

    #[test]
    fn test_provider_status_parsing() {
        assert_eq!("in-progress".parse::<ProviderCallStatus>().unwrap(), ProviderCallStatus::InProgress);
        assert_eq!("no-answer".parse::<ProviderCallStatus>().unwrap(), ProviderCallStatus::NoAnswer);
        assert!("exploded".parse::<ProviderCallStatus>().is_err());
        assert_eq!(ProviderCallStatus::Initiated.to_event(), None);
    }

    #[test]
    fn test_callback_json_shape() {
        let json = r#"{"session_id":"session-1","call_id":"CA123","kind":"detection","outcome":"human"}"#;
        let callback: ProviderCallback = serde_json::from_str(json).unwrap();
        assert_eq!(
            callback,
            ProviderCallback::detection(
                SessionId::from("session-1"),
                Some(CallId::from("CA123")),
                DetectionOutcome::Human
            )
        );
    }

    #[test]
    fn test_raw_answered_by_is_kept() {
        let callback = ProviderCallback::answered_by(SessionId::from("session-1"), None, "machine_end_beep");
        assert_eq!(
            callback.kind,
            CallbackKind::Detection {
                outcome: DetectionOutcome::Machine,
                answered_by: Some("machine_end_beep".to_string()),
            }
        );

        let json = r#"{"session_id":"session-1","kind":"queue_left","reason":"hangup"}"#;
        let callback: ProviderCallback = serde_json::from_str(json).unwrap();
        assert_eq!(callback, ProviderCallback::queue_left(SessionId::from("session-1"), None, "hangup"));
    }

    #[test]
    fn test_error_classification() {
        assert!(GatewayError::Unavailable("down".into()).is_systemic());
        assert!(!GatewayError::Rejected("bad number".into()).is_systemic());
    }
}
