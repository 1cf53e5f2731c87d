//! Shared identifiers and closed status enums.
//!
//! Provider strings are parsed into these enums at the edge, so an
//! unexpected value fails there instead of silently matching nothing deep
//! inside a handler.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::DialerError;

/// Phone number in normalised `+<digits>` form
pub type PhoneNumber = String;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, uuid::Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Campaign identifier
    CampaignId,
    "cmp-"
);

string_id!(
    /// Correlation id of one call attempt, generated when the contact is
    /// claimed and embedded in every callback URL for that attempt
    SessionId,
    "session-"
);

string_id!(
    /// Provider-assigned call identifier
    CallId,
    "call-"
);

string_id!(
    /// Identity of the agent that owns a campaign
    AgentId,
    "agent-"
);

string_id!(
    /// Identifier of a contact pool shared by one or more campaigns
    PoolId,
    "pool-"
);

/// Why a session ended without reaching (or after leaving) CONNECTED
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum TerminationReason {
    /// Answering machine or voicemail detected
    Voicemail,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
    /// The customer hung up before being connected
    HungUp,
    /// Another customer of the same campaign was connected first
    Superseded,
    CampaignEnded,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Voicemail => "voicemail",
            TerminationReason::Busy => "busy",
            TerminationReason::NoAnswer => "no-answer",
            TerminationReason::Failed => "failed",
            TerminationReason::Canceled => "canceled",
            TerminationReason::HungUp => "hung-up",
            TerminationReason::Superseded => "superseded",
            TerminationReason::CampaignEnded => "campaign-ended",
        }
    }

    /// Provider-reported failures that should prompt another dial
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            TerminationReason::Busy
                | TerminationReason::NoAnswer
                | TerminationReason::Failed
                | TerminationReason::Canceled
        )
    }
}

/// Lifecycle status of a call session
///
/// ```text
/// Dialing -> Ringing -> Answered -> Queued -> Connected -> Completed
///    |          |          |          |          |
///    +----------+----------+----------+----------+--> Terminated(reason)
/// ```
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum CallStatus {
    Dialing,
    Ringing,
    Answered,
    Queued,
    Connected,
    Completed,
    Terminated(TerminationReason),
}

impl CallStatus {
    /// Every status a live call can be in
    pub const NON_TERMINAL: [CallStatus; 5] = [
        CallStatus::Dialing,
        CallStatus::Ringing,
        CallStatus::Answered,
        CallStatus::Queued,
        CallStatus::Connected,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Terminated(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Dialing => "dialing",
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::Queued => "queued",
            CallStatus::Connected => "connected",
            CallStatus::Completed => "completed",
            CallStatus::Terminated(reason) => reason.as_str(),
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = DialerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "dialing" => CallStatus::Dialing,
            "ringing" => CallStatus::Ringing,
            "answered" => CallStatus::Answered,
            "queued" => CallStatus::Queued,
            "connected" => CallStatus::Connected,
            "completed" => CallStatus::Completed,
            "voicemail" => CallStatus::Terminated(TerminationReason::Voicemail),
            "busy" => CallStatus::Terminated(TerminationReason::Busy),
            "no-answer" => CallStatus::Terminated(TerminationReason::NoAnswer),
            "failed" => CallStatus::Terminated(TerminationReason::Failed),
            "canceled" => CallStatus::Terminated(TerminationReason::Canceled),
            "hung-up" => CallStatus::Terminated(TerminationReason::HungUp),
            "superseded" => CallStatus::Terminated(TerminationReason::Superseded),
            "campaign-ended" => CallStatus::Terminated(TerminationReason::CampaignEnded),
            other => {
                return Err(DialerError::validation(format!("unknown call status '{}'", other)))
            }
        };
        Ok(status)
    }
}

impl Serialize for CallStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CallStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Result of human/machine analysis for a call
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionOutcome {
    Pending,
    Human,
    Machine,
    Unknown,
}

impl DetectionOutcome {
    /// Map a provider `AnsweredBy` value onto an outcome.
    ///
    /// Anything the provider reports that is not clearly a person or a
    /// machine counts as [`DetectionOutcome::Unknown`].
    pub fn from_provider(answered_by: &str) -> Self {
        let value = answered_by.trim().to_ascii_lowercase();
        match value.as_str() {
            "human" => DetectionOutcome::Human,
            "fax" | "machine" => DetectionOutcome::Machine,
            v if v.starts_with("machine_") => DetectionOutcome::Machine,
            _ => DetectionOutcome::Unknown,
        }
    }
}

impl fmt::Display for DetectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetectionOutcome::Pending => "pending",
            DetectionOutcome::Human => "human",
            DetectionOutcome::Machine => "machine",
            DetectionOutcome::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Campaign lifecycle
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignState {
    New,
    Active,
    Ended,
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CampaignState::New => "NEW",
            CampaignState::Active => "ACTIVE",
            CampaignState::Ended => "ENDED",
        };
        f.write_str(s)
    }
}
