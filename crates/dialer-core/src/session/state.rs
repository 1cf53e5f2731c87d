use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CallId, CallStatus, CampaignId, DetectionOutcome, PhoneNumber, SessionId};

/// One outbound call attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    pub session_id: SessionId,

    /// Provider call id, bound once the dial is acknowledged
    pub call_id: Option<CallId>,

    pub campaign_id: CampaignId,
    pub phone: PhoneNumber,
    pub status: CallStatus,
    pub detection: DetectionOutcome,

    /// Raw `AnsweredBy` value behind `detection`, when the provider sent one
    #[serde(default)]
    pub answered_by: Option<String>,

    /// Position in the wait queue at the time the call joined it
    pub queue_position: Option<usize>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Incremented on every applied status transition
    pub revision: u64,
}

impl CallSession {
    pub fn new(session_id: SessionId, campaign_id: CampaignId, phone: PhoneNumber) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            call_id: None,
            campaign_id,
            phone,
            status: CallStatus::Dialing,
            detection: DetectionOutcome::Pending,
            answered_by: None,
            queue_position: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_queued(&self) -> bool {
        self.status == CallStatus::Queued
    }

    pub(crate) fn set_status(&mut self, status: CallStatus) {
        self.status = status;
        self.revision += 1;
        self.updated_at = Utc::now();
        if status != CallStatus::Queued {
            self.queue_position = None;
        }
    }
}
