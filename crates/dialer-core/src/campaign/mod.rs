//! # Campaigns
//!
//! A campaign is one agent working through a contact pool:
//!
//! ```text
//! NEW --start--> ACTIVE --end--> ENDED
//!  |                               ^
//!  +--------------end--------------+
//! ```
//!
//! [`Campaign`] holds the lifecycle state and the single-customer slot for
//! its agent. The engine keeps each campaign behind its own mutex; this
//! module only knows the rules, not the locking.

pub mod types;

pub use types::{CampaignSnapshot, ContactStatus, Disposition, DialerStats};

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::contacts::ContactPool;
use crate::error::{DialerError, Result};
use crate::types::{AgentId, CampaignId, CampaignState, PhoneNumber, SessionId};

#[derive(Debug)]
pub struct Campaign {
    pub id: CampaignId,
    pub agent_id: AgentId,
    pub state: CampaignState,
    pub pool: Arc<ContactPool>,

    /// Session currently connected to the agent
    pub connected: Option<(SessionId, PhoneNumber)>,

    pub dispositions: Vec<Disposition>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
}

impl Campaign {
    pub fn new(agent_id: AgentId, pool: Arc<ContactPool>) -> Self {
        Self {
            id: CampaignId::new(),
            agent_id,
            state: CampaignState::New,
            pool,
            connected: None,
            dispositions: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            end_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == CampaignState::Active
    }

    pub fn is_ended(&self) -> bool {
        self.state == CampaignState::Ended
    }

    /// NEW -> ACTIVE
    pub fn activate(&mut self) -> Result<()> {
        match self.state {
            CampaignState::New => {
                self.state = CampaignState::Active;
                self.started_at = Some(Utc::now());
                Ok(())
            }
            other => Err(DialerError::invalid_state(format!(
                "campaign {} cannot start from {}",
                self.id, other
            ))),
        }
    }

    /// NEW or ACTIVE -> ENDED. Returns `false` if it had already ended.
    pub fn finish(&mut self, reason: impl Into<String>) -> bool {
        if self.is_ended() {
            return false;
        }
        self.state = CampaignState::Ended;
        self.ended_at = Some(Utc::now());
        self.end_reason = Some(reason.into());
        self.connected = None;
        true
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DialerError::invalid_state(format!(
                "campaign {} is {}, not ACTIVE",
                self.id, self.state
            )))
        }
    }

    /// Take the agent slot for `session_id`. Fails if another live session
    /// already holds it.
    pub fn claim_agent(&mut self, session_id: &SessionId, phone: &PhoneNumber) -> bool {
        match &self.connected {
            Some((current, _)) if current != session_id => false,
            _ => {
                self.connected = Some((session_id.clone(), phone.clone()));
                true
            }
        }
    }

    /// Free the agent slot if `session_id` holds it
    pub fn release_agent(&mut self, session_id: &SessionId) -> bool {
        if matches!(&self.connected, Some((current, _)) if current == session_id) {
            self.connected = None;
            true
        } else {
            false
        }
    }

    pub fn record_disposition(&mut self, phone: PhoneNumber, disposition: String, notes: Option<String>) -> Disposition {
        let entry = Disposition {
            phone,
            disposition,
            notes,
            recorded_at: Utc::now(),
        };
        self.dispositions.push(entry.clone());
        entry
    }
}
