use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::queue::{QueueStats, QueuedCall};
use crate::types::{AgentId, CallStatus, CampaignId, CampaignState, PhoneNumber, PoolId};

/// Agent wrap-up outcome for one contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
    pub phone: PhoneNumber,
    pub disposition: String,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Last known status of one contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactStatus {
    pub phone: PhoneNumber,
    pub status: Option<CallStatus>,
}

/// Full campaign state sent to listeners that (re)connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub campaign_id: CampaignId,
    pub agent_id: AgentId,
    pub state: CampaignState,
    pub pool_id: PoolId,
    pub contacts: Vec<ContactStatus>,
    pub cursor: usize,
    pub pass: u64,
    pub queue: Vec<QueuedCall>,
    pub queue_stats: QueueStats,
    pub connected_phone: Option<PhoneNumber>,
    pub dispositions: Vec<Disposition>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Counters reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialerStats {
    pub campaigns_total: usize,
    pub campaigns_active: usize,
    pub live_sessions: usize,
    pub queued_calls: usize,
    pub total_dials: u64,
    pub total_connected: u64,
}
