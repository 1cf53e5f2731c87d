use serde::{Deserialize, Serialize};

use crate::campaign::CampaignSnapshot;
use crate::types::{AgentId, CallId, CallStatus, CampaignId, DetectionOutcome, PhoneNumber, SessionId};

/// Real-time message pushed to campaign and agent listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialerEvent {
    /// A session changed status. `revision` grows with every change of the
    /// same session, so a listener can drop anything older than what it has.
    StatusUpdate {
        campaign_id: CampaignId,
        session_id: SessionId,
        phone: PhoneNumber,
        status: CallStatus,
        detection: DetectionOutcome,
        revision: u64,
    },

    /// An answered call joined the wait queue
    CallQueued {
        campaign_id: CampaignId,
        session_id: SessionId,
        phone: PhoneNumber,
        position: usize,
    },

    /// A customer was put through to the agent
    CustomerConnected {
        campaign_id: CampaignId,
        session_id: SessionId,
        phone: PhoneNumber,
        call_id: Option<CallId>,
    },

    /// A connected call finished; the agent should record a disposition
    CallEnded {
        campaign_id: CampaignId,
        session_id: SessionId,
        phone: PhoneNumber,
        status: CallStatus,
    },

    /// A call failed before connecting; the listener may request another batch
    AutoDialNext {
        campaign_id: CampaignId,
        phone: PhoneNumber,
        reason: String,
    },

    /// An answering machine picked up and the call was dropped
    CallRejected {
        campaign_id: CampaignId,
        session_id: SessionId,
        phone: PhoneNumber,
        reason: String,
    },

    /// The provider reports the call left its wait queue
    CallDequeued {
        campaign_id: CampaignId,
        session_id: SessionId,
        phone: PhoneNumber,
        call_id: Option<CallId>,
        reason: String,
    },

    CampaignEnded {
        campaign_id: CampaignId,
        reason: String,
    },

    /// Full state, sent to a listener when it subscribes
    CampaignState { snapshot: CampaignSnapshot },
}

impl DialerEvent {
    /// Wire name of the event (`type` tag)
    pub fn kind(&self) -> &'static str {
        match self {
            DialerEvent::StatusUpdate { .. } => "status_update",
            DialerEvent::CallQueued { .. } => "call_queued",
            DialerEvent::CustomerConnected { .. } => "customer_connected",
            DialerEvent::CallEnded { .. } => "call_ended",
            DialerEvent::AutoDialNext { .. } => "auto_dial_next",
            DialerEvent::CallRejected { .. } => "call_rejected",
            DialerEvent::CallDequeued { .. } => "call_dequeued",
            DialerEvent::CampaignEnded { .. } => "campaign_ended",
            DialerEvent::CampaignState { .. } => "campaign_state",
        }
    }

    pub fn campaign_id(&self) -> &CampaignId {
        match self {
            DialerEvent::StatusUpdate { campaign_id, .. }
            | DialerEvent::CallQueued { campaign_id, .. }
            | DialerEvent::CustomerConnected { campaign_id, .. }
            | DialerEvent::CallEnded { campaign_id, .. }
            | DialerEvent::AutoDialNext { campaign_id, .. }
            | DialerEvent::CallRejected { campaign_id, .. }
            | DialerEvent::CallDequeued { campaign_id, .. }
            | DialerEvent::CampaignEnded { campaign_id, .. } => campaign_id,
            DialerEvent::CampaignState { snapshot } => &snapshot.campaign_id,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Who a channel delivers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    Campaign(CampaignId),
    Agent(AgentId),
}
