use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::config::QueueScope;
use crate::types::{CampaignId, PhoneNumber, SessionId};

/// Which FIFO a campaign's calls wait in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueueKey {
    PerCampaign(CampaignId),
    Global,
}

impl QueueKey {
    pub fn for_campaign(scope: QueueScope, campaign_id: &CampaignId) -> Self {
        match scope {
            QueueScope::PerCampaign => QueueKey::PerCampaign(campaign_id.clone()),
            QueueScope::Global => QueueKey::Global,
        }
    }
}

/// Information about a queued call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedCall {
    pub session_id: SessionId,
    pub campaign_id: CampaignId,
    pub phone: PhoneNumber,
    pub queued_at: chrono::DateTime<chrono::Utc>,
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_calls: usize,
    pub average_wait_time_seconds: u64,
    pub longest_wait_time_seconds: u64,
}

/// FIFO wait queues for answered calls.
///
/// The manager only ever takes its own lock. Callers keep queue membership
/// in step with session status by calling it from inside the session
/// store's guarded transition.
#[derive(Debug)]
pub struct CallQueueManager {
    scope: QueueScope,
    queues: Mutex<HashMap<QueueKey, VecDeque<QueuedCall>>>,
}

impl CallQueueManager {
    pub fn new(scope: QueueScope) -> Self {
        Self {
            scope,
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> QueueScope {
        self.scope
    }

    fn key_for(&self, campaign_id: &CampaignId) -> QueueKey {
        QueueKey::for_campaign(self.scope, campaign_id)
    }

    /// Append a call; returns its 1-based position. Re-enqueueing a call that
    /// is already waiting keeps its place.
    pub fn enqueue(&self, call: QueuedCall) -> usize {
        let key = self.key_for(&call.campaign_id);
        let mut queues = self.queues.lock();
        let queue = queues.entry(key).or_default();

        if let Some(index) = queue.iter().position(|c| c.session_id == call.session_id) {
            warn!("📞 Call {} already queued, not re-queuing", call.session_id);
            return index + 1;
        }

        queue.push_back(call);
        let position = queue.len();
        if let Some(call) = queue.back() {
            info!(
                "📞 Queued call {} ({}) for campaign {} at position {}",
                call.session_id, call.phone, call.campaign_id, position
            );
        }
        position
    }

    /// Pop the oldest call waiting for this campaign's agent
    pub fn dequeue_for_agent(&self, campaign_id: &CampaignId) -> Option<QueuedCall> {
        let key = self.key_for(campaign_id);
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(&key)?;
        let index = queue.iter().position(|c| &c.campaign_id == campaign_id)?;
        let call = queue.remove(index)?;
        info!(
            "📤 Dequeued call {} for campaign {} (remaining: {})",
            call.session_id,
            campaign_id,
            queue.len()
        );
        Some(call)
    }

    /// Oldest call waiting for this campaign's agent, left in place
    pub fn peek_for_agent(&self, campaign_id: &CampaignId) -> Option<QueuedCall> {
        let key = self.key_for(campaign_id);
        let queues = self.queues.lock();
        queues.get(&key)?.iter().find(|c| &c.campaign_id == campaign_id).cloned()
    }

    /// Remove a call from wherever it waits
    pub fn remove(&self, campaign_id: &CampaignId, session_id: &SessionId) -> Option<QueuedCall> {
        let key = self.key_for(campaign_id);
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(&key)?;
        let index = queue.iter().position(|c| &c.session_id == session_id)?;
        let removed = queue.remove(index);
        debug!("Removed call {} from queue", session_id);
        removed
    }

    /// 1-based position of a waiting call
    pub fn position_of(&self, campaign_id: &CampaignId, session_id: &SessionId) -> Option<usize> {
        let key = self.key_for(campaign_id);
        let queues = self.queues.lock();
        queues
            .get(&key)?
            .iter()
            .position(|c| &c.session_id == session_id)
            .map(|index| index + 1)
    }

    pub fn contains(&self, campaign_id: &CampaignId, session_id: &SessionId) -> bool {
        self.position_of(campaign_id, session_id).is_some()
    }

    /// Calls of this campaign currently waiting
    pub fn len(&self, campaign_id: &CampaignId) -> usize {
        let key = self.key_for(campaign_id);
        self.queues
            .lock()
            .get(&key)
            .map_or(0, |q| q.iter().filter(|c| &c.campaign_id == campaign_id).count())
    }

    /// Get total number of queued calls across all queues
    pub fn total_queued_calls(&self) -> usize {
        self.queues.lock().values().map(|q| q.len()).sum()
    }

    /// Waiting calls of a campaign, oldest first
    pub fn snapshot(&self, campaign_id: &CampaignId) -> Vec<QueuedCall> {
        let key = self.key_for(campaign_id);
        self.queues.lock().get(&key).map_or_else(Vec::new, |q| {
            q.iter().filter(|c| &c.campaign_id == campaign_id).cloned().collect()
        })
    }

    /// Drop every waiting call of a campaign, returning what was removed
    pub fn clear_campaign(&self, campaign_id: &CampaignId) -> Vec<QueuedCall> {
        let key = self.key_for(campaign_id);
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(&key) else {
            return Vec::new();
        };

        let (removed, kept): (Vec<QueuedCall>, Vec<QueuedCall>) =
            queue.drain(..).partition(|c| &c.campaign_id == campaign_id);
        queue.extend(kept);
        if queue.is_empty() {
            queues.remove(&key);
        }

        if !removed.is_empty() {
            info!("🧹 Cleared {} queued calls of campaign {}", removed.len(), campaign_id);
        }
        removed
    }

    /// Get queue statistics for a campaign's calls
    pub fn stats(&self, campaign_id: &CampaignId) -> QueueStats {
        let calls = self.snapshot(campaign_id);
        if calls.is_empty() {
            return QueueStats::default();
        }
        let now = chrono::Utc::now();
        let wait_times: Vec<i64> = calls
            .iter()
            .map(|call| now.signed_duration_since(call.queued_at).num_seconds().max(0))
            .collect();
        let total_wait: i64 = wait_times.iter().sum();
        QueueStats {
            total_calls: calls.len(),
            average_wait_time_seconds: (total_wait / calls.len() as i64) as u64,
            longest_wait_time_seconds: wait_times.iter().max().copied().unwrap_or(0) as u64,
        }
    }
}
