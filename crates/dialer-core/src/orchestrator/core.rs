use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::campaign::{Campaign, DialerStats};
use crate::config::DialerConfig;
use crate::contacts::ContactPool;
use crate::error::{DialerError, Result};
use crate::events::{EventBroadcaster, DialerEvent};
use crate::gateway::GatewayClient;
use crate::queue::CallQueueManager;
use crate::session::{CallSession, SessionStore};
use crate::types::{AgentId, CallId, CampaignId, SessionId};

/// One registered campaign.
///
/// `agent_id` and `pool` never change after creation and are readable
/// without taking the campaign lock.
#[derive(Debug)]
pub(crate) struct CampaignHandle {
    pub id: CampaignId,
    pub agent_id: AgentId,
    pub pool: Arc<ContactPool>,
    pub campaign: Mutex<Campaign>,
}

/// Outbound dialing engine.
///
/// Owns every campaign, session and queue, and is driven from two sides:
/// agent/control operations (create, start, dial, end) and provider
/// callbacks (answered, detection result, status change). All methods take
/// `&self`; share the engine behind an `Arc`.
///
/// Locks are always taken in the order campaign, contact pool, session
/// entry, queue, and none is held across a gateway call.
#[derive(Debug)]
pub struct DialerEngine {
    pub(super) config: DialerConfig,
    pub(super) gateway: Arc<dyn GatewayClient>,
    pub(super) sessions: SessionStore,
    pub(super) queue: CallQueueManager,
    pub(super) events: EventBroadcaster,
    pub(super) campaigns: DashMap<CampaignId, Arc<CampaignHandle>>,
    /// Serialises the open-campaign limit check with the insert
    pub(super) registration: Mutex<()>,
    pub(super) total_dials: AtomicU64,
    pub(super) total_connected: AtomicU64,
}

impl DialerEngine {
    pub fn new(config: DialerConfig, gateway: Arc<dyn GatewayClient>) -> Result<Self> {
        config.validate()?;
        info!(
            "🚀 Creating DialerEngine '{}' (queue scope {:?}, batch size {})",
            config.general.service_name, config.queue.scope, config.dialing.batch_dial_count
        );

        Ok(Self {
            queue: CallQueueManager::new(config.queue.scope),
            events: EventBroadcaster::new(config.events.channel_capacity),
            sessions: SessionStore::new(),
            campaigns: DashMap::new(),
            registration: Mutex::new(()),
            total_dials: AtomicU64::new(0),
            total_connected: AtomicU64::new(0),
            gateway,
            config,
        })
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn queue(&self) -> &CallQueueManager {
        &self.queue
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    pub fn session(&self, session_id: &SessionId) -> Option<CallSession> {
        self.sessions.get(session_id)
    }

    pub fn session_by_call_id(&self, call_id: &CallId) -> Option<CallSession> {
        self.sessions.find_by_call_id(call_id)
    }

    pub(crate) fn handle(&self, campaign_id: &CampaignId) -> Result<Arc<CampaignHandle>> {
        self.campaigns
            .get(campaign_id)
            .map(|h| h.clone())
            .ok_or_else(|| DialerError::not_found(format!("campaign {}", campaign_id)))
    }

    /// Publish to the campaign's listeners and its agent's
    pub(crate) fn emit(&self, handle: &CampaignHandle, event: DialerEvent) {
        let delivered = self.events.publish_campaign(&handle.id, &handle.agent_id, event);
        debug!("Event delivered to {} listeners of campaign {}", delivered, handle.id);
    }

    /// Bookkeeping after an applied transition: mirror the status into the
    /// contact pool, tell listeners, and retire the session once terminal.
    ///
    /// Must not be called with the campaign lock held.
    pub(crate) fn settle(&self, handle: &CampaignHandle, session: &CallSession) -> bool {
        self.settle_with(handle, session, None)
    }

    /// [`settle`](Self::settle), publishing `follow_up` right after the
    /// status update.
    ///
    /// Events go out under the contact pool lock and only if this revision
    /// is newer than the one recorded, so a handler that lost a race with a
    /// later transition of the same session publishes nothing. Returns
    /// whether the events were published.
    pub(crate) fn settle_with(
        &self,
        handle: &CampaignHandle,
        session: &CallSession,
        follow_up: Option<DialerEvent>,
    ) -> bool {
        let published = handle.pool.record_status_then(
            &session.phone,
            &session.session_id,
            session.status,
            session.revision,
            || {
                self.emit(handle, Self::status_update(&handle.id, session));
                if let Some(event) = follow_up {
                    self.emit(handle, event);
                }
            },
        );
        if !published {
            debug!(
                "Session {} moved past revision {} ({}), not publishing",
                session.session_id, session.revision, session.status
            );
        }

        if session.status.is_terminal() {
            handle.campaign.lock().release_agent(&session.session_id);
            self.sessions.remove(&session.session_id);
        }
        published
    }

    pub(crate) fn status_update(campaign_id: &CampaignId, session: &CallSession) -> DialerEvent {
        DialerEvent::StatusUpdate {
            campaign_id: campaign_id.clone(),
            session_id: session.session_id.clone(),
            phone: session.phone.clone(),
            status: session.status,
            detection: session.detection,
            revision: session.revision,
        }
    }

    /// Hang up a call, tolerating calls that are already gone
    pub(crate) async fn hangup_quietly(&self, call_id: &CallId) {
        if let Err(e) = self.gateway.hangup(call_id).await {
            warn!("Failed to hang up call {}: {}", call_id, e);
        }
    }

    pub fn stats(&self) -> DialerStats {
        let campaigns_active = self
            .campaigns
            .iter()
            .filter(|h| h.campaign.lock().is_active())
            .count();
        let session_stats = self.sessions.stats();
        DialerStats {
            campaigns_total: self.campaigns.len(),
            campaigns_active,
            live_sessions: session_stats.total - session_stats.finished,
            queued_calls: self.queue.total_queued_calls(),
            total_dials: self.total_dials.load(Ordering::Relaxed),
            total_connected: self.total_connected.load(Ordering::Relaxed),
        }
    }
}
