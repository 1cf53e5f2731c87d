//! Campaign lifecycle: create, start, end, dispositions and snapshots.

use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::core::{CampaignHandle, DialerEngine};
use crate::campaign::{Campaign, CampaignSnapshot, ContactStatus, Disposition};
use crate::contacts::{normalize_phone, ContactList, ContactPool};
use crate::error::{DialerError, Result};
use crate::events::{ChannelKey, DialerEvent};
use crate::session::CallEvent;
use crate::types::{AgentId, CallStatus, CampaignId, CampaignState, SessionId, TerminationReason};

impl DialerEngine {
    /// Create a NEW campaign dialing from its own copy of `contacts`
    pub fn create_campaign<I, S>(&self, agent_id: AgentId, contacts: I) -> Result<CampaignId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = ContactList::new(contacts);
        if list.is_empty() {
            return Err(DialerError::validation("campaign needs at least one contact"));
        }
        self.create_campaign_with_pool(agent_id, Arc::new(ContactPool::new(list.into_phones())))
    }

    /// Create a NEW campaign on a pool that other campaigns may share
    pub fn create_campaign_with_pool(&self, agent_id: AgentId, pool: Arc<ContactPool>) -> Result<CampaignId> {
        let _registration = self.registration.lock();
        let open = self.open_campaigns();
        if open >= self.config.general.max_active_campaigns {
            return Err(DialerError::campaign(format!(
                "too many open campaigns ({} of {})",
                open, self.config.general.max_active_campaigns
            )));
        }

        let campaign = Campaign::new(agent_id.clone(), pool.clone());
        let campaign_id = campaign.id.clone();
        info!(
            "📋 Created campaign {} for agent {} ({} contacts, pool {})",
            campaign_id,
            agent_id,
            pool.len(),
            pool.id()
        );

        self.campaigns.insert(
            campaign_id.clone(),
            Arc::new(CampaignHandle {
                id: campaign_id.clone(),
                agent_id,
                pool,
                campaign: Mutex::new(campaign),
            }),
        );
        Ok(campaign_id)
    }

    /// Campaigns that are NEW or ACTIVE
    fn open_campaigns(&self) -> usize {
        let handles: Vec<Arc<CampaignHandle>> = self.campaigns.iter().map(|h| h.value().clone()).collect();
        handles.iter().filter(|h| !h.campaign.lock().is_ended()).count()
    }

    pub fn campaign_state(&self, campaign_id: &CampaignId) -> Result<CampaignState> {
        Ok(self.handle(campaign_id)?.campaign.lock().state)
    }

    /// NEW -> ACTIVE, then dial the first batch
    pub async fn start_campaign(&self, campaign_id: &CampaignId) -> Result<Vec<SessionId>> {
        let handle = self.handle(campaign_id)?;
        handle.campaign.lock().activate()?;
        info!("▶️ Campaign {} is ACTIVE", campaign_id);

        self.dial_next_batch(campaign_id, self.config.dialing.batch_dial_count)
            .await
    }

    /// End a campaign: every live call is hung up, the campaign's queue is
    /// emptied and its sessions are dropped. Campaign listeners get
    /// `campaign_ended` and then see their channel closed.
    ///
    /// Returns `false` (and publishes nothing) if it had already ended.
    pub async fn end_campaign(&self, campaign_id: &CampaignId, reason: &str) -> Result<bool> {
        let handle = self.handle(campaign_id)?;
        if !handle.campaign.lock().finish(reason) {
            return Ok(false);
        }

        let mut to_hang_up = Vec::new();
        let mut terminated = 0usize;
        for session in self.sessions.sessions_for_campaign(campaign_id) {
            let outcome = self.sessions.apply_with(
                &session.session_id,
                CallEvent::ForceHangup(TerminationReason::CampaignEnded),
                |s| {
                    self.queue.remove(&s.campaign_id, &s.session_id);
                },
            );
            if let Some(ended) = outcome.into_session() {
                terminated += 1;
                handle
                    .pool
                    .record_status(&ended.phone, &ended.session_id, ended.status, ended.revision);
                if let Some(call_id) = ended.call_id {
                    to_hang_up.push(call_id);
                }
            }
        }

        let leftover = self.queue.clear_campaign(campaign_id);
        if !leftover.is_empty() {
            warn!("Campaign {} left {} calls in the queue", campaign_id, leftover.len());
        }
        self.sessions.purge_campaign(campaign_id);

        join_all(to_hang_up.iter().map(|call_id| self.hangup_quietly(call_id))).await;

        info!(
            "🏁 Campaign {} ENDED ({}), {} live calls terminated",
            campaign_id, reason, terminated
        );
        self.emit(
            &handle,
            DialerEvent::CampaignEnded {
                campaign_id: campaign_id.clone(),
                reason: reason.to_string(),
            },
        );
        self.events.close(&ChannelKey::Campaign(campaign_id.clone()));

        if !self.config.general.retain_ended_campaigns {
            self.campaigns.remove(campaign_id);
            debug!("Campaign {} dropped on end", campaign_id);
        }
        Ok(true)
    }

    /// Forget an ENDED campaign, returning its final snapshot.
    ///
    /// Fails with `InvalidState` while the campaign is still NEW or ACTIVE.
    pub fn remove_campaign(&self, campaign_id: &CampaignId) -> Result<CampaignSnapshot> {
        let handle = self.handle(campaign_id)?;
        if !handle.campaign.lock().is_ended() {
            return Err(DialerError::invalid_state(format!(
                "campaign {} must be ENDED before it is removed",
                campaign_id
            )));
        }

        let snapshot = self.snapshot(campaign_id)?;
        self.campaigns.remove(campaign_id);
        self.events.close(&ChannelKey::Campaign(campaign_id.clone()));
        info!("🗑️ Removed campaign {}", campaign_id);
        Ok(snapshot)
    }

    /// Record the agent's wrap-up for a contact of this campaign
    pub fn save_disposition(
        &self,
        campaign_id: &CampaignId,
        phone: &str,
        disposition: &str,
        notes: Option<String>,
    ) -> Result<Disposition> {
        let handle = self.handle(campaign_id)?;
        let phone = normalize_phone(phone).ok_or_else(|| DialerError::validation("phone number is empty"))?;
        if disposition.trim().is_empty() {
            return Err(DialerError::validation("disposition is empty"));
        }
        if !handle.pool.contains(&phone) {
            return Err(DialerError::not_found(format!(
                "{} is not a contact of campaign {}",
                phone, campaign_id
            )));
        }

        let saved = handle
            .campaign
            .lock()
            .record_disposition(phone, disposition.trim().to_string(), notes);
        info!("📝 Disposition '{}' saved for {} in campaign {}", saved.disposition, saved.phone, campaign_id);
        Ok(saved)
    }

    pub fn snapshot(&self, campaign_id: &CampaignId) -> Result<CampaignSnapshot> {
        let handle = self.handle(campaign_id)?;
        let campaign = handle.campaign.lock();
        let pool = handle.pool.snapshot();

        Ok(CampaignSnapshot {
            campaign_id: campaign.id.clone(),
            agent_id: campaign.agent_id.clone(),
            state: campaign.state,
            pool_id: pool.pool_id,
            contacts: pool
                .contact_status
                .into_iter()
                .map(|(phone, status)| ContactStatus { phone, status })
                .collect(),
            cursor: pool.cursor,
            pass: pool.pass,
            queue: self.queue.snapshot(campaign_id),
            queue_stats: self.queue.stats(campaign_id),
            connected_phone: campaign.connected.as_ref().map(|(_, phone)| phone.clone()),
            dispositions: campaign.dispositions.clone(),
            created_at: campaign.created_at,
            ended_at: campaign.ended_at,
        })
    }

    /// Listen to a campaign's events. An ENDED campaign publishes nothing
    /// more, so its receiver comes back already closed.
    pub fn subscribe(&self, campaign_id: &CampaignId) -> Result<broadcast::Receiver<DialerEvent>> {
        let handle = self.handle(campaign_id)?;
        // Held while registering, so end_campaign closes any channel made here.
        let campaign = handle.campaign.lock();
        if campaign.is_ended() {
            return Ok(broadcast::channel(1).1);
        }
        Ok(self.events.subscribe(ChannelKey::Campaign(campaign_id.clone())))
    }

    /// Subscribe and get the current state as a `campaign_state` message.
    ///
    /// The receiver is registered before the snapshot is taken, so nothing
    /// that happens in between is missed.
    pub fn subscribe_with_snapshot(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<(DialerEvent, broadcast::Receiver<DialerEvent>)> {
        let receiver = self.subscribe(campaign_id)?;
        let snapshot = self.snapshot(campaign_id)?;
        Ok((DialerEvent::CampaignState { snapshot }, receiver))
    }

    /// Last known status of a contact of this campaign's pool
    pub fn contact_status(&self, campaign_id: &CampaignId, phone: &str) -> Result<Option<CallStatus>> {
        Ok(self.handle(campaign_id)?.pool.status_of(phone))
    }
}
