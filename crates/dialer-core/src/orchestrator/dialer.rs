//! Batch dialing.

use futures::future::join_all;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

use super::core::{CampaignHandle, DialerEngine};
use crate::contacts::ClaimedContact;
use crate::error::{DialerError, Result};
use crate::events::DialerEvent;
use crate::gateway::{CallbackUrls, DialAck, DialRequest, GatewayError};
use crate::session::CallEvent;
use crate::types::{CampaignId, SessionId, TerminationReason};

impl DialerEngine {
    /// Claim up to `count` contacts and dial them.
    ///
    /// Claiming is atomic with respect to every other batch on the same
    /// contact pool. Dials then run concurrently; per-call rejections mark
    /// that call failed, while a systemic gateway failure ends the campaign
    /// and is returned. An empty result just means nothing was eligible.
    pub async fn dial_next_batch(&self, campaign_id: &CampaignId, count: usize) -> Result<Vec<SessionId>> {
        if count == 0 {
            return Err(DialerError::validation("batch size must be greater than 0"));
        }
        let count = count.min(self.config.dialing.max_batch_size);
        let handle = self.handle(campaign_id)?;

        let claimed = {
            let campaign = handle.campaign.lock();
            campaign.ensure_active()?;
            handle.pool.claim(
                campaign_id,
                count,
                self.config.dialing.recycle_completed,
                |phone| match self.sessions.create(campaign_id, phone) {
                    Ok(session) => Some(session.session_id),
                    Err(e) => {
                        warn!("Skipping {}: {}", phone, e);
                        None
                    }
                },
            )
        };

        if claimed.is_empty() {
            info!("📭 No eligible contacts left for campaign {}", campaign_id);
            return Ok(Vec::new());
        }
        info!("📞 Dialing {} contacts for campaign {}", claimed.len(), campaign_id);

        for contact in &claimed {
            if let Some(session) = self.sessions.get(&contact.session_id) {
                self.emit(&handle, Self::status_update(campaign_id, &session));
            }
        }

        let results = join_all(claimed.iter().map(|contact| self.dial_one(&handle, contact))).await;

        let mut dialed = Vec::new();
        let mut systemic: Option<GatewayError> = None;
        for (contact, result) in claimed.iter().zip(results) {
            match result {
                Ok(ack) => {
                    self.total_dials.fetch_add(1, Ordering::Relaxed);
                    if self.bind_acknowledged(contact, &ack).await {
                        dialed.push(contact.session_id.clone());
                    }
                }
                Err(e) if e.is_systemic() => {
                    systemic.get_or_insert(e);
                }
                Err(e) => {
                    warn!("Dial to {} rejected: {}", contact.phone, e);
                    self.fail_dial(&handle, contact);
                }
            }
        }

        if let Some(e) = systemic {
            error!("❌ Gateway failure while dialing campaign {}: {}", campaign_id, e);
            self.end_campaign(campaign_id, &format!("gateway failure: {}", e)).await?;
            return Err(DialerError::Gateway(e));
        }
        Ok(dialed)
    }

    async fn dial_one(&self, handle: &CampaignHandle, contact: &ClaimedContact) -> std::result::Result<DialAck, GatewayError> {
        let request = DialRequest {
            phone: contact.phone.clone(),
            campaign_id: handle.id.clone(),
            session_id: contact.session_id.clone(),
            caller_id: self.config.gateway.caller_id.clone(),
            detection_requested: self.config.gateway.detection_enabled,
            callbacks: CallbackUrls::build(&self.config.gateway.callback_base_url, &handle.id, &contact.session_id),
        };
        self.gateway.dial(request).await
    }

    /// Bind the provider call id. An acknowledgement for a session that
    /// ended while the dial was in flight is hung up straight away.
    async fn bind_acknowledged(&self, contact: &ClaimedContact, ack: &DialAck) -> bool {
        match self.sessions.bind_call_id(&contact.session_id, &ack.call_id) {
            Some(session) if session.is_live() => {
                debug!("Call {} bound to session {}", ack.call_id, session.session_id);
                true
            }
            _ => {
                info!(
                    "Dial to {} acknowledged after its session ended, hanging up {}",
                    contact.phone, ack.call_id
                );
                self.hangup_quietly(&ack.call_id).await;
                false
            }
        }
    }

    fn fail_dial(&self, handle: &CampaignHandle, contact: &ClaimedContact) {
        let outcome = self.sessions.apply(
            &contact.session_id,
            CallEvent::ProviderFailure(TerminationReason::Failed),
        );
        if let Some(session) = outcome.into_session() {
            let next = DialerEvent::AutoDialNext {
                campaign_id: handle.id.clone(),
                phone: session.phone.clone(),
                reason: format!("{} - {}", session.phone, session.status),
            };
            self.settle_with(handle, &session, Some(next));
        }
    }
}
