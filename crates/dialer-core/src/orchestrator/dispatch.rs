//! Putting customers through to the campaign's agent.

use futures::future::join_all;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

use super::core::{CampaignHandle, DialerEngine};
use crate::config::{AgentConnection, ConnectPolicy};
use crate::error::{DialerError, Result};
use crate::events::DialerEvent;
use crate::session::{CallEvent, CallSession};
use crate::types::{CallId, CampaignId, SessionId, TerminationReason};

/// Result of trying to connect one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectOutcome {
    Connected,
    /// The agent already has another customer; this call was dropped
    Superseded,
    /// The agent already has another customer; this call keeps waiting
    Held,
    /// The session was no longer in a connectable status
    Ignored,
}

/// How a connecting call leaves the wait queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueExit {
    /// From wherever it waits
    Remove,
    /// Dequeued as the campaign's oldest caller
    Head,
}

impl DialerEngine {
    /// Connect a session to the campaign's agent, unless the agent already
    /// has a customer.
    pub(crate) async fn connect_session(
        &self,
        handle: &CampaignHandle,
        session_id: &SessionId,
        exit: QueueExit,
    ) -> ConnectOutcome {
        let connected = {
            let mut campaign = handle.campaign.lock();
            if !campaign.is_active() {
                debug!("Not connecting {}: campaign {} is {}", session_id, handle.id, campaign.state);
                return ConnectOutcome::Ignored;
            }
            let Some(current) = self.sessions.get(session_id) else {
                return ConnectOutcome::Ignored;
            };

            let already_holder = matches!(&campaign.connected, Some((holder, _)) if holder == session_id);
            if campaign.claim_agent(session_id, &current.phone) {
                let outcome = self.sessions.apply_with(session_id, CallEvent::Connect, |s| match exit {
                    QueueExit::Remove => {
                        self.queue.remove(&s.campaign_id, &s.session_id);
                    }
                    QueueExit::Head => self.dequeue_head(s),
                });
                match outcome.into_session() {
                    Some(session) => Some(session),
                    None => {
                        if !already_holder {
                            campaign.release_agent(session_id);
                        }
                        return ConnectOutcome::Ignored;
                    }
                }
            } else {
                None
            }
        };

        let Some(session) = connected else {
            return self.agent_busy(handle, session_id).await;
        };

        self.total_connected.fetch_add(1, Ordering::Relaxed);
        info!("✅ Customer {} connected to agent {} (campaign {})", session.phone, handle.agent_id, handle.id);
        let connected = DialerEvent::CustomerConnected {
            campaign_id: handle.id.clone(),
            session_id: session.session_id.clone(),
            phone: session.phone.clone(),
            call_id: session.call_id.clone(),
        };
        self.settle_with(handle, &session, Some(connected));

        match &session.call_id {
            Some(call_id) => self.bridge_to_agent(handle, call_id).await,
            None => warn!("Connected session {} has no provider call id to redirect", session.session_id),
        }

        if self.config.detection.connect_policy == ConnectPolicy::HangUpOthers {
            self.hang_up_others(handle, session_id).await;
        }
        ConnectOutcome::Connected
    }

    /// Take `session` off the head of its campaign's queue. Runs under the
    /// session's entry lock, and a queued call only leaves the queue under
    /// its own lock, so a session found at the head stays there until popped.
    fn dequeue_head(&self, session: &CallSession) {
        let at_head = self
            .queue
            .peek_for_agent(&session.campaign_id)
            .map_or(false, |head| head.session_id == session.session_id);
        if at_head {
            self.queue.dequeue_for_agent(&session.campaign_id);
        } else {
            self.queue.remove(&session.campaign_id, &session.session_id);
        }
    }

    async fn bridge_to_agent(&self, handle: &CampaignHandle, call_id: &CallId) {
        let result = match self.config.gateway.agent_connection {
            AgentConnection::Conference => {
                let conference = self.config.gateway.conference_for(&handle.id);
                debug!("Redirecting {} into conference {}", call_id, conference);
                self.gateway.redirect_to_conference(call_id, &conference).await
            }
            AgentConnection::DirectToAgent => self.gateway.connect_to_agent(call_id, &handle.agent_id).await,
        };
        if let Err(e) = result {
            warn!("Failed to bridge call {} to agent {}: {}", call_id, handle.agent_id, e);
        }
    }

    /// The agent is busy with another customer
    async fn agent_busy(&self, handle: &CampaignHandle, session_id: &SessionId) -> ConnectOutcome {
        if self.config.detection.connect_policy == ConnectPolicy::HoldOthers {
            debug!("Agent {} busy, session {} keeps waiting", handle.agent_id, session_id);
            return ConnectOutcome::Held;
        }

        let outcome = self.sessions.apply_with(
            session_id,
            CallEvent::ForceHangup(TerminationReason::Superseded),
            |s| {
                self.queue.remove(&s.campaign_id, &s.session_id);
            },
        );
        let Some(session) = outcome.into_session() else {
            return ConnectOutcome::Ignored;
        };

        info!("⏭️ Agent {} already connected, dropping {}", handle.agent_id, session.phone);
        self.settle(handle, &session);
        if let Some(call_id) = &session.call_id {
            self.hangup_quietly(call_id).await;
        }
        ConnectOutcome::Superseded
    }

    /// Hang up every other live call of the campaign
    async fn hang_up_others(&self, handle: &CampaignHandle, keep: &SessionId) {
        let mut to_hang_up = Vec::new();
        for other in self.sessions.sessions_for_campaign(&handle.id) {
            if &other.session_id == keep || !other.is_live() {
                continue;
            }
            let outcome = self.sessions.apply_with(
                &other.session_id,
                CallEvent::ForceHangup(TerminationReason::Superseded),
                |s| {
                    self.queue.remove(&s.campaign_id, &s.session_id);
                },
            );
            if let Some(session) = outcome.into_session() {
                self.settle(handle, &session);
                if let Some(call_id) = session.call_id {
                    to_hang_up.push(call_id);
                }
            }
        }

        if !to_hang_up.is_empty() {
            info!("📴 Hanging up {} other calls of campaign {}", to_hang_up.len(), handle.id);
        }
        join_all(to_hang_up.iter().map(|call_id| self.hangup_quietly(call_id))).await;
    }

    /// The agent is free: connect the oldest waiting call of the campaign.
    ///
    /// Returns the connected session, or `None` if nobody is waiting.
    pub async fn agent_ready(&self, campaign_id: &CampaignId) -> Result<Option<SessionId>> {
        let handle = self.handle(campaign_id)?;
        {
            let campaign = handle.campaign.lock();
            campaign.ensure_active()?;
            if let Some((_, phone)) = &campaign.connected {
                return Err(DialerError::invalid_state(format!(
                    "agent {} is still connected to {}",
                    handle.agent_id, phone
                )));
            }
        }

        while let Some(next) = self.queue.peek_for_agent(campaign_id) {
            match self.connect_session(&handle, &next.session_id, QueueExit::Head).await {
                ConnectOutcome::Connected => return Ok(Some(next.session_id)),
                ConnectOutcome::Ignored => {
                    // Ended between the peek and the connect; it has left the queue.
                    if self.queue.contains(campaign_id, &next.session_id) {
                        warn!("Session {} is queued but not connectable", next.session_id);
                        self.queue.remove(campaign_id, &next.session_id);
                    }
                }
                ConnectOutcome::Superseded | ConnectOutcome::Held => return Ok(None),
            }
        }
        Ok(None)
    }
}
