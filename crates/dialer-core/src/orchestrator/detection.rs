//! Provider callbacks: queue join, detection results and call status.
//!
//! Callbacks arrive late, twice, or in the wrong order. Each handler resolves
//! its session, applies one guarded transition and reacts only if that
//! transition was applied; anything else is logged and dropped.

use std::sync::Arc;
use tracing::{debug, info};

use super::core::{CampaignHandle, DialerEngine};
use super::dispatch::QueueExit;
use crate::config::UnknownOutcomePolicy;
use crate::events::DialerEvent;
use crate::gateway::{CallbackKind, ProviderCallStatus, ProviderCallback};
use crate::queue::{QueueInstructions, QueuedCall};
use crate::session::{CallEvent, CallSession, TransitionOutcome};
use crate::types::{CallId, CallStatus, DetectionOutcome, SessionId};

/// What a detection outcome asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Connect,
    Reject,
}

impl DialerEngine {
    /// Single entry point for provider callbacks. Returns queue instructions
    /// for a call that just joined the wait queue.
    pub async fn handle_callback(&self, callback: ProviderCallback) -> Option<QueueInstructions> {
        let ProviderCallback {
            session_id,
            call_id,
            kind,
        } = callback;
        match kind {
            CallbackKind::Answered => self.on_answered(&session_id, call_id.as_ref()).await,
            CallbackKind::Detection { outcome, answered_by } => {
                self.on_detection_result(&session_id, call_id.as_ref(), outcome, answered_by)
                    .await;
                None
            }
            CallbackKind::Status { status } => {
                self.on_status_changed(&session_id, call_id.as_ref(), status).await;
                None
            }
            CallbackKind::QueueLeft { reason } => {
                self.on_queue_left(&session_id, call_id.as_ref(), &reason);
                None
            }
        }
    }

    /// Resolve a callback's session and campaign, binding the call id if the
    /// callback carries one
    fn resolve(&self, session_id: &SessionId, call_id: Option<&CallId>) -> Option<(CallSession, Arc<CampaignHandle>)> {
        let session = match call_id {
            Some(call_id) => self.sessions.bind_call_id(session_id, call_id),
            None => self.sessions.get(session_id),
        };
        let Some(session) = session else {
            debug!("Callback for unknown or finished session {}", session_id);
            return None;
        };
        match self.handle(&session.campaign_id) {
            Ok(handle) => Some((session, handle)),
            Err(_) => {
                debug!("Callback for session {} of unknown campaign {}", session_id, session.campaign_id);
                None
            }
        }
    }

    /// The customer answered and is joining the wait queue
    pub async fn on_answered(&self, session_id: &SessionId, call_id: Option<&CallId>) -> Option<QueueInstructions> {
        let (_, handle) = self.resolve(session_id, call_id)?;

        let outcome = self.sessions.apply_with(session_id, CallEvent::Enqueue, |s| {
            let position = self.queue.enqueue(QueuedCall {
                session_id: s.session_id.clone(),
                campaign_id: s.campaign_id.clone(),
                phone: s.phone.clone(),
                queued_at: chrono::Utc::now(),
            });
            s.queue_position = Some(position);
        });

        let Some(session) = outcome.into_session() else {
            // A repeated queue join for a call still waiting gets the same answer.
            let position = self.queue.position_of(&handle.id, session_id)?;
            return Some(self.queue_instructions(&handle, position));
        };

        let position = session.queue_position.unwrap_or(1);
        let queued = DialerEvent::CallQueued {
            campaign_id: handle.id.clone(),
            session_id: session.session_id.clone(),
            phone: session.phone.clone(),
            position,
        };
        self.settle_with(&handle, &session, Some(queued));
        let instructions = self.queue_instructions(&handle, position);

        let pending = if self.config.gateway.detection_enabled {
            session.detection
        } else {
            DetectionOutcome::Human
        };
        if let Some(route) = self.route_for(pending) {
            self.route(&handle, &session, route).await;
        }
        Some(instructions)
    }

    /// Asynchronous human/machine analysis finished. `answered_by` is the
    /// provider's raw value, kept for the rejection reason.
    pub async fn on_detection_result(
        &self,
        session_id: &SessionId,
        call_id: Option<&CallId>,
        outcome: DetectionOutcome,
        answered_by: Option<String>,
    ) {
        let Some((_, handle)) = self.resolve(session_id, call_id) else {
            return;
        };
        // Recording and reading the status happen under one entry lock, so
        // either this handler or the answer (queue join or in-progress
        // status) routes the outcome.
        let Some(session) = self.sessions.record_detection(session_id, outcome, answered_by) else {
            return;
        };
        info!("🔍 Detection for {} ({}): {}", session.phone, session_id, outcome);

        match session.status {
            CallStatus::Answered | CallStatus::Queued => {
                if let Some(route) = self.route_for(outcome) {
                    self.route(&handle, &session, route).await;
                }
            }
            CallStatus::Dialing | CallStatus::Ringing => {
                debug!("Detection for {} arrived before the call was answered", session_id);
            }
            status => {
                debug!("Ignoring detection {} for session {} in {}", outcome, session_id, status);
            }
        }
    }

    /// Provider call status changed. Terminating statuses always win over
    /// whatever detection is doing. An in-progress status routes a
    /// detection outcome that arrived while the call was still ringing.
    pub async fn on_status_changed(&self, session_id: &SessionId, call_id: Option<&CallId>, status: ProviderCallStatus) {
        let Some(event) = status.to_event() else {
            debug!("Status {:?} for session {} needs no action", status, session_id);
            return;
        };
        let Some((_, handle)) = self.resolve(session_id, call_id) else {
            return;
        };

        let outcome = self.sessions.apply_with(session_id, event, |s| {
            if s.status != CallStatus::Queued {
                self.queue.remove(&s.campaign_id, &s.session_id);
            }
        });
        let TransitionOutcome::Applied { from, session } = outcome else {
            return;
        };

        if !session.status.is_terminal() {
            self.settle(&handle, &session);
            if session.status == CallStatus::Answered && self.config.gateway.detection_enabled {
                if let Some(route) = self.route_for(session.detection) {
                    self.route(&handle, &session, route).await;
                }
            }
            return;
        }

        let follow_up = if from == CallStatus::Connected {
            info!("📴 Connected call to {} ended ({})", session.phone, session.status);
            Some(DialerEvent::CallEnded {
                campaign_id: handle.id.clone(),
                session_id: session.session_id.clone(),
                phone: session.phone.clone(),
                status: session.status,
            })
        } else if matches!(session.status, CallStatus::Terminated(reason) if reason.is_provider_failure()) {
            Some(DialerEvent::AutoDialNext {
                campaign_id: handle.id.clone(),
                phone: session.phone.clone(),
                reason: format!("{} - {}", session.phone, session.status),
            })
        } else {
            None
        };
        self.settle_with(&handle, &session, follow_up);
    }

    /// The provider reports the call left its wait queue. Status changes
    /// that go with it arrive as their own status callbacks; this only
    /// tells listeners.
    pub fn on_queue_left(&self, session_id: &SessionId, call_id: Option<&CallId>, reason: &str) {
        let Some((session, handle)) = self.resolve(session_id, call_id) else {
            return;
        };
        info!("📤 Call to {} left the queue: {}", session.phone, reason);
        self.emit(
            &handle,
            DialerEvent::CallDequeued {
                campaign_id: handle.id.clone(),
                session_id: session.session_id.clone(),
                phone: session.phone.clone(),
                call_id: session.call_id.clone(),
                reason: reason.to_string(),
            },
        );
    }

    pub(crate) fn route_for(&self, outcome: DetectionOutcome) -> Option<Route> {
        match outcome {
            DetectionOutcome::Pending => None,
            DetectionOutcome::Human => Some(Route::Connect),
            DetectionOutcome::Machine => Some(Route::Reject),
            DetectionOutcome::Unknown => match self.config.detection.unknown_outcome {
                UnknownOutcomePolicy::Connect => Some(Route::Connect),
                UnknownOutcomePolicy::Reject => Some(Route::Reject),
            },
        }
    }

    async fn route(&self, handle: &CampaignHandle, session: &CallSession, route: Route) {
        match route {
            Route::Connect => {
                self.connect_session(handle, &session.session_id, QueueExit::Remove).await;
            }
            Route::Reject => self.reject_session(handle, &session.session_id).await,
        }
    }

    /// Drop a call answered by a machine
    async fn reject_session(&self, handle: &CampaignHandle, session_id: &SessionId) {
        let outcome = self.sessions.apply_with(session_id, CallEvent::Reject, |s| {
            self.queue.remove(&s.campaign_id, &s.session_id);
        });
        let Some(session) = outcome.into_session() else {
            return;
        };

        info!("📵 Hanging up {} - voicemail detected", session.phone);
        let answered_by = session
            .answered_by
            .clone()
            .unwrap_or_else(|| session.detection.to_string());
        let rejected = DialerEvent::CallRejected {
            campaign_id: handle.id.clone(),
            session_id: session.session_id.clone(),
            phone: session.phone.clone(),
            reason: format!("Voicemail: {}", answered_by),
        };
        self.settle_with(handle, &session, Some(rejected));
        if let Some(call_id) = &session.call_id {
            self.hangup_quietly(call_id).await;
        }
    }

    fn queue_instructions(&self, handle: &CampaignHandle, position: usize) -> QueueInstructions {
        QueueInstructions {
            queue_name: self.config.queue.queue_name_for(&handle.id),
            hold_music_url: self.config.queue.hold_music_url.clone(),
            position,
        }
    }
}
