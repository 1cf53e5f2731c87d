use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use super::state::CallSession;
use super::transitions::CallEvent;
use crate::error::{DialerError, Result};
use crate::types::{CallId, CallStatus, CampaignId, DetectionOutcome, PhoneNumber, SessionId};

/// Result of a guarded transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition ran; `session` is the state right after it
    Applied { from: CallStatus, session: CallSession },
    /// The session is unknown or was not in an accepted status
    NoOp { current: Option<CallStatus> },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }

    pub fn session(&self) -> Option<&CallSession> {
        match self {
            TransitionOutcome::Applied { session, .. } => Some(session),
            TransitionOutcome::NoOp { .. } => None,
        }
    }

    pub fn into_session(self) -> Option<CallSession> {
        match self {
            TransitionOutcome::Applied { session, .. } => Some(session),
            TransitionOutcome::NoOp { .. } => None,
        }
    }
}

/// Session statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub dialing: usize,
    pub ringing: usize,
    pub answered: usize,
    pub queued: usize,
    pub connected: usize,
    pub finished: usize,
}

/// Authoritative store of call sessions.
///
/// Each session lives in its own map entry, and the entry lock is the only
/// thing guarding its status. Two secondary indexes are kept alongside:
/// provider call id to session, and (campaign, phone) to the live session
/// for that pair.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, CallSession>,

    /// Index by provider call ID
    by_call_id: DashMap<CallId, SessionId>,

    /// Live session per (campaign, phone)
    live: DashMap<(CampaignId, PhoneNumber), SessionId>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a DIALING session for `phone`.
    ///
    /// Fails with `AlreadyExists` while another session for the same
    /// campaign and phone is still live.
    pub fn create(&self, campaign_id: &CampaignId, phone: &PhoneNumber) -> Result<CallSession> {
        let key = (campaign_id.clone(), phone.clone());
        let session = CallSession::new(SessionId::new(), campaign_id.clone(), phone.clone());

        match self.live.entry(key) {
            Entry::Occupied(mut occupied) => {
                let still_live = self
                    .sessions
                    .get(occupied.get())
                    .map_or(false, |existing| existing.is_live());
                if still_live {
                    return Err(DialerError::already_exists(format!(
                        "live session {} for {} in campaign {}",
                        occupied.get(),
                        phone,
                        campaign_id
                    )));
                }
                self.sessions.insert(session.session_id.clone(), session.clone());
                occupied.insert(session.session_id.clone());
            }
            Entry::Vacant(vacant) => {
                self.sessions.insert(session.session_id.clone(), session.clone());
                vacant.insert(session.session_id.clone());
            }
        }

        debug!("Created session {} for {} (campaign {})", session.session_id, phone, campaign_id);
        Ok(session)
    }

    pub fn get(&self, session_id: &SessionId) -> Option<CallSession> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Guarded compare-and-set of a session's status
    pub fn transition(
        &self,
        session_id: &SessionId,
        expected: &[CallStatus],
        new_status: CallStatus,
    ) -> TransitionOutcome {
        self.transition_with(session_id, expected, new_status, |_| {})
    }

    /// Guarded compare-and-set that also runs `effect` on the session while
    /// its entry is locked. The effect sees the session after the status
    /// change and may touch the queue, never the store.
    pub fn transition_with<F>(
        &self,
        session_id: &SessionId,
        expected: &[CallStatus],
        new_status: CallStatus,
        effect: F,
    ) -> TransitionOutcome
    where
        F: FnOnce(&mut CallSession),
    {
        self.guarded(session_id, |current| expected.contains(&current).then_some(new_status), effect)
    }

    /// Apply one event from the transition table
    pub fn apply(&self, session_id: &SessionId, event: CallEvent) -> TransitionOutcome {
        self.apply_with(session_id, event, |_| {})
    }

    pub fn apply_with<F>(&self, session_id: &SessionId, event: CallEvent, effect: F) -> TransitionOutcome
    where
        F: FnOnce(&mut CallSession),
    {
        let outcome = self.guarded(session_id, |current| event.apply(current), effect);
        if !outcome.is_applied() {
            debug!("Ignored {} for session {}: {:?}", event, session_id, outcome);
        }
        outcome
    }

    fn guarded<G, F>(&self, session_id: &SessionId, guard: G, effect: F) -> TransitionOutcome
    where
        G: FnOnce(CallStatus) -> Option<CallStatus>,
        F: FnOnce(&mut CallSession),
    {
        let outcome = {
            let Some(mut entry) = self.sessions.get_mut(session_id) else {
                return TransitionOutcome::NoOp { current: None };
            };
            let from = entry.status;
            let Some(target) = guard(from) else {
                return TransitionOutcome::NoOp { current: Some(from) };
            };
            entry.set_status(target);
            effect(entry.value_mut());
            TransitionOutcome::Applied {
                from,
                session: entry.clone(),
            }
        };

        if let TransitionOutcome::Applied { session, .. } = &outcome {
            if session.status.is_terminal() {
                self.release_live(session);
            }
        }
        outcome
    }

    fn release_live(&self, session: &CallSession) {
        let key = (session.campaign_id.clone(), session.phone.clone());
        self.live.remove_if(&key, |_, id| id == &session.session_id);
    }

    /// Attach the provider call id. Returns the session as it is now.
    pub fn bind_call_id(&self, session_id: &SessionId, call_id: &CallId) -> Option<CallSession> {
        let session = {
            let mut entry = self.sessions.get_mut(session_id)?;
            if entry.call_id.as_ref() == Some(call_id) {
                return Some(entry.clone());
            }
            entry.call_id = Some(call_id.clone());
            entry.clone()
        };
        self.by_call_id.insert(call_id.clone(), session_id.clone());
        Some(session)
    }

    /// Find session by provider call ID
    pub fn find_by_call_id(&self, call_id: &CallId) -> Option<CallSession> {
        let session_id = self.by_call_id.get(call_id).map(|id| id.clone())?;
        self.get(&session_id)
    }

    /// Store a detection outcome without changing status. Only calls that
    /// have not reached the agent yet take the outcome; the session is
    /// returned as it is either way.
    pub fn record_detection(
        &self,
        session_id: &SessionId,
        outcome: DetectionOutcome,
        answered_by: Option<String>,
    ) -> Option<CallSession> {
        let mut entry = self.sessions.get_mut(session_id)?;
        if entry.is_live() && entry.status != CallStatus::Connected {
            entry.detection = outcome;
            entry.answered_by = answered_by;
            entry.updated_at = chrono::Utc::now();
        }
        Some(entry.clone())
    }

    pub fn remove(&self, session_id: &SessionId) -> Option<CallSession> {
        let (_, session) = self.sessions.remove(session_id)?;
        if let Some(call_id) = &session.call_id {
            self.by_call_id.remove(call_id);
        }
        self.release_live(&session);
        debug!("Removed session {} ({})", session_id, session.status);
        Some(session)
    }

    pub fn sessions_for_campaign(&self, campaign_id: &CampaignId) -> Vec<CallSession> {
        let mut sessions: Vec<CallSession> = self
            .sessions
            .iter()
            .filter(|s| &s.campaign_id == campaign_id)
            .map(|s| s.clone())
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Live session for a (campaign, phone) pair
    pub fn live_session_for(&self, campaign_id: &CampaignId, phone: &str) -> Option<CallSession> {
        let key = (campaign_id.clone(), phone.to_string());
        let session_id = self.live.get(&key).map(|id| id.clone())?;
        self.get(&session_id).filter(|s| s.is_live())
    }

    /// Remove every session of a campaign
    pub fn purge_campaign(&self, campaign_id: &CampaignId) -> usize {
        let ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| &s.campaign_id == campaign_id)
            .map(|s| s.session_id.clone())
            .collect();
        let removed = ids.iter().filter(|id| self.remove(id).is_some()).count();
        if removed > 0 {
            info!("Purged {} sessions of campaign {}", removed, campaign_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Get session statistics
    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for session in self.sessions.iter() {
            stats.total += 1;
            match session.status {
                CallStatus::Dialing => stats.dialing += 1,
                CallStatus::Ringing => stats.ringing += 1,
                CallStatus::Answered => stats.answered += 1,
                CallStatus::Queued => stats.queued += 1,
                CallStatus::Connected => stats.connected += 1,
                CallStatus::Completed | CallStatus::Terminated(_) => stats.finished += 1,
            }
        }
        stats
    }
}
