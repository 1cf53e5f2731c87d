//! Contact pool: the ordered contact list, its per-contact status ledger and
//! the batch cursor.
//!
//! The cursor is kept as an absolute position that only ever grows. The
//! contact index is `position % len` and the recycling pass is
//! `position / len`, so wrapping past the end of the list and starting a new
//! pass are the same event and cannot drift apart.
//!
//! A contact is eligible for a claim when it has never been dialed, or when
//! its last attempt ended (terminal status) during an earlier pass. Live
//! contacts (dialing, ringing, answered, queued, connected) are never
//! eligible.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{CallStatus, CampaignId, PhoneNumber, PoolId, SessionId};

/// Ledger entry for one contact
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContactEntry {
    /// Status of the latest attempt, `None` if never dialed
    pub status: Option<CallStatus>,
    /// Session of the latest attempt
    pub session_id: Option<SessionId>,
    /// Campaign that made the latest attempt
    pub campaign_id: Option<CampaignId>,
    /// Revision of the session status last recorded here
    #[serde(skip)]
    pub revision: u64,
    /// Recycling pass the latest attempt was claimed in
    pub claimed_in_pass: Option<u64>,
    pub attempts: u32,
}

impl ContactEntry {
    fn is_eligible(&self, pass: u64, recycle_completed: bool) -> bool {
        match self.status {
            None => true,
            Some(status) if status.is_terminal() => {
                let earlier_pass = self.claimed_in_pass.map_or(true, |claimed| claimed < pass);
                earlier_pass && (recycle_completed || status != CallStatus::Completed)
            }
            Some(_) => false,
        }
    }
}

/// A contact claimed by one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedContact {
    pub index: usize,
    pub phone: PhoneNumber,
    pub session_id: SessionId,
}

/// Serializable view of a pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub pool_id: PoolId,
    pub contacts: Vec<PhoneNumber>,
    pub contact_status: Vec<(PhoneNumber, Option<CallStatus>)>,
    pub cursor: usize,
    pub pass: u64,
}

#[derive(Debug)]
struct PoolState {
    contacts: Vec<PhoneNumber>,
    entries: HashMap<PhoneNumber, ContactEntry>,
    position: u64,
}

/// Contact list plus dial ledger, shared by every campaign dialing from it
#[derive(Debug)]
pub struct ContactPool {
    id: PoolId,
    state: Mutex<PoolState>,
}

impl ContactPool {
    pub fn new(contacts: Vec<PhoneNumber>) -> Self {
        let entries = contacts
            .iter()
            .map(|p| (p.clone(), ContactEntry::default()))
            .collect();
        Self {
            id: PoolId::new(),
            state: Mutex::new(PoolState {
                contacts,
                entries,
                position: 0,
            }),
        }
    }

    pub fn id(&self) -> &PoolId {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.state.lock().contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, phone: &str) -> bool {
        self.state.lock().entries.contains_key(phone)
    }

    /// Index of the next contact the cursor will examine
    pub fn cursor(&self) -> usize {
        let state = self.state.lock();
        if state.contacts.is_empty() {
            0
        } else {
            (state.position % state.contacts.len() as u64) as usize
        }
    }

    /// Current recycling pass (0 until the list has been exhausted once)
    pub fn pass(&self) -> u64 {
        let state = self.state.lock();
        if state.contacts.is_empty() {
            0
        } else {
            state.position / state.contacts.len() as u64
        }
    }

    pub fn status_of(&self, phone: &str) -> Option<CallStatus> {
        self.state.lock().entries.get(phone).and_then(|e| e.status)
    }

    pub fn entry(&self, phone: &str) -> Option<ContactEntry> {
        self.state.lock().entries.get(phone).cloned()
    }

    /// Claim up to `count` eligible contacts in one step.
    ///
    /// `create_session` runs for each candidate while the pool lock is held
    /// and returns the session created for it; returning `None` skips the
    /// candidate. Every claimed contact is marked DIALING before the lock is
    /// released, so concurrent claims never see the same contact as eligible.
    pub fn claim<F>(
        &self,
        campaign_id: &CampaignId,
        count: usize,
        recycle_completed: bool,
        mut create_session: F,
    ) -> Vec<ClaimedContact>
    where
        F: FnMut(&PhoneNumber) -> Option<SessionId>,
    {
        let mut state = self.state.lock();
        let len = state.contacts.len();
        if len == 0 || count == 0 {
            return Vec::new();
        }

        let start = state.position;
        let mut claimed = Vec::new();
        let mut last_claimed: Option<u64> = None;

        for step in 0..len as u64 {
            if claimed.len() >= count {
                break;
            }
            let absolute = start + step;
            let index = (absolute % len as u64) as usize;
            let pass = absolute / len as u64;
            let phone = state.contacts[index].clone();

            let eligible = state
                .entries
                .get(&phone)
                .map_or(true, |e| e.is_eligible(pass, recycle_completed));
            if !eligible {
                continue;
            }

            let Some(session_id) = create_session(&phone) else {
                continue;
            };

            let entry = state.entries.entry(phone.clone()).or_default();
            entry.status = Some(CallStatus::Dialing);
            entry.session_id = Some(session_id.clone());
            entry.campaign_id = Some(campaign_id.clone());
            entry.revision = 0;
            entry.claimed_in_pass = Some(pass);
            entry.attempts += 1;

            claimed.push(ClaimedContact {
                index,
                phone,
                session_id,
            });
            last_claimed = Some(absolute);
        }

        if let Some(absolute) = last_claimed {
            state.position = absolute + 1;
        }

        debug!(
            "Claimed {} of {} requested contacts for campaign {} (cursor now {})",
            claimed.len(),
            count,
            campaign_id,
            state.position % len as u64
        );
        claimed
    }

    /// Record the latest status of a contact's attempt.
    ///
    /// Ignored unless `session_id` is the contact's current attempt and
    /// `revision` is newer than what was recorded, so late or reordered
    /// updates cannot move a contact backwards.
    pub fn record_status(
        &self,
        phone: &str,
        session_id: &SessionId,
        status: CallStatus,
        revision: u64,
    ) -> bool {
        self.record_status_then(phone, session_id, status, revision, || {})
    }

    /// Like [`record_status`](Self::record_status), running `on_recorded`
    /// under the pool lock when the update is accepted. Anything published
    /// from `on_recorded` is therefore ordered by revision per contact.
    pub fn record_status_then<F>(
        &self,
        phone: &str,
        session_id: &SessionId,
        status: CallStatus,
        revision: u64,
        on_recorded: F,
    ) -> bool
    where
        F: FnOnce(),
    {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(phone) else {
            return false;
        };
        if entry.session_id.as_ref() != Some(session_id) || revision <= entry.revision {
            return false;
        }
        entry.status = Some(status);
        entry.revision = revision;
        on_recorded();
        true
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock();
        let len = state.contacts.len() as u64;
        let contact_status = state
            .contacts
            .iter()
            .map(|p| (p.clone(), state.entries.get(p).and_then(|e| e.status)))
            .collect();
        PoolSnapshot {
            pool_id: self.id.clone(),
            contacts: state.contacts.clone(),
            contact_status,
            cursor: if len == 0 { 0 } else { (state.position % len) as usize },
            pass: if len == 0 { 0 } else { state.position / len },
        }
    }
}
