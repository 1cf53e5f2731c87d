//! Call session transition table.
//!
//! Every status change a session can go through is one [`CallEvent`]. The
//! table is closed: an event either accepts the current status and names a
//! target, or the pair is not in the table and applying it is a no-op.
//!
//! | Event | Accepted from | Target |
//! |---|---|---|
//! | `Ringing` | DIALING | RINGING |
//! | `Answered` | DIALING, RINGING | ANSWERED |
//! | `Enqueue` | DIALING, RINGING, ANSWERED | QUEUED |
//! | `Connect` | ANSWERED, QUEUED | CONNECTED |
//! | `Reject` | ANSWERED, QUEUED | TERMINATED(voicemail) |
//! | `Complete` | any live status | COMPLETED from CONNECTED, else TERMINATED(hung-up) |
//! | `ProviderFailure(r)` | any live status | TERMINATED(r) |
//! | `ForceHangup(r)` | any live status | TERMINATED(r) |

use std::fmt;

use crate::types::{CallStatus, TerminationReason};

/// Something that happened to a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallEvent {
    /// Provider reports the far end is ringing
    Ringing,
    /// Provider reports the call was picked up
    Answered,
    /// The answered call joined the wait queue
    Enqueue,
    /// Detection said HUMAN and the call goes to the agent
    Connect,
    /// Detection said MACHINE
    Reject,
    /// Provider reports the call completed normally
    Complete,
    /// Provider reports the call failed (busy, no-answer, failed, canceled)
    ProviderFailure(TerminationReason),
    /// The dialer hangs the call up itself
    ForceHangup(TerminationReason),
}

impl CallEvent {
    /// Whether the table has an entry for this event from `status`
    pub fn accepts_from(&self, status: CallStatus) -> bool {
        use CallStatus::*;
        match self {
            CallEvent::Ringing => matches!(status, Dialing),
            CallEvent::Answered => matches!(status, Dialing | Ringing),
            CallEvent::Enqueue => matches!(status, Dialing | Ringing | Answered),
            CallEvent::Connect | CallEvent::Reject => matches!(status, Answered | Queued),
            CallEvent::Complete | CallEvent::ProviderFailure(_) | CallEvent::ForceHangup(_) => {
                !status.is_terminal()
            }
        }
    }

    /// Status reached when the event is applied from `from`
    pub fn target(&self, from: CallStatus) -> CallStatus {
        match self {
            CallEvent::Ringing => CallStatus::Ringing,
            CallEvent::Answered => CallStatus::Answered,
            CallEvent::Enqueue => CallStatus::Queued,
            CallEvent::Connect => CallStatus::Connected,
            CallEvent::Reject => CallStatus::Terminated(TerminationReason::Voicemail),
            CallEvent::Complete => {
                if from == CallStatus::Connected {
                    CallStatus::Completed
                } else {
                    CallStatus::Terminated(TerminationReason::HungUp)
                }
            }
            CallEvent::ProviderFailure(reason) | CallEvent::ForceHangup(reason) => CallStatus::Terminated(*reason),
        }
    }

    /// Statuses this event is accepted from
    pub fn accepted_statuses(&self) -> Vec<CallStatus> {
        CallStatus::NON_TERMINAL
            .into_iter()
            .filter(|s| self.accepts_from(*s))
            .collect()
    }

    /// `Some(target)` if the pair is in the table
    pub fn apply(&self, from: CallStatus) -> Option<CallStatus> {
        self.accepts_from(from).then(|| self.target(from))
    }
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallEvent::Ringing => f.write_str("ringing"),
            CallEvent::Answered => f.write_str("answered"),
            CallEvent::Enqueue => f.write_str("enqueue"),
            CallEvent::Connect => f.write_str("connect"),
            CallEvent::Reject => f.write_str("reject"),
            CallEvent::Complete => f.write_str("complete"),
            CallEvent::ProviderFailure(r) => write!(f, "provider-failure({})", r.as_str()),
            CallEvent::ForceHangup(r) => write!(f, "force-hangup({})", r.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CallStatus::*;

    fn all_statuses() -> Vec<CallStatus> {
        let mut statuses = CallStatus::NON_TERMINAL.to_vec();
        statuses.push(Completed);
        statuses.push(Terminated(TerminationReason::Voicemail));
        statuses.push(Terminated(TerminationReason::Busy));
        statuses
    }

    fn all_events() -> Vec<CallEvent> {
        vec![
            CallEvent::Ringing,
            CallEvent::Answered,
            CallEvent::Enqueue,
            CallEvent::Connect,
            CallEvent::Reject,
            CallEvent::Complete,
            CallEvent::ProviderFailure(TerminationReason::NoAnswer),
            CallEvent::ForceHangup(TerminationReason::Superseded),
        ]
    }

    #[test]
    fn test_terminal_statuses_accept_nothing() {
        for status in all_statuses().into_iter().filter(|s| s.is_terminal()) {
            for event in all_events() {
                assert_eq!(event.apply(status), None, "{} from {}", event, status);
            }
        }
    }

    #[test]
    fn test_every_applied_event_moves_forward() {
        fn rank(s: CallStatus) -> u8 {
            match s {
                Dialing => 0,
                Ringing => 1,
                Answered => 2,
                Queued => 3,
                Connected => 4,
                Completed | Terminated(_) => 5,
            }
        }
        for status in all_statuses() {
            for event in all_events() {
                if let Some(target) = event.apply(status) {
                    assert!(rank(target) > rank(status), "{} from {} went to {}", event, status, target);
                }
            }
        }
    }

    #[test]
    fn test_table_entries() {
        assert_eq!(CallEvent::Ringing.apply(Dialing), Some(Ringing));
        assert_eq!(CallEvent::Ringing.apply(Answered), None);
        assert_eq!(CallEvent::Enqueue.apply(Ringing), Some(Queued));
        assert_eq!(CallEvent::Connect.apply(Queued), Some(Connected));
        assert_eq!(CallEvent::Connect.apply(Ringing), None);
        assert_eq!(CallEvent::Reject.apply(Answered), Some(Terminated(TerminationReason::Voicemail)));
        assert_eq!(CallEvent::Complete.apply(Connected), Some(Completed));
        assert_eq!(CallEvent::Complete.apply(Queued), Some(Terminated(TerminationReason::HungUp)));
        assert_eq!(
            CallEvent::ProviderFailure(TerminationReason::Busy).apply(Dialing),
            Some(Terminated(TerminationReason::Busy))
        );
    }

    #[test]
    fn test_connect_is_only_reachable_from_answered_or_queued() {
        assert_eq!(CallEvent::Connect.accepted_statuses(), vec![Answered, Queued]);
    }
}
