//! Call sessions: one per outbound call attempt.
//!
//! All session mutation goes through [`SessionStore`]'s guarded transitions,
//! which check the current status against the [`CallEvent`] table under
//! the session's entry lock. Duplicate and out-of-order provider callbacks
//! therefore resolve to [`TransitionOutcome::NoOp`] instead of errors.

pub mod state;
pub mod store;
pub mod transitions;

pub use state::CallSession;
pub use store::{SessionStats, SessionStore, TransitionOutcome};
pub use transitions::CallEvent;
