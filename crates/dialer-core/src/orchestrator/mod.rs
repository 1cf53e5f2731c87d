//! Dialer orchestration
//!
//! [`DialerEngine`] ties the contact pools, session store, wait queue,
//! gateway and event broadcaster together. Its behaviour is split by
//! concern across several `impl` blocks:
//!
//! - `lifecycle`: campaign create / start / end, dispositions, snapshots
//! - `dialer`: claiming and dialing batches of contacts
//! - `detection`: provider callbacks and the human/machine decision
//! - `dispatch`: connecting customers to the agent

pub mod core;
mod detection;
mod dialer;
mod dispatch;
mod lifecycle;

pub use self::core::DialerEngine;
