//! ipvane-core: the update scheduling and state-transition engine.
//!
//! Decides when to check the host's external network identity, de-duplicates
//! and records changes, manages the idle/active polling regime, and exposes
//! a typed event stream of state transitions to any consumer.
//!
//! All state mutation happens on the single task running
//! [`scheduler::UpdateScheduler::run`]; provider fetches run on worker tasks
//! and hand immutable results back over a channel.

pub mod config;
pub mod events;
pub mod probe;
pub mod reconcile;
pub mod scheduler;
pub mod shutdown;
pub mod state;
