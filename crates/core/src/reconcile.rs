use tokio::sync::watch;

use ipvane_lookup::{LocationRecord, LookupReply, NO_IP};

use crate::events::{self, EventSender, StateEvent};
use crate::state::{AgentStatus, AppState};

/// Interprets raw provider results against current state, owns all AppState
/// mutation, and emits exactly the right events.
pub struct StateReconciler {
    state: AppState,
    events: EventSender,
    status_tx: watch::Sender<AgentStatus>,
}

impl StateReconciler {
    pub fn new(events: EventSender, status_tx: watch::Sender<AgentStatus>) -> Self {
        Self {
            state: AppState::new(),
            events,
            status_tx,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Reconcile one fetch completion. `None` means the provider failed or
    /// timed out; a reply carrying the sentinel IP counts as a failure too.
    pub fn apply(&mut self, reply: Option<LookupReply>, is_forced: bool) {
        match reply {
            Some(reply) if reply.ip != NO_IP && !reply.ip.is_empty() => {
                self.on_lookup_ok(reply, is_forced);
            }
            _ => self.on_lookup_failed(is_forced),
        }
        self.broadcast();
    }

    fn on_lookup_ok(&mut self, reply: LookupReply, is_forced: bool) {
        let ip_changed = reply.ip != self.state.last_known_ip();
        if !ip_changed && !is_forced {
            // same identity re-confirmed on an ordinary poll
            return;
        }
        if ip_changed {
            tracing::info!(
                old = %self.state.last_known_ip(),
                new = %reply.ip,
                "external IP changed"
            );
        }
        let record = reply
            .location
            .unwrap_or_else(|| LocationRecord::partial(reply.ip.clone()));
        self.state.apply_location(record.clone());
        events::emit(&self.events, StateEvent::LocationChanged { record, is_forced });
    }

    fn on_lookup_failed(&mut self, is_forced: bool) {
        if self.state.last_known_ip() != NO_IP {
            tracing::warn!("external IP lookup failed, network considered lost");
            events::emit(&self.events, StateEvent::NetworkLost);
        } else if is_forced {
            // already in the known-lost state, but the user asked explicitly
            events::emit(&self.events, StateEvent::NetworkLost);
        }
        self.state.clear_network_state();
    }

    /// Flip into the idle regime and announce it.
    pub fn enter_idle(&mut self) {
        if self.state.is_idle() {
            return;
        }
        self.state.set_idle(true);
        tracing::info!("entering idle mode");
        events::emit(&self.events, StateEvent::EnteredIdle);
        self.broadcast();
    }

    /// Leave the idle regime and announce it. No-op when already active.
    pub fn exit_idle(&mut self) {
        if !self.state.is_idle() {
            return;
        }
        self.state.set_idle(false);
        tracing::info!("exiting idle mode");
        events::emit(&self.events, StateEvent::ExitedIdle);
        self.broadcast();
    }

    fn broadcast(&self) {
        // watch send only fails when every receiver is gone
        let _ = self.status_tx.send(self.state.snapshot());
    }
}
