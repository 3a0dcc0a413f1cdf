use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use ipvane_lookup::{LocationRecord, NO_IP};
use serde::Serialize;

/// Bounded location history depth.
pub const HISTORY_CAP: usize = 3;

/// In-memory agent state. Mutated exclusively by the scheduler/reconciler
/// pair on the event-loop task; everyone else sees read-only snapshots.
/// Never persisted, so the location history only spans one process run.
#[derive(Debug, Default)]
pub struct AppState {
    current: Option<LocationRecord>,
    history: VecDeque<LocationRecord>,
    last_known_ip: String,
    is_idle: bool,
    last_update: Option<DateTime<Utc>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last successfully reconciled record, if any.
    pub fn current(&self) -> Option<&LocationRecord> {
        self.current.as_ref()
    }

    /// Previous identities, oldest first, at most [`HISTORY_CAP`].
    pub fn history(&self) -> impl Iterator<Item = &LocationRecord> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Most recently observed valid IP, `""` before the first success, or
    /// the `"N/A"` sentinel after a confirmed loss.
    pub fn last_known_ip(&self) -> &str {
        &self.last_known_ip
    }

    pub fn is_idle(&self) -> bool {
        self.is_idle
    }

    pub(crate) fn set_idle(&mut self, idle: bool) {
        self.is_idle = idle;
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Replace the current record wholesale. The previous record moves into
    /// history only when the IP actually changed and differs from the most
    /// recent history entry; the oldest entry is evicted on overflow.
    pub(crate) fn apply_location(&mut self, record: LocationRecord) {
        if record.ip.is_empty() || record.ip == NO_IP {
            return;
        }
        if self.last_known_ip != record.ip {
            if let Some(prev) = self.current.take() {
                let duplicate = self.history.back().is_some_and(|h| h.ip == prev.ip);
                if !duplicate {
                    if self.history.len() >= HISTORY_CAP {
                        self.history.pop_front();
                    }
                    self.history.push_back(prev);
                }
            }
            self.last_known_ip = record.ip.clone();
        }
        self.current = Some(record);
        self.last_update = Some(Utc::now());
    }

    /// Transition into the known-lost state. Clears the current record so
    /// no stale identity is left on display.
    pub(crate) fn clear_network_state(&mut self) {
        self.last_known_ip = NO_IP.to_owned();
        self.current = None;
    }

    pub fn snapshot(&self) -> AgentStatus {
        AgentStatus {
            current: self.current.clone(),
            history: self.history.iter().cloned().collect(),
            last_known_ip: self.last_known_ip.clone(),
            is_idle: self.is_idle,
            last_update: self.last_update,
        }
    }
}

/// Read-only snapshot of the agent state, broadcast on a watch channel after
/// every reconcile and mode change. This is the status surface consumers
/// render from (tooltip, status bar, metrics).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentStatus {
    pub current: Option<LocationRecord>,
    pub history: Vec<LocationRecord>,
    pub last_known_ip: String,
    pub is_idle: bool,
    pub last_update: Option<DateTime<Utc>>,
}
