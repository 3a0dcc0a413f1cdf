use ipvane_lookup::LocationRecord;
use serde::Serialize;
use tokio::sync::mpsc;

/// A state transition emitted by the engine. Consumers (tray UI, logger,
/// notifier) subscribe to the receiving end of the channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StateEvent {
    /// A new (or force-refreshed) network identity. Always a full snapshot,
    /// never a delta.
    LocationChanged {
        record: LocationRecord,
        is_forced: bool,
    },
    /// The external IP could not be resolved; previous identity cleared.
    NetworkLost,
    /// Entered the reduced-frequency idle regime.
    EnteredIdle,
    /// Left idle mode; a forced refresh follows immediately.
    ExitedIdle,
}

/// Event channel sender; the engine pushes transitions here.
pub type EventSender = mpsc::Sender<StateEvent>;
/// Event channel receiver; consumers read transitions from here.
pub type EventReceiver = mpsc::Receiver<StateEvent>;

/// Create an event channel with the given buffer size.
pub fn channel(buffer: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(buffer)
}

/// Non-blocking emit. A lagging consumer loses events rather than stalling
/// the scheduling loop.
pub(crate) fn emit(tx: &EventSender, event: StateEvent) {
    if tx.try_send(event).is_err() {
        tracing::warn!("event channel full, event dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_delivers_in_order() {
        let (tx, mut rx) = channel(4);
        emit(&tx, StateEvent::EnteredIdle);
        emit(&tx, StateEvent::ExitedIdle);
        assert_eq!(rx.recv().await.unwrap(), StateEvent::EnteredIdle);
        assert_eq!(rx.recv().await.unwrap(), StateEvent::ExitedIdle);
    }

    #[tokio::test]
    async fn emit_drops_on_overflow() {
        let (tx, mut rx) = channel(1);
        emit(&tx, StateEvent::NetworkLost);
        emit(&tx, StateEvent::EnteredIdle); // dropped, must not panic
        assert_eq!(rx.recv().await.unwrap(), StateEvent::NetworkLost);
        assert!(rx.try_recv().is_err());
    }
}
