//! Messenger bridge between the session owner and an observer.
//!
//! Relays session-state and data events to whichever observer most
//! recently registered, and commands in the other direction, without
//! either side holding a direct reference to the other. Bounded
//! single-consumer mailbox per direction; sends are fire-and-forget.

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Capacity of each bridge direction.
const CHANNEL_CAPACITY: usize = 32;

/// Commands flowing observer → session owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Start scanning for the sensor.
    StartScan,
}

/// Events flowing session owner → observer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UiEvent {
    /// The scan became active.
    ScanningStarted,
    /// The scan stopped.
    ScanningStopped,
    /// A parsed reading, encoded as colon-joined decimals (`"23.5:45.0"`).
    SensorData(String),
    /// Best-effort human-readable notice.
    UiNotice(String),
}

/// The bridge itself.
///
/// The session owner holds this; observers register a reply channel and
/// submit commands through it. At most one reply channel is retained —
/// the last writer wins, and sends while none is registered are dropped
/// silently.
pub struct Bridge {
    client_tx: RwLock<Option<mpsc::Sender<UiEvent>>>,
    command_tx: mpsc::Sender<Command>,
}

impl Bridge {
    /// Create the bridge and the command mailbox consumed by the owner.
    pub(crate) fn new() -> (Self, mpsc::Receiver<Command>) {
        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                client_tx: RwLock::new(None),
                command_tx,
            },
            command_rx,
        )
    }

    /// Install a fresh reply channel and return its receiving end.
    ///
    /// Replaces any previously registered channel; the old receiver stops
    /// getting events from this point on.
    pub fn register_client(&self) -> mpsc::Receiver<UiEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        if self.client_tx.write().replace(tx).is_some() {
            debug!("replacing registered bridge client");
        }
        rx
    }

    /// Drop the registered reply channel, if any.
    pub fn unregister_client(&self) {
        self.client_tx.write().take();
    }

    /// Check whether a reply channel is currently registered.
    pub fn is_client_registered(&self) -> bool {
        self.client_tx.read().is_some()
    }

    /// Send an event to the registered observer, if any.
    ///
    /// Fire-and-forget: with no registered channel, or a full or closed
    /// one, the event is dropped.
    pub fn send(&self, event: UiEvent) {
        let tx = self.client_tx.read().clone();
        match tx {
            Some(tx) => {
                if tx.try_send(event).is_err() {
                    trace!("bridge client unavailable, dropping event");
                }
            }
            None => trace!("no bridge client registered, dropping event"),
        }
    }

    /// Submit a command to the session owner.
    ///
    /// Fire-and-forget like the event direction.
    pub fn send_command(&self, command: Command) {
        if self.command_tx.try_send(command).is_err() {
            trace!("session owner unavailable, dropping command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unregistered_sends_are_dropped() {
        let (bridge, _command_rx) = Bridge::new();

        assert!(!bridge.is_client_registered());
        // Must not error or panic.
        bridge.send(UiEvent::SensorData("23.5:45.0".to_string()));
        bridge.send(UiEvent::ScanningStarted);
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let (bridge, _command_rx) = Bridge::new();
        let mut rx = bridge.register_client();

        bridge.send(UiEvent::ScanningStarted);
        bridge.send(UiEvent::SensorData("23.5:45.0".to_string()));
        bridge.send(UiEvent::ScanningStopped);

        assert_eq!(rx.recv().await, Some(UiEvent::ScanningStarted));
        assert_eq!(
            rx.recv().await,
            Some(UiEvent::SensorData("23.5:45.0".to_string()))
        );
        assert_eq!(rx.recv().await, Some(UiEvent::ScanningStopped));
    }

    #[tokio::test]
    async fn test_last_registered_client_wins() {
        let (bridge, _command_rx) = Bridge::new();

        let mut first = bridge.register_client();
        let mut second = bridge.register_client();

        bridge.send(UiEvent::UiNotice("connected".to_string()));

        assert_eq!(
            second.recv().await,
            Some(UiEvent::UiNotice("connected".to_string()))
        );
        // The replaced channel is closed; its receiver drains empty.
        assert_eq!(first.recv().await, None);
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let (bridge, _command_rx) = Bridge::new();
        let mut rx = bridge.register_client();

        bridge.send(UiEvent::ScanningStarted);
        bridge.unregister_client();
        bridge.send(UiEvent::ScanningStopped);

        assert_eq!(rx.recv().await, Some(UiEvent::ScanningStarted));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_commands_reach_the_owner() {
        let (bridge, mut command_rx) = Bridge::new();

        bridge.send_command(Command::StartScan);
        assert_eq!(command_rx.recv().await, Some(Command::StartScan));
    }

    #[tokio::test]
    async fn test_dead_client_send_is_silent() {
        let (bridge, _command_rx) = Bridge::new();
        let rx = bridge.register_client();
        drop(rx);

        // Channel is closed but still registered; send must stay silent.
        bridge.send(UiEvent::ScanningStarted);
        assert!(bridge.is_client_registered());
    }
}
