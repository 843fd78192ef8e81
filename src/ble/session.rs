//! Session lifecycle state machine.
//!
//! Models the life of a single sensor session as a closed set of tagged
//! events consumed by one pure transition function. The async driver in
//! [`crate::device_manager`] owns the transport handle and executes the
//! actions this module emits; nothing in here touches the radio.

use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::ble::uuids::{
    ENV_SENSOR_CHARACTERISTIC_UUID, ENV_SENSOR_SERVICE_UUID, SENSOR_DEVICE_NAME,
};

/// Tunable parameters for a sensor session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Advertised device name the scanner matches against.
    pub device_name: String,
    /// Service holding the sensor value characteristic.
    pub service_uuid: Uuid,
    /// Characteristic that notifies sensor value payloads.
    pub characteristic_uuid: Uuid,
    /// Delay between connect and service discovery.
    ///
    /// Discovery issued immediately after connect can fail on some stacks,
    /// so it is deferred by this amount. Empirical, no documented minimum.
    pub settle_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name: SENSOR_DEVICE_NAME.to_string(),
            service_uuid: ENV_SENSOR_SERVICE_UUID,
            characteristic_uuid: ENV_SENSOR_CHARACTERISTIC_UUID,
            settle_delay: Duration::from_millis(100),
        }
    }
}

/// State of a sensor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionState {
    /// No session activity.
    #[default]
    Idle,
    /// Scanning for a matching advertisement.
    Scanning,
    /// Transport connect issued, awaiting the result.
    Connecting,
    /// Connected, waiting out the settling delay.
    Connected,
    /// Service discovery in flight.
    DiscoveringServices,
    /// Arming notifications on the sensor characteristic.
    SubscribingNotifications,
    /// Notifications armed, value payloads flowing.
    Streaming,
    /// Peer dropped the link; handle release pending.
    Disconnected,
    /// Terminal. The handle has been released; the session never restarts.
    Closed,
}

impl SessionState {
    /// Check if the session has reached its terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if this state owns a live transport handle.
    ///
    /// The driver keeps the handle Some exactly while this returns true.
    pub fn holds_handle(&self) -> bool {
        matches!(
            self,
            Self::Connected
                | Self::DiscoveringServices
                | Self::SubscribingNotifications
                | Self::Streaming
        )
    }

    /// Check if sensor payloads are expected in this state.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::DiscoveringServices => write!(f, "DiscoveringServices"),
            Self::SubscribingNotifications => write!(f, "SubscribingNotifications"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Everything that can happen to a session.
///
/// Platform callbacks, the settling timer and observer commands all arrive
/// through this one enum, serialized on the driver task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Observer asked for a scan.
    StartRequested,
    /// The scanner claimed an advertisement matching the device filter.
    DeviceMatched {
        /// Platform identifier of the matched peripheral.
        identifier: String,
    },
    /// Transport connect completed.
    ConnectSucceeded,
    /// Transport connect failed. Terminal, no retry.
    ConnectFailed {
        /// Platform-reported failure description.
        reason: String,
    },
    /// The post-connect settling delay expired.
    SettleElapsed,
    /// GATT service discovery completed.
    ServicesDiscovered,
    /// GATT service discovery failed. Terminal, no retry.
    DiscoveryFailed {
        /// Platform-reported failure description.
        reason: String,
    },
    /// Notifications are armed on the sensor characteristic.
    NotificationsArmed,
    /// Arming notifications failed. Terminal, no retry.
    SubscribeFailed {
        /// Platform-reported failure description.
        reason: String,
    },
    /// A value notification arrived from the sensor characteristic.
    PayloadReceived {
        /// Raw characteristic value.
        data: Vec<u8>,
    },
    /// The peer dropped the link.
    PeerDisconnected,
    /// The driver finished releasing the transport handle.
    HandleReleased,
    /// Explicit teardown, e.g. to make way for a new session.
    TeardownRequested,
}

/// Side effects the driver must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Start the platform scan with the session's device filter.
    BeginScan,
    /// Stop the platform scan.
    HaltScan,
    /// Issue an LE transport connect to the matched peripheral.
    Connect {
        /// Platform identifier of the peripheral to connect.
        identifier: String,
    },
    /// Arm the settling timer; it fires `SettleElapsed`.
    ScheduleDiscovery,
    /// Issue GATT service discovery on the handle.
    DiscoverServices,
    /// Locate the sensor characteristic and enable notifications on it.
    ArmNotifications,
    /// Parse and publish a sensor payload.
    ForwardReading {
        /// Raw characteristic value.
        data: Vec<u8>,
    },
    /// Release the transport handle. Must happen exactly once per session.
    ReleaseHandle,
    /// Send a best-effort notice to the observer.
    Notice {
        /// Human-readable notice text.
        text: String,
    },
}

/// Result of feeding one event to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the event.
    pub next: SessionState,
    /// Side effects to execute, in order.
    pub actions: Vec<SessionAction>,
}

impl Transition {
    fn stay(state: SessionState) -> Self {
        Self {
            next: state,
            actions: Vec::new(),
        }
    }

    fn to(next: SessionState, actions: Vec<SessionAction>) -> Self {
        Self { next, actions }
    }
}

/// The single transition function.
///
/// Total over `(state, event)`: pairs not listed below leave the state
/// unchanged with no actions, and `Closed` never transitions again.
/// Failure reasons are logged by the driver before the event is fed here,
/// so the table only decides where the session goes next.
pub fn transition(state: SessionState, event: SessionEvent) -> Transition {
    use SessionAction as A;
    use SessionEvent as E;
    use SessionState as S;

    match (state, event) {
        (S::Closed, _) => Transition::stay(S::Closed),

        (S::Idle, E::StartRequested) => Transition::to(S::Scanning, vec![A::BeginScan]),

        (S::Scanning, E::DeviceMatched { identifier }) => {
            Transition::to(S::Connecting, vec![A::HaltScan, A::Connect { identifier }])
        }

        (S::Connecting, E::ConnectSucceeded) => Transition::to(
            S::Connected,
            vec![
                A::ScheduleDiscovery,
                A::Notice {
                    text: "connected".to_string(),
                },
            ],
        ),
        (S::Connecting, E::ConnectFailed { .. }) => {
            Transition::to(S::Closed, vec![A::ReleaseHandle])
        }

        (S::Connected, E::SettleElapsed) => {
            Transition::to(S::DiscoveringServices, vec![A::DiscoverServices])
        }

        (S::DiscoveringServices, E::ServicesDiscovered) => Transition::to(
            S::SubscribingNotifications,
            vec![
                A::ArmNotifications,
                A::Notice {
                    text: "service discovery completed".to_string(),
                },
            ],
        ),
        (S::DiscoveringServices, E::DiscoveryFailed { .. }) => {
            Transition::to(S::Closed, vec![A::ReleaseHandle])
        }

        (S::SubscribingNotifications, E::NotificationsArmed) => {
            Transition::to(S::Streaming, vec![])
        }
        (S::SubscribingNotifications, E::SubscribeFailed { .. }) => {
            Transition::to(S::Closed, vec![A::ReleaseHandle])
        }

        (S::Streaming, E::PayloadReceived { data }) => {
            Transition::to(S::Streaming, vec![A::ForwardReading { data }])
        }

        (
            S::Connected | S::DiscoveringServices | S::SubscribingNotifications | S::Streaming,
            E::PeerDisconnected,
        ) => Transition::to(S::Disconnected, vec![A::ReleaseHandle]),

        (S::Disconnected, E::HandleReleased) => Transition::to(S::Closed, vec![]),

        (S::Scanning, E::TeardownRequested) => Transition::to(S::Closed, vec![A::HaltScan]),
        (
            S::Connecting
            | S::Connected
            | S::DiscoveringServices
            | S::SubscribingNotifications
            | S::Streaming,
            E::TeardownRequested,
        ) => Transition::to(S::Closed, vec![A::ReleaseHandle]),
        (S::Idle | S::Disconnected, E::TeardownRequested) => Transition::to(S::Closed, vec![]),

        (state, _) => Transition::stay(state),
    }
}

/// A single sensor session.
///
/// Created on a start command, driven to `Closed` exactly once, never
/// resurrected — a new start command gets a fresh `Session`.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    device_id: Option<String>,
}

impl Session {
    /// Create a new idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identifier of the matched device, once one has been claimed.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Check if the session has reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.state.is_terminal()
    }

    /// Feed one event through the transition function.
    ///
    /// Returns the actions the driver must execute, in order.
    pub fn apply(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        if let SessionEvent::DeviceMatched { identifier } = &event {
            self.device_id = Some(identifier.clone());
        }

        let Transition { next, actions } = transition(self.state, event);

        if next != self.state {
            debug!("session state changed: {} -> {}", self.state, next);
            self.state = next;
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matched() -> SessionEvent {
        SessionEvent::DeviceMatched {
            identifier: "hci0/dev_4C_65_A8_D0_77_11".to_string(),
        }
    }

    /// Drive a fresh session along the happy path to the given state.
    fn session_in(state: SessionState) -> Session {
        use SessionEvent as E;
        use SessionState as S;

        let mut session = Session::new();
        if state == S::Idle {
            return session;
        }
        session.apply(E::StartRequested);

        let ladder = [
            (S::Scanning, matched()),
            (S::Connecting, E::ConnectSucceeded),
            (S::Connected, E::SettleElapsed),
            (S::DiscoveringServices, E::ServicesDiscovered),
            (S::SubscribingNotifications, E::NotificationsArmed),
            (S::Streaming, E::PeerDisconnected),
            (S::Disconnected, E::HandleReleased),
        ];
        for (at, event) in ladder {
            if session.state() == state {
                break;
            }
            assert_eq!(session.state(), at);
            session.apply(event);
        }
        assert_eq!(session.state(), state);
        session
    }

    #[test]
    fn test_happy_path() {
        use SessionAction as A;
        use SessionEvent as E;
        use SessionState as S;

        let mut session = Session::new();

        assert_eq!(session.apply(E::StartRequested), vec![A::BeginScan]);
        assert_eq!(session.state(), S::Scanning);

        let actions = session.apply(matched());
        assert_eq!(actions[0], A::HaltScan);
        assert!(matches!(actions[1], A::Connect { .. }));
        assert_eq!(session.state(), S::Connecting);
        assert_eq!(session.device_id(), Some("hci0/dev_4C_65_A8_D0_77_11"));

        let actions = session.apply(E::ConnectSucceeded);
        assert_eq!(actions[0], A::ScheduleDiscovery);
        assert_eq!(session.state(), S::Connected);

        assert_eq!(session.apply(E::SettleElapsed), vec![A::DiscoverServices]);
        assert_eq!(session.state(), S::DiscoveringServices);

        let actions = session.apply(E::ServicesDiscovered);
        assert_eq!(actions[0], A::ArmNotifications);
        assert_eq!(session.state(), S::SubscribingNotifications);

        assert_eq!(session.apply(E::NotificationsArmed), vec![]);
        assert_eq!(session.state(), S::Streaming);

        let payload = b"T=23.5 H=45.0 ".to_vec();
        let actions = session.apply(E::PayloadReceived {
            data: payload.clone(),
        });
        assert_eq!(actions, vec![A::ForwardReading { data: payload }]);
        assert_eq!(session.state(), S::Streaming);
    }

    #[test]
    fn test_idle_ignores_everything_but_start() {
        use SessionEvent as E;
        use SessionState as S;

        let events = [
            matched(),
            E::ConnectSucceeded,
            E::ConnectFailed {
                reason: "status 133".to_string(),
            },
            E::SettleElapsed,
            E::ServicesDiscovered,
            E::NotificationsArmed,
            E::PayloadReceived { data: vec![] },
            E::PeerDisconnected,
            E::HandleReleased,
        ];

        for event in events {
            let mut session = Session::new();
            let actions = session.apply(event);
            assert_eq!(session.state(), S::Idle);
            assert_eq!(actions, vec![]);
        }
    }

    #[test]
    fn test_closed_is_immutable() {
        use SessionEvent as E;
        use SessionState as S;

        let mut session = session_in(S::Closed);
        assert!(session.is_closed());

        let events = [
            E::StartRequested,
            matched(),
            E::ConnectSucceeded,
            E::PayloadReceived {
                data: b"T=1 H=2 ".to_vec(),
            },
            E::PeerDisconnected,
            E::TeardownRequested,
        ];
        for event in events {
            assert_eq!(session.apply(event), vec![]);
            assert_eq!(session.state(), S::Closed);
            assert!(session.is_closed());
        }
    }

    #[test]
    fn test_connect_failure_is_terminal() {
        use SessionAction as A;
        use SessionEvent as E;
        use SessionState as S;

        let mut session = session_in(S::Connecting);
        let actions = session.apply(E::ConnectFailed {
            reason: "status 133".to_string(),
        });
        assert_eq!(actions, vec![A::ReleaseHandle]);
        assert_eq!(session.state(), S::Closed);
    }

    #[test]
    fn test_discovery_and_subscribe_failures_are_terminal() {
        use SessionAction as A;
        use SessionEvent as E;
        use SessionState as S;

        let mut session = session_in(S::DiscoveringServices);
        let actions = session.apply(E::DiscoveryFailed {
            reason: "gatt error".to_string(),
        });
        assert_eq!(actions, vec![A::ReleaseHandle]);
        assert_eq!(session.state(), S::Closed);

        let mut session = session_in(S::SubscribingNotifications);
        let actions = session.apply(E::SubscribeFailed {
            reason: "cccd write rejected".to_string(),
        });
        assert_eq!(actions, vec![A::ReleaseHandle]);
        assert_eq!(session.state(), S::Closed);
    }

    #[test]
    fn test_disconnect_from_every_connected_state() {
        use SessionAction as A;
        use SessionEvent as E;
        use SessionState as S;

        for state in [
            S::Connected,
            S::DiscoveringServices,
            S::SubscribingNotifications,
            S::Streaming,
        ] {
            let mut session = session_in(state);
            assert!(session.state().holds_handle());

            let actions = session.apply(E::PeerDisconnected);
            assert_eq!(actions, vec![A::ReleaseHandle]);
            assert_eq!(session.state(), S::Disconnected);

            assert_eq!(session.apply(E::HandleReleased), vec![]);
            assert_eq!(session.state(), S::Closed);
        }
    }

    #[test]
    fn test_teardown_from_scanning_halts_scan() {
        use SessionAction as A;
        use SessionEvent as E;
        use SessionState as S;

        let mut session = session_in(S::Scanning);
        let actions = session.apply(E::TeardownRequested);
        assert_eq!(actions, vec![A::HaltScan]);
        assert_eq!(session.state(), S::Closed);
    }

    #[test]
    fn test_teardown_releases_handle_when_held() {
        use SessionAction as A;
        use SessionEvent as E;
        use SessionState as S;

        for state in [S::Connecting, S::Connected, S::Streaming] {
            let mut session = session_in(state);
            let actions = session.apply(E::TeardownRequested);
            assert_eq!(actions, vec![A::ReleaseHandle]);
            assert_eq!(session.state(), S::Closed);
        }

        let mut session = session_in(S::Idle);
        assert_eq!(session.apply(E::TeardownRequested), vec![]);
        assert_eq!(session.state(), S::Closed);
    }

    #[test]
    fn test_payloads_ignored_outside_streaming() {
        use SessionEvent as E;
        use SessionState as S;

        for state in [S::Scanning, S::Connecting, S::Connected, S::SubscribingNotifications] {
            let mut session = session_in(state);
            let actions = session.apply(E::PayloadReceived {
                data: b"T=23.5 H=45.0 ".to_vec(),
            });
            assert_eq!(actions, vec![]);
            assert_eq!(session.state(), state);
        }
    }

    #[test]
    fn test_holds_handle_matches_state_set() {
        use SessionState as S;

        for state in [
            S::Idle,
            S::Scanning,
            S::Connecting,
            S::Disconnected,
            S::Closed,
        ] {
            assert!(!state.holds_handle(), "{state} should not hold a handle");
        }
        for state in [
            S::Connected,
            S::DiscoveringServices,
            S::SubscribingNotifications,
            S::Streaming,
        ] {
            assert!(state.holds_handle(), "{state} should hold a handle");
        }
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.device_name, "MJ_HT_V1");
        assert_eq!(config.settle_delay, Duration::from_millis(100));
        assert_eq!(config.service_uuid, ENV_SENSOR_SERVICE_UUID);
        assert_eq!(config.characteristic_uuid, ENV_SENSOR_CHARACTERISTIC_UUID);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", SessionState::Idle), "Idle");
        assert_eq!(format!("{}", SessionState::Streaming), "Streaming");
        assert_eq!(format!("{}", SessionState::Closed), "Closed");
    }
}
