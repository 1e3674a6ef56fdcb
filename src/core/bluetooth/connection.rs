//! Connection lifecycle for a single lamp
//!
//! ```text
//!                  connect                 linked
//!  ┌──────────────┐ ───────► ┌────────────┐ ─────► ┌───────────┐
//!  │ Disconnected │          │ Connecting │        │ Connected │
//!  └──────────────┘ ◄─────── └────────────┘        └─────┬─────┘
//!      ▲   ▲   ▲    failed                               │ discovery
//!      │   │   │                                         ▼ started
//!      │   │   │   discovery failed       ┌─────────────────────┐
//!      │   │   └───────────────────────── │ DiscoveringServices │
//!      │   │                              └──────────┬──────────┘
//!      │   │       link lost                         │ discovered
//!      │   └─────────────────────────────── ┌───────▼┐
//!      │                                    │ Ready  │
//!      │ teardown complete                  └────────┘
//!  ┌───┴───────────┐   disconnect (from any active state)
//!  │ Disconnecting │ ◄───────────────────────────────────
//!  └───────────────┘
//! ```
//!
//! Every state/event pair has an outcome: either a new state or `None`
//! (ignored). The controller actor is the only caller.

use log::debug;
use serde::Serialize;

use crate::core::error::LampError;

/// Lifecycle state of the lamp connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    /// No link; initial and terminal state
    Disconnected,
    /// Transport connect in progress
    Connecting,
    /// Link up, service discovery not yet started
    Connected,
    /// Resolving the lamp service and write characteristic
    DiscoveringServices,
    /// Commands may be sent
    Ready,
    /// Best-effort teardown in progress
    Disconnecting,
}

impl ConnectionState {
    /// States in which a connect attempt is underway or established
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::DiscoveringServices | Self::Ready
        )
    }

    /// Applies `event`, returning the next state or `None` when the event
    /// does not change state here.
    pub fn transition(self, event: ConnectionEvent) -> Option<ConnectionState> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (S::Disconnected, E::Connect) => Some(S::Connecting),

            (S::Connecting, E::Linked) => Some(S::Connected),
            (S::Connecting, E::LinkFailed) | (S::Connecting, E::LinkLost) => Some(S::Disconnected),

            (S::Connected, E::DiscoveryStarted) => Some(S::DiscoveringServices),
            (S::Connected, E::LinkLost) => Some(S::Disconnected),

            (S::DiscoveringServices, E::DiscoverySucceeded) => Some(S::Ready),
            (S::DiscoveringServices, E::DiscoveryFailed) | (S::DiscoveringServices, E::LinkLost) => {
                Some(S::Disconnected)
            }

            (S::Ready, E::LinkLost) => Some(S::Disconnected),

            (s, E::Disconnect) if s.is_active() => Some(S::Disconnecting),

            (S::Disconnecting, E::TeardownComplete) | (S::Disconnecting, E::LinkLost) => {
                Some(S::Disconnected)
            }

            _ => None,
        }
    }
}

/// Inputs to the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Caller requested a connect
    Connect,
    /// Transport reports the link is up
    Linked,
    /// Transport reports the connect failed or timed out
    LinkFailed,
    /// Service discovery began
    DiscoveryStarted,
    /// Lamp service and characteristic resolved
    DiscoverySucceeded,
    /// Lamp service could not be resolved
    DiscoveryFailed,
    /// Transport reports the link dropped
    LinkLost,
    /// Caller requested a disconnect
    Disconnect,
    /// Teardown finished, successfully or not
    TeardownComplete,
}

/// The single connection record
#[derive(Debug, Clone)]
pub struct Connection {
    address: String,
    state: ConnectionState,
    /// Distinguishes events of this attempt from superseded ones
    generation: u64,
    /// Consecutive connect calls to this address since it was last Ready
    retry_count: u32,
    last_error: Option<LampError>,
}

impl Connection {
    pub fn new(address: String, generation: u64) -> Self {
        Self {
            address,
            state: ConnectionState::Disconnected,
            generation,
            retry_count: 0,
            last_error: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&LampError> {
        self.last_error.as_ref()
    }

    /// Starts a new attempt on the same record, after a failure
    pub fn restart(&mut self, generation: u64) {
        self.generation = generation;
        self.retry_count += 1;
    }

    pub fn set_error(&mut self, error: LampError) {
        self.last_error = Some(error);
    }

    /// Applies an event, returning the new state when it changed
    pub fn apply(&mut self, event: ConnectionEvent) -> Option<ConnectionState> {
        let next = self.state.transition(event)?;
        debug!(
            "Connection {} [{}]: {:?} --{:?}--> {:?}",
            self.address, self.generation, self.state, event, next
        );
        self.state = next;
        if next == ConnectionState::Ready {
            self.retry_count = 0;
            self.last_error = None;
        }
        Some(next)
    }
}
