//! Session event system.
//!
//! Every observable change of a session (state transitions, per-service
//! progress, completed reads and writes, notifications, errors) is broadcast
//! as a [`SessionEvent`]. Subscribers get their own receiver; a slow
//! subscriber lags rather than blocking the session.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use gattkit_types::{Handle, ServiceError, ServiceState, SessionState};

/// Events emitted by a session.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// The session moved to a new lifecycle state.
    StateChanged { state: SessionState },
    /// Top-level discovery finished with these services.
    ServicesDiscovered { services: Vec<Handle> },
    /// A service moved to a new state.
    ServiceStateChanged { service: Handle, state: ServiceState },
    /// A caller-issued characteristic read completed.
    CharacteristicRead {
        service: Handle,
        characteristic: Handle,
        value: Vec<u8>,
    },
    /// A characteristic write with response completed.
    CharacteristicWritten {
        service: Handle,
        characteristic: Handle,
        value: Vec<u8>,
    },
    /// The peripheral pushed a new characteristic value.
    CharacteristicChanged {
        service: Handle,
        characteristic: Handle,
        value: Vec<u8>,
    },
    /// A caller-issued descriptor read completed.
    DescriptorRead {
        service: Handle,
        descriptor: Handle,
        value: Vec<u8>,
    },
    /// A descriptor write completed.
    DescriptorWritten {
        service: Handle,
        descriptor: Handle,
        value: Vec<u8>,
    },
    /// A service recorded a new last error.
    ServiceError { service: Handle, error: ServiceError },
    /// A session-level failure (open, discovery, transport).
    SessionError { error: String },
    /// The ATT MTU changed.
    MtuChanged { mtu: u16 },
    /// The link went down.
    Disconnected { reason: DisconnectReason },
}

impl SessionEvent {
    /// The service an event is scoped to, if any.
    pub fn service(&self) -> Option<Handle> {
        match self {
            SessionEvent::ServiceStateChanged { service, .. }
            | SessionEvent::CharacteristicRead { service, .. }
            | SessionEvent::CharacteristicWritten { service, .. }
            | SessionEvent::CharacteristicChanged { service, .. }
            | SessionEvent::DescriptorRead { service, .. }
            | SessionEvent::DescriptorWritten { service, .. }
            | SessionEvent::ServiceError { service, .. } => Some(*service),
            _ => None,
        }
    }
}

/// Reason for disconnection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// The local side closed the session.
    UserRequested,
    /// The peripheral closed the link.
    RemoteClosed,
    /// Supervision timeout or radio link loss.
    LinkLoss,
    /// Opening or discovery failed.
    Failed(String),
    /// Unknown reason.
    Unknown,
}

/// Sender for session events.
pub type EventSender = broadcast::Sender<SessionEvent>;

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Receiver yielding only the events scoped to one service.
#[derive(Debug)]
pub struct ServiceEvents {
    service: Handle,
    receiver: EventReceiver,
}

impl ServiceEvents {
    pub(crate) fn new(service: Handle, receiver: EventReceiver) -> Self {
        Self { service, receiver }
    }

    /// The service this receiver filters for.
    pub fn service(&self) -> Handle {
        self.service
    }

    /// Wait for the next event of this service.
    ///
    /// Returns `None` once the session is gone and every buffered event has
    /// been consumed.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.service() == Some(self.service) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(service = %self.service, skipped, "service event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event of this service without waiting.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.service() == Some(self.service) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
