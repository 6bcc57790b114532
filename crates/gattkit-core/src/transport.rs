//! The abstract transport a session drives.
//!
//! A [`Transport`] performs raw GATT operations against one peripheral. It
//! knows nothing about handles, queues or lifecycle: the session serializes
//! every discovery, read and write so that at most one request is
//! outstanding at a time, and translates the transport's [`RemoteId`]s into
//! session-scoped [`Handle`](gattkit_types::Handle)s.
//!
//! Asynchronous activity the peripheral initiates on its own (value
//! notifications, MTU changes, link loss) is reported through the
//! [`EventSink`] handed to [`Transport::open`]. The sink only carries the
//! session's token; a sink that outlives its session silently drops whatever
//! it is given.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use gattkit_types::{CharacteristicProperties, RemoteId, ServiceKind, Uuid, WriteMode};

use crate::events::DisconnectReason;
use crate::registry::{Dispatcher, SessionToken};

/// Failure reported by a transport for one request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The link is not (or no longer) open.
    #[error("transport not connected")]
    NotConnected,

    /// The peripheral answered with an ATT error.
    #[error("peripheral rejected the request: {0}")]
    Rejected(String),

    /// The request did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The attribute the request refers to is unknown to the transport.
    #[error("unknown remote attribute {0}")]
    UnknownAttribute(RemoteId),

    /// Any other platform failure.
    #[error("{0}")]
    Other(String),
}

/// Result type for transport requests.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// A service as reported by top-level discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDeclaration {
    pub id: RemoteId,
    pub uuid: Uuid,
    pub kind: ServiceKind,
}

/// A characteristic as reported by characteristic discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDeclaration {
    pub id: RemoteId,
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
}

/// A descriptor as reported by descriptor discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorDeclaration {
    pub id: RemoteId,
    pub uuid: Uuid,
}

/// The remote attribute a read or write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Characteristic(RemoteId),
    Descriptor(RemoteId),
}

impl Target {
    /// The transport-side identifier.
    pub fn id(self) -> RemoteId {
        match self {
            Target::Characteristic(id) | Target::Descriptor(id) => id,
        }
    }
}

/// Raw GATT operations against one peripheral.
///
/// Implementations are driven by exactly one session. The session never
/// issues a second discovery, read or write before the previous one has
/// returned, so implementations do not need their own request queue.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link to `address`. Unsolicited activity is reported to `events`.
    async fn open(&self, address: &str, events: EventSink) -> TransportResult<()>;

    /// Discover the peripheral's services.
    async fn discover_services(&self) -> TransportResult<Vec<ServiceDeclaration>>;

    /// Discover the characteristics of one service.
    async fn discover_characteristics(
        &self,
        service: &ServiceDeclaration,
    ) -> TransportResult<Vec<CharacteristicDeclaration>>;

    /// Discover the descriptors of one characteristic.
    async fn discover_descriptors(
        &self,
        characteristic: &CharacteristicDeclaration,
    ) -> TransportResult<Vec<DescriptorDeclaration>>;

    /// Read the value of a characteristic or descriptor.
    async fn read(&self, target: Target) -> TransportResult<Vec<u8>>;

    /// Write the value of a characteristic or descriptor.
    ///
    /// Descriptor writes always use [`WriteMode::WithResponse`].
    async fn write(&self, target: Target, value: &[u8], mode: WriteMode) -> TransportResult<()>;

    /// Close the link. Called at most once per session.
    async fn close(&self) -> TransportResult<()>;
}

/// Activity the peripheral initiates without a pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportEvent {
    /// A notification or indication carried a new characteristic value.
    ValueChanged { id: RemoteId, value: Vec<u8> },
    /// The negotiated ATT MTU changed.
    MtuChanged(u16),
    /// The link went down.
    Disconnected(DisconnectReason),
    /// The platform reported a fatal error for the link.
    Failed(TransportError),
}

/// Where a transport posts [`TransportEvent`]s.
///
/// Cloneable and `Send`; safe to move into platform callbacks running on
/// any thread. Every method returns whether the session was still there to
/// receive the event.
#[derive(Debug, Clone)]
pub struct EventSink {
    token: SessionToken,
    dispatcher: Dispatcher,
}

impl EventSink {
    pub(crate) fn new(token: SessionToken, dispatcher: Dispatcher) -> Self {
        Self { token, dispatcher }
    }

    /// Token of the session this sink reports to.
    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// Report a notification or indication.
    pub fn value_changed(&self, id: RemoteId, value: impl Into<Vec<u8>>) -> bool {
        self.send(TransportEvent::ValueChanged {
            id,
            value: value.into(),
        })
    }

    /// Report a new MTU.
    pub fn mtu_changed(&self, mtu: u16) -> bool {
        self.send(TransportEvent::MtuChanged(mtu))
    }

    /// Report that the link went down.
    pub fn disconnected(&self, reason: DisconnectReason) -> bool {
        self.send(TransportEvent::Disconnected(reason))
    }

    /// Report a fatal platform error.
    pub fn failed(&self, error: TransportError) -> bool {
        self.send(TransportEvent::Failed(error))
    }

    /// Post any transport event.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.dispatcher.deliver(self.token, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_id() {
        assert_eq!(Target::Characteristic(RemoteId(4)).id(), RemoteId(4));
        assert_eq!(Target::Descriptor(RemoteId(9)).id(), RemoteId(9));
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            TransportError::UnknownAttribute(RemoteId(12)).to_string(),
            "unknown remote attribute #12"
        );
        assert_eq!(
            TransportError::Timeout(Duration::from_millis(1500)).to_string(),
            "timed out after 1.5s"
        );
    }
}
