//! Asynchronous GATT client session engine.
//!
//! This crate drives one Bluetooth Low Energy GATT connection per
//! [`Session`]: it opens the link through a pluggable [`Transport`],
//! discovers services lazily, keeps a local attribute cache and serializes
//! every remote operation through a single-flight FIFO job queue.
//!
//! # Features
//!
//! - **Lazy discovery**: services first, characteristics and descriptors per
//!   service on demand, optionally reading every value ([`DiscoveryMode`])
//! - **Serialized I/O**: at most one transport request in flight per session
//! - **Service views**: cheap, non-owning handles that validate every
//!   operation before it is queued
//! - **Events**: typed broadcast events for state changes, values and errors,
//!   session-wide or filtered to one service
//! - **Safe teardown**: closing or losing the link fails every pending job
//!   and discards late transport completions
//! - **Simulation**: [`MockTransport`] runs a full session without hardware
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gattkit_core::mock::{MockCharacteristic, MockPeripheral, MockService};
//! use gattkit_core::{MockTransport, Session, SessionEvent};
//! use gattkit_types::{CharacteristicProperties, WriteMode, uuid};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let props = CharacteristicProperties::READ | CharacteristicProperties::WRITE;
//!     let peripheral = MockPeripheral::new().service(
//!         MockService::primary(uuid::DEVICE_INFO_SERVICE)
//!             .characteristic(MockCharacteristic::new(uuid::DEVICE_NAME, props).value(*b"demo")),
//!     );
//!     let session = Session::connect(Arc::new(MockTransport::new(peripheral)), "sim-0").await?;
//!     let mut events = session.subscribe();
//!
//!     session.discover_services()?.await?;
//!     let info = session.service(uuid::DEVICE_INFO_SERVICE).ok_or("no service")?;
//!     info.discover_details()?.await?;
//!
//!     let name = info.characteristic(uuid::DEVICE_NAME).ok_or("no name")?;
//!     info.write_characteristic(name.handle, *b"renamed", WriteMode::WithResponse)?.await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let SessionEvent::CharacteristicWritten { value, .. } = event {
//!             println!("wrote {} bytes", value.len());
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod attribute;
pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod metrics;
pub mod mock;
pub mod pending;
pub mod registry;
pub mod service;
pub mod session;
pub mod transport;

mod machine;

pub use gattkit_types::types;
pub use gattkit_types::uuid;

pub use config::SessionConfig;
pub use error::{Error, OperationErrorReason, Result};
pub use events::{
    DisconnectReason, EventDispatcher, EventReceiver, EventSender, ServiceEvents, SessionEvent,
};
pub use metrics::{OperationMetrics, SessionMetricsSummary};
pub use mock::{MockTransport, MockTransportBuilder};
pub use pending::Pending;
pub use registry::{Dispatcher, SessionRegistry, SessionToken};
pub use service::{CharacteristicInfo, DescriptorInfo, ServiceView};
pub use session::{Session, SessionBuilder};
pub use transport::{
    CharacteristicDeclaration, DescriptorDeclaration, EventSink, ServiceDeclaration, Target,
    Transport, TransportError, TransportEvent, TransportResult,
};

pub use gattkit_types::{
    CharacteristicProperties, DiscoveryMode, Handle, RemoteId, ServiceError, ServiceKind,
    ServiceState, SessionState, Uuid, WriteMode,
};
