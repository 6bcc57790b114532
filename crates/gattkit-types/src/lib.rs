//! Platform-agnostic GATT attribute types.
//!
//! This crate provides the small vocabulary shared by the session engine
//! (`gattkit-core`) and its front ends: attribute handles, characteristic
//! properties, write modes, lifecycle states and a few well-known UUIDs.
//!
//! # Example
//!
//! ```
//! use gattkit_types::{CharacteristicProperties, WriteMode, uuid};
//!
//! let props: CharacteristicProperties = "read|notify".parse().unwrap();
//! assert!(!props.permits(WriteMode::WithResponse));
//! assert_eq!(uuid::as_u16(&uuid::BATTERY_LEVEL), Some(0x2a19));
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    CharacteristicProperties, DiscoveryMode, Handle, RemoteId, ServiceError, ServiceKind,
    ServiceState, SessionState, WriteMode,
};
pub use uuid as uuids;

/// Re-exported so downstream crates agree on the UUID type.
pub use ::uuid::Uuid;
