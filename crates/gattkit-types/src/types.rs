//! Core types describing a GATT attribute hierarchy and its lifecycle states.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Opaque identifier of one attribute within one session.
///
/// Handles are assigned by an incrementing counter scoped to the session,
/// are never reused while the session is alive, and carry no meaning across
/// sessions. [`Handle::INVALID`] (`0`) is reserved for "unassigned".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Handle(u32);

impl Handle {
    /// The reserved invalid/unassigned handle.
    pub const INVALID: Handle = Handle(0);

    /// Wrap a raw handle value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns `false` for the reserved handle `0`.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Identifier a transport uses for one remote attribute.
///
/// This is whatever the platform hands back during discovery (an ATT handle,
/// an object path index, a platform object id); the session never interprets
/// it beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RemoteId(pub u64);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a service is a top-level service or included by another one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ServiceKind {
    /// Primary (top-level) service.
    #[default]
    Primary,
    /// Service included by another service.
    Included,
}

bitflags::bitflags! {
    /// Characteristic property bits as defined by the Characteristic
    /// Declaration (Core Spec Vol 3, Part G, 3.3.1.1).
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct CharacteristicProperties: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_NO_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const WRITE_SIGNED = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}

impl CharacteristicProperties {
    /// Returns whether a write in `mode` is allowed by these properties.
    ///
    /// ```
    /// use gattkit_types::{CharacteristicProperties, WriteMode};
    ///
    /// let props = CharacteristicProperties::READ | CharacteristicProperties::NOTIFY;
    /// assert!(!props.permits(WriteMode::WithResponse));
    /// assert!(CharacteristicProperties::WRITE.permits(WriteMode::WithResponse));
    /// ```
    #[must_use]
    pub fn permits(self, mode: WriteMode) -> bool {
        match mode {
            WriteMode::WithResponse => self.contains(Self::WRITE),
            WriteMode::WithoutResponse => self.contains(Self::WRITE_NO_RESPONSE),
        }
    }

    /// Returns whether the peripheral can push value updates.
    #[must_use]
    pub fn can_notify(self) -> bool {
        self.intersects(Self::NOTIFY | Self::INDICATE)
    }

    /// Parse a single property name (`read`, `write`, `write-no-response`,
    /// `notify`, `indicate`, `broadcast`, `write-signed`,
    /// `extended-properties`). Underscores and case are ignored.
    pub fn parse_name(name: &str) -> Result<Self, ParseError> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        let flag = match normalized.as_str() {
            "broadcast" => Self::BROADCAST,
            "read" => Self::READ,
            "write-no-response" | "write-without-response" => Self::WRITE_NO_RESPONSE,
            "write" => Self::WRITE,
            "notify" => Self::NOTIFY,
            "indicate" => Self::INDICATE,
            "write-signed" | "authenticated-signed-writes" => Self::WRITE_SIGNED,
            "extended-properties" => Self::EXTENDED_PROPERTIES,
            _ => return Err(ParseError::UnknownProperty(name.to_string())),
        };
        Ok(flag)
    }

    /// Parse a list of property names into a combined set.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ParseError> {
        names
            .iter()
            .try_fold(Self::empty(), |acc, name| Ok(acc | Self::parse_name(name.as_ref())?))
    }
}

impl FromStr for CharacteristicProperties {
    type Err = ParseError;

    /// Parse a `,`- or `|`-separated property list such as `"read|notify"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<&str> = s
            .split([',', '|'])
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();
        Self::from_names(&names)
    }
}

/// Write mode requested for a characteristic write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WriteMode {
    /// The peripheral confirms the write.
    #[default]
    WithResponse,
    /// Fire-and-forget write command; no confirmation is sent.
    WithoutResponse,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::WithResponse => write!(f, "with response"),
            WriteMode::WithoutResponse => write!(f, "without response"),
        }
    }
}

/// Lifecycle state of a session.
///
/// States only move forward through `Connecting -> Connected -> Discovering
/// -> Discovered`; `Invalid` is reachable from every state and is terminal.
///
/// ```
/// use gattkit_types::SessionState;
///
/// assert!(SessionState::Connecting.can_transition_to(SessionState::Connected));
/// assert!(SessionState::Discovered.can_transition_to(SessionState::Invalid));
/// assert!(!SessionState::Invalid.can_transition_to(SessionState::Connected));
/// assert!(!SessionState::Discovered.can_transition_to(SessionState::Connected));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum SessionState {
    /// The transport is being opened.
    Connecting,
    /// The transport is open; no services are known yet.
    Connected,
    /// Top-level service discovery is running.
    Discovering,
    /// Top-level services are known; per-service discovery may proceed.
    Discovered,
    /// Terminal state after disconnect, transport failure or close.
    Invalid,
}

impl SessionState {
    /// Whether the session can still issue work.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self != SessionState::Invalid
    }

    /// Whether moving from `self` to `next` respects forward-only ordering.
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Invalid, _) => false,
            (_, SessionState::Invalid) => true,
            (current, next) => next > current,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Discovering => write!(f, "discovering"),
            SessionState::Discovered => write!(f, "discovered"),
            SessionState::Invalid => write!(f, "invalid"),
        }
    }
}

/// Visible state of one service, shared by every view aliasing it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum ServiceState {
    /// Characteristics and descriptors have not been discovered yet.
    #[default]
    DiscoveryRequired,
    /// Child discovery is running.
    Discovering,
    /// All characteristics and descriptors are known.
    Discovered,
    /// The owning session is gone. Cached details remain readable.
    Invalid,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::DiscoveryRequired => write!(f, "discovery required"),
            ServiceState::Discovering => write!(f, "discovering"),
            ServiceState::Discovered => write!(f, "discovered"),
            ServiceState::Invalid => write!(f, "invalid"),
        }
    }
}

/// Kind of the last error observed on a service.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new kinds
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum ServiceError {
    /// An operation was attempted while the service was not ready.
    OperationError,
    /// Reading a characteristic failed.
    CharacteristicReadError,
    /// Writing a characteristic failed.
    CharacteristicWriteError,
    /// Reading a descriptor failed.
    DescriptorReadError,
    /// Writing a descriptor failed.
    DescriptorWriteError,
    /// Characteristic or descriptor discovery failed.
    DiscoveryError,
    /// Anything else.
    UnknownError,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ServiceError::OperationError => "operation error",
            ServiceError::CharacteristicReadError => "characteristic read error",
            ServiceError::CharacteristicWriteError => "characteristic write error",
            ServiceError::DescriptorReadError => "descriptor read error",
            ServiceError::DescriptorWriteError => "descriptor write error",
            ServiceError::DiscoveryError => "discovery error",
            ServiceError::UnknownError => "unknown error",
        };
        f.write_str(text)
    }
}

/// How much of a service is fetched by per-service discovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DiscoveryMode {
    /// Discover characteristics and descriptors only.
    #[default]
    SkipValueDiscovery,
    /// Also read every readable characteristic and every descriptor.
    FullDiscovery,
}
