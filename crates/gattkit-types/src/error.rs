//! Error types for attribute parsing in gattkit-types.

use thiserror::Error;

/// Errors that can occur when parsing GATT attribute metadata.
///
/// This error type is platform-agnostic and does not include
/// session or transport errors (those belong in gattkit-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Unknown characteristic property name.
    #[error("Unknown characteristic property: {0}")]
    UnknownProperty(String),

    /// Text could not be parsed as a 16-bit or 128-bit UUID.
    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    /// Value could not be parsed.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using gattkit-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
