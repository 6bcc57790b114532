//! Error types for gattkit-core.
//!
//! This module defines every error a session can report to its callers.
//!
//! # Where errors are detected
//!
//! | Error | Detected | Reported to |
//! |-------|----------|-------------|
//! | [`Error::Operation`] | Synchronously, at the [`ServiceView`](crate::ServiceView) boundary | The calling function's return value |
//! | [`Error::Connection`] | When the transport's `open` completes | The connect caller |
//! | [`Error::Discovery`] | When a discovery job completes | Every waiter of that discovery |
//! | [`Error::Read`] / [`Error::Write`] | When the job completes | The caller that issued the job |
//! | [`Error::SessionInvalidated`] | On disconnect, fatal error or close | Every still-pending caller |
//!
//! Precondition errors never touch the job queue. Transport failures are
//! scoped to the job that produced them: the queue always advances to the
//! next job. No error is fatal to the process; all failures are scoped to one
//! session.
//!
//! ## Retry guidance
//!
//! | Error Type | Strategy |
//! |------------|----------|
//! | [`Error::Operation`] | Do not retry; fix the request |
//! | [`Error::Read`] / [`Error::Write`] with [`TransportError::Timeout`] | Retry once or twice |
//! | [`Error::Discovery`] on a service | Call `discover_details` again |
//! | [`Error::SessionInvalidated`] | Open a new session |

use thiserror::Error;

use gattkit_types::{Handle, ServiceState, SessionState, WriteMode};

use crate::transport::TransportError;

/// Errors that can occur while driving a GATT session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Opening (or closing) the transport failed.
    #[error("Connection to {address} failed: {source}")]
    Connection {
        /// The peripheral address that was being opened.
        address: String,
        /// The transport's failure.
        #[source]
        source: TransportError,
    },

    /// A discovery sub-job failed.
    #[error(
        "Discovery failed{}: {source}",
        .service.map(|h| format!(" for service {h}")).unwrap_or_default()
    )]
    Discovery {
        /// The service being detailed, or `None` for top-level discovery.
        service: Option<Handle>,
        /// The transport's failure.
        #[source]
        source: TransportError,
    },

    /// Request rejected before reaching the job queue.
    #[error("Operation rejected: {0}")]
    Operation(OperationErrorReason),

    /// A read job executed but the transport reported failure.
    #[error("Read of {handle} failed: {source}")]
    Read {
        /// The attribute that was read.
        handle: Handle,
        /// The transport's failure.
        #[source]
        source: TransportError,
    },

    /// A write job executed but the transport reported failure.
    #[error("Write to {handle} failed: {source}")]
    Write {
        /// The attribute that was written.
        handle: Handle,
        /// The transport's failure.
        #[source]
        source: TransportError,
    },

    /// The session was disconnected, failed or closed before the request
    /// could complete.
    #[error("Session invalidated")]
    SessionInvalidated,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A session was created outside of a tokio runtime.
    #[error("No tokio runtime available to drive the session")]
    NoRuntime,
}

/// Structured reasons for [`Error::Operation`].
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum OperationErrorReason {
    /// The handle is not known to the session.
    #[error("unknown attribute {0}")]
    UnknownHandle(Handle),

    /// The handle exists but belongs to a different service.
    #[error("attribute {handle} does not belong to service {service}")]
    NotOwned {
        /// The attribute that was targeted.
        handle: Handle,
        /// The service the request was issued on.
        service: Handle,
    },

    /// The handle refers to the wrong kind of attribute.
    #[error("attribute {handle} is not a {expected}")]
    WrongAttributeKind {
        /// The attribute that was targeted.
        handle: Handle,
        /// What the operation needed.
        expected: &'static str,
    },

    /// The service has not finished discovery.
    #[error("service is {state}, expected discovered")]
    ServiceNotReady {
        /// The service's current state.
        state: ServiceState,
    },

    /// The session is in the wrong state for this request.
    #[error("session is {state}, expected {expected}")]
    SessionNotReady {
        /// The session's current state.
        state: SessionState,
        /// The state the request needs.
        expected: SessionState,
    },

    /// The characteristic's properties do not allow this write mode.
    #[error("characteristic {handle} does not permit writes {mode}")]
    WriteNotPermitted {
        /// The characteristic that was targeted.
        handle: Handle,
        /// The requested write mode.
        mode: WriteMode,
    },

    /// A write command payload does not fit in one ATT packet.
    #[error("payload of {len} bytes exceeds the {max}-byte limit for writes without response")]
    PayloadTooLarge {
        /// Requested payload length.
        len: usize,
        /// Largest allowed payload (`MTU - 3`).
        max: usize,
    },

    /// The characteristic supports neither notifications nor indications.
    #[error("characteristic {0} supports neither notify nor indicate")]
    NotificationsUnsupported(Handle),

    /// The characteristic has no Client Characteristic Configuration descriptor.
    #[error("characteristic {0} has no client characteristic configuration descriptor")]
    MissingClientConfiguration(Handle),
}

impl Error {
    /// Create an operation error.
    pub fn operation(reason: OperationErrorReason) -> Self {
        Self::Operation(reason)
    }

    /// Create a connection error.
    pub fn connection(address: impl Into<String>, source: TransportError) -> Self {
        Self::Connection {
            address: address.into(),
            source,
        }
    }

    /// Create a discovery error.
    pub fn discovery(service: Option<Handle>, source: TransportError) -> Self {
        Self::Discovery { service, source }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// The operation reason, if this is an [`Error::Operation`].
    pub fn operation_reason(&self) -> Option<&OperationErrorReason> {
        match self {
            Self::Operation(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether the request may succeed if issued again on the same session.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::Discovery {
                service: Some(_),
                source,
            } => !matches!(source, TransportError::NotConnected),
            _ => false,
        }
    }
}

/// Result type alias using gattkit-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
