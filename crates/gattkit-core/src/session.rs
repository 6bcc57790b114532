//! Session handle and the state it shares with its state machine.
//!
//! A [`Session`] represents one connection to one peripheral. Creating it
//! registers a mailbox in the [`SessionRegistry`], spawns the session's
//! state machine and asks the transport to open. All remote work is then
//! serialized through the machine's job queue; the handle itself only reads
//! snapshots and posts commands.
//!
//! Dropping the handle closes the session.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gattkit_core::mock::{MockCharacteristic, MockPeripheral, MockService};
//! use gattkit_core::{MockTransport, Session};
//! use gattkit_types::{CharacteristicProperties, uuid};
//!
//! # async fn example() -> gattkit_core::Result<()> {
//! let peripheral = MockPeripheral::new().service(
//!     MockService::primary(uuid::BATTERY_SERVICE).characteristic(
//!         MockCharacteristic::new(uuid::BATTERY_LEVEL, CharacteristicProperties::READ)
//!             .value([87]),
//!     ),
//! );
//! let transport = Arc::new(MockTransport::new(peripheral));
//!
//! let session = Session::connect(transport, "AA:BB:CC:DD:EE:FF").await?;
//! session.discover_services()?.await?;
//!
//! let battery = session.service(uuid::BATTERY_SERVICE).expect("battery service");
//! battery.discover_details()?.await?;
//! let level = battery.characteristic(uuid::BATTERY_LEVEL).expect("battery level");
//! let value = battery.read_characteristic(level.handle)?.await?;
//! println!("battery: {}%", value[0]);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, info, info_span};

use gattkit_types::{Handle, ServiceError, ServiceState, SessionState, Uuid};

use crate::attribute::AttributeTable;
use crate::config::SessionConfig;
use crate::error::{Error, OperationErrorReason, Result};
use crate::events::{DisconnectReason, EventDispatcher, EventReceiver, SessionEvent};
use crate::machine::{Command, Inbound, SessionMachine};
use crate::metrics::{SessionMetrics, SessionMetricsSummary};
use crate::pending::Pending;
use crate::registry::{Dispatcher, SessionRegistry, SessionToken};
use crate::service::ServiceView;
use crate::transport::Transport;

/// Visible status of one service.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ServiceStatus {
    pub(crate) state: ServiceState,
    pub(crate) error: Option<ServiceError>,
}

/// Everything the state machine owns that callers may read.
#[derive(Debug)]
pub(crate) struct SessionModel {
    pub(crate) table: AttributeTable,
    pub(crate) services: HashMap<Handle, ServiceStatus>,
    pub(crate) mtu: u16,
}

/// State shared between a [`Session`], its [`ServiceView`]s and its machine.
pub(crate) struct SessionShared {
    pub(crate) token: SessionToken,
    pub(crate) address: String,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) config: SessionConfig,
    pub(crate) events: EventDispatcher,
    pub(crate) metrics: SessionMetrics,
    pub(crate) model: RwLock<SessionModel>,
    state: watch::Sender<SessionState>,
}

impl SessionShared {
    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn post(&self, command: Command) -> bool {
        self.dispatcher.post(self.token, Inbound::Command(command))
    }

    /// Move the session forward. Backward moves and moves out of `Invalid`
    /// are refused.
    pub(crate) fn advance_state(&self, next: SessionState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(token = %self.token, state = %next, "session state changed");
            self.events.send(SessionEvent::StateChanged { state: next });
        }
        changed
    }

    /// Flip the session and every service to `Invalid`.
    ///
    /// Returns `false` if the session was already invalid; only the first
    /// caller emits events.
    pub(crate) fn invalidate(&self, reason: Option<DisconnectReason>) -> bool {
        let mut invalidated: Vec<Handle> = {
            // The state flips under the model lock so the machine never caches
            // a value or emits an event after `Invalid`.
            let mut model = self.model.write();
            if !self.advance_state(SessionState::Invalid) {
                return false;
            }
            model
                .services
                .iter_mut()
                .filter(|(_, status)| status.state != ServiceState::Invalid)
                .map(|(handle, status)| {
                    status.state = ServiceState::Invalid;
                    *handle
                })
                .collect()
        };
        invalidated.sort();
        for service in invalidated {
            self.events.send(SessionEvent::ServiceStateChanged {
                service,
                state: ServiceState::Invalid,
            });
        }
        if let Some(reason) = reason {
            self.events.send(SessionEvent::Disconnected { reason });
        }
        true
    }

    pub(crate) fn service_status(&self, service: Handle) -> Option<ServiceStatus> {
        self.model.read().services.get(&service).copied()
    }

    /// Set a service's state. A service that is `Invalid` stays `Invalid`.
    pub(crate) fn set_service_state(&self, service: Handle, state: ServiceState) {
        let changed = {
            let mut model = self.model.write();
            match model.services.get_mut(&service) {
                Some(status) if status.state != state && status.state != ServiceState::Invalid => {
                    status.state = state;
                    true
                }
                _ => false,
            }
        };
        if changed {
            debug!(%service, %state, "service state changed");
            self.events
                .send(SessionEvent::ServiceStateChanged { service, state });
        }
    }

    pub(crate) fn record_service_error(&self, service: Handle, error: ServiceError) {
        if let Some(status) = self.model.write().services.get_mut(&service) {
            status.error = Some(error);
        }
        self.events.send(SessionEvent::ServiceError { service, error });
    }
}

impl fmt::Debug for SessionShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionShared")
            .field("token", &self.token)
            .field("address", &self.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Session`].
pub struct SessionBuilder {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    registry: Option<Arc<SessionRegistry>>,
}

impl SessionBuilder {
    /// Use `config` instead of [`SessionConfig::default`].
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Register in `registry` instead of the process-wide one.
    #[must_use]
    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Create the session and start opening the transport.
    ///
    /// Returns immediately with the session in [`SessionState::Connecting`]
    /// and a [`Pending`] that resolves once the transport has opened.
    pub fn open(self, address: impl Into<String>) -> Result<(Session, Pending<()>)> {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let address = address.into();
        let registry = self.registry.unwrap_or_else(SessionRegistry::global);
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let token = registry.register(mailbox_tx);
        let (state, _) = watch::channel(SessionState::Connecting);

        let shared = Arc::new(SessionShared {
            token,
            address: address.clone(),
            dispatcher: Dispatcher::new(registry),
            events: EventDispatcher::new(self.config.event_capacity),
            metrics: SessionMetrics::new(),
            model: RwLock::new(SessionModel {
                table: AttributeTable::new(),
                services: HashMap::new(),
                mtu: self.config.default_mtu,
            }),
            config: self.config,
            state,
        });

        let machine = SessionMachine::new(Arc::clone(&shared), self.transport, mailbox_rx);
        let span = info_span!("session", %token, %address);
        runtime.spawn(machine.run().instrument(span));

        let (reply, pending) = Pending::channel();
        shared.post(Command::Connect { reply });
        info!(%token, %address, "session created");

        Ok((Session { shared }, pending))
    }

    /// Create the session and wait until the transport has opened.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn connect(self, address: impl Into<String>) -> Result<Session> {
        let (session, opened) = self.open(address)?;
        opened.await?;
        Ok(session)
    }
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One connection to one peripheral.
#[derive(Debug)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    /// Start building a session over `transport`.
    pub fn builder(transport: Arc<dyn Transport>) -> SessionBuilder {
        SessionBuilder {
            transport,
            config: SessionConfig::default(),
            registry: None,
        }
    }

    /// Connect with default configuration.
    pub async fn connect(transport: Arc<dyn Transport>, address: impl Into<String>) -> Result<Self> {
        Self::builder(transport).connect(address).await
    }

    /// Token identifying this session in its registry.
    pub fn token(&self) -> SessionToken {
        self.shared.token
    }

    /// Address the session was opened with.
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Wait until the session reaches `target`.
    ///
    /// Fails with [`Error::SessionInvalidated`] if the session becomes
    /// invalid first.
    pub async fn wait_for_state(&self, target: SessionState) -> Result<()> {
        let mut rx = self.watch_state();
        let reached = rx
            .wait_for(|state| *state == target || !state.is_valid())
            .await
            .map(|state| *state)
            .map_err(|_| Error::SessionInvalidated)?;
        if reached == target {
            Ok(())
        } else {
            Err(Error::SessionInvalidated)
        }
    }

    /// Subscribe to every event of this session.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// Current ATT MTU.
    pub fn mtu(&self) -> u16 {
        self.shared.model.read().mtu
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> SessionMetricsSummary {
        self.shared.metrics.summary()
    }

    /// Discover the peripheral's services.
    ///
    /// Requires the session to be connected. Calling it while discovery is
    /// running waits for that discovery; calling it afterwards resolves
    /// immediately.
    pub fn discover_services(&self) -> Result<Pending<()>> {
        let state = self.state();
        match state {
            SessionState::Invalid => Err(Error::SessionInvalidated),
            SessionState::Connecting => Err(Error::operation(OperationErrorReason::SessionNotReady {
                state,
                expected: SessionState::Connected,
            })),
            SessionState::Discovered => Ok(Pending::ready(Ok(()))),
            _ => {
                let (reply, pending) = Pending::channel();
                if self.shared.post(Command::DiscoverServices { reply }) {
                    Ok(pending)
                } else {
                    Err(Error::SessionInvalidated)
                }
            }
        }
    }

    /// Views of every discovered service, in handle order.
    pub fn services(&self) -> Vec<ServiceView> {
        let model = self.shared.model.read();
        model
            .table
            .services()
            .map(|(handle, record)| ServiceView::new(&self.shared, handle, record))
            .collect()
    }

    /// The first discovered service with `uuid`.
    pub fn service(&self, uuid: Uuid) -> Option<ServiceView> {
        let model = self.shared.model.read();
        model
            .table
            .services()
            .find(|(_, record)| record.uuid == uuid)
            .map(|(handle, record)| ServiceView::new(&self.shared, handle, record))
    }

    /// The service with `handle`, if it is one.
    pub fn service_by_handle(&self, handle: Handle) -> Option<ServiceView> {
        let model = self.shared.model.read();
        model
            .table
            .service(handle)
            .map(|record| ServiceView::new(&self.shared, handle, record))
    }

    /// Close the session.
    ///
    /// The session and every service become `Invalid` before this returns.
    /// Pending requests resolve with [`Error::SessionInvalidated`]. Calling
    /// it again is a no-op.
    pub fn disconnect(&self) {
        if self
            .shared
            .invalidate(Some(DisconnectReason::UserRequested))
        {
            info!(token = %self.shared.token, address = %self.shared.address, "session closed");
        }
        self.shared.post(Command::Close);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}
