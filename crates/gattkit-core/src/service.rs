//! Per-service views.
//!
//! A [`ServiceView`] is a cheap, cloneable handle to one service of one
//! session. Views of the same service are interchangeable: they share the
//! session's state, so every view sees the same [`ServiceState`], the same
//! cached values and the same last error.
//!
//! Views never keep their session alive. Once the [`Session`](crate::Session)
//! is dropped, every view reports [`ServiceState::Invalid`] and every
//! operation fails with [`Error::SessionInvalidated`].
//!
//! Operations check their preconditions synchronously. A request that fails
//! a check returns [`Error::Operation`] immediately, records
//! [`ServiceError::OperationError`] on the service, and never reaches the
//! job queue. A request that passes returns a [`Pending`] to await.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use tracing::debug;

use gattkit_types::uuid::{
    CCCD_DISABLE, CCCD_ENABLE_INDICATION, CCCD_ENABLE_NOTIFICATION,
    CLIENT_CHARACTERISTIC_CONFIGURATION,
};
use gattkit_types::{
    CharacteristicProperties, DiscoveryMode, Handle, ServiceError, ServiceKind, ServiceState,
    Uuid, WriteMode,
};

use crate::attribute::{CharacteristicRecord, DescriptorRecord, ServiceRecord};
use crate::error::{Error, OperationErrorReason, Result};
use crate::events::ServiceEvents;
use crate::machine::Command;
use crate::pending::Pending;
use crate::registry::SessionToken;
use crate::session::{SessionModel, SessionShared};

/// Snapshot of one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorInfo {
    pub handle: Handle,
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

/// Snapshot of one characteristic and its descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub handle: Handle,
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub value: Vec<u8>,
    pub descriptors: Vec<DescriptorInfo>,
}

impl CharacteristicInfo {
    /// The first descriptor with `uuid`.
    pub fn descriptor(&self, uuid: Uuid) -> Option<&DescriptorInfo> {
        self.descriptors.iter().find(|d| d.uuid == uuid)
    }

    /// The Client Characteristic Configuration descriptor, if present.
    pub fn client_configuration(&self) -> Option<&DescriptorInfo> {
        self.descriptor(CLIENT_CHARACTERISTIC_CONFIGURATION)
    }

    fn from_record(model: &SessionModel, handle: Handle, record: &CharacteristicRecord) -> Self {
        let descriptors = record
            .descriptors
            .iter()
            .filter_map(|h| model.table.descriptor(*h).map(|d| descriptor_info(*h, d)))
            .collect();
        Self {
            handle,
            uuid: record.uuid,
            properties: record.properties,
            value: record.value.clone(),
            descriptors,
        }
    }
}

fn descriptor_info(handle: Handle, record: &DescriptorRecord) -> DescriptorInfo {
    DescriptorInfo {
        handle,
        uuid: record.uuid,
        value: record.value.clone(),
    }
}

/// Handle to one service of a session.
#[derive(Clone)]
pub struct ServiceView {
    token: SessionToken,
    handle: Handle,
    uuid: Uuid,
    kind: ServiceKind,
    session: Weak<SessionShared>,
}

impl ServiceView {
    pub(crate) fn new(shared: &Arc<SessionShared>, handle: Handle, record: &ServiceRecord) -> Self {
        Self {
            token: shared.token,
            handle,
            uuid: record.uuid,
            kind: record.kind,
            session: Arc::downgrade(shared),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    /// Token of the owning session.
    pub fn session_token(&self) -> SessionToken {
        self.token
    }

    /// Current state, shared with every other view of this service.
    pub fn state(&self) -> ServiceState {
        self.session
            .upgrade()
            .and_then(|shared| shared.service_status(self.handle))
            .map_or(ServiceState::Invalid, |status| status.state)
    }

    /// The last error recorded on this service.
    pub fn error(&self) -> Option<ServiceError> {
        self.session
            .upgrade()
            .and_then(|shared| shared.service_status(self.handle))
            .and_then(|status| status.error)
    }

    /// Snapshots of every known characteristic, in handle order.
    pub fn characteristics(&self) -> Vec<CharacteristicInfo> {
        let Some(shared) = self.session.upgrade() else {
            return Vec::new();
        };
        let model = shared.model.read();
        let Some(service) = model.table.service(self.handle) else {
            return Vec::new();
        };
        service
            .characteristics
            .iter()
            .filter_map(|h| {
                model
                    .table
                    .characteristic(*h)
                    .map(|c| CharacteristicInfo::from_record(&model, *h, c))
            })
            .collect()
    }

    /// Snapshot of the first characteristic with `uuid`.
    pub fn characteristic(&self, uuid: Uuid) -> Option<CharacteristicInfo> {
        self.characteristics().into_iter().find(|c| c.uuid == uuid)
    }

    /// Snapshot of the characteristic with `handle`, if this service owns it.
    pub fn characteristic_by_handle(&self, handle: Handle) -> Option<CharacteristicInfo> {
        let shared = self.session.upgrade()?;
        let model = shared.model.read();
        model
            .table
            .characteristic(handle)
            .filter(|c| c.service == self.handle)
            .map(|c| CharacteristicInfo::from_record(&model, handle, c))
    }

    /// Whether `handle` is a characteristic or descriptor of this service.
    pub fn contains(&self, handle: Handle) -> bool {
        self.session.upgrade().is_some_and(|shared| {
            handle != self.handle && shared.model.read().table.service_of(handle) == Some(self.handle)
        })
    }

    /// Events scoped to this service.
    pub fn events(&self) -> Result<ServiceEvents> {
        let shared = self.session.upgrade().ok_or(Error::SessionInvalidated)?;
        Ok(ServiceEvents::new(self.handle, shared.events.subscribe()))
    }

    /// Discover characteristics and descriptors without reading values.
    pub fn discover_details(&self) -> Result<Pending<()>> {
        self.discover_details_with_mode(DiscoveryMode::default())
    }

    /// Discover characteristics and descriptors.
    ///
    /// Only the first call on a service does any work. Calls made while that
    /// discovery runs resolve together with it; calls made after it
    /// succeeded resolve immediately.
    pub fn discover_details_with_mode(&self, mode: DiscoveryMode) -> Result<Pending<()>> {
        let shared = self.live_session()?;
        match shared.service_status(self.handle).map(|s| s.state) {
            Some(ServiceState::Discovered) => Ok(Pending::ready(Ok(()))),
            Some(ServiceState::Invalid) | None => Err(Error::SessionInvalidated),
            Some(_) => self.submit(&shared, |reply| Command::DiscoverDetails {
                service: self.handle,
                mode,
                reply,
            }),
        }
    }

    /// Read a characteristic of this service.
    pub fn read_characteristic(&self, characteristic: Handle) -> Result<Pending<Vec<u8>>> {
        let shared = self.checked(|model| {
            self.owned_characteristic(model, characteristic).map(|_| ())
        })?;
        self.submit(&shared, |reply| Command::Read {
            handle: characteristic,
            reply,
        })
    }

    /// Write a characteristic of this service.
    ///
    /// The characteristic's properties must permit `mode`. A write without
    /// response must fit in one packet (`MTU - 3` bytes); it resolves once
    /// the transport has taken it and never reports a failure.
    pub fn write_characteristic(
        &self,
        characteristic: Handle,
        value: impl Into<Vec<u8>>,
        mode: WriteMode,
    ) -> Result<Pending<()>> {
        let value = value.into();
        let shared = self.checked(|model| {
            let record = self.owned_characteristic(model, characteristic)?;
            if !record.properties.permits(mode) {
                return Err(OperationErrorReason::WriteNotPermitted {
                    handle: characteristic,
                    mode,
                });
            }
            let max = usize::from(model.mtu.saturating_sub(3));
            if mode == WriteMode::WithoutResponse && value.len() > max {
                return Err(OperationErrorReason::PayloadTooLarge {
                    len: value.len(),
                    max,
                });
            }
            Ok(())
        })?;
        self.submit(&shared, |reply| Command::Write {
            handle: characteristic,
            value,
            mode,
            reply,
        })
    }

    /// Read a descriptor of this service.
    pub fn read_descriptor(&self, descriptor: Handle) -> Result<Pending<Vec<u8>>> {
        let shared = self.checked(|model| self.owned_descriptor(model, descriptor).map(|_| ()))?;
        self.submit(&shared, |reply| Command::Read {
            handle: descriptor,
            reply,
        })
    }

    /// Write a descriptor of this service.
    pub fn write_descriptor(
        &self,
        descriptor: Handle,
        value: impl Into<Vec<u8>>,
    ) -> Result<Pending<()>> {
        let shared = self.checked(|model| self.owned_descriptor(model, descriptor).map(|_| ()))?;
        let value = value.into();
        self.submit(&shared, |reply| Command::Write {
            handle: descriptor,
            value,
            mode: WriteMode::WithResponse,
            reply,
        })
    }

    /// Ask the peripheral to send notifications for `characteristic`.
    pub fn enable_notifications(&self, characteristic: Handle) -> Result<Pending<()>> {
        self.configure_updates(
            characteristic,
            |p| p.contains(CharacteristicProperties::NOTIFY),
            CCCD_ENABLE_NOTIFICATION,
        )
    }

    /// Ask the peripheral to send indications for `characteristic`.
    pub fn enable_indications(&self, characteristic: Handle) -> Result<Pending<()>> {
        self.configure_updates(
            characteristic,
            |p| p.contains(CharacteristicProperties::INDICATE),
            CCCD_ENABLE_INDICATION,
        )
    }

    /// Stop notifications and indications for `characteristic`.
    pub fn disable_notifications(&self, characteristic: Handle) -> Result<Pending<()>> {
        self.configure_updates(characteristic, CharacteristicProperties::can_notify, CCCD_DISABLE)
    }

    fn configure_updates(
        &self,
        characteristic: Handle,
        supported: fn(CharacteristicProperties) -> bool,
        value: [u8; 2],
    ) -> Result<Pending<()>> {
        let mut cccd = Handle::INVALID;
        let shared = self.checked(|model| {
            let record = self.owned_characteristic(model, characteristic)?;
            if !supported(record.properties) {
                return Err(OperationErrorReason::NotificationsUnsupported(characteristic));
            }
            cccd = record
                .descriptors
                .iter()
                .copied()
                .find(|h| {
                    model
                        .table
                        .descriptor(*h)
                        .is_some_and(|d| d.uuid == CLIENT_CHARACTERISTIC_CONFIGURATION)
                })
                .ok_or(OperationErrorReason::MissingClientConfiguration(characteristic))?;
            Ok(())
        })?;
        debug!(service = %self.handle, %characteristic, ?value, "writing client configuration");
        self.submit(&shared, |reply| Command::Write {
            handle: cccd,
            value: value.to_vec(),
            mode: WriteMode::WithResponse,
            reply,
        })
    }

    fn live_session(&self) -> Result<Arc<SessionShared>> {
        self.session
            .upgrade()
            .filter(|shared| shared.state().is_valid())
            .ok_or(Error::SessionInvalidated)
    }

    /// Run the common checks, then `check`, under one read of the model.
    fn checked(
        &self,
        check: impl FnOnce(&SessionModel) -> std::result::Result<(), OperationErrorReason>,
    ) -> Result<Arc<SessionShared>> {
        let shared = self.live_session()?;
        let verdict = {
            let model = shared.model.read();
            match model.services.get(&self.handle).map(|s| s.state) {
                Some(ServiceState::Discovered) => check(&*model),
                Some(ServiceState::Invalid) | None => return Err(Error::SessionInvalidated),
                Some(state) => Err(OperationErrorReason::ServiceNotReady { state }),
            }
        };
        match verdict {
            Ok(()) => Ok(shared),
            Err(reason) => {
                debug!(service = %self.handle, %reason, "operation rejected");
                shared.record_service_error(self.handle, ServiceError::OperationError);
                Err(Error::operation(reason))
            }
        }
    }

    fn owned_characteristic<'m>(
        &self,
        model: &'m SessionModel,
        handle: Handle,
    ) -> std::result::Result<&'m CharacteristicRecord, OperationErrorReason> {
        self.check_owner(model, handle)?;
        model
            .table
            .characteristic(handle)
            .ok_or(OperationErrorReason::WrongAttributeKind {
                handle,
                expected: "characteristic",
            })
    }

    fn owned_descriptor<'m>(
        &self,
        model: &'m SessionModel,
        handle: Handle,
    ) -> std::result::Result<&'m DescriptorRecord, OperationErrorReason> {
        self.check_owner(model, handle)?;
        model
            .table
            .descriptor(handle)
            .ok_or(OperationErrorReason::WrongAttributeKind {
                handle,
                expected: "descriptor",
            })
    }

    fn check_owner(
        &self,
        model: &SessionModel,
        handle: Handle,
    ) -> std::result::Result<(), OperationErrorReason> {
        match model.table.service_of(handle) {
            None => Err(OperationErrorReason::UnknownHandle(handle)),
            Some(owner) if owner != self.handle => Err(OperationErrorReason::NotOwned {
                handle,
                service: self.handle,
            }),
            Some(_) => Ok(()),
        }
    }

    fn submit<T>(
        &self,
        shared: &SessionShared,
        command: impl FnOnce(tokio::sync::oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<Pending<T>> {
        let (reply, pending) = Pending::channel();
        if shared.post(command(reply)) {
            Ok(pending)
        } else {
            Err(Error::SessionInvalidated)
        }
    }
}

impl PartialEq for ServiceView {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token && self.handle == other.handle
    }
}

impl Eq for ServiceView {}

impl Hash for ServiceView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.hash(state);
        self.handle.hash(state);
    }
}

impl fmt::Debug for ServiceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceView")
            .field("token", &self.token)
            .field("handle", &self.handle)
            .field("uuid", &self.uuid)
            .field("state", &self.state())
            .finish()
    }
}
