//! Simulated peripheral for testing.
//!
//! [`MockTransport`] implements [`Transport`] against an in-memory GATT
//! database described with [`MockPeripheral`]. It lets tests drive a real
//! [`Session`](crate::Session) without hardware.
//!
//! # Features
//!
//! - **Failure injection**: make every request touching a UUID fail
//! - **Latency simulation**: delay all requests, or only those touching a UUID
//! - **Request log**: every call the session made, in order
//! - **Concurrency high-water mark**: the highest number of requests ever in flight
//! - **Peripheral-initiated events**: notifications, MTU changes, link loss
//!
//! Remote ids are assigned in declaration order starting at 1, the way ATT
//! handles are laid out on a real peripheral.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use gattkit_types::{CharacteristicProperties, RemoteId, ServiceKind, Uuid, WriteMode};
use gattkit_types::uuid::CLIENT_CHARACTERISTIC_CONFIGURATION;

use crate::events::DisconnectReason;
use crate::transport::{
    CharacteristicDeclaration, DescriptorDeclaration, EventSink, ServiceDeclaration, Target,
    Transport, TransportError, TransportResult,
};

/// A descriptor of a simulated peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDescriptor {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

/// A characteristic of a simulated peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub value: Vec<u8>,
    pub descriptors: Vec<MockDescriptor>,
}

impl MockCharacteristic {
    pub fn new(uuid: Uuid, properties: CharacteristicProperties) -> Self {
        Self {
            uuid,
            properties,
            value: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    /// Set the initial value.
    #[must_use]
    pub fn value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    /// Add a descriptor.
    #[must_use]
    pub fn descriptor(mut self, uuid: Uuid, value: impl Into<Vec<u8>>) -> Self {
        self.descriptors.push(MockDescriptor {
            uuid,
            value: value.into(),
        });
        self
    }

    /// Add a Client Characteristic Configuration descriptor, initially off.
    #[must_use]
    pub fn with_cccd(self) -> Self {
        self.descriptor(CLIENT_CHARACTERISTIC_CONFIGURATION, [0x00, 0x00])
    }
}

/// A service of a simulated peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockService {
    pub uuid: Uuid,
    pub kind: ServiceKind,
    pub characteristics: Vec<MockCharacteristic>,
}

impl MockService {
    pub fn primary(uuid: Uuid) -> Self {
        Self {
            uuid,
            kind: ServiceKind::Primary,
            characteristics: Vec::new(),
        }
    }

    pub fn included(uuid: Uuid) -> Self {
        Self {
            kind: ServiceKind::Included,
            ..Self::primary(uuid)
        }
    }

    /// Add a characteristic.
    #[must_use]
    pub fn characteristic(mut self, characteristic: MockCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}

/// GATT database of a simulated peripheral.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockPeripheral {
    pub services: Vec<MockService>,
}

impl MockPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service.
    #[must_use]
    pub fn service(mut self, service: MockService) -> Self {
        self.services.push(service);
        self
    }
}

/// One call a session made on a [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    Open(String),
    DiscoverServices,
    DiscoverCharacteristics(Uuid),
    DiscoverDescriptors(Uuid),
    Read(Uuid),
    Write {
        uuid: Uuid,
        value: Vec<u8>,
        mode: WriteMode,
    },
    Close,
}

/// Flattened view of a [`MockPeripheral`].
#[derive(Debug, Default)]
struct Database {
    services: Vec<ServiceDeclaration>,
    characteristics: HashMap<RemoteId, Vec<CharacteristicDeclaration>>,
    descriptors: HashMap<RemoteId, Vec<DescriptorDeclaration>>,
    uuids: HashMap<RemoteId, Uuid>,
}

impl Database {
    fn build(peripheral: &MockPeripheral) -> (Self, HashMap<RemoteId, Vec<u8>>) {
        let mut db = Database::default();
        let mut values = HashMap::new();
        let mut next = 0u64;
        let mut allocate = |uuid: Uuid, db: &mut Database| {
            next += 1;
            let id = RemoteId(next);
            db.uuids.insert(id, uuid);
            id
        };

        for service in &peripheral.services {
            let service_id = allocate(service.uuid, &mut db);
            db.services.push(ServiceDeclaration {
                id: service_id,
                uuid: service.uuid,
                kind: service.kind,
            });
            let mut characteristics = Vec::new();
            for characteristic in &service.characteristics {
                let char_id = allocate(characteristic.uuid, &mut db);
                values.insert(char_id, characteristic.value.clone());
                characteristics.push(CharacteristicDeclaration {
                    id: char_id,
                    uuid: characteristic.uuid,
                    properties: characteristic.properties,
                });
                let mut descriptors = Vec::new();
                for descriptor in &characteristic.descriptors {
                    let desc_id = allocate(descriptor.uuid, &mut db);
                    values.insert(desc_id, descriptor.value.clone());
                    descriptors.push(DescriptorDeclaration {
                        id: desc_id,
                        uuid: descriptor.uuid,
                    });
                }
                db.descriptors.insert(char_id, descriptors);
            }
            db.characteristics.insert(service_id, characteristics);
        }
        (db, values)
    }
}

/// A simulated [`Transport`].
pub struct MockTransport {
    db: Database,
    values: Mutex<HashMap<RemoteId, Vec<u8>>>,
    sink: Mutex<Option<EventSink>>,
    requests: Mutex<Vec<MockRequest>>,
    failures: Mutex<HashMap<Uuid, TransportError>>,
    open_failure: Option<TransportError>,
    latency: Duration,
    latencies: HashMap<Uuid, Duration>,
    mtu: Option<u16>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: AtomicBool,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("services", &self.db.services.len())
            .field("requests", &self.requests.lock().len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockTransport {
    /// A transport for `peripheral` with no latency and no failures.
    pub fn new(peripheral: MockPeripheral) -> Self {
        MockTransportBuilder::new(peripheral).build()
    }

    pub fn builder(peripheral: MockPeripheral) -> MockTransportBuilder {
        MockTransportBuilder::new(peripheral)
    }

    /// Make every later request touching `uuid` fail with `error`.
    pub fn set_failure(&self, uuid: Uuid, error: TransportError) {
        self.failures.lock().insert(uuid, error);
    }

    pub fn clear_failure(&self, uuid: Uuid) {
        self.failures.lock().remove(&uuid);
    }

    /// Remote id of the first attribute with `uuid`.
    pub fn remote_id(&self, uuid: Uuid) -> Option<RemoteId> {
        self.db
            .uuids
            .iter()
            .filter(|(_, u)| **u == uuid)
            .map(|(id, _)| *id)
            .min()
    }

    /// Current peripheral-side value of the first attribute with `uuid`.
    pub fn value(&self, uuid: Uuid) -> Option<Vec<u8>> {
        let id = self.remote_id(uuid)?;
        self.values.lock().get(&id).cloned()
    }

    /// Change a value on the peripheral side without notifying.
    pub fn set_value(&self, uuid: Uuid, value: impl Into<Vec<u8>>) {
        if let Some(id) = self.remote_id(uuid) {
            self.values.lock().insert(id, value.into());
        }
    }

    /// Update a characteristic and push the new value to the session.
    ///
    /// Returns `false` if no session is listening.
    pub fn notify(&self, uuid: Uuid, value: impl Into<Vec<u8>>) -> bool {
        let Some(id) = self.remote_id(uuid) else {
            return false;
        };
        let value = value.into();
        self.values.lock().insert(id, value.clone());
        self.with_sink(|sink| sink.value_changed(id, value))
    }

    /// Push a notification for an arbitrary remote id.
    pub fn notify_raw(&self, id: RemoteId, value: impl Into<Vec<u8>>) -> bool {
        let value = value.into();
        self.with_sink(|sink| sink.value_changed(id, value))
    }

    /// Report a new MTU to the session.
    pub fn change_mtu(&self, mtu: u16) -> bool {
        self.with_sink(|sink| sink.mtu_changed(mtu))
    }

    /// Drop the link from the peripheral side.
    pub fn drop_link(&self, reason: DisconnectReason) -> bool {
        self.with_sink(|sink| sink.disconnected(reason))
    }

    /// Report a fatal transport error to the session.
    pub fn fail_link(&self, error: TransportError) -> bool {
        self.with_sink(|sink| sink.failed(error))
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&MockRequest) -> bool) -> usize {
        self.requests.lock().iter().filter(|r| predicate(r)).count()
    }

    /// The largest number of discovery, read and write requests ever in
    /// progress at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn with_sink(&self, send: impl FnOnce(&EventSink) -> bool) -> bool {
        let sink = self.sink.lock().clone();
        sink.is_some_and(|sink| send(&sink))
    }

    fn record(&self, request: MockRequest) {
        self.requests.lock().push(request);
    }

    fn uuid_of(&self, id: RemoteId) -> TransportResult<Uuid> {
        self.db
            .uuids
            .get(&id)
            .copied()
            .ok_or(TransportError::UnknownAttribute(id))
    }

    fn begin(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    async fn simulate(&self, uuid: Option<Uuid>) -> TransportResult<()> {
        let delay = uuid
            .and_then(|u| self.latencies.get(&u).copied())
            .unwrap_or(self.latency);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        match uuid.and_then(|u| self.failures.lock().get(&u).cloned()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, address: &str, events: EventSink) -> TransportResult<()> {
        self.record(MockRequest::Open(address.to_string()));
        self.simulate(None).await?;
        if let Some(error) = &self.open_failure {
            return Err(error.clone());
        }
        if let Some(mtu) = self.mtu {
            events.mtu_changed(mtu);
        }
        *self.sink.lock() = Some(events);
        Ok(())
    }

    async fn discover_services(&self) -> TransportResult<Vec<ServiceDeclaration>> {
        self.record(MockRequest::DiscoverServices);
        let _guard = self.begin();
        self.simulate(None).await?;
        Ok(self.db.services.clone())
    }

    async fn discover_characteristics(
        &self,
        service: &ServiceDeclaration,
    ) -> TransportResult<Vec<CharacteristicDeclaration>> {
        self.record(MockRequest::DiscoverCharacteristics(service.uuid));
        let _guard = self.begin();
        self.simulate(Some(service.uuid)).await?;
        self.db
            .characteristics
            .get(&service.id)
            .cloned()
            .ok_or(TransportError::UnknownAttribute(service.id))
    }

    async fn discover_descriptors(
        &self,
        characteristic: &CharacteristicDeclaration,
    ) -> TransportResult<Vec<DescriptorDeclaration>> {
        self.record(MockRequest::DiscoverDescriptors(characteristic.uuid));
        let _guard = self.begin();
        self.simulate(Some(characteristic.uuid)).await?;
        self.db
            .descriptors
            .get(&characteristic.id)
            .cloned()
            .ok_or(TransportError::UnknownAttribute(characteristic.id))
    }

    async fn read(&self, target: Target) -> TransportResult<Vec<u8>> {
        let uuid = self.uuid_of(target.id())?;
        self.record(MockRequest::Read(uuid));
        let _guard = self.begin();
        self.simulate(Some(uuid)).await?;
        Ok(self
            .values
            .lock()
            .get(&target.id())
            .cloned()
            .unwrap_or_default())
    }

    async fn write(&self, target: Target, value: &[u8], mode: WriteMode) -> TransportResult<()> {
        let uuid = self.uuid_of(target.id())?;
        self.record(MockRequest::Write {
            uuid,
            value: value.to_vec(),
            mode,
        });
        let _guard = self.begin();
        self.simulate(Some(uuid)).await?;
        self.values.lock().insert(target.id(), value.to_vec());
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.record(MockRequest::Close);
        self.closed.store(true, Ordering::SeqCst);
        self.sink.lock().take();
        Ok(())
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug)]
pub struct MockTransportBuilder {
    peripheral: MockPeripheral,
    failures: HashMap<Uuid, TransportError>,
    open_failure: Option<TransportError>,
    latency: Duration,
    latencies: HashMap<Uuid, Duration>,
    mtu: Option<u16>,
}

impl MockTransportBuilder {
    pub fn new(peripheral: MockPeripheral) -> Self {
        Self {
            peripheral,
            failures: HashMap::new(),
            open_failure: None,
            latency: Duration::ZERO,
            latencies: HashMap::new(),
            mtu: None,
        }
    }

    /// Delay every request by `latency`.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay requests touching `uuid` by `latency` instead.
    #[must_use]
    pub fn latency_for(mut self, uuid: Uuid, latency: Duration) -> Self {
        self.latencies.insert(uuid, latency);
        self
    }

    /// Fail every request touching `uuid`.
    #[must_use]
    pub fn fail(mut self, uuid: Uuid, error: TransportError) -> Self {
        self.failures.insert(uuid, error);
        self
    }

    /// Fail `open`.
    #[must_use]
    pub fn fail_open(mut self, error: TransportError) -> Self {
        self.open_failure = Some(error);
        self
    }

    /// Report this MTU as soon as the link opens.
    #[must_use]
    pub fn mtu(mut self, mtu: u16) -> Self {
        self.mtu = Some(mtu);
        self
    }

    pub fn build(self) -> MockTransport {
        let (db, values) = Database::build(&self.peripheral);
        MockTransport {
            db,
            values: Mutex::new(values),
            sink: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(self.failures),
            open_failure: self.open_failure,
            latency: self.latency,
            latencies: self.latencies,
            mtu: self.mtu,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }
}
