//! End-to-end tests driving real sessions over the simulated transport.

use std::sync::Arc;
use std::time::Duration;

use gattkit_core::mock::{
    MockCharacteristic, MockPeripheral, MockRequest, MockService, MockTransport,
};
use gattkit_core::{
    DisconnectReason, Error, EventReceiver, OperationErrorReason, ServiceView, Session,
    SessionConfig, SessionEvent, SessionRegistry, TransportError,
};
use gattkit_types::uuid::{
    BATTERY_LEVEL, BATTERY_SERVICE, CHARACTERISTIC_USER_DESCRIPTION,
    CLIENT_CHARACTERISTIC_CONFIGURATION, DEVICE_INFO_SERVICE, DEVICE_NAME,
    HEART_RATE_MEASUREMENT, HEART_RATE_SERVICE, MANUFACTURER_NAME,
};
use gattkit_types::{
    CharacteristicProperties as Props, DiscoveryMode, Handle, ServiceError, ServiceState,
    SessionState, WriteMode,
};

const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("gattkit_core=debug")
        .with_test_writer()
        .try_init();
}

fn peripheral() -> MockPeripheral {
    MockPeripheral::new()
        .service(
            MockService::primary(BATTERY_SERVICE).characteristic(
                MockCharacteristic::new(BATTERY_LEVEL, Props::READ | Props::NOTIFY)
                    .value([0x00])
                    .with_cccd(),
            ),
        )
        .service(
            MockService::primary(DEVICE_INFO_SERVICE)
                .characteristic(
                    MockCharacteristic::new(
                        DEVICE_NAME,
                        Props::READ | Props::WRITE | Props::WRITE_NO_RESPONSE,
                    )
                    .value(*b"sensor")
                    .descriptor(CHARACTERISTIC_USER_DESCRIPTION, *b"Name"),
                )
                .characteristic(
                    MockCharacteristic::new(MANUFACTURER_NAME, Props::READ).value(*b"acme"),
                ),
        )
        .service(
            MockService::primary(HEART_RATE_SERVICE)
                .characteristic(MockCharacteristic::new(HEART_RATE_MEASUREMENT, Props::NOTIFY)),
        )
}

struct Harness {
    mock: Arc<MockTransport>,
    registry: Arc<SessionRegistry>,
    session: Session,
}

async fn connect_with(mock: MockTransport, config: SessionConfig) -> Harness {
    init_tracing();
    let mock = Arc::new(mock);
    let registry = Arc::new(SessionRegistry::new());
    let session = Session::builder(mock.clone())
        .config(config)
        .registry(Arc::clone(&registry))
        .connect(ADDRESS)
        .await
        .unwrap();
    Harness {
        mock,
        registry,
        session,
    }
}

async fn discovered(mock: MockTransport) -> Harness {
    let harness = connect_with(mock, SessionConfig::default()).await;
    harness.session.discover_services().unwrap().await.unwrap();
    harness
}

async fn detailed(harness: &Harness, uuid: gattkit_types::Uuid) -> ServiceView {
    let view = harness.session.service(uuid).unwrap();
    view.discover_details().unwrap().await.unwrap();
    view
}

fn drain(rx: &mut EventReceiver) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_connect_and_discover_services() {
    let h = connect_with(MockTransport::new(peripheral()), SessionConfig::default()).await;
    assert_eq!(h.session.state(), SessionState::Connected);
    assert!(h.registry.contains(h.session.token()));
    assert_eq!(h.session.mtu(), 23);

    let mut events = h.session.subscribe();
    h.session.discover_services().unwrap().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Discovered);

    let services = h.session.services();
    assert_eq!(services.len(), 3);
    assert!(services.iter().all(|s| s.state() == ServiceState::DiscoveryRequired));
    assert_eq!(services[0].uuid(), BATTERY_SERVICE);

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::StateChanged {
        state: SessionState::Discovering
    }));
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::ServicesDiscovered { services } if services.len() == 3)
    ));

    // Already discovered: resolves without another transport call.
    h.session.discover_services().unwrap().await.unwrap();
    assert_eq!(h.mock.count(|r| *r == MockRequest::DiscoverServices), 1);
}

#[tokio::test]
async fn test_discover_services_before_open_is_rejected() {
    init_tracing();
    let mock = Arc::new(
        MockTransport::builder(peripheral())
            .latency(Duration::from_millis(200))
            .build(),
    );
    let registry = Arc::new(SessionRegistry::new());
    let (session, opened) = Session::builder(mock)
        .registry(registry)
        .open(ADDRESS)
        .unwrap();

    assert_eq!(session.state(), SessionState::Connecting);
    let err = session.discover_services().unwrap_err();
    assert!(matches!(
        err.operation_reason(),
        Some(OperationErrorReason::SessionNotReady { .. })
    ));
    opened.await.unwrap();
    session.wait_for_state(SessionState::Connected).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_reports_connection_error() {
    init_tracing();
    let mock = Arc::new(
        MockTransport::builder(peripheral())
            .fail_open(TransportError::Rejected("adapter off".into()))
            .build(),
    );
    let registry = Arc::new(SessionRegistry::new());
    let err = Session::builder(mock)
        .registry(Arc::clone(&registry))
        .connect(ADDRESS)
        .await
        .unwrap_err();

    match err {
        Error::Connection { address, source } => {
            assert_eq!(address, ADDRESS);
            assert_eq!(source, TransportError::Rejected("adapter off".into()));
        }
        other => panic!("unexpected error: {other}"),
    }
    settle().await;
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_open_timeout() {
    init_tracing();
    let mock = Arc::new(
        MockTransport::builder(peripheral())
            .latency(Duration::from_secs(5))
            .build(),
    );
    let config = SessionConfig::default().open_timeout(Duration::from_secs(1));
    let err = Session::builder(mock)
        .config(config)
        .registry(Arc::new(SessionRegistry::new()))
        .connect(ADDRESS)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Connection {
            source: TransportError::Timeout(_),
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_service_discovery_timeout_invalidates_session() {
    let mock = MockTransport::builder(peripheral())
        .latency(Duration::from_millis(300))
        .build();
    let config = SessionConfig::default().discovery_timeout(Duration::from_millis(100));
    let h = connect_with(mock, config).await;

    let err = h.session.discover_services().unwrap().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Discovery {
            service: None,
            source: TransportError::Timeout(_)
        }
    ));
    assert_eq!(h.session.state(), SessionState::Invalid);
    settle().await;
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_discover_details_populates_service() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;

    assert_eq!(info.state(), ServiceState::Discovered);
    assert_eq!(info.error(), None);
    let characteristics = info.characteristics();
    assert_eq!(characteristics.len(), 2);

    let name = info.characteristic(DEVICE_NAME).unwrap();
    assert!(name.properties.contains(Props::WRITE));
    assert!(name.descriptor(CHARACTERISTIC_USER_DESCRIPTION).is_some());
    // Values are not fetched in the default mode.
    assert!(name.value.is_empty());
    assert!(info.contains(name.handle));
    assert!(!info.contains(info.handle()));

    // Other services are untouched.
    let battery = h.session.service(BATTERY_SERVICE).unwrap();
    assert_eq!(battery.state(), ServiceState::DiscoveryRequired);
    assert!(battery.characteristics().is_empty());
}

#[tokio::test]
async fn test_aliasing_views_share_one_discovery() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let first = h.session.service(DEVICE_INFO_SERVICE).unwrap();
    let second = h.session.service_by_handle(first.handle()).unwrap();
    assert_eq!(first, second);

    let a = first.discover_details().unwrap();
    let b = second.discover_details().unwrap();
    a.await.unwrap();
    b.await.unwrap();
    first.discover_details().unwrap().await.unwrap();

    assert_eq!(
        h.mock
            .count(|r| *r == MockRequest::DiscoverCharacteristics(DEVICE_INFO_SERVICE)),
        1
    );
    assert_eq!(
        h.mock
            .count(|r| matches!(r, MockRequest::DiscoverDescriptors(_))),
        2
    );
    assert_eq!(second.state(), ServiceState::Discovered);
}

#[tokio::test]
async fn test_full_discovery_reads_values_quietly() {
    let mock = MockTransport::builder(peripheral())
        .fail(
            CHARACTERISTIC_USER_DESCRIPTION,
            TransportError::Rejected("insufficient authentication".into()),
        )
        .build();
    let h = discovered(mock).await;
    let info = h.session.service(DEVICE_INFO_SERVICE).unwrap();
    let mut events = h.session.subscribe();

    info.discover_details_with_mode(DiscoveryMode::FullDiscovery)
        .unwrap()
        .await
        .unwrap();

    let name = info.characteristic(DEVICE_NAME).unwrap();
    assert_eq!(name.value, b"sensor");
    assert_eq!(info.characteristic(MANUFACTURER_NAME).unwrap().value, b"acme");
    // The failed descriptor read neither fails discovery nor marks the service.
    assert!(name.descriptors[0].value.is_empty());
    assert_eq!(info.error(), None);

    let requests = h.mock.requests();
    let reads: Vec<_> = requests
        .iter()
        .filter_map(|r| match r {
            MockRequest::Read(uuid) => Some(*uuid),
            _ => None,
        })
        .collect();
    assert_eq!(
        reads,
        vec![DEVICE_NAME, CHARACTERISTIC_USER_DESCRIPTION, MANUFACTURER_NAME]
    );
    assert!(
        !drain(&mut events)
            .iter()
            .any(|e| matches!(e, SessionEvent::CharacteristicRead { .. }))
    );
}

#[tokio::test]
async fn test_detail_discovery_failure_can_be_retried() {
    let mock = MockTransport::builder(peripheral())
        .fail(DEVICE_INFO_SERVICE, TransportError::Rejected("busy".into()))
        .build();
    let h = discovered(mock).await;
    let info = h.session.service(DEVICE_INFO_SERVICE).unwrap();

    let err = info.discover_details().unwrap().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Discovery { service: Some(s), .. } if s == info.handle()
    ));
    assert_eq!(info.state(), ServiceState::DiscoveryRequired);
    assert_eq!(info.error(), Some(ServiceError::DiscoveryError));
    assert_eq!(h.session.state(), SessionState::Discovered);

    h.mock.clear_failure(DEVICE_INFO_SERVICE);
    info.discover_details().unwrap().await.unwrap();
    assert_eq!(info.state(), ServiceState::Discovered);
    assert_eq!(info.characteristics().len(), 2);
}

#[tokio::test]
async fn test_read_updates_cache_and_emits_event() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let name = info.characteristic(DEVICE_NAME).unwrap();
    let mut events = info.events().unwrap();

    let value = info.read_characteristic(name.handle).unwrap().await.unwrap();
    assert_eq!(value, b"sensor");
    assert_eq!(info.characteristic(DEVICE_NAME).unwrap().value, b"sensor");
    assert_eq!(
        events.try_recv(),
        Some(SessionEvent::CharacteristicRead {
            service: info.handle(),
            characteristic: name.handle,
            value: b"sensor".to_vec(),
        })
    );

    let description = name.descriptor(CHARACTERISTIC_USER_DESCRIPTION).unwrap();
    let value = info.read_descriptor(description.handle).unwrap().await.unwrap();
    assert_eq!(value, b"Name");
    assert!(matches!(
        events.try_recv(),
        Some(SessionEvent::DescriptorRead { descriptor, .. }) if descriptor == description.handle
    ));

    let metrics = h.session.metrics();
    assert_eq!(metrics.reads.count, 2);
    assert_eq!(metrics.bytes_read, 10);
}

#[tokio::test]
async fn test_write_with_response_round_trip() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let name = info.characteristic(DEVICE_NAME).unwrap();
    let mut events = h.session.subscribe();

    info.write_characteristic(name.handle, [0x01, 0x02], WriteMode::WithResponse)
        .unwrap()
        .await
        .unwrap();

    let written: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::CharacteristicWritten { .. }))
        .collect();
    assert_eq!(
        written,
        vec![SessionEvent::CharacteristicWritten {
            service: info.handle(),
            characteristic: name.handle,
            value: vec![0x01, 0x02],
        }]
    );
    assert_eq!(info.characteristic_by_handle(name.handle).unwrap().value, [0x01, 0x02]);
    assert_eq!(h.mock.value(DEVICE_NAME), Some(vec![0x01, 0x02]));
}

#[tokio::test]
async fn test_write_without_response_is_silent() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let name = info.characteristic(DEVICE_NAME).unwrap();
    let mut events = h.session.subscribe();

    info.write_characteristic(name.handle, [0x07], WriteMode::WithoutResponse)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(h.mock.value(DEVICE_NAME), Some(vec![0x07]));

    h.mock
        .set_failure(DEVICE_NAME, TransportError::Rejected("dropped".into()));
    info.write_characteristic(name.handle, [0x08], WriteMode::WithoutResponse)
        .unwrap()
        .await
        .unwrap();

    assert!(drain(&mut events).is_empty());
    assert_eq!(info.error(), None);
}

#[tokio::test]
async fn test_write_without_response_respects_mtu() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let name = info.characteristic(DEVICE_NAME).unwrap();

    let err = info
        .write_characteristic(name.handle, vec![0u8; 21], WriteMode::WithoutResponse)
        .unwrap_err();
    assert_eq!(
        err.operation_reason(),
        Some(&OperationErrorReason::PayloadTooLarge { len: 21, max: 20 })
    );

    // Writes with response are not limited to one packet.
    info.write_characteristic(name.handle, vec![0u8; 21], WriteMode::WithResponse)
        .unwrap()
        .await
        .unwrap();
    info.write_characteristic(name.handle, vec![0u8; 20], WriteMode::WithoutResponse)
        .unwrap()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_negotiated_mtu_raises_payload_limit() {
    let mock = MockTransport::builder(peripheral()).mtu(247).build();
    let h = connect_with(mock, SessionConfig::default()).await;
    assert_eq!(h.session.mtu(), 247);
    h.session.discover_services().unwrap().await.unwrap();
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let name = info.characteristic(DEVICE_NAME).unwrap();

    info.write_characteristic(name.handle, vec![0u8; 200], WriteMode::WithoutResponse)
        .unwrap()
        .await
        .unwrap();

    let mut events = h.session.subscribe();
    assert!(h.mock.change_mtu(64));
    assert_eq!(events.recv().await.unwrap(), SessionEvent::MtuChanged { mtu: 64 });
    assert_eq!(h.session.mtu(), 64);
}

#[tokio::test]
async fn test_mtu_below_att_minimum_is_ignored() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let name = info.characteristic(DEVICE_NAME).unwrap();
    let mut events = h.session.subscribe();

    assert!(h.mock.change_mtu(0));
    settle().await;
    assert_eq!(h.session.mtu(), 23);
    assert!(drain(&mut events).is_empty());

    info.write_characteristic(name.handle, vec![0u8; 20], WriteMode::WithoutResponse)
        .unwrap()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_precondition_failures_never_reach_the_transport() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let battery = h.session.service(BATTERY_SERVICE).unwrap();

    // Not discovered yet.
    let err = battery.read_characteristic(Handle::new(99)).unwrap_err();
    assert_eq!(
        err.operation_reason(),
        Some(&OperationErrorReason::ServiceNotReady {
            state: ServiceState::DiscoveryRequired
        })
    );
    assert_eq!(battery.error(), Some(ServiceError::OperationError));

    battery.discover_details().unwrap().await.unwrap();
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let level = battery.characteristic(BATTERY_LEVEL).unwrap();
    let name = info.characteristic(DEVICE_NAME).unwrap();
    let before = h.mock.requests().len();

    // {Read, Notify} does not allow writes.
    let err = battery
        .write_characteristic(level.handle, [0x01], WriteMode::WithResponse)
        .unwrap_err();
    assert_eq!(
        err.operation_reason(),
        Some(&OperationErrorReason::WriteNotPermitted {
            handle: level.handle,
            mode: WriteMode::WithResponse
        })
    );

    // Owned by another service.
    let err = battery.read_characteristic(name.handle).unwrap_err();
    assert_eq!(
        err.operation_reason(),
        Some(&OperationErrorReason::NotOwned {
            handle: name.handle,
            service: battery.handle()
        })
    );

    // Unknown handle.
    let err = battery.read_characteristic(Handle::new(999)).unwrap_err();
    assert_eq!(
        err.operation_reason(),
        Some(&OperationErrorReason::UnknownHandle(Handle::new(999)))
    );

    // A characteristic is not a descriptor.
    let err = battery.read_descriptor(level.handle).unwrap_err();
    assert!(matches!(
        err.operation_reason(),
        Some(OperationErrorReason::WrongAttributeKind { .. })
    ));

    assert_eq!(h.mock.requests().len(), before);
    assert_eq!(battery.error(), Some(ServiceError::OperationError));
}

#[tokio::test]
async fn test_transport_failures_are_reported_to_the_caller_only() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let name = info.characteristic(DEVICE_NAME).unwrap();
    let maker = info.characteristic(MANUFACTURER_NAME).unwrap();

    h.mock
        .set_failure(DEVICE_NAME, TransportError::Rejected("read not permitted".into()));
    let failed = info.read_characteristic(name.handle).unwrap();
    let next = info.read_characteristic(maker.handle).unwrap();

    assert!(matches!(failed.await, Err(Error::Read { handle, .. }) if handle == name.handle));
    assert_eq!(next.await.unwrap(), b"acme");
    assert_eq!(info.error(), Some(ServiceError::CharacteristicReadError));

    let err = info
        .write_characteristic(name.handle, [0x01], WriteMode::WithResponse)
        .unwrap()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Write { .. }));
    assert_eq!(info.error(), Some(ServiceError::CharacteristicWriteError));
    assert_eq!(h.session.state(), SessionState::Discovered);
}

#[tokio::test(start_paused = true)]
async fn test_read_timeout_does_not_stall_the_queue() {
    let mock = MockTransport::builder(peripheral())
        .latency_for(MANUFACTURER_NAME, Duration::from_secs(2))
        .build();
    let config = SessionConfig::default().read_timeout(Duration::from_millis(500));
    let h = connect_with(mock, config).await;
    h.session.discover_services().unwrap().await.unwrap();
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let name = info.characteristic(DEVICE_NAME).unwrap();
    let maker = info.characteristic(MANUFACTURER_NAME).unwrap();

    let slow = info.read_characteristic(maker.handle).unwrap();
    let fast = info.read_characteristic(name.handle).unwrap();

    let err = slow.await.unwrap_err();
    assert!(matches!(
        err,
        Error::Read {
            source: TransportError::Timeout(limit),
            ..
        } if limit == Duration::from_millis(500)
    ));
    assert!(err.is_retryable());
    assert_eq!(fast.await.unwrap(), b"sensor");
    assert_eq!(h.session.metrics().reads.failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_jobs_complete_in_fifo_order_one_at_a_time() {
    let mock = MockTransport::builder(peripheral())
        .latency(Duration::from_millis(5))
        .latency_for(DEVICE_NAME, Duration::from_millis(80))
        .build();
    let h = connect_with(mock, SessionConfig::default()).await;
    h.session.discover_services().unwrap().await.unwrap();
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let name = info.characteristic(DEVICE_NAME).unwrap().handle;
    let maker = info.characteristic(MANUFACTURER_NAME).unwrap().handle;
    let mut events = h.session.subscribe();

    let order = [name, maker, name, maker, maker, name];
    let pending: Vec<_> = order
        .iter()
        .map(|handle| info.read_characteristic(*handle).unwrap())
        .collect();
    for p in pending {
        p.await.unwrap();
    }

    let completed: Vec<Handle> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::CharacteristicRead { characteristic, .. } => Some(characteristic),
            _ => None,
        })
        .collect();
    assert_eq!(completed, order);
    assert_eq!(h.mock.max_concurrency(), 1);
    assert!(h.session.metrics().max_queue_depth >= 5);
}

#[tokio::test]
async fn test_client_configuration_helpers() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let battery = detailed(&h, BATTERY_SERVICE).await;
    let heart = detailed(&h, HEART_RATE_SERVICE).await;
    let level = battery.characteristic(BATTERY_LEVEL).unwrap();
    let cccd = level.client_configuration().unwrap().handle;
    let mut events = h.session.subscribe();

    battery.enable_notifications(level.handle).unwrap().await.unwrap();
    assert_eq!(
        h.mock.value(CLIENT_CHARACTERISTIC_CONFIGURATION),
        Some(vec![0x01, 0x00])
    );
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::DescriptorWritten {
            service: battery.handle(),
            descriptor: cccd,
            value: vec![0x01, 0x00],
        }]
    );

    battery.disable_notifications(level.handle).unwrap().await.unwrap();
    assert_eq!(
        h.mock.value(CLIENT_CHARACTERISTIC_CONFIGURATION),
        Some(vec![0x00, 0x00])
    );

    let err = battery.enable_indications(level.handle).unwrap_err();
    assert_eq!(
        err.operation_reason(),
        Some(&OperationErrorReason::NotificationsUnsupported(level.handle))
    );

    let measurement = heart.characteristic(HEART_RATE_MEASUREMENT).unwrap();
    let err = heart.enable_notifications(measurement.handle).unwrap_err();
    assert_eq!(
        err.operation_reason(),
        Some(&OperationErrorReason::MissingClientConfiguration(measurement.handle))
    );
}

#[tokio::test]
async fn test_notification_updates_value() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let battery = detailed(&h, BATTERY_SERVICE).await;
    let level = battery.characteristic(BATTERY_LEVEL).unwrap();
    battery.enable_notifications(level.handle).unwrap().await.unwrap();
    let mut events = battery.events().unwrap();

    assert!(h.mock.notify(BATTERY_LEVEL, [0x09]));
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap();
    assert_eq!(
        event,
        Some(SessionEvent::CharacteristicChanged {
            service: battery.handle(),
            characteristic: level.handle,
            value: vec![0x09],
        })
    );
    assert_eq!(events.try_recv(), None);
    assert_eq!(battery.characteristic(BATTERY_LEVEL).unwrap().value, [0x09]);
    assert_eq!(h.session.metrics().notifications, 1);
}

#[tokio::test]
async fn test_notification_for_unknown_attribute_is_ignored() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let mut events = h.session.subscribe();

    // The battery service's details were never discovered.
    assert!(h.mock.notify(BATTERY_LEVEL, [0x42]));
    assert!(h.mock.notify_raw(gattkit_types::RemoteId(4242), [0x01]));
    settle().await;

    assert!(drain(&mut events).is_empty());
    assert_eq!(h.session.state(), SessionState::Discovered);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_fails_pending_jobs() {
    let mock = MockTransport::builder(peripheral())
        .latency_for(MANUFACTURER_NAME, Duration::from_secs(1))
        .build();
    let h = connect_with(mock, SessionConfig::default()).await;
    h.session.discover_services().unwrap().await.unwrap();
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let name = info.characteristic(DEVICE_NAME).unwrap().handle;
    let maker = info.characteristic(MANUFACTURER_NAME).unwrap().handle;

    let in_flight = info.read_characteristic(maker).unwrap();
    let queued = info
        .write_characteristic(name, [0x05], WriteMode::WithResponse)
        .unwrap();
    settle().await;

    h.session.disconnect();
    assert_eq!(h.session.state(), SessionState::Invalid);
    assert_eq!(info.state(), ServiceState::Invalid);

    assert!(matches!(in_flight.await, Err(Error::SessionInvalidated)));
    assert!(matches!(queued.await, Err(Error::SessionInvalidated)));

    // Let the abandoned transport request finish.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(info.characteristic(MANUFACTURER_NAME).unwrap().value.is_empty());
    assert!(info.characteristic(DEVICE_NAME).unwrap().value.is_empty());
    assert!(h.mock.is_closed());
    assert!(h.registry.is_empty());

    assert!(matches!(
        info.read_characteristic(name),
        Err(Error::SessionInvalidated)
    ));
    assert!(matches!(
        h.session.discover_services(),
        Err(Error::SessionInvalidated)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_value_is_applied_after_disconnect() {
    for _ in 0..50 {
        let h = discovered(MockTransport::new(peripheral())).await;
        let info = detailed(&h, DEVICE_INFO_SERVICE).await;
        let maker = info.characteristic(MANUFACTURER_NAME).unwrap().handle;
        let mut events = h.session.subscribe();

        let reads: Vec<_> = (0..8)
            .map(|_| info.read_characteristic(maker).unwrap())
            .collect();
        tokio::task::yield_now().await;
        h.session.disconnect();

        let mut succeeded = 0;
        for read in reads {
            match read.await {
                Ok(value) => {
                    assert_eq!(value, b"acme");
                    succeeded += 1;
                }
                Err(Error::SessionInvalidated) => {}
                Err(other) => panic!("unexpected read error: {other}"),
            }
        }

        let events = drain(&mut events);
        let invalid_at = events
            .iter()
            .position(|e| {
                *e == SessionEvent::StateChanged {
                    state: SessionState::Invalid,
                }
            })
            .unwrap();
        let is_read = |e: &&SessionEvent| matches!(e, SessionEvent::CharacteristicRead { .. });
        assert_eq!(events[invalid_at..].iter().filter(is_read).count(), 0);
        assert_eq!(events[..invalid_at].iter().filter(is_read).count(), succeeded);
    }
}

#[tokio::test]
async fn test_remote_disconnect_invalidates_every_service() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let services = h.session.services();
    let mut events = h.session.subscribe();

    assert!(h.mock.drop_link(DisconnectReason::LinkLoss));
    h.session.wait_for_state(SessionState::Invalid).await.unwrap();

    assert!(services.iter().all(|s| s.state() == ServiceState::Invalid));
    let events = drain(&mut events);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(
                e,
                SessionEvent::ServiceStateChanged {
                    state: ServiceState::Invalid,
                    ..
                }
            ))
            .count(),
        3
    );
    assert_eq!(
        events.last(),
        Some(&SessionEvent::Disconnected {
            reason: DisconnectReason::LinkLoss
        })
    );

    // Cached details stay readable; operations do not.
    assert_eq!(info.characteristics().len(), 2);
    assert!(matches!(info.discover_details(), Err(Error::SessionInvalidated)));
    settle().await;
    assert!(h.registry.is_empty());
    assert!(!h.mock.requests().contains(&MockRequest::Close));
}

#[tokio::test]
async fn test_transport_failure_invalidates_session() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let mut events = h.session.subscribe();

    assert!(h.mock.fail_link(TransportError::Other("controller reset".into())));
    h.session.wait_for_state(SessionState::Invalid).await.unwrap();

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::SessionError { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Disconnected {
            reason: DisconnectReason::Failed(_)
        }
    )));
}

#[tokio::test]
async fn test_drop_closes_session_once() {
    let h = discovered(MockTransport::new(peripheral())).await;
    let info = detailed(&h, DEVICE_INFO_SERVICE).await;
    let mut events = h.session.subscribe();
    let Harness {
        mock,
        registry,
        session,
    } = h;

    session.disconnect();
    session.disconnect();
    drop(session);
    settle().await;

    let disconnects = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Disconnected { .. }))
        .count();
    assert_eq!(disconnects, 1);
    assert!(registry.is_empty());
    assert_eq!(mock.count(|r| *r == MockRequest::Close), 1);

    // Views outlive the session without keeping it alive.
    assert_eq!(info.state(), ServiceState::Invalid);
    assert!(info.characteristics().is_empty());
    assert!(matches!(info.events(), Err(Error::SessionInvalidated)));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let first = discovered(MockTransport::new(peripheral())).await;
    let second = discovered(MockTransport::new(peripheral())).await;
    assert_ne!(first.session.token(), second.session.token());

    let a = first.session.service(BATTERY_SERVICE).unwrap();
    let b = second.session.service(BATTERY_SERVICE).unwrap();
    assert_eq!(a.handle(), b.handle());
    assert_ne!(a, b);

    drop(first);
    settle().await;
    assert_eq!(a.state(), ServiceState::Invalid);
    assert_eq!(b.state(), ServiceState::DiscoveryRequired);
    b.discover_details().unwrap().await.unwrap();
}
