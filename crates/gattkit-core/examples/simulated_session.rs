//! Walk a simulated peripheral: discover everything, read every value and
//! watch a few notifications.

use std::sync::Arc;
use std::time::Duration;

use gattkit_core::mock::{MockCharacteristic, MockPeripheral, MockService};
use gattkit_core::{DiscoveryMode, MockTransport, Session, SessionEvent};
use gattkit_types::{CharacteristicProperties, uuid};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let peripheral = MockPeripheral::new()
        .service(
            MockService::primary(uuid::BATTERY_SERVICE).characteristic(
                MockCharacteristic::new(
                    uuid::BATTERY_LEVEL,
                    CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
                )
                .value([100])
                .with_cccd(),
            ),
        )
        .service(
            MockService::primary(uuid::DEVICE_INFO_SERVICE).characteristic(
                MockCharacteristic::new(uuid::MANUFACTURER_NAME, CharacteristicProperties::READ)
                    .value(*b"gattkit"),
            ),
        );
    let transport = Arc::new(
        MockTransport::builder(peripheral)
            .latency(Duration::from_millis(20))
            .mtu(185)
            .build(),
    );

    let session = Session::connect(transport.clone(), "sim:00:01").await?;
    session.discover_services()?.await?;
    println!("Session {} (MTU {})", session.token(), session.mtu());

    for service in session.services() {
        service
            .discover_details_with_mode(DiscoveryMode::FullDiscovery)?
            .await?;
        println!("Service {} [{}]", service.uuid(), service.handle());
        for characteristic in service.characteristics() {
            println!(
                "  {} [{}] {:?} = {:02x?}",
                characteristic.uuid, characteristic.handle, characteristic.properties, characteristic.value
            );
        }
    }

    let battery = session
        .service(uuid::BATTERY_SERVICE)
        .ok_or("battery service missing")?;
    let level = battery
        .characteristic(uuid::BATTERY_LEVEL)
        .ok_or("battery level missing")?;
    battery.enable_notifications(level.handle)?.await?;

    let mut events = battery.events()?;
    for percent in [99u8, 98, 97] {
        transport.notify(uuid::BATTERY_LEVEL, [percent]);
        if let Some(SessionEvent::CharacteristicChanged { value, .. }) = events.recv().await {
            println!("Battery: {}%", value[0]);
        }
    }

    println!("{:#?}", session.metrics());
    session.disconnect();
    Ok(())
}
