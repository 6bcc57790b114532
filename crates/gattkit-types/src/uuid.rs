//! Well-known Bluetooth SIG UUIDs and 16-bit UUID helpers.
//!
//! Only the handful of UUIDs the session engine itself needs (or that are
//! useful for tests and the CLI) live here; full name tables are out of scope.

use uuid::{Uuid, uuid};

use crate::error::ParseError;

/// The Bluetooth Base UUID (`00000000-0000-1000-8000-00805f9b34fb`).
pub const BASE_UUID: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

const BASE_TAIL: [u8; 8] = [0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb];

/// Expand a 16-bit SIG-assigned number into a full 128-bit UUID.
///
/// ```
/// use gattkit_types::uuid::{uuid_from_u16, BATTERY_SERVICE};
///
/// assert_eq!(uuid_from_u16(0x180f), BATTERY_SERVICE);
/// ```
#[must_use]
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_fields(short as u32, 0x0000, 0x1000, &BASE_TAIL)
}

/// Shorten a UUID to its 16-bit SIG form, if it is built on the Base UUID.
#[must_use]
pub fn as_u16(uuid: &Uuid) -> Option<u16> {
    let (d1, d2, d3, d4) = uuid.as_fields();
    if d2 == 0x0000 && d3 == 0x1000 && *d4 == BASE_TAIL {
        u16::try_from(d1).ok()
    } else {
        None
    }
}

/// Parse either a 16-bit short form (`"180f"`, `"0x2A19"`) or a full
/// hyphenated 128-bit UUID.
pub fn parse_uuid(text: &str) -> Result<Uuid, ParseError> {
    let trimmed = text.trim();
    let short = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if short.len() <= 4 {
        return u16::from_str_radix(short, 16)
            .map(uuid_from_u16)
            .map_err(|_| ParseError::InvalidUuid(text.to_string()));
    }
    Uuid::parse_str(trimmed).map_err(|_| ParseError::InvalidUuid(text.to_string()))
}

// --- Standard service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid_from_u16(0x1800);

/// Generic Attribute Profile (GATT) service.
pub const GATT_SERVICE: Uuid = uuid_from_u16(0x1801);

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid_from_u16(0x180a);

/// Heart Rate service.
pub const HEART_RATE_SERVICE: Uuid = uuid_from_u16(0x180d);

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid_from_u16(0x180f);

// --- Standard characteristic UUIDs ---

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = uuid_from_u16(0x2a00);

/// Service Changed characteristic.
pub const SERVICE_CHANGED: Uuid = uuid_from_u16(0x2a05);

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid_from_u16(0x2a19);

/// Heart Rate Measurement characteristic.
pub const HEART_RATE_MEASUREMENT: Uuid = uuid_from_u16(0x2a37);

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = uuid_from_u16(0x2a29);

// --- Standard descriptor UUIDs ---

/// Characteristic Extended Properties descriptor.
pub const CHARACTERISTIC_EXTENDED_PROPERTIES: Uuid = uuid_from_u16(0x2900);

/// Characteristic User Description descriptor.
pub const CHARACTERISTIC_USER_DESCRIPTION: Uuid = uuid_from_u16(0x2901);

/// Client Characteristic Configuration descriptor (CCCD).
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = uuid_from_u16(0x2902);

/// Characteristic Presentation Format descriptor.
pub const CHARACTERISTIC_PRESENTATION_FORMAT: Uuid = uuid_from_u16(0x2904);

// --- Client Characteristic Configuration values ---

/// CCCD value enabling notifications.
pub const CCCD_ENABLE_NOTIFICATION: [u8; 2] = [0x01, 0x00];

/// CCCD value enabling indications.
pub const CCCD_ENABLE_INDICATION: [u8; 2] = [0x02, 0x00];

/// CCCD value disabling both notifications and indications.
pub const CCCD_DISABLE: [u8; 2] = [0x00, 0x00];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_uuids() {
        assert_eq!(
            BATTERY_SERVICE.to_string(),
            "0000180f-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CLIENT_CHARACTERISTIC_CONFIGURATION.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(uuid_from_u16(0x0000), BASE_UUID);
    }

    #[test]
    fn test_as_u16_round_trip() {
        assert_eq!(as_u16(&BATTERY_LEVEL), Some(0x2a19));
        let vendor = uuid!("f0cd1400-95da-4f4b-9ac8-aa55d312af0c");
        assert_eq!(as_u16(&vendor), None);
    }

    #[test]
    fn test_as_u16_rejects_32_bit_aliases() {
        let wide = Uuid::from_fields(0x0001_180f, 0x0000, 0x1000, &BASE_TAIL);
        assert_eq!(as_u16(&wide), None);
    }

    #[test]
    fn test_parse_uuid_forms() {
        assert_eq!(parse_uuid("180f").unwrap(), BATTERY_SERVICE);
        assert_eq!(parse_uuid("0x2A19").unwrap(), BATTERY_LEVEL);
        assert_eq!(
            parse_uuid("0000180d-0000-1000-8000-00805f9b34fb").unwrap(),
            HEART_RATE_SERVICE
        );
        assert!(matches!(
            parse_uuid("zz"),
            Err(ParseError::InvalidUuid(_))
        ));
    }
}
