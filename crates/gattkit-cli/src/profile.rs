//! Simulated peripheral profiles.
//!
//! A profile is a TOML description of a peripheral's GATT database plus a
//! few simulation knobs. It is turned into a [`MockTransport`] so that every
//! command runs through a real session.
//!
//! ```toml
//! address = "C4:7C:8D:6A:10:01"
//! mtu = 185
//! latency_ms = 10
//!
//! [[services]]
//! uuid = "180f"
//!
//! [[services.characteristics]]
//! uuid = "2a19"
//! properties = "read|notify"
//! value = [87]
//! cccd = true
//!
//! [[script]]
//! after_ms = 500
//! characteristic = "2a19"
//! value = [86]
//!
//! [[failures]]
//! uuid = "2a29"
//! error = "insufficient authentication"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use gattkit_core::TransportError;
use gattkit_core::mock::{MockCharacteristic, MockPeripheral, MockService, MockTransport};
use gattkit_types::uuid::parse_uuid;
use gattkit_types::{CharacteristicProperties, Uuid};

/// Address used when a profile does not name one.
pub const DEFAULT_ADDRESS: &str = "sim:00:00:00:00:00";

/// Profile used when none is given on the command line or in the config.
pub const DEMO_PROFILE: &str = r#"
address = "sim:de:mo:00:00:01"
mtu = 64
latency_ms = 5

[[services]]
uuid = "180a"

[[services.characteristics]]
uuid = "2a29"
properties = "read"
text = "gattkit"

[[services.characteristics]]
uuid = "2a00"
properties = "read|write|write-no-response"
text = "demo sensor"

[[services.characteristics.descriptors]]
uuid = "2901"
text = "Device name"

[[services]]
uuid = "180f"

[[services.characteristics]]
uuid = "2a19"
properties = "read|notify"
value = [100]
cccd = true

[[script]]
after_ms = 200
characteristic = "2a19"
value = [99]

[[script]]
after_ms = 200
characteristic = "2a19"
value = [98]

[[script]]
after_ms = 200
characteristic = "2a19"
value = [97]
"#;

/// A simulated peripheral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Address the session is opened with.
    #[serde(default)]
    pub address: Option<String>,
    /// MTU reported as soon as the link opens.
    #[serde(default)]
    pub mtu: Option<u16>,
    /// Delay applied to every transport request.
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub services: Vec<ServiceProfile>,
    /// Value changes the peripheral pushes, in order.
    #[serde(default)]
    pub script: Vec<ScriptedUpdate>,
    /// Attributes whose requests fail.
    #[serde(default)]
    pub failures: Vec<FailureProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceProfile {
    pub uuid: String,
    /// Declared as an included rather than a primary service.
    #[serde(default)]
    pub included: bool,
    #[serde(default)]
    pub characteristics: Vec<CharacteristicProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CharacteristicProfile {
    pub uuid: String,
    /// Property names separated by `|` or `,`.
    #[serde(default)]
    pub properties: String,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
    #[serde(default)]
    pub text: Option<String>,
    /// Add a Client Characteristic Configuration descriptor.
    #[serde(default)]
    pub cccd: bool,
    #[serde(default)]
    pub descriptors: Vec<DescriptorProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DescriptorProfile {
    pub uuid: String,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedUpdate {
    /// Delay after the previous update (or after the watch starts).
    #[serde(default)]
    pub after_ms: u64,
    pub characteristic: String,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailureProfile {
    pub uuid: String,
    pub error: String,
}

/// A [`ScriptedUpdate`] with its fields resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub after: Duration,
    pub characteristic: Uuid,
    pub value: Vec<u8>,
}

fn payload(value: &Option<Vec<u8>>, text: &Option<String>, owner: &str) -> Result<Vec<u8>> {
    match (value, text) {
        (Some(_), Some(_)) => bail!("{owner}: set either `value` or `text`, not both"),
        (Some(bytes), None) => Ok(bytes.clone()),
        (None, Some(text)) => Ok(text.as_bytes().to_vec()),
        (None, None) => Ok(Vec::new()),
    }
}

fn uuid(text: &str) -> Result<Uuid> {
    parse_uuid(text).with_context(|| format!("Invalid UUID in profile: {text}"))
}

impl Profile {
    /// Load a profile from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid profile: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(content).context("Failed to parse profile")?;
        profile.validate()?;
        Ok(profile)
    }

    /// The built-in demo peripheral.
    pub fn demo() -> Result<Self> {
        Self::from_toml(DEMO_PROFILE)
    }

    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or(DEFAULT_ADDRESS)
    }

    /// Check everything that can be checked without a session.
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            bail!("Profile declares no services");
        }
        self.peripheral()?;
        self.updates()?;
        for failure in &self.failures {
            uuid(&failure.uuid)?;
        }
        Ok(())
    }

    /// The GATT database described by this profile.
    pub fn peripheral(&self) -> Result<MockPeripheral> {
        let mut peripheral = MockPeripheral::new();
        for service in &self.services {
            let service_uuid = uuid(&service.uuid)?;
            let mut mock = if service.included {
                MockService::included(service_uuid)
            } else {
                MockService::primary(service_uuid)
            };
            for characteristic in &service.characteristics {
                let properties: CharacteristicProperties =
                    characteristic.properties.parse().with_context(|| {
                        format!("Invalid properties for characteristic {}", characteristic.uuid)
                    })?;
                let value = payload(
                    &characteristic.value,
                    &characteristic.text,
                    &characteristic.uuid,
                )?;
                let mut built = MockCharacteristic::new(uuid(&characteristic.uuid)?, properties)
                    .value(value);
                for descriptor in &characteristic.descriptors {
                    let value = payload(&descriptor.value, &descriptor.text, &descriptor.uuid)?;
                    built = built.descriptor(uuid(&descriptor.uuid)?, value);
                }
                if characteristic.cccd {
                    built = built.with_cccd();
                }
                mock = mock.characteristic(built);
            }
            peripheral = peripheral.service(mock);
        }
        Ok(peripheral)
    }

    /// A transport simulating this profile.
    pub fn transport(&self) -> Result<MockTransport> {
        let mut builder = MockTransport::builder(self.peripheral()?)
            .latency(Duration::from_millis(self.latency_ms));
        if let Some(mtu) = self.mtu {
            builder = builder.mtu(mtu);
        }
        for failure in &self.failures {
            builder = builder.fail(
                uuid(&failure.uuid)?,
                TransportError::Rejected(failure.error.clone()),
            );
        }
        Ok(builder.build())
    }

    /// The scripted updates, resolved.
    pub fn updates(&self) -> Result<Vec<Update>> {
        self.script
            .iter()
            .map(|update| {
                Ok(Update {
                    after: Duration::from_millis(update.after_ms),
                    characteristic: uuid(&update.characteristic)?,
                    value: payload(&update.value, &update.text, &update.characteristic)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use gattkit_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_NAME};

    use super::*;

    #[test]
    fn test_demo_profile_is_valid() {
        let profile = Profile::demo().unwrap();
        assert_eq!(profile.address(), "sim:de:mo:00:00:01");
        assert_eq!(profile.services.len(), 2);
        assert_eq!(profile.updates().unwrap().len(), 3);

        let transport = profile.transport().unwrap();
        assert_eq!(transport.value(DEVICE_NAME), Some(b"demo sensor".to_vec()));
        assert_eq!(transport.value(BATTERY_LEVEL), Some(vec![100]));
    }

    #[test]
    fn test_minimal_profile() {
        let profile = Profile::from_toml(
            r#"
            [[services]]
            uuid = "0x180F"
            [[services.characteristics]]
            uuid = "2A19"
            properties = "read"
            "#,
        )
        .unwrap();
        assert_eq!(profile.address(), DEFAULT_ADDRESS);
        let peripheral = profile.peripheral().unwrap();
        assert_eq!(peripheral.services[0].uuid, BATTERY_SERVICE);
        assert_eq!(
            peripheral.services[0].characteristics[0].properties,
            CharacteristicProperties::READ
        );
        assert!(profile.updates().unwrap().is_empty());
    }

    #[test]
    fn test_profile_rejects_bad_input() {
        assert!(Profile::from_toml("").is_err());
        assert!(
            Profile::from_toml(
                r#"
                [[services]]
                uuid = "not-a-uuid"
                "#
            )
            .is_err()
        );
        assert!(
            Profile::from_toml(
                r#"
                [[services]]
                uuid = "180f"
                [[services.characteristics]]
                uuid = "2a19"
                properties = "read|teleport"
                "#
            )
            .is_err()
        );
        let both = Profile::from_toml(
            r#"
            [[services]]
            uuid = "180f"
            [[services.characteristics]]
            uuid = "2a19"
            value = [1]
            text = "one"
            "#,
        )
        .unwrap_err();
        assert!(format!("{both:#}").contains("not both"));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = Profile::from_toml(
            r#"
            latency = 5
            [[services]]
            uuid = "180f"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("latency"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("battery.toml");
        fs::write(&path, DEMO_PROFILE).unwrap();
        assert_eq!(Profile::load(&path).unwrap(), Profile::demo().unwrap());
        assert!(Profile::load(&dir.path().join("missing.toml")).is_err());
    }
}
