//! Shared helpers for command implementations.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use gattkit_cli::profile::Profile;
use gattkit_core::{CharacteristicInfo, DiscoveryMode, MockTransport, ServiceView, Session};
use gattkit_types::Handle;
use gattkit_types::uuid::parse_uuid;

use crate::cli::{AttributeArgs, SessionArgs};
use crate::config::{Config, resolve_profile, resolve_session};

/// A session over a simulated peripheral.
pub struct Simulation {
    pub profile: Profile,
    pub transport: Arc<MockTransport>,
    pub session: Session,
}

/// Load the profile and open a session over it.
pub async fn open_simulation(args: &SessionArgs, config: &Config) -> Result<Simulation> {
    let profile = match resolve_profile(args.profile.clone(), config) {
        Some(path) => Profile::load(&path)?,
        None => {
            debug!("no profile given, using the demo peripheral");
            Profile::demo()?
        }
    };
    let session_config = resolve_session(args, config)?;
    let transport = Arc::new(profile.transport()?);

    info!(address = profile.address(), "connecting");
    let session = Session::builder(transport.clone())
        .config(session_config)
        .connect(profile.address())
        .await
        .with_context(|| format!("Failed to connect to {}", profile.address()))?;
    session
        .discover_services()?
        .await
        .context("Service discovery failed")?;

    Ok(Simulation {
        profile,
        transport,
        session,
    })
}

/// Find a service by UUID and discover its details.
pub async fn detailed_service(
    session: &Session,
    service: &str,
    mode: DiscoveryMode,
) -> Result<ServiceView> {
    let uuid = parse_uuid(service)?;
    let Some(view) = session.service(uuid) else {
        bail!("Service {service} not found on {}", session.address());
    };
    view.discover_details_with_mode(mode)?
        .await
        .with_context(|| format!("Failed to discover service {service}"))?;
    Ok(view)
}

/// Find a characteristic of a discovered service.
pub fn find_characteristic(view: &ServiceView, characteristic: &str) -> Result<CharacteristicInfo> {
    let uuid = parse_uuid(characteristic)?;
    view.characteristic(uuid)
        .with_context(|| format!("Characteristic {characteristic} not found in {}", view.uuid()))
}

/// The attribute an [`AttributeArgs`] selects.
pub struct Selected {
    pub view: ServiceView,
    pub characteristic: CharacteristicInfo,
    pub descriptor: Option<Handle>,
}

impl Selected {
    /// Handle of the selected attribute.
    pub fn handle(&self) -> Handle {
        self.descriptor.unwrap_or(self.characteristic.handle)
    }
}

pub async fn select(session: &Session, target: &AttributeArgs) -> Result<Selected> {
    let view = detailed_service(session, &target.service, DiscoveryMode::default()).await?;
    let characteristic = find_characteristic(&view, &target.characteristic)?;
    let descriptor = match &target.descriptor {
        Some(text) => {
            let uuid = parse_uuid(text)?;
            let found = characteristic.descriptor(uuid).with_context(|| {
                format!("Descriptor {text} not found on {}", characteristic.uuid)
            })?;
            Some(found.handle)
        }
        None => None,
    };
    Ok(Selected {
        view,
        characteristic,
        descriptor,
    })
}

/// Parse hex bytes. Accepts an optional `0x` prefix and ` `, `:`, `-` or
/// `,` separators between bytes.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = body
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '-' | ','))
        .collect();
    if digits.is_empty() {
        bail!("Empty hex value");
    }
    if !digits.is_ascii() {
        bail!("Invalid hex value: {text}");
    }
    if digits.len() % 2 != 0 {
        bail!("Hex value has an odd number of digits: {text}");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("Invalid hex value: {text}"))
        })
        .collect()
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(parse_hex("01 02").unwrap(), vec![0x01, 0x02]);
        assert_eq!(parse_hex("0x0102ff").unwrap(), vec![0x01, 0x02, 0xff]);
        assert_eq!(parse_hex("de:ad:BE:EF").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(parse_hex(" 7 f ").unwrap(), vec![0x7f]);
    }

    #[test]
    fn test_parse_hex_rejects_garbage() {
        assert!(parse_hex("").is_err());
        assert!(parse_hex("0x").is_err());
        assert!(parse_hex("123").is_err());
        assert!(parse_hex("zz").is_err());
        assert!(parse_hex("é1").is_err());
    }

    #[test]
    fn test_parse_hex_rejects_multibyte_input() {
        // Even byte length, but the pair boundary falls inside `é`.
        let err = parse_hex("aé1").unwrap_err();
        assert!(err.to_string().contains("Invalid hex value"));
        assert!(parse_hex("01 ü2").is_err());
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(Some(&path), "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
