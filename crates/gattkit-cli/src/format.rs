//! Output formatting utilities for text and JSON output.

use std::fmt::Write as _;

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;

use gattkit_core::{CharacteristicInfo, DescriptorInfo, ServiceView, SessionMetricsSummary};
use gattkit_types::uuid::{self as uuids, as_u16};
use gattkit_types::{CharacteristicProperties, Handle, Uuid};

use crate::cli::ValueStyle;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
    /// How values are printed in text output.
    pub values: ValueStyle,
}

impl FormatOptions {
    pub fn new(no_color: bool, compact: bool, values: ValueStyle) -> Self {
        Self {
            no_color,
            compact,
            values,
        }
    }

    /// Serialize to JSON, honoring `compact`.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }

    fn value(&self, bytes: &[u8]) -> String {
        let text = format_value(bytes, self.values);
        if self.no_color {
            text
        } else {
            format!("{}", text.cyan())
        }
    }

    fn heading(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("{}", text.bold())
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("{}", text.dimmed())
        }
    }
}

// ============================================================================
// Values and names
// ============================================================================

/// Bytes as space-separated lowercase hex.
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// UTF-8 text if every character is printable.
fn printable(bytes: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(bytes).ok()?;
    (!text.is_empty() && text.chars().all(|c| !c.is_control())).then_some(text)
}

/// Format a value according to `style`.
#[must_use]
pub fn format_value(bytes: &[u8], style: ValueStyle) -> String {
    if bytes.is_empty() {
        return "(empty)".to_string();
    }
    match style {
        ValueStyle::Hex => hex(bytes),
        ValueStyle::Text => String::from_utf8_lossy(bytes).into_owned(),
        ValueStyle::Auto => match printable(bytes) {
            Some(text) => format!("{} \"{}\"", hex(bytes), text),
            None => hex(bytes),
        },
    }
}

/// Property names joined with `|`, in the form profiles accept.
#[must_use]
pub fn properties_label(properties: CharacteristicProperties) -> String {
    if properties.is_empty() {
        return "none".to_string();
    }
    properties
        .iter_names()
        .map(|(name, _)| name.to_ascii_lowercase().replace('_', "-"))
        .collect::<Vec<_>>()
        .join("|")
}

/// Name of a well-known UUID.
#[must_use]
pub fn uuid_name(uuid: &Uuid) -> Option<&'static str> {
    let name = match *uuid {
        u if u == uuids::GAP_SERVICE => "Generic Access",
        u if u == uuids::GATT_SERVICE => "Generic Attribute",
        u if u == uuids::DEVICE_INFO_SERVICE => "Device Information",
        u if u == uuids::HEART_RATE_SERVICE => "Heart Rate",
        u if u == uuids::BATTERY_SERVICE => "Battery",
        u if u == uuids::DEVICE_NAME => "Device Name",
        u if u == uuids::SERVICE_CHANGED => "Service Changed",
        u if u == uuids::BATTERY_LEVEL => "Battery Level",
        u if u == uuids::HEART_RATE_MEASUREMENT => "Heart Rate Measurement",
        u if u == uuids::MANUFACTURER_NAME => "Manufacturer Name String",
        u if u == uuids::CHARACTERISTIC_EXTENDED_PROPERTIES => "Characteristic Extended Properties",
        u if u == uuids::CHARACTERISTIC_USER_DESCRIPTION => "Characteristic User Description",
        u if u == uuids::CLIENT_CHARACTERISTIC_CONFIGURATION => {
            "Client Characteristic Configuration"
        }
        u if u == uuids::CHARACTERISTIC_PRESENTATION_FORMAT => "Characteristic Presentation Format",
        _ => return None,
    };
    Some(name)
}

/// Short form (`0x2a19`) for SIG UUIDs, full form otherwise.
#[must_use]
pub fn uuid_label(uuid: &Uuid) -> String {
    match as_u16(uuid) {
        Some(short) => format!("0x{short:04x}"),
        None => uuid.to_string(),
    }
}

fn named(uuid: &Uuid) -> String {
    match uuid_name(uuid) {
        Some(name) => format!("{} ({})", uuid_label(uuid), name),
        None => uuid_label(uuid),
    }
}

// ============================================================================
// Attribute reports
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DescriptorReport {
    pub handle: u32,
    pub uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'static str>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CharacteristicReport {
    pub handle: u32,
    pub uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'static str>,
    pub properties: String,
    pub value: Vec<u8>,
    pub descriptors: Vec<DescriptorReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub handle: u32,
    pub uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'static str>,
    pub kind: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub characteristics: Vec<CharacteristicReport>,
}

impl From<&DescriptorInfo> for DescriptorReport {
    fn from(info: &DescriptorInfo) -> Self {
        Self {
            handle: info.handle.get(),
            uuid: info.uuid,
            name: uuid_name(&info.uuid),
            value: info.value.clone(),
        }
    }
}

impl From<&CharacteristicInfo> for CharacteristicReport {
    fn from(info: &CharacteristicInfo) -> Self {
        Self {
            handle: info.handle.get(),
            uuid: info.uuid,
            name: uuid_name(&info.uuid),
            properties: properties_label(info.properties),
            value: info.value.clone(),
            descriptors: info.descriptors.iter().map(Into::into).collect(),
        }
    }
}

impl From<&ServiceView> for ServiceReport {
    fn from(view: &ServiceView) -> Self {
        Self {
            handle: view.handle().get(),
            uuid: view.uuid(),
            name: uuid_name(&view.uuid()),
            kind: format!("{:?}", view.kind()).to_ascii_lowercase(),
            state: view.state().to_string(),
            error: view.error().map(|e| e.to_string()),
            characteristics: view.characteristics().iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExploreJson<'a> {
    address: &'a str,
    mtu: u16,
    services: &'a [ServiceReport],
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<&'a SessionMetricsSummary>,
}

/// Attribute tree as JSON.
pub fn format_explore_json(
    address: &str,
    mtu: u16,
    services: &[ServiceReport],
    metrics: Option<&SessionMetricsSummary>,
    opts: &FormatOptions,
) -> Result<String> {
    opts.as_json(&ExploreJson {
        address,
        mtu,
        services,
        metrics,
    })
}

/// Attribute tree as indented text.
#[must_use]
pub fn format_explore_text(
    address: &str,
    mtu: u16,
    services: &[ServiceReport],
    show_values: bool,
    opts: &FormatOptions,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}",
        opts.heading(address),
        opts.dim(&format!("(MTU {mtu}, {} services)", services.len()))
    );

    for service in services {
        let _ = writeln!(
            out,
            "{} {} {}",
            opts.dim(&Handle::new(service.handle).to_string()),
            opts.heading(&format!("Service {}", named(&service.uuid))),
            opts.dim(&format!("[{}]", service.kind)),
        );
        if let Some(error) = &service.error {
            let label = format!("last error: {error}");
            let label = if opts.no_color {
                label
            } else {
                format!("{}", label.red())
            };
            let _ = writeln!(out, "    {label}");
        }

        for characteristic in &service.characteristics {
            let _ = writeln!(
                out,
                "  {} Characteristic {} [{}]",
                opts.dim(&Handle::new(characteristic.handle).to_string()),
                named(&characteristic.uuid),
                characteristic.properties,
            );
            if show_values && !characteristic.value.is_empty() {
                let _ = writeln!(out, "      = {}", opts.value(&characteristic.value));
            }
            for descriptor in &characteristic.descriptors {
                let _ = writeln!(
                    out,
                    "    {} Descriptor {}",
                    opts.dim(&Handle::new(descriptor.handle).to_string()),
                    named(&descriptor.uuid),
                );
                if show_values && !descriptor.value.is_empty() {
                    let _ = writeln!(out, "        = {}", opts.value(&descriptor.value));
                }
            }
        }
    }
    out
}

// ============================================================================
// Read / watch
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ValueReport {
    pub service: Uuid,
    pub characteristic: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<Uuid>,
    pub handle: u32,
    pub value: Vec<u8>,
    pub hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ValueReport {
    pub fn new(
        service: Uuid,
        characteristic: Uuid,
        descriptor: Option<Uuid>,
        handle: Handle,
        value: Vec<u8>,
    ) -> Self {
        Self {
            service,
            characteristic,
            descriptor,
            handle: handle.get(),
            hex: hex(&value),
            text: printable(&value).map(str::to_string),
            value,
        }
    }
}

/// A single read result. Text output is only the value so it pipes cleanly.
pub fn format_read(report: &ValueReport, json: bool, opts: &FormatOptions) -> Result<String> {
    if json {
        return opts.as_json(report);
    }
    Ok(format_value(&report.value, opts.values) + "\n")
}

/// One line per received update.
pub fn format_watch_line(
    sequence: usize,
    report: &ValueReport,
    json: bool,
    opts: &FormatOptions,
) -> Result<String> {
    if json {
        // one object per line
        let line = serde_json::to_string(report)?;
        return Ok(line + "\n");
    }
    let label = format!("[{sequence}]");
    Ok(format!(
        "{} {} {}\n",
        opts.dim(&label),
        Handle::new(report.handle),
        opts.value(&report.value)
    ))
}

/// Operation counters after a command.
#[must_use]
pub fn format_metrics_text(metrics: &SessionMetricsSummary, opts: &FormatOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", opts.heading("Session metrics"));
    for (label, op) in [
        ("discovery", &metrics.discovery),
        ("reads", &metrics.reads),
        ("writes", &metrics.writes),
    ] {
        let avg = op
            .avg_duration_ms
            .map(|ms| format!("{ms:.1} ms avg"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {label:<10} {} ok, {} failed, {avg}",
            op.success_count, op.failure_count
        );
    }
    let _ = writeln!(
        out,
        "  {:<10} {} read, {} written, {} notifications",
        "bytes", metrics.bytes_read, metrics.bytes_written, metrics.notifications
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> FormatOptions {
        FormatOptions::new(true, false, ValueStyle::Auto)
    }

    #[test]
    fn test_format_value_styles() {
        assert_eq!(format_value(b"hi", ValueStyle::Auto), "68 69 \"hi\"");
        assert_eq!(format_value(b"hi", ValueStyle::Hex), "68 69");
        assert_eq!(format_value(b"hi", ValueStyle::Text), "hi");
        assert_eq!(format_value(&[0x00, 0xff], ValueStyle::Auto), "00 ff");
        assert_eq!(format_value(&[], ValueStyle::Hex), "(empty)");
    }

    #[test]
    fn test_properties_label() {
        let props: CharacteristicProperties = "read|write-no-response|notify".parse().unwrap();
        assert_eq!(properties_label(props), "read|write-no-response|notify");
        assert_eq!(properties_label(CharacteristicProperties::empty()), "none");
        let back: CharacteristicProperties = properties_label(props).parse().unwrap();
        assert_eq!(back, props);
    }

    #[test]
    fn test_uuid_labels() {
        assert_eq!(uuid_label(&uuids::BATTERY_LEVEL), "0x2a19");
        assert_eq!(uuid_name(&uuids::BATTERY_LEVEL), Some("Battery Level"));
        let custom = Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0);
        assert_eq!(uuid_label(&custom), custom.to_string());
        assert_eq!(uuid_name(&custom), None);
    }

    fn battery_report() -> ServiceReport {
        ServiceReport {
            handle: 1,
            uuid: uuids::BATTERY_SERVICE,
            name: Some("Battery"),
            kind: "primary".to_string(),
            state: "discovered".to_string(),
            error: None,
            characteristics: vec![CharacteristicReport {
                handle: 2,
                uuid: uuids::BATTERY_LEVEL,
                name: Some("Battery Level"),
                properties: "read|notify".to_string(),
                value: vec![0x64],
                descriptors: vec![DescriptorReport {
                    handle: 3,
                    uuid: uuids::CLIENT_CHARACTERISTIC_CONFIGURATION,
                    name: Some("Client Characteristic Configuration"),
                    value: vec![0, 0],
                }],
            }],
        }
    }

    #[test]
    fn test_explore_text_tree() {
        let text = format_explore_text("sim:01", 23, &[battery_report()], true, &plain());
        assert!(text.starts_with("sim:01 (MTU 23, 1 services)\n"));
        assert!(text.contains("0x0001 Service 0x180f (Battery) [primary]"));
        assert!(text.contains("  0x0002 Characteristic 0x2a19 (Battery Level) [read|notify]"));
        assert!(text.contains("      = 64 \"d\""));
        assert!(text.contains("    0x0003 Descriptor 0x2902"));
        assert!(!text.contains('\u{1b}'));

        let bare = format_explore_text("sim:01", 23, &[battery_report()], false, &plain());
        assert!(!bare.contains(" = "));
    }

    #[test]
    fn test_explore_json_shape() {
        let opts = FormatOptions::new(true, true, ValueStyle::Auto);
        let json = format_explore_json("sim:01", 64, &[battery_report()], None, &opts).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["mtu"], 64);
        assert_eq!(parsed["services"][0]["characteristics"][0]["value"][0], 0x64);
        assert!(parsed.get("metrics").is_none());
        assert_eq!(json.lines().count(), 1);
    }

    #[test]
    fn test_read_and_watch_output() {
        let report = ValueReport::new(
            uuids::DEVICE_INFO_SERVICE,
            uuids::MANUFACTURER_NAME,
            None,
            Handle::new(4),
            b"acme".to_vec(),
        );
        assert_eq!(report.text.as_deref(), Some("acme"));
        assert_eq!(
            format_read(&report, false, &plain()).unwrap(),
            "61 63 6d 65 \"acme\"\n"
        );
        let line = format_watch_line(2, &report, false, &plain()).unwrap();
        assert_eq!(line, "[2] 0x0004 61 63 6d 65 \"acme\"\n");
        let json = format_watch_line(2, &report, true, &plain()).unwrap();
        assert!(json.contains("\"hex\":\"61 63 6d 65\""));
    }
}
