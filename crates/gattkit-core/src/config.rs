//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::job::JobKind;

/// Default timeout for opening the transport.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for one discovery step.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// ATT MTU before any exchange (Core Spec Vol 3, Part F, 3.2.8).
pub const DEFAULT_ATT_MTU: u16 = 23;

/// Timeouts and limits for one session.
///
/// Every transport request runs under the timeout for its kind; a request
/// that exceeds it completes as a failure and the queue moves on.
///
/// Durations serialize as whole milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for opening the transport.
    #[serde(with = "millis")]
    pub open_timeout: Duration,
    /// Timeout for one service, characteristic or descriptor discovery step.
    #[serde(with = "millis")]
    pub discovery_timeout: Duration,
    /// Timeout for one read.
    #[serde(with = "millis")]
    pub read_timeout: Duration,
    /// Timeout for one write.
    #[serde(with = "millis")]
    pub write_timeout: Duration,
    /// Capacity of the session's event broadcast channel.
    pub event_capacity: usize,
    /// MTU assumed until the transport reports a different one.
    pub default_mtu: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            default_mtu: DEFAULT_ATT_MTU,
        }
    }
}

impl SessionConfig {
    /// Create a new session config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for challenging RF environments.
    ///
    /// Uses longer timeouts to accommodate interference and distance.
    pub fn challenging_environment() -> Self {
        Self {
            open_timeout: Duration::from_secs(25),
            discovery_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            ..Self::default()
        }
    }

    /// Create a config for fast, reliable links.
    pub fn fast() -> Self {
        Self {
            open_timeout: Duration::from_secs(8),
            discovery_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Set the open timeout.
    #[must_use]
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the MTU assumed before the transport reports one.
    #[must_use]
    pub fn default_mtu(mut self, mtu: u16) -> Self {
        self.default_mtu = mtu;
        self
    }

    /// Check the configuration for values no session can run with.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("open_timeout", self.open_timeout),
            ("discovery_timeout", self.discovery_timeout),
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, t)| t.is_zero()) {
            return Err(Error::invalid_config(format!("{name} must be non-zero")));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be at least 1"));
        }
        if self.default_mtu < DEFAULT_ATT_MTU {
            return Err(Error::invalid_config(format!(
                "default_mtu must be at least {DEFAULT_ATT_MTU}, got {}",
                self.default_mtu
            )));
        }
        Ok(())
    }

    pub(crate) fn timeout_for(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::ServiceDiscovery
            | JobKind::CharacteristicDiscovery
            | JobKind::DescriptorDiscovery => self.discovery_timeout,
            JobKind::Read => self.read_timeout,
            JobKind::Write => self.write_timeout,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_mtu, 23);
        assert!(SessionConfig::fast().validate().is_ok());
        assert!(SessionConfig::challenging_environment().validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = SessionConfig::new()
            .read_timeout(Duration::from_millis(250))
            .write_timeout(Duration::from_millis(300))
            .default_mtu(185);
        assert_eq!(config.timeout_for(JobKind::Read), Duration::from_millis(250));
        assert_eq!(config.timeout_for(JobKind::Write), Duration::from_millis(300));
        assert_eq!(
            config.timeout_for(JobKind::DescriptorDiscovery),
            DEFAULT_DISCOVERY_TIMEOUT
        );
        assert_eq!(config.default_mtu, 185);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = SessionConfig::new()
            .read_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("read_timeout"));

        assert!(SessionConfig::new().event_capacity(0).validate().is_err());
        assert!(SessionConfig::new().default_mtu(20).validate().is_err());
    }

    #[test]
    fn test_serde_uses_millis_and_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"read_timeout": 1500, "default_mtu": 247}"#).unwrap();
        assert_eq!(config.read_timeout, Duration::from_millis(1500));
        assert_eq!(config.default_mtu, 247);
        assert_eq!(config.open_timeout, DEFAULT_OPEN_TIMEOUT);

        let json = serde_json::to_value(SessionConfig::fast()).unwrap();
        assert_eq!(json["open_timeout"], 8000);
    }
}
