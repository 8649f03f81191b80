//! Modem configuration.
//!
//! Loaded from YAML; every field is optional and falls back to the default
//! below.
//!
//! ```yaml
//! port: /dev/ttyUSB0
//! baud_rate: 9600
//! apn: telenor.iot
//! mccmnc: 24201
//! response_timeout_ms: null   # no default deadline
//! failure_policy: continue
//! ```

use crate::error::{ModemError, ModemResult};
use crate::executor::ExecutorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What `connect()` does when a step reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failed step.
    #[default]
    Abort,
    /// Log the failure and run the remaining steps.
    Continue,
}

/// Connection and timing parameters for one modem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Serial device path.
    pub port: String,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Inactivity bound of a single line read, in milliseconds.
    pub read_timeout_ms: u64,
    /// Access Point Name for the PDP context.
    pub apn: String,
    /// Operator to select (MCC followed by MNC).
    pub mccmnc: u32,
    /// Local UDP port for the session socket.
    pub socket_port: u16,
    /// Default response deadline in milliseconds; `None` waits forever for
    /// commands without a catalog timeout.
    pub response_timeout_ms: Option<u64>,
    /// Pause after an empty line, in milliseconds.
    pub empty_line_backoff_ms: u64,
    /// Ceiling for the attach wait, in milliseconds.
    pub attach_timeout_ms: u64,
    /// Delay between attach polls, in milliseconds.
    pub attach_poll_interval_ms: u64,
    /// Connect failure handling.
    pub failure_policy: FailurePolicy,
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemConfig {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 9600,
            read_timeout_ms: 5000,
            apn: "telenor.iot".to_string(),
            mccmnc: 24201,
            socket_port: 9000,
            response_timeout_ms: Some(30_000),
            empty_line_backoff_ms: 100,
            attach_timeout_ms: 180_000,
            attach_poll_interval_ms: 5000,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl ModemConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> ModemResult<Self> {
        let config: ModemConfig =
            serde_yaml::from_str(yaml).map_err(|e| ModemError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> ModemResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ModemError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject settings the driver cannot run with.
    pub fn validate(&self) -> ModemResult<()> {
        if self.port.trim().is_empty() {
            return Err(ModemError::Config("port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ModemError::Config("baud_rate must be positive".to_string()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ModemError::Config("read_timeout_ms must be positive".to_string()));
        }
        if self.attach_poll_interval_ms == 0 {
            return Err(ModemError::Config(
                "attach_poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the serial device path.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    /// Set the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the APN.
    pub fn with_apn(mut self, apn: impl Into<String>) -> Self {
        self.apn = apn.into();
        self
    }

    /// Set the operator.
    pub fn with_mccmnc(mut self, mccmnc: u32) -> Self {
        self.mccmnc = mccmnc;
        self
    }

    /// Set the local socket port.
    pub fn with_socket_port(mut self, socket_port: u16) -> Self {
        self.socket_port = socket_port;
        self
    }

    /// Set the default response deadline.
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout_ms = timeout.map(millis);
        self
    }

    /// Set the attach ceiling and poll interval.
    pub fn with_attach(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.attach_timeout_ms = millis(timeout);
        self.attach_poll_interval_ms = millis(poll_interval);
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }

    pub fn attach_poll_interval(&self) -> Duration {
        Duration::from_millis(self.attach_poll_interval_ms)
    }

    /// Executor tuning derived from this config.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            response_timeout: self.response_timeout_ms.map(Duration::from_millis),
            empty_line_backoff: Duration::from_millis(self.empty_line_backoff_ms),
        }
    }
}

/// Whole milliseconds, rounding up so a non-zero duration never becomes 0.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}
