//! Metrics for the NB-IoT modem driver.
//!
//! This crate declares every metric the driver records as a structured
//! [`Metric`] constant, and re-exports the `metrics` crate so callers record
//! against the same facade. Nothing is recorded unless the host application
//! installs a recorder; without one every call is a no-op.
//!
//! # Example
//!
//! ```rust,ignore
//! use nbiot_metrics::{describe_metrics, metric_defs, MetricLabels};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new("/dev/ttyACM0").with_command("CGATT?");
//! metrics::counter!(metric_defs::AT_COMMANDS_SENT.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Which `metrics` macro records a [`Metric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and metadata of one recorded series, declared as a `const`:
///
/// ```rust
/// use nbiot_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const LINES_READ: Metric = Metric::counter("nbiot.at.lines_read")
///     .with_description("Lines read from the modem")
///     .with_unit(Unit::Count)
///     .with_labels(&["port"]);
///
/// assert_eq!(LINES_READ.name, "nbiot.at.lines_read");
/// assert_eq!(LINES_READ.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Dotted name, `nbiot.<area>.<what>`.
    pub name: &'static str,
    pub kind: MetricKind,
    /// Text handed to the recorder by [`Metric::describe`].
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Label keys every recording of this metric carries.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn of_kind(kind: MetricKind, name: &'static str) -> Self {
        Metric {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self::of_kind(MetricKind::Counter, name)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::of_kind(MetricKind::Gauge, name)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::of_kind(MetricKind::Histogram, name)
    }

    pub const fn with_description(self, description: &'static str) -> Self {
        Metric { description, ..self }
    }

    pub const fn with_unit(self, unit: Unit) -> Self {
        Metric {
            unit: Some(unit),
            ..self
        }
    }

    pub const fn with_labels(self, labels: &'static [&'static str]) -> Self {
        Metric { labels, ..self }
    }

    /// Hand name, unit and description to the global recorder.
    ///
    /// A no-op until a recorder is installed.
    pub fn describe(&self) {
        let (name, text) = (self.name, self.description);
        match self.kind {
            MetricKind::Counter => match self.unit {
                Some(unit) => describe_counter!(name, unit, text),
                None => describe_counter!(name, text),
            },
            MetricKind::Gauge => match self.unit {
                Some(unit) => describe_gauge!(name, unit, text),
                None => describe_gauge!(name, text),
            },
            MetricKind::Histogram => match self.unit {
                Some(unit) => describe_histogram!(name, unit, text),
                None => describe_histogram!(name, text),
            },
        }
    }
}

/// All metric definitions for the driver.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on every command-scoped metric.
    pub const COMMAND_LABELS: &[&str] = &["port", "command"];

    /// Labels present on link-scoped metrics.
    pub const PORT_LABELS: &[&str] = &["port"];

    // ========================================================================
    // Command Executor
    // ========================================================================

    /// AT commands written to the modem.
    pub const AT_COMMANDS_SENT: Metric = Metric::counter("nbiot.at.commands_sent")
        .with_description("AT commands written to the modem")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Commands that ended with an `ERROR` line.
    pub const AT_COMMAND_FAILURES: Metric = Metric::counter("nbiot.at.command_failures")
        .with_description("AT commands answered with ERROR")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Commands that hit their response deadline.
    pub const AT_RESPONSE_TIMEOUTS: Metric = Metric::counter("nbiot.at.response_timeouts")
        .with_description("AT commands that never produced a terminal line")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Time from writing a command to its terminal line.
    pub const AT_COMMAND_DURATION: Metric = Metric::histogram("nbiot.at.command_duration_ms")
        .with_description("Time from command write to terminal line")
        .with_unit(Unit::Milliseconds)
        .with_labels(COMMAND_LABELS);

    /// Lines dropped because they were not valid text.
    ///
    /// Link noise shows up here long before it shows up as failed commands.
    pub const AT_DECODE_ERRORS: Metric = Metric::counter("nbiot.at.decode_errors")
        .with_description("Response lines discarded as undecodable")
        .with_unit(Unit::Count)
        .with_labels(PORT_LABELS);

    // ========================================================================
    // Attach Poller / URC Collector
    // ========================================================================

    /// Attachment status polls issued.
    pub const ATTACH_POLLS: Metric = Metric::counter("nbiot.attach.polls")
        .with_description("Attachment status polls issued")
        .with_unit(Unit::Count)
        .with_labels(PORT_LABELS);

    /// Time taken to attach to the network.
    pub const ATTACH_DURATION: Metric = Metric::histogram("nbiot.attach.duration_ms")
        .with_description("Time from first poll to confirmed attachment")
        .with_unit(Unit::Milliseconds)
        .with_labels(PORT_LABELS);

    /// Unsolicited result codes collected.
    pub const URC_LINES: Metric = Metric::counter("nbiot.urc.lines")
        .with_description("Unsolicited result code lines collected")
        .with_unit(Unit::Count)
        .with_labels(PORT_LABELS);

    // ========================================================================
    // Session
    // ========================================================================

    /// Whether a socket is currently bound on the modem (0 or 1).
    pub const SESSION_SOCKET_BOUND: Metric = Metric::gauge("nbiot.session.socket_bound")
        .with_description("Whether a UDP socket is currently bound")
        .with_labels(PORT_LABELS);

    /// Payload bytes handed to the modem for transmission.
    pub const SESSION_TX_BYTES: Metric = Metric::counter("nbiot.session.tx_bytes")
        .with_description("Payload bytes handed to the modem for transmission")
        .with_unit(Unit::Bytes)
        .with_labels(PORT_LABELS);

    /// Every metric declared by the driver.
    pub const ALL: &[&Metric] = &[
        &AT_COMMANDS_SENT,
        &AT_COMMAND_FAILURES,
        &AT_RESPONSE_TIMEOUTS,
        &AT_COMMAND_DURATION,
        &AT_DECODE_ERRORS,
        &ATTACH_POLLS,
        &ATTACH_DURATION,
        &URC_LINES,
        &SESSION_SOCKET_BOUND,
        &SESSION_TX_BYTES,
    ];
}

/// Label set attached to driver metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    /// Transport endpoint (serial port path or TCP address).
    pub port: String,
    /// Command body, when the metric is command-scoped.
    pub command: Option<String>,
}

impl MetricLabels {
    /// Create labels for a transport endpoint.
    pub fn new(port: impl Into<String>) -> Self {
        MetricLabels {
            port: port.into(),
            command: None,
        }
    }

    /// Attach a command label.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Convert to the label pairs expected by the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![("port", self.port.clone())];
        if let Some(ref command) = self.command {
            labels.push(("command", command.clone()));
        }
        labels
    }
}

/// Describe all driver metrics to the installed recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_labels() {
        let labels = MetricLabels::new("/dev/ttyACM0");
        assert_eq!(labels.to_labels(), vec![("port", "/dev/ttyACM0".to_string())]);
    }

    #[test]
    fn test_command_labels() {
        let labels = MetricLabels::new("/dev/ttyACM0").with_command("CGATT?");
        let label_vec = labels.to_labels();

        assert_eq!(label_vec.len(), 2);
        assert!(label_vec.contains(&("command", "CGATT?".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::AT_COMMANDS_SENT.name, "nbiot.at.commands_sent");
        assert_eq!(metric_defs::AT_COMMANDS_SENT.kind, MetricKind::Counter);
        assert_eq!(metric_defs::AT_COMMAND_DURATION.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::AT_COMMAND_DURATION.unit, Some(Unit::Milliseconds));
        assert_eq!(metric_defs::SESSION_SOCKET_BOUND.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::AT_DECODE_ERRORS.labels, &["port"]);
    }

    #[test]
    fn test_all_metrics_unique() {
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_builder_defaults_are_empty() {
        const BARE: Metric = Metric::gauge("nbiot.test.bare");

        assert_eq!(BARE.kind, MetricKind::Gauge);
        assert!(BARE.description.is_empty());
        assert!(BARE.unit.is_none());
        assert!(BARE.labels.is_empty());
    }

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed: describing must be a harmless no-op.
        describe_metrics();
    }
}
