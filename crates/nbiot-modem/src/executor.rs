//! Command executor.
//!
//! Sends one rendered command and reads response lines until the command's
//! terminal marker or an error line appears. Per line:
//!
//! 1. undecodable bytes are counted and skipped
//! 2. empty lines back off briefly and retry
//! 3. `OK` marks success but keeps reading (some commands print their value
//!    or notification after it)
//! 4. `ERROR` / `+CME ERROR` fails the command immediately
//! 5. the capture pattern is tried until it first matches
//! 6. a line containing the terminal marker ends the command

use crate::clock::{Clock, SystemClock};
use crate::error::{ModemError, ModemResult};
use crate::transport::Transport;
use nbiot_at::{decode_text, Catalog, CommandId, Request, Response};
use nbiot_metrics::{metric_defs, MetricLabels};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Outcome of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `OK` was seen before any error line.
    pub success: bool,
    /// First value captured by the command's pattern.
    pub captured: Option<String>,
}

impl ExecutionResult {
    /// A failed result with nothing captured.
    pub fn failed() -> Self {
        ExecutionResult::default()
    }
}

/// Executor tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Default response deadline. `None` waits forever for a terminal line.
    pub response_timeout: Option<Duration>,
    /// Pause after an empty line before reading again.
    pub empty_line_backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            response_timeout: Some(Duration::from_secs(30)),
            empty_line_backoff: Duration::from_millis(100),
        }
    }
}

impl ExecutorConfig {
    /// Wait indefinitely for terminal lines.
    pub fn unbounded() -> Self {
        ExecutorConfig {
            response_timeout: None,
            ..Default::default()
        }
    }
}

/// Runs commands over an exclusively owned transport.
pub struct CommandExecutor<T, C = SystemClock> {
    transport: T,
    clock: C,
    catalog: Arc<Catalog>,
    config: ExecutorConfig,
    decode_errors: u64,
    port: String,
}

impl<T: Transport> CommandExecutor<T, SystemClock> {
    /// Create an executor on the wall clock with the standard catalog.
    pub fn new(transport: T) -> Self {
        CommandExecutor::with_clock(transport, SystemClock)
    }
}

impl<T: Transport, C: Clock> CommandExecutor<T, C> {
    /// Create an executor with an explicit clock and the standard catalog.
    pub fn with_clock(transport: T, clock: C) -> Self {
        let port = transport.name().to_string();
        CommandExecutor {
            transport,
            clock,
            catalog: Catalog::shared(),
            config: ExecutorConfig::default(),
            decode_errors: 0,
            port,
        }
    }

    /// Use a different catalog.
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Use different tuning.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// The clock driving deadlines and sleeps.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consume the executor, returning the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Lines discarded as undecodable since creation.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Response deadline that applies to `id`.
    pub fn effective_timeout(&self, id: CommandId) -> Option<Duration> {
        self.catalog
            .get(id)
            .and_then(|spec| spec.timeout)
            .or(self.config.response_timeout)
    }

    /// Execute a request under its normal deadline.
    pub fn execute(&mut self, request: &Request) -> ModemResult<ExecutionResult> {
        let timeout = self.effective_timeout(request.id);
        self.execute_within(request, timeout)
    }

    /// Execute a request under an explicit deadline (`None` = unbounded).
    pub fn execute_within(
        &mut self,
        request: &Request,
        timeout: Option<Duration>,
    ) -> ModemResult<ExecutionResult> {
        let catalog = Arc::clone(&self.catalog);
        let spec = catalog
            .get(request.id)
            .ok_or(ModemError::UnregisteredCommand(request.id))?;
        if request.text.is_empty() {
            return Err(ModemError::EmptyCommand(request.id));
        }

        let labels = MetricLabels::new(&self.port)
            .with_command(request.id.as_str())
            .to_labels();

        debug!("--> AT+{}", request.text);
        self.transport.write_all(&request.encode())?;
        metrics::counter!(metric_defs::AT_COMMANDS_SENT.name, &labels).increment(1);

        let started = self.clock.now();
        let mut result = ExecutionResult::default();

        loop {
            if let Some(limit) = timeout {
                let elapsed = self.clock.elapsed_since(started);
                if elapsed >= limit {
                    warn!("No terminal line for AT+{} after {:?}", request.text, elapsed);
                    metrics::counter!(metric_defs::AT_RESPONSE_TIMEOUTS.name, &labels)
                        .increment(1);
                    return Err(ModemError::ResponseTimeout {
                        command: request.text.clone(),
                        elapsed,
                    });
                }
            }

            let Some(line) = self.read_text()? else {
                continue;
            };
            if line.is_empty() {
                self.clock.sleep(self.config.empty_line_backoff);
                continue;
            }

            let response = Response::classify(&line);
            if response == Response::Ok {
                result.success = true;
            } else if response.is_failure() {
                debug!("<-- {} (AT+{} failed)", line, request.text);
                result.success = false;
                metrics::counter!(metric_defs::AT_COMMAND_FAILURES.name, &labels)
                    .increment(1);
                break;
            }

            if result.captured.is_none() {
                result.captured = spec.capture(&line);
            }

            if spec.is_terminal(&line) {
                break;
            }
        }

        let elapsed = self.clock.elapsed_since(started);
        metrics::histogram!(metric_defs::AT_COMMAND_DURATION.name, &labels)
            .record(elapsed.as_secs_f64() * 1000.0);
        debug!(
            "AT+{} finished: success={} captured={:?} in {:?}",
            request.text, result.success, result.captured, elapsed
        );

        Ok(result)
    }

    /// Read one line as text.
    ///
    /// Returns `Ok(None)` for an undecodable line, which is counted and
    /// traced but otherwise dropped. Empty text means nothing new arrived.
    pub(crate) fn read_text(&mut self) -> io::Result<Option<String>> {
        let raw = self.transport.read_line()?;
        match decode_text(&raw) {
            Some(text) => {
                if !text.is_empty() {
                    trace!("<-- {}", text);
                }
                Ok(Some(text))
            }
            None => {
                self.decode_errors += 1;
                warn!(
                    "Discarding undecodable line from {} ({} bytes, {} so far)",
                    self.port,
                    raw.len(),
                    self.decode_errors
                );
                let labels = MetricLabels::new(&self.port).to_labels();
                metrics::counter!(metric_defs::AT_DECODE_ERRORS.name, &labels)
                    .increment(1);
                Ok(None)
            }
        }
    }

    /// Metric labels for this executor's link.
    pub(crate) fn port_labels(&self) -> Vec<(&'static str, String)> {
        MetricLabels::new(&self.port).to_labels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, MockTransport};
    use nbiot_at::{Command, CommandSpec};

    fn executor(transport: &MockTransport) -> CommandExecutor<MockTransport, ManualClock> {
        CommandExecutor::with_clock(transport.clone(), ManualClock::new())
    }

    #[test]
    fn test_ok_without_capture() {
        let transport = MockTransport::new();
        transport.push_line("OK");
        let mut executor = executor(&transport);

        let result = executor.execute(&Command::RadioOn.to_request()).unwrap();
        assert_eq!(result, ExecutionResult { success: true, captured: None });
        assert_eq!(transport.writes(), vec!["CFUN=1".to_string()]);
    }

    #[test]
    fn test_error_stops_reading() {
        let transport = MockTransport::new();
        transport.push_lines(&["ERROR", "OK", "+CGATT: 1"]);
        let mut executor = executor(&transport);

        let result = executor.execute(&Command::AttachStatus.to_request()).unwrap();
        assert!(!result.success);
        assert_eq!(transport.pending(), 2);
    }

    #[test]
    fn test_cme_error_is_failure() {
        let transport = MockTransport::new();
        transport.push_line("+CME ERROR: 50");
        let mut executor = executor(&transport);

        let result = executor.execute(&Command::RadioOn.to_request()).unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_verbose_cme_error_is_failure() {
        let clock = ManualClock::new();
        let transport = MockTransport::with_clock(clock.clone());
        transport.push_lines(&["+CME ERROR: SIM failure", "OK"]);
        let mut executor = CommandExecutor::with_clock(transport.clone(), clock.clone());

        let result = executor.execute(&Command::RadioOn.to_request()).unwrap();
        assert!(!result.success);
        assert_eq!(transport.pending(), 1);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_capture_imei() {
        let transport = MockTransport::new();
        transport.push_lines(&["+CGSN: 123456789012345", "OK"]);
        let mut executor = executor(&transport);

        let result = executor.execute(&Command::Imei.to_request()).unwrap();
        assert_eq!(
            result,
            ExecutionResult {
                success: true,
                captured: Some("123456789012345".to_string())
            }
        );
    }

    #[test]
    fn test_first_capture_wins() {
        let transport = MockTransport::new();
        transport.push_lines(&["+CGATT: 0", "+CGATT: 1", "OK"]);
        let mut executor = executor(&transport);

        let result = executor.execute(&Command::AttachStatus.to_request()).unwrap();
        assert_eq!(result.captured.as_deref(), Some("0"));
    }

    #[test]
    fn test_empty_line_backs_off() {
        let clock = ManualClock::new();
        let transport = MockTransport::new();
        transport.push_lines(&["", "OK"]);
        let mut executor = CommandExecutor::with_clock(transport.clone(), clock.clone());

        let result = executor.execute(&Command::RadioOn.to_request()).unwrap();
        assert!(result.success);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(100)]);
    }

    #[test]
    fn test_undecodable_line_is_skipped() {
        let transport = MockTransport::new();
        transport.push_raw(&[0xFF, 0xFE, 0xFD, b'\r']);
        transport.push_line("OK");
        let mut executor = executor(&transport);

        let result = executor.execute(&Command::RadioOn.to_request()).unwrap();
        assert!(result.success);
        assert_eq!(executor.decode_errors(), 1);
    }

    #[test]
    fn test_ok_before_notification_keeps_reading() {
        let transport = MockTransport::new();
        transport.push_lines(&["REBOOTING", "OK", "", "+UFOTAS: 0,1"]);
        let mut executor = executor(&transport);

        let result = executor.execute(&Command::Reboot.to_request()).unwrap();
        assert!(result.success);
        assert_eq!(transport.pending(), 0);
    }

    #[test]
    fn test_unregistered_command_fails_fast() {
        let transport = MockTransport::new();
        transport.push_line("OK");
        let mut executor = executor(&transport).with_catalog(Arc::new(Catalog::new()));

        let err = executor.execute(&Command::RadioOn.to_request()).unwrap_err();
        assert!(matches!(err, ModemError::UnregisteredCommand(CommandId::RadioOn)));
        assert!(transport.writes().is_empty());
    }

    #[test]
    fn test_empty_command_rejected() {
        let transport = MockTransport::new();
        let mut executor = executor(&transport);

        let err = executor.execute(&Request::new(CommandId::Imsi, "")).unwrap_err();
        assert!(matches!(err, ModemError::EmptyCommand(CommandId::Imsi)));
        assert!(transport.writes().is_empty());
    }

    #[test]
    fn test_response_timeout() {
        let clock = ManualClock::new();
        let transport = MockTransport::with_clock(clock.clone());
        let mut executor = CommandExecutor::with_clock(transport, clock.clone()).with_config(
            ExecutorConfig {
                response_timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        );

        let err = executor.execute(&Command::Imsi.to_request()).unwrap_err();
        match err {
            ModemError::ResponseTimeout { command, elapsed } => {
                assert_eq!(command, "CIMI");
                assert!(elapsed >= Duration::from_secs(5));
                assert!(elapsed < Duration::from_secs(7));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_catalog_timeout_survives_unbounded_default() {
        let transport = MockTransport::new();
        let executor = executor(&transport).with_config(ExecutorConfig::unbounded());

        assert_eq!(executor.effective_timeout(CommandId::Imsi), None);
        assert_eq!(
            executor.effective_timeout(CommandId::Reboot),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_custom_terminal_and_capture() {
        let mut catalog = Catalog::new();
        catalog.register(
            CommandSpec::new(CommandId::Imsi)
                .with_terminal("DONE")
                .with_capture(r"^(\d{15})$")
                .unwrap(),
        );
        let transport = MockTransport::new();
        transport.push_lines(&["OK", "242016000000001", "DONE"]);
        let mut executor = executor(&transport).with_catalog(Arc::new(catalog));

        let result = executor.execute(&Command::Imsi.to_request()).unwrap();
        assert!(result.success);
        assert_eq!(result.captured.as_deref(), Some("242016000000001"));
    }

    #[test]
    fn test_write_failure_propagates() {
        let transport = MockTransport::new();
        transport.fail_writes();
        let mut executor = executor(&transport);

        let err = executor.execute(&Command::RadioOn.to_request()).unwrap_err();
        assert!(matches!(err, ModemError::Io(_)));
    }
}
