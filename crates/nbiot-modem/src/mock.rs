//! In-memory modem link and manual clock.
//!
//! [`MockTransport`] replays scripted response lines and can answer commands
//! from simple prefix rules, so a whole [`Session`](crate::Session) can be
//! driven without hardware. Paired with a [`ManualClock`], reads and sleeps
//! move simulated time instead of wall time.
//!
//! Both types are cheap handles over shared state: keep a clone in the test
//! and hand the other to the executor.

use crate::clock::Clock;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock whose time only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    /// Create a clock at offset zero.
    pub fn new() -> Self {
        ManualClock {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Total simulated time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}

#[derive(Debug)]
struct ScriptedLine {
    delay: Duration,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    responses: VecDeque<Vec<String>>,
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<ScriptedLine>,
    rules: Vec<Rule>,
    writes: Vec<String>,
    fail_writes: bool,
}

/// Scripted [`Transport`] for tests and dry runs.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    clock: Option<ManualClock>,
    idle_timeout: Duration,
}

impl MockTransport {
    /// A transport with no clock; reads take no simulated time.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState::default())),
            clock: None,
            idle_timeout: Duration::from_secs(1),
        }
    }

    /// A transport whose reads advance `clock`.
    pub fn with_clock(clock: ManualClock) -> Self {
        MockTransport {
            clock: Some(clock),
            ..MockTransport::new()
        }
    }

    /// Simulated time a read takes when nothing is queued.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Queue a text line (CRLF is added).
    pub fn push_line(&self, line: &str) {
        self.push_line_after(Duration::ZERO, line);
    }

    /// Queue several text lines.
    pub fn push_lines(&self, lines: &[&str]) {
        for line in lines {
            self.push_line(line);
        }
    }

    /// Queue a text line that arrives `delay` after the previous read.
    pub fn push_line_after(&self, delay: Duration, line: &str) {
        self.state.lock().script.push_back(ScriptedLine {
            delay,
            bytes: format!("{}\r", line).into_bytes(),
        });
    }

    /// Queue raw line bytes, which need not be valid text.
    pub fn push_raw(&self, bytes: &[u8]) {
        self.state.lock().script.push_back(ScriptedLine {
            delay: Duration::ZERO,
            bytes: bytes.to_vec(),
        });
    }

    /// Answer commands whose body starts with `prefix`.
    ///
    /// Each call adds one response; repeated commands consume them in order
    /// and the last one is repeated once the rest are used up.
    pub fn respond(&self, prefix: &str, lines: &[&str]) {
        let response: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        let mut state = self.state.lock();
        match state.rules.iter_mut().find(|r| r.prefix == prefix) {
            Some(rule) => rule.responses.push_back(response),
            None => state.rules.push(Rule {
                prefix: prefix.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
    }

    /// Make every subsequent write fail as if the link had dropped.
    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    /// Command bodies written so far, without `AT+` and CRLF.
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().writes.clone()
    }

    /// Lines still queued.
    pub fn pending(&self) -> usize {
        self.state.lock().script.len()
    }

    fn advance(&self, by: Duration) {
        if let Some(clock) = &self.clock {
            clock.advance(by);
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransport::new()
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock link down"));
        }

        let text = String::from_utf8_lossy(data);
        let body = text.trim_end_matches(['\r', '\n']);
        let body = body.strip_prefix("AT+").unwrap_or(body).to_string();

        let mut queued = Vec::new();
        if let Some(rule) = state.rules.iter_mut().find(|r| body.starts_with(&r.prefix)) {
            let response = if rule.responses.len() > 1 {
                rule.responses.pop_front()
            } else {
                rule.responses.front().cloned()
            };
            queued = response.unwrap_or_default();
        }
        for line in queued {
            state.script.push_back(ScriptedLine {
                delay: Duration::ZERO,
                bytes: format!("{}\r", line).into_bytes(),
            });
        }

        state.writes.push(body);
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let next = self.state.lock().script.pop_front();
        match next {
            Some(line) => {
                self.advance(line.delay);
                Ok(line.bytes)
            }
            None => {
                self.advance(self.idle_timeout);
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_secs(5));
        assert_eq!(clock.elapsed_since(start), Duration::from_secs(5));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn test_rule_answers_matching_command() {
        let mut transport = MockTransport::new();
        transport.respond("CIMI", &["", "242016000000001", "", "OK"]);

        transport.write_all(b"AT+CIMI\r\n").unwrap();
        assert_eq!(transport.writes(), vec!["CIMI".to_string()]);
        assert_eq!(transport.pending(), 4);
        assert_eq!(transport.read_line().unwrap(), b"\r");
        assert_eq!(transport.read_line().unwrap(), b"242016000000001\r");
    }

    #[test]
    fn test_rule_responses_in_order_then_sticky() {
        let mut transport = MockTransport::new();
        transport.respond("CGATT?", &["+CGATT: 0", "OK"]);
        transport.respond("CGATT?", &["+CGATT: 1", "OK"]);

        for expected in ["+CGATT: 0\r", "+CGATT: 1\r", "+CGATT: 1\r"] {
            transport.write_all(b"AT+CGATT?\r\n").unwrap();
            assert_eq!(transport.read_line().unwrap(), expected.as_bytes());
            assert_eq!(transport.read_line().unwrap(), b"OK\r");
        }
    }

    #[test]
    fn test_idle_read_advances_clock() {
        let clock = ManualClock::new();
        let mut transport =
            MockTransport::with_clock(clock.clone()).with_idle_timeout(Duration::from_millis(250));

        assert!(transport.read_line().unwrap().is_empty());
        assert_eq!(clock.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn test_failed_write() {
        let mut transport = MockTransport::new();
        transport.fail_writes();
        assert!(transport.write_all(b"AT+CFUN=1\r\n").is_err());
    }
}
