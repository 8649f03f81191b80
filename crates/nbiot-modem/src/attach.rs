//! Network attach polling.

use crate::clock::Clock;
use crate::error::{ModemError, ModemResult};
use crate::executor::CommandExecutor;
use crate::transport::Transport;
use nbiot_at::{Command, CommandId};
use nbiot_metrics::metric_defs;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default ceiling for [`AttachPoller::wait_until_attached`].
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(180);

/// Default delay between attachment status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Repeats `AT+CGATT?` until the modem reports attachment.
pub struct AttachPoller<'a, T, C> {
    executor: &'a mut CommandExecutor<T, C>,
    interval: Duration,
}

impl<'a, T: Transport, C: Clock> AttachPoller<'a, T, C> {
    /// Poll through `executor` every [`DEFAULT_POLL_INTERVAL`].
    pub fn new(executor: &'a mut CommandExecutor<T, C>) -> Self {
        AttachPoller {
            executor,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the delay between polls.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Block until attached or until `max_duration` of wall time has passed.
    ///
    /// The ceiling is checked before every poll, and neither a poll nor the
    /// sleep after it is allowed to run past it. A poll that times out
    /// counts as "not attached yet".
    pub fn wait_until_attached(&mut self, max_duration: Duration) -> ModemResult<bool> {
        let request = Command::AttachStatus.to_request();
        let labels = self.executor.port_labels();
        let started = self.executor.clock().now();
        let mut polls: u32 = 0;

        loop {
            let elapsed = self.executor.clock().elapsed_since(started);
            if elapsed >= max_duration {
                warn!("Not attached after {:?} ({} polls)", elapsed, polls);
                return Err(ModemError::AttachTimeout { elapsed, polls });
            }
            let remaining = max_duration - elapsed;

            polls += 1;
            metrics::counter!(metric_defs::ATTACH_POLLS.name, &labels).increment(1);

            let timeout = match self.executor.effective_timeout(CommandId::AttachStatus) {
                Some(limit) => limit.min(remaining),
                None => remaining,
            };
            match self.executor.execute_within(&request, Some(timeout)) {
                Ok(result) => {
                    let attached = result
                        .captured
                        .as_deref()
                        .and_then(|flag| flag.parse::<u8>().ok())
                        .is_some_and(|flag| flag != 0);
                    if result.success && attached {
                        let elapsed = self.executor.clock().elapsed_since(started);
                        info!("Attached after {:?} ({} polls)", elapsed, polls);
                        metrics::histogram!(metric_defs::ATTACH_DURATION.name, &labels)
                            .record(elapsed.as_secs_f64() * 1000.0);
                        return Ok(true);
                    }
                    debug!("Poll {}: not attached ({:?})", polls, result.captured);
                }
                Err(ModemError::ResponseTimeout { elapsed, .. }) => {
                    debug!("Poll {}: no answer within {:?}", polls, elapsed);
                }
                Err(e) => return Err(e),
            }

            let remaining = max_duration.saturating_sub(self.executor.clock().elapsed_since(started));
            self.executor.clock().sleep(self.interval.min(remaining));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, MockTransport};

    fn setup() -> (MockTransport, ManualClock, CommandExecutor<MockTransport, ManualClock>) {
        let clock = ManualClock::new();
        let transport = MockTransport::with_clock(clock.clone());
        let executor = CommandExecutor::with_clock(transport.clone(), clock.clone());
        (transport, clock, executor)
    }

    #[test]
    fn test_attached_on_first_poll() {
        let (transport, clock, mut executor) = setup();
        transport.respond("CGATT?", &["+CGATT: 1", "OK"]);

        let attached = AttachPoller::new(&mut executor)
            .wait_until_attached(DEFAULT_ATTACH_TIMEOUT)
            .unwrap();
        assert!(attached);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_attached_on_third_poll() {
        let (transport, clock, mut executor) = setup();
        transport.respond("CGATT?", &["+CGATT: 0", "OK"]);
        transport.respond("CGATT?", &["+CGATT: 0", "OK"]);
        transport.respond("CGATT?", &["+CGATT: 1", "OK"]);

        assert!(AttachPoller::new(&mut executor)
            .wait_until_attached(DEFAULT_ATTACH_TIMEOUT)
            .unwrap());
        assert_eq!(transport.writes().len(), 3);
        assert_eq!(clock.sleeps(), vec![DEFAULT_POLL_INTERVAL; 2]);
    }

    #[test]
    fn test_error_reply_is_not_attached() {
        let (transport, _clock, mut executor) = setup();
        transport.respond("CGATT?", &["+CGATT: 1", "ERROR"]);
        transport.respond("CGATT?", &["+CGATT: 1", "OK"]);

        assert!(AttachPoller::new(&mut executor)
            .wait_until_attached(DEFAULT_ATTACH_TIMEOUT)
            .unwrap());
        assert_eq!(transport.writes().len(), 2);
    }

    #[test]
    fn test_ceiling_after_exact_poll_count() {
        let (transport, clock, mut executor) = setup();
        transport.respond("CGATT?", &["+CGATT: 0", "OK"]);

        let err = AttachPoller::new(&mut executor)
            .wait_until_attached(Duration::from_secs(180))
            .unwrap_err();
        match err {
            ModemError::AttachTimeout { elapsed, polls } => {
                assert_eq!(polls, 36);
                assert_eq!(elapsed, Duration::from_secs(180));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.writes().len(), 36);
        assert_eq!(clock.elapsed(), Duration::from_secs(180));
    }

    #[test]
    fn test_silent_modem_never_overruns_ceiling() {
        let (_transport, clock, mut executor) = setup();

        let err = AttachPoller::new(&mut executor)
            .with_interval(Duration::from_secs(1))
            .wait_until_attached(Duration::from_secs(12))
            .unwrap_err();
        assert!(matches!(err, ModemError::AttachTimeout { .. }));
        // One idle read past the ceiling at most.
        assert!(clock.elapsed() <= Duration::from_secs(13));
    }
}
