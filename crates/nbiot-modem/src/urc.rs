//! Time-boxed collection of unsolicited result codes.

use crate::clock::Clock;
use crate::error::ModemResult;
use crate::executor::CommandExecutor;
use crate::transport::Transport;
use nbiot_metrics::metric_defs;
use std::time::Duration;
use tracing::debug;

/// Raw URC lines in arrival order.
pub type UrcBatch = Vec<String>;

/// Reads every line the modem prints during a fixed window.
pub struct UrcCollector<'a, T, C> {
    executor: &'a mut CommandExecutor<T, C>,
}

impl<'a, T: Transport, C: Clock> UrcCollector<'a, T, C> {
    /// Collect through `executor`'s transport.
    pub fn new(executor: &'a mut CommandExecutor<T, C>) -> Self {
        UrcCollector { executor }
    }

    /// Collect non-empty lines until `window` has elapsed.
    ///
    /// A line that only completes after the window closed is dropped, so the
    /// call returns at most one line read past the deadline.
    pub fn collect_for(&mut self, window: Duration) -> ModemResult<UrcBatch> {
        let started = self.executor.clock().now();
        let mut batch = UrcBatch::new();

        while self.executor.clock().elapsed_since(started) < window {
            let Some(line) = self.executor.read_text()? else {
                continue;
            };
            if line.is_empty() {
                continue;
            }

            let elapsed = self.executor.clock().elapsed_since(started);
            if elapsed > window {
                debug!("Dropping `{}`: arrived {:?} after the window", line, elapsed - window);
                break;
            }
            batch.push(line);
        }

        let labels = self.executor.port_labels();
        metrics::counter!(metric_defs::URC_LINES.name, &labels)
            .increment(batch.len() as u64);
        debug!("Collected {} URC lines in {:?}", batch.len(), window);

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, MockTransport};

    fn setup() -> (MockTransport, CommandExecutor<MockTransport, ManualClock>) {
        let clock = ManualClock::new();
        let transport = MockTransport::with_clock(clock.clone());
        let executor = CommandExecutor::with_clock(transport.clone(), clock);
        (transport, executor)
    }

    #[test]
    fn test_collects_lines_inside_window() {
        let (transport, mut executor) = setup();
        let step = Duration::from_millis(500);
        for i in 1..=6 {
            transport.push_line_after(step, &format!("+CSCON: {}", i % 2));
        }

        let batch = UrcCollector::new(&mut executor)
            .collect_for(Duration::from_secs(2))
            .unwrap();
        assert_eq!(batch, vec!["+CSCON: 1", "+CSCON: 0", "+CSCON: 1", "+CSCON: 0"]);
        assert_eq!(transport.pending(), 2);
    }

    #[test]
    fn test_skips_empty_and_undecodable_lines() {
        let (transport, mut executor) = setup();
        transport.push_line("");
        transport.push_raw(&[0xC3, 0x28, b'\r']);
        transport.push_line("+NPING: \"8.8.8.8\",53,120");

        let batch = UrcCollector::new(&mut executor)
            .collect_for(Duration::from_secs(3))
            .unwrap();
        assert_eq!(batch, vec!["+NPING: \"8.8.8.8\",53,120"]);
        assert_eq!(executor.decode_errors(), 1);
    }

    #[test]
    fn test_late_line_is_dropped() {
        let (transport, mut executor) = setup();
        transport.push_line_after(Duration::from_millis(2500), "+CSCON: 1");

        let batch = UrcCollector::new(&mut executor)
            .collect_for(Duration::from_secs(2))
            .unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_zero_window_reads_nothing() {
        let (transport, mut executor) = setup();
        transport.push_line("+CSCON: 1");

        let batch = UrcCollector::new(&mut executor)
            .collect_for(Duration::ZERO)
            .unwrap();
        assert!(batch.is_empty());
        assert_eq!(transport.pending(), 1);
    }
}
