//! SARA-N2 NB-IoT Modem Driver
//!
//! Drives an NB-IoT modem over its AT command interface:
//!
//! - [`CommandExecutor`]: send one command, read lines until its terminal
//!   marker, capture its value, give up at a deadline
//! - [`AttachPoller`]: poll network attachment under a wall-clock ceiling
//! - [`UrcCollector`]: gather unsolicited lines for a fixed window
//! - [`Session`]: connect, sockets, ping, identifiers and CoAP on top
//!
//! All I/O goes through a [`Transport`] (serial port, TCP bridge, or the
//! scripted [`MockTransport`]) and all waiting through a [`Clock`].
//!
//! # Example
//!
//! ```rust
//! use nbiot_modem::{ManualClock, MockTransport, ModemConfig, Session};
//!
//! let clock = ManualClock::new();
//! let transport = MockTransport::with_clock(clock.clone());
//! transport.respond("CGSN=1", &["", "+CGSN: 357518080000001", "", "OK"]);
//!
//! let mut session = Session::with_clock(transport, clock, ModemConfig::default());
//! assert_eq!(session.imei().unwrap().as_deref(), Some("357518080000001"));
//! ```

mod attach;
mod clock;
mod config;
mod error;
mod executor;
mod mock;
mod session;
mod transport;
mod urc;

pub use attach::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use executor::*;
pub use mock::*;
pub use session::*;
pub use transport::*;
pub use urc::*;
