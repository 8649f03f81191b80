//! NB-IoT Runner
//!
//! Library side of the `nbiot` binary: configuration loading, link setup,
//! and the multi-step jobs (file transfer, CoAP GET) the CLI runs on top of
//! a [`nbiot_modem::Session`].

pub mod coap;
pub mod error;
pub mod link;
pub mod logging;
pub mod settings;
pub mod transfer;

pub use error::{RunnerError, RunnerResult};
