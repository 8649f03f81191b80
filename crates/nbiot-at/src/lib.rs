//! SARA-N2 AT Command Protocol
//!
//! This crate provides the wire-level pieces for driving a u-blox SARA-N2
//! class NB-IoT modem over its AT command interface. It performs no I/O; the
//! `nbiot-modem` crate pairs it with a transport.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → modem): `AT+<body>\r\n`
//! - **Responses** (modem → host): CRLF-terminated text lines, usually framed
//!   by a blank line, ending with `OK` or `ERROR`
//! - **URCs**: unsolicited lines such as `+NPING: ...` that arrive outside
//!   any command's response
//!
//! Each command has a [`CommandSpec`] in the [`Catalog`] naming the line that
//! ends its response (`OK` for nearly everything, the `+UFOTAS` notification
//! for a reboot) and an optional capture pattern for its returned value.
//!
//! # Example
//!
//! ```rust
//! use nbiot_at::{Catalog, Command, CommandId, Response};
//!
//! let request = Command::AttachStatus.to_request();
//! assert_eq!(request.encode(), b"AT+CGATT?\r\n");
//!
//! let spec = Catalog::global().get(CommandId::AttachStatus).unwrap();
//! assert_eq!(spec.capture("+CGATT: 1").as_deref(), Some("1"));
//! assert_eq!(Response::classify("OK"), Response::Ok);
//! ```

mod catalog;
mod codec;
mod commands;
mod error;
mod responses;

pub use catalog::*;
pub use codec::*;
pub use commands::*;
pub use error::*;
pub use responses::*;
