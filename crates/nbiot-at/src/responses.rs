//! Response parsing for the AT protocol.
//!
//! Response lines fall into three groups:
//! - terminal status: `OK`, `ERROR`, `+CME ERROR: <n>`
//! - information lines for the command in flight (`+CGATT: 1`, bare IMSI, ...)
//! - unsolicited result codes (`+NPING: ...`, `+UCOAPCD: ...`, `+CSCON: ...`)
//!
//! The executor only needs [`Response::classify`]; the typed parsers below
//! turn captured values and URCs into data for the session workflows.

use crate::catalog::{R_ERROR, R_OK};
use crate::error::{AtError, AtResult};
use std::net::Ipv4Addr;

/// Classified response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Terminal success.
    Ok,

    /// Terminal failure.
    Error,

    /// Terminal failure with an extended error, numeric (`CMEE=1`) or
    /// verbose (`CMEE=2`).
    CmeError(String),

    /// Anything else: information text or a URC.
    Info(String),
}

impl Response {
    /// Classify a decoded line (terminators already stripped).
    pub fn classify(line: &str) -> Response {
        let text = line.trim();

        if text == R_OK {
            return Response::Ok;
        }
        if text == R_ERROR {
            return Response::Error;
        }
        if let Some(reason) = text.strip_prefix("+CME ERROR:") {
            return Response::CmeError(reason.trim().to_string());
        }

        Response::Info(text.to_string())
    }

    /// Whether this line ends the command with a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Response::Error | Response::CmeError(_))
    }
}

/// Split the arguments of a response on commas, trimming quotes.
fn split_args(body: &str) -> Vec<&str> {
    body.split(',').map(|part| part.trim().trim_matches('"')).collect()
}

/// Strip a `+NAME:` prefix from a URC, returning its arguments.
fn urc_body<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    line.trim().strip_prefix(name)?.strip_prefix(':').map(str::trim)
}

fn parse_field<T: std::str::FromStr>(value: &str, what: &str, line: &str) -> AtResult<T> {
    value
        .parse()
        .map_err(|_| AtError::ParseError(format!("invalid {} `{}` in `{}`", what, value, line)))
}

/// A successful ping reply (`+NPING: <ip>,<ttl>,<rtt>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReply {
    /// Address that replied.
    pub address: Ipv4Addr,
    /// Time to live of the reply.
    pub ttl: u8,
    /// Round trip time in milliseconds.
    pub rtt_ms: u32,
}

impl PingReply {
    /// Parse a `+NPING` URC. Returns `Ok(None)` for lines that are not one.
    pub fn parse(line: &str) -> AtResult<Option<PingReply>> {
        let Some(body) = urc_body(line, "+NPING") else {
            return Ok(None);
        };
        let args = split_args(body);
        if args.len() != 3 {
            return Err(AtError::ParseError(format!("malformed ping reply `{}`", line)));
        }
        Ok(Some(PingReply {
            address: parse_field(args[0], "address", line)?,
            ttl: parse_field(args[1], "ttl", line)?,
            rtt_ms: parse_field(args[2], "round trip time", line)?,
        }))
    }
}

/// Parse a `+NPINGERR: <code>` URC.
pub fn parse_ping_error(line: &str) -> Option<u8> {
    urc_body(line, "+NPINGERR")?.parse().ok()
}

/// A datagram read with `NSORF`.
///
/// Wire form: `<socket>,<ip>,<port>,<length>,<data>,<remaining>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedDatagram {
    /// Socket handle the datagram arrived on.
    pub socket: u8,
    /// Sender address.
    pub address: Ipv4Addr,
    /// Sender port.
    pub port: u16,
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Bytes still pending on the socket.
    pub remaining: u16,
}

impl ReceivedDatagram {
    /// Parse the `NSORF` information line.
    pub fn parse(line: &str) -> AtResult<ReceivedDatagram> {
        let args = split_args(line);
        if args.len() != 6 {
            return Err(AtError::ParseError(format!("malformed datagram `{}`", line)));
        }

        let length: usize = parse_field(args[3], "length", line)?;
        let data = hex::decode(args[4])?;
        if data.len() != length {
            return Err(AtError::ParseError(format!(
                "datagram length {} does not match payload of {} bytes",
                length,
                data.len()
            )));
        }

        Ok(ReceivedDatagram {
            socket: parse_field(args[0], "socket", line)?,
            address: parse_field(args[1], "address", line)?,
            port: parse_field(args[2], "port", line)?,
            data,
            remaining: parse_field(args[5], "remaining length", line)?,
        })
    }
}

/// A CoAP response delivered by the `+UCOAPCD` URC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapResponse {
    /// CoAP response code as reported by the modem.
    pub code: u16,
    /// Response payload. Hex payloads are decoded; anything else is kept as text bytes.
    pub payload: Vec<u8>,
}

impl CoapResponse {
    /// Parse a `+UCOAPCD` URC. Returns `Ok(None)` for lines that are not one.
    pub fn parse(line: &str) -> AtResult<Option<CoapResponse>> {
        let Some(body) = urc_body(line, "+UCOAPCD") else {
            return Ok(None);
        };
        let (code, payload) = match body.split_once(',') {
            Some((code, payload)) => (code, payload.trim().trim_matches('"')),
            None => (body, ""),
        };
        let payload = hex::decode(payload).unwrap_or_else(|_| payload.as_bytes().to_vec());

        Ok(Some(CoapResponse {
            code: parse_field(code.trim(), "CoAP code", line)?,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_terminals() {
        assert_eq!(Response::classify("OK"), Response::Ok);
        assert_eq!(Response::classify("ERROR"), Response::Error);
        assert_eq!(
            Response::classify("+CME ERROR: 4"),
            Response::CmeError("4".to_string())
        );
        assert!(Response::classify("+CME ERROR: 4").is_failure());
    }

    #[test]
    fn test_classify_verbose_cme_error() {
        let response = Response::classify("+CME ERROR: SIM failure");
        assert_eq!(response, Response::CmeError("SIM failure".to_string()));
        assert!(response.is_failure());
    }

    #[test]
    fn test_classify_info() {
        assert_eq!(
            Response::classify("+CGATT: 1"),
            Response::Info("+CGATT: 1".to_string())
        );
        // Only the bare token is terminal.
        assert!(!Response::classify("OK ready").is_failure());
        assert_ne!(Response::classify("OK ready"), Response::Ok);
    }

    #[test]
    fn test_parse_ping_reply() {
        let reply = PingReply::parse("+NPING: \"1.1.1.1\",54,1120").unwrap().unwrap();
        assert_eq!(reply.address, Ipv4Addr::new(1, 1, 1, 1));
        assert_eq!(reply.ttl, 54);
        assert_eq!(reply.rtt_ms, 1120);

        let bare = PingReply::parse("+NPING: 8.8.8.8,117,893").unwrap().unwrap();
        assert_eq!(bare.address, Ipv4Addr::new(8, 8, 8, 8));
    }

    #[test]
    fn test_parse_ping_ignores_other_lines() {
        assert_eq!(PingReply::parse("+CSCON: 1").unwrap(), None);
        assert_eq!(PingReply::parse("+NPINGERR: 1").unwrap(), None);
        assert!(PingReply::parse("+NPING: 1.1.1.1").is_err());
    }

    #[test]
    fn test_parse_ping_error() {
        assert_eq!(parse_ping_error("+NPINGERR: 1"), Some(1));
        assert_eq!(parse_ping_error("+NPING: 1.1.1.1,1,1"), None);
    }

    #[test]
    fn test_parse_datagram() {
        let datagram = ReceivedDatagram::parse("1,\"192.168.5.1\",1024,2,\"ABAB\",0").unwrap();
        assert_eq!(datagram.socket, 1);
        assert_eq!(datagram.address, Ipv4Addr::new(192, 168, 5, 1));
        assert_eq!(datagram.port, 1024);
        assert_eq!(datagram.data, vec![0xAB, 0xAB]);
        assert_eq!(datagram.remaining, 0);
    }

    #[test]
    fn test_parse_datagram_length_mismatch() {
        let err = ReceivedDatagram::parse("1,192.168.5.1,1024,3,ABAB,0").unwrap_err();
        assert!(matches!(err, AtError::ParseError(_)));
    }

    #[test]
    fn test_parse_coap_response() {
        let response = CoapResponse::parse("+UCOAPCD: 69,\"48656C6C6F\"").unwrap().unwrap();
        assert_eq!(response.code, 69);
        assert_eq!(response.payload, b"Hello");

        let empty = CoapResponse::parse("+UCOAPCD: 132").unwrap().unwrap();
        assert_eq!(empty.code, 132);
        assert!(empty.payload.is_empty());
    }
}
