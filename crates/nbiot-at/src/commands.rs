//! Commands that can be sent to the modem.
//!
//! A [`Command`] is the typed form of a request. Rendering it produces a
//! [`Request`]: the catalog identifier plus the command body that goes
//! between `AT+` and the CRLF terminator.

use crate::catalog::CommandId;
use crate::codec::LineCodec;
use std::net::{Ipv4Addr, SocketAddrV4};

/// UDP protocol number used when creating sockets.
pub const PROTOCOL_UDP: u8 = 17;

/// Default PDP context identifier.
pub const DEFAULT_CID: u8 = 1;

/// A rendered command, built fresh for each call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Catalog identifier of the command.
    pub id: CommandId,
    /// Command body without `AT+` or terminator.
    pub text: String,
}

impl Request {
    /// Create a request from an identifier and a rendered body.
    pub fn new(id: CommandId, text: impl Into<String>) -> Self {
        Request {
            id,
            text: text.into(),
        }
    }

    /// Bytes to write to the link.
    pub fn encode(&self) -> Vec<u8> {
        LineCodec::encode_command(&self.text)
    }
}

/// CoAP request methods accepted by `UCOAPC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoapMethod {
    Get,
    Delete,
    Put,
    Post,
}

impl CoapMethod {
    /// Method code used by the modem.
    pub fn code(&self) -> u8 {
        match self {
            CoapMethod::Get => 1,
            CoapMethod::Delete => 2,
            CoapMethod::Put => 3,
            CoapMethod::Post => 4,
        }
    }
}

/// Operations on the modem's stored CoAP profiles (`UCOAP`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoapProfileOp {
    /// Destination server address.
    Server(SocketAddrV4),
    /// Request URI.
    Uri(String),
    /// Set a PDU header option.
    PduOption {
        /// Option index as numbered by the modem.
        option: u8,
        /// Option value.
        value: String,
    },
    /// Make `profile` the current profile.
    SelectProfile(u8),
    /// Mark the current profile as valid or invalid.
    SetProfileValid(bool),
    /// Persist the current profile under `profile`.
    SaveProfile(u8),
    /// Restore `profile` and make it current.
    RestoreProfile(u8),
}

impl CoapProfileOp {
    fn to_args(&self) -> String {
        match self {
            CoapProfileOp::Server(addr) => format!("0,\"{}\",\"{}\"", addr.ip(), addr.port()),
            CoapProfileOp::Uri(uri) => format!("1,\"{}\"", uri),
            CoapProfileOp::PduOption { option, value } => format!("2,\"{}\",\"{}\"", option, value),
            CoapProfileOp::SelectProfile(profile) => format!("3,\"{}\"", profile),
            CoapProfileOp::SetProfileValid(valid) => format!("4,\"{}\"", u8::from(*valid)),
            CoapProfileOp::SaveProfile(profile) => format!("6,\"{}\"", profile),
            CoapProfileOp::RestoreProfile(profile) => format!("7,\"{}\"", profile),
        }
    }
}

/// Commands understood by the modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ========== Radio ==========
    /// Enable the radio.
    RadioOn,

    /// Disable the radio.
    RadioOff,

    /// Reboot the modem.
    Reboot,

    // ========== Network ==========
    /// Query GPRS attachment.
    AttachStatus,

    /// Define the PDP context with an APN.
    DefinePdpContext {
        /// Context identifier.
        cid: u8,
        /// Access Point Name.
        apn: String,
    },

    /// Read back the PDP context definitions.
    ReadPdpContext,

    /// Activate or deactivate a PDP context.
    ActivatePdpContext {
        /// Context identifier.
        cid: u8,
        /// Activate when true.
        active: bool,
    },

    /// Manually select an operator by MCC/MNC.
    SelectOperator {
        /// Mobile country code followed by mobile network code.
        mccmnc: u32,
    },

    /// Query the address assigned to a PDP context.
    PdpAddress {
        /// Context identifier.
        cid: u8,
    },

    /// Query signalling connection status.
    ConnectionStatus,

    /// Enable or disable the signalling connection URC.
    SetConnectionUrc {
        /// Emit `+CSCON` URCs when true.
        enabled: bool,
    },

    // ========== Identity ==========
    /// Read the IMEI.
    Imei,

    /// Read the IMSI.
    Imsi,

    // ========== Sockets ==========
    /// Create a UDP socket bound to a local port.
    CreateSocket {
        /// Local port.
        port: u16,
    },

    /// Close a socket.
    CloseSocket {
        /// Socket handle.
        socket: u8,
    },

    /// Send a datagram.
    SendTo {
        /// Socket handle.
        socket: u8,
        /// Remote address.
        addr: SocketAddrV4,
        /// Raw payload, hex-encoded on the wire.
        payload: Vec<u8>,
    },

    /// Read a pending datagram.
    ReceiveFrom {
        /// Socket handle.
        socket: u8,
        /// Maximum number of bytes to read.
        max_len: u16,
    },

    /// Ping a remote host.
    Ping {
        /// Remote address.
        address: Ipv4Addr,
    },

    // ========== CoAP ==========
    /// Select the AT command interface for CoAP.
    SelectCoapAt,

    /// Configure the CoAP profile.
    CoapProfile(CoapProfileOp),

    /// Issue a CoAP request using the current profile.
    CoapRequest {
        /// Request method.
        method: CoapMethod,
        /// Optional payload, hex-encoded on the wire.
        payload: Option<Vec<u8>>,
    },
}

impl Command {
    /// Catalog identifier for this command.
    pub fn id(&self) -> CommandId {
        match self {
            Command::RadioOn => CommandId::RadioOn,
            Command::RadioOff => CommandId::RadioOff,
            Command::Reboot => CommandId::Reboot,
            Command::AttachStatus => CommandId::AttachStatus,
            Command::DefinePdpContext { .. } => CommandId::DefinePdpContext,
            Command::ReadPdpContext => CommandId::ReadPdpContext,
            Command::ActivatePdpContext { .. } => CommandId::ActivatePdpContext,
            Command::SelectOperator { .. } => CommandId::SelectOperator,
            Command::PdpAddress { .. } => CommandId::PdpAddress,
            Command::ConnectionStatus => CommandId::ConnectionStatus,
            Command::SetConnectionUrc { .. } => CommandId::SetConnectionUrc,
            Command::Imei => CommandId::Imei,
            Command::Imsi => CommandId::Imsi,
            Command::CreateSocket { .. } => CommandId::CreateSocket,
            Command::CloseSocket { .. } => CommandId::CloseSocket,
            Command::SendTo { .. } => CommandId::SendTo,
            Command::ReceiveFrom { .. } => CommandId::ReceiveFrom,
            Command::Ping { .. } => CommandId::Ping,
            Command::SelectCoapAt => CommandId::SelectCoapAt,
            Command::CoapProfile(_) => CommandId::CoapProfile,
            Command::CoapRequest { .. } => CommandId::CoapCommand,
        }
    }

    /// Get the command body without prefix or terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            Command::RadioOn => "CFUN=1".to_string(),
            Command::RadioOff => "CFUN=0".to_string(),
            Command::Reboot => "NRB".to_string(),

            Command::AttachStatus => "CGATT?".to_string(),
            Command::DefinePdpContext { cid, apn } => format!("CGDCONT={},\"IP\",\"{}\"", cid, apn),
            Command::ReadPdpContext => "CGDCONT?".to_string(),
            Command::ActivatePdpContext { cid, active } => {
                format!("CGACT={},{}", u8::from(*active), cid)
            }
            Command::SelectOperator { mccmnc } => format!("COPS=1,2,\"{}\"", mccmnc),
            Command::PdpAddress { cid } => format!("CGPADDR={}", cid),
            Command::ConnectionStatus => "CSCON?".to_string(),
            Command::SetConnectionUrc { enabled } => format!("CSCON={}", u8::from(*enabled)),

            Command::Imei => "CGSN=1".to_string(),
            Command::Imsi => "CIMI".to_string(),

            Command::CreateSocket { port } => {
                format!("NSOCR=\"DGRAM\",{},{},1", PROTOCOL_UDP, port)
            }
            Command::CloseSocket { socket } => format!("NSOCL={}", socket),
            Command::SendTo { socket, addr, payload } => format!(
                "NSOST={},\"{}\",{},{},\"{}\"",
                socket,
                addr.ip(),
                addr.port(),
                payload.len(),
                hex::encode_upper(payload)
            ),
            Command::ReceiveFrom { socket, max_len } => format!("NSORF={},{}", socket, max_len),
            Command::Ping { address } => format!("NPING=\"{}\"", address),

            Command::SelectCoapAt => "USELCP=1".to_string(),
            Command::CoapProfile(op) => format!("UCOAP={}", op.to_args()),
            Command::CoapRequest { method, payload } => match payload {
                Some(data) => format!("UCOAPC={},\"{}\"", method.code(), hex::encode_upper(data)),
                None => format!("UCOAPC={}", method.code()),
            },
        }
    }

    /// Render this command into a request.
    pub fn to_request(&self) -> Request {
        Request::new(self.id(), self.to_command_string())
    }

    /// Encode the command as bytes to send to the modem.
    pub fn encode(&self) -> Vec<u8> {
        LineCodec::encode_command(&self.to_command_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_radio_on() {
        assert_eq!(Command::RadioOn.encode(), b"AT+CFUN=1\r\n");
    }

    #[test]
    fn test_encode_create_socket() {
        let cmd = Command::CreateSocket { port: 9000 };
        assert_eq!(cmd.to_command_string(), "NSOCR=\"DGRAM\",17,9000,1");
        assert_eq!(cmd.id(), CommandId::CreateSocket);
    }

    #[test]
    fn test_encode_send_to_hex_payload() {
        let cmd = Command::SendTo {
            socket: 1,
            addr: SocketAddrV4::new(Ipv4Addr::new(192, 158, 5, 1), 1024),
            payload: vec![0x07, 0xFF],
        };
        assert_eq!(cmd.to_command_string(), "NSOST=1,\"192.158.5.1\",1024,2,\"07FF\"");
    }

    #[test]
    fn test_encode_text_payload_length_is_bytes() {
        let cmd = Command::SendTo {
            socket: 0,
            addr: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5000),
            payload: b"hi!".to_vec(),
        };
        assert_eq!(cmd.to_command_string(), "NSOST=0,\"10.0.0.1\",5000,3,\"686921\"");
    }

    #[test]
    fn test_encode_network_setup() {
        let apn = Command::DefinePdpContext { cid: 1, apn: "telenor.iot".to_string() };
        assert_eq!(apn.to_command_string(), "CGDCONT=1,\"IP\",\"telenor.iot\"");

        let cops = Command::SelectOperator { mccmnc: 24201 };
        assert_eq!(cops.to_command_string(), "COPS=1,2,\"24201\"");

        let act = Command::ActivatePdpContext { cid: 1, active: true };
        assert_eq!(act.to_command_string(), "CGACT=1,1");
    }

    #[test]
    fn test_encode_ping() {
        let cmd = Command::Ping { address: Ipv4Addr::new(1, 1, 1, 1) };
        assert_eq!(cmd.to_command_string(), "NPING=\"1.1.1.1\"");
    }

    #[test]
    fn test_encode_coap() {
        let server = Command::CoapProfile(CoapProfileOp::Server(SocketAddrV4::new(
            Ipv4Addr::new(10, 1, 2, 3),
            5683,
        )));
        assert_eq!(server.to_command_string(), "UCOAP=0,\"10.1.2.3\",\"5683\"");

        let uri = Command::CoapProfile(CoapProfileOp::Uri("/time".to_string()));
        assert_eq!(uri.to_command_string(), "UCOAP=1,\"/time\"");

        let valid = Command::CoapProfile(CoapProfileOp::SetProfileValid(true));
        assert_eq!(valid.to_command_string(), "UCOAP=4,\"1\"");

        let restore = Command::CoapProfile(CoapProfileOp::RestoreProfile(0));
        assert_eq!(restore.to_command_string(), "UCOAP=7,\"0\"");

        let get = Command::CoapRequest { method: CoapMethod::Get, payload: None };
        assert_eq!(get.to_command_string(), "UCOAPC=1");
        assert_eq!(get.id(), CommandId::CoapCommand);
    }

    #[test]
    fn test_to_request() {
        let request = Command::CloseSocket { socket: 2 }.to_request();
        assert_eq!(request, Request::new(CommandId::CloseSocket, "NSOCL=2"));
        assert_eq!(request.encode(), b"AT+NSOCL=2\r\n");
    }
}
