//! Command catalog.
//!
//! Every command the driver can send has exactly one [`CommandSpec`] saying
//! which line ends its response and, optionally, which value to capture on
//! the way there. The catalog is plain data: the executor consults it, the
//! workflows never carry their own response literals.

use crate::error::{AtError, AtResult};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Success terminal line.
pub const R_OK: &str = "OK";

/// Failure terminal line.
pub const R_ERROR: &str = "ERROR";

/// Notification the modem prints once a reboot has completed.
pub const REBOOT_NOTIFICATION: &str = "+UFOTAS";

/// Identifier of a catalogued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandId {
    /// `CFUN=1`
    RadioOn,
    /// `CFUN=0`
    RadioOff,
    /// `NRB`
    Reboot,
    /// `CGATT?`
    AttachStatus,
    /// `CGACT=<state>,<cid>`
    ActivatePdpContext,
    /// `NSOCR="DGRAM",17,<port>,1`
    CreateSocket,
    /// `NSOCL=<socket>`
    CloseSocket,
    /// `CGSN=1`
    Imei,
    /// `CIMI`
    Imsi,
    /// `NSOST=...`
    SendTo,
    /// `NSORF=<socket>,<len>`
    ReceiveFrom,
    /// `CSCON?`
    ConnectionStatus,
    /// `CSCON=<n>`
    SetConnectionUrc,
    /// `CGDCONT=<cid>,"IP","<apn>"`
    DefinePdpContext,
    /// `CGDCONT?`
    ReadPdpContext,
    /// `COPS=1,2,"<mccmnc>"`
    SelectOperator,
    /// `CGPADDR=<cid>`
    PdpAddress,
    /// `UCOAP=<op>,...`
    CoapProfile,
    /// `UCOAPC=<method>[,...]`
    CoapCommand,
    /// `NPING="<ip>"`
    Ping,
    /// `USELCP=1`
    SelectCoapAt,
}

impl CommandId {
    /// Every command identifier.
    pub const ALL: [CommandId; 21] = [
        CommandId::RadioOn,
        CommandId::RadioOff,
        CommandId::Reboot,
        CommandId::AttachStatus,
        CommandId::ActivatePdpContext,
        CommandId::CreateSocket,
        CommandId::CloseSocket,
        CommandId::Imei,
        CommandId::Imsi,
        CommandId::SendTo,
        CommandId::ReceiveFrom,
        CommandId::ConnectionStatus,
        CommandId::SetConnectionUrc,
        CommandId::DefinePdpContext,
        CommandId::ReadPdpContext,
        CommandId::SelectOperator,
        CommandId::PdpAddress,
        CommandId::CoapProfile,
        CommandId::CoapCommand,
        CommandId::Ping,
        CommandId::SelectCoapAt,
    ];

    /// The AT command name, without prefix or arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandId::RadioOn | CommandId::RadioOff => "CFUN",
            CommandId::Reboot => "NRB",
            CommandId::AttachStatus => "CGATT",
            CommandId::ActivatePdpContext => "CGACT",
            CommandId::CreateSocket => "NSOCR",
            CommandId::CloseSocket => "NSOCL",
            CommandId::Imei => "CGSN",
            CommandId::Imsi => "CIMI",
            CommandId::SendTo => "NSOST",
            CommandId::ReceiveFrom => "NSORF",
            CommandId::ConnectionStatus | CommandId::SetConnectionUrc => "CSCON",
            CommandId::DefinePdpContext | CommandId::ReadPdpContext => "CGDCONT",
            CommandId::SelectOperator => "COPS",
            CommandId::PdpAddress => "CGPADDR",
            CommandId::CoapProfile => "UCOAP",
            CommandId::CoapCommand => "UCOAPC",
            CommandId::Ping => "NPING",
            CommandId::SelectCoapAt => "USELCP",
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Response contract of one command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The command this entry describes.
    pub id: CommandId,
    /// A response line containing this text ends the command.
    pub terminal: &'static str,
    /// Pattern whose first match is captured as the command's value.
    pub capture: Option<Regex>,
    /// Response deadline overriding the executor default.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// A command that ends on `OK` and captures nothing.
    pub fn new(id: CommandId) -> Self {
        CommandSpec {
            id,
            terminal: R_OK,
            capture: None,
            timeout: None,
        }
    }

    /// Set the terminal marker.
    pub fn with_terminal(mut self, terminal: &'static str) -> Self {
        self.terminal = terminal;
        self
    }

    /// Set the capture pattern.
    ///
    /// The pattern may hold at most one capturing group. Without a group the
    /// whole match is captured.
    pub fn with_capture(mut self, pattern: &str) -> AtResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| AtError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        if regex.captures_len() > 2 {
            return Err(AtError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "more than one capturing group".to_string(),
            });
        }
        self.capture = Some(regex);
        Ok(self)
    }

    /// Set a response deadline for this command.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether `line` ends this command's response.
    pub fn is_terminal(&self, line: &str) -> bool {
        line.contains(self.terminal)
    }

    /// Apply the capture pattern to `line`.
    pub fn capture(&self, line: &str) -> Option<String> {
        let captures = self.capture.as_ref()?.captures(line)?;
        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
    }
}

/// Table of command specs keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    specs: HashMap<CommandId, CommandSpec>,
}

static STANDARD: LazyLock<Arc<Catalog>> = LazyLock::new(|| Arc::new(Catalog::standard()));

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Catalog::default()
    }

    /// The process-wide standard catalog.
    pub fn global() -> &'static Catalog {
        &**STANDARD
    }

    /// A shared handle to the process-wide standard catalog.
    pub fn shared() -> Arc<Catalog> {
        Arc::clone(&*STANDARD)
    }

    /// Build the standard SARA-N2 catalog.
    pub fn standard() -> Self {
        use CommandId::*;

        let mut catalog = Catalog::new();
        for id in [
            RadioOn,
            RadioOff,
            ActivatePdpContext,
            CloseSocket,
            SendTo,
            SetConnectionUrc,
            DefinePdpContext,
            ReadPdpContext,
            CoapProfile,
            CoapCommand,
            Ping,
            SelectCoapAt,
        ] {
            catalog.register(CommandSpec::new(id));
        }

        catalog.register(
            CommandSpec::new(Reboot)
                .with_terminal(REBOOT_NOTIFICATION)
                .with_timeout(Duration::from_secs(60)),
        );
        // Operator selection can take up to three minutes on a cold network.
        catalog.register(CommandSpec::new(SelectOperator).with_timeout(Duration::from_secs(180)));

        catalog.register(builtin(AttachStatus, r"\+CGATT:\s*(\d+)"));
        catalog.register(builtin(CreateSocket, r"^(\d+)$"));
        catalog.register(builtin(Imei, r"\+CGSN:\s*(\d{15})"));
        catalog.register(builtin(Imsi, r"^(\d{15})$"));
        catalog.register(builtin(ReceiveFrom, r"^(\d+,.*)$"));
        catalog.register(builtin(ConnectionStatus, r"\+CSCON:\s*\d+,(\d+)"));
        catalog.register(builtin(PdpAddress, r#"\+CGPADDR:\s*\d+,"?([0-9.]+)"?"#));

        catalog
    }

    /// Register a spec, replacing any previous entry for the same id.
    pub fn register(&mut self, spec: CommandSpec) -> Option<CommandSpec> {
        self.specs.insert(spec.id, spec)
    }

    /// Look up the spec for `id`.
    pub fn get(&self, id: CommandId) -> Option<&CommandSpec> {
        self.specs.get(&id)
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn builtin(id: CommandId, pattern: &str) -> CommandSpec {
    CommandSpec::new(id)
        .with_capture(pattern)
        .expect("built-in capture patterns are valid")
}
