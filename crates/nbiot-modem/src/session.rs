//! Session workflows.
//!
//! A [`Session`] owns the executor (and with it the transport) and strings
//! commands together into the operations an application actually wants:
//! bring the link up, open a socket, send a datagram, ping, read the
//! identifiers. Every operation is synchronous and returns once the modem
//! has answered or a deadline has passed.

use crate::attach::AttachPoller;
use crate::clock::{Clock, SystemClock};
use crate::config::{FailurePolicy, ModemConfig};
use crate::error::{ModemError, ModemResult};
use crate::executor::{CommandExecutor, ExecutionResult};
use crate::transport::Transport;
use crate::urc::{UrcBatch, UrcCollector};
use nbiot_at::{
    parse_ping_error, AtError, CoapMethod, CoapProfileOp, CoapResponse, Command, PingReply,
    ReceivedDatagram, DEFAULT_CID,
};
use nbiot_metrics::metric_defs;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest datagram `NSOST` accepts.
pub const MAX_DATAGRAM_LEN: usize = 512;

/// Values learned from the modem during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Handle of the open UDP socket.
    pub socket: Option<u8>,
    /// Device IMEI, once read.
    pub imei: Option<String>,
    /// Subscriber IMSI, once read.
    pub imsi: Option<String>,
}

/// A connection to one modem.
pub struct Session<T, C = SystemClock> {
    executor: CommandExecutor<T, C>,
    config: ModemConfig,
    state: SessionState,
}

impl<T: Transport> Session<T, SystemClock> {
    /// Create a session on the wall clock.
    pub fn new(transport: T, config: ModemConfig) -> Self {
        Session::with_clock(transport, SystemClock, config)
    }
}

impl<T: Transport, C: Clock> Session<T, C> {
    /// Create a session with an explicit clock.
    pub fn with_clock(transport: T, clock: C, config: ModemConfig) -> Self {
        let executor =
            CommandExecutor::with_clock(transport, clock).with_config(config.executor_config());
        Session::from_executor(executor, config)
    }

    /// Wrap an already configured executor.
    pub fn from_executor(executor: CommandExecutor<T, C>, config: ModemConfig) -> Self {
        Session {
            executor,
            config,
            state: SessionState::default(),
        }
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handle of the open socket, if any.
    pub fn socket(&self) -> Option<u8> {
        self.state.socket
    }

    pub fn executor(&self) -> &CommandExecutor<T, C> {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut CommandExecutor<T, C> {
        &mut self.executor
    }

    /// Consume the session, returning the transport.
    pub fn into_transport(self) -> T {
        self.executor.into_transport()
    }

    fn run(&mut self, command: Command) -> ModemResult<ExecutionResult> {
        self.executor.execute(&command.to_request())
    }

    // ========== Workflows ==========

    /// Bring the modem up and open the session socket.
    ///
    /// Steps: reboot, radio on, set APN, select operator, wait for attach,
    /// activate the PDP context, create the socket. A failed step either
    /// aborts or is logged and skipped, depending on the failure policy.
    pub fn connect(&mut self) -> ModemResult<()> {
        info!(
            "Connecting (apn={}, operator={}, policy={:?})",
            self.config.apn, self.config.mccmnc, self.config.failure_policy
        );

        let outcome = self.reboot();
        self.check_step("reboot", outcome)?;
        let outcome = self.radio_on();
        self.check_step("radio_on", outcome)?;
        let outcome = self.set_apn();
        self.check_step("set_apn", outcome)?;
        let outcome = self.select_operator();
        self.check_step("select_operator", outcome)?;
        let outcome = self.wait_until_attached();
        self.check_step("attach", outcome)?;
        let outcome = self.activate_pdp_context();
        self.check_step("activate_pdp_context", outcome)?;
        let outcome = self.create_socket().map(|socket| socket.is_some());
        self.check_step("create_socket", outcome)?;

        info!("Connected, socket {:?}", self.state.socket);
        Ok(())
    }

    fn check_step(&self, step: &'static str, outcome: ModemResult<bool>) -> ModemResult<()> {
        let policy = self.config.failure_policy;
        match outcome {
            Ok(true) => {
                debug!("Step {} done", step);
                Ok(())
            }
            Ok(false) if policy == FailurePolicy::Continue => {
                warn!("Step {} failed, continuing", step);
                Ok(())
            }
            Ok(false) => {
                warn!("Step {} failed, aborting connect", step);
                Err(ModemError::StepFailed { step })
            }
            Err(e @ (ModemError::ResponseTimeout { .. } | ModemError::AttachTimeout { .. }))
                if policy == FailurePolicy::Continue =>
            {
                warn!("Step {} failed ({}), continuing", step, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Close the session socket.
    pub fn disconnect(&mut self) -> ModemResult<bool> {
        info!("Disconnecting");
        self.close_socket()
    }

    /// Block until the network reports attachment or the configured ceiling passes.
    pub fn wait_until_attached(&mut self) -> ModemResult<bool> {
        let ceiling = self.config.attach_timeout();
        AttachPoller::new(&mut self.executor)
            .with_interval(self.config.attach_poll_interval())
            .wait_until_attached(ceiling)
    }

    /// Collect unsolicited lines for `window`.
    pub fn collect_urc(&mut self, window: Duration) -> ModemResult<UrcBatch> {
        UrcCollector::new(&mut self.executor).collect_for(window)
    }

    // ========== Radio and network ==========

    /// Reboot and wait for the modem's boot notification.
    pub fn reboot(&mut self) -> ModemResult<bool> {
        // The modem forgets its sockets across a reboot.
        self.forget_socket();
        Ok(self.run(Command::Reboot)?.success)
    }

    pub fn radio_on(&mut self) -> ModemResult<bool> {
        Ok(self.run(Command::RadioOn)?.success)
    }

    pub fn radio_off(&mut self) -> ModemResult<bool> {
        Ok(self.run(Command::RadioOff)?.success)
    }

    /// Define the default PDP context with the configured APN.
    pub fn set_apn(&mut self) -> ModemResult<bool> {
        let apn = self.config.apn.clone();
        Ok(self.run(Command::DefinePdpContext { cid: DEFAULT_CID, apn })?.success)
    }

    /// Select the configured operator.
    pub fn select_operator(&mut self) -> ModemResult<bool> {
        let mccmnc = self.config.mccmnc;
        Ok(self.run(Command::SelectOperator { mccmnc })?.success)
    }

    pub fn activate_pdp_context(&mut self) -> ModemResult<bool> {
        Ok(self
            .run(Command::ActivatePdpContext {
                cid: DEFAULT_CID,
                active: true,
            })?
            .success)
    }

    /// Read back the PDP context definitions.
    pub fn pdp_context(&mut self) -> ModemResult<bool> {
        Ok(self.run(Command::ReadPdpContext)?.success)
    }

    /// Address assigned to the default PDP context.
    pub fn pdp_address(&mut self) -> ModemResult<Option<Ipv4Addr>> {
        let result = self.run(Command::PdpAddress { cid: DEFAULT_CID })?;
        match result.captured {
            Some(address) if result.success => address
                .parse()
                .map(Some)
                .map_err(|_| ModemError::InvalidResponse(format!("PDP address `{}`", address))),
            _ => Ok(None),
        }
    }

    /// Enable or disable `+CSCON` URCs.
    pub fn set_urc(&mut self, enabled: bool) -> ModemResult<bool> {
        Ok(self.run(Command::SetConnectionUrc { enabled })?.success)
    }

    /// Whether the signalling connection is up, when the modem says.
    pub fn connection_status(&mut self) -> ModemResult<Option<bool>> {
        let result = self.run(Command::ConnectionStatus)?;
        if !result.success {
            return Ok(None);
        }
        Ok(result
            .captured
            .and_then(|flag| flag.parse::<u8>().ok())
            .map(|flag| flag != 0))
    }

    // ========== Identity ==========

    /// Device IMEI. Read once, then served from the session state.
    pub fn imei(&mut self) -> ModemResult<Option<String>> {
        if self.state.imei.is_none() {
            let result = self.run(Command::Imei)?;
            if result.success {
                self.state.imei = result.captured;
            }
        }
        Ok(self.state.imei.clone())
    }

    /// Subscriber IMSI. Read once, then served from the session state.
    pub fn imsi(&mut self) -> ModemResult<Option<String>> {
        if self.state.imsi.is_none() {
            let result = self.run(Command::Imsi)?;
            if result.success {
                self.state.imsi = result.captured;
            }
        }
        Ok(self.state.imsi.clone())
    }

    // ========== Sockets ==========

    /// Open the session's UDP socket on the configured local port.
    ///
    /// Returns the existing handle when one is already open, and `None` when
    /// the modem refused.
    pub fn create_socket(&mut self) -> ModemResult<Option<u8>> {
        if let Some(socket) = self.state.socket {
            debug!("Socket {} already open", socket);
            return Ok(Some(socket));
        }

        let port = self.config.socket_port;
        let result = self.run(Command::CreateSocket { port })?;
        if !result.success {
            return Ok(None);
        }
        let handle = result
            .captured
            .ok_or_else(|| ModemError::InvalidResponse("no socket handle in reply".to_string()))?;
        let socket: u8 = handle
            .parse()
            .map_err(|_| ModemError::InvalidResponse(format!("socket handle `{}`", handle)))?;

        debug!("Opened socket {} on port {}", socket, port);
        self.state.socket = Some(socket);
        let labels = self.executor.port_labels();
        metrics::gauge!(metric_defs::SESSION_SOCKET_BOUND.name, &labels).set(1.0);
        Ok(Some(socket))
    }

    /// Close the session socket. The handle is forgotten even if the modem
    /// rejects the close.
    pub fn close_socket(&mut self) -> ModemResult<bool> {
        let Some(socket) = self.forget_socket() else {
            return Ok(true);
        };
        let result = self.run(Command::CloseSocket { socket })?;
        if !result.success {
            warn!("Modem refused to close socket {}", socket);
        }
        Ok(result.success)
    }

    fn forget_socket(&mut self) -> Option<u8> {
        let socket = self.state.socket.take();
        if socket.is_some() {
            let labels = self.executor.port_labels();
            metrics::gauge!(metric_defs::SESSION_SOCKET_BOUND.name, &labels).set(0.0);
        }
        socket
    }

    /// Send a datagram from the session socket.
    pub fn send_to(&mut self, data: &[u8], addr: SocketAddrV4) -> ModemResult<bool> {
        let socket = self.state.socket.ok_or(ModemError::SocketUnbound)?;
        if data.len() > MAX_DATAGRAM_LEN {
            return Err(AtError::InvalidCommand(format!(
                "datagram of {} bytes exceeds {} byte limit",
                data.len(),
                MAX_DATAGRAM_LEN
            ))
            .into());
        }

        let result = self.run(Command::SendTo {
            socket,
            addr,
            payload: data.to_vec(),
        })?;
        if result.success {
            debug!("Sent {} bytes to {}", data.len(), addr);
            let labels = self.executor.port_labels();
            metrics::counter!(metric_defs::SESSION_TX_BYTES.name, &labels)
                .increment(data.len() as u64);
        }
        Ok(result.success)
    }

    /// Read one pending datagram of at most `max_len` bytes.
    pub fn receive_from(&mut self, max_len: u16) -> ModemResult<Option<ReceivedDatagram>> {
        let socket = self.state.socket.ok_or(ModemError::SocketUnbound)?;
        let result = self.run(Command::ReceiveFrom { socket, max_len })?;
        match result.captured {
            Some(line) if result.success => Ok(Some(ReceivedDatagram::parse(&line)?)),
            _ => Ok(None),
        }
    }

    /// Ping `address` and collect the replies for `timeout`.
    pub fn ping(&mut self, address: Ipv4Addr, timeout: Duration) -> ModemResult<Vec<PingReply>> {
        info!("Pinging {}", address);
        let lines = self.with_connection_urc(|session| {
            if session.run(Command::Ping { address })?.success {
                session.collect_urc(timeout)
            } else {
                warn!("Modem rejected ping to {}", address);
                Ok(UrcBatch::new())
            }
        })?;

        let mut replies = Vec::new();
        for line in &lines {
            match PingReply::parse(line) {
                Ok(Some(reply)) => replies.push(reply),
                Ok(None) => {
                    if let Some(code) = parse_ping_error(line) {
                        warn!("Ping to {} failed with error {}", address, code);
                    }
                }
                Err(e) => warn!("Ignoring malformed ping reply: {}", e),
            }
        }
        Ok(replies)
    }

    /// Run `job` with `+CSCON` URCs enabled, switching them off again
    /// whatever `job` returns.
    fn with_connection_urc<R>(
        &mut self,
        job: impl FnOnce(&mut Self) -> ModemResult<R>,
    ) -> ModemResult<R> {
        self.set_urc(true)?;
        let outcome = job(self);
        match self.set_urc(false) {
            Ok(_) => outcome,
            Err(e) if outcome.is_err() => {
                warn!("Could not disable connection URCs: {}", e);
                outcome
            }
            Err(e) => Err(e),
        }
    }

    // ========== CoAP ==========

    /// Route CoAP through the AT interface.
    pub fn select_coap_at(&mut self) -> ModemResult<bool> {
        Ok(self.run(Command::SelectCoapAt)?.success)
    }

    pub fn set_coap_server(&mut self, server: SocketAddrV4) -> ModemResult<bool> {
        self.coap_profile(CoapProfileOp::Server(server))
    }

    pub fn set_coap_uri(&mut self, uri: &str) -> ModemResult<bool> {
        self.coap_profile(CoapProfileOp::Uri(uri.to_string()))
    }

    pub fn set_coap_pdu_option(&mut self, option: u8, value: &str) -> ModemResult<bool> {
        self.coap_profile(CoapProfileOp::PduOption {
            option,
            value: value.to_string(),
        })
    }

    pub fn select_coap_profile(&mut self, profile: u8) -> ModemResult<bool> {
        self.coap_profile(CoapProfileOp::SelectProfile(profile))
    }

    /// Flag the current profile as valid or invalid.
    pub fn set_coap_profile_valid(&mut self, valid: bool) -> ModemResult<bool> {
        self.coap_profile(CoapProfileOp::SetProfileValid(valid))
    }

    pub fn save_coap_profile(&mut self, profile: u8) -> ModemResult<bool> {
        self.coap_profile(CoapProfileOp::SaveProfile(profile))
    }

    pub fn restore_coap_profile(&mut self, profile: u8) -> ModemResult<bool> {
        self.coap_profile(CoapProfileOp::RestoreProfile(profile))
    }

    fn coap_profile(&mut self, op: CoapProfileOp) -> ModemResult<bool> {
        Ok(self.run(Command::CoapProfile(op))?.success)
    }

    /// Issue a CoAP request on the current profile and wait up to `timeout`
    /// for the `+UCOAPCD` response.
    pub fn coap_request(
        &mut self,
        method: CoapMethod,
        payload: Option<&[u8]>,
        timeout: Duration,
    ) -> ModemResult<Option<CoapResponse>> {
        let command = Command::CoapRequest {
            method,
            payload: payload.map(<[u8]>::to_vec),
        };
        let lines = self.with_connection_urc(|session| {
            if session.run(command)?.success {
                session.collect_urc(timeout)
            } else {
                warn!("Modem rejected CoAP {:?} request", method);
                Ok(UrcBatch::new())
            }
        })?;

        for line in &lines {
            if let Some(response) = CoapResponse::parse(line)? {
                debug!("CoAP response code {}", response.code);
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}
