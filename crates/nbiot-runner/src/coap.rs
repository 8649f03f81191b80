//! CoAP GET through the modem's CoAP client.

use crate::error::{RunnerError, RunnerResult};
use nbiot_at::{CoapMethod, CoapResponse};
use nbiot_modem::{Clock, Session, Transport};
use std::net::SocketAddrV4;
use std::time::Duration;
use tracing::info;

/// Profile slot used for the request.
pub const COAP_PROFILE: u8 = 0;

/// PDU header options set before a request: (option, value).
const PDU_OPTIONS: [(u8, &str); 4] = [(4, "1"), (0, "1"), (1, "1"), (2, "1")];

/// Configure profile 0 for `server` and `uri`, then issue a GET.
pub fn coap_get<T: Transport, C: Clock>(
    session: &mut Session<T, C>,
    server: SocketAddrV4,
    uri: &str,
    timeout: Duration,
) -> RunnerResult<Option<CoapResponse>> {
    info!("CoAP GET coap://{}{}", server, uri);

    require(session.set_coap_server(server)?, "set server")?;
    require(session.set_coap_uri(uri)?, "set URI")?;
    for (option, value) in PDU_OPTIONS {
        require(session.set_coap_pdu_option(option, value)?, "set PDU option")?;
    }
    require(session.select_coap_profile(COAP_PROFILE)?, "select profile")?;
    require(session.set_coap_profile_valid(true)?, "mark profile valid")?;
    require(session.save_coap_profile(COAP_PROFILE)?, "save profile")?;
    require(session.restore_coap_profile(COAP_PROFILE)?, "restore profile")?;
    require(session.select_coap_at()?, "select AT interface")?;

    Ok(session.coap_request(CoapMethod::Get, None, timeout)?)
}

fn require(ok: bool, step: &str) -> RunnerResult<()> {
    if ok {
        Ok(())
    } else {
        Err(RunnerError::Rejected(format!("CoAP step `{}`", step)))
    }
}
