//! Opening the modem link.

use crate::error::RunnerResult;
use nbiot_modem::{ModemConfig, SerialTransport, Session, TcpTransport, Transport};
use tracing::info;

/// Where the modem is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Local serial device named in the config.
    Serial,
    /// TCP serial bridge at `host:port`.
    Tcp(String),
}

/// Open the link and wrap it in a session.
pub fn open_session(link: &Link, config: ModemConfig) -> RunnerResult<Session<Box<dyn Transport>>> {
    let transport: Box<dyn Transport> = match link {
        Link::Serial => {
            info!("Opening {} at {} baud", config.port, config.baud_rate);
            Box::new(SerialTransport::open(&config)?)
        }
        Link::Tcp(addr) => {
            info!("Connecting to serial bridge {}", addr);
            Box::new(TcpTransport::connect(addr, config.read_timeout())?)
        }
    };
    Ok(Session::new(transport, config))
}
