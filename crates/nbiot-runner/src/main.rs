use clap::{ArgAction, Parser, Subcommand};
use nbiot_modem::{Session, Transport};
use nbiot_runner::coap::coap_get;
use nbiot_runner::link::{open_session, Link};
use nbiot_runner::settings::{load_config, to_yaml, Overrides};
use nbiot_runner::transfer::{send_plan, TransferPlan, DEFAULT_PART_SIZE};
use nbiot_runner::{logging, RunnerError, RunnerResult};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "nbiot", author, version, about = "Drive a SARA-N2 NB-IoT modem", long_about = None)]
struct Cli {
    #[arg(long, short, help = "YAML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Serial device path (default: /dev/ttyACM0)")]
    port: Option<String>,

    #[arg(long, help = "Baud rate (default: 9600)")]
    baud: Option<u32>,

    #[arg(long, value_name = "HOST:PORT", help = "Reach the modem through a TCP serial bridge")]
    tcp: Option<String>,

    #[arg(short, long, action = ArgAction::Count, help = "More log output (-v debug, -vv trace)")]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the IMEI and IMSI
    Info,

    /// Run the connect sequence, report the socket, disconnect
    Connect,

    /// Send one text datagram
    Send {
        #[arg(long, value_name = "IP:PORT")]
        to: SocketAddrV4,
        message: String,
    },

    /// Ping a host and print the replies
    Ping {
        address: Ipv4Addr,
        #[arg(long, default_value_t = 10, help = "Seconds to wait for replies")]
        timeout: u64,
    },

    /// Print unsolicited result codes for a while
    Urc {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },

    /// Send a file as numbered datagrams
    SendFile {
        path: PathBuf,
        #[arg(long, value_name = "IP:PORT")]
        to: SocketAddrV4,
        #[arg(long, short, default_value_t = DEFAULT_PART_SIZE, help = "Bytes per part (max 400)")]
        size: usize,
    },

    /// GET a resource through the modem's CoAP client
    CoapGet {
        #[arg(long, value_name = "IP:PORT")]
        server: SocketAddrV4,
        #[arg(long, default_value = "/")]
        uri: String,
        #[arg(long, default_value_t = 60, help = "Seconds to wait for the response")]
        timeout: u64,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    nbiot_metrics::describe_metrics();

    if let Err(e) = run(cli) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> RunnerResult<()> {
    let overrides = Overrides {
        port: cli.port,
        baud_rate: cli.baud,
    };
    let config = load_config(cli.config.as_deref(), &overrides)?;

    if let Commands::Config = cli.command {
        print!("{}", to_yaml(&config)?);
        return Ok(());
    }

    let link = match cli.tcp {
        Some(addr) => Link::Tcp(addr),
        None => Link::Serial,
    };
    let mut session = open_session(&link, config)?;

    match cli.command {
        Commands::Info => {
            let imei = session.imei()?;
            let imsi = session.imsi()?;
            println!("IMEI: {}", imei.as_deref().unwrap_or("unknown"));
            println!("IMSI: {}", imsi.as_deref().unwrap_or("unknown"));
            Ok(())
        }
        Commands::Connect => connected(&mut session, |session| {
            match session.socket() {
                Some(socket) => println!("Connected, socket {}", socket),
                None => println!("Connected without a socket"),
            }
            Ok(())
        }),
        Commands::Send { to, message } => connected(&mut session, |session| {
            if session.send_to(message.as_bytes(), to)? {
                println!("Sent {} bytes to {}", message.len(), to);
                Ok(())
            } else {
                Err(RunnerError::Rejected(format!("datagram to {}", to)))
            }
        }),
        Commands::Ping { address, timeout } => connected(&mut session, |session| {
            let replies = session.ping(address, Duration::from_secs(timeout))?;
            if replies.is_empty() {
                println!("No reply from {}", address);
            }
            for reply in replies {
                println!("Reply from {}: ttl={} time={} ms", reply.address, reply.ttl, reply.rtt_ms);
            }
            Ok(())
        }),
        Commands::Urc { seconds } => {
            for line in session.collect_urc(Duration::from_secs(seconds))? {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::SendFile { path, to, size } => {
            let plan = TransferPlan::from_file(&path, size)?;
            connected(&mut session, |session| {
                let sent = send_plan(session, &plan, to)?;
                println!("Sent {} in {} messages", plan.file_name(), sent);
                Ok(())
            })
        }
        Commands::CoapGet { server, uri, timeout } => connected(&mut session, |session| {
            match coap_get(session, server, &uri, Duration::from_secs(timeout))? {
                Some(response) => {
                    println!("Code: {}", response.code);
                    println!("{}", String::from_utf8_lossy(&response.payload));
                }
                None => println!("No CoAP response within {} s", timeout),
            }
            Ok(())
        }),
        Commands::Config => Ok(()),
    }
}

/// Connect, run `job`, and disconnect whether or not the job succeeded.
fn connected<T, F>(session: &mut Session<T>, job: F) -> RunnerResult<()>
where
    T: Transport,
    F: FnOnce(&mut Session<T>) -> RunnerResult<()>,
{
    session.connect()?;
    let result = job(session);
    if let Err(e) = session.disconnect() {
        error!("Disconnect failed: {}", e);
    }
    info!("Done");
    result
}
