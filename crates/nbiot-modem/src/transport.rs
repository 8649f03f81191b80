//! Byte-stream transports.
//!
//! The engine needs two things from a link: write bytes, and read one line
//! while blocking no longer than the link's inactivity bound. A
//! [`StreamTransport`] provides both on top of any `Read + Write` stream by
//! assembling lines with [`LineCodec`]. Serial ports and TCP bridges
//! (ser2net and friends) are both streams with a read timeout, so they share
//! the implementation.

use crate::config::ModemConfig;
use crate::error::ModemResult;
use nbiot_at::LineCodec;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::debug;

/// A line-oriented link to the modem.
///
/// A transport is owned by exactly one executor; the protocol has no command
/// tagging, so sharing one between callers would interleave responses.
pub trait Transport {
    /// Write all of `data` to the link.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read one line, blocking up to the link's inactivity bound.
    ///
    /// Returns the raw line bytes without the `\n`. An empty vector means
    /// nothing arrived within the bound. Undecodable bytes are returned
    /// as-is; deciding what to do with them is the caller's business.
    fn read_line(&mut self) -> io::Result<Vec<u8>>;

    /// Endpoint name used in logs and metric labels.
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write_all(data)
    }

    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_line()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Size of a single read from the underlying stream.
const READ_CHUNK: usize = 256;

/// [`Transport`] over any blocking stream with a read timeout.
pub struct StreamTransport<S> {
    stream: S,
    codec: LineCodec,
    name: String,
}

/// Transport over a serial port.
pub type SerialTransport = StreamTransport<Box<dyn SerialPort>>;

/// Transport over a TCP serial bridge.
pub type TcpTransport = StreamTransport<TcpStream>;

impl<S: Read + Write> StreamTransport<S> {
    /// Wrap a stream. The stream's own read timeout is the inactivity bound.
    pub fn new(stream: S, name: impl Into<String>) -> Self {
        StreamTransport {
            stream,
            codec: LineCodec::new(),
            name: name.into(),
        }
    }

    /// Unwrap the underlying stream, dropping any buffered partial line.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl SerialTransport {
    /// Open the serial port named in `config`.
    pub fn open(config: &ModemConfig) -> ModemResult<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout())
            .open()?;
        debug!(
            "Opened serial port {} at {} baud (read timeout {:?})",
            config.port,
            config.baud_rate,
            config.read_timeout()
        );
        Ok(StreamTransport::new(port, config.port.clone()))
    }
}

impl TcpTransport {
    /// Connect to a TCP serial bridge.
    pub fn connect(addr: &str, read_timeout: Duration) -> ModemResult<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(read_timeout))?;
        stream.set_nodelay(true)?;
        debug!("Connected to serial bridge at {}", addr);
        Ok(StreamTransport::new(stream, addr))
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.codec.decode_line() {
                return Ok(line);
            }

            match self.stream.read(&mut buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("{} closed the link", self.name),
                    ))
                }
                Ok(n) => self.codec.push(&buf[..n]),
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    // Inactivity bound reached; a partial line stays buffered.
                    return Ok(Vec::new());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Stream that yields scripted read results.
    struct ScriptedStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
    }

    impl ScriptedStream {
        fn new(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            ScriptedStream {
                reads: reads.into(),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "idle")),
            }
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reads_lines_across_chunks() {
        let stream = ScriptedStream::new(vec![Ok(b"+CGA".to_vec()), Ok(b"TT: 1\r\n\r\nOK\r\n".to_vec())]);
        let mut transport = StreamTransport::new(stream, "test");

        assert_eq!(transport.read_line().unwrap(), b"+CGATT: 1\r");
        assert_eq!(transport.read_line().unwrap(), b"\r");
        assert_eq!(transport.read_line().unwrap(), b"OK\r");
    }

    #[test]
    fn test_timeout_returns_empty_and_keeps_partial() {
        let stream = ScriptedStream::new(vec![
            Ok(b"O".to_vec()),
            Err(io::Error::new(io::ErrorKind::TimedOut, "idle")),
            Ok(b"K\r\n".to_vec()),
        ]);
        let mut transport = StreamTransport::new(stream, "test");

        assert!(transport.read_line().unwrap().is_empty());
        assert_eq!(transport.read_line().unwrap(), b"OK\r");
    }

    #[test]
    fn test_eof_is_an_error() {
        let stream = ScriptedStream::new(vec![Ok(Vec::new())]);
        let mut transport = StreamTransport::new(stream, "test");

        let err = transport.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_write_passes_through() {
        let mut transport = StreamTransport::new(ScriptedStream::new(Vec::new()), "test");
        transport.write_all(b"AT+CIMI\r\n").unwrap();
        assert_eq!(transport.into_inner().written, b"AT+CIMI\r\n");
    }

    /// Bind a loopback bridge that runs `serve` on the first connection.
    fn loopback_bridge(
        serve: impl FnOnce(TcpStream) + Send + 'static,
    ) -> (String, std::thread::JoinHandle<()>) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            serve(stream);
        });
        (addr, handle)
    }

    #[test]
    fn test_tcp_bridge_round_trip() {
        let (addr, handle) = loopback_bridge(|stream| {
            let mut reader = io::BufReader::new(stream.try_clone().unwrap());
            let mut request = String::new();
            io::BufRead::read_line(&mut reader, &mut request).unwrap();
            assert_eq!(request, "AT+CGATT?\r\n");

            let mut stream = stream;
            stream.write_all(b"\r\n+CGATT: 1\r\n\r\nOK\r\n").unwrap();
            // Hold the link open until the client hangs up.
            let mut rest = Vec::new();
            let _ = reader.read_to_end(&mut rest);
        });

        let mut transport = TcpTransport::connect(&addr, Duration::from_millis(200)).unwrap();
        assert_eq!(transport.name(), addr);
        transport.write_all(b"AT+CGATT?\r\n").unwrap();

        let mut lines = Vec::new();
        while lines.len() < 4 {
            let line = transport.read_line().unwrap();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        assert_eq!(lines[1], b"+CGATT: 1\r");
        assert_eq!(lines[3], b"OK\r");

        // Nothing more pending: the read timeout ends the read.
        assert!(transport.read_line().unwrap().is_empty());

        drop(transport);
        handle.join().unwrap();
    }

    #[test]
    fn test_tcp_bridge_hangup_is_an_error() {
        let (addr, handle) = loopback_bridge(drop);

        let mut transport = TcpTransport::connect(&addr, Duration::from_secs(2)).unwrap();
        handle.join().unwrap();

        let err = transport.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_tcp_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(TcpTransport::connect(&addr, Duration::from_millis(100)).is_err());
    }
}
