//! Line-based codec for AT communication.
//!
//! Commands go out as `AT+<body>\r\n`. Responses come back as CRLF-terminated
//! lines; the modem frames most responses with a leading blank line
//! (`\r\nOK\r\n`), so empty lines are normal traffic and are handed to the
//! caller rather than swallowed here.

use bytes::BytesMut;

/// Prefix of every extended AT command.
pub const COMMAND_PREFIX: &str = "AT+";

/// Terminator appended to every command.
pub const COMMAND_TERMINATOR: &str = "\r\n";

/// Longest line the codec buffers before giving up on finding a terminator.
///
/// Socket reads (`NSORF`) carry up to 512 payload bytes as hex plus framing,
/// so this sits comfortably above the largest legitimate line.
pub const MAX_LINE_LENGTH: usize = 2048;

/// A codec that assembles raw bytes from the link into lines.
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: BytesMut,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take one complete line from the buffer.
    ///
    /// Lines are split on `\n`; the returned bytes exclude the `\n` but keep
    /// any `\r`, which [`decode_text`] strips. Returns `None` when no complete
    /// line is buffered. A run of more than [`MAX_LINE_LENGTH`] bytes without
    /// a terminator is returned as-is so a noisy link cannot grow the buffer
    /// without bound.
    pub fn decode_line(&mut self) -> Option<Vec<u8>> {
        if let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(end);
            let _ = self.buffer.split_to(1);
            return Some(line.to_vec());
        }

        if self.buffer.len() > MAX_LINE_LENGTH {
            return Some(self.buffer.split().to_vec());
        }

        None
    }

    /// Encode a command body for transmission.
    ///
    /// Adds the `AT+` prefix and the CRLF terminator.
    pub fn encode_command(body: &str) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(COMMAND_PREFIX.len() + body.len() + COMMAND_TERMINATOR.len());
        buf.extend_from_slice(COMMAND_PREFIX.as_bytes());
        buf.extend_from_slice(body.as_bytes());
        buf.extend_from_slice(COMMAND_TERMINATOR.as_bytes());
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Decode a raw line into text with all `\r` and `\n` removed.
///
/// Returns `None` when the bytes are not valid UTF-8.
pub fn decode_text(raw: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(raw).ok()?;
    Some(text.chars().filter(|&c| c != '\r' && c != '\n').collect())
}
