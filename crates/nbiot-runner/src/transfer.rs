//! File transfer over UDP datagrams.
//!
//! A file goes out as a start message followed by numbered parts:
//!
//! ```text
//! 0#<file name>#<part count>#<sha256 hex>
//! 1#<hex of bytes 0..size>
//! 2#<hex of bytes size..2*size>
//! ...
//! ```
//!
//! The receiver reassembles the parts in order and checks the digest.

use crate::error::{RunnerError, RunnerResult};
use nbiot_modem::{Clock, Session, Transport, MAX_DATAGRAM_LEN};
use sha2::{Digest, Sha256};
use std::net::SocketAddrV4;
use std::path::Path;
use tracing::{debug, info};

/// Largest part size accepted on the command line.
pub const MAX_PART_SIZE: usize = 400;

/// Part size used when none is given.
pub const DEFAULT_PART_SIZE: usize = 200;

/// A file split into transfer messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    file_name: String,
    checksum: String,
    parts: Vec<String>,
}

impl TransferPlan {
    /// Split `data` into parts of `part_size` bytes.
    pub fn new(file_name: &str, data: &[u8], part_size: usize) -> RunnerResult<Self> {
        if part_size == 0 || part_size > MAX_PART_SIZE {
            return Err(RunnerError::InvalidArgument(format!(
                "part size must be between 1 and {} bytes, got {}",
                MAX_PART_SIZE, part_size
            )));
        }
        if file_name.contains('#') {
            return Err(RunnerError::InvalidArgument(format!(
                "file name `{}` contains the separator `#`",
                file_name
            )));
        }

        let checksum = hex::encode(Sha256::digest(data));
        let parts: Vec<String> = data
            .chunks(part_size)
            .enumerate()
            .map(|(i, chunk)| format!("{}#{}", i + 1, hex::encode(chunk)))
            .collect();

        let plan = TransferPlan {
            file_name: file_name.to_string(),
            checksum,
            parts,
        };
        if let Some(longest) = plan.messages().map(|m| m.len()).max() {
            if longest > MAX_DATAGRAM_LEN {
                return Err(RunnerError::InvalidArgument(format!(
                    "part size {} gives {} byte messages, over the {} byte datagram limit",
                    part_size, longest, MAX_DATAGRAM_LEN
                )));
            }
        }
        Ok(plan)
    }

    /// Read a file and split it.
    pub fn from_file(path: &Path, part_size: usize) -> RunnerResult<Self> {
        let data = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                RunnerError::InvalidArgument(format!("{} has no usable file name", path.display()))
            })?;
        Self::new(file_name, &data, part_size)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// SHA-256 of the file, lowercase hex.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn start_message(&self) -> String {
        format!("0#{}#{}#{}", self.file_name, self.parts.len(), self.checksum)
    }

    /// Every message in send order, start message first.
    pub fn messages(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.start_message()).chain(self.parts.iter().cloned())
    }
}

/// Send every message of `plan` to `addr` through an open session socket.
///
/// Returns the number of messages sent. Stops at the first message the modem
/// refuses.
pub fn send_plan<T: Transport, C: Clock>(
    session: &mut Session<T, C>,
    plan: &TransferPlan,
    addr: SocketAddrV4,
) -> RunnerResult<usize> {
    info!(
        "Sending {} ({} parts, sha256 {}) to {}",
        plan.file_name(),
        plan.part_count(),
        plan.checksum(),
        addr
    );

    let mut sent = 0;
    for (index, message) in plan.messages().enumerate() {
        if !session.send_to(message.as_bytes(), addr)? {
            return Err(RunnerError::TransferError(format!(
                "modem refused message {} of {}",
                index,
                plan.part_count()
            )));
        }
        debug!("Sent message {} ({} bytes)", index, message.len());
        sent += 1;
    }
    Ok(sent)
}
