//! Client side of the FIFO notification channel.

use std::fs::File;
use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use focusd_core::{Ack, FocusNotice, NotifyError, NotifyResult, PeerTarget};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::fifo::{
    Access, ChannelAddress, PeerAddressResolver, make_fifo, open_nonblocking, read_record,
};
use crate::wire::{AckCodec, COMMAND_LEN, NoticeCodec};

const REPLY_RETRY: Duration = Duration::from_millis(5);

/// A peer's FIFO pair, created on construction and removed on drop.
///
/// The command FIFO stays open read-write for the endpoint's lifetime so the
/// daemon's non-blocking writer open always finds a reader.
pub struct PeerEndpoint {
    address: ChannelAddress,
    command: File,
}

impl PeerEndpoint {
    /// Create both FIFOs for `target`.
    ///
    /// # Errors
    /// Returns an error if a FIFO cannot be created or opened.
    pub fn create(resolver: &dyn PeerAddressResolver, target: PeerTarget) -> NotifyResult<Self> {
        let address = resolver.resolve(target);
        make_fifo(&address.command)?;
        make_fifo(&address.result)?;
        let command = open_nonblocking(&address.command, Access::ReadWrite)?;

        debug!(
            pid = target.pid,
            handle_id = target.handle_id,
            path = ?address.command,
            "Peer endpoint created"
        );
        Ok(Self { address, command })
    }

    #[must_use]
    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    /// Wait up to `timeout` for one command record.
    ///
    /// # Errors
    /// Returns `Timeout` if nothing arrives and `Malformed` for a bad record.
    pub fn receive(&mut self, timeout: Duration) -> NotifyResult<FocusNotice> {
        let raw = read_record(&mut self.command, COMMAND_LEN, timeout)?;
        NoticeCodec
            .decode(&mut BytesMut::from(&raw[..]))?
            .ok_or_else(|| NotifyError::Malformed("short command record".to_string()))
    }

    /// Answer the last command.
    ///
    /// Retries until the daemon has the result FIFO open or `timeout` passes.
    ///
    /// # Errors
    /// Returns `Unreachable` if the daemon never opens the result FIFO.
    pub fn reply(&self, ack: Ack, timeout: Duration) -> NotifyResult<()> {
        let mut record = BytesMut::new();
        AckCodec.encode(ack, &mut record)?;

        let deadline = Instant::now() + timeout;
        let mut result = loop {
            match open_nonblocking(&self.address.result, Access::Write) {
                Ok(file) => break file,
                Err(NotifyError::Unreachable(path)) => {
                    if Instant::now() >= deadline {
                        return Err(NotifyError::Unreachable(path));
                    }
                    thread::sleep(REPLY_RETRY);
                }
                Err(e) => return Err(e),
            }
        };
        result.write_all(&record)?;
        Ok(())
    }
}

impl Drop for PeerEndpoint {
    fn drop(&mut self) {
        for path in [&self.address.command, &self.address.result] {
            if let Err(e) = std::fs::remove_file(path)
                && e.kind() != io::ErrorKind::NotFound
            {
                warn!(?path, error = %e, "Failed to remove FIFO");
            }
        }
    }
}
