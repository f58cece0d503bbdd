//! FIFO notification channel.
//!
//! Each peer owns a pair of named pipes per handle: a command FIFO the daemon
//! writes a [`wire`](crate::wire) record to, and a result FIFO the peer
//! answers on. [`FifoNotifier`] performs one bounded round trip per
//! notification and closes both ends on every path.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use focusd_core::{
    Ack, FocusNotice, NotifyError, NotifyResult, PeerNotifier, PeerTarget, TargetKind,
};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::wire::{AckCodec, NoticeCodec, RESULT_LEN};

/// Default directory holding peer FIFOs.
pub const DEFAULT_PEER_DIR: &str = "/tmp";

/// Filesystem locations of one peer's command and result FIFOs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAddress {
    pub command: PathBuf,
    pub result: PathBuf,
}

/// Maps a notification target to its FIFO pair.
pub trait PeerAddressResolver: Send + Sync {
    fn resolve(&self, target: PeerTarget) -> ChannelAddress;
}

/// Resolver using the `FOCUS.<pid>.<handle>` naming inside one directory.
#[derive(Debug, Clone)]
pub struct DefaultResolver {
    dir: PathBuf,
}

impl DefaultResolver {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Default for DefaultResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PEER_DIR)
    }
}

impl PeerAddressResolver for DefaultResolver {
    fn resolve(&self, target: PeerTarget) -> ChannelAddress {
        let base = format!("FOCUS.{}.{}", target.pid, target.handle_id);
        let (command, result) = match target.kind {
            TargetKind::Focus => (base.clone(), format!("{base}r")),
            TargetKind::Watch => (format!("{base}.wch"), format!("{base}.wchr")),
        };
        ChannelAddress { command: self.dir.join(command), result: self.dir.join(result) }
    }
}

/// [`PeerNotifier`] speaking the FIFO protocol.
pub struct FifoNotifier {
    resolver: Arc<dyn PeerAddressResolver>,
}

impl FifoNotifier {
    #[must_use]
    pub fn new(resolver: Arc<dyn PeerAddressResolver>) -> Self {
        Self { resolver }
    }

    /// Notifier using the default naming inside `dir`.
    #[must_use]
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(DefaultResolver::new(dir)))
    }
}

impl PeerNotifier for FifoNotifier {
    fn notify(
        &self,
        target: PeerTarget,
        notice: &FocusNotice,
        timeout: Duration,
    ) -> NotifyResult<Ack> {
        let address = self.resolver.resolve(target);
        let mut record = BytesMut::new();
        NoticeCodec.encode(notice, &mut record)?;

        {
            let mut command = open_nonblocking(&address.command, Access::Write)?;
            command.write_all(&record)?;
        }
        trace!(path = ?address.command, "Command record written");

        let mut result = open_nonblocking(&address.result, Access::Read)?;
        let mut raw = BytesMut::from(&read_record(&mut result, RESULT_LEN, timeout)?[..]);
        let ack = AckCodec
            .decode(&mut raw)?
            .ok_or_else(|| NotifyError::Malformed("short result record".to_string()))?;

        if ack.handle_id != target.handle_id {
            return Err(NotifyError::HandleMismatch {
                expected: target.handle_id,
                actual: ack.handle_id,
            });
        }
        debug!(pid = target.pid, handle_id = target.handle_id, ?ack, "Peer acknowledged");
        Ok(ack)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Access {
    Read,
    Write,
    ReadWrite,
}

/// Open a FIFO without blocking on the other end.
///
/// A missing FIFO, or a write-only open with no reader, is `Unreachable`.
pub(crate) fn open_nonblocking(path: &Path, access: Access) -> NotifyResult<File> {
    let mut options = OpenOptions::new();
    match access {
        Access::Read => options.read(true),
        Access::Write => options.write(true),
        Access::ReadWrite => options.read(true).write(true),
    };
    options.custom_flags(libc::O_NONBLOCK).open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENXIO) {
            NotifyError::Unreachable(path.display().to_string())
        } else {
            NotifyError::Io(e)
        }
    })
}

/// Read exactly `len` bytes from a non-blocking FIFO before `timeout` expires.
pub(crate) fn read_record(file: &mut File, len: usize, timeout: Duration) -> NotifyResult<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut buf = vec![0u8; len];
    let mut filled = 0;

    while filled < len {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(NotifyError::Timeout(timeout));
        }
        if !wait_readable(file, remaining)? {
            return Err(NotifyError::Timeout(timeout));
        }
        match file.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(NotifyError::Malformed(format!(
                    "peer closed after {filled} of {len} bytes"
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(NotifyError::Io(e)),
        }
    }
    Ok(buf)
}

/// Poll `file` for input. Returns `false` on timeout.
#[allow(unsafe_code)] // poll(2) on a descriptor we own
fn wait_readable(file: &File, timeout: Duration) -> NotifyResult<bool> {
    let mut fd = libc::pollfd { fd: file.as_raw_fd(), events: libc::POLLIN, revents: 0 };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    // SAFETY: `fd` is a single valid pollfd living across the call.
    let rc = unsafe { libc::poll(&raw mut fd, 1, millis) };
    match rc {
        0 => Ok(false),
        n if n < 0 => {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                Ok(true)
            } else {
                Err(NotifyError::Io(err))
            }
        }
        _ => Ok(true),
    }
}

/// Create a FIFO at `path`, replacing a stale one.
#[allow(unsafe_code)] // mkfifo(3) with a NUL-terminated path
pub(crate) fn make_fifo(path: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    match std::fs::remove_file(path) {
        Ok(()) => debug!(?path, "Removed stale FIFO"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the call's duration.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerEndpoint;
    use assert_matches::assert_matches;
    use focusd_core::{FocusState, FocusType};
    use std::thread;

    fn notice_for(target: PeerTarget) -> FocusNotice {
        FocusNotice {
            pid: target.pid,
            handle_id: target.handle_id,
            focus_type: FocusType::PLAYBACK,
            state: FocusState::Released,
            stream_type: "alarm".to_string(),
            option_name: "wake-up".to_string(),
        }
    }

    #[test]
    fn test_default_resolver_names() {
        let resolver = DefaultResolver::new("/run/focus");
        let focus = resolver.resolve(PeerTarget::focus(12, 3));
        assert_eq!(focus.command, PathBuf::from("/run/focus/FOCUS.12.3"));
        assert_eq!(focus.result, PathBuf::from("/run/focus/FOCUS.12.3r"));

        let watch = resolver.resolve(PeerTarget::watch(12, 3));
        assert_eq!(watch.command, PathBuf::from("/run/focus/FOCUS.12.3.wch"));
        assert_eq!(watch.result, PathBuf::from("/run/focus/FOCUS.12.3.wchr"));
    }

    #[test]
    fn test_round_trip_with_peer() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let resolver = DefaultResolver::new(dir.path());
        let target = PeerTarget::focus(300, 4);
        let mut peer = PeerEndpoint::create(&resolver, target).expect("Failed to create endpoint");

        let handle = thread::spawn(move || {
            let notice = peer.receive(Duration::from_secs(5)).expect("Failed to receive");
            let ack = Ack { handle_id: 4, auto_reacquire: false, by_session: true };
            peer.reply(ack, Duration::from_secs(5)).expect("Failed to reply");
            notice
        });

        let notifier = FifoNotifier::with_dir(dir.path());
        let ack = notifier
            .notify(target, &notice_for(target), Duration::from_secs(5))
            .expect("Failed to notify");
        let received = handle.join().unwrap();

        assert_eq!(received, notice_for(target));
        assert_eq!(ack, Ack { handle_id: 4, auto_reacquire: false, by_session: true });
    }

    #[test]
    fn test_missing_peer_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = FifoNotifier::with_dir(dir.path());
        let target = PeerTarget::watch(301, 1);

        assert_matches!(
            notifier.notify(target, &notice_for(target), Duration::from_millis(100)),
            Err(NotifyError::Unreachable(_))
        );
    }

    #[test]
    fn test_silent_peer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DefaultResolver::new(dir.path());
        let target = PeerTarget::focus(302, 1);
        let _peer = PeerEndpoint::create(&resolver, target).unwrap();

        let notifier = FifoNotifier::with_dir(dir.path());
        let started = Instant::now();
        assert_matches!(
            notifier.notify(target, &notice_for(target), Duration::from_millis(150)),
            Err(NotifyError::Timeout(_))
        );
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_wrong_handle_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DefaultResolver::new(dir.path());
        let target = PeerTarget::focus(303, 2);
        let mut peer = PeerEndpoint::create(&resolver, target).unwrap();

        let handle = thread::spawn(move || {
            peer.receive(Duration::from_secs(5)).unwrap();
            peer.reply(Ack::new(9), Duration::from_secs(5)).unwrap();
        });

        let notifier = FifoNotifier::with_dir(dir.path());
        let result = notifier.notify(target, &notice_for(target), Duration::from_secs(5));
        handle.join().unwrap();

        assert_matches!(result, Err(NotifyError::HandleMismatch { expected: 2, actual: 9 }));
    }
}
