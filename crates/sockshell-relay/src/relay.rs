use std::os::fd::{AsRawFd, BorrowedFd};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::{read, write};

/// How long one readiness wait may block before both directions are
/// re-evaluated. Purely a liveness bound; an idle session never expires.
const RECHECK_MILLIS: u16 = 5_000;

/// Transfer buffer for one readiness event. Small on purpose: a tunnel
/// carries keystrokes and screen output, not bulk data.
const CHUNK: usize = 512;

/// The two endpoints of a relay, as seen from [`relay`]'s signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::A => write!(f, "a"),
            Side::B => write!(f, "b"),
        }
    }
}

/// Why a relay stopped. End-of-stream is the expected outcome of every
/// session; the error variants exist for diagnostics, not recovery.
#[derive(Debug, PartialEq, Eq)]
pub enum RelayEnd {
    /// A read on the given side returned zero bytes.
    Eof(Side),
    /// A read on the given side failed.
    ReadFailed(Side, Errno),
    /// A write toward the given side failed or accepted nothing.
    WriteFailed(Side, Errno),
    /// The readiness wait itself failed.
    WaitFailed(Errno),
}

impl std::fmt::Display for RelayEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayEnd::Eof(side) => write!(f, "end of stream on endpoint {side}"),
            RelayEnd::ReadFailed(side, err) => {
                write!(f, "could not read endpoint {side}: {err}")
            }
            RelayEnd::WriteFailed(side, err) => {
                write!(f, "could not write endpoint {side}: {err}")
            }
            RelayEnd::WaitFailed(err) => write!(f, "could not wait for readiness: {err}"),
        }
    }
}

impl RelayEnd {
    /// Whether the relay ended on plain end-of-stream rather than an error.
    pub fn is_eof(&self) -> bool {
        matches!(self, RelayEnd::Eof(_))
    }
}

/// Copy bytes between two endpoint pairs until either side ends.
///
/// ```text
/// in_a  --\ /-> out_b
///          x
/// out_a <-/ \-- in_b
/// ```
///
/// Data read from `in_a` goes to `out_b`; data read from `in_b` goes to
/// `out_a`. The two directions are serviced independently off a single
/// `poll(2)` wait, so neither can starve the other, and within one
/// direction bytes keep their read order.
///
/// Termination is fail-fast: the first end-of-stream, read error, or
/// write that accepts nothing ends the whole relay. Once a direction has
/// ended, nothing further is forwarded on either direction; a half-dead
/// tunnel is torn down rather than left as a one-way session.
pub fn relay(
    in_a: BorrowedFd<'_>,
    out_a: BorrowedFd<'_>,
    in_b: BorrowedFd<'_>,
    out_b: BorrowedFd<'_>,
) -> RelayEnd {
    let mut buf = [0u8; CHUNK];

    loop {
        let mut fds = [
            PollFd::new(in_a, PollFlags::POLLIN),
            PollFd::new(in_b, PollFlags::POLLIN),
        ];

        match poll(&mut fds, PollTimeout::from(RECHECK_MILLIS)) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(err) => return RelayEnd::WaitFailed(err),
        }

        // POLLHUP and POLLERR are surfaced by attempting the read, which
        // then reports end-of-stream or the error itself.
        let ready_a = fds[0].any().unwrap_or(false);
        let ready_b = fds[1].any().unwrap_or(false);

        if ready_a {
            if let Some(end) = pump(in_a, out_b, Side::A, Side::B, &mut buf) {
                return end;
            }
        }

        if ready_b {
            if let Some(end) = pump(in_b, out_a, Side::B, Side::A, &mut buf) {
                return end;
            }
        }
    }
}

/// Forward one chunk from `from` to `to`. Returns the terminating
/// condition if this direction ended, `None` to keep relaying.
fn pump(
    from: BorrowedFd<'_>,
    to: BorrowedFd<'_>,
    from_side: Side,
    to_side: Side,
    buf: &mut [u8],
) -> Option<RelayEnd> {
    let n = match read(from.as_raw_fd(), buf) {
        Ok(0) => return Some(RelayEnd::Eof(from_side)),
        Ok(n) => n,
        Err(err) => return Some(RelayEnd::ReadFailed(from_side, err)),
    };

    let mut done = 0;
    while done < n {
        match write(to, &buf[done..n]) {
            // A write that accepts nothing cannot make progress.
            Ok(0) => return Some(RelayEnd::WriteFailed(to_side, Errno::EIO)),
            Ok(written) => done += written,
            Err(err) => return Some(RelayEnd::WriteFailed(to_side, err)),
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::Shutdown;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Duration;

    /// Spawn a relay over two stream pairs and hand back the peer ends.
    ///
    /// `peer_a` talks to the relay's side A, `peer_b` to side B.
    fn start_relay() -> (UnixStream, UnixStream, thread::JoinHandle<RelayEnd>) {
        let (peer_a, end_a) = UnixStream::pair().unwrap();
        let (peer_b, end_b) = UnixStream::pair().unwrap();

        let handle = thread::spawn(move || {
            relay(end_a.as_fd(), end_a.as_fd(), end_b.as_fd(), end_b.as_fd())
        });

        (peer_a, peer_b, handle)
    }

    #[test]
    fn test_forwards_both_directions() {
        let (mut peer_a, mut peer_b, handle) = start_relay();

        peer_a.write_all(b"from a to b").unwrap();
        let mut buf = [0u8; 64];
        let n = peer_b.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"from a to b");

        peer_b.write_all(b"from b to a").unwrap();
        let n = peer_a.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"from b to a");

        // Closing side A ends the relay.
        drop(peer_a);
        let end = handle.join().unwrap();
        assert!(end.is_eof(), "expected EOF termination, got: {end}");
    }

    #[test]
    fn test_preserves_order_without_loss() {
        let (mut peer_a, mut peer_b, handle) = start_relay();

        // Larger than one transfer chunk, so the relay has to split it.
        let payload: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        peer_a.write_all(&payload).unwrap();
        peer_a.shutdown(Shutdown::Write).unwrap();

        let mut received = Vec::new();
        peer_b
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 1024];
        while received.len() < expected.len() {
            match peer_b.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) => panic!("read failed after {} bytes: {e}", received.len()),
            }
        }

        assert_eq!(received, expected);
        assert_eq!(handle.join().unwrap(), RelayEnd::Eof(Side::A));
    }

    #[test]
    fn test_eof_wins_over_buffered_data() {
        // Data queued toward side B must never be delivered once side A
        // has reached end-of-stream.
        let (peer_a, peer_b) = UnixStream::pair().unwrap();
        let (mut far_b, end_b) = UnixStream::pair().unwrap();

        far_b.write_all(b"late data").unwrap();
        peer_a.shutdown(Shutdown::Write).unwrap();

        // Only now does the relay start: side A is already at EOF and side
        // B already has bytes waiting.
        let handle = thread::spawn(move || {
            relay(peer_b.as_fd(), peer_b.as_fd(), end_b.as_fd(), end_b.as_fd())
        });

        let end = handle.join().unwrap();
        assert_eq!(end, RelayEnd::Eof(Side::A));

        // Nothing was forwarded to side A before the relay tore down.
        let mut peer_a = peer_a;
        peer_a
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 64];
        let n = peer_a.read(&mut buf).unwrap();
        assert_eq!(n, 0, "buffered bytes leaked past EOF: {:?}", &buf[..n]);
    }

    #[test]
    fn test_reports_eof_side() {
        let (_peer_a, mut peer_b, handle) = start_relay();

        peer_b.shutdown(Shutdown::Write).unwrap();
        let end = handle.join().unwrap();
        assert_eq!(end, RelayEnd::Eof(Side::B));
    }
}
