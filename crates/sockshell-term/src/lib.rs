//! sockshell-term: raw-mode management for the client's local terminal.
//!
//! While a session is proxied, the local terminal must stop line-buffering
//! input (and usually stop echoing it, since the remote shell's pty echoes
//! already). [`ConsoleGuard`] owns that mode switch: it snapshots the
//! terminal attributes before touching them and puts them back on every
//! way out of the session, including unwinds.

use std::os::fd::BorrowedFd;

use nix::errno::Errno;
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg, Termios};

/// Errors from terminal attribute handling.
#[derive(Debug)]
pub enum TermError {
    Capture(Errno),
    Apply(Errno),
    Restore(Errno),
}

impl std::fmt::Display for TermError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TermError::Capture(err) => write!(f, "could not read terminal attributes: {err}"),
            TermError::Apply(err) => write!(f, "could not switch terminal to raw mode: {err}"),
            TermError::Restore(err) => write!(f, "could not restore terminal attributes: {err}"),
        }
    }
}

impl std::error::Error for TermError {}

/// Scoped raw-mode window around a proxied session.
///
/// [`ConsoleGuard::capture`] snapshots the current attributes before any
/// mutation. [`ConsoleGuard::apply_raw`] switches off canonical input
/// processing, and local echo unless asked to keep it. [`ConsoleGuard::restore`]
/// puts the snapshot back; if it was never called, dropping the guard
/// restores instead, so a relay error or panic cannot leave the terminal raw.
///
/// All attribute changes wait for pending output to drain (`TCSADRAIN`).
pub struct ConsoleGuard<'fd> {
    fd: BorrowedFd<'fd>,
    saved: Termios,
    restored: bool,
}

impl<'fd> ConsoleGuard<'fd> {
    /// Snapshot the terminal attributes of `fd`.
    pub fn capture(fd: BorrowedFd<'fd>) -> Result<Self, TermError> {
        let saved = tcgetattr(fd).map_err(TermError::Capture)?;
        Ok(Self {
            fd,
            saved,
            restored: false,
        })
    }

    /// Disable canonical (line-buffered) input, and local echo unless
    /// `local_echo` is set.
    pub fn apply_raw(&self, local_echo: bool) -> Result<(), TermError> {
        let mut raw = self.saved.clone();
        raw.local_flags.remove(LocalFlags::ICANON);
        if !local_echo {
            raw.local_flags.remove(LocalFlags::ECHO);
        }
        tcsetattr(self.fd, SetArg::TCSADRAIN, &raw).map_err(TermError::Apply)
    }

    /// Reapply the captured attributes. Runs at most once; a later drop of
    /// the guard becomes a no-op.
    pub fn restore(&mut self) -> Result<(), TermError> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        tcsetattr(self.fd, SetArg::TCSADRAIN, &self.saved).map_err(TermError::Restore)
    }
}

impl Drop for ConsoleGuard<'_> {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(err) = tcsetattr(self.fd, SetArg::TCSADRAIN, &self.saved) {
                // Nowhere to propagate from a drop; the terminal stays raw.
                log::warn!("could not restore terminal attributes: {err}");
            }
        }
    }
}
