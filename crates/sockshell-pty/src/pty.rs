use std::os::fd::{AsRawFd, OwnedFd};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::pty::openpty;

/// Errors from pty allocation and shell spawning.
#[derive(Debug)]
pub enum PtyError {
    Open(Errno),
    CloseOnExec(Errno),
    EmptyCommand,
    Argv(std::ffi::NulError),
    Fork(Errno),
    NewSession(Errno),
    BindStdio(Errno),
    ControllingTty(Errno),
    Exec(Errno),
}

impl std::fmt::Display for PtyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtyError::Open(err) => write!(f, "could not open pseudo terminal: {err}"),
            PtyError::CloseOnExec(err) => {
                write!(f, "could not set close-on-exec on pty controller: {err}")
            }
            PtyError::EmptyCommand => write!(f, "shell command is empty"),
            PtyError::Argv(err) => write!(f, "shell argument contains a nul byte: {err}"),
            PtyError::Fork(err) => write!(f, "could not fork process: {err}"),
            PtyError::NewSession(err) => write!(f, "could not create a new session: {err}"),
            PtyError::BindStdio(err) => {
                write!(f, "could not bind standard streams to terminal: {err}")
            }
            PtyError::ControllingTty(err) => {
                write!(f, "could not assign controlling terminal: {err}")
            }
            PtyError::Exec(err) => write!(f, "could not exec shell: {err}"),
        }
    }
}

impl std::error::Error for PtyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PtyError::Open(err)
            | PtyError::CloseOnExec(err)
            | PtyError::Fork(err)
            | PtyError::NewSession(err)
            | PtyError::BindStdio(err)
            | PtyError::ControllingTty(err)
            | PtyError::Exec(err) => Some(err),
            PtyError::Argv(err) => Some(err),
            PtyError::EmptyCommand => None,
        }
    }
}

/// A freshly allocated pseudo-terminal pair.
///
/// The controlling side stays with the session worker for the lifetime of
/// the relay; the subordinate side becomes the shell's terminal. Both close
/// on drop.
pub struct PtyPair {
    /// Controlling side, read/written by the session's relay.
    pub master: OwnedFd,
    /// Subordinate side, handed to the shell child.
    pub slave: OwnedFd,
}

impl PtyPair {
    /// Allocate a new pair.
    ///
    /// The controlling side is marked close-on-exec immediately: session
    /// workers share one server process, and a shell spawned for one
    /// session must not inherit another session's controller. The
    /// subordinate side needs no flag; the child rebinds it onto its
    /// standard streams before exec, which clears close-on-exec on the
    /// duplicates.
    pub fn open() -> Result<Self, PtyError> {
        let pty = openpty(None, None).map_err(PtyError::Open)?;
        fcntl(
            pty.master.as_raw_fd(),
            FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC),
        )
        .map_err(PtyError::CloseOnExec)?;

        Ok(Self {
            master: pty.master,
            slave: pty.slave,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fd_flags(fd: &OwnedFd) -> FdFlag {
        let bits = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFD).unwrap();
        FdFlag::from_bits_truncate(bits)
    }

    #[test]
    fn test_open_allocates_usable_pair() {
        let pair = PtyPair::open().unwrap();
        assert!(pair.master.as_raw_fd() >= 0);
        assert!(pair.slave.as_raw_fd() >= 0);
    }

    #[test]
    fn test_controller_is_close_on_exec() {
        let pair = PtyPair::open().unwrap();
        assert!(fd_flags(&pair.master).contains(FdFlag::FD_CLOEXEC));
        assert!(!fd_flags(&pair.slave).contains(FdFlag::FD_CLOEXEC));
    }
}
