//! Server side: the connection acceptor and the per-connection session
//! handler.
//!
//! The acceptor owns the listening socket for its whole life: create,
//! bind, listen, accept serially, and unlink the path again on the way
//! out. Every accepted connection is handed to a dedicated session thread
//! and forgotten; one session going wrong can never take the acceptor or
//! another session with it. There is no retry logic anywhere: any setup
//! or accept failure ends the acceptor, while sessions already dispatched
//! run to their own completion.

use std::fs;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;

use nix::errno::Errno;
use nix::sys::socket::{
    accept4, bind, listen, shutdown, socket, AddressFamily, Backlog, SockFlag, SockType,
    Shutdown, UnixAddr,
};

use sockshell_pty::{spawn_shell, PtyError, ShellCommand};
use sockshell_relay::relay;

/// Fixed accept backlog: one pending connection is plenty for a tool whose
/// clients are humans attaching a terminal.
const ACCEPT_BACKLOG: i32 = 1;

/// Socket file mode after listen: any local user may connect.
///
/// This is the whole point of the tool and also its security caveat: the
/// shell runs with the daemon's privileges, so a root daemon hands a root
/// shell to every local principal. Do not tighten this; restricting access
/// is the operator's job (mount namespace, directory permissions).
const SOCKET_MODE: u32 = 0o666;

/// Errors from acceptor setup and the accept loop.
#[derive(Debug)]
pub enum ServerError {
    AlreadyBound(PathBuf),
    RemoveStale(std::io::Error),
    Socket(Errno),
    Address(Errno),
    Bind(Errno),
    Listen(Errno),
    Permissions(std::io::Error),
    Accept(Errno),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::AlreadyBound(path) => {
                write!(f, "socket {} already has a live server", path.display())
            }
            ServerError::RemoveStale(err) => {
                write!(f, "could not remove stale socket: {err}")
            }
            ServerError::Socket(err) => write!(f, "could not open socket: {err}"),
            ServerError::Address(err) => write!(f, "could not build socket address: {err}"),
            ServerError::Bind(err) => write!(f, "could not bind to socket: {err}"),
            ServerError::Listen(err) => write!(f, "could not listen to socket: {err}"),
            ServerError::Permissions(err) => write!(f, "could not change socket mode: {err}"),
            ServerError::Accept(err) => write!(f, "could not accept connection: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

/// Owns the listening channel and dispatches sessions.
#[derive(Debug)]
pub struct Acceptor {
    listener: OwnedFd,
    path: PathBuf,
    next_session: u64,
}

impl Acceptor {
    /// Create the listening channel at `path`.
    ///
    /// A leftover path from a dead server is unlinked and rebound; a path
    /// with a live listener behind it fails the bind and is left alone.
    /// The listening descriptor carries close-on-exec so spawned shells
    /// never inherit it.
    pub fn bind(path: &Path) -> Result<Self, ServerError> {
        remove_stale_socket(path)?;

        let listener = socket(
            AddressFamily::Unix,
            SockType::Stream,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .map_err(ServerError::Socket)?;

        let addr = UnixAddr::new(path).map_err(ServerError::Address)?;
        bind(listener.as_raw_fd(), &addr).map_err(ServerError::Bind)?;

        // From here on the path belongs to this acceptor; a failure below
        // drops it, which closes the descriptor and unlinks the path.
        let acceptor = Self {
            listener,
            path: path.to_path_buf(),
            next_session: 1,
        };

        let backlog = Backlog::new(ACCEPT_BACKLOG).map_err(ServerError::Listen)?;
        listen(&acceptor.listener, backlog).map_err(ServerError::Listen)?;

        fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE))
            .map_err(ServerError::Permissions)?;

        Ok(acceptor)
    }

    /// Accept connections until the first accept error, dispatching each
    /// onto its own session thread. Never returns while healthy; on return
    /// the listening channel is closed and its path unlinked.
    pub fn run(mut self, shell: &ShellCommand) -> Result<(), ServerError> {
        loop {
            let conn = match accept4(self.listener.as_raw_fd(), SockFlag::SOCK_CLOEXEC) {
                Ok(fd) => unsafe { OwnedFd::from_raw_fd(fd) },
                Err(err) => return Err(ServerError::Accept(err)),
            };

            let id = self.next_session;
            self.next_session += 1;
            log::debug!("session {id} accepted");

            // The connection moves wholly into the worker; the acceptor
            // keeps no copy and does not wait for the outcome.
            let shell = shell.clone();
            thread::Builder::new()
                .name(format!("session-{id}"))
                .spawn(move || {
                    if let Err(err) = handle_session(conn, &shell) {
                        log::error!("session {id}: {err}");
                    }
                })
                .expect("failed to spawn session thread");
        }
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Serve one accepted connection: spawn a shell on a fresh pty and splice
/// the connection onto its controlling side.
///
/// The relay's termination is the only end-of-session signal; the shell
/// child is never awaited here. Both descriptors close on return, which
/// is what eventually delivers end-of-stream to an orphaned shell.
pub fn handle_session(conn: OwnedFd, shell: &ShellCommand) -> Result<(), PtyError> {
    let master = spawn_shell(shell)?;

    let end = relay(conn.as_fd(), conn.as_fd(), master.as_fd(), master.as_fd());
    log::debug!("session relay ended: {end}");

    let _ = shutdown(conn.as_raw_fd(), Shutdown::Both);
    Ok(())
}

/// Probe an existing socket path. Connection refused (or a non-socket in
/// the way) means the old owner is gone, so the path can be reclaimed; a
/// successful connect means a live server already owns the address.
fn remove_stale_socket(path: &Path) -> Result<(), ServerError> {
    if !path.exists() {
        return Ok(());
    }

    match UnixStream::connect(path) {
        Ok(_) => Err(ServerError::AlreadyBound(path.to_path_buf())),
        Err(_) => fs::remove_file(path).map_err(ServerError::RemoveStale),
    }
}
