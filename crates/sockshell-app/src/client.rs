//! Client side: attach the invoking terminal to the server's socket.
//!
//! Keystrokes must reach the remote shell unbuffered and uninterpreted,
//! so the local terminal goes raw for the duration of the session. The
//! remote pty already echoes input, so local echo stays off unless the
//! caller asks for it.

use std::io;
use std::net::Shutdown;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::Path;

use sockshell_relay::relay;
use sockshell_term::{ConsoleGuard, TermError};

/// Errors from the terminal proxy.
#[derive(Debug)]
pub enum ClientError {
    Connect(io::Error),
    Term(TermError),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Connect(err) => write!(f, "could not connect to socket: {err}"),
            ClientError::Term(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<TermError> for ClientError {
    fn from(err: TermError) -> Self {
        ClientError::Term(err)
    }
}

/// Proxy the local terminal onto the server at `path` until either side
/// closes.
pub fn run_client(path: &Path, local_echo: bool) -> Result<(), ClientError> {
    // Connect before touching terminal modes; a failed connect must leave
    // the terminal exactly as it was.
    let stream = UnixStream::connect(path).map_err(ClientError::Connect)?;

    let stdin = io::stdin();
    let stdout = io::stdout();

    let mut console = ConsoleGuard::capture(stdin.as_fd())?;
    console.apply_raw(local_echo)?;

    let end = relay(
        stdin.as_fd(),
        stdout.as_fd(),
        stream.as_fd(),
        stream.as_fd(),
    );
    log::debug!("session relay ended: {end}");

    console.restore()?;

    let _ = stream.shutdown(Shutdown::Both);
    drop(stream);

    // The session usually ends mid-line on the remote side; park the
    // cursor on a fresh one.
    println!();
    Ok(())
}
