use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd};

use nix::errno::Errno;
use nix::libc;
use nix::unistd::{execvp, fork, setsid, ForkResult};

use crate::pty::{PtyError, PtyPair};

/// Program path and argument vector of the shell to run, prepared as C
/// strings before any fork so the child context does no conversion work.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    argv: Vec<CString>,
}

impl ShellCommand {
    /// Build a command from `[program, arg, ...]`.
    pub fn new(argv: &[&str]) -> Result<Self, PtyError> {
        if argv.is_empty() {
            return Err(PtyError::EmptyCommand);
        }
        let argv = argv
            .iter()
            .map(|arg| CString::new(*arg))
            .collect::<Result<Vec<_>, _>>()
            .map_err(PtyError::Argv)?;
        Ok(Self { argv })
    }

    /// The program path, for diagnostics.
    pub fn program(&self) -> &std::ffi::CStr {
        &self.argv[0]
    }
}

/// Spawn the shell on a fresh pseudo-terminal and return the controlling
/// side.
///
/// The child's entire remaining lifetime is the shell program: it starts a
/// new session, takes the subordinate side as controlling terminal and
/// standard streams, and execs. The parent never regains control in that
/// context and never waits for it; the caller learns the session is over
/// when the returned controller reaches end-of-stream.
///
/// Failures before the fork abort the spawn with no child created. After
/// the fork, a child-side failure is printed there and the child exits
/// without running a shell.
pub fn spawn_shell(cmd: &ShellCommand) -> Result<OwnedFd, PtyError> {
    let pair = PtyPair::open()?;

    match unsafe { fork() }.map_err(PtyError::Fork)? {
        ForkResult::Child => {
            drop(pair.master);
            let err = attach_and_exec(pair.slave, cmd);
            // Only reachable when the attach sequence failed.
            eprintln!("sockshell: {err}");
            unsafe { libc::_exit(1) }
        }
        ForkResult::Parent { .. } => {
            drop(pair.slave);
            log::debug!("spawned shell {:?}", cmd.program());
            Ok(pair.master)
        }
    }
}

/// Child-side tail of [`spawn_shell`]: returns only on failure.
///
/// Order matters: the new session must exist before `TIOCSCTTY` can make
/// the subordinate side the controlling terminal, and the descriptor is
/// closed only after the standard streams hold duplicates of it.
fn attach_and_exec(slave: OwnedFd, cmd: &ShellCommand) -> PtyError {
    if let Err(err) = setsid() {
        return PtyError::NewSession(err);
    }

    let tty = slave.as_raw_fd();
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(tty, target) } < 0 {
            return PtyError::BindStdio(Errno::last());
        }
    }

    if unsafe { libc::ioctl(tty, libc::TIOCSCTTY as _, 0) } < 0 {
        return PtyError::ControllingTty(Errno::last());
    }

    drop(slave);

    match execvp(cmd.program(), &cmd.argv) {
        Ok(never) => match never {},
        Err(err) => PtyError::Exec(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::time::Duration;

    /// Read from the controller until `marker` shows up or the deadline
    /// passes. Pty reads error with EIO once the child is gone, which ends
    /// the loop like end-of-stream does.
    fn read_until(master: OwnedFd, marker: &str, secs: u64) -> String {
        let mut file = std::fs::File::from(master);
        let mut collected = Vec::new();
        let mut buf = [0u8; 4096];
        let deadline = std::time::Instant::now() + Duration::from_secs(secs);

        while std::time::Instant::now() < deadline {
            match file.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    collected.extend_from_slice(&buf[..n]);
                    if String::from_utf8_lossy(&collected).contains(marker) {
                        break;
                    }
                }
            }
        }

        String::from_utf8_lossy(&collected).into_owned()
    }

    #[test]
    fn test_rejects_empty_command() {
        assert!(matches!(
            ShellCommand::new(&[]),
            Err(PtyError::EmptyCommand)
        ));
    }

    #[test]
    fn test_rejects_interior_nul() {
        assert!(matches!(
            ShellCommand::new(&["/bin/sh", "bad\0arg"]),
            Err(PtyError::Argv(_))
        ));
    }

    #[test]
    fn test_spawned_shell_output_reaches_controller() {
        let cmd = ShellCommand::new(&["/bin/sh", "-c", "echo SPAWN_MARKER_OK"]).unwrap();
        let master = spawn_shell(&cmd).unwrap();

        let output = read_until(master, "SPAWN_MARKER_OK", 5);
        assert!(
            output.contains("SPAWN_MARKER_OK"),
            "expected marker in shell output, got: {output:?}"
        );
    }

    #[test]
    fn test_shell_standard_streams_are_a_tty() {
        let cmd = ShellCommand::new(&[
            "/bin/sh",
            "-c",
            "test -t 0 && test -t 1 && test -t 2 && echo IS_A_TTY",
        ])
        .unwrap();
        let master = spawn_shell(&cmd).unwrap();

        let output = read_until(master, "IS_A_TTY", 5);
        assert!(
            output.contains("IS_A_TTY"),
            "shell streams not bound to a terminal, got: {output:?}"
        );
    }

    #[test]
    fn test_controller_sees_end_of_stream_after_exit() {
        let cmd = ShellCommand::new(&["/bin/sh", "-c", "exit 0"]).unwrap();
        let master = spawn_shell(&cmd).unwrap();

        // Once the child exits there are no subordinate-side users left, so
        // the controller reads EOF or EIO rather than blocking forever.
        let output = read_until(master, "NEVER_PRINTED", 5);
        assert!(!output.contains("NEVER_PRINTED"));
    }
}
