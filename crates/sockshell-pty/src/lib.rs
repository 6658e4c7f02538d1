//! sockshell-pty: pseudo-terminal allocation and shell spawning.
//!
//! The server side of sockshell gives every accepted connection its own
//! shell on its own pseudo-terminal. This crate owns that sequence:
//!
//! - [`PtyPair`] -- allocate a controlling/subordinate pty pair with the
//!   descriptor hygiene the multi-session server needs.
//! - [`ShellCommand`] -- the argv of the shell program, prepared up front
//!   so the post-fork child has nothing left to get wrong.
//! - [`spawn_shell`] -- fork, make the subordinate side the child's
//!   controlling terminal and standard streams, exec the shell, and hand
//!   the controlling side back to the caller.

pub mod pty;
pub mod shell;

pub use pty::{PtyError, PtyPair};
pub use shell::{spawn_shell, ShellCommand};
