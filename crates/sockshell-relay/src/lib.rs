//! sockshell-relay: the bidirectional byte relay at the heart of sockshell.
//!
//! Both halves of the tunnel are the same machine: the server splices an
//! accepted connection onto a pty master, the client splices the local
//! terminal onto its connection. [`relay`] is that one machine.

pub mod relay;

pub use relay::{relay, RelayEnd, Side};
