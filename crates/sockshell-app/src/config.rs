//! Build-target configuration: where the channel lives and which shell
//! serves it. Fixed at compile time; the CLI deliberately exposes no way
//! to override either.

#[cfg(not(target_os = "android"))]
pub const SOCKET_PATH: &str = "/tmp/sockshell.sock";
#[cfg(target_os = "android")]
pub const SOCKET_PATH: &str = "/data/misc/sockshell.sock";

#[cfg(not(target_os = "android"))]
pub const SHELL_ARGV: &[&str] = &["/bin/bash", "-i"];
#[cfg(target_os = "android")]
pub const SHELL_ARGV: &[&str] = &["/system/bin/sh", "-i"];
