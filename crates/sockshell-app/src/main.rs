//! sockshell: tunnel an interactive shell through a Unix socket.
//!
//! A daemon listens on a fixed socket path and attaches a freshly spawned
//! shell to every connection; a client splices the invoking terminal onto
//! that socket. The shell runs with the daemon's privileges and the socket
//! is world-connectable, so a daemon started as root exports a root shell
//! to any local user. That is the tool's purpose; run it accordingly.

mod client;
mod config;
mod server;

use std::path::Path;
use std::process;

use clap::{CommandFactory, Parser, Subcommand};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{fork, ForkResult};

use sockshell_pty::ShellCommand;

use crate::server::Acceptor;

#[derive(Parser)]
#[command(name = "sockshell", about = "Tunnel an interactive shell through a Unix socket")]
struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Detach from the caller and serve a shell to every connection.
    Daemon,
    /// Attach the local terminal to the server's socket.
    Client {
        /// Keep local echo enabled while attached.
        #[arg(long)]
        echo: bool,
    },
}

fn main() {
    env_logger::init();

    // Anything other than a recognized mode prints usage and exits 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(1);
        }
    };

    match cli.mode {
        Some(Mode::Daemon) => run_daemon(),
        Some(Mode::Client { echo }) => run_client(echo),
        None => {
            let _ = Cli::command().print_help();
            process::exit(1);
        }
    }
}

fn run_client(local_echo: bool) {
    if let Err(err) = client::run_client(Path::new(config::SOCKET_PATH), local_echo) {
        eprintln!("sockshell: {err}");
        process::exit(1);
    }
}

fn run_daemon() {
    // Detach from the calling process: the invocation returns to the
    // caller's prompt while the child serves.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => return,
        Ok(ForkResult::Child) => {}
        Err(err) => {
            eprintln!("sockshell: could not detach from caller: {err}");
            process::exit(1);
        }
    }

    // Session workers never wait on their shells; let the kernel reap
    // them so short-lived sessions cannot pile up zombies.
    if let Err(err) = unsafe { signal(Signal::SIGCHLD, SigHandler::SigIgn) } {
        eprintln!("sockshell: could not ignore child exits: {err}");
        process::exit(1);
    }

    let shell = match ShellCommand::new(config::SHELL_ARGV) {
        Ok(shell) => shell,
        Err(err) => {
            eprintln!("sockshell: {err}");
            process::exit(1);
        }
    };

    let acceptor = match Acceptor::bind(Path::new(config::SOCKET_PATH)) {
        Ok(acceptor) => acceptor,
        Err(err) => {
            eprintln!("sockshell: {err}");
            process::exit(1);
        }
    };

    if let Err(err) = acceptor.run(&shell) {
        eprintln!("sockshell: {err}");
        process::exit(1);
    }
}
