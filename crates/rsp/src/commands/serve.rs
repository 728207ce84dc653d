//! Serve command.

use std::path::Path;

use rsp::gdb::{GdbServer, ServerConfig, SessionEnd};
use rsp::sim::{MachineConfig, Xlen};
use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};

pub struct ServeArgs<'a> {
    pub addr: &'a str,
    pub xlen: Xlen,
    pub threads: usize,
    pub memory_base: u64,
    pub memory_size: u64,
    pub image: Option<&'a Path>,
    pub quantum: u64,
    pub slice: u64,
    pub max_insns: Option<u64>,
    pub once: bool,
}

/// Handle the `serve` command.
pub fn cmd_serve(args: &ServeArgs<'_>) -> i32 {
    let Ok(memory_size) = usize::try_from(args.memory_size) else {
        error!(size = args.memory_size, "memory size does not fit this host");
        return EXIT_FAILURE;
    };
    let config = MachineConfig {
        xlen: args.xlen,
        threads: args.threads,
        memory_base: args.memory_base,
        memory_size,
        slice: args.slice.max(1),
        max_insns: args.max_insns,
    };
    let machine = match rsp::sim::boot(config, args.image) {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, image = ?args.image, "failed to prepare machine");
            return EXIT_FAILURE;
        }
    };

    let mut server = GdbServer::new(
        machine,
        ServerConfig {
            addr: args.addr.to_string(),
            quantum: args.quantum.max(1),
            once: args.once,
        },
    );
    match server.run() {
        Ok(SessionEnd::Killed) => {
            info!("killed by debugger, exiting");
            EXIT_SUCCESS
        }
        Ok(SessionEnd::TargetExited(code)) => {
            info!(code, retired = server.machine().retired(), "target exited");
            i32::from(code)
        }
        Ok(SessionEnd::Disconnected) => EXIT_SUCCESS,
        Err(e) => {
            error!(error = %e, "GDB server error");
            EXIT_FAILURE
        }
    }
}
