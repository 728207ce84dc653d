//! Command implementations.

mod serve;

use crate::cli::{Cli, Commands, EXIT_SUCCESS};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Serve { .. } => handle_serve(cli),
        Commands::Checksum { payload } => handle_checksum(payload),
    }
}

fn handle_serve(cli: &Cli) -> i32 {
    let Commands::Serve {
        addr,
        xlen,
        threads,
        memory_base,
        memory_size,
        image,
        quantum,
        slice,
        max_insns,
        once,
    } = &cli.command
    else {
        unreachable!("serve command variant mismatch");
    };

    serve::cmd_serve(&serve::ServeArgs {
        addr,
        xlen: (*xlen).into(),
        threads: *threads,
        memory_base: *memory_base,
        memory_size: *memory_size,
        image: image.as_deref(),
        quantum: *quantum,
        slice: *slice,
        max_insns: *max_insns,
        once: *once,
    })
}

fn handle_checksum(payload: &str) -> i32 {
    let frame = rsp_wire::encode_frame(payload.as_bytes());
    println!("{}", String::from_utf8_lossy(&frame));
    EXIT_SUCCESS
}
