//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rsp::Xlen;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "rsp")]
#[command(about = "GDB remote debugging server for a simulated RISC-V machine")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (debug-level logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve a simulated machine to GDB over TCP
    Serve {
        /// Listen address, `host:port` or `:port` for localhost
        #[arg(value_name = "ADDR", default_value = ":1234")]
        addr: String,

        /// Register width
        #[arg(long, value_enum, default_value = "64")]
        xlen: XlenArg,

        /// Number of hardware threads
        #[arg(short = 't', long, default_value = "1")]
        threads: usize,

        /// Memory base address (hex)
        #[arg(long, default_value = "0x80000000", value_parser = parse_hex)]
        memory_base: u64,

        /// Memory size in bytes (hex)
        #[arg(long, default_value = "0x100000", value_parser = parse_hex)]
        memory_size: u64,

        /// Raw binary image loaded at the memory base
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,

        /// Instructions run between socket polls
        #[arg(long, default_value = "1000")]
        quantum: u64,

        /// Instructions per thread before switching threads
        #[arg(long, default_value = "64")]
        slice: u64,

        /// Exit the target after this many retired instructions
        #[arg(long)]
        max_insns: Option<u64>,

        /// Exit after the first debugger session
        #[arg(long)]
        once: bool,
    },
    /// Print a payload framed as a protocol packet
    Checksum {
        /// Packet payload, e.g. `qSupported`
        payload: String,
    },
}

/// Register width argument.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum XlenArg {
    #[value(name = "32")]
    Rv32,
    #[default]
    #[value(name = "64")]
    Rv64,
}

impl From<XlenArg> for Xlen {
    fn from(arg: XlenArg) -> Self {
        match arg {
            XlenArg::Rv32 => Self::Rv32,
            XlenArg::Rv64 => Self::Rv64,
        }
    }
}

/// Parse a hex number with optional `0x` prefix.
pub fn parse_hex(arg: &str) -> Result<u64, String> {
    let digits = arg
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .replace('_', "");
    u64::from_str_radix(&digits, 16).map_err(|e| format!("invalid hex number '{arg}': {e}"))
}
