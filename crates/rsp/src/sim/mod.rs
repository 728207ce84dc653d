//! Simulated RISC-V target.
//!
//! A flat memory plus N hardware threads sharing one core. Threads are
//! scheduled round-robin in fixed slices; "executing" an instruction retires
//! it and advances the pc. This is enough to exercise every debugger
//! operation: breakpoints, single-step, interrupts, register and memory
//! access, and exit.
//!
//! # Usage
//!
//! ```ignore
//! use rsp::sim::{MachineConfig, SimMachine, Xlen};
//!
//! let mut machine = SimMachine::new(MachineConfig {
//!     xlen: Xlen::Rv64,
//!     threads: 2,
//!     ..MachineConfig::default()
//! })?;
//! machine.load_image(&std::fs::read("firmware.bin")?)?;
//!
//! // Or in one go, as the `serve` command does
//! let machine = rsp::sim::boot(MachineConfig::default(), Some(Path::new("firmware.bin")))?;
//! ```

mod machine;
mod monitor;

pub use machine::{REGISTER_COUNT, SimMachine};

use std::path::Path;

use thiserror::Error;
use tracing::info;

/// Simulated machine errors.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("machine needs at least one thread")]
    NoThreads,

    #[error("memory size must be non-zero")]
    NoMemory,

    #[error("image of {len} bytes does not fit in {size} bytes of memory")]
    ImageTooLarge { len: usize, size: usize },

    #[error("memory range {base:#x}+{size:#x} overflows the address space")]
    MemoryRange { base: u64, size: usize },
}

pub type Result<T> = std::result::Result<T, SimError>;

/// Register width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Xlen {
    Rv32,
    #[default]
    Rv64,
}

impl Xlen {
    /// Register width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Rv32 => 4,
            Self::Rv64 => 8,
        }
    }

    /// Truncate `value` to the register width.
    #[must_use]
    pub const fn mask(self, value: u64) -> u64 {
        match self {
            Self::Rv32 => value & 0xffff_ffff,
            Self::Rv64 => value,
        }
    }
}

/// Machine shape and run limits.
#[derive(Clone, Debug)]
pub struct MachineConfig {
    pub xlen: Xlen,
    pub threads: usize,
    pub memory_base: u64,
    pub memory_size: usize,
    /// Instructions per thread before the scheduler moves on.
    pub slice: u64,
    /// Retired-instruction budget; the target exits once it is spent.
    pub max_insns: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            xlen: Xlen::Rv64,
            threads: 1,
            memory_base: 0x8000_0000,
            memory_size: 1 << 20,
            slice: 64,
            max_insns: None,
        }
    }
}

/// Create a machine and load the raw image file at `image`, if any.
///
/// # Errors
///
/// Fails if the configuration is invalid, the file cannot be read, or the
/// image does not fit in memory.
pub fn boot(config: MachineConfig, image: Option<&Path>) -> crate::Result<SimMachine> {
    let mut machine = SimMachine::new(config)?;
    if let Some(path) = image {
        let bytes = std::fs::read(path)?;
        machine.load_image(&bytes)?;
        info!(path = %path.display(), "image file loaded");
    }
    Ok(machine)
}
