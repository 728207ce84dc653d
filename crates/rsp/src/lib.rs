//! RSP - GDB remote debugging server
//!
//! Serves the GDB Remote Serial Protocol over TCP for a simulated
//! multi-threaded RISC-V machine. The protocol itself lives in `rsp-wire`
//! (framing) and `rsp-engine` (session and dispatch); this crate adds the
//! socket loop, the execution backend and the CLI plumbing.
//!
//! # Example
//!
//! ```ignore
//! use rsp::gdb::{GdbServer, ServerConfig};
//! use rsp::sim::{MachineConfig, SimMachine};
//!
//! let machine = SimMachine::new(MachineConfig::default())?;
//! let mut server = GdbServer::new(machine, ServerConfig::default());
//! let end = server.run()?;
//! ```

pub mod error;
pub mod gdb;
pub mod metrics;
pub mod sim;

pub use error::{Result, ServerError};
pub use gdb::{Execute, GdbServer, RunEvent, ServerConfig, SessionEnd};
pub use sim::{MachineConfig, SimMachine, Xlen};
