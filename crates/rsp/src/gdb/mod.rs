//! GDB remote debugging over TCP.
//!
//! # Usage
//!
//! ```ignore
//! use rsp::gdb::{GdbServer, ServerConfig};
//!
//! let machine = SimMachine::new(MachineConfig::default())?;
//! let mut server = GdbServer::new(machine, ServerConfig::default());
//! server.run()?;  // Blocks until the session ends
//! ```

mod server;

pub use server::{Execute, GdbServer, RunEvent, ServerConfig, SessionEnd, listen_addr};
