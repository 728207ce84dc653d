//! GDB Remote Serial Protocol engine.
//!
//! The engine sits between a byte transport and an execution backend. It
//! parses inbound frames, acknowledges them, dispatches each command to a
//! [`Provider`] and writes the reply back. It also reports asynchronous
//! stops and exits coming from the backend.
//!
//! # Example
//!
//! ```ignore
//! use rsp_engine::{Engine, Status};
//!
//! let mut engine = Engine::new(&mut machine, stream);
//! engine.connect();
//! if engine.receive(b"$?#3f")? == Status::Killed {
//!     return Ok(());
//! }
//! ```

mod command;
mod dispatch;
mod engine;
mod error;
mod provider;
mod reply;
mod session;
mod thread;

pub use command::Command;
pub use engine::{Engine, SIGNAL_TRAP, Status};
pub use error::{BreakpointError, EngineError, ProviderError, Result};
pub use provider::{Breakpoint, BreakpointKind, Provider, StepFlags};
pub use reply::ReplySender;
pub use session::Session;
pub use thread::{ThreadId, ThreadList};
