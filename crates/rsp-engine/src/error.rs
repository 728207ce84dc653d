//! Engine error types.

use thiserror::Error;

/// Failure that ends a session.
///
/// Everything the peer can cause is answered on the wire; only the transport
/// itself can fail the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Register or memory access failure reported by a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no register with index {0}")]
    NoSuchRegister(usize),

    #[error("register {index} expects {expected} bytes, got {actual}")]
    RegisterSize {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("memory access failed at {addr:#x} ({len} bytes)")]
    Memory { addr: u64, len: usize },

    #[error("unknown thread {0:#x}")]
    UnknownThread(u64),
}

/// Breakpoint or watchpoint request failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BreakpointError {
    #[error("breakpoint kind not supported")]
    Unsupported,

    #[error("breakpoint request failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
