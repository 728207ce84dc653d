use thiserror::Error;

/// Server errors.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol engine error: {0}")]
    Engine(#[from] rsp_engine::EngineError),
    #[error("machine error: {0}")]
    Sim(#[from] crate::sim::SimError),
    #[error("refusing privileged port {0}; use a port of 1024 or above")]
    PrivilegedPort(u16),
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
