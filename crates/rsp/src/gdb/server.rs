//! TCP listener and the blocking run/interrupt loop.

use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use metrics::counter;
use rsp_engine::{Engine, EngineError, Provider, Status};
use rsp_wire::MAX_PACKET_LENGTH;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};

/// Lowest port the server will listen on.
const MIN_PORT: u16 = 1024;

/// Outcome of advancing a running target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEvent {
    /// Still running (or was not running at all).
    Running,
    /// Stopped on a breakpoint or finished step; `ordinal` is the thread's
    /// position in the thread list.
    Stopped { ordinal: usize },
    Exited(u8),
}

/// Execution backend that can be advanced in bounded slices.
pub trait Execute {
    /// Run at most `quantum` instructions.
    fn run_for(&mut self, quantum: u64) -> RunEvent;
}

/// Why a debugging session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    Disconnected,
    Killed,
    TargetExited(u8),
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// `host:port`, or `:port` for localhost.
    pub addr: String,
    /// Instructions to run between socket polls.
    pub quantum: u64,
    /// Stop after the first session instead of accepting another.
    pub once: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ":1234".into(),
            quantum: 1000,
            once: false,
        }
    }
}

/// Resolve a listen address, refusing privileged ports.
///
/// # Errors
///
/// Fails if the address does not resolve or names a port below 1024.
/// Port 0 (pick any free port) is allowed.
pub fn listen_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("127.0.0.1{addr}")
    } else {
        addr.to_string()
    };
    let resolved = addr
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ServerError::InvalidAddress(addr.clone()))?;
    let port = resolved.port();
    if (1..MIN_PORT).contains(&port) {
        return Err(ServerError::PrivilegedPort(port));
    }
    Ok(resolved)
}

/// Whether a byte is waiting on `stream`, without blocking.
///
/// End-of-stream counts as readable so that the next read observes it.
fn poll_incoming(stream: &TcpStream) -> io::Result<bool> {
    stream.set_nonblocking(true)?;
    let mut byte = [0u8; 1];
    let result = stream.peek(&mut byte);
    stream.set_nonblocking(false)?;
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_hangup(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}

/// GDB server driving one machine across debugger connections.
pub struct GdbServer<M> {
    machine: M,
    config: ServerConfig,
}

impl<M: Provider + Execute> GdbServer<M> {
    pub const fn new(machine: M, config: ServerConfig) -> Self {
        Self { machine, config }
    }

    #[must_use]
    pub const fn machine(&self) -> &M {
        &self.machine
    }

    #[must_use]
    pub fn into_machine(self) -> M {
        self.machine
    }

    /// Bind the configured address and serve until a session ends the
    /// target (kill or exit), or after one session with `once`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid address, bind failure, or socket error.
    pub fn run(&mut self) -> Result<SessionEnd> {
        let addr = listen_addr(&self.config.addr)?;
        let listener = TcpListener::bind(addr)?;
        info!(addr = %listener.local_addr()?, "waiting for debugger connection");
        self.serve_listener(&listener)
    }

    /// Accept loop over an already bound listener.
    ///
    /// # Errors
    ///
    /// Fails on accept or socket errors.
    pub fn serve_listener(&mut self, listener: &TcpListener) -> Result<SessionEnd> {
        loop {
            let (stream, peer) = listener.accept()?;
            info!(%peer, "debugger connected");
            let end = self.serve(stream)?;
            info!(?end, "session ended");
            match end {
                SessionEnd::Disconnected if !self.config.once => {}
                _ => return Ok(end),
            }
        }
    }

    /// Run one session over `stream` until the peer leaves, kills the
    /// target, or the target exits.
    ///
    /// # Errors
    ///
    /// Fails on socket errors other than the peer hanging up.
    pub fn serve(&mut self, stream: TcpStream) -> Result<SessionEnd> {
        counter!("rsp_sessions_total").increment(1);
        stream.set_nodelay(true)?;
        let mut reader = stream.try_clone()?;
        let quantum = self.config.quantum;

        let mut engine = Engine::new(&mut self.machine, stream);
        engine.connect();

        let result = drive(&mut engine, &mut reader, quantum);
        match result {
            Err(ServerError::Engine(EngineError::Transport(e)) | ServerError::Io(e))
                if is_hangup(&e) =>
            {
                debug!(error = %e, "peer hung up");
                engine.disconnect();
                Ok(SessionEnd::Disconnected)
            }
            other => other,
        }
    }
}

fn drive<P: Provider + Execute>(
    engine: &mut Engine<&mut P, TcpStream>,
    reader: &mut TcpStream,
    quantum: u64,
) -> Result<SessionEnd> {
    let mut buf = [0u8; MAX_PACKET_LENGTH];
    loop {
        if engine.is_target_running() && !poll_incoming(reader)? {
            match engine.provider_mut().run_for(quantum) {
                RunEvent::Running => {}
                RunEvent::Stopped { ordinal } => engine.target_stopped(ordinal)?,
                RunEvent::Exited(code) => {
                    engine.target_exited(code)?;
                    return Ok(SessionEnd::TargetExited(code));
                }
            }
            continue;
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => {
                engine.disconnect();
                return Ok(SessionEnd::Disconnected);
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if engine.receive(&buf[..n])? == Status::Killed {
            warn!("target killed by debugger");
            return Ok(SessionEnd::Killed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addr_shorthand() {
        let addr = listen_addr(":1234").unwrap();
        assert_eq!(addr, "127.0.0.1:1234".parse::<SocketAddr>().unwrap());
        let addr = listen_addr("0.0.0.0:4000").unwrap();
        assert_eq!(addr.port(), 4000);
    }

    #[test]
    fn test_listen_addr_refuses_privileged_ports() {
        assert!(matches!(
            listen_addr(":80"),
            Err(ServerError::PrivilegedPort(80))
        ));
        assert!(matches!(
            listen_addr(":1023"),
            Err(ServerError::PrivilegedPort(1023))
        ));
        assert_eq!(listen_addr(":0").unwrap().port(), 0);
    }

    #[test]
    fn test_listen_addr_invalid() {
        assert!(matches!(
            listen_addr("not an address"),
            Err(ServerError::InvalidAddress(_))
        ));
    }
}
