//! Protocol engine: byte intake, run-state tracking and stop reporting.

use std::io::Write;

use metrics::counter;
use rsp_wire::{ACK, NAK, ParserState, Verdict};
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::provider::Provider;
use crate::session::Session;
use crate::thread::{ThreadId, ThreadList};

/// GDB signal number reported for traps and interrupts.
pub const SIGNAL_TRAP: u8 = 5;

/// Whether the session is still attached after some input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Attached,
    /// Peer sent `k`; the caller is expected to terminate.
    Killed,
}

/// What the parser does after a command has been dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Disposition {
    Parse(ParserState),
    Kill,
}

/// One protocol session bound to a provider and an outbound transport.
///
/// The inbound side of the transport is driven by the caller through
/// [`Engine::connect`], [`Engine::receive`] and [`Engine::disconnect`]; stop
/// and exit events from the execution backend arrive through
/// [`Engine::target_stopped`] and [`Engine::target_exited`].
pub struct Engine<P, W> {
    pub(crate) provider: P,
    pub(crate) transport: W,
    pub(crate) session: Session,
}

impl<P: Provider, W: Write> Engine<P, W> {
    #[must_use]
    pub fn new(provider: P, transport: W) -> Self {
        Self {
            provider,
            transport,
            session: Session::new(),
        }
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    pub const fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    #[must_use]
    pub const fn transport(&self) -> &W {
        &self.transport
    }

    pub const fn transport_mut(&mut self) -> &mut W {
        &mut self.transport
    }

    #[must_use]
    pub const fn is_target_running(&self) -> bool {
        self.session.target_running
    }

    /// A peer connected: start a fresh session with the target stopped.
    pub fn connect(&mut self) {
        self.session.reset();
        self.stop_target();
        self.session.running_thread = self.provider.running_thread();
        info!(
            thread = %self.session.running_thread,
            threads = self.session.threads.as_ref().map_or(0, ThreadList::len),
            "session started"
        );
    }

    /// The peer went away. Pending replies and partial frames are dropped.
    pub fn disconnect(&mut self) {
        info!("session ended");
        self.session.reset();
    }

    /// Feed inbound bytes in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the transport fails.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Status> {
        counter!("rsp_bytes_received_total").increment(bytes.len() as u64);
        for &byte in bytes {
            if self.receive_byte(byte)? == Status::Killed {
                return Ok(Status::Killed);
            }
        }
        Ok(Status::Attached)
    }

    fn receive_byte(&mut self, byte: u8) -> Result<Status> {
        trace!(byte = %byte.escape_ascii(), "rx");

        if self.session.replies.is_pending() {
            match byte {
                NAK => self.session.replies.retransmit(&mut self.transport)?,
                ACK | b'$' => self.session.replies.acknowledge(),
                _ => {}
            }
            if byte != b'$' {
                return Ok(Status::Attached);
            }
        }

        if self.session.target_running {
            // Any byte at all interrupts a running target.
            counter!("rsp_interrupts_total").increment(1);
            debug!("interrupt while running");
            self.stop_target();
            let thread = self.provider.running_thread();
            self.report_trap(thread)?;
            return Ok(Status::Attached);
        }

        match self.session.parser.feed(byte) {
            None => Ok(Status::Attached),
            Some(Verdict::Nak) => {
                counter!("rsp_naks_sent_total").increment(1);
                self.write_raw(NAK)?;
                Ok(Status::Attached)
            }
            Some(Verdict::Ack) => {
                counter!("rsp_packets_received_total").increment(1);
                self.write_raw(ACK)?;
                let line = self.session.parser.line().to_vec();
                match self.dispatch(&line)? {
                    Disposition::Parse(state) => {
                        self.session.parser.set_state(state);
                        Ok(Status::Attached)
                    }
                    Disposition::Kill => Ok(Status::Killed),
                }
            }
        }
    }

    /// The backend stopped on its own (breakpoint, finished step).
    ///
    /// `ordinal` is the stopping thread's position in the thread list. An
    /// ordinal outside the list is reported as a trap on the running thread.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the transport fails.
    pub fn target_stopped(&mut self, ordinal: usize) -> Result<()> {
        let Some(thread) = self.refresh_threads().id_at(ordinal) else {
            warn!(ordinal, "stop reported for unknown thread ordinal");
            self.stop_target();
            let thread = self.provider.running_thread();
            return self.report_trap(thread);
        };
        debug!(ordinal, %thread, "target stopped");

        self.session.step_thread = thread;
        self.session.other_thread = thread;
        self.reply(format!("T{SIGNAL_TRAP:02x}thread:{thread:02x};"))?;

        self.provider.set_single_step(thread, None);
        self.stop_target();
        Ok(())
    }

    /// The debugged process exited with `code`; the session is over.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the transport fails.
    pub fn target_exited(&mut self, code: u8) -> Result<()> {
        info!(code, "target exited");
        self.session.target_running = false;
        self.reply(format!("W{code:02x}"))
    }

    /// Report a trap on `thread` and remember it as the running thread.
    pub(crate) fn report_trap(&mut self, thread: ThreadId) -> Result<()> {
        self.session.running_thread = thread;
        debug!(
            %thread,
            ordinal = ?self.session.threads.as_ref().and_then(|t| t.ordinal_of(thread)),
            "reporting trap"
        );
        self.reply(format!("T{SIGNAL_TRAP:02x}thread:{thread:x};"))
    }

    pub(crate) fn stop_target(&mut self) {
        self.provider.stop();
        self.session.target_running = false;
        self.refresh_threads();
    }

    pub(crate) fn resume_target(&mut self) {
        self.provider.resume();
        self.session.target_running = true;
        self.session.threads = None;
    }

    /// Thread snapshot for the current stop, enumerating if needed.
    pub(crate) fn refresh_threads(&mut self) -> &ThreadList {
        let provider = &mut self.provider;
        self.session
            .threads
            .get_or_insert_with(|| ThreadList::new(provider.threads()))
    }

    /// Map [`ThreadId::ANY`] to the thread on the first core.
    pub(crate) fn resolve(&mut self, thread: ThreadId) -> ThreadId {
        if thread.is_any() {
            self.provider.running_thread()
        } else {
            thread
        }
    }

    pub(crate) fn reply(&mut self, payload: impl AsRef<[u8]>) -> Result<()> {
        self.session
            .replies
            .send(&mut self.transport, payload.as_ref())?;
        Ok(())
    }

    pub(crate) fn reply_binary(&mut self, payload: &[u8]) -> Result<()> {
        self.session
            .replies
            .send_binary(&mut self.transport, payload)?;
        Ok(())
    }

    fn write_raw(&mut self, byte: u8) -> Result<()> {
        self.transport.write_all(&[byte])?;
        self.transport.flush()?;
        Ok(())
    }
}
