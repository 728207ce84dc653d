//! Command dispatcher: one command in, at most one reply out.

use std::io::Write;

use rsp_wire::{MAX_PACKET_LENGTH, ParserState, escape_binary, hex_decode, hex_encode};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::engine::{Disposition, Engine};
use crate::error::{BreakpointError, Result};
use crate::provider::{Breakpoint, BreakpointKind, Provider, StepFlags};
use crate::thread::ThreadId;

/// Bad parameter / unsupported request.
const EINVAL: &str = "E22";
/// Target access failed.
const EFAULT: &str = "E14";
/// Malformed hex payload.
const EBADHEX: &str = "E01";
/// Unknown feature document or offset.
const EBADANNEX: &str = "E00";

/// Largest memory transfer; hex encoding doubles it.
const MAX_MEMORY_TRANSFER: u64 = (MAX_PACKET_LENGTH / 2) as u64;

/// Largest chunk of a feature document per reply.
const MAX_FEATURE_CHUNK: usize = (MAX_PACKET_LENGTH - 5) / 2;

/// Largest monitor output per `O` packet.
const MAX_CONSOLE_CHUNK: usize = MAX_PACKET_LENGTH / 2 - 1;

impl<P: Provider, W: Write> Engine<P, W> {
    pub(crate) fn dispatch(&mut self, line: &[u8]) -> Result<Disposition> {
        let command = Command::parse(line);
        debug!(line = %line.escape_ascii(), ?command, "dispatch");

        match command {
            Command::StopReason => {
                let thread = self.provider.running_thread();
                self.report_trap(thread)?;
                // A fresh debugger is attaching; drop stale breakpoints.
                self.provider.remove_all_breakpoints();
            }
            Command::Continue { addr } => {
                if let Some(pc) = addr {
                    self.set_pc(pc);
                }
                self.resume_target();
            }
            Command::ContinueWithSignal => self.resume_target(),
            Command::Step { addr } => {
                if let Some(pc) = addr {
                    self.set_pc(pc);
                }
                let thread = self.resolve(self.session.step_thread);
                self.provider
                    .set_single_step(thread, Some(self.session.step_flags));
                self.resume_target();
            }
            Command::Detach => {
                self.provider.remove_all_breakpoints();
                self.resume_target();
                self.reply("OK")?;
            }
            Command::Kill => {
                info!("kill requested by peer");
                return Ok(Disposition::Kill);
            }
            Command::ReadRegisters => self.read_registers()?,
            Command::WriteRegisters { hex } => self.write_registers(hex)?,
            Command::ReadRegister { index } if self.session.has_negotiated_xml => {
                self.read_register(index)?;
            }
            Command::WriteRegister { index, hex } if self.session.has_negotiated_xml => {
                self.write_register(index, hex)?;
            }
            Command::ReadMemory { addr, len } => self.read_memory(addr, len)?,
            Command::WriteMemory { addr, len, hex } => self.write_memory(addr, len, hex)?,
            Command::InsertBreakpoint { kind, addr, len } => {
                self.breakpoint(kind, addr, len, true)?;
            }
            Command::RemoveBreakpoint { kind, addr, len } => {
                self.breakpoint(kind, addr, len, false)?;
            }
            Command::SetThread { op, thread } => {
                let thread = self.session.selection_for(thread);
                match op {
                    b'c' => {
                        self.session.step_thread = thread;
                        self.reply("OK")?;
                    }
                    b'g' => {
                        self.session.other_thread = thread;
                        self.reply("OK")?;
                    }
                    _ => self.reply(EINVAL)?,
                }
            }
            Command::ThreadAlive { thread } => {
                let thread = self.resolve(ThreadId(thread));
                if self.provider.thread_alive(thread) {
                    self.reply("OK")?;
                } else {
                    self.reply(EINVAL)?;
                }
            }
            // Always the first thread, as gdb itself assumes.
            Command::CurrentThread => self.reply("QC1")?,
            Command::FirstThreadInfo => {
                self.session.thread_cursor = 0;
                self.thread_info()?;
            }
            Command::NextThreadInfo => self.thread_info()?,
            Command::ThreadExtraInfo { thread } => {
                let thread = self.resolve(ThreadId(thread));
                let mut description = self.provider.describe_thread(thread).into_bytes();
                description.truncate(MAX_PACKET_LENGTH / 2 - 1);
                self.reply(hex_encode(&description))?;
            }
            Command::Monitor { hex } => self.monitor(hex)?,
            Command::Supported => {
                let mut features = format!("PacketSize={MAX_PACKET_LENGTH:x}");
                if self.provider.has_feature_documents() {
                    features.push_str(";qXfer:features:read+");
                }
                self.reply(features)?;
            }
            Command::ReadFeatures { annex, offset, len } if self.provider.has_feature_documents() => {
                self.read_features(annex, offset, len)?;
            }
            Command::Attached => self.reply("1")?,
            Command::StepBits => self.reply(format!(
                "ENABLE={:x},NOIRQ={:x},NOTIMER={:x}",
                StepFlags::ENABLE,
                StepFlags::NOIRQ,
                StepFlags::NOTIMER
            ))?,
            Command::StepFlags => {
                let flags = self.session.step_flags.bits();
                self.reply(format!("0x{flags:x}"))?;
            }
            Command::SetStepFlags { flags } => {
                #[allow(clippy::cast_possible_truncation)]
                let flags = StepFlags(flags as u32);
                self.session.step_flags = flags;
                self.reply("OK")?;
            }
            // Only whole-target stop/continue is supported.
            Command::ContinueActions => self.reply("")?,
            Command::ReadRegister { .. }
            | Command::WriteRegister { .. }
            | Command::ReadFeatures { .. }
            | Command::Unknown => self.reply("")?,
        }
        Ok(Disposition::Parse(ParserState::Idle))
    }

    fn set_pc(&mut self, pc: u64) {
        let thread = self.resolve(self.session.step_thread);
        if let Err(e) = self.provider.set_pc(thread, pc) {
            warn!(%thread, pc = %format_args!("{pc:#x}"), error = %e, "failed to set pc");
        }
    }

    fn read_registers(&mut self) -> Result<()> {
        let thread = self.resolve(self.session.other_thread);
        let mut hex = String::new();
        for index in 0..self.provider.register_count() {
            let size = self.provider.register_size(index);
            if hex.len() + 2 * size > MAX_PACKET_LENGTH {
                warn!(index, "register file exceeds packet size");
                break;
            }
            match self.provider.read_register(thread, index) {
                Ok(bytes) => hex.push_str(&hex_encode(&bytes)),
                Err(e) => {
                    warn!(%thread, index, error = %e, "register read failed");
                    hex.push_str(&"xx".repeat(size));
                }
            }
        }
        self.reply(hex)
    }

    fn write_registers(&mut self, hex: &[u8]) -> Result<()> {
        let thread = self.resolve(self.session.other_thread);
        let data = hex_decode(hex, hex.len() / 2);
        let mut rest = data.as_slice();
        for index in 0..self.provider.register_count() {
            if rest.is_empty() {
                break;
            }
            let size = self.provider.register_size(index);
            if size > rest.len() {
                break;
            }
            let (value, tail) = rest.split_at(size);
            if size > 0
                && let Err(e) = self.provider.write_register(thread, index, value)
            {
                warn!(%thread, index, error = %e, "register write failed");
            }
            rest = tail;
        }
        self.reply("OK")
    }

    fn read_register(&mut self, index: u64) -> Result<()> {
        let thread = self.resolve(self.session.other_thread);
        let Ok(index) = usize::try_from(index) else {
            return self.reply(EFAULT);
        };
        match self.provider.read_register(thread, index) {
            Ok(bytes) if !bytes.is_empty() => self.reply(hex_encode(&bytes)),
            Ok(_) => self.reply(EFAULT),
            Err(e) => {
                debug!(%thread, index, error = %e, "register read failed");
                self.reply(EFAULT)
            }
        }
    }

    fn write_register(&mut self, index: u64, hex: &[u8]) -> Result<()> {
        let thread = self.resolve(self.session.other_thread);
        let value = hex_decode(hex, hex.len() / 2);
        match usize::try_from(index) {
            Ok(index) => {
                if let Err(e) = self.provider.write_register(thread, index, &value) {
                    warn!(%thread, index, error = %e, "register write failed");
                }
            }
            Err(_) => warn!(index, "register index out of range"),
        }
        self.reply("OK")
    }

    fn read_memory(&mut self, addr: u64, len: u64) -> Result<()> {
        if len > MAX_MEMORY_TRANSFER {
            return self.reply(EINVAL);
        }
        let thread = self.resolve(self.session.other_thread);
        #[allow(clippy::cast_possible_truncation)]
        let mut buf = vec![0u8; len as usize];
        match self.provider.read_memory(thread, addr, &mut buf) {
            Ok(()) => self.reply(hex_encode(&buf)),
            Err(e) => {
                debug!(%thread, addr = %format_args!("{addr:#x}"), len, error = %e, "memory read failed");
                self.reply(EFAULT)
            }
        }
    }

    fn write_memory(&mut self, addr: u64, len: u64, hex: &[u8]) -> Result<()> {
        if len > (hex.len() / 2) as u64 {
            return self.reply(EINVAL);
        }
        let thread = self.resolve(self.session.other_thread);
        #[allow(clippy::cast_possible_truncation)]
        let data = hex_decode(hex, len as usize);
        match self.provider.write_memory(thread, addr, &data) {
            Ok(()) => self.reply("OK"),
            Err(e) => {
                debug!(%thread, addr = %format_args!("{addr:#x}"), len, error = %e, "memory write failed");
                self.reply(EFAULT)
            }
        }
    }

    fn breakpoint(&mut self, kind: u64, addr: u64, len: u64, insert: bool) -> Result<()> {
        let result = match BreakpointKind::from_wire(kind) {
            Some(kind) => {
                let breakpoint = Breakpoint { addr, len, kind };
                if insert {
                    self.provider.insert_breakpoint(breakpoint)
                } else {
                    self.provider.remove_breakpoint(breakpoint)
                }
            }
            None => Err(BreakpointError::Unsupported),
        };
        match result {
            Ok(()) => self.reply("OK"),
            Err(BreakpointError::Unsupported) => self.reply(""),
            Err(e) => {
                debug!(kind, addr = %format_args!("{addr:#x}"), error = %e, "breakpoint request failed");
                self.reply(EINVAL)
            }
        }
    }

    fn thread_info(&mut self) -> Result<()> {
        let cursor = self.session.thread_cursor;
        match self.refresh_threads().id_at(cursor) {
            Some(thread) => {
                self.session.thread_cursor = cursor + 1;
                self.reply(format!("m{thread:x}"))
            }
            None => self.reply("l"),
        }
    }

    fn monitor(&mut self, hex: &[u8]) -> Result<()> {
        if hex.len() % 2 != 0 {
            return self.reply(EBADHEX);
        }
        let command = hex_decode(hex, hex.len() / 2);
        debug!(command = %command.escape_ascii(), "monitor command");
        let output = self.provider.monitor_command(&command);
        for chunk in output.chunks(MAX_CONSOLE_CHUNK) {
            self.reply(format!("O{}", hex_encode(chunk)))?;
        }
        self.reply("OK")
    }

    fn read_features(&mut self, annex: &[u8], offset: u64, len: u64) -> Result<()> {
        self.session.has_negotiated_xml = true;
        let annex = String::from_utf8_lossy(annex);
        let len = usize::try_from(len).map_or(MAX_FEATURE_CHUNK, |len| len.min(MAX_FEATURE_CHUNK));
        let payload = self
            .provider
            .feature_document(&annex)
            .and_then(|document| feature_chunk(document.as_bytes(), offset, len));
        match payload {
            Some(payload) => self.reply_binary(&payload),
            None => {
                debug!(%annex, offset, "unknown feature document or offset");
                self.reply(EBADANNEX)
            }
        }
    }
}

/// `m`/`l` reply for `len` bytes of `document` at `offset`; `None` past the end.
fn feature_chunk(document: &[u8], offset: u64, len: usize) -> Option<Vec<u8>> {
    let remaining = document.get(usize::try_from(offset).ok()?..)?;
    let mut payload = Vec::with_capacity(len + 1);
    if len < remaining.len() {
        payload.push(b'm');
        payload.extend(escape_binary(&remaining[..len]));
    } else {
        payload.push(b'l');
        payload.extend(escape_binary(remaining));
    }
    Some(payload)
}
