//! Scripted provider and wire helpers shared by engine tests.

#![allow(dead_code)]

use std::borrow::Cow;
use std::collections::HashMap;

use rsp_engine::{
    Breakpoint, BreakpointError, Engine, Provider, ProviderError, Status, StepFlags, ThreadId,
};
use rsp_wire::encode_frame;

/// Provider calls observed by a test, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Stop,
    Resume,
    RemoveAllBreakpoints,
    ReadMemory { addr: u64, len: usize },
    WriteMemory { addr: u64, data: Vec<u8> },
    WriteRegister { thread: ThreadId, index: usize, value: Vec<u8> },
    SetPc { thread: ThreadId, pc: u64 },
    SingleStep { thread: ThreadId, flags: Option<StepFlags> },
    InsertBreakpoint(Breakpoint),
    RemoveBreakpoint(Breakpoint),
    Monitor(Vec<u8>),
}

/// In-memory provider with configurable threads, registers and memory.
#[derive(Debug, Default)]
pub struct MockProvider {
    pub threads: Vec<ThreadId>,
    pub register_sizes: Vec<usize>,
    pub memory: HashMap<u64, u8>,
    pub xml: Option<String>,
    pub breakpoints_supported: bool,
    pub monitor_output: Vec<u8>,
    pub calls: Vec<Call>,
}

impl MockProvider {
    pub fn new(threads: u64) -> Self {
        Self {
            threads: (1..=threads).map(ThreadId).collect(),
            register_sizes: vec![4, 4, 8, 4],
            ..Self::default()
        }
    }

    pub fn with_memory(mut self, addr: u64, bytes: &[u8]) -> Self {
        for (offset, &byte) in (0u64..).zip(bytes) {
            self.memory.insert(addr + offset, byte);
        }
        self
    }

    pub fn with_xml(mut self, xml: &str) -> Self {
        self.xml = Some(xml.to_owned());
        self
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn memory_reads(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::ReadMemory { .. }))
            .count()
    }
}

impl Provider for MockProvider {
    fn threads(&mut self) -> Vec<ThreadId> {
        self.threads.clone()
    }

    fn running_thread(&mut self) -> ThreadId {
        self.threads.first().copied().unwrap_or(ThreadId(1))
    }

    fn describe_thread(&mut self, thread: ThreadId) -> String {
        format!("CPU#{} [running]", thread.0 - 1)
    }

    fn thread_alive(&mut self, thread: ThreadId) -> bool {
        self.threads.contains(&thread)
    }

    fn register_count(&self) -> usize {
        self.register_sizes.len()
    }

    fn register_size(&self, index: usize) -> usize {
        self.register_sizes.get(index).copied().unwrap_or(0)
    }

    fn read_register(&mut self, _thread: ThreadId, index: usize) -> Result<Vec<u8>, ProviderError> {
        let size = self
            .register_sizes
            .get(index)
            .copied()
            .ok_or(ProviderError::NoSuchRegister(index))?;
        #[allow(clippy::cast_possible_truncation)]
        Ok((0..size).map(|i| (index * 0x10 + i) as u8).collect())
    }

    fn write_register(
        &mut self,
        thread: ThreadId,
        index: usize,
        value: &[u8],
    ) -> Result<(), ProviderError> {
        self.calls.push(Call::WriteRegister {
            thread,
            index,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn read_memory(
        &mut self,
        _thread: ThreadId,
        addr: u64,
        buf: &mut [u8],
    ) -> Result<(), ProviderError> {
        let len = buf.len();
        self.calls.push(Call::ReadMemory { addr, len });
        for (slot, offset) in buf.iter_mut().zip(0u64..) {
            *slot = *self
                .memory
                .get(&(addr + offset))
                .ok_or(ProviderError::Memory { addr, len })?;
        }
        Ok(())
    }

    fn write_memory(
        &mut self,
        _thread: ThreadId,
        addr: u64,
        data: &[u8],
    ) -> Result<(), ProviderError> {
        self.calls.push(Call::WriteMemory {
            addr,
            data: data.to_vec(),
        });
        for (offset, &byte) in (0u64..).zip(data) {
            self.memory.insert(addr + offset, byte);
        }
        Ok(())
    }

    fn set_pc(&mut self, thread: ThreadId, pc: u64) -> Result<(), ProviderError> {
        self.calls.push(Call::SetPc { thread, pc });
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.push(Call::Stop);
    }

    fn resume(&mut self) {
        self.calls.push(Call::Resume);
    }

    fn set_single_step(&mut self, thread: ThreadId, flags: Option<StepFlags>) {
        self.calls.push(Call::SingleStep { thread, flags });
    }

    fn insert_breakpoint(&mut self, breakpoint: Breakpoint) -> Result<(), BreakpointError> {
        if !self.breakpoints_supported {
            return Err(BreakpointError::Unsupported);
        }
        self.calls.push(Call::InsertBreakpoint(breakpoint));
        Ok(())
    }

    fn remove_breakpoint(&mut self, breakpoint: Breakpoint) -> Result<(), BreakpointError> {
        if !self.breakpoints_supported {
            return Err(BreakpointError::Unsupported);
        }
        if !self
            .calls
            .contains(&Call::InsertBreakpoint(breakpoint))
        {
            return Err(BreakpointError::Failed("not inserted".into()));
        }
        self.calls.push(Call::RemoveBreakpoint(breakpoint));
        Ok(())
    }

    fn remove_all_breakpoints(&mut self) {
        self.calls.push(Call::RemoveAllBreakpoints);
    }

    fn has_feature_documents(&self) -> bool {
        self.xml.is_some()
    }

    fn feature_document(&self, annex: &str) -> Option<Cow<'_, str>> {
        match (annex, &self.xml) {
            ("target.xml", Some(xml)) => Some(Cow::Borrowed(xml.as_str())),
            _ => None,
        }
    }

    fn monitor_command(&mut self, command: &[u8]) -> Vec<u8> {
        self.calls.push(Call::Monitor(command.to_vec()));
        self.monitor_output.clone()
    }
}

pub type TestEngine = Engine<MockProvider, Vec<u8>>;

/// Connected engine over `provider`, with the connect-time output discarded.
pub fn connected(provider: MockProvider) -> TestEngine {
    let mut engine = Engine::new(provider, Vec::new());
    engine.connect();
    engine.provider_mut().calls.clear();
    engine
}

/// Frame `payload` as the debugger would.
pub fn frame(payload: &str) -> Vec<u8> {
    encode_frame(payload.as_bytes())
}

/// Send one command, ACK the reply, and return everything written back.
pub fn exchange(engine: &mut TestEngine, payload: &str) -> Vec<u8> {
    engine.transport_mut().clear();
    let status = engine.receive(&frame(payload)).unwrap();
    assert_eq!(status, Status::Attached, "unexpected kill on {payload}");
    let out = std::mem::take(engine.transport_mut());
    engine.receive(b"+").unwrap();
    out
}

/// Payloads of every `$...#cc` frame in `out`.
pub fn replies(out: &[u8]) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut rest = out;
    while let Some(start) = rest.iter().position(|&b| b == b'$') {
        let body = &rest[start + 1..];
        let end = body
            .iter()
            .position(|&b| b == b'#')
            .expect("unterminated frame");
        payloads.push(String::from_utf8_lossy(&body[..end]).into_owned());
        rest = &body[(end + 3).min(body.len())..];
    }
    payloads
}

/// The single reply to `payload`, after the leading `+`.
pub fn reply(engine: &mut TestEngine, payload: &str) -> String {
    let out = exchange(engine, payload);
    assert_eq!(out.first(), Some(&b'+'), "command not acknowledged");
    let mut all = replies(&out);
    assert_eq!(all.len(), 1, "expected exactly one reply, got {all:?}");
    all.remove(0)
}
