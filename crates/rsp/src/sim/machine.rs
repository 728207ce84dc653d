//! Simulated machine state and its debugger-facing operations.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::ops::Range;

use gdbstub::arch::Arch;
use gdbstub_arch::riscv::reg::RiscvCoreRegs;
use gdbstub_arch::riscv::{Riscv32, Riscv64};
use metrics::counter;
use rsp_engine::{
    Breakpoint, BreakpointError, BreakpointKind, Provider, ProviderError, StepFlags, ThreadId,
};
use rustc_hash::FxHashSet;
use tracing::{debug, info, trace, warn};

use super::monitor::{ABI_NAMES, HELP, MonitorCommand};
use super::{MachineConfig, Result, SimError, Xlen};
use crate::gdb::{Execute, RunEvent};

/// `x0`..`x31` followed by `pc`.
pub const REGISTER_COUNT: usize = 33;

const PC: usize = 32;
const A0: usize = 10;
const INSN_BYTES: u64 = 4;
const HW_BREAKPOINT_SLOTS: usize = 4;

/// One hardware thread.
#[derive(Debug)]
struct Hart {
    id: ThreadId,
    regs: RiscvCoreRegs<u64>,
    step: Option<StepFlags>,
    /// pc at the last resume; a breakpoint there is not re-reported.
    resumed_at: Option<u64>,
    retired: u64,
}

impl Hart {
    const fn new(id: ThreadId, pc: u64) -> Self {
        Self {
            id,
            regs: RiscvCoreRegs { x: [0; 32], pc },
            step: None,
            resumed_at: None,
            retired: 0,
        }
    }
}

/// Multi-threaded register-file/memory machine.
pub struct SimMachine {
    config: MachineConfig,
    harts: Vec<Hart>,
    memory: Vec<u8>,
    image: Vec<u8>,
    sw_breakpoints: FxHashSet<u64>,
    hw_breakpoints: FxHashSet<u64>,
    /// Hart currently scheduled on the core.
    current: usize,
    slice_used: u64,
    running: bool,
    retired: u64,
}

impl SimMachine {
    /// Create a machine with zeroed memory and every pc at the memory base.
    ///
    /// # Errors
    ///
    /// Fails if the configuration has no threads or no memory, or if the
    /// memory range does not fit the address space.
    pub fn new(config: MachineConfig) -> Result<Self> {
        if config.threads == 0 {
            return Err(SimError::NoThreads);
        }
        if config.memory_size == 0 {
            return Err(SimError::NoMemory);
        }
        let end = u64::try_from(config.memory_size)
            .ok()
            .and_then(|size| config.memory_base.checked_add(size));
        if end.is_none() {
            return Err(SimError::MemoryRange {
                base: config.memory_base,
                size: config.memory_size,
            });
        }

        let harts = (1..)
            .take(config.threads)
            .map(|id| Hart::new(ThreadId(id), config.memory_base))
            .collect();
        info!(
            xlen = config.xlen.bytes() * 8,
            threads = config.threads,
            base = %format_args!("{:#x}", config.memory_base),
            size = config.memory_size,
            "machine created"
        );
        Ok(Self {
            memory: vec![0; config.memory_size],
            harts,
            image: Vec::new(),
            sw_breakpoints: FxHashSet::default(),
            hw_breakpoints: FxHashSet::default(),
            current: 0,
            slice_used: 0,
            running: false,
            retired: 0,
            config,
        })
    }

    /// Copy a raw image to the start of memory. `reset` reloads it.
    ///
    /// # Errors
    ///
    /// Fails if the image is larger than memory.
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.memory.len() {
            return Err(SimError::ImageTooLarge {
                len: bytes.len(),
                size: self.memory.len(),
            });
        }
        self.image = bytes.to_vec();
        self.memory[..bytes.len()].copy_from_slice(bytes);
        info!(len = bytes.len(), "image loaded");
        Ok(())
    }

    /// Back to power-on state: memory reloaded, threads at the base address.
    pub fn reset(&mut self) {
        self.memory.fill(0);
        self.memory[..self.image.len()].copy_from_slice(&self.image);
        for hart in &mut self.harts {
            *hart = Hart::new(hart.id, self.config.memory_base);
        }
        self.current = 0;
        self.slice_used = 0;
        self.running = false;
        self.retired = 0;
        info!("machine reset");
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Instructions retired by all threads since the last reset.
    #[must_use]
    pub const fn retired(&self) -> u64 {
        self.retired
    }

    #[must_use]
    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.harts.iter().map(|h| h.id).collect()
    }

    fn hart_index(&self, thread: ThreadId) -> std::result::Result<usize, ProviderError> {
        self.harts
            .iter()
            .position(|h| h.id == thread)
            .ok_or(ProviderError::UnknownThread(thread.0))
    }

    /// Memory offsets backing `[addr, addr + len)`.
    fn translate(&self, addr: u64, len: usize) -> Option<Range<usize>> {
        let start = usize::try_from(addr.checked_sub(self.config.memory_base)?).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.memory.len()).then_some(start..end)
    }

    fn width(&self) -> usize {
        self.config.xlen.bytes()
    }

    fn stepping_hart(&self) -> Option<usize> {
        self.harts.iter().position(|h| h.step.is_some())
    }

    fn advance_scheduler(&mut self) {
        self.slice_used += 1;
        if self.slice_used >= self.config.slice {
            self.slice_used = 0;
            self.current = (self.current + 1) % self.harts.len();
            trace!(current = self.current, "switched thread");
        }
    }

    /// Retire one instruction on hart `index`, or stop before it.
    fn execute_one(&mut self, index: usize) -> Option<RunEvent> {
        let xlen = self.config.xlen;
        let hart = &mut self.harts[index];
        let pc = hart.regs.pc;

        let resumed_here = hart.resumed_at.take() == Some(pc);
        if !resumed_here && (self.sw_breakpoints.contains(&pc) || self.hw_breakpoints.contains(&pc))
        {
            debug!(thread = %hart.id, pc = %format_args!("{pc:#x}"), "breakpoint hit");
            self.running = false;
            return Some(RunEvent::Stopped { ordinal: index });
        }

        hart.regs.pc = xlen.mask(pc.wrapping_add(INSN_BYTES));
        hart.retired += 1;
        let stepping = hart.step.is_some();
        self.retired += 1;

        if let Some(limit) = self.config.max_insns
            && self.retired >= limit
        {
            self.running = false;
            #[allow(clippy::cast_possible_truncation)]
            let code = self.harts[0].regs.x[A0] as u8;
            info!(retired = self.retired, code, "instruction budget spent");
            return Some(RunEvent::Exited(code));
        }
        if stepping {
            self.running = false;
            return Some(RunEvent::Stopped { ordinal: index });
        }
        None
    }

    fn monitor(&mut self, command: &MonitorCommand) -> String {
        let mut out = String::new();
        match command {
            MonitorCommand::Help => out.push_str(HELP),
            MonitorCommand::Threads => {
                for (ordinal, hart) in self.harts.iter().enumerate() {
                    let marker = if ordinal == self.current { '*' } else { ' ' };
                    let _ = writeln!(
                        out,
                        "{marker} {ordinal} thread {:x} pc={:#x} retired={}",
                        hart.id, hart.regs.pc, hart.retired
                    );
                }
            }
            MonitorCommand::Regs => {
                let hart = &self.harts[self.current];
                let digits = self.width() * 2;
                for (chunk, names) in hart.regs.x.chunks(4).zip(ABI_NAMES.chunks(4)) {
                    for (value, name) in chunk.iter().zip(names) {
                        let _ = write!(out, "{name:>4}={value:0digits$x} ");
                    }
                    out.push('\n');
                }
                let _ = writeln!(out, "  pc={:0digits$x}", hart.regs.pc);
            }
            MonitorCommand::Reset => {
                self.reset();
                out.push_str("machine reset\n");
            }
            MonitorCommand::Unknown(other) => {
                let _ = writeln!(out, "unknown command '{other}', try 'help'");
            }
        }
        out
    }
}

impl Execute for SimMachine {
    fn run_for(&mut self, quantum: u64) -> RunEvent {
        if !self.running {
            return RunEvent::Running;
        }
        let before = self.retired;
        let mut event = RunEvent::Running;
        for _ in 0..quantum {
            let pinned = self.stepping_hart();
            if let Some(stop) = self.execute_one(pinned.unwrap_or(self.current)) {
                event = stop;
                break;
            }
            if pinned.is_none() {
                self.advance_scheduler();
            }
        }
        counter!("rsp_target_instructions_total").increment(self.retired - before);
        event
    }
}

impl Provider for SimMachine {
    fn threads(&mut self) -> Vec<ThreadId> {
        self.thread_ids()
    }

    fn running_thread(&mut self) -> ThreadId {
        self.harts[self.current].id
    }

    fn describe_thread(&mut self, thread: ThreadId) -> String {
        match self.hart_index(thread) {
            Ok(index) => {
                let hart = &self.harts[index];
                let state = if hart.step.is_some() {
                    "stepping"
                } else if index == self.current {
                    "current"
                } else {
                    "waiting"
                };
                format!("hart {index} [{state}] pc={:#x}", hart.regs.pc)
            }
            Err(e) => e.to_string(),
        }
    }

    fn thread_alive(&mut self, thread: ThreadId) -> bool {
        self.hart_index(thread).is_ok()
    }

    fn register_count(&self) -> usize {
        REGISTER_COUNT
    }

    fn register_size(&self, index: usize) -> usize {
        if index < REGISTER_COUNT {
            self.width()
        } else {
            0
        }
    }

    fn read_register(
        &mut self,
        thread: ThreadId,
        index: usize,
    ) -> std::result::Result<Vec<u8>, ProviderError> {
        let hart = &self.harts[self.hart_index(thread)?];
        let value = match index {
            PC => hart.regs.pc,
            i if i < PC => hart.regs.x[i],
            _ => return Err(ProviderError::NoSuchRegister(index)),
        };
        Ok(value.to_le_bytes()[..self.width()].to_vec())
    }

    fn write_register(
        &mut self,
        thread: ThreadId,
        index: usize,
        value: &[u8],
    ) -> std::result::Result<(), ProviderError> {
        let width = self.width();
        if index >= REGISTER_COUNT {
            return Err(ProviderError::NoSuchRegister(index));
        }
        if value.len() != width {
            return Err(ProviderError::RegisterSize {
                index,
                expected: width,
                actual: value.len(),
            });
        }
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(value);
        let value = u64::from_le_bytes(raw);

        let hart_index = self.hart_index(thread)?;
        let regs = &mut self.harts[hart_index].regs;
        match index {
            PC => regs.pc = value,
            // x0 is hardwired to zero
            0 => {}
            i => regs.x[i] = value,
        }
        Ok(())
    }

    fn read_memory(
        &mut self,
        thread: ThreadId,
        addr: u64,
        buf: &mut [u8],
    ) -> std::result::Result<(), ProviderError> {
        self.hart_index(thread)?;
        let range = self.translate(addr, buf.len()).ok_or(ProviderError::Memory {
            addr,
            len: buf.len(),
        })?;
        buf.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    fn write_memory(
        &mut self,
        thread: ThreadId,
        addr: u64,
        data: &[u8],
    ) -> std::result::Result<(), ProviderError> {
        self.hart_index(thread)?;
        let range = self.translate(addr, data.len()).ok_or(ProviderError::Memory {
            addr,
            len: data.len(),
        })?;
        self.memory[range].copy_from_slice(data);
        Ok(())
    }

    fn set_pc(&mut self, thread: ThreadId, pc: u64) -> std::result::Result<(), ProviderError> {
        let index = self.hart_index(thread)?;
        self.harts[index].regs.pc = self.config.xlen.mask(pc);
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        for hart in &mut self.harts {
            hart.resumed_at = None;
        }
    }

    fn resume(&mut self) {
        self.running = true;
        for hart in &mut self.harts {
            hart.resumed_at = Some(hart.regs.pc);
        }
    }

    fn set_single_step(&mut self, thread: ThreadId, flags: Option<StepFlags>) {
        let index = match self.hart_index(thread) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "cannot change single-step");
                return;
            }
        };
        // Without ENABLE a step request runs like a continue.
        self.harts[index].step = flags.filter(|f| f.contains(StepFlags::ENABLE));
    }

    fn insert_breakpoint(
        &mut self,
        breakpoint: Breakpoint,
    ) -> std::result::Result<(), BreakpointError> {
        let addr = breakpoint.addr;
        if breakpoint.kind.is_watchpoint() {
            return Err(BreakpointError::Unsupported);
        }
        if breakpoint.kind == BreakpointKind::Hardware {
            if !self.hw_breakpoints.contains(&addr)
                && self.hw_breakpoints.len() >= HW_BREAKPOINT_SLOTS
            {
                return Err(BreakpointError::Failed(format!(
                    "all {HW_BREAKPOINT_SLOTS} hardware breakpoint slots in use"
                )));
            }
            self.hw_breakpoints.insert(addr);
        } else {
            self.sw_breakpoints.insert(addr);
        }
        debug!(kind = ?breakpoint.kind, addr = %format_args!("{addr:#x}"), "breakpoint inserted");
        Ok(())
    }

    fn remove_breakpoint(
        &mut self,
        breakpoint: Breakpoint,
    ) -> std::result::Result<(), BreakpointError> {
        let addr = breakpoint.addr;
        if breakpoint.kind.is_watchpoint() {
            return Err(BreakpointError::Unsupported);
        }
        let slots = if breakpoint.kind == BreakpointKind::Hardware {
            &mut self.hw_breakpoints
        } else {
            &mut self.sw_breakpoints
        };
        if slots.remove(&addr) {
            Ok(())
        } else {
            Err(BreakpointError::Failed(format!("no breakpoint at {addr:#x}")))
        }
    }

    fn remove_all_breakpoints(&mut self) {
        self.sw_breakpoints.clear();
        self.hw_breakpoints.clear();
    }

    fn has_feature_documents(&self) -> bool {
        true
    }

    fn feature_document(&self, annex: &str) -> Option<Cow<'_, str>> {
        if annex != "target.xml" {
            return None;
        }
        let xml = match self.config.xlen {
            Xlen::Rv32 => Riscv32::target_description_xml(),
            Xlen::Rv64 => Riscv64::target_description_xml(),
        };
        xml.map(Cow::Borrowed)
    }

    fn monitor_command(&mut self, command: &[u8]) -> Vec<u8> {
        let command = MonitorCommand::parse(command);
        debug!(?command, "monitor");
        self.monitor(&command).into_bytes()
    }
}
