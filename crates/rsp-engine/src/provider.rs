//! Execution state provider interface.
//!
//! The engine never touches registers, memory or threads itself. Every
//! semantic operation a command needs goes through [`Provider`], which is
//! implemented by whatever execution backend holds the real state.

use std::borrow::Cow;

use crate::error::{BreakpointError, ProviderError};
use crate::thread::ThreadId;

/// Breakpoint and watchpoint kinds, numbered as in `Z`/`z` packets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BreakpointKind {
    Software,
    Hardware,
    WatchWrite,
    WatchRead,
    WatchAccess,
}

impl BreakpointKind {
    /// Kind for the type field of a `Z`/`z` packet.
    #[must_use]
    pub const fn from_wire(kind: u64) -> Option<Self> {
        match kind {
            0 => Some(Self::Software),
            1 => Some(Self::Hardware),
            2 => Some(Self::WatchWrite),
            3 => Some(Self::WatchRead),
            4 => Some(Self::WatchAccess),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_watchpoint(self) -> bool {
        matches!(self, Self::WatchWrite | Self::WatchRead | Self::WatchAccess)
    }
}

/// Insert/remove request forwarded to the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Breakpoint {
    pub addr: u64,
    pub len: u64,
    pub kind: BreakpointKind,
}

/// Single-step behaviour flags (`qemu.sstep`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StepFlags(pub u32);

impl StepFlags {
    pub const ENABLE: u32 = 0x1;
    pub const NOIRQ: u32 = 0x2;
    pub const NOTIMER: u32 = 0x4;

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, bit: u32) -> bool {
        self.0 & bit == bit
    }
}

impl Default for StepFlags {
    /// Step like a hardware single-step: no interrupts, no timers.
    fn default() -> Self {
        Self(Self::ENABLE | Self::NOIRQ | Self::NOTIMER)
    }
}

/// Backend that owns the debugged target's execution state.
///
/// Calls are synchronous. Thread arguments are never [`ThreadId::ANY`]; the
/// engine resolves that sentinel through [`Provider::running_thread`] first.
pub trait Provider {
    /// Current threads, in ordinal order.
    ///
    /// Called when the target stops; the engine keeps the result until the
    /// target resumes.
    fn threads(&mut self) -> Vec<ThreadId>;

    /// Thread currently executing on the first core.
    fn running_thread(&mut self) -> ThreadId;

    /// Human-readable description of `thread`.
    fn describe_thread(&mut self, thread: ThreadId) -> String;

    /// Whether `thread` still exists.
    fn thread_alive(&mut self, thread: ThreadId) -> bool;

    /// Number of registers in a `g` packet.
    fn register_count(&self) -> usize;

    /// Width in bytes of register `index`; zero if it does not exist.
    fn register_size(&self, index: usize) -> usize;

    fn read_register(&mut self, thread: ThreadId, index: usize) -> Result<Vec<u8>, ProviderError>;

    fn write_register(
        &mut self,
        thread: ThreadId,
        index: usize,
        value: &[u8],
    ) -> Result<(), ProviderError>;

    /// Fill `buf` from target memory at `addr`.
    fn read_memory(
        &mut self,
        thread: ThreadId,
        addr: u64,
        buf: &mut [u8],
    ) -> Result<(), ProviderError>;

    fn write_memory(&mut self, thread: ThreadId, addr: u64, data: &[u8])
    -> Result<(), ProviderError>;

    fn set_pc(&mut self, thread: ThreadId, pc: u64) -> Result<(), ProviderError>;

    /// Halt the whole target.
    fn stop(&mut self);

    /// Let the whole target run.
    fn resume(&mut self);

    /// Arm (`Some`) or disarm (`None`) single-stepping for `thread`.
    fn set_single_step(&mut self, thread: ThreadId, flags: Option<StepFlags>);

    fn insert_breakpoint(&mut self, breakpoint: Breakpoint) -> Result<(), BreakpointError> {
        let _ = breakpoint;
        Err(BreakpointError::Unsupported)
    }

    fn remove_breakpoint(&mut self, breakpoint: Breakpoint) -> Result<(), BreakpointError> {
        let _ = breakpoint;
        Err(BreakpointError::Unsupported)
    }

    fn remove_all_breakpoints(&mut self) {}

    /// Whether [`Provider::feature_document`] can return anything.
    fn has_feature_documents(&self) -> bool {
        false
    }

    /// Target description document named `annex` (e.g. `target.xml`).
    fn feature_document(&self, annex: &str) -> Option<Cow<'_, str>> {
        let _ = annex;
        None
    }

    /// Run a monitor command and return its console output.
    fn monitor_command(&mut self, command: &[u8]) -> Vec<u8> {
        let _ = command;
        Vec::new()
    }
}

impl<P: Provider + ?Sized> Provider for &mut P {
    fn threads(&mut self) -> Vec<ThreadId> {
        (**self).threads()
    }

    fn running_thread(&mut self) -> ThreadId {
        (**self).running_thread()
    }

    fn describe_thread(&mut self, thread: ThreadId) -> String {
        (**self).describe_thread(thread)
    }

    fn thread_alive(&mut self, thread: ThreadId) -> bool {
        (**self).thread_alive(thread)
    }

    fn register_count(&self) -> usize {
        (**self).register_count()
    }

    fn register_size(&self, index: usize) -> usize {
        (**self).register_size(index)
    }

    fn read_register(&mut self, thread: ThreadId, index: usize) -> Result<Vec<u8>, ProviderError> {
        (**self).read_register(thread, index)
    }

    fn write_register(
        &mut self,
        thread: ThreadId,
        index: usize,
        value: &[u8],
    ) -> Result<(), ProviderError> {
        (**self).write_register(thread, index, value)
    }

    fn read_memory(
        &mut self,
        thread: ThreadId,
        addr: u64,
        buf: &mut [u8],
    ) -> Result<(), ProviderError> {
        (**self).read_memory(thread, addr, buf)
    }

    fn write_memory(
        &mut self,
        thread: ThreadId,
        addr: u64,
        data: &[u8],
    ) -> Result<(), ProviderError> {
        (**self).write_memory(thread, addr, data)
    }

    fn set_pc(&mut self, thread: ThreadId, pc: u64) -> Result<(), ProviderError> {
        (**self).set_pc(thread, pc)
    }

    fn stop(&mut self) {
        (**self).stop();
    }

    fn resume(&mut self) {
        (**self).resume();
    }

    fn set_single_step(&mut self, thread: ThreadId, flags: Option<StepFlags>) {
        (**self).set_single_step(thread, flags);
    }

    fn insert_breakpoint(&mut self, breakpoint: Breakpoint) -> Result<(), BreakpointError> {
        (**self).insert_breakpoint(breakpoint)
    }

    fn remove_breakpoint(&mut self, breakpoint: Breakpoint) -> Result<(), BreakpointError> {
        (**self).remove_breakpoint(breakpoint)
    }

    fn remove_all_breakpoints(&mut self) {
        (**self).remove_all_breakpoints();
    }

    fn has_feature_documents(&self) -> bool {
        (**self).has_feature_documents()
    }

    fn feature_document(&self, annex: &str) -> Option<Cow<'_, str>> {
        (**self).feature_document(annex)
    }

    fn monitor_command(&mut self, command: &[u8]) -> Vec<u8> {
        (**self).monitor_command(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_kind_from_wire() {
        assert_eq!(BreakpointKind::from_wire(0), Some(BreakpointKind::Software));
        assert_eq!(BreakpointKind::from_wire(4), Some(BreakpointKind::WatchAccess));
        assert_eq!(BreakpointKind::from_wire(5), None);
        assert!(BreakpointKind::WatchRead.is_watchpoint());
        assert!(!BreakpointKind::Hardware.is_watchpoint());
    }

    #[test]
    fn test_default_step_flags() {
        let flags = StepFlags::default();
        assert_eq!(flags.bits(), 0x7);
        assert!(flags.contains(StepFlags::NOIRQ));
    }
}
