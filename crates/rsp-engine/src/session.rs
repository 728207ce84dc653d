//! Per-connection protocol state.

use rsp_wire::FrameParser;

use crate::provider::StepFlags;
use crate::reply::ReplySender;
use crate::thread::{ThreadId, ThreadList};

/// State of one connected peer.
///
/// Created (or reset) on connect; nothing carries over to the next connection.
#[derive(Debug)]
pub struct Session {
    /// Thread affected by continue/step (`Hc`).
    pub step_thread: ThreadId,
    /// Thread affected by register and memory access (`Hg`).
    pub other_thread: ThreadId,
    /// Position in a `qfThreadInfo`/`qsThreadInfo` walk.
    pub thread_cursor: usize,
    /// Peer has read a target description document.
    pub has_negotiated_xml: bool,
    /// Thread last reported as running on the first core.
    pub running_thread: ThreadId,
    /// Target is executing; any inbound byte interrupts it.
    pub target_running: bool,
    /// Thread snapshot, present only while the target is stopped.
    pub threads: Option<ThreadList>,
    pub step_flags: StepFlags,
    pub parser: FrameParser,
    pub replies: ReplySender,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            step_thread: ThreadId::ANY,
            other_thread: ThreadId::ANY,
            thread_cursor: 0,
            has_negotiated_xml: false,
            running_thread: ThreadId::ANY,
            target_running: false,
            threads: None,
            step_flags: StepFlags::default(),
            parser: FrameParser::new(),
            replies: ReplySender::new(),
        }
    }

    /// Return every field to its connect-time default.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Thread an `H` packet selects for `raw` (`-1` and `0` are sentinels).
    #[must_use]
    pub const fn selection_for(&self, raw: u64) -> ThreadId {
        match raw {
            u64::MAX => ThreadId::ANY,
            0 => self.running_thread,
            id => ThreadId(id),
        }
    }
}
