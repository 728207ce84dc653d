//! Thread identifiers and the per-stop thread snapshot.

use std::fmt;

/// Opaque 64-bit thread identifier as seen on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl ThreadId {
    /// Whichever thread is executing on the first core.
    pub const ANY: Self = Self(0);

    /// All threads / no specific thread.
    pub const ALL: Self = Self(u64::MAX);

    #[must_use]
    pub const fn is_any(self) -> bool {
        self.0 == Self::ANY.0
    }
}

impl fmt::LowerHex for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Threads enumerated when the target last stopped.
///
/// Positions in the list are thread *ordinals*; the entries are thread
/// *identifiers*. The list is only meaningful while the target stays stopped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadList {
    ids: Vec<ThreadId>,
}

impl ThreadList {
    #[must_use]
    pub const fn new(ids: Vec<ThreadId>) -> Self {
        Self { ids }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifier of the thread at `ordinal`.
    #[must_use]
    pub fn id_at(&self, ordinal: usize) -> Option<ThreadId> {
        self.ids.get(ordinal).copied()
    }

    /// Ordinal of the thread with identifier `id`.
    #[must_use]
    pub fn ordinal_of(&self, id: ThreadId) -> Option<usize> {
        self.ids.iter().position(|&t| t == id)
    }
}
