use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

/// A single raw line held by a [`LineStore`].
///
/// `text` is reference-counted so snapshots and filtered views can share
/// the underlying string without copying it.
#[derive(Debug, Clone)]
pub struct StoredLine {
    /// Original line number, assigned on append, starting at 1.
    pub number: u64,
    pub text: Arc<str>,
}

#[derive(Debug)]
struct StoreInner {
    lines: Vec<StoredLine>,
    next_number: u64,
}

/// Append-only ordered container of raw log lines.
///
/// Line numbers are strictly increasing and contiguous from 1. The store
/// is safe to append to from a producer thread while other threads read
/// snapshots; existing entries are never mutated in place.
#[derive(Debug)]
pub struct LineStore {
    inner: RwLock<StoreInner>,
}

impl LineStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                lines: Vec::new(),
                next_number: 1,
            }),
        }
    }

    /// Appends one line and returns its assigned original line number.
    pub fn append_line(&self, text: &str) -> u64 {
        let mut inner = self.inner.write();
        let number = inner.next_number;
        // Numbering must stay contiguous from 1; a gap is a programming error.
        debug_assert_eq!(number, inner.lines.len() as u64 + 1);
        inner.lines.push(StoredLine {
            number,
            text: Arc::from(text),
        });
        inner.next_number = number + 1;
        number
    }

    /// Empties the store. Subsequent appends restart numbering at 1.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.lines.clear();
        inner.next_number = 1;
    }

    pub fn len(&self) -> usize {
        self.inner.read().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A read-locked view of the current contents, in line-number order.
    ///
    /// The guard borrows the shared storage directly; callers that hold it
    /// across long work block producers, so long passes should copy out
    /// (the per-line cost is one `Arc` bump) and drop the guard.
    pub fn lines(&self) -> LinesGuard<'_> {
        LinesGuard {
            guard: self.inner.read(),
        }
    }

    /// Clones out the tail of the store starting at `number` (inclusive).
    pub fn lines_from(&self, number: u64) -> Vec<StoredLine> {
        let inner = self.inner.read();
        if number < 1 {
            return inner.lines.clone();
        }
        let start = (number - 1) as usize;
        if start >= inner.lines.len() {
            return Vec::new();
        }
        inner.lines[start..].to_vec()
    }
}

impl Default for LineStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read guard over the store contents, dereferencing to `[StoredLine]`.
pub struct LinesGuard<'a> {
    guard: RwLockReadGuard<'a, StoreInner>,
}

impl std::ops::Deref for LinesGuard<'_> {
    type Target = [StoredLine];

    fn deref(&self) -> &Self::Target {
        &self.guard.lines
    }
}
