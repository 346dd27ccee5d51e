use crate::record::{Fields, LogEntry};
use std::ops::Deref;
use std::sync::{Mutex, PoisonError};

const DEFAULT_MAX_IDLE: usize = 32;

/// Free list of scratch [`LogEntry`] values reused across format calls.
///
/// Entries are reset on every acquisition and handed back by the
/// [`PooledEntry`] guard when it is dropped, so each acquisition returns
/// exactly once whatever the formatting outcome.
#[derive(Debug)]
pub struct EntryPool {
    idle: Mutex<Vec<LogEntry>>,
    max_idle: usize,
}

impl Default for EntryPool {
    fn default() -> Self {
        EntryPool::with_max_idle(DEFAULT_MAX_IDLE)
    }
}

impl EntryPool {
    pub fn with_max_idle(max_idle: usize) -> Self {
        EntryPool {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Copy `entry` into a pooled scratch entry whose fields are `defaults`
    /// overlaid with the entry's own fields.
    pub fn copy_with_defaults<'a>(&'a self, entry: &LogEntry, defaults: &Fields) -> PooledEntry<'a> {
        let mut scratch = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();

        scratch.message.clear();
        scratch.message.push_str(&entry.message);
        scratch.level = entry.level;
        scratch.time = entry.time;
        scratch.fields.clear();
        scratch
            .fields
            .extend(defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
        scratch
            .fields
            .extend(entry.fields.iter().map(|(k, v)| (k.clone(), v.clone())));

        PooledEntry {
            entry: scratch,
            pool: self,
        }
    }

    /// Number of entries currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, entry: LogEntry) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(entry);
        }
    }
}

/// Scratch entry borrowed from an [`EntryPool`].
pub struct PooledEntry<'a> {
    entry: LogEntry,
    pool: &'a EntryPool,
}

impl Deref for PooledEntry<'_> {
    type Target = LogEntry;

    fn deref(&self) -> &LogEntry {
        &self.entry
    }
}

impl Drop for PooledEntry<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.entry));
    }
}
