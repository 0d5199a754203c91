//! Registry of in-flight operations, keyed by request id.
//!
//! Entries exist only for operations whose result was pending at dispatch
//! time. The dispatcher inserts an entry before it starts awaiting and
//! removes it when the operation finishes; `cancelRequest` is the only other
//! path that removes one.
//!
//! All lookups and removals happen under one short-lived lock that is never
//! held across an `.await`, so "check, then remove" is atomic.
//!
//! # Example
//!
//! ```
//! use agentwire::agent::CancelHandle;
//! use agentwire::pending::{EntryHandle, PendingRegistry};
//!
//! let registry = PendingRegistry::new();
//! let handle = CancelHandle::new();
//!
//! registry.insert(3, EntryHandle::Cancelable(handle.clone()));
//! assert!(registry.cancel(3));
//! assert!(handle.is_cancelled());
//! assert!(!registry.cancel(3));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::agent::CancelHandle;
use crate::protocol::RequestId;

/// How a tracked operation can be stopped.
#[derive(Debug, Clone)]
pub enum EntryHandle {
    /// Cancelling fires the handle.
    Cancelable(CancelHandle),
    /// Cancelling only stops tracking; the work keeps running.
    Plain,
}

impl EntryHandle {
    /// Whether cancelling this entry stops the work.
    #[inline]
    pub fn is_cancelable(&self) -> bool {
        matches!(self, EntryHandle::Cancelable(_))
    }
}

impl From<Option<CancelHandle>> for EntryHandle {
    fn from(handle: Option<CancelHandle>) -> Self {
        match handle {
            Some(handle) => EntryHandle::Cancelable(handle),
            None => EntryHandle::Plain,
        }
    }
}

/// Identifies one particular insert.
///
/// Completion removal uses the ticket so that an operation which was
/// cancelled (and so untracked) can never remove a newer entry that reused
/// its request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug)]
struct Entry {
    ticket: Ticket,
    handle: EntryHandle,
}

/// Mapping from request id to the handle of its in-flight operation.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<RequestId, Entry>>,
    next_ticket: AtomicU64,
}

impl PendingRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Entry>> {
        // Entries stay consistent even if a holder panicked: every critical
        // section is a single map operation.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track an operation under `id`.
    ///
    /// Ids are expected to be unique among concurrently pending operations;
    /// a duplicate replaces the earlier entry, which is then no longer
    /// cancelable through the registry.
    pub fn insert(&self, id: RequestId, handle: EntryHandle) -> Ticket {
        let ticket = Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        let previous = self.lock().insert(id, Entry { ticket, handle });

        if previous.is_some() {
            tracing::warn!(id, "request id reused while still pending; replacing entry");
        }

        ticket
    }

    /// Best-effort cancel of the operation tracked under `target`.
    ///
    /// Returns `false` if nothing is tracked under `target`. Otherwise the
    /// entry is removed and `true` is returned; a cancelable handle is fired
    /// once, while plain work keeps running untracked.
    pub fn cancel(&self, target: RequestId) -> bool {
        let Some(entry) = self.lock().remove(&target) else {
            return false;
        };

        match entry.handle {
            EntryHandle::Cancelable(handle) => {
                handle.cancel();
                tracing::debug!(target_id = target, "cancelled pending operation");
            }
            EntryHandle::Plain => {
                tracing::debug!(
                    target_id = target,
                    "operation is not cancelable; stopped tracking it but it keeps running"
                );
            }
        }

        true
    }

    /// Remove the entry for `id`, whatever inserted it. No-op if absent.
    pub fn remove(&self, id: RequestId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Remove the entry for `id` only if it is still the one from `ticket`.
    ///
    /// Used on natural completion. Returns whether an entry was removed.
    pub fn complete(&self, id: RequestId, ticket: Ticket) -> bool {
        let mut entries = self.lock();
        let owned = entries
            .get(&id)
            .map_or(false, |entry| entry.ticket == ticket);
        if owned {
            entries.remove(&id);
        }
        owned
    }

    /// Whether an operation is tracked under `id`.
    pub fn contains(&self, id: RequestId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of tracked operations.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry, firing cancelable handles.
    ///
    /// Returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<Entry> = self.lock().drain().map(|(_, entry)| entry).collect();

        for entry in &drained {
            if let EntryHandle::Cancelable(handle) = &entry.handle {
                handle.cancel();
            }
        }

        drained.len()
    }
}
