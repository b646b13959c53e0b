use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use tracing::trace;

use crate::{document::DocumentId, scope::WriteScope, tree::ChangeEvent};

/// A snapshot of the modification counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Counters {
    /// Every change, including ones that only affect code blocks.
    pub all: u64,
    /// Changes that affect the structure of a file outside of code blocks.
    pub out_of_code_block: u64,
    /// Every node level change.
    pub structural: u64,
}

/// Notified around every counter increment.
pub trait ModificationListener: Send + Sync {
    fn before_change(&self, _counters: Counters) {}

    fn after_change(&self, counters: Counters);
}

/// Receives every node change published by a commit.
pub trait ChangeListener: Send + Sync {
    fn node_changed(&self, document: DocumentId, event: &ChangeEvent);
}

/// Monotonic counters that caches compare to find out whether they are still valid.
///
/// Counters only move under the write scope, but can be read from anywhere.
#[derive(Default)]
pub struct ModificationLedger {
    all: AtomicU64,
    out_of_code_block: AtomicU64,
    structural: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn ModificationListener>>>,
    change_listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl Debug for ModificationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModificationLedger")
            .field("counters", &self.counters())
            .field("listeners", &self.listeners.read().len())
            .field("change_listeners", &self.change_listeners.read().len())
            .finish()
    }
}

impl ModificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> Counters {
        Counters {
            all: self.all(),
            out_of_code_block: self.out_of_code_block(),
            structural: self.structural(),
        }
    }

    #[inline]
    pub fn all(&self) -> u64 {
        self.all.load(Ordering::Acquire)
    }

    #[inline]
    pub fn out_of_code_block(&self) -> u64 {
        self.out_of_code_block.load(Ordering::Acquire)
    }

    #[inline]
    pub fn structural(&self) -> u64 {
        self.structural.load(Ordering::Acquire)
    }

    pub fn subscribe(&self, listener: Arc<dyn ModificationListener>) {
        self.listeners.write().push(listener);
    }

    pub fn subscribe_changes(&self, listener: Arc<dyn ChangeListener>) {
        self.change_listeners.write().push(listener);
    }

    /// Moves every counter, for changes that cannot be attributed to single nodes.
    pub fn increment_all(&self, _scope: &WriteScope<'_>) {
        self.bump(true);
    }

    /// Counts a published node change and forwards it to the change listeners.
    pub fn record(&self, _scope: &WriteScope<'_>, document: DocumentId, event: &ChangeEvent) {
        self.bump(event.out_of_code_block);
        trace!(%document, node = %event.node, kind = ?event.kind, "node changed");
        // listeners may subscribe others, so never call them under the lock
        let listeners = self.change_listeners.read().clone();
        for listener in listeners {
            listener.node_changed(document, event);
        }
    }

    fn bump(&self, out_of_code_block: bool) {
        let listeners = self.listeners.read().clone();
        let before = self.counters();
        for listener in &listeners {
            listener.before_change(before);
        }

        self.all.fetch_add(1, Ordering::AcqRel);
        self.structural.fetch_add(1, Ordering::AcqRel);
        if out_of_code_block {
            self.out_of_code_block.fetch_add(1, Ordering::AcqRel);
        }

        let after = self.counters();
        for listener in &listeners {
            listener.after_change(after);
        }
    }
}
