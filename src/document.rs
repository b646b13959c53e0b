use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use arc_swap::ArcSwap;
use parking_lot::{RwLock, RwLockReadGuard};

use crate::{change::Edit, core::text::Text, error::Result, tree::SyntaxTree};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub(crate) u32);

impl Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc{}", self.0)
    }
}

/// A text buffer, its modification stamp and the live binding to its syntax tree.
///
/// The text and the stamp change together under the text lock, so [`Document::snapshot`] always
/// returns a matching pair. The tree binding is only swapped under the write scope.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    text: RwLock<Text>,
    stamp: AtomicU64,
    tree: ArcSwap<SyntaxTree>,
    skip_incremental: AtomicBool,
    corrupted: AtomicBool,
    closed: AtomicBool,
}

/// The text of a document as of a modification stamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub stamp: u64,
    pub text: String,
}

impl Document {
    pub(crate) fn new(id: DocumentId, text: String, tree: SyntaxTree) -> Self {
        Self {
            id,
            text: RwLock::new(Text::new(text)),
            stamp: AtomicU64::new(0),
            tree: ArcSwap::from_pointee(tree),
            skip_incremental: AtomicBool::new(false),
            corrupted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Increases by one with every edit.
    #[inline]
    pub fn mod_stamp(&self) -> u64 {
        self.stamp.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Snapshot {
        let text = self.text.read();
        Snapshot {
            stamp: self.mod_stamp(),
            text: text.as_str().to_string(),
        }
    }

    /// Read access to the text buffer.
    pub fn text(&self) -> RwLockReadGuard<'_, Text> {
        self.text.read()
    }

    /// The tree currently bound to the document.
    ///
    /// The returned generation stays valid and unchanged for as long as it is held.
    #[inline]
    pub fn tree(&self) -> Arc<SyntaxTree> {
        self.tree.load_full()
    }

    pub(crate) fn is_bound_to(&self, tree: &Arc<SyntaxTree>) -> bool {
        Arc::ptr_eq(&self.tree.load(), tree)
    }

    pub(crate) fn bind(&self, tree: Arc<SyntaxTree>) {
        self.tree.store(tree);
    }

    pub(crate) fn apply(&self, edit: &Edit) -> Result<()> {
        let mut text = self.text.write();
        text.apply(edit)?;
        self.stamp.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Requests the next commit to rebuild the whole tree.
    pub fn force_full_reparse(&self) {
        self.skip_incremental.store(true, Ordering::Release);
    }

    pub(crate) fn take_full_reparse(&self) -> bool {
        self.skip_incremental.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::Acquire)
    }

    pub(crate) fn set_corrupted(&self, corrupted: bool) {
        self.corrupted.store(corrupted, Ordering::Release);
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
