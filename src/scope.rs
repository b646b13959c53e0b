//! Exclusive access to every document, tree binding and postponed task of a workspace.

use std::{
    cell::{RefCell, RefMut},
    ops::{Deref, Range},
};

use parking_lot::ReentrantMutexGuard;
use tracing::trace;

use crate::{
    change::{Change, Edit},
    document::DocumentId,
    error::{Error, Result},
    postponed::{IntervalScheduler, PostponedTask, TaskKind},
    workspace::Workspace,
};

/// Nesting state shared by every write scope of a workspace.
#[derive(Debug, Default)]
pub(crate) struct Nesting {
    depth: u32,
    disabled: u32,
    pub(crate) flushing: bool,
    pub(crate) scheduler: IntervalScheduler,
}

/// An open write scope. Obtained from [`Workspace::write`].
///
/// Write scopes are reentrant: a thread may open nested scopes, other threads block until the
/// outermost one is dropped. Dropping the outermost scope flushes the postponed formatting of
/// every document that recorded some.
pub struct WriteScope<'a> {
    workspace: &'a Workspace,
    guard: ReentrantMutexGuard<'a, RefCell<Nesting>>,
}

impl<'a> WriteScope<'a> {
    pub(crate) fn new(
        workspace: &'a Workspace,
        guard: ReentrantMutexGuard<'a, RefCell<Nesting>>,
    ) -> Self {
        guard.borrow_mut().depth += 1;
        Self { workspace, guard }
    }

    #[inline]
    pub fn workspace(&self) -> &'a Workspace {
        self.workspace
    }

    pub(crate) fn nesting(&self) -> RefMut<'_, Nesting> {
        self.guard.borrow_mut()
    }

    /// How many write scopes this thread currently holds.
    pub fn depth(&self) -> u32 {
        self.guard.borrow().depth
    }

    /// Suppresses postponed formatting until the returned guard is dropped.
    ///
    /// Tasks recorded meanwhile are dropped, not deferred.
    pub fn disable(&self) -> DisabledScope<'_, 'a> {
        self.nesting().disabled += 1;
        DisabledScope { scope: self }
    }

    pub fn is_disabled(&self) -> bool {
        self.guard.borrow().disabled > 0
    }

    /// Applies a line based change to a document.
    pub fn edit(&self, id: DocumentId, change: impl Into<Change>) -> Result<Edit> {
        let document = self
            .workspace
            .document(id)
            .ok_or(Error::UnknownDocument(id))?;
        let edit = document.text().resolve(change.into())?;
        self.apply(id, edit)
    }

    /// Replaces a byte range of a document.
    pub fn replace(
        &self,
        id: DocumentId,
        range: Range<usize>,
        text: impl Into<String>,
    ) -> Result<Edit> {
        self.apply(id, Edit::new(range, text))
    }

    fn apply(&self, id: DocumentId, edit: Edit) -> Result<Edit> {
        let document = self
            .workspace
            .document(id)
            .ok_or(Error::UnknownDocument(id))?;
        document.apply(&edit)?;
        trace!(document = %id, range = ?edit.range, inserted = edit.text.len(), "edited");
        self.nesting().scheduler.reanchor(id, &edit);
        Ok(edit)
    }

    /// Postpones formatting of `range` until the outermost scope closes.
    pub fn record(&self, id: DocumentId, range: Range<usize>, kind: TaskKind) {
        let mut nesting = self.nesting();
        if nesting.disabled > 0 {
            trace!(document = %id, ?range, ?kind, "formatting disabled, task dropped");
            return;
        }
        nesting.scheduler.record(id, PostponedTask::new(range, kind));
    }

    /// Postpones a reindent of `range`, remembering the current indent of its first line.
    pub fn record_reindent(&self, id: DocumentId, range: Range<usize>) -> Result<()> {
        let document = self
            .workspace
            .document(id)
            .ok_or(Error::UnknownDocument(id))?;
        let old_indent = document
            .text()
            .line_indent(range.start, &self.workspace.options().indent);
        self.record(id, range, TaskKind::Reindent { old_indent });
        Ok(())
    }

    /// The tasks waiting for `id`, in the order they were recorded.
    pub fn pending(&self, id: DocumentId) -> Vec<PostponedTask> {
        self.guard.borrow().scheduler.pending(id).to_vec()
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        let flush = {
            let mut nesting = self.nesting();
            nesting.depth -= 1;
            nesting.depth == 0 && !nesting.flushing
        };
        // a panicking scope leaves its tasks for the next one
        if flush && !std::thread::panicking() {
            self.flush_touched();
        }
    }
}

/// Returned by [`WriteScope::disable`].
pub struct DisabledScope<'s, 'a> {
    scope: &'s WriteScope<'a>,
}

impl<'a> Deref for DisabledScope<'_, 'a> {
    type Target = WriteScope<'a>;

    fn deref(&self) -> &Self::Target {
        self.scope
    }
}

impl Drop for DisabledScope<'_, '_> {
    fn drop(&mut self) {
        self.scope.nesting().disabled -= 1;
    }
}
