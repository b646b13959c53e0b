//! The two phase protocol that brings a syntax tree back in sync with its document.
//!
//! [`Workspace::prepare`] runs without the write scope: it snapshots the document, finds the
//! changed range and asks the [`Reparser`] for a [`DiffLog`]. [`Workspace::finish`] runs under
//! the write scope and applies that diff only if neither the text nor the tree binding moved in
//! between. Applying always happens on a private copy of the tree, so readers of the previous
//! generation are never disturbed and a failed apply leaves nothing behind.

use std::{
    hash::{Hash, Hasher},
    ops::Range,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::{
    document::{Document, DocumentId},
    error::{Cancelled, CommitError, Result},
    matcher::changed_range,
    postponed::TaskKind,
    scope::WriteScope,
    tree::{ChangeEvent, DiffLog, Language, SyntaxTree},
    workspace::Workspace,
};

/// A shared flag a long running reparse polls to find out it is no longer wanted.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns [`Cancelled`] once [`CancelToken::cancel`] was called on any clone.
    #[inline]
    pub fn check(&self) -> std::result::Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Computes how a tree must change to match an edited text.
///
/// Implementations must not mutate anything: the returned diff is applied later, and only if
/// `tree` is still the current generation by then.
pub trait Reparser: Send + Sync {
    /// Builds the diff that turns `tree` into the tree of `new_text`.
    ///
    /// `range` is the part of `tree` (in its own coordinates) that no longer matches. The rest of
    /// `new_text` is identical to the text of `tree` outside of it. Poll `cancel` regularly.
    fn reparse(
        &self,
        tree: &SyntaxTree,
        range: Range<usize>,
        new_text: &str,
        cancel: &CancelToken,
    ) -> std::result::Result<DiffLog, Cancelled>;

    /// The kind of the root node of an empty document.
    fn root_kind(&self) -> &'static str {
        "file"
    }

    /// Builds a tree for `text` from scratch.
    fn parse(&self, language: Language, text: &str) -> Result<SyntaxTree> {
        let mut tree = SyntaxTree::empty(language, self.root_kind());
        let diff = self.reparse(&tree, 0..0, text, &CancelToken::new())?;
        diff.apply(&mut tree)?;
        Ok(tree)
    }
}

/// Identifies the context a commit was requested from, so that requests from different
/// contexts for the same document do not supersede each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

/// Where a [`CommitTask`] is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommitState {
    /// Not attempted yet, or cancelled and waiting to be retried.
    #[default]
    Pending,
    Reparsing,
    /// A diff is prepared and waits for [`Workspace::finish`].
    Verifying,
    Applied,
    StaleAborted,
    Repairing,
    /// The tree could not be repaired. The task is not retried.
    Fatal,
}

#[derive(Debug, Default)]
struct TaskShared {
    removed: AtomicBool,
    state: Mutex<CommitState>,
}

/// A request to commit one document.
///
/// Two tasks are equal when they target the same document from the same context. Clones share
/// their cancellation, removal and state.
#[derive(Clone, Debug)]
pub struct CommitTask {
    pub document: DocumentId,
    pub context: ContextId,
    pub cancel: CancelToken,
    /// Why the commit was requested, for logs.
    pub reason: String,
    shared: Arc<TaskShared>,
}

impl CommitTask {
    pub fn new(document: DocumentId, reason: impl Into<String>) -> Self {
        Self {
            document,
            context: ContextId::default(),
            cancel: CancelToken::new(),
            reason: reason.into(),
            shared: Arc::default(),
        }
    }

    pub fn in_context(mut self, context: ContextId) -> Self {
        self.context = context;
        self
    }

    #[inline]
    pub fn key(&self) -> (DocumentId, ContextId) {
        (self.document, self.context)
    }

    /// Whether the task was superseded or dropped from its queue.
    #[inline]
    pub fn is_removed(&self) -> bool {
        self.shared.removed.load(Ordering::Acquire)
    }

    /// Marks the task as removed and cancels any reparse running on its behalf.
    pub(crate) fn remove(&self) {
        self.shared.removed.store(true, Ordering::Release);
        self.cancel.cancel();
    }

    pub fn state(&self) -> CommitState {
        *self.shared.state.lock()
    }

    fn set_state(&self, state: CommitState) {
        *self.shared.state.lock() = state;
    }
}

impl PartialEq for CommitTask {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for CommitTask {}

impl Hash for CommitTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// A diff computed off the write scope, waiting to be applied.
#[derive(Debug)]
pub struct PreparedCommit {
    task: CommitTask,
    document: Arc<Document>,
    stamp: u64,
    tree: Arc<SyntaxTree>,
    text: String,
    range: Range<usize>,
    diff: DiffLog,
    full: bool,
}

impl PreparedCommit {
    #[inline]
    pub fn task(&self) -> &CommitTask {
        &self.task
    }

    /// The modification stamp the diff was computed against.
    #[inline]
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// The reparsed range, in the coordinates of the tree the diff was computed from.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    #[inline]
    pub fn diff(&self) -> &DiffLog {
        &self.diff
    }
}

/// What a successful [`Workspace::finish`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Applied {
    pub document: DocumentId,
    /// Number of node changes published.
    pub changes: usize,
    /// The incremental diff did not match the text and the whole tree was rebuilt instead.
    pub repaired: bool,
}

impl Workspace {
    /// Computes the diff for `task` against the current snapshot of its document.
    ///
    /// Returns [`None`] when the tree already matches the text. Safe to call from any thread
    /// without holding the write scope.
    pub fn prepare(
        &self,
        task: &CommitTask,
    ) -> std::result::Result<Option<PreparedCommit>, CommitError> {
        if task.is_removed() {
            return Err(CommitError::Cancelled);
        }
        task.cancel.check()?;

        let id = task.document;
        let document = self.document(id).ok_or(CommitError::Detached(id))?;
        if document.is_corrupted() {
            return Err(CommitError::Corrupted { document: id });
        }

        let snapshot = document.snapshot();
        let tree = document.tree();
        let full = document.take_full_reparse();
        let range = if full {
            Some(0..tree.total_text_length())
        } else {
            changed_range(&tree, &snapshot.text)
        };
        let Some(range) = range else {
            trace!(document = %id, stamp = snapshot.stamp, "tree already matches");
            task.set_state(CommitState::Applied);
            return Ok(None);
        };

        task.set_state(CommitState::Reparsing);

        debug!(
            document = %id,
            stamp = snapshot.stamp,
            ?range,
            full,
            reason = %task.reason,
            "reparsing"
        );
        let diff = match self
            .reparser()
            .reparse(&tree, range.clone(), &snapshot.text, &task.cancel)
        {
            Ok(diff) => diff,
            Err(Cancelled) => {
                if full {
                    // the next attempt must not fall back to an incremental reparse
                    document.force_full_reparse();
                }
                debug!(document = %id, "reparse cancelled");
                task.set_state(CommitState::Pending);
                return Err(CommitError::Cancelled);
            }
        };

        task.set_state(CommitState::Verifying);
        Ok(Some(PreparedCommit {
            task: task.clone(),
            document,
            stamp: snapshot.stamp,
            tree,
            text: snapshot.text,
            range,
            diff,
            full,
        }))
    }

    /// Applies a prepared diff and publishes its changes.
    ///
    /// Fails with [`CommitError::Stale`] without side effects if the document was edited or its
    /// tree rebound since [`Workspace::prepare`]. If the resulting tree does not span the whole
    /// text, the tree is rebuilt from scratch once; if that fails too the document is flagged
    /// as corrupted and keeps its previous tree.
    pub fn finish(
        &self,
        scope: &WriteScope<'_>,
        prepared: PreparedCommit,
    ) -> std::result::Result<Applied, CommitError> {
        let id = prepared.task.document;
        let task = &prepared.task;
        let document = &prepared.document;
        if document.is_closed() {
            return Err(CommitError::Detached(id));
        }
        if task.cancel.is_cancelled() {
            if prepared.full {
                document.force_full_reparse();
            }
            task.set_state(CommitState::Pending);
            return Err(CommitError::Cancelled);
        }
        if document.mod_stamp() != prepared.stamp || !document.is_bound_to(&prepared.tree) {
            debug!(
                document = %id,
                prepared = prepared.stamp,
                current = document.mod_stamp(),
                "discarding stale commit"
            );
            if prepared.full {
                document.force_full_reparse();
            }
            task.set_state(CommitState::StaleAborted);
            return Err(CommitError::Stale);
        }

        let (next, events, repaired) = match build(&prepared.tree, &prepared.diff, &prepared.text)
        {
            Ok((next, events)) => (next, events, false),
            Err(tree_text) => {
                task.set_state(CommitState::Repairing);
                error!(
                    document = %id,
                    range = ?prepared.range,
                    tree_len = tree_text.len(),
                    text_len = prepared.text.len(),
                    tree_text = %tree_text,
                    document_text = %prepared.text,
                    "tree does not match its document after reparse, rebuilding"
                );
                let full = 0..prepared.tree.total_text_length();
                let rebuilt = self
                    .reparser()
                    .reparse(&prepared.tree, full, &prepared.text, &CancelToken::new())
                    .map_err(|_| String::new())
                    .and_then(|diff| build(&prepared.tree, &diff, &prepared.text));
                match rebuilt {
                    Ok((next, events)) => (next, events, true),
                    Err(tree_text) => {
                        task.set_state(CommitState::Fatal);
                        error!(
                            document = %id,
                            tree_len = tree_text.len(),
                            text_len = prepared.text.len(),
                            tree_text = %tree_text,
                            document_text = %prepared.text,
                            "rebuilt tree does not match its document"
                        );
                        document.set_corrupted(true);
                        return Err(CommitError::Corrupted { document: id });
                    }
                }
            }
        };

        document.bind(Arc::new(next));
        task.set_state(CommitState::Applied);
        debug!(document = %id, changes = events.len(), repaired, "commit applied");

        for event in &events {
            self.publish(scope, id, event);
        }
        Ok(Applied {
            document: id,
            changes: events.len(),
            repaired,
        })
    }

    /// Prepares and finishes a commit of `id` on the calling thread.
    pub fn commit_now(
        &self,
        scope: &WriteScope<'_>,
        id: DocumentId,
    ) -> std::result::Result<Option<Applied>, CommitError> {
        let task = CommitTask::new(id, "synchronous commit");
        match self.prepare(&task)? {
            Some(prepared) => self.finish(scope, prepared).map(Some),
            None => Ok(None),
        }
    }

    fn publish(&self, scope: &WriteScope<'_>, id: DocumentId, event: &ChangeEvent) {
        self.ledger().record(scope, id, event);
        if event.needs_reformat() {
            scope.record(id, event.range.clone(), TaskKind::Reformat);
        }
    }
}

/// Applies `diff` to a copy of `tree` and checks the result spans `text`.
///
/// On failure returns the text of whatever the copy ended up as.
fn build(
    tree: &SyntaxTree,
    diff: &DiffLog,
    text: &str,
) -> std::result::Result<(SyntaxTree, Vec<ChangeEvent>), String> {
    let mut next = tree.clone();
    match diff.apply(&mut next) {
        Ok(events) if next.total_text_length() == text.len() => Ok((next, events)),
        Ok(_) => Err(next.text()),
        Err(err) => {
            warn!(error = %err, "diff does not apply");
            Err(next.text())
        }
    }
}
