use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    ops::Range,
};

use tracing::{debug, trace, warn};

use super::{indent::reindent_edits, normalize, FormatRange, PostponedTask, TaskKind};
use crate::{change::Edit, document::DocumentId, scope::WriteScope, tree::SyntaxTree};

/// Formats ranges of a document on behalf of a flush.
///
/// Both methods run under the write scope they are given and edit the document through it, so
/// every edit re-anchors the tasks that are still waiting.
pub trait Formatter: Send + Sync {
    /// Reformats each of `ranges`. They are ascending and never overlap.
    fn format_ranges(
        &self,
        scope: &WriteScope<'_>,
        document: DocumentId,
        tree: &SyntaxTree,
        ranges: &[FormatRange],
    );

    /// Shifts the indentation of every line inside `range` after its first by `delta` columns.
    fn reindent(
        &self,
        scope: &WriteScope<'_>,
        document: DocumentId,
        _tree: &SyntaxTree,
        range: Range<usize>,
        delta: isize,
    ) {
        shift_indent(scope, document, range, delta);
    }
}

/// Rewrites the indent runs of `range` through `scope`, last line first.
pub fn shift_indent(
    scope: &WriteScope<'_>,
    document: DocumentId,
    range: Range<usize>,
    delta: isize,
) {
    let workspace = scope.workspace();
    let Some(doc) = workspace.document(document) else {
        return;
    };
    let edits = reindent_edits(doc.text().as_str(), range, delta, &workspace.options().indent);
    for edit in edits.into_iter().rev() {
        if let Err(err) = scope.replace(document, edit.range, edit.text) {
            warn!(%document, error = %err, "reindent edit failed");
            return;
        }
    }
}

impl Formatter for () {
    fn format_ranges(
        &self,
        _: &WriteScope<'_>,
        _: DocumentId,
        _: &SyntaxTree,
        _: &[FormatRange],
    ) {
    }
}

/// Postponed tasks per document, waiting for the outermost write scope to close.
#[derive(Debug, Default)]
pub struct IntervalScheduler {
    pending: HashMap<DocumentId, Vec<PostponedTask>>,
    /// Reindents of the running flush, kept here so edits keep moving them.
    in_flight: HashMap<DocumentId, VecDeque<PostponedTask>>,
    touched: BTreeSet<DocumentId>,
}

impl IntervalScheduler {
    pub fn record(&mut self, document: DocumentId, task: PostponedTask) {
        trace!(%document, range = ?task.range, kind = ?task.kind, "postponed");
        self.pending.entry(document).or_default().push(task);
        self.touched.insert(document);
    }

    pub fn pending(&self, document: DocumentId) -> &[PostponedTask] {
        self.pending.get(&document).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(Vec::is_empty)
    }

    pub fn take(&mut self, document: DocumentId) -> Vec<PostponedTask> {
        self.pending.remove(&document).unwrap_or_default()
    }

    pub fn take_touched(&mut self) -> BTreeSet<DocumentId> {
        std::mem::take(&mut self.touched)
    }

    /// Moves the pending and in flight tasks of `document` across `edit`.
    pub fn reanchor(&mut self, document: DocumentId, edit: &Edit) {
        let pending = self.pending.get_mut(&document).into_iter().flatten();
        let in_flight = self.in_flight.get_mut(&document).into_iter().flatten();
        for task in pending.chain(in_flight) {
            task.reanchor(edit);
        }
    }

    fn start_flight(&mut self, document: DocumentId, tasks: Vec<PostponedTask>) {
        self.in_flight.insert(document, tasks.into());
    }

    fn next_in_flight(&mut self, document: DocumentId) -> Option<PostponedTask> {
        let queue = self.in_flight.get_mut(&document)?;
        let next = queue.pop_front();
        if queue.is_empty() {
            self.in_flight.remove(&document);
        }
        next
    }

    /// Puts tasks back without going through [`IntervalScheduler::record`].
    fn requeue(&mut self, document: DocumentId, tasks: Vec<PostponedTask>) {
        if !tasks.is_empty() {
            self.pending.entry(document).or_default().extend(tasks);
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight.clear();
        self.touched.clear();
    }
}

impl WriteScope<'_> {
    /// Runs every postponed task of `id` now, instead of when the outermost scope closes.
    pub fn flush(&self, id: DocumentId) {
        let was_flushing = std::mem::replace(&mut self.nesting().flushing, true);
        self.flush_document(id);
        self.nesting().flushing = was_flushing;
    }

    /// Flushes every document that recorded tasks, including ones that get tasks while flushing.
    pub(crate) fn flush_touched(&self) {
        self.nesting().flushing = true;
        let rounds = self.workspace().options().max_flush_passes;
        for _ in 0..rounds {
            let touched = self.nesting().scheduler.take_touched();
            if touched.is_empty() {
                break;
            }
            for id in touched {
                self.flush_document(id);
            }
        }
        // documents that kept feeding each other tasks past the last round
        let leftover = self.nesting().scheduler.take_touched();
        for id in leftover {
            let dropped = self.nesting().scheduler.take(id).len();
            if dropped > 0 {
                warn!(document = %id, rounds, dropped, "formatting does not settle, giving up");
            }
        }
        self.nesting().flushing = false;
    }

    fn flush_document(&self, id: DocumentId) {
        let workspace = self.workspace();
        let passes = workspace.options().max_flush_passes;
        let mut ran = false;
        for pass in 0.. {
            if self.nesting().scheduler.pending(id).is_empty() {
                break;
            }
            let Some(document) = workspace.document(id) else {
                let dropped = self.nesting().scheduler.take(id).len();
                debug!(document = %id, dropped, "document is gone, dropping postponed tasks");
                return;
            };
            if document.is_corrupted() {
                let dropped = self.nesting().scheduler.take(id).len();
                warn!(document = %id, dropped, "document is corrupted, dropping postponed tasks");
                return;
            }
            if pass == passes {
                let dropped = self.nesting().scheduler.take(id).len();
                warn!(document = %id, passes, dropped, "formatting does not settle, giving up");
                break;
            }

            ran = true;
            // formatters work on a tree that matches the text
            self.commit(id);
            let tasks = self.nesting().scheduler.take(id);
            let mut plan = normalize(tasks);
            trace!(
                document = %id,
                pass,
                free = plan.free_formatting.len(),
                reindent = plan.reindent.len(),
                deferred = plan.deferred.len(),
                "flushing"
            );
            {
                let mut nesting = self.nesting();
                nesting
                    .scheduler
                    .requeue(id, std::mem::take(&mut plan.deferred));
                nesting
                    .scheduler
                    .start_flight(id, std::mem::take(&mut plan.reindent));
            }

            let ranges = plan.format_ranges();
            if !ranges.is_empty() {
                let tree = document.tree();
                workspace.formatter().format_ranges(self, id, &tree, &ranges);
                self.commit(id);
            }

            loop {
                let next = self.nesting().scheduler.next_in_flight(id);
                let Some(task) = next else {
                    break;
                };
                let TaskKind::Reindent { old_indent } = task.kind else {
                    continue;
                };
                let target = document
                    .text()
                    .line_indent(task.range.start, &workspace.options().indent);
                let delta = target as isize - old_indent as isize;
                if delta == 0 {
                    continue;
                }
                let tree = document.tree();
                workspace
                    .formatter()
                    .reindent(self, id, &tree, task.range, delta);
            }
            self.commit(id);
        }

        if ran && workspace.options().self_check {
            self.check_consistency(id);
        }
    }

    fn commit(&self, id: DocumentId) {
        if let Err(err) = self.workspace().commit_now(self, id) {
            warn!(document = %id, error = %err, "commit during flush failed");
        }
    }

    /// Reparses the whole document and panics if the live tree has a different shape.
    fn check_consistency(&self, id: DocumentId) {
        let workspace = self.workspace();
        let Some(document) = workspace.document(id) else {
            return;
        };
        if document.is_corrupted() {
            return;
        }
        let tree = document.tree();
        let text = document.snapshot().text;
        let consistent = workspace
            .reparser()
            .parse(tree.language(), &text)
            .is_ok_and(|fresh| fresh.same_shape(&tree));
        if !consistent {
            self.nesting().scheduler.clear();
            panic!("postponed formatting left {id} out of sync with its syntax tree");
        }
    }
}
