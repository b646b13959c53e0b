use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    commit::{Applied, CommitTask},
    document::DocumentId,
    error::CommitError,
    workspace::Workspace,
};

/// What [`CommitQueue::run_next`] did with the task it picked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied(Applied),
    /// The tree already matched the text.
    Unchanged(DocumentId),
    /// The task was stale or cancelled and went back to the end of the queue.
    Requeued(DocumentId),
    /// The task was superseded or its document closed.
    Dropped(DocumentId),
    Failed(CommitError),
}

/// Pending commit requests, at most one per document and context.
#[derive(Debug, Default)]
pub struct CommitQueue {
    tasks: Mutex<VecDeque<CommitTask>>,
}

impl CommitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Queues `task`, superseding any queued task with the same document and context.
    pub fn enqueue(&self, task: CommitTask) {
        let mut tasks = self.tasks.lock();
        if let Some(at) = tasks.iter().position(|queued| *queued == task) {
            if let Some(old) = tasks.remove(at) {
                old.remove();
                trace!(document = %old.document, reason = %old.reason, "superseded");
            }
        }
        tasks.push_back(task);
    }

    /// Drops every queued task of `document`.
    pub fn cancel(&self, document: DocumentId) {
        self.tasks.lock().retain(|task| {
            let keep = task.document != document;
            if !keep {
                task.remove();
            }
            keep
        });
    }

    /// Prepares and finishes the task at the front of the queue.
    ///
    /// The reparse runs without the write scope, which is only taken to apply the result.
    pub fn run_next(&self, workspace: &Workspace) -> Option<CommitOutcome> {
        let task = self.tasks.lock().pop_front()?;
        let id = task.document;
        if task.is_removed() {
            return Some(CommitOutcome::Dropped(id));
        }

        let result = match workspace.prepare(&task) {
            Ok(Some(prepared)) => {
                let scope = workspace.write();
                workspace.finish(&scope, prepared).map(Some)
            }
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };
        Some(match result {
            Ok(Some(applied)) => CommitOutcome::Applied(applied),
            Ok(None) => CommitOutcome::Unchanged(id),
            Err(CommitError::Stale | CommitError::Cancelled) => self.retry(task),
            Err(CommitError::Detached(id)) => CommitOutcome::Dropped(id),
            Err(err) => CommitOutcome::Failed(err),
        })
    }

    /// Runs tasks until the queue is empty.
    pub fn run_all(&self, workspace: &Workspace) -> Vec<CommitOutcome> {
        std::iter::from_fn(|| self.run_next(workspace)).collect()
    }

    fn retry(&self, task: CommitTask) -> CommitOutcome {
        let id = task.document;
        let mut tasks = self.tasks.lock();
        // a newer request already covers it
        if task.is_removed() || tasks.iter().any(|queued| *queued == task) {
            return CommitOutcome::Dropped(id);
        }
        debug!(document = %id, reason = %task.reason, "requeued");
        tasks.push_back(CommitTask::new(id, task.reason).in_context(task.context));
        CommitOutcome::Requeued(id)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        commit::{CommitState, CommitTask, ContextId},
        reparse::WordReparser,
        tree::tests::LANG,
        workspace::Workspace,
    };

    use super::{CommitOutcome, CommitQueue};

    #[test]
    fn superseded_tasks_are_cancelled() {
        let ws = Workspace::new(WordReparser::default());
        let id = ws.open(LANG, "a").unwrap();
        let queue = CommitQueue::new();

        let first = CommitTask::new(id, "first");
        let other_context = CommitTask::new(id, "other").in_context(ContextId(1));
        queue.enqueue(first.clone());
        queue.enqueue(other_context.clone());
        queue.enqueue(CommitTask::new(id, "second"));

        assert_eq!(queue.len(), 2);
        assert!(first.is_removed());
        assert!(first.cancel.is_cancelled());
        assert!(!other_context.is_removed());
    }

    #[test]
    fn run_all() {
        let ws = Workspace::new(WordReparser::default());
        let a = ws.open(LANG, "a").unwrap();
        let b = ws.open(LANG, "b").unwrap();
        ws.write().replace(a, 1..1, " c").unwrap();

        let queue = CommitQueue::new();
        let task = CommitTask::new(a, "typing");
        queue.enqueue(task.clone());
        queue.enqueue(CommitTask::new(b, "typing"));

        let outcomes = queue.run_all(&ws);
        assert!(matches!(outcomes[0], CommitOutcome::Applied(applied) if applied.document == a));
        assert_eq!(outcomes[1], CommitOutcome::Unchanged(b));
        assert_eq!(task.state(), CommitState::Applied);
        assert!(queue.is_empty());
        assert_eq!(ws.tree(a).unwrap().text(), "a c");
    }

    #[test]
    fn cancelled_task_is_retried_with_a_fresh_token() {
        let ws = Workspace::new(WordReparser::default());
        let id = ws.open(LANG, "a").unwrap();
        ws.write().replace(id, 0..1, "b").unwrap();

        let queue = CommitQueue::new();
        let task = CommitTask::new(id, "typing");
        task.cancel.cancel();
        queue.enqueue(task);

        assert_eq!(queue.run_next(&ws), Some(CommitOutcome::Requeued(id)));
        assert_eq!(queue.len(), 1);
        assert!(matches!(queue.run_next(&ws), Some(CommitOutcome::Applied(_))));
        assert_eq!(queue.run_next(&ws), None);
    }

    #[test]
    fn closed_documents_are_dropped() {
        let ws = Workspace::new(WordReparser::default());
        let id = ws.open(LANG, "a").unwrap();
        let queue = CommitQueue::new();
        queue.enqueue(CommitTask::new(id, "typing"));
        ws.close(id);
        assert_eq!(queue.run_next(&ws), Some(CommitOutcome::Dropped(id)));

        let other = ws.open(LANG, "b").unwrap();
        queue.enqueue(CommitTask::new(other, "typing"));
        queue.cancel(other);
        assert!(queue.is_empty());
    }
}
