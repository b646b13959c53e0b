//! Reparsers and formatters that misbehave or record what they were asked to do.

use std::{
    ops::Range,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::{
    commit::{CancelToken, Reparser},
    document::DocumentId,
    error::Cancelled,
    postponed::{shift_indent, FormatRange, Formatter},
    reparse::WordReparser,
    scope::WriteScope,
    tree::{DiffLog, Node, SubTree, SyntaxTree},
};

/// Wraps [`WordReparser`], breaking the diffs of the calls after the first one.
#[derive(Clone, Debug)]
pub(crate) struct FaultyReparser {
    inner: WordReparser,
    failures: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl FaultyReparser {
    /// The initial parse works, the next `failures` reparses add a stray character.
    pub fn failing(failures: usize) -> Self {
        Self {
            inner: WordReparser::default(),
            failures: Arc::new(AtomicUsize::new(failures)),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Reparser for FaultyReparser {
    fn reparse(
        &self,
        tree: &SyntaxTree,
        range: Range<usize>,
        new_text: &str,
        cancel: &CancelToken,
    ) -> Result<DiffLog, Cancelled> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut diff = self.inner.reparse(tree, range, new_text, cancel)?;
        let broken = call > 0
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if broken {
            diff.insert(tree.root(), 0, SubTree::leaf("junk", "!"));
        }
        Ok(diff)
    }
}

/// Never produces any nodes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LengthlessReparser;

impl Reparser for LengthlessReparser {
    fn reparse(
        &self,
        _: &SyntaxTree,
        _: Range<usize>,
        _: &str,
        _: &CancelToken,
    ) -> Result<DiffLog, Cancelled> {
        Ok(DiffLog::new())
    }
}

/// Appends each changed region as one new root child, without merging it with its neighbours.
///
/// A full parse gives a single child, so incremental results drift from it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ChunkReparser;

impl Reparser for ChunkReparser {
    fn reparse(
        &self,
        tree: &SyntaxTree,
        range: Range<usize>,
        new_text: &str,
        _: &CancelToken,
    ) -> Result<DiffLog, Cancelled> {
        let root = tree.root();
        let children = tree.node(root).map(Node::children).unwrap_or_default();
        let mut at = 0;
        let mut old = Vec::new();
        let mut region = range.clone();
        let mut offset = 0;
        for (i, &child) in children.iter().enumerate() {
            let start = offset;
            offset += tree.node(child).map_or(0, Node::len);
            let inside = start < range.start && range.start < offset;
            if (start < range.end && offset > range.start) || inside {
                if old.is_empty() {
                    at = i;
                }
                old.push(child);
                region.start = region.start.min(start);
                region.end = region.end.max(offset);
            } else if offset <= range.start {
                at = i + 1;
            }
        }

        let delta = new_text.len() as isize - tree.total_text_length() as isize;
        let end = region.end.saturating_add_signed(delta);
        let text = new_text.get(region.start..end).unwrap_or_default();
        let chunk = (!text.is_empty()).then(|| SubTree::leaf("chunk", text));
        let mut diff = DiffLog::new();
        diff.replace_children(root, at, &old, chunk.into_iter().collect());
        Ok(diff)
    }
}

type Calls = Vec<(DocumentId, Vec<FormatRange>)>;

/// Records the ranges it is asked to format.
///
/// A normalizing formatter also collapses runs of blanks inside each range to a single space.
#[derive(Clone, Debug, Default)]
pub(crate) struct RecordingFormatter {
    normalize: bool,
    calls: Arc<Mutex<Calls>>,
    reindents: Arc<Mutex<Vec<(DocumentId, Range<usize>, isize)>>>,
}

impl RecordingFormatter {
    pub fn normalizing() -> Self {
        Self {
            normalize: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().clone()
    }

    pub fn reindents(&self) -> Vec<(DocumentId, Range<usize>, isize)> {
        self.reindents.lock().clone()
    }
}

/// Runs of two or more blanks inside `range`.
fn blank_runs(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let end = range.end.min(bytes.len());
    let mut runs = Vec::new();
    let mut i = range.start;
    while i < end {
        if !matches!(bytes[i], b' ' | b'\t') {
            i += 1;
            continue;
        }
        let start = i;
        while i < end && matches!(bytes[i], b' ' | b'\t') {
            i += 1;
        }
        if i - start > 1 {
            runs.push(start..i);
        }
    }
    runs
}

impl Formatter for RecordingFormatter {
    fn format_ranges(
        &self,
        scope: &WriteScope<'_>,
        document: DocumentId,
        _: &SyntaxTree,
        ranges: &[FormatRange],
    ) {
        self.calls.lock().push((document, ranges.to_vec()));
        if !self.normalize {
            return;
        }
        let Some(doc) = scope.workspace().document(document) else {
            return;
        };
        // back to front so earlier ranges stay valid
        for range in ranges.iter().rev() {
            let runs = blank_runs(doc.text().as_str(), range.range.clone());
            for run in runs.into_iter().rev() {
                scope.replace(document, run, " ").unwrap();
            }
        }
    }

    fn reindent(
        &self,
        scope: &WriteScope<'_>,
        document: DocumentId,
        _: &SyntaxTree,
        range: Range<usize>,
        delta: isize,
    ) {
        self.reindents.lock().push((document, range.clone(), delta));
        shift_indent(scope, document, range, delta);
    }
}
