//! Formatting work that is recorded while a write scope is open and run once it closes.

use std::ops::Range;

use crate::change::Edit;

pub mod indent;
pub mod merge;
pub mod scheduler;

pub use merge::{normalize, Plan};
pub use scheduler::{shift_indent, Formatter, IntervalScheduler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Reformat,
    /// Reformat, including the whitespace before the start of the range.
    ReformatWithLeadingWhitespace,
    /// Shift the indentation inside the range to follow its first line.
    Reindent {
        /// The indent width of the first line when the task was recorded.
        old_indent: usize,
    },
}

/// A range of a document that needs formatting.
///
/// The range is re-anchored by every edit made to the document until the task runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostponedTask {
    pub range: Range<usize>,
    pub kind: TaskKind,
}

impl PostponedTask {
    pub fn new(range: Range<usize>, kind: TaskKind) -> Self {
        Self { range, kind }
    }

    pub fn reformat(range: Range<usize>) -> Self {
        Self::new(range, TaskKind::Reformat)
    }

    pub fn reformat_with_leading_whitespace(range: Range<usize>) -> Self {
        Self::new(range, TaskKind::ReformatWithLeadingWhitespace)
    }

    pub fn reindent(range: Range<usize>, old_indent: usize) -> Self {
        Self::new(range, TaskKind::Reindent { old_indent })
    }

    #[inline]
    pub fn is_reindent(&self) -> bool {
        matches!(self.kind, TaskKind::Reindent { .. })
    }

    #[inline]
    pub fn with_leading_whitespace(&self) -> bool {
        self.kind == TaskKind::ReformatWithLeadingWhitespace
    }

    /// Moves the range so it keeps covering the same text after `edit`.
    ///
    /// The start sticks to the text before it and the end to the text after it, so text replaced
    /// at either boundary stays inside.
    pub fn reanchor(&mut self, edit: &Edit) {
        let start = edit.map_offset(self.range.start, false);
        let end = edit.map_offset(self.range.end, true).max(start);
        self.range = start..end;
    }
}

/// A range handed to [`Formatter::format_ranges`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatRange {
    pub range: Range<usize>,
    pub with_leading_whitespace: bool,
}

impl From<&PostponedTask> for FormatRange {
    fn from(task: &PostponedTask) -> Self {
        Self {
            range: task.range.clone(),
            with_leading_whitespace: task.with_leading_whitespace(),
        }
    }
}
