use std::ops::Range;

#[cfg(feature = "lsp-types")]
use lsp_types::{Position, TextDocumentContentChangeEvent};

/// A document edit expressed in rows and byte columns.
///
/// Converted into an [`Edit`] by [`Text::resolve`](crate::core::text::Text::resolve) before it
/// is applied.
#[derive(Clone, Debug)]
pub enum Change {
    Delete {
        start: GridIndex,
        end: GridIndex,
    },
    Insert {
        at: GridIndex,
        text: String,
    },
    Replace {
        start: GridIndex,
        end: GridIndex,
        text: String,
    },
    ReplaceFull(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridIndex {
    pub row: usize,
    pub col: usize,
}

/// A document edit expressed in byte offsets: `range` of the old text is replaced with `text`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub text: String,
}

impl Edit {
    pub fn new(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::new(at..at, text)
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self::new(range, String::new())
    }

    /// How much longer (or shorter, if negative) the text becomes after this edit.
    #[inline]
    pub fn delta(&self) -> isize {
        self.text.len() as isize - self.range.len() as isize
    }

    /// Maps an offset in the old text to the new text.
    ///
    /// Offsets up to the edit start are kept, offsets from the edit end onwards are shifted by
    /// [`Self::delta`]. Offsets inside the replaced span snap to the edit start, or to the end
    /// of the inserted text when `stick_to_end` is set.
    pub fn map_offset(&self, offset: usize, stick_to_end: bool) -> usize {
        if offset <= self.range.start {
            return offset;
        }
        if offset >= self.range.end {
            return offset + self.text.len() - self.range.len();
        }
        if stick_to_end {
            self.range.start + self.text.len()
        } else {
            self.range.start
        }
    }
}

#[cfg(feature = "lsp-types")]
impl From<Position> for GridIndex {
    fn from(value: Position) -> Self {
        GridIndex {
            row: value.line as usize,
            col: value.character as usize,
        }
    }
}

#[cfg(feature = "lsp-types")]
impl From<TextDocumentContentChangeEvent> for Change {
    fn from(value: TextDocumentContentChangeEvent) -> Self {
        let Some(range) = value.range else {
            return Change::ReplaceFull(value.text);
        };

        if value.text.is_empty() {
            return Change::Delete {
                start: range.start.into(),
                end: range.end.into(),
            };
        }

        if range.start == range.end {
            return Change::Insert {
                at: range.start.into(),
                text: value.text,
            };
        }

        Change::Replace {
            start: range.start.into(),
            end: range.end.into(),
            text: value.text,
        }
    }
}
