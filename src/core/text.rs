use std::{
    fmt::{Debug, Display},
    ops::Range,
};

use super::eol_indexes::EolIndexes;

use crate::{
    change::{Change, Edit, GridIndex},
    error::{Error, Result},
    options::IndentOptions,
    postponed::indent::indent_width,
};

/// The text buffer of a document, with its line breaks indexed.
#[derive(Clone, Default)]
pub struct Text {
    /// The EOL byte positions of the text.
    ///
    /// In case of multibyte EOL patterns (such as `\r\n`) the values point to the last byte.
    pub eol_indexes: EolIndexes,
    text: String,
}

impl Debug for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Breaklines: {:?}\n{:?}", self.eol_indexes, self.text)
    }
}

impl Display for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Text {
    pub fn new(text: String) -> Self {
        let eol_indexes = EolIndexes::new(&text);
        Text { text, eol_indexes }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Converts a row and byte column into a byte offset.
    pub fn offset_of(&self, at: GridIndex) -> Result<usize> {
        let offset = self.eol_indexes.row_start(at.row)? + at.col;
        self.check_offset(offset)?;
        Ok(offset)
    }

    /// The row containing `offset`.
    #[inline]
    pub fn row_of(&self, offset: usize) -> usize {
        self.eol_indexes.row_of(offset)
    }

    /// The offset of the first byte of the row containing `offset`.
    pub fn line_start(&self, offset: usize) -> usize {
        // row_of never returns a row past the last one
        self.eol_indexes
            .row_start(self.row_of(offset))
            .unwrap_or_default()
    }

    /// The width of the leading whitespace on the line containing `offset`.
    pub fn line_indent(&self, offset: usize, options: &IndentOptions) -> usize {
        let start = self.line_start(offset.min(self.len()));
        indent_width(&self.text[start..], options)
    }

    /// Turns a line based [`Change`] into a byte based [`Edit`] against this text.
    pub fn resolve(&self, change: Change) -> Result<Edit> {
        Ok(match change {
            Change::Delete { start, end } => {
                Edit::delete(self.offset_of(start)?..self.offset_of(end)?)
            }
            Change::Insert { at, text } => Edit::insert(self.offset_of(at)?, text),
            Change::Replace { start, end, text } => {
                Edit::new(self.offset_of(start)?..self.offset_of(end)?, text)
            }
            Change::ReplaceFull(text) => Edit::new(0..self.len(), text),
        })
    }

    pub fn update<C: Into<Change>>(&mut self, change: C) -> Result<Edit> {
        let edit = self.resolve(change.into())?;
        self.apply(&edit)?;
        Ok(edit)
    }

    /// Replaces `edit.range` with `edit.text`, keeping the line index in sync.
    pub fn apply(&mut self, edit: &Edit) -> Result<()> {
        self.check_range(&edit.range)?;
        self.text.replace_range(edit.range.clone(), &edit.text);
        self.eol_indexes.apply(edit, &self.text);
        Ok(())
    }

    pub(crate) fn check_range(&self, range: &Range<usize>) -> Result<()> {
        if range.start > range.end {
            return Err(Error::InvalidEdit {
                reason: "range start is after its end",
            });
        }
        self.check_offset(range.start)?;
        self.check_offset(range.end)
    }

    fn check_offset(&self, offset: usize) -> Result<()> {
        if offset > self.text.len() {
            return Err(Error::OutOfBoundsOffset {
                len: self.text.len(),
                offset,
            });
        }
        if !self.text.is_char_boundary(offset) {
            return Err(Error::InBetweenCharBoundries { offset });
        }
        Ok(())
    }
}

impl From<String> for Text {
    fn from(value: String) -> Self {
        Text::new(value)
    }
}
