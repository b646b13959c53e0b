use std::num::NonZeroUsize;

use crate::{change::Edit, error::Error};

use super::lines::FastEOL;

/// Line terminator positions of a text.
///
/// The first value is always a `0` sentinel for the first row, the rest are positions yielded
/// by [`FastEOL`]. A row starts one byte after the terminator of the previous row.
#[derive(Debug, PartialEq, Eq)]
pub struct EolIndexes(pub(crate) Vec<usize>);

impl Default for EolIndexes {
    fn default() -> Self {
        Self(vec![0])
    }
}

impl Clone for EolIndexes {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }

    // The derived impl does not add this, and instead creates a new Vec instead of reusing the
    // allocation.
    fn clone_from(&mut self, source: &Self) {
        self.0.clone_from(&source.0);
    }
}

// Mainly used to remove duplicate code in tests.
impl<S: AsRef<[usize]>> PartialEq<S> for EolIndexes {
    fn eq(&self, other: &S) -> bool {
        self.0 == other.as_ref()
    }
}

impl EolIndexes {
    #[inline]
    pub fn new(s: &str) -> Self {
        let mut indexes = vec![0];
        indexes.extend(FastEOL::new(s));
        Self(indexes)
    }

    /// The index to the first byte in the row.
    #[inline]
    pub fn row_start(&self, row: usize) -> Result<usize, Error> {
        // the sentinel of the first row is not a line break, every other value is.
        let eol = self.0.get(row).ok_or_else(|| self.oob(row))?;
        Ok(eol + (row != 0) as usize)
    }

    /// The row containing the byte at `offset`.
    ///
    /// A terminator belongs to the row it ends, so the offset of a line break maps to the row
    /// before it.
    #[inline]
    pub fn row_of(&self, offset: usize) -> usize {
        self.0[1..].partition_point(|&eol| eol < offset)
    }

    #[inline(always)]
    pub fn row_count(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the provided row index is for the last row.
    #[inline(always)]
    pub fn is_last_row(&self, row: usize) -> bool {
        self.0.len() - 1 == row
    }

    /// Updates the indexes after `edit` was applied, producing `new_text`.
    ///
    /// Only the rows touched by the edit are rescanned, terminators past it are shifted.
    pub(crate) fn apply(&mut self, edit: &Edit, new_text: &str) {
        let new_end = edit.range.start + edit.text.len();

        // a `\r` right before the edit may pair up with an inserted `\n`
        let scan_start = match edit.range.start.checked_sub(1) {
            Some(before) => self.row_start(self.row_of(before)).unwrap_or(0),
            None => 0,
        };

        // one char past the edit, so an inserted `\r` can pair up with a following `\n`
        let bytes = new_text.as_bytes();
        let mut new_cut = (new_end + 1).min(bytes.len());
        while !new_text.is_char_boundary(new_cut) {
            new_cut += 1;
        }
        if new_cut > 0 && bytes[new_cut - 1] == b'\r' && bytes.get(new_cut) == Some(&b'\n') {
            new_cut += 1;
        }
        let old_cut = new_cut + edit.range.len() - edit.text.len();

        let first = 1 + self.0[1..].partition_point(|&eol| eol < scan_start);
        let last = 1 + self.0[1..].partition_point(|&eol| eol < old_cut);

        let rescanned: Vec<usize> =
            FastEOL::with_base(&new_text[scan_start..new_cut], scan_start).collect();
        let shift_from = first + rescanned.len();
        self.0.splice(first..last, rescanned);

        if edit.text.len() >= edit.range.len() {
            self.add_offsets(shift_from, edit.text.len() - edit.range.len());
        } else {
            self.sub_offsets(shift_from, edit.range.len() - edit.text.len());
        }
    }

    /// Add an offset to all indexes starting from `from`.
    #[inline(always)]
    fn add_offsets(&mut self, from: usize, by: usize) {
        self.0[from..].iter_mut().for_each(|eol| *eol += by);
    }

    /// Sub an offset to all indexes starting from `from`.
    #[inline(always)]
    fn sub_offsets(&mut self, from: usize, by: usize) {
        self.0[from..].iter_mut().for_each(|eol| *eol -= by);
    }

    fn oob(&self, row: usize) -> Error {
        match NonZeroUsize::new(self.row_count()) {
            Some(count) => Error::oob_row(count, row),
            None => no_row(),
        }
    }
}

#[cold]
#[inline(never)]
#[track_caller]
fn no_row() -> ! {
    panic!("the row count should never be less than one")
}
