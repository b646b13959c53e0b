use std::iter::FusedIterator;

use memchr::{memchr2_iter, Memchr2};

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Yields the byte position of every line terminator in a string.
///
/// `\n`, `\r` and `\r\n` all terminate a line. For `\r\n` the position of the `\n` is yielded,
/// so the next row always starts one byte after the yielded position.
#[derive(Clone, Debug)]
pub(crate) struct FastEOL<'a> {
    haystack: &'a [u8],
    iter: Memchr2<'a>,
    base: usize,
}

impl<'a> FastEOL<'a> {
    pub(crate) fn new(haystack: &'a str) -> Self {
        Self::with_base(haystack, 0)
    }

    /// Same as [`FastEOL::new`], with every yielded position offset by `base`.
    pub(crate) fn with_base(haystack: &'a str, base: usize) -> Self {
        Self {
            haystack: haystack.as_bytes(),
            iter: memchr2_iter(CR, LF, haystack.as_bytes()),
            base,
        }
    }
}

impl Iterator for FastEOL<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.iter.next()?;
        if self.haystack[n] == CR && self.haystack.get(n + 1) == Some(&LF) {
            // the following `\n` belongs to this terminator
            self.iter.next();
            return Some(self.base + n + 1);
        }
        Some(self.base + n)
    }
}

impl FusedIterator for FastEOL<'_> {}
