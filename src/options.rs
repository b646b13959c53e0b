/// How indentation is measured and written back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndentOptions {
    /// The column width of a tab character.
    pub tab_size: usize,
    /// Rewrite indentation with tabs (padded with spaces) instead of spaces only.
    pub use_tabs: bool,
}

impl Default for IndentOptions {
    fn default() -> Self {
        Self {
            tab_size: 4,
            use_tabs: false,
        }
    }
}

/// Settings of a [`Workspace`](crate::workspace::Workspace).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    pub indent: IndentOptions,
    /// After every flush, reparse the whole document and compare it with the live tree.
    ///
    /// A mismatch is a bug in a reparser or formatter and panics.
    pub self_check: bool,
    /// How many times a flush may rerun because formatting produced more postponed tasks.
    pub max_flush_passes: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            indent: IndentOptions::default(),
            self_check: false,
            max_flush_passes: 16,
        }
    }
}

impl Options {
    pub fn with_indent(mut self, indent: IndentOptions) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_self_check(mut self, self_check: bool) -> Self {
        self.self_check = self_check;
        self
    }

    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }
}
