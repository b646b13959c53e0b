use std::ops::Range;

use crate::{change::Edit, core::lines::FastEOL, options::IndentOptions};

/// The column width of the whitespace at the start of `line`.
pub fn indent_width(line: &str, options: &IndentOptions) -> usize {
    let tab_size = options.tab_size.max(1);
    let mut width = 0;
    for b in line.bytes() {
        match b {
            b' ' => width += 1,
            b'\t' => width = (width / tab_size + 1) * tab_size,
            _ => break,
        }
    }
    width
}

/// Builds the whitespace for an indent of `width` columns.
pub fn make_indent(width: usize, options: &IndentOptions) -> String {
    if !options.use_tabs {
        return " ".repeat(width);
    }
    let tab_size = options.tab_size.max(1);
    let mut indent = "\t".repeat(width / tab_size);
    indent.push_str(&" ".repeat(width % tab_size));
    indent
}

/// The leading whitespace of every non blank line that starts after a line break inside `range`.
///
/// The first line of the range is never included: its indent is what the others follow.
pub fn indent_runs(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let end = range.end.min(text.len());
    let start = range.start.min(end);
    let bytes = text.as_bytes();
    let Some(slice) = text.get(start..end) else {
        return Vec::new();
    };

    FastEOL::with_base(slice, start)
        .map(|eol| eol + 1)
        .filter(|&line_start| line_start < end)
        .filter_map(|line_start| {
            let len = bytes[line_start..end]
                .iter()
                .take_while(|b| matches!(b, b' ' | b'\t'))
                .count();
            let run_end = line_start + len;
            // blank lines keep whatever they have
            match bytes.get(run_end) {
                None | Some(b'\n' | b'\r') => None,
                Some(_) => Some(line_start..run_end),
            }
        })
        .collect()
}

/// The edits that shift every indent run inside `range` by `delta` columns, in ascending order.
///
/// Indents never go below zero. Apply the edits back to front so earlier offsets stay valid.
pub fn reindent_edits(
    text: &str,
    range: Range<usize>,
    delta: isize,
    options: &IndentOptions,
) -> Vec<Edit> {
    if delta == 0 {
        return Vec::new();
    }
    indent_runs(text, range)
        .into_iter()
        .filter_map(|run| {
            let width = indent_width(&text[run.clone()], options);
            let target = width.saturating_add_signed(delta);
            let indent = make_indent(target, options);
            (indent != text[run.clone()]).then(|| Edit::new(run, indent))
        })
        .collect()
}
