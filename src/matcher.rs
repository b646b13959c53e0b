//! Finds the part of a tree that no longer matches the text of its document.

use std::ops::Range;

use crate::tree::SyntaxTree;

/// The span of `tree`, in old tree coordinates, that must be rebuilt to match `new_text`.
///
/// Returns [`None`] when the tree already matches. Languages without incremental support always
/// get the whole tree back. Foreign leaves never take part in the match.
pub fn changed_range(tree: &SyntaxTree, new_text: &str) -> Option<Range<usize>> {
    let old_len = tree.total_text_length();
    if !tree.language().incremental {
        return Some(0..old_len);
    }

    let prefix = matching_prefix(tree, new_text);
    if prefix == new_text.len() && prefix == old_len {
        return None;
    }

    // neither the old nor the new windows may overlap
    let suffix = matching_suffix(tree, new_text)
        .min(old_len - prefix)
        .min(new_text.len() - prefix);

    Some(prefix..old_len - suffix)
}

/// Maps a range returned by [`changed_range`] to the text that replaces it in `new_text`.
pub fn new_text_range(changed: &Range<usize>, old_len: usize, new_len: usize) -> Range<usize> {
    let suffix = old_len - changed.end;
    changed.start..new_len - suffix
}

fn matching_prefix(tree: &SyntaxTree, new_text: &str) -> usize {
    let mut matched = 0;
    for (_, leaf) in tree.leaves().filter(|(_, leaf)| !leaf.is_foreign()) {
        let Some(text) = leaf.text() else {
            continue;
        };
        let rest = &new_text[matched..];
        if rest.starts_with(text) {
            matched += text.len();
            continue;
        }
        matched += text
            .chars()
            .zip(rest.chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum::<usize>();
        break;
    }
    matched
}

fn matching_suffix(tree: &SyntaxTree, new_text: &str) -> usize {
    let mut matched = 0;
    for (_, leaf) in tree.leaves_rev().filter(|(_, leaf)| !leaf.is_foreign()) {
        let Some(text) = leaf.text() else {
            continue;
        };
        let rest = &new_text[..new_text.len() - matched];
        if rest.ends_with(text) {
            matched += text.len();
            continue;
        }
        matched += text
            .chars()
            .rev()
            .zip(rest.chars().rev())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum::<usize>();
        break;
    }
    matched
}
