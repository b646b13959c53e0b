//! A reparser for flat word streams.
//!
//! Every document becomes a root with one leaf per word, whitespace run and punctuation
//! character. It is enough to drive the commit protocol end to end and to check a tree against
//! a fresh parse of its text.

use std::ops::Range;

use crate::{
    commit::{CancelToken, Reparser},
    error::Cancelled,
    tree::{DiffLog, Language, Node, NodeId, SubTree, SyntaxTree},
};

pub const WORD: &str = "word";
pub const WHITESPACE: &str = "whitespace";
pub const PUNCT: &str = "punct";

const CANCEL_CHECK_INTERVAL: usize = 256;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WordReparser {
    generated: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Class {
    Word,
    Whitespace,
    Punct,
}

fn class(c: char) -> Class {
    if c.is_alphanumeric() || c == '_' {
        Class::Word
    } else if c.is_whitespace() {
        Class::Whitespace
    } else {
        Class::Punct
    }
}

impl WordReparser {
    /// A reparser that marks every node it creates as generated, so it gets reformatted.
    pub const fn generating() -> Self {
        Self { generated: true }
    }

    /// Builds the tree of `text` directly.
    pub fn build(language: Language, text: &str) -> SyntaxTree {
        SyntaxTree::new(language, SubTree::branch("file", Self::tokenize(text)))
    }

    pub fn tokenize(text: &str) -> Vec<SubTree> {
        let mut tokens = Vec::new();
        let mut chars = text.char_indices().peekable();
        while let Some((start, c)) = chars.next() {
            let kind = class(c);
            let mut end = start + c.len_utf8();
            if kind != Class::Punct {
                while let Some(&(at, next)) = chars.peek() {
                    if class(next) != kind {
                        break;
                    }
                    end = at + next.len_utf8();
                    chars.next();
                }
            }
            let name = match kind {
                Class::Word => WORD,
                Class::Whitespace => WHITESPACE,
                Class::Punct => PUNCT,
            };
            tokens.push(SubTree::leaf(name, &text[start..end]));
        }
        tokens
    }

    /// The children of the root that overlap or touch `range`, with the span they cover.
    fn touched(
        tree: &SyntaxTree,
        range: &Range<usize>,
        cancel: &CancelToken,
    ) -> Result<(usize, Range<usize>, Range<usize>), Cancelled> {
        let children = tree.node(tree.root()).map(Node::children).unwrap_or_default();
        let mut found: Option<(usize, usize, usize, usize)> = None;
        let mut offset = 0;
        for (i, &child) in children.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check()?;
            }
            let start = offset;
            offset += tree.node(child).map_or(0, Node::len);
            if offset < range.start {
                continue;
            }
            if start > range.end {
                break;
            }
            found = Some(match found {
                Some((first, _, from, _)) => (first, i + 1, from, offset),
                None => (i, i + 1, start, offset),
            });
        }
        Ok(match found {
            Some((first, last, from, to)) => (first, first..last, from..to),
            None => (children.len(), children.len()..children.len(), offset..offset),
        })
    }
}

impl Reparser for WordReparser {
    fn reparse(
        &self,
        tree: &SyntaxTree,
        range: Range<usize>,
        new_text: &str,
        cancel: &CancelToken,
    ) -> Result<DiffLog, Cancelled> {
        cancel.check()?;
        let root = tree.root();
        let children: &[NodeId] = tree.node(root).map(Node::children).unwrap_or_default();
        let old_len = tree.total_text_length();

        let (at, replaced, region) = Self::touched(tree, &range, cancel)?;
        let new_region = new_text
            .len()
            .checked_sub(old_len - region.end)
            .filter(|&end| end >= region.start)
            .and_then(|end| new_text.get(region.start..end));
        let (at, old, text) = match new_region {
            Some(text) => (at, &children[replaced], text),
            // the range does not line up with the text, rebuild everything
            None => (0, children, new_text),
        };

        cancel.check()?;
        let tokens = Self::tokenize(text);
        let mut diff = DiffLog::new();
        if self.generated {
            diff.replace_children_generated(root, at, old, tokens);
        } else {
            diff.replace_children(root, at, old, tokens);
        }
        Ok(diff)
    }
}
