//! An arena backed syntax tree.
//!
//! A [`SyntaxTree`] is never edited while it is observable. Commits clone the live generation,
//! apply a [`DiffLog`] to the clone and swap the binding, so readers holding the previous
//! generation keep seeing a consistent tree.

pub mod diff;
pub mod event;

use std::{fmt::Display, ops::Range};

pub use diff::{DiffLog, EditOp};
pub use event::{ChangeEvent, ChangeKind};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The source language of a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Language {
    pub name: &'static str,
    /// Whether trees of this language can be partially rebuilt.
    ///
    /// When false every commit reparses the whole document.
    pub incremental: bool,
}

impl Language {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            incremental: true,
        }
    }

    pub const fn non_incremental(name: &'static str) -> Self {
        Self {
            name,
            incremental: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    kind: &'static str,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    text: Option<String>,
    foreign: bool,
    code_block: bool,
    len: usize,
}

impl Node {
    #[inline]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The text of a leaf, [`None`] for branches.
    #[inline]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.text.is_some()
    }

    /// Foreign leaves are injected into the tree without being part of the document text.
    ///
    /// They have a length of zero and are skipped when the tree is flattened or matched.
    #[inline]
    pub fn is_foreign(&self) -> bool {
        self.foreign
    }

    #[inline]
    pub fn is_code_block(&self) -> bool {
        self.code_block
    }

    /// The length of the document text this node covers.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A detached tree, as produced by a reparser before it is attached to a [`SyntaxTree`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubTree {
    pub kind: &'static str,
    pub text: Option<String>,
    pub foreign: bool,
    pub code_block: bool,
    pub children: Vec<SubTree>,
}

impl SubTree {
    pub fn leaf(kind: &'static str, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: Some(text.into()),
            foreign: false,
            code_block: false,
            children: Vec::new(),
        }
    }

    pub fn foreign(kind: &'static str, text: impl Into<String>) -> Self {
        Self {
            foreign: true,
            ..Self::leaf(kind, text)
        }
    }

    pub fn branch(kind: &'static str, children: Vec<SubTree>) -> Self {
        Self {
            kind,
            text: None,
            foreign: false,
            code_block: false,
            children,
        }
    }

    /// Marks this node as a code block, edits below it are not structural.
    pub fn code_block(mut self) -> Self {
        self.code_block = true;
        self
    }

    /// The length of the document text covered by this subtree.
    pub fn len(&self) -> usize {
        match &self.text {
            Some(_) if self.foreign => 0,
            Some(text) => text.len(),
            None => self.children.iter().map(SubTree::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug)]
pub struct SyntaxTree {
    language: Language,
    nodes: Vec<Option<Node>>,
    /// Free slots, reused by later allocations.
    vacant: Vec<NodeId>,
    /// Slots freed by the diff being applied. They become vacant once it is done, so the ids of
    /// one diff never alias each other.
    released: Vec<NodeId>,
    root: NodeId,
}

impl SyntaxTree {
    pub fn new(language: Language, root: SubTree) -> Self {
        let mut tree = Self {
            language,
            nodes: Vec::new(),
            vacant: Vec::new(),
            released: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.alloc(root, None);
        tree
    }

    /// A tree with a single childless root, the starting point of a full parse.
    pub fn empty(language: Language, root_kind: &'static str) -> Self {
        Self::new(language, SubTree::branch(root_kind, Vec::new()))
    }

    #[inline]
    pub fn language(&self) -> Language {
        self.language
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn try_node(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(Error::UnknownNode(id))
    }

    fn try_node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownNode(id))
    }

    /// The length of the document text this tree was built from.
    #[inline]
    pub fn total_text_length(&self) -> usize {
        self.node(self.root).map_or(0, Node::len)
    }

    /// The text of every non foreign leaf, in order.
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.total_text_length());
        for (_, leaf) in self.leaves().filter(|(_, leaf)| !leaf.is_foreign()) {
            if let Some(t) = leaf.text() {
                text.push_str(t);
            }
        }
        text
    }

    /// The document span covered by `id`.
    pub fn node_range(&self, id: NodeId) -> Option<Range<usize>> {
        let len = self.node(id)?.len;
        let mut start = 0;
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            for &sibling in &self.node(parent)?.children {
                if sibling == current {
                    break;
                }
                start += self.node(sibling)?.len;
            }
            current = parent;
        }
        Some(start..start + len)
    }

    /// Iterates over the leaves from the first to the last, foreign ones included.
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves {
            tree: self,
            stack: vec![self.root],
            rev: false,
        }
    }

    /// Iterates over the leaves from the last to the first, foreign ones included.
    pub fn leaves_rev(&self) -> Leaves<'_> {
        Leaves {
            tree: self,
            stack: vec![self.root],
            rev: true,
        }
    }

    /// The parent chain of `id`, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).and_then(Node::parent), |&id| {
            self.node(id).and_then(Node::parent)
        })
    }

    /// True if no ancestor of `id` is a code block.
    pub fn is_out_of_code_block(&self, id: NodeId) -> bool {
        !self
            .ancestors(id)
            .any(|a| self.node(a).is_some_and(Node::is_code_block))
    }

    /// Compares the structure of two trees: kinds, leaf texts and flags, ignoring node ids.
    pub fn same_shape(&self, other: &SyntaxTree) -> bool {
        self.language == other.language && self.same_node(self.root, other, other.root)
    }

    fn same_node(&self, id: NodeId, other: &SyntaxTree, other_id: NodeId) -> bool {
        let (Some(a), Some(b)) = (self.node(id), other.node(other_id)) else {
            return false;
        };
        a.kind == b.kind
            && a.text == b.text
            && a.foreign == b.foreign
            && a.code_block == b.code_block
            && a.children.len() == b.children.len()
            && a.children
                .iter()
                .zip(&b.children)
                .all(|(&x, &y)| self.same_node(x, other, y))
    }

    /// Detaches a copy of the subtree rooted at `id`.
    pub fn subtree(&self, id: NodeId) -> Option<SubTree> {
        let node = self.node(id)?;
        let children = node
            .children
            .iter()
            .map(|&child| self.subtree(child))
            .collect::<Option<Vec<_>>>()?;
        Some(SubTree {
            kind: node.kind,
            text: node.text.clone(),
            foreign: node.foreign,
            code_block: node.code_block,
            children,
        })
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.vacant.len() - self.released.len()
    }

    /// Number of slots in the arena, live or not.
    pub(crate) fn slots(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn alloc(&mut self, subtree: SubTree, parent: Option<NodeId>) -> NodeId {
        let len = subtree.len();
        let node = Node {
            kind: subtree.kind,
            parent,
            children: Vec::with_capacity(subtree.children.len()),
            text: subtree.text,
            foreign: subtree.foreign,
            code_block: subtree.code_block,
            len,
        };
        let id = match self.vacant.pop() {
            Some(id) => {
                self.nodes[id.index()] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() as u32 - 1)
            }
        };
        for child in subtree.children {
            let child = self.alloc(child, Some(id));
            if let Some(Some(node)) = self.nodes.get_mut(id.index()) {
                node.children.push(child);
            }
        }
        id
    }

    pub(crate) fn free(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        self.released.push(id);
        for child in node.children {
            self.free(child);
        }
    }

    /// Makes the slots freed since the last call available again.
    pub(crate) fn recycle(&mut self) {
        self.vacant.append(&mut self.released);
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub(crate) fn children_mut(&mut self, id: NodeId) -> Result<&mut Vec<NodeId>> {
        let node = self.try_node_mut(id)?;
        if node.is_leaf() {
            return Err(Error::InvalidEdit {
                reason: "leaves cannot have children",
            });
        }
        Ok(&mut node.children)
    }

    pub(crate) fn set_leaf_text(&mut self, id: NodeId, text: String) -> Result<()> {
        let node = self.try_node_mut(id)?;
        if !node.is_leaf() {
            return Err(Error::InvalidEdit {
                reason: "only leaves have text",
            });
        }
        node.text = Some(text);
        Ok(())
    }

    /// Recomputes the cached lengths of `id` and all of its ancestors.
    pub(crate) fn fix_lengths(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            let Some(node) = self.node(id) else {
                return;
            };
            let len = match &node.text {
                Some(_) if node.foreign => 0,
                Some(text) => text.len(),
                None => node
                    .children
                    .iter()
                    .filter_map(|&child| self.node(child))
                    .map(Node::len)
                    .sum(),
            };
            current = node.parent;
            if let Some(Some(node)) = self.nodes.get_mut(id.index()) {
                node.len = len;
            }
        }
    }
}

/// Depth first iterator over the leaves of a [`SyntaxTree`].
#[derive(Clone, Debug)]
pub struct Leaves<'a> {
    tree: &'a SyntaxTree,
    stack: Vec<NodeId>,
    rev: bool,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = (NodeId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let Some(node) = self.tree.node(id) else {
                continue;
            };
            if node.is_leaf() {
                return Some((id, node));
            }
            if self.rev {
                self.stack.extend(node.children.iter().copied());
            } else {
                self.stack.extend(node.children.iter().rev().copied());
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{Language, SubTree, SyntaxTree};

    pub(crate) const LANG: Language = Language::new("test");

    /// `class A { x }` with the body marked as a code block.
    pub(crate) fn class_tree() -> SyntaxTree {
        SyntaxTree::new(
            LANG,
            SubTree::branch(
                "file",
                vec![SubTree::branch(
                    "class",
                    vec![
                        SubTree::leaf("keyword", "class"),
                        SubTree::leaf("space", " "),
                        SubTree::leaf("ident", "A"),
                        SubTree::branch(
                            "body",
                            vec![
                                SubTree::leaf("lbrace", "{"),
                                SubTree::leaf("space", " "),
                                SubTree::leaf("ident", "x"),
                                SubTree::leaf("space", " "),
                                SubTree::leaf("rbrace", "}"),
                            ],
                        )
                        .code_block(),
                    ],
                )],
            ),
        )
    }

    #[test]
    fn text_and_length() {
        let tree = class_tree();
        assert_eq!(tree.text(), "class A{ x }");
        assert_eq!(tree.total_text_length(), 12);
    }

    #[test]
    fn foreign_leaves_have_no_length() {
        let tree = SyntaxTree::new(
            LANG,
            SubTree::branch(
                "file",
                vec![
                    SubTree::foreign("injected", "zzz"),
                    SubTree::leaf("word", "abc"),
                ],
            ),
        );
        assert_eq!(tree.total_text_length(), 3);
        assert_eq!(tree.text(), "abc");
        assert_eq!(tree.leaves().count(), 2);
    }

    #[test]
    fn leaves_both_directions() {
        let tree = class_tree();
        let forward: Vec<_> = tree.leaves().filter_map(|(_, n)| n.text()).collect();
        let mut backward: Vec<_> = tree.leaves_rev().filter_map(|(_, n)| n.text()).collect();
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(forward[0], "class");
        assert_eq!(forward.last(), Some(&"}"));
    }

    #[test]
    fn node_ranges() {
        let tree = class_tree();
        let ranges: Vec<_> = tree
            .leaves()
            .map(|(id, _)| tree.node_range(id).unwrap())
            .collect();
        assert_eq!(ranges[2], 6..7);
        assert_eq!(ranges[5], 9..10);
        assert_eq!(tree.node_range(tree.root()), Some(0..12));
    }

    #[test]
    fn code_block_ancestry() {
        let tree = class_tree();
        let leaves: Vec<_> = tree.leaves().map(|(id, _)| id).collect();
        assert!(tree.is_out_of_code_block(leaves[2]));
        assert!(!tree.is_out_of_code_block(leaves[6]));
    }

    #[test]
    fn shape() {
        let a = class_tree();
        let b = class_tree();
        assert!(a.same_shape(&b));

        let c = SyntaxTree::new(LANG, a.subtree(a.root()).unwrap());
        assert!(a.same_shape(&c));

        let d = SyntaxTree::empty(LANG, "file");
        assert!(!a.same_shape(&d));
    }
}
