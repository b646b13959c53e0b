use tracing::trace;

use super::{ChangeEvent, ChangeKind, NodeId, SubTree, SyntaxTree};
use crate::error::{Error, Result};

/// A single tree edit. Node ids refer to the tree as left by the previous operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditOp {
    Insert {
        parent: NodeId,
        index: usize,
        subtree: SubTree,
        generated: bool,
    },
    Remove {
        node: NodeId,
    },
    Replace {
        node: NodeId,
        subtree: SubTree,
        generated: bool,
    },
    SetText {
        leaf: NodeId,
        text: String,
    },
}

/// An edit script that turns one tree generation into the next.
///
/// Produced by a [`Reparser`](crate::commit::Reparser) without touching the tree it was computed
/// from, and applied later under the write scope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffLog {
    ops: Vec<EditOp>,
}

impl DiffLog {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn push(&mut self, op: EditOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn insert(&mut self, parent: NodeId, index: usize, subtree: SubTree) -> &mut Self {
        self.push(EditOp::Insert {
            parent,
            index,
            subtree,
            generated: false,
        })
    }

    pub fn insert_generated(&mut self, parent: NodeId, index: usize, subtree: SubTree) -> &mut Self {
        self.push(EditOp::Insert {
            parent,
            index,
            subtree,
            generated: true,
        })
    }

    pub fn remove(&mut self, node: NodeId) -> &mut Self {
        self.push(EditOp::Remove { node })
    }

    pub fn replace(&mut self, node: NodeId, subtree: SubTree) -> &mut Self {
        self.push(EditOp::Replace {
            node,
            subtree,
            generated: false,
        })
    }

    pub fn replace_generated(&mut self, node: NodeId, subtree: SubTree) -> &mut Self {
        self.push(EditOp::Replace {
            node,
            subtree,
            generated: true,
        })
    }

    pub fn set_text(&mut self, leaf: NodeId, text: impl Into<String>) -> &mut Self {
        self.push(EditOp::SetText {
            leaf,
            text: text.into(),
        })
    }

    /// Swaps the children `old` of `parent`, the first of which sits at index `at`, for `new`.
    ///
    /// Pairs of old and new nodes become replacements, leftovers become removals or insertions.
    pub fn replace_children(
        &mut self,
        parent: NodeId,
        at: usize,
        old: &[NodeId],
        new: Vec<SubTree>,
    ) -> &mut Self {
        self.swap_children(parent, at, old, new, false)
    }

    /// Same as [`DiffLog::replace_children`], with every new node marked as generated.
    pub fn replace_children_generated(
        &mut self,
        parent: NodeId,
        at: usize,
        old: &[NodeId],
        new: Vec<SubTree>,
    ) -> &mut Self {
        self.swap_children(parent, at, old, new, true)
    }

    fn swap_children(
        &mut self,
        parent: NodeId,
        at: usize,
        old: &[NodeId],
        new: Vec<SubTree>,
        generated: bool,
    ) -> &mut Self {
        let paired = old.len().min(new.len());
        let mut new = new.into_iter();
        for (&node, subtree) in old.iter().zip(new.by_ref()) {
            self.push(EditOp::Replace {
                node,
                subtree,
                generated,
            });
        }
        for &node in &old[paired..] {
            self.remove(node);
        }
        for (i, subtree) in new.enumerate() {
            self.push(EditOp::Insert {
                parent,
                index: at + paired + i,
                subtree,
                generated,
            });
        }
        self
    }

    /// Applies every operation to `tree`, in order, returning what changed.
    ///
    /// Event ranges are spans of the final tree, except for removals, which keep the span the
    /// node had right before it was removed. On error the tree may be partially edited, so apply
    /// to a private generation.
    pub fn apply(&self, tree: &mut SyntaxTree) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            events.push(apply_op(tree, op.clone())?);
        }
        for event in events
            .iter_mut()
            .filter(|event| event.kind != ChangeKind::Removed)
        {
            // later ops may have moved the node
            if let Some(range) = tree.node_range(event.node) {
                event.range = range;
                event.out_of_code_block = tree.is_out_of_code_block(event.node);
            }
        }
        tree.recycle();
        Ok(events)
    }
}

fn apply_op(tree: &mut SyntaxTree, op: EditOp) -> Result<ChangeEvent> {
    match op {
        EditOp::Insert {
            parent,
            index,
            subtree,
            generated,
        } => {
            let count = tree.children_mut(parent)?.len();
            if index > count {
                return Err(Error::InvalidEdit {
                    reason: "insertion index is past the last child",
                });
            }
            let node = tree.alloc(subtree, Some(parent));
            tree.children_mut(parent)?.insert(index, node);
            tree.fix_lengths(parent);
            trace!(%node, %parent, index, "inserted node");
            Ok(ChangeEvent {
                kind: ChangeKind::Added,
                node,
                parent: Some(parent),
                range: tree.node_range(node).unwrap_or_default(),
                generated,
                out_of_code_block: tree.is_out_of_code_block(node),
            })
        }
        EditOp::Remove { node } => {
            let parent = tree.try_node(node)?.parent().ok_or(Error::InvalidEdit {
                reason: "the root cannot be removed",
            })?;
            let range = tree.node_range(node).unwrap_or_default();
            let out_of_code_block = tree.is_out_of_code_block(node);
            tree.children_mut(parent)?.retain(|&child| child != node);
            tree.free(node);
            tree.fix_lengths(parent);
            trace!(%node, %parent, "removed node");
            Ok(ChangeEvent {
                kind: ChangeKind::Removed,
                node,
                parent: Some(parent),
                range,
                generated: false,
                out_of_code_block,
            })
        }
        EditOp::Replace {
            node: old,
            subtree,
            generated,
        } => {
            let parent = tree.try_node(old)?.parent();
            let node = tree.alloc(subtree, parent);
            match parent {
                Some(parent) => {
                    let children = tree.children_mut(parent)?;
                    if let Some(slot) = children.iter_mut().find(|child| **child == old) {
                        *slot = node;
                    }
                    tree.fix_lengths(parent);
                }
                None => tree.set_root(node),
            }
            tree.free(old);
            trace!(%old, %node, "replaced node");
            Ok(ChangeEvent {
                kind: ChangeKind::Replaced { old },
                node,
                parent,
                range: tree.node_range(node).unwrap_or_default(),
                generated,
                out_of_code_block: tree.is_out_of_code_block(node),
            })
        }
        EditOp::SetText { leaf, text } => {
            tree.set_leaf_text(leaf, text)?;
            tree.fix_lengths(leaf);
            Ok(ChangeEvent {
                kind: ChangeKind::ContentsChanged,
                node: leaf,
                parent: tree.try_node(leaf)?.parent(),
                range: tree.node_range(leaf).unwrap_or_default(),
                generated: false,
                out_of_code_block: tree.is_out_of_code_block(leaf),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::Error,
        tree::{
            tests::{class_tree, LANG},
            ChangeKind, SubTree, SyntaxTree,
        },
    };

    use super::DiffLog;

    #[test]
    fn set_text_changes_length() {
        let mut tree = class_tree();
        let ident = tree.leaves().nth(2).map(|(id, _)| id).unwrap();
        let mut diff = DiffLog::new();
        diff.set_text(ident, "AB");
        let events = diff.apply(&mut tree).unwrap();

        assert_eq!(tree.text(), "class AB{ x }");
        assert_eq!(tree.total_text_length(), 13);
        assert_eq!(events[0].kind, ChangeKind::ContentsChanged);
        assert_eq!(events[0].range, 6..8);
        assert!(events[0].out_of_code_block);
    }

    #[test]
    fn replace_inside_code_block() {
        let mut tree = class_tree();
        let x = tree.leaves().nth(5).map(|(id, _)| id).unwrap();
        let mut diff = DiffLog::new();
        diff.replace_generated(
            x,
            SubTree::branch(
                "call",
                vec![SubTree::leaf("ident", "f"), SubTree::leaf("parens", "()")],
            ),
        );
        let events = diff.apply(&mut tree).unwrap();

        assert_eq!(tree.text(), "class A{ f() }");
        assert_eq!(events[0].kind, ChangeKind::Replaced { old: x });
        assert_eq!(events[0].range, 9..12);
        assert!(events[0].generated);
        assert!(events[0].needs_reformat());
        assert!(!events[0].out_of_code_block);
        assert!(tree.node(x).is_none());
    }

    #[test]
    fn ranges_follow_later_ops() {
        let mut tree = SyntaxTree::new(
            LANG,
            SubTree::branch(
                "file",
                vec![
                    SubTree::leaf("word", "a"),
                    SubTree::leaf("space", " "),
                    SubTree::leaf("word", "b"),
                ],
            ),
        );
        let root = tree.root();
        let b = tree.node(root).unwrap().children()[2];
        let mut diff = DiffLog::new();
        diff.replace_generated(b, SubTree::leaf("word", "bb"))
            .insert(root, 0, SubTree::leaf("word", "zzzz"));
        let events = diff.apply(&mut tree).unwrap();

        assert_eq!(tree.text(), "zzzza bb");
        assert_eq!(events[0].range, 6..8);
        assert_eq!(&tree.text()[events[0].range.clone()], "bb");
        assert_eq!(events[1].range, 0..4);
    }

    #[test]
    fn removals_keep_their_old_span() {
        let mut tree = class_tree();
        let root = tree.root();
        let class = tree.node(root).unwrap().children()[0];
        let mut diff = DiffLog::new();
        diff.insert(root, 0, SubTree::leaf("word", "xy"))
            .remove(class);
        let events = diff.apply(&mut tree).unwrap();

        assert_eq!(events[0].range, 0..2);
        assert_eq!(events[1].kind, ChangeKind::Removed);
        assert_eq!(events[1].range, 2..14);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut tree = class_tree();
        let live = tree.node_count();
        for i in 0..100 {
            let x = tree.leaves().nth(5).map(|(id, _)| id).unwrap();
            let mut diff = DiffLog::new();
            diff.replace(x, SubTree::leaf("ident", if i % 2 == 0 { "y" } else { "x" }));
            diff.apply(&mut tree).unwrap();
        }
        assert_eq!(tree.node_count(), live);
        assert!(tree.slots() <= live + 1, "{} slots", tree.slots());
        assert_eq!(tree.text(), "class A{ x }");
    }

    #[test]
    fn remove_and_insert() {
        let mut tree = class_tree();
        let root = tree.root();
        let class = tree.node(root).unwrap().children()[0];
        let mut diff = DiffLog::new();
        diff.remove(class)
            .insert(root, 0, SubTree::leaf("word", "gone"));
        let events = diff.apply(&mut tree).unwrap();

        assert_eq!(tree.text(), "gone");
        assert_eq!(events[0].kind, ChangeKind::Removed);
        assert_eq!(events[0].range, 0..12);
        assert_eq!(events[1].kind, ChangeKind::Added);
        assert_eq!(events[1].range, 0..4);
        assert!(!events[1].needs_reformat());
    }

    #[test]
    fn replace_children_uneven() {
        let mut tree = class_tree();
        let root = tree.root();
        let class = tree.node(root).unwrap().children()[0];
        let kids = tree.node(class).unwrap().children().to_vec();
        let mut diff = DiffLog::new();
        diff.replace_children(
            class,
            0,
            &kids[..3],
            vec![SubTree::leaf("word", "struct"), SubTree::leaf("space", "  ")],
        );
        diff.apply(&mut tree).unwrap();
        assert_eq!(tree.text(), "struct  { x }");

        let kids = tree.node(class).unwrap().children().to_vec();
        let mut diff = DiffLog::new();
        diff.replace_children(
            class,
            0,
            &kids[..1],
            vec![
                SubTree::leaf("word", "enum"),
                SubTree::leaf("space", " "),
                SubTree::leaf("ident", "E"),
            ],
        );
        diff.apply(&mut tree).unwrap();
        assert_eq!(tree.text(), "enum E  { x }");
    }

    #[test]
    fn stale_node() {
        let mut tree = class_tree();
        let x = tree.leaves().nth(5).map(|(id, _)| id).unwrap();
        let mut diff = DiffLog::new();
        diff.remove(x).set_text(x, "y");
        assert_eq!(diff.apply(&mut tree), Err(Error::UnknownNode(x)));
    }

    #[test]
    fn root_cannot_be_removed() {
        let mut tree = class_tree();
        let mut diff = DiffLog::new();
        diff.remove(tree.root());
        assert!(matches!(
            diff.apply(&mut tree),
            Err(Error::InvalidEdit { .. })
        ));
    }
}
