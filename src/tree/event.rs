use std::ops::Range;

use super::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Replaced { old: NodeId },
    ContentsChanged,
}

/// A single node edit performed while a [`DiffLog`](super::DiffLog) was applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// The affected node. For [`ChangeKind::Removed`] it no longer exists in the new tree.
    pub node: NodeId,
    pub parent: Option<NodeId>,
    /// The span of the node in the new text, or in the old text for removals.
    pub range: Range<usize>,
    /// The node was synthesized by the reparser and must be formatted before it is observed.
    pub generated: bool,
    /// No ancestor of the node is a code block, so the change affects file structure.
    pub out_of_code_block: bool,
}

impl ChangeEvent {
    /// Generated nodes that were added or swapped in are queued for reformatting.
    #[inline]
    pub fn needs_reformat(&self) -> bool {
        self.generated && matches!(self.kind, ChangeKind::Added | ChangeKind::Replaced { .. })
    }
}
