use std::{fmt::Display, num::NonZeroUsize};

use crate::{document::DocumentId, tree::NodeId};

/// A type alias for the libraries result type. ([`Result<(), Error>`])
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned upon failed conversions, edits and tree mutations across the library.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    OutOfBoundsRow { max: usize, current: usize },
    OutOfBoundsOffset { len: usize, offset: usize },
    InBetweenCharBoundries { offset: usize },
    UnknownDocument(DocumentId),
    UnknownNode(NodeId),
    InvalidEdit { reason: &'static str },
    Cancelled,
    TreeMismatch { tree_len: usize, text_len: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfBoundsRow { max, current } => {
                write!(f, "Current max row index is {max}, {current} was provided.")
            }
            Self::OutOfBoundsOffset { len, offset } => {
                write!(f, "Offset {offset} is past the end of a text of length {len}.")
            }
            Self::InBetweenCharBoundries { offset } => {
                write!(f, "Offset {offset} is between char boundries.")
            }
            Self::UnknownDocument(id) => write!(f, "Document {id} is not open."),
            Self::UnknownNode(id) => write!(f, "Node {id} does not exist in the tree."),
            Self::InvalidEdit { reason } => write!(f, "Invalid edit: {reason}."),
            Self::Cancelled => Cancelled.fmt(f),
            Self::TreeMismatch { tree_len, text_len } => write!(
                f,
                "The parsed tree spans {tree_len} bytes but the text is {text_len} bytes long."
            ),
        }
    }
}

impl Error {
    #[inline]
    pub(crate) fn oob_row(row_count: NonZeroUsize, current: usize) -> Self {
        Self::OutOfBoundsRow {
            max: row_count.get() - 1,
            current,
        }
    }
}

impl std::error::Error for Error {}

/// Returned by a [`Reparser`](crate::commit::Reparser) or a long running walk when its
/// [`CancelToken`](crate::commit::CancelToken) was cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

impl Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("The operation was cancelled.")
    }
}

impl std::error::Error for Cancelled {}

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// The ways a commit can fail to bring a tree in sync with its document.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommitError {
    /// The document or its tree binding changed since the commit was prepared.
    ///
    /// Nothing was applied. A fresh commit computed from the current text supersedes this one.
    Stale,
    /// The reparse was cancelled before anything was applied.
    Cancelled,
    /// The document is closed.
    Detached(DocumentId),
    /// The tree could not be brought in line with the document even after a full rebuild.
    ///
    /// The document stays flagged until [`Workspace::reload`](crate::workspace::Workspace::reload).
    Corrupted { document: DocumentId },
}

impl Display for CommitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stale => f.write_str("The document changed while the commit was prepared."),
            Self::Cancelled => f.write_str("The commit was cancelled."),
            Self::Detached(id) => write!(f, "Document {id} is closed."),
            Self::Corrupted { document } => {
                write!(f, "The syntax tree of document {document} is corrupted.")
            }
        }
    }
}

impl std::error::Error for CommitError {}

impl From<Cancelled> for CommitError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}
