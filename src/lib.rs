pub mod error;

pub mod change;
pub mod commit;
pub mod core;
pub mod document;
pub mod ledger;
pub mod matcher;
pub mod options;
pub mod postponed;
pub mod queue;
pub mod reparse;
pub mod scope;
pub mod tree;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use commit::{CancelToken, CommitTask, ContextId, Reparser};
pub use document::{Document, DocumentId};
pub use postponed::{Formatter, TaskKind};
pub use scope::WriteScope;
pub use workspace::Workspace;

#[cfg(feature = "lsp-types")]
pub use lsp_types;
