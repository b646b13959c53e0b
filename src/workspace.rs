use std::{
    cell::RefCell,
    collections::HashMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, info};

use crate::{
    commit::Reparser,
    document::{Document, DocumentId},
    error::{Error, Result},
    ledger::ModificationLedger,
    options::Options,
    postponed::Formatter,
    scope::{Nesting, WriteScope},
    tree::{Language, SyntaxTree},
};

/// The set of open documents and everything that keeps their trees in sync.
///
/// Readers load trees with [`Workspace::tree`] from any thread without locking. Edits, commits
/// and postponed formatting all go through a [`WriteScope`].
pub struct Workspace {
    lock: ReentrantMutex<RefCell<Nesting>>,
    documents: RwLock<HashMap<DocumentId, Arc<Document>>>,
    next_id: AtomicU32,
    ledger: ModificationLedger,
    reparser: Arc<dyn Reparser>,
    formatter: Arc<dyn Formatter>,
    options: Options,
}

impl Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("documents", &self.documents.read().len())
            .field("ledger", &self.ledger)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// A workspace without postponed formatting.
    pub fn new(reparser: impl Reparser + 'static) -> Self {
        Self {
            lock: ReentrantMutex::new(RefCell::new(Nesting::default())),
            documents: RwLock::default(),
            next_id: AtomicU32::new(0),
            ledger: ModificationLedger::new(),
            reparser: Arc::new(reparser),
            formatter: Arc::new(()),
            options: Options::default(),
        }
    }

    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[inline]
    pub fn ledger(&self) -> &ModificationLedger {
        &self.ledger
    }

    #[inline]
    pub fn reparser(&self) -> &dyn Reparser {
        self.reparser.as_ref()
    }

    #[inline]
    pub fn formatter(&self) -> &dyn Formatter {
        self.formatter.as_ref()
    }

    /// Opens a write scope, blocking while another thread holds one.
    pub fn write(&self) -> WriteScope<'_> {
        WriteScope::new(self, self.lock.lock())
    }

    pub fn document(&self, id: DocumentId) -> Option<Arc<Document>> {
        self.documents.read().get(&id).cloned()
    }

    /// The ids of every open document, in the order they were opened.
    pub fn documents(&self) -> Vec<DocumentId> {
        let mut ids: Vec<_> = self.documents.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The tree currently bound to `id`.
    pub fn tree(&self, id: DocumentId) -> Option<Arc<SyntaxTree>> {
        self.document(id).map(|document| document.tree())
    }

    fn parse(&self, language: Language, text: &str) -> Result<SyntaxTree> {
        let tree = self.reparser.parse(language, text)?;
        if tree.total_text_length() != text.len() {
            return Err(Error::TreeMismatch {
                tree_len: tree.total_text_length(),
                text_len: text.len(),
            });
        }
        Ok(tree)
    }

    pub fn open(&self, language: Language, text: impl Into<String>) -> Result<DocumentId> {
        let text = text.into();
        let tree = self.parse(language, &text)?;
        let id = DocumentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let len = text.len();
        let document = Arc::new(Document::new(id, text, tree));

        let scope = self.write();
        self.documents.write().insert(id, document);
        self.ledger.increment_all(&scope);
        debug!(document = %id, language = language.name, len, "opened");
        Ok(id)
    }

    /// Detaches a document. Postponed tasks and commits for it are dropped.
    ///
    /// Returns false if the document was not open.
    pub fn close(&self, id: DocumentId) -> bool {
        let scope = self.write();
        let Some(document) = self.documents.write().remove(&id) else {
            return false;
        };
        document.close();
        self.ledger.increment_all(&scope);
        debug!(document = %id, "closed");
        true
    }

    /// Rebuilds the tree of `id` from scratch and clears its corrupted flag.
    pub fn reload(&self, id: DocumentId) -> Result<()> {
        let scope = self.write();
        let document = self.document(id).ok_or(Error::UnknownDocument(id))?;
        let text = document.snapshot().text;
        let tree = self.parse(document.tree().language(), &text)?;
        document.bind(Arc::new(tree));
        document.set_corrupted(false);
        self.ledger.increment_all(&scope);
        info!(document = %id, "reloaded");
        Ok(())
    }

    /// Makes the next commit of `id` rebuild the whole tree.
    pub fn force_full_reparse(&self, id: DocumentId) -> Result<()> {
        self.document(id)
            .ok_or(Error::UnknownDocument(id))?
            .force_full_reparse();
        Ok(())
    }

    pub fn is_corrupted(&self, id: DocumentId) -> bool {
        self.document(id).is_some_and(|document| document.is_corrupted())
    }
}
