use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::PYTHON_LANGUAGE;
use crate::ids::DocumentId;

/// The two document kinds that participate in kernel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Notebook,
    Interactive,
}

/// A document, as seen by discovery and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentScope {
    pub document: DocumentId,
    pub kind: DocumentKind,
    /// Filesystem location, used to resolve a preferred interpreter.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DocumentScope {
    pub fn new(document: DocumentId, kind: DocumentKind) -> Self {
        Self {
            document,
            kind,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Kernel preferences a document declares in its own metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclaredMetadata {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub kernel_spec_name: Option<String>,
    /// Content hash of the interpreter the document last ran with.
    #[serde(default)]
    pub interpreter_hash: Option<String>,
}

impl DeclaredMetadata {
    /// True when the declared language is Python or nothing is declared.
    pub fn is_python_like(&self) -> bool {
        match self.language.as_deref() {
            Some(language) => language.eq_ignore_ascii_case(PYTHON_LANGUAGE),
            None => true,
        }
    }

    pub fn declares_language(&self, language: &str) -> bool {
        self.language
            .as_deref()
            .is_some_and(|declared| declared.eq_ignore_ascii_case(language))
    }
}

/// How strongly a candidate should be suggested for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affinity {
    Default,
    Preferred,
    Hidden,
}
