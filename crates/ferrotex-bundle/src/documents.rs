//! Read-only view of the editor's document records.

use crate::manifest::Manifest;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex_manifest: Option<Manifest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Single-file LaTeX stored inline, used when there is no manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            project_id: None,
            metadata: DocumentMetadata::default(),
            latex_manifest: None,
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.latex_manifest = Some(manifest);
        self
    }

    pub fn with_inline_latex(mut self, latex: impl Into<String>) -> Self {
        self.metadata.latex = Some(latex.into());
        self
    }
}

/// Lookup of documents by id.
pub trait DocumentStore: std::fmt::Debug + Send + Sync {
    /// `Ok(None)` when no such document exists.
    fn get(&self, id: &str) -> Result<Option<Document>>;
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: Document) {
        if let Ok(mut documents) = self.documents.write() {
            documents.insert(document.id.clone(), document);
        }
    }
}

impl FromIterator<Document> for MemoryDocumentStore {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        let store = Self::new();
        for document in iter {
            store.insert(document);
        }
        store
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, id: &str) -> Result<Option<Document>> {
        let documents = self
            .documents
            .read()
            .map_err(|_| anyhow::anyhow!("document store lock poisoned"))?;
        Ok(documents.get(id).cloned())
    }
}
