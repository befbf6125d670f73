//! Documents submitted for ingestion
//!
//! Documents arrive from an upstream scanner as loosely structured records,
//! so the identifier and content are optional at the type level and checked
//! by [`Document::validate`] before a batch touches storage.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A document to persist
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier (required)
    #[serde(default)]
    pub id: Option<String>,
    /// Content payload (required)
    #[serde(default)]
    pub content: Option<String>,
    /// Document title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Header outline produced by the scanner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    /// Section names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Value>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Document {
    /// Create a document with an id and content
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Document {
            id: Some(id.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the header outline
    pub fn with_headers(mut self, headers: Value) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Set the section list
    pub fn with_sections(mut self, sections: Value) -> Self {
        self.sections = Some(sections);
        self
    }

    /// Set metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The identifier, if present and non-blank
    pub fn doc_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Check the required fields
    pub fn validate(&self) -> Result<()> {
        if self.doc_id().is_none() {
            return Err(Error::validation("Document missing required field: id"));
        }
        if self.content.is_none() {
            return Err(Error::validation("Document missing required field: content"));
        }
        Ok(())
    }
}

/// Validate a whole batch: non-empty, every document well formed, ids unique
pub fn validate_batch(documents: &[Document]) -> Result<()> {
    if documents.is_empty() {
        return Err(Error::validation("Batch cannot be empty"));
    }
    let mut seen = HashSet::with_capacity(documents.len());
    for doc in documents {
        doc.validate()?;
        if let Some(id) = doc.doc_id() {
            if !seen.insert(id) {
                return Err(Error::validation(format!(
                    "Duplicate document id in batch: {id}"
                )));
            }
        }
    }
    Ok(())
}
