//! Document persistence collaborator.
//!
//! The store assigns `_id` and audit fields on create, refreshes the
//! modification audit on update, and applies last-write-wins semantics.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::document::Audit;
use crate::validation::ValidationError;

/// A document kind stored in its own collection.
pub trait Document: Serialize + DeserializeOwned + Clone {
    const COLLECTION: &'static str;

    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
    fn audit_mut(&mut self) -> &mut Audit;

    /// Schema-level checks applied before every write.
    fn validate(&self) -> Result<(), ValidationError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection}: document {id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("{collection}: document has no id")]
    MissingId { collection: &'static str },

    #[error("{collection}: {source}")]
    Invalid {
        collection: &'static str,
        source: ValidationError,
    },

    #[error("{collection}: failed to encode document: {source}")]
    Serde {
        collection: &'static str,
        source: serde_json::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// CRUD contract consumed by the configuration session.
pub trait DocumentStore {
    /// Persist a new document. Any `_id` on the input is replaced.
    fn create<D: Document>(&mut self, doc: D, user: &str) -> Result<D, StoreError>;

    /// Replace an existing document in full.
    fn update<D: Document>(&mut self, doc: D, user: &str) -> Result<D, StoreError>;

    fn delete<D: Document>(&mut self, id: &str) -> Result<(), StoreError>;

    fn get<D: Document>(&self, id: &str) -> Result<D, StoreError>;

    fn list<D: Document>(&self) -> Result<Vec<D>, StoreError>;

    /// Create when the document has no id yet, update otherwise.
    fn upsert<D: Document>(&mut self, doc: D, user: &str) -> Result<D, StoreError> {
        if doc.id().is_some() {
            self.update(doc, user)
        } else {
            self.create(doc, user)
        }
    }
}

/// In-memory document store holding JSON values per collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: HashMap<&'static str, BTreeMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn encode<D: Document>(doc: &D) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(doc).map_err(|source| StoreError::Serde {
            collection: D::COLLECTION,
            source,
        })
    }

    fn decode<D: Document>(value: &serde_json::Value) -> Result<D, StoreError> {
        D::deserialize(value).map_err(|source| StoreError::Serde {
            collection: D::COLLECTION,
            source,
        })
    }

    fn check<D: Document>(doc: &D) -> Result<(), StoreError> {
        doc.validate().map_err(|source| StoreError::Invalid {
            collection: D::COLLECTION,
            source,
        })
    }
}

impl DocumentStore for MemoryStore {
    fn create<D: Document>(&mut self, mut doc: D, user: &str) -> Result<D, StoreError> {
        Self::check(&doc)?;

        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        doc.set_id(id.clone());
        *doc.audit_mut() = Audit {
            created_by: Some(user.to_string()),
            created_at: Some(now),
            last_modified_by: Some(user.to_string()),
            last_modified_at: Some(now),
        };

        let value = Self::encode(&doc)?;
        self.collections
            .entry(D::COLLECTION)
            .or_default()
            .insert(id.clone(), value);
        debug!(collection = D::COLLECTION, id, user, "document created");
        Ok(doc)
    }

    fn update<D: Document>(&mut self, mut doc: D, user: &str) -> Result<D, StoreError> {
        Self::check(&doc)?;

        let id = doc
            .id()
            .ok_or(StoreError::MissingId {
                collection: D::COLLECTION,
            })?
            .to_string();
        let collection = self.collections.entry(D::COLLECTION).or_default();
        let stored = collection.get(&id).ok_or_else(|| StoreError::NotFound {
            collection: D::COLLECTION,
            id: id.clone(),
        })?;

        // creation audit is owned by the store, not by the caller
        let mut previous: D = Self::decode(stored)?;
        let created = previous.audit_mut().clone();
        *doc.audit_mut() = Audit {
            created_by: created.created_by,
            created_at: created.created_at,
            last_modified_by: Some(user.to_string()),
            last_modified_at: Some(Utc::now()),
        };

        let value = Self::encode(&doc)?;
        collection.insert(id.clone(), value);
        debug!(collection = D::COLLECTION, id, user, "document updated");
        Ok(doc)
    }

    fn delete<D: Document>(&mut self, id: &str) -> Result<(), StoreError> {
        self.collections
            .get_mut(D::COLLECTION)
            .and_then(|collection| collection.remove(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: D::COLLECTION,
                id: id.to_string(),
            })?;
        debug!(collection = D::COLLECTION, id, "document deleted");
        Ok(())
    }

    fn get<D: Document>(&self, id: &str) -> Result<D, StoreError> {
        let value = self
            .collections
            .get(D::COLLECTION)
            .and_then(|collection| collection.get(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: D::COLLECTION,
                id: id.to_string(),
            })?;
        Self::decode(value)
    }

    fn list<D: Document>(&self) -> Result<Vec<D>, StoreError> {
        self.collections
            .get(D::COLLECTION)
            .map(|collection| collection.values().map(Self::decode).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
