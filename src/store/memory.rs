use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::{new_id, not_found, Document, SecondaryKey, Store};
use crate::error::AppError;

struct Stored {
    id: String,
    body: Value,
}

/// Process-local document store. Cloning shares the same collections.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<&'static str, Vec<Stored>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_matching<T, F>(&self, keep: F) -> Result<Vec<T>, AppError>
    where
        T: Document,
        F: Fn(&Stored) -> bool,
    {
        let collections = self.collections.read().map_err(|_| AppError::LockPoisoned)?;
        let Some(docs) = collections.get(T::COLLECTION) else {
            return Ok(Vec::new());
        };
        docs.iter()
            .filter(|d| keep(d))
            .map(|d| serde_json::from_value(d.body.clone()).map_err(AppError::from))
            .collect()
    }
}

impl Store for MemoryStore {
    async fn insert<T: Document>(&self, mut doc: T) -> Result<T, AppError> {
        doc.set_id(new_id());
        let body = serde_json::to_value(&doc)?;
        let mut collections = self.collections.write().map_err(|_| AppError::LockPoisoned)?;
        collections.entry(T::COLLECTION).or_default().push(Stored {
            id: doc.id().to_string(),
            body,
        });
        tracing::debug!(collection = T::COLLECTION, id = doc.id(), "inserted");
        Ok(doc)
    }

    async fn find_by_id<T: Document>(&self, id: &str) -> Result<Option<T>, AppError> {
        Ok(self.read_matching::<T, _>(|d| d.id == id)?.into_iter().next())
    }

    async fn find_all<T: Document>(&self) -> Result<Vec<T>, AppError> {
        self.read_matching(|_| true)
    }

    async fn find_by<T: Document>(&self, key: SecondaryKey, value: &str) -> Result<Vec<T>, AppError> {
        let field = key.field();
        self.read_matching(|d| d.body.get(field).and_then(Value::as_str) == Some(value))
    }

    async fn update<T: Document>(&self, doc: T) -> Result<T, AppError> {
        let body = serde_json::to_value(&doc)?;
        let mut collections = self.collections.write().map_err(|_| AppError::LockPoisoned)?;
        let slot = collections
            .get_mut(T::COLLECTION)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == doc.id()))
            .ok_or_else(not_found::<T>)?;
        slot.body = body;
        tracing::debug!(collection = T::COLLECTION, id = doc.id(), "updated");
        Ok(doc)
    }

    async fn delete<T: Document>(&self, id: &str) -> Result<(), AppError> {
        let mut collections = self.collections.write().map_err(|_| AppError::LockPoisoned)?;
        if let Some(docs) = collections.get_mut(T::COLLECTION) {
            docs.retain(|d| d.id != id);
        }
        tracing::debug!(collection = T::COLLECTION, id, "deleted");
        Ok(())
    }
}
