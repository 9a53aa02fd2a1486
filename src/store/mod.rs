//! Document persistence, one logical collection per entity kind.
//!
//! Documents are keyed by opaque string ids assigned on insert. There are no
//! foreign keys: a subject can point at a semester that no longer exists.

use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppError;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// An entity that lives in its own collection.
pub trait Document: Serialize + DeserializeOwned + Clone + Unpin + Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Human name used in `NotFound` errors.
    const ENTITY: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}

/// Reference fields a collection can be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryKey {
    SubjectId,
    SemesterId,
}

impl SecondaryKey {
    /// Field name inside the stored JSON document.
    pub fn field(self) -> &'static str {
        match self {
            SecondaryKey::SubjectId => "subjectId",
            SecondaryKey::SemesterId => "semesterId",
        }
    }
}

pub fn not_found<T: Document>() -> AppError {
    AppError::NotFound { entity: T::ENTITY }
}

pub trait Store: Clone + Send + Sync + 'static {
    /// Assigns a fresh id and stores the document.
    fn insert<T: Document>(&self, doc: T) -> impl Future<Output = Result<T, AppError>> + Send;

    fn find_by_id<T: Document>(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<T>, AppError>> + Send;

    /// Every document of the kind, in insertion order.
    fn find_all<T: Document>(&self) -> impl Future<Output = Result<Vec<T>, AppError>> + Send;

    /// Documents whose `key` equals `value`, in insertion order.
    fn find_by<T: Document>(
        &self,
        key: SecondaryKey,
        value: &str,
    ) -> impl Future<Output = Result<Vec<T>, AppError>> + Send;

    /// Replaces the stored document with the same id. `NotFound` if absent.
    fn update<T: Document>(&self, doc: T) -> impl Future<Output = Result<T, AppError>> + Send;

    /// Removes the document. Missing ids are ignored.
    fn delete<T: Document>(&self, id: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Finds by id or fails with `NotFound`.
pub async fn load<S: Store, T: Document>(store: &S, id: &str) -> Result<T, AppError> {
    store.find_by_id::<T>(id).await?.ok_or_else(not_found::<T>)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
