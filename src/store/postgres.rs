use serde_json::Value;
use sqlx::types::Json;

use super::{new_id, not_found, Document, SecondaryKey, Store};
use crate::db::Db;
use crate::error::AppError;

/// Documents as JSONB rows in the `documents` table, one `collection` per kind.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

impl Store for PgStore {
    async fn insert<T: Document>(&self, mut doc: T) -> Result<T, AppError> {
        doc.set_id(new_id());
        let body: Value = serde_json::to_value(&doc)?;
        sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(T::COLLECTION)
            .bind(doc.id())
            .bind(Json(body))
            .execute(&self.db)
            .await?;
        tracing::debug!(collection = T::COLLECTION, id = doc.id(), "inserted");
        Ok(doc)
    }

    async fn find_by_id<T: Document>(&self, id: &str) -> Result<Option<T>, AppError> {
        let row: Option<Json<T>> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = $1 AND id = $2")
                .bind(T::COLLECTION)
                .bind(id)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(|Json(doc)| doc))
    }

    async fn find_all<T: Document>(&self) -> Result<Vec<T>, AppError> {
        let rows: Vec<Json<T>> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = $1 ORDER BY seq")
                .bind(T::COLLECTION)
                .fetch_all(&self.db)
                .await?;
        Ok(rows.into_iter().map(|Json(doc)| doc).collect())
    }

    async fn find_by<T: Document>(&self, key: SecondaryKey, value: &str) -> Result<Vec<T>, AppError> {
        let rows: Vec<Json<T>> = sqlx::query_scalar(
            "SELECT body FROM documents WHERE collection = $1 AND body ->> $2 = $3 ORDER BY seq",
        )
        .bind(T::COLLECTION)
        .bind(key.field())
        .bind(value)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(|Json(doc)| doc).collect())
    }

    async fn update<T: Document>(&self, doc: T) -> Result<T, AppError> {
        let body: Value = serde_json::to_value(&doc)?;
        let result = sqlx::query(
            "UPDATE documents SET body = $3, updated_at = now() WHERE collection = $1 AND id = $2",
        )
        .bind(T::COLLECTION)
        .bind(doc.id())
        .bind(Json(body))
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_found::<T>());
        }
        tracing::debug!(collection = T::COLLECTION, id = doc.id(), "updated");
        Ok(doc)
    }

    async fn delete<T: Document>(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(T::COLLECTION)
            .bind(id)
            .execute(&self.db)
            .await?;
        tracing::debug!(collection = T::COLLECTION, id, "deleted");
        Ok(())
    }
}
