//! Flat field-map documents persisted as JSONB rows.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use thiserror::Error;

use super::pool::DbPool;

pub type Fields = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type DocumentResult<T> = Result<T, DocumentError>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> DocumentResult<Option<StoredDocument>>;

    async fn create(&self, id: &str, fields: Fields) -> DocumentResult<StoredDocument>;

    /// Merges `fields` into the stored document; fields not named are kept.
    async fn update(&self, id: &str, fields: Fields) -> DocumentResult<StoredDocument>;

    async fn delete(&self, id: &str) -> DocumentResult<()>;

    /// First document (oldest first) whose field `name` equals `value`.
    async fn find_by_field(&self, name: &str, value: &Value)
    -> DocumentResult<Option<StoredDocument>>;
}

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: DbPool,
}

impl PgDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

type Row = (String, Json<Fields>);

fn into_document((id, Json(fields)): Row) -> StoredDocument {
    StoredDocument { id, fields }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, id: &str) -> DocumentResult<Option<StoredDocument>> {
        let row = sqlx::query_as::<_, Row>("SELECT id, fields FROM media_documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(into_document))
    }

    async fn create(&self, id: &str, fields: Fields) -> DocumentResult<StoredDocument> {
        let row = sqlx::query_as::<_, Row>(
            r#"
            INSERT INTO media_documents (id, fields)
            VALUES ($1, $2)
            RETURNING id, fields
            "#,
        )
        .bind(id)
        .bind(Json(fields))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => DocumentError::AlreadyExists(id.to_string()),
            _ => DocumentError::Database(e),
        })?;
        Ok(into_document(row))
    }

    async fn update(&self, id: &str, fields: Fields) -> DocumentResult<StoredDocument> {
        let row = sqlx::query_as::<_, Row>(
            r#"
            UPDATE media_documents
            SET fields = fields || $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, fields
            "#,
        )
        .bind(id)
        .bind(Json(fields))
        .fetch_optional(&self.pool)
        .await?;
        row.map(into_document)
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> DocumentResult<()> {
        let result = sqlx::query("DELETE FROM media_documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DocumentError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn find_by_field(
        &self,
        name: &str,
        value: &Value,
    ) -> DocumentResult<Option<StoredDocument>> {
        let row = sqlx::query_as::<_, Row>(
            r#"
            SELECT id, fields
            FROM media_documents
            WHERE fields -> $1 = $2
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(name)
        .bind(Json(value))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(into_document))
    }
}
