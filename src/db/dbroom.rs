use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

use crate::models::RoomDocumentRecord;

// Global database instance
static DB: OnceCell<Arc<DbRoom>> = OnceCell::const_new();

/// Initialize the global database connection
pub async fn init_db(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = DbRoom::new(database_url).await?;
    db.ensure_schema().await?;
    DB.set(Arc::new(db))
        .map_err(|_| "Database already initialized")?;
    Ok(())
}

/// Get the global database instance, if one was initialized
pub fn get_db() -> Option<Arc<DbRoom>> {
    DB.get().cloned()
}

/// Outcome of a creator-checked delete.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// The requesting identity is not the record's creator.
    Forbidden,
}

/// Authorization decision for a delete request: only the record's
/// creator may delete it.
fn delete_decision(created_by: Option<&str>, identity: &str) -> DeleteOutcome {
    match created_by {
        None => DeleteOutcome::NotFound,
        Some(creator) if creator != identity => DeleteOutcome::Forbidden,
        Some(_) => DeleteOutcome::Deleted,
    }
}

/// Database connection pool
pub struct DbRoom {
    pool: PgPool,
}

impl DbRoom {
    /// Create a new database connection pool
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create the document table when it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS room_documents (
                room_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                language TEXT NOT NULL,
                title TEXT NOT NULL,
                created_by TEXT NOT NULL,
                last_modified_by TEXT NOT NULL,
                last_modified TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS room_documents_created_by_idx \
             ON room_documents (created_by)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert a document record by room id: create-if-absent, else patch
    /// content/language/title/modifier/timestamp. `fallback_title` only
    /// applies on creation; an absent `title` leaves an existing title
    /// untouched.
    pub async fn upsert_document(
        &self,
        room_id: &str,
        content: &str,
        language: &str,
        title: Option<&str>,
        fallback_title: &str,
        identity: &str,
    ) -> Result<RoomDocumentRecord, SqlxError> {
        let query_sql = r#"
            INSERT INTO room_documents
                (room_id, content, language, title, created_by, last_modified_by, last_modified, created_at)
            VALUES
                ($1, $2, $3, COALESCE($4, $5), $6, $6, NOW(), NOW())
            ON CONFLICT (room_id) DO UPDATE SET
                content = EXCLUDED.content,
                language = EXCLUDED.language,
                title = COALESCE($4, room_documents.title),
                last_modified_by = EXCLUDED.last_modified_by,
                last_modified = NOW()
            RETURNING *
        "#;

        sqlx::query_as::<_, RoomDocumentRecord>(query_sql)
            .bind(room_id)
            .bind(content)
            .bind(language)
            .bind(title)
            .bind(fallback_title)
            .bind(identity)
            .fetch_one(&self.pool)
            .await
    }

    /// Fetch the record for a room id, if one exists.
    pub async fn get_document(
        &self,
        room_id: &str,
    ) -> Result<Option<RoomDocumentRecord>, SqlxError> {
        sqlx::query_as::<_, RoomDocumentRecord>(
            "SELECT * FROM room_documents WHERE room_id = $1",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// All records created by one identity, most recently modified first.
    pub async fn list_documents_by_creator(
        &self,
        identity: &str,
    ) -> Result<Vec<RoomDocumentRecord>, SqlxError> {
        sqlx::query_as::<_, RoomDocumentRecord>(
            "SELECT * FROM room_documents WHERE created_by = $1 \
             ORDER BY last_modified DESC",
        )
        .bind(identity)
        .fetch_all(&self.pool)
        .await
    }

    /// Delete a record, allowed only for its creator. The ownership check
    /// and the delete run in one transaction.
    pub async fn delete_document(
        &self,
        room_id: &str,
        identity: &str,
    ) -> Result<DeleteOutcome, SqlxError> {
        let mut tx = self.pool.begin().await?;

        let created_by: Option<String> = sqlx::query_scalar(
            "SELECT created_by FROM room_documents WHERE room_id = $1 FOR UPDATE",
        )
        .bind(room_id)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = delete_decision(created_by.as_deref(), identity);
        if outcome == DeleteOutcome::Deleted {
            sqlx::query("DELETE FROM room_documents WHERE room_id = $1")
                .bind(room_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Refresh only the content and timestamp of an existing record; used
    /// by the autosave pass, which carries no caller identity. Returns
    /// false when no record exists for the room.
    pub async fn refresh_content(&self, room_id: &str, content: &str) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            "UPDATE room_documents SET content = $2, last_modified = NOW() \
             WHERE room_id = $1",
        )
        .bind(room_id)
        .bind(content)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persisted content for seeding a fresh room document.
    pub async fn seed_content(&self, room_id: &str) -> Result<Option<String>, SqlxError> {
        sqlx::query_scalar("SELECT content FROM room_documents WHERE room_id = $1")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_requires_existing_record() {
        assert_eq!(delete_decision(None, "user-1"), DeleteOutcome::NotFound);
    }

    #[test]
    fn test_delete_rejected_for_non_creator() {
        assert_eq!(
            delete_decision(Some("user-1"), "user-2"),
            DeleteOutcome::Forbidden
        );
    }

    #[test]
    fn test_delete_allowed_for_creator() {
        assert_eq!(
            delete_decision(Some("user-1"), "user-1"),
            DeleteOutcome::Deleted
        );
    }
}
