use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::common::version_from_row;
use crate::{
    db::{error::DbResult, repos::DocumentVersionRepo},
    models::{DocumentVersion, VersionStatus},
};

pub struct SqliteDocumentVersionRepo {
    pool: SqlitePool,
}

impl SqliteDocumentVersionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentVersionRepo for SqliteDocumentVersionRepo {
    async fn list_deleted_versions(
        &self,
        after_id: Option<i64>,
        limit: i64,
    ) -> DbResult<Vec<DocumentVersion>> {
        let rows = sqlx::query(
            r#"
            SELECT id, data_source_id, document_id, created_at, hash, status
            FROM document_versions
            WHERE status = ? AND id > ?
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(VersionStatus::Deleted.as_str())
        .bind(after_id.unwrap_or(i64::MIN))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(version_from_row).collect()
    }

    async fn has_live_version_with_hash(
        &self,
        data_source_id: i64,
        document_id: &str,
        hash: &str,
        not_before: Option<i64>,
    ) -> DbResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM document_versions
                WHERE data_source_id = ? AND document_id = ? AND hash = ?
                  AND status = ? AND created_at >= ?
            ) AS live
            "#,
        )
        .bind(data_source_id)
        .bind(document_id)
        .bind(hash)
        .bind(VersionStatus::Active.as_str())
        .bind(not_before.unwrap_or(i64::MIN))
        .fetch_one(&self.pool)
        .await?;

        // SQLite reports EXISTS as an integer
        Ok(row.get::<i64, _>("live") != 0)
    }

    async fn earliest_deleted_created_at(
        &self,
        data_source_id: i64,
        document_id: &str,
        hash: &str,
    ) -> DbResult<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT MIN(created_at) AS earliest
            FROM document_versions
            WHERE data_source_id = ? AND document_id = ? AND hash = ? AND status = ?
            "#,
        )
        .bind(data_source_id)
        .bind(document_id)
        .bind(hash)
        .bind(VersionStatus::Deleted.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<Option<i64>, _>("earliest"))
    }

    async fn purge_deleted_versions(
        &self,
        data_source_id: i64,
        document_id: &str,
        hash: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM document_versions
            WHERE data_source_id = ? AND document_id = ? AND hash = ? AND status = ?
            "#,
        )
        .bind(data_source_id)
        .bind(document_id)
        .bind(hash)
        .bind(VersionStatus::Deleted.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
