use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::DocumentVersionRepo,
    },
    models::{DocumentVersion, VersionStatus},
};

pub struct PostgresDocumentVersionRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresDocumentVersionRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        Self {
            read_pool: read_pool.clone().unwrap_or_else(|| write_pool.clone()),
            write_pool,
        }
    }

    fn version_from_row(row: &PgRow) -> DbResult<DocumentVersion> {
        let status: String = row.get("status");

        Ok(DocumentVersion {
            id: row.get("id"),
            data_source_id: row.get("data_source_id"),
            document_id: row.get("document_id"),
            created_at: row.get("created_at"),
            hash: row.get("hash"),
            status: status
                .parse::<VersionStatus>()
                .map_err(DbError::Internal)?,
        })
    }
}

#[async_trait]
impl DocumentVersionRepo for PostgresDocumentVersionRepo {
    async fn list_deleted_versions(
        &self,
        after_id: Option<i64>,
        limit: i64,
    ) -> DbResult<Vec<DocumentVersion>> {
        let rows = sqlx::query(
            r#"
            SELECT id, data_source_id, document_id, created_at, hash, status
            FROM document_versions
            WHERE status = $1 AND id > $2
            ORDER BY id ASC
            LIMIT $3
            "#,
        )
        .bind(VersionStatus::Deleted.as_str())
        .bind(after_id.unwrap_or(i64::MIN))
        .bind(limit)
        .fetch_all(&self.read_pool)
        .await?;

        rows.iter().map(Self::version_from_row).collect()
    }

    async fn has_live_version_with_hash(
        &self,
        data_source_id: i64,
        document_id: &str,
        hash: &str,
        not_before: Option<i64>,
    ) -> DbResult<bool> {
        // Reads from the primary: a replica lagging behind could miss a
        // freshly written active version and let its blobs be deleted.
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM document_versions
                WHERE data_source_id = $1 AND document_id = $2 AND hash = $3
                  AND status = $4 AND created_at >= $5
            ) AS live
            "#,
        )
        .bind(data_source_id)
        .bind(document_id)
        .bind(hash)
        .bind(VersionStatus::Active.as_str())
        .bind(not_before.unwrap_or(i64::MIN))
        .fetch_one(&self.write_pool)
        .await?;

        Ok(row.get::<bool, _>("live"))
    }

    async fn earliest_deleted_created_at(
        &self,
        data_source_id: i64,
        document_id: &str,
        hash: &str,
    ) -> DbResult<Option<i64>> {
        // Same pool as the liveness check so both see the same rows
        let row = sqlx::query(
            r#"
            SELECT MIN(created_at) AS earliest
            FROM document_versions
            WHERE data_source_id = $1 AND document_id = $2 AND hash = $3 AND status = $4
            "#,
        )
        .bind(data_source_id)
        .bind(document_id)
        .bind(hash)
        .bind(VersionStatus::Deleted.as_str())
        .fetch_one(&self.write_pool)
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
            WHERE data_source_id = $1 AND document_id = $2 AND hash = $3 AND status = $4
            "#,
        )
        .bind(data_source_id)
        .bind(document_id)
        .bind(hash)
        .bind(VersionStatus::Deleted.as_str())
        .execute(&self.write_pool)
        .await?;

        Ok(result.rows_affected())
    }
}
