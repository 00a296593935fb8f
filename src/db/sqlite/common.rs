use sqlx::{Row, sqlite::SqliteRow};

use crate::{
    db::error::{DbError, DbResult},
    models::{DocumentVersion, VersionStatus},
};

/// Map a `document_versions` row, returning a DbError on an unknown status
pub fn version_from_row(row: &SqliteRow) -> DbResult<DocumentVersion> {
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
