use async_trait::async_trait;

use crate::{db::error::DbResult, models::DocumentVersion};

/// Repository trait for document version records.
///
/// Only the operations the scrubber needs. Creating versions and marking them
/// deleted belongs to the ingestion write path.
#[async_trait]
pub trait DocumentVersionRepo: Send + Sync {
    /// List versions with `status = 'deleted'`, ordered by id.
    ///
    /// Keyset paginated: pass the last id of the previous page as `after_id`.
    async fn list_deleted_versions(
        &self,
        after_id: Option<i64>,
        limit: i64,
    ) -> DbResult<Vec<DocumentVersion>>;

    /// Whether an active version of the document exists with the same hash.
    ///
    /// When `not_before` is set, only active versions created at or after it
    /// (epoch milliseconds) count.
    async fn has_live_version_with_hash(
        &self,
        data_source_id: i64,
        document_id: &str,
        hash: &str,
        not_before: Option<i64>,
    ) -> DbResult<bool>;

    /// Earliest `created_at` among the deleted rows of a triple, if any remain.
    ///
    /// A triple's deleted rows share one set of blobs, so liveness for the
    /// whole triple is judged from its oldest deleted row.
    async fn earliest_deleted_created_at(
        &self,
        data_source_id: i64,
        document_id: &str,
        hash: &str,
    ) -> DbResult<Option<i64>>;

    /// Remove the deleted rows of a `(data_source_id, document_id, hash)` triple.
    ///
    /// Active rows are never touched. Returns the number of rows removed;
    /// zero is not an error.
    async fn purge_deleted_versions(
        &self,
        data_source_id: i64,
        document_id: &str,
        hash: &str,
    ) -> DbResult<u64>;
}
