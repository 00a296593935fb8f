use async_trait::async_trait;

use crate::{db::error::DbResult, models::DataSource};

/// Repository trait for data source lookups
#[async_trait]
pub trait DataSourceRepo: Send + Sync {
    /// Get a data source by ID.
    ///
    /// Returns `DbError::NotFound` when no row exists.
    async fn get_data_source(&self, id: i64) -> DbResult<DataSource>;
}
