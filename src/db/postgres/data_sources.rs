use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::DataSourceRepo,
    },
    models::DataSource,
};

pub struct PostgresDataSourceRepo {
    read_pool: PgPool,
}

impl PostgresDataSourceRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        Self {
            read_pool: read_pool.unwrap_or(write_pool),
        }
    }
}

#[async_trait]
impl DataSourceRepo for PostgresDataSourceRepo {
    async fn get_data_source(&self, id: i64) -> DbResult<DataSource> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, internal_id
            FROM data_sources
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(DataSource {
            id: row.get("id"),
            project_id: row.get("project_id"),
            internal_id: row.get("internal_id"),
        })
    }
}
