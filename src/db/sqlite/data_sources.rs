use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::DataSourceRepo,
    },
    models::DataSource,
};

pub struct SqliteDataSourceRepo {
    pool: SqlitePool,
}

impl SqliteDataSourceRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataSourceRepo for SqliteDataSourceRepo {
    async fn get_data_source(&self, id: i64) -> DbResult<DataSource> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, internal_id
            FROM data_sources
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(DataSource {
            id: row.get("id"),
            project_id: row.get("project_id"),
            internal_id: row.get("internal_id"),
        })
    }
}
