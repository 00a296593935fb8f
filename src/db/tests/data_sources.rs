//! Shared tests for DataSourceRepo implementations

use super::harness::Seeder;
use crate::db::{error::DbError, repos::DataSourceRepo};

pub struct DataSourceTestContext<'a> {
    pub repo: &'a dyn DataSourceRepo,
    pub seed: Seeder,
}

pub async fn test_get_data_source(ctx: &DataSourceTestContext<'_>) {
    let id = ctx.seed.data_source(7, "i-seven").await;

    let ds = ctx
        .repo
        .get_data_source(id)
        .await
        .expect("Failed to get data source");

    assert_eq!(ds.id, id);
    assert_eq!(ds.project_id, 7);
    assert_eq!(ds.internal_id, "i-seven");
}

pub async fn test_get_data_source_not_found(ctx: &DataSourceTestContext<'_>) {
    let result = ctx.repo.get_data_source(999_999).await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

#[cfg(feature = "database-sqlite")]
mod sqlite_tests {
    use super::*;
    use crate::db::{sqlite::SqliteDataSourceRepo, tests::harness::create_migrated_sqlite_pool};

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let pool = create_migrated_sqlite_pool().await;
                let repo = SqliteDataSourceRepo::new(pool.clone());
                let ctx = DataSourceTestContext {
                    repo: &repo,
                    seed: Seeder::Sqlite(pool),
                };
                super::$name(&ctx).await;
            }
        };
    }

    sqlite_test!(test_get_data_source);
    sqlite_test!(test_get_data_source_not_found);
}

#[cfg(all(test, feature = "database-postgres"))]
mod postgres_tests {
    use super::*;
    use crate::db::{
        postgres::PostgresDataSourceRepo,
        tests::harness::postgres::{create_isolated_postgres_pool, run_postgres_migrations},
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = create_isolated_postgres_pool().await;
                run_postgres_migrations(&pool).await;
                let repo = PostgresDataSourceRepo::new(pool.clone(), None);
                let ctx = DataSourceTestContext {
                    repo: &repo,
                    seed: Seeder::Postgres(pool),
                };
                super::$name(&ctx).await;
            }
        };
    }

    postgres_test!(test_get_data_source);
    postgres_test!(test_get_data_source_not_found);
}
