//! Test harness for database repository testing
//!
//! Provides utilities for setting up test databases:
//! - SQLite: Fast in-memory databases with real migrations
//! - PostgreSQL: Testcontainers-based instances with real migrations
//!
//! Rows are seeded with raw SQL through [`Seeder`], since creating versions
//! belongs to the ingestion write path and the repos do not expose it.

#[cfg(feature = "database-sqlite")]
use sqlx::SqlitePool;

use crate::models::VersionStatus;

/// Create an in-memory SQLite pool for testing
#[cfg(feature = "database-sqlite")]
pub async fn create_sqlite_pool() -> SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// Run SQLite migrations on the pool
///
/// Uses the actual migration files to ensure tests match production schema
#[cfg(feature = "database-sqlite")]
pub async fn run_sqlite_migrations(pool: &SqlitePool) {
    sqlx::migrate!("./migrations_sqlx/sqlite")
        .run(pool)
        .await
        .expect("Failed to run SQLite migrations");
}

/// Create a migrated in-memory SQLite pool
#[cfg(feature = "database-sqlite")]
pub async fn create_migrated_sqlite_pool() -> SqlitePool {
    let pool = create_sqlite_pool().await;
    run_sqlite_migrations(&pool).await;
    pool
}

/// Raw-SQL fixture writer for either backend
#[derive(Clone)]
pub enum Seeder {
    #[cfg(feature = "database-sqlite")]
    Sqlite(SqlitePool),
    #[cfg(feature = "database-postgres")]
    Postgres(sqlx::PgPool),
}

impl Seeder {
    /// Insert a data source and return its ID
    pub async fn data_source(&self, project_id: i64, internal_id: &str) -> i64 {
        match self {
            #[cfg(feature = "database-sqlite")]
            Seeder::Sqlite(pool) => sqlx::query_scalar(
                "INSERT INTO data_sources (project_id, internal_id, created_at) VALUES (?, ?, 0) RETURNING id",
            )
            .bind(project_id)
            .bind(internal_id)
            .fetch_one(pool)
            .await
            .expect("Failed to insert data source"),
            #[cfg(feature = "database-postgres")]
            Seeder::Postgres(pool) => sqlx::query_scalar(
                "INSERT INTO data_sources (project_id, internal_id, created_at) VALUES ($1, $2, 0) RETURNING id",
            )
            .bind(project_id)
            .bind(internal_id)
            .fetch_one(pool)
            .await
            .expect("Failed to insert data source"),
        }
    }

    /// Insert a document version and return its ID
    pub async fn version(
        &self,
        data_source_id: i64,
        document_id: &str,
        created_at: i64,
        hash: &str,
        status: VersionStatus,
    ) -> i64 {
        match self {
            #[cfg(feature = "database-sqlite")]
            Seeder::Sqlite(pool) => sqlx::query_scalar(
                r#"
                INSERT INTO document_versions (data_source_id, document_id, created_at, hash, status)
                VALUES (?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(data_source_id)
            .bind(document_id)
            .bind(created_at)
            .bind(hash)
            .bind(status.as_str())
            .fetch_one(pool)
            .await
            .expect("Failed to insert document version"),
            #[cfg(feature = "database-postgres")]
            Seeder::Postgres(pool) => sqlx::query_scalar(
                r#"
                INSERT INTO document_versions (data_source_id, document_id, created_at, hash, status)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(data_source_id)
            .bind(document_id)
            .bind(created_at)
            .bind(hash)
            .bind(status.as_str())
            .fetch_one(pool)
            .await
            .expect("Failed to insert document version"),
        }
    }

    /// Whether a version row with this ID still exists
    pub async fn version_exists(&self, id: i64) -> bool {
        let count: i64 = match self {
            #[cfg(feature = "database-sqlite")]
            Seeder::Sqlite(pool) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM document_versions WHERE id = ?")
                    .bind(id)
                    .fetch_one(pool)
                    .await
                    .expect("Failed to count versions")
            }
            #[cfg(feature = "database-postgres")]
            Seeder::Postgres(pool) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM document_versions WHERE id = $1")
                    .bind(id)
                    .fetch_one(pool)
                    .await
                    .expect("Failed to count versions")
            }
        };
        count > 0
    }
}

/// PostgreSQL test harness using testcontainers
#[cfg(all(test, feature = "database-postgres"))]
pub mod postgres {
    use std::sync::OnceLock;

    use sqlx::PgPool;
    use testcontainers_modules::{
        postgres::Postgres,
        testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner},
    };
    use tokio::sync::OnceCell;

    /// Shared container state - initialized once per test run
    struct SharedContainer {
        #[allow(dead_code)] // Test infrastructure: keeps container alive
        container: ContainerAsync<Postgres>,
        connection_string: String,
    }

    /// Global shared container - lazily initialized on first use
    static SHARED_CONTAINER: OnceLock<OnceCell<SharedContainer>> = OnceLock::new();

    async fn get_shared_container() -> &'static SharedContainer {
        let cell = SHARED_CONTAINER.get_or_init(OnceCell::new);
        cell.get_or_init(|| async {
            let container = Postgres::default()
                .with_tag("17-alpine")
                .start()
                .await
                .expect("Failed to start PostgreSQL container");

            let host = container.get_host().await.expect("Failed to get host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("Failed to get port");

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            SharedContainer {
                container,
                connection_string,
            }
        })
        .await
    }

    /// Create an isolated database schema for a single test
    ///
    /// Each test gets its own schema inside one shared container, so tests stay
    /// isolated without paying container startup per test.
    pub async fn create_isolated_postgres_pool() -> PgPool {
        let shared = get_shared_container().await;

        let admin_pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&shared.connection_string)
            .await
            .expect("Failed to connect to PostgreSQL");

        let schema_name = format!("test_{}", uuid::Uuid::new_v4().simple());

        sqlx::query(&format!("CREATE SCHEMA \"{}\"", schema_name))
            .execute(&admin_pool)
            .await
            .expect("Failed to create test schema");

        let isolated_url = format!(
            "{}?options=-c search_path={}",
            shared.connection_string, schema_name
        );

        sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&isolated_url)
            .await
            .expect("Failed to connect to isolated schema")
    }

    /// Run PostgreSQL migrations on the pool
    pub async fn run_postgres_migrations(pool: &PgPool) {
        sqlx::migrate!("./migrations_sqlx/postgres")
            .run(pool)
            .await
            .expect("Failed to run PostgreSQL migrations");
    }
}
