//! Database initialization
//!
//! Opens (or creates) the SQLite database and makes sure every table the
//! engine reads or writes exists. Safe to run on every startup.

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    info!(
        "Database ready: {} connections, busy_timeout={}ms",
        config.max_connections, config.busy_timeout_ms
    );

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    // Catalog
    create_facility_categories_table(pool).await?;
    create_space_types_table(pool).await?;
    create_facilities_table(pool).await?;
    create_facility_category_memberships_table(pool).await?;
    create_facility_space_types_table(pool).await?;

    // Spaces and reviews
    create_spaces_table(pool).await?;
    create_space_space_types_table(pool).await?;
    create_facility_reviews_table(pool).await?;

    // Derived consensus rows
    create_space_facilities_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_facility_categories_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facility_categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_space_types_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS space_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_facilities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facilities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            icon TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_facility_category_memberships_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facility_category_memberships (
            facility_id INTEGER NOT NULL REFERENCES facilities(id) ON DELETE CASCADE,
            category_id INTEGER NOT NULL REFERENCES facility_categories(id) ON DELETE CASCADE,
            PRIMARY KEY (facility_id, category_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_facility_space_types_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facility_space_types (
            facility_id INTEGER NOT NULL REFERENCES facilities(id) ON DELETE CASCADE,
            space_type_id INTEGER NOT NULL REFERENCES space_types(id) ON DELETE CASCADE,
            PRIMARY KEY (facility_id, space_type_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_spaces_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS spaces (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_space_space_types_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS space_space_types (
            space_id INTEGER NOT NULL REFERENCES spaces(id) ON DELETE CASCADE,
            space_type_id INTEGER NOT NULL REFERENCES space_types(id) ON DELETE CASCADE,
            PRIMARY KEY (space_id, space_type_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_facility_reviews_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facility_reviews (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            space_id INTEGER NOT NULL REFERENCES spaces(id) ON DELETE CASCADE,
            facility_id INTEGER NOT NULL REFERENCES facilities(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL,
            experience TEXT NOT NULL CHECK (experience IN
                ('was_allowed', 'was_allowed_but_bad', 'was_not_allowed', 'was_not_available')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_facility_reviews_pair ON facility_reviews(space_id, facility_id, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per (space, facility); the aggregation runner owns `experience`
async fn create_space_facilities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS space_facilities (
            space_id INTEGER NOT NULL REFERENCES spaces(id) ON DELETE CASCADE,
            facility_id INTEGER NOT NULL REFERENCES facilities(id) ON DELETE CASCADE,
            experience TEXT NOT NULL DEFAULT 'unknown' CHECK (experience IN
                ('unknown', 'likely', 'unlikely', 'maybe', 'impossible')),
            description TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (space_id, facility_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
