use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use super::schema::initialize_schema;
use crate::types::error::SettingsError;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Open (or create) the settings database and make sure the schema exists
pub fn create_pool(db_path: &Path) -> Result<DbPool, SettingsError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path);

    // Settings traffic is tiny; a couple of connections is plenty
    let pool = Pool::builder().max_size(2).build(manager)?;

    let conn = pool.get()?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;",
    )?;

    initialize_schema(&conn)?;

    Ok(pool)
}
