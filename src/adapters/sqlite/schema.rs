use rusqlite::Connection;

use crate::types::error::SettingsError;

pub fn initialize_schema(conn: &Connection) -> Result<(), SettingsError> {
    conn.execute_batch("
        -- Durable key/value settings. The settings document lives under a
        -- single well-known key as JSON.
        CREATE TABLE IF NOT EXISTS settings (
            key             TEXT PRIMARY KEY,
            value           TEXT NOT NULL,
            updated_at      INTEGER NOT NULL    -- unix epoch ms
        );
    ")?;

    Ok(())
}
