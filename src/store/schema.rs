//! Database schema definitions for the fingerprint store

/// SQL schema for the fingerprint database
pub const SCHEMA_SQL: &str = r#"
-- Key/value fingerprints per resource
CREATE TABLE IF NOT EXISTS fingerprints (
    id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (id, key)
);

-- Children produced by a container the last time it was unwrapped
CREATE TABLE IF NOT EXISTS referred_ids (
    id TEXT NOT NULL,
    referred_id TEXT NOT NULL,
    PRIMARY KEY (id, referred_id)
);

CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO store_meta (key, value) VALUES ('schema_version', ?1)",
        [get_schema_version().to_string()],
    )?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
