use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

/// The database file is the location shared between the client and the
/// bridge process, so both open it with WAL and a busy timeout.
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS events (
    event_id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    date TEXT NOT NULL DEFAULT '',
    time TEXT NOT NULL DEFAULT '',
    owner TEXT NOT NULL DEFAULT '',
    log_url TEXT,
    signups BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_schedule ON events (date, time, event_id);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_update INTEGER NOT NULL DEFAULT 0,
    last_command_id INTEGER NOT NULL DEFAULT 0,
    last_seen_heartbeat INTEGER
);
INSERT OR IGNORE INTO store_meta (id) VALUES (1);

CREATE TABLE IF NOT EXISTS command_queue (
    command_id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    event_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    payload BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS bridge_record (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    heartbeat INTEGER NOT NULL,
    last_update INTEGER NOT NULL,
    events BLOB NOT NULL
);
";
