//! Table definitions, created idempotently on open.

use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS arcade (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    data TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS machine (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pcbid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    arcadeid INTEGER,
    port INTEGER NOT NULL DEFAULT 0,
    game TEXT,
    version INTEGER,
    data TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS arcade_settings (
    arcadeid INTEGER NOT NULL,
    game TEXT NOT NULL,
    version INTEGER NOT NULL,
    type TEXT NOT NULL,
    data TEXT NOT NULL,
    UNIQUE (arcadeid, game, version, type)
);

CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pin TEXT NOT NULL,
    data TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS card (
    id TEXT PRIMARY KEY,
    userid INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS refid (
    refid TEXT PRIMARY KEY,
    game TEXT NOT NULL,
    version INTEGER NOT NULL,
    userid INTEGER NOT NULL,
    UNIQUE (game, version, userid)
);

CREATE TABLE IF NOT EXISTS profile (
    game TEXT NOT NULL,
    version INTEGER NOT NULL,
    userid INTEGER NOT NULL,
    data TEXT NOT NULL,
    UNIQUE (game, version, userid)
);

CREATE TABLE IF NOT EXISTS series_settings (
    game TEXT NOT NULL,
    userid INTEGER NOT NULL,
    data TEXT NOT NULL,
    UNIQUE (game, userid)
);

CREATE TABLE IF NOT EXISTS score (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    userid INTEGER NOT NULL,
    game TEXT NOT NULL,
    musicid INTEGER NOT NULL,
    points INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    "update" INTEGER NOT NULL,
    lid INTEGER NOT NULL,
    data TEXT NOT NULL,
    UNIQUE (userid, musicid)
);
CREATE INDEX IF NOT EXISTS score_update ON score ("update");

CREATE TABLE IF NOT EXISTS score_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    userid INTEGER NOT NULL,
    game TEXT NOT NULL,
    musicid INTEGER NOT NULL,
    points INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    lid INTEGER NOT NULL,
    new_record INTEGER NOT NULL,
    data TEXT NOT NULL,
    UNIQUE (userid, musicid, timestamp)
);
CREATE INDEX IF NOT EXISTS score_history_musicid ON score_history (musicid);

CREATE TABLE IF NOT EXISTS event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    userid INTEGER,
    arcadeid INTEGER,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS event_type ON event (type);
"#;

pub(crate) fn create_all(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
