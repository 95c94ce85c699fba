use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id           TEXT PRIMARY KEY,
                username     TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                password     TEXT NOT NULL,
                role         TEXT NOT NULL,
                last_online  INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE credits (
                user_id         TEXT PRIMARY KEY REFERENCES users(id),
                connect_credits INTEGER NOT NULL DEFAULT 0,
                invite_credits  INTEGER NOT NULL DEFAULT 0,
                bid_credits     INTEGER NOT NULL DEFAULT 0
            );

            -- One conversation per pair of users. The pair is unordered:
            -- (user_a, user_b) is stored in initiation order and lookups
            -- check both orders.
            CREATE TABLE threads (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                user_a            TEXT NOT NULL REFERENCES users(id),
                user_b            TEXT NOT NULL REFERENCES users(id),
                created_at        INTEGER NOT NULL,
                last_updated      INTEGER NOT NULL,
                meeting_url       TEXT,
                meeting_issued_at INTEGER
            );

            CREATE INDEX idx_threads_user_a ON threads(user_a, last_updated);
            CREATE INDEX idx_threads_user_b ON threads(user_b, last_updated);

            -- Append-only; only is_read ever changes after insert.
            CREATE TABLE messages (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id    INTEGER NOT NULL REFERENCES threads(id),
                sender_id    TEXT NOT NULL REFERENCES users(id),
                recipient_id TEXT NOT NULL REFERENCES users(id),
                body         TEXT NOT NULL,
                created_at   INTEGER NOT NULL,
                is_read      INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_thread ON messages(thread_id, id);

            CREATE TABLE attachments (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES messages(id),
                url        TEXT NOT NULL,
                name       TEXT NOT NULL,
                mime_type  TEXT NOT NULL
            );

            CREATE INDEX idx_attachments_message ON attachments(message_id);

            CREATE TABLE connection_requests (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id    TEXT NOT NULL REFERENCES users(id),
                receiver_id  TEXT NOT NULL REFERENCES users(id),
                status       TEXT NOT NULL DEFAULT 'pending',
                created_at   INTEGER NOT NULL,
                responded_at INTEGER
            );

            CREATE INDEX idx_connreq_sender   ON connection_requests(sender_id, status);
            CREATE INDEX idx_connreq_receiver ON connection_requests(receiver_id, status);

            CREATE TABLE files (
                id         TEXT PRIMARY KEY,
                owner_id   TEXT NOT NULL REFERENCES users(id),
                name       TEXT NOT NULL,
                mime_type  TEXT NOT NULL,
                size       INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
