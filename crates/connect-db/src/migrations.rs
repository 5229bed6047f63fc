use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

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
                id          TEXT PRIMARY KEY,
                first_name  TEXT NOT NULL,
                last_name   TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL CHECK (role IN ('entrepreneur', 'investor', 'admin')),
                photo_url   TEXT,
                verified    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE startups (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name            TEXT NOT NULL,
                description     TEXT NOT NULL,
                pitch_deck      TEXT,
                industry        TEXT,
                location        TEXT,
                funding_stage   TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_startups_owner ON startups(owner_id);

            CREATE TABLE connection_requests (
                id          TEXT PRIMARY KEY,
                sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status      TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'accepted', 'rejected')),
                created_at  TEXT NOT NULL,
                updated_at  TEXT
            );

            -- At most one outstanding request per sender/receiver pair
            CREATE UNIQUE INDEX idx_connection_requests_pending
                ON connection_requests(sender_id, receiver_id) WHERE status = 'pending';
            CREATE INDEX idx_connection_requests_receiver ON connection_requests(receiver_id);

            CREATE TABLE investment_requests (
                id          TEXT PRIMARY KEY,
                startup_id  TEXT NOT NULL REFERENCES startups(id) ON DELETE CASCADE,
                investor_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status      TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'accepted', 'rejected')),
                created_at  TEXT NOT NULL,
                updated_at  TEXT
            );

            CREATE UNIQUE INDEX idx_investment_requests_pending
                ON investment_requests(startup_id, investor_id) WHERE status = 'pending';
            CREATE INDEX idx_investment_requests_owner ON investment_requests(owner_id);

            CREATE TABLE chats (
                id              TEXT PRIMARY KEY,
                participant_a   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                participant_b   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                item_id         TEXT,
                item_type       TEXT CHECK (item_type IN ('startup', 'investment')),
                created_at      TEXT NOT NULL,
                CHECK (participant_a <> participant_b)
            );

            CREATE INDEX idx_chats_a ON chats(participant_a);
            CREATE INDEX idx_chats_b ON chats(participant_b);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                text        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, created_at);

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind            TEXT NOT NULL,
                sender_id       TEXT NOT NULL,
                message         TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                is_read         INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, is_read);

            CREATE TABLE otps (
                email       TEXT PRIMARY KEY,
                code_hash   TEXT NOT NULL,
                expires_at  TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                verified_at TEXT
            );

            CREATE TABLE favorites (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                startup_id  TEXT NOT NULL REFERENCES startups(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                UNIQUE (user_id, startup_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (posts)");
        conn.execute_batch(
            "
            CREATE TABLE posts (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind        TEXT NOT NULL CHECK (kind IN ('startup', 'investment')),
                title       TEXT NOT NULL,
                description TEXT NOT NULL,
                startup_id  TEXT REFERENCES startups(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                CHECK ((kind = 'startup') = (startup_id IS NOT NULL))
            );

            CREATE INDEX idx_posts_created ON posts(created_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
