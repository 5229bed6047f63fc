use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use connect_types::models::Post;

use super::OptionalExt;
use crate::Database;
use crate::models::{PostRow, encode_ts};

const POST_COLUMNS: &str = "id, user_id, kind, title, description, startup_id, created_at";

impl Database {
    pub fn insert_post(&self, post: &Post) -> Result<()> {
        self.with_conn_mut(|conn| insert_post_row(conn, post))
    }

    pub fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1");
            conn.query_row(&sql, [id.to_string()], post_from_row)
                .optional()?
                .map(PostRow::into_post)
                .transpose()
        })
    }

    /// Newest first. `None` returns every post.
    pub fn list_posts(&self, limit: Option<usize>) -> Result<Vec<Post>> {
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        self.with_conn(|conn| {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, rowid DESC LIMIT ?1");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(PostRow::into_post).collect()
        })
    }
}

pub(super) fn insert_post_row(conn: &Connection, post: &Post) -> Result<()> {
    conn.execute(
        "INSERT INTO posts (id, user_id, kind, title, description, startup_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            post.id.to_string(),
            post.user_id.to_string(),
            post.kind.as_str(),
            post.title,
            post.description,
            post.startup_id.map(|id| id.to_string()),
            encode_ts(post.created_at),
        ],
    )?;
    Ok(())
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        startup_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}
