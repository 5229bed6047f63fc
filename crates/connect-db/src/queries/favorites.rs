use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use connect_types::models::Favorite;

use super::{InsertOutcome, OptionalExt, is_unique_violation};
use crate::Database;
use crate::models::{FavoriteRow, encode_ts};

impl Database {
    pub fn insert_favorite(
        &self,
        id: Uuid,
        user_id: Uuid,
        startup_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<InsertOutcome<Favorite>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO favorites (id, user_id, startup_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    id.to_string(),
                    user_id.to_string(),
                    startup_id.to_string(),
                    encode_ts(created_at),
                ],
            );
            match inserted {
                Ok(_) => Ok(InsertOutcome::Inserted(Favorite {
                    id,
                    user_id,
                    startup_id,
                    created_at,
                })),
                Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_favorite(&self, id: Uuid) -> Result<Option<Favorite>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, startup_id, created_at FROM favorites WHERE id = ?1",
                [id.to_string()],
                favorite_from_row,
            )
            .optional()?
            .map(FavoriteRow::into_favorite)
            .transpose()
        })
    }

    pub fn list_favorites(&self, user_id: Uuid) -> Result<Vec<Favorite>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, startup_id, created_at FROM favorites
                 WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], favorite_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(FavoriteRow::into_favorite).collect()
        })
    }

    pub fn delete_favorite(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM favorites WHERE id = ?1", [id.to_string()])?;
            Ok(removed > 0)
        })
    }
}

fn favorite_from_row(row: &Row<'_>) -> rusqlite::Result<FavoriteRow> {
    Ok(FavoriteRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        startup_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}
