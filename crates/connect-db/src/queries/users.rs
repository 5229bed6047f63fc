use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use connect_types::models::{Role, User};

use super::{InsertOutcome, OptionalExt, is_unique_violation};
use crate::Database;
use crate::models::{UserRow, encode_ts};

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, password, role, photo_url, verified, created_at";

pub struct NewUser<'a> {
    pub id: Uuid,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Database {
    /// Inserts an unverified user. `Duplicate` means the email is taken.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<InsertOutcome<User>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, first_name, last_name, email, password, role, verified, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                rusqlite::params![
                    user.id.to_string(),
                    user.first_name,
                    user.last_name,
                    user.email,
                    user.password_hash,
                    user.role.as_str(),
                    encode_ts(user.created_at),
                ],
            );

            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(InsertOutcome::Duplicate),
                Err(e) => return Err(e.into()),
            }

            let row = query_user_by_id(conn, user.id)?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", user.id))?;
            Ok(InsertOutcome::Inserted(row.into_user()?))
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_id(conn, id)?.map(UserRow::into_user).transpose())
    }

    /// Row including the password hash, for login.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            conn.query_row(&sql, [email], user_from_row).optional()
        })
    }

    pub fn delete_user_by_email(&self, email: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM users WHERE email = ?1", [email])?;
            Ok(removed > 0)
        })
    }

    /// Flags the account owning `email` as verified. Returns the user, if any.
    pub fn mark_user_verified(&self, email: &str) -> Result<Option<User>> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE users SET verified = 1 WHERE email = ?1", [email])?;
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            conn.query_row(&sql, [email], user_from_row)
                .optional()?
                .map(UserRow::into_user)
                .transpose()
        })
    }

    /// Applies the provided profile fields, leaving `None` fields untouched.
    pub fn update_profile(
        &self,
        id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<Option<User>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET
                    first_name = COALESCE(?2, first_name),
                    last_name = COALESCE(?3, last_name),
                    photo_url = COALESCE(?4, photo_url)
                 WHERE id = ?1",
                rusqlite::params![id.to_string(), first_name, last_name, photo_url],
            )?;
            query_user_by_id(conn, id)?.map(UserRow::into_user).transpose()
        })
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(UserRow::into_user).collect()
        })
    }

    /// Hard delete. Requests, chats, favorites and inbox entries of the user
    /// go with it through the foreign key cascades.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            Ok(removed > 0)
        })
    }
}

fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, [id.to_string()], user_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
        role: row.get(5)?,
        photo_url: row.get(6)?,
        verified: row.get(7)?,
        created_at: row.get(8)?,
    })
}
