use anyhow::Result;
use chrono::{DateTime, Utc};

use super::OptionalExt;
use crate::Database;
use crate::models::{OtpRow, encode_ts};

impl Database {
    /// Stores the code for `email`, replacing any earlier one and clearing
    /// its verification mark.
    pub fn upsert_otp(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO otps (email, code_hash, expires_at, created_at, verified_at)
                 VALUES (?1, ?2, ?3, ?4, NULL)
                 ON CONFLICT(email) DO UPDATE SET
                    code_hash = excluded.code_hash,
                    expires_at = excluded.expires_at,
                    created_at = excluded.created_at,
                    verified_at = NULL",
                rusqlite::params![email, code_hash, encode_ts(expires_at), encode_ts(created_at)],
            )?;
            Ok(())
        })
    }

    pub fn get_otp(&self, email: &str) -> Result<Option<OtpRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT email, code_hash, expires_at, created_at, verified_at FROM otps WHERE email = ?1",
                [email],
                |row| {
                    Ok(OtpRow {
                        email: row.get(0)?,
                        code_hash: row.get(1)?,
                        expires_at: row.get(2)?,
                        created_at: row.get(3)?,
                        verified_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn mark_otp_verified(&self, email: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE otps SET verified_at = ?2 WHERE email = ?1",
                rusqlite::params![email, encode_ts(at)],
            )?;
            Ok(())
        })
    }
}
