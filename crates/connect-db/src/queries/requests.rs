use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use connect_types::models::{ConnectionRequest, InvestmentRequest, RequestStatus};

use super::{InsertOutcome, OptionalExt, TransitionOutcome, is_unique_violation};
use crate::Database;
use crate::models::{ConnectionRequestRow, InvestmentRequestRow, encode_ts};

const CONNECTION_COLUMNS: &str = "id, sender_id, receiver_id, status, created_at";
const INVESTMENT_COLUMNS: &str = "id, startup_id, investor_id, owner_id, status, created_at";

impl Database {
    // -- Connection requests --

    /// Inserts a pending request unless one is already outstanding for the
    /// same sender/receiver pair. The lookup and the insert share one lock
    /// acquisition; the partial unique index catches writers from other
    /// processes.
    pub fn insert_connection_request(
        &self,
        id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<InsertOutcome<ConnectionRequest>> {
        self.with_conn_mut(|conn| {
            let outstanding: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM connection_requests
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND status = 'pending')",
                [sender_id.to_string(), receiver_id.to_string()],
                |r| r.get(0),
            )?;
            if outstanding {
                return Ok(InsertOutcome::Duplicate);
            }

            let inserted = conn.execute(
                "INSERT INTO connection_requests (id, sender_id, receiver_id, status, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4)",
                rusqlite::params![
                    id.to_string(),
                    sender_id.to_string(),
                    receiver_id.to_string(),
                    encode_ts(created_at),
                ],
            );
            match inserted {
                Ok(_) => Ok(InsertOutcome::Inserted(ConnectionRequest {
                    id,
                    sender_id,
                    receiver_id,
                    status: RequestStatus::Pending,
                    created_at,
                })),
                Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_connection_request(&self, id: Uuid) -> Result<Option<ConnectionRequest>> {
        self.with_conn(|conn| query_connection_request(conn, id))
    }

    pub fn transition_connection_request(
        &self,
        id: Uuid,
        to: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<ConnectionRequest>> {
        self.with_conn_mut(|conn| {
            match transition(conn, "connection_requests", id, to, at)? {
                TransitionOutcome::Updated(()) => {}
                TransitionOutcome::NotFound => return Ok(TransitionOutcome::NotFound),
                TransitionOutcome::NotPending(s) => return Ok(TransitionOutcome::NotPending(s)),
            }
            let request = query_connection_request(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("request {} vanished after update", id))?;
            Ok(TransitionOutcome::Updated(request))
        })
    }

    /// Requests sent by `user_id`, newest first.
    pub fn list_connection_requests_sent(&self, user_id: Uuid) -> Result<Vec<ConnectionRequest>> {
        self.with_conn(|conn| query_connection_requests(conn, "sender_id", user_id))
    }

    /// Requests addressed to `user_id`, newest first.
    pub fn list_connection_requests_received(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConnectionRequest>> {
        self.with_conn(|conn| query_connection_requests(conn, "receiver_id", user_id))
    }

    // -- Investment requests --

    pub fn insert_investment_request(
        &self,
        id: Uuid,
        startup_id: Uuid,
        investor_id: Uuid,
        owner_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<InsertOutcome<InvestmentRequest>> {
        self.with_conn_mut(|conn| {
            let outstanding: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM investment_requests
                 WHERE startup_id = ?1 AND investor_id = ?2 AND status = 'pending')",
                [startup_id.to_string(), investor_id.to_string()],
                |r| r.get(0),
            )?;
            if outstanding {
                return Ok(InsertOutcome::Duplicate);
            }

            let inserted = conn.execute(
                "INSERT INTO investment_requests (id, startup_id, investor_id, owner_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
                rusqlite::params![
                    id.to_string(),
                    startup_id.to_string(),
                    investor_id.to_string(),
                    owner_id.to_string(),
                    encode_ts(created_at),
                ],
            );
            match inserted {
                Ok(_) => Ok(InsertOutcome::Inserted(InvestmentRequest {
                    id,
                    startup_id,
                    investor_id,
                    owner_id,
                    status: RequestStatus::Pending,
                    created_at,
                })),
                Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_investment_request(&self, id: Uuid) -> Result<Option<InvestmentRequest>> {
        self.with_conn(|conn| query_investment_request(conn, id))
    }

    pub fn transition_investment_request(
        &self,
        id: Uuid,
        to: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<InvestmentRequest>> {
        self.with_conn_mut(|conn| {
            match transition(conn, "investment_requests", id, to, at)? {
                TransitionOutcome::Updated(()) => {}
                TransitionOutcome::NotFound => return Ok(TransitionOutcome::NotFound),
                TransitionOutcome::NotPending(s) => return Ok(TransitionOutcome::NotPending(s)),
            }
            let request = query_investment_request(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("request {} vanished after update", id))?;
            Ok(TransitionOutcome::Updated(request))
        })
    }

    /// Investment requests addressed to the startup owner, newest first.
    pub fn list_investment_requests_received(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<InvestmentRequest>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {INVESTMENT_COLUMNS} FROM investment_requests
                 WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id.to_string()], investment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(InvestmentRequestRow::into_request).collect()
        })
    }
}

/// Conditional status update shared by both request tables. Only a pending
/// row is touched; otherwise the current state is reported back.
fn transition(
    conn: &Connection,
    table: &'static str,
    id: Uuid,
    to: RequestStatus,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome<()>> {
    let changed = conn.execute(
        &format!(
            "UPDATE {table} SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'pending'"
        ),
        rusqlite::params![to.as_str(), encode_ts(at), id.to_string()],
    )?;
    if changed == 1 {
        return Ok(TransitionOutcome::Updated(()));
    }

    let current: Option<String> = conn
        .query_row(
            &format!("SELECT status FROM {table} WHERE id = ?1"),
            [id.to_string()],
            |r| r.get(0),
        )
        .optional()?;

    match current {
        None => Ok(TransitionOutcome::NotFound),
        Some(status) => Ok(TransitionOutcome::NotPending(
            status.parse().map_err(|e| anyhow::anyhow!("request {}: {}", id, e))?,
        )),
    }
}

fn query_connection_request(conn: &Connection, id: Uuid) -> Result<Option<ConnectionRequest>> {
    let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connection_requests WHERE id = ?1");
    conn.query_row(&sql, [id.to_string()], connection_from_row)
        .optional()?
        .map(ConnectionRequestRow::into_request)
        .transpose()
}

fn query_connection_requests(
    conn: &Connection,
    column: &'static str,
    user_id: Uuid,
) -> Result<Vec<ConnectionRequest>> {
    let sql = format!(
        "SELECT {CONNECTION_COLUMNS} FROM connection_requests
         WHERE {column} = ?1 ORDER BY created_at DESC, rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id.to_string()], connection_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(ConnectionRequestRow::into_request).collect()
}

fn query_investment_request(conn: &Connection, id: Uuid) -> Result<Option<InvestmentRequest>> {
    let sql = format!("SELECT {INVESTMENT_COLUMNS} FROM investment_requests WHERE id = ?1");
    conn.query_row(&sql, [id.to_string()], investment_from_row)
        .optional()?
        .map(InvestmentRequestRow::into_request)
        .transpose()
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRequestRow> {
    Ok(ConnectionRequestRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn investment_from_row(row: &Row<'_>) -> rusqlite::Result<InvestmentRequestRow> {
    Ok(InvestmentRequestRow {
        id: row.get(0)?,
        startup_id: row.get(1)?,
        investor_id: row.get(2)?,
        owner_id: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}
