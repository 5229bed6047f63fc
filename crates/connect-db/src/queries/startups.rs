use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use connect_types::models::{Post, Startup};

use super::OptionalExt;
use super::posts::insert_post_row;
use crate::Database;
use crate::models::{StartupRow, encode_ts};

const STARTUP_COLUMNS: &str =
    "id, owner_id, name, description, pitch_deck, industry, location, funding_stage, created_at";

impl Database {
    pub fn insert_startup(&self, startup: &Startup) -> Result<()> {
        self.with_conn_mut(|conn| insert_startup_row(conn, startup))
    }

    /// Lists a startup and announces it in the feed. Either both rows land
    /// or neither does.
    pub fn insert_startup_with_post(&self, startup: &Startup, post: &Post) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_startup_row(&tx, startup)?;
            insert_post_row(&tx, post)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_startup(&self, id: Uuid) -> Result<Option<Startup>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {STARTUP_COLUMNS} FROM startups WHERE id = ?1");
            conn.query_row(&sql, [id.to_string()], startup_from_row)
                .optional()?
                .map(StartupRow::into_startup)
                .transpose()
        })
    }

    /// All startups, newest first. Every investor reads the same list.
    pub fn list_startups(&self) -> Result<Vec<Startup>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {STARTUP_COLUMNS} FROM startups ORDER BY created_at DESC, rowid DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], startup_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(StartupRow::into_startup).collect()
        })
    }

    /// One entrepreneur's startups, newest first.
    pub fn list_startups_by_owner(&self, owner_id: Uuid) -> Result<Vec<Startup>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {STARTUP_COLUMNS} FROM startups WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id.to_string()], startup_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(StartupRow::into_startup).collect()
        })
    }
}

fn insert_startup_row(conn: &Connection, startup: &Startup) -> Result<()> {
    conn.execute(
        "INSERT INTO startups (id, owner_id, name, description, pitch_deck, industry, location, funding_stage, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            startup.id.to_string(),
            startup.owner_id.to_string(),
            startup.name,
            startup.description,
            startup.pitch_deck,
            startup.industry,
            startup.location,
            startup.funding_stage,
            encode_ts(startup.created_at),
        ],
    )?;
    Ok(())
}

fn startup_from_row(row: &Row<'_>) -> rusqlite::Result<StartupRow> {
    Ok(StartupRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        pitch_deck: row.get(4)?,
        industry: row.get(5)?,
        location: row.get(6)?,
        funding_stage: row.get(7)?,
        created_at: row.get(8)?,
    })
}
