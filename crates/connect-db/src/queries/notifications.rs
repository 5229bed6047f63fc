use anyhow::Result;
use rusqlite::Row;
use uuid::Uuid;

use connect_types::models::Notification;

use crate::Database;
use crate::models::{NotificationRow, encode_ts};

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, kind, sender_id, message, created_at, is_read";

impl Database {
    pub fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, recipient_id, kind, sender_id, message, created_at, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    notification.id.to_string(),
                    notification.recipient_id.to_string(),
                    notification.kind.as_str(),
                    notification.sender_id.to_string(),
                    notification.message,
                    encode_ts(notification.created_at),
                    notification.read,
                ],
            )?;
            Ok(())
        })
    }

    /// The recipient's inbox, newest first.
    pub fn list_notifications(&self, recipient_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let filter = if unread_only { "AND is_read = 0" } else { "" };
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE recipient_id = ?1 {filter}
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([recipient_id.to_string()], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(NotificationRow::into_notification).collect()
        })
    }

    /// Flags every unread notification of the recipient as read and returns
    /// how many changed.
    pub fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id.to_string()],
            )?;
            Ok(changed)
        })
    }
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        kind: row.get(2)?,
        sender_id: row.get(3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
        read: row.get(6)?,
    })
}
