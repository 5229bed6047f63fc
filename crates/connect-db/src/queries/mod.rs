mod chats;
mod favorites;
mod notifications;
mod otps;
mod posts;
mod requests;
mod startups;
mod users;

pub use users::NewUser;

use anyhow::Result;
use connect_types::models::{Chat, RequestStatus};

/// Result of an insert guarded by a uniqueness rule.
#[derive(Debug)]
pub enum InsertOutcome<T> {
    Inserted(T),
    Duplicate,
}

/// Result of moving a request out of `pending`.
#[derive(Debug)]
pub enum TransitionOutcome<T> {
    Updated(T),
    NotFound,
    /// The request exists but already settled; carries its current status.
    NotPending(RequestStatus),
}

#[derive(Debug)]
pub enum ChatOutcome {
    Created(Chat),
    Reused(Chat),
}

impl ChatOutcome {
    pub fn chat(&self) -> &Chat {
        match self {
            Self::Created(chat) | Self::Reused(chat) => chat,
        }
    }

    pub fn into_chat(self) -> Chat {
        match self {
            Self::Created(chat) | Self::Reused(chat) => chat,
        }
    }

    pub fn created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// True for UNIQUE / PRIMARY KEY violations, false for every other error
/// (foreign key and CHECK failures included).
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
