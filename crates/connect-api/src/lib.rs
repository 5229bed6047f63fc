pub mod accounts;
pub mod auth;
pub mod chat;
pub mod clock;
pub mod error;
pub mod favorites;
pub mod gateway;
pub mod identity;
pub mod ledger;
pub mod mailer;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod otp;
pub mod posts;
pub mod requests;
pub mod router;
pub mod startups;
pub mod state;
pub mod store;
pub mod users;

#[cfg(test)]
mod testing;

pub use error::{ServiceError, ServiceResult};
pub use router::router;
pub use state::{ApiSettings, AppState, AppStateInner};
