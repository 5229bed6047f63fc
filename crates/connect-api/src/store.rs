use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::error;

use connect_db::Database;

use crate::error::{ServiceError, ServiceResult};

/// Runs blocking store calls off the async runtime, each under a deadline.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
    timeout: Duration,
}

impl Store {
    pub fn new(db: Arc<Database>, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub async fn run<T, F>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || f(db.as_ref()));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(ServiceError::External),
            Ok(Err(e)) => {
                error!("spawn_blocking join error: {}", e);
                Err(ServiceError::External(anyhow!("store task failed: {}", e)))
            }
            Err(_) => Err(ServiceError::External(anyhow!(
                "store call timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
