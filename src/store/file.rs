//! File-backed ticket store: one JSON document per ticket.
//!
//! Writes go through a temp file followed by a rename, so a reader never
//! observes a torn document and concurrent writers degrade to
//! last-write-wins. Reads retry transient I/O failures with exponential
//! backoff before surfacing `StoreError::Unavailable`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::Ticket;

use super::{StoreError, TicketStore};

/// Read attempts before giving up
const GET_ATTEMPTS: u32 = 3;

/// Base retry delay, doubled per attempt
const GET_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Ticket store rooted at a directory of `<id>.json` documents.
#[derive(Debug, Clone)]
pub struct FileTicketStore {
    dir: PathBuf,
}

impl FileTicketStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding ticket documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ticket_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn read_once(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        match fs::read_to_string(self.ticket_path(id)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Unavailable(e.to_string())),
        }
    }
}

#[async_trait]
impl TicketStore for FileTicketStore {
    async fn save(&self, ticket: &Ticket) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let json = serde_json::to_string_pretty(ticket)?;
        let path = self.ticket_path(ticket.id);
        // Unique temp name: concurrent writers must not rename each other's
        // half-written documents into place
        let tmp = self
            .dir
            .join(format!("{}.{}.tmp", ticket.id, Uuid::new_v4().simple()));

        fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        debug!(ticket_id = %ticket.id, "saved ticket");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let mut delay = GET_RETRY_DELAY;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.read_once(id).await {
                Ok(found) => return Ok(found),
                Err(StoreError::Unavailable(e)) if attempt < GET_ATTEMPTS => {
                    warn!(ticket_id = %id, attempt, error = %e, "ticket read failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
