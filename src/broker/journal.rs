//! Durable stream broker backed by an append-only JSONL journal.
//!
//! Layout under the broker root directory:
//! - `stream.jsonl` — records, one JSON document per line, in append order
//! - `stream.seq` — next record id
//! - `groups/<group>__<topic>.json` — delivery cursor per (topic, group)
//! - `broker.lock` — lock file serializing all journal mutations
//!
//! Every operation runs under an exclusive `fs2` advisory lock, so several
//! worker processes can share one journal. Blocking file I/O is kept off
//! the async runtime via `spawn_blocking`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use tokio::task;
use tracing::warn;

use crate::domain::{MessageId, StreamRecord};

use super::cursor::GroupCursor;
use super::{AckToken, BrokerError, BrokerOptions, Delivery, MessageConsumer, MessageProducer, MessageStream};

const STREAM_FILE: &str = "stream.jsonl";
const SEQ_FILE: &str = "stream.seq";
const GROUPS_DIR: &str = "groups";
const LOCK_FILE: &str = "broker.lock";

/// Backoff after a transient journal read failure
const READ_RETRY_DELAY: Duration = Duration::from_secs(1);

/// File-backed broker; cheap to clone, all state lives in the journal.
#[derive(Debug, Clone)]
pub struct JournalBroker {
    root: PathBuf,
    options: BrokerOptions,
}

impl JournalBroker {
    /// Create a broker over the journal at `root` with default tuning.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, BrokerOptions::default())
    }

    /// Create a broker with explicit delivery tuning.
    pub fn with_options(root: impl Into<PathBuf>, options: BrokerOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    /// The journal root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl MessageProducer for JournalBroker {
    async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<MessageId, BrokerError> {
        let root = self.root.clone();
        let topic = topic.to_string();

        task::spawn_blocking(move || append_record(&root, &topic, payload))
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?
    }
}

#[async_trait]
impl MessageConsumer for JournalBroker {
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Box<dyn MessageStream>, BrokerError> {
        let root = self.root.clone();
        let topic_owned = topic.to_string();
        let group_owned = group.to_string();

        // Group bootstrap: create the cursor if absent. Racing subscribers
        // serialize on the journal lock, so "already exists" is a no-op.
        task::spawn_blocking(move || ensure_group(&root, &topic_owned, &group_owned))
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))??;

        Ok(Box::new(JournalStream {
            root: self.root.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            options: self.options.clone(),
        }))
    }
}

/// One consumer's view of the journal.
struct JournalStream {
    root: PathBuf,
    topic: String,
    group: String,
    consumer: String,
    options: BrokerOptions,
}

#[async_trait]
impl MessageStream for JournalStream {
    async fn recv(&mut self) -> Delivery {
        loop {
            let root = self.root.clone();
            let topic = self.topic.clone();
            let group = self.group.clone();
            let consumer = self.consumer.clone();
            let options = self.options.clone();

            let polled =
                task::spawn_blocking(move || read_next(&root, &topic, &group, &consumer, &options))
                    .await;

            match polled {
                Ok(Ok(Some(record))) => {
                    let token = JournalAck {
                        root: self.root.clone(),
                        topic: self.topic.clone(),
                        group: self.group.clone(),
                        id: record.id,
                    };
                    return Delivery::new(record.id, record.payload, Box::new(token));
                }
                Ok(Ok(None)) => {
                    tokio::time::sleep(self.options.poll_interval).await;
                }
                Ok(Err(e)) => {
                    warn!(topic = %self.topic, group = %self.group, error = %e, "journal read failed, backing off");
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
                Err(e) => {
                    warn!(error = %e, "journal read task failed, backing off");
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
            }
        }
    }
}

/// Acknowledgment handle for a journal delivery.
struct JournalAck {
    root: PathBuf,
    topic: String,
    group: String,
    id: MessageId,
}

#[async_trait]
impl AckToken for JournalAck {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        let Self {
            root,
            topic,
            group,
            id,
        } = *self;

        task::spawn_blocking(move || ack_record(&root, &topic, &group, id))
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?
    }
}

// ============================================================================
// Synchronous journal operations (always called under the journal lock)
// ============================================================================

/// Run `f` while holding the journal's exclusive lock.
fn locked<T>(root: &Path, f: impl FnOnce() -> Result<T, BrokerError>) -> Result<T, BrokerError> {
    fs::create_dir_all(root)?;

    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(root.join(LOCK_FILE))?;
    lock_file.lock_exclusive()?;

    let result = f();
    let _ = FileExt::unlock(&lock_file);
    result
}

/// Append one record, assigning the next sequence id.
fn append_record(
    root: &Path,
    topic: &str,
    payload: serde_json::Value,
) -> Result<MessageId, BrokerError> {
    locked(root, || {
        let id = next_id(root)?;
        let record = StreamRecord {
            id,
            topic: topic.to_string(),
            payload,
            enqueued_at: Utc::now(),
        };

        let line = serde_json::to_string(&record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(root.join(STREAM_FILE))?;
        file.write_all(format!("{}\n", line).as_bytes())?;
        file.sync_data()?;

        Ok(id)
    })
}

/// Read and advance the id sequence. Ids start at 1; a cursor at 0 is
/// positioned before the first record.
fn next_id(root: &Path) -> Result<MessageId, BrokerError> {
    let seq_path = root.join(SEQ_FILE);

    let id = match fs::read_to_string(&seq_path) {
        Ok(content) => content.trim().parse::<MessageId>().unwrap_or(1),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 1,
        Err(e) => return Err(e.into()),
    };

    fs::write(&seq_path, format!("{}\n", id + 1))?;
    Ok(id)
}

fn cursor_path(root: &Path, topic: &str, group: &str) -> PathBuf {
    root.join(GROUPS_DIR)
        .join(format!("{}__{}.json", group, topic))
}

/// Create the (topic, group) cursor at the start of the stream if absent.
fn ensure_group(root: &Path, topic: &str, group: &str) -> Result<(), BrokerError> {
    locked(root, || {
        let path = cursor_path(root, topic, group);
        if !path.exists() {
            save_cursor(root, topic, group, &GroupCursor::default())?;
        }
        Ok(())
    })
}

fn load_cursor(root: &Path, topic: &str, group: &str) -> Result<GroupCursor, BrokerError> {
    let path = cursor_path(root, topic, group);

    match fs::read_to_string(&path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GroupCursor::default()),
        Err(e) => Err(e.into()),
    }
}

fn save_cursor(root: &Path, topic: &str, group: &str, cursor: &GroupCursor) -> Result<(), BrokerError> {
    let path = cursor_path(root, topic, group);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&path, serde_json::to_string_pretty(cursor)?)?;
    Ok(())
}

/// Load all records in append order, skipping lines that fail to parse.
///
/// A corrupt line is logged and dropped rather than poisoning the stream:
/// it never enters any group's pending set, so it is never redelivered.
fn load_records(root: &Path) -> Result<Vec<StreamRecord>, BrokerError> {
    let path = root.join(STREAM_FILE);

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StreamRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(error = %e, "skipping malformed journal line");
            }
        }
    }

    Ok(records)
}

/// Deliver the next record for (topic, group) to `consumer`, if any.
///
/// Idle pending records are claimed ahead of fresh reads, oldest first;
/// records past the delivery cap are dropped with a warning.
fn read_next(
    root: &Path,
    topic: &str,
    group: &str,
    consumer: &str,
    options: &BrokerOptions,
) -> Result<Option<StreamRecord>, BrokerError> {
    locked(root, || {
        let mut cursor = load_cursor(root, topic, group)?;
        let records = load_records(root)?;
        let now = Utc::now();

        let claim = cursor.claim_idle(consumer, now, options.delivery_window, options.max_deliveries);
        for id in &claim.dropped {
            warn!(id, topic, group, "dropping record past delivery cap");
        }

        if let Some(id) = claim.claimed {
            if let Some(record) = records.iter().find(|r| r.id == id) {
                save_cursor(root, topic, group, &cursor)?;
                return Ok(Some(record.clone()));
            }
            // The journal no longer holds the record body; nothing to redeliver.
            cursor.ack(id);
            warn!(id, topic, group, "claimed record missing from journal, discarding");
        }

        if let Some(record) = cursor.next_fresh(&records, topic).cloned() {
            cursor.deliver(record.id, consumer, now);
            save_cursor(root, topic, group, &cursor)?;
            return Ok(Some(record));
        }

        // Persist cap-drops even when the poll comes up empty
        save_cursor(root, topic, group, &cursor)?;
        Ok(None)
    })
}

fn ack_record(root: &Path, topic: &str, group: &str, id: MessageId) -> Result<(), BrokerError> {
    locked(root, || {
        let mut cursor = load_cursor(root, topic, group)?;
        cursor.ack(id);
        save_cursor(root, topic, group, &cursor)
    })
}
