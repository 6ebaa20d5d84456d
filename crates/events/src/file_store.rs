//! File-backed durable event store.
//!
//! Layout under the store root, per stream:
//!
//! - `<stream>.journal`: one JSON-encoded [`PersistedEvent`] per line
//! - `<stream>.snapshot.json`: the latest [`Snapshot`]
//!
//! Appends are flushed and fsynced before they are acknowledged. A failed
//! append truncates the journal back to its previous length. Snapshots are
//! written to a temporary file and renamed into place. The directory is
//! fsynced after a journal is created and after every rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Error, Result};
use crate::event::{PersistedEvent, TimerEvent};
use crate::state::Snapshot;
use crate::store::EventStore;
use crate::types::{SequenceNr, StreamId};

const JOURNAL_EXT: &str = "journal";
const SNAPSHOT_SUFFIX: &str = ".snapshot.json";

/// Append cursor for one stream. `None` until the journal has been scanned.
type Cursor = Arc<Mutex<Option<SequenceNr>>>;

/// Durable event store writing JSON-lines journals to a directory.
#[derive(Debug)]
pub struct FileEventStore {
    root: PathBuf,
    cursors: Mutex<HashMap<StreamId, Cursor>>,
}

impl FileEventStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            Error::store_failed("open", root.display().to_string(), e.to_string())
        })?;

        Ok(Self {
            root,
            cursors: Mutex::new(HashMap::new()),
        })
    }

    /// Get the store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn journal_path(&self, stream: &StreamId) -> PathBuf {
        self.root
            .join(format!("{}.{JOURNAL_EXT}", encode_file_stem(stream.as_str())))
    }

    fn snapshot_path(&self, stream: &StreamId) -> PathBuf {
        self.root
            .join(format!("{}{SNAPSHOT_SUFFIX}", encode_file_stem(stream.as_str())))
    }

    /// Fsync the store directory so new and renamed entries survive power loss.
    #[cfg(unix)]
    async fn sync_root(&self) -> std::io::Result<()> {
        fs::File::open(&self.root).await?.sync_all().await
    }

    #[cfg(not(unix))]
    async fn sync_root(&self) -> std::io::Result<()> {
        Ok(())
    }

    /// Per-stream lock so appends to one stream are serialized while other
    /// streams proceed independently.
    async fn cursor(&self, stream: &StreamId) -> Cursor {
        let mut cursors = self.cursors.lock().await;
        Arc::clone(cursors.entry(stream.clone()).or_default())
    }

    async fn read_journal(&self, stream: &StreamId) -> Result<Vec<PersistedEvent>> {
        let path = self.journal_path(stream);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::store_failed("read", stream.as_str(), e.to_string())),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<PersistedEvent>(line).map_err(|e| {
                    Error::corrupt(
                        stream.as_str(),
                        format!("journal line {}: {e}", index.saturating_add(1)),
                    )
                })
            })
            .collect()
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, stream: &StreamId, event: TimerEvent) -> Result<PersistedEvent> {
        let cursor = self.cursor(stream).await;
        let mut last = cursor.lock().await;

        let last_sequence_nr = match *last {
            Some(nr) => nr,
            None => self
                .read_journal(stream)
                .await?
                .last()
                .map_or(0, |e| e.sequence_nr),
        };

        let persisted =
            PersistedEvent::new(last_sequence_nr.saturating_add(1), Utc::now(), event);
        let mut line = serde_json::to_string(&persisted)
            .map_err(|e| Error::serialization(e.to_string()))?;
        line.push('\n');

        let path = self.journal_path(stream);
        let append_failed =
            |e: std::io::Error| Error::store_failed("append", stream.as_str(), e.to_string());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(append_failed)?;
        let prev_len = file.metadata().await.map_err(append_failed)?.len();

        let write = async {
            file.write_all(line.as_bytes()).await?;
            // Buffered write errors only surface on flush
            file.flush().await?;
            file.sync_all().await?;
            if prev_len == 0 {
                self.sync_root().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        if let Err(e) = write.await {
            drop(file);
            *last = match rollback_append(&path, prev_len).await {
                Ok(()) => Some(last_sequence_nr),
                Err(rollback) => {
                    // The on-disk tail is unknown now; rescan before the next append.
                    warn!(
                        stream = %stream,
                        error = %rollback,
                        "Failed to roll back journal after failed append"
                    );
                    None
                }
            };
            return Err(append_failed(e));
        }

        *last = Some(persisted.sequence_nr);
        Ok(persisted)
    }

    async fn load_snapshot(&self, stream: &StreamId) -> Result<Option<Snapshot>> {
        let path = self.snapshot_path(stream);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::store_failed(
                    "load_snapshot",
                    stream.as_str(),
                    e.to_string(),
                ));
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::corrupt(stream.as_str(), format!("snapshot: {e}")))
    }

    async fn replay(&self, stream: &StreamId, after: SequenceNr) -> Result<Vec<PersistedEvent>> {
        let cursor = self.cursor(stream).await;
        let _guard = cursor.lock().await;

        let events = self.read_journal(stream).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.sequence_nr > after)
            .collect())
    }

    async fn save_snapshot(&self, stream: &StreamId, snapshot: Snapshot) -> Result<()> {
        let body = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| Error::serialization(e.to_string()))?;

        let path = self.snapshot_path(stream);
        let tmp = path.with_extension("tmp");
        let write = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&body).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &path).await?;
            self.sync_root().await
        };

        if let Err(e) = write.await {
            match fs::remove_file(&tmp).await {
                Err(cleanup) if cleanup.kind() != std::io::ErrorKind::NotFound => {
                    warn!(stream = %stream, error = %cleanup, "Failed to remove snapshot temp file");
                }
                _ => {}
            }
            return Err(Error::store_failed("save_snapshot", stream.as_str(), e.to_string()));
        }
        Ok(())
    }

    async fn streams(&self) -> Result<Vec<StreamId>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::store_failed("list", self.root.display().to_string(), e.to_string()))?;

        let mut ids = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|e| {
                Error::store_failed("list", self.root.display().to_string(), e.to_string())
            })?;
            let Some(entry) = entry else { break };

            let name = entry.file_name().to_string_lossy().into_owned();
            let stem = name
                .strip_suffix(SNAPSHOT_SUFFIX)
                .or_else(|| name.strip_suffix(&format!(".{JOURNAL_EXT}")));

            if let Some(id) = stem.and_then(decode_file_stem) {
                ids.push(StreamId::new(id));
            }
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// Restore a journal to `len` bytes after a failed append. A journal that
/// the failed append created is removed.
async fn rollback_append(path: &Path, len: u64) -> std::io::Result<()> {
    if len == 0 {
        return match fs::remove_file(path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        };
    }

    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(len).await?;
    file.sync_all().await
}

/// Escape a stream ID into a portable file stem.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`.
fn encode_file_stem(id: &str) -> String {
    id.bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                char::from(b).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect()
}

/// Inverse of [`encode_file_stem`]. Returns `None` for foreign file names.
fn decode_file_stem(stem: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(stem.len());
    let mut rest = stem.as_bytes();

    while let Some((&b, tail)) = rest.split_first() {
        if b == b'%' {
            let hex = tail.get(..2)?;
            let hex = std::str::from_utf8(hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = tail.get(2..)?;
        } else {
            bytes.push(b);
            rest = tail;
        }
    }

    String::from_utf8(bytes).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::replay::recover;

    #[test]
    fn test_encode_keeps_safe_characters() {
        assert_eq!(encode_file_stem("timer-abc_123"), "timer-abc_123");
    }

    #[test]
    fn test_encode_escapes_path_separators() {
        let encoded = encode_file_stem("timer-../etc/passwd");
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('.'));
        assert_eq!(decode_file_stem(&encoded).as_deref(), Some("timer-../etc/passwd"));
    }

    #[test]
    fn test_decode_handles_unicode_ids() {
        let encoded = encode_file_stem("timer-zürich");
        assert_eq!(decode_file_stem(&encoded).as_deref(), Some("timer-zürich"));
    }

    #[test]
    fn test_decode_rejects_truncated_escape() {
        assert_eq!(decode_file_stem("timer%4"), None);
        assert_eq!(decode_file_stem("timer%zz"), None);
        assert_eq!(decode_file_stem(""), None);
    }

    #[tokio::test]
    async fn test_rollback_append_drops_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::open(dir.path()).await.unwrap();
        let stream = StreamId::new("timer-torn");
        let at = Utc::now();
        store.append(&stream, TimerEvent::started(at)).await.unwrap();

        let path = store.journal_path(&stream);
        let intact = fs::metadata(&path).await.unwrap().len();

        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(br#"{"sequence_nr":2,"recorded_"#).await.unwrap();
        file.flush().await.unwrap();
        drop(file);
        assert!(recover(&store, &stream).await.unwrap_err().is_corruption());

        rollback_append(&path, intact).await.unwrap();

        let recovered = recover(&store, &stream).await.unwrap();
        assert_eq!(recovered.last_sequence_nr, 1);
        assert_eq!(recovered.state.execution_time(), Some(at));

        let next = store.append(&stream, TimerEvent::started(at)).await.unwrap();
        assert_eq!(next.sequence_nr, 2);
    }

    #[tokio::test]
    async fn test_rollback_append_removes_journal_it_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timer-new.journal");
        fs::write(&path, b"{\"sequence").await.unwrap();

        rollback_append(&path, 0).await.unwrap();
        assert!(!path.exists());

        // Already gone is fine
        rollback_append(&path, 0).await.unwrap();
    }
}
