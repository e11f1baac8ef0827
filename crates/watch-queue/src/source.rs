//! Watch sources
//!
//! A [`WatchSource`] yields add/update/delete notifications for the watched
//! resource kinds. The replay source keeps a local store of the last copy of
//! every object so recorded streams may omit `oldObject` on modifications.

use crate::event::{EventType, RawWatchEvent, WatchEvent};
use async_trait::async_trait;
use kove_core::{KoveError, ObjectKey, ObjectRef, Result, WatchedResource};
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::debug;

#[async_trait]
pub trait WatchSource: Send {
    /// Next notification, `Ok(None)` once the stream has ended. An error
    /// concerns a single notification; the source stays usable.
    async fn next_event(&mut self) -> Result<Option<WatchEvent>>;
}

/// Sending half of a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct WatchSender {
    tx: mpsc::Sender<WatchEvent>,
}

impl WatchSender {
    pub async fn send(&self, event: WatchEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| KoveError::WatchError {
            reason: "watch intake has stopped".to_string(),
        })
    }
}

/// In-process source fed through a bounded channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<WatchEvent>,
}

pub fn channel(buffer: usize) -> (WatchSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(buffer);
    (WatchSender { tx }, ChannelSource { rx })
}

#[async_trait]
impl WatchSource for ChannelSource {
    async fn next_event(&mut self) -> Result<Option<WatchEvent>> {
        Ok(self.rx.recv().await)
    }
}

/// Replays newline-delimited JSON watch events.
pub struct ReplaySource<R> {
    reader: R,
    buf: Vec<u8>,
    line_number: usize,
    store: HashMap<(WatchedResource, ObjectKey), ObjectRef>,
}

impl<R: AsyncBufRead + Unpin + Send> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_number: 0,
            store: HashMap::new(),
        }
    }

    fn apply(&mut self, raw: RawWatchEvent) -> WatchEvent {
        let resource = raw.resource;
        let object = ObjectRef::from_value(raw.object);
        let key = (resource.clone(), object.key());

        match raw.event_type {
            EventType::Added => {
                self.store.insert(key, object.clone());
                WatchEvent::Added { resource, object }
            }
            EventType::Modified => {
                let previous = self.store.insert(key, object.clone());
                match raw.old_object.map(ObjectRef::from_value).or(previous) {
                    Some(old) => WatchEvent::Modified {
                        resource,
                        old,
                        new: object,
                    },
                    None => {
                        debug!(object = %object.key(), "modification of unknown object replayed as add");
                        WatchEvent::Added { resource, object }
                    }
                }
            }
            EventType::Deleted => {
                self.store.remove(&key);
                WatchEvent::Deleted { resource, object }
            }
        }
    }
}

impl<R> std::fmt::Debug for ReplaySource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySource")
            .field("line_number", &self.line_number)
            .field("stored_objects", &self.store.len())
            .finish()
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> WatchSource for ReplaySource<R> {
    async fn next_event(&mut self) -> Result<Option<WatchEvent>> {
        loop {
            self.buf.clear();
            // Only read failures surface as I/O errors; bad content is per line.
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = std::str::from_utf8(&self.buf).map_err(|e| KoveError::WatchError {
                reason: format!("line {}: {}", self.line_number, e),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawWatchEvent =
                serde_json::from_str(line).map_err(|e| KoveError::WatchError {
                    reason: format!("line {}: {}", self.line_number, e),
                })?;
            return Ok(Some(self.apply(raw)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kove_core::ObjectBuilder;
    use serde_json::json;
    use tokio::io::BufReader;

    fn line(event_type: &str, rv: &str, old: Option<&str>) -> String {
        let object = |rv: &str| {
            ObjectBuilder::new("apps/v1", "Deployment", "test", "test")
                .resource_version(rv)
                .build()
                .body()
                .clone()
        };
        let mut raw = json!({
            "type": event_type,
            "resource": {"group": "apps", "version": "v1", "resource": "deployments"},
            "object": object(rv),
        });
        if let Some(old) = old {
            raw["oldObject"] = object(old);
        }
        raw.to_string()
    }

    fn replay(lines: &[String]) -> ReplaySource<BufReader<std::io::Cursor<Vec<u8>>>> {
        let data = lines.join("\n").into_bytes();
        ReplaySource::new(BufReader::new(std::io::Cursor::new(data)))
    }

    #[tokio::test]
    async fn test_replay_tracks_previous_copy() {
        let mut source = replay(&[
            line("ADDED", "1", None),
            String::new(),
            line("MODIFIED", "2", None),
            line("DELETED", "2", None),
        ]);

        let added = source.next_event().await.unwrap().unwrap();
        assert_eq!(added.event_type(), EventType::Added);

        match source.next_event().await.unwrap().unwrap() {
            WatchEvent::Modified { old, new, .. } => {
                assert_eq!(old.resource_version(), "1");
                assert_eq!(new.resource_version(), "2");
            }
            other => panic!("expected modification, got {:?}", other),
        }

        let deleted = source.next_event().await.unwrap().unwrap();
        assert_eq!(deleted.event_type(), EventType::Deleted);
        assert!(source.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_explicit_old_object_wins() {
        let mut source = replay(&[line("ADDED", "1", None), line("MODIFIED", "3", Some("2"))]);
        source.next_event().await.unwrap();
        match source.next_event().await.unwrap().unwrap() {
            WatchEvent::Modified { old, .. } => assert_eq!(old.resource_version(), "2"),
            other => panic!("expected modification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_modification_becomes_add() {
        let mut source = replay(&[line("MODIFIED", "5", None)]);
        let event = source.next_event().await.unwrap().unwrap();
        assert_eq!(event.event_type(), EventType::Added);
    }

    #[tokio::test]
    async fn test_malformed_line_is_an_error_but_not_fatal() {
        let mut source = replay(&["{not json".to_string(), line("ADDED", "1", None)]);
        let err = source.next_event().await.unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(source.next_event().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let mut data = line("ADDED", "1", None).into_bytes();
        data.extend_from_slice(b"\n{\"junk\":\"\xff\xfe\"}\n");
        data.extend_from_slice(line("DELETED", "1", None).as_bytes());
        let mut source = ReplaySource::new(BufReader::new(std::io::Cursor::new(data)));

        assert!(source.next_event().await.unwrap().is_some());
        let err = source.next_event().await.unwrap_err();
        assert!(matches!(err, KoveError::WatchError { .. }));
        assert!(err.to_string().contains("line 2"));
        assert_eq!(
            source.next_event().await.unwrap().unwrap().event_type(),
            EventType::Deleted
        );
        assert!(source.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        let first = line("ADDED", "1", None);
        let (head, tail) = first.split_at(first.len() / 2);
        let mock = tokio_test::io::Builder::new()
            .read(head.as_bytes())
            .read(format!("{}\n", tail).as_bytes())
            .read(line("DELETED", "1", None).as_bytes())
            .build();
        let mut source = ReplaySource::new(BufReader::new(mock));

        assert_eq!(
            source.next_event().await.unwrap().unwrap().event_type(),
            EventType::Added
        );
        assert_eq!(
            source.next_event().await.unwrap().unwrap().event_type(),
            EventType::Deleted
        );
        assert!(source.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_failure_is_an_io_error() {
        let mock = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"))
            .build();
        let mut source = ReplaySource::new(BufReader::new(mock));
        assert!(matches!(
            source.next_event().await,
            Err(KoveError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_channel_source() {
        let (tx, mut source) = channel(4);
        let object = ObjectBuilder::new("v1", "ConfigMap", "test", "cm").build();
        tx.send(WatchEvent::Added {
            resource: WatchedResource::new("", "v1", "configmaps"),
            object: object.clone(),
        })
        .await
        .unwrap();
        drop(tx);

        let event = source.next_event().await.unwrap().unwrap();
        assert_eq!(event.object(), &object);
        assert!(source.next_event().await.unwrap().is_none());
    }
}
