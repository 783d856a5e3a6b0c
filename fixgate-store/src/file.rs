/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! File-backed durable log.
//!
//! Records are appended to a single file using the length-prefixed encoding in
//! [`crate::record`]. Opening an existing file scans it to recover the next
//! position; a torn record at the tail (a crash mid-write) is truncated away.

use crate::record::{LogRecord, ReproductionWindow};
use crate::traits::DurableLog;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use fixgate_core::error::StoreError;
use fixgate_core::types::Position;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug)]
struct Writer {
    file: File,
    scratch: BytesMut,
    next_position: u64,
}

/// Durable log persisted to a file.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    writer: Mutex<Writer>,
}

impl FileLog {
    /// Opens or creates the log at `path`.
    ///
    /// # Errors
    /// Returns `StoreError` if the file cannot be opened or holds a corrupted
    /// record before its tail.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let existing = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let total = existing.len();
        let (records, valid_len) = decode_all(Bytes::from(existing))?;
        let next_position = records.last().map_or(1, |r| r.position.value() + 1);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        if valid_len < total {
            warn!(
                path = %path.display(),
                discarded = total - valid_len,
                "truncating torn record at end of durable log"
            );
            file.set_len(valid_len as u64)?;
        }

        info!(
            path = %path.display(),
            records = records.len(),
            next_position,
            "opened durable log"
        );

        Ok(Self {
            path,
            writer: Mutex::new(Writer {
                file,
                scratch: BytesMut::with_capacity(1024),
                next_position,
            }),
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DurableLog for FileLog {
    fn append(&self, mut record: LogRecord) -> Result<Position, StoreError> {
        let mut writer = self.writer.lock();
        let position = Position::new(writer.next_position);
        record.position = position;

        let Writer { file, scratch, .. } = &mut *writer;
        scratch.clear();
        record.encode(scratch)?;
        file.write_all(&scratch[..])?;

        writer.next_position += 1;
        Ok(position)
    }

    async fn read_window(&self, window: ReproductionWindow) -> Result<Vec<LogRecord>, StoreError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let (records, _) = decode_all(Bytes::from(bytes))?;
        Ok(records
            .into_iter()
            .filter(|record| window.contains(record.timestamp_ns))
            .collect())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let writer = self.writer.lock();
        writer.file.sync_data()?;
        Ok(())
    }

    fn next_position(&self) -> Position {
        Position::new(self.writer.lock().next_position)
    }
}

/// Decodes every complete record in `bytes`.
///
/// # Returns
/// The records and the byte length they occupy.
fn decode_all(mut bytes: Bytes) -> Result<(Vec<LogRecord>, usize), StoreError> {
    let total = bytes.len();
    let mut records = Vec::new();
    while let Some(record) = LogRecord::decode(&mut bytes)? {
        records.push(record);
    }
    Ok((records, total - bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Direction;
    use fixgate_core::message::MsgType;
    use fixgate_core::types::{ConnectionId, SessionId};

    fn record(timestamp_ns: u64, body: &'static [u8]) -> LogRecord {
        LogRecord::message(
            timestamp_ns,
            Direction::Outbound,
            ConnectionId::new(1),
            SessionId::new(1),
            MsgType::ExecutionReport,
            Bytes::from_static(body),
        )
    }

    #[tokio::test]
    async fn test_file_log_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileLog::open(dir.path().join("session.log")).unwrap();

        assert_eq!(log.append(record(100, b"one")).unwrap(), Position::new(1));
        assert_eq!(log.append(record(200, b"two")).unwrap(), Position::new(2));
        log.flush().await.unwrap();

        let records = log.read_window(ReproductionWindow::all()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].body, Bytes::from_static(b"two"));
        assert_eq!(records[1].msg_type(), Some(&MsgType::ExecutionReport));
    }

    #[tokio::test]
    async fn test_file_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        {
            let log = FileLog::open(&path).unwrap();
            log.append(record(100, b"one")).unwrap();
            log.append(record(200, b"two")).unwrap();
            log.flush().await.unwrap();
        }

        let log = FileLog::open(&path).unwrap();
        assert_eq!(log.next_position(), Position::new(3));
        assert_eq!(log.append(record(300, b"three")).unwrap(), Position::new(3));

        let window = ReproductionWindow::new(150, 300).unwrap();
        let records = log.read_window(window).await.unwrap();
        assert_eq!(
            records.iter().map(|r| r.body.clone()).collect::<Vec<_>>(),
            vec![Bytes::from_static(b"two"), Bytes::from_static(b"three")]
        );
    }

    #[tokio::test]
    async fn test_file_log_truncates_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        {
            let log = FileLog::open(&path).unwrap();
            log.append(record(100, b"one")).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0, 0, 0, 90, 1, 2, 3]).unwrap();
        }

        let log = FileLog::open(&path).unwrap();
        assert_eq!(log.next_position(), Position::new(2));
        log.append(record(200, b"two")).unwrap();
        let records = log.read_window(ReproductionWindow::all()).await.unwrap();
        assert_eq!(records.len(), 2);
    }
}
