//! Durable output of completed records.

use crate::error::SinkError;
use async_trait::async_trait;
use common::events::CompletedRecord;
use common::validation::{now_local, sanitize_filename, FILE_STAMP_FORMAT};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::info;

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist one batch. On error nothing is considered written.
    async fn write_batch(&self, records: &[CompletedRecord]) -> Result<(), SinkError>;
}

/// Writes every batch to its own CSV file under `<root>/<location>/csv/`
pub struct CsvRecordSink {
    dir: PathBuf,
    file_prefix: String,
}

impl CsvRecordSink {
    pub fn new(output_root: impl AsRef<Path>, location: &str, preserved: &[String]) -> Self {
        Self {
            dir: output_root.as_ref().join(location).join("csv"),
            file_prefix: format!("live_{}", sanitize_filename(location, preserved)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `live_<location>_<stamp>_aggregated.csv`, with `_N` appended when taken
    fn next_path(&self, stamp: &str) -> PathBuf {
        let base = format!("{}_{}_aggregated", self.file_prefix, stamp);
        let mut path = self.dir.join(format!("{}.csv", base));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}_{}.csv", base, n));
            n += 1;
        }
        path
    }
}

/// Write to `<path>.part` and rename once complete; a failed batch leaves no file
fn write_csv(path: &Path, records: &[CompletedRecord]) -> Result<(), SinkError> {
    let partial = path.with_extension("csv.part");
    let result = write_rows(&partial, records).and_then(|()| {
        fs::rename(&partial, path).map_err(|source| SinkError::Rename {
            path: path.to_path_buf(),
            source,
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

fn write_rows(path: &Path, records: &[CompletedRecord]) -> Result<(), SinkError> {
    let mut writer = csv::Writer::from_path(path).map_err(|source| SinkError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    for record in records {
        writer.serialize(record).map_err(|source| SinkError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    writer.flush().map_err(|source| SinkError::Flush {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl RecordSink for CsvRecordSink {
    async fn write_batch(&self, records: &[CompletedRecord]) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir).map_err(|source| SinkError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let stamp = now_local().format(FILE_STAMP_FORMAT).to_string();
        let path = self.next_path(&stamp);
        let batch = records.to_vec();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_csv(&target, &batch)).await??;

        info!(path = %path.display(), records = records.len(), "Wrote completed records");
        Ok(())
    }
}

/// In-memory sink; can be told to fail a number of writes first
#[derive(Default)]
pub struct MemoryRecordSink {
    batches: Mutex<Vec<Vec<CompletedRecord>>>,
    failures_left: AtomicUsize,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: usize) -> Self {
        Self {
            batches: Mutex::default(),
            failures_left: AtomicUsize::new(times),
        }
    }

    pub fn batches(&self) -> Vec<Vec<CompletedRecord>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// All written records in write order
    pub fn records(&self) -> Vec<CompletedRecord> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn write_batch(&self, records: &[CompletedRecord]) -> Result<(), SinkError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SinkError::Unavailable("scripted write failure".to_string()));
        }

        let mut batches = self
            .batches
            .lock()
            .map_err(|_| SinkError::Unavailable("record store poisoned".to_string()))?;
        batches.push(records.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::events::{Direction, LicenceMatch, PairingStatus, EXIT_TIMEOUT};

    fn record(track_id: u64, status: PairingStatus) -> CompletedRecord {
        CompletedRecord {
            track_id,
            class_id: 1,
            class_name: "motorboat".to_string(),
            direction: Direction::Right,
            entry_timestamp: "2025-06-01 10:00:00".to_string(),
            exit_timestamp: match status {
                PairingStatus::PairedWith(_) => "2025-06-01 10:03:00".to_string(),
                PairingStatus::TimeoutNoExitMatch => EXIT_TIMEOUT.to_string(),
            },
            location: "Fürstenberg".to_string(),
            extracted_text: "AB-A 234".to_string(),
            identified_licence_number: LicenceMatch::Yes,
            ocr_confidence: 0.7,
            confidence: 0.9,
            pairing_status: status,
        }
    }

    #[tokio::test]
    async fn test_csv_sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let preserved = vec!["Fürstenberg".to_string()];
        let sink = CsvRecordSink::new(dir.path(), "Fürstenberg", &preserved);

        sink.write_batch(&[
            record(1, PairingStatus::PairedWith(1)),
            record(2, PairingStatus::TimeoutNoExitMatch),
        ])
        .await
        .unwrap();

        let files: Vec<_> = fs::read_dir(sink.dir()).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("live_Fürstenberg_"));
        assert!(name.ends_with("_aggregated.csv"));

        let content = fs::read_to_string(&files[0]).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "track_id,class_id,class_name,direction,entry_timestamp,exit_timestamp,location,\
             extracted_text,identified_licence_number,ocr_confidence,confidence,pairing_status"
        );
        assert_eq!(
            lines.next().unwrap(),
            "1,1,motorboat,right,2025-06-01 10:00:00,2025-06-01 10:03:00,Fürstenberg,AB-A 234,yes,0.7,0.9,paired_with_cam1"
        );
        assert!(lines.next().unwrap().ends_with("timeout,Fürstenberg,AB-A 234,yes,0.7,0.9,timeout_no_exit_match"));
    }

    #[tokio::test]
    async fn test_csv_sink_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvRecordSink::new(dir.path(), "Diemitz", &[]);

        for track_id in 0..3 {
            sink.write_batch(&[record(track_id, PairingStatus::TimeoutNoExitMatch)])
                .await
                .unwrap();
        }
        assert_eq!(fs::read_dir(sink.dir()).unwrap().count(), 3);
    }

    #[tokio::test]
    async fn test_csv_sink_reports_unwritable_root() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        let sink = CsvRecordSink::new(&blocker, "Diemitz", &[]);
        let result = sink.write_batch(&[record(1, PairingStatus::TimeoutNoExitMatch)]).await;
        assert!(matches!(result, Err(SinkError::CreateDir { .. })));
    }

    #[test]
    fn test_failed_batch_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("live_Diemitz_batch_aggregated.csv");
        fs::create_dir(&target).unwrap();

        let result = write_csv(&target, &[record(1, PairingStatus::PairedWith(1))]);
        assert!(matches!(result, Err(SinkError::Rename { .. })));

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["live_Diemitz_batch_aggregated.csv".to_string()]);
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_memory_sink_fails_then_recovers() {
        let sink = MemoryRecordSink::failing(1);
        let batch = [record(1, PairingStatus::PairedWith(3))];

        assert!(sink.write_batch(&batch).await.is_err());
        assert!(sink.records().is_empty());
        sink.write_batch(&batch).await.unwrap();
        assert_eq!(sink.records().len(), 1);
    }
}
