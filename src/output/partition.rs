//! Type-partitioned CSV store
//!
//! One file per record type and run, at `{data_dir}/{type}/{run_start}.csv`.
//! Files are opened lazily on the first record of their type and never reused:
//! if the name is taken a `-N` suffix is added.

use crate::output::traits::{PartitionInfo, PersistenceError, PersistenceResult, RecordSink};
use crate::records::{Record, RecordType};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Quotes every field, doubling embedded quotes
fn quote_field(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Encodes one row, terminated by CRLF
pub fn encode_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut row = fields
        .iter()
        .map(|f| quote_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    row.push_str("\r\n");
    row
}

struct Partition {
    record_type: RecordType,
    path: PathBuf,
    writer: BufWriter<File>,
    rows: u64,
}

impl Partition {
    fn info(&self) -> PartitionInfo {
        PartitionInfo {
            record_type: self.record_type,
            path: self.path.clone(),
            rows: self.rows,
        }
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            record_type: self.record_type,
            path: self.path.clone(),
            source,
        }
    }

    fn write_row(&mut self, row: &str) -> PersistenceResult<()> {
        self.writer
            .write_all(row.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| self.io_error(e))
    }
}

/// Append-only store with one open handle per record type
pub struct PartitionStore {
    data_dir: PathBuf,
    run_started_at: i64,
    /// Open partitions, in the order opened
    open: Vec<Partition>,
    closed_partitions: Vec<PartitionInfo>,
    closed: bool,
}

impl PartitionStore {
    /// Creates a store; no file is touched until the first append
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Root directory holding one subdirectory per record type
    /// * `run_started_at` - Unix timestamp naming this run's files
    pub fn new(data_dir: impl Into<PathBuf>, run_started_at: i64) -> Self {
        Self {
            data_dir: data_dir.into(),
            run_started_at,
            open: Vec::new(),
            closed_partitions: Vec::new(),
            closed: false,
        }
    }

    fn partition_index(&mut self, record_type: RecordType) -> PersistenceResult<usize> {
        if let Some(index) = self.open.iter().position(|p| p.record_type == record_type) {
            return Ok(index);
        }

        let partition = self.open_partition(record_type)?;
        self.open.push(partition);
        Ok(self.open.len() - 1)
    }

    /// Creates the partition file and writes its header
    fn open_partition(&self, record_type: RecordType) -> PersistenceResult<Partition> {
        let dir = self.data_dir.join(record_type.as_str());
        std::fs::create_dir_all(&dir).map_err(|source| PersistenceError::Directory {
            path: dir.clone(),
            source,
        })?;

        let (path, file) = create_unique(&dir, self.run_started_at).map_err(|(path, source)| {
            PersistenceError::Io {
                record_type,
                path,
                source,
            }
        })?;

        let mut partition = Partition {
            record_type,
            path,
            writer: BufWriter::new(file),
            rows: 0,
        };
        partition.write_row(&encode_row(record_type.field_names()))?;

        info!(
            "Opened {} partition at {}",
            record_type,
            partition.path.display()
        );
        Ok(partition)
    }
}

/// Creates `{stem}.csv` in `dir`, or the first free `{stem}-N.csv`
fn create_unique(dir: &Path, stem: i64) -> Result<(PathBuf, File), (PathBuf, std::io::Error)> {
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{}.csv", stem)
        } else {
            format!("{}-{}.csv", stem, attempt)
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("{} exists, trying next suffix", path.display());
                attempt += 1;
            }
            Err(e) => return Err((path, e)),
        }
    }
}

impl RecordSink for PartitionStore {
    fn append(&mut self, record: &Record) -> PersistenceResult<()> {
        if self.closed {
            return Err(PersistenceError::Closed);
        }

        let index = self.partition_index(record.record_type())?;
        let partition = &mut self.open[index];
        partition.write_row(&encode_row(&record.values()))?;
        partition.rows += 1;
        Ok(())
    }

    fn close(&mut self) -> PersistenceResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = None;
        for mut partition in self.open.drain(..) {
            if let Err(e) = partition.writer.flush() {
                let err = partition.io_error(e);
                warn!("{}", err);
                first_error.get_or_insert(err);
            }
            info!(
                "Closed {} partition ({} rows)",
                partition.record_type, partition.rows
            );
            self.closed_partitions.push(partition.info());
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn partitions(&self) -> Vec<PartitionInfo> {
        self.closed_partitions
            .iter()
            .cloned()
            .chain(self.open.iter().map(Partition::info))
            .collect()
    }
}

impl Drop for PartitionStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing partitions: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{CommunityRecord, ScrapeConfigRecord};
    use tempfile::TempDir;

    fn community(id: &str, title: &str) -> Record {
        Record::Community(CommunityRecord {
            id: id.to_string(),
            display_name: id.to_string(),
            title: title.to_string(),
            subscriber_count: 7,
            created_at: 1000,
            scraped_at: 2000,
        })
    }

    fn config_record() -> Record {
        Record::Config(ScrapeConfigRecord {
            community_ids: vec!["rust".to_string()],
            submissions_per_community: 2,
            submission_ordering_mode: "new".to_string(),
            time_filter: "all".to_string(),
            comment_expansion_depth: 0,
            scraped_at: 2000,
        })
    }

    #[test]
    fn test_encode_row() {
        assert_eq!(
            encode_row(&["a", "say \"hi\"", "x,y"]),
            "\"a\",\"say \"\"hi\"\"\",\"x,y\"\r\n"
        );
    }

    #[test]
    fn test_header_once_then_rows_in_order() {
        let dir = TempDir::new().unwrap();
        let mut store = PartitionStore::new(dir.path(), 1700000000);

        store.append(&community("one", "First")).unwrap();
        store.append(&community("two", "Second")).unwrap();
        store.close().unwrap();

        let path = dir.path().join("community").join("1700000000.csv");
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.split_terminator("\r\n").collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "\"id\",\"display_name\",\"title\",\"subscriber_count\",\"created_at\",\"scraped_at\""
        );
        assert!(lines[1].starts_with("\"one\""));
        assert!(lines[2].starts_with("\"two\""));
    }

    #[test]
    fn test_rows_visible_before_close() {
        let dir = TempDir::new().unwrap();
        let mut store = PartitionStore::new(dir.path(), 42);

        store.append(&community("one", "First")).unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("community").join("42.csv")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let community_dir = dir.path().join("community");
        std::fs::create_dir_all(&community_dir).unwrap();
        std::fs::write(community_dir.join("42.csv"), "previous run").unwrap();

        let mut store = PartitionStore::new(dir.path(), 42);
        store.append(&community("one", "First")).unwrap();
        store.close().unwrap();

        assert_eq!(
            std::fs::read_to_string(community_dir.join("42.csv")).unwrap(),
            "previous run"
        );
        assert!(community_dir.join("42-1.csv").exists());
    }

    #[test]
    fn test_partitions_in_open_order() {
        let dir = TempDir::new().unwrap();
        let mut store = PartitionStore::new(dir.path(), 42);

        store.append(&config_record()).unwrap();
        store.append(&community("one", "First")).unwrap();
        store.append(&community("two", "Second")).unwrap();
        store.close().unwrap();

        let partitions = store.partitions();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].record_type, RecordType::Config);
        assert_eq!(partitions[0].rows, 1);
        assert_eq!(partitions[1].record_type, RecordType::Community);
        assert_eq!(partitions[1].rows, 2);
    }

    #[test]
    fn test_append_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = PartitionStore::new(dir.path(), 42);
        store.close().unwrap();
        store.close().unwrap();

        assert!(matches!(
            store.append(&community("one", "First")),
            Err(PersistenceError::Closed)
        ));
    }

    #[test]
    fn test_no_files_without_records() {
        let dir = TempDir::new().unwrap();
        let mut store = PartitionStore::new(dir.path(), 42);
        store.close().unwrap();

        assert!(!dir.path().join("community").exists());
    }

    #[test]
    fn test_unwritable_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        // A file where the type directory should be
        std::fs::write(dir.path().join("community"), "blocker").unwrap();

        let mut store = PartitionStore::new(dir.path(), 42);
        assert!(matches!(
            store.append(&community("one", "First")),
            Err(PersistenceError::Directory { .. })
        ));
    }
}
