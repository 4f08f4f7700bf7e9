use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::JournalResult;
use crate::journal::record::{JournalRecord, RECORD_SEPARATOR};
use crate::journal::traits::EventJournal;

const SEGMENT_PREFIX: &str = "log_";

struct Segment {
    index: u64,
    file: File,
    size: u64,
}

/// Journal stored as numbered segment files `log_0`, `log_1`, ... in one
/// directory. A new segment is started once the current one would grow past
/// `max_file_size`; a single record is never split across segments.
pub struct FileJournal {
    dir: PathBuf,
    max_file_size: u64,
    current: Mutex<Segment>,
}

impl FileJournal {
    pub fn open(dir: impl AsRef<Path>, max_file_size: u64) -> JournalResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let index = segment_indices(&dir)?.last().copied().unwrap_or(0);
        let file = open_segment(&dir, index)?;
        let size = file.metadata()?.len();
        info!(dir = %dir.display(), segment = index, size, "opened journal");

        Ok(Self {
            dir,
            max_file_size,
            current: Mutex::new(Segment { index, file, size }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl EventJournal for FileJournal {
    fn append(&self, record: &JournalRecord) -> JournalResult<()> {
        let line = format!("{record}{RECORD_SEPARATOR}");
        let len = line.len() as u64;

        let mut segment = self.current.lock();
        if segment.size > 0 && segment.size + len > self.max_file_size {
            let index = segment.index + 1;
            *segment = Segment {
                index,
                file: open_segment(&self.dir, index)?,
                size: 0,
            };
            debug!(segment = index, "rotated journal segment");
        }
        segment.file.write_all(line.as_bytes())?;
        segment.size += len;
        Ok(())
    }

    fn load(&self) -> JournalResult<Vec<String>> {
        let _guard = self.current.lock();
        let mut records = Vec::new();
        for index in segment_indices(&self.dir)? {
            let contents = fs::read_to_string(segment_path(&self.dir, index))?;
            records.extend(
                contents
                    .split(RECORD_SEPARATOR)
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string),
            );
        }
        Ok(records)
    }
}

fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{SEGMENT_PREFIX}{index}"))
}

fn open_segment(dir: &Path, index: u64) -> JournalResult<File> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .open(segment_path(dir, index))?)
}

/// Segment numbers present in `dir`, ascending.
fn segment_indices(dir: &Path) -> JournalResult<Vec<u64>> {
    let mut indices = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(index) = entry
            .file_name()
            .to_str()
            .and_then(|n| n.strip_prefix(SEGMENT_PREFIX))
            .and_then(|n| n.parse::<u64>().ok())
        {
            indices.push(index);
        }
    }
    indices.sort_unstable();
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delete(name: &str) -> JournalRecord {
        JournalRecord::DeleteQueue {
            queue_name: name.to_string(),
        }
    }

    #[test]
    fn records_come_back_in_write_order() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path(), 1024 * 1024).unwrap();
        journal
            .append(&JournalRecord::CreateQueue {
                queue_name: "q".to_string(),
                number_of_partitions: 1,
                ack_timeout: 5,
            })
            .unwrap();
        journal.append(&delete("q")).unwrap();

        let records = journal.load().unwrap();
        assert_eq!(records, vec!["CreateQueue:q:1:5", "DeleteQueue:q"]);
    }

    #[test]
    fn rotates_without_splitting_records() {
        let dir = tempfile::tempdir().unwrap();
        // "DeleteQueue:queue-N::" is 21 bytes, so two fit per 50 byte segment
        let journal = FileJournal::open(dir.path(), 50).unwrap();
        for i in 0..5 {
            journal.append(&delete(&format!("queue-{i}"))).unwrap();
        }

        assert_eq!(segment_indices(dir.path()).unwrap(), vec![0, 1, 2]);
        let first = fs::read_to_string(dir.path().join("log_0")).unwrap();
        assert_eq!(first, "DeleteQueue:queue-0::DeleteQueue:queue-1::");

        let names: Vec<String> = journal.load().unwrap();
        assert_eq!(names.len(), 5);
        assert_eq!(names[4], "DeleteQueue:queue-4");
    }

    #[test]
    fn oversized_record_still_lands_in_its_own_segment() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path(), 4).unwrap();
        journal.append(&delete("a")).unwrap();
        journal.append(&delete("b")).unwrap();
        assert_eq!(segment_indices(dir.path()).unwrap(), vec![0, 1]);
        assert_eq!(journal.load().unwrap().len(), 2);
    }

    #[test]
    fn reopening_appends_to_the_newest_segment() {
        let dir = tempfile::tempdir().unwrap();
        {
            let journal = FileJournal::open(dir.path(), 30).unwrap();
            journal.append(&delete("first")).unwrap();
            journal.append(&delete("second")).unwrap();
        }
        let journal = FileJournal::open(dir.path(), 30).unwrap();
        journal.append(&delete("third")).unwrap();

        assert_eq!(
            journal.load().unwrap(),
            vec!["DeleteQueue:first", "DeleteQueue:second", "DeleteQueue:third"]
        );
    }

    #[test]
    fn segments_load_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("log_10"), "DeleteQueue:late::").unwrap();
        fs::write(dir.path().join("log_2"), "DeleteQueue:early::").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let journal = FileJournal::open(dir.path(), 1024).unwrap();
        assert_eq!(
            journal.load().unwrap(),
            vec!["DeleteQueue:early", "DeleteQueue:late"]
        );
    }
}
