pub mod file;
pub mod loader;
pub mod record;
pub mod traits;

pub use file::FileJournal;
pub use loader::{replay_journal, ReplayReport};
pub use record::JournalRecord;
pub use traits::{DisabledJournal, EventJournal};

use tracing::error;

/// Journal writes are best effort: a failure is logged and the in-memory
/// mutation that produced the record stands.
pub(crate) fn append_or_log(journal: &dyn EventJournal, record: &JournalRecord) {
    if let Err(e) = journal.append(record) {
        error!(
            operation = record.tag(),
            queue = record.queue_name(),
            error = %e,
            "failed to append journal record"
        );
    }
}
