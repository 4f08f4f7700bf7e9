use crate::error::JournalResult;
use crate::journal::record::JournalRecord;

/// Append-only operation log. Implementations must be safe to share across
/// threads; `append` calls may come from any request task.
pub trait EventJournal: Send + Sync {
    fn append(&self, record: &JournalRecord) -> JournalResult<()>;

    /// Every raw record in the order it was written.
    fn load(&self) -> JournalResult<Vec<String>>;
}

/// Journal used when persistence is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledJournal;

impl EventJournal for DisabledJournal {
    fn append(&self, _record: &JournalRecord) -> JournalResult<()> {
        Ok(())
    }

    fn load(&self) -> JournalResult<Vec<String>> {
        Ok(Vec::new())
    }
}
