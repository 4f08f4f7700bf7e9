pub mod bus;
pub mod cluster;
pub mod error;
pub mod event;
pub mod headers;
pub mod journal;
pub mod queue;
pub mod replication;
pub mod telemetry;

pub use bus::config::{EventLimits, FerryConfig};
pub use bus::handler::{Disposition, SweepReport};
pub use bus::sweeper::spawn_sweeper;
pub use bus::EventBus;
pub use cluster::{Leadership, StaticLeadership};
pub use error::{BusError, BusResult, JournalError, ReplicationError};
pub use event::{Event, PolledEvent};
pub use journal::{replay_journal, DisabledJournal, EventJournal, FileJournal};
pub use queue::{QueueInfo, QueueType};
pub use replication::{HttpReplicator, NoopReplicator, Replicator, StaticFollowerRegistry};
