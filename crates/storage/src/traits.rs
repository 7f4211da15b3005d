use raidsync_core::{BridgeRecord, Command, CommandId, CommandPayload, EventId, Snapshot, Timestamp};

use crate::error::StorageError;

/// Outcome of a guarded bulk replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced { events: usize },
    Stale { local: Timestamp },
}

pub trait Storage {
    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Replace-or-insert by event id.
    fn upsert_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StorageError>;

    /// Upsert and raise `last_update` to at least `at`, atomically.
    fn import_snapshot(
        &mut self,
        snapshot: &Snapshot,
        at: Timestamp,
    ) -> Result<Timestamp, StorageError>;

    fn get_snapshot(&self, event_id: EventId) -> Result<Option<Snapshot>, StorageError>;

    /// All snapshots ordered by date, time, then event id.
    fn list_snapshots(&self) -> Result<Vec<Snapshot>, StorageError>;

    fn snapshot_count(&self) -> Result<u64, StorageError>;

    fn delete_snapshot(&mut self, event_id: EventId) -> Result<bool, StorageError>;

    /// Deletes dated snapshots strictly before `date` (`YYYY-MM-DD`).
    fn delete_snapshots_before(&mut self, date: &str) -> Result<usize, StorageError>;

    /// Replaces every snapshot and sets `last_update`, only when `last_update`
    /// is strictly newer than what the store holds.
    fn replace_snapshots_if_newer(
        &mut self,
        snapshots: &[Snapshot],
        last_update: Timestamp,
    ) -> Result<ReplaceOutcome, StorageError>;

    fn last_update(&self) -> Result<Timestamp, StorageError>;

    // ------------------------------------------------------------------------
    // Command queue
    // ------------------------------------------------------------------------

    /// Appends a command under the next never-used id.
    fn append_command(
        &mut self,
        event_id: EventId,
        timestamp: Timestamp,
        payload: &CommandPayload,
    ) -> Result<Command, StorageError>;

    /// Pending commands in id order.
    fn pending_commands(&self) -> Result<Vec<Command>, StorageError>;

    fn remove_command(&mut self, command_id: CommandId) -> Result<bool, StorageError>;

    /// Removes commands created strictly before `before`.
    fn remove_commands_before(&mut self, before: Timestamp) -> Result<usize, StorageError>;

    fn last_command_id(&self) -> Result<CommandId, StorageError>;

    // ------------------------------------------------------------------------
    // Bridge
    // ------------------------------------------------------------------------

    fn read_bridge_record(&self) -> Result<Option<BridgeRecord>, StorageError>;

    fn write_bridge_record(&mut self, record: &BridgeRecord) -> Result<(), StorageError>;

    /// Heartbeat column of the bridge record, without decoding its events.
    fn bridge_heartbeat(&self) -> Result<Option<Timestamp>, StorageError>;

    fn last_seen_heartbeat(&self) -> Result<Option<Timestamp>, StorageError>;

    fn record_heartbeat(&mut self, heartbeat: Timestamp) -> Result<(), StorageError>;

    /// Wipes snapshots, queue, timestamps and the seen heartbeat. The command id
    /// high-water mark survives so ids are never handed out twice.
    fn reset(&mut self) -> Result<(), StorageError>;
}
