use std::collections::{BTreeMap, BTreeSet};

use raidsync_core::{Command, CommandId, EventId, Snapshot};
use raidsync_engine::{SourceError, SourceOfTruth, apply_to_snapshot};

/// In-memory authoritative service. Applying the same command id twice is a
/// no-op, the way the real service deduplicates retried commands.
#[derive(Debug, Default)]
pub struct MemorySource {
    events: BTreeMap<EventId, Snapshot>,
    seen: BTreeSet<CommandId>,
    log: Vec<CommandId>,
    apply_calls: usize,
    unavailable: bool,
    /// Remaining successful applies before the source goes unavailable.
    fail_after: Option<usize>,
    reject: BTreeSet<CommandId>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = Snapshot>) -> Self {
        let mut source = Self::new();
        for event in events {
            source.put(event);
        }
        source
    }

    pub fn put(&mut self, snapshot: Snapshot) {
        self.events.insert(snapshot.event_id, snapshot);
    }

    pub fn event(&self, event_id: EventId) -> Option<&Snapshot> {
        self.events.get(&event_id)
    }

    pub fn set_available(&mut self, available: bool) {
        self.unavailable = !available;
        self.fail_after = None;
    }

    /// Accepts `n` more commands, then behaves as unreachable.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_after = Some(n);
    }

    pub fn reject(&mut self, command_id: CommandId) {
        self.reject.insert(command_id);
    }

    /// Distinct commands applied, in the order they took effect.
    pub fn applied_log(&self) -> &[CommandId] {
        &self.log
    }

    /// Every call to `apply`, repeats included.
    pub fn apply_calls(&self) -> usize {
        self.apply_calls
    }
}

impl SourceOfTruth for MemorySource {
    fn fetch_snapshots(&mut self) -> Result<Vec<Snapshot>, SourceError> {
        if self.unavailable {
            return Err(SourceError::Unavailable("service offline".into()));
        }
        Ok(self.events.values().cloned().collect())
    }

    fn apply(&mut self, command: &Command) -> Result<(), SourceError> {
        self.apply_calls += 1;
        if self.unavailable || self.fail_after == Some(0) {
            self.unavailable = true;
            return Err(SourceError::Unavailable("service offline".into()));
        }
        if self.seen.contains(&command.id) {
            return Ok(());
        }
        if self.reject.contains(&command.id) {
            return Err(SourceError::Rejected(format!("command {} refused", command.id)));
        }
        let event = self
            .events
            .get_mut(&command.event_id)
            .ok_or_else(|| SourceError::Rejected(format!("unknown event {}", command.event_id)))?;

        apply_to_snapshot(event, command)?;

        if let Some(n) = self.fail_after.as_mut() {
            *n -= 1;
        }
        self.seen.insert(command.id);
        self.log.push(command.id);
        Ok(())
    }
}
