//! The far side of the shared location.
//!
//! A bridge owns a connection to the authoritative service. Each pass it
//! carries queued commands upstream in id order and then publishes the
//! service's current view, stamped with a fresh heartbeat, for clients to
//! merge on their next tick.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use raidsync_core::{
    BridgeRecord, Clock, Command, CommandId, CommandPayload, Signup, Snapshot, same_character,
};
use raidsync_storage::{SqliteStorage, Storage};

use crate::error::EngineError;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The service could not be reached; try again on the next pass.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The service refused the command; retrying would not help.
    #[error("command rejected: {0}")]
    Rejected(String),
}

impl From<SourceError> for EngineError {
    fn from(e: SourceError) -> Self {
        EngineError::Source(e.to_string())
    }
}

/// The authoritative service. `apply` may see the same command more than
/// once and must treat repeats of a command id as no-ops.
pub trait SourceOfTruth {
    fn fetch_snapshots(&mut self) -> Result<Vec<Snapshot>, SourceError>;

    fn apply(&mut self, command: &Command) -> Result<(), SourceError>;
}

/// Applies `command` to the service's copy of its event: a status change
/// needs an existing signup, a sign-up replaces or adds the character.
/// Applying the same command twice leaves the same result.
pub fn apply_to_snapshot(snapshot: &mut Snapshot, command: &Command) -> Result<(), SourceError> {
    if snapshot.event_id != command.event_id {
        return Err(SourceError::Rejected(format!(
            "command {} targets event {}, not {}",
            command.id, command.event_id, snapshot.event_id
        )));
    }
    match &command.payload {
        CommandPayload::ChangeStatus { character, status } => {
            let signup = snapshot
                .signups
                .iter_mut()
                .find(|s| same_character(&s.character, character))
                .ok_or_else(|| SourceError::Rejected(format!("{character} is not signed up")))?;
            signup.status = *status;
        }
        CommandPayload::SignUp {
            character,
            realm,
            class,
            role,
            spec,
        } => {
            let entry = Signup {
                character: character.clone(),
                realm: realm.clone(),
                class: class.clone(),
                role: *role,
                spec: spec.clone(),
                status: command.payload.resulting_status(),
            };
            match snapshot
                .signups
                .iter_mut()
                .find(|s| same_character(&s.character, character))
            {
                Some(existing) => *existing = entry,
                None => snapshot.signups.push(entry),
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: Vec<CommandId>,
    pub rejected: Vec<CommandId>,
    /// Commands left in the queue for the next pass.
    pub deferred: usize,
    /// Number of events published, or `None` when the fetch failed.
    pub events_written: Option<usize>,
}

pub struct BridgeAgent {
    storage: SqliteStorage,
    clock: Arc<dyn Clock>,
}

impl BridgeAgent {
    pub fn new(storage: SqliteStorage, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Drains the queue, then publishes the source's events.
    pub fn sync_once<S: SourceOfTruth + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<SyncReport, EngineError> {
        let mut report = self.drain(source)?;
        report.events_written = match self.publish(source) {
            Ok(count) => Some(count),
            Err(EngineError::Source(reason)) => {
                warn!(%reason, "fetch failed, bridge record left untouched");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(report)
    }

    /// Applies queued commands in id order, removing each once the source has
    /// accepted or rejected it. Stops at the first unavailable error so later
    /// commands never overtake earlier ones.
    pub fn drain<S: SourceOfTruth + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<SyncReport, EngineError> {
        let pending = self.storage.pending_commands()?;
        let total = pending.len();
        let mut report = SyncReport::default();

        for command in &pending {
            match source.apply(command) {
                Ok(()) => {
                    self.storage.remove_command(command.id)?;
                    debug!(command_id = %command.id, event_id = %command.event_id, "applied command");
                    report.applied.push(command.id);
                }
                Err(SourceError::Rejected(reason)) => {
                    self.storage.remove_command(command.id)?;
                    warn!(command_id = %command.id, %reason, "source rejected command, dropping it");
                    report.rejected.push(command.id);
                }
                Err(SourceError::Unavailable(reason)) => {
                    warn!(command_id = %command.id, %reason, "source unavailable, deferring queue");
                    break;
                }
            }
        }

        report.deferred = total - report.applied.len() - report.rejected.len();
        if total > 0 {
            info!(
                applied = report.applied.len(),
                rejected = report.rejected.len(),
                deferred = report.deferred,
                "drained command queue"
            );
        }
        Ok(report)
    }

    /// Writes the source's events with `heartbeat = last_update = now`.
    pub fn publish<S: SourceOfTruth + ?Sized>(&mut self, source: &mut S) -> Result<usize, EngineError> {
        let events = source.fetch_snapshots()?;
        let now = self.clock.now()?;
        let record = BridgeRecord {
            heartbeat: now,
            last_update: now,
            events,
        };
        self.storage.write_bridge_record(&record)?;
        debug!(events = record.events.len(), heartbeat = %now, "published bridge record");
        Ok(record.events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raidsync_core::{EventId, Role, SignupStatus, Timestamp};

    fn command(payload: CommandPayload) -> Command {
        Command {
            id: CommandId::new(1),
            event_id: EventId::new(42),
            timestamp: Timestamp::from_secs(1),
            payload,
        }
    }

    #[test]
    fn status_change_needs_an_existing_signup() {
        let mut snap = Snapshot::new(EventId::new(42), "raid");
        let cmd = command(CommandPayload::ChangeStatus {
            character: "Arthas".into(),
            status: SignupStatus::Late,
        });
        assert!(matches!(
            apply_to_snapshot(&mut snap, &cmd),
            Err(SourceError::Rejected(_))
        ));

        let signup = command(CommandPayload::SignUp {
            character: "arthas".into(),
            realm: "tarren-mill".into(),
            class: "Paladin".into(),
            role: Role::Tank,
            spec: "Protection".into(),
        });
        apply_to_snapshot(&mut snap, &signup).unwrap();
        apply_to_snapshot(&mut snap, &signup).unwrap();
        assert_eq!(snap.signups.len(), 1);

        apply_to_snapshot(&mut snap, &cmd).unwrap();
        assert_eq!(snap.signups[0].status, SignupStatus::Late);
    }

    #[test]
    fn wrong_event_is_rejected() {
        let mut snap = Snapshot::new(EventId::new(7), "raid");
        let cmd = command(CommandPayload::ChangeStatus {
            character: "Arthas".into(),
            status: SignupStatus::Late,
        });
        assert!(apply_to_snapshot(&mut snap, &cmd).is_err());
    }
}
