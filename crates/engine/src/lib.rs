pub mod bridge;
pub mod config;
pub mod console;
pub mod error;
pub mod liveness;

pub use bridge::{BridgeAgent, SourceError, SourceOfTruth, SyncReport, apply_to_snapshot};
pub use config::EngineConfig;
pub use error::{EngineError, ErrorCategory, ErrorCode};
pub use liveness::{Liveness, LivenessMonitor};

use std::sync::Arc;

use tracing::{debug, info, warn};

use raidsync_core::{
    BridgeRecord, ChunkSet, Clock, Command, CommandPayload, CoreError, EventId, ImportId,
    SignupStatus, Snapshot, Timestamp, codec, same_character,
};
use raidsync_storage::{ReplaceOutcome, SqliteStorage, Storage, StorageError};

/// Result of merging a bridge record into the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied { events: usize },
    Skipped { local: Timestamp, remote: Timestamp },
}

impl MergeOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub import_id: ImportId,
    pub staged: usize,
    pub max_index_seen: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub liveness: Liveness,
    /// Set only when the bridge record changed since the previous tick.
    pub merge: Option<MergeOutcome>,
    /// The store changed and views should re-render.
    pub changed: bool,
    /// Queue entries dropped by the restart cleanup.
    pub cleaned: usize,
}

/// The disconnected client: local event store, command queue and the
/// periodic reconciliation with whatever the bridge last wrote.
pub struct Engine {
    config: EngineConfig,
    storage: SqliteStorage,
    clock: Arc<dyn Clock>,
    liveness: LivenessMonitor,
    pending_import: Option<ChunkSet>,
    started_at: Timestamp,
    startup_cleanup_done: bool,
    last_bridge_digest: Option<blake3::Hash>,
    last_liveness: Option<Liveness>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        storage: SqliteStorage,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let started_at = clock.now()?;
        info!(%started_at, local_actor = %config.local_actor, "engine started");
        Ok(Self {
            liveness: LivenessMonitor::new(config.active_window_secs),
            startup_cleanup_done: !config.startup_queue_cleanup,
            config,
            storage,
            clock,
            pending_import: None,
            started_at,
            last_bridge_digest: None,
            last_liveness: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    fn now(&self) -> Result<Timestamp, EngineError> {
        Ok(self.clock.now()?)
    }

    // ========================================================================
    // Manual import
    // ========================================================================

    /// Decodes a single-shot payload and merges it. Any chunked import in
    /// progress is abandoned.
    pub fn import(&mut self, encoded: &str) -> Result<Snapshot, EngineError> {
        if let Some(abandoned) = self.pending_import.take() {
            debug!(import_id = %abandoned.import_id(), "discarding staged import");
        }
        let snapshot = codec::decode(encoded)?;
        self.apply_import(snapshot)
    }

    pub fn stage_chunk(&mut self, index: usize, part: &str) -> Result<StageReport, EngineError> {
        let set = self.pending_import.get_or_insert_with(ChunkSet::new);
        if let Err(e) = set.stage(index, part) {
            if set.is_empty() {
                self.pending_import = None;
            }
            warn!(index, error = %e, "refused import part");
            return Err(e.into());
        }
        debug!(import_id = %set.import_id(), index, len = part.len(), "staged import part");
        Ok(StageReport {
            import_id: set.import_id(),
            staged: set.staged(),
            max_index_seen: set.max_index_seen(),
        })
    }

    pub fn pending_import(&self) -> Option<&ChunkSet> {
        self.pending_import.as_ref()
    }

    /// Assembles the staged parts and merges the decoded snapshot. The staged
    /// parts are gone afterwards whether or not this succeeds.
    pub fn finalize_import(&mut self) -> Result<Snapshot, EngineError> {
        let set = self
            .pending_import
            .take()
            .filter(|set| !set.is_empty())
            .ok_or(EngineError::NoPendingImport)?;

        let payload = set.assemble().map_err(|e| match e {
            CoreError::MissingChunks { missing } => {
                warn!(import_id = %set.import_id(), missing = missing.len(), "import has gaps");
                EngineError::incomplete_import(&missing)
            }
            other => other.into(),
        })?;
        let snapshot = codec::decode(&payload)?;
        debug!(import_id = %set.import_id(), parts = set.staged(), "assembled import");
        self.apply_import(snapshot)
    }

    fn apply_import(&mut self, snapshot: Snapshot) -> Result<Snapshot, EngineError> {
        let now = self.now()?;
        let last_update = self.storage.import_snapshot(&snapshot, now)?;
        info!(
            event_id = %snapshot.event_id,
            signups = snapshot.signups.len(),
            %last_update,
            "imported event"
        );
        Ok(snapshot)
    }

    // ========================================================================
    // Store
    // ========================================================================

    pub fn upsert(&mut self, snapshot: &Snapshot) -> Result<(), EngineError> {
        self.storage.upsert_snapshot(snapshot)?;
        debug!(event_id = %snapshot.event_id, "upserted event");
        Ok(())
    }

    /// Replaces the whole store with the bridge's view when it is strictly
    /// newer than ours.
    pub fn merge_from_bridge(&mut self, record: &BridgeRecord) -> Result<MergeOutcome, EngineError> {
        let remote = record.last_update;
        match self.storage.replace_snapshots_if_newer(&record.events, remote)? {
            ReplaceOutcome::Replaced { events } => {
                info!(events, last_update = %remote, "merged bridge record");
                Ok(MergeOutcome::Applied { events })
            }
            ReplaceOutcome::Stale { local } => {
                debug!(%local, %remote, "bridge record not newer, skipped");
                Ok(MergeOutcome::Skipped { local, remote })
            }
        }
    }

    pub fn snapshots(&self) -> Result<Vec<Snapshot>, EngineError> {
        Ok(self.storage.list_snapshots()?)
    }

    pub fn snapshot(&self, event_id: EventId) -> Result<Option<Snapshot>, EngineError> {
        Ok(self.storage.get_snapshot(event_id)?)
    }

    pub fn last_update(&self) -> Result<Timestamp, EngineError> {
        Ok(self.storage.last_update()?)
    }

    /// Drops events dated before `today` (`YYYY-MM-DD`). Undated events stay.
    pub fn prune(&mut self, today: &str) -> Result<usize, EngineError> {
        let removed = self.storage.delete_snapshots_before(today)?;
        info!(removed, %today, "pruned past events");
        Ok(removed)
    }

    pub fn remove(&mut self, event_id: EventId) -> Result<bool, EngineError> {
        let removed = self.storage.delete_snapshot(event_id)?;
        if removed {
            info!(%event_id, "removed event");
        }
        Ok(removed)
    }

    /// Wipes local events, the queue and all sync timestamps. Command ids
    /// keep counting from where they were.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.storage.reset()?;
        self.pending_import = None;
        warn!("local store reset");
        Ok(())
    }

    /// Local calendar date, shifted by the configured UTC offset.
    pub fn today(&self) -> Result<String, EngineError> {
        let now = self.now()?;
        let offset = i64::from(self.config.utc_offset_minutes) * 60;
        let local = chrono::DateTime::from_timestamp(now.as_secs().saturating_add(offset), 0)
            .ok_or_else(|| CoreError::InvalidData(format!("timestamp out of range: {now}")))?;
        Ok(local.date_naive().format("%Y-%m-%d").to_string())
    }

    // ========================================================================
    // Command queue
    // ========================================================================

    /// Queues a mutation for the bridge to carry out. Nothing changes locally
    /// until the bridge publishes the result.
    pub fn enqueue(
        &mut self,
        event_id: EventId,
        payload: CommandPayload,
    ) -> Result<Command, EngineError> {
        self.check_permission(event_id, &payload)?;

        let now = self.now()?;
        let liveness = self.liveness_at(now)?;
        if !liveness.is_active() {
            debug!(%event_id, %liveness, "refusing to queue without an active bridge");
            return Err(EngineError::BridgeInactive(liveness));
        }

        let command = self.storage.append_command(event_id, now, &payload)?;
        info!(
            command_id = %command.id,
            %event_id,
            kind = command.kind().as_str(),
            character = payload.character(),
            "queued command"
        );
        Ok(command)
    }

    /// Benching is reserved to the event owner, and nobody may bench themselves.
    pub fn check_permission(
        &self,
        event_id: EventId,
        payload: &CommandPayload,
    ) -> Result<(), EngineError> {
        if payload.resulting_status() != SignupStatus::Benched {
            return Ok(());
        }
        let actor = &self.config.local_actor;
        let target = payload.character();
        if same_character(target, actor) {
            return Err(EngineError::PermissionDenied(format!(
                "{target} cannot bench themselves"
            )));
        }
        let owned = self
            .storage
            .get_snapshot(event_id)?
            .is_some_and(|snapshot| snapshot.is_owned_by(actor));
        if !owned {
            return Err(EngineError::PermissionDenied(format!(
                "only the owner of event {event_id} can bench players"
            )));
        }
        Ok(())
    }

    pub fn pending_commands(&self) -> Result<Vec<Command>, EngineError> {
        Ok(self.storage.pending_commands()?)
    }

    /// Drops queue entries left over from a previous run, once, after the
    /// configured delay. Returns how many were removed.
    pub fn run_startup_cleanup(&mut self) -> Result<usize, EngineError> {
        let now = self.now()?;
        self.startup_cleanup_at(now)
    }

    fn startup_cleanup_at(&mut self, now: Timestamp) -> Result<usize, EngineError> {
        if self.startup_cleanup_done {
            return Ok(0);
        }
        let delay = i64::try_from(self.config.startup_cleanup_delay_secs).unwrap_or(i64::MAX);
        if now.secs_since(self.started_at) < delay {
            return Ok(0);
        }
        let removed = self.storage.remove_commands_before(self.started_at)?;
        self.startup_cleanup_done = true;
        if removed > 0 {
            info!(removed, started_at = %self.started_at, "dropped queue entries from a previous run");
        }
        Ok(removed)
    }

    // ========================================================================
    // Liveness & tick
    // ========================================================================

    pub fn liveness(&self) -> Result<Liveness, EngineError> {
        let now = self.now()?;
        self.liveness_at(now)
    }

    fn liveness_at(&self, now: Timestamp) -> Result<Liveness, EngineError> {
        let heartbeat = self
            .storage
            .bridge_heartbeat()?
            .max(self.storage.last_seen_heartbeat()?);
        Ok(self.liveness.evaluate(heartbeat, now))
    }

    /// One round of background work: pick up the bridge's latest write,
    /// merge it if it changed, sweep the queue after a restart and
    /// re-evaluate liveness.
    pub fn tick(&mut self) -> Result<TickReport, EngineError> {
        let now = self.now()?;

        let mut merge = None;
        if let Some(record) = self.storage.read_bridge_record()? {
            self.storage.record_heartbeat(record.heartbeat)?;
            let digest = bridge_digest(&record)?;
            if self.last_bridge_digest != Some(digest) {
                merge = Some(self.merge_from_bridge(&record)?);
                self.last_bridge_digest = Some(digest);
            }
        }

        let cleaned = self.startup_cleanup_at(now)?;

        let liveness = self.liveness_at(now)?;
        if self.last_liveness != Some(liveness) {
            info!(%liveness, "bridge liveness changed");
            self.last_liveness = Some(liveness);
        }

        Ok(TickReport {
            liveness,
            changed: merge.is_some_and(|m| m.applied()),
            merge,
            cleaned,
        })
    }
}

/// Content digest of a bridge record, ignoring the heartbeat.
fn bridge_digest(record: &BridgeRecord) -> Result<blake3::Hash, EngineError> {
    let bytes = rmp_serde::to_vec(&(record.last_update, &record.events))
        .map_err(StorageError::from)?;
    Ok(blake3::hash(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use raidsync_core::{ManualClock, Role, Signup};

    fn engine_at(secs: i64, actor: &str) -> (Engine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(secs)));
        let config = EngineConfig::default().with_local_actor(actor);
        let storage = SqliteStorage::open_in_memory().unwrap();
        let engine = Engine::new(config, storage, clock.clone()).unwrap();
        (engine, clock)
    }

    fn raid(id: i64, owner: &str) -> Snapshot {
        let mut snap = Snapshot::new(EventId::new(id), "Monday Mythic Night");
        snap.date = "2025-11-06".into();
        snap.time = "20:00:00".into();
        snap.owner = owner.into();
        snap.signups.push(Signup {
            character: "Arthas".into(),
            realm: "tarren-mill".into(),
            class: "Paladin".into(),
            role: Role::Tank,
            spec: "Protection".into(),
            status: SignupStatus::Signed,
        });
        snap
    }

    fn bench(character: &str) -> CommandPayload {
        CommandPayload::ChangeStatus {
            character: character.into(),
            status: SignupStatus::Benched,
        }
    }

    #[test]
    fn import_bumps_last_update_to_now() {
        let (mut engine, _clock) = engine_at(1_000, "Jaina");
        let snap = raid(42, "");
        engine.import(&codec::encode(&snap)).unwrap();
        assert_eq!(engine.last_update().unwrap(), Timestamp::from_secs(1_000));
        assert_eq!(engine.snapshot(EventId::new(42)).unwrap(), Some(snap));
    }

    #[test]
    fn finalize_without_parts_is_no_pending_import() {
        let (mut engine, _clock) = engine_at(1_000, "Jaina");
        assert!(matches!(engine.finalize_import(), Err(EngineError::NoPendingImport)));
        assert!(engine.stage_chunk(0, "x").is_err());
        assert!(matches!(engine.finalize_import(), Err(EngineError::NoPendingImport)));
    }

    #[test]
    fn single_import_discards_staged_parts() {
        let (mut engine, _clock) = engine_at(1_000, "Jaina");
        engine.stage_chunk(1, "abc").unwrap();
        engine.import(&codec::encode(&raid(1, ""))).unwrap();
        assert!(engine.pending_import().is_none());
    }

    #[test]
    fn self_bench_is_denied_even_for_the_owner() {
        let (mut engine, _clock) = engine_at(1_000, "Jaina");
        engine.upsert(&raid(42, "Jaina")).unwrap();
        let err = engine.enqueue(EventId::new(42), bench("jaina")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
    }

    #[test]
    fn benching_others_requires_ownership() {
        let (mut engine, _clock) = engine_at(1_000, "Jaina");
        engine.upsert(&raid(1, "Thrall")).unwrap();
        engine.upsert(&raid(2, "JAINA")).unwrap();
        assert!(matches!(
            engine.check_permission(EventId::new(1), &bench("Arthas")),
            Err(EngineError::PermissionDenied(_))
        ));
        assert!(matches!(
            engine.check_permission(EventId::new(99), &bench("Arthas")),
            Err(EngineError::PermissionDenied(_))
        ));
        assert!(engine.check_permission(EventId::new(2), &bench("Arthas")).is_ok());
    }

    #[test]
    fn permission_is_checked_before_liveness() {
        let (mut engine, _clock) = engine_at(1_000, "Jaina");
        assert_eq!(engine.liveness().unwrap(), Liveness::NeverSeen);
        let err = engine.enqueue(EventId::new(42), bench("Jaina")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);

        let late = CommandPayload::ChangeStatus {
            character: "Jaina".into(),
            status: SignupStatus::Late,
        };
        let err = engine.enqueue(EventId::new(42), late).unwrap_err();
        assert!(matches!(err, EngineError::BridgeInactive(Liveness::NeverSeen)));
        assert!(engine.pending_commands().unwrap().is_empty());
    }

    #[test]
    fn today_applies_the_utc_offset() {
        // 2025-11-06T23:30:00Z
        let (mut engine, _clock) = engine_at(1_762_471_800, "Jaina");
        assert_eq!(engine.today().unwrap(), "2025-11-06");
        engine.config.utc_offset_minutes = 60;
        assert_eq!(engine.today().unwrap(), "2025-11-07");
    }

    #[test]
    fn startup_cleanup_waits_for_the_delay_and_runs_once() {
        let (mut engine, clock) = engine_at(1_000, "Jaina");
        assert_eq!(engine.run_startup_cleanup().unwrap(), 0);
        assert!(!engine.startup_cleanup_done);
        clock.advance(5);
        assert_eq!(engine.run_startup_cleanup().unwrap(), 0);
        assert!(engine.startup_cleanup_done);
    }

    #[test]
    fn digest_ignores_heartbeat() {
        let record = BridgeRecord {
            heartbeat: Timestamp::from_secs(1),
            last_update: Timestamp::from_secs(10),
            events: vec![raid(42, "")],
        };
        let mut later = record.clone();
        later.heartbeat = Timestamp::from_secs(2);
        assert_eq!(bridge_digest(&record).unwrap(), bridge_digest(&later).unwrap());
        later.last_update = Timestamp::from_secs(11);
        assert_ne!(bridge_digest(&record).unwrap(), bridge_digest(&later).unwrap());
    }
}
