use raidsync_core::{
    BridgeRecord, CommandId, CommandPayload, EventId, Role, SignupStatus, Timestamp, codec,
};
use raidsync_engine::{Liveness, MergeOutcome, SourceOfTruth};
use raidsync_harness::{MemorySource, START, TestSetup, monday_mythic, signup};
use raidsync_storage::{SqliteStorage, Storage};

fn record(last_update: i64, title: &str) -> BridgeRecord {
    let mut snap = monday_mythic();
    snap.title = title.into();
    BridgeRecord {
        heartbeat: Timestamp::from_secs(last_update),
        last_update: Timestamp::from_secs(last_update),
        events: vec![snap],
    }
}

fn late(character: &str) -> CommandPayload {
    CommandPayload::ChangeStatus {
        character: character.into(),
        status: SignupStatus::Late,
    }
}

// ============================================================================
// Merge rule
// ============================================================================

#[test]
fn only_strictly_newer_records_replace_the_store() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    setup.client.merge_from_bridge(&record(100, "at 100"))?;
    assert_eq!(setup.client.last_update()?, Timestamp::from_secs(100));

    let older = setup.client.merge_from_bridge(&record(90, "at 90"))?;
    assert_eq!(
        older,
        MergeOutcome::Skipped {
            local: Timestamp::from_secs(100),
            remote: Timestamp::from_secs(90),
        }
    );
    let equal = setup.client.merge_from_bridge(&record(100, "also at 100"))?;
    assert!(!equal.applied());
    assert_eq!(setup.client.snapshots()?[0].title, "at 100");

    let newer = setup.client.merge_from_bridge(&record(150, "at 150"))?;
    assert_eq!(newer, MergeOutcome::Applied { events: 1 });
    assert_eq!(setup.client.snapshots()?[0].title, "at 150");
    assert_eq!(setup.client.last_update()?, Timestamp::from_secs(150));
    Ok(())
}

#[test]
fn merge_replaces_rather_than_unions() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    let mut other = monday_mythic();
    other.event_id = EventId::new(7);
    setup.client.upsert(&other)?;

    setup.client.merge_from_bridge(&record(10, "bridge view"))?;
    let ids: Vec<EventId> = setup.client.snapshots()?.iter().map(|s| s.event_id).collect();
    assert_eq!(ids, vec![EventId::new(42)]);
    Ok(())
}

#[test]
fn manual_import_outranks_an_older_bridge_write() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    setup.source.put(monday_mythic());
    setup.sync()?;

    setup.advance(20);
    let mut fresh = monday_mythic();
    fresh.title = "Fresh from chat".into();
    setup.client.import(&codec::encode(&fresh))?;

    // The bridge record still carries the older timestamp.
    let report = setup.client.tick()?;
    assert_eq!(
        report.merge,
        Some(MergeOutcome::Skipped {
            local: START.plus_secs(20),
            remote: START,
        })
    );
    assert!(!report.changed);
    assert_eq!(setup.client.snapshots()?[0].title, "Fresh from chat");
    Ok(())
}

// ============================================================================
// Tick
// ============================================================================

#[test]
fn tick_merges_only_when_the_record_changes() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    let first = setup.client.tick()?;
    assert_eq!(first.liveness, Liveness::NeverSeen);
    assert_eq!(first.merge, None);

    setup.source.put(monday_mythic());
    setup.sync()?;
    let report = setup.client.tick()?;
    assert_eq!(report.merge, Some(MergeOutcome::Applied { events: 1 }));
    assert!(report.changed);
    assert_eq!(report.liveness, Liveness::Active);

    let again = setup.client.tick()?;
    assert_eq!(again.merge, None);
    assert!(!again.changed);

    setup.advance(5);
    let mut moved = monday_mythic();
    moved.time = "21:00:00".into();
    setup.source.put(moved.clone());
    setup.sync()?;
    let report = setup.client.tick()?;
    assert!(report.changed);
    assert_eq!(setup.client.snapshots()?, vec![moved]);
    Ok(())
}

#[test]
fn liveness_goes_stale_without_heartbeats() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    setup.sync()?;
    assert_eq!(setup.client.tick()?.liveness, Liveness::Active);

    setup.advance(119);
    assert_eq!(setup.client.tick()?.liveness, Liveness::Active);
    setup.advance(2);
    assert_eq!(setup.client.tick()?.liveness, Liveness::Stale);

    setup.sync()?;
    assert_eq!(setup.client.tick()?.liveness, Liveness::Active);
    Ok(())
}

// ============================================================================
// Bridge drain
// ============================================================================

#[test]
fn drain_applies_in_id_order_and_empties_the_queue() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    let mut event = monday_mythic();
    event.signups.push(signup("Sylvanas", "Hunter", Role::Dps, "Marksmanship"));
    setup.source.put(event);
    setup.sync()?;
    setup.client.tick()?;

    let first = setup.client.enqueue(EventId::new(42), late("Arthas"))?;
    let second = setup.client.enqueue(
        EventId::new(42),
        CommandPayload::ChangeStatus {
            character: "Sylvanas".into(),
            status: SignupStatus::Tentative,
        },
    )?;
    let third = setup.client.enqueue(
        EventId::new(42),
        CommandPayload::SignUp {
            character: "Thrall".into(),
            realm: "draenor".into(),
            class: "Shaman".into(),
            role: Role::Healer,
            spec: "Restoration".into(),
        },
    )?;

    // No optimistic local change.
    assert_eq!(
        setup.client.snapshot(EventId::new(42))?.and_then(|s| s.signup_for("Arthas").map(|x| x.status)),
        Some(SignupStatus::Signed)
    );

    setup.advance(1);
    let report = setup.sync()?;
    assert_eq!(report.applied, vec![first.id, second.id, third.id]);
    assert_eq!(report.deferred, 0);
    assert_eq!(report.events_written, Some(1));
    assert_eq!(setup.source.applied_log(), &[first.id, second.id, third.id]);
    assert!(setup.client.pending_commands()?.is_empty());

    setup.client.tick()?;
    let snap = setup.client.snapshot(EventId::new(42))?.ok_or("event missing")?;
    assert_eq!(snap.signup_for("arthas").map(|s| s.status), Some(SignupStatus::Late));
    assert_eq!(snap.signup_for("Sylvanas").map(|s| s.status), Some(SignupStatus::Tentative));
    assert_eq!(snap.signup_for("Thrall").map(|s| s.role), Some(Role::Healer));
    Ok(())
}

#[test]
fn unavailable_source_defers_the_rest_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    setup.source.put(monday_mythic());
    setup.sync()?;
    setup.client.tick()?;

    let ids: Vec<CommandId> = (0..3)
        .map(|_| setup.client.enqueue(EventId::new(42), late("Arthas")).map(|c| c.id))
        .collect::<Result<_, _>>()?;

    setup.source.fail_after(1);
    let report = setup.sync()?;
    assert_eq!(report.applied, vec![ids[0]]);
    assert_eq!(report.deferred, 2);
    assert_eq!(report.events_written, None);
    let left: Vec<CommandId> = setup.client.pending_commands()?.iter().map(|c| c.id).collect();
    assert_eq!(left, vec![ids[1], ids[2]]);

    setup.source.set_available(true);
    let report = setup.sync()?;
    assert_eq!(report.applied, vec![ids[1], ids[2]]);
    assert_eq!(setup.source.applied_log(), ids.as_slice());
    Ok(())
}

#[test]
fn rejected_commands_are_dropped_and_later_ones_proceed() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    setup.source.put(monday_mythic());
    setup.sync()?;
    setup.client.tick()?;

    let unknown = setup.client.enqueue(EventId::new(42), late("Nobody"))?;
    let good = setup.client.enqueue(EventId::new(42), late("Arthas"))?;
    let report = setup.sync()?;
    assert_eq!(report.rejected, vec![unknown.id]);
    assert_eq!(report.applied, vec![good.id]);
    assert!(setup.client.pending_commands()?.is_empty());
    Ok(())
}

#[test]
fn redelivered_commands_apply_once() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    setup.source.put(monday_mythic());
    setup.sync()?;
    setup.client.tick()?;
    let cmd = setup.client.enqueue(EventId::new(42), late("Arthas"))?;

    // A bridge that applied the command but died before removing it.
    let shadow = SqliteStorage::open(setup.db_path())?;
    for pending in shadow.pending_commands()? {
        setup.source.apply(&pending)?;
    }
    assert_eq!(shadow.pending_commands()?.len(), 1);

    let report = setup.sync()?;
    assert_eq!(report.applied, vec![cmd.id]);
    assert_eq!(setup.source.applied_log(), &[cmd.id]);
    assert_eq!(setup.source.apply_calls(), 2);
    assert!(shadow.pending_commands()?.is_empty());

    let fresh = MemorySource::with_events([monday_mythic()]);
    assert_eq!(
        fresh.event(EventId::new(42)).and_then(|s| s.signup_for("Arthas")).map(|s| s.status),
        Some(SignupStatus::Signed)
    );
    assert_eq!(
        setup.source.event(EventId::new(42)).and_then(|s| s.signup_for("Arthas")).map(|s| s.status),
        Some(SignupStatus::Late)
    );
    Ok(())
}
