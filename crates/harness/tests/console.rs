use raidsync_core::{EventId, SignupStatus, codec};
use raidsync_engine::console::{ConsoleCommand, execute, handle_line};
use raidsync_harness::{TestSetup, monday_mythic};

fn reply(setup: &mut TestSetup, line: &str) -> String {
    handle_line(&mut setup.client, line)
}

#[test]
fn import_list_and_remove() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    assert_eq!(reply(&mut setup, "list"), "No events stored.");

    let line = format!("/lb import {}", codec::encode(&monday_mythic()));
    assert_eq!(
        reply(&mut setup, &line),
        "Imported event 42: Monday Mythic Night"
    );
    assert_eq!(
        reply(&mut setup, "list"),
        "[42] 2025-11-06 20:00:00 Monday Mythic Night (1 signups)"
    );

    assert_eq!(reply(&mut setup, "remove 42"), "Removed event 42.");
    assert_eq!(reply(&mut setup, "remove 42"), "No event 42 stored.");
    Ok(())
}

#[test]
fn errors_carry_guidance() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    let out = reply(&mut setup, "import not-base64-garbage!!!");
    assert!(out.starts_with("Error: invalid encoding"), "{out}");
    assert!(out.contains("Copy the import text again"), "{out}");

    let out = reply(&mut setup, "importdone");
    assert!(out.contains("no import in progress"), "{out}");

    let out = reply(&mut setup, "setstatus 42 late");
    assert!(out.contains("companion app is not running"), "{out}");

    let out = reply(&mut setup, "setstatus 42 benched");
    assert!(out.contains("permission denied"), "{out}");
    assert!(out.contains("Only the event owner"), "{out}");

    let out = reply(&mut setup, "frobnicate");
    assert!(out.starts_with("unknown command: frobnicate"), "{out}");
    Ok(())
}

#[test]
fn chunked_import_reports_missing_parts() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    let encoded = codec::encode(&monday_mythic());
    let (a, b) = encoded.split_at(encoded.len() / 2);

    assert!(reply(&mut setup, &format!("import2 {b}")).starts_with("Staged part 2"));
    assert!(reply(&mut setup, "status").contains("1 part(s) staged"));
    let out = reply(&mut setup, "importdone");
    assert!(out.contains("missing 1 part(s), starting with [1]"), "{out}");

    reply(&mut setup, &format!("import2 {b}"));
    reply(&mut setup, &format!("import1 {a}"));
    assert_eq!(
        reply(&mut setup, "importdone"),
        "Imported event 42: Monday Mythic Night"
    );
    Ok(())
}

#[test]
fn runaway_part_index_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    assert!(reply(&mut setup, "import1 abcd").starts_with("Staged part 1"));

    let out = reply(&mut setup, "import20000000 efgh");
    assert!(out.starts_with("Error: "), "{out}");
    assert!(out.contains("above the limit"), "{out}");
    let out = reply(&mut setup, "import18446744073709551615 x");
    assert!(out.starts_with("Error: "), "{out}");

    // Only part 1 stayed staged, so the attempt decodes what it has.
    let staged = setup.client.pending_import().ok_or("import dropped")?;
    assert_eq!(staged.max_index_seen(), 1);
    let out = reply(&mut setup, "importdone");
    assert!(out.len() < 300, "{out}");

    // A wide gap is summarised instead of listed.
    reply(&mut setup, "import1 abcd");
    reply(&mut setup, "import512 efgh");
    let out = reply(&mut setup, "importdone");
    assert!(
        out.contains("missing 510 part(s), starting with [2, 3, 4, 5, 6]"),
        "{out}"
    );
    assert!(out.len() < 300, "{out}");
    Ok(())
}

#[test]
fn queue_commands_and_status() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Arthas")?;
    setup.source.put(monday_mythic());
    setup.sync()?;
    setup.client.tick()?;

    assert_eq!(reply(&mut setup, "queue"), "Queue is empty.");
    assert_eq!(
        reply(&mut setup, "setstatus 42 late"),
        "Queued command #1 for event 42."
    );
    assert_eq!(
        reply(&mut setup, "signup 42 Thrall draenor Shaman healer Restoration"),
        "Queued command #2 for event 42."
    );
    assert_eq!(
        reply(&mut setup, "queue"),
        "#1 changeStatus event 42 Arthas -> late\n#2 signUp event 42 Thrall -> signed"
    );
    let status = reply(&mut setup, "status");
    assert!(status.starts_with("Bridge: active. Events: 1. Queued commands: 2."), "{status}");

    setup.advance(1);
    setup.sync()?;
    setup.client.tick()?;
    let snap = setup.client.snapshot(EventId::new(42))?.ok_or("event missing")?;
    assert_eq!(snap.signup_for("Arthas").map(|s| s.status), Some(SignupStatus::Late));
    assert_eq!(snap.signups.len(), 2);
    Ok(())
}

#[test]
fn reset_asks_for_confirmation() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    setup.client.import(&codec::encode(&monday_mythic()))?;

    let out = execute(&mut setup.client, ConsoleCommand::Reset { confirmed: false });
    assert!(out.contains("reset confirm"), "{out}");
    assert_eq!(setup.client.snapshots()?.len(), 1);

    assert_eq!(reply(&mut setup, "/lb reset confirm"), "Local data reset.");
    assert!(setup.client.snapshots()?.is_empty());
    Ok(())
}

#[test]
fn clear_drops_only_past_events() -> Result<(), Box<dyn std::error::Error>> {
    let mut setup = TestSetup::new("Jaina")?;
    let today = setup.client.today()?;

    let mut past = monday_mythic();
    past.event_id = EventId::new(1);
    past.date = "2000-01-01".into();
    let mut current = monday_mythic();
    current.event_id = EventId::new(2);
    current.date = today;
    let mut undated = monday_mythic();
    undated.event_id = EventId::new(3);
    undated.date = String::new();
    for snap in [&past, &current, &undated] {
        setup.client.upsert(snap)?;
    }

    assert_eq!(reply(&mut setup, "clear"), "Removed 1 past event(s).");
    let ids: Vec<EventId> = setup.client.snapshots()?.iter().map(|s| s.event_id).collect();
    assert_eq!(ids, vec![EventId::new(3), EventId::new(2)]);
    Ok(())
}
