mod setup;
mod source;

pub use setup::{HarnessError, START, TestSetup};
pub use source::MemorySource;

use raidsync_core::{EventId, Role, Signup, SignupStatus, Snapshot};

/// The event most scenarios revolve around.
pub fn monday_mythic() -> Snapshot {
    let mut snap = Snapshot::new(EventId::new(42), "Monday Mythic Night");
    snap.date = "2025-11-06".into();
    snap.time = "20:00:00".into();
    snap.signups.push(signup("Arthas", "Paladin", Role::Tank, "Protection"));
    snap
}

pub fn signup(character: &str, class: &str, role: Role, spec: &str) -> Signup {
    Signup {
        character: character.into(),
        realm: "tarren-mill".into(),
        class: class.into(),
        role,
        spec: spec.into(),
        status: SignupStatus::Signed,
    }
}
