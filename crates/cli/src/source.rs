//! A source of truth backed by a directory of event documents, one
//! `*.json` file per event. Applied commands are written back in place.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use raidsync_core::{Command, Snapshot, codec};
use raidsync_engine::{SourceError, SourceOfTruth, apply_to_snapshot};

pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn documents(&self) -> Result<Vec<PathBuf>, SourceError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            SourceError::Unavailable(format!("cannot read {}: {e}", self.dir.display()))
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn load(path: &Path) -> Result<Snapshot, SourceError> {
        let text = fs::read_to_string(path)
            .map_err(|e| SourceError::Unavailable(format!("cannot read {}: {e}", path.display())))?;
        codec::parse_snapshot(&text)
            .map_err(|e| SourceError::Rejected(format!("{}: {e}", path.display())))
    }
}

impl SourceOfTruth for DirSource {
    fn fetch_snapshots(&mut self) -> Result<Vec<Snapshot>, SourceError> {
        let mut events = Vec::new();
        for path in self.documents()? {
            match Self::load(&path) {
                Ok(snapshot) => events.push(snapshot),
                Err(SourceError::Rejected(reason)) => warn!(%reason, "skipping event document"),
                Err(e) => return Err(e),
            }
        }
        Ok(events)
    }

    fn apply(&mut self, command: &Command) -> Result<(), SourceError> {
        for path in self.documents()? {
            let Ok(mut snapshot) = Self::load(&path) else {
                continue;
            };
            if snapshot.event_id != command.event_id {
                continue;
            }
            apply_to_snapshot(&mut snapshot, command)?;
            return fs::write(&path, codec::render_snapshot(&snapshot)).map_err(|e| {
                SourceError::Unavailable(format!("cannot write {}: {e}", path.display()))
            });
        }
        Err(SourceError::Rejected(format!("unknown event {}", command.event_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raidsync_core::{CommandId, CommandPayload, EventId, SignupStatus, Timestamp};

    const DOC: &str = r#"{"id": 42, "title": "Monday Mythic Night", "date": "2025-11-06",
        "signups": [{"character": "Arthas", "class": "Paladin", "role": "tank"}]}"#;

    #[test]
    fn reads_documents_and_writes_back_changes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("42.json"), DOC).unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = DirSource::new(dir.path());
        let events = source.fetch_snapshots().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, EventId::new(42));

        let cmd = Command {
            id: CommandId::new(1),
            event_id: EventId::new(42),
            timestamp: Timestamp::from_secs(1),
            payload: CommandPayload::ChangeStatus {
                character: "Arthas".into(),
                status: SignupStatus::Late,
            },
        };
        source.apply(&cmd).unwrap();
        let events = source.fetch_snapshots().unwrap();
        assert_eq!(events[0].signups[0].status, SignupStatus::Late);

        let other = Command {
            event_id: EventId::new(7),
            ..cmd
        };
        assert!(matches!(source.apply(&other), Err(SourceError::Rejected(_))));
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let mut source = DirSource::new("/nonexistent/raidsync/events");
        assert!(matches!(
            source.fetch_snapshots(),
            Err(SourceError::Unavailable(_))
        ));
    }
}
