use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use thiserror::Error;

use raidsync_core::{ManualClock, Timestamp};
use raidsync_engine::{BridgeAgent, Engine, EngineConfig, EngineError, SyncReport};
use raidsync_storage::{SqliteStorage, StorageError};

use crate::MemorySource;

pub const START: Timestamp = Timestamp::from_secs(1_762_000_000);

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A client and a bridge sharing one database file and one manual clock.
pub struct TestSetup {
    pub clock: Arc<ManualClock>,
    pub client: Engine,
    pub bridge: BridgeAgent,
    pub source: MemorySource,
    config: EngineConfig,
    dir: TempDir,
}

impl TestSetup {
    pub fn new(local_actor: &str) -> Result<Self, HarnessError> {
        Self::with_config(EngineConfig::default().with_local_actor(local_actor))
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, HarnessError> {
        let dir = tempfile::tempdir()?;
        let clock = Arc::new(ManualClock::new(START));
        let path = dir.path().join("raidsync.db");
        let client = Engine::new(config.clone(), SqliteStorage::open(&path)?, clock.clone())?;
        let bridge = BridgeAgent::new(SqliteStorage::open(&path)?, clock.clone());
        Ok(Self {
            clock,
            client,
            bridge,
            source: MemorySource::new(),
            config,
            dir,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("raidsync.db")
    }

    pub fn now(&self) -> Timestamp {
        use raidsync_core::Clock;
        self.clock.now().unwrap_or(START)
    }

    pub fn advance(&self, secs: i64) -> Timestamp {
        self.clock.advance(secs)
    }

    /// One bridge pass against the in-memory source.
    pub fn sync(&mut self) -> Result<SyncReport, EngineError> {
        self.bridge.sync_once(&mut self.source)
    }

    /// Replaces the client with a fresh process on the same database.
    pub fn restart_client(&mut self) -> Result<(), HarnessError> {
        let storage = SqliteStorage::open(self.db_path())?;
        self.client = Engine::new(self.config.clone(), storage, self.clock.clone())?;
        Ok(())
    }
}
