use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::debug;

use raidsync_core::{
    BridgeRecord, Command, CommandId, CommandPayload, EventId, Signup, Snapshot, Timestamp,
};

use crate::error::StorageError;
use crate::traits::{ReplaceOutcome, Storage};

const SNAPSHOT_COLUMNS: &str = "event_id, title, date, time, owner, log_url, signups";

type SnapshotRow = (i64, String, String, String, String, Option<String>, Vec<u8>);

fn snapshot_row(row: &rusqlite::Row) -> rusqlite::Result<SnapshotRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_snapshot(row: SnapshotRow) -> Result<Snapshot, StorageError> {
    let (event_id, title, date, time, owner, log_url, signups_bytes) = row;
    let signups: Vec<Signup> = rmp_serde::from_slice(&signups_bytes)?;
    Ok(Snapshot {
        event_id: EventId::new(event_id),
        title,
        date,
        time,
        owner,
        log_url,
        signups,
    })
}

fn write_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<(), StorageError> {
    let signups = rmp_serde::to_vec(&snapshot.signups)?;
    conn.execute(
        "INSERT INTO events (event_id, title, date, time, owner, log_url, signups) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(event_id) DO UPDATE SET title = excluded.title, date = excluded.date, time = excluded.time,
             owner = excluded.owner, log_url = excluded.log_url, signups = excluded.signups",
        rusqlite::params![
            snapshot.event_id.get(),
            snapshot.title,
            snapshot.date,
            snapshot.time,
            snapshot.owner,
            snapshot.log_url,
            signups,
        ],
    )?;
    Ok(())
}

fn read_last_update(conn: &Connection) -> Result<Timestamp, StorageError> {
    let secs: i64 = conn.query_row("SELECT last_update FROM store_meta WHERE id = 1", [], |row| {
        row.get(0)
    })?;
    Ok(Timestamp::from_secs(secs))
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Write transactions take the write lock at `BEGIN`, so a commit from the
    /// other process can never land between a read and the write that follows it.
    fn write_tx(&mut self) -> Result<Transaction<'_>, StorageError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

impl Storage for SqliteStorage {
    fn upsert_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let tx = self.write_tx()?;
        write_snapshot(&tx, snapshot)?;
        tx.commit()?;
        debug!(event_id = %snapshot.event_id, "snapshot upserted");
        Ok(())
    }

    fn import_snapshot(
        &mut self,
        snapshot: &Snapshot,
        at: Timestamp,
    ) -> Result<Timestamp, StorageError> {
        let tx = self.write_tx()?;
        write_snapshot(&tx, snapshot)?;
        tx.execute(
            "UPDATE store_meta SET last_update = MAX(last_update, ?1) WHERE id = 1",
            rusqlite::params![at.as_secs()],
        )?;
        let last_update = read_last_update(&tx)?;
        tx.commit()?;
        Ok(last_update)
    }

    fn get_snapshot(&self, event_id: EventId) -> Result<Option<Snapshot>, StorageError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM events WHERE event_id = ?1"),
                rusqlite::params![event_id.get()],
                snapshot_row,
            )
            .optional()?;
        row.map(into_snapshot).transpose()
    }

    fn list_snapshots(&self) -> Result<Vec<Snapshot>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM events ORDER BY date, time, event_id"
        ))?;
        let rows = stmt
            .query_map([], snapshot_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_snapshot).collect()
    }

    fn snapshot_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn delete_snapshot(&mut self, event_id: EventId) -> Result<bool, StorageError> {
        let deleted = self.conn.execute(
            "DELETE FROM events WHERE event_id = ?1",
            rusqlite::params![event_id.get()],
        )?;
        Ok(deleted > 0)
    }

    fn delete_snapshots_before(&mut self, date: &str) -> Result<usize, StorageError> {
        let deleted = self.conn.execute(
            "DELETE FROM events WHERE date <> '' AND date < ?1",
            rusqlite::params![date],
        )?;
        Ok(deleted)
    }

    fn replace_snapshots_if_newer(
        &mut self,
        snapshots: &[Snapshot],
        last_update: Timestamp,
    ) -> Result<ReplaceOutcome, StorageError> {
        let tx = self.write_tx()?;
        let local = read_last_update(&tx)?;
        if last_update <= local {
            return Ok(ReplaceOutcome::Stale { local });
        }
        tx.execute("DELETE FROM events", [])?;
        for snapshot in snapshots {
            write_snapshot(&tx, snapshot)?;
        }
        tx.execute(
            "UPDATE store_meta SET last_update = ?1 WHERE id = 1",
            rusqlite::params![last_update.as_secs()],
        )?;
        tx.commit()?;
        Ok(ReplaceOutcome::Replaced {
            events: snapshots.len(),
        })
    }

    fn last_update(&self) -> Result<Timestamp, StorageError> {
        read_last_update(&self.conn)
    }

    fn append_command(
        &mut self,
        event_id: EventId,
        timestamp: Timestamp,
        payload: &CommandPayload,
    ) -> Result<Command, StorageError> {
        let payload_bytes = payload.to_msgpack()?;
        let tx = self.write_tx()?;
        let last: i64 = tx.query_row(
            "SELECT last_command_id FROM store_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        let id = CommandId::new(last as u64).next();
        tx.execute(
            "INSERT INTO command_queue (command_id, kind, event_id, created_at, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                id.get() as i64,
                payload.kind().as_str(),
                event_id.get(),
                timestamp.as_secs(),
                payload_bytes,
            ],
        )?;
        tx.execute(
            "UPDATE store_meta SET last_command_id = ?1 WHERE id = 1",
            rusqlite::params![id.get() as i64],
        )?;
        tx.commit()?;
        Ok(Command {
            id,
            event_id,
            timestamp,
            payload: payload.clone(),
        })
    }

    fn pending_commands(&self) -> Result<Vec<Command>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT command_id, event_id, created_at, payload FROM command_queue ORDER BY command_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(rows.len());
        for (id, event_id, created_at, payload_bytes) in rows {
            result.push(Command {
                id: CommandId::new(id as u64),
                event_id: EventId::new(event_id),
                timestamp: Timestamp::from_secs(created_at),
                payload: CommandPayload::from_msgpack(&payload_bytes)?,
            });
        }
        Ok(result)
    }

    fn remove_command(&mut self, command_id: CommandId) -> Result<bool, StorageError> {
        let deleted = self.conn.execute(
            "DELETE FROM command_queue WHERE command_id = ?1",
            rusqlite::params![command_id.get() as i64],
        )?;
        Ok(deleted > 0)
    }

    fn remove_commands_before(&mut self, before: Timestamp) -> Result<usize, StorageError> {
        let deleted = self.conn.execute(
            "DELETE FROM command_queue WHERE created_at < ?1",
            rusqlite::params![before.as_secs()],
        )?;
        Ok(deleted)
    }

    fn last_command_id(&self) -> Result<CommandId, StorageError> {
        let last: i64 = self.conn.query_row(
            "SELECT last_command_id FROM store_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(CommandId::new(last as u64))
    }

    fn read_bridge_record(&self) -> Result<Option<BridgeRecord>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT heartbeat, last_update, events FROM bridge_record WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((heartbeat, last_update, events_bytes)) => Ok(Some(BridgeRecord {
                heartbeat: Timestamp::from_secs(heartbeat),
                last_update: Timestamp::from_secs(last_update),
                events: rmp_serde::from_slice(&events_bytes)?,
            })),
            None => Ok(None),
        }
    }

    fn write_bridge_record(&mut self, record: &BridgeRecord) -> Result<(), StorageError> {
        let events = rmp_serde::to_vec(&record.events)?;
        self.conn.execute(
            "INSERT INTO bridge_record (id, heartbeat, last_update, events) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET heartbeat = excluded.heartbeat, last_update = excluded.last_update, events = excluded.events",
            rusqlite::params![
                record.heartbeat.as_secs(),
                record.last_update.as_secs(),
                events,
            ],
        )?;
        debug!(
            heartbeat = %record.heartbeat,
            events = record.events.len(),
            "bridge record written"
        );
        Ok(())
    }

    fn bridge_heartbeat(&self) -> Result<Option<Timestamp>, StorageError> {
        let secs: Option<i64> = self
            .conn
            .query_row(
                "SELECT heartbeat FROM bridge_record WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(secs.map(Timestamp::from_secs))
    }

    fn last_seen_heartbeat(&self) -> Result<Option<Timestamp>, StorageError> {
        let secs: Option<i64> = self.conn.query_row(
            "SELECT last_seen_heartbeat FROM store_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(secs.map(Timestamp::from_secs))
    }

    fn record_heartbeat(&mut self, heartbeat: Timestamp) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE store_meta SET last_seen_heartbeat = ?1 WHERE id = 1",
            rusqlite::params![heartbeat.as_secs()],
        )?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), StorageError> {
        let tx = self.write_tx()?;
        tx.execute("DELETE FROM events", [])?;
        tx.execute("DELETE FROM command_queue", [])?;
        tx.execute(
            "UPDATE store_meta SET last_update = 0, last_seen_heartbeat = NULL WHERE id = 1",
            [],
        )?;
        tx.commit()?;
        debug!("store reset");
        Ok(())
    }
}
