//! SQLite record of a session: run registry, event log, checksum log
//! and periodic savegames.
//!
//! RULES:
//!   - Only this module executes SQL; the engine calls its methods.
//!   - The store is output only. Simulation state never reads from it
//!     mid-run, so a peer with a store and a peer without one stay in sync.
//!   - Savegames are opaque CBOR blobs here; decoding is snapshot.rs's job.

use rusqlite::{params, Connection, OptionalExtension};
use crate::{
    checksum::{Checksum, DIGEST_LEN},
    error::{SimError, SimResult},
    event::EventLogEntry,
    types::{Seed, SimTime},
};

pub struct SimStore {
    conn: Connection,
}

impl SimStore {
    /// Open (or create) the simulation database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        // Lets sim-runner's summary queries read while a run is writing.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// A throwaway database for tests and storeless tooling.
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Create the schema. Safe to run against an existing database.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    /// Register a run. Registering the same run again (a resumed
    /// session) is a no-op.
    pub fn insert_run(&self, run_id: &str, seed: Seed, version: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO run (run_id, seed, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, seed, version, 0i64],
        )?;
        Ok(())
    }

    pub fn run_seed(&self, run_id: &str) -> SimResult<Option<Seed>> {
        let seed = self
            .conn
            .query_row(
                "SELECT seed FROM run WHERE run_id = ?1",
                params![run_id],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(seed)
    }

    /// Forget everything a run recorded after `tick`. A run resumed from
    /// an older savegame replays those ticks and records them again.
    pub fn truncate_run_after(&self, run_id: &str, tick: SimTime) -> SimResult<()> {
        for table in ["event_log", "checksum_log", "snapshot"] {
            self.conn.execute(
                &format!("DELETE FROM {table} WHERE run_id = ?1 AND tick > ?2"),
                params![run_id, tick as i64],
            )?;
        }
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, tick, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.run_id,
                entry.tick as i64,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_tick(&self, run_id: &str, tick: SimTime) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, tick, event_type, payload
             FROM event_log WHERE run_id = ?1 AND tick = ?2
             ORDER BY id ASC"
        )?;
        let entries = stmt.query_map(params![run_id, tick as i64], |row| {
            Ok(EventLogEntry {
                id:         Some(row.get(0)?),
                run_id:     row.get(1)?,
                tick:       row.get::<_, i64>(2)? as u64,
                event_type: row.get(3)?,
                payload:    row.get(4)?,
            })
        })?.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn count_events(&self, run_id: &str, event_type: &str) -> SimResult<u64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as u64)
    }

    // ── Checksums ──────────────────────────────────────────────

    pub fn record_checksum(&self, run_id: &str, tick: SimTime, digest: &Checksum) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO checksum_log (run_id, tick, digest) VALUES (?1, ?2, ?3)",
            params![run_id, tick as i64, digest.to_string()],
        )?;
        Ok(())
    }

    pub fn checksums_for_run(&self, run_id: &str) -> SimResult<Vec<(SimTime, Checksum)>> {
        let mut stmt = self.conn.prepare(
            "SELECT tick, digest FROM checksum_log WHERE run_id = ?1 ORDER BY tick ASC"
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?))
        })?.collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(tick, digest)| Ok((tick, parse_digest(&digest)?)))
            .collect()
    }

    // ── Snapshot ───────────────────────────────────────────────

    pub fn save_snapshot(&self, run_id: &str, tick: SimTime, savegame: &[u8]) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO snapshot (run_id, tick, savegame) VALUES (?1, ?2, ?3)",
            params![run_id, tick as i64, savegame],
        )?;
        Ok(())
    }

    pub fn latest_snapshot_before(
        &self, run_id: &str, tick: SimTime
    ) -> SimResult<Option<(SimTime, Vec<u8>)>> {
        let result = self.conn.query_row(
            "SELECT tick, savegame FROM snapshot
             WHERE run_id = ?1 AND tick <= ?2
             ORDER BY tick DESC LIMIT 1",
            params![run_id, tick as i64],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, Vec<u8>>(1)?)),
        ).optional()?;
        Ok(result)
    }
}

fn parse_digest(text: &str) -> SimResult<Checksum> {
    let bytes = hex::decode(text)
        .map_err(|e| SimError::MalformedState(format!("checksum '{text}': {e}")))?;
    let bytes: [u8; DIGEST_LEN] = bytes
        .try_into()
        .map_err(|_| SimError::MalformedState(format!("checksum '{text}' has the wrong length")))?;
    Ok(Checksum(bytes))
}
