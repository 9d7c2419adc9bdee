//! SQLite op journal.
//!
//! `events` holds one row per committed op, `snapshots` holds checkpointed
//! store images and `meta` holds the owning namespace plus the durable seq.
//! Every op up to the durable seq is either in `events` or covered by a
//! snapshot, and appends have to continue it exactly.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    core::store::{StoreSnapshotV1, TodoStore},
    op::{now_ms, StoredOp, StoredOpEnvelope, OP_FORMAT_VERSION},
    types::OpSeq,
};

use super::{OpSink, PersistError, PersistResult};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;
const META_NAMESPACE: &str = "namespace";
const META_DURABLE_SEQ: &str = "durable_seq";

#[derive(Serialize)]
struct SnapshotOut<'a> {
    format_version: u16,
    snapshot: &'a StoreSnapshotV1,
}

#[derive(Deserialize)]
struct SnapshotIn {
    format_version: u16,
    snapshot: StoreSnapshotV1,
}

/// Journal stored in a single SQLite file.
pub struct SqliteOpSink {
    conn: Connection,
}

impl SqliteOpSink {
    /// Opens the journal at `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(journal_mode = %mode, "journal opened");
        Ok(Self { conn })
    }

    /// Binds the journal to `namespace` (`project/collection`).
    ///
    /// A fresh journal records the namespace; an existing one must match.
    pub fn claim_namespace(&mut self, namespace: &str) -> PersistResult<()> {
        match read_meta(&self.conn, META_NAMESPACE)? {
            Some(found) if found != namespace => Err(PersistError::ForeignJournal {
                expected: namespace.to_string(),
                found,
            }),
            Some(_) => Ok(()),
            None => write_meta(&self.conn, META_NAMESPACE, namespace),
        }
    }

    /// Highest seq the journal holds without gaps. `0` when fresh.
    pub fn durable_seq(&self) -> PersistResult<OpSeq> {
        read_durable_seq(&self.conn)
    }

    /// Rebuilds the store from the newest snapshot and every later op.
    pub fn load_store(&self) -> PersistResult<TodoStore> {
        let mut store = match self.newest_snapshot()? {
            Some(snapshot) => TodoStore::from_snapshot(snapshot)?,
            None => TodoStore::new(),
        };

        let mut stmt = self
            .conn
            .prepare("SELECT seq, payload FROM events WHERE seq > ?1 ORDER BY seq")?;
        let mut rows = stmt.query(params![store.latest_op_seq() as i64])?;
        while let Some(row) = rows.next()? {
            let seq = row.get::<_, i64>(0)? as OpSeq;
            let expected = store.latest_op_seq() + 1;
            if seq != expected {
                return Err(PersistError::SeqGap { expected, found: seq });
            }
            let stored = decode_op(&row.get::<_, Vec<u8>>(1)?)?;
            if stored.seq != seq {
                return Err(PersistError::Corrupt(format!(
                    "row {seq} holds op {}",
                    stored.seq
                )));
            }
            store.apply_replayed_op(stored)?;
        }
        Ok(store)
    }

    fn newest_snapshot(&self) -> PersistResult<Option<StoreSnapshotV1>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots ORDER BY last_seq DESC, id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        let stored: SnapshotIn = serde_json::from_slice(&payload)?;
        if stored.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::UnsupportedFormat {
                what: "snapshot",
                version: stored.format_version,
            });
        }
        Ok(Some(stored.snapshot))
    }
}

impl OpSink for SqliteOpSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        let tx = self.conn.transaction()?;
        let mut durable = read_durable_seq(&tx)?;
        {
            let mut insert = tx.prepare_cached("INSERT INTO events(seq, payload) VALUES (?1, ?2)")?;
            for stored in ops {
                if stored.seq != durable + 1 {
                    return Err(PersistError::SeqGap {
                        expected: durable + 1,
                        found: stored.seq,
                    });
                }
                let payload = serde_json::to_vec(&StoredOpEnvelope::new(stored.clone()))?;
                insert.execute(params![stored.seq as i64, payload])?;
                durable = stored.seq;
            }
        }
        write_meta(&tx, META_DURABLE_SEQ, &durable.to_string())?;
        tx.commit()?;
        Ok(durable)
    }

    fn checkpoint(
        &mut self,
        snapshot: &StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
    ) -> PersistResult<usize> {
        let tx = self.conn.transaction()?;
        let payload = serde_json::to_vec(&SnapshotOut {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot,
        })?;
        tx.execute(
            "INSERT INTO snapshots(last_seq, ts_ms, payload) VALUES (?1, ?2, ?3)",
            params![last_seq as i64, now_ms() as i64, payload],
        )?;

        let removed = if compact {
            tx.execute("DELETE FROM snapshots WHERE last_seq < ?1", params![last_seq as i64])?;
            tx.execute("DELETE FROM events WHERE seq <= ?1", params![last_seq as i64])?
        } else {
            0
        };

        // A snapshot vouches for every op it covers.
        if last_seq > read_durable_seq(&tx)? {
            write_meta(&tx, META_DURABLE_SEQ, &last_seq.to_string())?;
        }
        tx.commit()?;
        Ok(removed)
    }
}

fn read_meta(conn: &Connection, key: &str) -> PersistResult<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?)
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> PersistResult<()> {
    conn.execute(
        "INSERT INTO meta(key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn read_durable_seq(conn: &Connection) -> PersistResult<OpSeq> {
    match read_meta(conn, META_DURABLE_SEQ)? {
        Some(raw) => raw
            .parse()
            .map_err(|_| PersistError::Corrupt(format!("durable seq {raw:?}"))),
        None => Ok(0),
    }
}

fn decode_op(payload: &[u8]) -> PersistResult<StoredOp> {
    let envelope: StoredOpEnvelope = serde_json::from_slice(payload)?;
    if envelope.format_version != OP_FORMAT_VERSION {
        return Err(PersistError::UnsupportedFormat {
            what: "op",
            version: envelope.format_version,
        });
    }
    Ok(envelope.stored)
}
