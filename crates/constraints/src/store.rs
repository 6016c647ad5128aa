//! SQLite-backed reference store for constraint state.
//! Keep code tiny and predictable.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use metrics::histogram;
use uuid::Uuid;

use crate::{ConstraintState, ConstraintStatus, ConstraintStore};
use steward_core::ResourceId;

/// One row per gate uid; `store` overwrites the whole row. Writes serialize
/// on the connection mutex, which is the single-writer guarantee the state
/// machine assumes.
pub struct SqliteConstraintStore {
    db: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteConstraintStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("STEWARD_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path)
            .with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        db.pragma_update(None, "synchronous", &"NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS constraint_state (
                uid         BLOB PRIMARY KEY,
                resource_id TEXT NOT NULL,
                version     TEXT NOT NULL,
                status      TEXT NOT NULL,
                created_ts  INTEGER NOT NULL,
                judged_by   TEXT,
                judged_ts   INTEGER
            )",
            [],
        )
        .context("creating constraint_state table")?;
        let me = Self { db: std::sync::Mutex::new(db) };
        histogram!("constraint_store_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(me)
    }
}

fn ts_to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| anyhow!("timestamp out of range: {ts}"))
}

impl ConstraintStore for SqliteConstraintStore {
    fn get_by_uid(&self, uid: Uuid) -> Result<Option<ConstraintState>> {
        let started = std::time::Instant::now();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT resource_id, version, status, created_ts, judged_by, judged_ts
             FROM constraint_state WHERE uid = ?1",
        )?;
        let mut rows = stmt.query([uid.as_bytes().as_slice()])?;
        let out = match rows.next()? {
            None => None,
            Some(row) => {
                let resource_id: String = row.get(0)?;
                let version: String = row.get(1)?;
                let status: String = row.get(2)?;
                let created_ts: i64 = row.get(3)?;
                let judged_by: Option<String> = row.get(4)?;
                let judged_ts: Option<i64> = row.get(5)?;
                let status = status
                    .parse::<ConstraintStatus>()
                    .map_err(|e| anyhow!("stored status for {uid}: {e}"))?;
                Some(ConstraintState {
                    uid,
                    resource_id: ResourceId::from_raw(resource_id),
                    version,
                    status,
                    created_at: ts_to_datetime(created_ts)?,
                    judged_by,
                    judged_at: judged_ts.map(ts_to_datetime).transpose()?,
                })
            }
        };
        histogram!("constraint_store_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    fn store(&self, state: &ConstraintState) -> Result<()> {
        let started = std::time::Instant::now();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR REPLACE INTO constraint_state
             (uid, resource_id, version, status, created_ts, judged_by, judged_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                state.uid.as_bytes().as_slice(),
                state.resource_id.as_str(),
                &state.version,
                state.status.as_str(),
                state.created_at.timestamp(),
                state.judged_by.as_deref(),
                state.judged_at.map(|t| t.timestamp()),
            ),
        )
        .context("storing constraint state")?;
        histogram!("constraint_store_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".steward");
        let _ = std::fs::create_dir_all(&p);
        p.push("steward.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "steward.db".to_string()
}
