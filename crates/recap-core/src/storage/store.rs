use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRow {
    pub id: String,
    pub parent_id: Option<String>,
    pub experiment: String,
    pub name: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}

const RUN_COLUMNS: &str = "id, parent_id, experiment, name, status, started_at, finished_at";

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        experiment: row.get(2)?,
        name: row.get(3)?,
        status: row.get(4)?,
        started_at: row.get(5)?,
        finished_at: row.get(6)?,
    })
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        // Parallel readers while a batch writes.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    // runs
    pub fn insert_run(&self, run: &RunRow) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO runs(id, parent_id, experiment, name, status, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.id,
                run.parent_id,
                run.experiment,
                run.name,
                run.status,
                run.started_at,
                run.finished_at
            ],
        )?;
        Ok(())
    }

    pub fn finish_run(&self, id: &str, status: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status, now_rfc3339(), id],
        )?;
        if n == 0 {
            anyhow::bail!("run not found: {}", id);
        }
        Ok(())
    }

    pub fn get_run(&self, id: &str) -> anyhow::Result<Option<RunRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"))?;
        Ok(stmt.query_row(params![id], run_from_row).optional()?)
    }

    /// Runs ordered by start time, optionally restricted to one experiment.
    pub fn list_runs(&self, experiment: Option<&str>) -> anyhow::Result<Vec<RunRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs
             WHERE (?1 IS NULL OR experiment = ?1)
             ORDER BY started_at, rowid"
        ))?;
        let rows = stmt.query_map(params![experiment], run_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn child_runs(&self, parent_id: &str) -> anyhow::Result<Vec<RunRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE parent_id = ?1 ORDER BY name"
        ))?;
        let rows = stmt.query_map(params![parent_id], run_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    // params
    pub fn put_params(&self, run_id: &str, params_map: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO params(run_id, key, value) VALUES (?1, ?2, ?3)",
            )?;
            for (k, v) in params_map {
                stmt.execute(params![run_id, k, v])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_params(&self, run_id: &str) -> anyhow::Result<BTreeMap<String, String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key, value FROM params WHERE run_id = ?1")?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = BTreeMap::new();
        for r in rows {
            let (k, v) = r?;
            out.insert(k, v);
        }
        Ok(out)
    }

    // metrics
    pub fn put_metric(&self, run_id: &str, key: &str, value: f64, step: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO metrics(run_id, key, value, step, logged_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, key, value, step, now_rfc3339()],
        )?;
        Ok(())
    }

    /// Latest value per metric key (highest step, then latest insert).
    pub fn latest_metrics(&self, run_id: &str) -> anyhow::Result<BTreeMap<String, f64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT key, value FROM metrics WHERE run_id = ?1 ORDER BY step, id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut out = BTreeMap::new();
        for r in rows {
            let (k, v) = r?;
            out.insert(k, v);
        }
        Ok(out)
    }

    // llm response cache
    pub fn get_cached_response(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT response_text FROM llm_cache WHERE key = ?1")?;
        Ok(stmt
            .query_row(params![key], |row| row.get::<_, String>(0))
            .optional()?)
    }

    pub fn put_cached_response(&self, key: &str, model: &str, text: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO llm_cache(key, model, response_text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, model, text, now_rfc3339()],
        )?;
        Ok(())
    }

    // embeddings
    pub fn get_embedding(&self, key: &str) -> anyhow::Result<Option<(String, Vec<f32>)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT model, vec FROM embeddings WHERE key = ?1 LIMIT 1")?;
        let mut rows = stmt.query(params![key])?;

        if let Some(row) = rows.next()? {
            let model: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok(Some((model, decode_vec_f32(&blob)?)))
        } else {
            Ok(None)
        }
    }

    pub fn put_embedding(&self, key: &str, model: &str, vec: &[f32]) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let blob = encode_vec_f32(vec);
        let dims = vec.len() as i64;

        conn.execute(
            "INSERT OR REPLACE INTO embeddings (key, model, dims, vec, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, model, dims, blob, now_rfc3339()],
        )?;
        Ok(())
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn encode_vec_f32(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn decode_vec_f32(blob: &[u8]) -> anyhow::Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        anyhow::bail!("embedding blob length {} is not a multiple of 4", blob.len());
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    fn run(id: &str, parent: Option<&str>, name: &str) -> RunRow {
        RunRow {
            id: id.into(),
            parent_id: parent.map(str::to_string),
            experiment: "exp".into(),
            name: name.into(),
            status: "running".into(),
            started_at: now_rfc3339(),
            finished_at: None,
        }
    }

    #[test]
    fn run_lifecycle() {
        let s = store();
        s.insert_run(&run("p", None, "batch")).unwrap();
        s.insert_run(&run("c2", Some("p"), "b_child")).unwrap();
        s.insert_run(&run("c1", Some("p"), "a_child")).unwrap();
        s.finish_run("c1", "finished").unwrap();

        let c1 = s.get_run("c1").unwrap().unwrap();
        assert_eq!(c1.status, "finished");
        assert!(c1.finished_at.is_some());

        let children: Vec<String> = s.child_runs("p").unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(children, vec!["a_child", "b_child"]);
        assert_eq!(s.list_runs(Some("exp")).unwrap().len(), 3);
        assert!(s.list_runs(Some("other")).unwrap().is_empty());
        assert!(s.finish_run("missing", "failed").is_err());
    }

    #[test]
    fn params_and_latest_metrics() {
        let s = store();
        s.insert_run(&run("r", None, "x")).unwrap();
        let mut p = BTreeMap::new();
        p.insert("a".to_string(), "1".to_string());
        s.put_params("r", &p).unwrap();
        p.insert("a".to_string(), "2".to_string());
        s.put_params("r", &p).unwrap();
        assert_eq!(s.get_params("r").unwrap()["a"], "2");

        s.put_metric("r", "f1", 0.25, 0).unwrap();
        s.put_metric("r", "f1", 0.5, 1).unwrap();
        s.put_metric("r", "n", 3.0, 0).unwrap();
        let m = s.latest_metrics("r").unwrap();
        assert_eq!(m["f1"], 0.5);
        assert_eq!(m["n"], 3.0);
    }

    #[test]
    fn caches_roundtrip() {
        let s = store();
        assert!(s.get_cached_response("k").unwrap().is_none());
        s.put_cached_response("k", "m", "text").unwrap();
        assert_eq!(s.get_cached_response("k").unwrap().as_deref(), Some("text"));

        s.put_embedding("e", "m", &[1.0, -0.5]).unwrap();
        assert_eq!(
            s.get_embedding("e").unwrap(),
            Some(("m".to_string(), vec![1.0, -0.5]))
        );
    }

    #[test]
    fn rejects_truncated_blob() {
        assert!(decode_vec_f32(&[0, 0, 0]).is_err());
    }

    #[test]
    fn opens_file_db_in_new_dir() {
        let dir = tempfile::tempdir().unwrap();
        let s = Store::open(&dir.path().join("nested/recap.db")).unwrap();
        s.init_schema().unwrap();
        s.insert_run(&run("r", None, "x")).unwrap();
        assert!(dir.path().join("nested/recap.db").exists());
    }
}
