//! SQLite-backed ledger.
//!
//! The document tree is flattened to one row per leaf path; subtree reads
//! reassemble nested objects from a prefix scan. A mutex over the
//! connection serializes writers, which is what gives `transaction` and
//! `update` their atomicity guarantees in-process, and every trait call
//! runs inside one SQLite transaction so a crash can never half-apply a
//! batch.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::{Map, Value};

use super::{push_key, split_path, BatchUpdate, LedgerStore, StoreError, TxApply, TxResult};

pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn new(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS ledger (
                 path  TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ledger (
                 path  TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Escape LIKE wildcards in a path so user-supplied names cannot widen a
/// prefix scan.
fn like_prefix(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len() + 4);
    for c in path.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push_str("/%");
    escaped
}

/// Flatten a value into (leaf path, json) rows. Objects recurse; arrays and
/// scalars are stored whole; nulls and empty objects store nothing.
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&format!("{prefix}/{key}"), child, out);
            }
        }
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

/// Insert a leaf into a nested object under the given relative segments.
fn insert_nested(root: &mut Map<String, Value>, segments: &[&str], leaf: Value) {
    if segments.len() == 1 {
        root.insert(segments[0].to_string(), leaf);
        return;
    }
    let entry = root
        .entry(segments[0].to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Some(map) = entry.as_object_mut() {
        insert_nested(map, &segments[1..], leaf);
    }
}

fn read_node(conn: &Connection, path: &str) -> Result<Option<Value>, StoreError> {
    // Exact row first: the path addresses a stored leaf.
    let exact: Option<String> = conn
        .query_row("SELECT value FROM ledger WHERE path = ?1", [path], |row| {
            row.get(0)
        })
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    if let Some(raw) = exact {
        return Ok(Some(serde_json::from_str(&raw)?));
    }

    // Otherwise assemble the subtree from its leaves.
    let mut stmt =
        conn.prepare("SELECT path, value FROM ledger WHERE path LIKE ?1 ESCAPE '\\'")?;
    let rows = stmt.query_map([like_prefix(path)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let prefix_len = path.len() + 1;
    let mut tree = Map::new();
    let mut found = false;
    for row in rows {
        let (leaf_path, raw) = row?;
        let relative = &leaf_path[prefix_len..];
        let segments: Vec<&str> = relative.split('/').collect();
        insert_nested(&mut tree, &segments, serde_json::from_str(&raw)?);
        found = true;
    }
    if found {
        Ok(Some(Value::Object(tree)))
    } else {
        Ok(None)
    }
}

fn write_node(conn: &Connection, path: &str, value: &Value) -> Result<(), StoreError> {
    conn.execute("DELETE FROM ledger WHERE path = ?1", [path])?;
    conn.execute(
        "DELETE FROM ledger WHERE path LIKE ?1 ESCAPE '\\'",
        [like_prefix(path)],
    )?;
    let mut leaves = Vec::new();
    flatten(path, value, &mut leaves);
    let mut stmt = conn.prepare("INSERT INTO ledger (path, value) VALUES (?1, ?2)")?;
    for (leaf_path, raw) in leaves {
        stmt.execute(params![leaf_path, raw])?;
    }
    Ok(())
}

impl LedgerStore for SqliteLedger {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = split_path(path)?;
        let canonical = segments.join("/");
        let conn = self.conn.lock();
        read_node(&conn, &canonical)
    }

    fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        let canonical = segments.join("/");
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        write_node(&tx, &canonical, value)?;
        tx.commit()?;
        Ok(())
    }

    fn update(&self, batch: &BatchUpdate) -> Result<(), StoreError> {
        let mut parsed = Vec::with_capacity(batch.len());
        for (path, value) in batch.entries() {
            parsed.push((split_path(path)?.join("/"), value.clone()));
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (path, value) in &parsed {
            write_node(&tx, path, value)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn transaction(&self, path: &str, apply: TxApply) -> Result<TxResult, StoreError> {
        let segments = split_path(path)?;
        let canonical = segments.join("/");
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let current = read_node(&tx, &canonical)?;
        match apply(current.as_ref()) {
            None => {
                tx.commit()?;
                Ok(TxResult {
                    committed: false,
                    value: current,
                })
            }
            Some(next) => {
                let stored = if next.is_null() { None } else { Some(next.clone()) };
                write_node(&tx, &canonical, &next)?;
                tx.commit()?;
                Ok(TxResult {
                    committed: true,
                    value: stored,
                })
            }
        }
    }

    fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        let key = push_key(Utc::now().timestamp_millis());
        self.set(&format!("{}/{}", path.trim_end_matches('/'), key), value)?;
        Ok(key)
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.set(path, &Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subtree_assembly_matches_writes() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger
            .set(
                "users/alpha",
                &json!({"points": 100, "stock_multiplier": 1.5, "likes": 3}),
            )
            .unwrap();

        assert_eq!(ledger.get("users/alpha/points").unwrap(), Some(json!(100)));
        assert_eq!(
            ledger.get("users/alpha").unwrap(),
            Some(json!({"points": 100, "stock_multiplier": 1.5, "likes": 3}))
        );
    }

    #[test]
    fn arrays_survive_as_leaves() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let prizes = json!({"enabled": true, "prizes": [{"value": 100, "weight": 35.0}]});
        ledger.set("site_settings/spin_wheel_settings", &prizes).unwrap();
        assert_eq!(
            ledger.get("site_settings/spin_wheel_settings").unwrap(),
            Some(prizes)
        );
    }

    #[test]
    fn set_replaces_whole_subtree() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.set("wallets/u1", &json!({"cc": 10, "sp": 5.0})).unwrap();
        ledger.set("wallets/u1", &json!({"cc": 3})).unwrap();
        assert_eq!(ledger.get("wallets/u1").unwrap(), Some(json!({"cc": 3})));
    }

    #[test]
    fn batch_is_all_or_nothing_on_bad_path() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.set("wallets/u1/sp", &json!(10.0)).unwrap();

        let mut batch = BatchUpdate::new();
        batch.set("wallets/u1/sp", json!(99.0));
        batch.set("broken//path", json!(1));
        assert!(ledger.update(&batch).is_err());

        // First entry must not have been applied.
        assert_eq!(ledger.get("wallets/u1/sp").unwrap(), Some(json!(10.0)));
    }

    #[test]
    fn like_wildcards_in_names_do_not_widen_scans() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.set("users/a_c/points", &json!(1)).unwrap();
        ledger.set("users/abc/points", &json!(2)).unwrap();

        assert_eq!(ledger.get("users/a_c").unwrap(), Some(json!({"points": 1})));
        ledger.delete("users/a_c").unwrap();
        assert_eq!(ledger.get("users/abc/points").unwrap(), Some(json!(2)));
    }
}
