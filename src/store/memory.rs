//! In-memory ledger used by tests and scenario simulations.
//!
//! A single `RwLock` over the whole document tree: every write holds the
//! write guard, so `update` batches and `transaction` closures are trivially
//! atomic. The optimistic retry loop a remote store would need degenerates
//! to one attempt here.

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::{push_key, split_path, BatchUpdate, LedgerStore, StoreError, TxApply, TxResult};

#[derive(Default)]
pub struct MemoryLedger {
    root: RwLock<Value>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
        }
    }

    /// Snapshot of the whole tree, handy for test assertions.
    pub fn snapshot(&self) -> Value {
        self.root.read().clone()
    }
}

fn node_at<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for seg in segments {
        current = current.as_object()?.get(*seg)?;
    }
    Some(current)
}

/// Write `value` at the path, creating intermediate objects. A null value
/// deletes the node and prunes any parents left empty, mirroring how the
/// remote store drops empty nodes.
fn write_at(root: &mut Value, segments: &[&str], value: Value) {
    if value.is_null() {
        delete_at(root, segments);
        return;
    }
    let mut current = root;
    for seg in &segments[..segments.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Some(map) = current.as_object_mut() else {
            return;
        };
        current = map
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(segments[segments.len() - 1].to_string(), value);
    }
}

fn delete_at(root: &mut Value, segments: &[&str]) {
    fn recurse(node: &mut Value, segments: &[&str]) -> bool {
        let Some(map) = node.as_object_mut() else {
            return false;
        };
        if segments.len() == 1 {
            map.remove(segments[0]);
        } else if let Some(child) = map.get_mut(segments[0]) {
            let prune = recurse(child, &segments[1..]);
            if prune {
                map.remove(segments[0]);
            }
        }
        map.is_empty()
    }
    recurse(root, segments);
}

impl LedgerStore for MemoryLedger {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = split_path(path)?;
        Ok(node_at(&self.root.read(), &segments).cloned())
    }

    fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        write_at(&mut self.root.write(), &segments, value.clone());
        Ok(())
    }

    fn update(&self, batch: &BatchUpdate) -> Result<(), StoreError> {
        // Validate every path before touching the tree so a bad entry
        // cannot leave the batch half-applied.
        let mut parsed = Vec::with_capacity(batch.len());
        for (path, value) in batch.entries() {
            parsed.push((split_path(path)?, value.clone()));
        }
        let mut root = self.root.write();
        for (segments, value) in parsed {
            write_at(&mut root, &segments, value);
        }
        Ok(())
    }

    fn transaction(&self, path: &str, apply: TxApply) -> Result<TxResult, StoreError> {
        let segments = split_path(path)?;
        let mut root = self.root.write();
        let current = node_at(&root, &segments).cloned();
        match apply(current.as_ref()) {
            None => Ok(TxResult {
                committed: false,
                value: current,
            }),
            Some(next) => {
                let stored = if next.is_null() { None } else { Some(next.clone()) };
                write_at(&mut root, &segments, next);
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
        let segments = split_path(path)?;
        delete_at(&mut self.root.write(), &segments);
        Ok(())
    }
}
