//! Ledger store contract.
//!
//! All economy state lives in a path-addressed document tree
//! (`wallets/{uid}/sp`, `users/{name}/points`, ...). Engines only see this
//! trait, so tests inject [`memory::MemoryLedger`] while the server runs on
//! [`sqlite::SqliteLedger`].
//!
//! Money fields are only ever mutated through [`LedgerStore::transaction`]
//! (single-path atomic read-modify-write) or [`LedgerStore::update`]
//! (multi-path all-or-nothing batch). A plain `get` followed by `set` on a
//! balance is a correctness bug.

pub mod memory;
pub mod paths;
pub mod sqlite;

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("malformed ledger path '{0}'")]
    BadPath(String),

    #[error("ledger backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(format!("stored value is not valid JSON: {err}"))
    }
}

/// A multi-path write applied as one indivisible operation.
///
/// A `Value::Null` entry deletes that path, mirroring the null-delete
/// convention of document databases.
#[derive(Debug, Clone, Default)]
pub struct BatchUpdate {
    entries: BTreeMap<String, Value>,
}

impl BatchUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>, value: Value) -> &mut Self {
        self.entries.insert(path.into(), value);
        self
    }

    pub fn remove(&mut self, path: impl Into<String>) -> &mut Self {
        self.entries.insert(path.into(), Value::Null);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Result of a [`LedgerStore::transaction`] call.
#[derive(Debug, Clone)]
pub struct TxResult {
    /// False when the closure aborted; the path is untouched.
    pub committed: bool,
    /// The value at the path after the call (None if absent/deleted).
    pub value: Option<Value>,
}

/// Closure contract for `transaction`:
/// - return `None` to abort (no-op),
/// - return `Some(Value::Null)` to commit a delete,
/// - return `Some(v)` to commit `v`.
///
/// The closure may run more than once under write contention and must stay
/// pure: no logging, no nested ledger calls, only the numeric/structural
/// transform. Side effects belong after the call returns.
pub type TxApply<'a> = &'a mut dyn FnMut(Option<&Value>) -> Option<Value>;

pub trait LedgerStore: Send + Sync {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Unconditional overwrite of the subtree at `path`.
    fn set(&self, path: &str, value: &Value) -> Result<(), StoreError>;

    /// Atomic multi-path batch write, all-or-nothing.
    fn update(&self, batch: &BatchUpdate) -> Result<(), StoreError>;

    /// Atomic read-modify-write on one path. See [`TxApply`].
    fn transaction(&self, path: &str, apply: TxApply) -> Result<TxResult, StoreError>;

    /// Append `value` under a fresh, roughly time-ordered key.
    fn push(&self, path: &str, value: &Value) -> Result<String, StoreError>;

    fn delete(&self, path: &str) -> Result<(), StoreError>;
}

/// Split a ledger path into segments, rejecting empty ones.
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::BadPath(path.to_string()));
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::BadPath(path.to_string()));
    }
    Ok(segments)
}

/// Generate a push key: millisecond prefix keeps keys roughly time-ordered,
/// the uuid fragment keeps them unique under concurrent pushes.
pub(crate) fn push_key(now_millis: i64) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{:012x}{}", now_millis.max(0), &uuid[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_rejects_empty_segments() {
        assert!(split_path("").is_err());
        assert!(split_path("a//b").is_err());
        assert_eq!(split_path("/wallets/u1/sp").unwrap(), vec!["wallets", "u1", "sp"]);
    }

    #[test]
    fn push_keys_are_ordered_and_unique() {
        let a = push_key(1_000);
        let b = push_key(2_000);
        assert!(a < b);
        assert_ne!(push_key(1_000), push_key(1_000));
    }
}
