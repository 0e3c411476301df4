//! Engine error taxonomy.
//!
//! Every economy operation fails closed: a rejection means no ledger state
//! was changed. The API layer maps these onto HTTP statuses and a
//! `{success: false, message}` body.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing input (non-numeric amount, unknown choice, ...).
    #[error("{0}")]
    Validation(String),

    /// Wallet balance too low for the requested debit.
    #[error("insufficient {currency} balance")]
    InsufficientFunds { currency: &'static str },

    /// Crawler, lot, challenge or user does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Entity exists but is in the wrong state (locked lot, closed
    /// challenge, vote already cast, limit reached).
    #[error("{0}")]
    Conflict(String),

    /// Feature switched off by the admins.
    #[error("{0} is currently disabled")]
    Disabled(&'static str),

    /// The ledger call itself failed.
    #[error("ledger unavailable: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        EngineError::Conflict(msg.into())
    }
}
