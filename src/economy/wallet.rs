//! Wallet mutation helpers.
//!
//! The single home for balance changes. Every credit and debit is an
//! atomic `transaction` on one wallet field; debits abort inside the
//! closure when the balance is short, so no sequence of calls can drive a
//! balance negative.

use serde_json::{json, Value};

use crate::errors::EngineError;
use crate::models::Wallet;
use crate::store::{paths, LedgerStore};

/// Tolerance for SP comparisons; balances accumulate float error.
const SP_EPSILON: f64 = 1e-9;

pub fn get(ledger: &dyn LedgerStore, uid: &str) -> Result<Wallet, EngineError> {
    match ledger.get(&paths::wallet(uid))? {
        None => Ok(Wallet::default()),
        Some(value) => {
            serde_json::from_value(value).map_err(|_| EngineError::validation("corrupt wallet record"))
        }
    }
}

/// Credit SP, creating the wallet lazily. Returns the new balance.
pub fn credit_sp(ledger: &dyn LedgerStore, uid: &str, amount: f64) -> Result<f64, EngineError> {
    if !(amount.is_finite() && amount >= 0.0) {
        return Err(EngineError::validation("credit amount must be a non-negative number"));
    }
    let result = ledger.transaction(&paths::wallet_sp(uid), &mut |current| {
        let balance = current.and_then(Value::as_f64).unwrap_or(0.0);
        Some(json!(balance + amount))
    })?;
    Ok(result.value.as_ref().and_then(Value::as_f64).unwrap_or(0.0))
}

/// Debit SP or fail with `InsufficientFunds`; never commits a negative
/// balance. Returns the new balance.
pub fn try_debit_sp(ledger: &dyn LedgerStore, uid: &str, amount: f64) -> Result<f64, EngineError> {
    if !(amount.is_finite() && amount > 0.0) {
        return Err(EngineError::validation("debit amount must be a positive number"));
    }
    let result = ledger.transaction(&paths::wallet_sp(uid), &mut |current| {
        let balance = current.and_then(Value::as_f64).unwrap_or(0.0);
        if balance + SP_EPSILON < amount {
            return None;
        }
        Some(json!((balance - amount).max(0.0)))
    })?;
    if !result.committed {
        return Err(EngineError::InsufficientFunds { currency: "SP" });
    }
    Ok(result.value.as_ref().and_then(Value::as_f64).unwrap_or(0.0))
}

pub fn credit_cc(ledger: &dyn LedgerStore, uid: &str, amount: i64) -> Result<i64, EngineError> {
    if amount < 0 {
        return Err(EngineError::validation("credit amount must be a non-negative number"));
    }
    let result = ledger.transaction(&paths::wallet_cc(uid), &mut |current| {
        let balance = current.and_then(Value::as_i64).unwrap_or(0);
        Some(json!(balance + amount))
    })?;
    Ok(result.value.as_ref().and_then(Value::as_i64).unwrap_or(0))
}

pub fn try_debit_cc(ledger: &dyn LedgerStore, uid: &str, amount: i64) -> Result<i64, EngineError> {
    if amount <= 0 {
        return Err(EngineError::validation("debit amount must be a positive number"));
    }
    let result = ledger.transaction(&paths::wallet_cc(uid), &mut |current| {
        let balance = current.and_then(Value::as_i64).unwrap_or(0);
        if balance < amount {
            return None;
        }
        Some(json!(balance - amount))
    })?;
    if !result.committed {
        return Err(EngineError::InsufficientFunds { currency: "CC" });
    }
    Ok(result.value.as_ref().and_then(Value::as_i64).unwrap_or(0))
}

/// Increment a crawler's points, clamped at zero. Fails if the crawler is
/// missing so points cannot be conjured onto deleted entities.
pub fn credit_points(
    ledger: &dyn LedgerStore,
    crawler: &str,
    delta: i64,
) -> Result<i64, EngineError> {
    if ledger.get(&paths::crawler(crawler))?.is_none() {
        return Err(EngineError::not_found(format!("crawler '{crawler}'")));
    }
    let result = ledger.transaction(&paths::crawler_points(crawler), &mut |current| {
        let points = current.and_then(Value::as_i64).unwrap_or(0);
        Some(json!((points + delta).max(0)))
    })?;
    Ok(result.value.as_ref().and_then(Value::as_i64).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;

    #[test]
    fn debit_aborts_below_balance() {
        let ledger = MemoryLedger::new();
        credit_sp(&ledger, "u1", 100.0).unwrap();

        let err = try_debit_sp(&ledger, "u1", 150.0).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { currency: "SP" }));
        assert_eq!(get(&ledger, "u1").unwrap().sp, 100.0);
    }

    #[test]
    fn debit_of_missing_wallet_is_insufficient() {
        let ledger = MemoryLedger::new();
        assert!(try_debit_cc(&ledger, "ghost", 1).is_err());
    }

    #[test]
    fn balances_never_go_negative() {
        let ledger = MemoryLedger::new();
        credit_sp(&ledger, "u1", 10.0).unwrap();
        try_debit_sp(&ledger, "u1", 10.0).unwrap();
        assert!(try_debit_sp(&ledger, "u1", 0.01).is_err());
        assert!(get(&ledger, "u1").unwrap().sp >= 0.0);
    }

    #[test]
    fn points_credit_clamps_at_zero() {
        let ledger = MemoryLedger::new();
        ledger
            .set("users/alpha", &serde_json::json!({"name": "alpha", "points": 5}))
            .unwrap();
        assert_eq!(credit_points(&ledger, "alpha", -20).unwrap(), 0);
        assert!(credit_points(&ledger, "ghost", 10).is_err());
    }
}
