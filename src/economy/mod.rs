//! Economy engines.
//!
//! Each engine owns one slice of the economy and talks to the ledger only
//! through [`crate::store::LedgerStore`]. Operations take an explicit
//! `now: i64` unix timestamp so tests can move the clock.

pub mod admin;
pub mod contest;
pub mod crawlers;
pub mod gamble;
pub mod investment;
pub mod rps;
pub mod sampler;
pub mod shop;
pub mod spin;
pub mod volatility;
pub mod wallet;
