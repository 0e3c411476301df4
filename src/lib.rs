//! Crawlex backend library.
//!
//! The economy engines, ledger store and HTTP surface live here so both the
//! `crawlex` binary and the integration tests can use them.

pub mod api;
pub mod auth;
pub mod config;
pub mod economy;
pub mod errors;
pub mod feed;
pub mod models;
pub mod scheduler;
pub mod store;
