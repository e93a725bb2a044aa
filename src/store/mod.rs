//! Persistence layer for the call log
//!
//! This module provides SQLite-based storage for recorded calls. The
//! engine is its only writer; two processes may share a store file only
//! sequentially, never concurrently.

mod call_log;
mod database;
mod migrations;
mod models;

pub use call_log::CallLog;
pub use database::{Database, StoreError};
pub use models::CallRecord;
