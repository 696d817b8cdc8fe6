//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine calls store methods; it never executes SQL directly.

use crate::error::{BillingError, BillingResult};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

mod event_log;
mod period;
mod statement;

pub use period::{PeriodSummaryRow, StoredPeriod};

pub struct CycleStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl CycleStore {
    pub fn open(path: &str) -> BillingResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> BillingResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> BillingResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> BillingResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_billing_period.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_cycle_event.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_statement.sql"))?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> BillingResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BillingError::Other(anyhow::anyhow!("bad timestamp '{raw}': {e}")))
}
