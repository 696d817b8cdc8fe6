use super::{parse_timestamp, CycleStore};
use crate::{
    error::{BillingError, BillingResult},
    event::EventLogEntry,
    period::{BillingPeriod, WorkflowStatus},
    statement::MonthlyStatement,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A period document together with its version stamp.
#[derive(Debug, Clone)]
pub struct StoredPeriod {
    pub period:   BillingPeriod,
    pub revision: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSummaryRow {
    pub period_key: String,
    pub status:     String,
    pub revision:   u64,
    pub updated_at: DateTime<Utc>,
}

fn stored_period_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, i64)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn decode(document: String, revision: i64) -> BillingResult<StoredPeriod> {
    Ok(StoredPeriod {
        period:   serde_json::from_str(&document)?,
        revision: revision as u64,
    })
}

impl CycleStore {
    // ── Billing period ─────────────────────────────────────────────

    /// Write a period document. `expected_revision` is the revision the
    /// caller last read (0 for a period the store has never seen). Returns
    /// the new revision.
    pub fn save_period(
        &self,
        org_key: &str,
        period: &BillingPeriod,
        expected_revision: u64,
        now: DateTime<Utc>,
    ) -> BillingResult<u64> {
        self.commit_period(org_key, period, expected_revision, &[], None, now)
    }

    /// Write a period document, mark it current, and append its events and
    /// (on finalization) its statement in one transaction.
    pub fn commit_period(
        &self,
        org_key: &str,
        period: &BillingPeriod,
        expected_revision: u64,
        events: &[EventLogEntry],
        statement: Option<&MonthlyStatement>,
        now: DateTime<Utc>,
    ) -> BillingResult<u64> {
        let period_key = period.period_key();
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<(String, i64)> = tx
            .query_row(
                "SELECT status, revision FROM billing_period
                 WHERE org_key = ?1 AND period_key = ?2",
                params![org_key, &period_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let found = existing.as_ref().map_or(0, |(_, rev)| *rev as u64);
        if let Some((status, _)) = &existing {
            if status == WorkflowStatus::Finalized.as_str() {
                return Err(BillingError::PeriodFrozen {
                    status: WorkflowStatus::Finalized,
                    action: "overwrite a finalized period".into(),
                });
            }
        }
        if found != expected_revision {
            return Err(BillingError::StaleRevision {
                expected: expected_revision,
                found,
            });
        }

        let revision = found + 1;
        let document = serde_json::to_string(period)?;
        tx.execute(
            "INSERT INTO billing_period (
                org_key, period_key, year, month, status, revision, document, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (org_key, period_key) DO UPDATE SET
                status = excluded.status,
                revision = excluded.revision,
                document = excluded.document,
                updated_at = excluded.updated_at",
            params![
                org_key,
                &period_key,
                period.year,
                period.month.number_from_month(),
                period.status.as_str(),
                revision as i64,
                document,
                now.to_rfc3339(),
            ],
        )?;
        Self::write_current(&tx, org_key, &period_key)?;
        for entry in events {
            Self::write_event(&tx, entry)?;
        }
        if let Some(statement) = statement {
            Self::write_statement(&tx, statement)?;
        }
        tx.commit()?;
        Ok(revision)
    }

    fn write_current(conn: &Connection, org_key: &str, period_key: &str) -> BillingResult<()> {
        conn.execute(
            "INSERT INTO current_period (org_key, period_key) VALUES (?1, ?2)
             ON CONFLICT (org_key) DO UPDATE SET period_key = excluded.period_key",
            params![org_key, period_key],
        )?;
        Ok(())
    }

    /// Point the organization's "current" marker at a stored period.
    pub fn set_current(&self, org_key: &str, period_key: &str) -> BillingResult<()> {
        Self::write_current(&self.conn, org_key, period_key)
    }

    pub fn load_current(&self, org_key: &str) -> BillingResult<Option<StoredPeriod>> {
        let row = self
            .conn
            .query_row(
                "SELECT p.document, p.revision
                 FROM current_period c
                 JOIN billing_period p
                   ON p.org_key = c.org_key AND p.period_key = c.period_key
                 WHERE c.org_key = ?1",
                params![org_key],
                stored_period_mapper,
            )
            .optional()?;
        row.map(|(doc, rev)| decode(doc, rev)).transpose()
    }

    pub fn load_period(
        &self,
        org_key: &str,
        period_key: &str,
    ) -> BillingResult<Option<StoredPeriod>> {
        let row = self
            .conn
            .query_row(
                "SELECT document, revision FROM billing_period
                 WHERE org_key = ?1 AND period_key = ?2",
                params![org_key, period_key],
                stored_period_mapper,
            )
            .optional()?;
        row.map(|(doc, rev)| decode(doc, rev)).transpose()
    }

    /// All stored periods for an organization, oldest first.
    pub fn period_history(&self, org_key: &str) -> BillingResult<Vec<PeriodSummaryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT period_key, status, revision, updated_at
             FROM billing_period WHERE org_key = ?1
             ORDER BY year ASC, month ASC",
        )?;
        let rows = stmt.query_map(params![org_key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (period_key, status, revision, updated_at) = row?;
            out.push(PeriodSummaryRow {
                period_key,
                status,
                revision: revision as u64,
                updated_at: parse_timestamp(&updated_at)?,
            });
        }
        Ok(out)
    }
}
