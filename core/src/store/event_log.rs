use super::{parse_timestamp, CycleStore};
use crate::{error::BillingResult, event::EventLogEntry};
use rusqlite::{params, Connection};

impl CycleStore {
    // ── Event log ──────────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> BillingResult<()> {
        Self::write_event(&self.conn, entry)
    }

    pub(super) fn write_event(conn: &Connection, entry: &EventLogEntry) -> BillingResult<()> {
        conn.execute(
            "INSERT INTO cycle_event (org_key, period_key, recorded_at, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.org_key,
                entry.period_key,
                entry.recorded_at.to_rfc3339(),
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_period(
        &self,
        org_key: &str,
        period_key: &str,
    ) -> BillingResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, org_key, period_key, recorded_at, event_type, payload
             FROM cycle_event WHERE org_key = ?1 AND period_key = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![org_key, period_key], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, org_key, period_key, recorded_at, event_type, payload) = row?;
            entries.push(EventLogEntry {
                id: Some(id),
                org_key,
                period_key,
                recorded_at: parse_timestamp(&recorded_at)?,
                event_type,
                payload,
            });
        }
        Ok(entries)
    }

    pub fn event_count(&self, org_key: &str) -> BillingResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM cycle_event WHERE org_key = ?1",
                params![org_key],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
