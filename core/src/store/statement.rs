use super::CycleStore;
use crate::{error::BillingResult, statement::MonthlyStatement};
use rusqlite::{params, Connection, OptionalExtension};

impl CycleStore {
    // ── Statements ─────────────────────────────────────────────────

    pub fn save_statement(&self, statement: &MonthlyStatement) -> BillingResult<()> {
        Self::write_statement(&self.conn, statement)
    }

    pub(super) fn write_statement(
        conn: &Connection,
        statement: &MonthlyStatement,
    ) -> BillingResult<()> {
        conn.execute(
            "INSERT INTO statement (
                statement_id, org_key, period_key, generated_at, grand_total, payload
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &statement.statement_id,
                &statement.org_key,
                statement.period_key(),
                statement.generated_at.to_rfc3339(),
                statement.grand_total(),
                serde_json::to_string(statement)?,
            ],
        )?;
        Ok(())
    }

    pub fn load_statement(
        &self,
        org_key: &str,
        period_key: &str,
    ) -> BillingResult<Option<MonthlyStatement>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM statement WHERE org_key = ?1 AND period_key = ?2",
                params![org_key, period_key],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(Into::into))
            .transpose()
    }
}
