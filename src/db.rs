// 🗄️ SQLite export
// Released panels plus run metadata. Each run's rows are tagged with its run id,
// so several releases can live side by side in one database.

use crate::error::Result;
use crate::model::{FirmKey, Money, PanelRow};
use crate::report::RunReport;
use rusqlite::{params, Connection};

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Runs Table (one row per released run, full report as JSON)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            run_id TEXT PRIMARY KEY,
            version TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            join_type TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            released INTEGER NOT NULL,
            report TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Panel Rows Table (money in integer cents, NULL = missing)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS panel_rows (
            run_id TEXT NOT NULL REFERENCES runs(run_id),
            firm_key TEXT NOT NULL,
            year INTEGER NOT NULL,
            lobbying_spend_cents INTEGER,
            lagged_lobbying_spend_cents INTEGER,
            revenue REAL,
            net_income REAL,
            assets REAL,
            industry TEXT,
            PRIMARY KEY (run_id, firm_key, year)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_panel_firm_year ON panel_rows(firm_key, year)",
        [],
    )?;

    Ok(())
}

pub fn insert_run(conn: &Connection, report: &RunReport) -> Result<()> {
    let report_json = serde_json::to_string(report)?;

    conn.execute(
        "INSERT INTO runs (
            run_id, version, started_at, finished_at, join_type, row_count, released, report
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            report.run_id,
            report.version,
            report.started_at.to_rfc3339(),
            report.finished_at.to_rfc3339(),
            report.join.code(),
            report.shape.rows as i64,
            report.released,
            report_json,
        ],
    )?;

    Ok(())
}

/// Run metadata and its rows land together or not at all
pub fn record_release(
    conn: &mut Connection,
    report: &RunReport,
    rows: &[PanelRow],
) -> Result<usize> {
    let tx = conn.transaction()?;
    insert_run(&tx, report)?;
    let inserted = insert_panel_rows(&tx, &report.run_id, rows)?;
    tx.commit()?;

    Ok(inserted)
}

/// Insert one run's rows. Callers own the transaction.
pub fn insert_panel_rows(conn: &Connection, run_id: &str, rows: &[PanelRow]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO panel_rows (
            run_id, firm_key, year, lobbying_spend_cents, lagged_lobbying_spend_cents,
            revenue, net_income, assets, industry
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for row in rows {
        stmt.execute(params![
            run_id,
            row.firm_key.as_str(),
            row.year,
            row.lobbying_spend.map(|m| m.cents()),
            row.lagged_lobbying_spend.map(|m| m.cents()),
            row.revenue,
            row.net_income,
            row.assets,
            row.industry,
        ])?;
    }

    Ok(rows.len())
}

pub fn count_panel_rows(conn: &Connection, run_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM panel_rows WHERE run_id = ?1",
        params![run_id],
        |row| row.get(0),
    )?;

    Ok(count)
}

/// Read back one run's panel, ordered by (firm key, year)
pub fn get_panel_rows(conn: &Connection, run_id: &str) -> Result<Vec<PanelRow>> {
    let mut stmt = conn.prepare(
        "SELECT firm_key, year, lobbying_spend_cents, lagged_lobbying_spend_cents,
                revenue, net_income, assets, industry
         FROM panel_rows
         WHERE run_id = ?1
         ORDER BY firm_key, year",
    )?;

    let rows = stmt
        .query_map(params![run_id], |row| {
            let firm_key: String = row.get(0)?;
            let spend: Option<i64> = row.get(2)?;
            let lagged: Option<i64> = row.get(3)?;
            Ok(PanelRow {
                firm_key: FirmKey::new(firm_key),
                year: row.get(1)?,
                lobbying_spend: spend.map(Money::from_cents),
                lagged_lobbying_spend: lagged.map(Money::from_cents),
                revenue: row.get(4)?,
                net_income: row.get(5)?,
                assets: row.get(6)?,
                industry: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn list_runs(conn: &Connection) -> Result<Vec<(String, String, i64)>> {
    let mut stmt =
        conn.prepare("SELECT run_id, finished_at, row_count FROM runs ORDER BY finished_at")?;
    let runs = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(runs)
}

// ============================================================================
// TESTS
// ============================================================================
