//! Reporting and export — JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats for comparison reports:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: equity curves, summary table, and trade tape for external tools
//! - **Markdown**: human-readable comparison table
//!
//! The manifest carries a `schema_version` field. Unknown versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use splitlab_core::domain::{Side, TradeReason};

use crate::runner::{ComparisonReport, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &ComparisonReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize ComparisonReport to JSON")
}

/// Deserialize a `ComparisonReport`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<ComparisonReport> {
    let report: ComparisonReport =
        serde_json::from_str(json).context("failed to deserialize ComparisonReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: date, price, principal, then one equity column per strategy.
pub fn export_equity_csv(report: &ComparisonReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["date".to_string(), "price".into(), "principal".into()];
    header.extend(report.runs.iter().map(|r| r.summary.strategy.clone()));
    wtr.write_record(&header)?;

    for (i, (date, price)) in report.dates.iter().zip(&report.prices).enumerate() {
        let mut row = vec![
            date.to_string(),
            format!("{price:.6}"),
            format!("{:.2}", report.principal.get(i).copied().unwrap_or(0.0)),
        ];
        for run in &report.runs {
            let equity = run.result.days.get(i).map(|d| d.equity).unwrap_or(f64::NAN);
            row.push(format!("{equity:.2}"));
        }
        wtr.write_record(&row)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per strategy with the summary metrics.
pub fn export_summary_csv(report: &ComparisonReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for run in &report.runs {
        wtr.serialize(&run.summary)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

#[derive(Serialize)]
struct TradeRow<'a> {
    strategy: &'a str,
    date: NaiveDate,
    side: Side,
    reason: TradeReason,
    quantity: f64,
    price: f64,
    amount: f64,
}

/// Every trade of every strategy, grouped by strategy in report order.
pub fn export_trades_csv(report: &ComparisonReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for run in &report.runs {
        for t in &run.result.trades {
            wtr.serialize(TradeRow {
                strategy: &run.summary.strategy,
                date: t.date,
                side: t.side,
                reason: t.reason,
                quantity: t.quantity,
                price: t.price,
                amount: t.amount,
            })?;
        }
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a comparison run.
///
/// Creates a directory named `{ticker}_{timestamp}/` under `output_dir`
/// containing:
/// - `manifest.json` — the full `ComparisonReport`
/// - `equity.csv` — day-by-day equity of every strategy
/// - `summary.csv` — one metrics row per strategy
/// - `trades.csv` — trade tape of every strategy
/// - `report.md` — Markdown comparison
///
/// Returns the path to the created directory.
pub fn save_artifacts(report: &ComparisonReport, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        report.ticker,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("manifest.json", export_json(report)?),
        ("equity.csv", export_equity_csv(report)?),
        ("summary.csv", export_summary_csv(report)?),
        ("trades.csv", export_trades_csv(report)?),
        ("report.md", generate_report(report)),
    ];
    for (name, content) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

/// Load a `ComparisonReport` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<ComparisonReport> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(report: &ComparisonReport) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Strategy Comparison\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Ticker | {} |\n", report.ticker));
    if let Some(bench) = &report.benchmark {
        md.push_str(&format!("| Benchmark | {bench} |\n"));
    }
    md.push_str(&format!(
        "| Period | {} to {} ({} days) |\n",
        report.start_date,
        report.end_date,
        report.dates.len()
    ));
    md.push_str(&format!(
        "| Initial Capital | ${:.0} |\n",
        report.plan.initial_capital
    ));
    md.push_str(&format!(
        "| Monthly Deposit | ${:.0} on day {} |\n",
        report.plan.monthly_amount, report.plan.deposit_day
    ));
    md.push_str(&format!(
        "| Final Principal | ${:.0} |\n",
        report.principal.last().copied().unwrap_or(0.0)
    ));
    md.push_str(&format!("| Dataset Hash | {} |\n", report.dataset_hash));
    if report.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    md.push_str("## Results\n\n");
    md.push_str("| Strategy | Final Equity | Total Return | CAGR | Max Drawdown | Trades |\n");
    md.push_str("| --- | ---: | ---: | ---: | ---: | ---: |\n");
    for s in report.summaries() {
        md.push_str(&format!(
            "| {} | ${:.0} | {:.2}% | {:.2}% | {:.2}% | {} |\n",
            s.strategy,
            s.final_equity,
            s.total_return_pct,
            s.cagr_pct,
            s.max_drawdown_pct,
            s.trade_count
        ));
    }
    md.push('\n');

    if let Some(best) = report.best() {
        md.push_str(&format!(
            "Best final equity: **{}** (${:.0}).\n",
            best.strategy, best.final_equity
        ));
    }

    md
}
