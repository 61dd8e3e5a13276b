// 🏭 Pipeline
//
// ingest → standardize → resolve → aggregate → assemble → validate → release
//
// Stages run strictly in order. The run report is written whether or not the
// panel is released; a panel that fails validation is never written.
// Released outputs are staged as `<name>.partial` and renamed into place only
// after the SQLite export has committed.

use crate::assembler::{AssembledPanel, JoinType, PanelAssembler};
use crate::config::{LocatedInputs, PipelineConfig, ResolutionConfig};
use crate::db;
use crate::deduplication::DuplicateRecord;
use crate::entities::Crosswalk;
use crate::error::{PipelineError, Result};
use crate::estimation::{EstimationInput, EstimationManifest};
use crate::export::{write_panel_file, write_quarantine_file};
use crate::financials::{FinancialLoader, FinancialStats};
use crate::model::{LobbyingObservation, RawFiling, RawFinancial};
use crate::normalizer::{FilingNormalizer, NormalizationStats};
use crate::parser::{CrosswalkReader, FilingReader, FinancialReader, SourceReader};
use crate::report::{fingerprint_file, InputFingerprint, RunReport};
use crate::resolver::{IdentifierResolver, ResolutionAudit, UnresolvedLedger};
use crate::validator::{PanelValidator, ValidationReport};
use chrono::Utc;
use rusqlite::Connection;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// IN-MEMORY BUILD
// ============================================================================

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub join: JoinType,
    pub parallel: bool,
    pub resolution: ResolutionConfig,
    pub sample_limit: usize,
}

impl BuildOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        BuildOptions {
            join: config.join,
            parallel: config.parallel,
            resolution: config.resolution.clone(),
            sample_limit: config.validation.sample_limit,
        }
    }
}

/// Everything a build produces, released or not
#[derive(Debug, Clone)]
pub struct PanelBuild {
    pub panel: AssembledPanel,
    pub lobbying: Vec<LobbyingObservation>,
    pub normalization: NormalizationStats,
    pub financials: FinancialStats,
    pub duplicates: Vec<DuplicateRecord>,
    pub ledger: UnresolvedLedger,
    pub audit: ResolutionAudit,
    pub validation: ValidationReport,
}

/// Pure core of a run: raw rows + crosswalk snapshot → validated panel
pub fn build_panel(
    filings: &[RawFiling],
    financials: &[RawFinancial],
    crosswalk: &Crosswalk,
    options: &BuildOptions,
) -> Result<PanelBuild> {
    let resolver = IdentifierResolver::new(crosswalk, &options.resolution);
    let mut ledger = UnresolvedLedger::new();
    let mut audit = ResolutionAudit::default();

    let normalized = FilingNormalizer::new(options.parallel).normalize(
        filings,
        &resolver,
        &mut ledger,
        &mut audit,
    )?;
    let loaded = FinancialLoader::new().load(financials, &resolver, &mut ledger, &mut audit)?;

    let panel = PanelAssembler::new(options.join)
        .assemble(&normalized.observations, &loaded.observations);
    let validation = PanelValidator::new(options.sample_limit).validate(
        &panel.rows,
        crosswalk,
        &normalized.observations,
    );

    Ok(PanelBuild {
        panel,
        lobbying: normalized.observations,
        normalization: normalized.stats,
        financials: loaded.stats,
        duplicates: loaded.duplicates,
        ledger,
        audit,
        validation,
    })
}

// ============================================================================
// FILE-BACKED RUN
// ============================================================================

/// Crosswalk snapshot plus the number of roster rows it was built from
pub fn load_crosswalk(config: &PipelineConfig, path: &Path) -> Result<(Crosswalk, usize)> {
    let rows = CrosswalkReader::new(&config.crosswalk.columns).read_path(path)?;
    let crosswalk = Crosswalk::build(&rows)?;
    info!(
        rows = rows.len(),
        variants = crosswalk.variant_count(),
        keys = crosswalk.canonical_keys().len(),
        "crosswalk loaded"
    );
    Ok((crosswalk, rows.len()))
}

/// Full run. Returns the report of a released panel, or `ValidationFailed`
/// after the report has been written.
pub fn run(config: &PipelineConfig) -> Result<RunReport> {
    let started_at = Utc::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    info!(run_id = %run_id, join = %config.join, "run started");

    // Reject an unusable estimation spec before doing any work
    if let Some(spec) = &config.estimation {
        spec.check()?;
    }

    let inputs = config.inputs.locate()?;
    let (crosswalk, crosswalk_rows) = load_crosswalk(config, &inputs.crosswalk)?;
    let filing_reader = FilingReader::new(&config.filings.columns, &config.filings.filing_type);
    let filings = filing_reader.read_path(&inputs.filings)?;
    let financials =
        FinancialReader::new(&config.financials.columns).read_path(&inputs.financials)?;
    info!(
        filings = filings.len(),
        financials = financials.len(),
        reader = filing_reader.version(),
        "inputs read"
    );

    let fingerprints =
        fingerprint_inputs(&inputs, filings.len(), financials.len(), crosswalk_rows)?;

    let options = BuildOptions::from_config(config);
    let build = build_panel(&filings, &financials, &crosswalk, &options)?;
    let released = build.validation.passed();

    let mut outputs = Vec::new();
    if let Some(path) = &config.output.quarantine {
        write_quarantine_file(path, build.ledger.records())?;
        outputs.push(path.clone());
    }

    if released {
        outputs.push(config.output.panel.clone());
        if let (Some(_), Some(path)) = (&config.estimation, &config.output.estimation_spec) {
            outputs.push(path.clone());
        }
        if let Some(path) = &config.output.sqlite {
            outputs.push(path.clone());
        }
    } else {
        warn!(
            summary = %build.validation.summary(),
            "panel not released"
        );
        remove_stale_outputs(config)?;
    }

    let report = RunReport {
        run_id,
        version: crate::VERSION.to_string(),
        started_at,
        finished_at: Utc::now(),
        join: config.join,
        inputs: fingerprints,
        crosswalk_variants: crosswalk.variant_count(),
        crosswalk_keys: crosswalk.canonical_keys().len(),
        normalization: build.normalization,
        financials: build.financials,
        resolution: build.audit,
        unresolved: build.ledger.summary(config.validation.sample_limit),
        duplicates: build.duplicates,
        assembly: build.panel.summary.clone(),
        shape: build.panel.shape.clone(),
        validation: build.validation,
        released,
        outputs,
    };

    if released {
        release(config, &report, &build.panel)?;
    } else {
        report.write_json(&config.output.report)?;
    }
    info!(
        report = %config.output.report.display(),
        released,
        rows = report.shape.rows,
        "run finished"
    );

    if released {
        Ok(report)
    } else {
        Err(PipelineError::ValidationFailed(Box::new(report.validation)))
    }
}

/// Write every released output. Panel, manifest and report become visible
/// together, and only once the SQLite export has committed.
fn release(config: &PipelineConfig, report: &RunReport, panel: &AssembledPanel) -> Result<()> {
    let mut staged = StagedOutputs::default();

    write_panel_file(&staged.stage(&config.output.panel)?, &panel.rows)?;
    if let (Some(spec), Some(path)) = (&config.estimation, &config.output.estimation_spec) {
        let input = EstimationInput::new(&panel.rows, &report.validation, spec.clone())?;
        EstimationManifest::new(&report.run_id, &config.output.panel, &input)
            .write_json(&staged.stage(path)?)?;
    }
    report.write_json(&staged.stage(&config.output.report)?)?;

    if let Some(path) = &config.output.sqlite {
        export_sqlite(path, report, panel)?;
    }

    staged.commit()
}

/// Files written beside their targets, renamed into place on `commit`.
/// Anything still staged when this is dropped is removed.
#[derive(Debug, Default)]
struct StagedOutputs {
    pending: Vec<(PathBuf, PathBuf)>,
}

impl StagedOutputs {
    fn stage(&mut self, target: &Path) -> Result<PathBuf> {
        let name = target.file_name().ok_or_else(|| {
            PipelineError::Config(format!("output path has no file name: {}", target.display()))
        })?;
        let mut staged_name = name.to_os_string();
        staged_name.push(".partial");

        let staged = target.with_file_name(staged_name);
        self.pending.push((staged.clone(), target.to_path_buf()));
        Ok(staged)
    }

    /// Rename in staging order; the report is staged last, so it lands last
    fn commit(mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let mut promoted: Vec<&Path> = Vec::new();

        for (staged, target) in &pending {
            if let Err(e) = fs::rename(staged, target) {
                for path in promoted {
                    let _ = fs::remove_file(path);
                }
                for (leftover, _) in &pending {
                    let _ = fs::remove_file(leftover);
                }
                return Err(PipelineError::io(target.display(), e));
            }
            promoted.push(target);
        }

        Ok(())
    }
}

impl Drop for StagedOutputs {
    fn drop(&mut self) {
        for (staged, _) in &self.pending {
            let _ = fs::remove_file(staged);
        }
    }
}

/// An unreleased run must not leave an earlier run's panel or manifest behind
fn remove_stale_outputs(config: &PipelineConfig) -> Result<()> {
    let stale = std::iter::once(&config.output.panel).chain(config.output.estimation_spec.as_ref());

    for path in stale {
        match fs::remove_file(path) {
            Ok(()) => warn!(path = %path.display(), "removed output of an earlier release"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(PipelineError::io(path.display(), e)),
        }
    }

    Ok(())
}

fn fingerprint_inputs(
    inputs: &LocatedInputs,
    filings: usize,
    financials: usize,
    crosswalk: usize,
) -> Result<Vec<InputFingerprint>> {
    [
        ("filings", &inputs.filings, filings),
        ("financials", &inputs.financials, financials),
        ("crosswalk", &inputs.crosswalk, crosswalk),
    ]
    .into_iter()
    .map(|(role, path, rows)| {
        Ok(InputFingerprint {
            role: role.to_string(),
            path: path.clone(),
            sha256: fingerprint_file(path)?,
            rows,
        })
    })
    .collect()
}

fn export_sqlite(path: &Path, report: &RunReport, panel: &AssembledPanel) -> Result<()> {
    crate::report::ensure_parent(path)?;
    let mut conn = Connection::open(path)?;
    db::setup_database(&conn)?;
    let inserted = db::record_release(&mut conn, report, &panel.rows)?;
    info!(path = %path.display(), rows = inserted, "panel exported to sqlite");
    Ok(())
}

// ============================================================================
// CHECK
// ============================================================================

#[derive(Debug, Clone)]
pub struct CheckSummary {
    pub inputs: LocatedInputs,
    pub crosswalk_variants: usize,
    pub crosswalk_keys: usize,
}

/// Locate inputs, bind headers, load the crosswalk. Produces no panel.
pub fn check(config: &PipelineConfig) -> Result<CheckSummary> {
    if let Some(spec) = &config.estimation {
        spec.check()?;
    }

    let inputs = config.inputs.locate()?;
    FilingReader::new(&config.filings.columns, &config.filings.filing_type)
        .check_headers(&inputs.filings)?;
    FinancialReader::new(&config.financials.columns).check_headers(&inputs.financials)?;
    let (crosswalk, _) = load_crosswalk(config, &inputs.crosswalk)?;

    Ok(CheckSummary {
        inputs,
        crosswalk_variants: crosswalk.variant_count(),
        crosswalk_keys: crosswalk.canonical_keys().len(),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilingTypeCell, FirmKey, Money, Provenance};
    use crate::parser::CrosswalkRow;
    use crate::validator::FailureCategory;

    fn crosswalk() -> Crosswalk {
        let pairs = [
            ("17", "F", "lobbying"),
            ("F", "F", "financial"),
            ("23", "G", "lobbying"),
            ("G", "G", "financial"),
        ];
        let rows: Vec<CrosswalkRow> = pairs
            .iter()
            .enumerate()
            .map(|(i, (v, c, s))| CrosswalkRow {
                variant: v.to_string(),
                canonical: c.to_string(),
                scope: s.to_string(),
                provenance: Provenance::new("clients.csv", i + 2),
            })
            .collect();
        Crosswalk::build(&rows).unwrap()
    }

    fn filing(client: &str, year: &str, amount: &str, amendment: bool, line: usize) -> RawFiling {
        RawFiling {
            client_id: client.to_string(),
            period: year.to_string(),
            amount: amount.to_string(),
            filing_type: FilingTypeCell::Flags {
                amendment: if amendment { "True" } else { "False" }.to_string(),
                no_activity: "False".to_string(),
            },
            provenance: Provenance::new("reports.csv", line),
        }
    }

    fn financial(firm: &str, year: &str, revenue: &str, line: usize) -> RawFinancial {
        RawFinancial {
            firm_id: firm.to_string(),
            year: year.to_string(),
            revenue: revenue.to_string(),
            net_income: "1".to_string(),
            assets: "10".to_string(),
            industry: "3571".to_string(),
            provenance: Provenance::new("financials.csv", line),
        }
    }

    fn options(join: JoinType) -> BuildOptions {
        BuildOptions {
            join,
            parallel: true,
            resolution: ResolutionConfig::default(),
            sample_limit: 20,
        }
    }

    fn build(filings: &[RawFiling], financials: &[RawFinancial], join: JoinType) -> PanelBuild {
        build_panel(filings, financials, &crosswalk(), &options(join)).unwrap()
    }

    #[test]
    fn test_amendment_scenario_end_to_end() {
        let filings = vec![
            filing("17", "2021", "50000", false, 2),
            filing("17", "2021", "30000", false, 3),
            filing("17", "2021", "10000", true, 4),
        ];
        let financials = vec![financial("F", "2021", "100", 2)];

        let build = build(&filings, &financials, JoinType::Inner);

        assert!(build.validation.passed());
        assert_eq!(build.panel.rows.len(), 1);
        assert_eq!(build.panel.rows[0].lobbying_spend, Some(Money::from_dollars(80_000)));
        // no 2020 observation → lag missing
        assert_eq!(build.panel.rows[0].lagged_lobbying_spend, None);
    }

    #[test]
    fn test_join_scenarios() {
        let filings = vec![filing("23", "2021", "100", false, 2)];
        let financials = vec![
            financial("F", "2021", "100", 2),
            financial("G", "2021", "5", 3),
        ];
        let cw = crosswalk();

        let inner = build_panel(&filings, &financials, &cw, &options(JoinType::Inner)).unwrap();
        assert_eq!(inner.panel.rows.len(), 1);
        assert_eq!(inner.panel.rows[0].firm_key, FirmKey::new("G"));

        let left =
            build_panel(&filings, &financials, &cw, &options(JoinType::LeftOnFinancial)).unwrap();
        assert_eq!(left.panel.rows.len(), 2);
        let f_row = &left.panel.rows[0];
        assert_eq!(f_row.firm_key, FirmKey::new("F"));
        assert_eq!(f_row.lobbying_spend, None);
        assert_eq!(f_row.lagged_lobbying_spend, None);
        assert_eq!(f_row.revenue, Some(100.0));
        assert!(left.validation.passed());
    }

    #[test]
    fn test_duplicate_financial_scenario() {
        let filings = vec![filing("17", "2021", "100", false, 2)];
        let financials = vec![
            financial("F", "2021", "100", 2),
            financial("F", "2021", "999", 3),
        ];

        let build = build(&filings, &financials, JoinType::Inner);

        assert_eq!(build.duplicates.len(), 1);
        assert_eq!(build.panel.rows.len(), 1);
        assert_eq!(build.panel.rows[0].revenue, Some(100.0));
        assert_eq!(build.validation.count(FailureCategory::DuplicateKey), 0);
        assert!(build.validation.passed());
    }

    #[test]
    fn test_lag_carried_from_lobbying_stream() {
        let filings = vec![
            filing("17", "2020", "5", false, 2),
            filing("17", "2021", "7", false, 3),
        ];
        let financials = vec![financial("F", "2021", "1", 2)];

        let build = build(&filings, &financials, JoinType::Inner);

        assert_eq!(build.panel.rows.len(), 1);
        assert_eq!(build.panel.rows[0].lagged_lobbying_spend, Some(Money::from_dollars(5)));
        assert_eq!(build.lobbying.len(), 2);
    }

    #[test]
    fn test_negative_revenue_fails_validation() {
        let filings = vec![filing("17", "2021", "100", false, 2)];
        let financials = vec![financial("F", "2021", "-1", 2)];

        let build = build(&filings, &financials, JoinType::Inner);

        assert!(!build.validation.passed());
        assert_eq!(build.validation.count(FailureCategory::NegativeValue), 1);
    }

    #[test]
    fn test_unresolved_from_both_streams_are_ledgered() {
        let filings = vec![filing("999", "2021", "100", false, 2)];
        let financials = vec![financial("ZZZ", "2021", "1", 2)];

        let build = build(&filings, &financials, JoinType::LeftOnFinancial);

        assert!(build.panel.rows.is_empty());
        assert_eq!(build.ledger.len(), 2);
        assert_eq!(build.normalization.unresolved, 1);
        assert_eq!(build.financials.unresolved, 1);
    }

    #[test]
    fn test_sqlite_release_is_all_or_nothing() {
        let filings = vec![filing("17", "2021", "100", false, 2)];
        let financials = vec![financial("F", "2021", "1", 2)];
        let build = build(&filings, &financials, JoinType::Inner);
        let report = RunReport {
            run_id: "run-1".to_string(),
            version: crate::VERSION.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            join: JoinType::Inner,
            inputs: Vec::new(),
            crosswalk_variants: 4,
            crosswalk_keys: 2,
            normalization: build.normalization.clone(),
            financials: build.financials.clone(),
            resolution: build.audit.clone(),
            unresolved: build.ledger.summary(5),
            duplicates: build.duplicates.clone(),
            assembly: build.panel.summary.clone(),
            shape: build.panel.shape.clone(),
            validation: build.validation.clone(),
            released: true,
            outputs: Vec::new(),
        };

        let mut conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();

        // A repeated firm-year violates the primary key: the run row goes too
        let mut doubled = build.panel.rows.clone();
        doubled.push(doubled[0].clone());
        assert!(db::record_release(&mut conn, &report, &doubled).is_err());
        assert!(db::list_runs(&conn).unwrap().is_empty());

        assert_eq!(db::record_release(&mut conn, &report, &build.panel.rows).unwrap(), 1);
        assert_eq!(db::list_runs(&conn).unwrap().len(), 1);
        assert_eq!(db::count_panel_rows(&conn, "run-1").unwrap(), 1);
    }

    #[test]
    fn test_staged_outputs_only_appear_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let panel = dir.path().join("panel.csv");
        let report = dir.path().join("report.json");

        let mut staged = StagedOutputs::default();
        fs::write(staged.stage(&panel).unwrap(), "a").unwrap();
        fs::write(staged.stage(&report).unwrap(), "b").unwrap();
        assert!(dir.path().join("panel.csv.partial").exists());
        assert!(!panel.exists());

        staged.commit().unwrap();
        assert_eq!(fs::read_to_string(&panel).unwrap(), "a");
        assert_eq!(fs::read_to_string(&report).unwrap(), "b");
        assert!(!dir.path().join("panel.csv.partial").exists());
    }

    #[test]
    fn test_dropped_staging_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let panel = dir.path().join("panel.csv");
        fs::write(&panel, "earlier").unwrap();

        {
            let mut staged = StagedOutputs::default();
            fs::write(staged.stage(&panel).unwrap(), "new").unwrap();
        }

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(fs::read_to_string(&panel).unwrap(), "earlier");
    }
}
