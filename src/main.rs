use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lobby_panel::logging::init_logging;
use lobby_panel::parser::SourceReader;
use lobby_panel::{explore, parser, pipeline, JoinType, PipelineConfig, PipelineError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "lobby-panel")]
#[command(about = "Builds a validated firm-year panel of lobbying spend and firm financials")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and release the panel if it validates
    Run {
        #[arg(long, default_value = "lobby-panel.toml")]
        config: PathBuf,
        /// Override the configured join (inner | left-on-financial)
        #[arg(long)]
        join: Option<JoinType>,
    },
    /// Overview of the raw filings file
    Explore {
        #[arg(long, default_value = "lobby-panel.toml")]
        config: PathBuf,
        /// Number of clients to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Locate inputs, verify headers, load the crosswalk
    Check {
        #[arg(long, default_value = "lobby-panel.toml")]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let result = match cli.command {
        Commands::Run { config, join } => run_pipeline(&config, join),
        Commands::Explore { config, top } => run_explore(&config, top),
        Commands::Check { config } => run_check(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let validation_failed = err
                .downcast_ref::<PipelineError>()
                .map_or(false, |e| e.is_validation_failure());
            if validation_failed {
                eprintln!("❌ {}", err);
                eprintln!("   Panel NOT released. See the run report for details.");
                ExitCode::from(2)
            } else {
                eprintln!("❌ {:#}", err);
                ExitCode::from(1)
            }
        }
    }
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    PipelineConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn run_pipeline(config_path: &Path, join: Option<JoinType>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(join) = join {
        config.join = join;
    }

    println!("🏭 Lobby Panel - firm-year panel build ({} join)", config.join);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let report = pipeline::run(&config)?;

    println!("\n✅ Panel released");
    println!("   Run id:      {}", report.run_id);
    println!("   Rows:        {}", report.shape.rows);
    println!("   Firms:       {}", report.shape.firms);
    if let (Some(lo), Some(hi)) = (report.shape.min_year, report.shape.max_year) {
        println!("   Years:       {}-{}", lo, hi);
    }
    println!("   Balanced:    {}", if report.shape.balanced { "yes" } else { "no" });
    println!("   Unresolved:  {}", report.unresolved.total);
    println!("   Duplicates:  {}", report.duplicates.len());
    println!("   Report:      {}", config.output.report.display());
    for output in &report.outputs {
        println!("   Output:      {}", output.display());
    }

    Ok(())
}

fn run_explore(config_path: &Path, top: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let path = lobby_panel::config::locate_one(
        &config.inputs.data_dir,
        "filings",
        &config.inputs.filings,
    )?;

    let reader = parser::FilingReader::new(&config.filings.columns, &config.filings.filing_type);
    let filings = reader
        .read_path(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    println!("📂 {}\n", path.display());
    print!("{}", explore::overview(&filings, top).render());

    Ok(())
}

fn run_check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let summary = pipeline::check(&config)?;

    println!("🔍 Inputs");
    println!("   Filings:     {}", summary.inputs.filings.display());
    println!("   Financials:  {}", summary.inputs.financials.display());
    println!("   Crosswalk:   {}", summary.inputs.crosswalk.display());
    println!(
        "✓ Headers match; crosswalk has {} variants → {} firm keys",
        summary.crosswalk_variants, summary.crosswalk_keys
    );

    Ok(())
}
