// Lobby Panel - Core Library
// Firm-year panel of lobbying spend and financials, for the CLI and tests

pub mod error;
pub mod model;
pub mod config;
pub mod schema;         // Per-stream column contracts
pub mod parser;         // Source readers
pub mod entities;       // Crosswalk + firm name matching
pub mod resolver;       // Identifier → canonical firm key
pub mod deduplication;  // First-seen-wins per (firm, year)
pub mod normalizer;     // Filings → lobbying observations
pub mod financials;     // Statements → financial observations
pub mod assembler;      // Join + lag
pub mod validator;      // Pre-release checks
pub mod estimation;     // Downstream contract
pub mod report;
pub mod export;
pub mod db;
pub mod explore;
pub mod pipeline;
pub mod logging;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use model::{
    FilingType, FinancialObservation, FirmKey, LobbyingObservation, Money, PanelRow,
    Provenance, SourceStream, PANEL_COLUMNS,
};
pub use config::PipelineConfig;
pub use entities::Crosswalk;
pub use resolver::{IdentifierResolver, MatchMethod, ResolutionFailure, UnresolvedLedger};
pub use normalizer::{FilingNormalizer, NormalizationStats};
pub use financials::FinancialLoader;
pub use assembler::{JoinType, PanelAssembler, PanelShape};
pub use validator::{FailureCategory, PanelValidator, ValidationReport};
pub use estimation::{EstimationAdapter, EstimationInput, EstimationSpec, FixedEffects, LagChoice};
pub use report::RunReport;
pub use pipeline::{build_panel, check, run, BuildOptions, PanelBuild};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
