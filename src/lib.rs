// MST Integration Engine - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod identifier;     // Tax identifier validation
pub mod retry;          // Bounded retry with backoff
pub mod source;         // Records and provenance
pub mod generator;      // Deterministic synthetic fallback
pub mod upstream;       // Live registry and insurance lookups
pub mod provider;       // Live-or-synthetic providers
pub mod mapping;        // Static field mapping table
pub mod reconciliation; // Field reconciler
pub mod data_quality;   // Quality and confidence scoring
pub mod compliance;     // Compliance and risk analysis
pub mod assembler;      // Result assembly and views
pub mod persistence;    // File sink and markdown report
pub mod db;             // SQLite sink and audit events
pub mod stats;          // Session statistics
pub mod cache;          // TTL result cache
pub mod config;         // TOML configuration
pub mod pipeline;       // End-to-end engine and batches

// Re-export commonly used types
pub use error::{exit_codes, IntegrationError, PersistenceWarning, UpstreamUnavailable};
pub use identifier::TaxIdentifier;
pub use retry::RetryPolicy;
pub use source::{
    Claim, ClaimStatus, Contribution, Employee, EmploymentStatus, EnterpriseRecord, Hospital,
    InsuranceRecordSet, Provenance, SourceSide, Sourced,
};
pub use generator::SyntheticGenerator;
pub use upstream::{
    EnterpriseSource, HttpEnterpriseSource, HttpInsuranceSource, InsuranceSource, OfflineSource,
};
pub use provider::{EnterpriseProvider, InsuranceProvider};
pub use mapping::{FieldMapping, MappingKind, MappingKindTag, FIELD_MAPPINGS};
pub use reconciliation::{FieldReconciler, ReconciledField, ReconciledProfile};
pub use data_quality::{DatasetQualityReport, QualityIssue, QualityScorer, Severity};
pub use compliance::{ComplianceAnalyzer, ComplianceAssessment, RiskAssessment, RiskTier};
pub use assembler::{IntegrationResult, ResultAssembler, View};
pub use persistence::{FileSink, ResultSink};
pub use db::SqliteSink;
pub use stats::{SessionStatistics, StatsSnapshot};
pub use cache::ResultCache;
pub use config::IntegrationConfig;
pub use pipeline::{BatchEntry, BatchReport, IntegrationEngine, IntegrationOutcome};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
