// Fleet Earnings - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod names;
pub mod normalizer;
pub mod parser;
pub mod platform;
pub mod reconciliation;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use db::{get_events_for_entity, insert_event, setup_database, Event, SqliteStore};
pub use error::{FormatError, ImportError, InputError, RowValidationError, StoreError};
pub use import::{Dashboard, DeleteOutcome, ImportOutcome, ImportService, RawImportFile};
pub use names::{match_key, FirstTokenNameParser, NameParser, PersonName};
pub use normalizer::{
    parse_amount, uber_revenue, DriverEarningInput, MAX_AMOUNT, ImportContext, NormalizedBatch, RowNormalizer,
};
pub use parser::{
    detect_platform, get_adapter,
    BoltAdapter, UberAdapter, HeetchAdapter,
    BoltRow, UberRow, HeetchRow, PlatformRow,
    ContentValidator, PlatformAdapter,
};
pub use platform::{Platform, WeekStart};
pub use reconciliation::{
    percentage_change, total_earnings,
    MonthlyRevenue, PaymentReport, PeriodComparison, ReconciliationEngine, ReportStatus,
    RevenueDistribution, WeeklySummary,
};
pub use status::{Transition, UploadEvent, UploadState, UploadStatusRecord, UploadStatusTracker};
pub use store::{
    Driver, EarningsStore, ImportBatch, Page, ReportQuery, StoredEarning, SubmitReceipt,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for the binaries (`RUST_LOG` overrides the default)
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
