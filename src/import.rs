// 📥 Import Service - adapt → normalize → submit → status → reports
//
// One call per (platform, week) file. The upload status is stored in the same
// write as the rows, so it never claims data the store does not hold.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{FormatError, ImportError, InputError, RowValidationError, StoreError};
use crate::normalizer::{ImportContext, NormalizedBatch, RowNormalizer, MAX_AMOUNT};
use crate::parser::{detect_platform, get_adapter, PlatformRow};
use crate::platform::{Platform, WeekStart};
use crate::reconciliation::{
    MonthlyRevenue, PaymentReport, PeriodComparison, ReconciliationEngine, RevenueDistribution,
    WeeklySummary,
};
use crate::status::{Transition, UploadStatusRecord, UploadStatusTracker};
use crate::store::{EarningsStore, ImportBatch, Page, ReportQuery};

// ============================================================================
// INPUT / OUTPUT TYPES
// ============================================================================

/// RawImportFile - uploaded bytes tagged with platform and week
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImportFile {
    pub platform: Platform,
    pub week_start: WeekStart,
    pub file_name: Option<String>,
    pub content: Vec<u8>,
}

impl RawImportFile {
    pub fn new(platform: Platform, week_start: WeekStart, content: Vec<u8>) -> Self {
        RawImportFile {
            platform,
            week_start,
            file_name: None,
            content,
        }
    }

    /// Tag the file with the platform recognized from its content
    pub fn detect(week_start: WeekStart, content: Vec<u8>) -> Result<Self, FormatError> {
        let platform = detect_platform(&content)?;
        Ok(Self::new(platform, week_start, content))
    }

    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.file_name = Some(file_name.to_string());
        self
    }

    /// SHA-256 of the content, hex-encoded
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.content);
        format!("{:x}", hasher.finalize())
    }
}

/// What happened to one import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub platform: Platform,
    pub week_start: WeekStart,
    pub total_rows: usize,
    pub accepted: usize,
    pub rejected: Vec<RowValidationError>,
    pub status: UploadStatusRecord,
    /// An earlier platform in the recommended order is still missing
    pub out_of_order: bool,
    pub reports_rebuilt: usize,
    /// The import is stored but the week's reports are stale
    pub reports_error: Option<String>,
}

impl ImportOutcome {
    /// e.g. "12 of 14 rows imported"
    pub fn summary(&self) -> String {
        format!("{} of {} rows imported", self.accepted, self.total_rows)
    }

    pub fn is_partial(&self) -> bool {
        self.accepted < self.total_rows
    }

    pub fn reports_stale(&self) -> bool {
        self.reports_error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted {
        rows: usize,
        status: UploadStatusRecord,
    },
    /// Nothing was uploaded for that platform and week
    NotUploaded,
}

/// Everything the weekly dashboard shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub week_start: WeekStart,
    pub week_label: String,
    pub commission: Decimal,
    pub comparison: PeriodComparison,
    pub distribution: RevenueDistribution,
    pub uploads: Vec<UploadStatusRecord>,
    pub recommended_next: Option<Platform>,
}

// ============================================================================
// SERVICE
// ============================================================================

/// ImportService - the operator workflow over one `EarningsStore`
pub struct ImportService<S: EarningsStore> {
    store: S,
    owner_id: String,
    default_commission: Decimal,
    normalizer: RowNormalizer,
}

impl<S: EarningsStore> ImportService<S> {
    pub fn new(store: S, owner_id: &str) -> Self {
        ImportService {
            store,
            owner_id: owner_id.to_string(),
            default_commission: Decimal::ZERO,
            normalizer: RowNormalizer::new(),
        }
    }

    /// Commission used until the operator configures one
    pub fn with_default_commission(mut self, amount: Decimal) -> Self {
        self.default_commission = amount;
        self
    }

    pub fn with_normalizer(mut self, normalizer: RowNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    // ------------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------------

    /// Adapt and normalize without submitting anything
    pub fn preview(&self, file: &RawImportFile) -> Result<NormalizedBatch, ImportError> {
        let rows = get_adapter(file.platform).parse(&file.content)?;
        if rows.is_empty() {
            return Err(ImportError::EmptyImport {
                platform: file.platform,
            });
        }

        let ctx = ImportContext::new(file.platform, file.week_start, &self.owner_id);
        Ok(self.normalizer.normalize(&rows, &ctx))
    }

    pub fn import(&self, file: &RawImportFile) -> Result<ImportOutcome, ImportError> {
        let rows = get_adapter(file.platform).parse(&file.content)?;
        self.import_rows(file.platform, file.week_start, &rows, Some(file.digest()))
    }

    /// Import rows that were already parsed (e.g. off-thread)
    pub fn import_rows(
        &self,
        platform: Platform,
        week: WeekStart,
        rows: &[PlatformRow],
        file_digest: Option<String>,
    ) -> Result<ImportOutcome, ImportError> {
        if rows.is_empty() {
            return Err(ImportError::EmptyImport { platform });
        }

        let ctx = ImportContext::new(platform, week, &self.owner_id);
        let batch = self.normalizer.normalize(rows, &ctx);
        let total_rows = batch.total_rows();

        if batch.records.is_empty() {
            return Err(ImportError::AllRowsInvalid {
                platform,
                total: total_rows,
                errors: batch.errors,
            });
        }

        let mut tracker = self.tracker(week)?;
        let out_of_order = tracker.is_out_of_order(platform, week);
        if out_of_order {
            warn!(
                platform = platform.code(),
                week = %week,
                recommended = ?tracker.recommended_next(week),
                "importing out of the recommended Bolt → Uber → Heetch order"
            );
        }

        let (_, pending) = tracker.record_upload(platform, week, batch.records.len(), file_digest.clone());
        let receipt = self.store.submit_import(
            &ImportBatch {
                owner_id: self.owner_id.clone(),
                platform,
                week_start: week,
                records: batch.records,
                file_digest,
            },
            &pending,
        )?;
        let status = UploadStatusRecord {
            row_count: receipt.accepted,
            ..pending
        };

        let (reports_rebuilt, reports_error) = match self.rebuild_reports(week) {
            Ok(reports) => (reports.len(), None),
            Err(err) => {
                error!(error = %err, week = %week, "report rebuild failed after import");
                (0, Some(err.to_string()))
            }
        };

        let mut rejected = batch.errors;
        rejected.extend(receipt.rejected);

        let outcome = ImportOutcome {
            platform,
            week_start: week,
            total_rows,
            accepted: receipt.accepted,
            rejected,
            status,
            out_of_order,
            reports_rebuilt,
            reports_error,
        };

        info!(
            platform = platform.code(),
            week = %week,
            accepted = outcome.accepted,
            total = outcome.total_rows,
            "{}",
            outcome.summary()
        );

        Ok(outcome)
    }

    /// Remove a platform's data for a week; deleting nothing is not an error
    pub fn delete(&self, platform: Platform, week: WeekStart) -> Result<DeleteOutcome, ImportError> {
        let mut tracker = self.tracker(week)?;
        let (transition, status) = tracker.record_deletion(platform, week);
        let rows = self.store.delete_import(&self.owner_id, &status)?;

        if transition == Transition::Conflict && rows == 0 {
            return Ok(DeleteOutcome::NotUploaded);
        }

        if let Err(err) = self.rebuild_reports(week) {
            error!(error = %err, week = %week, "report rebuild failed after delete");
        }

        info!(platform = platform.code(), week = %week, rows, "import deleted");
        Ok(DeleteOutcome::Deleted { rows, status })
    }

    pub fn tracker(&self, week: WeekStart) -> Result<UploadStatusTracker, StoreError> {
        let records = self.store.upload_statuses(&self.owner_id, week)?;
        Ok(UploadStatusTracker::from_records(records))
    }

    /// One record per platform, in recommended import order
    pub fn import_status(&self, week: WeekStart) -> Result<Vec<UploadStatusRecord>, StoreError> {
        Ok(self.tracker(week)?.week_status(week))
    }

    // ------------------------------------------------------------------------
    // Commission
    // ------------------------------------------------------------------------

    pub fn commission(&self) -> Result<Decimal, StoreError> {
        Ok(self
            .store
            .commission(&self.owner_id)?
            .unwrap_or(self.default_commission))
    }

    /// Applies to reports built from now on; existing reports keep theirs
    /// until their week is rebuilt.
    pub fn set_commission(&self, amount: Decimal) -> Result<(), ImportError> {
        if amount < Decimal::ZERO {
            return Err(InputError::InvalidAmount(amount.to_string(), "commission cannot be negative").into());
        }
        if amount > MAX_AMOUNT {
            return Err(InputError::InvalidAmount(amount.to_string(), "commission is out of range").into());
        }
        self.store.set_commission(&self.owner_id, amount)?;
        info!(commission = %amount, "commission updated");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    /// Recompute the week's reports from stored earnings; paid reports stay
    pub fn rebuild_reports(&self, week: WeekStart) -> Result<Vec<PaymentReport>, StoreError> {
        let earnings = self.store.weekly_earnings(&self.owner_id, week)?;
        let engine = ReconciliationEngine::new(self.commission()?);

        let fresh = engine.build_reports(week, &earnings);
        let existing = self.store.week_reports(&self.owner_id, week)?;
        let merged = engine.merge_existing(fresh, &existing);

        self.store.save_payment_reports(&self.owner_id, week, &merged)?;
        info!(week = %week, reports = merged.len(), "payment reports rebuilt");
        Ok(merged)
    }

    pub fn reports(&self, week: WeekStart, query: &ReportQuery) -> Result<Page<PaymentReport>, StoreError> {
        self.store.payment_reports(&self.owner_id, week, query)
    }

    pub fn mark_paid(&self, report_id: Uuid) -> Result<Option<PaymentReport>, StoreError> {
        self.store.mark_report_paid(&self.owner_id, report_id, Utc::now())
    }

    pub fn weekly_summary(&self, week: WeekStart) -> Result<WeeklySummary, StoreError> {
        let reports = self.store.week_reports(&self.owner_id, week)?;
        let engine = ReconciliationEngine::new(self.commission()?);
        Ok(engine.weekly_summary(week, &reports))
    }

    /// Week vs. previous week, revenue split and upload progress
    pub fn dashboard(&self, week: WeekStart) -> Result<Dashboard, StoreError> {
        let commission = self.commission()?;
        let engine = ReconciliationEngine::new(commission);

        let current = engine.weekly_summary(week, &self.store.week_reports(&self.owner_id, week)?);
        let previous_week = week.previous();
        let previous = engine.weekly_summary(
            previous_week,
            &self.store.week_reports(&self.owner_id, previous_week)?,
        );

        let earnings = self.store.weekly_earnings(&self.owner_id, week)?;
        let tracker = self.tracker(week)?;

        Ok(Dashboard {
            week_start: week,
            week_label: week.label(),
            commission,
            comparison: engine.compare_periods(current, previous),
            distribution: engine.revenue_distribution(week, &earnings),
            uploads: tracker.week_status(week),
            recommended_next: tracker.recommended_next(week),
        })
    }

    /// Revenue per calendar month for weeks in `[from, to]`
    pub fn monthly_revenue(&self, from: WeekStart, to: WeekStart) -> Result<Vec<MonthlyRevenue>, StoreError> {
        let reports = self.store.reports_between(&self.owner_id, from, to)?;
        let engine = ReconciliationEngine::new(self.commission()?);
        Ok(engine.monthly_revenue(&reports))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::parser::HeetchAdapter;
    use crate::reconciliation::ReportStatus;
    use crate::status::UploadState;
    use crate::store::{Driver, StoredEarning, SubmitReceipt};
    use chrono::{DateTime, NaiveDate};
    use rust_decimal_macros::dec;

    const BOLT_CSV: &str = "Driver,Driver's Phone,Email,Projected payout|€\n\
        Jean Paul Martin,0601020304,jp@x.com,\"10,00\"\n\
        Sarah Dupont,0605060708,sarah@x.com,\"100,00\"\n";

    const UBER_CSV: &str = "UUID du chauffeur,Prénom du chauffeur,Nom du chauffeur,Revenus totaux,Remboursements et notes de frais,Versements\n\
        u-1,Jean Paul,Martin,\"-5,00\",\"0,00\",\"0,00\"\n";

    const HEETCH_TEXT: &str = "Relevé hebdomadaire\n\
        Chauffeur : Jean Paul Martin Montant du virement 3,00 €\n";

    fn week() -> WeekStart {
        WeekStart::new(NaiveDate::from_ymd_opt(2025, 1, 13).unwrap()).unwrap()
    }

    fn service() -> ImportService<SqliteStore> {
        ImportService::new(SqliteStore::open_in_memory().unwrap(), "owner-1")
    }

    fn bolt_file(csv: &str) -> RawImportFile {
        RawImportFile::new(Platform::Bolt, week(), csv.as_bytes().to_vec())
    }

    fn heetch_rows() -> Vec<PlatformRow> {
        HeetchAdapter::new().rows_from_text(HEETCH_TEXT).unwrap()
    }

    #[test]
    fn test_import_marks_uploaded_and_builds_reports() {
        let service = service();
        let outcome = service.import(&bolt_file(BOLT_CSV)).unwrap();

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.summary(), "2 of 2 rows imported");
        assert_eq!(outcome.status.state(), UploadState::Validated);
        assert_eq!(outcome.reports_rebuilt, 2);
        assert!(!outcome.out_of_order);

        let statuses = service.import_status(week()).unwrap();
        assert_eq!(statuses.len(), 3);
        assert!(statuses[0].uploaded);
        assert!(!statuses[1].uploaded);
        assert_eq!(statuses[0].file_digest.as_deref(), Some(bolt_file(BOLT_CSV).digest().as_str()));
    }

    #[test]
    fn test_three_platforms_reconcile_per_driver() {
        let service = service();
        service.set_commission(dec!(20)).unwrap();

        service.import(&bolt_file(BOLT_CSV)).unwrap();
        service
            .import(&RawImportFile::new(Platform::Uber, week(), UBER_CSV.as_bytes().to_vec()))
            .unwrap();
        service
            .import_rows(Platform::Heetch, week(), &heetch_rows(), None)
            .unwrap();

        let reports = service.reports(week(), &ReportQuery::default()).unwrap();
        assert_eq!(reports.total, 2);

        let jean = reports
            .items
            .iter()
            .find(|r| r.driver_name == "Jean Paul Martin")
            .unwrap();
        assert_eq!(jean.bolt_earnings, dec!(10));
        assert_eq!(jean.uber_earnings, dec!(-5));
        assert_eq!(jean.heetch_earnings, dec!(3));
        assert_eq!(jean.total_earnings, dec!(13));
        assert_eq!(jean.total_due, dec!(-7));

        let summary = service.weekly_summary(week()).unwrap();
        // (13-20) + (100-20) = 73
        assert_eq!(summary.total_due, dec!(73));
        assert_eq!(summary.overdrawn_count, 1);

        println!("✅ Three-platform reconciliation PASSED");
    }

    #[test]
    fn test_empty_file_is_distinguished_from_invalid_rows() {
        let service = service();

        let empty = service
            .import(&bolt_file("Driver,Driver's Phone,Email,Projected payout|€\n"))
            .unwrap_err();
        assert!(matches!(empty, ImportError::EmptyImport { platform: Platform::Bolt }));

        let invalid = service
            .import(&bolt_file(
                "Driver,Driver's Phone,Email,Projected payout|€\nA B,,,abc\nC D,,,xyz\n",
            ))
            .unwrap_err();
        match invalid {
            ImportError::AllRowsInvalid { total, errors, .. } => {
                assert_eq!(total, 2);
                assert_eq!(errors.len(), 2);
            }
            other => panic!("unexpected error: {}", other),
        }

        assert!(!service.import_status(week()).unwrap()[0].uploaded);
    }

    #[test]
    fn test_partial_import_reports_rejected_rows() {
        let service = service();
        let outcome = service
            .import(&bolt_file(
                "Driver,Driver's Phone,Email,Projected payout|€\nA B,,,\"12,50\"\nC D,,,oops\n",
            ))
            .unwrap();

        assert_eq!(outcome.summary(), "1 of 2 rows imported");
        assert!(outcome.is_partial());
        assert_eq!(outcome.rejected[0].line, 3);
        assert_eq!(outcome.status.row_count, 1);
    }

    #[test]
    fn test_submit_delete_status_round_trip() {
        let service = service();
        service.import(&bolt_file(BOLT_CSV)).unwrap();

        let deleted = service.delete(Platform::Bolt, week()).unwrap();
        match deleted {
            DeleteOutcome::Deleted { rows, status } => {
                assert_eq!(rows, 2);
                assert!(!status.uploaded);
                assert!(!status.validated);
            }
            DeleteOutcome::NotUploaded => panic!("expected a deletion"),
        }

        let bolt = &service.import_status(week()).unwrap()[0];
        assert!(!bolt.uploaded);
        assert!(service.reports(week(), &ReportQuery::default()).unwrap().items.is_empty());

        // Second delete is a no-op
        assert_eq!(service.delete(Platform::Bolt, week()).unwrap(), DeleteOutcome::NotUploaded);
    }

    #[test]
    fn test_out_of_order_import_is_accepted() {
        let service = service();
        let outcome = service
            .import_rows(Platform::Heetch, week(), &heetch_rows(), None)
            .unwrap();

        assert!(outcome.out_of_order);
        assert!(outcome.status.uploaded);
    }

    #[test]
    fn test_reimport_keeps_paid_reports() {
        let service = service();
        service.import(&bolt_file(BOLT_CSV)).unwrap();

        let reports = service.reports(week(), &ReportQuery::default()).unwrap();
        let sarah = reports.items.iter().find(|r| r.driver_name == "Sarah Dupont").unwrap();
        service.mark_paid(sarah.id).unwrap();

        service
            .import(&bolt_file(
                "Driver,Driver's Phone,Email,Projected payout|€\nSarah Dupont,,,\"150,00\"\nJean Paul Martin,,,\"10,00\"\n",
            ))
            .unwrap();

        let after = service.reports(week(), &ReportQuery::default()).unwrap();
        let sarah_after = after.items.iter().find(|r| r.driver_name == "Sarah Dupont").unwrap();
        assert_eq!(sarah_after.id, sarah.id);
        assert_eq!(sarah_after.status, ReportStatus::Paid);
        assert_eq!(sarah_after.total_earnings, dec!(100));
    }

    #[test]
    fn test_negative_commission_is_rejected() {
        let service = service();
        let err = service.set_commission(dec!(-1)).unwrap_err();
        assert!(matches!(err, ImportError::Input(InputError::InvalidAmount(..))));
        assert_eq!(service.commission().unwrap(), Decimal::ZERO);

        assert!(service.set_commission(dec!(50000000000000000000000000000)).is_err());

        let service = service.with_default_commission(dec!(15));
        assert_eq!(service.commission().unwrap(), dec!(15));
    }

    #[test]
    fn test_dashboard_without_previous_week() {
        let service = service();
        service.import(&bolt_file(BOLT_CSV)).unwrap();

        let dashboard = service.dashboard(week()).unwrap();
        assert_eq!(dashboard.week_label, "2025-W03");
        assert_eq!(dashboard.comparison.current.total_earnings, dec!(110));
        assert_eq!(dashboard.comparison.earnings_change_pct, dec!(0));
        assert_eq!(dashboard.distribution.bolt, dec!(110));
        assert_eq!(dashboard.recommended_next, Some(Platform::Uber));
    }

    #[test]
    fn test_huge_amounts_are_row_errors() {
        let service = service();
        let err = service
            .import(&bolt_file(
                "Driver,Driver's Phone,Email,Projected payout|€\n\
                 A B,,,50000000000000000000000000000\n\
                 C D,,,50000000000000000000000000000\n",
            ))
            .unwrap_err();

        match err {
            ImportError::AllRowsInvalid { errors, .. } => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].to_string().contains("out of range"));
            }
            other => panic!("unexpected error: {}", other),
        }

        let dashboard = service.dashboard(week()).unwrap();
        assert_eq!(dashboard.comparison.current.total_earnings, dec!(0));
    }

    #[test]
    fn test_detect_and_digest() {
        let file = RawImportFile::detect(week(), UBER_CSV.as_bytes().to_vec())
            .unwrap()
            .with_file_name("uber.csv");
        assert_eq!(file.platform, Platform::Uber);
        assert_eq!(file.file_name.as_deref(), Some("uber.csv"));
        assert_eq!(file.digest().len(), 64);
        assert_eq!(file.digest(), file.clone().digest());
    }

    #[test]
    fn test_preview_does_not_submit() {
        let service = service();
        let batch = service.preview(&bolt_file(BOLT_CSV)).unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.total_revenue(), dec!(110));
        assert!(!service.import_status(week()).unwrap()[0].uploaded);
    }

    // ------------------------------------------------------------------------
    // Failing store
    // ------------------------------------------------------------------------

    /// Wraps a real store and fails chosen operations
    struct FlakyStore {
        inner: SqliteStore,
        fail_submit: bool,
        fail_reports: bool,
    }

    impl FlakyStore {
        fn new(fail_submit: bool, fail_reports: bool) -> Self {
            FlakyStore {
                inner: SqliteStore::open_in_memory().unwrap(),
                fail_submit,
                fail_reports,
            }
        }
    }

    impl EarningsStore for FlakyStore {
        fn submit_import(&self, batch: &ImportBatch, status: &UploadStatusRecord) -> Result<SubmitReceipt, StoreError> {
            if self.fail_submit {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.submit_import(batch, status)
        }

        fn delete_import(&self, owner_id: &str, status: &UploadStatusRecord) -> Result<usize, StoreError> {
            self.inner.delete_import(owner_id, status)
        }

        fn upload_statuses(&self, owner_id: &str, week: WeekStart) -> Result<Vec<UploadStatusRecord>, StoreError> {
            self.inner.upload_statuses(owner_id, week)
        }

        fn weekly_earnings(&self, owner_id: &str, week: WeekStart) -> Result<Vec<StoredEarning>, StoreError> {
            self.inner.weekly_earnings(owner_id, week)
        }

        fn week_reports(&self, owner_id: &str, week: WeekStart) -> Result<Vec<PaymentReport>, StoreError> {
            self.inner.week_reports(owner_id, week)
        }

        fn save_payment_reports(
            &self,
            owner_id: &str,
            week: WeekStart,
            reports: &[PaymentReport],
        ) -> Result<(), StoreError> {
            if self.fail_reports {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.save_payment_reports(owner_id, week, reports)
        }

        fn payment_reports(
            &self,
            owner_id: &str,
            week: WeekStart,
            query: &ReportQuery,
        ) -> Result<Page<PaymentReport>, StoreError> {
            self.inner.payment_reports(owner_id, week, query)
        }

        fn reports_between(
            &self,
            owner_id: &str,
            from: WeekStart,
            to: WeekStart,
        ) -> Result<Vec<PaymentReport>, StoreError> {
            self.inner.reports_between(owner_id, from, to)
        }

        fn mark_report_paid(
            &self,
            owner_id: &str,
            report_id: Uuid,
            at: DateTime<Utc>,
        ) -> Result<Option<PaymentReport>, StoreError> {
            self.inner.mark_report_paid(owner_id, report_id, at)
        }

        fn drivers(&self, owner_id: &str) -> Result<Vec<Driver>, StoreError> {
            self.inner.drivers(owner_id)
        }

        fn commission(&self, owner_id: &str) -> Result<Option<Decimal>, StoreError> {
            self.inner.commission(owner_id)
        }

        fn set_commission(&self, owner_id: &str, amount: Decimal) -> Result<(), StoreError> {
            self.inner.set_commission(owner_id, amount)
        }
    }

    #[test]
    fn test_submission_failure_leaves_status_untouched() {
        let service = ImportService::new(FlakyStore::new(true, false), "owner-1");

        let err = service.import(&bolt_file(BOLT_CSV)).unwrap_err();
        assert!(matches!(err, ImportError::Submission(StoreError::Unavailable(_))));
        assert!(err.to_string().contains("nothing was imported"));
        assert!(!service.import_status(week()).unwrap()[0].uploaded);
    }

    /// Make every write to `upload_status` abort; reads keep working
    fn block_status_writes(service: &ImportService<SqliteStore>, blocked: bool) {
        let sql = if blocked {
            "CREATE TRIGGER block_status_insert BEFORE INSERT ON upload_status
             BEGIN SELECT RAISE(ABORT, 'status store offline'); END;
             CREATE TRIGGER block_status_update BEFORE UPDATE ON upload_status
             BEGIN SELECT RAISE(ABORT, 'status store offline'); END;"
        } else {
            "DROP TRIGGER block_status_insert; DROP TRIGGER block_status_update;"
        };
        service.store().connection().execute_batch(sql).unwrap();
    }

    #[test]
    fn test_failed_reimport_keeps_previous_import() {
        let service = service();
        service.import(&bolt_file(BOLT_CSV)).unwrap();

        block_status_writes(&service, true);
        let err = service
            .import(&bolt_file(
                "Driver,Driver's Phone,Email,Projected payout|€\nKarim Haddad,,,\"40,00\"\n",
            ))
            .unwrap_err();
        assert!(matches!(err, ImportError::Submission(_)));
        block_status_writes(&service, false);

        let bolt = &service.import_status(week()).unwrap()[0];
        let stored = service.store().weekly_earnings("owner-1", week()).unwrap();
        assert!(bolt.uploaded);
        assert_eq!(bolt.row_count, stored.len());
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|e| e.driver_name != "Karim Haddad"));
    }

    #[test]
    fn test_failed_delete_keeps_rows_and_status() {
        let service = service();
        service.import(&bolt_file(BOLT_CSV)).unwrap();

        block_status_writes(&service, true);
        assert!(service.delete(Platform::Bolt, week()).is_err());
        block_status_writes(&service, false);

        assert!(service.import_status(week()).unwrap()[0].uploaded);
        assert_eq!(service.store().weekly_earnings("owner-1", week()).unwrap().len(), 2);
    }

    #[test]
    fn test_report_failure_is_reported_on_outcome() {
        let service = ImportService::new(FlakyStore::new(false, true), "owner-1");

        let outcome = service.import(&bolt_file(BOLT_CSV)).unwrap();
        assert_eq!(outcome.accepted, 2);
        assert!(outcome.status.uploaded);
        assert_eq!(outcome.reports_rebuilt, 0);
        assert!(outcome.reports_stale());
        assert!(outcome.reports_error.as_deref().unwrap_or("").contains("disk full"));

        let fine = self::service().import(&bolt_file(BOLT_CSV)).unwrap();
        assert!(!fine.reports_stale());
    }
}
