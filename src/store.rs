// 🗄️ Storage contract - what the pipeline needs from persistence
//
// The pipeline only talks to `EarningsStore`. `SqliteStore` (db.rs) is the
// shipped implementation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RowValidationError, StoreError};
use crate::normalizer::DriverEarningInput;
use crate::platform::{Platform, WeekStart};
use crate::reconciliation::PaymentReport;
use crate::status::UploadStatusRecord;

pub const DEFAULT_PAGE_SIZE: usize = 25;

// ============================================================================
// RECORDS CROSSING THE BOUNDARY
// ============================================================================

/// One platform's normalized rows for one week, ready to submit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatch {
    pub owner_id: String,
    pub platform: Platform,
    pub week_start: WeekStart,
    pub records: Vec<DriverEarningInput>,
    #[serde(default)]
    pub file_digest: Option<String>,
}

/// What the store did with a submitted batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub accepted: usize,
    pub rejected: Vec<RowValidationError>,
}

/// One stored weekly earning, already attributed to a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEarning {
    pub driver_id: Uuid,
    pub driver_name: String,
    pub platform: Platform,
    pub week_start: WeekStart,
    pub total_revenue: Decimal,
}

/// Driver - matched across platforms by normalized full name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: Uuid,
    pub owner_id: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Filter + pagination for report listings (pages are 1-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    DEFAULT_PAGE_SIZE
}

impl ReportQuery {
    pub fn new(search: Option<String>, page: usize, per_page: usize) -> Self {
        ReportQuery {
            search: search.filter(|s| !s.trim().is_empty()),
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1) * self.per_page.max(1)
    }

    pub fn limit(&self) -> usize {
        self.per_page.max(1)
    }
}

impl Default for ReportQuery {
    fn default() -> Self {
        ReportQuery::new(None, 1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

// ============================================================================
// TRAIT
// ============================================================================

/// EarningsStore - persistence collaborator of the ingestion pipeline
///
/// Every method is scoped to one operator (`owner_id`).
pub trait EarningsStore {
    /// Replace the (platform, week) data with `batch` and record `status`
    ///
    /// Rows and status are written together: a storage failure leaves both
    /// the previous data and the previous status untouched. The stored
    /// status carries the accepted row count. Rows the store refuses are
    /// returned in `SubmitReceipt::rejected`.
    fn submit_import(&self, batch: &ImportBatch, status: &UploadStatusRecord) -> Result<SubmitReceipt, StoreError>;

    /// Remove the import `status` describes and record `status`, together
    ///
    /// Returns removed rows (0 is fine).
    fn delete_import(&self, owner_id: &str, status: &UploadStatusRecord) -> Result<usize, StoreError>;

    fn upload_statuses(&self, owner_id: &str, week: WeekStart) -> Result<Vec<UploadStatusRecord>, StoreError>;

    fn weekly_earnings(&self, owner_id: &str, week: WeekStart) -> Result<Vec<StoredEarning>, StoreError>;

    /// Every report of a week, unpaginated
    fn week_reports(&self, owner_id: &str, week: WeekStart) -> Result<Vec<PaymentReport>, StoreError>;

    /// Replace the week's pending reports with `reports`
    fn save_payment_reports(
        &self,
        owner_id: &str,
        week: WeekStart,
        reports: &[PaymentReport],
    ) -> Result<(), StoreError>;

    fn payment_reports(
        &self,
        owner_id: &str,
        week: WeekStart,
        query: &ReportQuery,
    ) -> Result<Page<PaymentReport>, StoreError>;

    /// Reports whose week starts within `[from, to]`
    fn reports_between(
        &self,
        owner_id: &str,
        from: WeekStart,
        to: WeekStart,
    ) -> Result<Vec<PaymentReport>, StoreError>;

    /// pending → paid; `None` when no such report exists
    fn mark_report_paid(
        &self,
        owner_id: &str,
        report_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<PaymentReport>, StoreError>;

    fn drivers(&self, owner_id: &str) -> Result<Vec<Driver>, StoreError>;

    fn commission(&self, owner_id: &str) -> Result<Option<Decimal>, StoreError>;

    fn set_commission(&self, owner_id: &str, amount: Decimal) -> Result<(), StoreError>;
}
