// ⚖️ Reconciliation Engine - per-driver weekly payment reports
//
// Formula:
//   total_earnings = bolt + heetch + (uber >= 0 ? uber : 0)
//   total_due      = total_earnings - commission
//
// A negative Uber week is a net charge-back: it contributes nothing instead
// of reducing the driver's total. total_due may go negative; such reports are
// flagged, never rejected.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use crate::platform::{Platform, WeekStart};
use crate::store::StoredEarning;

// ============================================================================
// PAYMENT REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Paid,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Paid => "paid",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pending" => Some(ReportStatus::Pending),
            "paid" => Some(ReportStatus::Paid),
            _ => None,
        }
    }
}

/// PaymentReport - reconciled, commission-adjusted week for one driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReport {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub week_start: WeekStart,
    pub bolt_earnings: Decimal,
    pub uber_earnings: Decimal,
    pub heetch_earnings: Decimal,
    pub total_earnings: Decimal,
    pub commission_amount: Decimal,
    pub total_due: Decimal,
    pub status: ReportStatus,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentReport {
    /// Build a pending report from per-platform earnings
    pub fn compute(
        driver_id: Uuid,
        driver_name: &str,
        week_start: WeekStart,
        bolt: Decimal,
        uber: Decimal,
        heetch: Decimal,
        commission: Decimal,
    ) -> Self {
        let total = total_earnings(bolt, uber, heetch);

        PaymentReport {
            id: Uuid::new_v4(),
            driver_id,
            driver_name: driver_name.to_string(),
            week_start,
            bolt_earnings: bolt,
            uber_earnings: uber,
            heetch_earnings: heetch,
            total_earnings: total,
            commission_amount: commission,
            total_due: total - commission,
            status: ReportStatus::Pending,
            paid_at: None,
        }
    }

    /// Commission exceeds earnings; the operator needs to look at it
    pub fn is_overdrawn(&self) -> bool {
        self.total_due < Decimal::ZERO
    }

    pub fn is_paid(&self) -> bool {
        self.status == ReportStatus::Paid
    }

    /// pending → paid; returns false if it was already paid
    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_paid() {
            return false;
        }
        self.status = ReportStatus::Paid;
        self.paid_at = Some(at);
        true
    }
}

/// Sum of a driver's week; negative Uber amounts count as zero
pub fn total_earnings(bolt: Decimal, uber: Decimal, heetch: Decimal) -> Decimal {
    let uber_contribution = if uber >= Decimal::ZERO { uber } else { Decimal::ZERO };
    bolt + heetch + uber_contribution
}

/// `(current - previous) / previous × 100`, or 0 when previous is 0
pub fn percentage_change(current: Decimal, previous: Decimal) -> Decimal {
    if previous.is_zero() {
        return Decimal::ZERO;
    }
    ((current - previous) / previous * dec!(100)).round_dp(2)
}

// ============================================================================
// SUMMARIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySummary {
    pub week_start: WeekStart,
    pub driver_count: usize,
    pub total_earnings: Decimal,
    pub total_commission: Decimal,
    pub total_due: Decimal,
    pub overdrawn_count: usize,
    pub paid_count: usize,
}

/// Per-platform totals across all drivers of a week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueDistribution {
    pub week_start: WeekStart,
    pub bolt: Decimal,
    pub uber: Decimal,
    pub heetch: Decimal,
}

impl RevenueDistribution {
    pub fn total(&self) -> Decimal {
        self.bolt + self.uber + self.heetch
    }
}

/// Current week vs. the one before it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub current: WeeklySummary,
    pub previous: WeeklySummary,
    pub earnings_change_pct: Decimal,
    pub due_change_pct: Decimal,
    pub driver_change_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    pub year: i32,
    pub month: u32,
    pub report_count: usize,
    pub total_earnings: Decimal,
    pub total_due: Decimal,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Default)]
struct DriverWeek {
    name: String,
    bolt: Decimal,
    uber: Decimal,
    heetch: Decimal,
}

/// ReconciliationEngine - commission is injected, never looked up
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationEngine {
    commission: Decimal,
}

impl ReconciliationEngine {
    pub fn new(commission: Decimal) -> Self {
        ReconciliationEngine { commission }
    }

    pub fn commission(&self) -> Decimal {
        self.commission
    }

    /// One pending report per driver with earnings in `week`
    ///
    /// Records from other weeks are ignored. Reports come back sorted by
    /// driver name.
    pub fn build_reports(&self, week: WeekStart, earnings: &[StoredEarning]) -> Vec<PaymentReport> {
        let mut drivers: BTreeMap<Uuid, DriverWeek> = BTreeMap::new();

        for earning in earnings.iter().filter(|e| e.week_start == week) {
            let entry = drivers.entry(earning.driver_id).or_default();
            if entry.name.is_empty() {
                entry.name = earning.driver_name.clone();
            }
            match earning.platform {
                Platform::Bolt => entry.bolt += earning.total_revenue,
                Platform::Uber => entry.uber += earning.total_revenue,
                Platform::Heetch => entry.heetch += earning.total_revenue,
            }
        }

        let mut reports: Vec<PaymentReport> = drivers
            .into_iter()
            .map(|(driver_id, d)| {
                PaymentReport::compute(
                    driver_id,
                    &d.name,
                    week,
                    d.bolt,
                    d.uber,
                    d.heetch,
                    self.commission,
                )
            })
            .collect();

        reports.sort_by(|a, b| {
            a.driver_name
                .to_lowercase()
                .cmp(&b.driver_name.to_lowercase())
                .then(a.driver_id.cmp(&b.driver_id))
        });
        reports
    }

    /// Reconcile freshly built reports with what was stored before
    ///
    /// Pending reports keep their id and take the new amounts. Paid reports are
    /// history and stay exactly as they were, even when their driver no longer
    /// has earnings for the week.
    pub fn merge_existing(
        &self,
        fresh: Vec<PaymentReport>,
        existing: &[PaymentReport],
    ) -> Vec<PaymentReport> {
        let mut previous: BTreeMap<Uuid, &PaymentReport> =
            existing.iter().map(|r| (r.driver_id, r)).collect();

        let mut merged = Vec::with_capacity(fresh.len());
        for mut report in fresh {
            match previous.remove(&report.driver_id) {
                Some(old) if old.is_paid() => {
                    if old.total_due != report.total_due {
                        warn!(
                            driver = %old.driver_name,
                            week = %old.week_start,
                            paid = %old.total_due,
                            recomputed = %report.total_due,
                            "paid report differs from recomputed amount, keeping paid report"
                        );
                    }
                    merged.push(old.clone());
                }
                Some(old) => {
                    report.id = old.id;
                    merged.push(report);
                }
                None => merged.push(report),
            }
        }

        merged.extend(previous.into_values().filter(|r| r.is_paid()).cloned());
        merged
    }

    pub fn weekly_summary(&self, week: WeekStart, reports: &[PaymentReport]) -> WeeklySummary {
        let in_week: Vec<&PaymentReport> = reports.iter().filter(|r| r.week_start == week).collect();

        WeeklySummary {
            week_start: week,
            driver_count: in_week.len(),
            total_earnings: in_week.iter().map(|r| r.total_earnings).sum(),
            total_commission: in_week.iter().map(|r| r.commission_amount).sum(),
            total_due: in_week.iter().map(|r| r.total_due).sum(),
            overdrawn_count: in_week.iter().filter(|r| r.is_overdrawn()).count(),
            paid_count: in_week.iter().filter(|r| r.is_paid()).count(),
        }
    }

    /// Raw per-platform sums for charts; no business rule applied
    pub fn revenue_distribution(
        &self,
        week: WeekStart,
        earnings: &[StoredEarning],
    ) -> RevenueDistribution {
        let sum_for = |platform: Platform| -> Decimal {
            earnings
                .iter()
                .filter(|e| e.week_start == week && e.platform == platform)
                .map(|e| e.total_revenue)
                .sum()
        };

        RevenueDistribution {
            week_start: week,
            bolt: sum_for(Platform::Bolt),
            uber: sum_for(Platform::Uber),
            heetch: sum_for(Platform::Heetch),
        }
    }

    pub fn compare_periods(&self, current: WeeklySummary, previous: WeeklySummary) -> PeriodComparison {
        let earnings_change_pct = percentage_change(current.total_earnings, previous.total_earnings);
        let due_change_pct = percentage_change(current.total_due, previous.total_due);
        let driver_change_pct = percentage_change(
            Decimal::from(current.driver_count as u64),
            Decimal::from(previous.driver_count as u64),
        );

        PeriodComparison {
            current,
            previous,
            earnings_change_pct,
            due_change_pct,
            driver_change_pct,
        }
    }

    /// Group reports by the calendar month their week starts in
    pub fn monthly_revenue(&self, reports: &[PaymentReport]) -> Vec<MonthlyRevenue> {
        let mut months: BTreeMap<(i32, u32), MonthlyRevenue> = BTreeMap::new();

        for report in reports {
            let date = report.week_start.date();
            let entry = months
                .entry((date.year(), date.month()))
                .or_insert_with(|| MonthlyRevenue {
                    year: date.year(),
                    month: date.month(),
                    report_count: 0,
                    total_earnings: Decimal::ZERO,
                    total_due: Decimal::ZERO,
                });
            entry.report_count += 1;
            entry.total_earnings += report.total_earnings;
            entry.total_due += report.total_due;
        }

        months.into_values().collect()
    }
}

/// Case-insensitive driver-name filter
pub fn search_reports<'a>(reports: &'a [PaymentReport], term: &str) -> Vec<&'a PaymentReport> {
    let needle = term.trim().to_lowercase();
    reports
        .iter()
        .filter(|r| needle.is_empty() || r.driver_name.to_lowercase().contains(&needle))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
