// 🧹 Row Normalizer - platform rows → canonical earnings records
//
// Pure and total: a bad value in one row becomes a RowValidationError for
// that row, never a failure of the whole batch.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

use crate::error::RowValidationError;
use crate::names::{FirstTokenNameParser, NameParser};
use crate::parser::{BoltRow, HeetchRow, PlatformRow, UberRow};
use crate::parser::{BOLT_PAYOUT, UBER_FIRST_NAME, UBER_PAYOUTS, UBER_REFUNDS, UBER_TOTAL_REVENUE};
use crate::platform::{Platform, WeekStart};

// ============================================================================
// CANONICAL RECORD
// ============================================================================

/// DriverEarningInput - one driver's weekly revenue from one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverEarningInput {
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    /// 2-decimal amount in euros
    pub total_revenue: Decimal,
    pub platform: Platform,
    pub week_start: WeekStart,
    pub owner_id: String,
    /// Line in the export this record came from
    #[serde(default)]
    pub source_line: usize,
}

/// Who is importing what, for which week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportContext {
    pub platform: Platform,
    pub week_start: WeekStart,
    pub owner_id: String,
}

impl ImportContext {
    pub fn new(platform: Platform, week_start: WeekStart, owner_id: &str) -> Self {
        ImportContext {
            platform,
            week_start,
            owner_id: owner_id.to_string(),
        }
    }
}

/// Result of normalizing a batch: good records plus per-row failures
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizedBatch {
    pub records: Vec<DriverEarningInput>,
    pub errors: Vec<RowValidationError>,
}

impl NormalizedBatch {
    pub fn total_rows(&self) -> usize {
        self.records.len() + self.errors.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Sum of every accepted record's revenue
    pub fn total_revenue(&self) -> Decimal {
        self.records.iter().map(|r| r.total_revenue).sum()
    }
}

// ============================================================================
// AMOUNTS
// ============================================================================

/// Parse an export amount: "123,45 €", "1 234,50", "-200.00", "87,20€"
///
/// Currency signs and whitespace (including non-breaking spaces) are dropped,
/// the decimal comma becomes a period, and the result is rounded to cents.
/// Largest weekly amount accepted for one driver, in either direction
///
/// Keeps every later sum (weeks, months, comparisons) far from `Decimal`'s range.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

pub fn parse_amount(raw: &str) -> Result<Decimal, &'static str> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€')
        .collect();
    let cleaned = cleaned
        .strip_suffix("EUR")
        .unwrap_or(&cleaned)
        .replace(',', ".");

    if cleaned.is_empty() {
        return Err("is empty");
    }

    let value = Decimal::from_str(&cleaned).map_err(|_| "is not a number")?;
    if value.abs() > MAX_AMOUNT {
        return Err("is out of range");
    }
    Ok(value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Like `parse_amount`, but a blank cell counts as zero
pub fn parse_optional_amount(raw: &str) -> Result<Decimal, &'static str> {
    if raw.trim().is_empty() {
        Ok(Decimal::ZERO)
    } else {
        parse_amount(raw)
    }
}

/// Heetch amount: numeric portion before the currency annotation
pub fn parse_heetch_amount(raw: &str) -> Result<Decimal, &'static str> {
    let numeric = raw.split('€').next().unwrap_or("");
    parse_amount(numeric)
}

/// Uber weekly revenue
///
/// Payouts are always subtracted as a positive correction, whatever sign the
/// export gives them: `+payouts` when `payouts <= 0`, `-payouts` when `payouts > 0`.
pub fn uber_revenue(total_revenue: Decimal, refunds: Decimal, payouts: Decimal) -> Decimal {
    (total_revenue + refunds) - payouts.abs()
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// RowNormalizer - maps PlatformRow into DriverEarningInput
pub struct RowNormalizer {
    bolt_names: Box<dyn NameParser>,
    heetch_names: Box<dyn NameParser>,
}

impl RowNormalizer {
    /// Default rules: Bolt last name = tokens 2-4, Heetch = all remaining tokens
    pub fn new() -> Self {
        RowNormalizer {
            bolt_names: Box::new(FirstTokenNameParser::bolt()),
            heetch_names: Box::new(FirstTokenNameParser::unbounded()),
        }
    }

    /// Substitute name-splitting rules
    pub fn with_name_parsers(
        bolt_names: Box<dyn NameParser>,
        heetch_names: Box<dyn NameParser>,
    ) -> Self {
        RowNormalizer {
            bolt_names,
            heetch_names,
        }
    }

    /// Normalize every row; failures are collected, not fatal
    pub fn normalize(&self, rows: &[PlatformRow], ctx: &ImportContext) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        for row in rows {
            match self.normalize_row(row, ctx) {
                Ok(record) => batch.records.push(record),
                Err(err) => {
                    warn!(error = %err, "row rejected during normalization");
                    batch.errors.push(err);
                }
            }
        }

        batch
    }

    pub fn normalize_row(
        &self,
        row: &PlatformRow,
        ctx: &ImportContext,
    ) -> Result<DriverEarningInput, RowValidationError> {
        if row.platform() != ctx.platform {
            return Err(RowValidationError::new(
                row.line(),
                row.platform(),
                "platform",
                row.platform().code(),
                &format!("does not match the {} import", ctx.platform),
            ));
        }

        match row {
            PlatformRow::Bolt(r) => self.normalize_bolt(r, ctx),
            PlatformRow::Uber(r) => self.normalize_uber(r, ctx),
            PlatformRow::Heetch(r) => self.normalize_heetch(r, ctx),
        }
    }

    fn normalize_bolt(
        &self,
        row: &BoltRow,
        ctx: &ImportContext,
    ) -> Result<DriverEarningInput, RowValidationError> {
        let total_revenue = parse_amount(&row.projected_payout).map_err(|reason| {
            RowValidationError::new(row.line, Platform::Bolt, BOLT_PAYOUT, &row.projected_payout, reason)
        })?;

        let name = self.bolt_names.split(&row.driver_full_name);

        Ok(DriverEarningInput {
            first_name: name.first_name,
            last_name: name.last_name,
            full_name: row.driver_full_name.clone(),
            phone: row.phone.clone(),
            email: row.email.clone(),
            total_revenue,
            platform: Platform::Bolt,
            week_start: ctx.week_start,
            owner_id: ctx.owner_id.clone(),
            source_line: row.line,
        })
    }

    fn normalize_uber(
        &self,
        row: &UberRow,
        ctx: &ImportContext,
    ) -> Result<DriverEarningInput, RowValidationError> {
        let amount = |column: &str, raw: &str| {
            parse_optional_amount(raw)
                .map_err(|reason| RowValidationError::new(row.line, Platform::Uber, column, raw, reason))
        };

        let total = amount(UBER_TOTAL_REVENUE, &row.total_revenue)?;
        let refunds = amount(UBER_REFUNDS, &row.refunds)?;
        let payouts = amount(UBER_PAYOUTS, &row.payouts)?;

        let full_name = format!("{} {}", row.first_name, row.last_name)
            .trim()
            .to_string();
        if full_name.is_empty() {
            return Err(RowValidationError::new(
                row.line,
                Platform::Uber,
                UBER_FIRST_NAME,
                "",
                "driver name is empty",
            ));
        }

        Ok(DriverEarningInput {
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            full_name,
            phone: String::new(),
            email: String::new(),
            total_revenue: uber_revenue(total, refunds, payouts),
            platform: Platform::Uber,
            week_start: ctx.week_start,
            owner_id: ctx.owner_id.clone(),
            source_line: row.line,
        })
    }

    fn normalize_heetch(
        &self,
        row: &HeetchRow,
        ctx: &ImportContext,
    ) -> Result<DriverEarningInput, RowValidationError> {
        let total_revenue = parse_heetch_amount(&row.transfer_amount).map_err(|reason| {
            RowValidationError::new(
                row.line,
                Platform::Heetch,
                "Montant du virement",
                &row.transfer_amount,
                reason,
            )
        })?;

        let name = self.heetch_names.split(&row.driver_full_name);

        Ok(DriverEarningInput {
            first_name: name.first_name,
            last_name: name.last_name,
            full_name: row.driver_full_name.clone(),
            phone: String::new(),
            email: String::new(),
            total_revenue,
            platform: Platform::Heetch,
            week_start: ctx.week_start,
            owner_id: ctx.owner_id.clone(),
            source_line: row.line,
        })
    }
}

impl Default for RowNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::PersonName;
    use crate::parser::{BoltAdapter, PlatformAdapter, UberAdapter};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn week() -> WeekStart {
        WeekStart::new(NaiveDate::from_ymd_opt(2025, 1, 13).unwrap()).unwrap()
    }

    fn ctx(platform: Platform) -> ImportContext {
        ImportContext::new(platform, week(), "owner-1")
    }

    fn uber_row(total: &str, refunds: &str, payouts: &str) -> PlatformRow {
        PlatformRow::Uber(UberRow {
            line: 2,
            driver_id: "a1b2".to_string(),
            first_name: "Amine".to_string(),
            last_name: "Benali".to_string(),
            total_revenue: total.to_string(),
            refunds: refunds.to_string(),
            payouts: payouts.to_string(),
        })
    }

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount("123,45 €").unwrap(), dec!(123.45));
        assert_eq!(parse_amount("123.45").unwrap(), dec!(123.45));
        assert_eq!(parse_amount("1\u{a0}234,50").unwrap(), dec!(1234.50));
        assert_eq!(parse_amount("-200.00").unwrap(), dec!(-200));
        assert_eq!(parse_amount("12,345").unwrap(), dec!(12.35));
        assert_eq!(parse_amount("42 EUR").unwrap(), dec!(42));
        assert_eq!(parse_amount(""), Err("is empty"));
        assert_eq!(parse_amount("N/A"), Err("is not a number"));
    }

    #[test]
    fn test_parse_amount_rejects_out_of_range() {
        assert_eq!(parse_amount("1000000000,00").unwrap(), MAX_AMOUNT);
        assert_eq!(parse_amount("50000000000000000000000000000"), Err("is out of range"));
        assert_eq!(parse_amount("-1000000000,01"), Err("is out of range"));
        assert_eq!(parse_optional_amount("99999999999999"), Err("is out of range"));
    }

    #[test]
    fn test_jean_paul_martin_example() {
        let csv = "Driver,Driver's Phone,Email,Projected payout|€\n\
            Jean Paul Martin,0601020304,jp@x.com,\"123,45\"\n";
        let rows = BoltAdapter::new().parse(csv.as_bytes()).unwrap();
        let batch = RowNormalizer::new().normalize(&rows, &ctx(Platform::Bolt));

        assert!(batch.is_clean());
        let record = &batch.records[0];
        assert_eq!(record.first_name, "Jean");
        assert_eq!(record.last_name, "Paul Martin");
        assert_eq!(record.full_name, "Jean Paul Martin");
        assert_eq!(record.phone, "0601020304");
        assert_eq!(record.email, "jp@x.com");
        assert_eq!(record.total_revenue, dec!(123.45));
        assert_eq!(record.platform, Platform::Bolt);
        assert_eq!(record.week_start, week());
        assert_eq!(record.owner_id, "owner-1");
    }

    #[test]
    fn test_uber_revenue_with_negative_payouts() {
        // payouts <= 0: total + refunds + payouts
        let record = RowNormalizer::new()
            .normalize_row(&uber_row("250.50", "10.00", "-200.00"), &ctx(Platform::Uber))
            .unwrap();
        assert_eq!(record.total_revenue, dec!(250.50) + dec!(10.00) + dec!(-200.00));
        assert_eq!(record.full_name, "Amine Benali");
        assert_eq!(record.phone, "");
        assert_eq!(record.email, "");
    }

    #[test]
    fn test_uber_revenue_with_positive_payouts() {
        // payouts > 0: total + refunds - payouts
        let record = RowNormalizer::new()
            .normalize_row(&uber_row("250.50", "10.00", "30.00"), &ctx(Platform::Uber))
            .unwrap();
        assert_eq!(record.total_revenue, dec!(250.50) + dec!(10.00) - dec!(30.00));
    }

    #[test]
    fn test_uber_blank_cells_count_as_zero() {
        let record = RowNormalizer::new()
            .normalize_row(&uber_row("80,00", "", ""), &ctx(Platform::Uber))
            .unwrap();
        assert_eq!(record.total_revenue, dec!(80));
    }

    #[test]
    fn test_uber_from_csv() {
        let csv = "UUID du chauffeur,Prénom du chauffeur,Nom du chauffeur,Revenus totaux,Remboursements et notes de frais,Versements\n\
            a1b2,Amine,Benali,\"250,50\",\"10,00\",\"-200,00\"\n";
        let rows = UberAdapter::new().parse(csv.as_bytes()).unwrap();
        let batch = RowNormalizer::new().normalize(&rows, &ctx(Platform::Uber));
        assert_eq!(batch.records[0].total_revenue, dec!(60.50));
    }

    #[test]
    fn test_heetch_row() {
        let row = PlatformRow::Heetch(HeetchRow {
            line: 4,
            driver_full_name: "Karim Ben Haddad".to_string(),
            transfer_amount: "87,20 €".to_string(),
        });
        let record = RowNormalizer::new()
            .normalize_row(&row, &ctx(Platform::Heetch))
            .unwrap();

        assert_eq!(record.first_name, "Karim");
        assert_eq!(record.last_name, "Ben Haddad");
        assert_eq!(record.total_revenue, dec!(87.20));
        assert_eq!(record.source_line, 4);
    }

    #[test]
    fn test_row_errors_are_collected_not_fatal() {
        let rows = vec![
            uber_row("100", "0", "0"),
            uber_row("abc", "0", "0"),
            uber_row("50", "x", "0"),
        ];
        let batch = RowNormalizer::new().normalize(&rows, &ctx(Platform::Uber));

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.errors.len(), 2);
        assert_eq!(batch.total_rows(), 3);
        assert_eq!(batch.errors[0].field, UBER_TOTAL_REVENUE);
        assert_eq!(batch.errors[0].value, "abc");
        assert_eq!(batch.errors[1].field, UBER_REFUNDS);
    }

    #[test]
    fn test_platform_mismatch_is_row_error() {
        let err = RowNormalizer::new()
            .normalize_row(&uber_row("1", "0", "0"), &ctx(Platform::Bolt))
            .unwrap_err();
        assert_eq!(err.field, "platform");
    }

    struct LastFirst;

    impl NameParser for LastFirst {
        fn split(&self, full_name: &str) -> PersonName {
            let (last, first) = full_name.split_once(' ').unwrap_or((full_name, ""));
            PersonName {
                first_name: first.to_string(),
                last_name: last.to_string(),
            }
        }
    }

    #[test]
    fn test_name_parser_is_pluggable() {
        let normalizer = RowNormalizer::with_name_parsers(Box::new(LastFirst), Box::new(LastFirst));
        let row = PlatformRow::Bolt(BoltRow {
            line: 2,
            driver_full_name: "MARTIN Jean".to_string(),
            phone: String::new(),
            email: String::new(),
            projected_payout: "10".to_string(),
        });
        let record = normalizer.normalize_row(&row, &ctx(Platform::Bolt)).unwrap();
        assert_eq!(record.first_name, "Jean");
        assert_eq!(record.last_name, "MARTIN");
    }
}
