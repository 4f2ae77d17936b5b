// 🏗️ Format Adapters - one parser per platform export
//
// Bolt / Uber: CSV with a header row
// Heetch:      PDF statement, scanned line by line with two patterns

use csv::{ReaderBuilder, StringRecord, Trim};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::FormatError;
use crate::platform::Platform;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Bolt export row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoltRow {
    pub line: usize,
    pub driver_full_name: String,
    pub phone: String,
    pub email: String,
    /// e.g. "123,45 €" or "123.45"
    pub projected_payout: String,
}

/// Uber export row (amounts are signed numeric strings)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UberRow {
    pub line: usize,
    pub driver_id: String,
    pub first_name: String,
    pub last_name: String,
    pub total_revenue: String,
    pub refunds: String,
    pub payouts: String,
}

/// Heetch statement line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeetchRow {
    pub line: usize,
    pub driver_full_name: String,
    /// e.g. "87,20 €"
    pub transfer_amount: String,
}

/// PlatformRow - output of adapter.parse(), before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformRow {
    Bolt(BoltRow),
    Uber(UberRow),
    Heetch(HeetchRow),
}

impl PlatformRow {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformRow::Bolt(_) => Platform::Bolt,
            PlatformRow::Uber(_) => Platform::Uber,
            PlatformRow::Heetch(_) => Platform::Heetch,
        }
    }

    /// 1-based line in the source file
    pub fn line(&self) -> usize {
        match self {
            PlatformRow::Bolt(r) => r.line,
            PlatformRow::Uber(r) => r.line,
            PlatformRow::Heetch(r) => r.line,
        }
    }
}

// ============================================================================
// TRAITS
// ============================================================================

/// PlatformAdapter - turns raw file content into platform-native rows
pub trait PlatformAdapter: Send + Sync {
    /// Parse the full content of an export file
    ///
    /// Fails fast with a `FormatError` when the file is structurally wrong;
    /// individual bad values are left for the normalizer to report.
    fn parse(&self, content: &[u8]) -> Result<Vec<PlatformRow>, FormatError>;

    /// Platform this adapter handles
    fn platform(&self) -> Platform;
}

/// ContentValidator - cheap check whether an adapter recognises a file
pub trait ContentValidator {
    fn can_parse(&self, content: &[u8]) -> bool;
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Get the adapter for a platform
pub fn get_adapter(platform: Platform) -> Box<dyn PlatformAdapter> {
    match platform {
        Platform::Bolt => Box::new(BoltAdapter::new()),
        Platform::Uber => Box::new(UberAdapter::new()),
        Platform::Heetch => Box::new(HeetchAdapter::new()),
    }
}

/// Detect which platform produced a file from its content
///
/// PDF magic → Heetch, `Driver` column → Bolt, Uber's French column set → Uber.
pub fn detect_platform(content: &[u8]) -> Result<Platform, FormatError> {
    if HeetchAdapter::new().can_parse(content) {
        return Ok(Platform::Heetch);
    }
    if BoltAdapter::new().can_parse(content) {
        return Ok(Platform::Bolt);
    }
    if UberAdapter::new().can_parse(content) {
        return Ok(Platform::Uber);
    }

    let found = csv_text(content)
        .ok()
        .and_then(|text| text.lines().next().map(|l| l.trim().to_string()))
        .unwrap_or_default();
    Err(FormatError::UnrecognizedHeaders { found })
}

/// Parse off the calling thread; dropping the future discards the result
#[cfg(feature = "server")]
pub async fn parse_in_background(
    platform: Platform,
    content: Vec<u8>,
) -> Result<Vec<PlatformRow>, FormatError> {
    tokio::task::spawn_blocking(move || get_adapter(platform).parse(&content))
        .await
        .map_err(|e| FormatError::Pdf(format!("extraction task failed: {}", e)))?
}

// ============================================================================
// CSV HELPERS
// ============================================================================

fn csv_text(content: &[u8]) -> Result<&str, FormatError> {
    let text = std::str::from_utf8(content).map_err(|_| FormatError::InvalidUtf8)?;
    Ok(text.trim_start_matches('\u{feff}'))
}

/// French exports are sometimes `;`-separated
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

fn csv_headers(content: &[u8]) -> Option<Vec<String>> {
    let text = csv_text(content).ok()?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .delimiter(sniff_delimiter(text))
        .from_reader(text.as_bytes());
    let headers = reader.headers().ok()?;
    Some(headers.iter().map(|h| h.to_string()).collect())
}

/// Read a CSV export and locate the required columns
///
/// Returns the column indexes (same order as `required`) and the data records
/// paired with their 1-based line numbers.
fn read_csv(
    content: &[u8],
    platform: Platform,
    required: &[&str],
) -> Result<(Vec<usize>, Vec<(usize, StringRecord)>), FormatError> {
    let text = csv_text(content)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(sniff_delimiter(text))
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();

    let mut indexes = Vec::with_capacity(required.len());
    let mut missing = Vec::new();
    for column in required {
        match headers.iter().position(|h| h == *column) {
            Some(idx) => indexes.push(idx),
            None => missing.push(column.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(FormatError::MissingColumns { platform, missing });
    }

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2); // 1-indexed + header row
        records.push((line, record));
    }

    Ok((indexes, records))
}

fn field(record: &StringRecord, idx: usize) -> String {
    record.get(idx).unwrap_or("").to_string()
}

// ============================================================================
// BOLT
// ============================================================================

pub const BOLT_DRIVER: &str = "Driver";
pub const BOLT_PHONE: &str = "Driver's Phone";
pub const BOLT_EMAIL: &str = "Email";
pub const BOLT_PAYOUT: &str = "Projected payout|€";

const BOLT_COLUMNS: [&str; 4] = [BOLT_DRIVER, BOLT_PHONE, BOLT_EMAIL, BOLT_PAYOUT];

/// Bolt weekly earnings CSV
pub struct BoltAdapter;

impl BoltAdapter {
    pub fn new() -> Self {
        BoltAdapter
    }
}

impl Default for BoltAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformAdapter for BoltAdapter {
    fn parse(&self, content: &[u8]) -> Result<Vec<PlatformRow>, FormatError> {
        let (cols, records) = read_csv(content, Platform::Bolt, &BOLT_COLUMNS)?;

        let mut rows = Vec::new();
        for (line, record) in records {
            let driver = field(&record, cols[0]);

            // Summary and spacer lines have no driver
            if driver.is_empty() {
                debug!(line, "bolt: skipping row without driver");
                continue;
            }

            rows.push(PlatformRow::Bolt(BoltRow {
                line,
                driver_full_name: driver,
                phone: field(&record, cols[1]),
                email: field(&record, cols[2]),
                projected_payout: field(&record, cols[3]),
            }));
        }

        Ok(rows)
    }

    fn platform(&self) -> Platform {
        Platform::Bolt
    }
}

impl ContentValidator for BoltAdapter {
    fn can_parse(&self, content: &[u8]) -> bool {
        csv_headers(content)
            .map(|headers| headers.iter().any(|h| h == BOLT_DRIVER))
            .unwrap_or(false)
    }
}

// ============================================================================
// UBER
// ============================================================================

pub const UBER_DRIVER_ID: &str = "UUID du chauffeur";
pub const UBER_FIRST_NAME: &str = "Prénom du chauffeur";
pub const UBER_LAST_NAME: &str = "Nom du chauffeur";
pub const UBER_TOTAL_REVENUE: &str = "Revenus totaux";
pub const UBER_REFUNDS: &str = "Remboursements et notes de frais";
pub const UBER_PAYOUTS: &str = "Versements";

const UBER_COLUMNS: [&str; 6] = [
    UBER_DRIVER_ID,
    UBER_FIRST_NAME,
    UBER_LAST_NAME,
    UBER_TOTAL_REVENUE,
    UBER_REFUNDS,
    UBER_PAYOUTS,
];

/// Uber weekly payments CSV (French export)
pub struct UberAdapter;

impl UberAdapter {
    pub fn new() -> Self {
        UberAdapter
    }
}

impl Default for UberAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformAdapter for UberAdapter {
    fn parse(&self, content: &[u8]) -> Result<Vec<PlatformRow>, FormatError> {
        let (cols, records) = read_csv(content, Platform::Uber, &UBER_COLUMNS)?;

        let mut rows = Vec::new();
        for (line, record) in records {
            if record.iter().all(|v| v.is_empty()) {
                debug!(line, "uber: skipping blank row");
                continue;
            }

            rows.push(PlatformRow::Uber(UberRow {
                line,
                driver_id: field(&record, cols[0]),
                first_name: field(&record, cols[1]),
                last_name: field(&record, cols[2]),
                total_revenue: field(&record, cols[3]),
                refunds: field(&record, cols[4]),
                payouts: field(&record, cols[5]),
            }));
        }

        Ok(rows)
    }

    fn platform(&self) -> Platform {
        Platform::Uber
    }
}

impl ContentValidator for UberAdapter {
    fn can_parse(&self, content: &[u8]) -> bool {
        csv_headers(content)
            .map(|headers| {
                !headers.iter().any(|h| h == BOLT_DRIVER)
                    && headers.iter().any(|h| h == UBER_FIRST_NAME)
            })
            .unwrap_or(false)
    }
}

// ============================================================================
// HEETCH
// ============================================================================

fn heetch_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Chauffeur\s*:?\s*(.+?)\s*Montant du virement").expect("valid regex")
    })
}

fn heetch_amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+,\d{2}\s*€").expect("valid regex"))
}

/// Heetch weekly statement PDF
///
/// Statements are free-form text, not tables: this adapter is best-effort and
/// skips every line that does not carry both a driver name and an amount.
#[derive(Debug, Clone, Default)]
pub struct HeetchAdapter;

impl HeetchAdapter {
    pub fn new() -> Self {
        HeetchAdapter
    }

    /// Extract the text of every page; page breaks become newlines
    pub fn extract_text(&self, content: &[u8]) -> Result<String, FormatError> {
        if !self.can_parse(content) {
            return Err(FormatError::Pdf("missing %PDF header".to_string()));
        }

        // pdf-extract panics on some malformed documents
        let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(content))
            .map_err(|_| FormatError::Pdf("document could not be decoded".to_string()))?
            .map_err(|e| FormatError::Pdf(e.to_string()))?;

        Ok(text.replace('\u{c}', "\n"))
    }

    /// Scan statement text for driver lines
    ///
    /// Pure: the same text always yields the same rows.
    pub fn extract_table_data(&self, text: &str) -> Vec<HeetchRow> {
        let mut rows = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let name = heetch_name_pattern()
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim())
                .filter(|n| !n.is_empty());
            let amount = heetch_amount_pattern().find(line).map(|m| m.as_str());

            match (name, amount) {
                (Some(name), Some(amount)) => rows.push(HeetchRow {
                    line: idx + 1,
                    driver_full_name: name.to_string(),
                    transfer_amount: amount.to_string(),
                }),
                _ => {
                    if !line.trim().is_empty() {
                        debug!(line = idx + 1, "heetch: line does not describe a transfer");
                    }
                }
            }
        }

        rows
    }

    /// Rows from already-extracted text; zero rows is a format error
    pub fn rows_from_text(&self, text: &str) -> Result<Vec<PlatformRow>, FormatError> {
        let rows: Vec<PlatformRow> = self
            .extract_table_data(text)
            .into_iter()
            .map(PlatformRow::Heetch)
            .collect();

        if rows.is_empty() {
            return Err(FormatError::NoRows {
                platform: Platform::Heetch,
            });
        }
        Ok(rows)
    }
}

impl PlatformAdapter for HeetchAdapter {
    fn parse(&self, content: &[u8]) -> Result<Vec<PlatformRow>, FormatError> {
        let text = self.extract_text(content)?;
        self.rows_from_text(&text)
    }

    fn platform(&self) -> Platform {
        Platform::Heetch
    }
}

impl ContentValidator for HeetchAdapter {
    fn can_parse(&self, content: &[u8]) -> bool {
        content.starts_with(b"%PDF-")
    }
}

// ============================================================================
// TESTS
// ============================================================================
