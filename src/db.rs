// 🗃️ SQLite ledger - `EarningsStore` on rusqlite, with an audit trail
//
// Money is stored as TEXT (exact decimal string), dates as ISO `YYYY-MM-DD`,
// timestamps as RFC 3339.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RowValidationError, StoreError};
use crate::names::match_key;
use crate::normalizer::DriverEarningInput;
use crate::platform::{Platform, WeekStart};
use crate::reconciliation::{search_reports, PaymentReport, ReportStatus};
use crate::status::UploadStatusRecord;
use crate::store::{Driver, EarningsStore, ImportBatch, Page, ReportQuery, StoredEarning, SubmitReceipt};

const COMMISSION_KEY: &str = "commission";

// ============================================================================
// EVENTS (audit trail)
// ============================================================================

/// Event for audit trail: every change is an event
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Entity id of one platform's import for one week
pub fn upload_entity_id(owner_id: &str, platform: Platform, week: WeekStart) -> String {
    format!("{}/{}/{}", owner_id, platform.code(), week)
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Drivers (one per owner and normalized full name)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS drivers (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            match_key TEXT NOT NULL,
            full_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            phone TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            UNIQUE (owner_id, match_key)
        )",
        [],
    )?;

    // ==========================================================================
    // Weekly earnings (one row per driver, platform and week)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS driver_earnings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            driver_id TEXT NOT NULL REFERENCES drivers(id),
            platform TEXT NOT NULL,
            week_start TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            full_name TEXT NOT NULL,
            phone TEXT NOT NULL,
            email TEXT NOT NULL,
            total_revenue TEXT NOT NULL,
            source_line INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (owner_id, platform, week_start, driver_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Upload status (one row per owner, platform and week)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS upload_status (
            owner_id TEXT NOT NULL,
            platform TEXT NOT NULL,
            week_start TEXT NOT NULL,
            uploaded INTEGER NOT NULL,
            validated INTEGER NOT NULL,
            row_count INTEGER NOT NULL DEFAULT 0,
            file_digest TEXT,
            updated_at TEXT,
            PRIMARY KEY (owner_id, platform, week_start)
        )",
        [],
    )?;

    // ==========================================================================
    // Payment reports
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment_reports (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            driver_id TEXT NOT NULL,
            driver_name TEXT NOT NULL,
            week_start TEXT NOT NULL,
            bolt_earnings TEXT NOT NULL,
            uber_earnings TEXT NOT NULL,
            heetch_earnings TEXT NOT NULL,
            total_earnings TEXT NOT NULL,
            commission_amount TEXT NOT NULL,
            total_due TEXT NOT NULL,
            status TEXT NOT NULL,
            paid_at TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (owner_id, driver_id, week_start)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            owner_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (owner_id, key)
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_earnings_week ON driver_earnings(owner_id, week_start)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reports_week ON payment_reports(owner_id, week_start)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<(), StoreError> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_at(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| conversion_error(5, e.to_string()))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// COLUMN CONVERSIONS
// ============================================================================

impl ToSql for Platform {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Platform {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for WeekStart {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for WeekStart {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn decimal_at(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|_| conversion_error(idx, format!("'{}' is not a decimal", raw)))
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|_| conversion_error(idx, format!("'{}' is not a UUID", raw)))
}

fn timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| conversion_error(idx, format!("'{}' is not an RFC 3339 timestamp", raw)))
}

fn optional_timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(_) => timestamp_at(row, idx).map(Some),
        None => Ok(None),
    }
}

const REPORT_COLUMNS: &str = "id, driver_id, driver_name, week_start, bolt_earnings, uber_earnings,
     heetch_earnings, total_earnings, commission_amount, total_due, status, paid_at";

fn report_from_row(row: &Row) -> rusqlite::Result<PaymentReport> {
    let status: String = row.get(10)?;

    Ok(PaymentReport {
        id: uuid_at(row, 0)?,
        driver_id: uuid_at(row, 1)?,
        driver_name: row.get(2)?,
        week_start: row.get(3)?,
        bolt_earnings: decimal_at(row, 4)?,
        uber_earnings: decimal_at(row, 5)?,
        heetch_earnings: decimal_at(row, 6)?,
        total_earnings: decimal_at(row, 7)?,
        commission_amount: decimal_at(row, 8)?,
        total_due: decimal_at(row, 9)?,
        status: ReportStatus::from_code(&status)
            .ok_or_else(|| conversion_error(10, format!("unknown report status '{}'", status)))?,
        paid_at: optional_timestamp_at(row, 11)?,
    })
}

fn upload_status_from_row(row: &Row) -> rusqlite::Result<UploadStatusRecord> {
    let row_count: i64 = row.get(4)?;

    Ok(UploadStatusRecord {
        platform: row.get(0)?,
        week_start: row.get(1)?,
        uploaded: row.get(2)?,
        validated: row.get(3)?,
        row_count: row_count.max(0) as usize,
        file_digest: row.get(5)?,
        updated_at: optional_timestamp_at(row, 6)?,
    })
}

fn driver_from_row(row: &Row) -> rusqlite::Result<Driver> {
    Ok(Driver {
        id: uuid_at(row, 0)?,
        owner_id: row.get(1)?,
        full_name: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        phone: row.get(5)?,
        email: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SqliteStore - one connection, one database file (or memory)
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        setup_database(&conn)?;
        debug!(path = %path.as_ref().display(), "opened earnings database");
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn events_for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>, StoreError> {
        get_events_for_entity(&self.conn, entity_type, entity_id)
    }
}

/// Find the owner's driver with the same normalized name, or create one
fn resolve_driver(conn: &Connection, owner_id: &str, record: &DriverEarningInput) -> Result<Uuid, StoreError> {
    let key = match_key(&record.full_name);

    let existing: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, phone, email FROM drivers WHERE owner_id = ?1 AND match_key = ?2",
            params![owner_id, key],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match existing {
        Some((id, phone, email)) => {
            let driver_id = Uuid::parse_str(&id).map_err(|_| StoreError::Corrupt {
                field: "drivers.id".to_string(),
                value: id.clone(),
            })?;

            let fills_phone = phone.is_empty() && !record.phone.is_empty();
            let fills_email = email.is_empty() && !record.email.is_empty();
            if fills_phone || fills_email {
                conn.execute(
                    "UPDATE drivers
                     SET phone = CASE WHEN phone = '' THEN ?1 ELSE phone END,
                         email = CASE WHEN email = '' THEN ?2 ELSE email END
                     WHERE id = ?3",
                    params![record.phone, record.email, id],
                )?;
            }
            Ok(driver_id)
        }
        None => {
            let driver_id = Uuid::new_v4();
            conn.execute(
                "INSERT INTO drivers (
                    id, owner_id, match_key, full_name, first_name, last_name, phone, email, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    driver_id.to_string(),
                    owner_id,
                    key,
                    record.full_name.trim(),
                    record.first_name,
                    record.last_name,
                    record.phone,
                    record.email,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            debug!(driver = %record.full_name, "created driver");
            Ok(driver_id)
        }
    }
}

/// Insert or overwrite the status of one (platform, week)
fn upsert_upload_status(conn: &Connection, owner_id: &str, record: &UploadStatusRecord) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO upload_status (
            owner_id, platform, week_start, uploaded, validated, row_count, file_digest, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT (owner_id, platform, week_start) DO UPDATE SET
            uploaded = excluded.uploaded,
            validated = excluded.validated,
            row_count = excluded.row_count,
            file_digest = excluded.file_digest,
            updated_at = excluded.updated_at",
        params![
            owner_id,
            record.platform,
            record.week_start,
            record.uploaded,
            record.validated,
            record.row_count as i64,
            record.file_digest,
            record.updated_at.map(|dt| dt.to_rfc3339()),
        ],
    )?;

    Ok(())
}

impl EarningsStore for SqliteStore {
    fn submit_import(&self, batch: &ImportBatch, status: &UploadStatusRecord) -> Result<SubmitReceipt, StoreError> {
        let tx = self.conn.unchecked_transaction()?;

        let replaced = tx.execute(
            "DELETE FROM driver_earnings WHERE owner_id = ?1 AND platform = ?2 AND week_start = ?3",
            params![batch.owner_id, batch.platform, batch.week_start],
        )?;

        let mut receipt = SubmitReceipt::default();
        let mut seen: HashSet<Uuid> = HashSet::new();

        for record in &batch.records {
            if record.platform != batch.platform || record.week_start != batch.week_start {
                receipt.rejected.push(RowValidationError::new(
                    record.source_line,
                    record.platform,
                    "weekStartDate",
                    &record.week_start.to_string(),
                    &format!("does not belong to the {} import of {}", batch.platform, batch.week_start),
                ));
                continue;
            }

            let driver_id = resolve_driver(&tx, &batch.owner_id, record)?;
            if !seen.insert(driver_id) {
                receipt.rejected.push(RowValidationError::new(
                    record.source_line,
                    record.platform,
                    "driver",
                    &record.full_name,
                    "appears more than once in this import",
                ));
                continue;
            }

            tx.execute(
                "INSERT INTO driver_earnings (
                    owner_id, driver_id, platform, week_start, first_name, last_name,
                    full_name, phone, email, total_revenue, source_line
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    batch.owner_id,
                    driver_id.to_string(),
                    batch.platform,
                    batch.week_start,
                    record.first_name,
                    record.last_name,
                    record.full_name,
                    record.phone,
                    record.email,
                    record.total_revenue.to_string(),
                    record.source_line as i64,
                ],
            )?;
            receipt.accepted += 1;
        }

        let event = Event::new(
            "import_submitted",
            "upload",
            &upload_entity_id(&batch.owner_id, batch.platform, batch.week_start),
            serde_json::json!({
                "accepted": receipt.accepted,
                "rejected": receipt.rejected.len(),
                "replaced": replaced,
                "file_digest": batch.file_digest,
            }),
            "import_service",
        );
        insert_event(&tx, &event)?;

        let stored_status = UploadStatusRecord {
            row_count: receipt.accepted,
            ..status.clone()
        };
        upsert_upload_status(&tx, &batch.owner_id, &stored_status)?;

        tx.commit()?;
        Ok(receipt)
    }

    fn delete_import(&self, owner_id: &str, status: &UploadStatusRecord) -> Result<usize, StoreError> {
        let (platform, week) = (status.platform, status.week_start);
        let tx = self.conn.unchecked_transaction()?;

        let removed = tx.execute(
            "DELETE FROM driver_earnings WHERE owner_id = ?1 AND platform = ?2 AND week_start = ?3",
            params![owner_id, platform, week],
        )?;

        if removed > 0 {
            let event = Event::new(
                "import_deleted",
                "upload",
                &upload_entity_id(owner_id, platform, week),
                serde_json::json!({ "removed": removed }),
                "import_service",
            );
            insert_event(&tx, &event)?;
        }
        upsert_upload_status(&tx, owner_id, status)?;

        tx.commit()?;
        Ok(removed)
    }

    fn upload_statuses(&self, owner_id: &str, week: WeekStart) -> Result<Vec<UploadStatusRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT platform, week_start, uploaded, validated, row_count, file_digest, updated_at
             FROM upload_status
             WHERE owner_id = ?1 AND week_start = ?2",
        )?;

        let records = stmt
            .query_map(params![owner_id, week], upload_status_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn weekly_earnings(&self, owner_id: &str, week: WeekStart) -> Result<Vec<StoredEarning>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT e.driver_id, d.full_name, e.platform, e.week_start, e.total_revenue
             FROM driver_earnings e
             JOIN drivers d ON d.id = e.driver_id
             WHERE e.owner_id = ?1 AND e.week_start = ?2
             ORDER BY d.full_name, e.platform",
        )?;

        let earnings = stmt
            .query_map(params![owner_id, week], |row| {
                Ok(StoredEarning {
                    driver_id: uuid_at(row, 0)?,
                    driver_name: row.get(1)?,
                    platform: row.get(2)?,
                    week_start: row.get(3)?,
                    total_revenue: decimal_at(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(earnings)
    }

    fn week_reports(&self, owner_id: &str, week: WeekStart) -> Result<Vec<PaymentReport>, StoreError> {
        let sql = format!(
            "SELECT {} FROM payment_reports
             WHERE owner_id = ?1 AND week_start = ?2
             ORDER BY driver_name COLLATE NOCASE, driver_id",
            REPORT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let reports = stmt
            .query_map(params![owner_id, week], report_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(reports)
    }

    fn save_payment_reports(
        &self,
        owner_id: &str,
        week: WeekStart,
        reports: &[PaymentReport],
    ) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM payment_reports WHERE owner_id = ?1 AND week_start = ?2 AND status = ?3",
            params![owner_id, week, ReportStatus::Pending.as_str()],
        )?;

        for report in reports.iter().filter(|r| r.week_start == week) {
            tx.execute(
                "INSERT OR REPLACE INTO payment_reports (
                    id, owner_id, driver_id, driver_name, week_start, bolt_earnings, uber_earnings,
                    heetch_earnings, total_earnings, commission_amount, total_due, status, paid_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    report.id.to_string(),
                    owner_id,
                    report.driver_id.to_string(),
                    report.driver_name,
                    report.week_start,
                    report.bolt_earnings.to_string(),
                    report.uber_earnings.to_string(),
                    report.heetch_earnings.to_string(),
                    report.total_earnings.to_string(),
                    report.commission_amount.to_string(),
                    report.total_due.to_string(),
                    report.status.as_str(),
                    report.paid_at.map(|dt| dt.to_rfc3339()),
                ],
            )?;
        }

        let event = Event::new(
            "reports_rebuilt",
            "week",
            &format!("{}/{}", owner_id, week),
            serde_json::json!({ "reports": reports.len() }),
            "reconciliation_engine",
        );
        insert_event(&tx, &event)?;

        tx.commit()?;
        Ok(())
    }

    fn payment_reports(
        &self,
        owner_id: &str,
        week: WeekStart,
        query: &ReportQuery,
    ) -> Result<Page<PaymentReport>, StoreError> {
        let reports = self.week_reports(owner_id, week)?;

        // Filtered in Rust: SQLite's LOWER() only folds ASCII
        let matching = search_reports(&reports, query.search.as_deref().unwrap_or(""));
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset())
            .take(query.limit())
            .cloned()
            .collect();

        Ok(Page {
            items,
            page: query.page,
            per_page: query.limit(),
            total,
        })
    }

    fn reports_between(
        &self,
        owner_id: &str,
        from: WeekStart,
        to: WeekStart,
    ) -> Result<Vec<PaymentReport>, StoreError> {
        let sql = format!(
            "SELECT {} FROM payment_reports
             WHERE owner_id = ?1 AND week_start BETWEEN ?2 AND ?3
             ORDER BY week_start, driver_name COLLATE NOCASE",
            REPORT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let reports = stmt
            .query_map(params![owner_id, from, to], report_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(reports)
    }

    fn mark_report_paid(
        &self,
        owner_id: &str,
        report_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<PaymentReport>, StoreError> {
        let sql = format!(
            "SELECT {} FROM payment_reports WHERE owner_id = ?1 AND id = ?2",
            REPORT_COLUMNS
        );
        let found = self
            .conn
            .query_row(&sql, params![owner_id, report_id.to_string()], report_from_row)
            .optional()?;

        let Some(mut report) = found else {
            return Ok(None);
        };

        if report.mark_paid(at) {
            let tx = self.conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE payment_reports SET status = ?1, paid_at = ?2 WHERE id = ?3",
                params![report.status.as_str(), at.to_rfc3339(), report.id.to_string()],
            )?;

            let event = Event::new(
                "report_paid",
                "payment_report",
                &report.id.to_string(),
                serde_json::json!({
                    "driver": report.driver_name,
                    "week": report.week_start.to_string(),
                    "total_due": report.total_due.to_string(),
                }),
                "operator",
            );
            insert_event(&tx, &event)?;
            tx.commit()?;

            info!(report = %report.id, driver = %report.driver_name, "payment report marked paid");
        }

        Ok(Some(report))
    }

    fn drivers(&self, owner_id: &str) -> Result<Vec<Driver>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner_id, full_name, first_name, last_name, phone, email, created_at
             FROM drivers
             WHERE owner_id = ?1
             ORDER BY full_name COLLATE NOCASE",
        )?;

        let drivers = stmt
            .query_map(params![owner_id], driver_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(drivers)
    }

    fn commission(&self, owner_id: &str) -> Result<Option<Decimal>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE owner_id = ?1 AND key = ?2",
                params![owner_id, COMMISSION_KEY],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|value| {
            Decimal::from_str(&value).map_err(|_| StoreError::Corrupt {
                field: "settings.commission".to_string(),
                value,
            })
        })
        .transpose()
    }

    fn set_commission(&self, owner_id: &str, amount: Decimal) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO settings (owner_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (owner_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![owner_id, COMMISSION_KEY, amount.to_string(), Utc::now().to_rfc3339()],
        )?;

        let event = Event::new(
            "commission_changed",
            "settings",
            owner_id,
            serde_json::json!({ "commission": amount.to_string() }),
            "operator",
        );
        insert_event(&tx, &event)?;

        tx.commit()?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
