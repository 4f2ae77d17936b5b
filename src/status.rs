// 🚦 Upload Status Tracker - one state machine per (platform, ISO week)
//
//   NotUploaded --submitted--> Uploaded(+Validated) --deleted--> NotUploaded
//
// `validated` always mirrors `uploaded`: there is no separate confirmation
// step that survives the storage boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::platform::{Platform, WeekStart};

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    NotUploaded,
    Uploaded,
    Validated,
}

impl UploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::NotUploaded => "not uploaded",
            UploadState::Uploaded => "uploaded",
            UploadState::Validated => "validated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadEvent {
    /// A batch was normalized and accepted by the store
    Submitted {
        row_count: usize,
        file_digest: Option<String>,
    },
    /// The operator deleted the week's import
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State changed (or was overwritten by a re-upload)
    Applied { from: UploadState, to: UploadState },
    /// Delete of an import that does not exist: nothing to do
    Conflict,
}

// ============================================================================
// RECORD
// ============================================================================

/// UploadStatusRecord - what the rest of the system sees per platform/week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusRecord {
    pub platform: Platform,
    pub week_start: WeekStart,
    pub uploaded: bool,
    pub validated: bool,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub file_digest: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UploadStatusRecord {
    /// Initial state
    pub fn not_uploaded(platform: Platform, week_start: WeekStart) -> Self {
        UploadStatusRecord {
            platform,
            week_start,
            uploaded: false,
            validated: false,
            row_count: 0,
            file_digest: None,
            updated_at: None,
        }
    }

    pub fn state(&self) -> UploadState {
        match (self.uploaded, self.validated) {
            (true, true) => UploadState::Validated,
            (true, false) => UploadState::Uploaded,
            _ => UploadState::NotUploaded,
        }
    }

    /// Apply an event; re-submission overwrites, deleting nothing is a no-op
    pub fn apply(&mut self, event: &UploadEvent, at: DateTime<Utc>) -> Transition {
        let from = self.state();

        match event {
            UploadEvent::Submitted {
                row_count,
                file_digest,
            } => {
                self.uploaded = true;
                self.validated = self.uploaded;
                self.row_count = *row_count;
                self.file_digest = file_digest.clone();
                self.updated_at = Some(at);
            }
            UploadEvent::Deleted => {
                if !self.uploaded {
                    return Transition::Conflict;
                }
                self.uploaded = false;
                self.validated = self.uploaded;
                self.row_count = 0;
                self.file_digest = None;
                self.updated_at = Some(at);
            }
        }

        Transition::Applied {
            from,
            to: self.state(),
        }
    }
}

// ============================================================================
// TRACKER
// ============================================================================

/// UploadStatusTracker - the status records of one operator
///
/// Exposes enough to enforce the Bolt → Uber → Heetch order from outside,
/// but never rejects an out-of-order import itself.
#[derive(Debug, Clone, Default)]
pub struct UploadStatusTracker {
    records: HashMap<(Platform, WeekStart), UploadStatusRecord>,
}

impl UploadStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records
    pub fn from_records(records: impl IntoIterator<Item = UploadStatusRecord>) -> Self {
        let mut tracker = Self::new();
        for record in records {
            tracker
                .records
                .insert((record.platform, record.week_start), record);
        }
        tracker
    }

    pub fn status(&self, platform: Platform, week: WeekStart) -> UploadStatusRecord {
        self.records
            .get(&(platform, week))
            .cloned()
            .unwrap_or_else(|| UploadStatusRecord::not_uploaded(platform, week))
    }

    /// Exactly one record per platform, in import order
    pub fn week_status(&self, week: WeekStart) -> Vec<UploadStatusRecord> {
        Platform::IMPORT_ORDER
            .iter()
            .map(|p| self.status(*p, week))
            .collect()
    }

    pub fn record_upload(
        &mut self,
        platform: Platform,
        week: WeekStart,
        row_count: usize,
        file_digest: Option<String>,
    ) -> (Transition, UploadStatusRecord) {
        let event = UploadEvent::Submitted {
            row_count,
            file_digest,
        };
        self.apply(platform, week, &event)
    }

    pub fn record_deletion(
        &mut self,
        platform: Platform,
        week: WeekStart,
    ) -> (Transition, UploadStatusRecord) {
        self.apply(platform, week, &UploadEvent::Deleted)
    }

    fn apply(
        &mut self,
        platform: Platform,
        week: WeekStart,
        event: &UploadEvent,
    ) -> (Transition, UploadStatusRecord) {
        let record = self
            .records
            .entry((platform, week))
            .or_insert_with(|| UploadStatusRecord::not_uploaded(platform, week));

        let transition = record.apply(event, Utc::now());
        if transition == Transition::Conflict {
            warn!(
                platform = platform.code(),
                week = %week,
                "state conflict: no upload to delete, ignoring"
            );
        }

        (transition, record.clone())
    }

    /// First platform, in recommended order, not yet uploaded for the week
    pub fn recommended_next(&self, week: WeekStart) -> Option<Platform> {
        Platform::IMPORT_ORDER
            .iter()
            .copied()
            .find(|p| !self.status(*p, week).uploaded)
    }

    /// True when an earlier platform in the recommended order is still missing
    pub fn is_out_of_order(&self, platform: Platform, week: WeekStart) -> bool {
        Platform::IMPORT_ORDER
            .iter()
            .take_while(|p| **p != platform)
            .any(|p| !self.status(*p, week).uploaded)
    }

    /// True once every platform has data for the week
    pub fn is_complete(&self, week: WeekStart) -> bool {
        self.week_status(week).iter().all(|r| r.uploaded)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn week() -> WeekStart {
        WeekStart::new(NaiveDate::from_ymd_opt(2025, 1, 13).unwrap()).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let tracker = UploadStatusTracker::new();
        let record = tracker.status(Platform::Uber, week());
        assert_eq!(record.state(), UploadState::NotUploaded);
        assert!(!record.uploaded);
        assert!(!record.validated);
    }

    #[test]
    fn test_upload_sets_validated_with_uploaded() {
        let mut tracker = UploadStatusTracker::new();
        let (transition, record) =
            tracker.record_upload(Platform::Bolt, week(), 12, Some("abc".to_string()));

        assert_eq!(
            transition,
            Transition::Applied {
                from: UploadState::NotUploaded,
                to: UploadState::Validated
            }
        );
        assert!(record.uploaded);
        assert_eq!(record.validated, record.uploaded);
        assert_eq!(record.row_count, 12);
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn test_upload_then_delete_round_trip() {
        let mut tracker = UploadStatusTracker::new();
        tracker.record_upload(Platform::Heetch, week(), 3, None);
        tracker.record_deletion(Platform::Heetch, week());

        let record = tracker.status(Platform::Heetch, week());
        assert!(!record.uploaded);
        assert!(!record.validated);
        assert_eq!(record.row_count, 0);
    }

    #[test]
    fn test_reupload_overwrites() {
        let mut tracker = UploadStatusTracker::new();
        tracker.record_upload(Platform::Bolt, week(), 12, Some("first".to_string()));
        tracker.record_upload(Platform::Bolt, week(), 14, Some("second".to_string()));

        let statuses = tracker.week_status(week());
        assert_eq!(statuses.len(), 3);
        let bolt = &statuses[0];
        assert_eq!(bolt.row_count, 14);
        assert_eq!(bolt.file_digest.as_deref(), Some("second"));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut tracker = UploadStatusTracker::new();
        let before = tracker.status(Platform::Uber, week());

        let (transition, after) = tracker.record_deletion(Platform::Uber, week());

        assert_eq!(transition, Transition::Conflict);
        assert_eq!(before, after);
    }

    #[test]
    fn test_week_status_one_per_platform() {
        let mut tracker = UploadStatusTracker::new();
        tracker.record_upload(Platform::Uber, week(), 1, None);
        tracker.record_upload(Platform::Uber, week().next(), 1, None);

        let statuses = tracker.week_status(week());
        let platforms: Vec<Platform> = statuses.iter().map(|r| r.platform).collect();
        assert_eq!(platforms, vec![Platform::Bolt, Platform::Uber, Platform::Heetch]);
        assert!(statuses.iter().all(|r| r.week_start == week()));
        assert!(!statuses[0].uploaded);
        assert!(statuses[1].uploaded);
    }

    #[test]
    fn test_recommended_order_is_advisory() {
        let mut tracker = UploadStatusTracker::new();
        assert_eq!(tracker.recommended_next(week()), Some(Platform::Bolt));
        assert!(tracker.is_out_of_order(Platform::Heetch, week()));
        assert!(!tracker.is_out_of_order(Platform::Bolt, week()));

        // Out-of-order import is still recorded
        let (transition, _) = tracker.record_upload(Platform::Heetch, week(), 2, None);
        assert!(matches!(transition, Transition::Applied { .. }));
        assert_eq!(tracker.recommended_next(week()), Some(Platform::Bolt));

        tracker.record_upload(Platform::Bolt, week(), 2, None);
        tracker.record_upload(Platform::Uber, week(), 2, None);
        assert_eq!(tracker.recommended_next(week()), None);
        assert!(tracker.is_complete(week()));
    }

    #[test]
    fn test_from_records() {
        let mut record = UploadStatusRecord::not_uploaded(Platform::Bolt, week());
        record.uploaded = true;
        record.validated = true;

        let tracker = UploadStatusTracker::from_records(vec![record.clone()]);
        assert_eq!(tracker.status(Platform::Bolt, week()), record);
    }
}
