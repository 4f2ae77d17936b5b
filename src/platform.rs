// 🚗 Platforms & Weeks - the two keys every import is filed under
//
// A batch of earnings always belongs to exactly one platform and one ISO week.
// Weeks are identified by their Monday (France locale), never by an arbitrary day.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InputError;

// ============================================================================
// PLATFORM
// ============================================================================

/// Platform - ride-hailing source of an earnings export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Bolt,
    Uber,
    Heetch,
}

impl Platform {
    /// Recommended import order for a week (advisory, never enforced)
    pub const IMPORT_ORDER: [Platform; 3] = [Platform::Bolt, Platform::Uber, Platform::Heetch];

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Bolt => "Bolt",
            Platform::Uber => "Uber",
            Platform::Heetch => "Heetch",
        }
    }

    /// Short code used in storage and URLs
    pub fn code(&self) -> &'static str {
        match self {
            Platform::Bolt => "bolt",
            Platform::Uber => "uber",
            Platform::Heetch => "heetch",
        }
    }

    /// Position in the recommended import order (0 = first)
    pub fn import_rank(&self) -> usize {
        match self {
            Platform::Bolt => 0,
            Platform::Uber => 1,
            Platform::Heetch => 2,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bolt" => Ok(Platform::Bolt),
            "uber" => Ok(Platform::Uber),
            "heetch" => Ok(Platform::Heetch),
            other => Err(InputError::UnknownPlatform(other.to_string())),
        }
    }
}

// ============================================================================
// WEEK START
// ============================================================================

/// WeekStart - the Monday that opens an ISO week
///
/// Constructing one from a non-Monday date fails, so every value in the
/// pipeline is a valid reconciliation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "NaiveDate", into = "NaiveDate")]
pub struct WeekStart(NaiveDate);

impl WeekStart {
    /// Wrap a Monday; any other weekday is rejected
    pub fn new(date: NaiveDate) -> Result<Self, InputError> {
        if date.weekday() == Weekday::Mon {
            Ok(WeekStart(date))
        } else {
            Err(InputError::NotMonday(date))
        }
    }

    /// Monday of the ISO week that contains `date`
    pub fn containing(date: NaiveDate) -> Self {
        let offset = date.weekday().num_days_from_monday() as i64;
        WeekStart(date - Duration::days(offset))
    }

    /// Week containing today (UTC)
    pub fn current() -> Self {
        Self::containing(Utc::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The immediately preceding ISO week
    pub fn previous(&self) -> Self {
        WeekStart(self.0 - Duration::days(7))
    }

    pub fn next(&self) -> Self {
        WeekStart(self.0 + Duration::days(7))
    }

    /// Sunday closing this week
    pub fn end(&self) -> NaiveDate {
        self.0 + Duration::days(6)
    }

    /// ISO year and week number, e.g. (2025, 3)
    pub fn iso_week(&self) -> (i32, u32) {
        let week = self.0.iso_week();
        (week.year(), week.week())
    }

    /// Display label such as "2025-W03"
    pub fn label(&self) -> String {
        let (year, week) = self.iso_week();
        format!("{}-W{:02}", year, week)
    }
}

impl fmt::Display for WeekStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for WeekStart {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| InputError::InvalidDate(s.to_string()))?;
        WeekStart::new(date)
    }
}

impl TryFrom<NaiveDate> for WeekStart {
    type Error = InputError;

    fn try_from(date: NaiveDate) -> Result<Self, Self::Error> {
        WeekStart::new(date)
    }
}

impl From<WeekStart> for NaiveDate {
    fn from(week: WeekStart) -> Self {
        week.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_platform_codes_and_names() {
        assert_eq!(Platform::Bolt.code(), "bolt");
        assert_eq!(Platform::Uber.name(), "Uber");
        assert_eq!(Platform::Heetch.to_string(), "Heetch");
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("BOLT".parse::<Platform>().unwrap(), Platform::Bolt);
        assert_eq!(" uber ".parse::<Platform>().unwrap(), Platform::Uber);
        assert!(matches!(
            "lyft".parse::<Platform>(),
            Err(InputError::UnknownPlatform(p)) if p == "lyft"
        ));
    }

    #[test]
    fn test_import_order_matches_rank() {
        for (idx, platform) in Platform::IMPORT_ORDER.iter().enumerate() {
            assert_eq!(platform.import_rank(), idx);
        }
    }

    #[test]
    fn test_week_start_requires_monday() {
        assert!(WeekStart::new(date(2025, 1, 13)).is_ok());
        assert!(matches!(
            WeekStart::new(date(2025, 1, 15)),
            Err(InputError::NotMonday(_))
        ));
    }

    #[test]
    fn test_week_containing_snaps_to_monday() {
        let week = WeekStart::containing(date(2025, 1, 19)); // Sunday
        assert_eq!(week.date(), date(2025, 1, 13));
        assert_eq!(week.end(), date(2025, 1, 19));
    }

    #[test]
    fn test_previous_week_crosses_year() {
        let week = WeekStart::new(date(2025, 1, 6)).unwrap();
        assert_eq!(week.previous().date(), date(2024, 12, 30));
        assert_eq!(week.previous().next(), week);
    }

    #[test]
    fn test_iso_week_label() {
        let week = WeekStart::new(date(2024, 12, 30)).unwrap();
        // Monday 2024-12-30 opens ISO week 1 of 2025
        assert_eq!(week.iso_week(), (2025, 1));
        assert_eq!(week.label(), "2025-W01");
    }

    #[test]
    fn test_week_parse_and_serde() {
        let week: WeekStart = "2025-01-13".parse().unwrap();
        assert_eq!(week.to_string(), "2025-01-13");

        let json = serde_json::to_string(&week).unwrap();
        assert_eq!(json, "\"2025-01-13\"");

        let bad: Result<WeekStart, _> = serde_json::from_str("\"2025-01-14\"");
        assert!(bad.is_err());
        assert!(matches!(
            "13/01/2025".parse::<WeekStart>(),
            Err(InputError::InvalidDate(_))
        ));
    }
}
