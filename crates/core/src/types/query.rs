//! Query-string helpers shared by list endpoints.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Offset pagination (`?skip=&take=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    /// Rows to skip.
    #[serde(default)]
    pub skip: i64,
    /// Rows to return.
    #[serde(default = "Pagination::default_take")]
    pub take: i64,
}

impl Pagination {
    /// Page size when the client does not send one.
    pub const DEFAULT_TAKE: i64 = 10;
    /// Largest page a client can ask for.
    pub const MAX_TAKE: i64 = 100;

    const fn default_take() -> i64 {
        Self::DEFAULT_TAKE
    }

    /// Clamp to `skip >= 0` and `1 <= take <= MAX_TAKE`.
    #[must_use]
    pub const fn normalized(self) -> Self {
        let skip = if self.skip < 0 { 0 } else { self.skip };
        let take = if self.take < 1 {
            1
        } else if self.take > Self::MAX_TAKE {
            Self::MAX_TAKE
        } else {
            self.take
        };
        Self { skip, take }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            take: Self::DEFAULT_TAKE,
        }
    }
}

/// Sort direction (`?order=asc|desc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// SQL keyword for this direction.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Errors parsing a reporting window.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    /// Neither RFC 3339 nor `YYYY-MM-DD`.
    #[error("invalid date '{0}', expected YYYY-MM-DD or RFC 3339")]
    InvalidDate(String),
    /// Start is after end.
    #[error("startDate must not be after endDate")]
    Inverted,
}

/// Inclusive reporting window for analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    /// Window start.
    pub start_date: DateTime<Utc>,
    /// Window end.
    pub end_date: DateTime<Utc>,
}

impl DateRange {
    /// Parse optional bounds, falling back to `default_start` and `now`.
    ///
    /// A bare `YYYY-MM-DD` end date covers that whole day.
    ///
    /// # Errors
    ///
    /// Returns `DateRangeError` if a bound cannot be parsed or the window is inverted.
    pub fn parse(
        start: Option<&str>,
        end: Option<&str>,
        default_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, DateRangeError> {
        let start_date = match start.filter(|s| !s.trim().is_empty()) {
            Some(s) => parse_bound(s, NaiveTime::MIN)?,
            None => default_start,
        };
        let end_date = match end.filter(|s| !s.trim().is_empty()) {
            Some(s) => parse_bound(s, end_of_day())?,
            None => now,
        };

        if start_date > end_date {
            return Err(DateRangeError::Inverted);
        }

        Ok(Self {
            start_date,
            end_date,
        })
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}

fn parse_bound(raw: &str, time_of_day: NaiveTime) -> Result<DateTime<Utc>, DateRangeError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| Utc.from_utc_datetime(&date.and_time(time_of_day)))
        .map_err(|_| DateRangeError::InvalidDate(raw.to_owned()))
}
