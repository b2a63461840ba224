//! Clinic-time normalization.
//!
//! Clients send timestamps either with an explicit offset or as bare wall-clock
//! values. Bare values are always read as clinic-local time, never as UTC, and
//! everything is compared and persisted in UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M%:z",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("Malformed date boundary '{0}' (use YYYY-MM-DD or an ISO-8601 date-time)")]
    MalformedBoundary(String),

    #[error("Invalid date-time '{0}'")]
    InvalidInstant(String),
}

/// A timestamp as a client sent it, with or without a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientInstant {
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

impl ClientInstant {
    pub fn is_naive(&self) -> bool {
        matches!(self, ClientInstant::Naive(_))
    }
}

impl From<NaiveDateTime> for ClientInstant {
    fn from(naive: NaiveDateTime) -> Self {
        ClientInstant::Naive(naive)
    }
}

impl From<DateTime<FixedOffset>> for ClientInstant {
    fn from(aware: DateTime<FixedOffset>) -> Self {
        ClientInstant::Aware(aware)
    }
}

impl From<DateTime<Utc>> for ClientInstant {
    fn from(utc: DateTime<Utc>) -> Self {
        ClientInstant::Aware(utc.with_timezone(&Utc.fix()))
    }
}

impl FromStr for ClientInstant {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();

        if let Ok(aware) = DateTime::parse_from_rfc3339(value) {
            return Ok(ClientInstant::Aware(aware));
        }

        let with_offset = match value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
            Some(rest) => format!("{}+00:00", rest),
            None => value.to_string(),
        };
        for format in AWARE_FORMATS {
            if let Ok(aware) = DateTime::parse_from_str(&with_offset, format) {
                return Ok(ClientInstant::Aware(aware));
            }
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(ClientInstant::Naive(naive));
            }
        }

        // A bare date is midnight of that day.
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(ClientInstant::Naive)
            .ok_or_else(|| TimeError::InvalidInstant(s.to_string()))
    }
}

impl fmt::Display for ClientInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientInstant::Naive(naive) => write!(f, "{}", naive.format("%Y-%m-%dT%H:%M:%S%.f")),
            ClientInstant::Aware(aware) => {
                write!(f, "{}", aware.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
        }
    }
}

impl Serialize for ClientInstant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClientInstant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Which end of a closed `[from, to]` range a boundary string stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEdge {
    Start,
    End,
}

/// The clinic's civil timezone, injected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicTimezone {
    zone: Tz,
}

impl ClinicTimezone {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Tag a wall-clock value with the clinic zone.
    ///
    /// Ambiguous times (DST fall-back) resolve to the earlier instant. Times that
    /// fall into a DST gap keep the offset in force before the transition.
    pub fn localize(&self, naive: NaiveDateTime) -> DateTime<Tz> {
        match self.zone.from_local_datetime(&naive) {
            LocalResult::Single(local) => local,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => {
                let offset = self
                    .zone
                    .offset_from_utc_datetime(&(naive - Duration::days(1)))
                    .fix();
                let utc = naive - Duration::seconds(i64::from(offset.local_minus_utc()));
                Utc.from_utc_datetime(&utc).with_timezone(&self.zone)
            }
        }
    }

    pub fn to_utc(&self, instant: ClientInstant) -> DateTime<Utc> {
        match instant {
            ClientInstant::Naive(naive) => self.localize(naive).with_timezone(&Utc),
            ClientInstant::Aware(aware) => aware.with_timezone(&Utc),
        }
    }

    /// Express an instant in clinic time. Naive input is taken to be clinic time already.
    pub fn to_local(&self, instant: ClientInstant) -> DateTime<Tz> {
        match instant {
            ClientInstant::Naive(naive) => self.localize(naive),
            ClientInstant::Aware(aware) => aware.with_timezone(&self.zone),
        }
    }

    pub fn now_local(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.zone)
    }

    pub fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }

    /// Turn a range bound into a UTC instant for inequality filtering.
    ///
    /// A bare `YYYY-MM-DD` expands to local `00:00:00.000000` for [`RangeEdge::Start`]
    /// and local `23:59:59.999999` for [`RangeEdge::End`]. Anything else has to be
    /// a zero-padded ISO-8601 date-time and is used as-is. Inverted ranges are not rejected.
    pub fn resolve_boundary(&self, raw: &str, edge: RangeEdge) -> Result<DateTime<Utc>, TimeError> {
        let value = raw.trim();

        if is_calendar_date(value) {
            let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_err(|_| TimeError::MalformedBoundary(raw.to_string()))?;
            let time = match edge {
                RangeEdge::Start => NaiveTime::from_hms_opt(0, 0, 0),
                RangeEdge::End => NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999),
            }
            .ok_or_else(|| TimeError::MalformedBoundary(raw.to_string()))?;

            return Ok(self.to_utc(ClientInstant::Naive(date.and_time(time))));
        }

        if !has_date_and_time(value) {
            return Err(TimeError::MalformedBoundary(raw.to_string()));
        }

        value
            .parse::<ClientInstant>()
            .map(|instant| self.to_utc(instant))
            .map_err(|_| TimeError::MalformedBoundary(raw.to_string()))
    }
}

impl Default for ClinicTimezone {
    fn default() -> Self {
        Self::new(shared_config::DEFAULT_CLINIC_TIMEZONE)
    }
}

/// UTC with microsecond precision and a `Z` suffix, the form used in store filters.
pub fn format_utc(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_calendar_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-'
}

/// A zero-padded date followed by a `T` or space separator.
fn has_date_and_time(value: &str) -> bool {
    value.len() > 10
        && value.get(..10).is_some_and(is_calendar_date)
        && matches!(value.as_bytes()[10], b'T' | b't' | b' ')
}
