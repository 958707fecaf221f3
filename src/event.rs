//! Camera event records.
//!
//! An `EventRecord` is the immutable value produced for every manifest period.
//! Its identity (`event_id`) is derived from the start instant, the clamped
//! duration and the device id; nothing else participates.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, SyncError};

/// Upper bound for a single clip. Manifests report short clips; anything longer
/// is a parsing anomaly and gets capped.
pub const MAX_EVENT_DURATION_SECS: i64 = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    device_id: String,
    device_name: String,
    start_time: DateTime<FixedOffset>,
    duration: Duration,
    event_type: Option<String>,
}

impl EventRecord {
    pub fn new(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        start_time: DateTime<FixedOffset>,
        duration: Duration,
        event_type: Option<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            start_time,
            duration: clamp_duration(duration),
            event_type,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn start_time(&self) -> DateTime<FixedOffset> {
        self.start_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn end_time(&self) -> DateTime<FixedOffset> {
        self.start_time + self.duration
    }

    /// Canonical identity key: `{startISO}->{endISO}|{deviceId}`.
    pub fn event_id(&self) -> String {
        format!(
            "{}->{}|{}",
            self.start_time.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            self.end_time().to_rfc3339_opts(SecondsFormat::AutoSi, false),
            self.device_id
        )
    }
}

impl std::fmt::Display for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CameraEvent({}, {}, {}ms)",
            self.device_name,
            self.start_time.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            self.duration.num_milliseconds()
        )
    }
}

/// Caps a duration at `MAX_EVENT_DURATION_SECS` and floors it at zero.
pub fn clamp_duration(duration: Duration) -> Duration {
    duration
        .min(Duration::seconds(MAX_EVENT_DURATION_SECS))
        .max(Duration::zero())
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:[.,](\d+))?S)?)?$")
            .expect("static duration pattern")
    })
}

/// Parses an ISO-8601 duration restricted to day/time designators
/// (`P1DT2H3M4.5S`). Year, month and week designators are rejected because
/// they have no fixed length.
pub fn parse_iso8601_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    let caps = duration_pattern()
        .captures(trimmed)
        .ok_or_else(|| SyncError::Parse(format!("invalid ISO-8601 duration '{}'", raw)))?;
    if trimmed == "P" || trimmed.ends_with('T') {
        return Err(SyncError::Parse(format!(
            "ISO-8601 duration '{}' has no components",
            raw
        )));
    }

    let field = |idx: usize| -> Result<i64> {
        match caps.get(idx) {
            Some(m) => m
                .as_str()
                .parse::<i64>()
                .map_err(|_| SyncError::Parse(format!("duration component out of range in '{}'", raw))),
            None => Ok(0),
        }
    };
    let days = field(1)?;
    let hours = field(2)?;
    let minutes = field(3)?;
    let seconds = field(4)?;

    let whole_secs = days
        .checked_mul(86_400)
        .and_then(|d| hours.checked_mul(3_600).and_then(|h| d.checked_add(h)))
        .and_then(|t| minutes.checked_mul(60).and_then(|m| t.checked_add(m)))
        .and_then(|t| t.checked_add(seconds))
        .ok_or_else(|| SyncError::Parse(format!("duration '{}' overflows", raw)))?;

    let nanos = match caps.get(5) {
        Some(frac) => {
            let digits: String = frac.as_str().chars().take(9).collect();
            let padded = format!("{:0<9}", digits);
            padded
                .parse::<i64>()
                .map_err(|_| SyncError::Parse(format!("invalid fraction in '{}'", raw)))?
        }
        None => 0,
    };

    Duration::try_seconds(whole_secs)
        .map(|d| d + Duration::nanoseconds(nanos))
        .ok_or_else(|| SyncError::Parse(format!("duration '{}' overflows", raw)))
}

/// Parses a manifest `programDateTime`. Values without an offset are taken as UTC.
pub fn parse_program_date_time(raw: &str) -> Result<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed);
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive).with_timezone(&Utc.fix()))
        .map_err(|e| SyncError::Parse(format!("invalid programDateTime '{}': {}", raw, e)))
}
