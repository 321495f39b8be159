//! Time and duration resolution for OpenTSDB time expressions
//!
//! OpenTSDB accepts three kinds of time in a query window:
//!
//! - relative expressions such as `1h-ago`
//! - absolute layouts such as `2023/01/02-15:04:05`, or epoch seconds as text
//! - epoch seconds as a JSON integer
//!
//! [`TimeExpr`] models these as variants so that resolution is an exhaustive
//! match instead of a runtime type check.

use std::fmt;
use std::ops::{Add, Div, Neg, Sub};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TsdbError;

const RELATIVE_SUFFIX: &str = "-ago";

/// Layouts tried, in order, by [`parse_abs_time`]
const DATE_TIME_LAYOUTS: [&str; 2] = ["%Y/%m/%d-%H:%M:%S", "%Y/%m/%d-%H:%M"];
const DATE_LAYOUT: &str = "%Y/%m/%d";

/// A start or end time as written in a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimeExpr {
    /// `<duration>-ago`, relative to the moment of resolution
    Relative(String),
    /// An absolute layout or epoch seconds as text. Empty text means "now".
    Absolute(String),
    /// Epoch seconds
    Epoch(i64),
}

impl TimeExpr {
    /// Classify a textual time expression
    pub fn parse(text: &str) -> Self {
        if text.ends_with(RELATIVE_SUFFIX) {
            Self::Relative(text.to_string())
        } else {
            Self::Absolute(text.to_string())
        }
    }

    /// `n` units of time before now, e.g. `TimeExpr::ago("1h")`
    pub fn ago(duration: &str) -> Self {
        Self::Relative(format!("{duration}{RELATIVE_SUFFIX}"))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Relative(s) | Self::Absolute(s) => s.is_empty(),
            Self::Epoch(_) => false,
        }
    }
}

impl From<&str> for TimeExpr {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for TimeExpr {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<i64> for TimeExpr {
    fn from(secs: i64) -> Self {
        Self::Epoch(secs)
    }
}

impl From<DateTime<Utc>> for TimeExpr {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Epoch(t.timestamp())
    }
}

impl fmt::Display for TimeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relative(s) | Self::Absolute(s) => f.write_str(s),
            Self::Epoch(secs) => write!(f, "{secs}"),
        }
    }
}

impl Serialize for TimeExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Relative(s) | Self::Absolute(s) => serializer.serialize_str(s),
            Self::Epoch(secs) => serializer.serialize_i64(*secs),
        }
    }
}

struct TimeExprVisitor;

impl Visitor<'_> for TimeExprVisitor {
    type Value = TimeExpr;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a time expression string or epoch seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<TimeExpr, E> {
        Ok(TimeExpr::parse(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<TimeExpr, E> {
        Ok(TimeExpr::Epoch(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<TimeExpr, E> {
        i64::try_from(v)
            .map(TimeExpr::Epoch)
            .map_err(|_| E::custom(format!("epoch seconds out of range: {v}")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<TimeExpr, E> {
        Ok(TimeExpr::Epoch(v as i64))
    }
}

impl<'de> Deserialize<'de> for TimeExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimeExprVisitor)
    }
}

/// A signed span of time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(TimeDelta);

impl Duration {
    pub const ZERO: Duration = Duration(TimeDelta::zero());

    pub fn seconds(secs: i64) -> Self {
        Self(TimeDelta::seconds(secs))
    }

    pub fn minutes(mins: i64) -> Self {
        Self(TimeDelta::minutes(mins))
    }

    pub fn hours(hours: i64) -> Self {
        Self(TimeDelta::hours(hours))
    }

    pub fn days(days: i64) -> Self {
        Self(TimeDelta::days(days))
    }

    pub fn milliseconds(ms: i64) -> Self {
        Self(TimeDelta::milliseconds(ms))
    }

    /// Whole seconds, truncated toward zero
    pub fn num_seconds(&self) -> i64 {
        self.0.num_seconds()
    }

    pub fn num_milliseconds(&self) -> i64 {
        self.0.num_milliseconds()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < TimeDelta::zero()
    }

    pub fn as_time_delta(&self) -> TimeDelta {
        self.0
    }
}

impl From<TimeDelta> for Duration {
    fn from(d: TimeDelta) -> Self {
        Self(d)
    }
}

impl TryFrom<std::time::Duration> for Duration {
    type Error = chrono::OutOfRangeError;

    fn try_from(d: std::time::Duration) -> Result<Self, Self::Error> {
        TimeDelta::from_std(d).map(Self)
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Duration {
        Duration(-self.0)
    }
}

/// Split a span into `n` equal parts, at millisecond precision
impl Div<i64> for Duration {
    type Output = Duration;

    fn div(self, n: i64) -> Duration {
        Duration(TimeDelta::milliseconds(self.0.num_milliseconds() / n))
    }
}

impl Add<Duration> for DateTime<Utc> {
    type Output = DateTime<Utc>;

    fn add(self, rhs: Duration) -> DateTime<Utc> {
        self + rhs.0
    }
}

impl Sub<Duration> for DateTime<Utc> {
    type Output = DateTime<Utc>;

    fn sub(self, rhs: Duration) -> DateTime<Utc> {
        self - rhs.0
    }
}

/// Renders the largest whole unit that divides the span, e.g. `90m`, `2h`, `15s`
impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.num_milliseconds();
        if ms == 0 {
            return f.write_str("0s");
        }
        let units = [
            (7 * 24 * 3_600_000, "w"),
            (24 * 3_600_000, "d"),
            (3_600_000, "h"),
            (60_000, "m"),
            (1000, "s"),
        ];
        for (size, unit) in units {
            if ms % size == 0 {
                return write!(f, "{}{unit}", ms / size);
            }
        }
        write!(f, "{ms}ms")
    }
}

/// Parse a duration literal such as `1h`, `30m`, `1h30m`, `2d` or `1w`.
///
/// OpenTSDB's month unit `n` (30 days) is accepted as well.
pub fn parse_duration(text: &str) -> Result<Duration, TsdbError> {
    let invalid = |reason: String| TsdbError::InvalidDuration {
        input: text.to_string(),
        reason,
    };

    if let Some(n) = text.strip_suffix('n').and_then(|m| m.parse::<i64>().ok()) {
        return n
            .checked_mul(30)
            .and_then(TimeDelta::try_days)
            .map(Duration)
            .ok_or_else(|| invalid("month count out of range".to_string()));
    }

    let std = humantime::parse_duration(text).map_err(|e| invalid(e.to_string()))?;
    Duration::try_from(std).map_err(|e| invalid(e.to_string()))
}

/// Parse any absolute (not `X-ago`) time format supported by OpenTSDB.
///
/// The date layouts are interpreted as UTC. Anything that matches no layout
/// is tried as epoch seconds.
pub fn parse_abs_time(s: &str) -> Result<DateTime<Utc>, TsdbError> {
    for layout in DATE_TIME_LAYOUTS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, layout) {
            return Ok(t.and_utc());
        }
    }
    // chrono cannot build a time from an hour alone
    if let Some((date, hour)) = s.split_once('-') {
        if let Some(t) = parse_date_hour(date, hour) {
            return Ok(t);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, DATE_LAYOUT) {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc());
        }
    }

    let secs = s
        .parse::<i64>()
        .map_err(|e| TsdbError::invalid_time(s, e))?;
    epoch(secs)
}

/// The `%Y/%m/%d-%H` layout
fn parse_date_hour(date: &str, hour: &str) -> Option<DateTime<Utc>> {
    if hour.is_empty() || hour.len() > 2 || !hour.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let d = NaiveDate::parse_from_str(date, DATE_LAYOUT).ok()?;
    let t = d.and_hms_opt(hour.parse().ok()?, 0, 0)?;
    Some(t.and_utc())
}

fn epoch(secs: i64) -> Result<DateTime<Utc>, TsdbError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| TsdbError::invalid_time(&secs.to_string(), "epoch seconds out of range"))
}

/// Resolve `expr` against the current wall-clock time.
pub fn parse_time(expr: &TimeExpr) -> Result<DateTime<Utc>, TsdbError> {
    parse_time_at(expr, Utc::now())
}

/// Resolve `expr`, using `now` for empty and relative expressions.
pub fn parse_time_at(expr: &TimeExpr, now: DateTime<Utc>) -> Result<DateTime<Utc>, TsdbError> {
    match expr {
        TimeExpr::Absolute(s) if s.is_empty() => Ok(now),
        TimeExpr::Relative(s) => match s.strip_suffix(RELATIVE_SUFFIX) {
            Some(d) => {
                let ago = parse_duration(d)?;
                now.checked_sub_signed(ago.0)
                    .ok_or_else(|| TsdbError::invalid_time(s, "relative time out of range"))
            }
            None => parse_abs_time(s),
        },
        TimeExpr::Absolute(s) => parse_abs_time(s),
        TimeExpr::Epoch(secs) => epoch(*secs),
    }
}
