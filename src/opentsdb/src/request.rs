//! Multi-query requests and their textual and JSON encodings

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TsdbError;
use crate::query::{Query, is_false};
use crate::time::{Duration, TimeExpr, parse_time_at};

/// Downsample intervals below this many seconds are not worth asking for
pub const MIN_DOWNSAMPLE_SECS: i64 = 15;

/// An OpenTSDB `/api/query` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub start: TimeExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<TimeExpr>,
    pub queries: Vec<Query>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_annotations: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub global_annotations: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ms_resolution: bool,
    #[serde(default, rename = "showTSUIDs", skip_serializing_if = "is_false")]
    pub show_tsuids: bool,
}

impl Request {
    pub fn new(start: impl Into<TimeExpr>, queries: Vec<Query>) -> Self {
        Self {
            start: start.into(),
            end: None,
            queries,
            no_annotations: false,
            global_annotations: false,
            ms_resolution: false,
            show_tsuids: false,
        }
    }

    pub fn with_end(mut self, end: impl Into<TimeExpr>) -> Self {
        self.end = Some(end.into());
        self
    }

    /// Parse a request of the form `start=1h-ago&m=avg:cpu&m=sum:mem`
    ///
    /// An optional `end` parameter is honored as well.
    pub fn parse(text: &str) -> Result<Self, TsdbError> {
        let mut start = None;
        let mut end = None;
        let mut ms = Vec::new();
        for (key, value) in url::form_urlencoded::parse(text.as_bytes()) {
            match key.as_ref() {
                "start" if start.is_none() => start = Some(value.into_owned()),
                "end" if end.is_none() => end = Some(value.into_owned()),
                "m" => ms.push(value.into_owned()),
                _ => {}
            }
        }

        let start = start
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TsdbError::MissingStart(text.to_string()))?;
        let queries = ms
            .iter()
            .map(|m| Query::parse(m))
            .collect::<Result<Vec<_>, _>>()?;
        if queries.is_empty() {
            return Err(TsdbError::MissingQuery(text.to_string()));
        }

        let mut request = Request::new(start, queries);
        request.end = end.filter(|e| !e.is_empty()).map(TimeExpr::from);
        Ok(request)
    }

    /// Decode a request from its wire JSON. Float epochs are truncated.
    pub fn from_json(body: &[u8]) -> Result<Self, TsdbError> {
        serde_json::from_slice(body).map_err(TsdbError::decode)
    }

    /// The canonical wire encoding, also used as the cache key
    pub fn to_json(&self) -> Result<String, TsdbError> {
        serde_json::to_string(self).map_err(TsdbError::marshal)
    }

    /// Resolve start and end against `now`, end defaulting to `now`.
    pub fn window_at(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), TsdbError> {
        let start = parse_time_at(&self.start, now)?;
        let end = match &self.end {
            Some(end) => parse_time_at(end, now)?,
            None => now,
        };
        Ok((start, end))
    }

    /// Length of the request window as of `now`. Negative when end precedes
    /// start.
    pub fn duration_at(&self, now: DateTime<Utc>) -> Result<Duration, TsdbError> {
        if self.start.is_empty() {
            return Err(TsdbError::EmptyStart);
        }
        let (start, end) = self.window_at(now)?;
        Ok(Duration::from(end - start))
    }

    /// Length of the request window as of the current time
    pub fn duration(&self) -> Result<Duration, TsdbError> {
        self.duration_at(Utc::now())
    }

    /// Set an average downsample on every query so the window yields roughly
    /// `points` points.
    ///
    /// Does nothing if the resulting interval would be under 15 seconds.
    pub fn auto_downsample(&mut self, points: i64) -> Result<(), TsdbError> {
        self.auto_downsample_at(points, Utc::now())
    }

    pub fn auto_downsample_at(&mut self, points: i64, now: DateTime<Utc>) -> Result<(), TsdbError> {
        if points == 0 {
            return Err(TsdbError::ZeroTarget);
        }
        let interval = self.duration_at(now)? / points;
        if interval < Duration::seconds(MIN_DOWNSAMPLE_SECS) {
            log::debug!("skipping downsample, {interval} per point is below {MIN_DOWNSAMPLE_SECS}s");
            return Ok(());
        }
        let ds = format!("{}s-avg", interval.num_seconds());
        for q in &mut self.queries {
            q.downsample = Some(ds.clone());
        }
        Ok(())
    }
}

/// Window length of `request`, end defaulting to the current time.
pub fn get_duration(request: &Request) -> Result<Duration, TsdbError> {
    request.duration()
}

impl FromStr for Request {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Form-encoded with keys in sorted order: `end`, every `m`, then `start`.
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        if let Some(end) = self.end.as_ref().map(|e| e.to_string()).filter(|e| !e.is_empty()) {
            form.append_pair("end", &end);
        }
        for q in &self.queries {
            form.append_pair("m", &q.to_string());
        }
        form.append_pair("start", &self.start.to_string());
        f.write_str(&form.finish())
    }
}
