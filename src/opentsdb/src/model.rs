//! Query responses and data points

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TsdbError;
use crate::tags::{TagSet, clean_annotated};

/// All series returned for a request
pub type ResponseSet = Vec<Response>;

/// One result series of a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub metric: String,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(default)]
    pub aggregate_tags: Vec<String>,
    /// Timestamp (as text) to value
    #[serde(default)]
    pub dps: BTreeMap<String, f64>,
}

impl Response {
    /// Data points in timestamp order. Keys that are not integers are skipped.
    pub fn points(&self) -> Vec<(i64, f64)> {
        let mut points: Vec<(i64, f64)> = self
            .dps
            .iter()
            .filter_map(|(ts, v)| ts.parse().ok().map(|ts| (ts, *v)))
            .collect();
        points.sort_by_key(|(ts, _)| *ts);
        points
    }
}

/// The value of a data point as it may arrive from a collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// A single point to write to OpenTSDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub metric: String,
    pub timestamp: i64,
    pub value: Value,
    #[serde(default)]
    pub tags: TagSet,
}

impl DataPoint {
    pub fn new(metric: impl Into<String>, timestamp: i64, value: impl Into<Value>, tags: TagSet) -> Self {
        Self {
            metric: metric.into(),
            timestamp,
            value: value.into(),
            tags,
        }
    }

    /// Sanitize the metric and tags, and turn numeric text into a number.
    pub fn clean(&mut self) -> Result<(), TsdbError> {
        self.tags = self.tags.clean()?;
        self.metric = clean_annotated(&self.metric)?;
        if let Value::Text(s) = &self.value {
            self.value = if let Ok(i) = s.parse::<i64>() {
                Value::Int(i)
            } else if let Ok(x) = s.parse::<f64>() {
                Value::Float(x)
            } else {
                return Err(TsdbError::UnparseableNumber(s.clone()));
            };
        }
        Ok(())
    }

    /// The telnet `put` line for this point, cleaning it first
    pub fn telnet(&mut self) -> Result<String, TsdbError> {
        self.clean()?;
        let mut line = format!("put {} {} {}", self.metric, self.timestamp, self.value);
        for (k, v) in &self.tags {
            line.push_str(&format!(" {k}={v}"));
        }
        line.push('\n');
        Ok(line)
    }
}

/// A batch of points for the `/api/put` endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiDataPoint(pub Vec<DataPoint>);

impl MultiDataPoint {
    /// JSON array of every point that survives cleaning. Points that fail are
    /// logged and dropped.
    pub fn json(&self) -> Result<String, TsdbError> {
        let mut cleaned = Vec::with_capacity(self.0.len());
        for d in &self.0 {
            let mut d = d.clone();
            match d.clean() {
                Ok(()) => cleaned.push(d),
                Err(e) => log::info!("{e}, removing datapoint {d:?}"),
            }
        }
        serde_json::to_string(&cleaned).map_err(TsdbError::marshal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_response_set() {
        let body = r#"[{
            "metric": "sys.cpu.user",
            "tags": {"host": "web01"},
            "aggregateTags": ["cpu"],
            "dps": {"1700000060": 2.5, "1700000000": 1}
        }]"#;
        let rs: ResponseSet = serde_json::from_str(body).unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].tags, TagSet::new().with("host", "web01"));
        assert_eq!(rs[0].aggregate_tags, vec!["cpu".to_string()]);
        assert_eq!(rs[0].points(), vec![(1700000000, 1.0), (1700000060, 2.5)]);
    }

    #[test]
    fn test_points_sorted_numerically() {
        let mut r = Response::default();
        r.dps.insert("999".into(), 1.0);
        r.dps.insert("1000".into(), 2.0);
        r.dps.insert("bogus".into(), 3.0);
        assert_eq!(r.points(), vec![(999, 1.0), (1000, 2.0)]);
    }

    #[test]
    fn test_clean_datapoint() {
        let mut d = DataPoint::new(
            "cpu usage%",
            1700000000,
            "42",
            TagSet::new().with("host name", "web 01"),
        );
        d.clean().unwrap();
        assert_eq!(d.metric, "cpuusage");
        assert_eq!(d.value, Value::Int(42));
        assert_eq!(d.tags, TagSet::new().with("hostname", "web01"));

        let mut d = DataPoint::new("m", 1, "0.25", TagSet::new());
        d.clean().unwrap();
        assert_eq!(d.value, Value::Float(0.25));
    }

    #[test]
    fn test_clean_datapoint_errors() {
        let mut d = DataPoint::new("m", 1, "lots", TagSet::new());
        assert!(matches!(d.clean(), Err(TsdbError::UnparseableNumber(ref s)) if s == "lots"));

        let mut d = DataPoint::new("%%", 1, 1i64, TagSet::new());
        assert!(matches!(d.clean(), Err(TsdbError::Clean { .. })));
    }

    #[test]
    fn test_telnet() {
        let mut d = DataPoint::new(
            "sys.cpu",
            1700000000,
            0.5,
            TagSet::new().with("host", "a").with("cpu", "0"),
        );
        assert_eq!(d.telnet().unwrap(), "put sys.cpu 1700000000 0.5 cpu=0 host=a\n");
    }

    #[test]
    fn test_multi_json_drops_bad_points() {
        let md = MultiDataPoint(vec![
            DataPoint::new("good", 1, 1i64, TagSet::new().with("h", "a")),
            DataPoint::new("bad", 2, "NaN?", TagSet::new()),
            DataPoint::new("also good", 3, "7", TagSet::new()),
        ]);
        let json: serde_json::Value = serde_json::from_str(&md.json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"metric": "good", "timestamp": 1, "value": 1, "tags": {"h": "a"}},
                {"metric": "alsogood", "timestamp": 3, "value": 7, "tags": {}},
            ])
        );
    }
}
