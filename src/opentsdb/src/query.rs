//! Parser and serializer for OpenTSDB's compact query syntax
//!
//! ```text
//! aggregator:[downsample:][rate[{counter[,max[,reset]]}]:]metric[{k=v,...}]
//! ```
//!
//! For example `sum:15s-avg:rate{counter,100,0}:sys.cpu.user{host=web01}`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TsdbError;
use crate::tags::{TagSet, parse_tags};

static QUERY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w+):(?:(\w+-\w+):)?(?:(rate[^:]*):)?([\w./]+)(?:\{([^{}]+)\})?$")
        .expect("query pattern is valid")
});

const RATE: &str = "rate";

/// Options for a counter rate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateOptions {
    #[serde(default, skip_serializing_if = "is_false")]
    pub counter: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub counter_max: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reset_value: i64,
}

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// A single sub query of a [`Request`](crate::Request)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub aggregator: String,
    pub metric: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub rate: bool,
    #[serde(default)]
    pub rate_options: RateOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downsample: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
}

impl Query {
    pub fn new(aggregator: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            aggregator: aggregator.into(),
            metric: metric.into(),
            ..Default::default()
        }
    }

    pub fn with_downsample(mut self, downsample: impl Into<String>) -> Self {
        self.downsample = Some(downsample.into());
        self
    }

    pub fn with_rate(mut self, options: RateOptions) -> Self {
        self.rate = true;
        self.rate_options = options;
        self
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Parse a query of the form `avg:rate:cpu{k=v}`
    pub fn parse(query: &str) -> Result<Self, TsdbError> {
        let caps = QUERY_RE
            .captures(query)
            .ok_or_else(|| TsdbError::BadQuery(query.to_string()))?;

        let mut q = Query::new(&caps[1], &caps[4]);
        q.downsample = caps.get(2).map(|m| m.as_str().to_string());
        if let Some(rate) = caps.get(3) {
            q.rate = true;
            q.rate_options = parse_rate_options(query, rate.as_str())?;
        }
        if let Some(tags) = caps.get(5) {
            q.tags = Some(parse_tags(tags.as_str())?);
        }
        Ok(q)
    }
}

/// Parse everything after the `rate` keyword.
///
/// The options are either braced, `rate{counter,100,0}`, or trail the keyword
/// after a comma, `rate,counter,100,0`. The first option only switches on
/// counter mode, whatever its text.
fn parse_rate_options(query: &str, text: &str) -> Result<RateOptions, TsdbError> {
    let rest = text
        .strip_prefix(RATE)
        .ok_or_else(|| TsdbError::BadQuery(query.to_string()))?;
    let fields = if rest.is_empty() {
        return Ok(RateOptions::default());
    } else if let Some(inner) = rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        inner
    } else if let Some(inner) = rest.strip_prefix(',') {
        inner
    } else {
        return Err(TsdbError::BadQuery(query.to_string()));
    };

    let sp: Vec<&str> = fields.split(',').collect();
    let int = |value: &str| {
        value
            .trim()
            .parse::<i64>()
            .map_err(|source| TsdbError::BadRateOption {
                query: query.to_string(),
                value: value.to_string(),
                source,
            })
    };

    let mut opts = RateOptions {
        counter: true,
        ..Default::default()
    };
    if let Some(max) = sp.get(1).copied().filter(|v| !v.is_empty()) {
        opts.counter_max = int(max)?;
    }
    if let Some(reset) = sp.get(2).copied() {
        opts.reset_value = int(reset)?;
    }
    Ok(opts)
}

impl FromStr for Query {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The compact `agg:[downsample:][rate[{counter,max,reset}]:]metric{tags}`
/// form.
///
/// In text any rate option implies counter mode, so the braced options are
/// written only when `counter` is set. A max or reset value without counter
/// mode exists only in the JSON encoding and prints as a bare `rate:`.
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.aggregator)?;
        if let Some(ds) = self.downsample.as_deref().filter(|ds| !ds.is_empty()) {
            write!(f, "{ds}:")?;
        }
        if self.rate {
            f.write_str(RATE)?;
            let opts = &self.rate_options;
            if opts.counter {
                f.write_str("{counter")?;
                if opts.counter_max != 0 || opts.reset_value != 0 {
                    f.write_str(",")?;
                    if opts.counter_max != 0 {
                        write!(f, "{}", opts.counter_max)?;
                    }
                }
                if opts.reset_value != 0 {
                    write!(f, ",{}", opts.reset_value)?;
                }
                f.write_str("}")?;
            }
            f.write_str(":")?;
        }
        f.write_str(&self.metric)?;
        if let Some(tags) = self.tags.as_ref().filter(|t| !t.is_empty()) {
            write!(f, "{tags}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_query() {
        let q = Query::parse("avg:15s-avg:rate:cpu.load{host=web01}").unwrap();
        assert_eq!(q.aggregator, "avg");
        assert_eq!(q.downsample.as_deref(), Some("15s-avg"));
        assert!(q.rate);
        assert_eq!(q.rate_options, RateOptions::default());
        assert_eq!(q.metric, "cpu.load");
        assert_eq!(q.tags, Some(TagSet::new().with("host", "web01")));
    }

    #[test]
    fn test_parse_minimal_query() {
        let q: Query = "sum:os.disk/sda".parse().unwrap();
        assert_eq!(q, Query::new("sum", "os.disk/sda"));
        assert_eq!(q.downsample, None);
        assert!(!q.rate);
        assert_eq!(q.tags, None);
    }

    #[test]
    fn test_parse_counter_rate() {
        let q = Query::parse("sum:rate{counter,100,0}:cpu").unwrap();
        assert!(q.rate);
        assert_eq!(
            q.rate_options,
            RateOptions {
                counter: true,
                counter_max: 100,
                reset_value: 0,
            }
        );
        assert_eq!(q.metric, "cpu");
    }

    #[test]
    fn test_parse_counter_rate_legacy_form() {
        let q = Query::parse("sum:rate,counter,,5:cpu").unwrap();
        assert_eq!(
            q.rate_options,
            RateOptions {
                counter: true,
                counter_max: 0,
                reset_value: 5,
            }
        );

        let q = Query::parse("sum:rate{counter}:cpu").unwrap();
        assert!(q.rate_options.counter);
        assert_eq!(q.rate_options.counter_max, 0);
    }

    #[test]
    fn test_parse_bad_rate_option() {
        let err = Query::parse("sum:rate{counter,lots}:cpu").unwrap_err();
        assert!(matches!(err, TsdbError::BadRateOption { ref value, .. } if value == "lots"));

        let err = Query::parse("sum:rate{counter,1,x}:cpu").unwrap_err();
        assert!(matches!(err, TsdbError::BadRateOption { ref value, .. } if value == "x"));

        let err = Query::parse("sum:ratex:cpu").unwrap_err();
        assert!(matches!(err, TsdbError::BadQuery(_)));
    }

    #[test]
    fn test_parse_bad_format() {
        for text in ["", "cpu", "avg:", "avg:cpu{", "avg:cpu load", "avg:15s:cpu"] {
            let err = Query::parse(text).unwrap_err();
            assert!(
                matches!(err, TsdbError::BadQuery(ref t) if t == text),
                "expected bad query format for {text:?}, got {err:?}"
            );
            assert!(err.to_string().contains("bad query format"));
        }
    }

    #[test]
    fn test_parse_bad_tags() {
        assert!(matches!(
            Query::parse("avg:cpu{host}").unwrap_err(),
            TsdbError::BadTag(_)
        ));
        assert!(matches!(
            Query::parse("avg:cpu{host=a,host=b}").unwrap_err(),
            TsdbError::DuplicateTag(_)
        ));
    }

    #[test]
    fn test_parse_tags_with_spaces_and_wildcards() {
        let q = Query::parse("avg:cpu{host=*, dc=ny|sf}").unwrap();
        let tags = q.tags.unwrap();
        assert_eq!(tags.get("host"), Some("*"));
        assert_eq!(tags.get("dc"), Some("ny|sf"));
    }

    #[test]
    fn test_display() {
        let q = Query::new("sum", "sys.cpu")
            .with_downsample("1m-max")
            .with_rate(RateOptions {
                counter: true,
                counter_max: 0,
                reset_value: 7,
            })
            .with_tags(TagSet::new().with("host", "a").with("cpu", "0"));
        assert_eq!(q.to_string(), "sum:1m-max:rate{counter,,7}:sys.cpu{cpu=0,host=a}");

        assert_eq!(Query::new("avg", "m").to_string(), "avg:m");
        assert_eq!(
            Query::new("avg", "m").with_rate(RateOptions::default()).to_string(),
            "avg:rate:m"
        );
    }

    #[test]
    fn test_display_omits_options_without_counter() {
        let q = Query::new("sum", "cpu").with_rate(RateOptions {
            counter: false,
            counter_max: 100,
            reset_value: 5,
        });
        assert_eq!(q.to_string(), "sum:rate:cpu");

        let json: serde_json::Value = serde_json::to_value(&q).unwrap();
        assert_eq!(json["rateOptions"]["counterMax"], 100);
        assert_eq!(json["rateOptions"]["resetValue"], 5);
        assert!(json["rateOptions"].get("counter").is_none());
    }

    #[test]
    fn test_display_parses_back() {
        for text in [
            "avg:15s-avg:rate:cpu.load{host=web01}",
            "sum:rate{counter,100,3}:cpu",
            "sum:rate{counter,100}:cpu",
            "max:proc/stat.cpu{dc=ny,host=web01}",
        ] {
            let q = Query::parse(text).unwrap();
            assert_eq!(q.to_string(), text);
            assert_eq!(Query::parse(&q.to_string()).unwrap(), q);
        }
    }

    #[test]
    fn test_json_encoding() {
        let q = Query::parse("avg:rate{counter,100}:cpu{host=a}").unwrap();
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "aggregator": "avg",
                "metric": "cpu",
                "rate": true,
                "rateOptions": {"counter": true, "counterMax": 100},
                "tags": {"host": "a"},
            })
        );

        let plain = serde_json::to_value(Query::new("sum", "m")).unwrap();
        assert_eq!(
            plain,
            serde_json::json!({"aggregator": "sum", "metric": "m", "rateOptions": {}})
        );
    }
}
