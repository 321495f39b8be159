//! Client side model of the OpenTSDB v2 query protocol
//!
//! The crate covers the whole path from a textual request to a result:
//!
//! ```text
//! "start=1h-ago&m=avg:rate:cpu{host=a}" → Request → Cache/DateCache → Host → ResponseSet
//! ```
//!
//! - [`clean`] and [`TagSet`] sanitize and compare identifiers
//! - [`Query`] and [`Request`] parse and print the compact query syntax
//! - [`time`] resolves `1h-ago` style and absolute time expressions
//! - [`Cache`] and [`DateCache`] memoize results per request
//! - [`Host`] posts requests to a server's `/api/query` endpoint
//!
//! # Example
//!
//! ```no_run
//! use opentsdb::{DateCache, QueryContext, Request};
//!
//! # async fn run() -> Result<(), opentsdb::TsdbError> {
//! let mut request: Request = "start=1h-ago&m=sum:rate:sys.cpu.user{host=web01}".parse()?;
//! request.auto_downsample(300)?;
//!
//! let mut cache = DateCache::for_host("localhost:4242", chrono::Utc::now())?;
//! let series = cache.query(&request).await?;
//! # let _ = series;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clean;
pub mod error;
pub mod model;
pub mod query;
pub mod request;
pub mod tags;
pub mod time;
pub mod transport;

pub use cache::{Cache, DateCache};
pub use clean::clean;
pub use error::{CleanError, RequestError, TsdbError};
pub use model::{DataPoint, MultiDataPoint, Response, ResponseSet, Value};
pub use query::{Query, RateOptions};
pub use request::{Request, get_duration};
pub use tags::{TagSet, parse_tags};
pub use time::{Duration, TimeExpr, parse_abs_time, parse_duration, parse_time, parse_time_at};
pub use transport::{Host, QueryContext};
