//! Request level caches
//!
//! [`Cache`] memoizes results by the canonical JSON encoding of a request.
//! [`DateCache`] additionally pins every request window to a fixed reference
//! time, so `1h-ago` asked at two different moments is the same entry.
//!
//! Neither cache is synchronized. Both take `&mut self`; share one across
//! tasks by putting it behind a mutex. Entries are never evicted, and a
//! failed query stays failed for the life of the cache.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TsdbError;
use crate::model::ResponseSet;
use crate::request::Request;
use crate::time::TimeExpr;
use crate::transport::{Host, QueryContext};

/// Memoizes query outcomes, successful or not
#[derive(Debug)]
pub struct Cache<C = Host> {
    inner: C,
    cache: HashMap<String, Result<ResponseSet, TsdbError>>,
}

impl Cache<Host> {
    /// A cache in front of the OpenTSDB server at `host`
    pub fn for_host(host: &str) -> Result<Self, TsdbError> {
        Ok(Self::new(Host::new(host)?))
    }
}

impl<C: QueryContext> Cache<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cache: HashMap::new(),
        }
    }

    /// Number of distinct requests seen
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: QueryContext> QueryContext for Cache<C> {
    async fn query(&mut self, request: &Request) -> Result<ResponseSet, TsdbError> {
        let key = request.to_json()?;
        if let Some(hit) = self.cache.get(&key) {
            log::debug!("cache hit for {key}");
            return hit.clone();
        }

        log::debug!("cache miss for {key}");
        let result = self.inner.query(request).await;
        self.cache.insert(key, result.clone());
        result
    }
}

/// A [`Cache`] that evaluates every request window as of a fixed `now`
#[derive(Debug)]
pub struct DateCache<C = Host> {
    cache: Cache<C>,
    now: DateTime<Utc>,
}

impl DateCache<Host> {
    pub fn for_host(host: &str, now: DateTime<Utc>) -> Result<Self, TsdbError> {
        Ok(Self::new(Host::new(host)?, now))
    }
}

impl<C: QueryContext> DateCache<C> {
    pub fn new(inner: C, now: DateTime<Utc>) -> Self {
        Self {
            cache: Cache::new(inner),
            now,
        }
    }

    /// The reference time every window is shifted to end at
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn cache(&self) -> &Cache<C> {
        &self.cache
    }

    /// Rewrite the window of `request`, resolved as of `wall_now`, so that it
    /// ends at the reference time. Start and end become epoch seconds.
    pub fn normalize(&self, request: &Request, wall_now: DateTime<Utc>) -> Result<Request, TsdbError> {
        let (start, end) = request.window_at(wall_now)?;
        let diff = self.now - end;
        let shift = |t: DateTime<Utc>| {
            t.checked_add_signed(diff)
                .map(TimeExpr::from)
                .ok_or_else(|| TsdbError::invalid_time(&t.to_rfc3339(), "window shifted out of range"))
        };
        let mut shifted = request.clone();
        shifted.start = shift(start)?;
        shifted.end = Some(shift(end)?);
        Ok(shifted)
    }

    /// Like [`QueryContext::query`], resolving relative times against
    /// `wall_now` instead of the current time
    pub async fn query_at(
        &mut self,
        request: &Request,
        wall_now: DateTime<Utc>,
    ) -> Result<ResponseSet, TsdbError> {
        let shifted = self.normalize(request, wall_now)?;
        self.cache.query(&shifted).await
    }
}

#[async_trait]
impl<C: QueryContext> QueryContext for DateCache<C> {
    async fn query(&mut self, request: &Request) -> Result<ResponseSet, TsdbError> {
        self.query_at(request, Utc::now()).await
    }
}
