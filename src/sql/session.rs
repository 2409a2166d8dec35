//! The upstream remote-store session (external collaborator, spec.md §1).
//!
//! spec.md treats the wire-level RPC to the remote time-series store as an
//! opaque session exposing `select`, `update`, `getPointBindings`, and
//! `disconnect`; that is modeled here as the [`StoreSession`] trait so the
//! paging engine and the SQL `Connection` facade can be built and tested
//! without a real upstream. `InMemorySession` is a `#[cfg(test)]` fake
//! backing the driver's own test suite.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::sql::error::Result;
use crate::sql::request::SyncDescriptor;
use crate::sql::value::Value;

/// A point's bound used on either side of a `stamp`/`version` range, mapped
/// from the parsed operator per §4.6: `=`→at, `>=`→notBefore, `>`→after,
/// `<=`→notAfter, `<`→before.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSelector {
    pub at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

/// A single upstream query, built by the paging engine from a parsed
/// `Request` with point names already resolved to UUIDs.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub point: Uuid,
    pub stamps: TimeSelector,
    /// Ordered by write-version rather than stamp (§4.6, "pull mode").
    pub pull: bool,
    pub synced: bool,
    pub sync: SyncDescriptor,
    pub not_null: bool,
    pub interpolated: bool,
    pub extrapolated: bool,
    pub polator_time_limit: Option<String>,
    pub row_limit: Option<u64>,
    /// Set by `create_query()`-style continuations; `None` on the first
    /// page of a query.
    pub continuation_token: Option<u64>,
}

impl StoreQuery {
    pub fn new(point: Uuid) -> Self {
        Self {
            point,
            stamps: TimeSelector::default(),
            pull: false,
            synced: false,
            sync: SyncDescriptor::default(),
            not_null: false,
            interpolated: false,
            extrapolated: false,
            polator_time_limit: None,
            row_limit: None,
            continuation_token: None,
        }
    }
}

/// One row of a point's time series, as returned by `select` or submitted
/// to `update`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointValue {
    pub point: Uuid,
    pub stamp: DateTime<Utc>,
    pub version: Option<DateTime<Utc>>,
    pub value: Value,
    pub state: Option<i64>,
}

/// One bounded page of a `select` response: the rows it carries, whether
/// more pages remain, and (if not complete) the continuation to pass back
/// into the next `select` call — the Rust shape of the source's
/// `response.createQuery()`.
#[derive(Debug, Clone, PartialEq)]
pub struct StorePage {
    pub rows: Vec<PointValue>,
    pub complete: bool,
    pub continuation: Option<StoreQuery>,
}

/// The opaque upstream collaborator: a remote time-series store session.
/// Per spec.md §5, sessions are single-threaded — callers (here, the SQL
/// `Connection` facade) must serialize their own access.
pub trait StoreSession: Send {
    fn select(&mut self, query: &StoreQuery) -> Result<StorePage>;

    /// Applies a batch of point writes in order; the returned vector has
    /// one entry per input row, `None` on success and `Some(message)` on a
    /// per-row failure (§4.6: "any per-row exception becomes a warning
    /// chained onto the connection").
    fn update(&mut self, updates: &[PointValue]) -> Result<Vec<Option<String>>>;

    /// Resolves point names to UUIDs, populating the point cache on a miss
    /// (§4.6, §9: "concurrent misses on the same key may issue duplicate
    /// lookups — this is acceptable"). An empty `names` asks for the full
    /// point directory, the form `SELECT * FROM POINTS` relies on.
    fn get_point_bindings(&mut self, names: &[String]) -> Result<Vec<(String, Uuid)>>;

    fn disconnect(&mut self);
}

/// An in-memory fake upstream, used by the driver's own tests: a fixed
/// point directory plus a mutable archive of values, paged at a configurable
/// page size so paging-engine tests can exercise multi-page cursors without
/// a real store.
#[cfg(test)]
pub struct InMemorySession {
    pub directory: HashMap<String, Uuid>,
    pub archive: HashMap<Uuid, Vec<PointValue>>,
    pub page_size: usize,
    pub disconnected: bool,
}

#[cfg(test)]
impl InMemorySession {
    pub fn new(page_size: usize) -> Self {
        Self {
            directory: HashMap::new(),
            archive: HashMap::new(),
            page_size,
            disconnected: false,
        }
    }

    pub fn register_point(&mut self, name: &str, uuid: Uuid) {
        self.directory.insert(name.to_string(), uuid);
        self.archive.entry(uuid).or_default();
    }

    pub fn push_value(&mut self, point: Uuid, stamp: DateTime<Utc>, value: Value) {
        self.archive.entry(point).or_default().push(PointValue {
            point,
            stamp,
            version: Some(stamp),
            value,
            state: None,
        });
    }
}

#[cfg(test)]
impl StoreSession for InMemorySession {
    fn select(&mut self, query: &StoreQuery) -> Result<StorePage> {
        let mut rows: Vec<PointValue> = self
            .archive
            .get(&query.point)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|row| {
                let s = &query.stamps;
                s.at.map_or(true, |t| row.stamp == t)
                    && s.not_before.map_or(true, |t| row.stamp >= t)
                    && s.after.map_or(true, |t| row.stamp > t)
                    && s.not_after.map_or(true, |t| row.stamp <= t)
                    && s.before.map_or(true, |t| row.stamp < t)
                    && (!query.not_null || !row.value.is_null())
            })
            .collect();
        rows.sort_by_key(|r| r.stamp);

        let start = query.continuation_token.unwrap_or(0) as usize;
        let end = (start + self.page_size).min(rows.len());
        let page_rows = rows.get(start..end).unwrap_or_default().to_vec();
        let complete = end >= rows.len();
        let continuation = if complete {
            None
        } else {
            let mut next = query.clone();
            next.continuation_token = Some(end as u64);
            Some(next)
        };
        Ok(StorePage {
            rows: page_rows,
            complete,
            continuation,
        })
    }

    fn update(&mut self, updates: &[PointValue]) -> Result<Vec<Option<String>>> {
        let mut outcomes = Vec::with_capacity(updates.len());
        for row in updates {
            let series = self.archive.entry(row.point).or_default();
            if let Some(existing) = series.iter_mut().find(|r| r.stamp == row.stamp) {
                *existing = row.clone();
            } else {
                series.push(row.clone());
            }
            outcomes.push(None);
        }
        Ok(outcomes)
    }

    fn get_point_bindings(&mut self, names: &[String]) -> Result<Vec<(String, Uuid)>> {
        if names.is_empty() {
            return Ok(self
                .directory
                .iter()
                .map(|(n, u)| (n.clone(), *u))
                .collect());
        }
        Ok(names
            .iter()
            .filter_map(|n| self.directory.get(n).map(|u| (n.clone(), *u)))
            .collect())
    }

    fn disconnect(&mut self) {
        self.disconnected = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_session_pages_results_at_configured_size() {
        let mut session = InMemorySession::new(2);
        let point = Uuid::new_v4();
        session.register_point("T.x", point);
        for i in 0..5 {
            session.push_value(
                point,
                Utc::now() + chrono::Duration::seconds(i),
                Value::Float(i as f64),
            );
        }

        let mut query = StoreQuery::new(point);
        let mut total = 0;
        loop {
            let page = session.select(&query).unwrap();
            total += page.rows.len();
            assert!(page.rows.len() <= 2);
            if page.complete {
                break;
            }
            query = page.continuation.unwrap();
        }
        assert_eq!(total, 5);
    }

    #[test]
    fn get_point_bindings_resolves_registered_names_only() {
        let mut session = InMemorySession::new(10);
        let point = Uuid::new_v4();
        session.register_point("T.x", point);
        let bindings = session
            .get_point_bindings(&["T.x".to_string(), "T.unknown".to_string()])
            .unwrap();
        assert_eq!(bindings, vec![("T.x".to_string(), point)]);
    }

    #[test]
    fn get_point_bindings_with_no_names_lists_the_full_directory() {
        let mut session = InMemorySession::new(10);
        session.register_point("T.x", Uuid::new_v4());
        session.register_point("T.y", Uuid::new_v4());
        let bindings = session.get_point_bindings(&[]).unwrap();
        assert_eq!(bindings.len(), 2);
    }
}
