//! SQL connection facade (component N): the single point of entry a caller
//! uses to prepare and run statements against the upstream store, and the
//! transaction/holdability semantics layered on top of the paging engine
//! and result sets.
//!
//! Per §4.6/§9: only `TRANSACTION_READ_COMMITTED` isolation is offered (the
//! upstream store has no concept of a stronger one), both cursor
//! holdabilities are supported, and a per-row failure during a commit's
//! write flush becomes a chained [`SqlWarning`] rather than aborting the
//! whole batch — only a failure to reach the upstream at all fails the
//! commit outright.

use uuid::Uuid;

use crate::sql::column::{Column, Table};
use crate::sql::error::{Result, SqlError};
use crate::sql::paging::{self, QueryOutcome};
use crate::sql::pointcache::PointCache;
use crate::sql::request::{Command, ParamValue, Request, ValueToken};
use crate::sql::resultset::{Concurrency, CursorMode, PendingUpdate, ResultSet};
use crate::sql::session::{PointValue, StoreSession};
use crate::sql::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holdability {
    CloseCursorsAtCommit,
    HoldCursorsOverCommit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlWarning {
    pub message: String,
}

/// A statement parsed once and reused across `execute*` calls; each call
/// clones the template (`Request` derives `Clone`, giving independent
/// parameter slots per §4's deep-copy requirement) before binding and
/// running it.
#[derive(Clone)]
pub struct PreparedStatement {
    template: Request,
    param_count: usize,
}

impl PreparedStatement {
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn bind(&mut self, index: usize, value: ParamValue) -> Result<()> {
        if index >= self.param_count {
            return Err(SqlError::InvalidParameterNumber(index));
        }
        self.template.bind(index, value);
        Ok(())
    }
}

pub enum ExecOutcome {
    Query(ResultSet),
    Update(u64),
}

pub struct Connection {
    session: Box<dyn StoreSession>,
    cache: PointCache,
    auto_commit: bool,
    transaction_failed: bool,
    read_only: bool,
    holdability: Holdability,
    auto_commit_limit: usize,
    cursor_mode: CursorMode,
    concurrency: Concurrency,
    pending: Vec<PointValue>,
    warnings: Vec<SqlWarning>,
    closed: bool,
}

impl Connection {
    pub fn new(session: Box<dyn StoreSession>) -> Self {
        Self {
            session,
            cache: PointCache::new(),
            auto_commit: true,
            transaction_failed: false,
            read_only: false,
            holdability: Holdability::CloseCursorsAtCommit,
            auto_commit_limit: 1000,
            cursor_mode: CursorMode::ForwardOnly,
            concurrency: Concurrency::ReadOnly,
            pending: Vec::new(),
            warnings: Vec::new(),
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(SqlError::ConnectionClosed);
        }
        Ok(())
    }

    fn check_transaction(&self) -> Result<()> {
        if self.transaction_failed {
            return Err(SqlError::TransactionFailed(
                "a prior statement in this transaction failed; roll back first".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_scrollable(&mut self, scrollable: bool) {
        self.cursor_mode = if scrollable {
            CursorMode::ScrollInsensitive
        } else {
            CursorMode::ForwardOnly
        };
    }

    /// `CONCUR_UPDATABLE` is only offered on `ARCHIVE` (§6); whether a
    /// given statement's result set may actually use it is checked against
    /// the statement's table at `execute` time, not here.
    pub fn set_updatable(&mut self, updatable: bool) {
        self.concurrency = if updatable {
            Concurrency::Updatable
        } else {
            Concurrency::ReadOnly
        };
    }

    pub fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        self.check_open()?;
        self.read_only = read_only;
        Ok(())
    }

    pub fn set_holdability(&mut self, holdability: Holdability) {
        self.holdability = holdability;
    }

    pub fn holdability(&self) -> Holdability {
        self.holdability
    }

    pub fn set_auto_commit_limit(&mut self, limit: usize) {
        self.auto_commit_limit = limit.max(1);
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn warnings(&self) -> &[SqlWarning] {
        &self.warnings
    }

    pub fn clear_warnings(&mut self) {
        self.warnings.clear();
    }

    /// Parses `sql` once into a reusable template. Recorded parameter
    /// count comes straight off the tokenizer's running tally.
    pub fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        self.check_open()?;
        let mut parser = crate::sql::parser::Parser::new(sql);
        let template = parser.parse()?;
        Ok(PreparedStatement {
            template,
            param_count: parser.param_count(),
        })
    }

    /// Enabling auto-commit after it was off commits whatever is pending
    /// first (§9: "the transition itself is the commit point").
    pub fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        self.check_open()?;
        if enabled && !self.auto_commit {
            self.commit()?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    pub fn execute(&mut self, stmt: &PreparedStatement) -> Result<ExecOutcome> {
        self.check_open()?;
        self.check_transaction()?;
        let request = stmt.template.clone();
        match request.command {
            Command::Select => self.execute_query(request),
            Command::Insert | Command::Update | Command::Delete => self.execute_write(request),
        }
    }

    fn execute_query(&mut self, request: Request) -> Result<ExecOutcome> {
        if self.concurrency == Concurrency::Updatable && request.table != Table::Archive {
            return Err(SqlError::ResultSetConcurrencyNotSupported);
        }
        let outcome = paging::execute_select(&request, &self.cache, self.session.as_mut())?;
        let columns = request.query.as_ref().map(|q| q.columns.clone()).unwrap_or_default();
        let titles = request.query.as_ref().map(|q| q.titles.clone()).unwrap_or_default();
        let result_set = match outcome {
            QueryOutcome::Rows(rows) => {
                ResultSet::new(columns, titles, rows, self.cursor_mode, self.concurrency)
            }
            QueryOutcome::Count(n) => ResultSet::new(
                vec![Column::Count],
                vec!["COUNT".to_string()],
                vec![vec![Value::Integer(n as i64)]],
                self.cursor_mode,
                Concurrency::ReadOnly,
            ),
        };
        Ok(ExecOutcome::Query(result_set))
    }

    /// Drains `rs`'s queued `update_row`/`insert_row`/`delete_row` calls and
    /// turns each into a `PointValue` write queued onto this connection's
    /// own pending batch, to be sent on the next commit exactly like a
    /// statement-level `UPDATE`/`DELETE` (§4.6: "the owning connection
    /// flushes them to the upstream session on statement close or commit").
    /// Requires the result set's projection to include a point column
    /// (`POINT_NAME` or `POINT_UUID`) and `STAMP`, since those are the key
    /// the upstream store addresses a value by.
    pub fn apply_result_set_updates(&mut self, rs: &mut ResultSet) -> Result<()> {
        self.check_open()?;
        let point_idx = rs
            .columns()
            .iter()
            .position(|c| matches!(c, Column::PointUuid | Column::PointName));
        let stamp_idx = rs.columns().iter().position(|c| *c == Column::Stamp);
        let (Some(point_idx), Some(stamp_idx)) = (point_idx, stamp_idx) else {
            return Err(SqlError::MissingKeyColumn);
        };
        let point_is_name = rs.columns()[point_idx] == Column::PointName;
        let value_idx = rs.columns().iter().position(|c| *c == Column::Value);
        let state_idx = rs.columns().iter().position(|c| *c == Column::State);

        let pending = rs.take_pending_updates();
        let mut rows = Vec::with_capacity(pending.len());
        for update in pending {
            let (row, tombstone) = match update {
                PendingUpdate::UpdateRow { row, .. } => (row, false),
                PendingUpdate::InsertRow { row } => (row, false),
                PendingUpdate::DeleteRow { index } => {
                    let row = rs
                        .row_values(index)
                        .ok_or(SqlError::InvalidColumnNumber(index))?
                        .to_vec();
                    (row, true)
                }
            };
            let point = if point_is_name {
                let name = row
                    .get(point_idx)
                    .and_then(|v| v.as_text())
                    .ok_or(SqlError::NotAName("<null>".to_string()))?;
                self.cache
                    .resolve(self.session.as_mut(), &name)?
                    .ok_or_else(|| SqlError::UnknownPoint(name.clone()))?
            } else {
                row.get(point_idx)
                    .ok_or(SqlError::NotAUuid("<null>".to_string()))?
                    .as_uuid("POINT_UUID")?
                    .ok_or(SqlError::NotAUuid("<null>".to_string()))?
            };
            let stamp = row
                .get(stamp_idx)
                .ok_or(SqlError::NotAStamp("<null>".to_string()))?
                .as_timestamp("STAMP")?
                .ok_or(SqlError::NotAStamp("<null>".to_string()))?;
            let value = if tombstone {
                Value::Null
            } else {
                value_idx.and_then(|i| row.get(i).cloned()).unwrap_or(Value::Null)
            };
            let state = state_idx.and_then(|i| row.get(i)).and_then(|v| v.as_i64("STATE").ok().flatten());
            rows.push(PointValue {
                point,
                stamp,
                version: None,
                value,
                state,
            });
        }

        self.pending.extend(rows);
        if self.auto_commit {
            self.commit()?;
        } else if self.pending.len() >= self.auto_commit_limit
            && self.holdability == Holdability::HoldCursorsOverCommit
        {
            self.commit()?;
        }
        Ok(())
    }

    fn execute_write(&mut self, request: Request) -> Result<u64> {
        if self.read_only {
            return Err(SqlError::FeatureNotSupported(
                "connection is read-only".to_string(),
            ));
        }
        let rows = match request.command {
            Command::Insert => self.rows_for_insert(&request)?,
            Command::Update => self.rows_for_update(&request)?,
            Command::Delete => self.rows_for_delete(&request)?,
            Command::Select => unreachable!("execute_write only handles mutating commands"),
        };
        let count = rows.len() as u64;
        self.pending.extend(rows);
        if self.auto_commit {
            self.commit()?;
        } else if self.pending.len() >= self.auto_commit_limit {
            self.commit()?;
        }
        Ok(count)
    }

    fn rows_for_insert(&mut self, request: &Request) -> Result<Vec<PointValue>> {
        let update = request.update.as_ref().ok_or(SqlError::UnexpectedEnd)?;
        let mut rows = Vec::with_capacity(update.value_rows.len());
        for value_row in &update.value_rows {
            let mut point = None;
            let mut stamp = None;
            let mut state = None;
            let mut value = Value::Null;
            for (column, token) in update.columns.iter().zip(value_row.iter()) {
                match column {
                    Column::PointName => {
                        let name = paging::resolve_text(request, token)?;
                        point = Some(self.cache.resolve(self.session.as_mut(), &name)?.ok_or(
                            SqlError::UnknownPoint(name),
                        )?);
                    }
                    Column::PointUuid => point = Some(paging::resolve_uuid(request, token)?),
                    Column::Point => {
                        let name = paging::resolve_text(request, token)?;
                        point = Some(self.cache.resolve(self.session.as_mut(), &name)?.ok_or(
                            SqlError::UnknownPoint(name),
                        )?);
                    }
                    Column::Stamp => stamp = Some(paging::resolve_time(request, token)?),
                    Column::State => {
                        state = resolve_literal_value(request, token)?.as_i64("STATE")?;
                    }
                    Column::Value => value = resolve_literal_value(request, token)?,
                    other => {
                        return Err(SqlError::ColumnReadOnly(other.meta().label.to_string()));
                    }
                }
            }
            let point = point.ok_or(SqlError::PointNotSpecified)?;
            let stamp = stamp.ok_or(SqlError::StampNotSpecified)?;
            rows.push(PointValue {
                point,
                stamp,
                version: None,
                value,
                state,
            });
        }
        Ok(rows)
    }

    fn rows_for_update(&mut self, request: &Request) -> Result<Vec<PointValue>> {
        let update = request.update.as_ref().ok_or(SqlError::UnexpectedEnd)?;
        let row = update.value_rows.first().ok_or(SqlError::UnexpectedEnd)?;

        let points = paging::matching_points(request, &self.cache, self.session.as_mut())?;
        if points.is_empty() {
            return Err(SqlError::UnknownPoint(
                "no point matched the UPDATE's point predicate".to_string(),
            ));
        }

        let mut out = Vec::with_capacity(points.len());
        for (_, point) in points {
            let existing = self.latest_row(point)?;
            let mut value = existing.as_ref().map(|r| r.value.clone()).unwrap_or(Value::Null);
            let mut state = existing.as_ref().and_then(|r| r.state);
            let stamp = existing
                .as_ref()
                .map(|r| r.stamp)
                .unwrap_or_else(chrono::Utc::now);

            for (column, token) in update.columns.iter().zip(row.iter()) {
                match column {
                    Column::Value => value = resolve_literal_value(request, token)?,
                    Column::State => {
                        state = resolve_literal_value(request, token)?.as_i64("STATE")?;
                    }
                    other => {
                        return Err(SqlError::ColumnReadOnly(other.meta().label.to_string()));
                    }
                }
            }
            out.push(PointValue {
                point,
                stamp,
                version: None,
                value,
                state,
            });
        }
        Ok(out)
    }

    fn rows_for_delete(&mut self, request: &Request) -> Result<Vec<PointValue>> {
        let points = paging::matching_points(request, &self.cache, self.session.as_mut())?;
        let mut out = Vec::with_capacity(points.len());
        for (_, point) in points {
            if let Some(existing) = self.latest_row(point)? {
                out.push(PointValue {
                    value: Value::Null,
                    ..existing
                });
            }
        }
        Ok(out)
    }

    fn latest_row(&mut self, point: Uuid) -> Result<Option<PointValue>> {
        let mut query = crate::sql::session::StoreQuery::new(point);
        query.row_limit = None;
        let mut latest: Option<PointValue> = None;
        loop {
            let page = self.session.select(&query)?;
            for row in page.rows {
                if latest.as_ref().map_or(true, |l| row.stamp >= l.stamp) {
                    latest = Some(row);
                }
            }
            match page.continuation {
                Some(next) => query = next,
                None => break,
            }
        }
        Ok(latest)
    }

    /// Applies every pending write in insertion order. A row-level failure
    /// is chained onto `warnings` rather than aborting the remaining rows;
    /// only an error reaching the upstream session at all fails the commit.
    pub fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        let rows: Vec<PointValue> = self.pending.drain(..).collect();
        match self.session.update(&rows) {
            Ok(outcomes) => {
                for (row, outcome) in rows.iter().zip(outcomes.iter()) {
                    if let Some(message) = outcome {
                        self.warnings.push(SqlWarning {
                            message: format!("write to point {} failed: {message}", row.point),
                        });
                    }
                }
                Ok(())
            }
            Err(err) => {
                self.transaction_failed = true;
                Err(err)
            }
        }
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.check_open()?;
        self.pending.clear();
        self.transaction_failed = false;
        Ok(())
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.commit();
        self.session.disconnect();
        self.closed = true;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn resolve_literal_value(request: &Request, token: &ValueToken) -> Result<Value> {
    match token {
        ValueToken::Null => Ok(Value::Null),
        ValueToken::Integer(n) => Ok(Value::Integer(*n)),
        ValueToken::Float(f) => Ok(Value::Float(*f)),
        ValueToken::Quoted(s) => Ok(Value::Text(s.clone())),
        ValueToken::Now | ValueToken::Today | ValueToken::Yesterday | ValueToken::Bot | ValueToken::Eot => {
            Ok(Value::Timestamp(paging::resolve_time(request, token)?))
        }
        ValueToken::Parameter(idx) => match request.parameters.get(*idx) {
            Some(ParamValue::Integer(n)) => Ok(Value::Integer(*n)),
            Some(ParamValue::Float(f)) => Ok(Value::Float(*f)),
            Some(ParamValue::Text(s)) => Ok(Value::Text(s.clone())),
            Some(ParamValue::Uuid(u)) => Ok(Value::Uuid(*u)),
            Some(ParamValue::Timestamp(t)) => Ok(Value::Timestamp(*t)),
            Some(ParamValue::Null) | None => Ok(Value::Null),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::session::InMemorySession;
    use chrono::Utc;

    fn connection_with_point(name: &str) -> (Connection, Uuid) {
        let mut session = InMemorySession::new(10);
        let point = Uuid::new_v4();
        session.register_point(name, point);
        (Connection::new(Box::new(session)), point)
    }

    #[test]
    fn insert_then_select_round_trips_through_auto_commit() {
        let (mut conn, _point) = connection_with_point("T.outdoor");
        let insert = conn
            .prepare("INSERT INTO ARCHIVE VALUES ('T.outdoor', NOW(), NULL, 21.5)")
            .unwrap();
        let outcome = conn.execute(&insert).unwrap();
        assert!(matches!(outcome, ExecOutcome::Update(1)));

        let select = conn
            .prepare("SELECT value FROM ARCHIVE WHERE point_name = 'T.outdoor'")
            .unwrap();
        match conn.execute(&select).unwrap() {
            ExecOutcome::Query(mut rs) => {
                assert!(rs.next().unwrap());
                assert_eq!(rs.get(Column::Value).unwrap(), Value::Float(21.5));
            }
            ExecOutcome::Update(_) => panic!("expected a result set"),
        }
    }

    #[test]
    fn manual_commit_flushes_pending_writes_in_order() {
        let (mut conn, _point) = connection_with_point("T.outdoor");
        conn.set_auto_commit(false).unwrap();

        let insert = conn
            .prepare("INSERT INTO ARCHIVE VALUES ('T.outdoor', NOW(), NULL, 1.0)")
            .unwrap();
        conn.execute(&insert).unwrap();
        assert!(conn.warnings().is_empty());

        conn.commit().unwrap();

        let select = conn
            .prepare("SELECT COUNT(*) FROM ARCHIVE WHERE point_name = 'T.outdoor'")
            .unwrap();
        match conn.execute(&select).unwrap() {
            ExecOutcome::Query(mut rs) => {
                assert!(rs.next().unwrap());
                assert_eq!(rs.get(Column::Count).unwrap(), Value::Integer(1));
            }
            ExecOutcome::Update(_) => panic!("expected a result set"),
        }
    }

    #[test]
    fn rollback_discards_pending_writes() {
        let (mut conn, _point) = connection_with_point("T.outdoor");
        conn.set_auto_commit(false).unwrap();

        let insert = conn
            .prepare("INSERT INTO ARCHIVE VALUES ('T.outdoor', NOW(), NULL, 1.0)")
            .unwrap();
        conn.execute(&insert).unwrap();
        conn.rollback().unwrap();

        let select = conn
            .prepare("SELECT COUNT(*) FROM ARCHIVE WHERE point_name = 'T.outdoor'")
            .unwrap();
        match conn.execute(&select).unwrap() {
            ExecOutcome::Query(mut rs) => {
                assert!(rs.next().unwrap());
                assert_eq!(rs.get(Column::Count).unwrap(), Value::Integer(0));
            }
            ExecOutcome::Update(_) => panic!("expected a result set"),
        }
    }

    #[test]
    fn bound_parameters_fill_the_value_column() {
        let (mut conn, _point) = connection_with_point("T.outdoor");
        let mut insert = conn
            .prepare("INSERT INTO ARCHIVE (POINT_NAME, STAMP, VALUE) VALUES (?, NOW(), ?)")
            .unwrap();
        insert.bind(0, ParamValue::Text("T.outdoor".to_string())).unwrap();
        insert.bind(1, ParamValue::Float(9.5)).unwrap();
        conn.execute(&insert).unwrap();

        let select = conn
            .prepare("SELECT value FROM ARCHIVE WHERE point_name = 'T.outdoor'")
            .unwrap();
        match conn.execute(&select).unwrap() {
            ExecOutcome::Query(mut rs) => {
                assert!(rs.next().unwrap());
                assert_eq!(rs.get(Column::Value).unwrap(), Value::Float(9.5));
            }
            ExecOutcome::Update(_) => panic!("expected a result set"),
        }
    }

    #[test]
    fn update_requires_an_existing_point() {
        let (mut conn, _point) = connection_with_point("T.outdoor");
        let update = conn
            .prepare("UPDATE ARCHIVE SET value = 5.0 WHERE point_name = 'T.missing'")
            .unwrap();
        assert!(conn.execute(&update).is_err());
    }

    #[test]
    fn read_only_connection_rejects_writes() {
        let (mut conn, _point) = connection_with_point("T.outdoor");
        conn.set_read_only(true).unwrap();
        let insert = conn
            .prepare("INSERT INTO ARCHIVE VALUES ('T.outdoor', NOW(), NULL, 1.0)")
            .unwrap();
        let err = conn.execute(&insert).unwrap_err();
        assert!(matches!(err, SqlError::FeatureNotSupported(_)));
    }

    #[test]
    fn auto_commit_transition_commits_pending_writes() {
        let (mut conn, _point) = connection_with_point("T.outdoor");
        conn.set_auto_commit(false).unwrap();
        let insert = conn
            .prepare("INSERT INTO ARCHIVE VALUES ('T.outdoor', NOW(), NULL, 1.0)")
            .unwrap();
        conn.execute(&insert).unwrap();

        conn.set_auto_commit(true).unwrap();

        let select = conn
            .prepare("SELECT COUNT(*) FROM ARCHIVE WHERE point_name = 'T.outdoor'")
            .unwrap();
        match conn.execute(&select).unwrap() {
            ExecOutcome::Query(mut rs) => {
                assert!(rs.next().unwrap());
                assert_eq!(rs.get(Column::Count).unwrap(), Value::Integer(1));
            }
            ExecOutcome::Update(_) => panic!("expected a result set"),
        }
    }

    #[test]
    fn prepared_statement_rejects_out_of_range_parameter_index() {
        let (mut conn, _point) = connection_with_point("T.outdoor");
        let mut select = conn
            .prepare("SELECT value FROM ARCHIVE WHERE point_name = ?")
            .unwrap();
        assert_eq!(select.param_count(), 1);
        assert!(select.bind(1, ParamValue::Text("x".into())).is_err());
    }

    #[test]
    fn closing_a_connection_flushes_pending_writes_once() {
        let (mut conn, _point) = connection_with_point("T.outdoor");
        conn.set_auto_commit(false).unwrap();
        let insert = conn
            .prepare("INSERT INTO ARCHIVE VALUES ('T.outdoor', NOW(), NULL, 1.0)")
            .unwrap();
        conn.execute(&insert).unwrap();
        conn.close();
        assert!(conn.is_closed());
        let _ = Utc::now();
    }

    #[test]
    fn positioned_update_on_an_updatable_scrollable_result_set_reaches_the_store() {
        let (mut conn, point) = connection_with_point("T.outdoor");
        let insert = conn
            .prepare("INSERT INTO ARCHIVE VALUES ('T.outdoor', '2024-06-01T00:00:00Z', NULL, 20.0)")
            .unwrap();
        conn.execute(&insert).unwrap();

        conn.set_scrollable(true);
        conn.set_updatable(true);
        conn.set_auto_commit(false).unwrap();
        let select = conn
            .prepare("SELECT point_name, stamp, value FROM ARCHIVE WHERE point_name = 'T.outdoor'")
            .unwrap();
        let ExecOutcome::Query(mut rs) = conn.execute(&select).unwrap() else {
            panic!("expected a result set");
        };
        assert!(rs.next().unwrap());
        rs.update_value(Column::Value, Value::Float(22.0)).unwrap();
        rs.update_row().unwrap();
        conn.apply_result_set_updates(&mut rs).unwrap();
        conn.commit().unwrap();
        drop(rs);

        conn.set_updatable(false);
        let verify = conn
            .prepare("SELECT value FROM ARCHIVE WHERE point_uuid = ?")
            .unwrap();
        let mut verify = verify;
        verify.bind(0, ParamValue::Uuid(point)).unwrap();
        match conn.execute(&verify).unwrap() {
            ExecOutcome::Query(mut rs) => {
                assert!(rs.next().unwrap());
                assert_eq!(rs.get(Column::Value).unwrap(), Value::Float(22.0));
            }
            ExecOutcome::Update(_) => panic!("expected a result set"),
        }
    }

    #[test]
    fn updatable_result_set_rejected_on_points_table() {
        let (mut conn, _point) = connection_with_point("T.outdoor");
        conn.set_updatable(true);
        let select = conn.prepare("SELECT * FROM POINTS").unwrap();
        assert!(matches!(
            conn.execute(&select).unwrap_err(),
            SqlError::ResultSetConcurrencyNotSupported
        ));
    }
}
