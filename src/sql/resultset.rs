//! Result set (component M): a 1-based, type-coercing cursor over the rows
//! the paging engine assembled, in either of two cursor modes.
//!
//! Rows are paged fully into memory by the time a `ResultSet` exists
//! (component L drains every upstream page before returning one) — the two
//! modes differ only in which cursor movements they expose, not in how the
//! rows are stored: forward-only permits only `next`/`last`/`is_last`
//! (and a same-or-later `absolute`), scroll-insensitive additionally
//! permits `previous`/`relative`/`before_first`/`after_last`, all O(1)
//! since every row is already resident.
//!
//! The updatable path queues `update_row`/`insert_row`/`delete_row` as
//! pending mutations rather than writing through immediately; the owning
//! connection (component N) flushes them to the upstream session on
//! statement close or commit.

use crate::sql::column::Column;
use crate::sql::error::{Result, SqlError};
use crate::sql::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    ForwardOnly,
    ScrollInsensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    ReadOnly,
    Updatable,
}

#[derive(Debug, Clone)]
pub enum PendingUpdate {
    UpdateRow { index: usize, row: Vec<Value> },
    InsertRow { row: Vec<Value> },
    DeleteRow { index: usize },
}

pub struct ResultSet {
    columns: Vec<Column>,
    titles: Vec<String>,
    rows: Vec<Vec<Value>>,
    mode: CursorMode,
    concurrency: Concurrency,
    /// 0 = before-first, `rows.len() + 1` = after-last, else 1-based row.
    cursor: usize,
    was_null: bool,
    closed: bool,
    pending_row: Option<Vec<Value>>,
    pending_updates: Vec<PendingUpdate>,
}

impl ResultSet {
    pub fn new(
        columns: Vec<Column>,
        titles: Vec<String>,
        rows: Vec<Vec<Value>>,
        mode: CursorMode,
        concurrency: Concurrency,
    ) -> Self {
        Self {
            columns,
            titles,
            rows,
            mode,
            concurrency,
            cursor: 0,
            was_null: false,
            closed: false,
            pending_row: None,
            pending_updates: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Raw column-major access to a materialized row, for the owning
    /// connection to pull the key columns (point/stamp) a queued
    /// `PendingUpdate` needs but this type has no business interpreting.
    pub fn row_values(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn was_null(&self) -> bool {
        self.was_null
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(SqlError::ResultSetClosed);
        }
        Ok(())
    }

    // ---- cursor movement ------------------------------------------------

    pub fn next(&mut self) -> Result<bool> {
        self.check_open()?;
        if self.cursor <= self.rows.len() {
            self.cursor += 1;
        }
        Ok(self.cursor >= 1 && self.cursor <= self.rows.len())
    }

    pub fn is_last(&self) -> Result<bool> {
        self.check_open()?;
        Ok(!self.rows.is_empty() && self.cursor == self.rows.len())
    }

    pub fn is_first(&self) -> Result<bool> {
        self.check_open()?;
        Ok(self.cursor == 1)
    }

    pub fn last(&mut self) -> Result<bool> {
        self.check_open()?;
        if self.rows.is_empty() {
            self.cursor = 0;
            return Ok(false);
        }
        self.cursor = self.rows.len();
        Ok(true)
    }

    /// `1`-based absolute positioning. Forward-only result sets reject a
    /// target behind the current cursor — that mode never moves backward.
    pub fn absolute(&mut self, row: i64) -> Result<bool> {
        self.check_open()?;
        let target = if row >= 0 {
            row as usize
        } else {
            (self.rows.len() as i64 + row + 1).max(0) as usize
        };
        if self.mode == CursorMode::ForwardOnly && target != 0 && target < self.cursor {
            return Err(SqlError::FeatureNotSupported(
                "forward-only result sets cannot move backward".to_string(),
            ));
        }
        self.cursor = target.min(self.rows.len() + 1);
        Ok(self.cursor >= 1 && self.cursor <= self.rows.len())
    }

    pub fn relative(&mut self, offset: i64) -> Result<bool> {
        self.require_scroll_insensitive()?;
        let target = self.cursor as i64 + offset;
        self.absolute(target.max(0))
    }

    pub fn previous(&mut self) -> Result<bool> {
        self.require_scroll_insensitive()?;
        if self.cursor == 0 {
            return Ok(false);
        }
        self.cursor -= 1;
        Ok(self.cursor >= 1)
    }

    pub fn before_first(&mut self) -> Result<()> {
        self.require_scroll_insensitive()?;
        self.cursor = 0;
        Ok(())
    }

    pub fn after_last(&mut self) -> Result<()> {
        self.require_scroll_insensitive()?;
        self.cursor = self.rows.len() + 1;
        Ok(())
    }

    fn require_scroll_insensitive(&self) -> Result<()> {
        self.check_open()?;
        if self.mode != CursorMode::ScrollInsensitive {
            return Err(SqlError::FeatureNotSupported(
                "cursor movement requires a scroll-insensitive result set".to_string(),
            ));
        }
        Ok(())
    }

    // ---- column access ----------------------------------------------

    fn column_index(&self, column: Column) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .ok_or_else(|| SqlError::UnknownColumn(column.meta().label.to_string()))
    }

    fn current_row(&self) -> Result<&[Value]> {
        self.check_open()?;
        self.rows
            .get(self.cursor.wrapping_sub(1))
            .map(|r| r.as_slice())
            .ok_or(SqlError::InvalidColumnNumber(0))
    }

    pub fn get(&mut self, column: Column) -> Result<Value> {
        let index = self.column_index(column)?;
        let row = self.current_row()?;
        let value = row
            .get(index)
            .cloned()
            .ok_or(SqlError::InvalidColumnNumber(index))?;
        self.was_null = value.is_null();
        Ok(value)
    }

    pub fn get_by_index(&mut self, index: usize) -> Result<Value> {
        if index >= self.columns.len() {
            return Err(SqlError::InvalidColumnNumber(index));
        }
        let row = self.current_row()?;
        let value = row
            .get(index)
            .cloned()
            .ok_or(SqlError::InvalidColumnNumber(index))?;
        self.was_null = value.is_null();
        Ok(value)
    }

    // ---- updatable path -----------------------------------------------

    fn require_updatable(&self) -> Result<()> {
        self.check_open()?;
        if self.concurrency != Concurrency::Updatable {
            return Err(SqlError::ResultSetReadOnly);
        }
        Ok(())
    }

    pub fn update_value(&mut self, column: Column, value: Value) -> Result<()> {
        self.require_updatable()?;
        if !column.meta().writable {
            return Err(SqlError::ColumnReadOnly(column.meta().label.to_string()));
        }
        let index = self.column_index(column)?;
        let current = self.current_row()?.to_vec();
        let pending = self.pending_row.get_or_insert(current);
        pending[index] = value;
        Ok(())
    }

    /// Flushes the in-progress `update_value` calls onto the current row
    /// and queues it for the owning connection to apply.
    pub fn update_row(&mut self) -> Result<()> {
        self.require_updatable()?;
        let index = self.cursor.wrapping_sub(1);
        if let Some(row) = self.pending_row.take() {
            self.rows[index] = row.clone();
            self.pending_updates
                .push(PendingUpdate::UpdateRow { index, row });
        }
        Ok(())
    }

    pub fn insert_row(&mut self, row: Vec<Value>) -> Result<()> {
        self.require_updatable()?;
        if row.len() != self.columns.len() {
            return Err(SqlError::InvalidColumnNumber(row.len()));
        }
        self.pending_updates
            .push(PendingUpdate::InsertRow { row: row.clone() });
        self.rows.push(row);
        Ok(())
    }

    pub fn delete_row(&mut self) -> Result<()> {
        self.require_updatable()?;
        let index = self.cursor.wrapping_sub(1);
        self.current_row()?;
        self.pending_updates
            .push(PendingUpdate::DeleteRow { index });
        Ok(())
    }

    /// Drains the queued mutations for the owning connection to apply to
    /// the upstream session; called on commit or statement close.
    pub fn take_pending_updates(&mut self) -> Vec<PendingUpdate> {
        std::mem::take(&mut self.pending_updates)
    }

    pub fn has_pending_updates(&self) -> bool {
        !self.pending_updates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> ResultSet {
        ResultSet::new(
            vec![Column::PointName, Column::Value],
            vec!["POINT_NAME".into(), "VALUE".into()],
            vec![
                vec![Value::Text("T.a".into()), Value::Float(1.0)],
                vec![Value::Text("T.b".into()), Value::Float(2.0)],
                vec![Value::Text("T.c".into()), Value::Null],
            ],
            CursorMode::ForwardOnly,
            Concurrency::ReadOnly,
        )
    }

    #[test]
    fn forward_only_walks_rows_in_order() {
        let mut rs = sample();
        assert!(rs.next().unwrap());
        assert_eq!(rs.get(Column::Value).unwrap(), Value::Float(1.0));
        assert!(rs.next().unwrap());
        assert!(rs.next().unwrap());
        assert!(rs.was_null() == false);
        assert_eq!(rs.get(Column::Value).unwrap(), Value::Null);
        assert!(rs.was_null());
        assert!(!rs.next().unwrap());
    }

    #[test]
    fn forward_only_rejects_moving_backward() {
        let mut rs = sample();
        rs.absolute(2).unwrap();
        let err = rs.absolute(1).unwrap_err();
        assert!(matches!(err, SqlError::FeatureNotSupported(_)));
    }

    #[test]
    fn forward_only_rejects_previous_and_relative() {
        let mut rs = sample();
        assert!(rs.previous().is_err());
        assert!(rs.relative(1).is_err());
        assert!(rs.before_first().is_err());
    }

    #[test]
    fn scroll_insensitive_supports_random_access() {
        let mut rs = ResultSet::new(
            vec![Column::Value],
            vec!["VALUE".into()],
            vec![
                vec![Value::Float(1.0)],
                vec![Value::Float(2.0)],
                vec![Value::Float(3.0)],
            ],
            CursorMode::ScrollInsensitive,
            Concurrency::ReadOnly,
        );
        assert!(rs.absolute(3).unwrap());
        assert_eq!(rs.get(Column::Value).unwrap(), Value::Float(3.0));
        assert!(rs.previous().unwrap());
        assert_eq!(rs.get(Column::Value).unwrap(), Value::Float(2.0));
        rs.before_first().unwrap();
        assert!(rs.next().unwrap());
        assert_eq!(rs.get(Column::Value).unwrap(), Value::Float(1.0));
    }

    #[test]
    fn is_last_is_true_only_on_the_final_row() {
        let mut rs = sample();
        rs.next().unwrap();
        assert!(!rs.is_last().unwrap());
        rs.last().unwrap();
        assert!(rs.is_last().unwrap());
    }

    #[test]
    fn read_only_result_set_rejects_updates() {
        let mut rs = sample();
        rs.next().unwrap();
        let err = rs.update_value(Column::Value, Value::Float(9.0)).unwrap_err();
        assert!(matches!(err, SqlError::ResultSetReadOnly));
    }

    #[test]
    fn updatable_result_set_queues_row_updates() {
        let mut rs = ResultSet::new(
            vec![Column::PointName, Column::Value],
            vec!["POINT_NAME".into(), "VALUE".into()],
            vec![vec![Value::Text("T.a".into()), Value::Float(1.0)]],
            CursorMode::ScrollInsensitive,
            Concurrency::Updatable,
        );
        rs.next().unwrap();
        rs.update_value(Column::Value, Value::Float(42.0)).unwrap();
        rs.update_row().unwrap();
        assert_eq!(rs.get(Column::Value).unwrap(), Value::Float(42.0));
        assert!(rs.has_pending_updates());
        let pending = rs.take_pending_updates();
        assert_eq!(pending.len(), 1);
        assert!(!rs.has_pending_updates());
    }

    #[test]
    fn updatable_result_set_rejects_read_only_column() {
        let mut rs = ResultSet::new(
            vec![Column::PointName, Column::Stamp],
            vec!["POINT_NAME".into(), "STAMP".into()],
            vec![vec![
                Value::Text("T.a".into()),
                Value::Timestamp(Utc::now()),
            ]],
            CursorMode::ScrollInsensitive,
            Concurrency::Updatable,
        );
        rs.next().unwrap();
        let err = rs
            .update_value(Column::Stamp, Value::Timestamp(Utc::now()))
            .unwrap_err();
        assert!(matches!(err, SqlError::ColumnReadOnly(_)));
    }

    #[test]
    fn operations_on_a_closed_result_set_fail() {
        let mut rs = sample();
        rs.close();
        assert!(matches!(rs.next(), Err(SqlError::ResultSetClosed)));
    }
}
