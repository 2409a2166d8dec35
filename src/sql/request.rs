//! Request + Column Model (component K): a normalized, deep-copyable
//! representation of a parsed statement, shared by every `execute*` call
//! against a prepared statement.
//!
//! Parameter slots are plain indices into the Request's own `parameters`
//! vector. Because every `ValueToken::Parameter` variant holds an index
//! rather than a shared pointer, `#[derive(Clone)]` already gives the
//! "deep copy including parameter slots" semantics required for batch
//! expansion: a cloned Request has its own `parameters` vector and its
//! value tokens still point at the same (now independent) slots.

use crate::sql::column::{Column, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
}

/// A value appearing in the grammar's `value` production, before any
/// parameter has been bound.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueToken {
    Quoted(String),
    Integer(i64),
    Float(f64),
    /// Index into the owning Request's `parameters`.
    Parameter(usize),
    Null,
    Now,
    Today,
    Yesterday,
    Bot,
    Eot,
}

/// A value bound to a parameter slot at execution time.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Uuid(uuid::Uuid),
    Timestamp(chrono::DateTime<chrono::Utc>),
    Null,
}

/// Comparison operators accepted on `POINT`/`POINT_NAME`/`POINT_UUID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointOp {
    Eq,
    Like,
    Regexp,
}

/// Comparison operators accepted on `STAMP`/`VERSION`, mapped to the
/// upstream store's bound vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOp {
    At,
    NotBefore,
    After,
    NotAfter,
    Before,
}

impl TimeOp {
    /// `=` -> At, `>=` -> NotBefore, `>` -> After, `<=` -> NotAfter, `<` -> Before.
    pub fn from_operator(op: &str) -> Option<Self> {
        Some(match op {
            "=" => TimeOp::At,
            ">=" => TimeOp::NotBefore,
            ">" => TimeOp::After,
            "<=" => TimeOp::NotAfter,
            "<" => TimeOp::Before,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeBound {
    pub op: TimeOp,
    pub value: ValueToken,
}

/// The point addressed by a `pointPred`: by numeric id, by name, or by UUID.
#[derive(Debug, Clone, PartialEq)]
pub enum PointSelector {
    Point(PointOp, ValueToken),
    Name(PointOp, ValueToken),
    /// `POINT_UUID` accepts only `=`.
    Uuid(ValueToken),
}

/// The four sync-modifier predicates, each a quoted value on its own
/// reserved word; a statement may combine more than one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncDescriptor {
    pub crontab: Option<String>,
    pub elapsed: Option<String>,
    pub stamps: Option<String>,
}

impl SyncDescriptor {
    pub fn is_empty(&self) -> bool {
        self.crontab.is_none() && self.elapsed.is_none() && self.stamps.is_none()
    }
}

/// Query-only fields: the projected columns, their display titles, and
/// an alias map for columns referenced by a table alias.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryExtra {
    pub columns: Vec<Column>,
    pub titles: Vec<String>,
    pub alias_map: std::collections::HashMap<String, Column>,
}

/// Update-only fields (`INSERT`/`UPDATE`): the columns being written and
/// their value tokens, in `SET`/`VALUES` order. `value_rows` holds more
/// than one entry only for `INSERT ... VALUES (...) VALUES (...)`, the
/// repeated-`values` branch of the grammar; `UPDATE ... SET` always
/// produces exactly one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExtra {
    pub columns: Vec<Column>,
    pub value_rows: Vec<Vec<ValueToken>>,
}

/// A fully parsed statement. Shared fields apply to every command;
/// `query`/`update` hold the command-specific extras.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: Command,
    pub table: Table,
    pub table_alias: Option<String>,
    /// `SELECT ALL` / `UPDATE ALL` / `DELETE ALL`: cross-point mode.
    pub all: bool,
    pub point_selector: Option<PointSelector>,
    pub stamp_bound: Option<TimeBound>,
    /// Mentioning `VERSION` selects pull mode; mutually exclusive with
    /// `stamp_bound`.
    pub version_bound: Option<TimeBound>,
    pub sync: SyncDescriptor,
    pub time_limit: Option<String>,
    pub limit: Option<u64>,
    /// True exactly when `version_bound` is set.
    pub pull: bool,
    /// True when any sync modifier is present.
    pub synced: bool,
    /// `VALUE IS NOT NULL` was present in the `WHERE` clause.
    pub null_ignored: bool,
    pub interpolated: bool,
    pub extrapolated: bool,
    /// Parameter slots in declaration order; populated by the driver
    /// before execution, one entry reserved (as `ParamValue::Null`) per
    /// `?` token the parser encountered.
    pub parameters: Vec<ParamValue>,
    pub query: Option<QueryExtra>,
    pub update: Option<UpdateExtra>,
}

impl Request {
    pub fn new(command: Command, table: Table) -> Self {
        Self {
            command,
            table,
            table_alias: None,
            all: false,
            point_selector: None,
            stamp_bound: None,
            version_bound: None,
            sync: SyncDescriptor::default(),
            time_limit: None,
            limit: None,
            pull: false,
            synced: false,
            null_ignored: false,
            interpolated: false,
            extrapolated: false,
            parameters: Vec::new(),
            query: None,
            update: None,
        }
    }

    /// Binds a value to parameter slot `index`, growing `parameters` with
    /// `ParamValue::Null` placeholders as needed. Re-executions of the same
    /// prepared statement rebind slots in place.
    pub fn bind(&mut self, index: usize, value: ParamValue) {
        if index >= self.parameters.len() {
            self.parameters.resize(index + 1, ParamValue::Null);
        }
        self.parameters[index] = value;
    }

    pub fn resolve(&self, token: &ValueToken) -> Option<&ParamValue> {
        match token {
            ValueToken::Parameter(idx) => self.parameters.get(*idx),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_op_maps_operators_per_spec_table() {
        assert_eq!(TimeOp::from_operator("="), Some(TimeOp::At));
        assert_eq!(TimeOp::from_operator(">="), Some(TimeOp::NotBefore));
        assert_eq!(TimeOp::from_operator(">"), Some(TimeOp::After));
        assert_eq!(TimeOp::from_operator("<="), Some(TimeOp::NotAfter));
        assert_eq!(TimeOp::from_operator("<"), Some(TimeOp::Before));
        assert_eq!(TimeOp::from_operator("!="), None);
    }

    #[test]
    fn clone_gives_independent_parameter_slots() {
        let mut req = Request::new(Command::Select, Table::Archive);
        req.query = Some(QueryExtra {
            columns: vec![Column::Value],
            titles: vec!["VALUE".into()],
            alias_map: Default::default(),
        });
        req.bind(0, ParamValue::Integer(1));

        let mut clone = req.clone();
        clone.bind(0, ParamValue::Integer(2));

        assert_eq!(req.parameters[0], ParamValue::Integer(1));
        assert_eq!(clone.parameters[0], ParamValue::Integer(2));
    }

    #[test]
    fn bind_grows_parameter_vector_to_fit_index() {
        let mut req = Request::new(Command::Select, Table::Archive);
        req.bind(2, ParamValue::Text("x".into()));
        assert_eq!(req.parameters.len(), 3);
        assert_eq!(req.parameters[0], ParamValue::Null);
        assert_eq!(req.parameters[2], ParamValue::Text("x".into()));
    }

    #[test]
    fn sync_descriptor_is_empty_by_default() {
        assert!(SyncDescriptor::default().is_empty());
    }
}
