//! Structured SQL driver errors (component-spanning, §7).
//!
//! Each variant carries enough context to format a useful message and maps
//! to a SQL:1999-compatible state string via [`SqlError::sql_state`],
//! mirroring the JDBC `SQLException`/`SQLState` pairing without naming it.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("result set closed")]
    ResultSetClosed,
    #[error("result set is read-only")]
    ResultSetReadOnly,
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    #[error("wrong data type for column {0}")]
    WrongDataType(String),
    #[error("invalid column number: {0}")]
    InvalidColumnNumber(usize),
    #[error("invalid parameter number: {0}")]
    InvalidParameterNumber(usize),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("unknown point: {0}")]
    UnknownPoint(String),
    #[error("ambiguous key for point {0}")]
    AmbiguousKey(String),
    #[error("missing key column")]
    MissingKeyColumn,
    #[error("column is read-only: {0}")]
    ColumnReadOnly(String),
    #[error("table is read-only: {0}")]
    TableReadOnly(String),
    #[error("point not specified")]
    PointNotSpecified,
    #[error("stamp not specified")]
    StampNotSpecified,
    #[error("not a valid point name: {0}")]
    NotAName(String),
    #[error("not a valid UUID: {0}")]
    NotAUuid(String),
    #[error("not a valid timestamp: {0}")]
    NotAStamp(String),
    #[error("not a valid number: {0}")]
    NotANumber(String),
    #[error("pattern syntax error: {0}")]
    PatternSyntaxError(String),
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of statement")]
    UnexpectedEnd,
    #[error("unexpected column: {0}")]
    UnexpectedColumn(String),
    #[error("multiple tables in one statement")]
    MultipleTables,
    #[error("duplicate alias: {0}")]
    DuplicateAlias(String),
    #[error("missing closing quote")]
    MissingQuote,
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("invalid number format: {0}")]
    InvalidNumberFormat(String),
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    #[error("invalid operation while auto-commit is enabled")]
    AutoCommit,
    #[error("result set concurrency not supported")]
    ResultSetConcurrencyNotSupported,
    #[error("result set holdability not supported")]
    ResultSetHoldabilityNotSupported,
    #[error("transaction isolation level not supported")]
    TransactionLevelNotSupported,
    #[error("upstream session error: {0}")]
    SessionException(String),
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("bad connection url: {0}")]
    BadConnectionUrl(String),
}

impl SqlError {
    /// SQL:1999 state class, as advertised by the driver (§6).
    pub fn sql_state(&self) -> &'static str {
        match self {
            SqlError::ConnectionClosed => "08003",
            SqlError::ConnectFailed(_) => "08001",
            SqlError::SessionException(_) => "08004",
            SqlError::BadConnectionUrl(_) => "08001",
            SqlError::UnknownTable(_) => "42S02",
            SqlError::UnknownColumn(_) | SqlError::UnexpectedColumn(_) => "42S22",
            SqlError::UnexpectedToken(_)
            | SqlError::UnexpectedEnd
            | SqlError::MissingQuote
            | SqlError::InvalidEscape
            | SqlError::InvalidNumberFormat(_)
            | SqlError::MultipleTables
            | SqlError::DuplicateAlias(_) => "37000",
            SqlError::FeatureNotSupported(_)
            | SqlError::ResultSetConcurrencyNotSupported
            | SqlError::ResultSetHoldabilityNotSupported
            | SqlError::TransactionLevelNotSupported => "0A000",
            SqlError::TransactionFailed(_) => "40000",
            SqlError::AutoCommit => "25000",
            SqlError::ResultSetClosed | SqlError::ResultSetReadOnly => "24000",
            _ => "HY000",
        }
    }
}

pub type Result<T> = std::result::Result<T, SqlError>;
