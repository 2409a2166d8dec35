//! Column enumeration and fixed metadata (component K), and the two
//! logical tables the driver exposes.

use crate::sql::error::{Result, SqlError};

/// The native type a column's values are coerced to/from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    VarChar,
    Timestamp,
    Uuid,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    All,
    Point,
    PointName,
    PointUuid,
    Stamp,
    Version,
    State,
    Value,
    Interpolated,
    Extrapolated,
    Count,
    Crontab,
    Elapsed,
    Stamps,
    TimeLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMeta {
    pub label: &'static str,
    pub display_size: usize,
    pub sql_type: ColumnType,
    pub nullable: bool,
    pub writable: bool,
}

impl Column {
    pub fn from_word(word: &str) -> Option<Self> {
        Some(match word.to_ascii_uppercase().as_str() {
            "*" | "ALL" => Column::All,
            "POINT" => Column::Point,
            "POINT_NAME" => Column::PointName,
            "POINT_UUID" => Column::PointUuid,
            "STAMP" => Column::Stamp,
            "VERSION" => Column::Version,
            "STATE" => Column::State,
            "VALUE" => Column::Value,
            "INTERPOLATED" => Column::Interpolated,
            "EXTRAPOLATED" => Column::Extrapolated,
            "COUNT" => Column::Count,
            "CRONTAB" => Column::Crontab,
            "ELAPSED" => Column::Elapsed,
            "STAMPS" => Column::Stamps,
            "TIME_LIMIT" => Column::TimeLimit,
            _ => return None,
        })
    }

    pub fn meta(self) -> ColumnMeta {
        match self {
            Column::All => ColumnMeta {
                label: "*",
                display_size: 0,
                sql_type: ColumnType::VarChar,
                nullable: false,
                writable: false,
            },
            Column::Point => ColumnMeta {
                label: "POINT",
                display_size: 64,
                sql_type: ColumnType::VarChar,
                nullable: false,
                writable: false,
            },
            Column::PointName => ColumnMeta {
                label: "POINT_NAME",
                display_size: 64,
                sql_type: ColumnType::VarChar,
                nullable: false,
                writable: false,
            },
            Column::PointUuid => ColumnMeta {
                label: "POINT_UUID",
                display_size: 36,
                sql_type: ColumnType::Uuid,
                nullable: false,
                writable: false,
            },
            Column::Stamp => ColumnMeta {
                label: "STAMP",
                display_size: 29,
                sql_type: ColumnType::Timestamp,
                nullable: false,
                writable: false,
            },
            Column::Version => ColumnMeta {
                label: "VERSION",
                display_size: 29,
                sql_type: ColumnType::Timestamp,
                nullable: false,
                writable: false,
            },
            Column::State => ColumnMeta {
                label: "STATE",
                display_size: 16,
                sql_type: ColumnType::Integer,
                nullable: true,
                writable: true,
            },
            Column::Value => ColumnMeta {
                label: "VALUE",
                display_size: 32,
                sql_type: ColumnType::Float,
                nullable: true,
                writable: true,
            },
            Column::Interpolated => ColumnMeta {
                label: "INTERPOLATED",
                display_size: 32,
                sql_type: ColumnType::Float,
                nullable: true,
                writable: false,
            },
            Column::Extrapolated => ColumnMeta {
                label: "EXTRAPOLATED",
                display_size: 32,
                sql_type: ColumnType::Float,
                nullable: true,
                writable: false,
            },
            Column::Count => ColumnMeta {
                label: "COUNT",
                display_size: 20,
                sql_type: ColumnType::Integer,
                nullable: false,
                writable: false,
            },
            Column::Crontab => ColumnMeta {
                label: "CRONTAB",
                display_size: 255,
                sql_type: ColumnType::VarChar,
                nullable: true,
                writable: false,
            },
            Column::Elapsed => ColumnMeta {
                label: "ELAPSED",
                display_size: 255,
                sql_type: ColumnType::VarChar,
                nullable: true,
                writable: false,
            },
            Column::Stamps => ColumnMeta {
                label: "STAMPS",
                display_size: 255,
                sql_type: ColumnType::VarChar,
                nullable: true,
                writable: false,
            },
            Column::TimeLimit => ColumnMeta {
                label: "TIME_LIMIT",
                display_size: 255,
                sql_type: ColumnType::VarChar,
                nullable: true,
                writable: false,
            },
        }
    }
}

/// The only two logical tables the driver exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Table {
    #[default]
    Archive,
    Points,
}

impl Table {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ARCHIVE" => Ok(Table::Archive),
            "POINTS" => Ok(Table::Points),
            other => Err(SqlError::UnknownTable(other.to_string())),
        }
    }

    /// Returned to callers normalized upper-case.
    pub fn name(self) -> &'static str {
        match self {
            Table::Archive => "ARCHIVE",
            Table::Points => "POINTS",
        }
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Table::Archive)
    }

    /// `SELECT *` expands to every schema column of the chosen table.
    pub fn all_columns(self) -> Vec<Column> {
        match self {
            Table::Archive => vec![
                Column::PointName,
                Column::Stamp,
                Column::Value,
                Column::State,
            ],
            Table::Points => vec![Column::PointName, Column::PointUuid],
        }
    }

    /// Point-table queries restrict point predicates to these two columns.
    pub fn point_predicate_columns(self) -> &'static [Column] {
        match self {
            Table::Points => &[Column::PointName, Column::PointUuid],
            Table::Archive => &[Column::Point, Column::PointName, Column::PointUuid],
        }
    }
}
