//! A read-only-from-the-network SQL driver over a narrow point-value query
//! language, fronting a remote time-series store (spec.md §4.5/§4.6).
//!
//! The module layout mirrors the pipeline a statement travels through:
//! tokenize ([`lexer`]) → parse ([`parser`]) into a normalized [`request`]
//! tree → resolve point names through the [`pointcache`] → page through the
//! upstream [`session`] ([`paging`]) → present as a [`resultset`], all
//! orchestrated by [`connection`].

pub mod column;
pub mod connection;
pub mod error;
pub mod lexer;
pub mod paging;
pub mod parser;
pub mod pointcache;
pub mod request;
pub mod resultset;
pub mod session;
pub mod value;

pub use column::{Column, ColumnMeta, ColumnType, Table};
pub use connection::{Connection, ExecOutcome, Holdability, PreparedStatement, SqlWarning};
pub use error::{Result, SqlError};
pub use paging::QueryOutcome;
pub use parser::Parser;
pub use pointcache::PointCache;
pub use request::{Command, ParamValue, Request};
pub use resultset::{Concurrency, CursorMode, ResultSet};
pub use session::{PointValue, StoreQuery, StoreSession};
pub use value::Value;
