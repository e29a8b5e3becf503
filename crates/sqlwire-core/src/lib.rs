//! Core types shared by the sqlwire drivers.
//!
//! - `Value` for dynamically-typed column data and statement parameters
//! - `Row` and `FromValue` for typed access to result rows
//! - `Error` for the driver error taxonomy

pub mod error;
pub mod row;
pub mod value;

pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, ProtocolError, QueryError,
    QueryErrorKind, Result, StreamingError, StreamingErrorKind, TypeError,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
