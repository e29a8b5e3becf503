//! Blocking MySQL client wire protocol.
//!
//! This crate speaks the MySQL client/server protocol over any blocking
//! byte channel. It provides:
//!
//! - Packet framing with sequence numbers, large-packet splitting and
//!   optional zlib compression
//! - The initial handshake across protocol generations (3.22 to 5.x)
//! - Authentication (legacy 3.23 scramble, 4.1.0 challenge, 4.1.1+ SHA-1)
//! - Optional TLS upgrade via rustls (`tls` feature)
//! - Text and binary (prepared statement) result decoding
//! - Streaming results and LOAD DATA LOCAL INFILE
//!
//! # Protocol Overview
//!
//! Every message is a packet with a 3-byte payload length and a 1-byte
//! sequence number. Payloads of 16 MiB - 1 bytes or more are split across
//! several packets. The sequence restarts at 0 for each command.
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlwire_mysql::{MySqlConfig, MySqlConnection};
//!
//! # fn main() -> sqlwire_mysql::Result<()> {
//! let config = MySqlConfig::new()
//!     .host("localhost")
//!     .port(3306)
//!     .user("root")
//!     .database("mydb");
//!
//! let mut conn = MySqlConnection::open(config)?;
//! for row in conn.query("SELECT id, name FROM users")? {
//!     println!("{:?}", row.get(1));
//! }
//! conn.close()?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod errors;
pub mod handshake;
pub mod pool;
pub mod protocol;
pub mod result;
pub mod tls;
pub mod transport;
pub mod types;

pub use config::{MySqlConfig, SslMode, TlsConfig, VersionCutoffs, ZeroDateBehavior};
pub use connection::{CommandPayload, ConnectionState, MySqlConnection, quote_identifier};
pub use handshake::ServerVersion;
pub use protocol::{Command, PreparedStatement};
pub use result::{ResultKind, ResultSet, RowFormat, RowSet, RowStream, UpdateResult};
pub use transport::{Channel, Socket};
pub use types::{ColumnDef, FieldType};

pub use sqlwire_core::{Error, Result, Row, Value};
