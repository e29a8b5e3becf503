//! Error types for sqlwire operations.

use std::fmt;

/// The primary error type for all sqlwire operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-level failures (connect, auth, I/O on the channel, TLS)
    Connection(ConnectionError),
    /// The server answered a command with an error packet
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Malformed or unexpected wire data
    Protocol(ProtocolError),
    /// Invalid or unsupported configuration
    Config(ConfigError),
    /// A streaming result set is still outstanding on the session
    Streaming(StreamingError),
    /// Local I/O errors that do not involve the server channel
    Io(std::io::Error),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish the TCP connection
    Connect,
    /// Connection refused by the peer
    Refused,
    /// The server rejected the credentials
    Authentication,
    /// I/O error, short read, timeout or out-of-order packet on an open channel
    CommunicationsFailure,
    /// SSL/TLS negotiation failed or is unavailable
    Ssl,
    /// The session was already closed
    Closed,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    /// Vendor error number reported by the server
    pub vendor_code: Option<u16>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax or access rule violation (class 42)
    Syntax,
    /// Integrity constraint violation (class 23)
    Constraint,
    /// Unknown table, column or database
    NotFound,
    /// Access denied
    Permission,
    /// Numeric range or string truncation (class 22)
    DataTruncation,
    /// Deadlock detected
    Deadlock,
    /// Lock wait timeout
    LockTimeout,
    /// Any other server error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    pub raw_data: Option<Vec<u8>>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct StreamingError {
    pub kind: StreamingErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingErrorKind {
    /// A command was issued while a streaming result was still open
    Outstanding,
    /// A streaming command produced more than one result set
    MultipleResults,
}

impl Error {
    /// Is this error worth retrying on the same session (deadlock, lock timeout)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(
                q.kind,
                QueryErrorKind::Deadlock | QueryErrorKind::LockTimeout
            ),
            _ => false,
        }
    }

    /// Is this a connection error that requires opening a new session?
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Protocol(_))
    }

    /// Did the channel itself fail (I/O, short read, sequence mismatch)?
    pub fn is_communications_failure(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::CommunicationsFailure,
                ..
            })
        )
    }

    /// Is this a numeric range / truncation error reported by the server?
    pub fn is_data_truncation(&self) -> bool {
        matches!(
            self,
            Error::Query(QueryError {
                kind: QueryErrorKind::DataTruncation,
                ..
            })
        )
    }

    /// Get SQLSTATE if available (e.g., "23000" for a duplicate key)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the vendor error number if the server reported one.
    pub fn vendor_code(&self) -> Option<u16> {
        match self {
            Error::Query(q) => q.vendor_code,
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Error::Query(q) if q.is_duplicate_key())
    }
}

impl QueryError {
    /// Is this a duplicate-key violation (ER_DUP_ENTRY)?
    pub fn is_duplicate_key(&self) -> bool {
        self.vendor_code == Some(1062)
    }

    /// Attach the statement text that produced this error.
    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => match e.kind {
                ConnectionErrorKind::CommunicationsFailure => {
                    write!(f, "Communications link failure: {}", e.message)
                }
                ConnectionErrorKind::Authentication => {
                    write!(f, "Authentication failed: {}", e.message)
                }
                _ => write!(f, "Connection error: {}", e.message),
            },
            Error::Query(e) => match (&e.sqlstate, e.vendor_code) {
                (Some(state), Some(code)) => {
                    write!(f, "Query error {} (SQLSTATE {}): {}", code, state, e.message)
                }
                (Some(state), None) => write!(f, "Query error (SQLSTATE {}): {}", state, e.message),
                _ => write!(f, "Query error: {}", e.message),
            },
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Streaming(e) => write!(f, "Streaming result error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

fn boxed_source<'a>(
    source: Option<&'a (dyn std::error::Error + Send + Sync + 'static)>,
) -> Option<&'a (dyn std::error::Error + 'static)> {
    source.map(|err| err as &(dyn std::error::Error + 'static))
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => boxed_source(e.source.as_deref()),
            Error::Query(e) => boxed_source(e.source.as_deref()),
            Error::Protocol(e) => boxed_source(e.source.as_deref()),
            Error::Config(e) => boxed_source(e.source.as_deref()),
            Error::Io(e) => Some(e),
            Error::Type(_) | Error::Streaming(_) => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for StreamingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<StreamingError> for Error {
    fn from(err: StreamingError) -> Self {
        Error::Streaming(err)
    }
}

/// Result type alias for sqlwire operations.
pub type Result<T> = std::result::Result<T, Error>;
