//! MySQL wire protocol building blocks.
//!
//! Every logical packet travels as one or more physical frames with a
//! 4-byte header:
//! - 3 bytes: payload length (little-endian)
//! - 1 byte: sequence number
//!
//! Payloads that reach the three-byte maximum are split; see
//! [`crate::transport`].

pub mod prepared;
pub mod reader;
pub mod writer;

pub use prepared::{PreparedStatement, StmtPrepareOk};
pub use reader::PacketReader;
pub use writer::PacketWriter;

/// Frame header size in bytes.
pub const HEADER_LENGTH: usize = 4;

/// Extra header bytes carried by a compressed frame.
pub const COMP_HEADER_LENGTH: usize = 3;

/// Payloads shorter than this are never deflated.
pub const MIN_COMPRESS_LEN: usize = 50;

/// Chunk maximum for servers that understand 16 MiB packets (>= 4.0.8).
pub const NEW_MAX_THREE_BYTES: usize = 0xFF_FF_FF;

/// Chunk maximum used with older servers.
pub const LEGACY_MAX_THREE_BYTES: usize = 255 * 255 * 255;

/// Client-side packet limit until the caller raises it.
pub const DEFAULT_MAX_ALLOWED_PACKET: usize = 1024 * 1024;

/// Credential sent by 4.1.0 servers' first auth round.
pub const FALSE_SCRAMBLE: &str = "xxxxxxxx";

/// Client/server capability flags.
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_NO_SCHEMA: u32 = 1 << 4;
    pub const CLIENT_COMPRESS: u32 = 1 << 5;
    pub const CLIENT_ODBC: u32 = 1 << 6;
    pub const CLIENT_LOCAL_FILES: u32 = 1 << 7;
    pub const CLIENT_IGNORE_SPACE: u32 = 1 << 8;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_INTERACTIVE: u32 = 1 << 10;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_IGNORE_SIGPIPE: u32 = 1 << 12;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    /// Protocol-41 marker understood only by 4.1.0 servers
    pub const CLIENT_RESERVED: u32 = 1 << 14;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;

    const NAMES: [(u32, &str); 18] = [
        (CLIENT_LONG_PASSWORD, "LONG_PASSWORD"),
        (CLIENT_FOUND_ROWS, "FOUND_ROWS"),
        (CLIENT_LONG_FLAG, "LONG_FLAG"),
        (CLIENT_CONNECT_WITH_DB, "CONNECT_WITH_DB"),
        (CLIENT_NO_SCHEMA, "NO_SCHEMA"),
        (CLIENT_COMPRESS, "COMPRESS"),
        (CLIENT_ODBC, "ODBC"),
        (CLIENT_LOCAL_FILES, "LOCAL_FILES"),
        (CLIENT_IGNORE_SPACE, "IGNORE_SPACE"),
        (CLIENT_PROTOCOL_41, "PROTOCOL_41"),
        (CLIENT_INTERACTIVE, "INTERACTIVE"),
        (CLIENT_SSL, "SSL"),
        (CLIENT_IGNORE_SIGPIPE, "IGNORE_SIGPIPE"),
        (CLIENT_TRANSACTIONS, "TRANSACTIONS"),
        (CLIENT_RESERVED, "RESERVED"),
        (CLIENT_SECURE_CONNECTION, "SECURE_CONNECTION"),
        (CLIENT_MULTI_STATEMENTS, "MULTI_STATEMENTS"),
        (CLIENT_MULTI_RESULTS, "MULTI_RESULTS"),
    ];

    /// Render a flag set as `A|B|C` for log output.
    pub fn describe(flags: u32) -> String {
        NAMES
            .iter()
            .filter(|(bit, _)| flags & bit != 0)
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Command codes (COM_xxx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Sleep = 0,
    Quit = 1,
    InitDb = 2,
    Query = 3,
    FieldList = 4,
    CreateDb = 5,
    DropDb = 6,
    Refresh = 7,
    Shutdown = 8,
    Statistics = 9,
    ProcessInfo = 10,
    Connect = 11,
    ProcessKill = 12,
    Debug = 13,
    Ping = 14,
    Time = 15,
    DelayedInsert = 16,
    ChangeUser = 17,
    BinlogDump = 18,
    TableDump = 19,
    ConnectOut = 20,
    RegisterSlave = 21,
    Prepare = 22,
    Execute = 23,
    LongData = 24,
    CloseStatement = 25,
    ResetStatement = 26,
    SetOption = 27,
}

impl Command {
    /// Commands whose argument is a text string.
    pub const fn takes_text(self) -> bool {
        matches!(
            self,
            Command::InitDb
                | Command::CreateDb
                | Command::DropDb
                | Command::Query
                | Command::Prepare
                | Command::FieldList
        )
    }
}

/// Server status flags.
pub mod server_status {
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
    pub const SERVER_QUERY_NO_GOOD_INDEX_USED: u16 = 0x0010;
    pub const SERVER_QUERY_NO_INDEX_USED: u16 = 0x0020;
}

/// Character set indexes sent in the handshake response.
pub mod charset {
    pub const LATIN1_SWEDISH_CI: u8 = 8;
    pub const UTF8_GENERAL_CI: u8 = 33;
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    pub const BINARY: u8 = 63;

    pub const DEFAULT_CHARSET: u8 = UTF8_GENERAL_CI;

    /// Map a charset name to the index the server expects.
    pub fn from_name(name: &str) -> Option<u8> {
        match name.to_ascii_lowercase().as_str() {
            "latin1" => Some(LATIN1_SWEDISH_CI),
            "utf8" | "utf8mb3" => Some(UTF8_GENERAL_CI),
            "utf8mb4" => Some(UTF8MB4_GENERAL_CI),
            "binary" => Some(BINARY),
            _ => None,
        }
    }
}

/// Physical frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub payload_length: u32,
    pub sequence_id: u8,
}

impl PacketHeader {
    pub const SIZE: usize = HEADER_LENGTH;

    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        Self {
            payload_length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            sequence_id: bytes[3],
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        let len = self.payload_length.to_le_bytes();
        [len[0], len[1], len[2], self.sequence_id]
    }
}

/// Classification of a response by its first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Ok,
    Error,
    /// 0xFE with a payload shorter than 9 bytes
    Eof,
    LocalInfile,
    Data,
}

impl PacketType {
    pub fn classify(payload: &[u8]) -> Self {
        match payload.first() {
            Some(0x00) => PacketType::Ok,
            Some(0xFF) => PacketType::Error,
            Some(0xFE) if payload.len() < 9 => PacketType::Eof,
            Some(0xFB) => PacketType::LocalInfile,
            _ => PacketType::Data,
        }
    }
}

/// Update result carried by an OK packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    /// Present only with 4.1 extensions
    pub status_flags: Option<u16>,
    pub warnings: u16,
    pub info: String,
}

/// Decoded error packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    /// Absent on protocol 9 and older servers
    pub error_code: Option<u16>,
    pub sql_state: String,
    pub error_message: String,
}

/// Result-set trailer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: u16,
}
