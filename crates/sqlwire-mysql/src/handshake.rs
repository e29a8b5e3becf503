//! Server greeting parsing and capability negotiation.
//!
//! The greeting is the first packet on a fresh connection:
//!
//! ```text
//! u8 protocol_version | version\0 | u32 thread_id | seed\0 | u16 capabilities
//! [>= 4.1.1: u8 charset | u16 status | 13 reserved bytes | seed_part2\0]
//! ```
//!
//! From it and the client configuration the session derives its wire
//! dialect ([`ProtocolFlags`]) and the capability set sent back to the
//! server. Both are frozen for the life of the session.

#![allow(clippy::cast_possible_truncation)]

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlwire_core::Result;
use sqlwire_core::error::ConnectionErrorKind;

use crate::config::{MySqlConfig, VersionCutoffs};
use crate::errors::{connection_error, sqlstate_for_code, ssl_error, truncated};
use crate::protocol::capabilities::{
    self, CLIENT_COMPRESS, CLIENT_CONNECT_WITH_DB, CLIENT_FOUND_ROWS, CLIENT_INTERACTIVE,
    CLIENT_LOCAL_FILES, CLIENT_LONG_FLAG, CLIENT_LONG_PASSWORD, CLIENT_MULTI_RESULTS,
    CLIENT_MULTI_STATEMENTS, CLIENT_PROTOCOL_41, CLIENT_RESERVED, CLIENT_SECURE_CONNECTION,
    CLIENT_SSL, CLIENT_TRANSACTIONS,
};
use crate::protocol::{LEGACY_MAX_THREE_BYTES, NEW_MAX_THREE_BYTES, PacketReader, PacketWriter};

/// A `major.minor.subminor` server version.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub subminor: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, subminor: u32) -> Self {
        Self {
            major,
            minor,
            subminor,
        }
    }

    /// Parse a server version string such as `5.7.44-log`.
    ///
    /// The major part runs up to the first '.', the minor part up to the
    /// second; the subminor is the run of digits that follows. A segment
    /// that does not parse is 0, and a string without two dots keeps the
    /// missing parts at 0.
    pub fn parse(version: &str) -> Self {
        let mut parsed = Self::default();
        let Some((major, rest)) = version.split_once('.') else {
            return parsed;
        };
        parsed.major = major.parse().unwrap_or(0);

        let Some((minor, rest)) = rest.split_once('.') else {
            return parsed;
        };
        parsed.minor = minor.parse().unwrap_or(0);

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        parsed.subminor = rest[..digits].parse().unwrap_or(0);
        parsed
    }

    /// Is this version at least `major.minor.subminor`?
    pub fn meets_minimum(&self, major: u32, minor: u32, subminor: u32) -> bool {
        *self >= Self::new(major, minor, subminor)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.subminor)
    }
}

/// Decoded server greeting.
#[derive(Debug, Clone)]
pub struct Greeting {
    pub protocol_version: u8,
    /// Version string as sent by the server
    pub server_version: String,
    pub version: ServerVersion,
    pub thread_id: u32,
    /// Scramble seed, with part 2 appended on 4.1.1+ servers
    pub seed: Vec<u8>,
    pub server_capabilities: u32,
    pub server_charset: Option<u8>,
    pub server_status: Option<u16>,
}

/// Parse the greeting packet.
///
/// A protocol byte of `0xFF` means the server refused the connection
/// (too many connections, host blocked); its code and message become a
/// connection error.
pub fn parse_greeting(payload: &[u8], cutoffs: &VersionCutoffs) -> Result<Greeting> {
    let mut reader = PacketReader::new(payload);
    let protocol_version = reader.read_u8().ok_or_else(|| truncated("greeting"))?;

    if protocol_version == 0xFF {
        let code = reader.read_u16_le().unwrap_or(2000);
        let message = String::from_utf8_lossy(reader.read_rest()).into_owned();
        return Err(connection_error(
            ConnectionErrorKind::Refused,
            format!(
                "server refused the connection ({} / SQLSTATE {}): {}",
                code,
                sqlstate_for_code(code),
                message
            ),
        ));
    }

    let server_version = reader
        .read_null_string()
        .ok_or_else(|| truncated("server version"))?;
    let version = ServerVersion::parse(&server_version);
    let thread_id = reader.read_u32_le().ok_or_else(|| truncated("thread id"))?;
    let mut seed = reader
        .read_null_terminated()
        .ok_or_else(|| truncated("scramble seed"))?
        .to_vec();
    let server_capabilities = if reader.is_empty() {
        0
    } else {
        u32::from(
            reader
                .read_u16_le()
                .ok_or_else(|| truncated("server capabilities"))?,
        )
    };

    let mut server_charset = None;
    let mut server_status = None;
    if version >= cutoffs.new_new_prot_41 && !reader.is_empty() {
        // 16 bytes describe the server: charset, status, then reserved space.
        let start = reader.position();
        server_charset = reader.read_u8();
        server_status = reader.read_u16_le();
        let consumed = reader.position() - start;
        if reader.skip(16 - consumed) {
            match reader.read_null_terminated() {
                Some(part2) => seed.extend_from_slice(part2),
                None => seed.extend_from_slice(reader.read_rest()),
            }
        }
    }

    Ok(Greeting {
        protocol_version,
        server_version,
        version,
        thread_id,
        seed,
        server_capabilities,
        server_charset,
        server_status,
    })
}

/// Wire dialect implied by the server version and capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolFlags {
    /// 16 MiB frame maximum and no split terminator marker
    pub new_large_packets: bool,
    /// Servers from 4.0 accept split payloads at all
    pub split_large_packets: bool,
    pub col_decimal_needs_bump: bool,
    /// 8-byte `0xFE` update counts
    pub new_update_counts: bool,
    /// Status and warning fields in OK/EOF packets
    pub use_41_extensions: bool,
    /// Full protocol-41 handshake and field layout
    pub has_41_new_new_prot: bool,
    /// u16 column flags
    pub has_long_column_info: bool,
}

impl ProtocolFlags {
    pub fn derive(version: ServerVersion, server_capabilities: u32, cutoffs: &VersionCutoffs) -> Self {
        Self {
            new_large_packets: version >= cutoffs.new_large_packets,
            split_large_packets: version.major >= 4,
            col_decimal_needs_bump: version >= cutoffs.decimal_bump_from
                && version < cutoffs.decimal_bump_until,
            new_update_counts: version >= cutoffs.new_update_counts,
            use_41_extensions: version >= cutoffs.ext_41,
            has_41_new_new_prot: version >= cutoffs.new_new_prot_41,
            has_long_column_info: server_capabilities & CLIENT_LONG_FLAG != 0,
        }
    }

    /// Largest physical frame payload for this server.
    pub fn max_three_bytes(&self) -> usize {
        if self.new_large_packets {
            NEW_MAX_THREE_BYTES
        } else {
            LEGACY_MAX_THREE_BYTES
        }
    }

    /// Exactly 4.1.0: protocol-41 markers without the new-new layout.
    pub fn is_41_0(&self) -> bool {
        self.use_41_extensions && !self.has_41_new_new_prot
    }
}

/// Result of negotiation: everything the rest of the session needs.
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub greeting: Greeting,
    pub flags: ProtocolFlags,
    /// Capability set sent to the server
    pub client_flags: u32,
    /// TLS will be started before authentication
    pub use_ssl: bool,
    /// The database travels in the handshake response
    pub connect_with_db: bool,
    /// Character set index sent to the server
    pub charset: u8,
}

impl Negotiated {
    pub fn has_client_flag(&self, flag: u32) -> bool {
        self.client_flags & flag != 0
    }

    pub fn use_secure_auth(&self) -> bool {
        self.has_client_flag(CLIENT_SECURE_CONNECTION)
    }

    pub fn use_compression(&self) -> bool {
        self.has_client_flag(CLIENT_COMPRESS)
    }

    pub fn multi_results(&self) -> bool {
        self.has_client_flag(CLIENT_MULTI_RESULTS)
    }
}

/// Work out the client capability set for this server.
pub fn negotiate(greeting: Greeting, config: &MySqlConfig) -> Result<Negotiated> {
    let server = greeting.server_capabilities;
    let flags = ProtocolFlags::derive(greeting.version, server, &config.version_cutoffs);

    let mut client = CLIENT_FOUND_ROWS;
    if flags.has_long_column_info {
        client |= CLIENT_LONG_FLAG;
    }
    if greeting.protocol_version > 9 {
        client |= CLIENT_LONG_PASSWORD;
    }
    if config.allow_local_infile {
        client |= CLIENT_LOCAL_FILES;
    }
    if config.interactive {
        client |= CLIENT_INTERACTIVE;
    }
    if config.use_compression && server & CLIENT_COMPRESS != 0 {
        client |= CLIENT_COMPRESS;
    }

    let connect_with_db = config.database_name().is_some()
        && server & CLIENT_CONNECT_WITH_DB != 0
        && !config.create_database_if_not_exist;
    if connect_with_db {
        client |= CLIENT_CONNECT_WITH_DB;
    }

    if flags.has_41_new_new_prot {
        client |= CLIENT_PROTOCOL_41 | CLIENT_TRANSACTIONS | CLIENT_MULTI_RESULTS;
        if config.allow_multi_queries {
            client |= CLIENT_MULTI_STATEMENTS;
        }
    } else if flags.use_41_extensions {
        client |= CLIENT_RESERVED;
    }

    if server & CLIENT_SECURE_CONNECTION != 0 {
        client |= CLIENT_SECURE_CONNECTION;
    }

    let mut use_ssl = false;
    if config.ssl_mode.should_try_ssl() {
        if server & CLIENT_SSL != 0 {
            client |= CLIENT_SSL;
            use_ssl = true;
        } else if config.ssl_mode.is_required() {
            return Err(ssl_error(format!(
                "server {} does not support SSL but ssl_mode is {:?}",
                greeting.server_version, config.ssl_mode
            )));
        } else {
            tracing::debug!("server does not offer SSL, continuing without it");
        }
    }

    tracing::debug!(
        server_version = %greeting.server_version,
        thread_id = greeting.thread_id,
        protocol_version = greeting.protocol_version,
        client_flags = %capabilities::describe(client),
        "negotiated capabilities"
    );

    Ok(Negotiated {
        greeting,
        flags,
        client_flags: client,
        use_ssl,
        connect_with_db,
        charset: config.charset,
    })
}

/// Write the capability/max-packet prefix of a handshake response.
///
/// - 4.1.1+: u32 caps, u32 max packet, u8 charset, 23 zero bytes
/// - 4.1.0: u32 caps, u32 max packet
/// - older: u16 caps, u24 max packet
pub fn write_client_params(writer: &mut PacketWriter, negotiated: &Negotiated) {
    let max_packet = negotiated.flags.max_three_bytes() as u32;
    if negotiated.flags.has_41_new_new_prot {
        writer.write_u32_le(negotiated.client_flags);
        writer.write_u32_le(max_packet);
        writer.write_u8(negotiated.charset);
        writer.write_zeros(23);
    } else if negotiated.flags.use_41_extensions {
        writer.write_u32_le(negotiated.client_flags);
        writer.write_u32_le(max_packet);
    } else {
        writer.write_u16_le(negotiated.client_flags as u16);
        writer.write_u24_le(max_packet);
    }
}

/// The short packet that asks the server to switch to TLS.
pub fn build_ssl_request(negotiated: &Negotiated) -> Vec<u8> {
    let client_flags = negotiated.client_flags | CLIENT_SSL;
    let mut writer = PacketWriter::with_capacity(32);
    if negotiated.flags.has_41_new_new_prot {
        writer.write_u32_le(client_flags);
        writer.write_u32_le(negotiated.flags.max_three_bytes() as u32);
        writer.write_u8(negotiated.charset);
        writer.write_zeros(23);
    } else if negotiated.flags.use_41_extensions {
        writer.write_u32_le(client_flags);
    } else {
        writer.write_u16_le(client_flags as u16);
    }
    writer.into_bytes()
}
