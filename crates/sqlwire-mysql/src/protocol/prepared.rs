//! Server-side prepared statements (binary protocol).
//!
//! # Protocol Flow
//!
//! 1. **Prepare**: COM_PREPARE with the SQL text
//!    - Server returns statement id, column count and parameter count
//!    - Followed by parameter descriptors + EOF, then column descriptors + EOF
//!
//! 2. **Execute**: COM_EXECUTE with the statement id and binary parameters
//!    - Server returns a binary result set or an update result
//!
//! 3. **Long data / Reset / Close**: COM_LONG_DATA and COM_CLOSE_STATEMENT get
//!    no response; COM_RESET_STMT answers with OK.
//!
//! The builders here return bare payloads; framing and sequence numbers are
//! the transport's job.

#![allow(clippy::cast_possible_truncation)]

use sqlwire_core::{Result, Value};

use super::{Command, PacketReader, PacketWriter};
use crate::errors::{truncated, unexpected_packet};
use crate::types::{ColumnDef, binary_param_type, encode_binary_value};

/// Response from COM_PREPARE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtPrepareOk {
    pub statement_id: u32,
    /// Number of columns in the result set (0 for non-SELECT)
    pub num_columns: u16,
    /// Number of `?` placeholders
    pub num_params: u16,
    pub warnings: u16,
}

/// A statement prepared on the server.
///
/// Statement ids are only valid on the connection that prepared them.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub statement_id: u32,
    /// SQL text (for logging and error messages)
    pub sql: String,
    pub params: Vec<ColumnDef>,
    pub columns: Vec<ColumnDef>,
}

impl PreparedStatement {
    pub fn new(statement_id: u32, sql: String, params: Vec<ColumnDef>, columns: Vec<ColumnDef>) -> Self {
        Self {
            statement_id,
            sql,
            params,
            columns,
        }
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Parse the first packet of a COM_PREPARE response.
///
/// Layout: `0x00`, u32 statement id, u16 columns, u16 params, filler byte,
/// then u16 warnings on servers that send it.
pub fn parse_stmt_prepare_ok(payload: &[u8]) -> Result<StmtPrepareOk> {
    let mut r = PacketReader::new(payload);
    if r.read_u8() != Some(0x00) {
        return Err(unexpected_packet("prepare response", payload));
    }
    let statement_id = r.read_u32_le().ok_or_else(|| truncated("statement id"))?;
    let num_columns = r.read_u16_le().ok_or_else(|| truncated("prepare column count"))?;
    let num_params = r.read_u16_le().ok_or_else(|| truncated("prepare parameter count"))?;
    r.skip(1);
    let warnings = r.read_u16_le().unwrap_or(0);
    Ok(StmtPrepareOk {
        statement_id,
        num_columns,
        num_params,
        warnings,
    })
}

/// Build a COM_EXECUTE payload.
///
/// Parameters listed in `long_data` were already streamed with
/// COM_LONG_DATA: their type is still sent, their value is not.
///
/// Layout: command, u32 statement id, u8 cursor flags (0), u32 iteration
/// count (1), then for `n > 0` parameters a NULL bitmap of `(n + 7) / 8`
/// bytes, the new-params-bound flag, `n` type pairs and the non-NULL values.
pub fn build_execute_payload(statement_id: u32, params: &[Value], long_data: &[u16]) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(16 + params.len() * 16);
    writer.write_u8(Command::Execute as u8);
    writer.write_u32_le(statement_id);
    writer.write_u8(0x00);
    writer.write_u32_le(1);

    if params.is_empty() {
        return writer.into_bytes();
    }

    let mut null_bitmap = vec![0u8; params.len().div_ceil(8)];
    for (i, param) in params.iter().enumerate() {
        if param.is_null() {
            null_bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    writer.write_bytes(&null_bitmap);
    writer.write_u8(1);

    for param in params {
        let (field_type, unsigned) = binary_param_type(param);
        writer.write_u8(field_type as u8);
        writer.write_u8(if unsigned { 0x80 } else { 0x00 });
    }

    for (i, param) in params.iter().enumerate() {
        if long_data.contains(&(i as u16)) {
            continue;
        }
        encode_binary_value(param, &mut writer);
    }
    writer.into_bytes()
}

/// Build a COM_LONG_DATA payload: u32 statement id, u16 parameter index,
/// then the raw chunk.
pub fn build_long_data_payload(statement_id: u32, param_index: u16, data: &[u8]) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(7 + data.len());
    writer.write_u8(Command::LongData as u8);
    writer.write_u32_le(statement_id);
    writer.write_u16_le(param_index);
    writer.write_bytes(data);
    writer.into_bytes()
}

/// Build a COM_CLOSE_STATEMENT or COM_RESET_STMT payload.
pub fn build_statement_payload(command: Command, statement_id: u32) -> Vec<u8> {
    let mut writer = PacketWriter::command(command);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}
