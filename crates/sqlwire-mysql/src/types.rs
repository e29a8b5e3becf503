//! MySQL type system: field metadata and value decoding.
//!
//! This module provides:
//! - MySQL field type codes and column flags
//! - Field descriptor parsing for the three metadata generations
//! - Text and binary row decoding into [`Value`]
//! - Binary parameter encoding and client-side literal escaping
//!
//! Temporal values follow the [`Value`] conventions: days or microseconds
//! relative to the Unix epoch. All-zero dates are handled according to
//! [`ZeroDateBehavior`].

#![allow(clippy::cast_possible_truncation)]

use sqlwire_core::{Error, Result, Value};

use crate::config::ZeroDateBehavior;
use crate::errors::{invalid_datetime, protocol_error, truncated};
use crate::handshake::ProtocolFlags;
use crate::protocol::{PacketReader, PacketWriter, charset, reader::NULL_MARKER};

/// MySQL field type codes.
///
/// These are the `MYSQL_TYPE_*` constants from the MySQL C API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldType {
    /// DECIMAL (MYSQL_TYPE_DECIMAL)
    Decimal = 0x00,
    /// TINYINT (MYSQL_TYPE_TINY)
    Tiny = 0x01,
    /// SMALLINT (MYSQL_TYPE_SHORT)
    Short = 0x02,
    /// INT (MYSQL_TYPE_LONG)
    Long = 0x03,
    /// FLOAT (MYSQL_TYPE_FLOAT)
    Float = 0x04,
    /// DOUBLE (MYSQL_TYPE_DOUBLE)
    Double = 0x05,
    /// NULL (MYSQL_TYPE_NULL)
    Null = 0x06,
    /// TIMESTAMP (MYSQL_TYPE_TIMESTAMP)
    Timestamp = 0x07,
    /// BIGINT (MYSQL_TYPE_LONGLONG)
    LongLong = 0x08,
    /// MEDIUMINT (MYSQL_TYPE_INT24)
    Int24 = 0x09,
    /// DATE (MYSQL_TYPE_DATE)
    Date = 0x0A,
    /// TIME (MYSQL_TYPE_TIME)
    Time = 0x0B,
    /// DATETIME (MYSQL_TYPE_DATETIME)
    DateTime = 0x0C,
    /// YEAR (MYSQL_TYPE_YEAR)
    Year = 0x0D,
    /// NEWDATE (MYSQL_TYPE_NEWDATE) - internal use
    NewDate = 0x0E,
    /// VARCHAR (MYSQL_TYPE_VARCHAR)
    VarChar = 0x0F,
    /// BIT (MYSQL_TYPE_BIT)
    Bit = 0x10,
    /// JSON (MYSQL_TYPE_JSON) - MySQL 5.7.8+
    Json = 0xF5,
    /// NEWDECIMAL (MYSQL_TYPE_NEWDECIMAL)
    NewDecimal = 0xF6,
    /// ENUM (MYSQL_TYPE_ENUM)
    Enum = 0xF7,
    /// SET (MYSQL_TYPE_SET)
    Set = 0xF8,
    /// TINYBLOB (MYSQL_TYPE_TINY_BLOB)
    TinyBlob = 0xF9,
    /// MEDIUMBLOB (MYSQL_TYPE_MEDIUM_BLOB)
    MediumBlob = 0xFA,
    /// LONGBLOB (MYSQL_TYPE_LONG_BLOB)
    LongBlob = 0xFB,
    /// BLOB (MYSQL_TYPE_BLOB)
    Blob = 0xFC,
    /// VARCHAR (MYSQL_TYPE_VAR_STRING)
    VarString = 0xFD,
    /// CHAR (MYSQL_TYPE_STRING)
    String = 0xFE,
    /// GEOMETRY (MYSQL_TYPE_GEOMETRY)
    Geometry = 0xFF,
}

impl FieldType {
    /// Parse a field type from its wire code. Unknown codes give `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        let ty = match value {
            0x00 => FieldType::Decimal,
            0x01 => FieldType::Tiny,
            0x02 => FieldType::Short,
            0x03 => FieldType::Long,
            0x04 => FieldType::Float,
            0x05 => FieldType::Double,
            0x06 => FieldType::Null,
            0x07 => FieldType::Timestamp,
            0x08 => FieldType::LongLong,
            0x09 => FieldType::Int24,
            0x0A => FieldType::Date,
            0x0B => FieldType::Time,
            0x0C => FieldType::DateTime,
            0x0D => FieldType::Year,
            0x0E => FieldType::NewDate,
            0x0F => FieldType::VarChar,
            0x10 => FieldType::Bit,
            0xF5 => FieldType::Json,
            0xF6 => FieldType::NewDecimal,
            0xF7 => FieldType::Enum,
            0xF8 => FieldType::Set,
            0xF9 => FieldType::TinyBlob,
            0xFA => FieldType::MediumBlob,
            0xFB => FieldType::LongBlob,
            0xFC => FieldType::Blob,
            0xFD => FieldType::VarString,
            0xFE => FieldType::String,
            0xFF => FieldType::Geometry,
            _ => return None,
        };
        Some(ty)
    }

    /// Check if this is an integer type.
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Tiny
                | FieldType::Short
                | FieldType::Long
                | FieldType::LongLong
                | FieldType::Int24
                | FieldType::Year
        )
    }

    /// Check if this is a date/time type.
    pub const fn is_temporal(self) -> bool {
        matches!(
            self,
            FieldType::Date
                | FieldType::Time
                | FieldType::DateTime
                | FieldType::Timestamp
                | FieldType::NewDate
        )
    }

    /// Types whose values travel as length-prefixed bytes in binary rows.
    pub const fn is_length_prefixed(self) -> bool {
        matches!(
            self,
            FieldType::Decimal
                | FieldType::NewDecimal
                | FieldType::VarChar
                | FieldType::Bit
                | FieldType::Json
                | FieldType::Enum
                | FieldType::Set
                | FieldType::TinyBlob
                | FieldType::MediumBlob
                | FieldType::LongBlob
                | FieldType::Blob
                | FieldType::VarString
                | FieldType::String
                | FieldType::Geometry
        )
    }

    /// Get the type name as a string.
    pub const fn name(self) -> &'static str {
        match self {
            FieldType::Decimal | FieldType::NewDecimal => "DECIMAL",
            FieldType::Tiny => "TINYINT",
            FieldType::Short => "SMALLINT",
            FieldType::Long => "INT",
            FieldType::Float => "FLOAT",
            FieldType::Double => "DOUBLE",
            FieldType::Null => "NULL",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::LongLong => "BIGINT",
            FieldType::Int24 => "MEDIUMINT",
            FieldType::Date | FieldType::NewDate => "DATE",
            FieldType::Time => "TIME",
            FieldType::DateTime => "DATETIME",
            FieldType::Year => "YEAR",
            FieldType::VarChar | FieldType::VarString => "VARCHAR",
            FieldType::Bit => "BIT",
            FieldType::Json => "JSON",
            FieldType::Enum => "ENUM",
            FieldType::Set => "SET",
            FieldType::TinyBlob => "TINYBLOB",
            FieldType::MediumBlob => "MEDIUMBLOB",
            FieldType::LongBlob => "LONGBLOB",
            FieldType::Blob => "BLOB",
            FieldType::String => "CHAR",
            FieldType::Geometry => "GEOMETRY",
        }
    }
}

/// Column flags in result set metadata.
pub mod column_flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 2;
    pub const UNIQUE_KEY: u16 = 4;
    pub const MULTIPLE_KEY: u16 = 8;
    pub const BLOB: u16 = 16;
    pub const UNSIGNED: u16 = 32;
    pub const ZEROFILL: u16 = 64;
    pub const BINARY: u16 = 128;
    pub const ENUM: u16 = 256;
    pub const AUTO_INCREMENT: u16 = 512;
    pub const TIMESTAMP: u16 = 1024;
    pub const SET: u16 = 2048;
}

/// Field descriptor from a result set or prepare response.
///
/// Qualifiers a metadata generation does not send are left empty:
/// pre-4.1 servers only send `table` and `name`, 4.1.0 has no `catalog`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDef {
    pub catalog: String,
    /// Schema (database) name
    pub schema: String,
    /// Table name (or alias)
    pub table: String,
    pub org_table: String,
    /// Column name (or alias)
    pub name: String,
    pub org_name: String,
    /// Character set number, 0 when the server did not send one
    pub charset: u16,
    pub column_length: u32,
    /// Raw MYSQL_TYPE_* code
    pub type_code: u8,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDef {
    pub fn field_type(&self) -> Option<FieldType> {
        FieldType::from_u8(self.type_code)
    }

    pub const fn is_not_null(&self) -> bool {
        self.flags & column_flags::NOT_NULL != 0
    }

    pub const fn is_primary_key(&self) -> bool {
        self.flags & column_flags::PRIMARY_KEY != 0
    }

    pub const fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    pub const fn is_auto_increment(&self) -> bool {
        self.flags & column_flags::AUTO_INCREMENT != 0
    }

    /// Does the column hold raw bytes rather than character data?
    ///
    /// Uses the binary collation when the server sent a charset and the
    /// BINARY flag otherwise.
    pub fn is_binary_data(&self) -> bool {
        if self.charset == 0 {
            self.flags & column_flags::BINARY != 0
        } else {
            self.charset == u16::from(charset::BINARY)
        }
    }
}

fn lenenc_text(reader: &mut PacketReader<'_>, what: &str) -> Result<String> {
    reader.read_lenenc_string().ok_or_else(|| truncated(what))
}

/// Parse one field packet according to the negotiated metadata generation.
pub fn parse_column_def(payload: &[u8], flags: &ProtocolFlags) -> Result<ColumnDef> {
    let mut r = PacketReader::new(payload);
    let mut column = ColumnDef::default();

    if flags.use_41_extensions {
        if flags.has_41_new_new_prot {
            column.catalog = lenenc_text(&mut r, "column catalog")?;
        }
        column.schema = lenenc_text(&mut r, "column schema")?;
        column.table = lenenc_text(&mut r, "column table")?;
        column.org_table = lenenc_text(&mut r, "column original table")?;
        column.name = lenenc_text(&mut r, "column name")?;
        column.org_name = lenenc_text(&mut r, "column original name")?;

        // Length of the fixed-size block that follows.
        r.read_u8().ok_or_else(|| truncated("column filler"))?;
        column.charset = r.read_u16_le().ok_or_else(|| truncated("column charset"))?;
        column.column_length = if flags.has_41_new_new_prot {
            r.read_u32_le()
        } else {
            r.read_u24_le()
        }
        .ok_or_else(|| truncated("column length"))?;
        column.type_code = r.read_u8().ok_or_else(|| truncated("column type"))?;
        column.flags = if flags.has_41_new_new_prot || flags.has_long_column_info {
            r.read_u16_le()
        } else {
            r.read_u8().map(u16::from)
        }
        .ok_or_else(|| truncated("column flags"))?;
        column.decimals = r.read_u8().ok_or_else(|| truncated("column decimals"))?;
        return Ok(column);
    }

    column.table = lenenc_text(&mut r, "column table")?;
    column.name = lenenc_text(&mut r, "column name")?;
    column.column_length = r
        .read_counted_uint()
        .ok_or_else(|| truncated("column length"))? as u32;
    column.type_code = r
        .read_counted_uint()
        .ok_or_else(|| truncated("column type"))? as u8;
    // Byte count of the flags + decimals block.
    r.read_u8().ok_or_else(|| truncated("column flags"))?;
    column.flags = if flags.has_long_column_info {
        r.read_u16_le()
    } else {
        r.read_u8().map(u16::from)
    }
    .ok_or_else(|| truncated("column flags"))?;
    column.decimals = r.read_u8().ok_or_else(|| truncated("column decimals"))?;
    if flags.col_decimal_needs_bump {
        column.decimals = column.decimals.saturating_add(1);
    }
    Ok(column)
}

/// Days from 1970-01-01 to the given proleptic Gregorian date.
pub fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let m = i64::from(month);
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`].
pub fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if month <= 2 { y + 1 } else { y }, month, day)
}

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// 0001-01-01, the value zero dates are rounded to.
const ROUNDED_ZERO_DAYS: i64 = -719_162;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Temporal {
    Date,
    DateTime,
}

fn zero_date(policy: ZeroDateBehavior, kind: Temporal, column: &ColumnDef) -> Result<Value> {
    match policy {
        ZeroDateBehavior::ConvertToNull => Ok(Value::Null),
        ZeroDateBehavior::Exception => Err(invalid_datetime(format!(
            "zero date in column '{}' cannot be represented",
            column.name
        ))),
        ZeroDateBehavior::Round => Ok(match kind {
            Temporal::Date => Value::Date(ROUNDED_ZERO_DAYS as i32),
            Temporal::DateTime => Value::Timestamp(ROUNDED_ZERO_DAYS * MICROS_PER_DAY),
        }),
    }
}

/// `None` when the value does not fit the target representation.
fn date_value(kind: Temporal, days: i64, micros_of_day: i64) -> Option<Value> {
    match kind {
        Temporal::Date => i32::try_from(days).ok().map(Value::Date),
        Temporal::DateTime => days
            .checked_mul(MICROS_PER_DAY)?
            .checked_add(micros_of_day)
            .map(Value::Timestamp),
    }
}

fn out_of_range(what: &str, column: &ColumnDef) -> Error {
    protocol_error(format!("{} out of range for column '{}'", what, column.name))
}

/// Largest year a MySQL temporal value can carry.
const MAX_YEAR: i64 = 9999;

fn parse_micros(frac: &str) -> Option<i64> {
    if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits: String = frac.chars().chain(std::iter::repeat('0')).take(6).collect();
    digits.parse().ok()
}

/// `HH:MM:SS[.ffffff]` to microseconds; hours may exceed 24.
fn parse_clock(text: &str) -> Option<i64> {
    let (clock, frac) = match text.split_once('.') {
        Some((clock, frac)) => (clock, parse_micros(frac)?),
        None => (text, 0),
    };
    let mut parts = clock.splitn(3, ':');
    let h: i64 = parts.next()?.parse().ok()?;
    let m: i64 = parts.next()?.parse().ok()?;
    let s: i64 = parts.next()?.parse().ok()?;
    if h < 0 || !(0..60).contains(&m) || !(0..60).contains(&s) {
        return None;
    }
    h.checked_mul(3600)?
        .checked_add(m * 60 + s)?
        .checked_mul(MICROS_PER_SECOND)?
        .checked_add(frac)
}

/// Split a text date/datetime into (y, m, d, micros of day).
fn parse_date_text(text: &str) -> Option<(i64, u32, u32, i64)> {
    // Compact TIMESTAMP(14)/(8) forms sent by old servers.
    if text.len() >= 8 && text.bytes().all(|b| b.is_ascii_digit()) {
        let num = |range: std::ops::Range<usize>| text.get(range).and_then(|s| s.parse::<u32>().ok());
        let year = i64::from(num(0..4)?);
        let (month, day) = (num(4..6)?, num(6..8)?);
        let micros = match text.len() {
            8 => 0,
            14 => {
                let (h, m, s) = (num(8..10)?, num(10..12)?, num(12..14)?);
                i64::from((h * 60 + m) * 60 + s) * MICROS_PER_SECOND
            }
            _ => return None,
        };
        return Some((year, month, day, micros));
    }

    let (date, time) = match text.split_once([' ', 'T']) {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };
    let mut parts = date.splitn(3, '-');
    let year: i64 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let micros = match time {
        Some(time) => parse_clock(time)?,
        None => 0,
    };
    Some((year, month, day, micros))
}

fn decode_text_date(
    column: &ColumnDef,
    text: &str,
    kind: Temporal,
    policy: ZeroDateBehavior,
) -> Result<Value> {
    match parse_date_text(text) {
        Some((0, 0, 0, _)) => zero_date(policy, kind, column),
        Some((year, month, day, micros))
            if (1..=12).contains(&month) && (1..=31).contains(&day) =>
        {
            if !(0..=MAX_YEAR).contains(&year) {
                return Err(out_of_range("date", column));
            }
            date_value(kind, days_from_civil(year, month, day), micros)
                .ok_or_else(|| out_of_range("date", column))
        }
        _ => Ok(Value::Text(text.to_string())),
    }
}

fn decode_text_time(text: &str) -> Value {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    match parse_clock(rest) {
        Some(micros) if negative => Value::Time(-micros),
        Some(micros) => Value::Time(micros),
        None => Value::Text(text.to_string()),
    }
}

fn character_data(column: &ColumnDef, data: &[u8]) -> Value {
    if column.is_binary_data() {
        Value::Bytes(data.to_vec())
    } else {
        Value::Text(String::from_utf8_lossy(data).into_owned())
    }
}

/// Decode a text protocol value.
///
/// In the text protocol every value arrives as a string; it is typed from
/// the field type and the UNSIGNED flag. Unsigned integers widen to the
/// next larger signed variant. Text that does not parse is kept as text.
pub fn decode_text_value(
    column: &ColumnDef,
    data: &[u8],
    zero_dates: ZeroDateBehavior,
) -> Result<Value> {
    let Some(field_type) = column.field_type() else {
        return Ok(character_data(column, data));
    };
    let text = String::from_utf8_lossy(data);
    let unsigned = column.is_unsigned();
    let fallback = || Value::Text(text.clone().into_owned());

    let value = match field_type {
        FieldType::Tiny if unsigned => text.parse::<u8>().map_or_else(|_| fallback(), Value::from),
        FieldType::Tiny => text.parse::<i8>().map_or_else(|_| fallback(), Value::TinyInt),
        FieldType::Short | FieldType::Year if unsigned => {
            text.parse::<u16>().map_or_else(|_| fallback(), Value::from)
        }
        FieldType::Short | FieldType::Year => {
            text.parse::<i16>().map_or_else(|_| fallback(), Value::SmallInt)
        }
        FieldType::Long | FieldType::Int24 if unsigned => {
            text.parse::<u32>().map_or_else(|_| fallback(), Value::from)
        }
        FieldType::Long | FieldType::Int24 => {
            text.parse::<i32>().map_or_else(|_| fallback(), Value::Int)
        }
        FieldType::LongLong if unsigned => text
            .parse::<u64>()
            .map_or_else(|_| fallback(), Value::from_unsigned),
        FieldType::LongLong => text.parse::<i64>().map_or_else(|_| fallback(), Value::BigInt),
        FieldType::Float => text.parse::<f32>().map_or_else(|_| fallback(), Value::Float),
        FieldType::Double => text.parse::<f64>().map_or_else(|_| fallback(), Value::Double),
        FieldType::Decimal | FieldType::NewDecimal => Value::Decimal(text.to_string()),
        FieldType::Date | FieldType::NewDate => {
            return decode_text_date(column, &text, Temporal::Date, zero_dates);
        }
        FieldType::DateTime | FieldType::Timestamp => {
            return decode_text_date(column, &text, Temporal::DateTime, zero_dates);
        }
        FieldType::Time => decode_text_time(&text),
        FieldType::Json => serde_json::from_str(&text).map_or_else(|_| fallback(), Value::Json),
        FieldType::Null => Value::Null,
        FieldType::Bit | FieldType::Geometry => Value::Bytes(data.to_vec()),
        FieldType::VarChar
        | FieldType::VarString
        | FieldType::String
        | FieldType::Enum
        | FieldType::Set
        | FieldType::TinyBlob
        | FieldType::MediumBlob
        | FieldType::LongBlob
        | FieldType::Blob => character_data(column, data),
    };
    Ok(value)
}

/// Decode a text-protocol row: one length-prefixed value per column,
/// `0xFB` for NULL.
pub fn decode_text_row(
    payload: &[u8],
    columns: &[ColumnDef],
    zero_dates: ZeroDateBehavior,
) -> Result<Vec<Value>> {
    let mut reader = PacketReader::new(payload);
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        if reader.peek() == Some(NULL_MARKER) {
            reader.skip(1);
            values.push(Value::Null);
            continue;
        }
        let data = reader
            .read_lenenc_bytes()
            .ok_or_else(|| truncated("text row"))?;
        values.push(decode_text_value(column, data, zero_dates)?);
    }
    Ok(values)
}

fn fixed<'a, const N: usize>(reader: &mut PacketReader<'a>) -> Result<[u8; N]> {
    reader
        .read_bytes(N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| truncated("binary row value"))
}

fn decode_binary_date(
    reader: &mut PacketReader<'_>,
    column: &ColumnDef,
    kind: Temporal,
    zero_dates: ZeroDateBehavior,
) -> Result<Value> {
    let len = reader.read_u8().ok_or_else(|| truncated("date length"))?;
    let data = reader
        .read_bytes(usize::from(len))
        .ok_or_else(|| truncated("date value"))?;
    if !matches!(len, 0 | 4 | 7 | 11) {
        return Err(protocol_error(format!(
            "invalid binary date length {} for column '{}'",
            len, column.name
        )));
    }
    if len == 0 {
        return zero_date(zero_dates, kind, column);
    }

    let year = u16::from_le_bytes([data[0], data[1]]);
    let (month, day) = (data[2], data[3]);
    if year == 0 && month == 0 && day == 0 {
        return zero_date(zero_dates, kind, column);
    }
    let mut micros = 0;
    if len >= 7 {
        let (h, m, s) = (i64::from(data[4]), i64::from(data[5]), i64::from(data[6]));
        micros = ((h * 60 + m) * 60 + s) * MICROS_PER_SECOND;
    }
    if len == 11 {
        micros += i64::from(u32::from_le_bytes([data[7], data[8], data[9], data[10]]));
    }
    let days = days_from_civil(i64::from(year), u32::from(month), u32::from(day));
    date_value(kind, days, micros).ok_or_else(|| out_of_range("date", column))
}

fn decode_binary_time(reader: &mut PacketReader<'_>, column: &ColumnDef) -> Result<Value> {
    let len = reader.read_u8().ok_or_else(|| truncated("time length"))?;
    let data = reader
        .read_bytes(usize::from(len))
        .ok_or_else(|| truncated("time value"))?;
    match len {
        0 => Ok(Value::Time(0)),
        8 | 12 => {
            let negative = data[0] != 0;
            let days = i64::from(u32::from_le_bytes([data[1], data[2], data[3], data[4]]));
            let (h, m, s) = (i64::from(data[5]), i64::from(data[6]), i64::from(data[7]));
            let frac = if len == 12 {
                i64::from(u32::from_le_bytes([data[8], data[9], data[10], data[11]]))
            } else {
                0
            };
            let micros = days
                .checked_mul(MICROS_PER_DAY)
                .and_then(|d| d.checked_add(((h * 60 + m) * 60 + s) * MICROS_PER_SECOND + frac))
                .ok_or_else(|| out_of_range("binary time", column))?;
            Ok(Value::Time(if negative { -micros } else { micros }))
        }
        _ => Err(protocol_error(format!(
            "invalid binary time length {} for column '{}'",
            len, column.name
        ))),
    }
}

/// Decode a binary-protocol row (prepared statement results).
///
/// Layout: `0x00` header, a NULL bitmap of `(n + 9) / 8` bytes whose bits
/// start at offset 2, then the non-NULL values in column order.
pub fn decode_binary_row(
    payload: &[u8],
    columns: &[ColumnDef],
    zero_dates: ZeroDateBehavior,
) -> Result<Vec<Value>> {
    let mut reader = PacketReader::new(payload);
    reader.skip(1);
    let bitmap = reader
        .read_bytes((columns.len() + 9) / 8)
        .ok_or_else(|| truncated("null bitmap"))?;

    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let bit = i + 2;
        if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            values.push(Value::Null);
            continue;
        }

        let field_type = column.field_type().ok_or_else(|| {
            protocol_error(format!(
                "unknown field type 0x{:02X} for column '{}'",
                column.type_code, column.name
            ))
        })?;
        let unsigned = column.is_unsigned();
        let r = &mut reader;

        let value = match field_type {
            FieldType::Tiny => {
                let [b] = fixed::<1>(r)?;
                if unsigned { Value::from(b) } else { Value::TinyInt(b as i8) }
            }
            FieldType::Short | FieldType::Year => {
                let v = u16::from_le_bytes(fixed(r)?);
                if unsigned { Value::from(v) } else { Value::SmallInt(v as i16) }
            }
            FieldType::Long | FieldType::Int24 => {
                let v = u32::from_le_bytes(fixed(r)?);
                if unsigned { Value::from(v) } else { Value::Int(v as i32) }
            }
            FieldType::LongLong => {
                let v = u64::from_le_bytes(fixed(r)?);
                if unsigned { Value::from_unsigned(v) } else { Value::BigInt(v as i64) }
            }
            FieldType::Float => Value::Float(f32::from_le_bytes(fixed(r)?)),
            FieldType::Double => Value::Double(f64::from_le_bytes(fixed(r)?)),
            FieldType::Date | FieldType::NewDate => {
                decode_binary_date(r, column, Temporal::Date, zero_dates)?
            }
            FieldType::DateTime | FieldType::Timestamp => {
                decode_binary_date(r, column, Temporal::DateTime, zero_dates)?
            }
            FieldType::Time => decode_binary_time(r, column)?,
            FieldType::Null => Value::Null,
            _ => {
                let data = r
                    .read_lenenc_bytes()
                    .ok_or_else(|| truncated("binary row value"))?;
                match field_type {
                    FieldType::Decimal | FieldType::NewDecimal => {
                        Value::Decimal(String::from_utf8_lossy(data).into_owned())
                    }
                    FieldType::Json => {
                        let text = String::from_utf8_lossy(data);
                        serde_json::from_str(&text)
                            .map_or_else(|_| Value::Text(text.into_owned()), Value::Json)
                    }
                    FieldType::Bit | FieldType::Geometry => Value::Bytes(data.to_vec()),
                    _ => character_data(column, data),
                }
            }
        };
        values.push(value);
    }
    Ok(values)
}

/// Wire type code and unsigned flag used to bind a parameter.
pub fn binary_param_type(value: &Value) -> (FieldType, bool) {
    match value {
        Value::Null => (FieldType::Null, false),
        Value::Bool(_) | Value::TinyInt(_) => (FieldType::Tiny, false),
        Value::SmallInt(_) => (FieldType::Short, false),
        Value::Int(_) => (FieldType::Long, false),
        Value::BigInt(_) => (FieldType::LongLong, false),
        Value::Float(_) => (FieldType::Float, false),
        Value::Double(_) => (FieldType::Double, false),
        Value::Decimal(_) => (FieldType::NewDecimal, false),
        Value::Text(_) | Value::Json(_) => (FieldType::VarString, false),
        Value::Bytes(_) => (FieldType::Blob, false),
        Value::Date(_) => (FieldType::Date, false),
        Value::Time(_) => (FieldType::Time, false),
        Value::Timestamp(_) => (FieldType::DateTime, false),
    }
}

fn split_timestamp(micros: i64) -> (i64, u32, u32, u8, u8, u8, u32) {
    let days = micros.div_euclid(MICROS_PER_DAY);
    let of_day = micros.rem_euclid(MICROS_PER_DAY);
    let (y, mo, d) = civil_from_days(days);
    let secs = of_day / MICROS_PER_SECOND;
    (
        y,
        mo,
        d,
        (secs / 3600) as u8,
        (secs / 60 % 60) as u8,
        (secs % 60) as u8,
        (of_day % MICROS_PER_SECOND) as u32,
    )
}

/// Append a parameter value in binary protocol form. NULL writes nothing.
pub fn encode_binary_value(value: &Value, out: &mut PacketWriter) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.write_u8(u8::from(*b)),
        Value::TinyInt(i) => out.write_u8(*i as u8),
        Value::SmallInt(i) => out.write_u16_le(*i as u16),
        Value::Int(i) => out.write_u32_le(*i as u32),
        Value::BigInt(i) => out.write_u64_le(*i as u64),
        Value::Float(f) => out.write_bytes(&f.to_le_bytes()),
        Value::Double(f) => out.write_bytes(&f.to_le_bytes()),
        Value::Decimal(s) | Value::Text(s) => out.write_lenenc_string(s),
        Value::Json(j) => out.write_lenenc_string(&j.to_string()),
        Value::Bytes(b) => out.write_lenenc_bytes(b),
        Value::Date(days) => {
            let (y, m, d) = civil_from_days(i64::from(*days));
            out.write_u8(4);
            out.write_u16_le(y as u16);
            out.write_u8(m as u8);
            out.write_u8(d as u8);
        }
        Value::Timestamp(micros) => {
            let (y, mo, d, h, mi, s, us) = split_timestamp(*micros);
            out.write_u8(if us == 0 { 7 } else { 11 });
            out.write_u16_le(y as u16);
            out.write_u8(mo as u8);
            out.write_u8(d as u8);
            out.write_u8(h);
            out.write_u8(mi);
            out.write_u8(s);
            if us != 0 {
                out.write_u32_le(us);
            }
        }
        Value::Time(micros) => {
            let abs = micros.unsigned_abs();
            let us = (abs % 1_000_000) as u32;
            let secs = abs / 1_000_000;
            out.write_u8(if us == 0 { 8 } else { 12 });
            out.write_u8(u8::from(*micros < 0));
            out.write_u32_le((secs / 86_400) as u32);
            out.write_u8((secs / 3600 % 24) as u8);
            out.write_u8((secs / 60 % 60) as u8);
            out.write_u8((secs % 60) as u8);
            if us != 0 {
                out.write_u32_le(us);
            }
        }
    }
}

/// Escape a string as a quoted MySQL literal.
pub fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('\'');
    for ch in s.chars() {
        match ch {
            '\0' => result.push_str("\\0"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '\x1a' => result.push_str("\\Z"),
            _ => result.push(ch),
        }
    }
    result.push('\'');
    result
}

fn escape_bytes(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 2 + 3);
    result.push_str("X'");
    for byte in data {
        result.push_str(&format!("{byte:02X}"));
    }
    result.push('\'');
    result
}

fn format_fraction(out: &mut String, micros: u32) {
    if micros != 0 {
        out.push_str(&format!(".{micros:06}"));
    }
}

/// Format a value as a SQL literal for client-side interpolation.
pub fn format_value_for_sql(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::TinyInt(i) => i.to_string(),
        Value::SmallInt(i) => i.to_string(),
        Value::Int(i) => i.to_string(),
        Value::BigInt(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Double(f) if f.is_finite() => f.to_string(),
        Value::Float(_) | Value::Double(_) => "NULL".to_string(),
        Value::Decimal(s) => s.clone(),
        Value::Text(s) => escape_string(s),
        Value::Bytes(b) => escape_bytes(b),
        Value::Json(j) => escape_string(&j.to_string()),
        Value::Date(days) => {
            let (y, m, d) = civil_from_days(i64::from(*days));
            format!("'{y:04}-{m:02}-{d:02}'")
        }
        Value::Timestamp(micros) => {
            let (y, mo, d, h, mi, s, us) = split_timestamp(*micros);
            let mut out = format!("'{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}");
            format_fraction(&mut out, us);
            out.push('\'');
            out
        }
        Value::Time(micros) => {
            let abs = micros.unsigned_abs();
            let secs = abs / 1_000_000;
            let sign = if *micros < 0 { "-" } else { "" };
            let mut out = format!(
                "'{sign}{:02}:{:02}:{:02}",
                secs / 3600,
                secs / 60 % 60,
                secs % 60
            );
            format_fraction(&mut out, (abs % 1_000_000) as u32);
            out.push('\'');
            out
        }
    }
}

/// Replace `?` placeholders with escaped literals.
///
/// Placeholders inside quoted strings and backtick identifiers are left
/// alone, as are surplus placeholders.
pub fn interpolate_params(sql: &str, params: &[Value]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }

    let mut result = String::with_capacity(sql.len() + params.len() * 16);
    let mut params = params.iter();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in sql.chars() {
        if let Some(q) = quote {
            result.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' && q != '`' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                result.push(ch);
            }
            '?' => match params.next() {
                Some(value) => result.push_str(&format_value_for_sql(value)),
                None => result.push('?'),
            },
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VersionCutoffs;
    use crate::handshake::ServerVersion;

    fn flags_for(version: ServerVersion, long_flag: bool) -> ProtocolFlags {
        let caps = if long_flag {
            crate::protocol::capabilities::CLIENT_LONG_FLAG
        } else {
            0
        };
        ProtocolFlags::derive(version, caps, &VersionCutoffs::default())
    }

    fn column(type_code: FieldType, flags: u16) -> ColumnDef {
        ColumnDef {
            name: "c".to_string(),
            type_code: type_code as u8,
            flags,
            charset: u16::from(charset::UTF8_GENERAL_CI),
            ..ColumnDef::default()
        }
    }

    fn text(col: &ColumnDef, data: &str) -> Value {
        decode_text_value(col, data.as_bytes(), ZeroDateBehavior::Round).unwrap()
    }

    #[test]
    fn test_field_type_codes() {
        assert_eq!(FieldType::from_u8(0xFD), Some(FieldType::VarString));
        assert_eq!(FieldType::from_u8(0x30), None);
        assert!(FieldType::Int24.is_integer());
        assert!(FieldType::NewDate.is_temporal());
        assert_eq!(FieldType::NewDecimal.name(), "DECIMAL");
    }

    #[test]
    fn test_three_metadata_generations_agree() {
        // 4.1.1+
        let mut w = PacketWriter::new();
        for s in ["def", "shop", "o", "orders", "qty", "quantity"] {
            w.write_lenenc_string(s);
        }
        w.write_u8(0x0C);
        w.write_u16_le(33);
        w.write_u32_le(11);
        w.write_u8(FieldType::Long as u8);
        w.write_u16_le(column_flags::NOT_NULL | column_flags::UNSIGNED);
        w.write_u8(0);
        let modern = parse_column_def(w.as_bytes(), &flags_for(ServerVersion::new(5, 7, 0), true))
            .unwrap();

        // 4.1.0
        let mut w = PacketWriter::new();
        for s in ["shop", "o", "orders", "qty", "quantity"] {
            w.write_lenenc_string(s);
        }
        w.write_u8(0x0A);
        w.write_u16_le(33);
        w.write_u24_le(11);
        w.write_u8(FieldType::Long as u8);
        w.write_u16_le(column_flags::NOT_NULL | column_flags::UNSIGNED);
        w.write_u8(0);
        let v410 = parse_column_def(w.as_bytes(), &flags_for(ServerVersion::new(4, 1, 0), true))
            .unwrap();

        // pre-4.1
        let mut w = PacketWriter::new();
        w.write_lenenc_string("o");
        w.write_lenenc_string("qty");
        w.write_u8(3);
        w.write_u24_le(11);
        w.write_u8(1);
        w.write_u8(FieldType::Long as u8);
        w.write_u8(3);
        w.write_u16_le(column_flags::NOT_NULL | column_flags::UNSIGNED);
        w.write_u8(0);
        let legacy = parse_column_def(w.as_bytes(), &flags_for(ServerVersion::new(4, 0, 20), true))
            .unwrap();

        for col in [&modern, &v410, &legacy] {
            assert_eq!(col.table, "o");
            assert_eq!(col.name, "qty");
            assert_eq!(col.column_length, 11);
            assert_eq!(col.field_type(), Some(FieldType::Long));
            assert!(col.is_unsigned());
            assert!(col.is_not_null());
            assert_eq!(col.decimals, 0);
        }
        assert_eq!(modern.catalog, "def");
        assert_eq!(v410.org_name, "quantity");
        assert_eq!(legacy.charset, 0);
    }

    #[test]
    fn test_short_flags_and_decimal_bump() {
        let mut w = PacketWriter::new();
        w.write_lenenc_string("t");
        w.write_lenenc_string("price");
        w.write_u8(1);
        w.write_u8(10);
        w.write_u8(1);
        w.write_u8(FieldType::Decimal as u8);
        w.write_u8(2);
        w.write_u8(column_flags::NOT_NULL as u8);
        w.write_u8(2);
        let col = parse_column_def(w.as_bytes(), &flags_for(ServerVersion::new(3, 23, 10), false))
            .unwrap();
        assert_eq!(col.decimals, 3);
        assert!(col.is_not_null());
        assert!(parse_column_def(&w.as_bytes()[..5], &flags_for(ServerVersion::new(3, 23, 10), false)).is_err());
    }

    #[test]
    fn test_calendar_helpers() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(1, 1, 1), ROUNDED_ZERO_DAYS);
        assert_eq!(days_from_civil(2024, 2, 29), 19_782);
        assert_eq!(civil_from_days(19_782), (2024, 2, 29));
        assert_eq!(civil_from_days(-1), (1969, 12, 31));
    }

    #[test]
    fn test_text_integers_widen_when_unsigned() {
        assert_eq!(text(&column(FieldType::Tiny, 0), "-5"), Value::TinyInt(-5));
        assert_eq!(
            text(&column(FieldType::Tiny, column_flags::UNSIGNED), "200"),
            Value::SmallInt(200)
        );
        assert_eq!(
            text(&column(FieldType::Long, column_flags::UNSIGNED), "4000000000"),
            Value::BigInt(4_000_000_000)
        );
        assert_eq!(
            text(&column(FieldType::LongLong, column_flags::UNSIGNED), "18446744073709551615"),
            Value::Decimal("18446744073709551615".to_string())
        );
        assert_eq!(
            text(&column(FieldType::Long, 0), "not a number"),
            Value::Text("not a number".to_string())
        );
    }

    #[test]
    fn test_text_temporal_values() {
        let date = column(FieldType::Date, 0);
        assert_eq!(text(&date, "2024-02-29"), Value::Date(19_782));

        let ts = column(FieldType::DateTime, 0);
        assert_eq!(
            text(&ts, "2024-02-29 13:45:30.123456"),
            Value::Timestamp(1_709_214_330_123_456)
        );
        assert_eq!(
            text(&column(FieldType::Timestamp, 0), "20240229134530"),
            Value::Timestamp(1_709_214_330_000_000)
        );

        let time = column(FieldType::Time, 0);
        assert_eq!(text(&time, "-838:59:59"), Value::Time(-3_020_399_000_000));
        assert_eq!(text(&time, "00:00:01.5"), Value::Time(1_500_000));
    }

    #[test]
    fn test_zero_date_policies() {
        let date = column(FieldType::Date, 0);
        let ts = column(FieldType::DateTime, 0);

        let null = decode_text_value(&date, b"0000-00-00", ZeroDateBehavior::ConvertToNull);
        assert_eq!(null.unwrap(), Value::Null);

        let err = decode_text_value(&ts, b"0000-00-00 00:00:00", ZeroDateBehavior::Exception)
            .unwrap_err();
        assert_eq!(err.sqlstate(), Some("22007"));
        assert!(err.is_data_truncation());

        assert_eq!(text(&date, "0000-00-00"), Value::Date(-719_162));
        assert_eq!(
            text(&ts, "0000-00-00 00:00:00"),
            Value::Timestamp(-719_162 * MICROS_PER_DAY)
        );
    }

    #[test]
    fn test_text_strings_and_binary() {
        let mut blob = column(FieldType::Blob, column_flags::BINARY);
        blob.charset = u16::from(charset::BINARY);
        assert_eq!(text(&blob, "\u{1}x"), Value::Bytes(vec![1, b'x']));
        assert_eq!(
            text(&column(FieldType::Blob, 0), "long text"),
            Value::Text("long text".to_string())
        );
        assert_eq!(
            text(&column(FieldType::NewDecimal, 0), "12.50"),
            Value::Decimal("12.50".to_string())
        );
        assert_eq!(
            text(&column(FieldType::Json, 0), r#"{"a":1}"#),
            Value::Json(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn test_text_row_with_null() {
        let cols = [column(FieldType::Long, 0), column(FieldType::VarString, 0)];
        let mut w = PacketWriter::new();
        w.write_u8(NULL_MARKER);
        w.write_lenenc_string("hi");
        let row = decode_text_row(w.as_bytes(), &cols, ZeroDateBehavior::Round).unwrap();
        assert_eq!(row, vec![Value::Null, Value::Text("hi".to_string())]);
        assert!(decode_text_row(&[0x05, b'a'], &cols, ZeroDateBehavior::Round).is_err());
    }

    #[test]
    fn test_binary_row_null_bitmap() {
        let cols = [
            column(FieldType::Long, 0),
            column(FieldType::VarString, 0),
            column(FieldType::Tiny, column_flags::UNSIGNED),
        ];
        let mut w = PacketWriter::new();
        w.write_u8(0x00);
        // Column 1 is NULL: bit 1 + 2 = 3.
        w.write_u8(1 << 3);
        w.write_u32_le(7);
        w.write_u8(250);
        let row = decode_binary_row(w.as_bytes(), &cols, ZeroDateBehavior::Round).unwrap();
        assert_eq!(row, vec![Value::Int(7), Value::Null, Value::SmallInt(250)]);
    }

    #[test]
    fn test_binary_row_fixed_and_temporal() {
        let cols = [
            column(FieldType::LongLong, column_flags::UNSIGNED),
            column(FieldType::Double, 0),
            column(FieldType::DateTime, 0),
            column(FieldType::Date, 0),
            column(FieldType::Time, 0),
            column(FieldType::NewDecimal, 0),
        ];
        let mut w = PacketWriter::new();
        w.write_u8(0x00);
        w.write_u8(0);
        w.write_u64_le(u64::MAX);
        w.write_bytes(&2.5f64.to_le_bytes());
        w.write_u8(11);
        w.write_u16_le(2024);
        w.write_bytes(&[2, 29, 13, 45, 30]);
        w.write_u32_le(123_456);
        w.write_u8(0);
        w.write_u8(8);
        w.write_u8(1);
        w.write_u32_le(1);
        w.write_bytes(&[2, 0, 0]);
        w.write_lenenc_string("9.99");

        let row = decode_binary_row(w.as_bytes(), &cols, ZeroDateBehavior::ConvertToNull).unwrap();
        assert_eq!(row[0], Value::Decimal(u64::MAX.to_string()));
        assert_eq!(row[1], Value::Double(2.5));
        assert_eq!(row[2], Value::Timestamp(1_709_214_330_123_456));
        assert_eq!(row[3], Value::Null);
        assert_eq!(row[4], Value::Time(-26 * 3600 * MICROS_PER_SECOND));
        assert_eq!(row[5], Value::Decimal("9.99".to_string()));
    }

    #[test]
    fn test_binary_row_unknown_type_is_protocol_error() {
        let mut col = column(FieldType::Long, 0);
        col.type_code = 0x42;
        let err = decode_binary_row(&[0x00, 0x00, 0x01], &[col], ZeroDateBehavior::Round)
            .unwrap_err();
        assert!(matches!(err, sqlwire_core::Error::Protocol(_)));
    }

    #[test]
    fn test_oversized_temporals_are_protocol_errors() {
        let time = column(FieldType::Time, 0);
        let mut w = PacketWriter::new();
        w.write_u8(0x00);
        w.write_u8(0);
        w.write_bytes(&[8, 0, 0xFF, 0xFF, 0xFF, 0xFF, 23, 59, 59]);
        let err = decode_binary_row(w.as_bytes(), &[time.clone()], ZeroDateBehavior::Round)
            .unwrap_err();
        assert!(matches!(err, sqlwire_core::Error::Protocol(_)));

        // 34 days is still a valid TIME (838:59:59 range).
        let mut w = PacketWriter::new();
        w.write_u8(0x00);
        w.write_u8(0);
        w.write_bytes(&[8, 1, 34, 0, 0, 0, 22, 59, 59]);
        let row = decode_binary_row(w.as_bytes(), &[time], ZeroDateBehavior::Round).unwrap();
        assert_eq!(row[0], Value::Time(-(838 * 3600 + 59 * 60 + 59) * MICROS_PER_SECOND));

        for kind in [FieldType::Date, FieldType::DateTime] {
            let col = column(kind, 0);
            let err = decode_text_value(&col, b"9223372036854775807-01-01", ZeroDateBehavior::Round)
                .unwrap_err();
            assert!(matches!(err, sqlwire_core::Error::Protocol(_)));
            assert!(decode_text_value(&col, b"99999-12-31", ZeroDateBehavior::Round).is_err());
        }
    }

    #[test]
    fn test_binary_encoding_of_temporals() {
        let mut w = PacketWriter::new();
        encode_binary_value(&Value::Timestamp(1_709_214_330_000_000), &mut w);
        assert_eq!(w.as_bytes(), &[7, 0xE8, 0x07, 2, 29, 13, 45, 30]);

        let mut w = PacketWriter::new();
        encode_binary_value(&Value::Time(-(26 * 3600 + 1) * MICROS_PER_SECOND), &mut w);
        assert_eq!(w.as_bytes(), &[8, 1, 1, 0, 0, 0, 2, 0, 1]);

        assert_eq!(binary_param_type(&Value::Bool(true)), (FieldType::Tiny, false));
        assert_eq!(binary_param_type(&Value::Null).0, FieldType::Null);
    }

    #[test]
    fn test_escape_and_interpolate() {
        assert_eq!(escape_string("it's \"x\"\n\\"), r#"'it\'s \"x\"\n\\'"#);
        let sql = interpolate_params(
            "SELECT '?', `a?` FROM t WHERE id = ? AND name = ? AND d = ?",
            &[
                Value::Int(5),
                Value::Text("o'hara".to_string()),
                Value::Date(19_782),
            ],
        );
        assert_eq!(
            sql,
            "SELECT '?', `a?` FROM t WHERE id = 5 AND name = 'o\\'hara' AND d = '2024-02-29'"
        );
        assert_eq!(interpolate_params("a = ? and b = ?", &[Value::Null]), "a = NULL and b = ?");
        assert_eq!(format_value_for_sql(&Value::Bytes(vec![0xAB, 1])), "X'AB01'");
        assert_eq!(
            format_value_for_sql(&Value::Time(-(90 * 60 * MICROS_PER_SECOND + 5))),
            "'-01:30:00.000005'"
        );
    }
}
