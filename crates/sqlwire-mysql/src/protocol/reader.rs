//! Cursor over a received packet payload.
//!
//! All reads return `None` when the payload is too short, leaving the caller
//! to turn truncation into a protocol error with context.

#![allow(clippy::cast_possible_truncation)]

use crate::protocol::{EofPacket, OkPacket};

/// Marks a NULL column in text rows and a zero count in update results.
pub const NULL_MARKER: u8 = 0xFB;

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let byte = self.data.get(self.pos)?;
        self.pos += 1;
        Some(*byte)
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    pub fn read_u16_le(&mut self) -> Option<u16> {
        self.read_array::<2>().map(u16::from_le_bytes)
    }

    pub fn read_u24_le(&mut self) -> Option<u32> {
        self.read_array::<3>()
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn read_u32_le(&mut self) -> Option<u32> {
        self.read_array::<4>().map(u32::from_le_bytes)
    }

    pub fn read_u64_le(&mut self) -> Option<u64> {
        self.read_array::<8>().map(u64::from_le_bytes)
    }

    /// Read a little-endian integer whose byte width is given by a leading
    /// count byte (pre-4.1 field descriptors).
    pub fn read_counted_uint(&mut self) -> Option<u64> {
        let width = usize::from(self.read_u8()?);
        let bytes = self.read_bytes(width)?;
        if width > 8 {
            return None;
        }
        Some(
            bytes
                .iter()
                .rev()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        )
    }

    /// Read a length-encoded integer.
    ///
    /// - 0x00-0xFA: the value itself
    /// - 0xFB: NULL, reported as `None`
    /// - 0xFC: 2-byte value follows
    /// - 0xFD: 3-byte value follows
    /// - 0xFE: 8-byte value follows
    pub fn read_lenenc_int(&mut self) -> Option<u64> {
        let first = self.read_u8()?;
        match first {
            0x00..=0xFA => Some(u64::from(first)),
            0xFC => self.read_u16_le().map(u64::from),
            0xFD => self.read_u24_le().map(u64::from),
            0xFE => self.read_u64_le(),
            0xFB | 0xFF => None,
        }
    }

    /// Read an update count or insert id.
    ///
    /// `new_counts` selects the 8-byte 0xFE form; older servers send four
    /// bytes after 0xFE. The NULL marker counts as zero.
    pub fn read_update_count(&mut self, new_counts: bool) -> Option<u64> {
        match self.peek()? {
            NULL_MARKER => {
                self.pos += 1;
                Some(0)
            }
            0xFE if !new_counts => {
                self.pos += 1;
                self.read_u32_le().map(u64::from)
            }
            _ => self.read_lenenc_int(),
        }
    }

    pub fn read_lenenc_bytes(&mut self) -> Option<&'a [u8]> {
        let len = usize::try_from(self.read_lenenc_int()?).ok()?;
        self.read_bytes(len)
    }

    pub fn read_lenenc_string(&mut self) -> Option<String> {
        self.read_lenenc_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Read up to the next NUL byte; a missing terminator ends at the payload end.
    pub fn read_null_terminated(&mut self) -> Option<&'a [u8]> {
        let rest = self.data.get(self.pos..)?;
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        self.pos += len;
        if self.pos < self.data.len() {
            self.pos += 1;
        }
        Some(&rest[..len])
    }

    pub fn read_null_string(&mut self) -> Option<String> {
        self.read_null_terminated()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(bytes)
    }

    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        self.pos = self.data.len();
        rest
    }

    pub fn skip(&mut self, n: usize) -> bool {
        if self.remaining() < n {
            return false;
        }
        self.pos += n;
        true
    }

    /// Parse an update result (column count 0).
    ///
    /// With 4.1 extensions the counts are followed by status, warnings and
    /// one skipped byte; whatever remains is the info message.
    pub fn parse_ok_packet(&mut self, new_counts: bool, ext41: bool) -> Option<OkPacket> {
        let _header = self.read_u8()?;
        let affected_rows = self.read_update_count(new_counts)?;
        let last_insert_id = self.read_update_count(new_counts)?;
        let mut ok = OkPacket {
            affected_rows,
            last_insert_id,
            ..OkPacket::default()
        };
        if ext41 {
            ok.status_flags = Some(self.read_u16_le()?);
            ok.warnings = self.read_u16_le()?;
            self.skip(1);
        }
        let info = self.read_rest();
        let info = info.strip_suffix(&[0]).unwrap_or(info);
        ok.info = String::from_utf8_lossy(info).into_owned();
        Some(ok)
    }

    /// Parse an EOF trailer: marker, warnings, then status.
    pub fn parse_eof_packet(&mut self) -> Option<EofPacket> {
        let header = self.read_u8()?;
        if header != 0xFE {
            return None;
        }
        Some(EofPacket {
            warnings: self.read_u16_le().unwrap_or(0),
            status_flags: self.read_u16_le().unwrap_or(0),
        })
    }
}
