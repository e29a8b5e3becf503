//! Payload builder for outgoing packets.
//!
//! Framing (headers, splitting, compression) is added later by the
//! transport; this type only lays out payload bytes.

#![allow(clippy::cast_possible_truncation)]

use super::Command;

#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Start a command payload with its code byte.
    pub fn command(command: Command) -> Self {
        let mut writer = Self::with_capacity(64);
        writer.write_u8(command as u8);
        writer
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u24_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes()[..3]);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length-encoded integer using the shortest form.
    pub fn write_lenenc_int(&mut self, value: u64) {
        match value {
            0..=250 => self.write_u8(value as u8),
            251..=0xFFFF => {
                self.write_u8(0xFC);
                self.write_u16_le(value as u16);
            }
            0x1_0000..=0xFF_FFFF => {
                self.write_u8(0xFD);
                self.write_u24_le(value as u32);
            }
            _ => {
                self.write_u8(0xFE);
                self.write_u64_le(value);
            }
        }
    }

    pub fn write_lenenc_bytes(&mut self, data: &[u8]) {
        self.write_lenenc_int(data.len() as u64);
        self.buf.extend_from_slice(data);
    }

    pub fn write_lenenc_string(&mut self, s: &str) {
        self.write_lenenc_bytes(s.as_bytes());
    }

    pub fn write_null_string(&mut self, s: &str) {
        self.write_null_bytes(s.as_bytes());
    }

    pub fn write_null_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.buf.push(0);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_zeros(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketReader;

    #[test]
    fn test_lenenc_boundaries() {
        let cases: [(u64, usize); 6] = [
            (0, 1),
            (250, 1),
            (251, 3),
            (65_535, 3),
            (65_536, 4),
            (16_777_216, 9),
        ];
        for (value, width) in cases {
            let mut w = PacketWriter::new();
            w.write_lenenc_int(value);
            assert_eq!(w.len(), width, "width of {value}");
            assert_eq!(PacketReader::new(w.as_bytes()).read_lenenc_int(), Some(value));
        }
    }

    #[test]
    fn test_long_string_uses_three_byte_prefix() {
        let text = "x".repeat(65_536);
        let mut w = PacketWriter::new();
        w.write_lenenc_string(&text);
        assert_eq!(&w.as_bytes()[..4], &[0xFD, 0x00, 0x00, 0x01]);
        assert_eq!(w.len(), 65_536 + 4);
    }

    #[test]
    fn test_command_prefix_and_strings() {
        let mut w = PacketWriter::command(Command::InitDb);
        w.write_bytes(b"test");
        assert_eq!(w.as_bytes(), b"\x02test");

        let mut w = PacketWriter::new();
        w.write_null_string("root");
        w.write_zeros(2);
        w.write_u24_le(0x01_0203);
        assert_eq!(w.into_bytes(), b"root\0\0\0\x03\x02\x01");
    }
}
