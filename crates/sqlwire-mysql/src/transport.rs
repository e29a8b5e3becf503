//! Packet framing over a byte stream.
//!
//! [`PacketTransport`] turns logical payloads into physical frames and back:
//! it owns the sequence counters, splits and reassembles payloads that reach
//! the three-byte maximum, and wraps frames in the zlib layer once
//! compression is switched on.
//!
//! Compressed frames look like
//!
//! ```text
//! u24 compressed_length | u8 sequence | u24 uncompressed_length | body
//! ```
//!
//! where an uncompressed length of zero means the body is stored as is.

#![allow(clippy::cast_possible_truncation)]

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use sqlwire_core::{Error, Result};

use crate::errors::{communications_failure, protocol_error, ssl_error};
use crate::pool::{BufferPool, BufferPoolStats};
use crate::protocol::{
    COMP_HEADER_LENGTH, DEFAULT_MAX_ALLOWED_PACKET, HEADER_LENGTH, MIN_COMPRESS_LEN,
    NEW_MAX_THREE_BYTES, PacketHeader,
};

/// Upper bound for a reassembled inbound payload (the server's own limit).
pub const MAX_INBOUND_PACKET: usize = 1 << 30;

/// Bytes requested from the stream per read call.
const READ_CHUNK: usize = 16 * 1024;

/// A byte stream the driver can run the protocol over.
///
/// Implemented for TCP sockets and the [`Socket`] wrapper; test doubles only
/// need `Read + Write`.
pub trait Channel: Read + Write {
    /// Apply socket read/write timeouts.
    fn set_timeouts(&mut self, read: Option<Duration>, write: Option<Duration>) -> io::Result<()> {
        let _ = (read, write);
        Ok(())
    }

    /// Upgrade the channel to TLS after the SSL request packet was sent.
    fn start_tls(self, server_name: &str, tls: &TlsParams<'_>) -> Result<Self>
    where
        Self: Sized,
    {
        let _ = (server_name, tls);
        Err(ssl_error("this channel cannot be upgraded to TLS"))
    }
}

/// TLS inputs handed to [`Channel::start_tls`].
#[derive(Debug, Clone, Copy)]
pub struct TlsParams<'a> {
    pub mode: crate::config::SslMode,
    pub config: &'a crate::config::TlsConfig,
}

impl Channel for TcpStream {
    fn set_timeouts(&mut self, read: Option<Duration>, write: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(read)?;
        self.set_write_timeout(write)
    }
}

/// The network stream behind a connection opened with `MySqlConnection::open`.
#[derive(Debug)]
pub enum Socket {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<crate::tls::TlsStream<TcpStream>>),
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(s) => s.write(buf),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.flush(),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => s.flush(),
        }
    }
}

impl Channel for Socket {
    fn set_timeouts(&mut self, read: Option<Duration>, write: Option<Duration>) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.set_timeouts(read, write),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => s.get_mut().set_timeouts(read, write),
        }
    }

    #[cfg(feature = "tls")]
    fn start_tls(self, server_name: &str, tls: &TlsParams<'_>) -> Result<Self> {
        match self {
            Socket::Tcp(tcp) => {
                let stream = crate::tls::TlsStream::connect(tcp, tls.config, tls.mode, server_name)?;
                Ok(Socket::Tls(Box::new(stream)))
            }
            Socket::Tls(_) => Err(ssl_error("channel is already using TLS")),
        }
    }

    #[cfg(not(feature = "tls"))]
    fn start_tls(self, _server_name: &str, _tls: &TlsParams<'_>) -> Result<Self> {
        Err(ssl_error(
            "TLS requested but sqlwire-mysql was built without the `tls` feature",
        ))
    }
}

/// Bytes read from a source but not yet consumed.
#[derive(Debug, Default)]
struct InBuf {
    data: Vec<u8>,
    pos: usize,
}

impl InBuf {
    fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take_into(&mut self, n: usize, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
    }

    fn take_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.data.drain(..self.pos);
            self.pos = 0;
        }
    }

    fn clear(&mut self) -> usize {
        let dropped = self.available();
        self.data.clear();
        self.pos = 0;
        dropped
    }
}

fn u24(bytes: &[u8]) -> usize {
    usize::from(bytes[0]) | (usize::from(bytes[1]) << 8) | (usize::from(bytes[2]) << 16)
}

fn put_u24(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
}

/// Framed packet I/O for one session.
#[derive(Debug)]
pub struct PacketTransport<S> {
    stream: S,
    wire: InBuf,
    inflated: InBuf,
    sequence: u8,
    compressed_sequence: u8,
    compress: bool,
    max_three_bytes: usize,
    /// Servers >= 4.0 accept split payloads
    split_large: bool,
    /// Servers >= 4.0.8; older ones end a split with a 1-byte marker frame
    new_large_packets: bool,
    max_allowed_packet: usize,
    pool: BufferPool,
}

impl<S: Channel> PacketTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            wire: InBuf::default(),
            inflated: InBuf::default(),
            sequence: 0,
            compressed_sequence: 0,
            compress: false,
            max_three_bytes: NEW_MAX_THREE_BYTES,
            split_large: true,
            new_large_packets: true,
            max_allowed_packet: DEFAULT_MAX_ALLOWED_PACKET,
            pool: BufferPool::new(),
        }
    }

    /// Apply the framing rules derived from the server version.
    pub fn configure_framing(&mut self, max_three_bytes: usize, split_large: bool, new_large_packets: bool) {
        self.max_three_bytes = max_three_bytes;
        self.split_large = split_large;
        self.new_large_packets = new_large_packets;
    }

    pub fn set_max_allowed_packet(&mut self, limit: usize) {
        self.max_allowed_packet = limit;
    }

    pub fn max_allowed_packet(&self) -> usize {
        self.max_allowed_packet
    }

    pub fn max_three_bytes(&self) -> usize {
        self.max_three_bytes
    }

    /// Switch the zlib layer on or off. Only done after authentication.
    pub fn set_compression(&mut self, enabled: bool) {
        if enabled != self.compress {
            tracing::debug!(enabled, "packet compression switched");
        }
        self.compress = enabled;
    }

    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    /// Start a new command exchange: both counters go back to zero.
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
        self.compressed_sequence = 0;
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Replace the stream with an upgraded one, keeping all framing state.
    pub fn upgrade(self, f: impl FnOnce(S) -> Result<S>) -> Result<Self> {
        if self.wire.available() > 0 {
            return Err(protocol_error(
                "server sent data before the TLS handshake started",
            ));
        }
        let stream = f(self.stream)?;
        Ok(Self { stream, ..self })
    }

    /// Discard inbound bytes that were buffered but never consumed.
    ///
    /// Only data already pulled from the stream is dropped; nothing blocks.
    pub fn clear_input(&mut self) {
        let dropped = self.wire.clear() + self.inflated.clear();
        if dropped > 0 {
            tracing::debug!(dropped_bytes = dropped, "cleared unread input");
        }
    }

    /// Return a payload buffer to the pool.
    pub fn recycle(&mut self, buf: Vec<u8>) {
        self.pool.release(buf);
    }

    /// Drop pooled buffers larger than 1 MiB.
    pub fn trim_buffers(&mut self) {
        self.pool.trim();
    }

    pub fn pool_stats(&self) -> BufferPoolStats {
        self.pool.stats()
    }

    /// Read one logical packet, reassembling split payloads.
    pub fn read_packet(&mut self) -> Result<Vec<u8>> {
        let header = self.read_header()?;
        let mut len = header.payload_length as usize;
        let mut payload = self.pool.acquire(len);
        self.read_logical(len, &mut payload)?;

        while len == self.max_three_bytes {
            let next = self.read_header()?;
            len = next.payload_length as usize;
            if !self.new_large_packets && len == 1 {
                let mut marker = Vec::with_capacity(1);
                self.read_logical(1, &mut marker)?;
                break;
            }
            if payload.len() + len > MAX_INBOUND_PACKET {
                return Err(protocol_error(format!(
                    "inbound packet exceeds {} bytes",
                    MAX_INBOUND_PACKET
                )));
            }
            self.read_logical(len, &mut payload)?;
        }

        tracing::trace!(
            length = payload.len(),
            sequence = header.sequence_id,
            "read packet"
        );
        Ok(payload)
    }

    /// Send one logical packet, splitting it when it reaches the maximum.
    ///
    /// A payload above `max_allowed_packet` is refused before anything is
    /// written, so the session stays usable.
    pub fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_allowed_packet {
            return Err(protocol_error(format!(
                "Packet for query is too large ({} > {}). You can change this value on the server by setting the max_allowed_packet variable.",
                payload.len(),
                self.max_allowed_packet
            )));
        }

        let max = self.max_three_bytes;
        let chunks = payload.len() / max + 1;
        let mut frames = self.pool.acquire(payload.len() + chunks * HEADER_LENGTH);

        if self.split_large && payload.len() >= max {
            let mut rest = payload;
            while rest.len() >= max {
                self.push_frame(&mut frames, &rest[..max]);
                rest = &rest[max..];
            }
            // Terminal chunk, empty when the payload is an exact multiple.
            self.push_frame(&mut frames, rest);
        } else if payload.len() >= NEW_MAX_THREE_BYTES {
            self.pool.release(frames);
            return Err(protocol_error(
                "server does not accept packets of 16 MiB or more",
            ));
        } else {
            self.push_frame(&mut frames, payload);
        }

        let result = if self.compress {
            self.write_compressed(&frames)
        } else {
            self.write_wire(&frames)
        };
        self.pool.release(frames);
        result
    }

    fn push_frame(&mut self, out: &mut Vec<u8>, chunk: &[u8]) {
        let header = PacketHeader {
            payload_length: chunk.len() as u32,
            sequence_id: self.sequence,
        };
        tracing::trace!(length = chunk.len(), sequence = self.sequence, "send packet");
        self.sequence = self.sequence.wrapping_add(1);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(chunk);
    }

    fn write_compressed(&mut self, frames: &[u8]) -> Result<()> {
        let mut out = Vec::with_capacity(frames.len() + HEADER_LENGTH + COMP_HEADER_LENGTH);
        for piece in frames.chunks(NEW_MAX_THREE_BYTES) {
            let deflated = if piece.len() >= MIN_COMPRESS_LEN {
                deflate(piece)?.filter(|d| d.len() < piece.len())
            } else {
                None
            };
            let sequence = self.compressed_sequence;
            self.compressed_sequence = sequence.wrapping_add(1);
            match deflated {
                Some(body) => {
                    put_u24(&mut out, body.len());
                    out.push(sequence);
                    put_u24(&mut out, piece.len());
                    out.extend_from_slice(&body);
                }
                None => {
                    put_u24(&mut out, piece.len());
                    out.push(sequence);
                    put_u24(&mut out, 0);
                    out.extend_from_slice(piece);
                }
            }
        }
        self.write_wire(&out)
    }

    fn write_wire(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .and_then(|()| self.stream.flush())
            .map_err(|e| io_failure("write", e))
    }

    fn read_header(&mut self) -> Result<PacketHeader> {
        self.ensure_logical(HEADER_LENGTH)?;
        let bytes = self.logical().take_array::<4>();
        let header = PacketHeader::from_bytes(&bytes);
        if self.compress {
            // The compressed layer carries the checked sequence.
            self.sequence = header.sequence_id.wrapping_add(1);
        } else {
            self.check_sequence(header.sequence_id, false)?;
        }
        Ok(header)
    }

    fn check_sequence(&mut self, received: u8, compressed: bool) -> Result<()> {
        let expected = if compressed {
            &mut self.compressed_sequence
        } else {
            &mut self.sequence
        };
        if received != *expected {
            return Err(communications_failure(
                format!(
                    "Packets out of order, expected packet # {}, but received packet # {}",
                    expected, received
                ),
                None,
            ));
        }
        *expected = expected.wrapping_add(1);
        Ok(())
    }

    fn logical(&mut self) -> &mut InBuf {
        if self.compress {
            &mut self.inflated
        } else {
            &mut self.wire
        }
    }

    fn ensure_logical(&mut self, n: usize) -> Result<()> {
        if self.compress {
            while self.inflated.available() < n {
                self.read_compressed_frame()?;
            }
            Ok(())
        } else {
            self.fill_wire(n)
        }
    }

    fn read_logical(&mut self, n: usize, out: &mut Vec<u8>) -> Result<()> {
        self.ensure_logical(n)?;
        self.logical().take_into(n, out);
        Ok(())
    }

    fn read_compressed_frame(&mut self) -> Result<()> {
        self.fill_wire(HEADER_LENGTH + COMP_HEADER_LENGTH)?;
        let header = self.wire.take_array::<7>();
        let body_len = u24(&header[0..3]);
        let raw_len = u24(&header[4..7]);
        self.check_sequence(header[3], true)?;
        self.fill_wire(body_len)?;
        self.inflated.compact();

        if raw_len == 0 {
            self.wire.take_into(body_len, &mut self.inflated.data);
            return Ok(());
        }

        let start = self.inflated.data.len();
        let body = &self.wire.data[self.wire.pos..self.wire.pos + body_len];
        // One byte past the announced size is enough to detect an oversized frame.
        ZlibDecoder::new(body)
            .take(raw_len as u64 + 1)
            .read_to_end(&mut self.inflated.data)
            .map_err(|e| communications_failure("failed to inflate compressed packet", Some(e)))?;
        self.wire.pos += body_len;

        let inflated = self.inflated.data.len() - start;
        if inflated != raw_len {
            return Err(protocol_error(format!(
                "compressed packet inflated to {} bytes, header announced {}",
                inflated, raw_len
            )));
        }
        Ok(())
    }

    fn fill_wire(&mut self, n: usize) -> Result<()> {
        while self.wire.available() < n {
            self.wire.compact();
            let start = self.wire.data.len();
            let want = (n - start).max(READ_CHUNK);
            self.wire.data.resize(start + want, 0);
            match self.stream.read(&mut self.wire.data[start..]) {
                Ok(0) => {
                    self.wire.data.truncate(start);
                    return Err(communications_failure(
                        format!(
                            "Can not read response from server. Expected to read {} bytes, read {} bytes before connection was unexpectedly lost.",
                            n, start
                        ),
                        None,
                    ));
                }
                Ok(read) => self.wire.data.truncate(start + read),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.wire.data.truncate(start);
                }
                Err(e) => {
                    self.wire.data.truncate(start);
                    return Err(io_failure("read", e));
                }
            }
        }
        Ok(())
    }
}

fn deflate(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .and_then(|()| encoder.finish())
        .map(Some)
        .map_err(|e| protocol_error(format!("failed to deflate packet: {}", e)))
}

fn io_failure(op: &str, err: io::Error) -> Error {
    let message = match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => format!("{} timed out", op),
        _ => format!("{} failed: {}", op, err),
    };
    communications_failure(message, Some(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reads from a fixed script and records everything written.
    #[derive(Debug, Default)]
    struct Loopback {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Loopback {
        fn with_input(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
            }
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Channel for Loopback {}

    fn small_chunks(transport: &mut PacketTransport<Loopback>, max: usize, new_large: bool) {
        transport.configure_framing(max, true, new_large);
        transport.set_max_allowed_packet(1 << 20);
    }

    /// Feed what one transport wrote into a fresh reader with the same framing.
    fn reread(written: Vec<u8>, max: usize, compress: bool) -> PacketTransport<Loopback> {
        let mut reader = PacketTransport::new(Loopback::with_input(written));
        small_chunks(&mut reader, max, true);
        reader.set_compression(compress);
        reader
    }

    #[test]
    fn test_split_and_reassemble_all_sizes() {
        let max = 8;
        for n in 0..=40 {
            let payload: Vec<u8> = (0..n).map(|i| i as u8).collect();
            let mut writer = PacketTransport::new(Loopback::default());
            small_chunks(&mut writer, max, true);
            writer.send_packet(&payload).unwrap();

            let frames = writer.stream_mut().output.clone();
            let expected_frames = n / max + 1;
            assert_eq!(frames.len(), n + expected_frames * HEADER_LENGTH, "size {n}");

            let mut reader = reread(frames, max, false);
            assert_eq!(reader.read_packet().unwrap(), payload, "size {n}");
        }
    }

    #[test]
    fn test_exact_multiple_ends_with_empty_chunk() {
        let mut writer = PacketTransport::new(Loopback::default());
        small_chunks(&mut writer, 4, true);
        writer.send_packet(b"abcdefgh").unwrap();
        let out = &writer.stream_mut().output;
        assert_eq!(&out[0..4], &[4, 0, 0, 0]);
        assert_eq!(&out[8..12], &[4, 0, 0, 1]);
        assert_eq!(&out[16..20], &[0, 0, 0, 2]);
        assert_eq!(out.len(), 20);
    }

    #[test]
    fn test_sequence_mismatch_is_communications_failure() {
        let input = vec![1, 0, 0, 5, 0x00];
        let mut transport = PacketTransport::new(Loopback::with_input(input));
        let err = transport.read_packet().unwrap_err();
        assert!(err.is_communications_failure());
        assert!(err.to_string().contains("expected packet # 0"));
    }

    #[test]
    fn test_split_chunk_out_of_order() {
        let mut input = vec![4, 0, 0, 0, b'a', b'b', b'c', b'd'];
        input.extend_from_slice(&[1, 0, 0, 3, b'e']);
        let mut transport = PacketTransport::new(Loopback::with_input(input));
        small_chunks(&mut transport, 4, true);
        assert!(transport.read_packet().unwrap_err().is_communications_failure());
    }

    #[test]
    fn test_legacy_marker_terminates_split() {
        let mut input = vec![4, 0, 0, 0, b'a', b'b', b'c', b'd'];
        input.extend_from_slice(&[1, 0, 0, 1, 0xEE]);
        input.extend_from_slice(&[2, 0, 0, 2, b'o', b'k']);
        let mut transport = PacketTransport::new(Loopback::with_input(input));
        small_chunks(&mut transport, 4, false);
        assert_eq!(transport.read_packet().unwrap(), b"abcd");
        assert_eq!(transport.read_packet().unwrap(), b"ok");
    }

    #[test]
    fn test_short_read_is_communications_failure() {
        let mut transport = PacketTransport::new(Loopback::with_input(vec![10, 0, 0, 0, 1, 2]));
        let err = transport.read_packet().unwrap_err();
        assert!(err.is_communications_failure());
    }

    #[test]
    fn test_too_big_packet_is_rejected_before_sending() {
        let mut transport = PacketTransport::new(Loopback::default());
        transport.set_max_allowed_packet(16);
        let err = transport.send_packet(&[0u8; 17]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(transport.stream_mut().output.is_empty());
        transport.send_packet(&[0u8; 16]).unwrap();
        assert_eq!(transport.stream_mut().output.len(), 20);
    }

    #[test]
    fn test_compressed_roundtrip_small_and_large() {
        let small = b"SELECT 1".to_vec();
        let large = b"SELECT * FROM t WHERE name = 'aaaaaaaaaaaaaaaaaaaaaaaaaaaa' ".repeat(8);

        let mut writer = PacketTransport::new(Loopback::default());
        writer.set_compression(true);
        writer.send_packet(&small).unwrap();
        writer.send_packet(&large).unwrap();
        let wire = writer.stream_mut().output.clone();

        // First frame stays raw: uncompressed-length field is zero.
        assert_eq!(&wire[4..7], &[0, 0, 0]);
        assert_eq!(u24(&wire[0..3]), small.len() + HEADER_LENGTH);

        let mut reader = PacketTransport::new(Loopback::with_input(wire));
        reader.set_compression(true);
        assert_eq!(reader.read_packet().unwrap(), small);
        assert_eq!(reader.read_packet().unwrap(), large);
    }

    #[test]
    fn test_compressed_split_roundtrip() {
        let payload: Vec<u8> = (0..200u32).map(|i| (i % 7) as u8).collect();
        let mut writer = PacketTransport::new(Loopback::default());
        small_chunks(&mut writer, 64, true);
        writer.set_compression(true);
        writer.send_packet(&payload).unwrap();
        let mut reader = reread(writer.stream_mut().output.clone(), 64, true);
        assert_eq!(reader.read_packet().unwrap(), payload);
    }

    #[test]
    fn test_compressed_sequence_is_checked() {
        let mut frame = Vec::new();
        put_u24(&mut frame, 5);
        frame.push(3);
        put_u24(&mut frame, 0);
        frame.extend_from_slice(&[1, 0, 0, 0, 0x00]);
        let mut reader = PacketTransport::new(Loopback::with_input(frame));
        reader.set_compression(true);
        assert!(reader.read_packet().unwrap_err().is_communications_failure());
    }

    #[test]
    fn test_compressed_frame_larger_than_announced_is_rejected() {
        let payload = vec![0u8; 64 * 1024];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        let body = encoder.finish().unwrap();

        let mut frame = Vec::new();
        put_u24(&mut frame, body.len());
        frame.push(0);
        put_u24(&mut frame, 16);
        frame.extend_from_slice(&body);
        let mut reader = PacketTransport::new(Loopback::with_input(frame));
        reader.set_compression(true);
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        // Inflation stopped at the announced size plus one byte.
        assert!(reader.inflated.data.len() <= 17);
    }

    #[test]
    fn test_reset_and_clear_input() {
        let input = vec![1, 0, 0, 0, 0xAA, 1, 0, 0, 1, 0xBB];
        let mut transport = PacketTransport::new(Loopback::with_input(input));
        assert_eq!(transport.read_packet().unwrap(), vec![0xAA]);
        // The second frame was pulled in by the same read and is now stale.
        transport.clear_input();
        transport.reset_sequence();
        assert_eq!(transport.sequence(), 0);
        assert!(transport.read_packet().unwrap_err().is_communications_failure());
    }

    #[test]
    fn test_random_payloads_roundtrip() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let len = rng.gen_range(0..300);
            let payload: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
            let mut writer = PacketTransport::new(Loopback::default());
            small_chunks(&mut writer, 32, true);
            writer.set_compression(rng.gen_bool(0.5));
            let compress = writer.is_compressed();
            writer.send_packet(&payload).unwrap();
            let mut reader = reread(writer.stream_mut().output.clone(), 32, compress);
            assert_eq!(reader.read_packet().unwrap(), payload);
        }
    }
}
