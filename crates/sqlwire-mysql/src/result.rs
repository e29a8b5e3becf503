//! Result decoding: update counts, row sets, streaming rows, LOCAL INFILE.
//!
//! A response is read as
//!
//! ```text
//! header -> update result | LOCAL INFILE request | N field packets, EOF
//!        -> rows until EOF
//! ```
//!
//! and repeated while the server reports more results and the session
//! negotiated multi-results. Buffered results chain through
//! [`ResultSet::next`]; streaming results must be single.

#![allow(clippy::cast_possible_truncation)]

use std::fs::File;
use std::io::{self, Read};
use std::sync::Arc;

use sqlwire_core::error::StreamingErrorKind;
use sqlwire_core::{ColumnInfo, Error, Result, Row};

use crate::connection::{ConnectionState, MySqlConnection};
use crate::errors::{config_error, protocol_error, streaming_error, truncated, unexpected_packet};
use crate::protocol::{PacketReader, PacketType};
use crate::transport::{Channel, Socket};
use crate::types::{ColumnDef, decode_binary_row, decode_text_row, parse_column_def};

/// Row encoding of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    /// Text protocol (COM_QUERY)
    Text,
    /// Binary protocol (COM_EXECUTE)
    Binary,
}

/// Outcome of a statement that returned no rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    /// Server info message, e.g. `Records: 3  Duplicates: 0  Warnings: 0`
    pub info: String,
    pub warnings: u16,
}

/// Buffered rows plus their field descriptors.
#[derive(Debug, Clone)]
pub struct RowSet {
    pub columns: Arc<[ColumnDef]>,
    pub rows: Vec<Row>,
}

/// One result of a command.
#[derive(Debug, Clone)]
pub enum ResultKind {
    UpdateCount(UpdateResult),
    Rows(RowSet),
}

/// A result with the results that followed it.
#[derive(Debug, Clone)]
pub struct ResultSet {
    pub kind: ResultKind,
    next: Option<Box<ResultSet>>,
}

impl ResultSet {
    pub fn is_update(&self) -> bool {
        matches!(self.kind, ResultKind::UpdateCount(_))
    }

    pub fn update(&self) -> Option<&UpdateResult> {
        match &self.kind {
            ResultKind::UpdateCount(update) => Some(update),
            ResultKind::Rows(_) => None,
        }
    }

    pub fn affected_rows(&self) -> u64 {
        self.update().map_or(0, |u| u.affected_rows)
    }

    pub fn last_insert_id(&self) -> u64 {
        self.update().map_or(0, |u| u.last_insert_id)
    }

    /// Rows of this result; empty for an update result.
    pub fn rows(&self) -> &[Row] {
        match &self.kind {
            ResultKind::Rows(set) => &set.rows,
            ResultKind::UpdateCount(_) => &[],
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        match &self.kind {
            ResultKind::Rows(set) => &set.columns,
            ResultKind::UpdateCount(_) => &[],
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self.kind {
            ResultKind::Rows(set) => set.rows,
            ResultKind::UpdateCount(_) => Vec::new(),
        }
    }

    /// The result that followed this one in a multi-result response.
    pub fn next(&self) -> Option<&ResultSet> {
        self.next.as_deref()
    }

    pub fn take_next(&mut self) -> Option<ResultSet> {
        self.next.take().map(|next| *next)
    }

    /// This result and every result chained after it.
    pub fn iter(&self) -> impl Iterator<Item = &ResultSet> {
        std::iter::successors(Some(self), |r| r.next())
    }
}

/// Largest LOCAL INFILE chunk for a given `max_allowed_packet`.
pub fn local_infile_chunk(max_allowed_packet: usize) -> usize {
    const ALIGNED_MIB: usize = 1 << 20;
    (ALIGNED_MIB - 12).min(max_allowed_packet.saturating_sub(12)).max(1)
}

/// Read until `buf` is full or the file ends.
fn fill_chunk(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn is_row_terminator(packet: &[u8]) -> bool {
    packet.first() == Some(&0xFE) && packet.len() < 9
}

fn column_info(columns: &[ColumnDef]) -> Arc<ColumnInfo> {
    Arc::new(ColumnInfo::new(columns.iter().map(|c| c.name.clone()).collect()))
}

impl<S: Channel> MySqlConnection<S> {
    /// Parse an update result and absorb its status and warnings.
    pub(crate) fn parse_update(&mut self, packet: &[u8]) -> Result<UpdateResult> {
        let flags = self.negotiated.flags;
        let ok = PacketReader::new(packet)
            .parse_ok_packet(flags.new_update_counts, flags.use_41_extensions)
            .ok_or_else(|| truncated("update result"))?;
        if let Some(status) = ok.status_flags {
            self.server_status = status;
        }
        self.note_warnings(ok.warnings);
        Ok(UpdateResult {
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            info: ok.info,
            warnings: ok.warnings,
        })
    }

    /// Read `count` field packets and the EOF that ends them.
    pub(crate) fn read_column_defs(&mut self, count: usize) -> Result<Vec<ColumnDef>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            let packet = self.read_checked(None)?;
            columns.push(parse_column_def(&packet, &self.negotiated.flags)?);
            self.transport.recycle(packet);
        }
        let eof = self.read_checked(None)?;
        if !is_row_terminator(&eof) {
            return Err(unexpected_packet("end of field list", &eof));
        }
        self.transport.recycle(eof);
        Ok(columns)
    }

    /// Apply the trailer that ends a row stream.
    fn finish_rows(&mut self, eof: Vec<u8>) {
        if self.negotiated.flags.use_41_extensions {
            if let Some(trailer) = PacketReader::new(&eof).parse_eof_packet() {
                self.note_warnings(trailer.warnings);
                self.server_status = trailer.status_flags;
            }
        }
        self.transport.recycle(eof);
    }

    /// Read one row; `None` once the terminator was consumed.
    pub(crate) fn read_row(
        &mut self,
        columns: &[ColumnDef],
        info: &Arc<ColumnInfo>,
        format: RowFormat,
        sql: Option<&str>,
    ) -> Result<Option<Row>> {
        let packet = self.read_packet()?;
        if is_row_terminator(&packet) {
            self.finish_rows(packet);
            return Ok(None);
        }
        if packet.first() == Some(&0xFF) {
            return self.fail_with(packet, sql);
        }
        let zero_dates = self.config.zero_date_behavior;
        let values = match format {
            RowFormat::Text => decode_text_row(&packet, columns, zero_dates),
            RowFormat::Binary => decode_binary_row(&packet, columns, zero_dates),
        };
        self.transport.recycle(packet);
        Ok(Some(Row::with_columns(Arc::clone(info), values?)))
    }

    /// Serve a LOCAL INFILE request.
    ///
    /// The file goes out in chunks followed by an empty packet. When the
    /// file cannot be read the empty packet is still sent and the server's
    /// reply consumed before failing.
    fn send_local_file(&mut self, file_name: &str, sql: Option<&str>) -> Result<UpdateResult> {
        let opened = if self.config.allow_local_infile {
            File::open(file_name).map_err(|e| local_file_error(file_name, &e))
        } else {
            Err(config_error(
                "server requested LOAD DATA LOCAL INFILE but allow_local_infile is disabled",
            ))
        };

        let mut failure = None;
        match opened {
            Ok(mut file) => {
                let chunk = local_infile_chunk(self.transport.max_allowed_packet());
                let mut buf = vec![0u8; chunk];
                let mut sent = 0usize;
                loop {
                    match fill_chunk(&mut file, &mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            self.send_packet(&buf[..n])?;
                            sent += n;
                        }
                        Err(e) => {
                            failure = Some(local_file_error(file_name, &e));
                            break;
                        }
                    }
                }
                tracing::debug!(file = file_name, bytes = sent, chunk, "sent LOCAL INFILE data");
            }
            Err(e) => failure = Some(e),
        }

        self.send_packet(&[])?;
        let reply = self.read_packet()?;
        if let Some(err) = failure {
            self.transport.recycle(reply);
            self.transport.clear_input();
            return Err(err);
        }
        match PacketType::classify(&reply) {
            PacketType::Error => self.fail_with(reply, sql),
            PacketType::Ok => {
                let update = self.parse_update(&reply)?;
                self.transport.recycle(reply);
                Ok(update)
            }
            _ => Err(unexpected_packet("LOCAL INFILE reply", &reply)),
        }
    }

    /// Decode the header of a result and return the column list, or the
    /// update result when the result carries no rows.
    fn read_header(&mut self, header: Vec<u8>, sql: Option<&str>) -> Result<Header> {
        match PacketType::classify(&header) {
            PacketType::Ok => {
                let update = self.parse_update(&header)?;
                self.transport.recycle(header);
                Ok(Header::Update(update))
            }
            PacketType::Error => self.fail_with(header, sql),
            PacketType::LocalInfile => {
                let file_name = String::from_utf8_lossy(&header[1..]).into_owned();
                self.transport.recycle(header);
                tracing::debug!(file = %file_name, "server requested LOCAL INFILE");
                Ok(Header::Update(self.send_local_file(&file_name, sql)?))
            }
            PacketType::Eof | PacketType::Data => {
                let count = PacketReader::new(&header)
                    .read_lenenc_int()
                    .ok_or_else(|| truncated("column count"))?;
                self.transport.recycle(header);
                let count = usize::try_from(count)
                    .map_err(|_| protocol_error(format!("invalid column count {}", count)))?;
                Ok(Header::Columns(self.read_column_defs(count)?.into()))
            }
        }
    }

    /// Read a whole response into a chain of buffered results.
    pub(crate) fn read_results(&mut self, first: Vec<u8>, format: RowFormat, sql: &str) -> Result<ResultSet> {
        let mut results = Vec::new();
        let mut packet = first;
        loop {
            let kind = match self.read_header(packet, Some(sql))? {
                Header::Update(update) => ResultKind::UpdateCount(update),
                Header::Columns(columns) => ResultKind::Rows(self.read_row_set(columns, format, sql)?),
            };
            results.push(kind);
            if !self.more_results() {
                break;
            }
            tracing::debug!(index = results.len(), "reading chained result");
            packet = self.read_checked(Some(sql))?;
        }

        results
            .into_iter()
            .rev()
            .fold(None, |next, kind| {
                Some(ResultSet {
                    kind,
                    next: next.map(Box::new),
                })
            })
            .ok_or_else(|| protocol_error("response carried no result"))
    }

    fn read_row_set(&mut self, columns: Arc<[ColumnDef]>, format: RowFormat, sql: &str) -> Result<RowSet> {
        let info = column_info(&columns);
        let cap = self.max_rows;
        let mut rows = Vec::new();
        let mut discarded = 0usize;
        while let Some(row) = self.read_row(&columns, &info, format, Some(sql))? {
            if cap.is_some_and(|cap| rows.len() >= cap) {
                discarded += 1;
            } else {
                rows.push(row);
            }
        }
        if discarded > 0 {
            tracing::debug!(kept = rows.len(), discarded, "row cap reached");
        }
        Ok(RowSet { columns, rows })
    }

    /// Start streaming the response whose header is `first`.
    pub(crate) fn open_stream(&mut self, first: Vec<u8>, format: RowFormat, sql: &str) -> Result<RowStream<'_, S>> {
        let header = self.read_header(first, Some(sql))?;
        let (columns, update) = match header {
            Header::Columns(columns) => (columns, None),
            Header::Update(update) => {
                if self.more_results() {
                    self.transport.clear_input();
                    return Err(multiple_results());
                }
                self.finish_command();
                (Vec::<ColumnDef>::new().into(), Some(update))
            }
        };
        let done = update.is_some();
        if !done {
            self.state = ConnectionState::Streaming;
        }
        Ok(RowStream {
            info: column_info(&columns),
            columns,
            format,
            update,
            done,
            delivered: 0,
            sql: sql.to_string(),
            conn: self,
        })
    }

    /// Skip rows up to and including the terminator.
    fn skip_rows(&mut self) -> Result<()> {
        loop {
            let packet = self.read_packet()?;
            if is_row_terminator(&packet) {
                self.finish_rows(packet);
                return Ok(());
            }
            if packet.first() == Some(&0xFF) {
                return self.fail_with(packet, None);
            }
            self.transport.recycle(packet);
        }
    }

    /// Read the rest of an abandoned stream and any results chained after it.
    pub(crate) fn drain_outstanding(&mut self) -> Result<()> {
        self.state = ConnectionState::Ready;
        self.skip_rows()?;
        while self.more_results() {
            let packet = self.read_checked(None)?;
            if let Header::Columns(_) = self.read_header(packet, None)? {
                self.skip_rows()?;
            }
        }
        self.finish_command();
        Ok(())
    }
}

enum Header {
    Update(UpdateResult),
    Columns(Arc<[ColumnDef]>),
}

fn local_file_error(file_name: &str, err: &io::Error) -> Error {
    Error::Io(io::Error::new(
        err.kind(),
        format!("unable to read '{}' for LOAD DATA LOCAL INFILE: {}", file_name, err),
    ))
}

fn multiple_results() -> Error {
    streaming_error(
        StreamingErrorKind::MultipleResults,
        "a streaming query produced more than one result set",
    )
}

/// Rows pulled from the wire one packet at a time.
///
/// The stream borrows its connection, so no other command can be issued
/// while it is alive. Dropping it before the end leaves the connection in
/// [`ConnectionState::Streaming`]: the next command fails unless
/// `clobber_streaming_results` is set, or the rest is read with
/// [`MySqlConnection::close_streaming_result`].
pub struct RowStream<'c, S: Channel = Socket> {
    conn: &'c mut MySqlConnection<S>,
    columns: Arc<[ColumnDef]>,
    info: Arc<ColumnInfo>,
    format: RowFormat,
    update: Option<UpdateResult>,
    done: bool,
    delivered: usize,
    sql: String,
}

impl<S: Channel> std::fmt::Debug for RowStream<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.columns.len())
            .field("format", &self.format)
            .field("done", &self.done)
            .field("delivered", &self.delivered)
            .finish_non_exhaustive()
    }
}

impl<S: Channel> RowStream<'_, S> {
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Set when the statement produced no rows at all.
    pub fn update(&self) -> Option<&UpdateResult> {
        self.update.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Read and discard the remaining rows.
    pub fn close(mut self) -> Result<()> {
        for row in self.by_ref() {
            row?;
        }
        Ok(())
    }

    fn end(&mut self) -> Option<Result<Row>> {
        self.done = true;
        self.conn.state = ConnectionState::Ready;
        if self.conn.more_results() {
            self.conn.transport.clear_input();
            return Some(Err(multiple_results()));
        }
        self.conn.finish_command();
        None
    }
}

impl<S: Channel> Iterator for RowStream<'_, S> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.conn.read_row(&self.columns, &self.info, self.format, Some(&self.sql)) {
                Ok(Some(row)) => {
                    if self.conn.max_rows.is_some_and(|cap| self.delivered >= cap) {
                        continue;
                    }
                    self.delivered += 1;
                    return Some(Ok(row));
                }
                Ok(None) => return self.end(),
                Err(e) => {
                    self.done = true;
                    if self.conn.state == ConnectionState::Streaming {
                        self.conn.state = ConnectionState::Ready;
                    }
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MySqlConfig;
    use crate::connection::tests::{ScriptedServer, connect, connect_with, err_packet, ok_packet};
    use crate::protocol::PacketWriter;
    use crate::protocol::server_status::SERVER_MORE_RESULTS_EXISTS;
    use crate::types::{FieldType, column_flags};
    use sqlwire_core::Value;

    fn field(name: &str, field_type: FieldType, flags: u16) -> Vec<u8> {
        let mut w = PacketWriter::new();
        for s in ["def", "test", "t", "t", name, name] {
            w.write_lenenc_string(s);
        }
        w.write_u8(0x0C);
        w.write_u16_le(33);
        w.write_u32_le(11);
        w.write_u8(field_type as u8);
        w.write_u16_le(flags);
        w.write_u8(0);
        w.into_bytes()
    }

    fn eof(status: u16, warnings: u16) -> Vec<u8> {
        let mut p = vec![0xFE];
        p.extend_from_slice(&warnings.to_le_bytes());
        p.extend_from_slice(&status.to_le_bytes());
        p
    }

    fn text_row(values: &[Option<&str>]) -> Vec<u8> {
        let mut w = PacketWriter::new();
        for v in values {
            match v {
                Some(s) => w.write_lenenc_string(s),
                None => w.write_u8(0xFB),
            }
        }
        w.into_bytes()
    }

    /// id INT, name VARCHAR with the given rows, ending with `status`.
    fn two_column_result(first_seq: u8, rows: &[[Option<&str>; 2]], status: u16) -> Vec<(u8, Vec<u8>)> {
        let mut seq = first_seq;
        let mut next = || {
            let s = seq;
            seq = seq.wrapping_add(1);
            s
        };
        let mut packets = vec![
            (next(), vec![2]),
            (next(), field("id", FieldType::Long, column_flags::NOT_NULL)),
            (next(), field("name", FieldType::VarString, 0)),
            (next(), eof(2, 0)),
        ];
        for row in rows {
            packets.push((next(), text_row(row)));
        }
        packets.push((next(), eof(status, 0)));
        packets
    }

    #[test]
    fn test_update_result_and_warning_latch() {
        let mut conn = connect(|s| {
            s.turn(&[(1, ok_packet(3, 2, 2))]);
        });
        let result = conn.execute("UPDATE t SET x = 1").unwrap();
        assert!(result.is_update());
        assert_eq!(result.affected_rows(), 3);
        assert!(result.next().is_none());
        assert!(conn.had_warnings());
        assert_eq!(conn.warning_count(), 2);
    }

    #[test]
    fn test_text_result_set() {
        let mut conn = connect(|s| {
            s.turn(&two_column_result(1, &[[Some("1"), Some("ann")], [Some("2"), None]], 2));
        });
        let rows = conn.query("SELECT id, name FROM t").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_by_name("ID"), Some(&Value::Int(1)));
        assert_eq!(rows[0].get(1), Some(&Value::Text("ann".to_string())));
        assert_eq!(rows[1].get(1), Some(&Value::Null));
        assert!(!conn.had_warnings());
    }

    #[test]
    fn test_more_results_chain() {
        let mut conn = connect(|s| {
            let mut packets = vec![(1, ok_packet(1, 2 | SERVER_MORE_RESULTS_EXISTS, 0))];
            packets.extend(two_column_result(2, &[[Some("7"), Some("x")]], 2));
            s.turn(&packets);
        });
        let result = conn.execute("UPDATE t SET x = 1; SELECT id, name FROM t").unwrap();
        assert_eq!(result.affected_rows(), 1);
        let second = result.next().unwrap();
        assert_eq!(second.rows().len(), 1);
        assert_eq!(second.columns()[1].name, "name");
        assert_eq!(result.iter().count(), 2);
    }

    #[test]
    fn test_error_inside_rows() {
        let mut conn = connect(|s| {
            let mut packets = two_column_result(1, &[[Some("1"), Some("a")]], 2);
            let last = packets.len() - 1;
            packets[last].1 = err_packet(1317, "70100", "Query execution was interrupted");
            s.turn(&packets);
        });
        let err = conn.query("SELECT id, name FROM t").unwrap_err();
        assert_eq!(err.sqlstate(), Some("70100"));
        assert_eq!(err.sql(), Some("SELECT id, name FROM t"));
    }

    #[test]
    fn test_max_rows_discards_surplus() {
        let mut conn = connect(|s| {
            s.turn(&two_column_result(
                1,
                &[[Some("1"), Some("a")], [Some("2"), Some("b")], [Some("3"), Some("c")]],
                2,
            ));
        });
        conn.set_max_rows(Some(2));
        let rows = conn.query("SELECT id, name FROM t").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_streaming_rows() {
        let mut conn = connect(|s| {
            s.turn(&two_column_result(1, &[[Some("1"), Some("a")], [Some("2"), Some("b")]], 2));
            s.turn(&[(1, ok_packet(0, 2, 0))]);
        });
        let mut stream = conn.query_streaming("SELECT id, name FROM t").unwrap();
        assert_eq!(stream.columns().len(), 2);
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.get(0), Some(&Value::Int(1)));
        assert!(stream.next().unwrap().is_ok());
        assert!(stream.next().is_none());
        assert!(stream.is_done());
        drop(stream);
        assert_eq!(conn.state(), ConnectionState::Ready);
        conn.ping().unwrap();
    }

    #[test]
    fn test_abandoned_stream_blocks_next_command() {
        let mut conn = connect(|s| {
            s.turn(&two_column_result(1, &[[Some("1"), Some("a")], [Some("2"), Some("b")]], 2));
        });
        let mut stream = conn.query_streaming("SELECT id, name FROM t").unwrap();
        stream.next().unwrap().unwrap();
        drop(stream);
        assert_eq!(conn.state(), ConnectionState::Streaming);
        let err = conn.ping().unwrap_err();
        assert!(matches!(
            err,
            Error::Streaming(ref s) if s.kind == StreamingErrorKind::Outstanding
        ));
        conn.close_streaming_result().unwrap();
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_clobber_drains_abandoned_stream() {
        let config = MySqlConfig::new().user("app").clobber_streaming_results(true);
        let mut conn = connect_with(config, |s| {
            s.turn(&two_column_result(1, &[[Some("1"), Some("a")], [Some("2"), Some("b")]], 2));
            s.turn(&[(1, ok_packet(0, 2, 0))]);
        })
        .unwrap();
        let mut stream = conn.query_streaming("SELECT id, name FROM t").unwrap();
        stream.next().unwrap().unwrap();
        drop(stream);
        conn.ping().unwrap();
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_streaming_multiple_results_is_error() {
        let mut conn = connect(|s| {
            s.turn(&two_column_result(1, &[[Some("1"), Some("a")]], 2 | SERVER_MORE_RESULTS_EXISTS));
        });
        let mut stream = conn.query_streaming("SELECT 1; SELECT 2").unwrap();
        assert!(stream.next().unwrap().is_ok());
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Streaming(ref s) if s.kind == StreamingErrorKind::MultipleResults
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_streaming_update_has_no_rows() {
        let mut conn = connect(|s| {
            s.turn(&[(1, ok_packet(4, 2, 0))]);
        });
        let mut stream = conn.query_streaming("DELETE FROM t").unwrap();
        assert_eq!(stream.update().map(|u| u.affected_rows), Some(4));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_local_infile_chunk_size() {
        assert_eq!(local_infile_chunk(16 * 1024 * 1024), (1 << 20) - 12);
        assert_eq!(local_infile_chunk(1024), 1012);
    }

    #[test]
    fn test_local_infile_sends_file_then_empty_packet() {
        let dir = std::env::temp_dir().join(format!("sqlwire-infile-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rows.csv");
        std::fs::write(&path, b"1,a\n2,b\n").unwrap();
        let name = path.to_string_lossy().into_owned();

        let config = MySqlConfig::new().user("app").allow_local_infile(true);
        let mut conn = connect_with(config, |s| {
            let mut request = vec![0xFB];
            request.extend_from_slice(name.as_bytes());
            s.turn(&[(1, request)]);
            s.turn(&[(4, ok_packet(2, 2, 0))]);
        })
        .unwrap();
        let start = conn.transport.stream_mut().written.len();
        let result = conn.execute("LOAD DATA LOCAL INFILE 'rows.csv' INTO TABLE t").unwrap();
        assert_eq!(result.affected_rows(), 2);

        let written = conn.transport.stream_mut().written[start..].to_vec();
        // Query (seq 0), file data (seq 2), terminating empty packet (seq 3).
        let query_len = written[0] as usize + 4;
        let data = &written[query_len..];
        assert_eq!(&data[..4], &[8, 0, 0, 2]);
        assert_eq!(&data[4..12], b"1,a\n2,b\n");
        assert_eq!(&data[12..], &[0, 0, 0, 3]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_local_infile_disabled_still_terminates() {
        let mut conn = connect(|s| {
            s.turn(&[(1, b"\xFBdata.csv".to_vec())]);
            s.turn(&[(3, err_packet(1148, "42000", "The used command is not allowed"))]);
        });
        let start = conn.transport.stream_mut().written.len();
        let err = conn.execute("LOAD DATA LOCAL INFILE 'data.csv' INTO TABLE t").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let written = conn.transport.stream_mut().written[start..].to_vec();
        assert!(written.ends_with(&[0, 0, 0, 2]));
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_prepared_statement_binary_rows() {
        let mut conn = connect(|s| {
            // Prepare: 1 param, 1 column.
            let prepare_ok = vec![0x00, 5, 0, 0, 0, 1, 0, 1, 0, 0, 0, 0];
            s.turn(&[
                (1, prepare_ok),
                (2, field("?", FieldType::VarString, 0)),
                (3, eof(2, 0)),
                (4, field("n", FieldType::LongLong, column_flags::UNSIGNED)),
                (5, eof(2, 0)),
            ]);
            // Execute: column count, field, EOF, one binary row, EOF.
            let mut row = vec![0x00, 0x00];
            row.extend_from_slice(&42u64.to_le_bytes());
            s.turn(&[
                (1, vec![1]),
                (2, field("n", FieldType::LongLong, column_flags::UNSIGNED)),
                (3, eof(2, 0)),
                (4, row),
                (5, eof(2, 0)),
            ]);
        });
        let stmt = conn.prepare("SELECT ? + 0 AS n").unwrap();
        assert_eq!(stmt.statement_id, 5);
        assert_eq!(stmt.param_count(), 1);
        assert_eq!(stmt.column_count(), 1);

        let err = conn.execute_prepared(&stmt, &[]).unwrap_err();
        assert_eq!(err.sqlstate(), Some("07001"));

        let result = conn.execute_prepared(&stmt, &[Value::Text("41".to_string())]).unwrap();
        assert_eq!(result.rows()[0].get(0), Some(&Value::BigInt(42)));
    }

    #[test]
    fn test_truncated_field_packet_is_protocol_error() {
        let mut conn = connect(|s: &mut ScriptedServer| {
            s.turn(&[(1, vec![1]), (2, vec![0x03, b'd'])]);
        });
        let err = conn.query("SELECT 1").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
