//! MySQL session: connection setup, command dispatch and session commands.
//!
//! A [`MySqlConnection`] owns one channel to the server and all per-session
//! protocol state: negotiated capabilities, sequence numbers (inside the
//! transport), server status, the warning latch and the outstanding-stream
//! marker. Every operation takes `&mut self`; requests and responses are
//! strictly sequential.
//!
//! Result reading lives in [`crate::result`].

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::net::{TcpStream, ToSocketAddrs};

use sqlwire_core::error::{ConnectionErrorKind, StreamingErrorKind};
use sqlwire_core::{Error, Result, Row, Value};

use crate::auth::{self, Credentials};
use crate::config::MySqlConfig;
use crate::errors::{
    communications_failure, config_error, connection_error, parameter_count_mismatch,
    parse_err_packet, server_error, streaming_error, unexpected_packet,
};
use crate::handshake::{Negotiated, ServerVersion, build_ssl_request, negotiate, parse_greeting};
use crate::pool::BufferPoolStats;
use crate::protocol::prepared::{
    build_execute_payload, build_long_data_payload, build_statement_payload, parse_stmt_prepare_ok,
};
use crate::protocol::{Command, PacketReader, PacketType, PacketWriter, PreparedStatement, server_status};
use crate::result::{ResultSet, RowFormat, RowStream, UpdateResult};
use crate::tls::validate_tls_config;
use crate::transport::{Channel, PacketTransport, Socket, TlsParams};
use crate::types::interpolate_params;

/// Connection state in the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Ready for the next command
    Ready,
    /// A streaming result set has not been read to the end
    Streaming,
    /// The channel failed; no further commands are possible
    Broken,
    /// COM_QUIT was sent
    Closed,
}

/// Argument of a protocol command.
#[derive(Debug, Clone, Copy)]
pub enum CommandPayload<'a> {
    /// Command byte only
    None,
    /// Command byte followed by text (INIT_DB, QUERY, PREPARE, ...)
    Text(&'a str),
    /// Command byte followed by a u32 (PROCESS_KILL)
    Id(u32),
    /// A complete payload, command byte included
    Raw(&'a [u8]),
}

/// A MySQL session over a [`Channel`].
///
/// Use [`MySqlConnection::open`] for TCP (and TLS) connections, or
/// [`MySqlConnection::handshake`] to run the protocol over any stream.
pub struct MySqlConnection<S: Channel = Socket> {
    pub(crate) transport: PacketTransport<S>,
    pub(crate) negotiated: Negotiated,
    pub(crate) config: MySqlConfig,
    pub(crate) state: ConnectionState,
    pub(crate) server_status: u16,
    pub(crate) warning_count: u16,
    pub(crate) had_warnings: bool,
    pub(crate) max_rows: Option<usize>,
    /// Parameters already streamed with COM_LONG_DATA, per statement
    long_data: HashMap<u32, Vec<u16>>,
}

impl<S: Channel> std::fmt::Debug for MySqlConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("state", &self.state)
            .field("thread_id", &self.negotiated.greeting.thread_id)
            .field("server_version", &self.negotiated.greeting.server_version)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

impl MySqlConnection<Socket> {
    /// Connect over TCP and run the handshake.
    ///
    /// Every resolved address is tried in turn with `connect_timeout`.
    pub fn open(config: MySqlConfig) -> Result<Self> {
        validate_tls_config(config.ssl_mode, &config.tls)?;

        let addr = config.socket_addr();
        let candidates = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| connection_error(ConnectionErrorKind::Connect, format!("cannot resolve {}: {}", addr, e)))?;

        let mut last_err = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
                Ok(tcp) => {
                    tcp.set_nodelay(true).map_err(|e| {
                        communications_failure(format!("failed to configure socket: {}", e), Some(e))
                    })?;
                    tracing::debug!(%candidate, "TCP connection established");
                    return Self::handshake(Socket::Tcp(tcp), config);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => connection_error(
                ConnectionErrorKind::Refused,
                format!("connection to {} refused: {}", addr, e),
            ),
            Some(e) => connection_error(
                ConnectionErrorKind::Connect,
                format!("failed to connect to {}: {}", addr, e),
            ),
            None => connection_error(
                ConnectionErrorKind::Connect,
                format!("{} did not resolve to any address", addr),
            ),
        })
    }
}

impl<S: Channel> MySqlConnection<S> {
    /// Run greeting, optional TLS upgrade and authentication over `stream`.
    ///
    /// Compression is switched on only once authentication succeeded. When
    /// the database could not be sent in the handshake it is selected with
    /// INIT_DB afterwards.
    pub fn handshake(mut stream: S, config: MySqlConfig) -> Result<Self> {
        stream
            .set_timeouts(config.read_timeout, config.write_timeout)
            .map_err(|e| communications_failure(format!("failed to set socket timeouts: {}", e), Some(e)))?;
        let mut transport = PacketTransport::new(stream);

        let greeting = parse_greeting(&transport.read_packet()?, &config.version_cutoffs)?;
        let negotiated = negotiate(greeting, &config)?;
        let flags = negotiated.flags;
        transport.configure_framing(flags.max_three_bytes(), flags.split_large_packets, flags.new_large_packets);

        if negotiated.use_ssl {
            transport.send_packet(&build_ssl_request(&negotiated))?;
            let server_name = config.tls.server_name.clone().unwrap_or_else(|| config.host.clone());
            let params = TlsParams {
                mode: config.ssl_mode,
                config: &config.tls,
            };
            transport = transport.upgrade(|s| s.start_tls(&server_name, &params))?;
        }

        auth::authenticate(
            &mut transport,
            &negotiated,
            Credentials {
                user: &config.user,
                password: config.password_str(),
                database: config.database_name(),
            },
        )?;

        if negotiated.use_compression() {
            transport.set_compression(true);
        }
        transport.set_max_allowed_packet(config.max_allowed_packet);
        transport.trim_buffers();

        let mut conn = Self {
            transport,
            server_status: negotiated.greeting.server_status.unwrap_or(0),
            negotiated,
            max_rows: config.max_rows,
            config,
            state: ConnectionState::Ready,
            warning_count: 0,
            had_warnings: false,
            long_data: HashMap::new(),
        };

        if !conn.negotiated.connect_with_db {
            if let Some(db) = conn.config.database_name().map(str::to_string) {
                conn.select_database(&db)?;
            }
        }

        tracing::debug!(
            thread_id = conn.thread_id(),
            server_version = %conn.negotiated.greeting.server_version,
            tls = conn.negotiated.use_ssl,
            compressed = conn.transport.is_compressed(),
            "session ready"
        );
        Ok(conn)
    }

    // ==================== Session state ====================

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &MySqlConfig {
        &self.config
    }

    /// Server thread id for this session (the argument for `kill`).
    pub fn thread_id(&self) -> u32 {
        self.negotiated.greeting.thread_id
    }

    pub fn server_version(&self) -> ServerVersion {
        self.negotiated.greeting.version
    }

    /// Version string as sent by the server, e.g. `5.7.44-log`.
    pub fn server_version_string(&self) -> &str {
        &self.negotiated.greeting.server_version
    }

    pub fn version_meets_minimum(&self, major: u32, minor: u32, subminor: u32) -> bool {
        self.server_version().meets_minimum(major, minor, subminor)
    }

    pub fn is_version(&self, major: u32, minor: u32, subminor: u32) -> bool {
        self.server_version() == ServerVersion::new(major, minor, subminor)
    }

    /// Negotiated client capability flags.
    pub fn capabilities(&self) -> u32 {
        self.negotiated.client_flags
    }

    pub fn server_status(&self) -> u16 {
        self.server_status
    }

    pub fn in_transaction(&self) -> bool {
        self.server_status & server_status::SERVER_STATUS_IN_TRANS != 0
    }

    pub fn autocommit(&self) -> bool {
        self.server_status & server_status::SERVER_STATUS_AUTOCOMMIT != 0
    }

    /// Did the last command report any warnings?
    pub fn had_warnings(&self) -> bool {
        self.had_warnings
    }

    /// Warning count reported by the last command.
    pub fn warning_count(&self) -> u16 {
        self.warning_count
    }

    pub fn is_compressed(&self) -> bool {
        self.transport.is_compressed()
    }

    pub fn is_tls(&self) -> bool {
        self.negotiated.use_ssl
    }

    /// Cap the number of rows kept per result set; `None` removes the cap.
    pub fn set_max_rows(&mut self, max_rows: Option<usize>) {
        self.max_rows = max_rows;
    }

    pub fn buffer_stats(&self) -> BufferPoolStats {
        self.transport.pool_stats()
    }

    pub(crate) fn note_warnings(&mut self, warnings: u16) {
        if warnings > 0 {
            self.had_warnings = true;
        }
        self.warning_count = warnings;
    }

    pub(crate) fn more_results(&self) -> bool {
        self.negotiated.multi_results()
            && self.server_status & server_status::SERVER_MORE_RESULTS_EXISTS != 0
    }

    // ==================== Dispatch ====================

    /// Mark the session broken when the channel itself failed.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_communications_failure() {
                self.state = ConnectionState::Broken;
            }
        }
        result
    }

    pub(crate) fn read_packet(&mut self) -> Result<Vec<u8>> {
        let result = self.transport.read_packet();
        self.track(result)
    }

    pub(crate) fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        let result = self.transport.send_packet(payload);
        self.track(result)
    }

    /// Turn an error packet into a server error, dropping buffered input.
    pub(crate) fn fail_with<T>(&mut self, packet: Vec<u8>, sql: Option<&str>) -> Result<T> {
        self.transport.clear_input();
        let err = parse_err_packet(&packet, self.negotiated.greeting.protocol_version);
        self.transport.recycle(packet);
        Err(server_error(err, sql))
    }

    /// Read a packet and fail if it is an error packet.
    pub(crate) fn read_checked(&mut self, sql: Option<&str>) -> Result<Vec<u8>> {
        let packet = self.read_packet()?;
        if PacketType::classify(&packet) == PacketType::Error {
            return self.fail_with(packet, sql);
        }
        Ok(packet)
    }

    /// Prepare the session for a new command.
    ///
    /// An outstanding streaming result is an error unless
    /// `clobber_streaming_results` is set, in which case it is drained.
    fn begin_command(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Ready => {}
            ConnectionState::Closed => {
                return Err(connection_error(ConnectionErrorKind::Closed, "connection is closed"));
            }
            ConnectionState::Broken => {
                return Err(communications_failure(
                    "connection was lost by an earlier failure",
                    None,
                ));
            }
            ConnectionState::Streaming if self.config.clobber_streaming_results => {
                tracing::warn!("discarding unread rows of a streaming result");
                self.drain_outstanding()?;
            }
            ConnectionState::Streaming => {
                return Err(streaming_error(
                    StreamingErrorKind::Outstanding,
                    "a streaming result set is still open on this connection; \
                     read it to the end or close it before issuing another command",
                ));
            }
        }

        self.transport.reset_sequence();
        self.server_status = 0;
        self.warning_count = 0;
        self.had_warnings = false;
        self.transport.clear_input();
        Ok(())
    }

    /// Send a command without reading a response.
    pub fn write_command(&mut self, command: Command, payload: CommandPayload<'_>) -> Result<()> {
        self.begin_command()?;
        tracing::debug!(?command, "dispatching command");
        match payload {
            CommandPayload::Raw(bytes) => self.send_packet(bytes),
            CommandPayload::None => self.send_packet(&[command as u8]),
            CommandPayload::Text(text) => {
                let mut writer = PacketWriter::with_capacity(1 + text.len());
                writer.write_u8(command as u8);
                writer.write_bytes(text.as_bytes());
                self.send_packet(writer.as_bytes())
            }
            CommandPayload::Id(id) => {
                let mut writer = PacketWriter::command(command);
                writer.write_u32_le(id);
                self.send_packet(writer.as_bytes())
            }
        }
    }

    /// Send a command and return the first response packet.
    ///
    /// Unless `skip_error_check` is set, an error packet becomes a server
    /// error (carrying the SQL for text commands).
    pub fn send_command(
        &mut self,
        command: Command,
        payload: CommandPayload<'_>,
        skip_error_check: bool,
    ) -> Result<Vec<u8>> {
        self.write_command(command, payload)?;
        if skip_error_check {
            return self.read_packet();
        }
        let sql = match payload {
            CommandPayload::Text(text) if command.takes_text() => Some(text),
            _ => None,
        };
        self.read_checked(sql)
    }

    /// Expect an OK packet and absorb its status and warnings.
    fn expect_ok(&mut self, packet: Vec<u8>, what: &str) -> Result<UpdateResult> {
        if PacketType::classify(&packet) != PacketType::Ok {
            return Err(unexpected_packet(what, &packet));
        }
        let update = self.parse_update(&packet)?;
        self.transport.recycle(packet);
        Ok(update)
    }

    /// Clear leftovers and shrink the buffer pool after a command.
    pub(crate) fn finish_command(&mut self) {
        self.transport.clear_input();
        self.transport.trim_buffers();
    }

    // ==================== Queries ====================

    /// Run SQL over the text protocol and read every result it produces.
    pub fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        let first = self.send_command(Command::Query, CommandPayload::Text(sql), false)?;
        let result = self.read_results(first, RowFormat::Text, sql);
        self.finish_command();
        result
    }

    /// Run SQL and return the rows of its first result.
    pub fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        Ok(self.execute(sql)?.into_rows())
    }

    /// Run SQL with `?` placeholders replaced by escaped literals.
    pub fn execute_with(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let expanded = interpolate_params(sql, params);
        self.execute(&expanded)
    }

    /// Run SQL and stream its rows one packet at a time.
    ///
    /// The returned stream borrows the connection. Dropping it before the
    /// end leaves the session marked as streaming; see [`RowStream`].
    pub fn query_streaming(&mut self, sql: &str) -> Result<RowStream<'_, S>> {
        let first = self.send_command(Command::Query, CommandPayload::Text(sql), false)?;
        self.open_stream(first, RowFormat::Text, sql)
    }

    /// Read the rest of an abandoned streaming result.
    pub fn close_streaming_result(&mut self) -> Result<()> {
        if self.state == ConnectionState::Streaming {
            self.drain_outstanding()?;
        }
        Ok(())
    }

    // ==================== Prepared statements ====================

    fn require_41(&self, feature: &str) -> Result<()> {
        if self.negotiated.flags.use_41_extensions {
            Ok(())
        } else {
            Err(config_error(format!(
                "{} need MySQL 4.1 or later (server is {})",
                feature, self.negotiated.greeting.server_version
            )))
        }
    }

    /// Prepare a statement on the server (COM_PREPARE).
    pub fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        self.require_41("prepared statements")?;
        let first = self.send_command(Command::Prepare, CommandPayload::Text(sql), false)?;
        let ok = parse_stmt_prepare_ok(&first)?;
        self.transport.recycle(first);
        self.note_warnings(ok.warnings);

        let params = self.read_column_defs(usize::from(ok.num_params))?;
        let columns = self.read_column_defs(usize::from(ok.num_columns))?;
        self.finish_command();

        tracing::debug!(
            statement_id = ok.statement_id,
            params = ok.num_params,
            columns = ok.num_columns,
            "prepared statement"
        );
        Ok(PreparedStatement::new(ok.statement_id, sql.to_string(), params, columns))
    }

    /// Execute a prepared statement with binary parameters (COM_EXECUTE).
    pub fn execute_prepared(&mut self, stmt: &PreparedStatement, params: &[Value]) -> Result<ResultSet> {
        if params.len() != stmt.param_count() {
            return Err(parameter_count_mismatch(stmt.param_count(), params.len(), &stmt.sql));
        }
        let long_data = self.long_data.remove(&stmt.statement_id).unwrap_or_default();
        let payload = build_execute_payload(stmt.statement_id, params, &long_data);
        let first = self
            .send_command(Command::Execute, CommandPayload::Raw(&payload), false)
            .map_err(|e| with_sql(e, &stmt.sql))?;
        let result = self.read_results(first, RowFormat::Binary, &stmt.sql);
        self.finish_command();
        result
    }

    /// Stream a chunk of data for one parameter (COM_LONG_DATA).
    ///
    /// May be called repeatedly; the chunks are concatenated by the server
    /// and used by the next execute, which then skips that parameter's value.
    pub fn send_long_data(&mut self, stmt: &PreparedStatement, param_index: u16, data: &[u8]) -> Result<()> {
        if usize::from(param_index) >= stmt.param_count() {
            return Err(parameter_count_mismatch(stmt.param_count(), usize::from(param_index) + 1, &stmt.sql));
        }
        let payload = build_long_data_payload(stmt.statement_id, param_index, data);
        self.write_command(Command::LongData, CommandPayload::Raw(&payload))?;
        let marked = self.long_data.entry(stmt.statement_id).or_default();
        if !marked.contains(&param_index) {
            marked.push(param_index);
        }
        Ok(())
    }

    /// Discard long data sent for a statement (COM_RESET_STMT).
    pub fn reset_statement(&mut self, stmt: &PreparedStatement) -> Result<()> {
        let payload = build_statement_payload(Command::ResetStatement, stmt.statement_id);
        let reply = self.send_command(Command::ResetStatement, CommandPayload::Raw(&payload), false)?;
        self.long_data.remove(&stmt.statement_id);
        self.expect_ok(reply, "statement reset")?;
        self.finish_command();
        Ok(())
    }

    /// Deallocate a statement on the server (COM_CLOSE_STATEMENT).
    pub fn close_statement(&mut self, stmt: PreparedStatement) -> Result<()> {
        let payload = build_statement_payload(Command::CloseStatement, stmt.statement_id);
        self.long_data.remove(&stmt.statement_id);
        self.write_command(Command::CloseStatement, CommandPayload::Raw(&payload))
    }

    // ==================== Session commands ====================

    pub fn ping(&mut self) -> Result<()> {
        let reply = self.send_command(Command::Ping, CommandPayload::None, false)?;
        self.expect_ok(reply, "ping reply")?;
        self.finish_command();
        Ok(())
    }

    /// The server's one-line status summary (COM_STATISTICS).
    pub fn statistics(&mut self) -> Result<String> {
        let reply = self.send_command(Command::Statistics, CommandPayload::None, false)?;
        let text = String::from_utf8_lossy(&reply).into_owned();
        self.transport.recycle(reply);
        self.finish_command();
        Ok(text)
    }

    /// Ask the server to kill a thread (COM_PROCESS_KILL).
    pub fn kill(&mut self, thread_id: u32) -> Result<()> {
        let reply = self.send_command(Command::ProcessKill, CommandPayload::Id(thread_id), false)?;
        self.expect_ok(reply, "kill reply")?;
        self.finish_command();
        Ok(())
    }

    /// Make `database` the session default (COM_INIT_DB).
    ///
    /// With `create_database_if_not_exist`, a server error on the first
    /// attempt is followed by `CREATE DATABASE IF NOT EXISTS` and a retry.
    pub fn select_database(&mut self, database: &str) -> Result<()> {
        match self.init_db(database) {
            Err(Error::Query(q)) if self.config.create_database_if_not_exist => {
                tracing::debug!(database, error = %q.message, "creating missing database");
                self.execute(&format!("CREATE DATABASE IF NOT EXISTS {}", quote_identifier(database)))?;
                self.init_db(database)?;
            }
            other => other?,
        }
        self.config.database = Some(database.to_string());
        Ok(())
    }

    fn init_db(&mut self, database: &str) -> Result<()> {
        let reply = self.send_command(Command::InitDb, CommandPayload::Text(database), false)?;
        self.expect_ok(reply, "database selection")?;
        self.finish_command();
        Ok(())
    }

    /// Re-authenticate the session as another user (COM_CHANGE_USER).
    pub fn change_user(&mut self, user: &str, password: &str, database: Option<&str>) -> Result<()> {
        self.begin_command()?;
        tracing::debug!(user, "changing session user");
        let result = auth::change_user(
            &mut self.transport,
            &self.negotiated,
            Credentials {
                user,
                password,
                database,
            },
        );
        self.track(result)?;
        self.finish_command();
        self.long_data.clear();
        self.config.user = user.to_string();
        self.config.password = Some(password.to_string());
        self.config.database = database.map(str::to_string);
        Ok(())
    }

    /// Toggle multi-statement support (COM_SET_OPTION).
    pub fn set_multi_statements(&mut self, enabled: bool) -> Result<()> {
        self.require_41("multi-statement toggling")?;
        let mut writer = PacketWriter::command(Command::SetOption);
        writer.write_u16_le(if enabled { 0 } else { 1 });
        let reply = self.send_command(Command::SetOption, CommandPayload::Raw(writer.as_bytes()), false)?;
        match PacketType::classify(&reply) {
            PacketType::Ok => {
                self.expect_ok(reply, "set option reply")?;
            }
            PacketType::Eof => {
                if let Some(eof) = PacketReader::new(&reply).parse_eof_packet() {
                    self.note_warnings(eof.warnings);
                    self.server_status = eof.status_flags;
                }
                self.transport.recycle(reply);
            }
            _ => return Err(unexpected_packet("set option reply", &reply)),
        }
        self.finish_command();
        Ok(())
    }

    /// Fetch the warnings of the previous command with `SHOW WARNINGS`.
    pub fn fetch_warnings(&mut self) -> Result<Vec<Row>> {
        self.query("SHOW WARNINGS")
    }

    /// Send COM_QUIT and drop the channel.
    pub fn close(mut self) -> Result<()> {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Broken) {
            return Ok(());
        }
        // An unread stream is simply abandoned; the server discards it on quit.
        self.state = ConnectionState::Ready;
        self.write_command(Command::Quit, CommandPayload::None)?;
        self.state = ConnectionState::Closed;
        tracing::debug!(thread_id = self.thread_id(), "connection closed");
        Ok(())
    }
}

fn with_sql(err: Error, sql: &str) -> Error {
    match err {
        Error::Query(q) => Error::Query(q.with_sql(sql)),
        other => other,
    }
}

/// Quote an identifier with backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
