//! End-to-end sessions against an in-memory server that replays scripted
//! replies, one turn per client request.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use sqlwire_core::QueryErrorKind;
use sqlwire_mysql::auth::scramble_323;
use sqlwire_mysql::protocol::PacketWriter;
use sqlwire_mysql::{
    Channel, Command, ConnectionState, Error, FieldType, MySqlConfig, MySqlConnection, Value,
    ZeroDateBehavior,
};

const CLIENT_LONG_PASSWORD: u16 = 1;
const CLIENT_LONG_FLAG: u16 = 4;
const CLIENT_CONNECT_WITH_DB: u16 = 8;
const CLIENT_PROTOCOL_41: u16 = 512;
const CLIENT_TRANSACTIONS: u16 = 8192;
const CLIENT_SECURE_CONNECTION: u16 = 32768;

const MODERN: u16 = CLIENT_LONG_PASSWORD
    | CLIENT_LONG_FLAG
    | CLIENT_CONNECT_WITH_DB
    | CLIENT_PROTOCOL_41
    | CLIENT_TRANSACTIONS
    | CLIENT_SECURE_CONNECTION;
const LEGACY: u16 = CLIENT_LONG_PASSWORD | CLIENT_LONG_FLAG | CLIENT_CONNECT_WITH_DB;

#[derive(Default)]
struct Server {
    turns: VecDeque<Vec<u8>>,
    current: Cursor<Vec<u8>>,
    log: Arc<Mutex<Vec<u8>>>,
}

impl Server {
    fn turn(&mut self, packets: &[(u8, Vec<u8>)]) -> &mut Self {
        let mut bytes = Vec::new();
        for (seq, payload) in packets {
            bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
            bytes.push(*seq);
            bytes.extend_from_slice(payload);
        }
        self.turns.push_back(bytes);
        self
    }
}

impl Read for Server {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.current.position() as usize >= self.current.get_ref().len() {
            match self.turns.pop_front() {
                Some(next) => self.current = Cursor::new(next),
                None => return Ok(0),
            }
        }
        self.current.read(buf)
    }
}

impl Write for Server {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for Server {}

fn greeting(version: &str, capabilities: u16) -> Vec<u8> {
    let seed = b"0123456789abcdefghij";
    let mut w = PacketWriter::new();
    w.write_u8(10);
    w.write_null_string(version);
    w.write_u32_le(7);
    w.write_null_bytes(&seed[..8]);
    w.write_u16_le(capabilities);
    if !version.starts_with("3.") {
        w.write_u8(33);
        w.write_u16_le(2);
        w.write_zeros(13);
        w.write_null_bytes(&seed[8..]);
    }
    w.into_bytes()
}

fn ok(affected: u8, status: u16) -> Vec<u8> {
    let mut p = vec![0x00, affected, 0x00];
    p.extend_from_slice(&status.to_le_bytes());
    p.extend_from_slice(&[0, 0]);
    p
}

fn eof() -> Vec<u8> {
    vec![0xFE, 0, 0, 2, 0]
}

fn field(name: &str, field_type: FieldType, flags: u16) -> Vec<u8> {
    let mut w = PacketWriter::new();
    for s in ["def", "shop", "orders", "orders", name, name] {
        w.write_lenenc_string(s);
    }
    w.write_u8(0x0C);
    w.write_u16_le(33);
    w.write_u32_le(20);
    w.write_u8(field_type as u8);
    w.write_u16_le(flags);
    w.write_u8(0);
    w.into_bytes()
}

fn session(
    version: &str,
    capabilities: u16,
    config: MySqlConfig,
    script: impl FnOnce(&mut Server),
) -> (MySqlConnection<Server>, Arc<Mutex<Vec<u8>>>) {
    let login_ok = if version.starts_with("3.") {
        vec![0x00, 0, 0]
    } else {
        ok(0, 2)
    };
    session_with_login(version, capabilities, config, &[vec![(2, login_ok)]], script)
}

/// Like `session`, with the replies to the login exchange spelled out.
fn session_with_login(
    version: &str,
    capabilities: u16,
    config: MySqlConfig,
    login: &[Vec<(u8, Vec<u8>)>],
    script: impl FnOnce(&mut Server),
) -> (MySqlConnection<Server>, Arc<Mutex<Vec<u8>>>) {
    let mut server = Server::default();
    server.turn(&[(0, greeting(version, capabilities))]);
    for turn in login {
        server.turn(turn);
    }
    script(&mut server);
    let log = Arc::clone(&server.log);
    let conn = MySqlConnection::handshake(server, config).expect("handshake");
    (conn, log)
}

fn modern(script: impl FnOnce(&mut Server)) -> (MySqlConnection<Server>, Arc<Mutex<Vec<u8>>>) {
    session("5.7.44", MODERN, MySqlConfig::new().user("shop").password("pw"), script)
}

#[test]
fn test_login_and_text_query() {
    let (mut conn, _) = modern(|s| {
        let mut created = PacketWriter::new();
        created.write_lenenc_string("17");
        created.write_lenenc_string("2024-02-29 13:45:00");
        s.turn(&[
            (1, vec![2]),
            (2, field("id", FieldType::Long, 1)),
            (3, field("created", FieldType::DateTime, 0)),
            (4, eof()),
            (5, created.into_bytes()),
            (6, eof()),
        ]);
    });

    assert_eq!(conn.thread_id(), 7);
    assert!(conn.version_meets_minimum(5, 7, 0));
    assert_eq!(conn.state(), ConnectionState::Ready);

    let rows = conn.query("SELECT id, created FROM orders").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_by_name("id"), Some(&Value::Int(17)));
    assert!(matches!(rows[0].get(1), Some(Value::Timestamp(_))));
    assert!(conn.autocommit());
}

#[test]
fn test_duplicate_key_error() {
    let (mut conn, _) = modern(|s| {
        let mut err = vec![0xFF];
        err.extend_from_slice(&1062u16.to_le_bytes());
        err.extend_from_slice(b"#23000Duplicate entry '1' for key 'PRIMARY'");
        s.turn(&[(1, err)]);
        s.turn(&[(1, ok(1, 2))]);
    });

    let err = conn.execute("INSERT INTO orders (id) VALUES (1)").unwrap_err();
    assert!(err.is_duplicate_key());
    assert_eq!(err.vendor_code(), Some(1062));
    assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::Constraint));

    // The session stays usable after a server error.
    let result = conn.execute("INSERT INTO orders (id) VALUES (2)").unwrap();
    assert_eq!(result.affected_rows(), 1);
}

#[test]
fn test_prepared_statement_with_long_data() {
    let (mut conn, log) = modern(|s| {
        s.turn(&[
            (1, vec![0x00, 3, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0]),
            (2, field("?", FieldType::VarString, 0)),
            (3, field("?", FieldType::Long, 0)),
            (4, eof()),
        ]);
        s.turn(&[(1, ok(1, 2))]);
    });

    let stmt = conn.prepare("UPDATE orders SET note = ? WHERE id = ?").unwrap();
    assert_eq!(stmt.param_count(), 2);
    assert_eq!(stmt.column_count(), 0);

    conn.send_long_data(&stmt, 0, b"a long note").unwrap();
    let mark = log.lock().unwrap().len();
    let result = conn
        .execute_prepared(&stmt, &[Value::Text(String::new()), Value::Int(9)])
        .unwrap();
    assert_eq!(result.affected_rows(), 1);

    let written = log.lock().unwrap()[mark..].to_vec();
    // Header, command, id, flags, iterations, bitmap, bound flag, 2 type pairs, then only the INT.
    assert_eq!(written[3], 0);
    assert_eq!(written[4], Command::Execute as u8);
    assert_eq!(&written[5..9], &[3, 0, 0, 0]);
    assert_eq!(&written[written.len() - 4..], &[9, 0, 0, 0]);
    assert_eq!(written.len(), 4 + 10 + 1 + 1 + 4 + 4);

    conn.close_statement(stmt).unwrap();
    let tail = log.lock().unwrap();
    assert_eq!(&tail[tail.len() - 9..], &[5, 0, 0, 0, Command::CloseStatement as u8, 3, 0, 0, 0]);
}

#[test]
fn test_legacy_server_session() {
    let config = MySqlConfig::new()
        .user("old")
        .password("secret")
        .zero_date_behavior(ZeroDateBehavior::ConvertToNull);
    let (mut conn, log) = session("3.23.58", LEGACY, config, |s| {
        let mut field = PacketWriter::new();
        field.write_lenenc_string("t");
        field.write_lenenc_string("d");
        field.write_bytes(&[3, 10, 0, 0]);
        field.write_bytes(&[1, FieldType::Date as u8]);
        field.write_bytes(&[3, 0, 0, 0]);
        let mut row = PacketWriter::new();
        row.write_lenenc_string("0000-00-00");
        s.turn(&[
            (1, vec![1]),
            (2, field.into_bytes()),
            (3, vec![0xFE]),
            (4, row.into_bytes()),
            (5, vec![0xFE]),
        ]);
    });

    assert!(!conn.version_meets_minimum(4, 1, 0));
    // Legacy login: 2-byte client flags, 3-byte max packet, user, 8-char scramble.
    {
        let written = log.lock().unwrap();
        let body = &written[4..];
        assert_eq!(&body[5..9], b"old\0");
        assert_eq!(body[9..].len(), 9);
        assert_eq!(body.last(), Some(&0));
    }

    let rows = conn.query("SELECT d FROM t").unwrap();
    assert_eq!(rows[0].get(0), Some(&Value::Null));
}

#[test]
fn test_streaming_then_ping() {
    let (mut conn, _) = modern(|s| {
        let mut packets = vec![(1, vec![1]), (2, field("n", FieldType::LongLong, 0)), (3, eof())];
        for (i, n) in ["1", "2", "3"].iter().enumerate() {
            let mut row = PacketWriter::new();
            row.write_lenenc_string(n);
            packets.push((4 + i as u8, row.into_bytes()));
        }
        packets.push((7, eof()));
        s.turn(&packets);
        s.turn(&[(1, ok(0, 2))]);
    });

    let total: i64 = conn
        .query_streaming("SELECT n FROM numbers")
        .unwrap()
        .map(|row| row.unwrap().get_as::<i64>(0).unwrap())
        .sum();
    assert_eq!(total, 6);
    assert_eq!(conn.state(), ConnectionState::Ready);
    conn.ping().unwrap();
}

#[test]
fn test_old_password_account_switches_to_legacy_scramble() {
    let (mut conn, log) = session_with_login(
        "5.7.44",
        MODERN,
        MySqlConfig::new().user("old").password("pw"),
        &[vec![(2, vec![0xFE])], vec![(4, ok(0, 2))]],
        |s| {
            s.turn(&[(1, ok(0, 2))]);
        },
    );

    // Sequence 3: the 8-character 3.23 scramble over the first seed part, NUL-terminated.
    let mut expected = vec![9, 0, 0, 3];
    expected.extend_from_slice(&scramble_323(b"01234567", b"pw"));
    expected.push(0);
    assert_eq!(expected.len(), 13);
    assert!(log.lock().unwrap().ends_with(&expected));

    conn.ping().unwrap();
}

#[test]
fn test_410_server_challenge_round_trip() {
    let challenge = vec![
        0x01, 0x02, 0x03, 0x04, 0xe5, 0x95, 0x53, 0x70, 0x15, 0x41, 0x5a, 0x48, 0xc8, 0x11, 0xe9,
        0x14, 0x58, 0x61, 0xaa, 0xfd, 0x12, 0xfc, 0x0e, 0x41, 0x00,
    ];
    let (mut conn, log) = session_with_login(
        "4.1.0",
        MODERN,
        MySqlConfig::new().user("app").password("secret"),
        &[vec![(2, challenge)], vec![(4, ok(0, 2))]],
        |s| {
            s.turn(&[(1, ok(0, 2))]);
        },
    );

    let mut expected = vec![20, 0, 0, 3];
    expected.extend_from_slice(&[
        0x81, 0x8c, 0x9c, 0x7c, 0xcb, 0x77, 0xa7, 0x71, 0x84, 0x22, 0x1b, 0xa5, 0xda, 0x36, 0x3d,
        0x49, 0x12, 0x4a, 0x73, 0x83,
    ]);
    assert!(log.lock().unwrap().ends_with(&expected));

    assert!(conn.is_version(4, 1, 0));
    conn.ping().unwrap();
}
