//! Error packet interpretation and error constructors.
//!
//! Servers speaking protocol 10 send a vendor code and, from 4.1, a
//! `#XXXXX` SQLSTATE prefix on the message. Older servers send only a
//! message, so the SQLSTATE is derived locally from [`SQLSTATE_MAP`].

use sqlwire_core::error::{
    ConfigError, ConnectionError, ConnectionErrorKind, ProtocolError, QueryError, QueryErrorKind,
    StreamingError, StreamingErrorKind,
};
use sqlwire_core::Error;

use crate::protocol::{ErrPacket, PacketReader};

/// Generic SQLSTATE used when nothing more specific is known.
pub const GENERAL_ERROR: &str = "HY000";

/// SQLSTATE for an invalid datetime value.
pub const INVALID_DATETIME: &str = "22007";

/// Vendor error code to SQLSTATE, sorted by code.
pub static SQLSTATE_MAP: &[(u16, &str)] = &[
    (1040, "08004"),
    (1042, "08S01"),
    (1043, "08S01"),
    (1044, "42000"),
    (1045, "28000"),
    (1046, "3D000"),
    (1047, "08S01"),
    (1048, "23000"),
    (1049, "42000"),
    (1050, "42S01"),
    (1051, "42S02"),
    (1052, "23000"),
    (1053, "08S01"),
    (1054, "42S22"),
    (1055, "42000"),
    (1056, "42000"),
    (1057, "42000"),
    (1058, "21S01"),
    (1059, "42000"),
    (1060, "42S21"),
    (1061, "42000"),
    (1062, "23000"),
    (1063, "42000"),
    (1064, "42000"),
    (1065, "42000"),
    (1066, "42000"),
    (1067, "42000"),
    (1068, "42000"),
    (1069, "42000"),
    (1070, "42000"),
    (1071, "42000"),
    (1072, "42000"),
    (1073, "42000"),
    (1074, "42000"),
    (1075, "42000"),
    (1080, "08S01"),
    (1081, "08S01"),
    (1082, "42S12"),
    (1083, "42000"),
    (1084, "42000"),
    (1090, "42000"),
    (1091, "42000"),
    (1101, "42000"),
    (1102, "42000"),
    (1103, "42000"),
    (1104, "42000"),
    (1106, "42000"),
    (1107, "42000"),
    (1109, "42S02"),
    (1110, "42000"),
    (1112, "42000"),
    (1113, "42000"),
    (1115, "42000"),
    (1118, "42000"),
    (1120, "42000"),
    (1121, "42000"),
    (1129, "08004"),
    (1130, "08004"),
    (1131, "42000"),
    (1132, "42000"),
    (1133, "42000"),
    (1136, "21S01"),
    (1138, "42000"),
    (1139, "42000"),
    (1140, "42000"),
    (1141, "42000"),
    (1142, "42000"),
    (1143, "42000"),
    (1144, "42000"),
    (1145, "42000"),
    (1146, "42S02"),
    (1147, "42000"),
    (1148, "42000"),
    (1149, "42000"),
    (1152, "08S01"),
    (1153, "08S01"),
    (1154, "08S01"),
    (1155, "08S01"),
    (1156, "08S01"),
    (1157, "08S01"),
    (1158, "08S01"),
    (1159, "08S01"),
    (1160, "08S01"),
    (1161, "08S01"),
    (1162, "42000"),
    (1163, "42000"),
    (1164, "42000"),
    (1166, "42000"),
    (1167, "42000"),
    (1169, "23000"),
    (1170, "42000"),
    (1171, "42000"),
    (1172, "42000"),
    (1173, "42000"),
    (1177, "42000"),
    (1178, "42000"),
    (1179, "25000"),
    (1184, "08S01"),
    (1189, "08S01"),
    (1190, "08S01"),
    (1203, "42000"),
    (1205, "41000"),
    (1207, "25000"),
    (1211, "42000"),
    (1213, "40001"),
    (1216, "23000"),
    (1217, "23000"),
    (1218, "08S01"),
    (1222, "21000"),
    (1226, "42000"),
    (1227, "42000"),
    (1230, "42000"),
    (1231, "42000"),
    (1232, "42000"),
    (1234, "42000"),
    (1235, "42000"),
    (1239, "42000"),
    (1241, "21000"),
    (1242, "21000"),
    (1247, "42S22"),
    (1248, "42000"),
    (1249, "01000"),
    (1250, "42000"),
    (1251, "08004"),
    (1252, "42000"),
    (1253, "42000"),
    (1261, "01000"),
    (1262, "01000"),
    (1263, "22004"),
    (1264, "22003"),
    (1265, "01000"),
    (1280, "42000"),
    (1281, "42000"),
    (1286, "42000"),
    (1292, "22007"),
    (1365, "22012"),
    (1366, "22007"),
    (1406, "22001"),
    (1451, "23000"),
    (1452, "23000"),
    (1690, "22003"),
];

/// Map a vendor error code to its SQLSTATE, falling back to `HY000`.
pub fn sqlstate_for_code(code: u16) -> &'static str {
    SQLSTATE_MAP
        .binary_search_by_key(&code, |(c, _)| *c)
        .map_or(GENERAL_ERROR, |i| SQLSTATE_MAP[i].1)
}

/// Decode an error packet (first byte `0xFF`).
///
/// `protocol_version` comes from the server greeting; protocol 9 and older
/// carry no vendor code.
pub fn parse_err_packet(payload: &[u8], protocol_version: u8) -> ErrPacket {
    let mut reader = PacketReader::new(payload);
    reader.skip(1);

    if protocol_version <= 9 {
        let message = String::from_utf8_lossy(reader.read_rest()).into_owned();
        let sql_state = if message.contains("Unknown column") {
            "42S22"
        } else {
            GENERAL_ERROR
        };
        return ErrPacket {
            error_code: None,
            sql_state: sql_state.to_string(),
            error_message: message,
        };
    }

    let code = reader.read_u16_le().unwrap_or(0);
    let message = String::from_utf8_lossy(reader.read_rest()).into_owned();
    let mapped = sqlstate_for_code(code);

    let (sql_state, error_message) = match message.strip_prefix('#') {
        Some(_) if message.len() > 6 && message.is_char_boundary(6) => {
            let state = &message[1..6];
            let state = if state == GENERAL_ERROR { mapped } else { state };
            (state.to_string(), message[6..].to_string())
        }
        _ => (mapped.to_string(), message),
    };

    ErrPacket {
        error_code: Some(code),
        sql_state,
        error_message,
    }
}

/// Infer the error kind from SQLSTATE and vendor code.
pub fn classify(sql_state: &str, code: Option<u16>) -> QueryErrorKind {
    match (code, sql_state) {
        (_, s) if s.starts_with("22") => QueryErrorKind::DataTruncation,
        (Some(1213), _) | (_, "40001") => QueryErrorKind::Deadlock,
        (Some(1205), _) => QueryErrorKind::LockTimeout,
        (_, s) if s.starts_with("23") => QueryErrorKind::Constraint,
        (Some(1044 | 1045 | 1142 | 1143 | 1227), _) | (_, "28000") => QueryErrorKind::Permission,
        (Some(1049), _) | (_, "42S02" | "42S12" | "42S22") => QueryErrorKind::NotFound,
        (_, s) if s.starts_with("42") => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}

/// Turn a decoded error packet into a server error.
pub fn server_error(packet: ErrPacket, sql: Option<&str>) -> Error {
    Error::Query(QueryError {
        kind: classify(&packet.sql_state, packet.error_code),
        sql: sql.map(str::to_string),
        sqlstate: Some(packet.sql_state),
        vendor_code: packet.error_code,
        message: packet.error_message,
        source: None,
    })
}

/// A server-reported range error for zero or invalid temporal values.
pub fn invalid_datetime(message: impl Into<String>) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::DataTruncation,
        sql: None,
        sqlstate: Some(INVALID_DATETIME.to_string()),
        vendor_code: None,
        message: message.into(),
        source: None,
    })
}

pub fn communications_failure(message: impl Into<String>, source: Option<std::io::Error>) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::CommunicationsFailure,
        message: message.into(),
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    })
}

pub fn connection_error(kind: ConnectionErrorKind, message: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message: message.into(),
        source: None,
    })
}

pub fn auth_error(message: impl Into<String>) -> Error {
    connection_error(ConnectionErrorKind::Authentication, message)
}

pub fn ssl_error(message: impl Into<String>) -> Error {
    connection_error(ConnectionErrorKind::Ssl, message)
}

pub fn protocol_error(message: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError {
        message: message.into(),
        raw_data: None,
        source: None,
    })
}

/// Protocol error for a payload that ended early.
pub fn truncated(what: &str) -> Error {
    protocol_error(format!("packet ended while reading {}", what))
}

/// Protocol error carrying the offending payload.
pub fn unexpected_packet(what: &str, payload: &[u8]) -> Error {
    Error::Protocol(ProtocolError {
        message: format!("unexpected packet while reading {}", what),
        raw_data: Some(payload.iter().take(64).copied().collect()),
        source: None,
    })
}

pub fn config_error(message: impl Into<String>) -> Error {
    Error::Config(ConfigError {
        message: message.into(),
        source: None,
    })
}

/// Wrong number of bound parameters (SQLSTATE 07001), raised client-side.
pub fn parameter_count_mismatch(expected: usize, actual: usize, sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: Some(sql.to_string()),
        sqlstate: Some("07001".to_string()),
        vendor_code: None,
        message: format!(
            "statement expects {} parameters, {} were supplied",
            expected, actual
        ),
        source: None,
    })
}

pub fn streaming_error(kind: StreamingErrorKind, message: impl Into<String>) -> Error {
    Error::Streaming(StreamingError {
        kind,
        message: message.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err_payload(code: u16, message: &str) -> Vec<u8> {
        let mut payload = vec![0xFF];
        payload.extend_from_slice(&code.to_le_bytes());
        payload.extend_from_slice(message.as_bytes());
        payload
    }

    #[test]
    fn test_map_is_sorted() {
        assert!(SQLSTATE_MAP.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_state_from_marker() {
        let packet = parse_err_packet(
            &err_payload(1146, "#42S02Table 'test.missing' doesn't exist"),
            10,
        );
        assert_eq!(packet.error_code, Some(1146));
        assert_eq!(packet.sql_state, "42S02");
        assert_eq!(packet.error_message, "Table 'test.missing' doesn't exist");
    }

    #[test]
    fn test_generic_state_is_replaced_by_mapping() {
        let packet = parse_err_packet(&err_payload(1062, "#HY000Duplicate entry '1'"), 10);
        assert_eq!(packet.sql_state, "23000");
    }

    #[test]
    fn test_state_mapped_without_marker() {
        let packet = parse_err_packet(&err_payload(1064, "You have an error"), 10);
        assert_eq!(packet.sql_state, "42000");
        assert_eq!(packet.error_message, "You have an error");

        let packet = parse_err_packet(&err_payload(9999, "mystery"), 10);
        assert_eq!(packet.sql_state, GENERAL_ERROR);
    }

    #[test]
    fn test_short_marker_is_kept_in_message() {
        let packet = parse_err_packet(&err_payload(1064, "#4200"), 10);
        assert_eq!(packet.sql_state, "42000");
        assert_eq!(packet.error_message, "#4200");
    }

    #[test]
    fn test_old_protocol_has_no_code() {
        let mut payload = vec![0xFF];
        payload.extend_from_slice(b"Unknown column 'x' in 'field list'");
        let packet = parse_err_packet(&payload, 9);
        assert_eq!(packet.error_code, None);
        assert_eq!(packet.sql_state, "42S22");

        let packet = parse_err_packet(b"\xFFsomething else", 9);
        assert_eq!(packet.sql_state, GENERAL_ERROR);
    }

    #[test]
    fn test_truncation_states_are_distinguished() {
        let err = server_error(parse_err_packet(&err_payload(1264, "Out of range"), 10), None);
        assert!(err.is_data_truncation());
        assert_eq!(err.sqlstate(), Some("22003"));

        let err = server_error(parse_err_packet(&err_payload(1064, "bad"), 10), Some("SELEC 1"));
        assert!(!err.is_data_truncation());
        assert_eq!(err.sql(), Some("SELEC 1"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("40001", Some(1213)), QueryErrorKind::Deadlock);
        assert_eq!(classify("41000", Some(1205)), QueryErrorKind::LockTimeout);
        assert_eq!(classify("23000", Some(1062)), QueryErrorKind::Constraint);
        assert_eq!(classify("28000", Some(1045)), QueryErrorKind::Permission);
        assert_eq!(classify("42S02", Some(1146)), QueryErrorKind::NotFound);
        assert_eq!(classify("42000", Some(1064)), QueryErrorKind::Syntax);
        assert_eq!(classify("HY000", None), QueryErrorKind::Database);
    }

    #[test]
    fn test_invalid_datetime() {
        let err = invalid_datetime("zero date");
        assert_eq!(err.sqlstate(), Some(INVALID_DATETIME));
        assert!(err.is_data_truncation());
    }
}
