//! Password scrambles and the authentication exchange.
//!
//! Three generations of credentials exist:
//!
//! - protocol 9 and older: [`old_crypt`]
//! - pre-4.1 protocol 10: [`scramble_323`] over the 8-byte seed
//! - 4.1.1+ secure connection: [`scramble_411`]
//!
//! ```text
//! scramble_411 = SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))
//! ```
//!
//! 4.1.0 servers run a two-round exchange of their own; see
//! [`decode_410_challenge`].

#![allow(clippy::cast_possible_truncation)]

use sha1::{Digest, Sha1};
use sqlwire_core::Result;

use crate::errors::{auth_error, parse_err_packet, truncated};
use crate::handshake::{Negotiated, write_client_params};
use crate::protocol::{Command, FALSE_SCRAMBLE, PacketType, PacketWriter};
use crate::transport::{Channel, PacketTransport};

/// Marker byte for a 20-byte 4.1.1 scramble.
const SCRAMBLE_411_LENGTH: u8 = 0x14;

/// Length of the 4.1.0 server challenge packet.
const CHALLENGE_410_LENGTH: usize = 25;

fn skips_whitespace(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

/// The pre-4.1 password hash, as two 31-bit words.
///
/// Spaces and tabs in the input are ignored.
pub fn hash_password(password: &[u8]) -> [u32; 2] {
    let mut nr: u32 = 1_345_345_333;
    let mut add: u32 = 7;
    let mut nr2: u32 = 0x1234_5671;

    for &c in password.iter().filter(|c| !skips_whitespace(**c)) {
        let c = u32::from(c);
        nr ^= ((nr & 63).wrapping_add(add))
            .wrapping_mul(c)
            .wrapping_add(nr << 8);
        nr2 = nr2.wrapping_add((nr2 << 8) ^ nr);
        add = add.wrapping_add(c);
    }

    [nr & 0x7FFF_FFFF, nr2 & 0x7FFF_FFFF]
}

fn old_hash(password: &[u8]) -> u32 {
    let mut nr: u32 = 1_345_345_333;
    let mut nr2: u32 = 7;

    for &c in password.iter().filter(|c| !skips_whitespace(**c)) {
        let c = u32::from(c);
        nr ^= ((nr & 63).wrapping_add(nr2))
            .wrapping_mul(c)
            .wrapping_add(nr << 8);
        nr2 = nr2.wrapping_add(c);
    }

    nr & 0x7FFF_FFFF
}

/// Pseudo-random generator shared by the two legacy scrambles.
struct LegacyRng {
    seed1: u64,
    seed2: u64,
    max: u64,
}

impl LegacyRng {
    fn next(&mut self) -> f64 {
        self.seed1 = (self.seed1 * 3 + self.seed2) % self.max;
        self.seed2 = (self.seed1 + self.seed2 + 33) % self.max;
        self.seed1 as f64 / self.max as f64
    }
}

/// Pre-4.1 scramble for protocol 10 servers. Output is as long as `seed`.
pub fn scramble_323(seed: &[u8], password: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let hs = hash_password(seed);
    let hp = hash_password(password);
    let max = 0x3FFF_FFFF;
    let mut rng = LegacyRng {
        seed1: u64::from(hs[0] ^ hp[0]) % max,
        seed2: u64::from(hs[1] ^ hp[1]) % max,
        max,
    };

    let mut out: Vec<u8> = seed
        .iter()
        .map(|_| (rng.next() * 31.0 + 64.0).floor() as u8)
        .collect();
    let extra = (rng.next() * 31.0).floor() as u8;
    for b in &mut out {
        *b ^= extra;
    }
    out
}

/// Scramble for protocol 9 and older servers.
pub fn old_crypt(seed: &[u8], password: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let max = 0x01FF_FFFF;
    let nr = u64::from(old_hash(seed) ^ old_hash(password)) % max;
    let mut rng = LegacyRng {
        seed1: nr,
        seed2: nr / 2,
        max,
    };

    seed.iter()
        .map(|_| (rng.next() * 31.0 + 64.0).floor() as u8)
        .collect()
}

fn sha1_of(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn xor20(a: &[u8], b: &[u8; 20]) -> [u8; 20] {
    let mut out = [0u8; 20];
    for (i, o) in out.iter_mut().enumerate() {
        *o = a.get(i).copied().unwrap_or(0) ^ b[i];
    }
    out
}

/// 4.1.1+ scramble: `SHA1(pw) XOR SHA1(seed + SHA1(SHA1(pw)))`.
pub fn scramble_411(password: &[u8], seed: &[u8]) -> [u8; 20] {
    let stage1 = sha1_of(&[password]);
    let stage2 = sha1_of(&[&stage1]);
    let stage3 = sha1_of(&[seed, &stage2]);
    xor20(&stage1, &stage3)
}

/// `SHA1(password)` with spaces and tabs removed.
pub fn stage1_hash(password: &[u8]) -> [u8; 20] {
    let stripped: Vec<u8> = password
        .iter()
        .copied()
        .filter(|c| !skips_whitespace(*c))
        .collect();
    sha1_of(&[&stripped])
}

/// Answer the 4.1.0 server challenge.
///
/// The challenge is 25 bytes. A first byte of `*` means the account still
/// has a pre-4.1 hash; anything else carries a 4-byte salt. Returns `None`
/// when the reply is not a challenge.
pub fn decode_410_challenge(reply: &[u8], password: &[u8]) -> Option<Vec<u8>> {
    if reply.len() != CHALLENGE_410_LENGTH || reply[0] == 0 {
        return None;
    }
    let encrypted = &reply[4..24];

    if reply[0] == b'*' {
        let [h0, h1] = hash_password(password);
        let key = sha1_of(&[&h0.to_be_bytes(), &h1.to_be_bytes()]);
        let scramble = xor20(encrypted, &key);
        let mut out = scramble_323(&scramble[..8], password);
        out.push(0);
        Some(out)
    } else {
        let stage1 = stage1_hash(password);
        let stage2 = sha1_of(&[&reply[..4], &stage1]);
        let scramble = xor20(encrypted, &stage2);
        Some(xor20(&scramble, &stage1).to_vec())
    }
}

/// Who to log in as.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub database: Option<&'a str>,
}

fn write_credential(writer: &mut PacketWriter, negotiated: &Negotiated, password: &[u8]) {
    let seed = &negotiated.greeting.seed;
    if negotiated.use_secure_auth() {
        if negotiated.flags.has_41_new_new_prot {
            if password.is_empty() {
                writer.write_u8(0);
            } else {
                writer.write_u8(SCRAMBLE_411_LENGTH);
                writer.write_bytes(&scramble_411(password, seed));
            }
        } else if password.is_empty() {
            writer.write_null_string("");
        } else {
            writer.write_null_string(FALSE_SCRAMBLE);
        }
    } else if negotiated.greeting.protocol_version > 9 {
        writer.write_null_bytes(&scramble_323(seed, password));
    } else {
        writer.write_null_bytes(&old_crypt(seed, password));
    }
}

/// Send the handshake response and run the exchange to completion.
///
/// The transport must already be past the greeting (and the TLS upgrade,
/// when one was negotiated).
pub fn authenticate<S: Channel>(
    transport: &mut PacketTransport<S>,
    negotiated: &Negotiated,
    credentials: Credentials<'_>,
) -> Result<()> {
    let mut writer = PacketWriter::with_capacity(128);
    write_client_params(&mut writer, negotiated);
    writer.write_null_string(credentials.user);
    write_credential(&mut writer, negotiated, credentials.password.as_bytes());
    if negotiated.connect_with_db {
        writer.write_null_string(credentials.database.unwrap_or(""));
    }
    transport.send_packet(writer.as_bytes())?;
    finish_exchange(transport, negotiated, credentials.password.as_bytes())
}

/// Log in as another user on the open session (COM_CHANGE_USER).
pub fn change_user<S: Channel>(
    transport: &mut PacketTransport<S>,
    negotiated: &Negotiated,
    credentials: Credentials<'_>,
) -> Result<()> {
    transport.reset_sequence();
    transport.clear_input();

    let mut writer = PacketWriter::command(Command::ChangeUser);
    writer.write_null_string(credentials.user);
    write_credential(&mut writer, negotiated, credentials.password.as_bytes());
    writer.write_null_string(credentials.database.unwrap_or(""));
    transport.send_packet(writer.as_bytes())?;
    finish_exchange(transport, negotiated, credentials.password.as_bytes())
}

fn finish_exchange<S: Channel>(
    transport: &mut PacketTransport<S>,
    negotiated: &Negotiated,
    password: &[u8],
) -> Result<()> {
    if negotiated.use_secure_auth() && negotiated.flags.has_41_new_new_prot {
        let reply = read_auth_reply(transport, negotiated)?;
        if PacketType::classify(&reply) == PacketType::Eof {
            tracing::warn!("server requested pre-4.1 authentication for this account");
            let seed = &negotiated.greeting.seed;
            let short_seed = seed.get(..8).ok_or_else(|| truncated("scramble seed"))?;
            let mut writer = PacketWriter::new();
            writer.write_null_bytes(&scramble_323(short_seed, password));
            transport.send_packet(writer.as_bytes())?;
            read_auth_reply(transport, negotiated)?;
        }
        return Ok(());
    }

    if negotiated.use_secure_auth() && !password.is_empty() {
        let reply = read_auth_reply(transport, negotiated)?;
        match decode_410_challenge(&reply, password) {
            Some(response) => {
                transport.send_packet(&response)?;
                read_auth_reply(transport, negotiated)?;
            }
            None => tracing::debug!("server accepted credentials without a challenge"),
        }
        return Ok(());
    }

    read_auth_reply(transport, negotiated)?;
    Ok(())
}

/// Read one packet of the auth exchange, failing on an error packet.
fn read_auth_reply<S: Channel>(
    transport: &mut PacketTransport<S>,
    negotiated: &Negotiated,
) -> Result<Vec<u8>> {
    let reply = transport.read_packet()?;
    if PacketType::classify(&reply) == PacketType::Error {
        transport.clear_input();
        let err = parse_err_packet(&reply, negotiated.greeting.protocol_version);
        let code = err
            .error_code
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        return Err(auth_error(format!(
            "{} (error {} / SQLSTATE {})",
            err.error_message, code, err.sql_state
        )));
    }
    Ok(reply)
}
