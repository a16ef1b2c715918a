use crate::constant::{HANDSHAKE_SUCCESS, Version, WireProtocol};
use crate::error::{Error, Result};
use crate::protocol::primitive::{read_string_null, write_int_4};

// ============================================================================
// Client Handshake (Client -> Server)
// ============================================================================

/// Build the handshake sent once after TCP connect, before any query.
///
/// Packet format:
/// ```text
/// 4   magic number (protocol version V0_4)
/// 4   auth_len
/// n   pre-shared auth secret (may be empty)
/// 4   wire protocol id (JSON)
/// ```
pub fn write_handshake(out: &mut Vec<u8>, auth_key: &str) {
    write_int_4(out, Version::V0_4 as u32);
    write_int_4(out, auth_key.len() as u32);
    out.extend_from_slice(auth_key.as_bytes());
    write_int_4(out, WireProtocol::Json as u32);
}

// ============================================================================
// Handshake Reply (Server -> Client)
// ============================================================================

/// Classify the server's NUL-terminated ASCII reply.
///
/// `"SUCCESS"` authorizes the connection; anything else is the server's
/// rejection message, surfaced as a `ConnectionError`.
pub fn check_handshake_reply(reply: &[u8]) -> Result<()> {
    let (message, _rest) = read_string_null(reply)?;
    if message == HANDSHAKE_SUCCESS.as_bytes() {
        Ok(())
    } else {
        Err(Error::ConnectionError(
            String::from_utf8_lossy(message).into_owned(),
        ))
    }
}
