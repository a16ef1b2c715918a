/// Default port the server listens on.
pub const DEFAULT_PORT: u16 = 28015;

/// The handshake reply that authorizes the connection.
pub const HANDSHAKE_SUCCESS: &str = "SUCCESS";

/// Protocol version magic numbers sent first in the handshake.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V0_1 = 0x3f61_ba36,
    V0_2 = 0x7230_81e1,
    V0_3 = 0x5f75_e83e,
    V0_4 = 0x400c_2d20,
}

/// Wire protocol identifier sent last in the handshake.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireProtocol {
    Protobuf = 0x271f_fc41,
    Json = 0x7e69_70c7,
}

/// First element of a query payload array.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Start a new query on a fresh token.
    Start = 1,
    /// Request more batches for an open token.
    Continue = 2,
    /// Abandon an open token; the server may reply or silently drop.
    Stop = 3,
    /// Barrier: completes when all outstanding noreply queries have committed.
    NoreplyWait = 4,
}

/// The `t` field of a response payload.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Terminal single-datum result.
    SuccessAtom = 1,
    /// Final batch of a stream.
    SuccessSequence = 2,
    /// Intermediate batch; more follow after a CONTINUE.
    SuccessPartial = 3,
    /// The noreply barrier completed.
    WaitComplete = 4,
    /// The server thinks the driver sent something broken.
    ClientError = 16,
    /// The query failed to compile server-side.
    CompileError = 17,
    /// The query failed while running.
    RuntimeError = 18,
}

impl ResponseType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::SuccessAtom),
            2 => Some(Self::SuccessSequence),
            3 => Some(Self::SuccessPartial),
            4 => Some(Self::WaitComplete),
            16 => Some(Self::ClientError),
            17 => Some(Self::CompileError),
            18 => Some(Self::RuntimeError),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_type_codes_round_trip() {
        for response_type in [
            ResponseType::SuccessAtom,
            ResponseType::SuccessSequence,
            ResponseType::SuccessPartial,
            ResponseType::WaitComplete,
            ResponseType::ClientError,
            ResponseType::CompileError,
            ResponseType::RuntimeError,
        ] {
            assert_eq!(ResponseType::from_code(response_type as u32 as i64), Some(response_type));
        }
    }

    #[test]
    fn unknown_response_codes_are_rejected() {
        assert_eq!(ResponseType::from_code(0), None);
        assert_eq!(ResponseType::from_code(5), None);
        assert_eq!(ResponseType::from_code(19), None);
        assert_eq!(ResponseType::from_code(-1), None);
    }

    #[test]
    fn handshake_magics() {
        assert_eq!(Version::V0_4 as u32, 0x400c_2d20);
        assert_eq!(WireProtocol::Json as u32, 0x7e69_70c7);
    }
}
