use tokio::io::{AsyncBufRead, AsyncReadExt};
use zerocopy::byteorder::little_endian::{U32 as U32LE, U64 as U64LE};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Header shared by request and response frames (zero-copy)
///
/// Layout matches the wire protocol:
/// - token: 8 bytes (little-endian, query token)
/// - length: 4 bytes (little-endian, payload length)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct FrameHeader {
    pub token: U64LE,
    pub length: U32LE,
}

pub const HEADER_LEN: usize = core::mem::size_of::<FrameHeader>();

impl FrameHeader {
    pub fn encode(token: u64, length: usize) -> Self {
        Self {
            token: U64LE::new(token),
            length: U32LE::new(length as u32),
        }
    }

    pub fn token(&self) -> u64 {
        self.token.get()
    }

    pub fn length(&self) -> usize {
        self.length.get() as usize
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::InvalidFrame);
        }
        Self::ref_from_bytes(&data[..HEADER_LEN]).map_err(|_| Error::InvalidFrame)
    }
}

/// Assemble a complete frame into `out`, replacing its previous content.
pub fn write_frame(out: &mut Vec<u8>, token: u64, payload: &[u8]) {
    out.clear();
    out.reserve(HEADER_LEN + payload.len());
    out.extend_from_slice(FrameHeader::encode(token, payload.len()).as_bytes());
    out.extend_from_slice(payload);
}

/// Read one complete response frame, coalescing partial socket reads.
///
/// The payload is stored in `buffer` (reused across calls to minimize
/// allocations). EOF in the middle of a frame is an error.
///
/// # Returns
/// * `Ok(token)` - The frame's token; the payload is stored in `buffer`
/// * `Err(Error)` - IO error or protocol error
pub async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R, buffer: &mut Vec<u8>) -> Result<u64> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let header = FrameHeader::from_bytes(&header)?;
    let length = header.length();

    buffer.clear();
    buffer.resize(length, 0);
    reader.read_exact(buffer.as_mut_slice()).await?;

    Ok(header.token())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_twelve_bytes() {
        assert_eq!(HEADER_LEN, 12);
    }

    #[test]
    fn header_layout_is_little_endian() {
        let header = FrameHeader::encode(0x0102_0304_0506_0708, 42);
        let bytes = header.as_bytes();
        assert_eq!(bytes[..8], 0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(bytes[8..], 42u32.to_le_bytes());
    }

    #[test]
    fn frame_round_trip() {
        let payload = br#"[1,[15,["tv_shows"]],{}]"#;
        let mut frame = Vec::new();
        write_frame(&mut frame, 7, payload);

        let header = FrameHeader::from_bytes(&frame).unwrap();
        assert_eq!(header.token(), 7);
        assert_eq!(header.length(), payload.len());
        assert_eq!(&frame[HEADER_LEN..], payload);
    }

    #[test]
    fn write_frame_replaces_previous_content() {
        let mut frame = Vec::new();
        write_frame(&mut frame, 1, b"[2]");
        write_frame(&mut frame, 2, b"[3]");
        assert_eq!(frame.len(), HEADER_LEN + 3);
        assert_eq!(FrameHeader::from_bytes(&frame).unwrap().token(), 2);
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(FrameHeader::from_bytes(&[0u8; 11]).is_err());
    }

    #[tokio::test]
    async fn read_frame_coalesces_the_payload() {
        let mut frame = Vec::new();
        write_frame(&mut frame, 9, br#"{"t":1,"r":[42]}"#);
        let mut reader = tokio::io::BufReader::new(frame.as_slice());
        let mut buffer = Vec::new();
        let token = read_frame(&mut reader, &mut buffer).await.unwrap();
        assert_eq!(token, 9);
        assert_eq!(buffer, br#"{"t":1,"r":[42]}"#);
    }

    #[tokio::test]
    async fn eof_mid_frame_is_an_error() {
        let mut frame = Vec::new();
        write_frame(&mut frame, 9, b"[2]");
        frame.truncate(frame.len() - 1);
        let mut reader = tokio::io::BufReader::new(frame.as_slice());
        let mut buffer = Vec::new();
        assert!(read_frame(&mut reader, &mut buffer).await.is_err());
    }
}
