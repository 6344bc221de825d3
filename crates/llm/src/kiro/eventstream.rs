//! AWS binary event-stream frame parser.
//!
//! Each frame: 12-byte prelude (total length u32, headers length u32,
//! prelude CRC u32), a header block, a JSON payload, then a 4-byte message
//! CRC over everything preceding it. CRC parameters: CRC-32, poly
//! 0x04C11DB7, init/final XOR 0xFFFFFFFF, reflected input and output, i.e.
//! the ordinary IEEE CRC-32 used by zlib/PNG/AWS.

use crate::error::GatewayError;

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;

/// One decoded frame: its header map and raw payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum HeaderValue {
    String(String),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Frame {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == name).and_then(|(_, v)| match v {
            HeaderValue::String(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn event_type(&self) -> Option<&str> {
        self.header_str(":event-type")
    }

    pub fn message_type(&self) -> Option<&str> {
        self.header_str(":message-type")
    }

    pub fn payload_json(&self) -> Result<sonic_rs::Value, GatewayError> {
        sonic_rs::from_slice(&self.payload).map_err(|e| GatewayError::internal(format!("malformed frame payload: {e}")))
    }
}

/// Incrementally accumulates bytes and yields complete frames.
///
/// Partial trailing bytes (an incomplete final frame) are retained across
/// calls and discarded, not replayed, if the stream ends before completion.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pull as many complete frames as are currently bufferable. A CRC
    /// mismatch is fatal: the whole stream must be abandoned.
    pub fn drain_frames(&mut self) -> Result<Vec<Frame>, GatewayError> {
        let mut frames = Vec::new();

        loop {
            if self.buffer.len() < PRELUDE_LEN {
                return Ok(frames);
            }

            let total_len = u32::from_be_bytes(self.buffer[0..4].try_into().unwrap()) as usize;
            let headers_len = u32::from_be_bytes(self.buffer[4..8].try_into().unwrap()) as usize;
            let prelude_crc = u32::from_be_bytes(self.buffer[8..12].try_into().unwrap());

            if crc32(&self.buffer[0..8]) != prelude_crc {
                return Err(GatewayError::internal("event-stream prelude CRC mismatch"));
            }

            if self.buffer.len() < total_len {
                return Ok(frames);
            }

            if total_len < PRELUDE_LEN + CRC_LEN + headers_len {
                return Err(GatewayError::internal("event-stream frame length underflows its own header"));
            }

            let message_crc = u32::from_be_bytes(self.buffer[total_len - 4..total_len].try_into().unwrap());
            if crc32(&self.buffer[0..total_len - 4]) != message_crc {
                return Err(GatewayError::internal("event-stream message CRC mismatch"));
            }

            let headers_end = PRELUDE_LEN + headers_len;
            let headers = parse_headers(&self.buffer[PRELUDE_LEN..headers_end])?;
            let payload = self.buffer[headers_end..total_len - CRC_LEN].to_vec();

            frames.push(Frame { headers, payload });
            self.buffer.drain(0..total_len);
        }
    }
}

fn parse_headers(mut bytes: &[u8]) -> Result<Vec<(String, HeaderValue)>, GatewayError> {
    let mut headers = Vec::new();

    while !bytes.is_empty() {
        let name_len = *bytes.first().ok_or_else(too_short)? as usize;
        bytes = &bytes[1..];
        if bytes.len() < name_len + 1 {
            return Err(too_short());
        }
        let name = String::from_utf8_lossy(&bytes[..name_len]).into_owned();
        bytes = &bytes[name_len..];

        let value_type = bytes[0];
        bytes = &bytes[1..];

        let value = match value_type {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            7 => {
                if bytes.len() < 2 {
                    return Err(too_short());
                }
                let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
                bytes = &bytes[2..];
                if bytes.len() < len {
                    return Err(too_short());
                }
                let value = String::from_utf8_lossy(&bytes[..len]).into_owned();
                bytes = &bytes[len..];
                HeaderValue::String(value)
            }
            6 => {
                if bytes.len() < 2 {
                    return Err(too_short());
                }
                let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
                bytes = &bytes[2..];
                if bytes.len() < len {
                    return Err(too_short());
                }
                let value = bytes[..len].to_vec();
                bytes = &bytes[len..];
                HeaderValue::Bytes(value)
            }
            _ => return Err(GatewayError::internal(format!("unsupported event-stream header type {value_type}"))),
        };

        headers.push((name, value));
    }

    Ok(headers)
}

fn too_short() -> GatewayError {
    GatewayError::internal("event-stream header block truncated")
}

/// IEEE CRC-32: polynomial 0x04C11DB7, reflected, init/final XOR 0xFFFFFFFF.
/// This is the ordinary zlib/PNG CRC-32, which is what AWS event-stream uses.
pub fn crc32(bytes: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB88320; // bit-reflected form of 0x04C11DB7
    let mut crc = 0xFFFF_FFFFu32;

    for &byte in bytes {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
    }

    crc ^ 0xFFFF_FFFF
}

/// Encode one frame exactly as the decoder expects, for test fixtures.
#[cfg(test)]
pub fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7); // string type
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }

    let total_len = PRELUDE_LEN + header_bytes.len() + payload.len() + CRC_LEN;
    let mut frame = Vec::with_capacity(total_len);
    frame.extend_from_slice(&(total_len as u32).to_be_bytes());
    frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    let prelude_crc = crc32(&frame[0..8]);
    frame.extend_from_slice(&prelude_crc.to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);
    let message_crc = crc32(&frame);
    frame.extend_from_slice(&message_crc.to_be_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_vector() {
        // "123456789" is the standard CRC-32/ISO-HDLC check vector.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn decodes_a_single_well_formed_frame() {
        let payload = br#"{"content":"hi"}"#;
        let bytes = encode_frame(&[(":event-type", "assistantResponseEvent")], payload);

        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes);
        let frames = decoder.drain_frames().unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_type(), Some("assistantResponseEvent"));
        assert_eq!(frames[0].payload, payload);
    }

    #[test]
    fn decodes_frames_split_across_feed_calls() {
        let bytes = encode_frame(&[(":event-type", "assistantResponseEvent")], b"{}");

        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes[..5]);
        assert!(decoder.drain_frames().unwrap().is_empty());

        decoder.feed(&bytes[5..]);
        assert_eq!(decoder.drain_frames().unwrap().len(), 1);
    }

    #[test]
    fn rejects_corrupted_prelude_crc() {
        let mut bytes = encode_frame(&[(":event-type", "x")], b"{}");
        bytes[0] ^= 0xFF;

        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes);
        assert!(decoder.drain_frames().is_err());
    }

    #[test]
    fn discards_incomplete_trailing_bytes_without_erroring() {
        let bytes = encode_frame(&[(":event-type", "x")], b"{}");

        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes[..bytes.len() - 2]);
        assert!(decoder.drain_frames().unwrap().is_empty());
    }
}
