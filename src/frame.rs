//! WebSocket frame parsing and encoding conforming to RFC 6455.
//!
//! This is the pure data-transformation layer: no I/O, no shared state. The
//! async codec adapter in [`crate::codec`] drives these routines from a byte
//! buffer and supplies masking keys for outbound frames.

use crate::error::WsError;

/// Outbound payloads must fit in 31 usable length bits. Anything larger is a
/// [`WsError::FrameTooLarge`] rather than a silent truncation.
pub const MAX_PAYLOAD_WRITE: usize = i32::MAX as usize;

/// Default inbound payload cap (16 MiB). A frame header claiming more than
/// this is rejected before any allocation happens.
pub const MAX_PAYLOAD_READ: usize = 16 * 1024 * 1024;

/// WebSocket opcodes as defined in RFC 6455 Section 5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation frame (0x0)
    Continuation = 0x0,
    /// Text data frame (0x1)
    Text = 0x1,
    /// Binary data frame (0x2)
    Binary = 0x2,
    /// Connection close frame (0x8)
    Close = 0x8,
    /// Ping frame (0x9)
    Ping = 0x9,
    /// Pong frame (0xA)
    Pong = 0xA,
}

impl Opcode {
    /// Parse opcode from the low 4 bits of the frame header.
    fn from_u8(value: u8) -> Result<Self, WsError> {
        match value {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            _ => Err(WsError::InvalidOpcode(value)),
        }
    }

    /// Check if this is a control frame opcode.
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// A single WebSocket frame.
///
/// This client never fragments: every outbound frame has FIN=1, and inbound
/// FIN is recorded but not acted on (no reassembly).
#[derive(Debug, Clone)]
pub struct Frame {
    /// FIN bit: final fragment of a message.
    pub fin: bool,
    /// Frame type.
    pub opcode: Opcode,
    /// Whether the inbound frame was masked on the wire. Always false for
    /// frames built locally; the encoder masks at encode time.
    pub masked: bool,
    /// Payload data, unmasked.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Parse a frame from `data`, accepting at most `max_payload` bytes of
    /// payload.
    ///
    /// Returns `Ok(None)` when more bytes are needed, otherwise the frame and
    /// the number of bytes consumed. The length claim is validated against
    /// `max_payload` before the payload is touched, so a hostile header can
    /// never drive an unbounded allocation.
    pub fn parse(data: &[u8], max_payload: usize) -> Result<Option<(Self, usize)>, WsError> {
        if data.len() < 2 {
            return Ok(None);
        }

        let byte1 = data[0];
        let fin = (byte1 & 0b1000_0000) != 0;
        let rsv = byte1 & 0b0111_0000;
        let opcode = Opcode::from_u8(byte1 & 0b0000_1111)?;

        let byte2 = data[1];
        let masked = (byte2 & 0b1000_0000) != 0;
        let mut payload_len = (byte2 & 0b0111_1111) as u64;

        let mut offset = 2;

        if payload_len == 126 {
            if data.len() < offset + 2 {
                return Ok(None);
            }
            payload_len = u16::from_be_bytes([data[offset], data[offset + 1]]) as u64;
            offset += 2;
        } else if payload_len == 127 {
            if data.len() < offset + 8 {
                return Ok(None);
            }
            let mut ext = [0u8; 8];
            ext.copy_from_slice(&data[offset..offset + 8]);
            payload_len = u64::from_be_bytes(ext);
            offset += 8;
        }

        if payload_len > max_payload as u64 {
            return Err(WsError::FrameTooLarge {
                length: payload_len,
                limit: max_payload as u64,
            });
        }
        let payload_len = payload_len as usize;

        if opcode.is_control() {
            if payload_len > 125 {
                return Err(WsError::ControlFrameTooLarge);
            }
            if !fin {
                return Err(WsError::ControlFrameFragmented);
            }
        }

        // No extensions are negotiated, so reserved bits must be clear.
        if rsv != 0 {
            return Err(WsError::ReservedBitsSet);
        }

        // A compliant server never masks, but this client tolerates both.
        let masking_key = if masked {
            if data.len() < offset + 4 {
                return Ok(None);
            }
            let key = [
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ];
            offset += 4;
            Some(key)
        } else {
            None
        };

        if data.len() < offset + payload_len {
            return Ok(None);
        }

        let mut payload = data[offset..offset + payload_len].to_vec();
        offset += payload_len;

        if let Some(key) = masking_key {
            apply_mask(&mut payload, &key);
        }

        Ok(Some((
            Frame {
                fin,
                opcode,
                masked,
                payload,
            },
            offset,
        )))
    }

    /// Encode this frame, masking the payload with `mask` when given.
    ///
    /// Client-originated frames must always pass a key per the protocol's
    /// client/server asymmetry; the codec layer enforces that.
    pub fn encode(&self, mask: Option<[u8; 4]>) -> Result<Vec<u8>, WsError> {
        let payload_len = self.payload.len();
        if payload_len > MAX_PAYLOAD_WRITE {
            return Err(WsError::FrameTooLarge {
                length: payload_len as u64,
                limit: MAX_PAYLOAD_WRITE as u64,
            });
        }

        let mut out = Vec::with_capacity(payload_len + 14);

        let mut byte1 = self.opcode as u8;
        if self.fin {
            byte1 |= 0b1000_0000;
        }
        out.push(byte1);

        let mask_bit = if mask.is_some() { 0b1000_0000 } else { 0 };
        if payload_len < 126 {
            out.push(mask_bit | payload_len as u8);
        } else if payload_len <= 65535 {
            out.push(mask_bit | 126);
            out.extend_from_slice(&(payload_len as u16).to_be_bytes());
        } else {
            out.push(mask_bit | 127);
            out.extend_from_slice(&(payload_len as u64).to_be_bytes());
        }

        if let Some(key) = mask {
            out.extend_from_slice(&key);
            let start = out.len();
            out.extend_from_slice(&self.payload);
            apply_mask(&mut out[start..], &key);
        } else {
            out.extend_from_slice(&self.payload);
        }

        Ok(out)
    }

    /// Create a text frame (FIN=1; this client never fragments).
    pub fn text(text: impl Into<String>) -> Self {
        Frame {
            fin: true,
            opcode: Opcode::Text,
            masked: false,
            payload: text.into().into_bytes(),
        }
    }

    /// Create a binary frame.
    pub fn binary(data: Vec<u8>) -> Self {
        Frame {
            fin: true,
            opcode: Opcode::Binary,
            masked: false,
            payload: data,
        }
    }

    /// Create a close frame carrying `code` as a 2-byte big-endian status.
    pub fn close(code: u16) -> Self {
        Frame {
            fin: true,
            opcode: Opcode::Close,
            masked: false,
            payload: code.to_be_bytes().to_vec(),
        }
    }

    /// Create a ping frame.
    pub fn ping(data: Vec<u8>) -> Self {
        Frame {
            fin: true,
            opcode: Opcode::Ping,
            masked: false,
            payload: data,
        }
    }

    /// Create a pong frame. Used to answer a ping with the same payload.
    pub fn pong(data: Vec<u8>) -> Self {
        Frame {
            fin: true,
            opcode: Opcode::Pong,
            masked: false,
            payload: data,
        }
    }

    /// Extract the status code from a close frame payload, if present.
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }
}

/// XOR the payload with the 4-byte key per RFC 6455 Section 5.3. Applying the
/// same key twice restores the original bytes.
pub(crate) fn apply_mask(payload: &mut [u8], key: &[u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}
