//! Client-role frame codec for use with `tokio_util::codec`.
//!
//! The decoder turns a byte buffer into [`Frame`]s, tolerating both masked
//! and unmasked inbound frames. The encoder masks every outbound frame with a
//! fresh 4-byte key drawn from an injected random source, as the client role
//! requires. The source is injected rather than pulled from ambient global
//! state so that tests can seed it deterministically.

use crate::error::WsError;
use crate::frame::{Frame, MAX_PAYLOAD_READ};
use bytes::{Buf, BytesMut};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio_util::codec::{Decoder, Encoder};

/// Frame codec for the client side of a WebSocket connection.
pub struct FrameCodec {
    rng: Box<dyn RngCore + Send>,
    max_payload: usize,
}

impl FrameCodec {
    /// Create a codec using an OS-seeded cryptographically secure generator
    /// for masking keys and the default inbound payload cap.
    pub fn new() -> Self {
        Self::with_rng(Box::new(StdRng::from_os_rng()))
    }

    /// Create a codec with an explicit random source.
    pub fn with_rng(rng: Box<dyn RngCore + Send>) -> Self {
        FrameCodec {
            rng,
            max_payload: MAX_PAYLOAD_READ,
        }
    }

    /// Override the inbound payload cap.
    pub fn max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    fn next_mask_key(&mut self) -> [u8; 4] {
        let mut key = [0u8; 4];
        self.rng.fill_bytes(&mut key);
        key
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = WsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match Frame::parse(src, self.max_payload)? {
            Some((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = WsError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Every client-originated frame is masked, data and control alike.
        let key = self.next_mask_key();
        let encoded = frame.encode(Some(key))?;
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Opcode;

    fn seeded(seed: u64) -> FrameCodec {
        FrameCodec::with_rng(Box::new(StdRng::seed_from_u64(seed)))
    }

    #[test]
    fn encode_always_masks() {
        let mut codec = seeded(7);
        let mut buf = BytesMut::new();
        codec.encode(Frame::text("hi"), &mut buf).unwrap();
        assert_eq!(buf[1] & 0x80, 0x80);
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut codec = seeded(1);
        let mut buf = BytesMut::new();
        codec.encode(Frame::text("Hello"), &mut buf).unwrap();

        let mut decoder = FrameCodec::new();
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"Hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn same_payload_different_wire_bytes() {
        let mut codec = seeded(42);
        let mut first = BytesMut::new();
        let mut second = BytesMut::new();
        codec.encode(Frame::text("repeat"), &mut first).unwrap();
        codec.encode(Frame::text("repeat"), &mut second).unwrap();

        assert_ne!(&first[..], &second[..]);

        for buf in [&mut first, &mut second] {
            let frame = FrameCodec::new().decode(buf).unwrap().unwrap();
            assert_eq!(frame.payload, b"repeat");
        }
    }

    #[test]
    fn partial_input_yields_none() {
        let mut codec = seeded(3);
        let mut wire = BytesMut::new();
        codec.encode(Frame::binary(vec![9; 300]), &mut wire).unwrap();

        let mut decoder = FrameCodec::new();
        let mut partial = BytesMut::from(&wire[..5]);
        assert!(decoder.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&wire[5..]);
        let frame = decoder.decode(&mut partial).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 300);
    }

    #[test]
    fn decoder_respects_payload_cap() {
        let mut codec = seeded(5);
        let mut wire = BytesMut::new();
        codec.encode(Frame::binary(vec![0; 200]), &mut wire).unwrap();

        let mut decoder = FrameCodec::new().max_payload(100);
        assert!(matches!(
            decoder.decode(&mut wire),
            Err(WsError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut codec = seeded(11);
        let mut buf = BytesMut::new();
        codec.encode(Frame::text("one"), &mut buf).unwrap();
        codec.encode(Frame::ping(b"hb".to_vec()), &mut buf).unwrap();
        codec.encode(Frame::text("two"), &mut buf).unwrap();

        let mut decoder = FrameCodec::new();
        let frames: Vec<Frame> = std::iter::from_fn(|| decoder.decode(&mut buf).ok().flatten())
            .collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload, b"one");
        assert_eq!(frames[1].opcode, Opcode::Ping);
        assert_eq!(frames[2].payload, b"two");
    }
}
