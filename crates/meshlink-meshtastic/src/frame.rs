//! Stream framing for the radio TCP link
//!
//! Meshtastic frames protobufs on the stream link as:
//!
//!   `0x94 0xC3 <len_hi> <len_lo> <protobuf bytes>`
//!
//! with the length big-endian and capped at 512 bytes. This module provides
//! an incremental framer that can be fed arbitrary chunks and yields whole
//! protobuf payloads, resynchronizing on garbage by scanning for the next
//! magic byte.

use bytes::{Buf, BytesMut};

/// First magic byte of a stream frame
pub const FRAME_MAGIC_1: u8 = 0x94;
/// Second magic byte of a stream frame
pub const FRAME_MAGIC_2: u8 = 0xC3;
/// Upper bound on a framed protobuf, per the device firmware
pub const MAX_FRAME_PAYLOAD: usize = 512;

/// Incremental frame decoder for the radio stream
pub struct StreamFramer {
    buf: BytesMut,
}

impl StreamFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
        }
    }

    /// Feed raw bytes read from the socket
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next complete protobuf payload, if one is buffered.
    ///
    /// Skips over debug-log noise the radio interleaves on the same stream
    /// by discarding bytes until a magic sequence lines up.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            // Align the buffer on the magic sequence
            match self.buf.iter().position(|&b| b == FRAME_MAGIC_1) {
                Some(0) => {}
                Some(offset) => self.buf.advance(offset),
                None => {
                    self.buf.clear();
                    return None;
                }
            }

            if self.buf.len() < 4 {
                return None;
            }
            if self.buf[1] != FRAME_MAGIC_2 {
                // False start, drop the magic byte and rescan
                self.buf.advance(1);
                continue;
            }

            let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
            if len > MAX_FRAME_PAYLOAD {
                self.buf.advance(1);
                continue;
            }
            if self.buf.len() < 4 + len {
                return None;
            }

            self.buf.advance(4);
            return Some(self.buf.split_to(len).to_vec());
        }
    }
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a protobuf payload in a stream frame for sending
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(FRAME_MAGIC_1);
    frame.push(FRAME_MAGIC_2);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut framer = StreamFramer::new();
        framer.push(&encode_frame(b"abc"));
        assert_eq!(framer.next_frame(), Some(b"abc".to_vec()));
        assert_eq!(framer.next_frame(), None);
    }

    #[test]
    fn test_partial_delivery() {
        let mut framer = StreamFramer::new();
        let frame = encode_frame(b"hello");
        framer.push(&frame[..3]);
        assert_eq!(framer.next_frame(), None);
        framer.push(&frame[3..]);
        assert_eq!(framer.next_frame(), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_resync_over_noise() {
        let mut framer = StreamFramer::new();
        framer.push(b"log line from firmware\n");
        framer.push(&encode_frame(b"payload"));
        assert_eq!(framer.next_frame(), Some(b"payload".to_vec()));
    }

    #[test]
    fn test_false_magic_then_frame() {
        let mut framer = StreamFramer::new();
        // 0x94 not followed by 0xC3 must not desync the real frame after it
        framer.push(&[FRAME_MAGIC_1, 0x00]);
        framer.push(&encode_frame(b"x"));
        assert_eq!(framer.next_frame(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_oversize_length_is_skipped() {
        let mut framer = StreamFramer::new();
        framer.push(&[FRAME_MAGIC_1, FRAME_MAGIC_2, 0xFF, 0xFF]);
        framer.push(&encode_frame(b"ok"));
        assert_eq!(framer.next_frame(), Some(b"ok".to_vec()));
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut framer = StreamFramer::new();
        let mut bytes = encode_frame(b"one");
        bytes.extend_from_slice(&encode_frame(b"two"));
        framer.push(&bytes);
        assert_eq!(framer.next_frame(), Some(b"one".to_vec()));
        assert_eq!(framer.next_frame(), Some(b"two".to_vec()));
        assert_eq!(framer.next_frame(), None);
    }
}
