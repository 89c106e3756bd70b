//! Incremental FT3 frame decoder
//!
//! Accumulates raw bytes from the transport and yields parsed frames.
//! Garbage between frames and frames with bad CRCs are skipped by
//! resynchronizing on the next start-byte pair.

use crate::frame::{self, LinkHeaderFields, HEADER_SIZE, MIN_LENGTH_FIELD, SYNC};
use bytes::{Buf, BytesMut};
use log::warn;

/// Stream decoder for FT3 frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    discarded: u64,
}

impl FrameDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames dropped due to framing or CRC errors
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Extract the next complete frame from `buffer`, if any
    ///
    /// Consumed bytes are removed from the buffer; a `None` return means
    /// more bytes are needed.
    pub fn decode(&mut self, buffer: &mut BytesMut) -> Option<(LinkHeaderFields, Vec<u8>)> {
        loop {
            self.skip_to_sync(buffer);
            if buffer.len() < HEADER_SIZE {
                return None;
            }

            let length = buffer[2];
            if length < MIN_LENGTH_FIELD {
                warn!("Dropping frame with bad length field: {}", length);
                self.discarded += 1;
                buffer.advance(1);
                continue;
            }

            let data_len = (length - MIN_LENGTH_FIELD) as usize;
            let total = HEADER_SIZE + frame::user_data_wire_size(data_len);
            if buffer.len() < total {
                return None;
            }

            match frame::parse_frame(&buffer[..total]) {
                Ok(parsed) => {
                    buffer.advance(total);
                    return Some(parsed);
                }
                Err(e) => {
                    warn!("Dropping invalid frame: {}", e);
                    self.discarded += 1;
                    buffer.advance(1);
                }
            }
        }
    }

    fn skip_to_sync(&mut self, buffer: &mut BytesMut) {
        while !buffer.is_empty() {
            if buffer[0] != SYNC[0] {
                buffer.advance(1);
                continue;
            }
            if buffer.len() < 2 {
                return;
            }
            if buffer[1] != SYNC[1] {
                buffer.advance(1);
                continue;
            }
            return;
        }
    }
}
