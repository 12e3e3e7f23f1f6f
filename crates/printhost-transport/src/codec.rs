//! Default block codec
//!
//! Wire format for one block, markers included:
//!
//! ```text
//! [0x7E][len][seq][payload ...][crc hi][crc lo][0x7E]
//! ```
//!
//! `len` counts payload bytes only; the CRC-16/CCITT covers
//! `len seq payload`. Marker bytes are legal inside the payload; the
//! frame reader's candidate iteration handles the ambiguity.

use printhost_core::{Result, TransportError};

use crate::frame::{Codec, MAX_BLOCK_SIZE};

/// Reserved byte value delimiting blocks on the wire
pub const SYNC_BYTE: u8 = 0x7E;

/// Framing bytes around the payload: two markers, len, seq, crc pair
pub const BLOCK_OVERHEAD: usize = 6;

/// Standard printhost MCU block codec
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockCodec;

impl BlockCodec {
    /// Create the standard codec
    pub fn new() -> Self {
        Self
    }

    /// Encode a payload into a complete marker-delimited block
    pub fn encode(&self, seq: u8, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() > MAX_BLOCK_SIZE - BLOCK_OVERHEAD {
            return Err(TransportError::Protocol {
                reason: format!("payload of {} bytes exceeds block size", payload.len()),
            }
            .into());
        }
        let mut block = Vec::with_capacity(payload.len() + BLOCK_OVERHEAD);
        block.push(SYNC_BYTE);
        block.push(payload.len() as u8);
        block.push(seq);
        block.extend_from_slice(payload);
        let crc = crc16_ccitt(&block[1..]);
        block.push((crc >> 8) as u8);
        block.push((crc & 0xFF) as u8);
        block.push(SYNC_BYTE);
        Ok(block)
    }

    /// Extract the payload from a span that already validated
    pub fn payload<'a>(&self, span: &'a [u8]) -> &'a [u8] {
        &span[3..span.len() - 3]
    }
}

impl Codec for BlockCodec {
    fn sync_byte(&self) -> u8 {
        SYNC_BYTE
    }

    fn validate(&self, span: &[u8]) -> Option<usize> {
        if span.len() < BLOCK_OVERHEAD || span.len() > MAX_BLOCK_SIZE {
            return None;
        }
        if span[0] != SYNC_BYTE || span[span.len() - 1] != SYNC_BYTE {
            return None;
        }
        let len = span[1] as usize;
        if span.len() != len + BLOCK_OVERHEAD {
            return None;
        }
        let body = &span[1..span.len() - 3];
        let crc = crc16_ccitt(body);
        let wire = u16::from_be_bytes([span[span.len() - 3], span[span.len() - 2]]);
        if crc != wire {
            return None;
        }
        Some(len)
    }
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF)
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
