//! Raw binary packet protocol
//!
//! Every raw-protocol client receives a stream of fixed-layout packets:
//! a 16-byte little-endian header followed by the PCM payload.
//!
//! | offset | size | field       | encoding              |
//! |--------|------|-------------|-----------------------|
//! | 0      | 4    | sequence    | u32 LE                |
//! | 4      | 8    | timestamp   | f64 LE (ms epoch)     |
//! | 12     | 2    | sample rate | u16 LE                |
//! | 14     | 1    | channels    | u8                    |
//! | 15     | 1    | padding     | zero                  |
//! | 16     | N    | payload     | interleaved s16le PCM |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Length of the fixed packet header in bytes
pub const HEADER_LEN: usize = 16;

/// One raw audio packet: a fixed-duration slice of the capture stream
/// with its sequence number and capture timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    /// Monotonically increasing counter, wraps at u32::MAX
    pub sequence: u32,
    /// Wall-clock capture time in milliseconds since the epoch
    pub timestamp: f64,
    /// Sample rate in Hz
    pub sample_rate: u16,
    /// Interleaved channel count
    pub channels: u8,
    /// Raw interleaved s16le PCM samples
    pub payload: Bytes,
}

impl AudioPacket {
    /// Serialize to the wire format. The payload is not copied.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32_le(self.sequence);
        buf.put_f64_le(self.timestamp);
        buf.put_u16_le(self.sample_rate);
        buf.put_u8(self.channels);
        buf.put_u8(0);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a packet from the wire format.
    pub fn decode(mut buf: Bytes) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::TooShort(buf.len()));
        }
        let sequence = buf.get_u32_le();
        let timestamp = buf.get_f64_le();
        let sample_rate = buf.get_u16_le();
        let channels = buf.get_u8();
        let padding = buf.get_u8();
        if padding != 0 {
            return Err(ProtocolError::BadPadding);
        }
        Ok(Self {
            sequence,
            timestamp,
            sample_rate,
            channels,
            payload: buf,
        })
    }

    /// Number of PCM frames in the payload
    pub fn frame_count(&self) -> usize {
        self.payload.len() / (self.channels as usize * 2)
    }
}
