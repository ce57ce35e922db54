//! Raw PCM packetizer
//!
//! Accumulates capture output and slices it into fixed-duration packets.
//! Bytes leave in strict FIFO order: the concatenation of all emitted
//! payloads always equals the input stream truncated to a packet
//! multiple. Partial packets stay buffered until completed; they are
//! only discarded on teardown.

use bytes::{Bytes, BytesMut};

use crate::protocol::AudioPacket;

pub struct Packetizer {
    pending: BytesMut,
    sequence: u32,
    packet_bytes: usize,
    sample_rate: u16,
    channels: u8,
}

impl Packetizer {
    pub fn new(packet_bytes: usize, sample_rate: u32, channels: u8) -> Self {
        assert!(packet_bytes > 0, "packet size must be non-zero");
        Self {
            pending: BytesMut::new(),
            sequence: 0,
            packet_bytes,
            // The wire header stores the rate in 16 bits; config
            // validation rejects rates that do not fit.
            sample_rate: sample_rate as u16,
            channels,
        }
    }

    /// Append a capture chunk and drain all completed packets.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AudioPacket> {
        self.pending.extend_from_slice(chunk);

        let mut packets = Vec::new();
        while self.pending.len() >= self.packet_bytes {
            let payload: Bytes = self.pending.split_to(self.packet_bytes).freeze();
            packets.push(AudioPacket {
                sequence: self.sequence,
                timestamp: chrono::Utc::now().timestamp_millis() as f64,
                sample_rate: self.sample_rate,
                channels: self.channels,
                payload,
            });
            self.sequence = self.sequence.wrapping_add(1);
        }
        packets
    }

    /// Bytes currently buffered short of a full packet
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }
}
