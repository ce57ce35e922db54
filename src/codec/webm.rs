//! WebM cluster boundary detection
//!
//! A WebM stream opens with EBML/Segment/Tracks elements that every
//! demuxer needs before it can decode anything, followed by a run of
//! self-contained Cluster elements. The scanner accumulates encoder
//! output until the first Cluster element ID appears, splits the bytes
//! before it off as the permanent stream header, and passes everything
//! from the marker on through as live data. Only the first occurrence
//! matters; after that the scanner is a passthrough.

use bytes::{Bytes, BytesMut};

use crate::constants::{CLUSTER_MARKER, MAX_HEADER_SCAN_BYTES};

/// Find the first cluster-marker offset in a buffer
pub fn find_cluster_offset(buf: &[u8]) -> Option<usize> {
    buf.windows(CLUSTER_MARKER.len())
        .position(|w| w == CLUSTER_MARKER)
}

/// What the scanner wants done with a chunk of encoder output
#[derive(Debug, PartialEq)]
pub enum ScanOutput {
    /// Still hunting for the first cluster; nothing leaves yet
    Buffering,
    /// First cluster found: emit the header, then the live remainder
    HeaderSplit { header: Bytes, live: Bytes },
    /// Header already captured (or given up on); chunk flows through
    Passthrough(Bytes),
}

/// Streaming scanner state for one Opus/WebM encoder output
pub struct ClusterScanner {
    pending: BytesMut,
    header_complete: bool,
    scan_limit: usize,
}

impl ClusterScanner {
    pub fn new() -> Self {
        Self::with_scan_limit(MAX_HEADER_SCAN_BYTES)
    }

    pub fn with_scan_limit(scan_limit: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            header_complete: false,
            scan_limit,
        }
    }

    /// Feed one chunk of encoder output.
    pub fn push(&mut self, chunk: Bytes) -> ScanOutput {
        if self.header_complete {
            return ScanOutput::Passthrough(chunk);
        }

        self.pending.extend_from_slice(&chunk);

        if let Some(offset) = find_cluster_offset(&self.pending) {
            self.header_complete = true;
            let mut buffered = std::mem::take(&mut self.pending);
            let live = buffered.split_off(offset).freeze();
            return ScanOutput::HeaderSplit {
                header: buffered.freeze(),
                live,
            };
        }

        // A stream that never produces a cluster would otherwise grow
        // the pending buffer without bound. Past the limit, give up on
        // header detection and flush everything as live data.
        if self.pending.len() > self.scan_limit {
            tracing::warn!(
                "No WebM cluster marker within {} bytes; streaming headerless",
                self.pending.len()
            );
            self.header_complete = true;
            return ScanOutput::Passthrough(std::mem::take(&mut self.pending).freeze());
        }

        ScanOutput::Buffering
    }

    pub fn header_complete(&self) -> bool {
        self.header_complete
    }
}

impl Default for ClusterScanner {
    fn default() -> Self {
        Self::new()
    }
}
