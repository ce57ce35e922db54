//! Raw packet fan-out
//!
//! Holds the set of raw-protocol clients and pushes every packet to each
//! of them. A packet is serialized exactly once; delivery failures are
//! isolated per client and never abort the publish.

use bytes::Bytes;
use dashmap::DashMap;

use crate::broadcast::client::{ClientHandle, ClientId};
use crate::protocol::AudioPacket;

#[derive(Default)]
pub struct RawBroadcaster {
    clients: DashMap<ClientId, ClientHandle>,
}

impl RawBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. The transport task de-registers it again when
    /// the connection closes.
    pub fn add_client(&self, client: ClientHandle) {
        let id = client.id();
        self.clients.insert(id, client);
        tracing::debug!("Raw client {} connected, {} total", id, self.clients.len());
    }

    /// Remove a client; removing an unknown or already-removed id is a
    /// no-op.
    pub fn remove_client(&self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            tracing::debug!("Raw client {} removed, {} total", id, self.clients.len());
        }
    }

    /// Serialize once and deliver to every client. Failed clients are
    /// collected during the iteration and removed afterwards, so a
    /// disconnect mid-broadcast cannot corrupt the sweep or starve the
    /// remaining clients.
    pub fn publish(&self, packet: &AudioPacket) {
        let frame = packet.encode();
        self.send_to_all(frame);
    }

    fn send_to_all(&self, frame: Bytes) {
        let mut dead = Vec::new();
        for entry in self.clients.iter() {
            if !entry.value().send(frame.clone()) {
                tracing::warn!("Failed to send packet to client {}", entry.key());
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.remove_client(id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Drop every client on shutdown
    pub fn clear(&self) {
        self.clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HEADER_LEN;

    fn packet(sequence: u32) -> AudioPacket {
        AudioPacket {
            sequence,
            timestamp: 0.0,
            sample_rate: 48000,
            channels: 2,
            payload: Bytes::from_static(&[9, 9, 9, 9]),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_clients() {
        let broadcaster = RawBroadcaster::new();
        let (a, mut rx_a) = ClientHandle::new();
        let (b, mut rx_b) = ClientHandle::new();
        broadcaster.add_client(a);
        broadcaster.add_client(b);

        broadcaster.publish(&packet(1));

        let frame_a = rx_a.recv().await.unwrap();
        let frame_b = rx_b.recv().await.unwrap();
        assert_eq!(frame_a, frame_b);
        assert_eq!(frame_a.len(), HEADER_LEN + 4);
    }

    #[tokio::test]
    async fn test_dead_client_does_not_block_others() {
        let broadcaster = RawBroadcaster::new();
        let (dead, dead_rx) = ClientHandle::new();
        let (live, mut live_rx) = ClientHandle::new();
        broadcaster.add_client(dead);
        broadcaster.add_client(live);
        drop(dead_rx);

        broadcaster.publish(&packet(1));
        assert!(live_rx.recv().await.is_some());
        // The failed client was reaped during the publish.
        assert_eq!(broadcaster.client_count(), 1);

        // A subsequent publish still succeeds.
        broadcaster.publish(&packet(2));
        assert!(live_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_clear_drops_every_client() {
        let broadcaster = RawBroadcaster::new();
        let (a, mut rx_a) = ClientHandle::new();
        let (b, mut rx_b) = ClientHandle::new();
        broadcaster.add_client(a);
        broadcaster.add_client(b);

        broadcaster.clear();
        assert_eq!(broadcaster.client_count(), 0);
        // Dropped handles close the transports' receiving ends.
        assert!(rx_a.recv().await.is_none());
        assert!(rx_b.recv().await.is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let broadcaster = RawBroadcaster::new();
        let (client, _rx) = ClientHandle::new();
        let id = client.id();
        broadcaster.add_client(client);

        broadcaster.remove_client(id);
        broadcaster.remove_client(id);
        assert_eq!(broadcaster.client_count(), 0);
    }
}
