//! Per-codec client registry
//!
//! Tracks which downstream clients are subscribed to which codec
//! stream. A client selecting a codec with no configured provider is
//! destroyed rather than silently ignored; a client joining an
//! Opus-style stream is primed with the cached container header before
//! any live data.

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::broadcast::client::{ClientHandle, ClientId};
use crate::codec::Codec;

/// Shared slot holding the cached stream header, written exactly once
/// by the provider that owns the codec.
pub type HeaderSlot = Arc<RwLock<Option<Bytes>>>;

struct CodecChannel {
    clients: DashMap<ClientId, ClientHandle>,
    header: HeaderSlot,
}

/// Registry of codec client sets, one per enabled provider.
///
/// The set of codecs is fixed at construction; clients come and go.
#[derive(Default)]
pub struct CodecRegistry {
    channels: HashMap<Codec, CodecChannel>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable a codec, wiring in the header slot its provider fills.
    pub fn register(&mut self, codec: Codec, header: HeaderSlot) {
        self.channels.insert(
            codec,
            CodecChannel {
                clients: DashMap::new(),
                header,
            },
        );
    }

    pub fn is_enabled(&self, codec: Codec) -> bool {
        self.channels.contains_key(&codec)
    }

    pub fn enabled_codecs(&self) -> Vec<Codec> {
        self.channels.keys().copied().collect()
    }

    /// Subscribe a client to a codec stream and prime it.
    ///
    /// Returns false when the codec has no provider; the handle is
    /// dropped, which closes the client's connection without having
    /// delivered any data.
    pub fn set_codec(&self, client: ClientHandle, codec: Codec) -> bool {
        let Some(channel) = self.channels.get(&codec) else {
            tracing::info!(
                "Client {} requested unavailable codec {}; closing",
                client.id(),
                codec
            );
            return false;
        };

        let id = client.id();

        // Prime and register under the header lock. The provider holds
        // the write side across its slot store and header broadcast, so
        // a client either primes from the slot or is in the set for the
        // broadcast, never neither and never both.
        {
            let header = channel.header.read();
            if let Some(header) = header.as_ref() {
                let _ = client.send(header.clone());
            }
            channel.clients.insert(id, client);
        }

        tracing::debug!(
            "Client {} subscribed to {} ({} listeners)",
            id,
            codec,
            channel.clients.len()
        );
        true
    }

    /// Remove a client from every codec set. Safe to call repeatedly.
    pub fn destroy_client(&self, id: ClientId) {
        for channel in self.channels.values() {
            if channel.clients.remove(&id).is_some() {
                tracing::debug!("Client {} removed", id);
            }
        }
    }

    /// Deliver an encoded chunk to every client of the codec. Failures
    /// are collected during iteration and reaped afterwards.
    pub fn broadcast(&self, codec: Codec, data: Bytes) {
        let Some(channel) = self.channels.get(&codec) else {
            return;
        };

        let mut dead = Vec::new();
        for entry in channel.clients.iter() {
            if !entry.value().send(data.clone()) {
                tracing::warn!("Failed to send {} chunk to client {}", codec, entry.key());
                dead.push(*entry.key());
            }
        }
        for id in dead {
            channel.clients.remove(&id);
        }
    }

    pub fn client_count(&self, codec: Codec) -> usize {
        self.channels
            .get(&codec)
            .map(|c| c.clients.len())
            .unwrap_or(0)
    }

    /// Drop every client on shutdown
    pub fn clear(&self) {
        for channel in self.channels.values() {
            channel.clients.clear();
        }
    }
}
