//! Packetizing and client fan-out subsystem

pub mod client;
pub mod packetizer;
pub mod raw;
pub mod registry;

pub use client::{ClientHandle, ClientId};
pub use packetizer::Packetizer;
pub use raw::RawBroadcaster;
pub use registry::CodecRegistry;
