//! Error types for the audio streaming server

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture subsystem errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Required capture utility not found: {0}")]
    UtilityMissing(String),

    #[error("Failed to spawn capture process: {0}")]
    SpawnFailed(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// Codec transcoder errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to spawn encoder process: {0}")]
    SpawnFailed(String),

    #[error("Encoder process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("Unknown or disabled codec: {0}")]
    UnknownCodec(String),
}

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Packet too short: {0} bytes")]
    TooShort(usize),

    #[error("Non-zero padding byte in packet header")]
    BadPadding,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
