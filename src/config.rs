//! Application configuration
//!
//! Loads a TOML config file describing the capture device, audio format,
//! encoder settings and server bind address. Every field has a sensible
//! default so a missing file still yields a runnable server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub codecs: CodecConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Capture and encoding parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device identifier. Interpretation is platform specific:
    /// a dshow device name on Windows, an avfoundation index on macOS,
    /// an ALSA device or software-mix alias on Linux.
    pub device: Option<String>,

    /// Channel count of the captured stream
    pub channels: u8,

    /// Sample rate of the captured stream in Hz
    pub sample_rate: u32,

    /// Encoder output bitrate, ffmpeg style (e.g. "128k")
    pub bitrate: String,

    /// Apply a fixed gain-boost filter stage before output
    pub boost: bool,

    /// Added to the sample rate passed to the encoders, to compensate
    /// capture clock drift
    pub samplerate_offset: i32,

    /// On macOS, capture with ffmpeg/avfoundation directly instead of
    /// the sox coreaudio backend
    pub prefer_ffmpeg_capture: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            channels: DEFAULT_CHANNELS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bitrate: DEFAULT_BITRATE.to_string(),
            boost: false,
            samplerate_offset: 0,
            prefer_ffmpeg_capture: false,
        }
    }
}

impl AudioConfig {
    /// PCM frames per raw packet at the configured rate
    pub fn frames_per_packet(&self) -> usize {
        (self.sample_rate as usize * PACKET_DURATION_MS as usize) / 1000
    }

    /// Size of one raw packet payload in bytes
    pub fn packet_bytes(&self) -> usize {
        self.frames_per_packet() * self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Sample rate handed to the encoder subprocesses
    pub fn encoder_sample_rate(&self) -> i64 {
        self.sample_rate as i64 + self.samplerate_offset as i64
    }
}

/// Which codec transcoders are enabled
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub mp3: bool,
    pub opus: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            mp3: true,
            opus: true,
        }
    }
}

/// HTTP/WebSocket server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Load configuration from the given path, or from the platform
    /// config directory when no path is given. A missing file yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location under the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "live-audio-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.audio.channels == 0 {
            return Err(Error::Config("channels must be at least 1".into()));
        }
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".into()));
        }
        // The packet header carries the rate in 16 bits.
        if self.audio.sample_rate > u16::MAX as u32 {
            return Err(Error::Config(format!(
                "sample_rate {} exceeds the packet header maximum of {}",
                self.audio.sample_rate,
                u16::MAX
            )));
        }
        if self.audio.packet_bytes() == 0 {
            return Err(Error::Config(format!(
                "sample_rate {} is too low to fill a {} ms packet",
                self.audio.sample_rate, PACKET_DURATION_MS
            )));
        }
        Ok(())
    }
}
