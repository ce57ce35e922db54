//! Codec transcoding subsystem
//!
//! One provider per enabled output codec, each wrapping an external
//! ffmpeg encoder subprocess fed from the shared raw PCM stream.

pub mod args;
pub mod provider;
pub mod webm;

pub use provider::CodecProvider;
pub use webm::ClusterScanner;

use std::str::FromStr;

use crate::error::CodecError;

/// Output codecs the server can transcode to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// MPEG layer III; every frame is self-delimiting, so no stream
    /// header needs caching
    Mp3,
    /// Opus in a WebM container; late joiners need the container header
    /// replayed before live clusters
    Opus,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "opus" => Ok(Self::Opus),
            other => Err(CodecError::UnknownCodec(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_parsing() {
        assert_eq!("mp3".parse::<Codec>().unwrap(), Codec::Mp3);
        assert_eq!("OPUS".parse::<Codec>().unwrap(), Codec::Opus);
        assert!("aac".parse::<Codec>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        assert_eq!(Codec::Mp3.to_string(), "mp3");
        assert_eq!(Codec::Opus.to_string().parse::<Codec>().unwrap(), Codec::Opus);
    }
}
