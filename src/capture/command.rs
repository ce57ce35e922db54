//! Platform-specific capture command construction
//!
//! The choice of capture backend is pure data: a mapping from platform
//! to a command template. Windows captures through ffmpeg's dshow input,
//! Linux through ffmpeg's alsa input, and macOS through either ffmpeg's
//! avfoundation input or the sox coreaudio backend depending on
//! configuration. Every variant emits signed 16-bit little-endian PCM on
//! stdout at the configured rate and channel count.

use crate::capture::device::MacAudioDevice;
use crate::config::AudioConfig;
use crate::constants::BOOST_VOLUME;
use crate::error::CaptureError;

/// Supported capture platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Detect the platform this process is running on
    pub fn current() -> Result<Self, CaptureError> {
        match std::env::consts::OS {
            "windows" => Ok(Self::Windows),
            "macos" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            other => Err(CaptureError::UnsupportedPlatform(other.to_string())),
        }
    }
}

/// A fully resolved capture command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl CaptureCommand {
    /// Render for log output
    pub fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// Build the capture command for a platform.
///
/// `mac_devices` is the result of a one-time avfoundation device probe;
/// it is only consulted for the macOS sox path, where a numeric device
/// index from the config must be mapped to a coreaudio device name.
pub fn capture_command(
    platform: Platform,
    audio: &AudioConfig,
    mac_devices: &[MacAudioDevice],
) -> CaptureCommand {
    match platform {
        Platform::Windows => windows_command(audio),
        Platform::Linux => linux_command(audio),
        Platform::MacOs => {
            if audio.prefer_ffmpeg_capture {
                mac_ffmpeg_command(audio)
            } else {
                mac_sox_command(audio, mac_devices)
            }
        }
    }
}

/// Common ffmpeg output tail: raw s16le on stdout, optional boost filter
fn ffmpeg_output_args(audio: &AudioConfig) -> Vec<String> {
    let mut args = Vec::new();
    if audio.boost {
        args.push("-af".into());
        args.push(format!("volume={}", BOOST_VOLUME));
    }
    args.extend([
        "-acodec".into(),
        "pcm_s16le".into(),
        "-ar".into(),
        audio.sample_rate.to_string(),
        "-ac".into(),
        audio.channels.to_string(),
        "-f".into(),
        "s16le".into(),
        "pipe:1".into(),
    ]);
    args
}

fn windows_command(audio: &AudioConfig) -> CaptureCommand {
    let device = audio.device.as_deref().unwrap_or("Stereo Mix");
    let mut args: Vec<String> = [
        "-fflags",
        "nobuffer",
        "-flags",
        "low_delay",
        "-rtbufsize",
        "64M",
        "-probesize",
        "32",
        "-analyzeduration",
        "0",
        "-f",
        "dshow",
        "-audio_buffer_size",
        "200",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("audio={}", device));
    args.extend(ffmpeg_output_args(audio));
    CaptureCommand {
        program: "ffmpeg",
        args,
    }
}

fn linux_command(audio: &AudioConfig) -> CaptureCommand {
    let device = audio.device.as_deref().unwrap_or("default");
    let mut args: Vec<String> = [
        "-fflags",
        "nobuffer",
        "-flags",
        "low_delay",
        "-probesize",
        "32",
        "-analyzeduration",
        "0",
        "-f",
        "alsa",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(device.to_string());
    args.extend(ffmpeg_output_args(audio));
    CaptureCommand {
        program: "ffmpeg",
        args,
    }
}

fn mac_ffmpeg_command(audio: &AudioConfig) -> CaptureCommand {
    let input = resolve_mac_ffmpeg_input(audio.device.as_deref());
    let mut args: Vec<String> = [
        "-flags",
        "low_delay",
        "-thread_queue_size",
        "1024",
        "-probesize",
        "32",
        "-analyzeduration",
        "0",
        "-f",
        "avfoundation",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(input);
    args.extend(ffmpeg_output_args(audio));
    CaptureCommand {
        program: "ffmpeg",
        args,
    }
}

fn mac_sox_command(audio: &AudioConfig, devices: &[MacAudioDevice]) -> CaptureCommand {
    let device = resolve_mac_sox_input(audio.device.as_deref(), devices);
    let mut args: Vec<String> = vec![
        "-q".into(),
        "-t".into(),
        "coreaudio".into(),
        device,
        "-b".into(),
        "16".into(),
        "-e".into(),
        "signed-integer".into(),
        "-r".into(),
        audio.sample_rate.to_string(),
        "-c".into(),
        audio.channels.to_string(),
        "-t".into(),
        "raw".into(),
        "-".into(),
    ];
    if audio.boost {
        args.push("vol".into());
        args.push(BOOST_VOLUME.into());
    }
    CaptureCommand {
        program: "sox",
        args,
    }
}

/// avfoundation wants ":<index>"; accept ":N", bare "N", or fall back to ":0"
fn resolve_mac_ffmpeg_input(device: Option<&str>) -> String {
    let trimmed = match device {
        Some(d) if !d.trim().is_empty() => d.trim(),
        _ => return ":0".into(),
    };
    if let Some(idx) = trimmed.strip_prefix(':') {
        if idx.chars().all(|c| c.is_ascii_digit()) && !idx.is_empty() {
            return trimmed.to_string();
        }
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return format!(":{}", trimmed);
    }
    ":0".into()
}

/// sox wants a coreaudio device name; numeric indices are mapped through
/// the avfoundation probe results, anything else is passed through.
fn resolve_mac_sox_input(device: Option<&str>, devices: &[MacAudioDevice]) -> String {
    let trimmed = match device {
        Some(d) if !d.trim().is_empty() => d.trim(),
        _ => return "default".into(),
    };

    let index = trimmed
        .strip_prefix(':')
        .unwrap_or(trimmed)
        .parse::<u32>()
        .ok();

    match index {
        Some(idx) => devices
            .iter()
            .find(|d| d.index == idx)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| {
                tracing::warn!(
                    "Could not map macOS device index {} to a name for sox; using default input",
                    idx
                );
                "default".into()
            }),
        None => trimmed.to_string(),
    }
}
