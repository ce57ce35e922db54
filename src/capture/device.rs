//! Capture utility checks and device enumeration
//!
//! Verifies at startup that the platform's capture utilities exist, and
//! runs the one-time avfoundation probe used to map numeric device
//! indices to coreaudio device names on macOS.

use tokio::process::Command;

use crate::capture::command::Platform;
use crate::config::AudioConfig;
use crate::error::CaptureError;

/// One audio device reported by the avfoundation probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacAudioDevice {
    pub index: u32,
    pub name: String,
}

/// Verify that the utilities required for this platform are installed.
///
/// Missing utilities are fatal: the raw audio path cannot come up
/// without its capture backend, so initialization must fail here
/// rather than spin on restart attempts.
pub async fn check_capture_utilities(
    platform: Platform,
    audio: &AudioConfig,
) -> Result<(), CaptureError> {
    match platform {
        Platform::Windows | Platform::Linux => check_ffmpeg().await?,
        Platform::MacOs => {
            if audio.prefer_ffmpeg_capture {
                check_ffmpeg().await?;
            } else {
                check_which("sox").await?;
            }
        }
    }
    if platform == Platform::Linux {
        check_which("arecord").await?;
    }
    Ok(())
}

async fn check_ffmpeg() -> Result<(), CaptureError> {
    let status = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
        .map_err(|_| CaptureError::UtilityMissing("ffmpeg".into()))?;
    if status.status.success() {
        Ok(())
    } else {
        Err(CaptureError::UtilityMissing("ffmpeg".into()))
    }
}

async fn check_which(utility: &str) -> Result<(), CaptureError> {
    let status = Command::new("which")
        .arg(utility)
        .output()
        .await
        .map_err(|_| CaptureError::UtilityMissing(utility.into()))?;
    if status.status.success() {
        Ok(())
    } else {
        Err(CaptureError::UtilityMissing(utility.into()))
    }
}

/// Run the avfoundation device-enumeration probe.
///
/// ffmpeg prints the device table on stderr and exits non-zero because
/// no input was given; only the parse of its output matters.
pub async fn probe_mac_audio_devices() -> Vec<MacAudioDevice> {
    let output = Command::new("ffmpeg")
        .args(["-f", "avfoundation", "-list_devices", "true", "-i", ""])
        .output()
        .await;

    match output {
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stdout = String::from_utf8_lossy(&out.stdout);
            parse_avfoundation_devices(&format!("{}\n{}", stderr, stdout))
        }
        Err(e) => {
            tracing::warn!("avfoundation device probe failed: {}", e);
            Vec::new()
        }
    }
}

/// Parse the audio-device section of `ffmpeg -list_devices` output.
pub fn parse_avfoundation_devices(output: &str) -> Vec<MacAudioDevice> {
    let mut devices = Vec::new();
    let mut in_audio_section = false;

    for line in output.lines() {
        if line.contains("AVFoundation audio devices:") {
            in_audio_section = true;
            continue;
        }
        if line.contains("AVFoundation video devices:") {
            in_audio_section = false;
            continue;
        }
        if !in_audio_section {
            continue;
        }

        // Lines look like: "[AVFoundation ...] [0] MacBook Pro Microphone"
        let Some(prefix_end) = line.find(']') else {
            continue;
        };
        let rest = line[prefix_end + 1..].trim_start();
        let Some(rest) = rest.strip_prefix('[') else {
            continue;
        };
        let Some(index_end) = rest.find(']') else {
            continue;
        };
        let Ok(index) = rest[..index_end].parse::<u32>() else {
            continue;
        };
        let name = rest[index_end + 1..].trim();
        if name.is_empty() {
            continue;
        }
        devices.push(MacAudioDevice {
            index,
            name: name.to_string(),
        });
    }

    devices
}
