//! Encoder subprocess argument construction
//!
//! Pure data: given the audio format and a target codec, produce the
//! ffmpeg command line that reads s16le PCM on stdin and writes the
//! compressed stream to stdout with minimal internal buffering.

use crate::codec::Codec;
use crate::config::AudioConfig;

/// ffmpeg arguments for the given codec's encoder process
pub fn encoder_args(codec: Codec, audio: &AudioConfig) -> Vec<String> {
    let mut args = input_args(audio);
    match codec {
        Codec::Mp3 => args.extend(mp3_output_args(audio)),
        Codec::Opus => args.extend(opus_output_args(audio)),
    }
    args
}

/// Shared low-delay s16le stdin input stage
fn input_args(audio: &AudioConfig) -> Vec<String> {
    vec![
        "-fflags".into(),
        "+nobuffer+flush_packets".into(),
        "-flags".into(),
        "low_delay".into(),
        "-rtbufsize".into(),
        "32".into(),
        "-probesize".into(),
        "32".into(),
        "-f".into(),
        "s16le".into(),
        "-ar".into(),
        audio.encoder_sample_rate().to_string(),
        "-ac".into(),
        audio.channels.to_string(),
        "-i".into(),
        "pipe:0".into(),
    ]
}

/// MP3 via libmp3lame. The bit reservoir and Xing/ID3 metadata are
/// disabled so every frame stands alone and joins mid-stream decode
/// cleanly.
fn mp3_output_args(audio: &AudioConfig) -> Vec<String> {
    vec![
        "-c:a".into(),
        "libmp3lame".into(),
        "-b:a".into(),
        audio.bitrate.clone(),
        "-ac".into(),
        audio.channels.to_string(),
        "-reservoir".into(),
        "0".into(),
        "-f".into(),
        "mp3".into(),
        "-write_xing".into(),
        "0".into(),
        "-id3v2_version".into(),
        "0".into(),
        "-fflags".into(),
        "+nobuffer".into(),
        "-flush_packets".into(),
        "1".into(),
        "pipe:1".into(),
    ]
}

/// Opus in WebM. Small cluster limits keep the container's cluster
/// markers frequent, bounding how much a late joiner waits for a
/// resync point.
fn opus_output_args(audio: &AudioConfig) -> Vec<String> {
    vec![
        "-c:a".into(),
        "libopus".into(),
        "-b:a".into(),
        audio.bitrate.clone(),
        "-application".into(),
        "audio".into(),
        "-f".into(),
        "webm".into(),
        "-cluster_time_limit".into(),
        "100".into(),
        "-cluster_size_limit".into(),
        "200000".into(),
        "-fflags".into(),
        "+nobuffer".into(),
        "-flush_packets".into(),
        "1".into(),
        "pipe:1".into(),
    ]
}
