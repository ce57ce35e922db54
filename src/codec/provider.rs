//! Codec transcoder provider
//!
//! One provider per enabled codec. Each owns an external encoder
//! subprocess: a feeder task copies the shared raw PCM stream into the
//! encoder's stdin, and a reader task republishes encoder stdout to the
//! codec's client set, applying the codec's framing on the way.
//!
//! Failure policy differs from the capture path: when the encoder dies
//! or its stdin write fails, the provider logs once and goes inert for
//! the rest of the process lifetime. There is no backoff restart.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;

use crate::broadcast::registry::{CodecRegistry, HeaderSlot};
use crate::codec::args::encoder_args;
use crate::codec::webm::{ClusterScanner, ScanOutput};
use crate::codec::Codec;
use crate::config::AudioConfig;
use crate::error::CodecError;

/// A running (or permanently failed) codec transcoder
pub struct CodecProvider {
    codec: Codec,
    child: Child,
    inert: Arc<AtomicBool>,
}

impl CodecProvider {
    /// Spawn the ffmpeg encoder for `codec` and wire it between the raw
    /// PCM stream and the registry's codec client set.
    pub fn spawn(
        codec: Codec,
        audio: &AudioConfig,
        pcm_rx: broadcast::Receiver<Bytes>,
        header: HeaderSlot,
        registry: Arc<CodecRegistry>,
    ) -> Result<Self, CodecError> {
        let args = encoder_args(codec, audio);
        Self::spawn_with_command(codec, "ffmpeg", &args, pcm_rx, header, registry)
    }

    /// Spawn an arbitrary encoder command. Split out from `spawn` so
    /// tests can substitute a passthrough process for ffmpeg.
    pub fn spawn_with_command(
        codec: Codec,
        program: &str,
        args: &[String],
        mut pcm_rx: broadcast::Receiver<Bytes>,
        header: HeaderSlot,
        registry: Arc<CodecRegistry>,
    ) -> Result<Self, CodecError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CodecError::SpawnFailed(format!("{}: {}", program, e)))?;

        let mut stdin = child.stdin.take().ok_or(CodecError::MissingPipe("stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or(CodecError::MissingPipe("stdout"))?;

        let inert = Arc::new(AtomicBool::new(false));

        // Feeder: shared raw stream -> encoder stdin. Pipe backpressure
        // from a slow encoder stalls this task, not the capture path.
        let feeder_inert = inert.clone();
        tokio::spawn(async move {
            loop {
                match pcm_rx.recv().await {
                    Ok(chunk) => {
                        if let Err(e) = stdin.write_all(&chunk).await {
                            tracing::error!(
                                "Write to {} encoder failed: {}; transcoder is now inert",
                                codec,
                                e
                            );
                            feeder_inert.store(true, Ordering::Relaxed);
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("{} encoder input lagged, skipped {} chunks", codec, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        // Reader: encoder stdout -> codec framing -> client set.
        let reader_inert = inert.clone();
        tokio::spawn(async move {
            let mut scanner = match codec {
                Codec::Opus => Some(ClusterScanner::new()),
                Codec::Mp3 => None,
            };
            let mut buf = vec![0u8; 8192];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => {
                        tracing::error!("{} encoder closed its output; transcoder is now inert", codec);
                        reader_inert.store(true, Ordering::Relaxed);
                        return;
                    }
                    Ok(n) => {
                        let chunk = Bytes::copy_from_slice(&buf[..n]);
                        Self::publish_output(codec, chunk, &mut scanner, &header, &registry);
                    }
                    Err(e) => {
                        tracing::error!("{} encoder read failed: {}", codec, e);
                        reader_inert.store(true, Ordering::Relaxed);
                        return;
                    }
                }
            }
        });

        tracing::info!("{} transcoder started ({})", codec, program);
        Ok(Self {
            codec,
            child,
            inert,
        })
    }

    /// Apply per-codec framing to one encoder output chunk and publish.
    ///
    /// MP3 frames are self-delimiting, so output is rebroadcast as-is.
    /// Opus/WebM output runs through the cluster scanner: bytes before
    /// the first cluster become the cached header (broadcast once and
    /// replayed to late joiners by the registry), the rest is live data.
    fn publish_output(
        codec: Codec,
        chunk: Bytes,
        scanner: &mut Option<ClusterScanner>,
        header_slot: &HeaderSlot,
        registry: &Arc<CodecRegistry>,
    ) {
        let Some(scanner) = scanner.as_mut() else {
            registry.broadcast(codec, chunk);
            return;
        };

        match scanner.push(chunk) {
            ScanOutput::Buffering => {}
            ScanOutput::HeaderSplit { header, live } => {
                tracing::info!("{} stream header captured ({} bytes)", codec, header.len());
                // Store and broadcast under the slot's write lock so a
                // concurrently registering client cannot fall between
                // the two (primed from the slot or present for the
                // broadcast, exactly one of them).
                {
                    let mut slot = header_slot.write();
                    *slot = Some(header.clone());
                    registry.broadcast(codec, header);
                }
                if !live.is_empty() {
                    registry.broadcast(codec, live);
                }
            }
            ScanOutput::Passthrough(data) => registry.broadcast(codec, data),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// True once the encoder has died; the provider will produce no
    /// further output until the process is restarted externally.
    pub fn is_inert(&self) -> bool {
        self.inert.load(Ordering::Relaxed)
    }

    /// Terminate the encoder subprocess.
    pub async fn shutdown(mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::client::ClientHandle;
    use crate::constants::CLUSTER_MARKER;
    use parking_lot::RwLock;
    use std::time::Duration;

    fn test_registry(codec: Codec) -> (Arc<CodecRegistry>, HeaderSlot) {
        let header: HeaderSlot = Arc::new(RwLock::new(None));
        let mut registry = CodecRegistry::new();
        registry.register(codec, header.clone());
        (Arc::new(registry), header)
    }

    /// `cat` stands in for ffmpeg: a transparent stdin-to-stdout encoder.
    fn spawn_cat(
        codec: Codec,
        pcm_rx: broadcast::Receiver<Bytes>,
        header: HeaderSlot,
        registry: Arc<CodecRegistry>,
    ) -> CodecProvider {
        CodecProvider::spawn_with_command(codec, "cat", &[], pcm_rx, header, registry).unwrap()
    }

    async fn recv_timeout(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Bytes>) -> Bytes {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for chunk")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_mp3_rebroadcasts_encoder_output() {
        let (registry, header) = test_registry(Codec::Mp3);
        let (pcm_tx, pcm_rx) = broadcast::channel(16);
        let provider = spawn_cat(Codec::Mp3, pcm_rx, header, registry.clone());

        let (client, mut rx) = ClientHandle::new();
        registry.set_codec(client, Codec::Mp3);

        pcm_tx.send(Bytes::from_static(b"pcm-bytes")).unwrap();

        let mut received = Vec::new();
        while received.len() < 9 {
            received.extend_from_slice(&recv_timeout(&mut rx).await);
        }
        assert_eq!(received, b"pcm-bytes");
        assert!(!provider.is_inert());
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn test_opus_header_split_and_priming() {
        let (registry, header_slot) = test_registry(Codec::Opus);
        let (pcm_tx, pcm_rx) = broadcast::channel(16);
        let provider = spawn_cat(Codec::Opus, pcm_rx, header_slot.clone(), registry.clone());

        let (early, mut early_rx) = ClientHandle::new();
        registry.set_codec(early, Codec::Opus);

        // Simulated WebM stream: header bytes, then a cluster.
        let mut stream = Vec::new();
        stream.extend_from_slice(b"EBML");
        stream.extend_from_slice(&CLUSTER_MARKER);
        stream.extend_from_slice(b"cluster");
        pcm_tx.send(Bytes::from(stream)).unwrap();

        // The early client sees header bytes strictly first.
        let mut received = Vec::new();
        while received.len() < 4 + 4 + 7 {
            received.extend_from_slice(&recv_timeout(&mut early_rx).await);
        }
        assert_eq!(&received[..4], b"EBML");
        assert_eq!(&received[4..8], &CLUSTER_MARKER);

        // The header slot now replays to late joiners before live data.
        assert_eq!(
            header_slot.read().as_deref(),
            Some(&b"EBML"[..])
        );
        let (late, mut late_rx) = ClientHandle::new();
        registry.set_codec(late, Codec::Opus);
        assert_eq!(&recv_timeout(&mut late_rx).await[..], b"EBML");

        provider.shutdown().await;
    }

    #[tokio::test]
    async fn test_preregistered_client_gets_header_exactly_once() {
        let (registry, header_slot) = test_registry(Codec::Opus);

        // Subscribed before any encoder output exists, so the header
        // must arrive via the broadcast path, not slot priming.
        let (client, mut rx) = ClientHandle::new();
        registry.set_codec(client, Codec::Opus);
        assert!(header_slot.read().is_none());

        let mut stream = Vec::new();
        stream.extend_from_slice(b"EBML");
        stream.extend_from_slice(&CLUSTER_MARKER);
        stream.extend_from_slice(b"live");
        let mut scanner = Some(ClusterScanner::new());
        CodecProvider::publish_output(
            Codec::Opus,
            Bytes::from(stream),
            &mut scanner,
            &header_slot,
            &registry,
        );

        let mut received = Vec::new();
        while received.len() < 4 + 4 + 4 {
            received.extend_from_slice(&recv_timeout(&mut rx).await);
        }
        assert_eq!(&received[..4], b"EBML");
        // The header bytes appear once, never duplicated ahead of the
        // live data.
        let occurrences = received.windows(4).filter(|w| w[..] == b"EBML"[..]).count();
        assert_eq!(occurrences, 1);
    }

    #[tokio::test]
    async fn test_provider_goes_inert_on_encoder_exit() {
        let (registry, header) = test_registry(Codec::Mp3);
        let (_pcm_tx, pcm_rx) = broadcast::channel::<Bytes>(16);
        // "true" exits immediately, closing its stdout.
        let provider = CodecProvider::spawn_with_command(
            Codec::Mp3,
            "true",
            &[],
            pcm_rx,
            header,
            registry,
        )
        .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !provider.is_inert() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(provider.is_inert());
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let (registry, header) = test_registry(Codec::Mp3);
        let (_pcm_tx, pcm_rx) = broadcast::channel::<Bytes>(16);
        let result = CodecProvider::spawn_with_command(
            Codec::Mp3,
            "definitely-not-a-real-encoder",
            &[],
            pcm_rx,
            header,
            registry,
        );
        assert!(matches!(result, Err(CodecError::SpawnFailed(_))));
    }
}
