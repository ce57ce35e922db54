//! End-to-end pipeline tests: packetizer ordering guarantees, raw
//! fan-out behavior, and the HTTP surface.

use bytes::Bytes;
use proptest::prelude::*;
use std::sync::Arc;

use live_audio_streamer::broadcast::client::ClientHandle;
use live_audio_streamer::broadcast::{CodecRegistry, Packetizer, RawBroadcaster};
use live_audio_streamer::capture::supervisor::SupervisorState;
use live_audio_streamer::codec::Codec;
use live_audio_streamer::config::AudioConfig;
use live_audio_streamer::protocol::AudioPacket;
use live_audio_streamer::server::{router, AppState};

fn mono_packetizer() -> Packetizer {
    Packetizer::new(960, 48000, 1)
}

#[test]
fn chunked_arrival_emits_complete_packets() {
    // Chunks of 100, 50 and 1900 bytes against a 960-byte packet size:
    // two packets out after the third chunk, 130 bytes retained.
    let mut packetizer = mono_packetizer();
    let input: Vec<u8> = (0..2050u32).map(|i| (i * 7 % 256) as u8).collect();

    assert!(packetizer.push(&input[..100]).is_empty());
    assert!(packetizer.push(&input[100..150]).is_empty());
    let packets = packetizer.push(&input[150..]);

    assert_eq!(packets.len(), 2);
    assert_eq!(&packets[0].payload[..], &input[0..960]);
    assert_eq!(&packets[1].payload[..], &input[960..1920]);
    assert_eq!(packetizer.pending_len(), 130);

    // The wire round-trip preserves the payload exactly.
    let decoded = AudioPacket::decode(packets[0].encode()).unwrap();
    assert_eq!(decoded.payload, packets[0].payload);
    assert_eq!(decoded.sequence, 0);
    assert_eq!(packets[1].sequence, 1);
}

proptest! {
    /// For any input split into any chunking, emitted payloads
    /// concatenate to the input truncated to a packet multiple, and
    /// sequence numbers increase by exactly 1 per packet.
    #[test]
    fn packetizer_conserves_bytes(
        input in proptest::collection::vec(any::<u8>(), 0..8192),
        chunk_size in 1usize..512,
        packet_size in 1usize..1024,
    ) {
        let mut packetizer = Packetizer::new(packet_size, 48000, 1);
        let mut emitted = Vec::new();
        let mut expected_seq = 0u32;

        for chunk in input.chunks(chunk_size) {
            for packet in packetizer.push(chunk) {
                prop_assert_eq!(packet.payload.len(), packet_size);
                prop_assert_eq!(packet.sequence, expected_seq);
                expected_seq = expected_seq.wrapping_add(1);
                emitted.extend_from_slice(&packet.payload);
            }
        }

        let whole = input.len() - input.len() % packet_size;
        prop_assert_eq!(&emitted[..], &input[..whole]);
        prop_assert_eq!(packetizer.pending_len(), input.len() % packet_size);
    }
}

#[tokio::test]
async fn raw_fanout_delivers_in_capture_order() {
    let broadcaster = RawBroadcaster::new();
    let (client, mut rx) = ClientHandle::new();
    broadcaster.add_client(client);

    let mut packetizer = Packetizer::new(4, 48000, 1);
    for chunk in [&[1u8, 2, 3][..], &[4, 5, 6, 7, 8][..], &[9, 10, 11, 12][..]] {
        for packet in packetizer.push(chunk) {
            broadcaster.publish(&packet);
        }
    }

    let mut sequences = Vec::new();
    let mut payload = Vec::new();
    for _ in 0..3 {
        let frame = rx.recv().await.unwrap();
        let packet = AudioPacket::decode(frame).unwrap();
        sequences.push(packet.sequence);
        payload.extend_from_slice(&packet.payload);
    }

    assert_eq!(sequences, vec![0, 1, 2]);
    assert_eq!(payload, (1..=12u8).collect::<Vec<_>>());
}

#[tokio::test]
async fn disconnected_client_does_not_disturb_broadcast() {
    let broadcaster = RawBroadcaster::new();
    let (leaver, leaver_rx) = ClientHandle::new();
    let (stayer, mut stayer_rx) = ClientHandle::new();
    let leaver_id = leaver.id();
    broadcaster.add_client(leaver);
    broadcaster.add_client(stayer);

    let packet = AudioPacket {
        sequence: 0,
        timestamp: 0.0,
        sample_rate: 48000,
        channels: 1,
        payload: Bytes::from_static(&[0; 4]),
    };

    broadcaster.publish(&packet);
    assert!(stayer_rx.recv().await.is_some());

    // Simulate a disconnect observed mid-stream, then a double removal.
    drop(leaver_rx);
    broadcaster.remove_client(leaver_id);
    broadcaster.remove_client(leaver_id);

    broadcaster.publish(&packet);
    assert!(stayer_rx.recv().await.is_some());
    assert_eq!(broadcaster.client_count(), 1);
}

fn test_state() -> Arc<AppState> {
    let mut registry = CodecRegistry::new();
    registry.register(
        Codec::Mp3,
        Arc::new(parking_lot::RwLock::new(None)),
    );
    Arc::new(AppState {
        raw: Arc::new(RawBroadcaster::new()),
        registry: Arc::new(registry),
        supervisor_state: Arc::new(parking_lot::RwLock::new(SupervisorState::Running)),
        audio: AudioConfig::default(),
    })
}

#[tokio::test]
async fn status_endpoint_reports_state() {
    use tower::ServiceExt;

    let app = router(test_state());
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .uri("/status")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["capture"], "running");
    assert_eq!(json["data"]["sample_rate"], 48000);
    assert_eq!(json["data"]["codec_clients"]["mp3"], 0);
}

#[tokio::test]
async fn disabled_codec_stream_is_rejected() {
    use tower::ServiceExt;

    // Opus is not registered in the test state; neither is a nonsense
    // codec name. Both must be refused before any data flows.
    for path in ["/stream/opus", "/stream/flac", "/sse/opus"] {
        let app = router(test_state());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(path)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            axum::http::StatusCode::NOT_FOUND,
            "path {}",
            path
        );
    }
}
