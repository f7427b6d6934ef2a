//! End-to-end relay tests over loopback TCP

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use camrelay::client::{CameraClient, DisplayClient};
use camrelay::media::{read_raw_video, FilenameGenerator, UniqueFilenames, VideoRequest, VideoSink};
use camrelay::protocol::{encode_binary, encode_text, Dimensions, Framing};
use camrelay::session::SessionRole;
use camrelay::{BroadcastSnapshot, RawVideoSink, RelayServer, ServerConfig};

#[derive(Default)]
struct RecordingSink {
    requests: Mutex<Vec<VideoRequest>>,
}

impl RecordingSink {
    fn requests(&self) -> Vec<VideoRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl VideoSink for RecordingSink {
    fn write(&self, request: &VideoRequest) -> io::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn extension(&self) -> &str {
        "rec"
    }
}

struct Relay {
    server: Arc<RelayServer>,
    sink: Arc<RecordingSink>,
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<camrelay::Result<()>>,
}

async fn start_relay(config: ServerConfig) -> Relay {
    let sink = Arc::new(RecordingSink::default());
    let names: Arc<dyn FilenameGenerator> = Arc::new(UniqueFilenames::new("rec"));
    let server = Arc::new(RelayServer::new(config, sink.clone(), names));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();

    let serving = Arc::clone(&server);
    let trigger = cancel.clone();
    let handle = tokio::spawn(async move { serving.serve(listener, trigger).await });

    Relay {
        server,
        sink,
        addr,
        cancel,
        handle,
    }
}

fn test_config() -> ServerConfig {
    ServerConfig::default()
        .output_dir(std::env::temp_dir())
        .broadcast_interval(Duration::from_millis(20))
        .shutdown_grace(Duration::from_secs(2))
}

impl Relay {
    async fn wait_for_role(&self, id: SocketAddr, role: Option<SessionRole>) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.server.registry().role_of(&id).await != role {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{} never reached role {:?}", id, role));
    }

    async fn wait_for_requests(&self, count: usize) -> Vec<VideoRequest> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let requests = self.sink.requests();
                if requests.len() >= count {
                    return requests;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap()
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

/// Read snapshots until one satisfies `accept`
async fn snapshot_where<F>(display: &mut DisplayClient, accept: F) -> BroadcastSnapshot
where
    F: Fn(&BroadcastSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = display.next_snapshot().await.unwrap();
            if accept(&snapshot) {
                return snapshot;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_camera_frames_persisted_in_order() {
    let relay = start_relay(test_config()).await;

    let mut camera = CameraClient::connect(relay.addr, Framing::Legacy).await.unwrap();
    let id = camera.local_addr();
    camera.join(Dimensions::new(640, 480)).await.unwrap();
    for frame in [&b"f1"[..], b"f2", b"f3"] {
        camera.send_frame(frame).await.unwrap();
    }
    camera.store_video().await.unwrap();

    let requests = relay.wait_for_requests(1).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].frames,
        vec![
            Bytes::from_static(b"f1"),
            Bytes::from_static(b"f2"),
            Bytes::from_static(b"f3")
        ]
    );
    assert_eq!((requests[0].width, requests[0].height), (640, 480));
    assert_eq!(requests[0].path.extension().unwrap(), "rec");

    let snapshot = relay.server.registry().snapshot_cameras().await;
    assert!(snapshot.camera(&id).unwrap().frames.is_empty());

    camera.leave(false).await.unwrap();
    relay.wait_for_role(id, None).await;
    assert_eq!(relay.sink.requests().len(), 1);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_display_receives_camera_frames() {
    let relay = start_relay(test_config()).await;

    let mut display = DisplayClient::connect(relay.addr, Framing::Legacy).await.unwrap();
    display.join().await.unwrap();
    relay
        .wait_for_role(display.local_addr(), Some(SessionRole::Display))
        .await;

    let mut first = CameraClient::connect(relay.addr, Framing::Legacy).await.unwrap();
    let mut second = CameraClient::connect(relay.addr, Framing::Legacy).await.unwrap();
    first.join(Dimensions::new(320, 240)).await.unwrap();
    second.join(Dimensions::new(160, 120)).await.unwrap();
    first.send_frame(b"from-first").await.unwrap();
    second.send_frame(b"from-second").await.unwrap();

    let (first_id, second_id) = (first.local_addr(), second.local_addr());
    let snapshot = snapshot_where(&mut display, |s| s.frame_count() == 2).await;

    let cam = snapshot.camera(&first_id).unwrap();
    assert_eq!((cam.width, cam.height), (320, 240));
    assert_eq!(cam.frames, vec![Bytes::from_static(b"from-first")]);
    let cam = snapshot.camera(&second_id).unwrap();
    assert_eq!(cam.frames, vec![Bytes::from_static(b"from-second")]);

    display.leave().await.unwrap();
    relay.shutdown().await;
}

#[tokio::test]
async fn test_unknown_command_is_ignored() {
    let relay = start_relay(test_config()).await;

    let mut camera = CameraClient::connect(relay.addr, Framing::Legacy).await.unwrap();
    let id = camera.local_addr();
    camera.join(Dimensions::new(2, 2)).await.unwrap();
    camera.send_command("ping").await.unwrap();
    camera.send_frame(b"still-here").await.unwrap();
    camera.store_video().await.unwrap();

    let requests = relay.wait_for_requests(1).await;
    assert_eq!(requests[0].frames, vec![Bytes::from_static(b"still-here")]);
    assert_eq!(
        relay.server.registry().role_of(&id).await,
        Some(SessionRole::Camera)
    );

    relay.shutdown().await;
}

#[tokio::test]
async fn test_raw_frame_without_stream_command() {
    let relay = start_relay(test_config()).await;

    let mut camera = CameraClient::connect(relay.addr, Framing::Legacy).await.unwrap();
    camera.join(Dimensions::new(2, 2)).await.unwrap();

    // Invalid UTF-8 makes the first slot read as a binary frame
    let mut frame = vec![0xFF; 100];
    frame[0] = 0xD8;
    camera.send_raw_frame(&frame).await.unwrap();
    camera.store_video().await.unwrap();

    let requests = relay.wait_for_requests(1).await;
    assert_eq!(requests[0].frames, vec![Bytes::from(frame)]);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_tagged_framing_session() {
    let relay = start_relay(test_config().framing(Framing::Tagged)).await;

    let mut camera = CameraClient::connect(relay.addr, Framing::Tagged).await.unwrap();
    camera.join(Dimensions::new(8, 8)).await.unwrap();
    // Valid UTF-8 payload; only the tag tells it apart from text
    camera.send_frame(b"plain text frame").await.unwrap();
    camera.store_video().await.unwrap();

    let requests = relay.wait_for_requests(1).await;
    assert_eq!(requests[0].frames, vec![Bytes::from_static(b"plain text frame")]);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_disconnected_display_removed() {
    let relay = start_relay(test_config()).await;

    let mut leaving = DisplayClient::connect(relay.addr, Framing::Legacy).await.unwrap();
    let mut staying = DisplayClient::connect(relay.addr, Framing::Legacy).await.unwrap();
    leaving.join().await.unwrap();
    staying.join().await.unwrap();
    let leaving_id = leaving.local_addr();
    relay
        .wait_for_role(leaving_id, Some(SessionRole::Display))
        .await;
    relay
        .wait_for_role(staying.local_addr(), Some(SessionRole::Display))
        .await;

    drop(leaving);
    relay.wait_for_role(leaving_id, None).await;

    let mut camera = CameraClient::connect(relay.addr, Framing::Legacy).await.unwrap();
    camera.join(Dimensions::new(2, 2)).await.unwrap();
    camera.send_frame(b"after-drop").await.unwrap();

    let snapshot = snapshot_where(&mut staying, |s| s.frame_count() == 1).await;
    assert!(snapshot.camera(&camera.local_addr()).is_some());
    assert_eq!(relay.server.registry().display_count().await, 1);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_persists_camera_buffers() {
    let relay = start_relay(test_config()).await;

    let mut camera = CameraClient::connect(relay.addr, Framing::Legacy).await.unwrap();
    let id = camera.local_addr();
    camera.join(Dimensions::new(4, 4)).await.unwrap();
    camera.send_frame(b"unsaved-1").await.unwrap();
    camera.send_frame(b"unsaved-2").await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = relay.server.registry().snapshot_cameras().await;
            if snapshot.camera(&id).map(|c| c.frames.len()) == Some(2) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let sink = Arc::clone(&relay.sink);
    relay.shutdown().await;

    let requests = sink.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].frames.len(), 2);
}

#[tokio::test]
async fn test_oversized_frame_closes_session() {
    let relay = start_relay(test_config().max_frame_size(16)).await;

    let mut stream = TcpStream::connect(relay.addr).await.unwrap();
    let id = stream.local_addr().unwrap();
    stream
        .write_all(&encode_text("camera_join", Framing::Legacy))
        .await
        .unwrap();
    stream
        .write_all(&encode_text("2x2", Framing::Legacy))
        .await
        .unwrap();
    relay.wait_for_role(id, Some(SessionRole::Camera)).await;

    stream
        .write_all(&encode_text("stream", Framing::Legacy))
        .await
        .unwrap();
    stream
        .write_all(&encode_binary(&[0u8; 64], Framing::Legacy))
        .await
        .unwrap();

    relay.wait_for_role(id, None).await;
    relay.shutdown().await;
}

#[tokio::test]
async fn test_raw_sink_writes_readable_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config().output_dir(dir.path()).frame_rate(12);
    let server = Arc::new(RelayServer::with_raw_sink(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let serving = Arc::clone(&server);
    let trigger = cancel.clone();
    let handle = tokio::spawn(async move { serving.serve(listener, trigger).await });

    let mut camera = CameraClient::connect(addr, Framing::Legacy).await.unwrap();
    camera.join(Dimensions::new(3, 2)).await.unwrap();
    camera.send_frame(b"pixels").await.unwrap();
    camera.leave(true).await.unwrap();

    let path = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let found = std::fs::read_dir(dir.path())
                .unwrap()
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .find(|p| p.extension().is_some_and(|ext| ext == RawVideoSink::new().extension()));
            if let Some(path) = found {
                return path;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let video = read_raw_video(&path).unwrap();
    assert_eq!((video.width, video.height, video.frame_rate), (3, 2, 12));
    assert_eq!(video.frames, vec![Bytes::from_static(b"pixels")]);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
