//! Scripted fake Wyoming peers on loopback TCP

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use wyoming_trigger::protocol::{
    AudioChunk, AudioFormat, AudioStart, AudioStop, Event, Transcript,
};
use wyoming_trigger::{
    BackendPool, DeviceEndpoints, Endpoint, PeerConnection, PeerRole, PipelineConfig, ResultBoard,
    ResultSink, SessionRegistry,
};

/// Generous bound for anything that should happen "immediately"
pub const STEP: Duration = Duration::from_secs(5);

/// Accept one connection and run `script` against it
pub async fn spawn_peer<F, Fut, T>(role: PeerRole, script: F) -> (Endpoint, JoinHandle<T>)
where
    F: FnOnce(PeerConnection) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        script(PeerConnection::from_stream(stream, role, format!("fake-{}", role))).await
    });
    (Endpoint::new("127.0.0.1", port), handle)
}

/// A bound-then-released port nobody listens on
pub async fn dead_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new("127.0.0.1", port)
}

/// Receive until the other side goes away
pub async fn drain(conn: &mut PeerConnection) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = conn.receive().await {
        events.push(event);
    }
    events
}

/// Receive until an event matching `pred` arrives (inclusive)
pub async fn receive_until(conn: &mut PeerConnection, pred: impl Fn(&Event) -> bool) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = conn.receive().await {
        let done = pred(&event);
        events.push(event);
        if done {
            break;
        }
    }
    events
}

pub fn chunk(bytes: &[u8]) -> Event {
    Event::AudioChunk(AudioChunk {
        format: AudioFormat::default(),
        timestamp: None,
        audio: bytes.to_vec(),
    })
}

pub fn audio_start() -> Event {
    Event::AudioStart(AudioStart {
        format: AudioFormat::default(),
        timestamp: None,
    })
}

pub fn audio_stop() -> Event {
    Event::AudioStop(AudioStop { timestamp: None })
}

pub fn transcript(text: &str) -> Event {
    Event::Transcript(Transcript { text: text.to_string() })
}

pub fn chunk_payloads(events: &[Event]) -> Vec<Vec<u8>> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::AudioChunk(chunk) => Some(chunk.audio.clone()),
            _ => None,
        })
        .collect()
}

/// Satellite that streams `chunks` after `run-pipeline`, then records
/// everything it is sent until the session hangs up
pub async fn streaming_satellite(chunks: Vec<Vec<u8>>) -> (Endpoint, JoinHandle<Vec<Event>>) {
    spawn_peer(PeerRole::Satellite, move |mut conn| async move {
        let mut seen = receive_until(&mut conn, |e| matches!(e, Event::RunPipeline(_))).await;
        conn.send(&audio_start()).await.unwrap();
        for bytes in &chunks {
            conn.send(&chunk(bytes)).await.unwrap();
        }
        conn.send(&audio_stop()).await.unwrap();
        seen.extend(drain(&mut conn).await);
        seen
    })
    .await
}

/// ASR service that answers the first audio-stop with `text`
pub async fn transcribing_asr(text: &'static str) -> (Endpoint, JoinHandle<Vec<Event>>) {
    spawn_peer(PeerRole::Asr, move |mut conn| async move {
        let mut seen = receive_until(&mut conn, |e| matches!(e, Event::AudioStop(_))).await;
        conn.send(&transcript(text)).await.unwrap();
        seen.extend(drain(&mut conn).await);
        seen
    })
    .await
}

/// ASR service that never answers; returns once the session closes it
pub async fn silent_asr() -> (Endpoint, JoinHandle<Vec<Event>>) {
    spawn_peer(PeerRole::Asr, |mut conn| async move { drain(&mut conn).await }).await
}

/// TTS service that answers `synthesize` with the given audio chunks
pub async fn speaking_tts(chunks: Vec<Vec<u8>>) -> (Endpoint, JoinHandle<Vec<Event>>) {
    spawn_peer(PeerRole::Tts, move |mut conn| async move {
        let mut seen = receive_until(&mut conn, |e| matches!(e, Event::Synthesize(_))).await;
        conn.send(&audio_start()).await.unwrap();
        for bytes in &chunks {
            conn.send(&chunk(bytes)).await.unwrap();
        }
        conn.send(&audio_stop()).await.unwrap();
        seen.extend(drain(&mut conn).await);
        seen
    })
    .await
}

pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        language: Some("en".to_string()),
        transcript_timeout: Duration::from_millis(300),
        ..PipelineConfig::default()
    }
}

pub fn registry_with(config: PipelineConfig, pool: BackendPool) -> (SessionRegistry, Arc<ResultBoard>) {
    let board = Arc::new(ResultBoard::new());
    let sinks: Vec<Arc<dyn ResultSink>> = vec![board.clone() as Arc<dyn ResultSink>];
    (SessionRegistry::new(config, pool, sinks), board)
}

pub fn registry() -> (SessionRegistry, Arc<ResultBoard>) {
    registry_with(fast_config(), BackendPool::disabled())
}

pub fn endpoints(satellite: Endpoint, asr: Endpoint) -> DeviceEndpoints {
    DeviceEndpoints::new(satellite, asr)
}

/// Poll `check` until it returns true or `STEP` elapses
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + STEP;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Join a fake peer, failing the test if it does not finish in time
pub async fn join<T>(handle: JoinHandle<T>) -> T {
    tokio::time::timeout(STEP, handle)
        .await
        .expect("fake peer did not finish; connection left open")
        .expect("fake peer panicked")
}
