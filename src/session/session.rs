use super::config::PipelineConfig;
use super::snapshot::{SessionSnapshot, SessionState};
use crate::audio::AudioCapture;
use crate::gateway::DeviceEndpoints;
use crate::peer::{BackendPool, PeerConnection, PeerError, PeerRole};
use crate::protocol::{
    AudioStart, Event, Ping, RunPipeline, Synthesize, Transcribe, Transcript,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why a session stopped; maps one-to-one onto the terminal states
#[derive(Debug)]
enum Exit {
    Disconnected(String),
    BackendError(String),
    Timeout,
    Cancelled,
}

impl Exit {
    fn state(&self) -> SessionState {
        match self {
            Exit::Disconnected(_) => SessionState::Disconnected,
            Exit::BackendError(_) => SessionState::BackendError,
            Exit::Timeout => SessionState::Timeout,
            Exit::Cancelled => SessionState::Cancelled,
        }
    }

    fn detail(&self, timeout_secs: f64) -> String {
        match self {
            Exit::Disconnected(reason) => format!("satellite disconnected: {}", reason),
            Exit::BackendError(reason) => format!("backend error: {}", reason),
            Exit::Timeout => format!("no transcript within {:.1}s", timeout_secs),
            Exit::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Connections and files a session owns until it ends
#[derive(Default)]
struct Owned {
    satellite: Option<PeerConnection>,
    asr: Option<PeerConnection>,
    tts: Option<PeerConnection>,
    capture: Option<AudioCapture>,
}

/// Per-trigger options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct TriggerOptions {
    /// Overrides the configured ASR language
    pub language: Option<String>,
}

/// Drives one wake-word-free pipeline run against a satellite
///
/// The satellite is asked to stream immediately (`run-pipeline` starting at
/// the ASR stage), its audio is relayed in receipt order to ASR, and the
/// transcript (plus optional TTS audio) is played back to the satellite.
pub struct Session {
    snapshot: watch::Sender<SessionSnapshot>,
    endpoints: DeviceEndpoints,
    options: TriggerOptions,
    config: Arc<PipelineConfig>,
    pool: Arc<BackendPool>,
    cancel: watch::Receiver<bool>,
}

impl Session {
    /// Create a session in the `Triggered` state
    ///
    /// Returns the session together with a receiver that always holds its
    /// latest committed snapshot.
    pub fn new(
        session_id: Uuid,
        device_id: &str,
        endpoints: DeviceEndpoints,
        options: TriggerOptions,
        config: Arc<PipelineConfig>,
        pool: Arc<BackendPool>,
        cancel: watch::Receiver<bool>,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (snapshot, snapshot_rx) = watch::channel(SessionSnapshot::new(session_id, device_id));

        (
            Self {
                snapshot,
                endpoints,
                options,
                config,
                pool,
                cancel,
            },
            snapshot_rx,
        )
    }

    /// Run to a terminal state, release every owned connection and return
    /// the final snapshot
    pub async fn run(mut self) -> SessionSnapshot {
        let (session_id, device_id) = {
            let snapshot = self.snapshot.borrow();
            (snapshot.session_id, snapshot.device_id.clone())
        };
        info!("Session {} started for device {}", session_id, device_id);

        let mut owned = Owned::default();
        let result = self.drive(&mut owned).await;

        self.release(&mut owned, result.is_ok()).await;

        let timeout_secs = self.config.transcript_timeout.as_secs_f64();
        self.snapshot.send_modify(|snapshot| {
            if snapshot.outcome.is_some() {
                return;
            }
            let state = match &result {
                Ok(()) => SessionState::Success,
                Err(exit) => {
                    snapshot.error = Some(exit.detail(timeout_secs));
                    exit.state()
                }
            };
            snapshot.state = state;
            snapshot.outcome = state.outcome();
            snapshot.finished_at = Some(Utc::now());
        });

        let snapshot = self.snapshot.borrow().clone();
        match &snapshot.error {
            None => info!(
                "Session {} for {} finished: {} ({:?})",
                session_id, device_id, snapshot.state, snapshot.transcript
            ),
            Some(detail) => warn!(
                "Session {} for {} finished: {} ({})",
                session_id, device_id, snapshot.state, detail
            ),
        }

        snapshot
    }

    async fn drive(&mut self, owned: &mut Owned) -> Result<(), Exit> {
        // TRIGGERED
        let satellite = tokio::select! {
            _ = cancelled(&mut self.cancel) => return Err(Exit::Cancelled),
            conn = PeerConnection::connect(&self.endpoints.satellite, PeerRole::Satellite) => {
                owned.satellite.insert(conn.map_err(|e| Exit::Disconnected(e.to_string()))?)
            }
        };

        let asr = tokio::select! {
            _ = cancelled(&mut self.cancel) => return Err(Exit::Cancelled),
            conn = self.pool.checkout(&self.endpoints.asr, PeerRole::Asr) => {
                owned.asr.insert(conn.map_err(|e| Exit::BackendError(e.to_string()))?)
            }
        };

        let run = Event::RunPipeline(RunPipeline {
            start_stage: "asr".to_string(),
            end_stage: if self.endpoints.tts.is_some() { "tts" } else { "asr" }.to_string(),
            name: self.config.pipeline_name.clone(),
            restart_on_end: Some(false),
        });
        satellite.send(&run).await.map_err(disconnected)?;

        let start = self.await_audio_start(satellite, asr).await?;

        // STREAMING_AUDIO
        self.transition(SessionState::StreamingAudio);
        let language = self
            .options
            .language
            .clone()
            .or_else(|| self.config.language.clone());
        asr.send(&Event::Transcribe(Transcribe { name: None, language }))
            .await
            .map_err(backend)?;
        asr.send(&Event::AudioStart(start.clone()))
            .await
            .map_err(backend)?;

        if let Some(dir) = &self.config.capture_dir {
            let session_id = self.snapshot.borrow().session_id.to_string();
            match AudioCapture::create(dir, &session_id, start.format) {
                Ok(capture) => owned.capture = Some(capture),
                Err(e) => warn!("Audio capture disabled for session {}: {:#}", session_id, e),
            }
        }

        self.stream_audio(satellite, asr, &mut owned.capture).await?;

        // AWAITING_TRANSCRIPT
        self.transition(SessionState::AwaitingTranscript);
        let text = self.await_transcript(satellite, asr).await?;

        // RESPONDING
        self.snapshot.send_modify(|snapshot| {
            snapshot.transcript.push_str(&text);
            snapshot.state = SessionState::Responding;
        });
        debug!("Session {} -> {}", self.snapshot.borrow().session_id, SessionState::Responding);

        self.respond(satellite, asr, &mut owned.tts, text).await
    }

    async fn await_audio_start(
        &mut self,
        satellite: &mut PeerConnection,
        asr: &mut PeerConnection,
    ) -> Result<AudioStart, Exit> {
        loop {
            tokio::select! {
                _ = cancelled(&mut self.cancel) => return Err(Exit::Cancelled),
                event = satellite.receive() => match event.map_err(disconnected)? {
                    Event::AudioStart(start) => {
                        info!(
                            "Satellite {} started streaming ({} Hz, {} bytes, {} ch)",
                            satellite.label(), start.format.rate, start.format.width, start.format.channels
                        );
                        return Ok(start);
                    }
                    Event::AudioChunk(_) => warn!("Audio chunk before audio-start from {}; dropped", satellite.label()),
                    other => handle_satellite_aside(satellite, other).await?,
                },
                event = asr.receive() => handle_backend_aside(event)?,
            }
        }
    }

    async fn stream_audio(
        &mut self,
        satellite: &mut PeerConnection,
        asr: &mut PeerConnection,
        capture: &mut Option<AudioCapture>,
    ) -> Result<(), Exit> {
        loop {
            tokio::select! {
                _ = cancelled(&mut self.cancel) => return Err(Exit::Cancelled),
                event = satellite.receive() => match event.map_err(disconnected)? {
                    Event::AudioChunk(chunk) => {
                        if let Some(writer) = capture.as_mut() {
                            if let Err(e) = writer.write(&chunk.audio) {
                                error!("Audio capture failed, stopping capture: {:#}", e);
                                *capture = None;
                            }
                        }
                        asr.send(&Event::AudioChunk(chunk)).await.map_err(backend)?;
                        self.snapshot.send_modify(|snapshot| snapshot.chunks_forwarded += 1);
                    }
                    Event::AudioStop(stop) => {
                        asr.send(&Event::AudioStop(stop)).await.map_err(backend)?;
                        return Ok(());
                    }
                    Event::AudioStart(_) => debug!("Repeated audio-start from {}; ignored", satellite.label()),
                    other => handle_satellite_aside(satellite, other).await?,
                },
                event = asr.receive() => handle_backend_aside(event)?,
            }
        }
    }

    async fn await_transcript(
        &mut self,
        satellite: &mut PeerConnection,
        asr: &mut PeerConnection,
    ) -> Result<String, Exit> {
        let deadline = tokio::time::sleep(self.config.transcript_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancelled(&mut self.cancel) => return Err(Exit::Cancelled),
                _ = &mut deadline => return Err(Exit::Timeout),
                event = asr.receive() => match event.map_err(backend)? {
                    Event::Transcript(Transcript { text }) => return Ok(text),
                    Event::Error(e) => return Err(Exit::BackendError(e.text)),
                    other => debug!("Ignoring {} from ASR while awaiting transcript", other.event_type()),
                },
                event = satellite.receive() => {
                    let event = event.map_err(disconnected)?;
                    handle_satellite_aside(satellite, event).await?;
                }
            }
        }
    }

    async fn respond(
        &mut self,
        satellite: &mut PeerConnection,
        asr: &mut PeerConnection,
        tts_slot: &mut Option<PeerConnection>,
        text: String,
    ) -> Result<(), Exit> {
        satellite
            .send(&Event::Transcript(Transcript { text: text.clone() }))
            .await
            .map_err(disconnected)?;

        let Some(tts_endpoint) = self.endpoints.tts.clone() else {
            return Ok(());
        };
        if text.trim().is_empty() {
            debug!("Empty transcript; skipping TTS");
            return Ok(());
        }

        let tts = tokio::select! {
            _ = cancelled(&mut self.cancel) => return Err(Exit::Cancelled),
            conn = self.pool.checkout(&tts_endpoint, PeerRole::Tts) => {
                tts_slot.insert(conn.map_err(|e| Exit::BackendError(e.to_string()))?)
            }
        };
        tts.send(&Event::Synthesize(Synthesize { text, voice: None }))
            .await
            .map_err(backend)?;

        // ASR is done; only an explicit error from it still matters
        let mut asr_open = true;
        loop {
            tokio::select! {
                _ = cancelled(&mut self.cancel) => return Err(Exit::Cancelled),
                event = tts.receive() => match event.map_err(backend)? {
                    event @ (Event::AudioStart(_) | Event::AudioChunk(_)) => {
                        satellite.send(&event).await.map_err(disconnected)?;
                    }
                    event @ Event::AudioStop(_) => {
                        satellite.send(&event).await.map_err(disconnected)?;
                        return Ok(());
                    }
                    Event::Error(e) => return Err(Exit::BackendError(e.text)),
                    other => debug!("Ignoring {} from TTS", other.event_type()),
                },
                event = satellite.receive() => match event.map_err(disconnected)? {
                    Event::Played => debug!("Satellite {} reported playback done", satellite.label()),
                    other => handle_satellite_aside(satellite, other).await?,
                },
                event = asr.receive(), if asr_open => match event {
                    Ok(Event::Error(e)) => return Err(Exit::BackendError(e.text)),
                    Ok(other) => debug!("Ignoring late {} from ASR", other.event_type()),
                    Err(_) => asr_open = false,
                },
            }
        }
    }

    fn transition(&self, state: SessionState) {
        self.snapshot.send_modify(|snapshot| {
            debug!("Session {} {} -> {}", snapshot.session_id, snapshot.state, state);
            snapshot.state = state;
        });
    }

    async fn release(&self, owned: &mut Owned, succeeded: bool) {
        if let Some(mut satellite) = owned.satellite.take() {
            satellite.close().await;
        }

        for (slot, endpoint) in [
            (owned.asr.take(), Some(&self.endpoints.asr)),
            (owned.tts.take(), self.endpoints.tts.as_ref()),
        ] {
            let (Some(mut conn), Some(endpoint)) = (slot, endpoint) else {
                continue;
            };
            if succeeded && self.pool.is_enabled() && conn.is_alive() {
                self.pool.checkin(endpoint, conn);
            } else {
                conn.close().await;
            }
        }

        if let Some(capture) = owned.capture.take() {
            match capture.finish() {
                Ok(path) => self.snapshot.send_modify(|snapshot| snapshot.audio_path = Some(path)),
                Err(e) => error!("Failed to finish audio capture: {:#}", e),
            }
        }
    }
}

/// Resolves once cancellation is requested; never resolves if the
/// cancel handle was dropped without cancelling
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Non-audio satellite traffic that does not advance the state machine
async fn handle_satellite_aside(satellite: &mut PeerConnection, event: Event) -> Result<(), Exit> {
    match event {
        Event::Ping(Ping { text }) => satellite
            .send(&Event::Pong(Ping { text }))
            .await
            .map_err(disconnected),
        Event::Error(e) => Err(Exit::Disconnected(format!("satellite reported error: {}", e.text))),
        other => {
            debug!("Ignoring {} from satellite {}", other.event_type(), satellite.label());
            Ok(())
        }
    }
}

/// Unsolicited backend traffic before a transcript is expected
fn handle_backend_aside(event: Result<Event, PeerError>) -> Result<(), Exit> {
    match event.map_err(backend)? {
        Event::Error(e) => Err(Exit::BackendError(e.text)),
        other => {
            debug!("Ignoring early {} from ASR", other.event_type());
            Ok(())
        }
    }
}

fn disconnected(e: PeerError) -> Exit {
    Exit::Disconnected(e.to_string())
}

fn backend(e: PeerError) -> Exit {
    Exit::BackendError(e.to_string())
}
