use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::results::ResultSink;
use crate::error::{Result, TriggerError};
use crate::gateway::DeviceEndpoints;
use crate::peer::BackendPool;
use crate::session::{PipelineConfig, Session, SessionSnapshot, TriggerOptions};

/// Registry entry for a device's current session
struct LiveSession {
    session_id: Uuid,
    /// Trigger order within the registry
    seq: u64,
    cancel: watch::Sender<bool>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl LiveSession {
    fn is_terminal(&self) -> bool {
        self.snapshot.borrow().is_terminal()
    }
}

#[derive(Default)]
struct RegistryState {
    /// device id → session occupying its slot
    live: HashMap<String, LiveSession>,
    /// device id → last completed session
    last: HashMap<String, Completed>,
    next_seq: u64,
}

struct Completed {
    seq: u64,
    snapshot: SessionSnapshot,
}

/// Process-wide table of triggered sessions, at most one live per device
///
/// Every mutation of the device table happens under one mutex that is never
/// held across an await point.
#[derive(Clone)]
pub struct SessionRegistry {
    state: Arc<Mutex<RegistryState>>,
    config: Arc<PipelineConfig>,
    pool: Arc<BackendPool>,
    sinks: Arc<Vec<Arc<dyn ResultSink>>>,
}

impl SessionRegistry {
    pub fn new(config: PipelineConfig, pool: BackendPool, sinks: Vec<Arc<dyn ResultSink>>) -> Self {
        info!(
            "Session registry ready (transcript timeout {:?}, pooling {}, {} result sink(s))",
            config.transcript_timeout,
            if pool.is_enabled() { "on" } else { "off" },
            sinks.len()
        );

        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            config: Arc::new(config),
            pool: Arc::new(pool),
            sinks: Arc::new(sinks),
        }
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    /// Start a session for `device_id` on a new task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger(&self, device_id: &str, endpoints: DeviceEndpoints, options: TriggerOptions) -> Result<Uuid> {
        let mut state = self.lock();

        if let Some(live) = state.live.get(device_id) {
            if !live.is_terminal() {
                return Err(TriggerError::AlreadyActive {
                    device_id: device_id.to_string(),
                    session_id: live.session_id,
                });
            }
        }

        let session_id = Uuid::new_v4();
        let seq = state.next_seq;
        state.next_seq += 1;
        let (cancel, cancel_rx) = watch::channel(false);
        let (session, snapshot) = Session::new(
            session_id,
            device_id,
            endpoints,
            options,
            Arc::clone(&self.config),
            Arc::clone(&self.pool),
            cancel_rx,
        );

        let registry = self.clone();
        let device = device_id.to_string();
        let task = tokio::spawn(async move {
            let result = session.run().await;
            registry.complete(&device, seq, result).await;
        });

        state.live.insert(
            device_id.to_string(),
            LiveSession {
                session_id,
                seq,
                cancel,
                snapshot,
                task: Some(task),
            },
        );

        info!("Triggered session {} for device {}", session_id, device_id);
        Ok(session_id)
    }

    /// Request cancellation of a session
    ///
    /// Returns `Ok(true)` if cancellation was requested and `Ok(false)` if
    /// the session had already reached a terminal state.
    pub fn cancel(&self, session_id: Uuid) -> Result<bool> {
        let state = self.lock();

        if let Some(live) = state.live.values().find(|live| live.session_id == session_id) {
            if live.is_terminal() {
                return Ok(false);
            }
            info!("Cancelling session {}", session_id);
            live.cancel.send_replace(true);
            return Ok(true);
        }

        if state.last.values().any(|done| done.snapshot.session_id == session_id) {
            return Ok(false);
        }

        Err(TriggerError::UnknownSession(session_id))
    }

    /// Latest committed snapshot of a live or last-completed session
    pub fn get_result(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        let state = self.lock();

        state
            .live
            .values()
            .find(|live| live.session_id == session_id)
            .map(|live| live.snapshot.borrow().clone())
            .or_else(|| {
                state
                    .last
                    .values()
                    .find(|done| done.snapshot.session_id == session_id)
                    .map(|done| done.snapshot.clone())
            })
    }

    /// Snapshot of the session occupying `device_id`'s slot
    pub fn active_session(&self, device_id: &str) -> Option<SessionSnapshot> {
        self.lock()
            .live
            .get(device_id)
            .map(|live| live.snapshot.borrow().clone())
    }

    /// Most recently completed session for `device_id`
    pub fn last_result(&self, device_id: &str) -> Option<SessionSnapshot> {
        self.lock().last.get(device_id).map(|done| done.snapshot.clone())
    }

    pub fn active_count(&self) -> usize {
        self.lock()
            .live
            .values()
            .filter(|live| !live.is_terminal())
            .count()
    }

    /// Wait until the session reaches a terminal state
    pub async fn wait(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        let mut rx = {
            let state = self.lock();
            match state.live.values().find(|live| live.session_id == session_id) {
                Some(live) => live.snapshot.clone(),
                None => {
                    return state
                        .last
                        .values()
                        .find(|done| done.snapshot.session_id == session_id)
                        .map(|done| done.snapshot.clone())
                }
            }
        };

        let waited = rx
            .wait_for(SessionSnapshot::is_terminal)
            .await
            .map(|snapshot| snapshot.clone());
        match waited {
            Ok(snapshot) => Some(snapshot),
            // Sender gone: the session task ended, its last value is final
            Err(_) => Some(rx.borrow().clone()),
        }
    }

    /// Cancel every live session and wait for their tasks to finish
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut state = self.lock();
            state
                .live
                .values_mut()
                .filter_map(|live| {
                    live.cancel.send_replace(true);
                    live.task.take()
                })
                .collect()
        };

        info!("Shutting down {} session task(s)", tasks.len());
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                error!("Session task panicked: {}", e);
            }
        }
    }

    /// Publish a terminal snapshot, then free the device slot
    async fn complete(&self, device_id: &str, seq: u64, snapshot: SessionSnapshot) {
        for sink in self.sinks.iter() {
            if let Err(e) = sink.publish(&snapshot).await {
                error!(
                    "Failed to publish session {} to {}: {:#}",
                    snapshot.session_id,
                    sink.name(),
                    e
                );
            }
        }

        let mut state = self.lock();
        let owns_slot = state
            .live
            .get(device_id)
            .is_some_and(|live| live.session_id == snapshot.session_id);
        if owns_slot {
            state.live.remove(device_id);
        }
        debug!("Released slot for device {} (session {})", device_id, snapshot.session_id);

        // A session that was overtaken while publishing must not replace a newer result
        let newer_recorded = state.last.get(device_id).is_some_and(|done| done.seq > seq);
        if newer_recorded {
            debug!("Session {} finished after a newer one for {}; not recorded", snapshot.session_id, device_id);
            return;
        }
        state.last.insert(device_id.to_string(), Completed { seq, snapshot });
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
