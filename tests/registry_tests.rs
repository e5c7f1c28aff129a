// Integration tests for the session registry and result board

mod common;

use async_trait::async_trait;
use common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wyoming_trigger::{
    BackendPool, Event, PeerRole, ResultBoard, ResultSink, SessionOutcome, SessionRegistry,
    SessionSnapshot, SessionState, TriggerError, TriggerOptions,
};

/// Sink whose first publish stalls, keeping that session in its completion step
struct StallFirstSink {
    stalled: AtomicBool,
}

#[async_trait]
impl ResultSink for StallFirstSink {
    async fn publish(&self, _result: &SessionSnapshot) -> anyhow::Result<()> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stall-first"
    }
}

#[tokio::test]
async fn test_second_trigger_for_busy_device_is_rejected() {
    let (satellite, _satellite_task) = spawn_peer(PeerRole::Satellite, |mut conn| async move {
        drain(&mut conn).await
    })
    .await;
    let (asr, _asr_task) = silent_asr().await;
    let (registry, _board) = registry();

    let first = registry
        .trigger("kitchen", endpoints(satellite.clone(), asr.clone()), TriggerOptions::default())
        .unwrap();
    let second = registry.trigger("kitchen", endpoints(satellite, asr), TriggerOptions::default());

    assert_eq!(
        second,
        Err(TriggerError::AlreadyActive {
            device_id: "kitchen".to_string(),
            session_id: first,
        })
    );
    assert_eq!(registry.active_count(), 1);

    registry.cancel(first).unwrap();
    let result = registry.wait(first).await.unwrap();
    assert_eq!(result.state, SessionState::Cancelled);
}

#[tokio::test]
async fn test_devices_run_concurrently() {
    let (registry, _board) = registry();
    let mut sessions = Vec::new();

    for (device, text) in [("kitchen", "one"), ("office", "two")] {
        let (satellite, _satellite_task) = streaming_satellite(vec![b"c".to_vec()]).await;
        let (asr, _asr_task) = transcribing_asr(text).await;
        let session_id = registry
            .trigger(device, endpoints(satellite, asr), TriggerOptions::default())
            .unwrap();
        sessions.push((device, text, session_id));
    }

    for (device, text, session_id) in sessions {
        let result = registry.wait(session_id).await.unwrap();
        assert_eq!(result.device_id, device);
        assert_eq!(result.transcript, text);
        assert_eq!(result.state, SessionState::Success);
    }
}

#[tokio::test]
async fn test_cancel_frees_device_for_immediate_retrigger() {
    let (satellite, _satellite_task) = spawn_peer(PeerRole::Satellite, |mut conn| async move {
        receive_until(&mut conn, |e| matches!(e, Event::RunPipeline(_))).await;
        conn.send(&audio_start()).await.unwrap();
        conn.send(&chunk(b"c1")).await.unwrap();
        drain(&mut conn).await
    })
    .await;
    let (asr, asr_task) = silent_asr().await;
    let (registry, _board) = registry();

    let session_id = registry
        .trigger("kitchen", endpoints(satellite, asr), TriggerOptions::default())
        .unwrap();
    assert!(
        eventually(|| registry
            .active_session("kitchen")
            .is_some_and(|s| s.state == SessionState::StreamingAudio))
        .await
    );

    assert_eq!(registry.cancel(session_id), Ok(true));
    let result = registry.wait(session_id).await.unwrap();
    assert_eq!(result.state, SessionState::Cancelled);
    assert_eq!(result.outcome, Some(SessionOutcome::Cancelled));
    join(asr_task).await;

    // The slot is free as soon as the terminal state is committed
    let (satellite, _satellite_task) = streaming_satellite(vec![b"c".to_vec()]).await;
    let (asr, _asr_task) = transcribing_asr("again").await;
    let retry = registry.trigger("kitchen", endpoints(satellite, asr), TriggerOptions::default());
    assert!(retry.is_ok());
    assert_ne!(retry.unwrap(), session_id);
}

#[tokio::test]
async fn test_cancel_of_finished_session_reports_false() {
    let (satellite, _satellite_task) = streaming_satellite(vec![b"c".to_vec()]).await;
    let (asr, _asr_task) = transcribing_asr("done").await;
    let (registry, _board) = registry();

    let session_id = registry
        .trigger("kitchen", endpoints(satellite, asr), TriggerOptions::default())
        .unwrap();
    registry.wait(session_id).await.unwrap();

    assert_eq!(registry.cancel(session_id), Ok(false));
    let result = registry.get_result(session_id).unwrap();
    assert_eq!(result.state, SessionState::Success);
}

#[tokio::test]
async fn test_cancel_of_unknown_session_is_an_error() {
    let (registry, _board) = registry();
    let unknown = Uuid::new_v4();

    assert_eq!(registry.cancel(unknown), Err(TriggerError::UnknownSession(unknown)));
    assert!(registry.get_result(unknown).is_none());
    assert!(registry.wait(unknown).await.is_none());
}

#[tokio::test]
async fn test_completed_session_is_published_to_board() {
    let (satellite, _satellite_task) = streaming_satellite(vec![b"c".to_vec()]).await;
    let (asr, _asr_task) = transcribing_asr("lights off").await;
    let (registry, board) = registry();

    let session_id = registry
        .trigger("kitchen", endpoints(satellite, asr), TriggerOptions::default())
        .unwrap();
    registry.wait(session_id).await.unwrap();

    assert!(eventually(|| board.get("kitchen").is_some()).await);
    let result = board.get("kitchen").unwrap();
    assert_eq!(result.session_id, session_id);
    assert_eq!(result.outcome, SessionOutcome::Success);
    assert_eq!(result.text, "lights off");
    assert!(!result.is_error());

    assert!(eventually(|| registry.last_result("kitchen").is_some()).await);
    assert_eq!(registry.last_result("kitchen").unwrap().session_id, session_id);
    assert!(registry.active_session("kitchen").is_none());
    assert_eq!(registry.active_count(), 0);
}

#[tokio::test]
async fn test_failed_session_is_published_as_error() {
    let satellite = dead_endpoint().await;
    let (asr, _asr_task) = silent_asr().await;
    let (registry, board) = registry();

    registry
        .trigger("office", endpoints(satellite, asr), TriggerOptions::default())
        .unwrap();

    assert!(eventually(|| board.get("office").is_some()).await);
    let result = board.get("office").unwrap();
    assert_eq!(result.outcome, SessionOutcome::Disconnected);
    assert!(result.is_error());
    assert!(result.text.is_empty());
    assert_eq!(board.all().len(), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_live_sessions() {
    let (satellite, _satellite_task) = spawn_peer(PeerRole::Satellite, |mut conn| async move {
        drain(&mut conn).await
    })
    .await;
    let (asr, _asr_task) = silent_asr().await;
    let (registry, _board) = registry();

    let session_id = registry
        .trigger("kitchen", endpoints(satellite, asr), TriggerOptions::default())
        .unwrap();

    tokio::time::timeout(STEP, registry.shutdown()).await.unwrap();

    let result = registry.get_result(session_id).unwrap();
    assert_eq!(result.state, SessionState::Cancelled);
}

#[tokio::test]
async fn test_slow_publish_of_older_session_keeps_newer_result() {
    let board = Arc::new(ResultBoard::new());
    let sinks: Vec<Arc<dyn ResultSink>> = vec![
        board.clone() as Arc<dyn ResultSink>,
        Arc::new(StallFirstSink {
            stalled: AtomicBool::new(false),
        }),
    ];
    let registry = SessionRegistry::new(fast_config(), BackendPool::disabled(), sinks);

    // First session fails fast, then stalls while publishing
    let (asr, _asr_task) = silent_asr().await;
    let first = registry
        .trigger("kitchen", endpoints(dead_endpoint().await, asr), TriggerOptions::default())
        .unwrap();
    assert!(registry.wait(first).await.unwrap().is_terminal());

    // Its slot already counts as free
    let (satellite, _satellite_task) = streaming_satellite(vec![b"c".to_vec()]).await;
    let (asr, _asr_task) = transcribing_asr("second").await;
    let second = registry
        .trigger("kitchen", endpoints(satellite, asr), TriggerOptions::default())
        .unwrap();
    assert_eq!(registry.wait(second).await.unwrap().state, SessionState::Success);

    // Let the stalled completion of the first session land
    tokio::time::sleep(Duration::from_millis(800)).await;

    let result = registry.get_result(second).unwrap();
    assert_eq!(result.transcript, "second");
    assert_eq!(registry.cancel(second), Ok(false));
    assert_eq!(registry.last_result("kitchen").unwrap().session_id, second);
    assert!(registry.active_session("kitchen").is_none());
}
