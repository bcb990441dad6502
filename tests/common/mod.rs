//! Shared test support: a scripted in-memory transport and client helpers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use clearcall_core::call::{CallDirection, CallId, CallState, DtmfTone};
use clearcall_core::media::{CameraFacing, StreamId};
use clearcall_core::participant::ParticipantId;
use clearcall_core::transport::{
    BearerToken, CallDescriptor, CallTransport, JoinLocator, MediaOptions, TransportError,
};
use clearcall_core::{ClientBuilder, ClientEvent, ClientManager, StaticCredentialProvider};

/// In-memory transport that records requests and can be scripted with
/// per-operation delays and failures.
pub struct MockTransport {
    requests: Mutex<Vec<String>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    failures: Mutex<HashMap<&'static str, TransportError>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        })
    }

    /// Make the named operation take this long before completing
    pub fn delay(&self, op: &'static str, duration: Duration) {
        self.delays.lock().unwrap().insert(op, duration);
    }

    /// Make the named operation fail
    pub fn fail(&self, op: &'static str, error: TransportError) {
        self.failures.lock().unwrap().insert(op, error);
    }

    /// How many times the named operation was requested
    pub fn request_count(&self, op: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == op)
            .count()
    }

    async fn record(&self, op: &'static str) -> Result<(), TransportError> {
        self.requests.lock().unwrap().push(op.to_string());
        let delay = self.delays.lock().unwrap().get(op).copied();
        if let Some(duration) = delay {
            tokio::time::sleep(duration).await;
        }
        let failure = self.failures.lock().unwrap().get(op).cloned();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn outgoing_descriptor(options: &MediaOptions) -> CallDescriptor {
        CallDescriptor {
            call_id: Uuid::new_v4(),
            direction: CallDirection::Outgoing,
            state: CallState::Connecting,
            remote_display_name: None,
            is_muted: options.microphone_muted,
        }
    }
}

#[async_trait]
impl CallTransport for MockTransport {
    async fn start_call(
        &self,
        _token: &BearerToken,
        _callees: &[String],
        options: &MediaOptions,
    ) -> Result<CallDescriptor, TransportError> {
        self.record("start_call").await?;
        Ok(Self::outgoing_descriptor(options))
    }

    async fn join_call(
        &self,
        _token: &BearerToken,
        _locator: &JoinLocator,
        options: &MediaOptions,
    ) -> Result<CallDescriptor, TransportError> {
        self.record("join_call").await?;
        Ok(Self::outgoing_descriptor(options))
    }

    async fn accept_call(
        &self,
        _token: &BearerToken,
        _call_id: &CallId,
        _options: &MediaOptions,
    ) -> Result<(), TransportError> {
        self.record("accept_call").await
    }

    async fn reject_call(&self, _call_id: &CallId) -> Result<(), TransportError> {
        self.record("reject_call").await
    }

    async fn hang_up(&self, _call_id: &CallId) -> Result<(), TransportError> {
        self.record("hang_up").await
    }

    async fn set_hold(&self, _call_id: &CallId, _on_hold: bool) -> Result<(), TransportError> {
        self.record("set_hold").await
    }

    async fn set_muted(&self, _call_id: &CallId, _muted: bool) -> Result<(), TransportError> {
        self.record("set_muted").await
    }

    async fn send_dtmf(&self, _call_id: &CallId, _tone: DtmfTone) -> Result<(), TransportError> {
        self.record("send_dtmf").await
    }

    async fn start_video(
        &self,
        _call_id: &CallId,
        _facing: CameraFacing,
    ) -> Result<StreamId, TransportError> {
        self.record("start_video").await?;
        Ok(Uuid::new_v4())
    }

    async fn stop_video(
        &self,
        _call_id: &CallId,
        _stream_id: &StreamId,
    ) -> Result<(), TransportError> {
        self.record("stop_video").await
    }

    async fn switch_camera(
        &self,
        _call_id: &CallId,
        _facing: CameraFacing,
    ) -> Result<(), TransportError> {
        self.record("switch_camera").await
    }

    async fn add_participant(
        &self,
        _call_id: &CallId,
        _identity: &str,
    ) -> Result<(), TransportError> {
        self.record("add_participant").await
    }

    async fn remove_participant(
        &self,
        _call_id: &CallId,
        _participant_id: &ParticipantId,
    ) -> Result<(), TransportError> {
        self.record("remove_participant").await
    }

    async fn admit_lobby_participant(
        &self,
        _call_id: &CallId,
        _participant_id: &ParticipantId,
    ) -> Result<(), TransportError> {
        self.record("admit_lobby_participant").await
    }

    async fn admit_all_lobby_participants(&self, _call_id: &CallId) -> Result<(), TransportError> {
        self.record("admit_all_lobby_participants").await
    }

    async fn decline_lobby_participant(
        &self,
        _call_id: &CallId,
        _participant_id: &ParticipantId,
    ) -> Result<(), TransportError> {
        self.record("decline_lobby_participant").await
    }
}

/// Build a started client around the given mock transport.
pub async fn started_client(transport: Arc<MockTransport>) -> Arc<ClientManager> {
    let client = ClientBuilder::new()
        .display_name("Test Client")
        .operation_timeout(Duration::from_secs(5))
        .credential(Arc::new(StaticCredentialProvider::new("test-token")))
        .transport(transport)
        .build()
        .await
        .expect("failed to build client");
    client.start().await.expect("failed to start client");
    client
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("clearcall_core=debug")
        .with_test_writer()
        .try_init();
}

/// Give the event loop a beat to finish the work that follows a broadcast
/// (removals land after the event carrying them goes out).
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Await the next broadcast event matching the predicate, with a timeout.
pub async fn wait_for_event(
    rx: &mut tokio::sync::broadcast::Receiver<ClientEvent>,
    mut predicate: impl FnMut(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
