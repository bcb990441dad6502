//! Integration tests for orchestrated operations
//!
//! Covers the two core guarantees of the operation layer: identical
//! concurrent requests collapse to one transport request, and operations
//! superseded by a terminal transition complete with a stale-state failure
//! (or success, for hang-up) instead of wedging.

mod common;

use std::sync::Arc;
use std::time::Duration;

use clearcall_core::call::{CallState, DtmfTone};
use clearcall_core::client::CallFeatureKind;
use clearcall_core::media::CameraFacing;
use clearcall_core::participant::{ParticipantId, ParticipantState};
use clearcall_core::transport::{
    MediaOptions, ParticipantDescriptor, TransportError, TransportEvent,
};
use clearcall_core::{ClientError, ClientEvent, ClientManager};

use common::{init_tracing, settle, started_client, wait_for_event, MockTransport};

async fn connected_call(client: &Arc<ClientManager>) -> clearcall_core::CallId {
    let call_id = client
        .start_call(vec!["8:user:bob".to_string()], MediaOptions::default())
        .await
        .unwrap();
    let mut events = client.subscribe_events();
    client
        .transport_event_sender()
        .send(TransportEvent::CallStateChanged {
            call_id,
            state: CallState::Connected,
            end_reason: None,
        })
        .await
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::CallStateChanged { info, .. } if info.new_state == CallState::Connected)
    })
    .await;
    call_id
}

#[tokio::test]
async fn concurrent_identical_hangups_collapse_to_one_request() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport.clone()).await;
    let call_id = connected_call(&client).await;

    transport.delay("hang_up", Duration::from_millis(200));

    let c1 = client.clone();
    let c2 = client.clone();
    let first = tokio::spawn(async move { c1.hangup_call(&call_id).await });
    let second = tokio::spawn(async move { c2.hangup_call(&call_id).await });

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(transport.request_count("hang_up"), 1);
}

#[tokio::test]
async fn second_caller_observes_first_callers_failure() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport.clone()).await;
    let call_id = connected_call(&client).await;

    transport.delay("set_hold", Duration::from_millis(200));
    transport.fail(
        "set_hold",
        TransportError::request_failed("hold rejected by server"),
    );

    let c1 = client.clone();
    let c2 = client.clone();
    let first = tokio::spawn(async move { c1.hold_call(&call_id).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = tokio::spawn(async move { c2.hold_call(&call_id).await });

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert!(matches!(first, Err(ClientError::Transport { .. })));
    assert!(matches!(second, Err(ClientError::Transport { .. })));
    // Both callers got an outcome from a single transport request.
    assert_eq!(transport.request_count("set_hold"), 1);
}

#[tokio::test]
async fn different_operations_do_not_collapse() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport.clone()).await;
    let call_id = connected_call(&client).await;

    client.send_dtmf(&call_id, DtmfTone::One).await.unwrap();
    client.send_dtmf(&call_id, DtmfTone::Two).await.unwrap();
    assert_eq!(transport.request_count("send_dtmf"), 2);
}

#[tokio::test]
async fn mute_superseded_by_disconnect_fails_stale() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport.clone()).await;
    let call_id = connected_call(&client).await;

    // The transport request hangs; the call disconnects underneath it.
    transport.delay("set_muted", Duration::from_secs(30));

    let c = client.clone();
    let mute_task = tokio::spawn(async move { c.mute_call(&call_id).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    client
        .transport_event_sender()
        .send(TransportEvent::CallStateChanged {
            call_id,
            state: CallState::Disconnected,
            end_reason: None,
        })
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), mute_task)
        .await
        .expect("mute did not complete after terminal transition")
        .unwrap();
    assert!(matches!(result, Err(ClientError::StaleState { .. })));
}

#[tokio::test]
async fn hangup_racing_a_disconnect_event_succeeds() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport.clone()).await;
    let call_id = connected_call(&client).await;

    transport.delay("hang_up", Duration::from_secs(30));

    let c = client.clone();
    let hangup_task = tokio::spawn(async move { c.hangup_call(&call_id).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    client
        .transport_event_sender()
        .send(TransportEvent::CallStateChanged {
            call_id,
            state: CallState::Disconnected,
            end_reason: None,
        })
        .await
        .unwrap();

    // Never stuck in Disconnecting: success, not an error.
    let result = tokio::time::timeout(Duration::from_secs(2), hangup_task)
        .await
        .expect("hangup did not complete after terminal transition")
        .unwrap();
    assert!(result.is_ok());
    settle().await;
    assert!(client.get_call(&call_id).is_err());
}

#[tokio::test]
async fn hold_requires_connected_state() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport).await;

    // Still Connecting: hold is invalid.
    let call_id = client
        .start_call(vec!["8:user:bob".to_string()], MediaOptions::default())
        .await
        .unwrap();
    let result = client.hold_call(&call_id).await;
    assert!(matches!(
        result,
        Err(ClientError::InvalidCallState {
            current_state: CallState::Connecting,
            ..
        })
    ));
}

#[tokio::test]
async fn hold_and_resume_emit_media_events() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport.clone()).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();

    client.hold_call(&call_id).await.unwrap();
    assert_eq!(transport.request_count("set_hold"), 1);
    wait_for_event(&mut events, |e| {
        matches!(
            e,
            ClientEvent::MediaEvent { info, .. }
                if info.event_type == (clearcall_core::MediaEventType::HoldStateChanged { on_hold: true })
        )
    })
    .await;

    // Transport confirms with the LocalHold state.
    client
        .transport_event_sender()
        .send(TransportEvent::CallStateChanged {
            call_id,
            state: CallState::LocalHold,
            end_reason: None,
        })
        .await
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::CallStateChanged { info, .. } if info.new_state == CallState::LocalHold)
    })
    .await;
    assert!(client.is_call_on_hold(&call_id).unwrap());

    client.resume_call(&call_id).await.unwrap();
    assert_eq!(transport.request_count("set_hold"), 2);
}

#[tokio::test]
async fn dtmf_requires_connected_state() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport).await;
    let call_id = client
        .start_call(vec!["8:user:bob".to_string()], MediaOptions::default())
        .await
        .unwrap();

    let result = client.send_dtmf(&call_id, DtmfTone::Five).await;
    assert!(matches!(result, Err(ClientError::InvalidCallState { .. })));

    let result = client.send_dtmf(&uuid::Uuid::new_v4(), DtmfTone::Five).await;
    assert!(matches!(result, Err(ClientError::CallNotFound { .. })));
}

#[tokio::test]
async fn video_start_switch_stop_round_trip() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport.clone()).await;
    let call_id = connected_call(&client).await;

    let stream = client.start_video(&call_id).await.unwrap();
    assert!(stream.is_sending());
    assert_eq!(stream.camera_facing(), CameraFacing::Front);
    assert_eq!(transport.request_count("start_video"), 1);

    // Starting again returns the existing stream without a new request.
    let again = client.start_video(&call_id).await.unwrap();
    assert_eq!(again.id(), stream.id());
    assert_eq!(transport.request_count("start_video"), 1);

    let facing = client.switch_camera(&call_id).await.unwrap();
    assert_eq!(facing, CameraFacing::Back);
    assert_eq!(stream.camera_facing(), CameraFacing::Back);

    let stream_id = stream.id();
    client.stop_video(&call_id, &stream_id).await.unwrap();
    assert!(client
        .get_call(&call_id)
        .unwrap()
        .local_video_streams()
        .is_empty());

    // No active video stream anymore.
    let result = client.switch_camera(&call_id).await;
    assert!(matches!(result, Err(ClientError::VideoNotStarted { .. })));
}

#[tokio::test]
async fn permission_failures_keep_their_classification() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport.clone()).await;
    let call_id = connected_call(&client).await;

    transport.fail(
        "start_video",
        TransportError::PermissionDenied {
            permission: "camera".to_string(),
        },
    );
    let result = client.start_video(&call_id).await;
    assert!(matches!(
        result,
        Err(ClientError::PermissionDenied { .. })
    ));
}

#[tokio::test]
async fn lobby_admission_requires_in_lobby_participant() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport.clone()).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();

    client
        .transport_event_sender()
        .send(TransportEvent::ParticipantsUpdated {
            call_id,
            added: vec![
                ParticipantDescriptor {
                    id: ParticipantId::new("8:user:lobby"),
                    display_name: None,
                    state: ParticipantState::InLobby,
                    is_muted: false,
                    is_speaking: false,
                },
                ParticipantDescriptor {
                    id: ParticipantId::new("8:user:connected"),
                    display_name: None,
                    state: ParticipantState::Connected,
                    is_muted: false,
                    is_speaking: false,
                },
            ],
            removed: vec![],
        })
        .await
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::ParticipantsChanged { .. })
    })
    .await;

    client
        .admit_lobby_participant(&call_id, &ParticipantId::new("8:user:lobby"))
        .await
        .unwrap();
    assert_eq!(transport.request_count("admit_lobby_participant"), 1);

    let result = client
        .admit_lobby_participant(&call_id, &ParticipantId::new("8:user:connected"))
        .await;
    assert!(matches!(
        result,
        Err(ClientError::InvalidParticipantState { .. })
    ));

    let result = client
        .decline_lobby_participant(&call_id, &ParticipantId::new("8:user:missing"))
        .await;
    assert!(matches!(result, Err(ClientError::ParticipantNotFound { .. })));

    client.admit_all_lobby_participants(&call_id).await.unwrap();
    assert_eq!(transport.request_count("admit_all_lobby_participants"), 1);
}

#[tokio::test]
async fn add_and_remove_participant_requests() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport.clone()).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();

    client
        .add_participant(&call_id, "8:user:carol")
        .await
        .unwrap();
    assert_eq!(transport.request_count("add_participant"), 1);

    client
        .transport_event_sender()
        .send(TransportEvent::ParticipantsUpdated {
            call_id,
            added: vec![ParticipantDescriptor {
                id: ParticipantId::new("8:user:carol"),
                display_name: Some("Carol".to_string()),
                state: ParticipantState::Connecting,
                is_muted: false,
                is_speaking: false,
            }],
            removed: vec![],
        })
        .await
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::ParticipantsChanged { .. })
    })
    .await;

    client
        .remove_participant(&call_id, &ParticipantId::new("8:user:carol"))
        .await
        .unwrap();
    assert_eq!(transport.request_count("remove_participant"), 1);

    let result = client
        .remove_participant(&call_id, &ParticipantId::new("8:user:nobody"))
        .await;
    assert!(matches!(result, Err(ClientError::ParticipantNotFound { .. })));
}

#[tokio::test]
async fn feature_state_changes_are_observable() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();

    client
        .transport_event_sender()
        .send(TransportEvent::RecordingStateChanged {
            call_id,
            active: true,
        })
        .await
        .unwrap();

    let event = wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::FeatureStateChanged { .. })
    })
    .await;
    match event {
        ClientEvent::FeatureStateChanged { info, .. } => {
            assert_eq!(info.feature, CallFeatureKind::Recording);
            assert!(info.is_active);
        }
        _ => unreachable!(),
    }

    let call = client.get_call(&call_id).unwrap();
    match call.feature(CallFeatureKind::Recording) {
        clearcall_core::CallFeature::Recording(recording) => {
            assert!(recording.is_active());
        }
        _ => unreachable!(),
    }
    match call.feature(CallFeatureKind::Transcription) {
        clearcall_core::CallFeature::Transcription(transcription) => {
            assert!(!transcription.is_active());
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn local_mute_events_from_transport_update_the_call() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();

    client
        .transport_event_sender()
        .send(TransportEvent::CallMuteChanged {
            call_id,
            muted: true,
        })
        .await
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(
            e,
            ClientEvent::MediaEvent { info, .. }
                if info.event_type == (clearcall_core::MediaEventType::MicrophoneStateChanged { muted: true })
        )
    })
    .await;
    assert!(client.get_call(&call_id).unwrap().is_muted());
}
