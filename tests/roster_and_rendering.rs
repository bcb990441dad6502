//! Integration tests for roster reconciliation and renderer lifetime
//!
//! The key property: removing a participant (or purging a call) disposes
//! every renderer bound to that participant's streams before the participant
//! object becomes unreachable.

mod common;

use std::sync::Arc;

use clearcall_core::media::{
    HeadlessSurfaceProvider, MediaStreamType, ScalingMode, VideoStream, VideoStreamRenderer,
};
use clearcall_core::participant::{ParticipantId, ParticipantState};
use clearcall_core::transport::{
    MediaOptions, ParticipantDescriptor, RemoteStreamDescriptor, TransportEvent,
};
use clearcall_core::{CallState, ClientError, ClientEvent};
use uuid::Uuid;

use common::{init_tracing, settle, started_client, wait_for_event, MockTransport};

fn participant(id: &str) -> ParticipantDescriptor {
    ParticipantDescriptor {
        id: ParticipantId::new(id),
        display_name: Some(id.to_string()),
        state: ParticipantState::Connected,
        is_muted: false,
        is_speaking: false,
    }
}

fn stream_descriptor() -> RemoteStreamDescriptor {
    RemoteStreamDescriptor {
        id: Uuid::new_v4(),
        stream_type: MediaStreamType::Video,
        is_available: true,
    }
}

/// Start a call and drive it to Connected; returns its id.
async fn connected_call(
    client: &Arc<clearcall_core::ClientManager>,
) -> clearcall_core::CallId {
    let call_id = client
        .start_call(vec!["8:user:bob".to_string()], MediaOptions::default())
        .await
        .unwrap();
    let mut events = client.subscribe_events();
    let tx = client.transport_event_sender();
    tx.send(TransportEvent::CallStateChanged {
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
async fn roster_tracks_added_and_removed_participants_in_order() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();
    let tx = client.transport_event_sender();

    tx.send(TransportEvent::ParticipantsUpdated {
        call_id,
        added: vec![participant("8:user:alice"), participant("8:user:bob")],
        removed: vec![],
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::ParticipantsChanged { .. })
    })
    .await;

    let call = client.get_call(&call_id).unwrap();
    let roster: Vec<String> = call
        .remote_participants()
        .iter()
        .map(|p| p.id().to_string())
        .collect();
    assert_eq!(roster, vec!["8:user:alice", "8:user:bob"]);

    tx.send(TransportEvent::ParticipantsUpdated {
        call_id,
        added: vec![],
        removed: vec![ParticipantId::new("8:user:alice")],
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::ParticipantsChanged { info, .. } if !info.removed.is_empty())
    })
    .await;
    settle().await;

    let roster: Vec<String> = client
        .get_call(&call_id)
        .unwrap()
        .remote_participants()
        .iter()
        .map(|p| p.id().to_string())
        .collect();
    assert_eq!(roster, vec!["8:user:bob"]);
}

#[tokio::test]
async fn participant_removal_disposes_bound_renderers() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();
    let tx = client.transport_event_sender();

    tx.send(TransportEvent::ParticipantsUpdated {
        call_id,
        added: vec![participant("8:user:alice")],
        removed: vec![],
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::ParticipantsChanged { .. })
    })
    .await;

    tx.send(TransportEvent::VideoStreamsUpdated {
        call_id,
        participant_id: ParticipantId::new("8:user:alice"),
        added: vec![stream_descriptor(), stream_descriptor()],
        removed: vec![],
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::VideoStreamsChanged { .. })
    })
    .await;

    // Bind renderers with live views to both streams.
    let provider = Arc::new(HeadlessSurfaceProvider::new());
    let call = client.get_call(&call_id).unwrap();
    let alice = call
        .remote_participants()
        .into_iter()
        .find(|p| p.id().as_str() == "8:user:alice")
        .unwrap();
    let renderers: Vec<VideoStreamRenderer> = alice
        .video_streams()
        .into_iter()
        .map(|s| {
            let renderer =
                VideoStreamRenderer::new(VideoStream::Remote(s), provider.clone()).unwrap();
            renderer.create_view(ScalingMode::Fit).unwrap();
            renderer
        })
        .collect();
    assert_eq!(provider.active_surfaces(), 2);

    // Participant departs: every binding must be disposed before the
    // participant is dropped.
    tx.send(TransportEvent::ParticipantsUpdated {
        call_id,
        added: vec![],
        removed: vec![ParticipantId::new("8:user:alice")],
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::ParticipantsChanged { info, .. } if !info.removed.is_empty())
    })
    .await;
    settle().await;

    assert!(renderers.iter().all(|r| r.is_disposed()));
    assert_eq!(provider.active_surfaces(), 0);
}

#[tokio::test]
async fn stream_removal_disposes_its_renderer() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();
    let tx = client.transport_event_sender();

    tx.send(TransportEvent::ParticipantsUpdated {
        call_id,
        added: vec![participant("8:user:alice")],
        removed: vec![],
    })
    .await
    .unwrap();
    let descriptor = stream_descriptor();
    let stream_id = descriptor.id;
    tx.send(TransportEvent::VideoStreamsUpdated {
        call_id,
        participant_id: ParticipantId::new("8:user:alice"),
        added: vec![descriptor],
        removed: vec![],
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::VideoStreamsChanged { .. })
    })
    .await;

    let provider = Arc::new(HeadlessSurfaceProvider::new());
    let call = client.get_call(&call_id).unwrap();
    let stream = call.remote_participants()[0].video_streams()[0].clone();
    let renderer =
        VideoStreamRenderer::new(VideoStream::Remote(stream), provider.clone()).unwrap();
    renderer.create_view(ScalingMode::Crop).unwrap();

    tx.send(TransportEvent::VideoStreamsUpdated {
        call_id,
        participant_id: ParticipantId::new("8:user:alice"),
        added: vec![],
        removed: vec![stream_id],
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::VideoStreamsChanged { info, .. } if !info.removed.is_empty())
    })
    .await;
    settle().await;

    assert!(renderer.is_disposed());
    assert_eq!(provider.active_surfaces(), 0);
    assert!(call.remote_participants()[0].video_streams().is_empty());
}

#[tokio::test]
async fn call_purge_disposes_roster_renderers() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();
    let tx = client.transport_event_sender();

    tx.send(TransportEvent::ParticipantsUpdated {
        call_id,
        added: vec![participant("8:user:alice")],
        removed: vec![],
    })
    .await
    .unwrap();
    tx.send(TransportEvent::VideoStreamsUpdated {
        call_id,
        participant_id: ParticipantId::new("8:user:alice"),
        added: vec![stream_descriptor()],
        removed: vec![],
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::VideoStreamsChanged { .. })
    })
    .await;

    let provider = Arc::new(HeadlessSurfaceProvider::new());
    let call = client.get_call(&call_id).unwrap();
    let stream = call.remote_participants()[0].video_streams()[0].clone();
    let renderer =
        VideoStreamRenderer::new(VideoStream::Remote(stream), provider.clone()).unwrap();
    renderer.create_view(ScalingMode::Fit).unwrap();

    tx.send(TransportEvent::CallStateChanged {
        call_id,
        state: CallState::Disconnected,
        end_reason: None,
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::CallListChanged { info, .. } if info.removed.contains(&call_id))
    })
    .await;
    settle().await;

    assert!(renderer.is_disposed());
    assert_eq!(provider.active_surfaces(), 0);
}

#[tokio::test]
async fn participant_state_and_speaking_updates_flow_through() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();
    let tx = client.transport_event_sender();

    tx.send(TransportEvent::ParticipantsUpdated {
        call_id,
        added: vec![ParticipantDescriptor {
            state: ParticipantState::InLobby,
            ..participant("8:user:alice")
        }],
        removed: vec![],
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::ParticipantsChanged { .. })
    })
    .await;

    tx.send(TransportEvent::ParticipantStateChanged {
        call_id,
        participant_id: ParticipantId::new("8:user:alice"),
        state: ParticipantState::Connected,
        end_reason: None,
    })
    .await
    .unwrap();
    let event = wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::ParticipantStateChanged { .. })
    })
    .await;
    match event {
        ClientEvent::ParticipantStateChanged { info, .. } => {
            assert_eq!(info.previous_state, Some(ParticipantState::InLobby));
            assert_eq!(info.new_state, ParticipantState::Connected);
        }
        _ => unreachable!(),
    }

    tx.send(TransportEvent::ParticipantSpeakingChanged {
        call_id,
        participant_id: ParticipantId::new("8:user:alice"),
        speaking: true,
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::MediaEvent { .. })
    })
    .await;

    let alice = client.get_call(&call_id).unwrap().remote_participants()[0].clone();
    assert!(alice.is_speaking());
    assert_eq!(alice.state(), ParticipantState::Connected);
}

#[tokio::test]
async fn roster_overlap_is_a_consistency_violation() {
    init_tracing();
    let transport = MockTransport::new();
    let client = started_client(transport).await;
    let call_id = connected_call(&client).await;
    let mut events = client.subscribe_events();
    let tx = client.transport_event_sender();

    tx.send(TransportEvent::ParticipantsUpdated {
        call_id,
        added: vec![participant("8:user:alice")],
        removed: vec![],
    })
    .await
    .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::ParticipantsChanged { .. })
    })
    .await;

    // alice in both added and removed within one diff
    tx.send(TransportEvent::ParticipantsUpdated {
        call_id,
        added: vec![participant("8:user:alice")],
        removed: vec![ParticipantId::new("8:user:alice")],
    })
    .await
    .unwrap();

    let event = wait_for_event(&mut events, |e| {
        matches!(e, ClientEvent::ClientError { .. })
    })
    .await;
    match event {
        ClientEvent::ClientError { error, .. } => {
            assert!(matches!(error, ClientError::Consistency { .. }));
        }
        _ => unreachable!(),
    }
    assert!(client.is_poisoned());
}
