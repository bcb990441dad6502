//! In-call control operations
//!
//! Hold/resume, mute, DTMF, local video, roster manipulation, and lobby
//! management. Every operation here follows the same shape: look the call
//! up, validate its state, collapse into the per-call in-flight gate, issue
//! the transport request raced against the call's terminal-state watch, then
//! update local state and emit the matching event.
//!
//! Two guarantees live in this file:
//!
//! - **At-most-one in-flight identical request per call.** A second caller
//!   issuing the same `(call, operation)` while the first is pending awaits
//!   the first's outcome instead of producing a second transport request.
//! - **Stale-state completion.** If the call reaches `Disconnected` while a
//!   request is pending, the operation fails with
//!   [`ClientError::StaleState`] instead of silently succeeding against a
//!   purged call (hang-up, which treats terminal arrival as success, lives
//!   in `calls.rs`).

use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::watch;

use crate::call::{CallId, CallState, DtmfTone};
use crate::client::call::Call;
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventPriority, MediaEventInfo, MediaEventType, VideoStreamsUpdatedInfo};
use crate::media::{CameraFacing, LocalVideoStream, MediaStreamType, StreamId};
use crate::participant::{ParticipantId, ParticipantState};

/// Identity of a mutating request for in-flight deduplication.
///
/// Two requests are "identical" when their kinds compare equal; operations
/// with arguments carry them here so e.g. DTMF `5` and DTMF `9` do not
/// collapse into each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum OperationKind {
    Accept,
    Reject,
    HangUp,
    Hold,
    Resume,
    Mute,
    Unmute,
    Dtmf(DtmfTone),
    StartVideo,
    StopVideo(StreamId),
    SwitchCamera,
    AddParticipant(String),
    RemoveParticipant(ParticipantId),
    AdmitParticipant(ParticipantId),
    AdmitAll,
    DeclineParticipant(ParticipantId),
}

/// Resolve once the call reaches its terminal state (or is purged, which
/// closes the watch channel).
pub(crate) async fn wait_terminal(rx: &mut watch::Receiver<CallState>) {
    loop {
        if (*rx.borrow()).is_terminal() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

impl super::manager::ClientManager {
    /// Collapse identical concurrent mutating requests on one call.
    ///
    /// The first caller ("leader") runs `op` and publishes its outcome; any
    /// caller arriving while the leader is pending awaits and returns that
    /// same outcome.
    pub(crate) async fn run_gated(
        &self,
        call_id: CallId,
        kind: OperationKind,
        op: impl Future<Output = ClientResult<()>>,
    ) -> ClientResult<()> {
        let key = (call_id, kind);

        let tx = loop {
            // Follower path: someone already has this request in flight.
            let existing = self.in_flight.get(&key).map(|e| e.value().clone());
            if let Some(mut rx) = existing {
                let outcome = loop {
                    let current = rx.borrow().clone();
                    if let Some(outcome) = current {
                        break Some(outcome);
                    }
                    if rx.changed().await.is_err() {
                        // Leader vanished without publishing; take over.
                        break None;
                    }
                };
                match outcome {
                    Some(outcome) => return outcome,
                    None => continue,
                }
            }

            // Leader path: claim the slot.
            let (tx, rx) = watch::channel(None::<ClientResult<()>>);
            match self.in_flight.entry(key.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(rx);
                    break tx;
                }
            }
        };

        let outcome = op.await;
        let _ = tx.send(Some(outcome.clone()));
        self.in_flight.remove(&key);
        outcome
    }

    /// Issue a transport request raced against the call's terminal watch.
    pub(crate) async fn guarded_request<T>(
        &self,
        call: &Call,
        fut: impl Future<Output = Result<T, crate::transport::TransportError>>,
    ) -> ClientResult<T> {
        let mut state_rx = call.watch_state();
        tokio::select! {
            res = self.transport_request(fut) => res,
            _ = wait_terminal(&mut state_rx) => Err(ClientError::StaleState { call_id: call.id() }),
        }
    }

    async fn emit_media_event(&self, call_id: CallId, event_type: MediaEventType) {
        self.emit_event(ClientEvent::MediaEvent {
            info: MediaEventInfo {
                call_id,
                event_type,
                timestamp: Utc::now(),
                metadata: HashMap::new(),
            },
            priority: EventPriority::Normal,
        })
        .await;
    }

    // ===== HOLD / RESUME =====

    /// Put a call on hold
    pub async fn hold_call(&self, call_id: &CallId) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        match call.state() {
            CallState::LocalHold => return Ok(()),
            CallState::Connected => {}
            other => {
                return Err(ClientError::InvalidCallState {
                    call_id: *call_id,
                    current_state: other,
                });
            }
        }

        let id = *call_id;
        self.run_gated(id, OperationKind::Hold, async {
            self.guarded_request(&call, self.transport.set_hold(&id, true))
                .await?;
            call.set_metadata("hold_initiated_at", Utc::now().to_rfc3339());
            self.emit_media_event(id, MediaEventType::HoldStateChanged { on_hold: true })
                .await;
            tracing::info!(call_id = %id, "call placed on hold");
            Ok(())
        })
        .await
    }

    /// Resume a call from local hold
    pub async fn resume_call(&self, call_id: &CallId) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        match call.state() {
            CallState::Connected => return Ok(()),
            CallState::LocalHold => {}
            other => {
                return Err(ClientError::InvalidCallState {
                    call_id: *call_id,
                    current_state: other,
                });
            }
        }

        let id = *call_id;
        self.run_gated(id, OperationKind::Resume, async {
            self.guarded_request(&call, self.transport.set_hold(&id, false))
                .await?;
            call.set_metadata("resumed_at", Utc::now().to_rfc3339());
            self.emit_media_event(id, MediaEventType::HoldStateChanged { on_hold: false })
                .await;
            tracing::info!(call_id = %id, "call resumed");
            Ok(())
        })
        .await
    }

    /// Whether a call is currently on hold (either side)
    pub fn is_call_on_hold(&self, call_id: &CallId) -> ClientResult<bool> {
        Ok(self.get_call(call_id)?.state().is_on_hold())
    }

    // ===== MUTE =====

    /// Mute or unmute outgoing audio
    pub async fn set_muted(&self, call_id: &CallId, muted: bool) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        let state = call.state();
        if state.is_terminal() {
            return Err(ClientError::InvalidCallState {
                call_id: *call_id,
                current_state: state,
            });
        }

        let id = *call_id;
        let kind = if muted {
            OperationKind::Mute
        } else {
            OperationKind::Unmute
        };
        self.run_gated(id, kind, async {
            self.guarded_request(&call, self.transport.set_muted(&id, muted))
                .await?;
            if call.set_muted(muted) {
                self.emit_media_event(id, MediaEventType::MicrophoneStateChanged { muted })
                    .await;
            }
            tracing::info!(call_id = %id, muted, "mute state changed");
            Ok(())
        })
        .await
    }

    /// Mute outgoing audio
    pub async fn mute_call(&self, call_id: &CallId) -> ClientResult<()> {
        self.set_muted(call_id, true).await
    }

    /// Unmute outgoing audio
    pub async fn unmute_call(&self, call_id: &CallId) -> ClientResult<()> {
        self.set_muted(call_id, false).await
    }

    // ===== DTMF =====

    /// Send a DTMF tone on a connected call
    pub async fn send_dtmf(&self, call_id: &CallId, tone: DtmfTone) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        let state = call.state();
        if state != CallState::Connected {
            return Err(ClientError::InvalidCallState {
                call_id: *call_id,
                current_state: state,
            });
        }

        let id = *call_id;
        self.run_gated(id, OperationKind::Dtmf(tone), async {
            self.guarded_request(&call, self.transport.send_dtmf(&id, tone))
                .await?;
            call.set_metadata("last_dtmf_sent", tone.to_string());
            self.emit_media_event(id, MediaEventType::DtmfSent { tone }).await;
            tracing::info!(call_id = %id, tone = %tone, "DTMF sent");
            Ok(())
        })
        .await
    }

    // ===== LOCAL VIDEO =====

    fn sending_camera_stream(call: &Call) -> Option<LocalVideoStream> {
        call.local_video_streams()
            .into_iter()
            .find(|s| s.is_sending() && s.stream_type() == MediaStreamType::Video)
    }

    /// Start sending local camera video.
    ///
    /// Returns the local stream; if camera video is already being sent, the
    /// existing stream is returned.
    pub async fn start_video(&self, call_id: &CallId) -> ClientResult<LocalVideoStream> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        let state = call.state();
        if state.is_terminal() {
            return Err(ClientError::InvalidCallState {
                call_id: *call_id,
                current_state: state,
            });
        }
        if let Some(stream) = Self::sending_camera_stream(&call) {
            return Ok(stream);
        }

        let id = *call_id;
        let facing = self.config.default_camera;
        self.run_gated(id, OperationKind::StartVideo, async {
            if Self::sending_camera_stream(&call).is_some() {
                return Ok(());
            }
            let stream_id = self
                .guarded_request(&call, self.transport.start_video(&id, facing))
                .await?;
            let stream = LocalVideoStream::with_id(stream_id, MediaStreamType::Video, facing);
            stream.set_sending(true);
            call.add_local_stream(stream);

            self.emit_media_event(id, MediaEventType::VideoStarted { stream_id })
                .await;
            self.emit_event(ClientEvent::VideoStreamsChanged {
                info: VideoStreamsUpdatedInfo {
                    call_id: id,
                    participant_id: None,
                    added: vec![stream_id],
                    removed: vec![],
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;
            tracing::info!(call_id = %id, stream_id = %stream_id, "local video started");
            Ok(())
        })
        .await?;

        Self::sending_camera_stream(&call)
            .ok_or(ClientError::VideoNotStarted { call_id: *call_id })
    }

    /// Stop sending a local video stream
    pub async fn stop_video(&self, call_id: &CallId, stream_id: &StreamId) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        if call.find_local_stream(stream_id).is_none() {
            return Err(ClientError::StreamNotFound {
                call_id: *call_id,
                stream_id: *stream_id,
            });
        }

        let id = *call_id;
        let sid = *stream_id;
        self.run_gated(id, OperationKind::StopVideo(sid), async {
            self.guarded_request(&call, self.transport.stop_video(&id, &sid))
                .await?;
            if let Some(stream) = call.remove_local_stream(&sid) {
                stream.set_sending(false);
            }
            self.emit_media_event(id, MediaEventType::VideoStopped { stream_id: sid })
                .await;
            self.emit_event(ClientEvent::VideoStreamsChanged {
                info: VideoStreamsUpdatedInfo {
                    call_id: id,
                    participant_id: None,
                    added: vec![],
                    removed: vec![sid],
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;
            tracing::info!(call_id = %id, stream_id = %sid, "local video stopped");
            Ok(())
        })
        .await
    }

    /// Switch the camera feeding the active local video stream.
    ///
    /// Returns the camera now in use.
    pub async fn switch_camera(&self, call_id: &CallId) -> ClientResult<CameraFacing> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        let stream = Self::sending_camera_stream(&call)
            .ok_or(ClientError::VideoNotStarted { call_id: *call_id })?;

        let id = *call_id;
        let target = stream.camera_facing().flipped();
        self.run_gated(id, OperationKind::SwitchCamera, async {
            self.guarded_request(&call, self.transport.switch_camera(&id, target))
                .await?;
            stream.set_facing(target);
            self.emit_media_event(id, MediaEventType::CameraSwitched { facing: target })
                .await;
            tracing::info!(call_id = %id, facing = ?target, "camera switched");
            Ok(())
        })
        .await?;

        Self::sending_camera_stream(&call)
            .map(|s| s.camera_facing())
            .ok_or(ClientError::VideoNotStarted { call_id: *call_id })
    }

    // ===== ROSTER =====

    /// Invite another identity into a connected call
    pub async fn add_participant(&self, call_id: &CallId, identity: &str) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        let state = call.state();
        if state != CallState::Connected {
            return Err(ClientError::InvalidCallState {
                call_id: *call_id,
                current_state: state,
            });
        }

        let id = *call_id;
        let identity_owned = identity.to_string();
        self.run_gated(
            id,
            OperationKind::AddParticipant(identity_owned.clone()),
            async {
                self.guarded_request(&call, self.transport.add_participant(&id, &identity_owned))
                    .await?;
                tracing::info!(call_id = %id, identity = %identity_owned, "participant invited");
                Ok(())
            },
        )
        .await
    }

    /// Remove a participant from a call
    pub async fn remove_participant(
        &self,
        call_id: &CallId,
        participant_id: &ParticipantId,
    ) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        if call.roster().participant(participant_id).is_none() {
            return Err(ClientError::ParticipantNotFound {
                call_id: *call_id,
                participant_id: participant_id.clone(),
            });
        }

        let id = *call_id;
        let pid = participant_id.clone();
        self.run_gated(id, OperationKind::RemoveParticipant(pid.clone()), async {
            self.guarded_request(&call, self.transport.remove_participant(&id, &pid))
                .await?;
            tracing::info!(call_id = %id, participant_id = %pid, "participant removal requested");
            Ok(())
        })
        .await
    }

    // ===== LOBBY =====

    fn lobby_participant(
        &self,
        call: &Call,
        call_id: &CallId,
        participant_id: &ParticipantId,
    ) -> ClientResult<()> {
        let participant = call.roster().participant(participant_id).ok_or_else(|| {
            ClientError::ParticipantNotFound {
                call_id: *call_id,
                participant_id: participant_id.clone(),
            }
        })?;
        let state = participant.state();
        if state != ParticipantState::InLobby {
            return Err(ClientError::InvalidParticipantState {
                participant_id: participant_id.clone(),
                current_state: state,
            });
        }
        Ok(())
    }

    /// Admit one participant waiting in the lobby
    pub async fn admit_lobby_participant(
        &self,
        call_id: &CallId,
        participant_id: &ParticipantId,
    ) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        self.lobby_participant(&call, call_id, participant_id)?;

        let id = *call_id;
        let pid = participant_id.clone();
        self.run_gated(id, OperationKind::AdmitParticipant(pid.clone()), async {
            self.guarded_request(&call, self.transport.admit_lobby_participant(&id, &pid))
                .await?;
            tracing::info!(call_id = %id, participant_id = %pid, "lobby participant admitted");
            Ok(())
        })
        .await
    }

    /// Admit every participant waiting in the lobby
    pub async fn admit_all_lobby_participants(&self, call_id: &CallId) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;

        let id = *call_id;
        self.run_gated(id, OperationKind::AdmitAll, async {
            self.guarded_request(&call, self.transport.admit_all_lobby_participants(&id))
                .await?;
            tracing::info!(call_id = %id, "all lobby participants admitted");
            Ok(())
        })
        .await
    }

    /// Decline one participant waiting in the lobby
    pub async fn decline_lobby_participant(
        &self,
        call_id: &CallId,
        participant_id: &ParticipantId,
    ) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = self.get_call(call_id)?;
        self.lobby_participant(&call, call_id, participant_id)?;

        let id = *call_id;
        let pid = participant_id.clone();
        self.run_gated(id, OperationKind::DeclineParticipant(pid.clone()), async {
            self.guarded_request(&call, self.transport.decline_lobby_participant(&id, &pid))
                .await?;
            tracing::info!(call_id = %id, participant_id = %pid, "lobby participant declined");
            Ok(())
        })
        .await
    }
}
