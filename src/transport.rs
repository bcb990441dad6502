//! Transport boundary for clearcall-core
//!
//! The core performs no signaling or media I/O itself. Everything is
//! delegated to a [`CallTransport`] collaborator: one async method per
//! call-control request, plus an out-of-band stream of [`TransportEvent`]
//! notifications delivered over an `mpsc` channel that the
//! [`ClientManager`](crate::client::ClientManager) consumes.
//!
//! Contract notes for implementors:
//!
//! - Events about one call must be sent in the order they happened; ordering
//!   across calls is not required.
//! - Calls created through this client (`start_call`, `join_call`,
//!   `accept_call`) are inserted into the registry by the manager itself and
//!   must NOT be echoed back in a `CallsUpdated` event; `CallsUpdated` is for
//!   calls that appear or vanish out-of-band.
//! - Requests are never retried by the core; surface failures honestly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::call::{CallDirection, CallEndReason, CallId, CallState, DtmfTone};
use crate::media::{CameraFacing, MediaStreamType, StreamId};
use crate::participant::{ParticipantId, ParticipantState};

/// Errors surfaced by the transport collaborator
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("credential rejected: {reason}")]
    CredentialRejected { reason: String },

    #[error("request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Missing device permission (microphone, camera, screen capture)
    #[error("permission denied: {permission}")]
    PermissionDenied { permission: String },
}

impl TransportError {
    pub fn request_failed(reason: impl Into<String>) -> Self {
        Self::RequestFailed {
            reason: reason.into(),
        }
    }
}

/// An opaque bearer token supplied by the credential provider
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log token material
        write!(f, "BearerToken(..)")
    }
}

/// Supplies and refreshes the bearer token used for call-creating requests.
///
/// Refresh scheduling is out of scope here; the core only requires a
/// valid-token-or-error signal per request.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self) -> Result<BearerToken, TransportError>;
}

/// Credential provider backed by a fixed token
pub struct StaticCredentialProvider {
    token: BearerToken,
}

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: BearerToken::new(token),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn token(&self) -> Result<BearerToken, TransportError> {
        Ok(self.token.clone())
    }
}

/// Media preferences for starting, joining, or accepting a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaOptions {
    /// Start with the camera on
    pub camera_on: bool,
    /// Start with the microphone muted
    pub microphone_muted: bool,
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            camera_on: false,
            microphone_muted: false,
        }
    }
}

/// Where to join a call or meeting.
///
/// A single tagged variant; each locator carries its own fixed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinLocator {
    /// An ad-hoc group call
    GroupCall { group_id: Uuid },
    /// A meeting identified by its coordinates
    TeamsMeetingCoordinates {
        thread_id: String,
        organizer_id: String,
        tenant_id: String,
        message_id: String,
    },
    /// A meeting identified by its join link
    TeamsMeetingLink { url: String },
}

/// Transport snapshot of a call entering the registry
#[derive(Debug, Clone)]
pub struct CallDescriptor {
    pub call_id: CallId,
    pub direction: CallDirection,
    pub state: CallState,
    pub remote_display_name: Option<String>,
    pub is_muted: bool,
}

/// Transport snapshot of a remote participant entering a roster
#[derive(Debug, Clone)]
pub struct ParticipantDescriptor {
    pub id: ParticipantId,
    pub display_name: Option<String>,
    pub state: ParticipantState,
    pub is_muted: bool,
    pub is_speaking: bool,
}

/// Transport snapshot of a remote video stream
#[derive(Debug, Clone)]
pub struct RemoteStreamDescriptor {
    pub id: StreamId,
    pub stream_type: MediaStreamType,
    pub is_available: bool,
}

/// Out-of-band notifications from the transport.
///
/// Consumed exclusively by the manager's event loop, which applies them
/// through the serialized reconciliation entry points.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A remote party is calling
    IncomingCall {
        call_id: CallId,
        caller_identity: String,
        caller_display_name: Option<String>,
        video_enabled: bool,
    },
    /// Calls appeared or vanished out-of-band
    CallsUpdated {
        added: Vec<CallDescriptor>,
        removed: Vec<CallId>,
    },
    /// A call changed state
    CallStateChanged {
        call_id: CallId,
        state: CallState,
        end_reason: Option<CallEndReason>,
    },
    /// The local mute flag of a call changed
    CallMuteChanged { call_id: CallId, muted: bool },
    /// The transport's participant count for a call changed
    /// (local party already excluded)
    TotalParticipantCountChanged { call_id: CallId, count: usize },
    /// Participants joined or left a call
    ParticipantsUpdated {
        call_id: CallId,
        added: Vec<ParticipantDescriptor>,
        removed: Vec<ParticipantId>,
    },
    /// A remote participant changed state
    ParticipantStateChanged {
        call_id: CallId,
        participant_id: ParticipantId,
        state: ParticipantState,
        end_reason: Option<CallEndReason>,
    },
    /// A remote participant's mute flag changed
    ParticipantMuteChanged {
        call_id: CallId,
        participant_id: ParticipantId,
        muted: bool,
    },
    /// A remote participant started or stopped speaking
    ParticipantSpeakingChanged {
        call_id: CallId,
        participant_id: ParticipantId,
        speaking: bool,
    },
    /// A remote participant's video streams changed
    VideoStreamsUpdated {
        call_id: CallId,
        participant_id: ParticipantId,
        added: Vec<RemoteStreamDescriptor>,
        removed: Vec<StreamId>,
    },
    /// A remote stream's availability flag flipped
    StreamAvailabilityChanged {
        call_id: CallId,
        participant_id: ParticipantId,
        stream_id: StreamId,
        is_available: bool,
    },
    /// Call recording was started or stopped
    RecordingStateChanged { call_id: CallId, active: bool },
    /// Call transcription was started or stopped
    TranscriptionStateChanged { call_id: CallId, active: bool },
}

/// The signaling/media engine beneath the client.
///
/// Each method is one call-control request completing with success or a
/// classified [`TransportError`]. Implementations must be cancellation-safe:
/// the core drops a request future when the call reaches its terminal state
/// first.
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Place an outgoing call to the given identities
    async fn start_call(
        &self,
        token: &BearerToken,
        callees: &[String],
        options: &MediaOptions,
    ) -> Result<CallDescriptor, TransportError>;

    /// Join a group call or meeting
    async fn join_call(
        &self,
        token: &BearerToken,
        locator: &JoinLocator,
        options: &MediaOptions,
    ) -> Result<CallDescriptor, TransportError>;

    /// Accept a ringing incoming call
    async fn accept_call(
        &self,
        token: &BearerToken,
        call_id: &CallId,
        options: &MediaOptions,
    ) -> Result<(), TransportError>;

    /// Reject a ringing incoming call
    async fn reject_call(&self, call_id: &CallId) -> Result<(), TransportError>;

    /// Hang up a call
    async fn hang_up(&self, call_id: &CallId) -> Result<(), TransportError>;

    /// Put a call on hold or resume it
    async fn set_hold(&self, call_id: &CallId, on_hold: bool) -> Result<(), TransportError>;

    /// Mute or unmute outgoing audio
    async fn set_muted(&self, call_id: &CallId, muted: bool) -> Result<(), TransportError>;

    /// Send a DTMF tone
    async fn send_dtmf(&self, call_id: &CallId, tone: DtmfTone) -> Result<(), TransportError>;

    /// Start sending local camera video; returns the new stream's id
    async fn start_video(
        &self,
        call_id: &CallId,
        facing: CameraFacing,
    ) -> Result<StreamId, TransportError>;

    /// Stop sending a local video stream
    async fn stop_video(
        &self,
        call_id: &CallId,
        stream_id: &StreamId,
    ) -> Result<(), TransportError>;

    /// Switch the camera feeding a local video stream
    async fn switch_camera(
        &self,
        call_id: &CallId,
        facing: CameraFacing,
    ) -> Result<(), TransportError>;

    /// Invite another identity into the call
    async fn add_participant(
        &self,
        call_id: &CallId,
        identity: &str,
    ) -> Result<(), TransportError>;

    /// Remove a participant from the call
    async fn remove_participant(
        &self,
        call_id: &CallId,
        participant_id: &ParticipantId,
    ) -> Result<(), TransportError>;

    /// Admit one participant waiting in the lobby
    async fn admit_lobby_participant(
        &self,
        call_id: &CallId,
        participant_id: &ParticipantId,
    ) -> Result<(), TransportError>;

    /// Admit every participant waiting in the lobby
    async fn admit_all_lobby_participants(&self, call_id: &CallId) -> Result<(), TransportError>;

    /// Decline one participant waiting in the lobby
    async fn decline_lobby_participant(
        &self,
        call_id: &CallId,
        participant_id: &ParticipantId,
    ) -> Result<(), TransportError>;
}
