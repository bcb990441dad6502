//! Remote participant model
//!
//! A [`RemoteParticipant`] is the live, shareable handle the roster hands
//! out; [`ParticipantInfo`] is the point-in-time snapshot used in events.
//! Participants are owned by their parent call's roster and dropped when the
//! transport reports their departure.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::call::CallEndReason;
use crate::media::{RemoteVideoStream, StreamId};

/// Opaque identity handle of a remote participant.
///
/// Unique within its parent call's roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// State of a remote participant within a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantState {
    /// Not yet part of the call
    Idle,
    /// Early media is flowing
    EarlyMedia,
    /// Being connected into the call
    Connecting,
    /// Connected and able to send/receive media
    Connected,
    /// On hold
    Hold,
    /// Waiting in the lobby to be admitted
    InLobby,
    /// Left the call
    Disconnected,
    /// Being rung
    Ringing,
}

impl ParticipantState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ParticipantState::Connected)
    }

    pub fn is_in_lobby(&self) -> bool {
        matches!(self, ParticipantState::InLobby)
    }
}

/// Snapshot of a remote participant's observable properties
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    /// Identity handle
    pub id: ParticipantId,
    /// Display name, if the transport knows one
    pub display_name: Option<String>,
    /// Current state
    pub state: ParticipantState,
    /// Whether the participant's audio is muted
    pub is_muted: bool,
    /// Whether the participant is currently speaking
    pub is_speaking: bool,
    /// Why the participant left, once `Disconnected`
    pub end_reason: Option<CallEndReason>,
    /// Ids of the participant's remote video streams
    pub stream_ids: Vec<StreamId>,
}

struct ParticipantInner {
    id: ParticipantId,
    display_name: RwLock<Option<String>>,
    state: RwLock<ParticipantState>,
    is_muted: AtomicBool,
    is_speaking: AtomicBool,
    end_reason: RwLock<Option<CallEndReason>>,
    streams: Mutex<Vec<RemoteVideoStream>>,
}

/// Live handle to a remote participant, owned by its call's roster.
///
/// Clones share state; the handle stays readable after the participant is
/// removed from the roster, but its streams will have been detached from any
/// renderers by then.
#[derive(Clone)]
pub struct RemoteParticipant {
    inner: Arc<ParticipantInner>,
}

impl RemoteParticipant {
    pub(crate) fn new(
        id: ParticipantId,
        display_name: Option<String>,
        state: ParticipantState,
        is_muted: bool,
        is_speaking: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ParticipantInner {
                id,
                display_name: RwLock::new(display_name),
                state: RwLock::new(state),
                is_muted: AtomicBool::new(is_muted),
                is_speaking: AtomicBool::new(is_speaking),
                end_reason: RwLock::new(None),
                streams: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.inner.id
    }

    pub fn display_name(&self) -> Option<String> {
        self.inner.display_name.read().unwrap().clone()
    }

    pub fn state(&self) -> ParticipantState {
        *self.inner.state.read().unwrap()
    }

    pub fn is_muted(&self) -> bool {
        self.inner.is_muted.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.is_speaking.load(Ordering::SeqCst)
    }

    pub fn end_reason(&self) -> Option<CallEndReason> {
        *self.inner.end_reason.read().unwrap()
    }

    /// The participant's current remote video streams
    pub fn video_streams(&self) -> Vec<RemoteVideoStream> {
        self.inner.streams.lock().unwrap().clone()
    }

    /// Point-in-time snapshot of this participant
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.inner.id.clone(),
            display_name: self.display_name(),
            state: self.state(),
            is_muted: self.is_muted(),
            is_speaking: self.is_speaking(),
            end_reason: self.end_reason(),
            stream_ids: self
                .video_streams()
                .iter()
                .map(|s| s.id())
                .collect(),
        }
    }

    pub(crate) fn set_display_name(&self, name: Option<String>) {
        *self.inner.display_name.write().unwrap() = name;
    }

    /// Returns the previous state when it actually changed.
    pub(crate) fn set_state(
        &self,
        state: ParticipantState,
        end_reason: Option<CallEndReason>,
    ) -> Option<ParticipantState> {
        let mut current = self.inner.state.write().unwrap();
        if *current == state {
            return None;
        }
        let previous = *current;
        *current = state;
        if state == ParticipantState::Disconnected {
            *self.inner.end_reason.write().unwrap() = end_reason;
        }
        Some(previous)
    }

    /// Returns true when the flag actually changed.
    pub(crate) fn set_muted(&self, muted: bool) -> bool {
        self.inner.is_muted.swap(muted, Ordering::SeqCst) != muted
    }

    /// Returns true when the flag actually changed.
    pub(crate) fn set_speaking(&self, speaking: bool) -> bool {
        self.inner.is_speaking.swap(speaking, Ordering::SeqCst) != speaking
    }

    pub(crate) fn add_stream(&self, stream: RemoteVideoStream) {
        self.inner.streams.lock().unwrap().push(stream);
    }

    /// Remove a stream, disposing any renderer bound to it first.
    pub(crate) fn remove_stream(&self, stream_id: &StreamId) -> Option<RemoteVideoStream> {
        let mut streams = self.inner.streams.lock().unwrap();
        let pos = streams.iter().position(|s| s.id() == *stream_id)?;
        let stream = streams.remove(pos);
        drop(streams);
        stream.dispose_renderer_binding();
        Some(stream)
    }

    pub(crate) fn find_stream(&self, stream_id: &StreamId) -> Option<RemoteVideoStream> {
        self.inner
            .streams
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id() == *stream_id)
            .cloned()
    }

    /// Dispose every renderer bound to this participant's streams.
    ///
    /// Must run before the participant is dropped from the roster so no
    /// renderer is left referencing a stream of a departed participant.
    pub(crate) fn dispose_stream_bindings(&self) {
        let streams = self.inner.streams.lock().unwrap().clone();
        for stream in streams {
            stream.dispose_renderer_binding();
        }
    }
}

impl std::fmt::Debug for RemoteParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteParticipant")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("is_muted", &self.is_muted())
            .field("is_speaking", &self.is_speaking())
            .finish()
    }
}
