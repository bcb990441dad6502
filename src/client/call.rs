//! Live call handle
//!
//! A [`Call`] is the registry-owned object tracking one session: its state
//! machine position, its participant roster, its local video streams, and
//! its feature extensions. Clones share state. Mutation happens only through
//! the manager (operations and transport-event application); applications
//! read.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;

use crate::call::{CallDirection, CallEndReason, CallId, CallInfo, CallState};
use crate::client::features::{CallFeature, CallFeatureKind, CallFeatures};
use crate::client::roster::ParticipantRoster;
use crate::client::types::CallCapabilities;
use crate::media::{LocalVideoStream, StreamId};
use crate::participant::RemoteParticipant;
use crate::transport::CallDescriptor;

/// Outcome of applying a transport-reported state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StateChangeOutcome {
    /// The transition was applied; carries the previous state
    Applied { previous: CallState },
    /// The call was already in this state
    Unchanged,
    /// The transition is invalid under the state machine and was dropped
    Rejected { current: CallState },
}

struct CallMutable {
    state: CallState,
    end_reason: Option<CallEndReason>,
    remote_display_name: Option<String>,
    connected_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    metadata: HashMap<String, String>,
}

struct CallInner {
    id: CallId,
    direction: CallDirection,
    created_at: DateTime<Utc>,
    mutable: RwLock<CallMutable>,
    is_muted: AtomicBool,
    total_participant_count: AtomicUsize,
    state_tx: watch::Sender<CallState>,
    roster: ParticipantRoster,
    local_streams: Mutex<Vec<LocalVideoStream>>,
    features: CallFeatures,
}

/// Handle to a tracked call. Clones share state.
#[derive(Clone)]
pub struct Call {
    inner: Arc<CallInner>,
}

impl Call {
    pub(crate) fn from_descriptor(descriptor: CallDescriptor) -> Self {
        let (state_tx, _) = watch::channel(descriptor.state);
        Self {
            inner: Arc::new(CallInner {
                id: descriptor.call_id,
                direction: descriptor.direction,
                created_at: Utc::now(),
                mutable: RwLock::new(CallMutable {
                    state: descriptor.state,
                    end_reason: None,
                    remote_display_name: descriptor.remote_display_name,
                    connected_at: None,
                    ended_at: None,
                    metadata: HashMap::new(),
                }),
                is_muted: AtomicBool::new(descriptor.is_muted),
                total_participant_count: AtomicUsize::new(0),
                state_tx,
                roster: ParticipantRoster::new(),
                local_streams: Mutex::new(Vec::new()),
                features: CallFeatures::new(),
            }),
        }
    }

    pub fn id(&self) -> CallId {
        self.inner.id
    }

    pub fn direction(&self) -> CallDirection {
        self.inner.direction
    }

    pub fn state(&self) -> CallState {
        self.inner.mutable.read().unwrap().state
    }

    pub fn is_muted(&self) -> bool {
        self.inner.is_muted.load(Ordering::SeqCst)
    }

    pub fn end_reason(&self) -> Option<CallEndReason> {
        self.inner.mutable.read().unwrap().end_reason
    }

    pub fn remote_display_name(&self) -> Option<String> {
        self.inner.mutable.read().unwrap().remote_display_name.clone()
    }

    /// Remote participant count as reported by the transport
    pub fn total_participant_count(&self) -> usize {
        self.inner.total_participant_count.load(Ordering::SeqCst)
    }

    /// The call's remote participants, in arrival order
    pub fn remote_participants(&self) -> Vec<RemoteParticipant> {
        self.inner.roster.participants()
    }

    /// The call's local video streams, in start order
    pub fn local_video_streams(&self) -> Vec<LocalVideoStream> {
        self.inner.local_streams.lock().unwrap().clone()
    }

    /// Look up a feature extension of this call
    pub fn feature(&self, kind: CallFeatureKind) -> CallFeature {
        self.inner.features.get(kind)
    }

    /// What operations the call currently supports
    pub fn capabilities(&self) -> CallCapabilities {
        let state = self.state();
        CallCapabilities {
            can_hold: state == CallState::Connected,
            can_resume: state == CallState::LocalHold,
            can_mute: state.is_in_progress(),
            can_send_dtmf: state == CallState::Connected,
            can_hangup: state.is_in_progress(),
            can_add_participant: state == CallState::Connected,
            can_start_video: state.is_in_progress(),
        }
    }

    /// Point-in-time snapshot of the call
    pub fn info(&self) -> CallInfo {
        let mutable = self.inner.mutable.read().unwrap();
        CallInfo {
            call_id: self.inner.id,
            state: mutable.state,
            direction: self.inner.direction,
            is_muted: self.is_muted(),
            remote_display_name: mutable.remote_display_name.clone(),
            end_reason: mutable.end_reason,
            total_participant_count: self.total_participant_count(),
            created_at: self.inner.created_at,
            connected_at: mutable.connected_at,
            ended_at: mutable.ended_at,
            metadata: mutable.metadata.clone(),
        }
    }

    /// The call's participant roster
    pub fn roster(&self) -> &ParticipantRoster {
        &self.inner.roster
    }

    /// Watch the call's state; closes when the call is purged.
    pub(crate) fn watch_state(&self) -> watch::Receiver<CallState> {
        self.inner.state_tx.subscribe()
    }

    /// Apply a transport-reported state transition.
    ///
    /// Validates against the state machine; an invalid transition is dropped
    /// with the previous state retained. Records `connected_at`/`ended_at`
    /// timestamps and the end reason at the terminal edge.
    pub(crate) fn apply_state(
        &self,
        new_state: CallState,
        end_reason: Option<CallEndReason>,
    ) -> StateChangeOutcome {
        let mut mutable = self.inner.mutable.write().unwrap();
        let current = mutable.state;
        if current == new_state {
            return StateChangeOutcome::Unchanged;
        }
        if !current.can_transition_to(&new_state) {
            return StateChangeOutcome::Rejected { current };
        }

        mutable.state = new_state;
        match new_state {
            CallState::Connected => {
                if mutable.connected_at.is_none() {
                    mutable.connected_at = Some(Utc::now());
                }
            }
            CallState::Disconnected => {
                mutable.ended_at = Some(Utc::now());
                mutable.end_reason = Some(end_reason.unwrap_or(CallEndReason::NORMAL));
            }
            _ => {}
        }
        drop(mutable);

        let _ = self.inner.state_tx.send(new_state);
        StateChangeOutcome::Applied { previous: current }
    }

    /// Returns true when the flag actually changed.
    pub(crate) fn set_muted(&self, muted: bool) -> bool {
        self.inner.is_muted.swap(muted, Ordering::SeqCst) != muted
    }

    pub(crate) fn set_total_participant_count(&self, count: usize) {
        self.inner
            .total_participant_count
            .store(count, Ordering::SeqCst);
    }

    pub(crate) fn set_metadata(&self, key: &str, value: String) {
        self.inner
            .mutable
            .write()
            .unwrap()
            .metadata
            .insert(key.to_string(), value);
    }

    pub(crate) fn add_local_stream(&self, stream: LocalVideoStream) {
        self.inner.local_streams.lock().unwrap().push(stream);
    }

    /// Remove a local stream, disposing any renderer bound to it first.
    pub(crate) fn remove_local_stream(&self, stream_id: &StreamId) -> Option<LocalVideoStream> {
        let mut streams = self.inner.local_streams.lock().unwrap();
        let pos = streams.iter().position(|s| s.id() == *stream_id)?;
        let stream = streams.remove(pos);
        drop(streams);
        stream.dispose_renderer_binding();
        Some(stream)
    }

    pub(crate) fn find_local_stream(&self, stream_id: &StreamId) -> Option<LocalVideoStream> {
        self.inner
            .local_streams
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id() == *stream_id)
            .cloned()
    }

    pub(crate) fn features(&self) -> &CallFeatures {
        &self.inner.features
    }

    /// Release everything the call owns: roster stream bindings and local
    /// stream bindings. Runs when the registry purges the call.
    pub(crate) fn dispose(&self) {
        self.inner.roster.dispose_all();
        let streams = self.inner.local_streams.lock().unwrap().clone();
        for stream in streams {
            stream.dispose_renderer_binding();
        }
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.inner.id)
            .field("direction", &self.inner.direction)
            .field("state", &self.state())
            .field("participants", &self.inner.roster.len())
            .finish()
    }
}
