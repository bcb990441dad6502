//! Participant roster reconciliation
//!
//! Each call owns one [`ParticipantRoster`]. Rosters are mutated only through
//! the reconciliation entry points below, which the manager serializes behind
//! its reconcile lock; reads are lock-free.
//!
//! Reconciliation follows the registry discipline: the diff is validated as
//! a whole first, additions land before the change is broadcast, removals
//! happen after. The manager drives that sequence through the split
//! `validate`/`insert`/`remove` methods; [`apply_participants_changed`] and
//! [`apply_video_streams_changed`] are the same sequence without the
//! broadcast in the middle.
//!
//! The critical ordering rule lives here: when a participant is removed,
//! every renderer bound to that participant's remote streams is detached and
//! disposed *before* the participant is dropped, so no renderer is ever left
//! referencing a stream of a departed participant.
//!
//! [`apply_participants_changed`]: ParticipantRoster::apply_participants_changed
//! [`apply_video_streams_changed`]: ParticipantRoster::apply_video_streams_changed

use dashmap::DashMap;
use std::sync::Mutex;

use crate::error::{ClientError, ClientResult};
use crate::media::{RemoteVideoStream, StreamId};
use crate::participant::{ParticipantId, RemoteParticipant};
use crate::transport::{ParticipantDescriptor, RemoteStreamDescriptor};

/// Outcome of a roster reconciliation, used to build the resulting event
#[derive(Debug, Clone, Default)]
pub(crate) struct RosterDelta {
    pub added: Vec<ParticipantId>,
    pub removed: Vec<ParticipantId>,
}

/// Ordered, id-keyed set of a call's remote participants
pub struct ParticipantRoster {
    participants: DashMap<ParticipantId, RemoteParticipant>,
    order: Mutex<Vec<ParticipantId>>,
}

impl ParticipantRoster {
    pub(crate) fn new() -> Self {
        Self {
            participants: DashMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Participants in arrival order
    pub fn participants(&self) -> Vec<RemoteParticipant> {
        let order = self.order.lock().unwrap();
        order
            .iter()
            .filter_map(|id| self.participants.get(id).map(|p| p.clone()))
            .collect()
    }

    /// Look up one participant by identity
    pub fn participant(&self, id: &ParticipantId) -> Option<RemoteParticipant> {
        self.participants.get(id).map(|p| p.clone())
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Reject diffs that violate the reconciliation contract: an id on both
    /// sides, an added id already present, or a removed id that is unknown.
    pub(crate) fn validate_participants_diff(
        &self,
        added: &[ParticipantDescriptor],
        removed: &[ParticipantId],
    ) -> ClientResult<()> {
        for id in removed {
            if added.iter().any(|d| d.id == *id) {
                return Err(ClientError::consistency(format!(
                    "participant {} present in both added and removed",
                    id
                )));
            }
            if !self.participants.contains_key(id) {
                return Err(ClientError::consistency(format!(
                    "removed participant {} is not in the roster",
                    id
                )));
            }
        }
        for descriptor in added {
            if self.participants.contains_key(&descriptor.id) {
                return Err(ClientError::consistency(format!(
                    "added participant {} is already in the roster",
                    descriptor.id
                )));
            }
        }
        Ok(())
    }

    /// Insert validated additions; returns the ids actually inserted.
    pub(crate) fn insert_participants(
        &self,
        added: Vec<ParticipantDescriptor>,
    ) -> Vec<ParticipantId> {
        let mut inserted = Vec::with_capacity(added.len());
        for descriptor in added {
            let participant = RemoteParticipant::new(
                descriptor.id.clone(),
                descriptor.display_name,
                descriptor.state,
                descriptor.is_muted,
                descriptor.is_speaking,
            );
            self.order.lock().unwrap().push(descriptor.id.clone());
            self.participants.insert(descriptor.id.clone(), participant);
            inserted.push(descriptor.id);
        }
        inserted
    }

    /// Drop validated removals, disposing each participant's renderer
    /// bindings before the participant becomes unreachable.
    pub(crate) fn remove_participants(&self, removed: &[ParticipantId]) -> Vec<ParticipantId> {
        let mut dropped = Vec::with_capacity(removed.len());
        for id in removed {
            if let Some((_, participant)) = self.participants.remove(id) {
                participant.dispose_stream_bindings();
                self.order.lock().unwrap().retain(|o| o != id);
                dropped.push(id.clone());
            }
        }
        dropped
    }

    /// Apply an added/removed participant diff atomically.
    ///
    /// The manager interleaves its broadcast between insertion and removal;
    /// this is the same sequence without the broadcast.
    pub(crate) fn apply_participants_changed(
        &self,
        added: Vec<ParticipantDescriptor>,
        removed: &[ParticipantId],
    ) -> ClientResult<RosterDelta> {
        self.validate_participants_diff(&added, removed)?;
        let inserted = self.insert_participants(added);
        let dropped = self.remove_participants(removed);
        Ok(RosterDelta {
            added: inserted,
            removed: dropped,
        })
    }

    /// Reject stream diffs naming an unknown participant or an id on both
    /// sides of the diff.
    pub(crate) fn validate_streams_diff(
        &self,
        participant_id: &ParticipantId,
        added: &[RemoteStreamDescriptor],
        removed: &[StreamId],
    ) -> ClientResult<()> {
        if !self.participants.contains_key(participant_id) {
            return Err(ClientError::consistency(format!(
                "video stream update for unknown participant {}",
                participant_id
            )));
        }
        for id in removed {
            if added.iter().any(|d| d.id == *id) {
                return Err(ClientError::consistency(format!(
                    "stream {} present in both added and removed",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Insert validated stream additions; returns the new stream ids.
    pub(crate) fn insert_streams(
        &self,
        participant_id: &ParticipantId,
        added: Vec<RemoteStreamDescriptor>,
    ) -> Vec<StreamId> {
        let Some(participant) = self.participant(participant_id) else {
            return Vec::new();
        };
        let mut inserted = Vec::with_capacity(added.len());
        for descriptor in added {
            let stream = RemoteVideoStream::new(
                descriptor.id,
                descriptor.stream_type,
                descriptor.is_available,
            );
            inserted.push(stream.id());
            participant.add_stream(stream);
        }
        inserted
    }

    /// Drop validated stream removals, disposing each stream's renderer
    /// binding first.
    pub(crate) fn remove_streams(
        &self,
        participant_id: &ParticipantId,
        removed: &[StreamId],
    ) -> Vec<StreamId> {
        let Some(participant) = self.participant(participant_id) else {
            return Vec::new();
        };
        let mut dropped = Vec::with_capacity(removed.len());
        for id in removed {
            if participant.remove_stream(id).is_some() {
                dropped.push(*id);
            } else {
                tracing::warn!(
                    participant_id = %participant_id,
                    stream_id = %id,
                    "removed stream was not tracked"
                );
            }
        }
        dropped
    }

    /// Apply an added/removed video stream diff for one participant.
    ///
    /// Returns the (added, removed) stream ids.
    pub(crate) fn apply_video_streams_changed(
        &self,
        participant_id: &ParticipantId,
        added: Vec<RemoteStreamDescriptor>,
        removed: &[StreamId],
    ) -> ClientResult<(Vec<StreamId>, Vec<StreamId>)> {
        self.validate_streams_diff(participant_id, &added, removed)?;
        let inserted = self.insert_streams(participant_id, added);
        let dropped = self.remove_streams(participant_id, removed);
        Ok((inserted, dropped))
    }

    /// Find a specific stream on a specific participant
    pub(crate) fn find_stream(
        &self,
        participant_id: &ParticipantId,
        stream_id: &StreamId,
    ) -> Option<RemoteVideoStream> {
        self.participants
            .get(participant_id)
            .and_then(|p| p.find_stream(stream_id))
    }

    /// Dispose every renderer binding in the roster.
    ///
    /// Called when the owning call is purged from the registry.
    pub(crate) fn dispose_all(&self) {
        for entry in self.participants.iter() {
            entry.value().dispose_stream_bindings();
        }
    }
}

impl std::fmt::Debug for ParticipantRoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantRoster")
            .field("len", &self.len())
            .finish()
    }
}
