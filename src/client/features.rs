//! Call feature extensions
//!
//! Features are optional capabilities of a call (recording, transcription)
//! whose active state is driven entirely by the transport. Lookup is keyed by
//! [`CallFeatureKind`] and returns a typed handle, so no reflection-style
//! type tokens are involved.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The feature kinds a call can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallFeatureKind {
    Recording,
    Transcription,
}

/// Typed handle over a call's recording state
#[derive(Debug, Clone)]
pub struct RecordingFeature {
    active: Arc<AtomicBool>,
}

impl RecordingFeature {
    /// Whether the call is currently being recorded
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Typed handle over a call's transcription state
#[derive(Debug, Clone)]
pub struct TranscriptionFeature {
    active: Arc<AtomicBool>,
}

impl TranscriptionFeature {
    /// Whether the call is currently being transcribed
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// A typed feature handle, tagged by kind
#[derive(Debug, Clone)]
pub enum CallFeature {
    Recording(RecordingFeature),
    Transcription(TranscriptionFeature),
}

/// Per-call feature state, owned by the call
#[derive(Debug)]
pub(crate) struct CallFeatures {
    recording_active: Arc<AtomicBool>,
    transcription_active: Arc<AtomicBool>,
}

impl CallFeatures {
    pub(crate) fn new() -> Self {
        Self {
            recording_active: Arc::new(AtomicBool::new(false)),
            transcription_active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn get(&self, kind: CallFeatureKind) -> CallFeature {
        match kind {
            CallFeatureKind::Recording => CallFeature::Recording(RecordingFeature {
                active: self.recording_active.clone(),
            }),
            CallFeatureKind::Transcription => CallFeature::Transcription(TranscriptionFeature {
                active: self.transcription_active.clone(),
            }),
        }
    }

    /// Returns true when the flag actually changed.
    pub(crate) fn set_active(&self, kind: CallFeatureKind, active: bool) -> bool {
        let flag = match kind {
            CallFeatureKind::Recording => &self.recording_active,
            CallFeatureKind::Transcription => &self.transcription_active,
        };
        flag.swap(active, Ordering::SeqCst) != active
    }
}
