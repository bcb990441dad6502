//! Type definitions for the client layer
//!
//! Small data structures reported by the client: operational statistics and
//! per-call capability snapshots.

/// Statistics about the client's current state and activity
#[derive(Debug, Clone)]
pub struct ClientStats {
    /// Whether the client is currently running and processing events
    pub is_running: bool,
    /// Total number of calls handled since the client started
    pub total_calls: usize,
    /// Number of currently tracked calls
    pub active_calls: usize,
    /// Number of currently connected calls
    pub connected_calls: usize,
    /// Number of incoming calls awaiting a decision
    pub incoming_pending_calls: usize,
}

/// Operations currently possible for a specific call in its current state.
///
/// Unlike a static feature matrix, this reflects the call's state machine
/// position right now.
#[derive(Debug, Clone)]
pub struct CallCapabilities {
    /// Whether this call can be placed on hold
    pub can_hold: bool,
    /// Whether this call can be resumed from hold
    pub can_resume: bool,
    /// Whether the microphone can be muted for this call
    pub can_mute: bool,
    /// Whether DTMF tones can be sent for this call
    pub can_send_dtmf: bool,
    /// Whether this call can be terminated
    pub can_hangup: bool,
    /// Whether another participant can be invited
    pub can_add_participant: bool,
    /// Whether local video can be started
    pub can_start_video: bool,
}

impl Default for CallCapabilities {
    fn default() -> Self {
        Self {
            can_hold: false,
            can_resume: false,
            can_mute: false,
            can_send_dtmf: false,
            can_hangup: false,
            can_add_participant: false,
            can_start_video: false,
        }
    }
}
