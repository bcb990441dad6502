//! Call data model for the clearcall-core library
//!
//! This module provides the call identifier, the call state machine, and
//! lightweight call information snapshots. All actual signaling/media
//! operations are delegated to the transport collaborator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Unique identifier for a call
pub type CallId = Uuid;

/// Current state of a call
///
/// Transitions are validated by [`CallState::can_transition_to`];
/// `Disconnected` is terminal and any state may reach it directly (abrupt
/// termination, e.g. network loss, is a valid edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// No call activity yet
    None,
    /// Early media is flowing before the call is answered
    EarlyMedia,
    /// Call is being established
    Connecting,
    /// Remote side is ringing (outgoing) or this call is ringing (incoming)
    Ringing,
    /// Call is connected and media is flowing
    Connected,
    /// Call was put on hold by the local side
    LocalHold,
    /// Call was put on hold by the remote side
    RemoteHold,
    /// Call is being torn down
    Disconnecting,
    /// Call has ended; no further transitions
    Disconnected,
    /// Waiting in the meeting lobby to be admitted
    InLobby,
}

impl CallState {
    /// Check if the call is in an active state (media can flow)
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Connected)
    }

    /// Check if the call is on hold (either side)
    pub fn is_on_hold(&self) -> bool {
        matches!(self, CallState::LocalHold | CallState::RemoteHold)
    }

    /// Check if the call has reached its terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Disconnected)
    }

    /// Check if the call is still in progress
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal()
    }

    /// Validate a state transition.
    ///
    /// Any state may transition directly to `Disconnected` (abrupt
    /// termination) or enter teardown via `Disconnecting` (a hang-up can
    /// race call setup); `Disconnected` itself has no outgoing edges.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use clearcall_core::call::CallState;
    ///
    /// assert!(CallState::Connected.can_transition_to(&CallState::LocalHold));
    /// assert!(CallState::Ringing.can_transition_to(&CallState::Disconnected));
    /// assert!(!CallState::Disconnected.can_transition_to(&CallState::Connected));
    /// ```
    pub fn can_transition_to(&self, next: &CallState) -> bool {
        if *next == CallState::Disconnected {
            return *self != CallState::Disconnected;
        }
        if *next == CallState::Disconnecting {
            return !matches!(self, CallState::Disconnecting | CallState::Disconnected);
        }
        match self {
            CallState::None => matches!(
                next,
                CallState::EarlyMedia | CallState::Connecting | CallState::Ringing
            ),
            CallState::EarlyMedia => matches!(
                next,
                CallState::Connecting | CallState::Ringing | CallState::Connected
            ),
            CallState::Connecting => matches!(
                next,
                CallState::Ringing | CallState::InLobby | CallState::Connected
            ),
            CallState::Ringing => matches!(next, CallState::Connected),
            CallState::InLobby => matches!(next, CallState::Connected),
            CallState::Connected => {
                matches!(next, CallState::LocalHold | CallState::RemoteHold)
            }
            CallState::LocalHold => matches!(next, CallState::Connected),
            CallState::RemoteHold => matches!(next, CallState::Connected),
            CallState::Disconnecting => false,
            CallState::Disconnected => false,
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Direction of a call (from the client's perspective)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// Outgoing call (client initiated)
    Outgoing,
    /// Incoming call (received from the network)
    Incoming,
}

/// Why a call (or participant) ended, as reported by the transport.
///
/// `code` carries the primary classification, `subcode` the vendor detail.
/// Both are zero for a normal hang-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallEndReason {
    /// Primary end-reason code
    pub code: u32,
    /// Vendor-specific subcode for diagnostics
    pub subcode: u32,
}

impl CallEndReason {
    /// A normal, user-initiated end of call
    pub const NORMAL: CallEndReason = CallEndReason { code: 0, subcode: 0 };

    pub fn new(code: u32, subcode: u32) -> Self {
        Self { code, subcode }
    }

    /// Whether the call ended without failure
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// A DTMF tone that can be sent during a connected call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtmfTone {
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Star,
    Pound,
    A,
    B,
    C,
    D,
}

impl DtmfTone {
    /// The character this tone corresponds to on a keypad
    pub fn as_char(&self) -> char {
        match self {
            DtmfTone::Zero => '0',
            DtmfTone::One => '1',
            DtmfTone::Two => '2',
            DtmfTone::Three => '3',
            DtmfTone::Four => '4',
            DtmfTone::Five => '5',
            DtmfTone::Six => '6',
            DtmfTone::Seven => '7',
            DtmfTone::Eight => '8',
            DtmfTone::Nine => '9',
            DtmfTone::Star => '*',
            DtmfTone::Pound => '#',
            DtmfTone::A => 'A',
            DtmfTone::B => 'B',
            DtmfTone::C => 'C',
            DtmfTone::D => 'D',
        }
    }

    /// Parse a keypad character into a tone
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            '0' => Some(DtmfTone::Zero),
            '1' => Some(DtmfTone::One),
            '2' => Some(DtmfTone::Two),
            '3' => Some(DtmfTone::Three),
            '4' => Some(DtmfTone::Four),
            '5' => Some(DtmfTone::Five),
            '6' => Some(DtmfTone::Six),
            '7' => Some(DtmfTone::Seven),
            '8' => Some(DtmfTone::Eight),
            '9' => Some(DtmfTone::Nine),
            '*' => Some(DtmfTone::Star),
            '#' => Some(DtmfTone::Pound),
            'A' => Some(DtmfTone::A),
            'B' => Some(DtmfTone::B),
            'C' => Some(DtmfTone::C),
            'D' => Some(DtmfTone::D),
            _ => None,
        }
    }
}

impl std::fmt::Display for DtmfTone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Snapshot of a call's observable properties
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Unique call identifier
    pub call_id: CallId,
    /// Current state of the call
    pub state: CallState,
    /// Direction of the call
    pub direction: CallDirection,
    /// Whether outgoing audio is muted
    pub is_muted: bool,
    /// Display name of the remote party (if known)
    pub remote_display_name: Option<String>,
    /// Why the call ended; present only once `Disconnected`
    pub end_reason: Option<CallEndReason>,
    /// Number of remote participants reported by the transport
    pub total_participant_count: usize,
    /// When the call was created locally
    pub created_at: DateTime<Utc>,
    /// When the call was connected (if it ever was)
    pub connected_at: Option<DateTime<Utc>>,
    /// When the call ended (if it has)
    pub ended_at: Option<DateTime<Utc>>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

/// Statistics about current calls
#[derive(Debug, Clone)]
pub struct CallStats {
    pub total_active_calls: usize,
    pub connected_calls: usize,
    pub incoming_pending_calls: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_reaches_exactly_hold_and_teardown_states() {
        let reachable: Vec<CallState> = [
            CallState::None,
            CallState::EarlyMedia,
            CallState::Connecting,
            CallState::Ringing,
            CallState::Connected,
            CallState::LocalHold,
            CallState::RemoteHold,
            CallState::Disconnecting,
            CallState::Disconnected,
            CallState::InLobby,
        ]
        .into_iter()
        .filter(|s| CallState::Connected.can_transition_to(s))
        .collect();

        assert_eq!(
            reachable,
            vec![
                CallState::LocalHold,
                CallState::RemoteHold,
                CallState::Disconnecting,
                CallState::Disconnected,
            ]
        );
    }

    #[test]
    fn disconnected_is_terminal() {
        for next in [
            CallState::None,
            CallState::EarlyMedia,
            CallState::Connecting,
            CallState::Ringing,
            CallState::Connected,
            CallState::LocalHold,
            CallState::RemoteHold,
            CallState::Disconnecting,
            CallState::Disconnected,
            CallState::InLobby,
        ] {
            assert!(!CallState::Disconnected.can_transition_to(&next));
        }
    }

    #[test]
    fn any_state_may_terminate_abruptly() {
        for state in [
            CallState::None,
            CallState::EarlyMedia,
            CallState::Connecting,
            CallState::Ringing,
            CallState::Connected,
            CallState::LocalHold,
            CallState::RemoteHold,
            CallState::Disconnecting,
            CallState::InLobby,
        ] {
            assert!(state.can_transition_to(&CallState::Disconnected));
        }
    }

    #[test]
    fn lobby_path() {
        assert!(CallState::Connecting.can_transition_to(&CallState::InLobby));
        assert!(CallState::InLobby.can_transition_to(&CallState::Connected));
        assert!(!CallState::InLobby.can_transition_to(&CallState::Ringing));
    }

    #[test]
    fn hold_round_trips_through_connected() {
        assert!(CallState::Connected.can_transition_to(&CallState::LocalHold));
        assert!(CallState::LocalHold.can_transition_to(&CallState::Connected));
        assert!(CallState::Connected.can_transition_to(&CallState::RemoteHold));
        assert!(CallState::RemoteHold.can_transition_to(&CallState::Connected));
        assert!(!CallState::LocalHold.can_transition_to(&CallState::RemoteHold));
    }

    #[test]
    fn dtmf_tone_round_trip() {
        assert_eq!(DtmfTone::from_char('5'), Some(DtmfTone::Five));
        assert_eq!(DtmfTone::from_char('*'), Some(DtmfTone::Star));
        assert_eq!(DtmfTone::from_char('d'), Some(DtmfTone::D));
        assert_eq!(DtmfTone::from_char('x'), None);
        assert_eq!(DtmfTone::Pound.as_char(), '#');
    }

    #[test]
    fn end_reason_classification() {
        assert!(CallEndReason::NORMAL.is_success());
        assert!(!CallEndReason::new(487, 10004).is_success());
    }
}
