//! Event handling for clearcall-core
//!
//! This module provides the event system for calling clients: call lifecycle
//! events, roster events, media events, feature events, and error events.
//! The event system supports filtering, prioritization, and async handling.
//!
//! Every event kind carries a typed payload struct rather than an open-ended
//! object, so consumers can match exhaustively.
//!
//! # Delivery semantics
//!
//! [`EventEmitter::emit`] snapshots the subscription list and awaits every
//! delivery before returning. A source that awaits `emit` therefore gets
//! per-source ordering; events from different sources are unordered relative
//! to each other. Unsubscribing while a delivery is in flight is safe and
//! takes effect no later than the next emit.
//!
//! Handlers run on a shared notification context: they must not block
//! indefinitely, and they must not call back into mutating client operations
//! without yielding first (spawn a task instead).
//!
//! # Usage Examples
//!
//! ## Basic Event Handler
//!
//! ```rust
//! use clearcall_core::events::{
//!     ClientEventHandler, IncomingCallInfo, CallAction, CallStatusInfo,
//! };
//! use async_trait::async_trait;
//!
//! struct MyEventHandler;
//!
//! #[async_trait]
//! impl ClientEventHandler for MyEventHandler {
//!     async fn on_incoming_call(&self, info: IncomingCallInfo) -> CallAction {
//!         println!("Incoming call from: {}", info.caller_identity);
//!         CallAction::Accept
//!     }
//!
//!     async fn on_call_state_changed(&self, info: CallStatusInfo) {
//!         println!("Call {:?} state changed to {:?}", info.call_id, info.new_state);
//!     }
//! }
//! ```
//!
//! ## Event Filtering
//!
//! ```rust
//! use clearcall_core::events::{EventFilter, EventPriority};
//!
//! // Only high-priority events
//! let filter = EventFilter {
//!     min_priority: Some(EventPriority::High),
//!     ..Default::default()
//! };
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::call::{CallEndReason, CallId, CallState, DtmfTone};
use crate::client::features::CallFeatureKind;
use crate::error::ClientError;
use crate::media::{CameraFacing, StreamId};
use crate::participant::{ParticipantId, ParticipantState};

/// Action to take for an incoming call
///
/// Returned by [`ClientEventHandler::on_incoming_call`] to control how the
/// client responds to the invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAction {
    /// Accept the incoming call and establish the connection
    Accept,
    /// Reject the incoming call
    Reject,
    /// Let it ring without responding
    Ignore,
}

/// Information about an incoming call
#[derive(Debug, Clone)]
pub struct IncomingCallInfo {
    /// Unique call identifier
    pub call_id: CallId,
    /// Opaque identity of the caller
    pub caller_identity: String,
    /// Display name of the caller, if provided
    pub caller_display_name: Option<String>,
    /// Whether the caller started with video
    pub video_enabled: bool,
    /// When the invitation was received
    pub received_at: DateTime<Utc>,
}

/// Information about a call state change
#[derive(Debug, Clone)]
pub struct CallStatusInfo {
    /// Call that changed state
    pub call_id: CallId,
    /// New call state after the transition
    pub new_state: CallState,
    /// Previous call state before the transition (if known)
    pub previous_state: Option<CallState>,
    /// End reason, present once the call is `Disconnected`
    pub end_reason: Option<CallEndReason>,
    /// When the state change occurred
    pub timestamp: DateTime<Utc>,
}

/// Information about a change to the set of tracked calls
#[derive(Debug, Clone)]
pub struct CallListInfo {
    /// Calls that entered the registry
    pub added: Vec<CallId>,
    /// Calls that left the registry
    pub removed: Vec<CallId>,
    /// When the reconciliation was applied
    pub timestamp: DateTime<Utc>,
}

/// Information about a change to a call's participant roster
#[derive(Debug, Clone)]
pub struct ParticipantsUpdatedInfo {
    /// Call whose roster changed
    pub call_id: CallId,
    /// Participants that joined
    pub added: Vec<ParticipantId>,
    /// Participants that left
    pub removed: Vec<ParticipantId>,
    /// When the reconciliation was applied
    pub timestamp: DateTime<Utc>,
}

/// Information about a remote participant's state change
#[derive(Debug, Clone)]
pub struct ParticipantStatusInfo {
    /// Call the participant belongs to
    pub call_id: CallId,
    /// The participant that changed state
    pub participant_id: ParticipantId,
    /// New participant state
    pub new_state: ParticipantState,
    /// Previous participant state (if known)
    pub previous_state: Option<ParticipantState>,
    /// When the state change occurred
    pub timestamp: DateTime<Utc>,
}

/// Information about a change to a participant's (or the local side's)
/// video streams
#[derive(Debug, Clone)]
pub struct VideoStreamsUpdatedInfo {
    /// Call the streams belong to
    pub call_id: CallId,
    /// Owning participant; `None` for local streams
    pub participant_id: Option<ParticipantId>,
    /// Streams that appeared
    pub added: Vec<StreamId>,
    /// Streams that went away
    pub removed: Vec<StreamId>,
    /// When the change was applied
    pub timestamp: DateTime<Utc>,
}

/// Types of media events that can occur during calls
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaEventType {
    /// Local microphone mute state changed
    MicrophoneStateChanged {
        /// Whether the microphone is now muted
        muted: bool,
    },
    /// Call hold state changed
    HoldStateChanged {
        /// Whether the call is now on hold
        on_hold: bool,
    },
    /// A DTMF tone was sent during the call
    DtmfSent {
        /// The tone that was sent
        tone: DtmfTone,
    },
    /// A local video stream started sending
    VideoStarted {
        /// The stream that started
        stream_id: StreamId,
    },
    /// A local video stream stopped sending
    VideoStopped {
        /// The stream that stopped
        stream_id: StreamId,
    },
    /// The active camera was switched
    CameraSwitched {
        /// The camera now in use
        facing: CameraFacing,
    },
    /// A remote participant started or stopped speaking
    SpeakingChanged {
        /// The participant whose speaking state changed
        participant_id: ParticipantId,
        /// Whether they are now speaking
        speaking: bool,
    },
    /// A remote participant's mute state changed
    ParticipantMuteChanged {
        /// The participant whose mute state changed
        participant_id: ParticipantId,
        /// Whether they are now muted
        muted: bool,
    },
}

/// Media event information
#[derive(Debug, Clone)]
pub struct MediaEventInfo {
    /// Call the media event relates to
    pub call_id: CallId,
    /// Type of media event that occurred
    pub event_type: MediaEventType,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Additional event metadata
    pub metadata: HashMap<String, String>,
}

/// Information about a call feature flipping its active state
#[derive(Debug, Clone)]
pub struct FeatureStatusInfo {
    /// Call the feature belongs to
    pub call_id: CallId,
    /// Which feature changed
    pub feature: CallFeatureKind,
    /// Whether the feature is now active
    pub is_active: bool,
    /// When the change occurred
    pub timestamp: DateTime<Utc>,
}

/// Event priority levels for filtering and handling
///
/// ```rust
/// use clearcall_core::events::EventPriority;
///
/// assert!(EventPriority::Critical > EventPriority::High);
/// assert!(EventPriority::High > EventPriority::Normal);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Routine updates (speaking changes, stream availability)
    Low,
    /// State changes, media events
    Normal,
    /// Incoming calls, call list changes
    High,
    /// Failures and consistency violations
    Critical,
}

/// Event filtering options for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only receive events for specific calls (None = all calls)
    pub call_ids: Option<HashSet<CallId>>,
    /// Only receive specific call state changes (None = all states)
    pub call_states: Option<HashSet<CallState>>,
    /// Only receive specific types of media events (None = all media events)
    pub media_event_types: Option<HashSet<MediaEventType>>,
    /// Minimum event priority level (None = all priorities)
    pub min_priority: Option<EventPriority>,
}

/// Comprehensive client event types
///
/// Unified event type encompassing every notification the client emits, each
/// with an associated priority for filtering.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Incoming call received from a remote party
    IncomingCall {
        /// Information about the incoming call
        info: IncomingCallInfo,
        /// Priority level of this event
        priority: EventPriority,
    },
    /// The set of tracked calls changed
    CallListChanged {
        /// Information about the change
        info: CallListInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// Call state changed
    CallStateChanged {
        /// Information about the state change
        info: CallStatusInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// A call's participant roster changed
    ParticipantsChanged {
        /// Information about the roster change
        info: ParticipantsUpdatedInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// A remote participant's state changed
    ParticipantStateChanged {
        /// Information about the state change
        info: ParticipantStatusInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// Video streams were added or removed
    VideoStreamsChanged {
        /// Information about the stream change
        info: VideoStreamsUpdatedInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// Media event occurred (mute, hold, DTMF, video, speaking)
    MediaEvent {
        /// Information about the media event
        info: MediaEventInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// A call feature (recording, transcription) changed its active state
    FeatureStateChanged {
        /// Information about the feature change
        info: FeatureStatusInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// Client error occurred
    ClientError {
        /// The error that occurred
        error: ClientError,
        /// Call associated with the error (if any)
        call_id: Option<CallId>,
        /// Priority of this event
        priority: EventPriority,
    },
}

impl ClientEvent {
    /// Get the priority of this event
    pub fn priority(&self) -> EventPriority {
        match self {
            ClientEvent::IncomingCall { priority, .. } => *priority,
            ClientEvent::CallListChanged { priority, .. } => *priority,
            ClientEvent::CallStateChanged { priority, .. } => *priority,
            ClientEvent::ParticipantsChanged { priority, .. } => *priority,
            ClientEvent::ParticipantStateChanged { priority, .. } => *priority,
            ClientEvent::VideoStreamsChanged { priority, .. } => *priority,
            ClientEvent::MediaEvent { priority, .. } => *priority,
            ClientEvent::FeatureStateChanged { priority, .. } => *priority,
            ClientEvent::ClientError { priority, .. } => *priority,
        }
    }

    /// Get the call ID associated with this event (if any)
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            ClientEvent::IncomingCall { info, .. } => Some(info.call_id),
            ClientEvent::CallStateChanged { info, .. } => Some(info.call_id),
            ClientEvent::ParticipantsChanged { info, .. } => Some(info.call_id),
            ClientEvent::ParticipantStateChanged { info, .. } => Some(info.call_id),
            ClientEvent::VideoStreamsChanged { info, .. } => Some(info.call_id),
            ClientEvent::MediaEvent { info, .. } => Some(info.call_id),
            ClientEvent::FeatureStateChanged { info, .. } => Some(info.call_id),
            ClientEvent::ClientError { call_id, .. } => *call_id,
            ClientEvent::CallListChanged { .. } => None,
        }
    }

    /// Check if this event passes the given filter
    pub fn passes_filter(&self, filter: &EventFilter) -> bool {
        if let Some(min_priority) = &filter.min_priority {
            if self.priority() < *min_priority {
                return false;
            }
        }

        if let Some(call_ids) = &filter.call_ids {
            match self.call_id() {
                Some(call_id) if call_ids.contains(&call_id) => {}
                // List-level events have no single call id; a call-scoped
                // filter still wants them when they mention the call.
                None => {
                    if let ClientEvent::CallListChanged { info, .. } = self {
                        if !info
                            .added
                            .iter()
                            .chain(info.removed.iter())
                            .any(|id| call_ids.contains(id))
                        {
                            return false;
                        }
                    } else {
                        return false;
                    }
                }
                _ => return false,
            }
        }

        if let Some(call_states) = &filter.call_states {
            if let ClientEvent::CallStateChanged { info, .. } = self {
                if !call_states.contains(&info.new_state) {
                    return false;
                }
            }
        }

        if let Some(media_types) = &filter.media_event_types {
            if let ClientEvent::MediaEvent { info, .. } = self {
                if !media_types.contains(&info.event_type) {
                    return false;
                }
            }
        }

        true
    }
}

/// Event handler trait for calling clients
///
/// Implement this trait to receive and respond to events. Only
/// [`on_incoming_call`](Self::on_incoming_call) and
/// [`on_call_state_changed`](Self::on_call_state_changed) are required; the
/// remaining hooks default to no-ops.
#[async_trait]
pub trait ClientEventHandler: Send + Sync {
    /// Handle an incoming call with an action decision
    async fn on_incoming_call(&self, info: IncomingCallInfo) -> CallAction;

    /// Handle call state changes
    async fn on_call_state_changed(&self, info: CallStatusInfo);

    /// Handle changes to the set of tracked calls
    async fn on_call_list_changed(&self, _info: CallListInfo) {}

    /// Handle participant roster changes
    async fn on_participants_changed(&self, _info: ParticipantsUpdatedInfo) {}

    /// Handle remote participant state changes
    async fn on_participant_state_changed(&self, _info: ParticipantStatusInfo) {}

    /// Handle video stream changes
    async fn on_video_streams_changed(&self, _info: VideoStreamsUpdatedInfo) {}

    /// Handle media events
    async fn on_media_event(&self, _info: MediaEventInfo) {}

    /// Handle call feature state changes
    async fn on_feature_state_changed(&self, _info: FeatureStatusInfo) {}

    /// Handle client errors
    async fn on_client_error(&self, _error: ClientError, _call_id: Option<CallId>) {}

    /// Unified dispatcher; override only for custom routing.
    async fn on_client_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::IncomingCall { info, .. } => {
                self.on_incoming_call(info).await;
            }
            ClientEvent::CallListChanged { info, .. } => {
                self.on_call_list_changed(info).await;
            }
            ClientEvent::CallStateChanged { info, .. } => {
                self.on_call_state_changed(info).await;
            }
            ClientEvent::ParticipantsChanged { info, .. } => {
                self.on_participants_changed(info).await;
            }
            ClientEvent::ParticipantStateChanged { info, .. } => {
                self.on_participant_state_changed(info).await;
            }
            ClientEvent::VideoStreamsChanged { info, .. } => {
                self.on_video_streams_changed(info).await;
            }
            ClientEvent::MediaEvent { info, .. } => {
                self.on_media_event(info).await;
            }
            ClientEvent::FeatureStateChanged { info, .. } => {
                self.on_feature_state_changed(info).await;
            }
            ClientEvent::ClientError { error, call_id, .. } => {
                self.on_client_error(error, call_id).await;
            }
        }
    }
}

/// An event subscription with filtering
pub struct EventSubscription {
    /// The event handler that will receive events
    handler: Arc<dyn ClientEventHandler>,
    /// Filter criteria for this subscription
    filter: EventFilter,
    /// Unique identifier for this subscription
    id: uuid::Uuid,
}

impl EventSubscription {
    /// Create a new event subscription with filtering
    pub fn new(handler: Arc<dyn ClientEventHandler>, filter: EventFilter) -> Self {
        Self {
            handler,
            filter,
            id: uuid::Uuid::new_v4(),
        }
    }

    /// Create a subscription that receives all events
    pub fn all_events(handler: Arc<dyn ClientEventHandler>) -> Self {
        Self::new(handler, EventFilter::default())
    }

    /// Create a subscription scoped to one call
    pub fn call_events(handler: Arc<dyn ClientEventHandler>, call_id: CallId) -> Self {
        let mut call_ids = HashSet::new();
        call_ids.insert(call_id);
        let filter = EventFilter {
            call_ids: Some(call_ids),
            ..Default::default()
        };
        Self::new(handler, filter)
    }

    /// Create a subscription for high priority events only
    pub fn high_priority_events(handler: Arc<dyn ClientEventHandler>) -> Self {
        let filter = EventFilter {
            min_priority: Some(EventPriority::High),
            ..Default::default()
        };
        Self::new(handler, filter)
    }

    /// Get the subscription ID, used to unsubscribe later
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Check if this subscription should receive the given event
    pub fn should_receive(&self, event: &ClientEvent) -> bool {
        event.passes_filter(&self.filter)
    }

    /// Deliver an event to this subscription's handler if it matches
    pub async fn deliver_event(&self, event: ClientEvent) {
        if self.should_receive(&event) {
            self.handler.on_client_event(event).await;
        }
    }
}

impl Clone for EventSubscription {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            filter: self.filter.clone(),
            id: self.id,
        }
    }
}

/// Central hub for subscription management and event delivery
pub struct EventEmitter {
    /// List of active event subscriptions
    subscriptions: std::sync::RwLock<Vec<EventSubscription>>,
}

impl EventEmitter {
    /// Create a new event emitter with no subscriptions
    pub fn new() -> Self {
        Self {
            subscriptions: std::sync::RwLock::new(Vec::new()),
        }
    }

    /// Add an event subscription; returns its ID for unsubscribing
    pub fn subscribe(&self, subscription: EventSubscription) -> uuid::Uuid {
        let id = subscription.id();
        self.subscriptions.write().unwrap().push(subscription);
        id
    }

    /// Remove an event subscription
    ///
    /// Returns `true` if the subscription was found and removed. Safe to
    /// call while a delivery is in flight; takes effect no later than the
    /// next emit.
    pub fn unsubscribe(&self, subscription_id: uuid::Uuid) -> bool {
        let mut subscriptions = self.subscriptions.write().unwrap();
        if let Some(pos) = subscriptions.iter().position(|s| s.id() == subscription_id) {
            subscriptions.remove(pos);
            true
        } else {
            false
        }
    }

    /// Emit an event to all matching subscriptions.
    ///
    /// Awaits every delivery before returning, which is what gives callers
    /// per-source ordering.
    pub async fn emit(&self, event: ClientEvent) {
        let subscriptions = self.subscriptions.read().unwrap().clone();

        let tasks: Vec<_> = subscriptions
            .into_iter()
            .map(|subscription| {
                let event_clone = event.clone();
                tokio::spawn(async move {
                    subscription.deliver_event(event_clone).await;
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!("Error delivering event: {}", e);
            }
        }
    }

    /// Get the number of active subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().unwrap().len()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
