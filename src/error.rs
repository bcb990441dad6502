//! Error types and handling for the clearcall-core library
//!
//! This module defines all error types that can occur during client operations
//! and provides guidance on how to handle them.
//!
//! # Error Categories
//!
//! Errors are categorized to help with recovery strategies:
//!
//! - **Consistency Errors** - A reconciliation diff violated a registry
//!   invariant; the registry instance is poisoned and cannot recover
//! - **Rendering Errors** - Renderer/view misuse, recoverable by disposing
//!   the offending binding first
//! - **State Errors** - Operation invalid for the current call state, or
//!   superseded by a terminal transition; re-read state before retrying
//! - **Transport Errors** - Failures from the underlying signaling/media
//!   transport; retry policy is the caller's decision
//! - **Permission Errors** - Missing audio/video permission, surfaced to the
//!   user for remediation
//!
//! Nothing in this crate retries automatically; classification is what lets
//! the caller decide between retrying and surfacing the failure.
//!
//! # Basic Pattern
//!
//! ```rust,no_run
//! # use clearcall_core::{ClientManager, ClientError};
//! # use std::sync::Arc;
//! # async fn example(client: Arc<ClientManager>, call_id: clearcall_core::CallId) {
//! match client.hold_call(&call_id).await {
//!     Ok(()) => println!("call held"),
//!     Err(ClientError::StaleState { .. }) => {
//!         // The call ended while the request was in flight; refresh the UI.
//!     }
//!     Err(ClientError::Transport { source }) => {
//!         eprintln!("transport problem: {}", source);
//!     }
//!     Err(e) => eprintln!("unexpected error: {}", e),
//! }
//! # }
//! ```

use thiserror::Error;

use crate::call::{CallId, CallState};
use crate::media::StreamId;
use crate::participant::{ParticipantId, ParticipantState};
use crate::transport::TransportError;

/// Result type alias for clearcall-core operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Comprehensive error types for calling client operations
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// A reconciliation diff violated a registry invariant. Fatal to the
    /// registry instance: all later reconciliations fail fast.
    #[error("consistency violation: {reason}")]
    Consistency { reason: String },

    /// The stream already has a live renderer attached
    #[error("stream {stream_id} already has an active renderer")]
    AlreadyRendering { stream_id: StreamId },

    /// The renderer already owns a live view
    #[error("renderer for stream {stream_id} already has a live view")]
    MultipleViews { stream_id: StreamId },

    /// The renderer (or its view) has been disposed
    #[error("renderer has been disposed")]
    RendererDisposed,

    /// The operation was superseded by a terminal state transition
    #[error("operation superseded by terminal transition of call {call_id}")]
    StaleState { call_id: CallId },

    /// Wrapped transport/signaling failure
    #[error("transport error: {source}")]
    Transport { source: TransportError },

    /// Missing audio/video permission
    #[error("permission denied: {permission}")]
    PermissionDenied { permission: String },

    /// Call related errors
    #[error("call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    #[error("invalid call state for call {call_id}: current state is {current_state:?}")]
    InvalidCallState {
        call_id: CallId,
        current_state: CallState,
    },

    #[error("call limit exceeded: limit is {limit}")]
    CallLimitExceeded { limit: usize },

    /// Participant related errors
    #[error("participant {participant_id} not found in call {call_id}")]
    ParticipantNotFound {
        call_id: CallId,
        participant_id: ParticipantId,
    },

    #[error("invalid participant state for {participant_id}: current state is {current_state:?}")]
    InvalidParticipantState {
        participant_id: ParticipantId,
        current_state: ParticipantState,
    },

    /// Stream related errors
    #[error("video stream {stream_id} not found in call {call_id}")]
    StreamNotFound { call_id: CallId, stream_id: StreamId },

    #[error("no local video stream is active on call {call_id}")]
    VideoNotStarted { call_id: CallId },

    /// Configuration errors
    #[error("invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("missing required configuration: {field}")]
    MissingConfiguration { field: String },

    /// Push payload could not be decoded into an incoming-call descriptor
    #[error("invalid push payload: {reason}")]
    InvalidPushPayload { reason: String },

    /// The client has not been started (or has been stopped)
    #[error("client is not running")]
    NotRunning,

    /// Generic errors
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Create a consistency error
    pub fn consistency(reason: impl Into<String>) -> Self {
        Self::Consistency {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Map a transport failure onto the client taxonomy.
    ///
    /// Permission failures keep their own classification so the caller can
    /// route them to the user instead of a retry loop.
    pub fn from_transport(source: TransportError) -> Self {
        match source {
            TransportError::PermissionDenied { permission } => {
                Self::PermissionDenied { permission }
            }
            other => Self::Transport { source: other },
        }
    }

    /// Check if this error is recoverable by the caller
    ///
    /// Recoverable means a well-defined caller action (dispose a binding,
    /// re-read state, retry against the transport) can clear the condition.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Caller can dispose the conflicting binding and try again
            ClientError::AlreadyRendering { .. }
            | ClientError::MultipleViews { .. } => true,

            // Caller should re-read state
            ClientError::StaleState { .. } => true,

            // Retry policy belongs to the caller
            ClientError::Transport { .. } => true,

            // Fatal or requires out-of-band fixes
            ClientError::Consistency { .. }
            | ClientError::RendererDisposed
            | ClientError::PermissionDenied { .. }
            | ClientError::InvalidConfiguration { .. }
            | ClientError::MissingConfiguration { .. } => false,

            // Context-dependent errors
            _ => false,
        }
    }

    /// Check if this error is a renderer-binding contract violation
    pub fn is_rendering_error(&self) -> bool {
        matches!(
            self,
            ClientError::AlreadyRendering { .. }
                | ClientError::MultipleViews { .. }
                | ClientError::RendererDisposed
        )
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::Consistency { .. } => "consistency",

            ClientError::AlreadyRendering { .. }
            | ClientError::MultipleViews { .. }
            | ClientError::RendererDisposed => "rendering",

            ClientError::CallNotFound { .. }
            | ClientError::InvalidCallState { .. }
            | ClientError::CallLimitExceeded { .. }
            | ClientError::StaleState { .. } => "call",

            ClientError::ParticipantNotFound { .. }
            | ClientError::InvalidParticipantState { .. } => "participant",

            ClientError::StreamNotFound { .. } | ClientError::VideoNotStarted { .. } => "media",

            ClientError::Transport { .. } => "transport",

            ClientError::PermissionDenied { .. } => "permission",

            ClientError::InvalidConfiguration { .. }
            | ClientError::MissingConfiguration { .. }
            | ClientError::InvalidPushPayload { .. } => "configuration",

            ClientError::NotRunning | ClientError::Internal { .. } => "system",
        }
    }
}
