//! Configuration for the calling client

use std::time::Duration;

use crate::media::CameraFacing;

/// Configuration for creating a [`ClientManager`](crate::ClientManager)
///
/// # Examples
///
/// ```rust
/// use clearcall_core::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     display_name: "Conference Room 4".to_string(),
///     max_concurrent_calls: 2,
///     operation_timeout: Duration::from_secs(10),
///     ..Default::default()
/// };
/// assert_eq!(config.max_concurrent_calls, 2);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Display name presented to remote parties
    pub display_name: String,
    /// Maximum number of simultaneously tracked calls
    pub max_concurrent_calls: usize,
    /// Upper bound for a single transport request
    pub operation_timeout: Duration,
    /// Capacity of the broadcast event channel
    pub event_channel_capacity: usize,
    /// Capacity of the transport event queue
    pub transport_event_buffer: usize,
    /// Camera used when video starts
    pub default_camera: CameraFacing,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            max_concurrent_calls: 4,
            operation_timeout: Duration::from_secs(30),
            event_channel_capacity: 256,
            transport_event_buffer: 256,
            default_camera: CameraFacing::Front,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the display name presented to remote parties
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Set the maximum number of simultaneously tracked calls
    pub fn with_max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max;
        self
    }

    /// Set the upper bound for a single transport request
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}
