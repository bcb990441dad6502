//! Builder for constructing a [`ClientManager`]
//!
//! The builder wires the three collaborators the core depends on — the
//! transport, the credential provider, and (optionally) a custom
//! configuration — and produces a ready-to-start manager.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use clearcall_core::{ClientBuilder, transport::{CallTransport, StaticCredentialProvider}};
//! # use std::sync::Arc;
//! # async fn example(transport: Arc<dyn CallTransport>) -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::new()
//!     .display_name("Alice")
//!     .max_concurrent_calls(2)
//!     .credential(Arc::new(StaticCredentialProvider::new("token")))
//!     .transport(transport)
//!     .build()
//!     .await?;
//!
//! client.start().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::client::config::ClientConfig;
use crate::client::manager::ClientManager;
use crate::error::{ClientError, ClientResult};
use crate::media::CameraFacing;
use crate::transport::{CallTransport, CredentialProvider};

/// Fluent builder for [`ClientManager`]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn CallTransport>>,
    credential: Option<Arc<dyn CredentialProvider>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
            credential: None,
        }
    }

    /// Start from an existing configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            credential: None,
        }
    }

    /// Display name presented to remote parties
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.config.display_name = name.into();
        self
    }

    /// Maximum number of simultaneously tracked calls
    pub fn max_concurrent_calls(mut self, max: usize) -> Self {
        self.config.max_concurrent_calls = max;
        self
    }

    /// Upper bound for a single transport request
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    /// Camera used when video starts
    pub fn default_camera(mut self, facing: CameraFacing) -> Self {
        self.config.default_camera = facing;
        self
    }

    /// The signaling/media transport to delegate to (required)
    pub fn transport(mut self, transport: Arc<dyn CallTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The credential provider for call-creating requests (required)
    pub fn credential(mut self, credential: Arc<dyn CredentialProvider>) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Build the client manager
    pub async fn build(self) -> ClientResult<Arc<ClientManager>> {
        let transport = self.transport.ok_or(ClientError::MissingConfiguration {
            field: "transport".to_string(),
        })?;
        let credential = self.credential.ok_or(ClientError::MissingConfiguration {
            field: "credential".to_string(),
        })?;

        if self.config.max_concurrent_calls == 0 {
            return Err(ClientError::invalid_configuration(
                "max_concurrent_calls",
                "must be at least 1",
            ));
        }

        ClientManager::new(self.config, transport, credential).await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
