//! High-level calling client implementation
//!
//! This module provides the core client functionality for calling
//! applications.
//!
//! # Architecture Overview
//!
//! The client module is organized into several sub-modules:
//!
//! - **`manager`** - The main ClientManager: call registry and transport
//!   event loop
//! - **`calls`** - Call lifecycle operations (start, join, accept, reject,
//!   hang up)
//! - **`controls`** - In-call controls (hold, mute, DTMF, video, roster,
//!   lobby)
//! - **`roster`** - Per-call participant roster reconciliation
//! - **`features`** - Call feature extensions (recording, transcription)
//!
//! # Usage Guide
//!
//! ## Basic Call Flow
//!
//! ```rust,no_run
//! # use clearcall_core::{ClientBuilder, ClientEvent, call::CallState};
//! # use clearcall_core::transport::{CallTransport, StaticCredentialProvider, MediaOptions};
//! # use std::sync::Arc;
//! # async fn example(transport: Arc<dyn CallTransport>) -> Result<(), Box<dyn std::error::Error>> {
//! // 1. Create and start the client
//! let client = ClientBuilder::new()
//!     .display_name("Alice")
//!     .credential(Arc::new(StaticCredentialProvider::new("token")))
//!     .transport(transport)
//!     .build()
//!     .await?;
//!
//! client.start().await?;
//!
//! // 2. Subscribe to events
//! let mut events = client.subscribe_events();
//!
//! // 3. Place a call
//! let call_id = client.start_call(
//!     vec!["8:user:bob".to_string()],
//!     MediaOptions::default(),
//! ).await?;
//!
//! // 4. Handle events
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             ClientEvent::CallStateChanged { info, .. } => {
//!                 match info.new_state {
//!                     CallState::Connected => println!("Call connected!"),
//!                     CallState::Disconnected => {
//!                         println!("Call ended");
//!                         break;
//!                     }
//!                     _ => {}
//!                 }
//!             }
//!             _ => {}
//!         }
//!     }
//! });
//!
//! // 5. Control the call
//! client.mute_call(&call_id).await?;
//! client.hangup_call(&call_id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Event Handler Caveats
//!
//! Event handlers run on the client's shared notification context. Do not
//! call mutating client operations from inside a handler without spawning a
//! task first; the reconciliation lock may still be held while your handler
//! runs.

pub mod builder;
pub mod call;
pub mod calls;
pub mod config;
pub mod controls;
pub mod features;
pub mod manager;
pub mod roster;
pub mod types;


pub use builder::ClientBuilder;
pub use call::Call;
pub use config::ClientConfig;
pub use features::{CallFeature, CallFeatureKind, RecordingFeature, TranscriptionFeature};
pub use manager::ClientManager;
pub use roster::ParticipantRoster;
pub use types::{CallCapabilities, ClientStats};

/// Type alias for convenient use
pub type Client = ClientManager;
