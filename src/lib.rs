//! clearcall-core: call lifecycle and participant roster coordination
//!
//! This crate is the client-side state layer of a calling application: it
//! tracks calls and their participant rosters, binds video streams to
//! rendering surfaces, and turns a transport's asynchronous notifications
//! into a consistent, observable model.
//!
//! ## Layer Separation
//! ```text
//! application -> clearcall-core -> transport (signaling + media engine)
//! ```
//!
//! clearcall-core focuses on:
//! - Call registry and per-call participant roster reconciliation
//! - The call state machine and its terminal-purge discipline
//! - Video stream renderer bindings (one renderer per stream, one live view
//!   per renderer)
//! - Operation orchestration: classified failures, in-flight deduplication,
//!   stale-state completion
//! - Event delivery with per-source ordering
//!
//! All signaling, media, and device work is behind the
//! [`CallTransport`](transport::CallTransport) boundary.

pub mod call;
pub mod client;
pub mod error;
pub mod events;
pub mod media;
pub mod participant;
pub mod push;
pub mod transport;

// Public API exports
pub use call::{CallDirection, CallEndReason, CallId, CallInfo, CallState, CallStats, DtmfTone};
pub use client::{
    Call, CallCapabilities, CallFeature, CallFeatureKind, Client, ClientBuilder, ClientConfig,
    ClientManager, ClientStats, ParticipantRoster, RecordingFeature, TranscriptionFeature,
};
pub use error::{ClientError, ClientResult};
pub use events::{
    CallAction, CallStatusInfo, ClientEvent, ClientEventHandler, EventEmitter, EventFilter,
    EventPriority, EventSubscription, IncomingCallInfo, MediaEventType,
};
pub use media::{
    CameraFacing, HeadlessSurfaceProvider, LocalVideoStream, MediaStreamType, RemoteVideoStream,
    RenderSurfaceProvider, ScalingMode, StreamId, VideoStream, VideoStreamRenderer,
    VideoStreamRendererView,
};
pub use participant::{ParticipantId, ParticipantInfo, ParticipantState, RemoteParticipant};
pub use push::PushCallDescriptor;
pub use transport::{
    BearerToken, CallTransport, CredentialProvider, JoinLocator, MediaOptions,
    StaticCredentialProvider, TransportError, TransportEvent,
};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
