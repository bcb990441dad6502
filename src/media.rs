//! Video streams and renderer bindings
//!
//! A stream's identity is stable for its lifetime and a stream is never
//! shared between two calls. A stream can have zero or one renderer; a
//! renderer binds to exactly one stream for its lifetime and owns at most
//! one live view. Disposal is idempotent everywhere.
//!
//! The platform surface itself is behind [`RenderSurfaceProvider`]; hosts
//! plug in their windowing integration, tests use
//! [`HeadlessSurfaceProvider`].
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use clearcall_core::media::{
//!     HeadlessSurfaceProvider, LocalVideoStream, MediaStreamType, ScalingMode,
//!     CameraFacing, VideoStream, VideoStreamRenderer,
//! };
//!
//! let provider = Arc::new(HeadlessSurfaceProvider::new());
//! let stream = LocalVideoStream::new(MediaStreamType::Video, CameraFacing::Front);
//!
//! let renderer = VideoStreamRenderer::new(
//!     VideoStream::Local(stream),
//!     provider.clone(),
//! ).unwrap();
//!
//! let view = renderer.create_view(ScalingMode::Crop).unwrap();
//! view.set_scaling_mode(ScalingMode::Fit).unwrap();
//! renderer.dispose();
//! assert_eq!(provider.active_surfaces(), 0);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};

/// Unique identifier for a video stream
pub type StreamId = Uuid;

/// What a video stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaStreamType {
    /// Camera video
    Video,
    /// Screen sharing
    ScreenSharing,
}

/// How a view scales its stream into the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalingMode {
    /// Stretch to fill, ignoring aspect ratio
    Stretch,
    /// Letterbox to preserve aspect ratio
    Fit,
    /// Fill and crop to preserve aspect ratio
    Crop,
}

/// Which camera feeds a local video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraFacing {
    Front,
    Back,
}

impl CameraFacing {
    pub fn flipped(&self) -> CameraFacing {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }
}

/// Shared identity + renderer-binding slot of a stream.
///
/// The slot holds a weak reference so a leaked renderer can never keep a
/// departed participant's stream alive.
struct StreamCore {
    id: StreamId,
    stream_type: MediaStreamType,
    binding: Mutex<Option<Weak<RendererInner>>>,
}

impl StreamCore {
    fn new(id: StreamId, stream_type: MediaStreamType) -> Self {
        Self {
            id,
            stream_type,
            binding: Mutex::new(None),
        }
    }

    /// Take the bound renderer out of the slot and dispose it.
    fn dispose_binding(&self) {
        let weak = self.binding.lock().unwrap().take();
        if let Some(renderer) = weak.and_then(|w| w.upgrade()) {
            dispose_renderer(&renderer);
        }
    }
}

struct LocalStreamInner {
    core: StreamCore,
    is_sending: AtomicBool,
    facing: Mutex<CameraFacing>,
}

/// A video stream captured locally (camera or screen).
///
/// Clones share identity and state.
#[derive(Clone)]
pub struct LocalVideoStream {
    inner: Arc<LocalStreamInner>,
}

impl LocalVideoStream {
    /// Create a local stream with a fresh id
    pub fn new(stream_type: MediaStreamType, facing: CameraFacing) -> Self {
        Self::with_id(StreamId::new_v4(), stream_type, facing)
    }

    pub(crate) fn with_id(
        id: StreamId,
        stream_type: MediaStreamType,
        facing: CameraFacing,
    ) -> Self {
        Self {
            inner: Arc::new(LocalStreamInner {
                core: StreamCore::new(id, stream_type),
                is_sending: AtomicBool::new(false),
                facing: Mutex::new(facing),
            }),
        }
    }

    pub fn id(&self) -> StreamId {
        self.inner.core.id
    }

    pub fn stream_type(&self) -> MediaStreamType {
        self.inner.core.stream_type
    }

    /// Whether the stream is being transmitted to the call
    pub fn is_sending(&self) -> bool {
        self.inner.is_sending.load(Ordering::SeqCst)
    }

    pub fn camera_facing(&self) -> CameraFacing {
        *self.inner.facing.lock().unwrap()
    }

    pub(crate) fn set_sending(&self, sending: bool) {
        self.inner.is_sending.store(sending, Ordering::SeqCst);
    }

    pub(crate) fn set_facing(&self, facing: CameraFacing) {
        *self.inner.facing.lock().unwrap() = facing;
    }

    pub(crate) fn dispose_renderer_binding(&self) {
        self.inner.core.dispose_binding();
    }
}

impl std::fmt::Debug for LocalVideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalVideoStream")
            .field("id", &self.id())
            .field("stream_type", &self.stream_type())
            .field("is_sending", &self.is_sending())
            .finish()
    }
}

struct RemoteStreamInner {
    core: StreamCore,
    is_available: AtomicBool,
}

/// A video stream received from a remote participant.
///
/// Clones share identity and state.
#[derive(Clone)]
pub struct RemoteVideoStream {
    inner: Arc<RemoteStreamInner>,
}

impl RemoteVideoStream {
    pub(crate) fn new(id: StreamId, stream_type: MediaStreamType, is_available: bool) -> Self {
        Self {
            inner: Arc::new(RemoteStreamInner {
                core: StreamCore::new(id, stream_type),
                is_available: AtomicBool::new(is_available),
            }),
        }
    }

    pub fn id(&self) -> StreamId {
        self.inner.core.id
    }

    pub fn stream_type(&self) -> MediaStreamType {
        self.inner.core.stream_type
    }

    /// Whether frames are currently arriving for this stream
    pub fn is_available(&self) -> bool {
        self.inner.is_available.load(Ordering::SeqCst)
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.inner.is_available.store(available, Ordering::SeqCst);
    }

    pub(crate) fn dispose_renderer_binding(&self) {
        self.inner.core.dispose_binding();
    }
}

impl std::fmt::Debug for RemoteVideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteVideoStream")
            .field("id", &self.id())
            .field("stream_type", &self.stream_type())
            .field("is_available", &self.is_available())
            .finish()
    }
}

/// A renderable video stream, local or remote
#[derive(Debug, Clone)]
pub enum VideoStream {
    Local(LocalVideoStream),
    Remote(RemoteVideoStream),
}

impl VideoStream {
    pub fn id(&self) -> StreamId {
        match self {
            VideoStream::Local(s) => s.id(),
            VideoStream::Remote(s) => s.id(),
        }
    }

    pub fn stream_type(&self) -> MediaStreamType {
        match self {
            VideoStream::Local(s) => s.stream_type(),
            VideoStream::Remote(s) => s.stream_type(),
        }
    }

    fn core(&self) -> &StreamCore {
        match self {
            VideoStream::Local(s) => &s.inner.core,
            VideoStream::Remote(s) => &s.inner.core,
        }
    }
}

/// Opaque handle to a platform rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// Platform boundary that produces and manages rendering surfaces.
///
/// The core treats surfaces as opaque handles; implementations bridge to the
/// host's windowing system.
pub trait RenderSurfaceProvider: Send + Sync {
    /// Create a surface for the given stream
    fn create_surface(
        &self,
        stream_id: StreamId,
        scaling: ScalingMode,
    ) -> ClientResult<SurfaceHandle>;

    /// Update the scaling mode of a live surface without recreating it
    fn update_scaling(&self, surface: SurfaceHandle, scaling: ScalingMode);

    /// Release a surface
    fn release_surface(&self, surface: SurfaceHandle);
}

/// Surface provider that hands out dummy handles.
///
/// Used by tests and headless hosts; tracks live surfaces so leaks are
/// observable.
pub struct HeadlessSurfaceProvider {
    next: AtomicU64,
    active: Mutex<HashSet<u64>>,
}

impl HeadlessSurfaceProvider {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Number of surfaces created and not yet released
    pub fn active_surfaces(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

impl Default for HeadlessSurfaceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurfaceProvider for HeadlessSurfaceProvider {
    fn create_surface(
        &self,
        _stream_id: StreamId,
        _scaling: ScalingMode,
    ) -> ClientResult<SurfaceHandle> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        self.active.lock().unwrap().insert(id);
        Ok(SurfaceHandle(id))
    }

    fn update_scaling(&self, _surface: SurfaceHandle, _scaling: ScalingMode) {}

    fn release_surface(&self, surface: SurfaceHandle) {
        self.active.lock().unwrap().remove(&surface.0);
    }
}

struct RendererState {
    disposed: bool,
    view: Option<VideoStreamRendererView>,
}

struct RendererInner {
    stream: VideoStream,
    provider: Arc<dyn RenderSurfaceProvider>,
    state: Mutex<RendererState>,
}

fn dispose_renderer(inner: &Arc<RendererInner>) {
    let view = {
        let mut state = inner.state.lock().unwrap();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.view.take()
    };
    if let Some(view) = view {
        view.dispose();
    }
    // Release the stream's binding slot, but only if it still points at us;
    // the roster may already have taken it during participant removal.
    let mut slot = inner.stream.core().binding.lock().unwrap();
    if let Some(weak) = slot.as_ref() {
        if Weak::ptr_eq(weak, &Arc::downgrade(inner)) {
            *slot = None;
        }
    }
}

/// Binding between one video stream and at most one live view.
///
/// Created with [`VideoStreamRenderer::new`], which fails with
/// [`ClientError::AlreadyRendering`] if the stream already has an active
/// renderer. Clones share the binding.
#[derive(Clone)]
pub struct VideoStreamRenderer {
    inner: Arc<RendererInner>,
}

impl VideoStreamRenderer {
    /// Attach a renderer to a stream.
    ///
    /// At most one active renderer may exist per stream; dispose the current
    /// one before attaching another.
    pub fn new(
        stream: VideoStream,
        provider: Arc<dyn RenderSurfaceProvider>,
    ) -> ClientResult<Self> {
        let inner = Arc::new(RendererInner {
            stream,
            provider,
            state: Mutex::new(RendererState {
                disposed: false,
                view: None,
            }),
        });

        let mut slot = inner.stream.core().binding.lock().unwrap();
        let occupied = slot
            .as_ref()
            .and_then(|w| w.upgrade())
            .map(|r| !r.state.lock().unwrap().disposed)
            .unwrap_or(false);
        if occupied {
            return Err(ClientError::AlreadyRendering {
                stream_id: inner.stream.id(),
            });
        }
        *slot = Some(Arc::downgrade(&inner));
        drop(slot);

        tracing::debug!(stream_id = %inner.stream.id(), "attached renderer to stream");
        Ok(Self { inner })
    }

    /// The stream this renderer is bound to
    pub fn stream(&self) -> &VideoStream {
        &self.inner.stream
    }

    /// Create the renderer's view.
    ///
    /// Fails with [`ClientError::MultipleViews`] while a live view exists and
    /// with [`ClientError::RendererDisposed`] after [`dispose`](Self::dispose).
    pub fn create_view(&self, scaling: ScalingMode) -> ClientResult<VideoStreamRendererView> {
        let mut state = self.inner.state.lock().unwrap();
        if state.disposed {
            return Err(ClientError::RendererDisposed);
        }
        if let Some(view) = state.view.as_ref() {
            if !view.is_disposed() {
                return Err(ClientError::MultipleViews {
                    stream_id: self.inner.stream.id(),
                });
            }
        }
        let surface = self
            .inner
            .provider
            .create_surface(self.inner.stream.id(), scaling)?;
        let view = VideoStreamRendererView::new(surface, scaling, self.inner.provider.clone());
        state.view = Some(view.clone());
        Ok(view)
    }

    /// Whether this renderer has been disposed
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().unwrap().disposed
    }

    /// Dispose the renderer, releasing its view and the stream binding.
    ///
    /// Idempotent: a second dispose is a no-op.
    pub fn dispose(&self) {
        dispose_renderer(&self.inner);
    }
}

impl std::fmt::Debug for VideoStreamRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStreamRenderer")
            .field("stream_id", &self.inner.stream.id())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct ViewState {
    disposed: bool,
    scaling: ScalingMode,
}

struct ViewInner {
    surface: SurfaceHandle,
    provider: Arc<dyn RenderSurfaceProvider>,
    state: Mutex<ViewState>,
}

/// A live view produced by a renderer.
///
/// Scaling can be updated without recreating the view; disposal is
/// idempotent.
#[derive(Clone)]
pub struct VideoStreamRendererView {
    inner: Arc<ViewInner>,
}

impl VideoStreamRendererView {
    fn new(
        surface: SurfaceHandle,
        scaling: ScalingMode,
        provider: Arc<dyn RenderSurfaceProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(ViewInner {
                surface,
                provider,
                state: Mutex::new(ViewState {
                    disposed: false,
                    scaling,
                }),
            }),
        }
    }

    /// The platform surface backing this view
    pub fn surface(&self) -> SurfaceHandle {
        self.inner.surface
    }

    pub fn scaling_mode(&self) -> ScalingMode {
        self.inner.state.lock().unwrap().scaling
    }

    /// Update the scaling mode of the live view
    pub fn set_scaling_mode(&self, scaling: ScalingMode) -> ClientResult<()> {
        let mut state = self.inner.state.lock().unwrap();
        if state.disposed {
            return Err(ClientError::RendererDisposed);
        }
        state.scaling = scaling;
        self.inner.provider.update_scaling(self.inner.surface, scaling);
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().unwrap().disposed
    }

    /// Release the view's surface. Idempotent.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.disposed {
            return;
        }
        state.disposed = true;
        drop(state);
        self.inner.provider.release_surface(self.inner.surface);
    }
}

impl std::fmt::Debug for VideoStreamRendererView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStreamRendererView")
            .field("surface", &self.inner.surface)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
