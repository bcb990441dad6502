//! Client manager: call registry and transport event loop
//!
//! The [`ClientManager`] owns the set of tracked calls, consumes the
//! transport's event stream, and is the only component that mutates call
//! state. Reconciliation entry points ([`apply_calls_changed`] and the roster
//! updates driven from transport events) are serialized behind a single
//! writer lock; reads are lock-free.
//!
//! Event consumers have three options, mirroring common host shapes:
//! a single primary [`ClientEventHandler`] (drives the incoming-call
//! decision), filtered [`EventSubscription`]s, and a raw broadcast channel.
//!
//! [`apply_calls_changed`]: ClientManager::apply_calls_changed

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};

use crate::call::{CallEndReason, CallId, CallInfo, CallState};
use crate::client::call::{Call, StateChangeOutcome};
use crate::client::config::ClientConfig;
use crate::client::controls::OperationKind;
use crate::client::features::CallFeatureKind;
use crate::client::types::ClientStats;
use crate::error::{ClientError, ClientResult};
use crate::events::{
    CallAction, CallListInfo, CallStatusInfo, ClientEvent, ClientEventHandler, EventEmitter,
    EventFilter, EventPriority, EventSubscription, FeatureStatusInfo, IncomingCallInfo,
    MediaEventInfo, MediaEventType, ParticipantStatusInfo, ParticipantsUpdatedInfo,
    VideoStreamsUpdatedInfo,
};
use crate::transport::{
    CallDescriptor, CallTransport, CredentialProvider, MediaOptions, TransportEvent,
};

/// Coordinates call tracking, event delivery, and operations.
///
/// Construct with [`ClientBuilder`](crate::ClientBuilder), then [`start`]
/// to begin consuming transport events.
///
/// [`start`]: ClientManager::start
pub struct ClientManager {
    // Weak handle to ourselves for spawned tasks; set by `new`.
    self_ref: std::sync::Weak<ClientManager>,

    pub(crate) config: ClientConfig,
    pub(crate) transport: Arc<dyn CallTransport>,
    pub(crate) credential: Arc<dyn CredentialProvider>,

    // Call registry: id-keyed map plus insertion order. Mutated only behind
    // `reconcile_lock`.
    pub(crate) calls: DashMap<CallId, Call>,
    pub(crate) call_order: std::sync::Mutex<Vec<CallId>>,
    pub(crate) incoming_calls: DashMap<CallId, IncomingCallInfo>,
    pub(crate) reconcile_lock: Mutex<()>,
    poisoned: AtomicBool,

    // Event delivery
    pub(crate) handler: RwLock<Option<Arc<dyn ClientEventHandler>>>,
    pub(crate) emitter: EventEmitter,
    event_tx: broadcast::Sender<ClientEvent>,

    // Transport event channel; the receiver is taken by `start`
    transport_tx: mpsc::Sender<TransportEvent>,
    transport_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    pub(crate) is_running: RwLock<bool>,

    // At-most-one in-flight identical mutating request per call
    pub(crate) in_flight: DashMap<(CallId, OperationKind), watch::Receiver<Option<ClientResult<()>>>>,

    total_calls: AtomicUsize,
}

impl ClientManager {
    /// Create a new client manager around a transport and credential provider
    pub async fn new(
        config: ClientConfig,
        transport: Arc<dyn CallTransport>,
        credential: Arc<dyn CredentialProvider>,
    ) -> ClientResult<Arc<Self>> {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (transport_tx, transport_rx) = mpsc::channel(config.transport_event_buffer);

        Ok(Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            config,
            transport,
            credential,
            calls: DashMap::new(),
            call_order: std::sync::Mutex::new(Vec::new()),
            incoming_calls: DashMap::new(),
            reconcile_lock: Mutex::new(()),
            poisoned: AtomicBool::new(false),
            handler: RwLock::new(None),
            emitter: EventEmitter::new(),
            event_tx,
            transport_tx,
            transport_rx: Mutex::new(Some(transport_rx)),
            loop_handle: Mutex::new(None),
            is_running: RwLock::new(false),
            in_flight: DashMap::new(),
            total_calls: AtomicUsize::new(0),
        }))
    }

    // ===== LIFECYCLE =====

    /// Start consuming transport events
    pub async fn start(&self) -> ClientResult<()> {
        let mut rx_slot = self.transport_rx.lock().await;
        let Some(mut rx) = rx_slot.take() else {
            // Already started once; starting twice is a no-op while running.
            if *self.is_running.read().await {
                return Ok(());
            }
            return Err(ClientError::internal("transport event channel already consumed"));
        };
        drop(rx_slot);

        *self.is_running.write().await = true;
        let manager = self
            .self_ref
            .upgrade()
            .ok_or_else(|| ClientError::internal("client manager dropped"))?;
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                manager.apply_transport_event(event).await;
            }
            tracing::debug!("transport event channel closed");
        });
        *self.loop_handle.lock().await = Some(handle);

        tracing::info!("client manager started");
        Ok(())
    }

    /// Stop consuming transport events.
    ///
    /// Tracked calls stay readable; no further events are applied.
    pub async fn stop(&self) -> ClientResult<()> {
        *self.is_running.write().await = false;
        if let Some(handle) = self.loop_handle.lock().await.take() {
            handle.abort();
        }
        tracing::info!("client manager stopped");
        Ok(())
    }

    /// Whether the client is consuming transport events
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Sender half of the transport event channel.
    ///
    /// Hand this to the transport so it can deliver out-of-band
    /// notifications.
    pub fn transport_event_sender(&self) -> mpsc::Sender<TransportEvent> {
        self.transport_tx.clone()
    }

    // ===== EVENT CONSUMPTION =====

    /// Set the primary event handler.
    ///
    /// The primary handler is the one whose
    /// [`on_incoming_call`](ClientEventHandler::on_incoming_call) decision is
    /// acted upon.
    pub async fn set_event_handler(&self, handler: Arc<dyn ClientEventHandler>) {
        *self.handler.write().await = Some(handler);
    }

    /// Subscribe to the raw broadcast event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Add a filtered event subscription; returns its token
    pub fn subscribe_filtered(
        &self,
        handler: Arc<dyn ClientEventHandler>,
        filter: EventFilter,
    ) -> uuid::Uuid {
        self.emitter.subscribe(EventSubscription::new(handler, filter))
    }

    /// Remove a filtered event subscription
    pub fn unsubscribe(&self, token: uuid::Uuid) -> bool {
        self.emitter.unsubscribe(token)
    }

    /// Deliver an event to the broadcast channel, the filtered
    /// subscriptions, and (except for incoming calls, which are routed
    /// through the action path) the primary handler.
    pub(crate) async fn emit_event(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event.clone());
        self.emitter.emit(event.clone()).await;

        if matches!(event, ClientEvent::IncomingCall { .. }) {
            return;
        }
        let handler = self.handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_client_event(event).await;
        }
    }

    // ===== QUERIES =====

    /// Tracked calls in insertion order
    pub fn active_calls(&self) -> Vec<Call> {
        let order = self.call_order.lock().unwrap();
        order
            .iter()
            .filter_map(|id| self.calls.get(id).map(|c| c.clone()))
            .collect()
    }

    /// Look up one call by id
    pub fn get_call(&self, call_id: &CallId) -> ClientResult<Call> {
        self.calls
            .get(call_id)
            .map(|c| c.clone())
            .ok_or(ClientError::CallNotFound { call_id: *call_id })
    }

    /// Snapshot of one call
    pub fn get_call_info(&self, call_id: &CallId) -> ClientResult<CallInfo> {
        Ok(self.get_call(call_id)?.info())
    }

    /// Snapshots of every tracked call, in insertion order
    pub fn list_calls(&self) -> Vec<CallInfo> {
        self.active_calls().iter().map(|c| c.info()).collect()
    }

    /// Incoming calls awaiting a decision
    pub fn pending_incoming_calls(&self) -> Vec<IncomingCallInfo> {
        self.incoming_calls
            .iter()
            .map(|e| e.value().clone())
            .collect()
    }

    /// Current operational statistics
    pub async fn get_client_stats(&self) -> ClientStats {
        let connected = self
            .calls
            .iter()
            .filter(|c| c.value().state() == CallState::Connected)
            .count();
        ClientStats {
            is_running: *self.is_running.read().await,
            total_calls: self.total_calls.load(Ordering::SeqCst),
            active_calls: self.calls.len(),
            connected_calls: connected,
            incoming_pending_calls: self.incoming_calls.len(),
        }
    }

    // ===== RECONCILIATION =====

    fn ensure_not_poisoned(&self) -> ClientResult<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(ClientError::consistency("call registry is poisoned"));
        }
        Ok(())
    }

    fn poison(&self, reason: &str) {
        self.poisoned.store(true, Ordering::SeqCst);
        tracing::error!(reason, "call registry poisoned");
    }

    /// Apply an added/removed call diff atomically.
    ///
    /// Added calls are inserted before the list-changed event is emitted;
    /// removed calls are dropped after it. A call appearing in both sides,
    /// an added id already tracked, or a removed id that is unknown fail with
    /// [`ClientError::Consistency`] and poison the registry.
    pub async fn apply_calls_changed(
        &self,
        added: Vec<CallDescriptor>,
        removed: Vec<CallId>,
    ) -> ClientResult<()> {
        self.ensure_not_poisoned()?;
        let _guard = self.reconcile_lock.lock().await;

        for id in &removed {
            if added.iter().any(|d| d.call_id == *id) {
                self.poison("call present in both added and removed");
                return Err(ClientError::consistency(format!(
                    "call {} present in both added and removed",
                    id
                )));
            }
            if !self.calls.contains_key(id) {
                self.poison("removed call is not tracked");
                return Err(ClientError::consistency(format!(
                    "removed call {} is not tracked",
                    id
                )));
            }
        }
        for descriptor in &added {
            if self.calls.contains_key(&descriptor.call_id) {
                self.poison("added call is already tracked");
                return Err(ClientError::consistency(format!(
                    "added call {} is already tracked",
                    descriptor.call_id
                )));
            }
        }

        let added_ids: Vec<CallId> = added.iter().map(|d| d.call_id).collect();
        for descriptor in added {
            let call = Call::from_descriptor(descriptor);
            self.call_order.lock().unwrap().push(call.id());
            self.calls.insert(call.id(), call);
            self.total_calls.fetch_add(1, Ordering::SeqCst);
        }

        if !added_ids.is_empty() || !removed.is_empty() {
            self.emit_event(ClientEvent::CallListChanged {
                info: CallListInfo {
                    added: added_ids,
                    removed: removed.clone(),
                    timestamp: Utc::now(),
                },
                priority: EventPriority::High,
            })
            .await;
        }

        // Removals happen after the event carrying them has gone out.
        for id in &removed {
            if let Some((_, call)) = self.calls.remove(id) {
                self.call_order.lock().unwrap().retain(|o| o != id);
                call.dispose();
                tracing::info!(call_id = %id, "call removed from registry");
            }
        }

        Ok(())
    }

    /// Purge a terminal call from the registry, disposing what it owns.
    ///
    /// The removal is broadcast first; the call object is dropped after.
    async fn purge_call(&self, call_id: &CallId) {
        let _guard = self.reconcile_lock.lock().await;
        if !self.calls.contains_key(call_id) {
            return;
        }
        self.emit_event(ClientEvent::CallListChanged {
            info: CallListInfo {
                added: vec![],
                removed: vec![*call_id],
                timestamp: Utc::now(),
            },
            priority: EventPriority::High,
        })
        .await;
        if let Some((_, call)) = self.calls.remove(call_id) {
            self.call_order.lock().unwrap().retain(|o| o != call_id);
            call.dispose();
            tracing::info!(call_id = %call_id, "terminal call purged");
        }
    }

    /// Apply a transport-reported call state change.
    ///
    /// Emits the state event (with the end reason at the terminal edge) and
    /// purges the call once it is `Disconnected`.
    pub(crate) async fn apply_call_state(
        &self,
        call_id: CallId,
        state: CallState,
        end_reason: Option<CallEndReason>,
    ) {
        let Ok(call) = self.get_call(&call_id) else {
            tracing::warn!(call_id = %call_id, new_state = %state, "state event for unknown call");
            return;
        };

        match call.apply_state(state, end_reason) {
            StateChangeOutcome::Applied { previous } => {
                tracing::info!(call_id = %call_id, from = %previous, to = %state, "call state changed");
                self.emit_event(ClientEvent::CallStateChanged {
                    info: CallStatusInfo {
                        call_id,
                        new_state: state,
                        previous_state: Some(previous),
                        end_reason: call.end_reason(),
                        timestamp: Utc::now(),
                    },
                    priority: EventPriority::Normal,
                })
                .await;

                if state == CallState::Disconnected {
                    self.purge_call(&call_id).await;
                }
            }
            StateChangeOutcome::Unchanged => {}
            StateChangeOutcome::Rejected { current } => {
                tracing::warn!(
                    call_id = %call_id,
                    current = %current,
                    requested = %state,
                    "dropped invalid state transition"
                );
            }
        }
    }

    // ===== TRANSPORT EVENT LOOP =====

    pub(crate) async fn apply_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::IncomingCall {
                call_id,
                caller_identity,
                caller_display_name,
                video_enabled,
            } => {
                self.register_incoming_call(IncomingCallInfo {
                    call_id,
                    caller_identity,
                    caller_display_name,
                    video_enabled,
                    received_at: Utc::now(),
                })
                .await;
            }

            TransportEvent::CallsUpdated { added, removed } => {
                if let Err(e) = self.apply_calls_changed(added, removed).await {
                    self.emit_event(ClientEvent::ClientError {
                        error: e,
                        call_id: None,
                        priority: EventPriority::Critical,
                    })
                    .await;
                }
            }

            TransportEvent::CallStateChanged {
                call_id,
                state,
                end_reason,
            } => {
                self.apply_call_state(call_id, state, end_reason).await;
            }

            TransportEvent::CallMuteChanged { call_id, muted } => {
                let Ok(call) = self.get_call(&call_id) else {
                    tracing::warn!(call_id = %call_id, "mute event for unknown call");
                    return;
                };
                if call.set_muted(muted) {
                    self.emit_event(ClientEvent::MediaEvent {
                        info: MediaEventInfo {
                            call_id,
                            event_type: MediaEventType::MicrophoneStateChanged { muted },
                            timestamp: Utc::now(),
                            metadata: HashMap::new(),
                        },
                        priority: EventPriority::Normal,
                    })
                    .await;
                }
            }

            TransportEvent::TotalParticipantCountChanged { call_id, count } => {
                if let Ok(call) = self.get_call(&call_id) {
                    call.set_total_participant_count(count);
                    tracing::debug!(call_id = %call_id, count, "participant count updated");
                }
            }

            TransportEvent::ParticipantsUpdated {
                call_id,
                added,
                removed,
            } => {
                if self.ensure_not_poisoned().is_err() {
                    return;
                }
                let Ok(call) = self.get_call(&call_id) else {
                    tracing::warn!(call_id = %call_id, "participant update for unknown call");
                    return;
                };
                let _guard = self.reconcile_lock.lock().await;
                if let Err(e) = call.roster().validate_participants_diff(&added, &removed) {
                    drop(_guard);
                    self.poison("roster reconciliation failed");
                    self.emit_event(ClientEvent::ClientError {
                        error: e,
                        call_id: Some(call_id),
                        priority: EventPriority::Critical,
                    })
                    .await;
                    return;
                }
                // Additions land before the broadcast; removals after it.
                let added_ids = call.roster().insert_participants(added);
                if !added_ids.is_empty() || !removed.is_empty() {
                    self.emit_event(ClientEvent::ParticipantsChanged {
                        info: ParticipantsUpdatedInfo {
                            call_id,
                            added: added_ids,
                            removed: removed.clone(),
                            timestamp: Utc::now(),
                        },
                        priority: EventPriority::Normal,
                    })
                    .await;
                }
                call.roster().remove_participants(&removed);
            }

            TransportEvent::ParticipantStateChanged {
                call_id,
                participant_id,
                state,
                end_reason,
            } => {
                let Ok(call) = self.get_call(&call_id) else {
                    return;
                };
                let Some(participant) = call.roster().participant(&participant_id) else {
                    tracing::warn!(
                        call_id = %call_id,
                        participant_id = %participant_id,
                        "state event for unknown participant"
                    );
                    return;
                };
                if let Some(previous) = participant.set_state(state, end_reason) {
                    self.emit_event(ClientEvent::ParticipantStateChanged {
                        info: ParticipantStatusInfo {
                            call_id,
                            participant_id,
                            new_state: state,
                            previous_state: Some(previous),
                            timestamp: Utc::now(),
                        },
                        priority: EventPriority::Normal,
                    })
                    .await;
                }
            }

            TransportEvent::ParticipantMuteChanged {
                call_id,
                participant_id,
                muted,
            } => {
                let Ok(call) = self.get_call(&call_id) else {
                    return;
                };
                let Some(participant) = call.roster().participant(&participant_id) else {
                    return;
                };
                if participant.set_muted(muted) {
                    self.emit_event(ClientEvent::MediaEvent {
                        info: MediaEventInfo {
                            call_id,
                            event_type: MediaEventType::ParticipantMuteChanged {
                                participant_id,
                                muted,
                            },
                            timestamp: Utc::now(),
                            metadata: HashMap::new(),
                        },
                        priority: EventPriority::Normal,
                    })
                    .await;
                }
            }

            TransportEvent::ParticipantSpeakingChanged {
                call_id,
                participant_id,
                speaking,
            } => {
                let Ok(call) = self.get_call(&call_id) else {
                    return;
                };
                let Some(participant) = call.roster().participant(&participant_id) else {
                    return;
                };
                if participant.set_speaking(speaking) {
                    self.emit_event(ClientEvent::MediaEvent {
                        info: MediaEventInfo {
                            call_id,
                            event_type: MediaEventType::SpeakingChanged {
                                participant_id,
                                speaking,
                            },
                            timestamp: Utc::now(),
                            metadata: HashMap::new(),
                        },
                        priority: EventPriority::Low,
                    })
                    .await;
                }
            }

            TransportEvent::VideoStreamsUpdated {
                call_id,
                participant_id,
                added,
                removed,
            } => {
                if self.ensure_not_poisoned().is_err() {
                    return;
                }
                let Ok(call) = self.get_call(&call_id) else {
                    return;
                };
                let _guard = self.reconcile_lock.lock().await;
                if let Err(e) =
                    call.roster()
                        .validate_streams_diff(&participant_id, &added, &removed)
                {
                    drop(_guard);
                    self.poison("stream reconciliation failed");
                    self.emit_event(ClientEvent::ClientError {
                        error: e,
                        call_id: Some(call_id),
                        priority: EventPriority::Critical,
                    })
                    .await;
                    return;
                }
                let added_ids = call.roster().insert_streams(&participant_id, added);
                if !added_ids.is_empty() || !removed.is_empty() {
                    self.emit_event(ClientEvent::VideoStreamsChanged {
                        info: VideoStreamsUpdatedInfo {
                            call_id,
                            participant_id: Some(participant_id.clone()),
                            added: added_ids,
                            removed: removed.clone(),
                            timestamp: Utc::now(),
                        },
                        priority: EventPriority::Normal,
                    })
                    .await;
                }
                call.roster().remove_streams(&participant_id, &removed);
            }

            TransportEvent::StreamAvailabilityChanged {
                call_id,
                participant_id,
                stream_id,
                is_available,
            } => {
                let Ok(call) = self.get_call(&call_id) else {
                    return;
                };
                if let Some(stream) = call.roster().find_stream(&participant_id, &stream_id) {
                    stream.set_available(is_available);
                    tracing::debug!(
                        call_id = %call_id,
                        stream_id = %stream_id,
                        is_available,
                        "stream availability changed"
                    );
                }
            }

            TransportEvent::RecordingStateChanged { call_id, active } => {
                self.apply_feature_state(call_id, CallFeatureKind::Recording, active)
                    .await;
            }

            TransportEvent::TranscriptionStateChanged { call_id, active } => {
                self.apply_feature_state(call_id, CallFeatureKind::Transcription, active)
                    .await;
            }
        }
    }

    async fn apply_feature_state(&self, call_id: CallId, kind: CallFeatureKind, active: bool) {
        let Ok(call) = self.get_call(&call_id) else {
            return;
        };
        if call.features().set_active(kind, active) {
            self.emit_event(ClientEvent::FeatureStateChanged {
                info: FeatureStatusInfo {
                    call_id,
                    feature: kind,
                    is_active: active,
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;
        }
    }

    /// Register an incoming call and route the primary handler's decision.
    pub(crate) async fn register_incoming_call(&self, info: IncomingCallInfo) {
        if self.incoming_calls.contains_key(&info.call_id)
            || self.calls.contains_key(&info.call_id)
        {
            tracing::warn!(call_id = %info.call_id, "duplicate incoming call ignored");
            return;
        }
        tracing::info!(
            call_id = %info.call_id,
            caller = %info.caller_identity,
            "incoming call"
        );
        self.incoming_calls.insert(info.call_id, info.clone());

        self.emit_event(ClientEvent::IncomingCall {
            info: info.clone(),
            priority: EventPriority::High,
        })
        .await;

        let handler = self.handler.read().await.clone();
        if let Some(handler) = handler {
            let action = handler.on_incoming_call(info.clone()).await;
            let Some(manager) = self.self_ref.upgrade() else {
                return;
            };
            match action {
                CallAction::Accept => {
                    let options = MediaOptions {
                        camera_on: info.video_enabled,
                        ..Default::default()
                    };
                    tokio::spawn(async move {
                        if let Err(e) = manager.accept_call(&info.call_id, options).await {
                            tracing::warn!(call_id = %info.call_id, error = %e, "auto-accept failed");
                        }
                    });
                }
                CallAction::Reject => {
                    tokio::spawn(async move {
                        if let Err(e) = manager.reject_call(&info.call_id).await {
                            tracing::warn!(call_id = %info.call_id, error = %e, "auto-reject failed");
                        }
                    });
                }
                CallAction::Ignore => {}
            }
        }
    }

    /// Whether the registry has been poisoned by a consistency violation
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("active_calls", &self.calls.len())
            .field("incoming_calls", &self.incoming_calls.len())
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}
