//! Call lifecycle operations
//!
//! This module contains the operations that create or end calls: placing an
//! outgoing call, joining a group call or meeting, accepting or rejecting an
//! incoming call, hanging up, and turning a push notification into a ringing
//! incoming call.
//!
//! Calls created here are inserted into the registry by the manager itself;
//! the transport only drives their subsequent state.

use crate::call::{CallDirection, CallId, CallState};
use crate::client::controls::OperationKind;
use crate::error::{ClientError, ClientResult};
use crate::push::PushCallDescriptor;
use crate::transport::{CallDescriptor, JoinLocator, MediaOptions, TransportError};
use crate::events::IncomingCallInfo;

impl super::manager::ClientManager {
    pub(crate) async fn ensure_running(&self) -> ClientResult<()> {
        if !self.is_running().await {
            return Err(ClientError::NotRunning);
        }
        Ok(())
    }

    fn ensure_call_capacity(&self) -> ClientResult<()> {
        if self.calls.len() >= self.config.max_concurrent_calls {
            return Err(ClientError::CallLimitExceeded {
                limit: self.config.max_concurrent_calls,
            });
        }
        Ok(())
    }

    async fn fetch_token(&self) -> ClientResult<crate::transport::BearerToken> {
        self.credential
            .token()
            .await
            .map_err(ClientError::from_transport)
    }

    pub(crate) async fn transport_request<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, TransportError>>,
    ) -> ClientResult<T> {
        let timeout = self.config.operation_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ClientError::from_transport(e)),
            Err(_) => Err(ClientError::from_transport(TransportError::Timeout {
                duration_ms: timeout.as_millis() as u64,
            })),
        }
    }

    /// Place an outgoing call to one or more identities.
    ///
    /// Returns the new call's id; subsequent progress arrives as
    /// [`CallStateChanged`](crate::events::ClientEvent::CallStateChanged)
    /// events.
    pub async fn start_call(
        &self,
        callees: Vec<String>,
        options: MediaOptions,
    ) -> ClientResult<CallId> {
        self.ensure_running().await?;
        if callees.is_empty() {
            return Err(ClientError::invalid_configuration(
                "callees",
                "at least one callee is required",
            ));
        }
        self.ensure_call_capacity()?;

        let token = self.fetch_token().await?;
        let descriptor = self
            .transport_request(self.transport.start_call(&token, &callees, &options))
            .await?;

        let call_id = descriptor.call_id;
        self.apply_calls_changed(vec![descriptor], vec![]).await?;
        tracing::info!(call_id = %call_id, callees = callees.len(), "outgoing call started");
        Ok(call_id)
    }

    /// Join a group call or meeting identified by a locator
    pub async fn join_call(
        &self,
        locator: JoinLocator,
        options: MediaOptions,
    ) -> ClientResult<CallId> {
        self.ensure_running().await?;
        self.ensure_call_capacity()?;

        let token = self.fetch_token().await?;
        let descriptor = self
            .transport_request(self.transport.join_call(&token, &locator, &options))
            .await?;

        let call_id = descriptor.call_id;
        self.apply_calls_changed(vec![descriptor], vec![]).await?;
        tracing::info!(call_id = %call_id, "joined call");
        Ok(call_id)
    }

    /// Accept a ringing incoming call.
    ///
    /// Concurrent identical accepts collapse into one transport request; the
    /// second caller observes the first's outcome.
    pub async fn accept_call(&self, call_id: &CallId, options: MediaOptions) -> ClientResult<()> {
        self.ensure_running().await?;
        let id = *call_id;
        self.run_gated(id, OperationKind::Accept, async move {
            let info = self
                .incoming_calls
                .get(&id)
                .map(|e| e.value().clone())
                .ok_or(ClientError::CallNotFound { call_id: id })?;
            self.ensure_call_capacity()?;

            let token = self.fetch_token().await?;
            self.transport_request(self.transport.accept_call(&token, &id, &options))
                .await?;

            self.incoming_calls.remove(&id);
            let descriptor = CallDescriptor {
                call_id: id,
                direction: CallDirection::Incoming,
                state: CallState::Ringing,
                remote_display_name: info.caller_display_name.clone(),
                is_muted: options.microphone_muted,
            };
            self.apply_calls_changed(vec![descriptor], vec![]).await?;
            tracing::info!(call_id = %id, caller = %info.caller_identity, "incoming call accepted");
            Ok(())
        })
        .await
    }

    /// Reject a ringing incoming call
    pub async fn reject_call(&self, call_id: &CallId) -> ClientResult<()> {
        self.ensure_running().await?;
        let id = *call_id;
        self.run_gated(id, OperationKind::Reject, async move {
            if !self.incoming_calls.contains_key(&id) {
                return Err(ClientError::CallNotFound { call_id: id });
            }
            self.transport_request(self.transport.reject_call(&id))
                .await?;
            self.incoming_calls.remove(&id);
            tracing::info!(call_id = %id, "incoming call rejected");
            Ok(())
        })
        .await
    }

    /// Hang up a call.
    ///
    /// If the call reaches its terminal state while the request is in
    /// flight, the hang-up completes successfully; it never wedges the call
    /// in `Disconnecting`. Hanging up an already-ended call is a no-op.
    pub async fn hangup_call(&self, call_id: &CallId) -> ClientResult<()> {
        self.ensure_running().await?;
        let call = match self.get_call(call_id) {
            Ok(call) => call,
            // Already purged: the call is gone, which is what was asked for.
            Err(ClientError::CallNotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };
        if call.state().is_terminal() {
            return Ok(());
        }

        let id = *call_id;
        self.run_gated(id, OperationKind::HangUp, async {
            let mut state_rx = call.watch_state();
            tokio::select! {
                res = self.transport_request(self.transport.hang_up(&id)) => {
                    res?;
                    tracing::info!(call_id = %id, "hang up requested");
                    Ok(())
                }
                _ = super::controls::wait_terminal(&mut state_rx) => {
                    // The call ended underneath us; that is success here.
                    tracing::debug!(call_id = %id, "call ended while hang up was in flight");
                    Ok(())
                }
            }
        })
        .await
    }

    /// Turn a decoded push payload into a ringing incoming call
    pub async fn handle_push_notification(
        &self,
        descriptor: PushCallDescriptor,
    ) -> ClientResult<()> {
        self.ensure_running().await?;
        let info = IncomingCallInfo {
            call_id: descriptor.call_id,
            caller_identity: descriptor.caller_identity,
            caller_display_name: descriptor.caller_display_name,
            video_enabled: descriptor.video_enabled,
            received_at: chrono::Utc::now(),
        };
        self.register_incoming_call(info).await;
        Ok(())
    }
}
