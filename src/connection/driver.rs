//! Per-handle transport driver task.
//!
//! DESIGN
//! ======
//! One task per handle owns the transport session. It connects, announces
//! the user, pumps envelopes both ways, and reconnects with exponential
//! backoff until the handle is disconnected. All lifecycle notices for a
//! handle come from this single task, so subscribers see them in order.
//! `Connected` is published only after the `authenticate` announcement is
//! written, and every `Disconnected` follows a `Connected`.
//!
//! ERROR HANDLING
//! ==============
//! Connect and I/O failures never escape the task. They are logged and turned
//! into `Disconnected` events followed by a reconnect attempt per policy.
//! Malformed inbound envelopes are dropped without ending the session. An
//! outbound envelope whose send fails is kept and re-sent after the next
//! announcement.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::envelope::Envelope;
use super::handle::{ConnectionEvent, ConnectionHandle, ConnectionStatus, DisconnectReason, DriverChannels};
use super::transport::{Connector, Transport, TransportError};
use crate::config::ReconnectPolicy;

pub(crate) struct Driver {
    handle: ConnectionHandle,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    outbound: mpsc::UnboundedReceiver<Envelope>,
    shutdown: watch::Receiver<bool>,
    /// Outbound envelope whose send failed; goes out first on the next session.
    pending: Option<Envelope>,
}

enum SessionEnd {
    Shutdown,
    Lost,
}

enum Step {
    Incoming(Option<Result<Envelope, TransportError>>),
    Outgoing(Option<Envelope>),
    Shutdown,
}

impl Driver {
    pub(crate) fn new(
        handle: ConnectionHandle,
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        channels: DriverChannels,
    ) -> Self {
        Self { handle, connector, policy, outbound: channels.outbound, shutdown: channels.shutdown, pending: None }
    }

    pub(crate) async fn run(mut self) {
        let conn_id = self.handle.id();
        let mut delay = self.policy.initial_delay;

        loop {
            if *self.shutdown.borrow_and_update() {
                break;
            }
            self.handle.set_status(ConnectionStatus::Connecting);

            let attempt = tokio::select! {
                result = self.connector.connect(self.handle.endpoint(), self.handle.auth()) => Some(result),
                () = wait_for_shutdown(&mut self.shutdown) => None,
            };
            let Some(result) = attempt else {
                break;
            };

            match result {
                Ok(transport) => {
                    delay = self.policy.initial_delay;
                    if matches!(self.run_session(transport).await, SessionEnd::Shutdown) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(%conn_id, endpoint = %self.handle.endpoint(), error = %e, "connect failed");
                    self.handle.set_status(ConnectionStatus::Disconnected);
                }
            }

            if !self.policy.enabled {
                break;
            }

            debug!(%conn_id, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "reconnecting");
            let cancelled = tokio::select! {
                () = tokio::time::sleep(delay) => false,
                () = wait_for_shutdown(&mut self.shutdown) => true,
            };
            if cancelled {
                break;
            }
            delay = self.policy.next_delay(delay);
        }

        self.handle.set_status(ConnectionStatus::Closed);
        debug!(%conn_id, "connection driver stopped");
    }

    async fn run_session(&mut self, mut transport: Box<dyn Transport>) -> SessionEnd {
        self.on_connected();

        if let Err(e) = transport.send(&Envelope::authenticate(self.handle.user_id())).await {
            warn!(conn_id = %self.handle.id(), error = %e, "authenticate announcement failed");
            transport.close().await;
            self.handle.set_status(ConnectionStatus::Disconnected);
            return SessionEnd::Lost;
        }
        self.handle.publish(ConnectionEvent::Connected);

        if let Some(envelope) = self.pending.take() {
            if let Err(e) = transport.send(&envelope).await {
                self.pending = Some(envelope);
                return self.abort_session(transport, &e).await;
            }
        }

        loop {
            let step = tokio::select! {
                incoming = transport.recv() => Step::Incoming(incoming),
                outgoing = self.outbound.recv() => Step::Outgoing(outgoing),
                () = wait_for_shutdown(&mut self.shutdown) => Step::Shutdown,
            };

            match step {
                Step::Incoming(Some(Ok(envelope))) => {
                    self.handle.publish(ConnectionEvent::Message(envelope));
                }
                Step::Incoming(Some(Err(TransportError::Codec(e)))) => {
                    warn!(conn_id = %self.handle.id(), error = %e, "dropping malformed envelope");
                }
                Step::Incoming(Some(Err(e))) => return self.abort_session(transport, &e).await,
                Step::Incoming(None) => {
                    self.on_disconnected(DisconnectReason::TransportClosed);
                    return SessionEnd::Lost;
                }
                Step::Outgoing(Some(envelope)) => {
                    if let Err(e) = transport.send(&envelope).await {
                        // Held until the next session is announced.
                        self.pending = Some(envelope);
                        return self.abort_session(transport, &e).await;
                    }
                }
                Step::Outgoing(None) | Step::Shutdown => {
                    transport.close().await;
                    self.on_disconnected(DisconnectReason::ClientClosed);
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    async fn abort_session(&self, mut transport: Box<dyn Transport>, error: &TransportError) -> SessionEnd {
        transport.close().await;
        self.on_disconnected(DisconnectReason::TransportError(error.to_string()));
        SessionEnd::Lost
    }

    /// Marks the session live. `Connected` is published by the caller once
    /// the `authenticate` announcement is written.
    fn on_connected(&self) {
        self.handle.set_status(ConnectionStatus::Connected);
        info!(conn_id = %self.handle.id(), user_id = self.handle.user_id(), "connected to server");
    }

    fn on_disconnected(&self, reason: DisconnectReason) {
        self.handle.set_status(ConnectionStatus::Disconnected);
        info!(conn_id = %self.handle.id(), user_id = self.handle.user_id(), %reason, "disconnected from server");
        self.handle.publish(ConnectionEvent::Disconnected(reason));
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
