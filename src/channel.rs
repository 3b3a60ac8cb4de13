//! The realtime channel: one background task per opened channel.
//!
//! The task owns the connection loop the way a Socket.IO client library
//! does: connect, pump events until the connection drops, wait a backoff
//! delay, reconnect. It never decides anything about polling. It only reports
//! what happened, tagged with the generation number it was opened under, so
//! the session driver can ignore a channel it has already replaced.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::ReconnectPolicy;
use crate::manager::Signal;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::transport::{Connector, Transport};

/// What a channel reports to the session driver.
#[derive(Debug)]
pub(crate) enum ChannelSignal {
    /// A connection attempt succeeded.
    Connected,
    /// A connection attempt failed.
    ConnectError(String),
    /// An established connection was lost. `None` means the server closed it cleanly.
    Disconnected(Option<String>),
    /// An application event arrived.
    Event(ServerEvent),
    /// The reconnect policy gave up; the task has exited and will not report again.
    Closed,
}

#[derive(Debug)]
enum ChannelCommand {
    Emit(ClientEvent),
    Close,
}

/// Driver-side handle to a running channel task.
///
/// Dropping the handle ends the task without a disconnect notice; use
/// [`close`](Self::close) for an orderly goodbye.
#[derive(Debug)]
pub(crate) struct ChannelHandle {
    generation: u64,
    cmd_tx: mpsc::UnboundedSender<ChannelCommand>,
    connected: bool,
    has_connected: bool,
}

impl ChannelHandle {
    /// Spawn a channel task that starts connecting immediately.
    pub(crate) fn open(
        connector: Arc<dyn Connector>,
        endpoint: String,
        reconnect: ReconnectPolicy,
        generation: u64,
        signal_tx: mpsc::UnboundedSender<Signal>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = ChannelTask {
            connector,
            endpoint,
            reconnect,
            generation,
            signal_tx,
            cmd_rx,
        };
        tokio::spawn(task.run());
        Self {
            generation,
            cmd_tx,
            connected: false,
            has_connected: false,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the driver has seen this channel connect and not yet lose the connection.
    pub(crate) fn is_connected(&self) -> bool {
        self.connected
    }

    /// Record a successful connect. Returns `true` if this is a reconnection.
    pub(crate) fn mark_connected(&mut self) -> bool {
        let reconnect = self.has_connected;
        self.connected = true;
        self.has_connected = true;
        reconnect
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    /// Queue an event for the server. Dropped by the task if it is not connected.
    pub(crate) fn emit(&self, event: ClientEvent) {
        if self.cmd_tx.send(ChannelCommand::Emit(event)).is_err() {
            debug!(generation = self.generation, "channel task has exited; dropping emit");
        }
    }

    /// Ask the task to say goodbye (if connected) and exit. Does not wait.
    pub(crate) fn close(self) {
        let _ = self.cmd_tx.send(ChannelCommand::Close);
    }
}

/// How a connected session ended.
enum SessionEnd {
    /// Closed on request; the task must exit.
    Closed,
    /// The connection dropped; the task should reconnect.
    Lost(Option<String>),
}

struct ChannelTask {
    connector: Arc<dyn Connector>,
    endpoint: String,
    reconnect: ReconnectPolicy,
    generation: u64,
    signal_tx: mpsc::UnboundedSender<Signal>,
    cmd_rx: mpsc::UnboundedReceiver<ChannelCommand>,
}

impl ChannelTask {
    async fn run(mut self) {
        debug!(generation = self.generation, "channel task started");
        let mut failures: u32 = 0;

        loop {
            let Some(connected) = self.connect().await else {
                break;
            };

            match connected {
                Ok(transport) => {
                    failures = 0;
                    info!(
                        generation = self.generation,
                        endpoint = %self.endpoint,
                        "realtime channel connected"
                    );
                    if !self.report(ChannelSignal::Connected) {
                        break;
                    }
                    match self.pump(transport).await {
                        SessionEnd::Closed => break,
                        SessionEnd::Lost(reason) => {
                            if !self.report(ChannelSignal::Disconnected(reason)) {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(generation = self.generation, "connect attempt failed: {e}");
                    if !self.report(ChannelSignal::ConnectError(e.to_string())) {
                        break;
                    }
                }
            }

            failures = failures.saturating_add(1);
            let Some(delay) = self.reconnect.delay_for(failures) else {
                warn!(
                    generation = self.generation,
                    attempts = failures,
                    "giving up on the realtime channel"
                );
                self.report(ChannelSignal::Closed);
                break;
            };
            if !self.backoff(delay).await {
                break;
            }
        }

        debug!(generation = self.generation, "channel task exited");
    }

    /// One connection attempt. `None` means a close was requested meanwhile.
    async fn connect(&mut self) -> Option<crate::error::Result<Box<dyn Transport>>> {
        let connecting = self.connector.connect(&self.endpoint);
        tokio::pin!(connecting);

        loop {
            tokio::select! {
                result = &mut connecting => return Some(result),
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Emit(event)) => {
                        trace!(
                            generation = self.generation,
                            event = event.name(),
                            "not connected; dropping emit"
                        );
                    }
                    Some(ChannelCommand::Close) | None => {
                        debug!(generation = self.generation, "channel closed while connecting");
                        return None;
                    }
                },
            }
        }
    }

    /// Shuttle frames until the connection drops or a close is requested.
    async fn pump(&mut self, mut transport: Box<dyn Transport>) -> SessionEnd {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Emit(event)) => {
                        let frame = match event.encode() {
                            Ok(frame) => frame,
                            Err(e) => {
                                error!("failed to encode {} event: {e}", event.name());
                                continue;
                            }
                        };
                        if let Err(e) = transport.send(frame).await {
                            let _ = transport.close().await;
                            return SessionEnd::Lost(Some(format!("transport send error: {e}")));
                        }
                    }
                    Some(ChannelCommand::Close) => {
                        match ClientEvent::DisconnectNotice.encode() {
                            Ok(frame) => {
                                if let Err(e) = transport.send(frame).await {
                                    debug!("failed to send disconnect notice: {e}");
                                }
                            }
                            Err(e) => error!("failed to encode disconnect notice: {e}"),
                        }
                        if let Err(e) = transport.close().await {
                            debug!("transport close failed: {e}");
                        }
                        debug!(generation = self.generation, "realtime channel closed");
                        return SessionEnd::Closed;
                    }
                    // Handle dropped without an explicit close.
                    None => {
                        let _ = transport.close().await;
                        return SessionEnd::Closed;
                    }
                },

                incoming = transport.recv() => match incoming {
                    Some(Ok(text)) => match ServerEvent::decode(&text) {
                        Ok(Some(event)) => {
                            if !self.report(ChannelSignal::Event(event)) {
                                let _ = transport.close().await;
                                return SessionEnd::Closed;
                            }
                        }
                        Ok(None) => trace!("ignoring non-lobby event: {text}"),
                        Err(e) => warn!("failed to decode server event: {e}, raw: {text}"),
                    },
                    Some(Err(e)) => {
                        let _ = transport.close().await;
                        return SessionEnd::Lost(Some(e.to_string()));
                    }
                    None => return SessionEnd::Lost(None),
                },
            }
        }
    }

    /// Sleep before the next attempt. Returns `false` if a close was requested.
    async fn backoff(&mut self, delay: Duration) -> bool {
        debug!(generation = self.generation, ?delay, "waiting before reconnecting");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Emit(event)) => {
                        trace!(event = event.name(), "not connected; dropping emit");
                    }
                    Some(ChannelCommand::Close) | None => return false,
                },
            }
        }
    }

    /// Forward a signal to the driver. `false` once the driver is gone.
    fn report(&self, signal: ChannelSignal) -> bool {
        self.signal_tx
            .send(Signal::Channel {
                generation: self.generation,
                signal,
            })
            .is_ok()
    }
}
