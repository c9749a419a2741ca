// Gateway Server
//
// This module runs the accept loop and the per-connection lifecycle: assign
// an identity, announce it, pump frames both ways, and guarantee exactly one
// deregistration on every exit path (peer close, transport error, idle
// timeout, delivery failure).

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{error, info, warn};

use crate::config::GatewayConfig;
use crate::dispatch::SnapshotReceiver;
use crate::hub::PresenceHub;
use crate::protocol::{ClientFrame, ServerFrame};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Why a connection loop ended.
#[derive(Debug, Clone, Copy)]
enum CloseReason {
    PeerClosed,
    Transport,
    IdleTimeout,
    DeliveryFailed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed"),
            Self::Transport => write!(f, "transport error"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::DeliveryFailed => write!(f, "delivery failed"),
        }
    }
}

/// Gateway server
pub struct GatewayServer {
    config: GatewayConfig,
    hub: Arc<PresenceHub>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            hub: Arc::new(PresenceHub::new()),
        }
    }

    /// Shared presence state, for callers that surface it (health checks).
    pub fn hub(&self) -> Arc<PresenceHub> {
        self.hub.clone()
    }

    /// Bind the configured address and serve until the process ends.
    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        self.run_until(listener, std::future::pending()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn run_until(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("gateway listening on {}", local_addr);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received, stopping accept loop");
                    return Ok(());
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let hub = self.hub.clone();
                            let config = self.config.clone();
                            tokio::spawn(async move {
                                if let Err(err) = handle_connection(stream, addr, hub, config).await {
                                    warn!("connection from {} failed: {:#}", addr, err);
                                }
                            });
                        }
                        Err(err) => {
                            error!("accept error: {}", err);
                        }
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<PresenceHub>,
    config: GatewayConfig,
) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let participant = hub.registry().register().await;
    let id = participant.id;
    info!("participant {} connected from {}", id, addr);

    let mut snapshots = hub.dispatcher().attach(&id).await;
    let result = drive_connection(
        &hub,
        &config,
        &id,
        &mut ws_sender,
        &mut ws_receiver,
        &mut snapshots,
    )
    .await;

    // Single teardown point for every close trigger: drop the outbound slot,
    // deregister, tell everyone else.
    hub.dispatcher().detach(&id).await;
    let _ = ws_sender.send(Message::Close(None)).await;
    hub.participant_left(&id).await;

    match result {
        Ok(reason) => info!("participant {} disconnected: {}", id, reason),
        Err(err) => warn!("participant {} failed: {:#}", id, err),
    }
    Ok(())
}

/// Pump one connection until something ends it. Inbound frames refresh the
/// idle deadline; snapshot deliveries come from this connection's own slot so
/// a slow socket here can never stall anyone else.
async fn drive_connection(
    hub: &PresenceHub,
    config: &GatewayConfig,
    id: &str,
    ws_sender: &mut WsSink,
    ws_receiver: &mut WsSource,
    snapshots: &mut SnapshotReceiver,
) -> Result<CloseReason> {
    // Identity goes out first, before any snapshot can reach this slot.
    let identity = serde_json::to_string(&ServerFrame::YourId { id: id.to_string() })?;
    ws_sender
        .send(Message::Text(identity.into()))
        .await
        .context("failed to send identity")?;
    hub.participant_joined(id).await;

    let mut deadline = Instant::now() + config.idle_timeout;
    let mut keepalive =
        time::interval_at(Instant::now() + config.tick_interval, config.tick_interval);

    loop {
        tokio::select! {
            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        deadline = Instant::now() + config.idle_timeout;
                        match msg {
                            Message::Text(text) => match ClientFrame::decode(text.as_str()) {
                                Ok(ClientFrame::Location { lat, lng }) => {
                                    hub.location_updated(id, lat, lng).await;
                                }
                                Err(err) => {
                                    warn!("participant {}: dropping frame: {}", id, err);
                                }
                            },
                            Message::Close(_) => return Ok(CloseReason::PeerClosed),
                            // Pings, pongs and binary frames only count as activity.
                            _ => {}
                        }
                    }
                    Some(Err(err)) => {
                        warn!("participant {}: transport error: {}", id, err);
                        return Ok(CloseReason::Transport);
                    }
                    None => return Ok(CloseReason::PeerClosed),
                }
            }

            changed = snapshots.changed() => {
                if changed.is_err() {
                    // Slot gone out from under us; the server is tearing down.
                    return Ok(CloseReason::Transport);
                }
                let payload = snapshots.borrow_and_update().clone();
                if let Some(text) = payload {
                    if let Err(err) = ws_sender.send(Message::Text(text)).await {
                        warn!("participant {}: delivery failed: {}", id, err);
                        return Ok(CloseReason::DeliveryFailed);
                    }
                }
            }

            _ = time::sleep_until(deadline) => {
                info!("participant {}: no activity for {:?}", id, config.idle_timeout);
                return Ok(CloseReason::IdleTimeout);
            }

            _ = keepalive.tick() => {
                if ws_sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return Ok(CloseReason::DeliveryFailed);
                }
            }
        }
    }
}
