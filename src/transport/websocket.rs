//! WebSocket subscriber transport
//!
//! Accepts WebSocket connections and turns each one into a [`Subscriber`].
//! Per connection:
//! - queue the configured greeting, then announce the subscriber to the
//!   registry with a `Connected` event
//! - a writer task drains the subscriber's outbound queue onto the socket,
//!   bounding every socket write by the relay send timeout, and closes the
//!   socket as soon as the subscriber handle is closed
//! - the reader loop forwards text frames as `Inbound` events and ends on
//!   close, error, or a dead writer, after which `Disconnected` is emitted
//!
//! The subscriber cap counts connections held by this adapter, not registry
//! entries, so concurrent handshakes cannot overshoot it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::SubscriberEvent;
use crate::config::RelaySettings;
use crate::subscriber::Subscriber;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// One of the `max_subscribers` connection slots, released on drop.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(connections: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        let held = connections.fetch_add(1, Ordering::AcqRel);
        let slot = Self(connections.clone());
        (held < limit).then_some(slot)
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Accept subscribers on `listener` forever.
pub async fn serve_websocket(
    listener: TcpListener,
    events: UnboundedSender<SubscriberEvent>,
    settings: RelaySettings,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("WebSocket server listening on ws://{addr}");
    }

    let connections = Arc::new(AtomicUsize::new(0));
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("failed to accept connection: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        tokio::spawn(handle_connection(
            stream,
            peer,
            connections.clone(),
            events.clone(),
            settings.clone(),
        ));
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    connections: Arc<AtomicUsize>,
    events: UnboundedSender<SubscriberEvent>,
    settings: RelaySettings,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, "WebSocket handshake error: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let Some(slot) = ConnectionSlot::acquire(&connections, settings.max_subscribers) else {
        warn!(%peer, limit = settings.max_subscribers, "subscriber limit reached, closing");
        let _ = ws_sender.close().await;
        return;
    };

    let send_timeout = settings.send_timeout();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(settings.outbound_buffer.max(1));
    let subscriber = Subscriber::new(tx);
    let client_id = subscriber.id.clone();
    let handle = subscriber.clone();

    if let Some(greeting) = settings.greeting() {
        if let Err(e) = handle
            .send(WsMessage::text(greeting.to_owned()), send_timeout)
            .await
        {
            warn!(subscriber = %client_id, "failed to queue greeting: {e}");
        }
    }

    if events.send(SubscriberEvent::Connected(subscriber)).is_err() {
        error!(subscriber = %client_id, "registry is gone, dropping connection");
        return;
    }
    debug!(subscriber = %client_id, %peer, "connection established");

    let mut writer = {
        let client_id = client_id.clone();
        let handle = handle.clone();

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                    _ = handle.closed() => {
                        debug!(subscriber = %client_id, "subscriber closed by registry");
                        break;
                    }
                };

                match tokio::time::timeout(send_timeout, ws_sender.send(frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(subscriber = %client_id, "failed to send message: {e}");
                        break;
                    }
                    Err(_) => {
                        warn!(
                            subscriber = %client_id,
                            "socket write timed out after {send_timeout:?}"
                        );
                        break;
                    }
                }
            }

            handle.close();
            let _ = ws_sender.close().await;
            debug!(subscriber = %client_id, "send loop closed");
        })
    };

    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = events.send(SubscriberEvent::Inbound {
                        id: client_id.clone(),
                        text: text.as_str().to_owned(),
                    });
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                // ping/pong are answered by tungstenite, binary is not part of the protocol
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(subscriber = %client_id, "read error: {e}");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    handle.close();
    writer.abort();
    drop(slot);
    let _ = events.send(SubscriberEvent::Disconnected(client_id.clone()));
    debug!(subscriber = %client_id, %peer, "connection closed");
}
