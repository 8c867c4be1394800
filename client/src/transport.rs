//! Production websocket transport for the event bus.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use events::Event;

use crate::bus::{Transport, TransportError, TransportLink};

const CONNECT_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Dials the relay with a bounded, doubling backoff. Once connected, frames
/// this transport cannot decode are dropped (newer event kinds an older
/// client does not know about).
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> Result<TransportLink, TransportError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_error = String::new();

        for attempt in 1..=CONNECT_ATTEMPTS {
            match connect_async(self.url.as_str()).await {
                Ok((socket, _response)) => {
                    debug!(url = %self.url, attempt, "ws transport: connected");
                    return Ok(spawn_pumps(socket));
                }
                Err(e) => {
                    debug!(url = %self.url, attempt, error = %e, "ws transport: connect attempt failed");
                    last_error = e.to_string();
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }

        Err(TransportError::Connect(last_error))
    }
}

/// Split the socket and bridge both halves onto plain event channels.
fn spawn_pumps(socket: WebSocketStream<MaybeTlsStream<TcpStream>>) -> TransportLink {
    let (mut sink, mut stream) = socket.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Event>(64);
    let (incoming_tx, incoming_rx) = mpsc::channel::<Event>(64);

    tokio::spawn(async move {
        while let Some(event) = outgoing_rx.recv().await {
            let Ok(text) = events::encode(&event) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match events::decode(&text) {
                    Ok(event) => {
                        if incoming_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!(error = %e, "ws transport: dropping undecodable frame"),
                },
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    TransportLink { outgoing: outgoing_tx, incoming: incoming_rx }
}
