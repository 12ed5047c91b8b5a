//! WebSocket client to the relay carrying the user's command/data stream.
//!
//! One JSON object per text frame in either direction. Inbound frames are
//! decoded into typed [`Request`]s and pushed onto a bounded channel; the
//! dispatcher's [`Response`]s flow back out the same socket. The connection
//! is re-established with a fixed backoff; the channels survive reconnects.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::types::{CustomResult, Request, Response};

const CHANNEL_DEPTH: usize = 32;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// The two ends of the relay connection handed to the dispatcher.
pub struct Stream {
    pub request: mpsc::Receiver<Request>,
    pub response: mpsc::Sender<Response>,
}

impl Stream {
    /// Spawns the relay task for `url` and returns the channel pair.
    pub fn new(url: &str) -> Self {
        let (request_tx, request_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (response_tx, response_rx) = mpsc::channel(CHANNEL_DEPTH);
        tokio::spawn(run_relay(url.to_string(), request_tx, response_rx));
        Self {
            request: request_rx,
            response: response_tx,
        }
    }
}

async fn run_relay(
    url: String,
    requests: mpsc::Sender<Request>,
    mut responses: mpsc::Receiver<Response>,
) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                info!("connected to relay at {url}");
                let (mut sink, mut source) = socket.split();

                loop {
                    tokio::select! {
                        frame = source.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                debug!("relay frame: {text}");
                                match Request::from_json(&text) {
                                    Ok(request) => {
                                        if requests.send(request).await.is_err() {
                                            return;
                                        }
                                    }
                                    Err(err) => {
                                        warn!("undecodable frame: {err:#}");
                                        let reply = CustomResult {
                                            message: format!("{err:#}"),
                                            command: serde_json::Value::String(text),
                                        };
                                        if let Ok(json) = serde_json::to_string(&reply) {
                                            let _ = sink.send(Message::Text(json)).await;
                                        }
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                warn!("relay closed the connection");
                                break;
                            }
                            Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                            Some(Err(err)) => {
                                warn!("relay read failed: {err}");
                                break;
                            }
                        },
                        maybe = responses.recv() => {
                            let Some(response) = maybe else { return };
                            match serde_json::to_string(&response) {
                                Ok(json) => {
                                    if let Err(err) = sink.send(Message::Text(json)).await {
                                        warn!("relay write failed: {err}");
                                        break;
                                    }
                                }
                                Err(err) => warn!("unencodable response: {err}"),
                            }
                        }
                    }
                }
            }
            Err(err) => warn!("relay connect to {url} failed: {err}"),
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
