// Copyright 2025 ArcticWatch Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! WebSocket connection layer for the AIS stream.
//!
//! Provides a session handle that manages one WebSocket subscription to a
//! vessel-position feed. There is no automatic reconnect: a transport error
//! or remote close transitions the session to `Disconnected` and ends the
//! task; only an explicit new session re-enters `Connecting`.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Errors raised by the stream connection layer.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("missing API credential")]
    MissingCredential,

    #[error("missing stream endpoint URL")]
    MissingEndpoint,

    #[error("invalid stream endpoint URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("subscription encoding failed: {0}")]
    Subscription(#[from] serde_json::Error),
}

/// Session state machine: `Disconnected -> Connecting -> Subscribed ->
/// Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No live connection.
    Disconnected,
    /// Socket handshake in progress.
    Connecting,
    /// Subscription sent; receiving reports.
    Subscribed,
}

/// Events emitted by the session task.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Session state changed.
    StateChanged(SessionState),
    /// One feed payload received (text frames and decoded binary frames).
    PayloadReceived(Vec<u8>),
}

/// Transport seam for the session loop.
///
/// The production implementation wraps a tungstenite WebSocket; tests run
/// the same loop against a channel-backed fake for determinism.
pub trait StreamTransport: Send {
    /// Send one text frame.
    fn send_text(
        &mut self,
        text: String,
    ) -> impl Future<Output = Result<(), StreamError>> + Send;

    /// Receive the next data payload.
    ///
    /// Returns `None` when the remote closed the stream, `Some(Err(_))` on a
    /// transport error. Control frames are handled internally.
    fn next_payload(
        &mut self,
    ) -> impl Future<Output = Option<Result<Vec<u8>, StreamError>>> + Send;
}

/// Production transport over tokio-tungstenite.
#[derive(Debug)]
pub struct WsTransport {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Open a WebSocket connection to the given endpoint.
    pub async fn connect(url: &Url) -> Result<Self, StreamError> {
        let (inner, _response) = connect_async(url.as_str()).await?;
        Ok(Self { inner })
    }
}

impl StreamTransport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), StreamError> {
        self.inner.send(Message::Text(text)).await.map_err(Into::into)
    }

    async fn next_payload(&mut self) -> Option<Result<Vec<u8>, StreamError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.into_bytes())),
                Ok(Message::Binary(bytes)) => return Some(Ok(bytes)),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Handle to a spawned stream session.
///
/// The session runs in a background task. Use `recv()` to drain events;
/// dropping the handle or calling `shutdown()` cancels the task.
pub struct Session {
    event_rx: mpsc::Receiver<SessionEvent>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Spawn a session task: connect, send the subscription, then relay
    /// payloads until cancellation, error, or remote close.
    #[must_use]
    pub fn spawn(url: Url, subscription: String) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let cancel_token = CancellationToken::new();
        let task_cancel = cancel_token.clone();

        tokio::spawn(async move {
            if event_tx
                .send(SessionEvent::StateChanged(SessionState::Connecting))
                .await
                .is_err()
            {
                return;
            }

            info!("Connecting to AIS stream at {url}");
            let transport = tokio::select! {
                result = WsTransport::connect(&url) => result,
                () = task_cancel.cancelled() => {
                    info!("Session cancelled during connect");
                    return;
                }
            };

            match transport {
                Ok(transport) => {
                    run_session(transport, subscription, event_tx, task_cancel).await;
                }
                Err(e) => {
                    error!("AIS stream connection failed: {e}");
                    let _ = event_tx
                        .send(SessionEvent::StateChanged(SessionState::Disconnected))
                        .await;
                }
            }
        });

        Self {
            event_rx,
            cancel_token,
        }
    }

    /// Spawn a session task over an already-open transport.
    ///
    /// Skips the connect phase and goes straight to subscribing and
    /// relaying. This is the seam for driving the full pipeline from a
    /// non-WebSocket transport.
    #[must_use]
    pub fn from_transport<T>(transport: T, subscription: String) -> Self
    where
        T: StreamTransport + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let cancel_token = CancellationToken::new();
        let task_cancel = cancel_token.clone();

        tokio::spawn(async move {
            run_session(transport, subscription, event_tx, task_cancel).await;
        });

        Self {
            event_rx,
            cancel_token,
        }
    }

    /// Receive the next event from the session.
    ///
    /// Returns `None` once the session task has ended.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// Cancel the session task and close the socket.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Drive one subscribed session over any transport.
///
/// Emits `Subscribed` once the subscription frame is accepted, then relays
/// payloads in arrival order. Ends with a `Disconnected` event on transport
/// error or remote close; ends silently on cancellation.
pub(crate) async fn run_session<T: StreamTransport>(
    mut transport: T,
    subscription: String,
    event_tx: mpsc::Sender<SessionEvent>,
    cancel_token: CancellationToken,
) {
    if let Err(e) = transport.send_text(subscription).await {
        error!("Failed to send stream subscription: {e}");
        let _ = event_tx
            .send(SessionEvent::StateChanged(SessionState::Disconnected))
            .await;
        return;
    }

    if event_tx
        .send(SessionEvent::StateChanged(SessionState::Subscribed))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            payload = transport.next_payload() => {
                match payload {
                    Some(Ok(bytes)) => {
                        if event_tx
                            .send(SessionEvent::PayloadReceived(bytes))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("AIS stream transport error: {e}");
                        break;
                    }
                    None => {
                        info!("AIS stream closed by remote");
                        break;
                    }
                }
            }

            () = cancel_token.cancelled() => {
                info!("AIS stream session cancelled");
                return;
            }
        }
    }

    let _ = event_tx
        .send(SessionEvent::StateChanged(SessionState::Disconnected))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    /// Scripted transport for deterministic session tests.
    struct FakeTransport {
        sent: Arc<Mutex<Vec<String>>>,
        frames: std::collections::VecDeque<Option<Result<Vec<u8>, StreamError>>>,
    }

    impl FakeTransport {
        fn new(frames: Vec<Option<Result<Vec<u8>, StreamError>>>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    sent: Arc::clone(&sent),
                    frames: frames.into_iter().collect(),
                },
                sent,
            )
        }
    }

    impl StreamTransport for FakeTransport {
        async fn send_text(&mut self, text: String) -> Result<(), StreamError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        async fn next_payload(&mut self) -> Option<Result<Vec<u8>, StreamError>> {
            self.frames.pop_front().unwrap_or(None)
        }
    }

    async fn drain(mut rx: mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_session_subscribes_then_relays_then_disconnects() {
        let (transport, sent) = FakeTransport::new(vec![
            Some(Ok(b"payload-1".to_vec())),
            Some(Ok(b"payload-2".to_vec())),
            None, // remote close
        ]);
        let (event_tx, event_rx) = mpsc::channel(16);

        run_session(
            transport,
            "{\"APIKey\":\"k\"}".to_string(),
            event_tx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(sent.lock().unwrap().as_slice(), ["{\"APIKey\":\"k\"}"]);

        let events = drain(event_rx).await;
        assert!(matches!(
            events[0],
            SessionEvent::StateChanged(SessionState::Subscribed)
        ));
        assert!(
            matches!(&events[1], SessionEvent::PayloadReceived(p) if p == b"payload-1")
        );
        assert!(
            matches!(&events[2], SessionEvent::PayloadReceived(p) if p == b"payload-2")
        );
        assert!(matches!(
            events[3],
            SessionEvent::StateChanged(SessionState::Disconnected)
        ));
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn test_transport_error_ends_session_without_reconnect() {
        let (transport, _sent) = FakeTransport::new(vec![Some(Err(StreamError::MissingEndpoint))]);
        let (event_tx, event_rx) = mpsc::channel(16);

        run_session(
            transport,
            String::new(),
            event_tx,
            CancellationToken::new(),
        )
        .await;

        let events = drain(event_rx).await;
        // Subscribed, then straight to Disconnected: the loop ends instead
        // of retrying.
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            SessionEvent::StateChanged(SessionState::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_cancellation_ends_session_silently() {
        struct PendingTransport;

        impl StreamTransport for PendingTransport {
            async fn send_text(&mut self, _text: String) -> Result<(), StreamError> {
                Ok(())
            }

            async fn next_payload(&mut self) -> Option<Result<Vec<u8>, StreamError>> {
                std::future::pending().await
            }
        }

        let (event_tx, mut event_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        run_session(PendingTransport, String::new(), event_tx, cancel).await;

        // Subscribed is emitted before the cancelled select arm wins; no
        // Disconnected event follows a cancellation.
        let mut states = Vec::new();
        while let Some(event) = event_rx.recv().await {
            states.push(event);
        }
        assert_eq!(states.len(), 1);
        assert!(matches!(
            states[0],
            SessionEvent::StateChanged(SessionState::Subscribed)
        ));
    }
}
