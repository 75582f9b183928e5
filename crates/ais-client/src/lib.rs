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

//! AIS client library for connecting to and filtering live vessel feeds.
//!
//! This library provides a modular architecture for receiving and processing
//! AIS vessel tracking data. It supports multiple layers that can be used
//! independently or composed together:
//!
//! - **Protocol layer**: Message parsing (aisstream.io JSON, with a trait
//!   seam for other feed formats)
//! - **Tracker layer**: Vessel state management with typed static/dynamic
//!   field merging, watchlist gating, and geography-parameterized
//!   subscriptions
//! - **Connection layer**: Async WebSocket session with a single explicit
//!   lifecycle and no automatic reconnect; a dropped feed stays down until
//!   the caller spawns a new client
//!
//! # Quick Start
//!
//! Use the [`AisClient`] type for full-stack operation:
//!
//! ```no_run
//! use ais_client::{AisClient, ClientConfig, TrackerFilters, Watchlist};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = AisClient::spawn(
//!         ClientConfig {
//!             endpoint: "wss://stream.aisstream.io/v0/stream".to_string(),
//!             api_key: "your-key".to_string(),
//!             filters: TrackerFilters {
//!                 arctic_only: true,
//!                 watchlist_only: false,
//!             },
//!         },
//!         Watchlist::default(),
//!     )
//!     .expect("stream configuration");
//!
//!     loop {
//!         for vessel in client.vessels() {
//!             println!("{}: {:?}", vessel.mmsi, vessel.name);
//!         }
//!         tokio::time::sleep(Duration::from_secs(2)).await;
//!     }
//! }
//! ```

pub mod protocol;
pub mod tracker;
pub mod ws;

use std::sync::{Arc, RwLock};

use log::{info, warn};
use tokio_util::sync::CancellationToken;
use url::Url;

pub use protocol::{AisStreamParser, ParseError, Protocol, SubscriptionRequest, VesselMessage};
pub use tracker::{
    RegistryCategory, RegistryVessel, TrackerFilters, VesselRegistry, VesselTrack,
    VesselTracker, Watchlist, ARCTIC_MIN_LATITUDE,
};
pub use ws::{Session, SessionEvent, SessionState, StreamError, StreamTransport};

/// Configuration for the full-stack client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint URL of the feed.
    pub endpoint: String,
    /// Feed API credential. Required before any connection attempt.
    pub api_key: String,
    /// Initial ingest filters. The geography filter fixes the bounding box
    /// of this client's subscription; changing it requires a new client.
    pub filters: TrackerFilters,
}

/// Full-stack AIS client that wires all layers together.
///
/// The client manages a WebSocket session, parses incoming messages, and
/// maintains vessel state in a tracker. Cloning yields another handle to
/// the same session; call [`AisClient::stop`] to end it.
#[derive(Clone)]
pub struct AisClient {
    tracker: Arc<RwLock<VesselTracker>>,
    state: Arc<RwLock<SessionState>>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for AisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AisClient")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl AisClient {
    /// Spawn a new client with the given configuration and watchlist.
    ///
    /// A missing credential or endpoint is a fatal precondition, reported
    /// before any connection attempt is made.
    pub fn spawn(config: ClientConfig, watchlist: Watchlist) -> Result<Self, StreamError> {
        if config.api_key.trim().is_empty() {
            return Err(StreamError::MissingCredential);
        }
        if config.endpoint.trim().is_empty() {
            return Err(StreamError::MissingEndpoint);
        }
        let url = Url::parse(&config.endpoint)?;

        let subscription =
            SubscriptionRequest::new(&config.api_key, config.filters.min_latitude()).to_json()?;

        Ok(Self::with_session(
            Session::spawn(url, subscription),
            watchlist,
            config.filters,
        ))
    }

    /// Build a client over an already-spawned session.
    ///
    /// The seam for running the parse-and-track pipeline against a session
    /// backed by something other than the production WebSocket transport;
    /// see [`Session::from_transport`].
    #[must_use]
    pub fn with_session(
        mut session: Session,
        watchlist: Watchlist,
        filters: TrackerFilters,
    ) -> Self {
        let tracker = Arc::new(RwLock::new(VesselTracker::new(watchlist, filters)));
        let state = Arc::new(RwLock::new(SessionState::Connecting));
        let cancel_token = CancellationToken::new();

        let tracker_clone = Arc::clone(&tracker);
        let state_clone = Arc::clone(&state);
        let task_cancel = cancel_token.clone();

        tokio::spawn(async move {
            let mut parser = AisStreamParser::new();

            loop {
                tokio::select! {
                    event = session.recv() => {
                        match event {
                            Some(SessionEvent::StateChanged(new_state)) => {
                                if let Ok(mut s) = state_clone.write() {
                                    *s = new_state;
                                }
                            }
                            Some(SessionEvent::PayloadReceived(bytes)) => {
                                match parser.parse(&bytes) {
                                    Ok(Some(msg)) => {
                                        if let Ok(mut tracker) = tracker_clone.write() {
                                            tracker.process_message(msg);
                                        }
                                    }
                                    Ok(None) => {}
                                    Err(e) => {
                                        // Malformed payloads are dropped;
                                        // the session keeps running.
                                        warn!("Dropping malformed stream message: {e}");
                                    }
                                }
                            }
                            None => break,
                        }
                    }

                    () = task_cancel.cancelled() => break,
                }
            }
            // Session handle dropped here, closing the socket.
        });

        Self {
            tracker,
            state,
            cancel_token,
        }
    }

    /// Stop the client: close the socket, drop all held tracks.
    ///
    /// Safe to call multiple times and from any state.
    pub fn stop(&self) {
        self.cancel_token.cancel();
        if let Ok(mut tracker) = self.tracker.write() {
            tracker.clear();
        }
        if let Ok(mut state) = self.state.write() {
            *state = SessionState::Disconnected;
        }
        info!("AIS client stopped");
    }

    /// Get all tracked vessels.
    #[must_use]
    pub fn vessels(&self) -> Vec<VesselTrack> {
        self.tracker
            .read()
            .map(|t| t.vessels().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get a specific vessel by MMSI.
    #[must_use]
    pub fn get(&self, mmsi: &str) -> Option<VesselTrack> {
        self.tracker.read().ok().and_then(|t| t.get(mmsi).cloned())
    }

    /// Number of tracked vessels.
    #[must_use]
    pub fn vessel_count(&self) -> usize {
        self.tracker.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Replace the ingest filters.
    ///
    /// Returns `true` when enabling the watchlist filter purged held
    /// tracks, so the caller can republish its snapshot synchronously.
    /// The geography flag is recorded but only takes effect on the next
    /// spawned client.
    pub fn set_filters(&self, filters: TrackerFilters) -> bool {
        self.tracker
            .write()
            .map(|mut t| t.set_filters(filters))
            .unwrap_or(false)
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(SessionState::Disconnected)
    }
}
