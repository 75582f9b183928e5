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

//! Protocol layer for AIS message parsing.
//!
//! This module provides a trait-based abstraction for extensible protocol
//! support. Currently implements the aisstream.io JSON protocol; the trait
//! seam keeps room for NMEA 0183 (AIVDM) and other feed formats.

mod aisstream;

pub use aisstream::{AisStreamParser, SubscriptionRequest};

use thiserror::Error;

/// Errors that can occur during message parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Unified message type for vessel-position feeds.
///
/// Static identity data and dynamic position data arrive as separate
/// messages, in either order; the tracker merges both onto one record.
#[derive(Debug, Clone, PartialEq)]
pub enum VesselMessage {
    /// Static identity report (name, type, callsign, registry fields).
    StaticData {
        /// MMSI identity, string-normalized.
        mmsi: String,
        /// Vessel name.
        name: Option<String>,
        /// AIS ship type code.
        ship_type: Option<u32>,
        /// Radio callsign.
        callsign: Option<String>,
        /// IMO registry number.
        imo: Option<u64>,
        /// Bow-to-antenna dimension in meters.
        dim_a: Option<u32>,
        /// Antenna-to-stern dimension in meters.
        dim_b: Option<u32>,
    },

    /// Position report.
    Position {
        /// MMSI identity, string-normalized.
        mmsi: String,
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
        /// Speed over ground in knots.
        speed: Option<f64>,
        /// True heading in degrees (0-360).
        heading: Option<f64>,
        /// AIS navigational status code.
        nav_status: Option<u8>,
        /// Display name from feed metadata, used when no static report
        /// has arrived for this vessel yet.
        fallback_name: Option<String>,
        /// Flag country from feed metadata.
        flag: Option<String>,
    },
}

impl VesselMessage {
    /// Get the MMSI identity from any message variant.
    #[must_use]
    pub fn mmsi(&self) -> &str {
        match self {
            Self::StaticData { mmsi, .. } | Self::Position { mmsi, .. } => mmsi,
        }
    }
}

/// Trait for protocol parsers.
///
/// Implement this trait to add support for new vessel feed formats.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a message.
    ///
    /// Returns `Ok(Some(message))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but doesn't produce a message,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}
