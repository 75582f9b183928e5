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

//! aisstream.io JSON protocol parser.
//!
//! Parses the envelope format delivered by the aisstream.io WebSocket feed.
//! Binary frames are decoded to UTF-8 text before JSON parsing.
//!
//! Envelope format:
//! ```text
//! { "MessageType": "PositionReport" | "ShipStaticData",
//!   "Message": { "PositionReport": {..} } | { "ShipStaticData": {..} },
//!   "MetaData": { "ShipName": .., "flag_country": .. } }
//! ```

use serde::{Deserialize, Serialize};

use super::{ParseError, Protocol, VesselMessage};

/// Subscription request sent once after the socket opens.
///
/// The bounding box spans the full longitude range; the minimum latitude
/// narrows the subscription to the Arctic when the geography filter is on.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "APIKey")]
    api_key: String,
    #[serde(rename = "BoundingBoxes")]
    bounding_boxes: Vec<Vec<[f64; 2]>>,
    #[serde(rename = "FilterMessageTypes")]
    filter_message_types: Vec<&'static str>,
}

impl SubscriptionRequest {
    /// Build a subscription covering `[min_lat, -180]` to `[90, 180]`,
    /// filtered to position and static-data reports.
    #[must_use]
    pub fn new(api_key: impl Into<String>, min_lat: f64) -> Self {
        Self {
            api_key: api_key.into(),
            bounding_boxes: vec![vec![[min_lat, -180.0], [90.0, 180.0]]],
            filter_message_types: vec!["PositionReport", "ShipStaticData"],
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "MessageType")]
    message_type: String,
    #[serde(rename = "Message")]
    message: Body,
    #[serde(rename = "MetaData", default)]
    meta: Option<MetaData>,
}

#[derive(Debug, Default, Deserialize)]
struct Body {
    #[serde(rename = "PositionReport")]
    position: Option<PositionReport>,
    #[serde(rename = "ShipStaticData")]
    static_data: Option<ShipStaticData>,
}

#[derive(Debug, Deserialize)]
struct PositionReport {
    #[serde(rename = "UserID")]
    user_id: u64,
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "Longitude")]
    longitude: f64,
    #[serde(rename = "Sog")]
    sog: Option<f64>,
    #[serde(rename = "TrueHeading")]
    true_heading: Option<f64>,
    #[serde(rename = "NavigationalStatus")]
    navigational_status: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct ShipStaticData {
    #[serde(rename = "UserID")]
    user_id: u64,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Type")]
    ship_type: Option<u32>,
    #[serde(rename = "CallSign")]
    callsign: Option<String>,
    #[serde(rename = "ImoNumber")]
    imo_number: Option<u64>,
    #[serde(rename = "DimensionA")]
    dimension_a: Option<u32>,
    #[serde(rename = "DimensionB")]
    dimension_b: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MetaData {
    #[serde(rename = "ShipName")]
    ship_name: Option<String>,
    #[serde(rename = "flag_country")]
    flag_country: Option<String>,
}

/// AIS feed names are space-padded; empty after trimming means absent.
fn clean_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty())
}

/// Parser for aisstream.io envelope messages.
#[derive(Debug, Default)]
pub struct AisStreamParser;

impl AisStreamParser {
    /// Create a new aisstream.io parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for AisStreamParser {
    type Message = VesselMessage;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<VesselMessage>, ParseError> {
        let text = std::str::from_utf8(input)
            .map_err(|_| ParseError::InvalidFormat("invalid UTF-8".to_string()))?;

        let envelope: Envelope = serde_json::from_str(text)?;

        match envelope.message_type.as_str() {
            "PositionReport" => {
                let report = envelope
                    .message
                    .position
                    .ok_or(ParseError::MissingField("Message.PositionReport"))?;
                let meta = envelope.meta;

                Ok(Some(VesselMessage::Position {
                    mmsi: report.user_id.to_string(),
                    latitude: report.latitude,
                    longitude: report.longitude,
                    speed: report.sog,
                    heading: report.true_heading,
                    nav_status: report.navigational_status,
                    fallback_name: clean_name(meta.as_ref().and_then(|m| m.ship_name.clone())),
                    flag: meta.and_then(|m| m.flag_country),
                }))
            }
            "ShipStaticData" => {
                let report = envelope
                    .message
                    .static_data
                    .ok_or(ParseError::MissingField("Message.ShipStaticData"))?;

                Ok(Some(VesselMessage::StaticData {
                    mmsi: report.user_id.to_string(),
                    name: clean_name(report.name),
                    ship_type: report.ship_type,
                    callsign: clean_name(report.callsign),
                    imo: report.imo_number,
                    dim_a: report.dimension_a,
                    dim_b: report.dimension_b,
                }))
            }
            // Other message types are valid but not tracked.
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position_report() {
        let payload = br#"{
            "MessageType": "PositionReport",
            "Message": {
                "PositionReport": {
                    "UserID": 257123456,
                    "Latitude": 71.25,
                    "Longitude": 25.75,
                    "Sog": 12.3,
                    "TrueHeading": 270.0,
                    "NavigationalStatus": 0
                }
            },
            "MetaData": { "ShipName": "KV SVALBARD  ", "flag_country": "Norway" }
        }"#;

        let mut parser = AisStreamParser::new();
        let msg = parser.parse(payload).unwrap().unwrap();

        match msg {
            VesselMessage::Position {
                mmsi,
                latitude,
                longitude,
                speed,
                heading,
                nav_status,
                fallback_name,
                flag,
            } => {
                assert_eq!(mmsi, "257123456");
                assert!((latitude - 71.25).abs() < f64::EPSILON);
                assert!((longitude - 25.75).abs() < f64::EPSILON);
                assert_eq!(speed, Some(12.3));
                assert_eq!(heading, Some(270.0));
                assert_eq!(nav_status, Some(0));
                assert_eq!(fallback_name.as_deref(), Some("KV SVALBARD"));
                assert_eq!(flag.as_deref(), Some("Norway"));
            }
            other => panic!("expected position report, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_static_data() {
        let payload = br#"{
            "MessageType": "ShipStaticData",
            "Message": {
                "ShipStaticData": {
                    "UserID": 273456789,
                    "Name": "YAMAL",
                    "Type": 52,
                    "CallSign": "UCJT",
                    "ImoNumber": 9077549,
                    "DimensionA": 75,
                    "DimensionB": 75
                }
            }
        }"#;

        let mut parser = AisStreamParser::new();
        let msg = parser.parse(payload).unwrap().unwrap();

        match msg {
            VesselMessage::StaticData {
                mmsi,
                name,
                ship_type,
                callsign,
                imo,
                ..
            } => {
                assert_eq!(mmsi, "273456789");
                assert_eq!(name.as_deref(), Some("YAMAL"));
                assert_eq!(ship_type, Some(52));
                assert_eq!(callsign.as_deref(), Some("UCJT"));
                assert_eq!(imo, Some(9077549));
            }
            other => panic!("expected static data, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_message_type_produces_nothing() {
        let payload = br#"{"MessageType": "AidsToNavigationReport", "Message": {}}"#;
        let mut parser = AisStreamParser::new();
        assert!(parser.parse(payload).unwrap().is_none());
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let mut parser = AisStreamParser::new();
        assert!(parser.parse(b"not json").is_err());
        assert!(parser.parse(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_type_without_body_is_missing_field() {
        let payload = br#"{"MessageType": "PositionReport", "Message": {}}"#;
        let mut parser = AisStreamParser::new();
        match parser.parse(payload) {
            Err(ParseError::MissingField(field)) => {
                assert_eq!(field, "Message.PositionReport");
            }
            other => panic!("expected missing field error, got {other:?}"),
        }
    }

    #[test]
    fn test_subscription_wire_shape() {
        let request = SubscriptionRequest::new("secret-key", 66.0);
        let json: serde_json::Value =
            serde_json::from_str(&request.to_json().unwrap()).unwrap();

        assert_eq!(json["APIKey"], "secret-key");
        assert_eq!(json["BoundingBoxes"][0][0][0], 66.0);
        assert_eq!(json["BoundingBoxes"][0][0][1], -180.0);
        assert_eq!(json["BoundingBoxes"][0][1][0], 90.0);
        assert_eq!(json["BoundingBoxes"][0][1][1], 180.0);
        assert_eq!(json["FilterMessageTypes"][0], "PositionReport");
        assert_eq!(json["FilterMessageTypes"][1], "ShipStaticData");
    }
}
