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

//! Vessel tracking and state management.
//!
//! This module maintains per-vessel state merged from static identity
//! reports and dynamic position reports, keyed by MMSI. Static and position
//! data for one vessel may arrive in either order; each kind of report
//! merges its own fields onto the record and never blanks the other kind.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Deserialize;

use crate::protocol::VesselMessage;

/// Minimum latitude of the subscription bounding box when the arctic-only
/// geography filter is active.
pub const ARCTIC_MIN_LATITUDE: f64 = 66.0;

/// Vessel registry document: categories of vessels of interest.
#[derive(Debug, Clone, Deserialize)]
pub struct VesselRegistry {
    pub vessel_registry: Vec<RegistryCategory>,
}

/// One registry category (e.g. icebreakers, research vessels).
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryCategory {
    #[serde(default)]
    pub category: Option<String>,
    pub vessels: Vec<RegistryVessel>,
}

/// One registry entry. Entries without a usable MMSI are skipped when
/// building the watchlist.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryVessel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mmsi: Option<String>,
    #[serde(default, rename = "class")]
    pub vessel_class: Option<String>,
}

/// Immutable set of vessel identities of interest, built once from a
/// registry document. Membership test is O(1).
#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    mmsis: HashSet<String>,
}

impl Watchlist {
    /// Build a watchlist from a registry, skipping entries whose MMSI is
    /// missing, empty, `"0"`, or `"N/A"`.
    #[must_use]
    pub fn from_registry(registry: &VesselRegistry) -> Self {
        let mmsis = registry
            .vessel_registry
            .iter()
            .flat_map(|category| category.vessels.iter())
            .filter_map(|vessel| vessel.mmsi.as_deref())
            .filter(|mmsi| !mmsi.is_empty() && *mmsi != "0" && *mmsi != "N/A")
            .map(ToOwned::to_owned)
            .collect::<HashSet<_>>();

        info!("Watchlist built with {} vessels from registry", mmsis.len());
        Self { mmsis }
    }

    /// Check whether an identity is on the watchlist.
    #[must_use]
    pub fn contains(&self, mmsi: &str) -> bool {
        self.mmsis.contains(mmsi)
    }

    /// Number of watched identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmsis.len()
    }

    /// Check if the watchlist is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmsis.is_empty()
    }
}

impl FromIterator<String> for Watchlist {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            mmsis: iter.into_iter().collect(),
        }
    }
}

/// Ingest filters for the tracker.
///
/// `arctic_only` parameterizes the bounding box of the next subscription;
/// it does not retroactively drop tracks. `watchlist_only` gates position
/// reports and, when newly enabled, purges already-admitted strangers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerFilters {
    /// Subscribe only above the Arctic Circle.
    pub arctic_only: bool,
    /// Admit position reports only for watchlisted identities.
    pub watchlist_only: bool,
}

impl TrackerFilters {
    /// Minimum latitude for the subscription bounding box.
    #[must_use]
    pub fn min_latitude(&self) -> f64 {
        if self.arctic_only {
            ARCTIC_MIN_LATITUDE
        } else {
            0.0
        }
    }
}

/// Live state for one vessel, merged from static and position reports.
#[derive(Debug, Clone)]
pub struct VesselTrack {
    /// MMSI identity (primary key).
    pub mmsi: String,
    /// Vessel name, from static data or feed metadata fallback.
    pub name: Option<String>,
    /// AIS ship type code.
    pub ship_type: Option<u32>,
    /// Radio callsign.
    pub callsign: Option<String>,
    /// IMO registry number.
    pub imo: Option<u64>,
    /// Flag country from feed metadata.
    pub flag: Option<String>,
    /// Current latitude in degrees.
    pub latitude: Option<f64>,
    /// Current longitude in degrees.
    pub longitude: Option<f64>,
    /// Speed over ground in knots.
    pub speed: Option<f64>,
    /// True heading in degrees.
    pub heading: Option<f64>,
    /// AIS navigational status code.
    pub nav_status: Option<u8>,
    /// Timestamp of the last merged report.
    pub last_updated: DateTime<Utc>,
}

impl VesselTrack {
    fn new(mmsi: String) -> Self {
        Self {
            mmsi,
            name: None,
            ship_type: None,
            callsign: None,
            imo: None,
            flag: None,
            latitude: None,
            longitude: None,
            speed: None,
            heading: None,
            nav_status: None,
            last_updated: Utc::now(),
        }
    }

    /// Whether at least one position report has been merged.
    #[must_use]
    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Merge static identity fields. Position fields are untouched.
    fn apply_static(
        &mut self,
        name: Option<String>,
        ship_type: Option<u32>,
        callsign: Option<String>,
        imo: Option<u64>,
    ) {
        if name.is_some() {
            self.name = name;
        }
        if ship_type.is_some() {
            self.ship_type = ship_type;
        }
        if callsign.is_some() {
            self.callsign = callsign;
        }
        if imo.is_some() {
            self.imo = imo;
        }
        self.last_updated = Utc::now();
    }

    /// Merge dynamic position fields. Identity fields are untouched.
    fn apply_position(
        &mut self,
        latitude: f64,
        longitude: f64,
        speed: Option<f64>,
        heading: Option<f64>,
        nav_status: Option<u8>,
        flag: Option<String>,
    ) {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        if speed.is_some() {
            self.speed = speed;
        }
        if heading.is_some() {
            self.heading = heading;
        }
        if nav_status.is_some() {
            self.nav_status = nav_status;
        }
        if flag.is_some() {
            self.flag = flag;
        }
        self.last_updated = Utc::now();
    }
}

/// Vessel tracker that maintains at most one live track per identity.
#[derive(Debug)]
pub struct VesselTracker {
    vessels: HashMap<String, VesselTrack>,
    watchlist: Watchlist,
    filters: TrackerFilters,
}

impl VesselTracker {
    /// Create a new tracker with the given watchlist and filters.
    #[must_use]
    pub fn new(watchlist: Watchlist, filters: TrackerFilters) -> Self {
        Self {
            vessels: HashMap::new(),
            watchlist,
            filters,
        }
    }

    /// Process an incoming vessel message.
    ///
    /// Returns `true` if the message was merged, `false` if it was dropped
    /// by the watchlist gate.
    pub fn process_message(&mut self, msg: VesselMessage) -> bool {
        match msg {
            VesselMessage::StaticData {
                mmsi,
                name,
                ship_type,
                callsign,
                imo,
                ..
            } => {
                // Static data is cached for any vessel; it is cheap and may
                // arrive before the first gated position report.
                self.vessels
                    .entry(mmsi.clone())
                    .or_insert_with(|| VesselTrack::new(mmsi))
                    .apply_static(name, ship_type, callsign, imo);
                true
            }
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
                if self.filters.watchlist_only && !self.watchlist.contains(&mmsi) {
                    debug!("Dropping position report for non-watchlisted {mmsi}");
                    return false;
                }

                let track = self.vessels.entry(mmsi.clone()).or_insert_with(|| {
                    let mut track = VesselTrack::new(mmsi.clone());
                    track.name = fallback_name.or_else(|| Some(format!("Vessel {mmsi}")));
                    track
                });
                track.apply_position(latitude, longitude, speed, heading, nav_status, flag);
                true
            }
        }
    }

    /// Replace the current filters.
    ///
    /// When the watchlist-only flag transitions off to on, every held
    /// non-watchlisted track is purged immediately. Returns `true` when a
    /// purge happened so the caller can publish a snapshot synchronously.
    pub fn set_filters(&mut self, filters: TrackerFilters) -> bool {
        let purge = filters.watchlist_only && !self.filters.watchlist_only;
        self.filters = filters;

        if purge {
            let before = self.vessels.len();
            let watchlist = &self.watchlist;
            self.vessels.retain(|mmsi, _| watchlist.contains(mmsi));
            info!(
                "Watchlist filter enabled: purged {} non-watchlisted tracks",
                before - self.vessels.len()
            );
        }
        purge
    }

    /// Current filters.
    #[must_use]
    pub fn filters(&self) -> TrackerFilters {
        self.filters
    }

    /// Get all tracked vessels.
    #[must_use]
    pub fn vessels(&self) -> Vec<&VesselTrack> {
        self.vessels.values().collect()
    }

    /// Get a specific vessel by MMSI.
    #[must_use]
    pub fn get(&self, mmsi: &str) -> Option<&VesselTrack> {
        self.vessels.get(mmsi)
    }

    /// Number of tracked vessels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vessels.len()
    }

    /// Check if there are no tracked vessels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vessels.is_empty()
    }

    /// Drop every held track.
    pub fn clear(&mut self) {
        self.vessels.clear();
    }
}
