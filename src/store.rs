use std::collections::BTreeMap;
use std::sync::Arc;

use time::PrimitiveDateTime;
use tracing::{debug, warn};

use crate::config::DEFAULT_CAPACITY;
use crate::gpxxml::Element;
use crate::timezone::TimeNormalizer;
use crate::track::{Position, Track, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Complete,
    /// The store filled up; `rejected` definitions were not registered.
    CapacityExceeded { accepted: usize, rejected: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Ids of the registered tracks, in document order.
    pub ids: Vec<TrackId>,
    pub status: ImportStatus,
}

/// The tracks of one document, bounded by a fixed capacity.
///
/// Ids are issued in increasing order, so iterating the map visits tracks in
/// the order they were imported.
#[derive(Debug)]
pub struct TrackStore {
    capacity: usize,
    next_id: u64,
    tracks: BTreeMap<TrackId, Track>,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TrackStore {
    pub fn new(capacity: usize) -> Self {
        TrackStore {
            capacity,
            next_id: 1,
            tracks: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks in import order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Wraps each `<trk>` definition in a [`Track`] until the store is full.
    ///
    /// All tracks of one call share `normalizer`. Its offset is established
    /// from the first timestamp of the first registered track.
    pub fn import_tracks(
        &mut self,
        definitions: Vec<Element>,
        normalizer: Arc<TimeNormalizer>,
    ) -> ImportOutcome {
        let available = definitions.len();
        let mut ids = Vec::new();

        for trk in definitions {
            if self.tracks.len() >= self.capacity {
                break;
            }
            let id = TrackId::new(self.next_id);
            self.next_id += 1;
            self.tracks
                .insert(id, Track::new(id, trk, Arc::clone(&normalizer)));
            ids.push(id);
        }

        let first = ids
            .iter()
            .filter_map(|id| self.tracks.get(id))
            .find_map(Track::first_timestamp);
        if let Some(first) = first
            && let Err(e) = normalizer.establish_offset(first)
        {
            warn!(zone = normalizer.zone_name(), "cannot establish offset: {e}");
        }

        let status = if ids.len() < available {
            let rejected = available - ids.len();
            warn!(
                capacity = self.capacity,
                accepted = ids.len(),
                rejected,
                "track list is full"
            );
            ImportStatus::CapacityExceeded {
                accepted: ids.len(),
                rejected,
            }
        } else {
            ImportStatus::Complete
        };

        ImportOutcome { ids, status }
    }

    /// The subset of `ids` currently in the store.
    pub fn get_tracks(&self, ids: &[TrackId]) -> BTreeMap<TrackId, &Track> {
        ids.iter()
            .filter_map(|id| self.tracks.get_key_value(id))
            .map(|(id, track)| (*id, track))
            .collect()
    }

    /// Removes a track. Removing an unknown id does nothing.
    pub fn remove_track(&mut self, id: TrackId) -> Option<Track> {
        self.tracks.remove(&id)
    }

    /// Position at local time `at`, taken from the first track in import
    /// order whose time window contains `at` and yields a position.
    pub fn find_coordinates(&self, at: PrimitiveDateTime) -> Option<Position> {
        for track in self.tracks.values().filter(|t| t.covers(at)) {
            match track.interpolate(at) {
                Some(position) => {
                    debug!(track = %track.id(), lat = position.lat, lon = position.lon, "position found");
                    return Some(position);
                }
                None => debug!(track = %track.id(), "no bracketing points"),
            }
        }
        None
    }
}
