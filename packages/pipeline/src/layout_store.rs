//! The track layout the split workflow reads from and writes to.
//!
//! Layout storage itself lives outside this crate. [`LayoutStore`] is the seam: every
//! method takes the caller's connection so that layout writes made while requesting
//! a split commit or roll back together with the split itself.

use async_trait::async_trait;
use sqlx::PgConnection;

use tracksplit_layout::{
    AddressPoint, JointNumber, KmPostId, LocationTrack, LocationTrackId, LocationTrackState,
    ReferenceLineId, SwitchId, TrackGeometry, TrackNumberId,
};

use crate::error::Result;

/// Which version of a layout object to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicationState {
    /// The draft if one exists, otherwise the official version.
    Draft,
    Official,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchInfo {
    pub id: SwitchId,
    pub name: String,
    /// Joint that split points are expressed in.
    pub presentation_joint: JointNumber,
}

#[async_trait]
pub trait LayoutStore: Send + Sync {
    async fn location_track(
        &self,
        conn: &mut PgConnection,
        state: PublicationState,
        id: LocationTrackId,
    ) -> Result<Option<(LocationTrack, TrackGeometry)>>;

    async fn switch(&self, conn: &mut PgConnection, id: SwitchId) -> Result<Option<SwitchInfo>>;

    /// Draft tracks whose `duplicate_of` points at `id`.
    async fn duplicates_of(
        &self,
        conn: &mut PgConnection,
        id: LocationTrackId,
    ) -> Result<Vec<LocationTrack>>;

    async fn track_number_tracks(
        &self,
        conn: &mut PgConnection,
        track_number_id: TrackNumberId,
    ) -> Result<Vec<LocationTrackId>>;

    async fn reference_line_track_number(
        &self,
        conn: &mut PgConnection,
        id: ReferenceLineId,
    ) -> Result<Option<TrackNumberId>>;

    async fn km_post_track_number(
        &self,
        conn: &mut PgConnection,
        id: KmPostId,
    ) -> Result<Option<TrackNumberId>>;

    /// Save a draft version of the track, assigning an id to new tracks.
    async fn save_draft(
        &self,
        conn: &mut PgConnection,
        track: &LocationTrack,
        geometry: &TrackGeometry,
    ) -> Result<LocationTrackId>;

    async fn set_location_track_state(
        &self,
        conn: &mut PgConnection,
        id: LocationTrackId,
        state: LocationTrackState,
    ) -> Result<()>;

    /// Relink the switches along the track's draft geometry, returning the switches
    /// now linked to it in track order.
    async fn relink_track_switches(
        &self,
        conn: &mut PgConnection,
        id: LocationTrackId,
    ) -> Result<Vec<SwitchId>>;

    /// Geocoded points of the track, `None` when it cannot be addressed.
    async fn address_points(
        &self,
        conn: &mut PgConnection,
        state: PublicationState,
        id: LocationTrackId,
    ) -> Result<Option<Vec<AddressPoint>>>;
}

/// Test utilities for the layout store.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use tracksplit_layout::TrackMeter;

    use crate::error::PipelineError;

    #[derive(Default)]
    struct Layout {
        official: HashMap<LocationTrackId, (LocationTrack, TrackGeometry)>,
        draft: HashMap<LocationTrackId, (LocationTrack, TrackGeometry)>,
        switches: HashMap<SwitchId, SwitchInfo>,
        reference_lines: HashMap<ReferenceLineId, TrackNumberId>,
        km_posts: HashMap<KmPostId, TrackNumberId>,
        next_id: i64,
    }

    /// In-memory layout geocoded against a reference line along the x axis: the
    /// address and m-value of a point are its x coordinate, on km 0.
    pub struct InMemoryLayoutStore {
        layout: Mutex<Layout>,
    }

    impl Default for InMemoryLayoutStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryLayoutStore {
        pub fn new() -> Self {
            Self {
                layout: Mutex::new(Layout {
                    next_id: 1000,
                    ..Layout::default()
                }),
            }
        }

        fn with_layout<T>(&self, f: impl FnOnce(&mut Layout) -> T) -> Result<T> {
            let mut layout = self
                .layout
                .lock()
                .map_err(|e| PipelineError::Layout(format!("layout lock poisoned: {e}")))?;
            Ok(f(&mut layout))
        }

        /// Store a track as published. Its id must be set.
        pub fn insert_official(&self, track: LocationTrack, geometry: TrackGeometry) -> Result<()> {
            let id = track_id(&track)?;
            self.with_layout(|l| {
                l.official.insert(id, (track, geometry));
            })
        }

        pub fn insert_draft(&self, track: LocationTrack, geometry: TrackGeometry) -> Result<()> {
            let id = track_id(&track)?;
            self.with_layout(|l| {
                l.draft.insert(id, (track, geometry));
            })
        }

        /// Drop the draft of a track, as if the user cancelled their changes.
        pub fn cancel_draft(&self, id: LocationTrackId) -> Result<()> {
            self.with_layout(|l| {
                l.draft.remove(&id);
            })
        }

        /// Promote every draft to official.
        pub fn publish_drafts(&self) -> Result<()> {
            self.with_layout(|l| {
                let drafts: Vec<_> = l.draft.drain().collect();
                l.official.extend(drafts);
            })
        }

        pub fn insert_switch(&self, switch: SwitchInfo) -> Result<()> {
            self.with_layout(|l| {
                l.switches.insert(switch.id, switch);
            })
        }

        pub fn insert_reference_line(&self, id: ReferenceLineId, track_number: TrackNumberId) -> Result<()> {
            self.with_layout(|l| {
                l.reference_lines.insert(id, track_number);
            })
        }

        pub fn insert_km_post(&self, id: KmPostId, track_number: TrackNumberId) -> Result<()> {
            self.with_layout(|l| {
                l.km_posts.insert(id, track_number);
            })
        }

        pub fn draft(&self, id: LocationTrackId) -> Result<Option<(LocationTrack, TrackGeometry)>> {
            self.with_layout(|l| l.draft.get(&id).cloned())
        }

        fn lookup(
            &self,
            state: PublicationState,
            id: LocationTrackId,
        ) -> Result<Option<(LocationTrack, TrackGeometry)>> {
            self.with_layout(|l| match state {
                PublicationState::Draft => l.draft.get(&id).or_else(|| l.official.get(&id)).cloned(),
                PublicationState::Official => l.official.get(&id).cloned(),
            })
        }
    }

    fn track_id(track: &LocationTrack) -> Result<LocationTrackId> {
        track
            .id
            .ok_or_else(|| PipelineError::InvalidInput("track has no id".into()))
    }

    fn geocode(geometry: &TrackGeometry) -> Vec<AddressPoint> {
        let mut points: Vec<AddressPoint> = Vec::new();
        for p in geometry.segments().flat_map(|s| s.points()) {
            if points.last().is_none_or(|last| last.point.distance(p) > 0.0) {
                points.push(AddressPoint::new(TrackMeter::new(0, p.x), *p, p.x));
            }
        }
        points
    }

    #[async_trait]
    impl LayoutStore for InMemoryLayoutStore {
        async fn location_track(
            &self,
            _conn: &mut PgConnection,
            state: PublicationState,
            id: LocationTrackId,
        ) -> Result<Option<(LocationTrack, TrackGeometry)>> {
            self.lookup(state, id)
        }

        async fn switch(&self, _conn: &mut PgConnection, id: SwitchId) -> Result<Option<SwitchInfo>> {
            self.with_layout(|l| l.switches.get(&id).cloned())
        }

        async fn duplicates_of(
            &self,
            _conn: &mut PgConnection,
            id: LocationTrackId,
        ) -> Result<Vec<LocationTrack>> {
            self.with_layout(|l| {
                let mut ids: Vec<LocationTrackId> =
                    l.official.keys().chain(l.draft.keys()).copied().collect();
                ids.sort();
                ids.dedup();
                ids.into_iter()
                    .filter_map(|i| l.draft.get(&i).or_else(|| l.official.get(&i)))
                    .filter(|(track, _)| track.is_duplicate_of(id))
                    .map(|(track, _)| track.clone())
                    .collect()
            })
        }

        async fn track_number_tracks(
            &self,
            _conn: &mut PgConnection,
            track_number_id: TrackNumberId,
        ) -> Result<Vec<LocationTrackId>> {
            self.with_layout(|l| {
                let mut ids: Vec<LocationTrackId> = l
                    .official
                    .values()
                    .chain(l.draft.values())
                    .filter(|(track, _)| track.track_number_id == track_number_id)
                    .filter_map(|(track, _)| track.id)
                    .collect();
                ids.sort();
                ids.dedup();
                ids
            })
        }

        async fn reference_line_track_number(
            &self,
            _conn: &mut PgConnection,
            id: ReferenceLineId,
        ) -> Result<Option<TrackNumberId>> {
            self.with_layout(|l| l.reference_lines.get(&id).copied())
        }

        async fn km_post_track_number(
            &self,
            _conn: &mut PgConnection,
            id: KmPostId,
        ) -> Result<Option<TrackNumberId>> {
            self.with_layout(|l| l.km_posts.get(&id).copied())
        }

        async fn save_draft(
            &self,
            _conn: &mut PgConnection,
            track: &LocationTrack,
            geometry: &TrackGeometry,
        ) -> Result<LocationTrackId> {
            self.with_layout(|l| {
                let id = track.id.unwrap_or_else(|| {
                    l.next_id += 1;
                    LocationTrackId(l.next_id)
                });
                let saved = LocationTrack {
                    id: Some(id),
                    ..track.clone()
                };
                l.draft.insert(id, (saved, geometry.clone()));
                id
            })
        }

        async fn set_location_track_state(
            &self,
            conn: &mut PgConnection,
            id: LocationTrackId,
            state: LocationTrackState,
        ) -> Result<()> {
            let (track, geometry) = self
                .lookup(PublicationState::Draft, id)?
                .ok_or_else(|| PipelineError::Layout(format!("{id} not found")))?;
            let track = LocationTrack { state, ..track };
            self.save_draft(conn, &track, &geometry).await?;
            Ok(())
        }

        async fn relink_track_switches(
            &self,
            _conn: &mut PgConnection,
            id: LocationTrackId,
        ) -> Result<Vec<SwitchId>> {
            let (_, geometry) = self
                .lookup(PublicationState::Draft, id)?
                .ok_or_else(|| PipelineError::Layout(format!("{id} not found")))?;
            let mut switches: Vec<SwitchId> = Vec::new();
            for link in geometry.switch_links() {
                if !switches.contains(&link.switch_id) {
                    switches.push(link.switch_id);
                }
            }
            Ok(switches)
        }

        async fn address_points(
            &self,
            _conn: &mut PgConnection,
            state: PublicationState,
            id: LocationTrackId,
        ) -> Result<Option<Vec<AddressPoint>>> {
            Ok(self
                .lookup(state, id)?
                .map(|(_, geometry)| geocode(&geometry)))
        }
    }
}
