//! The split workflow as exposed to the rest of the system.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use tracksplit_layout::{
    reassign_duplicates, split_location_track, AddressRange, DescriptionStructure,
    DuplicateOperation, LocationTrackId, LocationTrackState, PublicationId, Split, SplitError,
    SplitId, SplitPointSwitch, SplitPublishValidationErrors, SplitTarget, SplitTargetDuplicate,
    SplitTargetParams, SwitchId, TrackNumberId, ValidationContext, ValidationVersions,
};

use crate::bulk_transfer;
use crate::error::{PipelineError, Result};
use crate::layout_store::{LayoutStore, PublicationState};
use crate::models::{BulkTransfer, TransferState};
use crate::split_repo::{self, NewSplit};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRequestDuplicate {
    pub track_id: LocationTrackId,
    pub operation: DuplicateOperation,
}

/// One target as requested by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRequestTarget {
    pub name: String,
    pub description: DescriptionStructure,
    /// Switch the target starts at; `None` for the first target.
    pub start_switch_id: Option<SwitchId>,
    pub duplicate: Option<SplitRequestDuplicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRequest {
    pub source_track_id: LocationTrackId,
    pub targets: Vec<SplitRequestTarget>,
}

pub struct SplitService<S> {
    pool: PgPool,
    store: S,
}

impl<S: LayoutStore> SplitService<S> {
    pub fn new(pool: PgPool, store: S) -> Self {
        Self { pool, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Split a location track and record the split.
    ///
    /// Layout changes and the split record are written in one transaction: if any
    /// step fails, nothing is left behind.
    #[tracing::instrument(skip(self, request), fields(source = %request.source_track_id, targets = request.targets.len()))]
    pub async fn request_split(&self, request: &SplitRequest) -> Result<SplitId> {
        let source_id = request.source_track_id;
        let mut tx = self.pool.begin().await?;

        let (source, _) = self.draft_track(&mut tx, source_id).await?;
        if source.state != LocationTrackState::InUse {
            return Err(PipelineError::SplitPrecondition {
                key: "source-track-state-not-in-use",
                message: format!("{source_id} is {}", source.state),
            });
        }

        let duplicates = self.store.duplicates_of(&mut tx, source_id).await?;
        let relinked_switches = self.store.relink_track_switches(&mut tx, source_id).await?;
        let (source, geometry) = self.draft_track(&mut tx, source_id).await?;

        let mut params = Vec::with_capacity(request.targets.len());
        for target in &request.targets {
            params.push(
                self.target_params(&mut tx, target, &relinked_switches)
                    .await?,
            );
        }

        let results = split_location_track(&source, &geometry, &params)?;

        let mut targets = Vec::with_capacity(results.len());
        for result in &results {
            let id = self
                .store
                .save_draft(&mut tx, &result.location_track, &result.geometry)
                .await?;
            targets.push(SplitTarget {
                location_track_id: id,
                edge_indices: result.edge_indices.clone(),
                segment_indices: result.segment_indices.clone(),
                operation: result.operation,
            });
        }

        let used: HashSet<LocationTrackId> = request
            .targets
            .iter()
            .filter_map(|t| t.duplicate.as_ref().map(|d| d.track_id))
            .collect();
        let unused: Vec<LocationTrackId> = duplicates
            .iter()
            .filter_map(|d| d.id)
            .filter(|id| !used.contains(id))
            .collect();
        let target_ids: Vec<LocationTrackId> = targets.iter().map(|t| t.location_track_id).collect();
        let updated_duplicates = self.repoint_duplicates(&mut tx, &unused, &target_ids).await?;

        self.store
            .set_location_track_state(&mut tx, source_id, LocationTrackState::Deleted)
            .await?;

        let split_id = split_repo::save_split(
            &mut tx,
            &NewSplit {
                source_location_track_id: source_id,
                track_number_id: source.track_number_id,
                targets,
                relinked_switches,
                updated_duplicates,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(split_id = %split_id, "location track split requested");
        Ok(split_id)
    }

    async fn draft_track(
        &self,
        conn: &mut PgConnection,
        id: LocationTrackId,
    ) -> Result<(tracksplit_layout::LocationTrack, tracksplit_layout::TrackGeometry)> {
        self.store
            .location_track(conn, PublicationState::Draft, id)
            .await?
            .ok_or_else(|| PipelineError::Layout(format!("{id} not found")))
    }

    async fn target_params(
        &self,
        conn: &mut PgConnection,
        target: &SplitRequestTarget,
        relinked_switches: &[SwitchId],
    ) -> Result<SplitTargetParams> {
        let mut params = SplitTargetParams::new(&target.name, target.description.clone());

        if let Some(switch_id) = target.start_switch_id {
            if !relinked_switches.contains(&switch_id) {
                return Err(PipelineError::SplitPrecondition {
                    key: "no-switch-suggestion",
                    message: format!("{switch_id} is not linked to the source track"),
                });
            }
            let switch = self
                .store
                .switch(conn, switch_id)
                .await?
                .ok_or_else(|| PipelineError::Layout(format!("{switch_id} not found")))?;
            params = params.with_start_switch(SplitPointSwitch::new(
                switch.id,
                switch.presentation_joint,
                switch.name,
            ));
        }

        if let Some(duplicate) = &target.duplicate {
            let (track, geometry) = self.draft_track(conn, duplicate.track_id).await?;
            params = params.with_duplicate(SplitTargetDuplicate {
                operation: duplicate.operation,
                track,
                geometry,
            });
        }
        Ok(params)
    }

    /// Point each leftover duplicate of the source at the target it overlaps most.
    async fn repoint_duplicates(
        &self,
        conn: &mut PgConnection,
        duplicates: &[LocationTrackId],
        targets: &[LocationTrackId],
    ) -> Result<Vec<LocationTrackId>> {
        if duplicates.is_empty() {
            return Ok(Vec::new());
        }

        let mut target_ranges = Vec::with_capacity(targets.len());
        for &id in targets {
            if let Some(range) = self.address_range(conn, id).await? {
                target_ranges.push((id, range));
            }
        }
        let mut duplicate_ranges = Vec::with_capacity(duplicates.len());
        for &id in duplicates {
            let range = self
                .address_range(conn, id)
                .await?
                .ok_or(SplitError::DuplicateReassignmentFailed(id))?;
            duplicate_ranges.push((id, range));
        }

        let mut updated = Vec::with_capacity(duplicates.len());
        for (duplicate_id, target_id) in reassign_duplicates(&duplicate_ranges, &target_ranges)? {
            let (track, geometry) = self.draft_track(conn, duplicate_id).await?;
            let track = tracksplit_layout::LocationTrack {
                duplicate_of: Some(target_id),
                ..track
            };
            self.store.save_draft(conn, &track, &geometry).await?;
            tracing::debug!(duplicate = %duplicate_id, target = %target_id, "duplicate reassigned");
            updated.push(duplicate_id);
        }
        Ok(updated)
    }

    async fn address_range(
        &self,
        conn: &mut PgConnection,
        id: LocationTrackId,
    ) -> Result<Option<AddressRange>> {
        Ok(self
            .store
            .address_points(conn, PublicationState::Draft, id)
            .await?
            .and_then(|points| AddressRange::of(&points)))
    }

    /// Unfinished splits touching any of the given tracks or switches.
    pub async fn find_unfinished_splits(
        &self,
        track_ids: &[LocationTrackId],
        switch_ids: &[SwitchId],
    ) -> Result<Vec<Split>> {
        let splits = split_repo::fetch_unfinished_splits(&self.pool).await?;
        Ok(splits
            .into_iter()
            .filter(|s| {
                track_ids.iter().any(|id| s.contains_location_track(*id))
                    || switch_ids.iter().any(|id| s.contains_switch(*id))
            })
            .collect())
    }

    /// Unfinished splits touching the given tracks or switches that are not yet published.
    pub async fn find_unpublished_splits(
        &self,
        track_ids: &[LocationTrackId],
        switch_ids: &[SwitchId],
    ) -> Result<Vec<Split>> {
        Ok(self
            .find_unfinished_splits(track_ids, switch_ids)
            .await?
            .into_iter()
            .filter(|s| s.publication_id.is_none())
            .collect())
    }

    /// Check whether the candidate versions can be published with respect to splits.
    ///
    /// Unfinished splits are read fresh on every call.
    #[tracing::instrument(skip(self, candidates))]
    pub async fn validate_split(
        &self,
        candidates: &ValidationVersions,
        allow_multiple_splits: bool,
    ) -> Result<SplitPublishValidationErrors> {
        let mut conn = self.pool.acquire().await?;
        let context = self.validation_context(&mut conn, candidates).await?;
        Ok(tracksplit_layout::validate_splits(
            candidates,
            &context,
            allow_multiple_splits,
        ))
    }

    async fn validation_context(
        &self,
        conn: &mut PgConnection,
        candidates: &ValidationVersions,
    ) -> Result<ValidationContext> {
        let unfinished_splits = split_repo::fetch_unfinished_splits(&mut *conn).await?;
        let candidate_tracks: HashSet<LocationTrackId> =
            candidates.location_tracks.iter().copied().collect();

        let mut context = ValidationContext::default();

        let mut split_tracks: Vec<LocationTrackId> = unfinished_splits
            .iter()
            .flat_map(Split::location_tracks)
            .chain(candidates.location_tracks.iter().copied())
            .collect();
        split_tracks.sort();
        split_tracks.dedup();

        for id in split_tracks {
            let state = if candidate_tracks.contains(&id) {
                PublicationState::Draft
            } else {
                PublicationState::Official
            };
            if let Some((track, _)) = self.store.location_track(conn, state, id).await? {
                context.location_tracks.insert(id, track);
            }
            if let Some(points) = self.store.address_points(conn, state, id).await? {
                context.address_points.insert(id, points);
            }
        }

        let sources: HashSet<LocationTrackId> = unfinished_splits
            .iter()
            .map(|s| s.source_location_track_id)
            .collect();
        for id in sources {
            if let Some((_, geometry)) = self
                .store
                .location_track(conn, PublicationState::Official, id)
                .await?
            {
                context.official_geometries.insert(id, geometry);
            }
            if let Some(points) = self
                .store
                .address_points(conn, PublicationState::Official, id)
                .await?
            {
                context.official_address_points.insert(id, points);
            }
        }

        for &id in &candidates.reference_lines {
            if let Some(tn) = self.store.reference_line_track_number(conn, id).await? {
                context.reference_line_track_numbers.insert(id, tn);
            }
        }
        for &id in &candidates.km_posts {
            if let Some(tn) = self.store.km_post_track_number(conn, id).await? {
                context.km_post_track_numbers.insert(id, tn);
            }
        }

        let mut track_numbers: Vec<TrackNumberId> = candidates
            .track_numbers
            .iter()
            .chain(context.reference_line_track_numbers.values())
            .chain(context.km_post_track_numbers.values())
            .copied()
            .collect();
        track_numbers.sort();
        track_numbers.dedup();
        for tn in track_numbers {
            let tracks = self.store.track_number_tracks(conn, tn).await?;
            context.track_number_tracks.insert(tn, tracks);
        }

        context.unfinished_splits = unfinished_splits;
        Ok(context)
    }

    /// Attach the publication to each validated split.
    ///
    /// Each split must still be at the version it was validated at. The batch is
    /// published as a whole: one stale split leaves every split unpublished.
    #[tracing::instrument(skip(self, validated))]
    pub async fn publish_splits(
        &self,
        validated: &[Split],
        publication_id: PublicationId,
    ) -> Result<Vec<SplitId>> {
        let mut tx = self.pool.begin().await?;
        let mut published = Vec::with_capacity(validated.len());
        for split in validated {
            published.push(
                split_repo::publish_split(&mut *tx, split.id, publication_id, split.version)
                    .await?,
            );
        }
        tx.commit().await?;
        Ok(published)
    }

    pub async fn publication_splits(
        &self,
        publication_ids: &[PublicationId],
    ) -> Result<HashMap<PublicationId, SplitId>> {
        split_repo::fetch_split_ids_by_publication(&self.pool, publication_ids).await
    }

    pub async fn get_split(&self, split_id: SplitId) -> Result<Split> {
        split_repo::get_split(&self.pool, split_id).await
    }

    pub async fn delete_split(&self, split_id: SplitId) -> Result<()> {
        split_repo::delete_split(&self.pool, split_id).await
    }

    pub async fn get_bulk_transfer(&self, split_id: SplitId) -> Result<BulkTransfer> {
        bulk_transfer::get_by_split_id(&self.pool, split_id)
            .await?
            .ok_or(PipelineError::BulkTransferNotFound(split_id))
    }

    pub async fn update_bulk_transfer_state(
        &self,
        split_id: SplitId,
        state: TransferState,
    ) -> Result<BulkTransfer> {
        let mut conn = self.pool.acquire().await?;
        bulk_transfer::update_state(&mut conn, split_id, state).await
    }

    pub async fn update_bulk_transfer_expedited_start(
        &self,
        split_id: SplitId,
        expedited_start: bool,
    ) -> Result<BulkTransfer> {
        let mut conn = self.pool.acquire().await?;
        bulk_transfer::update_expedited_start(&mut conn, split_id, expedited_start).await
    }
}
