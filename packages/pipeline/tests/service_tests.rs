mod common;

use pretty_assertions::assert_eq;

use tracksplit_layout::{
    DescriptionStructure, DuplicateOperation, JointNumber, LocationTrack, LocationTrackId,
    LocationTrackState, PublicationId, SplitIssue, SplitTargetOperation, SwitchId,
    ValidationVersions,
};
use tracksplit_pipeline::{
    InMemoryLayoutStore, PipelineError, SplitRequest, SplitRequestDuplicate, SplitRequestTarget,
    split_repo, SplitService, SwitchInfo, TransferState,
};

const FIRST_NEW_TRACK: LocationTrackId = LocationTrackId(1001);
const SECOND_NEW_TRACK: LocationTrackId = LocationTrackId(1002);

fn layout(source_state: LocationTrackState) -> InMemoryLayoutStore {
    let store = InMemoryLayoutStore::new();
    store
        .insert_official(common::track(1, source_state), common::source_geometry())
        .unwrap();
    for id in [11, 12] {
        store
            .insert_switch(SwitchInfo {
                id: SwitchId(id),
                name: format!("V{id}"),
                presentation_joint: JointNumber(1),
            })
            .unwrap();
    }
    store
}

fn duplicate_of_source(id: i64, from: f64, to: f64) -> (LocationTrack, tracksplit_layout::TrackGeometry) {
    let track = LocationTrack {
        duplicate_of: Some(LocationTrackId(1)),
        ..common::track(id, LocationTrackState::InUse)
    };
    (track, common::straight_geometry(from, &[to], &[]))
}

fn target(name: &str, start_switch: Option<i64>) -> SplitRequestTarget {
    SplitRequestTarget {
        name: name.into(),
        description: DescriptionStructure::default(),
        start_switch_id: start_switch.map(SwitchId),
        duplicate: None,
    }
}

/// Split track 1 at switch 12: x 0..20 and x 20..30.
fn two_way_split() -> SplitRequest {
    SplitRequest {
        source_track_id: LocationTrackId(1),
        targets: vec![target("A", None), target("B", Some(12))],
    }
}

fn all_split_versions() -> ValidationVersions {
    ValidationVersions {
        location_tracks: vec![LocationTrackId(1), FIRST_NEW_TRACK, SECOND_NEW_TRACK],
        switches: vec![SwitchId(11), SwitchId(12)],
        ..ValidationVersions::default()
    }
}

#[tokio::test]
async fn test_request_split() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), layout(LocationTrackState::InUse));

    let id = service.request_split(&two_way_split()).await.unwrap();
    let split = service.get_split(id).await.unwrap();

    assert_eq!(split.source_location_track_id, LocationTrackId(1));
    assert_eq!(
        split
            .targets
            .iter()
            .map(|t| (t.location_track_id, t.edge_indices.clone(), t.operation))
            .collect::<Vec<_>>(),
        vec![
            (FIRST_NEW_TRACK, 0..=1, SplitTargetOperation::Create),
            (SECOND_NEW_TRACK, 2..=2, SplitTargetOperation::Create),
        ]
    );
    assert_eq!(split.relinked_switches, vec![SwitchId(11), SwitchId(12)]);
    assert!(split.updated_duplicates.is_empty());

    let store = service.store();
    let (source, _) = store.draft(LocationTrackId(1)).unwrap().unwrap();
    assert_eq!(source.state, LocationTrackState::Deleted);
    let (first, first_geometry) = store.draft(FIRST_NEW_TRACK).unwrap().unwrap();
    assert_eq!(first.name, "A");
    assert_eq!(first_geometry.length(), 20.0);
    let (second, _) = store.draft(SECOND_NEW_TRACK).unwrap().unwrap();
    assert_eq!(second.name, "B");

    let transfer = service.get_bulk_transfer(id).await.unwrap();
    assert_eq!(transfer.state, TransferState::Pending);
}

#[tokio::test]
async fn test_split_at_first_switch_then_delete() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), layout(LocationTrackState::InUse));

    let request = SplitRequest {
        source_track_id: LocationTrackId(1),
        targets: vec![target("A", None), target("B", Some(11))],
    };
    let id = service.request_split(&request).await.unwrap();

    let split = service.get_split(id).await.unwrap();
    assert_eq!(
        split
            .targets
            .iter()
            .map(|t| t.edge_indices.clone())
            .collect::<Vec<_>>(),
        vec![0..=0, 1..=2]
    );

    service.delete_split(id).await.unwrap();
    assert!(service
        .find_unfinished_splits(&[LocationTrackId(1)], &[SwitchId(11)])
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_source_must_be_in_use() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), layout(LocationTrackState::NotInUse));

    let err = service.request_split(&two_way_split()).await.unwrap_err();

    assert_eq!(err.key(), Some("source-track-state-not-in-use"));
    assert!(service
        .find_unfinished_splits(&[LocationTrackId(1)], &[])
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_missing_source_track() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), InMemoryLayoutStore::new());

    let err = service.request_split(&two_way_split()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Layout(_)));
}

#[tokio::test]
async fn test_start_switch_must_be_on_the_track() {
    let db = common::TestDb::new().await;
    let store = layout(LocationTrackState::InUse);
    store
        .insert_switch(SwitchInfo {
            id: SwitchId(99),
            name: "V99".into(),
            presentation_joint: JointNumber(1),
        })
        .unwrap();
    let service = SplitService::new(db.pool.clone(), store);

    let request = SplitRequest {
        source_track_id: LocationTrackId(1),
        targets: vec![target("A", None), target("B", Some(99))],
    };
    let err = service.request_split(&request).await.unwrap_err();

    assert_eq!(err.key(), Some("no-switch-suggestion"));
    assert_eq!(service.store().draft(LocationTrackId(1)).unwrap(), None);
}

#[tokio::test]
async fn test_engine_errors_keep_their_key() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), layout(LocationTrackState::InUse));

    let request = SplitRequest {
        source_track_id: LocationTrackId(1),
        targets: vec![target("A", Some(11)), target("B", Some(12))],
    };
    let err = service.request_split(&request).await.unwrap_err();

    assert!(matches!(err, PipelineError::Split(_)));
    assert_eq!(err.key(), Some("first-target-has-start-switch"));
}

#[tokio::test]
async fn test_unused_duplicate_follows_overlapping_target() {
    let db = common::TestDb::new().await;
    let store = layout(LocationTrackState::InUse);
    let (duplicate, geometry) = duplicate_of_source(50, 22.0, 28.0);
    store.insert_official(duplicate, geometry).unwrap();
    let service = SplitService::new(db.pool.clone(), store);

    let id = service.request_split(&two_way_split()).await.unwrap();

    let split = service.get_split(id).await.unwrap();
    assert_eq!(split.updated_duplicates, vec![LocationTrackId(50)]);
    let (duplicate, _) = service
        .store()
        .draft(LocationTrackId(50))
        .unwrap()
        .unwrap();
    assert_eq!(duplicate.duplicate_of, Some(SECOND_NEW_TRACK));
}

#[tokio::test]
async fn test_duplicate_overwritten_by_target() {
    let db = common::TestDb::new().await;
    let store = layout(LocationTrackState::InUse);
    let (duplicate, geometry) = duplicate_of_source(60, 20.0, 30.0);
    store.insert_official(duplicate, geometry).unwrap();
    let service = SplitService::new(db.pool.clone(), store);

    let request = SplitRequest {
        source_track_id: LocationTrackId(1),
        targets: vec![
            target("A", None),
            SplitRequestTarget {
                duplicate: Some(SplitRequestDuplicate {
                    track_id: LocationTrackId(60),
                    operation: DuplicateOperation::Overwrite,
                }),
                ..target("B", Some(12))
            },
        ],
    };
    let id = service.request_split(&request).await.unwrap();

    let split = service.get_split(id).await.unwrap();
    let overwritten = split.target(LocationTrackId(60)).unwrap();
    assert_eq!(overwritten.operation, SplitTargetOperation::Overwrite);
    assert!(split.updated_duplicates.is_empty());

    let (track, _) = service
        .store()
        .draft(LocationTrackId(60))
        .unwrap()
        .unwrap();
    assert_eq!(track.name, "B");
    assert_eq!(track.duplicate_of, None);
}

#[tokio::test]
async fn test_complete_split_validates_cleanly() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), layout(LocationTrackState::InUse));
    service.request_split(&two_way_split()).await.unwrap();

    let errors = service
        .validate_split(&all_split_versions(), false)
        .await
        .unwrap();
    assert!(errors.is_empty(), "unexpected issues: {errors:?}");
}

#[tokio::test]
async fn test_partial_publication_is_blocked() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), layout(LocationTrackState::InUse));
    let id = service.request_split(&two_way_split()).await.unwrap();

    let candidates = ValidationVersions {
        location_tracks: vec![LocationTrackId(1), FIRST_NEW_TRACK],
        ..all_split_versions()
    };
    let errors = service.validate_split(&candidates, false).await.unwrap();

    assert_eq!(
        errors.location_tracks.get(&FIRST_NEW_TRACK),
        Some(&vec![SplitIssue::SplitMissingLocationTracks { split_id: id }])
    );
}

#[tokio::test]
async fn test_cancelled_target_is_reported() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), layout(LocationTrackState::InUse));
    let id = service.request_split(&two_way_split()).await.unwrap();
    service.store().cancel_draft(SECOND_NEW_TRACK).unwrap();

    let errors = service
        .validate_split(&all_split_versions(), false)
        .await
        .unwrap();

    assert_eq!(
        errors.location_tracks.get(&SECOND_NEW_TRACK),
        Some(&vec![SplitIssue::TrackIsCancelled { split_id: id }])
    );
}

#[tokio::test]
async fn test_publish_splits() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), layout(LocationTrackState::InUse));
    let id = service.request_split(&two_way_split()).await.unwrap();

    let unpublished = service
        .find_unpublished_splits(&[SECOND_NEW_TRACK], &[])
        .await
        .unwrap();
    assert_eq!(unpublished.len(), 1);

    let published = service
        .publish_splits(&unpublished, PublicationId(5))
        .await
        .unwrap();
    assert_eq!(published, vec![id]);

    assert!(service
        .find_unpublished_splits(&[SECOND_NEW_TRACK], &[])
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        service
            .find_unfinished_splits(&[], &[SwitchId(12)])
            .await
            .unwrap()
            .len(),
        1
    );
    let by_publication = service
        .publication_splits(&[PublicationId(5)])
        .await
        .unwrap();
    assert_eq!(by_publication.get(&PublicationId(5)), Some(&id));
}

#[tokio::test]
async fn test_stale_split_keeps_whole_batch_unpublished() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), layout(LocationTrackState::InUse));
    let mut conn = db.pool.acquire().await.unwrap();
    let fresh = split_repo::save_split(&mut conn, &common::new_split(1, &[2], &[]))
        .await
        .unwrap();
    let stale = split_repo::save_split(&mut conn, &common::new_split(5, &[6], &[]))
        .await
        .unwrap();

    let mut batch = vec![
        service.get_split(fresh).await.unwrap(),
        service.get_split(stale).await.unwrap(),
    ];
    batch[1].version -= 1;

    let err = service
        .publish_splits(&batch, PublicationId(5))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::VersionConflict { split_id } if split_id == stale));
    assert_eq!(service.get_split(fresh).await.unwrap().publication_id, None);
    assert!(service
        .publication_splits(&[PublicationId(5)])
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_operator_controls_bulk_transfer() {
    let db = common::TestDb::new().await;
    let service = SplitService::new(db.pool.clone(), layout(LocationTrackState::InUse));
    let id = service.request_split(&two_way_split()).await.unwrap();

    let expedited = service
        .update_bulk_transfer_expedited_start(id, true)
        .await
        .unwrap();
    assert!(expedited.expedited_start);

    service
        .update_bulk_transfer_state(id, TransferState::Failed)
        .await
        .unwrap();
    let restarted = service
        .update_bulk_transfer_state(id, TransferState::Pending)
        .await
        .unwrap();
    assert_eq!(restarted.state, TransferState::Pending);

    service.delete_split(id).await.unwrap();
    let err = service.get_bulk_transfer(id).await.unwrap_err();
    assert!(matches!(err, PipelineError::BulkTransferNotFound(_)));
}
