//! Persistence of split aggregates.
//!
//! A split is stored as one `splits` row plus its targets, relinked switches and
//! updated duplicates. Reads assemble the whole aggregate in a single statement.

use std::collections::HashMap;

use sqlx::{Connection, PgConnection};
use uuid::Uuid;

use tracksplit_layout::{
    BulkTransferState, LocationTrackId, PublicationId, Split, SplitId, SplitTarget, SwitchId,
    TrackNumberId,
};

use crate::bulk_transfer;
use crate::error::{PipelineError, Result};
use crate::models::{SplitRow, SplitStateValue, TargetOperationValue};

const SELECT_SPLIT: &str = r#"
    SELECT s.*,
        COALESCE((
            SELECT json_agg(json_build_object(
                'location_track_id', t.location_track_id,
                'edge_start', t.edge_start,
                'edge_end', t.edge_end,
                'segment_start', t.segment_start,
                'segment_end', t.segment_end,
                'operation', t.operation
            ) ORDER BY t.edge_start)
            FROM split_targets t WHERE t.split_id = s.id
        ), '[]'::json) AS targets,
        COALESCE((
            SELECT array_agg(sw.switch_id ORDER BY sw.switch_id)
            FROM split_relinked_switches sw WHERE sw.split_id = s.id
        ), '{}'::bigint[]) AS relinked_switches,
        COALESCE((
            SELECT array_agg(d.location_track_id ORDER BY d.location_track_id)
            FROM split_updated_duplicates d WHERE d.split_id = s.id
        ), '{}'::bigint[]) AS updated_duplicates
    FROM splits s
"#;

/// Everything needed to persist a freshly computed split.
#[derive(Debug, Clone)]
pub struct NewSplit {
    pub source_location_track_id: LocationTrackId,
    pub track_number_id: TrackNumberId,
    pub targets: Vec<SplitTarget>,
    pub relinked_switches: Vec<SwitchId>,
    pub updated_duplicates: Vec<LocationTrackId>,
}

/// Save a split with its targets and a default bulk transfer record.
///
/// Runs in its own transaction (a savepoint when `conn` is already in one), so a
/// split is never visible without its targets.
#[tracing::instrument(skip(conn, split), fields(source = %split.source_location_track_id, targets = split.targets.len()))]
pub async fn save_split(conn: &mut PgConnection, split: &NewSplit) -> Result<SplitId> {
    if split.targets.is_empty() {
        return Err(PipelineError::InvalidInput(
            "a split needs at least one target".into(),
        ));
    }

    let mut tx = conn.begin().await?;

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO splits (source_location_track_id, track_number_id)
        VALUES ($1, $2)
        RETURNING id
        "#,
    )
    .bind(split.source_location_track_id.value())
    .bind(split.track_number_id.value())
    .fetch_one(&mut *tx)
    .await?;

    for target in &split.targets {
        sqlx::query(
            r#"
            INSERT INTO split_targets
                (split_id, location_track_id, edge_start, edge_end, segment_start, segment_end, operation)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(target.location_track_id.value())
        .bind(db_index(*target.edge_indices.start())?)
        .bind(db_index(*target.edge_indices.end())?)
        .bind(db_index(*target.segment_indices.start())?)
        .bind(db_index(*target.segment_indices.end())?)
        .bind(TargetOperationValue::from(target.operation))
        .execute(&mut *tx)
        .await?;
    }

    let switch_ids: Vec<i64> = split.relinked_switches.iter().map(|s| s.value()).collect();
    sqlx::query(
        r#"
        INSERT INTO split_relinked_switches (split_id, switch_id)
        SELECT $1, unnest($2::bigint[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&switch_ids)
    .execute(&mut *tx)
    .await?;

    let duplicate_ids: Vec<i64> = split.updated_duplicates.iter().map(|d| d.value()).collect();
    sqlx::query(
        r#"
        INSERT INTO split_updated_duplicates (split_id, location_track_id)
        SELECT $1, unnest($2::bigint[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&duplicate_ids)
    .execute(&mut *tx)
    .await?;

    bulk_transfer::create(&mut *tx, SplitId(id)).await?;

    tx.commit().await?;

    tracing::info!(split_id = %id, "split saved");
    Ok(SplitId(id))
}

/// Get a split by id, failing when it does not exist.
pub async fn get_split<'e, E>(executor: E, split_id: SplitId) -> Result<Split>
where
    E: sqlx::PgExecutor<'e>,
{
    find_split(executor, split_id)
        .await?
        .ok_or(PipelineError::SplitNotFound(split_id))
}

pub async fn find_split<'e, E>(executor: E, split_id: SplitId) -> Result<Option<Split>>
where
    E: sqlx::PgExecutor<'e>,
{
    let sql = format!("{SELECT_SPLIT} WHERE s.id = $1");
    sqlx::query_as::<_, SplitRow>(&sql)
        .bind(split_id.0)
        .fetch_optional(executor)
        .await?
        .map(Split::try_from)
        .transpose()
}

/// Write the split's lifecycle fields. Targets are never touched.
#[tracing::instrument(skip(executor, split), fields(split_id = %split.id, state = %split.bulk_transfer_state))]
pub async fn update_split_state<'e, E>(executor: E, split: &Split) -> Result<SplitId>
where
    E: sqlx::PgExecutor<'e>,
{
    let id: Uuid = sqlx::query_scalar(
        r#"
        UPDATE splits
        SET bulk_transfer_state = $2,
            error_cause = $3,
            publication_id = $4,
            version = version + 1,
            updated_at = now()
        WHERE id = $1
        RETURNING id
        "#,
    )
    .bind(split.id.0)
    .bind(SplitStateValue::from(split.bulk_transfer_state))
    .bind(&split.error_cause)
    .bind(split.publication_id.map(PublicationId::value))
    .fetch_optional(executor)
    .await?
    .ok_or(PipelineError::SplitNotFound(split.id))?;

    tracing::info!("split state updated");
    Ok(SplitId(id))
}

/// Delete a split. Targets and its bulk transfer go with it.
#[tracing::instrument(skip(executor))]
pub async fn delete_split<'e, E>(executor: E, split_id: SplitId) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM splits WHERE id = $1")
        .bind(split_id.0)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(PipelineError::SplitNotFound(split_id));
    }
    tracing::info!("split deleted");
    Ok(())
}

/// All splits whose transfer is not done, oldest first.
pub async fn fetch_unfinished_splits<'e, E>(executor: E) -> Result<Vec<Split>>
where
    E: sqlx::PgExecutor<'e>,
{
    let sql = format!("{SELECT_SPLIT} WHERE s.bulk_transfer_state <> 'done' ORDER BY s.created_at, s.id");
    sqlx::query_as::<_, SplitRow>(&sql)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(Split::try_from)
        .collect()
}

/// Unfinished splits on a track number.
///
/// A split counts when it was made on the track number, or when its source or one
/// of its targets is among `track_ids`, the tracks currently on the track number.
pub async fn fetch_unfinished_splits_by_track_number<'e, E>(
    executor: E,
    track_number_id: TrackNumberId,
    track_ids: &[LocationTrackId],
) -> Result<Vec<SplitId>>
where
    E: sqlx::PgExecutor<'e>,
{
    let track_ids: Vec<i64> = track_ids.iter().map(|id| id.value()).collect();
    let ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT s.id FROM splits s
        WHERE s.bulk_transfer_state <> 'done'
          AND (
            s.track_number_id = $1
            OR s.source_location_track_id = ANY($2)
            OR EXISTS (
                SELECT 1 FROM split_targets t
                WHERE t.split_id = s.id AND t.location_track_id = ANY($2)
            )
          )
        ORDER BY s.created_at, s.id
        "#,
    )
    .bind(track_number_id.value())
    .bind(&track_ids)
    .fetch_all(executor)
    .await?;

    Ok(ids.into_iter().map(SplitId).collect())
}

pub async fn fetch_split_ids_by_publication<'e, E>(
    executor: E,
    publication_ids: &[PublicationId],
) -> Result<HashMap<PublicationId, SplitId>>
where
    E: sqlx::PgExecutor<'e>,
{
    let ids: Vec<i64> = publication_ids.iter().map(|p| p.value()).collect();
    let rows: Vec<(i64, Uuid)> = sqlx::query_as(
        r#"
        SELECT publication_id, id FROM splits
        WHERE publication_id = ANY($1)
        "#,
    )
    .bind(&ids)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(publication, split)| (PublicationId(publication), SplitId(split)))
        .collect())
}

/// Attach a publication to a split, provided nobody changed it since `expected_version`.
#[tracing::instrument(skip(executor))]
pub async fn publish_split<'e, E>(
    executor: E,
    split_id: SplitId,
    publication_id: PublicationId,
    expected_version: i32,
) -> Result<SplitId>
where
    E: sqlx::PgExecutor<'e>,
{
    let (updated, exists): (Option<Uuid>, bool) = sqlx::query_as(
        r#"
        WITH updated AS (
            UPDATE splits
            SET publication_id = $2, version = version + 1, updated_at = now()
            WHERE id = $1 AND version = $3
            RETURNING id
        )
        SELECT (SELECT id FROM updated), EXISTS (SELECT 1 FROM splits WHERE id = $1)
        "#,
    )
    .bind(split_id.0)
    .bind(publication_id.value())
    .bind(expected_version)
    .fetch_one(executor)
    .await?;

    match (updated, exists) {
        (Some(id), _) => {
            tracing::info!(publication_id = %publication_id, "split published");
            Ok(SplitId(id))
        }
        (None, true) => {
            tracing::warn!(expected_version, "split changed after validation");
            Err(PipelineError::VersionConflict { split_id })
        }
        (None, false) => Err(PipelineError::SplitNotFound(split_id)),
    }
}

/// The published split that has waited longest for its transfer to finish.
pub async fn fetch_earliest_published_unfinished<'e, E>(executor: E) -> Result<Option<Split>>
where
    E: sqlx::PgExecutor<'e>,
{
    let sql = format!(
        "{SELECT_SPLIT} WHERE s.publication_id IS NOT NULL AND s.bulk_transfer_state <> 'done' \
         ORDER BY s.publication_id, s.created_at LIMIT 1"
    );
    sqlx::query_as::<_, SplitRow>(&sql)
        .fetch_optional(executor)
        .await?
        .map(Split::try_from)
        .transpose()
}

/// Mirror the rich transfer state onto the split row.
pub(crate) async fn set_bulk_transfer_state<'e, E>(
    executor: E,
    split_id: SplitId,
    state: BulkTransferState,
) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE splits
        SET bulk_transfer_state = $2, version = version + 1, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(split_id.0)
    .bind(SplitStateValue::from(state))
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(PipelineError::SplitNotFound(split_id));
    }
    Ok(())
}

fn db_index(index: usize) -> Result<i32> {
    i32::try_from(index).map_err(|_| PipelineError::InvalidInput(format!("index {index} out of range")))
}
