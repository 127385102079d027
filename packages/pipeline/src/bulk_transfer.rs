//! Bulk transfer records: the external synchronisation state of a split.
//!
//! Records are only ever written through [`upsert`], which merges a partial update
//! into the stored row under a row lock. Concurrent callers reporting different
//! fields therefore merge instead of overwriting each other.

use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection};
use tracksplit_layout::SplitId;

use crate::error::{PipelineError, Result};
use crate::models::{BulkTransfer, TransferState};
use crate::split_repo;

/// A partial bulk transfer update. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkTransferUpdate {
    pub state: Option<TransferState>,
    pub expedited_start: Option<bool>,
    pub temporary_failure: Option<bool>,
    pub external_transfer_id: Option<String>,
    pub external_start_time: Option<DateTime<Utc>>,
    pub external_end_time: Option<DateTime<Utc>>,
    pub assets_total: Option<i32>,
    pub assets_moved: Option<i32>,
    pub external_assets_remaining: Option<i32>,
    pub external_assets_total: Option<i32>,
}

impl BulkTransferUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: TransferState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_expedited_start(mut self, expedited_start: bool) -> Self {
        self.expedited_start = Some(expedited_start);
        self
    }

    pub fn with_temporary_failure(mut self, temporary_failure: bool) -> Self {
        self.temporary_failure = Some(temporary_failure);
        self
    }

    pub fn with_external_transfer_id(mut self, id: impl Into<String>) -> Self {
        self.external_transfer_id = Some(id.into());
        self
    }

    pub fn with_external_times(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.external_start_time = start;
        self.external_end_time = end;
        self
    }

    pub fn with_asset_counts(
        mut self,
        total: Option<i32>,
        moved: Option<i32>,
        external_remaining: Option<i32>,
        external_total: Option<i32>,
    ) -> Self {
        self.assets_total = total;
        self.assets_moved = moved;
        self.external_assets_remaining = external_remaining;
        self.external_assets_total = external_total;
        self
    }

    /// The record with this update applied, or `None` when nothing would change.
    pub fn merge_into(&self, current: &BulkTransfer) -> Option<BulkTransfer> {
        fn merge<T: Clone>(target: &mut T, value: Option<&T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn merge_opt<T: Clone>(target: &mut Option<T>, value: Option<&T>) {
            if let Some(v) = value {
                *target = Some(v.clone());
            }
        }

        let mut merged = current.clone();
        merge(&mut merged.state, self.state.as_ref());
        merge(&mut merged.expedited_start, self.expedited_start.as_ref());
        merge(&mut merged.temporary_failure, self.temporary_failure.as_ref());
        merge_opt(&mut merged.external_transfer_id, self.external_transfer_id.as_ref());
        merge_opt(&mut merged.external_start_time, self.external_start_time.as_ref());
        merge_opt(&mut merged.external_end_time, self.external_end_time.as_ref());
        merge_opt(&mut merged.assets_total, self.assets_total.as_ref());
        merge_opt(&mut merged.assets_moved, self.assets_moved.as_ref());
        merge_opt(
            &mut merged.external_assets_remaining,
            self.external_assets_remaining.as_ref(),
        );
        merge_opt(
            &mut merged.external_assets_total,
            self.external_assets_total.as_ref(),
        );

        (merged != *current).then_some(merged)
    }
}

/// Create the default record for a split, or return the existing one.
pub async fn create(conn: &mut PgConnection, split_id: SplitId) -> Result<BulkTransfer> {
    upsert(conn, split_id, &BulkTransferUpdate::default()).await
}

/// Merge `update` into the split's bulk transfer, creating the record if needed.
///
/// A state change is checked against the transfer state machine and mirrored onto
/// the split's coarse state in the same transaction. An update that changes nothing
/// does not write.
#[tracing::instrument(skip(conn, update), fields(split_id = %split_id))]
pub async fn upsert(
    conn: &mut PgConnection,
    split_id: SplitId,
    update: &BulkTransferUpdate,
) -> Result<BulkTransfer> {
    let mut tx = conn.begin().await?;

    sqlx::query("INSERT INTO bulk_transfers (split_id) VALUES ($1) ON CONFLICT (split_id) DO NOTHING")
        .bind(split_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| missing_split(e, split_id))?;

    let current = sqlx::query_as::<_, BulkTransfer>(
        r#"SELECT * FROM bulk_transfers WHERE split_id = $1 FOR UPDATE"#,
    )
    .bind(split_id.0)
    .fetch_one(&mut *tx)
    .await?;

    let Some(merged) = update.merge_into(&current) else {
        tx.commit().await?;
        return Ok(current);
    };

    let state_changed = merged.state != current.state;
    if state_changed
        && !current
            .state
            .can_transition_to(merged.state, current.temporary_failure)
    {
        return Err(PipelineError::InvalidStateTransition(format!(
            "bulk transfer of split {split_id} cannot move from {} to {}",
            current.state, merged.state
        )));
    }

    let updated = sqlx::query_as::<_, BulkTransfer>(
        r#"
        UPDATE bulk_transfers
        SET state = $2,
            expedited_start = $3,
            temporary_failure = $4,
            external_transfer_id = $5,
            external_start_time = $6,
            external_end_time = $7,
            assets_total = $8,
            assets_moved = $9,
            external_assets_remaining = $10,
            external_assets_total = $11,
            version = version + 1,
            updated_at = now()
        WHERE split_id = $1
        RETURNING *
        "#,
    )
    .bind(split_id.0)
    .bind(merged.state)
    .bind(merged.expedited_start)
    .bind(merged.temporary_failure)
    .bind(&merged.external_transfer_id)
    .bind(merged.external_start_time)
    .bind(merged.external_end_time)
    .bind(merged.assets_total)
    .bind(merged.assets_moved)
    .bind(merged.external_assets_remaining)
    .bind(merged.external_assets_total)
    .fetch_one(&mut *tx)
    .await?;

    if state_changed {
        split_repo::set_bulk_transfer_state(&mut *tx, split_id, updated.state.coarse()).await?;
    }

    tx.commit().await?;

    tracing::info!(
        state = %updated.state,
        temporary_failure = updated.temporary_failure,
        version = updated.version,
        "bulk transfer updated"
    );
    Ok(updated)
}

pub async fn get_by_split_id<'e, E>(executor: E, split_id: SplitId) -> Result<Option<BulkTransfer>>
where
    E: sqlx::PgExecutor<'e>,
{
    let transfer =
        sqlx::query_as::<_, BulkTransfer>(r#"SELECT * FROM bulk_transfers WHERE split_id = $1"#)
            .bind(split_id.0)
            .fetch_optional(executor)
            .await?;

    Ok(transfer)
}

/// Set the transfer state, as operators do to restart a failed transfer.
pub async fn update_state(
    conn: &mut PgConnection,
    split_id: SplitId,
    state: TransferState,
) -> Result<BulkTransfer> {
    upsert(conn, split_id, &BulkTransferUpdate::new().with_state(state)).await
}

pub async fn update_expedited_start(
    conn: &mut PgConnection,
    split_id: SplitId,
    expedited_start: bool,
) -> Result<BulkTransfer> {
    upsert(
        conn,
        split_id,
        &BulkTransferUpdate::new().with_expedited_start(expedited_start),
    )
    .await
}

fn missing_split(error: sqlx::Error, split_id: SplitId) -> PipelineError {
    match &error {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            PipelineError::SplitNotFound(split_id)
        }
        _ => PipelineError::Database(error),
    }
}
