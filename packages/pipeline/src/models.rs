use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use tracksplit_layout::{
    BulkTransferState, LocationTrackId, PublicationId, Split, SplitId, SplitTarget,
    SplitTargetOperation, SwitchId, TrackNumberId,
};

use crate::error::{PipelineError, Result};

/// Progress of a split's transfer to the external asset-management system.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    sqlx::Type,
)]
#[sqlx(type_name = "bulk_transfer_state", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    Pending,
    Created,
    InProgress,
    Done,
    Failed,
}

impl TransferState {
    /// The four-state view kept on the split row.
    pub fn coarse(self) -> BulkTransferState {
        match self {
            TransferState::Pending => BulkTransferState::Pending,
            TransferState::Created | TransferState::InProgress => BulkTransferState::InProgress,
            TransferState::Done => BulkTransferState::Done,
            TransferState::Failed => BulkTransferState::Failed,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `temporary_failure` is the flag stored with the current state: a failed
    /// transfer may only resume when its failure was marked temporary.
    pub fn can_transition_to(self, next: TransferState, temporary_failure: bool) -> bool {
        use TransferState::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Pending, Created | Failed) => true,
            (Created, InProgress | Done | Failed) => true,
            (InProgress, Done | Failed) => true,
            (Failed, InProgress) => temporary_failure,
            (Failed, Pending) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BulkTransfer {
    pub split_id: Uuid,
    pub state: TransferState,
    pub expedited_start: bool,
    pub temporary_failure: bool,
    pub external_transfer_id: Option<String>,
    pub external_start_time: Option<DateTime<Utc>>,
    pub external_end_time: Option<DateTime<Utc>>,
    pub assets_total: Option<i32>,
    pub assets_moved: Option<i32>,
    pub external_assets_remaining: Option<i32>,
    pub external_assets_total: Option<i32>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BulkTransfer {
    pub fn split_id(&self) -> SplitId {
        SplitId(self.split_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "split_state", rename_all = "snake_case")]
pub enum SplitStateValue {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl From<BulkTransferState> for SplitStateValue {
    fn from(state: BulkTransferState) -> Self {
        match state {
            BulkTransferState::Pending => SplitStateValue::Pending,
            BulkTransferState::InProgress => SplitStateValue::InProgress,
            BulkTransferState::Done => SplitStateValue::Done,
            BulkTransferState::Failed => SplitStateValue::Failed,
        }
    }
}

impl From<SplitStateValue> for BulkTransferState {
    fn from(value: SplitStateValue) -> Self {
        match value {
            SplitStateValue::Pending => BulkTransferState::Pending,
            SplitStateValue::InProgress => BulkTransferState::InProgress,
            SplitStateValue::Done => BulkTransferState::Done,
            SplitStateValue::Failed => BulkTransferState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "split_target_operation", rename_all = "lowercase")]
pub enum TargetOperationValue {
    Create,
    Overwrite,
    Transfer,
}

impl From<SplitTargetOperation> for TargetOperationValue {
    fn from(op: SplitTargetOperation) -> Self {
        match op {
            SplitTargetOperation::Create => TargetOperationValue::Create,
            SplitTargetOperation::Overwrite => TargetOperationValue::Overwrite,
            SplitTargetOperation::Transfer => TargetOperationValue::Transfer,
        }
    }
}

/// A target as aggregated into the split row by `json_agg`.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitTargetRow {
    pub location_track_id: i64,
    pub edge_start: i32,
    pub edge_end: i32,
    pub segment_start: i32,
    pub segment_end: i32,
    pub operation: SplitTargetOperation,
}

impl TryFrom<SplitTargetRow> for SplitTarget {
    type Error = PipelineError;

    fn try_from(row: SplitTargetRow) -> Result<Self> {
        Ok(SplitTarget {
            location_track_id: LocationTrackId(row.location_track_id),
            edge_indices: index_range(row.edge_start, row.edge_end)?,
            segment_indices: index_range(row.segment_start, row.segment_end)?,
            operation: row.operation,
        })
    }
}

fn index_range(start: i32, end: i32) -> Result<RangeInclusive<usize>> {
    let convert = |v: i32| {
        usize::try_from(v).map_err(|_| PipelineError::InvalidInput(format!("negative index {v}")))
    };
    Ok(convert(start)?..=convert(end)?)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SplitRow {
    pub id: Uuid,
    pub source_location_track_id: i64,
    pub track_number_id: i64,
    pub bulk_transfer_state: SplitStateValue,
    pub error_cause: Option<String>,
    pub publication_id: Option<i64>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub targets: Json<Vec<SplitTargetRow>>,
    pub relinked_switches: Vec<i64>,
    pub updated_duplicates: Vec<i64>,
}

impl TryFrom<SplitRow> for Split {
    type Error = PipelineError;

    fn try_from(row: SplitRow) -> Result<Self> {
        Ok(Split {
            id: SplitId(row.id),
            source_location_track_id: LocationTrackId(row.source_location_track_id),
            track_number_id: TrackNumberId(row.track_number_id),
            bulk_transfer_state: row.bulk_transfer_state.into(),
            error_cause: row.error_cause,
            publication_id: row.publication_id.map(PublicationId),
            targets: row
                .targets
                .0
                .into_iter()
                .map(SplitTarget::try_from)
                .collect::<Result<Vec<_>>>()?,
            relinked_switches: row.relinked_switches.into_iter().map(SwitchId).collect(),
            updated_duplicates: row
                .updated_duplicates
                .into_iter()
                .map(LocationTrackId)
                .collect(),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
