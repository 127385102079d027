use sqlx::{PgConnection, PgPool};
use tokio::signal::unix::{signal, SignalKind};

use tracksplit_layout::Split;

use crate::asset_client::{AssetSystemClient, CreateTransferRequest, HttpAssetSystemClient};
use crate::bulk_transfer::{self, BulkTransferUpdate};
use crate::config::BulkTransferWorkerConfig;
use crate::db;
use crate::error::{AssetSystemError, PipelineError, Result};
use crate::models::{BulkTransfer, TransferState};
use crate::split_repo;

/// Run the bulk transfer worker loop.
///
/// Drives the bulk transfers of published splits one tick at a time.
/// Supports graceful shutdown via SIGTERM and SIGINT (ctrl+c).
/// Shutdown is checked between ticks, so a request to the asset system is never cut off.
pub async fn run_bulk_transfer_worker(config: BulkTransferWorkerConfig) -> Result<()> {
    let pool = db::create_pool(&config.pipeline_config()).await?;
    db::run_migrations(&pool).await?;

    let client = HttpAssetSystemClient::new(&config.asset_system_url, config.asset_system_timeout)?;

    tracing::info!(
        asset_system = %config.asset_system_url,
        poll_interval = ?config.poll_interval,
        "starting bulk transfer worker"
    );

    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
        PipelineError::Worker(format!("failed to register SIGTERM handler: {e}"))
    })?;

    let mut current_interval = std::time::Duration::ZERO;

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, stopping worker");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, stopping worker");
                break;
            }
            _ = tokio::time::sleep(current_interval) => {}
        }

        match manage_bulk_transfers(&pool, &client).await {
            Ok(true) => {
                current_interval = config.poll_interval;
            }
            Ok(false) => {
                current_interval = (current_interval * 2)
                    .max(config.poll_interval)
                    .min(config.max_poll_interval);
                tracing::debug!(next_poll = ?current_interval, "no bulk transfer to drive, backing off");
            }
            Err(e) => {
                tracing::error!(error = %e, "error managing bulk transfers");
                current_interval = (current_interval * 2)
                    .max(config.poll_interval)
                    .min(config.max_poll_interval);
            }
        }
    }

    Ok(())
}

/// Run one tick of the bulk transfer manager.
///
/// Only the earliest published unfinished split is driven: an expedited start is
/// forced first, a running transfer is polled, and a pending one is created at the
/// asset system. Returns `Ok(true)` if any request was made, `Ok(false)` if there
/// was nothing to do.
pub async fn manage_bulk_transfers(pool: &PgPool, client: &dyn AssetSystemClient) -> Result<bool> {
    let Some(split) = split_repo::fetch_earliest_published_unfinished(pool).await? else {
        return Ok(false);
    };

    let mut conn = pool.acquire().await?;
    let mut transfer = match bulk_transfer::get_by_split_id(&mut *conn, split.id).await? {
        Some(transfer) => transfer,
        None => {
            tracing::warn!(split_id = %split.id, "published split has no bulk transfer, creating one");
            bulk_transfer::create(&mut conn, split.id).await?
        }
    };
    let mut acted = false;

    if transfer.state == TransferState::Created && transfer.expedited_start {
        transfer = expedite(&mut conn, client, &transfer).await?;
        acted = true;
    }

    if matches!(
        transfer.state,
        TransferState::Created | TransferState::InProgress
    ) {
        transfer = poll(&mut conn, client, &transfer).await?;
        acted = true;
    }

    if transfer.state == TransferState::Pending {
        transfer = begin_new(&mut conn, client, &split, &transfer).await?;
        acted = true;
    }

    tracing::debug!(
        split_id = %split.id,
        state = %transfer.state,
        temporary_failure = transfer.temporary_failure,
        acted,
        "bulk transfer tick finished"
    );
    Ok(acted)
}

async fn expedite(
    conn: &mut PgConnection,
    client: &dyn AssetSystemClient,
    transfer: &BulkTransfer,
) -> Result<BulkTransfer> {
    let transfer_id = external_id(transfer)?;
    match client.force_start_transfer(transfer_id).await {
        Ok(()) => {
            tracing::info!(split_id = %transfer.split_id(), transfer_id, "bulk transfer started early");
            bulk_transfer::upsert(
                conn,
                transfer.split_id(),
                &BulkTransferUpdate::new()
                    .with_state(TransferState::InProgress)
                    .with_temporary_failure(false),
            )
            .await
        }
        Err(e) => record_failure(conn, transfer, "expedited start", e).await,
    }
}

async fn poll(
    conn: &mut PgConnection,
    client: &dyn AssetSystemClient,
    transfer: &BulkTransfer,
) -> Result<BulkTransfer> {
    let transfer_id = external_id(transfer)?;
    match client.poll_transfer(transfer_id).await {
        Ok(status) => {
            // The asset system may still report CREATED after a forced start.
            let state = if transfer.state == TransferState::InProgress
                && status.state == TransferState::Created
            {
                TransferState::InProgress
            } else {
                status.state
            };

            bulk_transfer::upsert(
                conn,
                transfer.split_id(),
                &BulkTransferUpdate::new()
                    .with_state(state)
                    .with_temporary_failure(false)
                    .with_external_times(status.start_time, status.end_time)
                    .with_asset_counts(
                        status.assets_total,
                        status.assets_moved,
                        status.external_assets_remaining,
                        status.external_assets_total,
                    ),
            )
            .await
        }
        Err(e) => record_failure(conn, transfer, "poll", e).await,
    }
}

async fn begin_new(
    conn: &mut PgConnection,
    client: &dyn AssetSystemClient,
    split: &Split,
    transfer: &BulkTransfer,
) -> Result<BulkTransfer> {
    let request = CreateTransferRequest {
        split_id: split.id,
        source_location_track_id: split.source_location_track_id,
        target_location_track_ids: split.targets.iter().map(|t| t.location_track_id).collect(),
    };

    match client.create_transfer(&request).await {
        Ok(transfer_id) => {
            tracing::info!(split_id = %split.id, transfer_id = %transfer_id, "bulk transfer created");
            bulk_transfer::upsert(
                conn,
                split.id,
                &BulkTransferUpdate::new()
                    .with_state(TransferState::Created)
                    .with_external_transfer_id(transfer_id)
                    .with_temporary_failure(false),
            )
            .await
        }
        Err(e) => record_failure(conn, transfer, "create", e).await,
    }
}

/// Record a failed asset system request on the transfer.
///
/// Temporary failures only raise the flag so the next tick retries. Anything else
/// fails the transfer until an operator restarts it.
async fn record_failure(
    conn: &mut PgConnection,
    transfer: &BulkTransfer,
    request: &str,
    error: AssetSystemError,
) -> Result<BulkTransfer> {
    let split_id = transfer.split_id();

    if error.is_temporary() {
        if transfer.temporary_failure {
            tracing::info!(split_id = %split_id, request, error = %error, "bulk transfer still failing temporarily");
            return Ok(transfer.clone());
        }
        tracing::warn!(split_id = %split_id, request, error = %error, "bulk transfer request failed temporarily");
        return bulk_transfer::upsert(
            conn,
            split_id,
            &BulkTransferUpdate::new().with_temporary_failure(true),
        )
        .await;
    }

    tracing::error!(split_id = %split_id, request, error = %error, "bulk transfer request failed");
    bulk_transfer::upsert(
        conn,
        split_id,
        &BulkTransferUpdate::new()
            .with_state(TransferState::Failed)
            .with_temporary_failure(false),
    )
    .await
}

fn external_id(transfer: &BulkTransfer) -> Result<&str> {
    transfer.external_transfer_id.as_deref().ok_or_else(|| {
        PipelineError::Worker(format!(
            "bulk transfer of split {} is {} but has no external id",
            transfer.split_id(),
            transfer.state
        ))
    })
}
