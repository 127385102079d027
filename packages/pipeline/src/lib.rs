pub mod asset_client;
pub mod bulk_transfer;
pub mod config;
pub mod db;
pub mod error;
pub mod layout_store;
pub mod models;
pub mod service;
pub mod split_repo;
pub mod worker;

pub use asset_client::{
    AssetSystemClient, CreateTransferRequest, ExternalTransferStatus, HttpAssetSystemClient,
};
pub use bulk_transfer::BulkTransferUpdate;
pub use config::{BulkTransferWorkerConfig, PipelineConfig};
pub use db::{create_pool, run_migrations};
pub use error::{AssetSystemError, PipelineError};
pub use layout_store::{LayoutStore, PublicationState, SwitchInfo};
pub use models::{BulkTransfer, TransferState};
pub use service::{SplitRequest, SplitRequestDuplicate, SplitRequestTarget, SplitService};
pub use split_repo::NewSplit;
pub use worker::{manage_bulk_transfers, run_bulk_transfer_worker};

#[cfg(any(test, feature = "test-utils"))]
pub use asset_client::test_support::MockAssetSystemClient;
#[cfg(any(test, feature = "test-utils"))]
pub use layout_store::test_support::InMemoryLayoutStore;
