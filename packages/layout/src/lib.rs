//! Tracksplit layout
//!
//! Track layout geometry and the rules for splitting location tracks:
//! - Location tracks, their edges, segments and switch links
//! - The split engine that cuts a track into targets at switch joints
//! - Publication-time validation of unfinished splits
//!
//! # Example
//!
//! ```ignore
//! use tracksplit_layout::{split_location_track, SplitTargetParams};
//!
//! let results = split_location_track(&source, &geometry, &[
//!     SplitTargetParams::new("track A", description.clone()),
//!     SplitTargetParams::new("track B", description).with_start_switch(switch),
//! ])?;
//! ```

pub mod address;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod model;
pub mod split;
pub mod track;
pub mod validation;

pub use address::{AddressPoint, AddressRange, TrackMeter};
pub use error::{GeometryError, Result, SplitError};
pub use geometry::{
    BoundingBox, Edge, EdgeNode, Point, Segment, SwitchLink, TrackGeometry, COORDINATE_DELTA,
    M_DELTA,
};
pub use ids::{
    JointNumber, KmPostId, LocationTrackId, PublicationId, ReferenceLineId, SplitId, SwitchId,
    TrackNumberId,
};
pub use model::{BulkTransferState, Split, SplitTarget, SplitTargetOperation};
pub use split::{
    connect_partial_duplicate_edges, reassign_duplicates, split_location_track,
    validate_split_result, DuplicateOperation, SplitPointSwitch, SplitTargetDuplicate,
    SplitTargetParams, SplitTargetResult, MAX_SPLIT_GEOMETRY_ADJUSTMENT,
};
pub use track::{
    DescriptionStructure, DescriptionSuffix, LocationTrack, LocationTrackState,
    LocationTrackType, TopologicalConnectivity,
};
pub use validation::{
    validate_splits, SplitIssue, SplitPublishValidationErrors, ValidationContext,
    ValidationVersions,
};
