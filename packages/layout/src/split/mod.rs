//! Location track split engine.
//!
//! Cuts one location track into several target tracks at switch joints. The engine
//! is a pure transform: it reads the source track and geometry and returns the new
//! track records and geometries without touching any storage.

mod duplicates;
mod engine;
mod transfer;
mod types;

pub use duplicates::{best_overlapping_target, reassign_duplicates};
pub use engine::{split_location_track, validate_split_result};
pub use transfer::{connect_partial_duplicate_edges, MAX_SPLIT_GEOMETRY_ADJUSTMENT};
pub use types::{
    DuplicateOperation, SplitPointSwitch, SplitTargetDuplicate, SplitTargetParams,
    SplitTargetResult,
};
