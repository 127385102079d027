//! Publication validation for splits.
//!
//! Checks are pure: callers gather the relevant layout state into a
//! [`ValidationContext`] and get back every issue that blocks the publication.

mod geometry;
mod issues;
mod validator;

pub use geometry::{validate_source_geometry, validate_target_geometry};
pub use issues::{SplitIssue, SplitPublishValidationErrors};
pub use validator::{validate_splits, ValidationContext, ValidationVersions};
