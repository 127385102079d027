//! Typed identifiers for layout entities.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

int_id!(
    /// Identifier of a location track.
    LocationTrackId,
    "track"
);
int_id!(
    /// Identifier of a layout switch.
    SwitchId,
    "switch"
);
int_id!(TrackNumberId, "track-number");
int_id!(ReferenceLineId, "reference-line");
int_id!(KmPostId, "km-post");
int_id!(
    /// Identifier of a publication that carried layout changes to the official state.
    PublicationId,
    "publication"
);

/// Identifier of a persisted split. Generated by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SplitId(pub Uuid);

impl fmt::Display for SplitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SplitId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Joint number within a switch structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointNumber(pub u32);

impl fmt::Display for JointNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_has_kind_prefix() {
        assert_eq!(LocationTrackId(7).to_string(), "track:7");
        assert_eq!(TrackNumberId(1).to_string(), "track-number:1");
        assert_eq!(JointNumber(5).to_string(), "5");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&SwitchId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
