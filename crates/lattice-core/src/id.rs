//! Strongly-typed identifiers for registry entities.
//!
//! All identifiers in Lattice are:
//! - **Strongly typed**: Prevents mixing up different ID types at compile time
//! - **Lexicographically sortable**: ULIDs encode creation time and sort naturally
//! - **Globally unique**: No coordination required for generation
//!
//! Version and action ids double as ordering keys: a target's versions sort
//! by id in creation order, which is what "latest" means throughout the
//! registry.
//!
//! # Example
//!
//! ```rust
//! use lattice_core::id::{TargetId, VersionId};
//!
//! let target = TargetId::generate();
//! let version = VersionId::generate();
//!
//! // IDs are different types - this won't compile:
//! // let wrong: TargetId = version;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

macro_rules! registry_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generates a new unique id.
            ///
            /// Uses ULID generation which is lexicographically sortable by
            /// creation time and globally unique without coordination.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new())
            }

            /// Creates an id from a raw ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the creation timestamp encoded in the id.
            #[must_use]
            pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
                let ms = self.0.timestamp_ms();
                chrono::DateTime::from_timestamp_millis(ms as i64)
                    .unwrap_or_else(chrono::Utc::now)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Ulid::from_string(s)
                    .map(Self)
                    .map_err(|e| Error::InvalidId {
                        message: format!(concat!("invalid ", $label, " id '{}': {}"), s, e),
                    })
            }
        }
    };
}

registry_id!(
    /// A unique identifier for an organization.
    ///
    /// Organizations own projects; the registry only ever reads them for
    /// authorization context.
    OrganizationId,
    "organization"
);

registry_id!(
    /// A unique identifier for a project.
    ///
    /// A project fixes the composition mode (single, stitching, federation,
    /// custom) for all of its targets.
    ProjectId,
    "project"
);

registry_id!(
    /// A unique identifier for a target.
    ///
    /// Targets are the append points of a project's schema history; every
    /// action and version belongs to exactly one target.
    TargetId,
    "target"
);

registry_id!(
    /// A unique identifier for a schema action (publish or delete event).
    ActionId,
    "action"
);

registry_id!(
    /// A unique identifier for a schema version.
    ///
    /// Version ids sort by creation time, so "latest" is the maximum id of
    /// a target's versions.
    VersionId,
    "version"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_id_roundtrip() {
        let id = TargetId::generate();
        let s = id.to_string();
        let parsed: TargetId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn version_ids_sort_by_creation() {
        let first = VersionId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = VersionId::generate();
        assert!(second > first);
    }

    #[test]
    fn invalid_id_is_rejected() {
        let err = "not-a-ulid".parse::<ActionId>().unwrap_err();
        assert!(matches!(err, Error::InvalidId { .. }));
    }

    #[test]
    fn ids_are_unique() {
        let a = ActionId::generate();
        let b = ActionId::generate();
        assert_ne!(a, b);
    }
}
