//! Orphan sweep.
//!
//! Finds owned objects that are no longer declared and whose retention
//! policy allows them to be deleted.

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

use crate::catalog::{DesiredObject, ObjectKind, ObservedObject};
use crate::config::RetentionPolicy;

use super::tagger::{owner_tag_of, retention_of};

/// An owned object scheduled for deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct Deletion {
    /// Object kind.
    pub kind: ObjectKind,
    /// Object name.
    pub name: String,
    /// Stored attributes at observation time.
    pub previous: Map<String, Value>,
}

/// Selects orphaned objects for deletion.
#[derive(Debug)]
pub struct OrphanSweep {
    owner_tag: String,
}

impl OrphanSweep {
    /// Creates a sweep for objects carrying `owner_tag`.
    #[must_use]
    pub fn new(owner_tag: impl Into<String>) -> Self {
        Self {
            owner_tag: owner_tag.into(),
        }
    }

    /// Returns the deletions for a complete observed set.
    ///
    /// An object is deleted iff it is owned, absent from the desired names of
    /// its kind and its retention policy is `destroy`. `observed` must hold
    /// every page of every kind.
    #[must_use]
    pub fn sweep(&self, desired: &[DesiredObject], observed: &[ObservedObject]) -> Vec<Deletion> {
        let declared: HashSet<(ObjectKind, &str)> =
            desired.iter().map(|d| (d.kind, d.name.as_str())).collect();

        let mut deletions = Vec::new();
        for object in observed {
            if owner_tag_of(&object.attributes) != Some(self.owner_tag.as_str())
                || declared.contains(&(object.kind, object.name.as_str()))
            {
                continue;
            }
            if retention_of(&object.attributes) == RetentionPolicy::Retain {
                debug!("Keeping retained {} '{}'", object.kind, object.name);
                continue;
            }
            deletions.push(Deletion {
                kind: object.kind,
                name: object.name.clone(),
                previous: object.attributes.clone(),
            });
        }

        debug!("Sweep selected {} objects for deletion", deletions.len());
        deletions
    }
}
