//! Content hashing for plan fingerprints.
//!
//! Hashes are computed over the canonical JSON form of desired objects, so
//! two runs over the same configuration yield the same fingerprint.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::catalog::DesiredObject;

use super::spec::Generation;

/// Hasher for computing content hashes of desired objects.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of a whole desired set.
    ///
    /// Objects are hashed in kind then name order regardless of input order.
    #[must_use]
    pub fn hash_objects(&self, generation: Generation, objects: &[DesiredObject]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(generation.owner_tag().as_bytes());

        let mut sorted: Vec<_> = objects.iter().collect();
        sorted.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
        for object in sorted {
            hasher.update(self.hash_object(object).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash of a single desired object.
    #[must_use]
    pub fn hash_object(&self, object: &DesiredObject) -> String {
        let mut hasher = Sha256::new();
        hasher.update(object.kind.label().as_bytes());
        hasher.update([0u8]);
        hasher.update(object.name.as_bytes());
        hasher.update([0u8]);
        // Map keys are sorted, so this text is canonical.
        hasher.update(Value::Object(object.attributes.clone()).to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 12 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(12).collect()
    }
}
