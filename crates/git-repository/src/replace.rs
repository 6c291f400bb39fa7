//! Transparent substitution for the `refs/replace/` namespace.
//!
//! Grounded in 4.2's resolved Open Question: replacement is a substitution
//! layer the Repository Context owns, never something the Object Store does
//! on its own. `ObjectDatabase::read` always returns the bytes actually
//! stored under a given identity; callers that want replacement-aware
//! behavior (the Walker, `peel`) go through [`ReplaceMap::resolve`] first.

use std::collections::HashMap;

use git_hash::ObjectId;
use git_odb::ObjectDatabase;
use git_ref::{FilesRefStore, RefStore};

use crate::RepoError;

/// Map from an original object identity to the identity that replaces it.
#[derive(Debug, Clone, Default)]
pub struct ReplaceMap {
    entries: HashMap<ObjectId, ObjectId>,
}

impl ReplaceMap {
    /// Load the map from every ref under `refs/replace/`. Each such ref's
    /// name suffix (the part after the prefix) is the hex of the original
    /// identity; its target is the replacement identity. Malformed entries
    /// (non-hex suffix) are skipped rather than treated as corruption —
    /// a broken replace ref is a caller misconfiguration, not store damage.
    pub fn load(refs: &FilesRefStore, _odb: &ObjectDatabase) -> Result<Self, RepoError> {
        let mut entries = HashMap::new();
        for result in refs.iter(Some("refs/replace/"))? {
            let reference = result?;
            let name = reference.name().as_str();
            let Some(hex) = name.strip_prefix("refs/replace/") else {
                continue;
            };
            let Ok(original) = hex.parse::<ObjectId>() else {
                continue;
            };
            if let Some(target) = reference.target_oid() {
                entries.insert(original, target);
            }
        }
        Ok(Self { entries })
    }

    /// Resolve `id` through the map. Returns `id` unchanged if it has no
    /// replacement entry. Does not chase chains of replacements — each
    /// original maps to exactly one replacement, matching the source's
    /// non-recursive behavior for this namespace.
    pub fn resolve(&self, id: ObjectId) -> ObjectId {
        self.entries.get(&id).copied().unwrap_or(id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
