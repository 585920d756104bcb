use std::fmt;

use crate::core::entry::CacheObject;
use crate::grid::partition::StoredValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    UseOld,
    UseNew,
}

/// Picks the authoritative value when a replicated write meets an existing one.
pub trait ConflictResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, key: &CacheObject, old: &StoredValue, new: &StoredValue) -> Resolution;
}

/// Keeps the greater version, ties go to the new write.
#[derive(Debug, Default, Clone, Copy)]
pub struct VersionConflictResolver;

impl ConflictResolver for VersionConflictResolver {
    fn resolve(&self, _key: &CacheObject, old: &StoredValue, new: &StoredValue) -> Resolution {
        if new.effective_version() >= old.effective_version() {
            Resolution::UseNew
        } else {
            Resolution::UseOld
        }
    }
}
