use crate::types::LockedObjectRecord;

/// Storage contract for the authoritative lock table.
///
/// Backends are plain maps from object id to record. All decisions (grant,
/// cascade, expiry) live in the processor and reaper, which only go through
/// this trait. Callers serialize access (see `LockManager`).
pub trait LockTable {
    fn get(&self, object_id: &str) -> Option<&LockedObjectRecord>;

    fn contains(&self, object_id: &str) -> bool {
        self.get(object_id).is_some()
    }

    /// Insert a record, replacing any record with the same object id.
    fn insert(&mut self, record: LockedObjectRecord);

    /// Remove a record. Returns it if it was present.
    fn remove(&mut self, object_id: &str) -> Option<LockedObjectRecord>;

    /// Ids of every locked object.
    fn object_ids(&self) -> Vec<String>;

    /// Snapshot of every record.
    fn records(&self) -> Vec<LockedObjectRecord>;

    /// Remove everything. Returns the ids that were locked.
    fn clear(&mut self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
