use crate::infrastructure::LockTable;
use crate::types::LockedObjectRecord;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InMemoryLockTable {
    // Map of Object ID -> Record
    records: HashMap<String, LockedObjectRecord>,
}

impl InMemoryLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with existing records (handy for tests and tooling).
    pub fn with_records(records: impl IntoIterator<Item = LockedObjectRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.object_id.clone(), r))
                .collect(),
        }
    }
}

impl LockTable for InMemoryLockTable {
    fn get(&self, object_id: &str) -> Option<&LockedObjectRecord> {
        self.records.get(object_id)
    }

    fn insert(&mut self, record: LockedObjectRecord) {
        self.records.insert(record.object_id.clone(), record);
    }

    fn remove(&mut self, object_id: &str) -> Option<LockedObjectRecord> {
        self.records.remove(object_id)
    }

    fn object_ids(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    fn records(&self) -> Vec<LockedObjectRecord> {
        self.records.values().cloned().collect()
    }

    fn clear(&mut self) -> Vec<String> {
        self.records.drain().map(|(id, _)| id).collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
