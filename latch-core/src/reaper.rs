use crate::infrastructure::LockTable;

/// Removal paths of the lock table. Each returns the ids actually removed so
/// the caller can announce them as unlocked.
pub struct ExpiryReaper;

impl ExpiryReaper {
    /// Remove every record whose auto-unlock deadline is strictly before `now`.
    pub fn unlock_expired<T: LockTable + ?Sized>(table: &mut T, now: u64) -> Vec<String> {
        let expired: Vec<String> = table
            .records()
            .into_iter()
            .filter(|record| record.is_expired(now))
            .map(|record| record.object_id)
            .collect();

        for object_id in &expired {
            table.remove(object_id);
        }

        expired
    }

    /// Remove one record, optionally cascading through the ids it was locked
    /// together with. Unknown ids are a no-op.
    pub fn unlock_object<T: LockTable + ?Sized>(
        table: &mut T,
        object_id: &str,
        unlock_linked: bool,
    ) -> Vec<String> {
        let mut unlocked = Vec::new();
        let mut pending = vec![object_id.to_string()];

        while let Some(object_id) = pending.pop() {
            // A record can only be removed once, so cycles and shared
            // children terminate.
            let Some(record) = table.remove(&object_id) else {
                continue;
            };

            if unlock_linked {
                pending.extend(record.linked_object_ids.into_iter().rev());
            }
            unlocked.push(object_id);
        }

        unlocked
    }

    /// Clear the table. Returns every id that was locked.
    pub fn unlock_all<T: LockTable + ?Sized>(table: &mut T) -> Vec<String> {
        table.clear()
    }
}
