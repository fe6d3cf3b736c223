//! Durable queue of pending remote mutations.

use chrono::Utc;
use mealsync_protocol::{MutationDescriptor, MutationKind, MutationStatus, QueuedMutation};
use mealsync_storage::{KeyValueStore, StorageError, StorageResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key of the persisted queue.
pub const QUEUE_KEY: &str = "sync.queue";

/// An ordered, persisted list of mutations waiting for the server.
///
/// # Invariants
///
/// - Entries are kept in insertion order and drained oldest-first
/// - `retry_count` only grows until the entry is dequeued or dropped
/// - Storage failures are logged and absorbed; reads degrade to an empty queue
pub struct MutationQueue {
    store: Arc<dyn KeyValueStore>,
    max_retries: u32,
    lock: Mutex<()>,
}

impl MutationQueue {
    /// Creates a queue over `store` that drops entries after `max_retries`
    /// failed attempts.
    pub fn new(store: Arc<dyn KeyValueStore>, max_retries: u32) -> Self {
        Self {
            store,
            max_retries: max_retries.max(1),
            lock: Mutex::new(()),
        }
    }

    /// Returns the retry ceiling.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Reads the persisted queue.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if the stored queue does not
    /// parse, or the backend's error if it cannot be read.
    pub fn load(&self) -> StorageResult<Vec<QueuedMutation>> {
        match self.store.get(QUEUE_KEY)? {
            None => Ok(Vec::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(StorageError::corrupted),
        }
    }

    /// Appends a mutation and returns its assigned queue id.
    pub fn enqueue(&self, descriptor: MutationDescriptor) -> String {
        let mutation = QueuedMutation::from_descriptor(descriptor, Utc::now());
        let id = mutation.id.clone();

        let _guard = self.lock.lock();
        let mut queue = self.load_or_empty();
        debug!(id = %id, kind = ?mutation.kind, endpoint = %mutation.endpoint, "mutation queued");
        queue.push(mutation);
        self.write(&queue);
        id
    }

    /// Returns every queued mutation, oldest first.
    pub fn get_all(&self) -> Vec<QueuedMutation> {
        self.load_or_empty()
    }

    /// Returns the queued mutation with `id`.
    pub fn get(&self, id: &str) -> Option<QueuedMutation> {
        self.load_or_empty().into_iter().find(|m| m.id == id)
    }

    /// Removes a mutation. Returns true if it was queued.
    pub fn dequeue(&self, id: &str) -> bool {
        let _guard = self.lock.lock();
        let mut queue = self.load_or_empty();
        let before = queue.len();
        queue.retain(|m| m.id != id);
        let removed = queue.len() != before;
        if removed {
            self.write(&queue);
        }
        removed
    }

    /// Records a failed attempt.
    ///
    /// Returns true if the mutation stays queued for another pass. Returns
    /// false if it reached the retry ceiling and was dropped, or if it is no
    /// longer queued.
    pub fn increment_retry(&self, id: &str) -> bool {
        let _guard = self.lock.lock();
        let mut queue = self.load_or_empty();
        let Some(index) = queue.iter().position(|m| m.id == id) else {
            debug!(id, "retry recorded for a mutation no longer queued");
            return false;
        };

        let mutation = &mut queue[index];
        mutation.retry_count += 1;

        if mutation.retry_count >= self.max_retries {
            warn!(
                id,
                kind = ?mutation.kind,
                endpoint = %mutation.endpoint,
                attempts = mutation.retry_count,
                "mutation dropped after reaching the retry ceiling"
            );
            queue.remove(index);
            self.write(&queue);
            return false;
        }

        mutation.status = MutationStatus::Pending;
        self.write(&queue);
        true
    }

    /// Sets the lifecycle status of a queued mutation.
    ///
    /// Returns false if the mutation is no longer queued. Terminal statuses
    /// are not stored; use [`MutationQueue::dequeue`] instead.
    pub fn set_status(&self, id: &str, status: MutationStatus) -> bool {
        let _guard = self.lock.lock();
        let mut queue = self.load_or_empty();
        let Some(mutation) = queue.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if !status.is_terminal() && mutation.status != status {
            mutation.status = status;
            self.write(&queue);
        }
        true
    }

    /// Marks a mutation as in flight and returns its current contents.
    ///
    /// Returns `None` if it is no longer queued.
    pub fn begin(&self, id: &str) -> Option<QueuedMutation> {
        let _guard = self.lock.lock();
        let mut queue = self.load_or_empty();
        let mutation = queue.iter_mut().find(|m| m.id == id)?;
        mutation.status = MutationStatus::Syncing;
        let current = mutation.clone();
        self.write(&queue);
        Some(current)
    }

    /// Removes a mutation and returns it as it was last stored.
    pub fn take(&self, id: &str) -> Option<QueuedMutation> {
        let _guard = self.lock.lock();
        let mut queue = self.load_or_empty();
        let index = queue.iter().position(|m| m.id == id)?;
        let taken = queue.remove(index);
        self.write(&queue);
        Some(taken)
    }

    /// Finds the queued create carrying placeholder `local_id`.
    pub fn find_create_for(&self, local_id: &str) -> Option<QueuedMutation> {
        self.load_or_empty()
            .into_iter()
            .find(|m| m.kind == MutationKind::Create && m.local_id() == Some(local_id))
    }

    /// Replaces the payload of a queued mutation.
    ///
    /// Returns false if the mutation is no longer queued.
    pub fn amend_payload(&self, id: &str, payload: Value) -> bool {
        let _guard = self.lock.lock();
        let mut queue = self.load_or_empty();
        let Some(mutation) = queue.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        mutation.payload = payload;
        self.write(&queue);
        true
    }

    /// Returns the number of queued mutations.
    pub fn size(&self) -> usize {
        self.load_or_empty().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Drops every queued mutation.
    pub fn clear(&self) {
        let _guard = self.lock.lock();
        if let Err(e) = self.store.remove(QUEUE_KEY) {
            warn!(error = %e, "failed to clear mutation queue");
        }
    }

    fn load_or_empty(&self) -> Vec<QueuedMutation> {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, "mutation queue unreadable, treating as empty");
            Vec::new()
        })
    }

    fn write(&self, queue: &[QueuedMutation]) {
        let result = serde_json::to_vec(queue)
            .map_err(StorageError::corrupted)
            .and_then(|bytes| self.store.put(QUEUE_KEY, &bytes));
        if let Err(e) = result {
            warn!(error = %e, len = queue.len(), "failed to persist mutation queue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealsync_storage::InMemoryStore;
    use serde_json::json;

    fn queue() -> (Arc<InMemoryStore>, MutationQueue) {
        let store = Arc::new(InMemoryStore::new());
        let queue = MutationQueue::new(store.clone(), 5);
        (store, queue)
    }

    fn create(local_id: &str) -> MutationDescriptor {
        MutationDescriptor::create("/meals", json!({ "title": "Eggs", "localId": local_id }))
    }

    #[test]
    fn enqueue_assigns_defaults() {
        let (_, queue) = queue();
        let id = queue.enqueue(create("local_1_a"));

        let all = queue.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].retry_count, 0);
        assert_eq!(all[0].status, MutationStatus::Pending);
    }

    #[test]
    fn insertion_order_is_kept() {
        let (_, queue) = queue();
        let first = queue.enqueue(create("local_1_a"));
        let second = queue.enqueue(MutationDescriptor::delete("/meals/srv-1"));
        let third = queue.enqueue(create("local_1_b"));

        let ids: Vec<String> = queue.get_all().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first, second, third]);
    }

    #[test]
    fn dequeue_removes_and_ignores_missing() {
        let (_, queue) = queue();
        let id = queue.enqueue(create("local_1_a"));

        assert!(queue.dequeue(&id));
        assert!(!queue.dequeue(&id));
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn retry_ceiling_drops_on_fifth_failure() {
        let (_, queue) = queue();
        let id = queue.enqueue(create("local_1_a"));

        for attempt in 1..=4 {
            assert!(queue.increment_retry(&id), "attempt {attempt} should keep");
            assert_eq!(queue.get(&id).unwrap().retry_count, attempt);
        }

        assert!(!queue.increment_retry(&id));
        assert!(queue.get(&id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn increment_retry_on_missing_is_false() {
        let (_, queue) = queue();
        assert!(!queue.increment_retry("nope"));
    }

    #[test]
    fn corrupt_queue_reads_empty() {
        let (store, queue) = queue();
        store.put(QUEUE_KEY, b"[{\"broken\":").unwrap();

        assert!(matches!(queue.load(), Err(StorageError::Corrupted(_))));
        assert!(queue.get_all().is_empty());
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn status_transitions() {
        let (_, queue) = queue();
        let id = queue.enqueue(create("local_1_a"));

        assert!(queue.set_status(&id, MutationStatus::Syncing));
        assert_eq!(queue.get(&id).unwrap().status, MutationStatus::Syncing);

        // a failed attempt puts it back to pending
        assert!(queue.increment_retry(&id));
        assert_eq!(queue.get(&id).unwrap().status, MutationStatus::Pending);

        assert!(!queue.set_status("missing", MutationStatus::Syncing));
    }

    #[test]
    fn find_and_amend_create() {
        let (_, queue) = queue();
        queue.enqueue(MutationDescriptor::delete("/meals/srv-1"));
        let id = queue.enqueue(create("local_1_a"));

        let found = queue.find_create_for("local_1_a").unwrap();
        assert_eq!(found.id, id);
        assert!(queue.find_create_for("local_9_z").is_none());

        assert!(queue.amend_payload(&id, json!({ "title": "Omelette", "localId": "local_1_a" })));
        assert_eq!(queue.get(&id).unwrap().payload["title"], "Omelette");
    }

    #[test]
    fn begin_returns_latest_payload() {
        let (_, queue) = queue();
        let id = queue.enqueue(create("local_1_a"));
        queue.amend_payload(&id, json!({ "title": "Omelette", "localId": "local_1_a" }));

        let started = queue.begin(&id).unwrap();
        assert_eq!(started.status, MutationStatus::Syncing);
        assert_eq!(started.payload["title"], "Omelette");
        assert!(queue.begin("missing").is_none());
    }

    #[test]
    fn take_removes_once() {
        let (_, queue) = queue();
        let id = queue.enqueue(create("local_1_a"));

        assert_eq!(queue.take(&id).unwrap().local_id(), Some("local_1_a"));
        assert!(queue.take(&id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_survives_reopen() {
        let store = Arc::new(InMemoryStore::new());
        let id = MutationQueue::new(store.clone(), 5).enqueue(create("local_1_a"));

        let reopened = MutationQueue::new(store, 5);
        assert_eq!(reopened.get(&id).unwrap().local_id(), Some("local_1_a"));
    }

    #[test]
    fn clear_empties_queue() {
        let (_, queue) = queue();
        queue.enqueue(create("local_1_a"));
        queue.clear();
        assert!(queue.is_empty());
    }
}
