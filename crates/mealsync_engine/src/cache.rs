//! Durable meal cache.

use chrono::{DateTime, Utc};
use mealsync_protocol::{Meal, MealPatch};
use mealsync_storage::{KeyValueStore, StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Storage key of the cached meal list.
pub const MEALS_CACHE_KEY: &str = "meals.cache";

/// Storage key of the last full refresh time.
pub const MEALS_CACHE_TIMESTAMP_KEY: &str = "meals.cache.timestamp";

/// Persisted set of cached meals.
///
/// Reads go through [`MealCache::load`], which reports unreadable data as
/// [`StorageError::Corrupted`]. Every other operation coerces storage
/// failures into empty-cache behaviour and logs them, so callers never
/// have to handle persistence errors.
///
/// Each read-modify-write runs under an internal lock; concurrent writers
/// cannot drop each other's updates.
pub struct MealCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    lock: Mutex<()>,
}

impl MealCache {
    /// Creates a cache over `store` with the given freshness window.
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            lock: Mutex::new(()),
        }
    }

    /// Reads the persisted meals.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if the stored list does not parse,
    /// or the backend's error if it cannot be read.
    pub fn load(&self) -> StorageResult<Vec<Meal>> {
        match self.store.get(MEALS_CACHE_KEY)? {
            None => Ok(Vec::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(StorageError::corrupted),
        }
    }

    /// Returns all cached meals, or an empty list if the cache is missing
    /// or unreadable.
    pub fn get_all(&self) -> Vec<Meal> {
        self.load_or_empty()
    }

    /// Returns the meal whose server or local id is `identifier`.
    pub fn get(&self, identifier: &str) -> Option<Meal> {
        self.load_or_empty()
            .into_iter()
            .find(|meal| meal.matches(identifier))
    }

    /// Returns the meals not yet confirmed by the server.
    pub fn get_local_only(&self) -> Vec<Meal> {
        self.load_or_empty()
            .into_iter()
            .filter(Meal::is_local)
            .collect()
    }

    /// Replaces the whole cached set and stamps the refresh time.
    pub fn save_all(&self, meals: &[Meal]) {
        let _guard = self.lock.lock();
        self.write_with_timestamp(meals);
    }

    /// Returns true if the last full refresh is younger than the TTL.
    ///
    /// Advisory only: offline reads use the cache regardless.
    pub fn is_fresh(&self) -> bool {
        match self.last_refreshed() {
            Some(at) => {
                let age = Utc::now().signed_duration_since(at);
                age.to_std().map(|age| age < self.ttl).unwrap_or(true)
            }
            None => false,
        }
    }

    /// Returns the time of the last full refresh.
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        let bytes = match self.store.get(MEALS_CACHE_TIMESTAMP_KEY) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(error = %e, "failed to read cache timestamp");
                return None;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        DateTime::parse_from_rfc3339(text.trim())
            .map(|at| at.with_timezone(&Utc))
            .ok()
    }

    /// Inserts a meal, or replaces the entry with the same identity.
    pub fn upsert(&self, meal: Meal) {
        let _guard = self.lock.lock();
        let mut meals = self.load_or_empty();
        upsert_into(&mut meals, meal);
        self.write(&meals);
    }

    /// Upserts several meals at once.
    pub fn upsert_many(&self, incoming: Vec<Meal>) {
        if incoming.is_empty() {
            return;
        }
        let _guard = self.lock.lock();
        let mut meals = self.load_or_empty();
        for meal in incoming {
            upsert_into(&mut meals, meal);
        }
        self.write(&meals);
    }

    /// Replaces the cached copy of `meal` with this one.
    ///
    /// Returns false, leaving the cache untouched, if the meal is no longer
    /// cached.
    pub fn refresh(&self, meal: Meal) -> bool {
        let _guard = self.lock.lock();
        let mut meals = self.load_or_empty();
        let Some(existing) = meals.iter_mut().find(|m| m.identity == meal.identity) else {
            return false;
        };
        *existing = meal;
        self.write(&meals);
        true
    }

    /// Removes the meal whose server or local id is `identifier`.
    ///
    /// Returns true if an entry was removed.
    pub fn remove(&self, identifier: &str) -> bool {
        let _guard = self.lock.lock();
        let mut meals = self.load_or_empty();
        let before = meals.len();
        meals.retain(|meal| !meal.matches(identifier));
        let removed = meals.len() != before;
        if removed {
            self.write(&meals);
        }
        removed
    }

    /// Applies a partial update to the meal named by `identifier`.
    ///
    /// Returns the updated meal, or `None` if it is not cached.
    pub fn patch(&self, identifier: &str, patch: &MealPatch) -> Option<Meal> {
        let _guard = self.lock.lock();
        let mut meals = self.load_or_empty();
        let meal = meals.iter_mut().find(|meal| meal.matches(identifier))?;
        meal.apply_patch(patch, Utc::now());
        let updated = meal.clone();
        self.write(&meals);
        Some(updated)
    }

    /// Replaces the placeholder `local_id` with the server-confirmed meal.
    ///
    /// Any entry already holding the server id (e.g. from a list refresh
    /// that raced the sync) is folded into the same slot. The placeholder
    /// id is not retained anywhere.
    pub fn confirm(&self, local_id: &str, meal: Meal) {
        let _guard = self.lock.lock();
        let mut meals = self.load_or_empty();
        let slot = meals.iter().position(|m| m.matches(local_id));
        let server_id = meal.identity.as_str().to_string();
        meals.retain(|m| !m.matches(local_id) && !m.matches(&server_id));
        let index = slot.unwrap_or(0).min(meals.len());
        meals.insert(index, meal);
        self.write(&meals);
        debug!(local_id, server_id = %server_id, "placeholder confirmed");
    }

    /// Replaces every confirmed meal with `remote`, keeping unsynced ones.
    ///
    /// Unsynced meals stay in front, followed by the server's list.
    pub fn merge_remote(&self, remote: Vec<Meal>) {
        let _guard = self.lock.lock();
        let mut merged: Vec<Meal> = self
            .load_or_empty()
            .into_iter()
            .filter(Meal::is_local)
            .collect();
        merged.extend(remote.into_iter().filter(|meal| !meal.is_local()));
        self.write_with_timestamp(&merged);
    }

    /// Drops all cached meals and the refresh time.
    pub fn clear(&self) {
        let _guard = self.lock.lock();
        for key in [MEALS_CACHE_KEY, MEALS_CACHE_TIMESTAMP_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "failed to clear cache entry");
            }
        }
    }

    fn load_or_empty(&self) -> Vec<Meal> {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, "meal cache unreadable, treating as empty");
            Vec::new()
        })
    }

    fn write(&self, meals: &[Meal]) {
        if let Err(e) = self.try_write(meals) {
            warn!(error = %e, count = meals.len(), "failed to persist meal cache");
        }
    }

    fn write_with_timestamp(&self, meals: &[Meal]) {
        let result = self.try_write(meals).and_then(|()| {
            self.store.put(
                MEALS_CACHE_TIMESTAMP_KEY,
                Utc::now().to_rfc3339().as_bytes(),
            )
        });
        if let Err(e) = result {
            warn!(error = %e, count = meals.len(), "failed to persist meal cache");
        }
    }

    fn try_write(&self, meals: &[Meal]) -> StorageResult<()> {
        let bytes = serde_json::to_vec(meals).map_err(StorageError::corrupted)?;
        self.store.put(MEALS_CACHE_KEY, &bytes)
    }
}

fn upsert_into(meals: &mut Vec<Meal>, meal: Meal) {
    match meals
        .iter_mut()
        .find(|existing| existing.identity == meal.identity)
    {
        Some(existing) => *existing = meal,
        None => meals.insert(0, meal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mealsync_protocol::{MealDraft, RecordIdentity, RemoteMeal};
    use mealsync_storage::InMemoryStore;

    fn store() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::new())
    }

    fn cache_over(store: &Arc<InMemoryStore>) -> MealCache {
        MealCache::new(store.clone(), Duration::from_secs(24 * 60 * 60))
    }

    fn local(local_id: &str, title: &str) -> Meal {
        let draft = MealDraft::new(title, "lunch", Utc::now(), 500.0);
        Meal::pending(local_id, &draft, Utc::now())
    }

    fn remote(id: &str, title: &str) -> Meal {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 12, 0, 0).unwrap();
        Meal::from(RemoteMeal {
            id: id.into(),
            title: title.into(),
            category: "dinner".into(),
            date: at,
            calories: 700.0,
            image_url: None,
            created_at: at,
            updated_at: at,
        })
    }

    #[test]
    fn refresh_only_replaces_cached_meals() {
        let store = store();
        let cache = cache_over(&store);
        cache.upsert(remote("a", "Pasta"));

        assert!(cache.refresh(remote("a", "Pesto pasta")));
        assert_eq!(cache.get("a").unwrap().title, "Pesto pasta");

        assert!(!cache.refresh(remote("b", "Risotto")));
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn empty_cache_reads_empty() {
        let store = store();
        let cache = cache_over(&store);
        assert!(cache.get_all().is_empty());
        assert!(!cache.is_fresh());
    }

    #[test]
    fn save_all_stamps_freshness() {
        let store = store();
        let cache = cache_over(&store);

        cache.save_all(&[remote("a", "Pasta")]);
        assert!(cache.is_fresh());
        assert_eq!(cache.get_all().len(), 1);
    }

    #[test]
    fn stale_timestamp_is_not_fresh() {
        let store = store();
        let stale = (Utc::now() - chrono::Duration::hours(25)).to_rfc3339();
        store
            .put(MEALS_CACHE_TIMESTAMP_KEY, stale.as_bytes())
            .unwrap();

        let cache = cache_over(&store);
        assert!(!cache.is_fresh());
    }

    #[test]
    fn corrupt_cache_degrades_to_empty() {
        let store = store();
        store.put(MEALS_CACHE_KEY, b"{not json").unwrap();

        let cache = cache_over(&store);
        assert!(matches!(cache.load(), Err(StorageError::Corrupted(_))));
        assert!(cache.get_all().is_empty());

        // a write recovers the cache
        cache.upsert(remote("a", "Pasta"));
        assert_eq!(cache.get_all().len(), 1);
    }

    #[test]
    fn failing_store_is_absorbed() {
        let store = store();
        let cache = cache_over(&store);
        store.set_failing(true);

        cache.upsert(remote("a", "Pasta"));
        assert!(cache.get_all().is_empty());
        assert!(!cache.remove("a"));
        assert!(!cache.is_fresh());
    }

    #[test]
    fn upsert_replaces_same_identity() {
        let store = store();
        let cache = cache_over(&store);

        cache.upsert(remote("a", "Pasta"));
        cache.upsert(remote("a", "Pasta carbonara"));

        let all = cache.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Pasta carbonara");
    }

    #[test]
    fn remove_matches_either_id() {
        let store = store();
        let cache = cache_over(&store);
        cache.upsert(remote("srv-1", "Pasta"));
        cache.upsert(local("local_1_a", "Toast"));

        assert!(cache.remove("local_1_a"));
        assert!(cache.remove("srv-1"));
        assert!(!cache.remove("srv-1"));
        assert!(cache.get_all().is_empty());
    }

    #[test]
    fn patch_updates_fields() {
        let store = store();
        let cache = cache_over(&store);
        cache.upsert(local("local_1_a", "Toast"));

        let patch = MealPatch {
            title: Some("French toast".into()),
            ..MealPatch::default()
        };
        let updated = cache.patch("local_1_a", &patch).unwrap();
        assert_eq!(updated.title, "French toast");
        assert_eq!(cache.get("local_1_a").unwrap().title, "French toast");
        assert!(cache.patch("missing", &patch).is_none());
    }

    #[test]
    fn local_only_filter() {
        let store = store();
        let cache = cache_over(&store);
        cache.upsert(remote("srv-1", "Pasta"));
        cache.upsert(local("local_1_a", "Toast"));

        let local = cache.get_local_only();
        assert_eq!(local.len(), 1);
        assert!(local[0].is_local());
    }

    #[test]
    fn confirm_replaces_placeholder() {
        let store = store();
        let cache = cache_over(&store);
        cache.upsert(local("local_1_a", "Toast"));
        cache.upsert(remote("srv-9", "Other"));

        cache.confirm("local_1_a", remote("srv-1", "Toast"));

        let all = cache.get_all();
        assert_eq!(all.len(), 2);
        assert!(cache.get("local_1_a").is_none());
        let confirmed = cache.get("srv-1").unwrap();
        assert!(!confirmed.is_local());
        assert_eq!(confirmed.identity, RecordIdentity::Confirmed("srv-1".into()));
    }

    #[test]
    fn confirm_folds_duplicate_server_entry() {
        let store = store();
        let cache = cache_over(&store);
        cache.upsert(local("local_1_a", "Toast"));
        cache.upsert(remote("srv-1", "Toast"));

        cache.confirm("local_1_a", remote("srv-1", "Toast"));

        let all = cache.get_all();
        assert_eq!(all.len(), 1);
        assert!(all.iter().all(|m| m.matches("srv-1")));
    }

    #[test]
    fn merge_preserves_local_entries() {
        let store = store();
        let cache = cache_over(&store);
        cache.upsert(remote("srv-old", "Old"));
        cache.upsert(local("local_1_a", "Unsynced"));

        cache.merge_remote(vec![remote("srv-new-1", "New 1"), remote("srv-new-2", "New 2")]);

        let all = cache.get_all();
        assert_eq!(all.len(), 3);
        assert!(cache.get("srv-old").is_none());
        assert!(cache.get("local_1_a").unwrap().is_local());
        assert!(cache.get("srv-new-1").is_some());
        assert!(cache.get("srv-new-2").is_some());
        assert!(cache.is_fresh());
    }

    #[test]
    fn clear_removes_everything() {
        let store = store();
        let cache = cache_over(&store);
        cache.save_all(&[remote("a", "Pasta")]);

        cache.clear();
        assert!(cache.get_all().is_empty());
        assert!(cache.last_refreshed().is_none());
    }
}
