use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// Latest known object per key for one resource kind.
///
/// The owning watch loop is the only writer. Readers get copies: a snapshot is a
/// fresh `Vec` of `Arc`s and stored objects are never mutated in place, so a
/// snapshot handed out earlier cannot change underneath its holder.
#[derive(Debug)]
pub struct TypedStore<K> {
    items: RwLock<HashMap<String, Arc<K>>>,
}

impl<K> Default for TypedStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TypedStore<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    // Every write is a single map operation, so a poisoned lock still guards a
    // consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<K>>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<K>>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the entry for `key`, returning the previous object
    pub fn upsert(&self, key: String, object: Arc<K>) -> Option<Arc<K>> {
        trace!("store upsert: {}", key);
        self.write().insert(key, object)
    }

    /// Remove the entry for `key` if present
    pub fn delete(&self, key: &str) -> Option<Arc<K>> {
        trace!("store delete: {}", key);
        self.write().remove(key)
    }

    /// Swap the whole contents for a fresh listing.
    ///
    /// Returns the objects whose keys are absent from the new listing.
    #[allow(clippy::significant_drop_tightening)]
    pub fn replace(&self, objects: impl IntoIterator<Item = (String, Arc<K>)>) -> Vec<Arc<K>> {
        let fresh: HashMap<String, Arc<K>> = objects.into_iter().collect();
        let mut items = self.write();
        let previous = std::mem::replace(&mut *items, fresh);

        previous
            .into_iter()
            .filter(|(key, _)| !items.contains_key(key))
            .map(|(_, object)| object)
            .collect()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<K>> {
        self.read().get(key).cloned()
    }

    /// Point-in-time copy of every stored object, in no particular order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<K>> {
        self.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
