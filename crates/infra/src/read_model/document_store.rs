use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::StoreError;

/// Predicate used by [`DocumentStore::query`].
pub type DocumentFilter<'a, V> = &'a (dyn Fn(&V) -> bool + Send + Sync);

/// Keyed document store for disposable read models.
///
/// Every write is an idempotent upsert or delete so projections can be re-run
/// over the same events.
#[async_trait]
pub trait DocumentStore<K, V>: Send + Sync {
    async fn get(&self, key: &K) -> Result<Option<V>, StoreError>;

    async fn upsert(&self, key: K, value: V) -> Result<(), StoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, key: &K) -> Result<bool, StoreError>;

    /// All documents, in key order.
    async fn list(&self) -> Result<Vec<V>, StoreError>;

    /// Documents matching `filter`, in key order.
    async fn query(&self, filter: DocumentFilter<'_, V>) -> Result<Vec<V>, StoreError>;

    /// Drop every document (rebuild support).
    async fn clear(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<K, V, S> DocumentStore<K, V> for Arc<S>
where
    S: DocumentStore<K, V> + ?Sized,
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        (**self).get(key).await
    }

    async fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        (**self).upsert(key, value).await
    }

    async fn delete(&self, key: &K) -> Result<bool, StoreError> {
        (**self).delete(key).await
    }

    async fn list(&self) -> Result<Vec<V>, StoreError> {
        (**self).list().await
    }

    async fn query(&self, filter: DocumentFilter<'_, V>) -> Result<Vec<V>, StoreError> {
        (**self).query(filter).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }
}

/// In-memory document store for tests/dev.
#[derive(Debug)]
pub struct InMemoryDocumentStore<K, V> {
    inner: RwLock<BTreeMap<K, V>>,
}

impl<K, V> InMemoryDocumentStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryDocumentStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> DocumentStore<K, V> for InMemoryDocumentStore<K, V>
where
    K: Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    async fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        map.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<bool, StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        Ok(map.remove(key).is_some())
    }

    async fn list(&self) -> Result<Vec<V>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.values().cloned().collect())
    }

    async fn query(&self, filter: DocumentFilter<'_, V>) -> Result<Vec<V>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.values().filter(|v| filter(v)).cloned().collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        map.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_replaces_and_delete_is_idempotent() {
        let store = InMemoryDocumentStore::<u32, String>::new();
        store.upsert(1, "a".to_string()).await.unwrap();
        store.upsert(1, "b".to_string()).await.unwrap();
        assert_eq!(store.get(&1).await.unwrap().as_deref(), Some("b"));

        assert!(store.delete(&1).await.unwrap());
        assert!(!store.delete(&1).await.unwrap());
        assert_eq!(store.get(&1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_and_query_follow_key_order() {
        let store = InMemoryDocumentStore::<u32, String>::new();
        for (k, v) in [(3, "gamma"), (1, "alpha"), (2, "beta")] {
            store.upsert(k, v.to_string()).await.unwrap();
        }

        assert_eq!(store.list().await.unwrap(), vec!["alpha", "beta", "gamma"]);

        let with_a = store.query(&|v: &String| v.ends_with('a')).await.unwrap();
        assert_eq!(with_a, vec!["alpha", "beta", "gamma"]);

        let with_l = store.query(&|v: &String| v.contains('l')).await.unwrap();
        assert_eq!(with_l, vec!["alpha"]);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let store: Arc<dyn DocumentStore<u32, String>> = Arc::new(InMemoryDocumentStore::new());
        store.upsert(1, "a".to_string()).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
