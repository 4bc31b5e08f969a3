//! The key-value store contract and an in-memory implementation.
//!
//! The node treats its backing store as an external collaborator; this
//! module fixes the interface it relies on. `MemKvStore` backs tests and
//! local clusters.

use {
    crate::error::{RegistryError, Result},
    parking_lot::RwLock,
    std::collections::BTreeMap,
};

/// The store contract the committee node persists through.
///
/// Implementations must be safe for concurrent use; the node reads from
/// the boot path and writes from the state-manager thread.
pub trait KvStore: Send + Sync {
    /// Fetch the value for a key, `None` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store a value under a key, overwriting any previous value.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// True iff the key is present.
    fn has(&self, key: &[u8]) -> Result<bool>;

    /// Store several key/value pairs atomically.
    fn set_multi(&self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()>;

    /// Visit every record whose key starts with `prefix`, in key order.
    /// The callback returns `false` to stop the iteration early.
    fn iterate_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()>;
}

/// In-memory [`KvStore`] for tests and local clusters.
#[derive(Default)]
pub struct MemKvStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl KvStore for MemKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.map.read().contains_key(key))
    }

    fn set_multi(&self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        let mut map = self.map.write();
        for (key, value) in pairs {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn iterate_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        let map = self.map.read();
        for (key, value) in map.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if !f(key, value) {
                break;
            }
        }
        Ok(())
    }
}

/// Fetch a required record, mapping absence to [`RegistryError::NotFound`].
pub fn must_get(store: &dyn KvStore, key: &[u8]) -> Result<Vec<u8>> {
    store.get(key)?.ok_or(RegistryError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_has() {
        let store = MemKvStore::new();
        assert!(!store.has(b"k").unwrap());
        store.set(b"k", b"v").unwrap();
        assert!(store.has(b"k").unwrap());
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_set_multi() {
        let store = MemKvStore::new();
        store
            .set_multi(&[
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_iterate_prefix_ordered_and_bounded() {
        let store = MemKvStore::new();
        store.set(b"\x01x", b"1").unwrap();
        store.set(b"\x02a", b"2").unwrap();
        store.set(b"\x02b", b"3").unwrap();
        store.set(b"\x03z", b"4").unwrap();

        let mut seen = Vec::new();
        store
            .iterate_prefix(b"\x02", &mut |key, _| {
                seen.push(key.to_vec());
                true
            })
            .unwrap();
        assert_eq!(seen, vec![b"\x02a".to_vec(), b"\x02b".to_vec()]);
    }

    #[test]
    fn test_iterate_prefix_early_stop() {
        let store = MemKvStore::new();
        store.set(b"\x02a", b"1").unwrap();
        store.set(b"\x02b", b"2").unwrap();

        let mut count = 0;
        store
            .iterate_prefix(b"\x02", &mut |_, _| {
                count += 1;
                false
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_must_get_not_found() {
        let store = MemKvStore::new();
        assert!(matches!(
            must_get(&store, b"missing"),
            Err(RegistryError::NotFound)
        ));
    }
}
