use tokio::sync::Mutex;
use tracing::{debug, error, info};

use icn_config::DatastoreConfig;
use icn_storage::{
    AbsoluteTime, Backend, BlockType, DatastorePlugin, Datum, HashCode, PluginEnvironment,
    PutRequest, PutStatus, QuotaManager, Retain, StorageError, StorageResult, Uid, UsageStats,
};

use crate::DatastoreResult;

/// The datastore service a node programs against.
///
/// Owns exactly one backend; every operation takes the backend lock, so the
/// backend sees one call at a time.
pub struct Datastore {
    backend: Mutex<Backend>,
    quota: QuotaManager,
}

impl Datastore {
    /// Load the backend named in `config`
    pub fn load(config: DatastoreConfig) -> DatastoreResult<Self> {
        config.validate().map_err(|e| {
            error!("Invalid datastore configuration: {}", e);
            e
        })?;
        let quota = QuotaManager::new(config.quota);
        let quota_bytes = config.quota;
        let env = PluginEnvironment::new(config, quota.notifier());
        let backend = Backend::load(env).map_err(|e| {
            error!("Could not initialize datastore: {}", e);
            e
        })?;
        info!(backend = backend.name(), quota = quota_bytes, "Datastore ready");
        Ok(Self {
            backend: Mutex::new(backend),
            quota,
        })
    }

    pub async fn backend_name(&self) -> &'static str {
        self.backend.lock().await.name()
    }

    pub async fn put(&self, request: PutRequest<'_>) -> DatastoreResult<PutStatus> {
        let mut outcome = None;
        self.backend
            .lock()
            .await
            .put(request, |_, _, status| outcome = Some(status));
        Ok(finish(outcome)?)
    }

    /// Select by key, value hash and type; `retain` decides whether the value stays
    pub async fn get_key<F>(
        &self,
        cursor: Uid,
        random: bool,
        key: Option<&HashCode>,
        value_hash: Option<&HashCode>,
        block_type: BlockType,
        retain: F,
    ) -> Option<Datum>
    where
        F: FnOnce(&Datum) -> Retain + Send,
    {
        let mut selected = None;
        self.backend.lock().await.get_by_key(
            cursor,
            random,
            key,
            value_hash,
            block_type,
            capture(&mut selected, retain),
        );
        selected
    }

    pub async fn get_replication<F>(&self, retain: F) -> Option<Datum>
    where
        F: FnOnce(&Datum) -> Retain + Send,
    {
        let mut selected = None;
        self.backend
            .lock()
            .await
            .get_for_replication(capture(&mut selected, retain));
        selected
    }

    pub async fn get_expiration<F>(&self, retain: F) -> Option<Datum>
    where
        F: FnOnce(&Datum) -> Retain + Send,
    {
        let mut selected = None;
        self.backend
            .lock()
            .await
            .get_for_expiration(capture(&mut selected, retain));
        selected
    }

    pub async fn get_zero_anonymity<F>(
        &self,
        cursor: Uid,
        block_type: BlockType,
        retain: F,
    ) -> Option<Datum>
    where
        F: FnOnce(&Datum) -> Retain + Send,
    {
        let mut selected = None;
        self.backend
            .lock()
            .await
            .get_zero_anonymity(cursor, block_type, capture(&mut selected, retain));
        selected
    }

    pub async fn update(&self, uid: Uid, delta: u32, expire: AbsoluteTime) -> DatastoreResult<()> {
        let mut outcome = None;
        self.backend
            .lock()
            .await
            .update(uid, delta, expire, |result| outcome = Some(result));
        Ok(finish(outcome)?)
    }

    /// Delete one value under `key` whose payload equals `data`
    pub async fn remove_key(&self, key: &HashCode, data: &[u8]) -> DatastoreResult<()> {
        let size = u32::try_from(data.len()).map_err(|_| StorageError::NotFound)?;
        let mut outcome = None;
        self.backend
            .lock()
            .await
            .remove_key(key, size, data, |_, _, result| outcome = Some(result));
        Ok(finish(outcome)?)
    }

    /// Delete the value matching key, payload and type
    pub async fn remove(
        &self,
        key: &HashCode,
        data: &[u8],
        block_type: BlockType,
    ) -> DatastoreResult<()> {
        let value_hash = HashCode::of(data);
        let mut found = false;
        self.backend.lock().await.get_by_key(
            0,
            false,
            Some(key),
            Some(&value_hash),
            block_type,
            |datum| {
                found = datum.is_some();
                Retain::Remove
            },
        );
        if found {
            debug!(key = %key, "Removed value");
            Ok(())
        } else {
            Err(StorageError::NotFound.into())
        }
    }

    /// Every distinct key with the number of values stored under it
    pub async fn keys(&self) -> Vec<(HashCode, u32)> {
        let mut keys = Vec::new();
        self.backend.lock().await.enumerate_keys(|entry| {
            if let Some((key, count)) = entry {
                keys.push((*key, count));
            }
        });
        keys
    }

    pub async fn estimate_size(&self) -> u64 {
        self.backend.lock().await.estimate_size()
    }

    pub async fn drop_all(&self) {
        self.backend.lock().await.drop_all();
        info!("Datastore dropped");
    }

    /// Byte accounting as reported by the backend
    pub fn usage(&self) -> UsageStats {
        self.quota.usage()
    }

    /// Fraction of the configured quota in use
    pub fn utilization(&self) -> f64 {
        self.quota.utilization()
    }
}

/// Adapt a retain predicate into a processor that also copies the value out
fn capture<'a, F>(
    slot: &'a mut Option<Datum>,
    retain: F,
) -> impl FnOnce(Option<&Datum>) -> Retain + 'a
where
    F: FnOnce(&Datum) -> Retain + 'a,
{
    move |datum: Option<&Datum>| match datum {
        Some(datum) => {
            *slot = Some(datum.clone());
            retain(datum)
        }
        None => Retain::Keep,
    }
}

fn finish<T>(outcome: Option<StorageResult<T>>) -> StorageResult<T> {
    outcome.unwrap_or_else(|| {
        Err(StorageError::Other("backend did not report a result".to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatastoreError;
    use icn_config::ConfigError;

    fn heap_store() -> Datastore {
        let mut config = DatastoreConfig::with_database("heap");
        config.quota = 1_000;
        Datastore::load(config).unwrap()
    }

    #[tokio::test]
    async fn test_load_requires_known_backend() {
        let missing = Datastore::load(DatastoreConfig::default());
        assert!(matches!(
            missing,
            Err(DatastoreError::Config(ConfigError::MissingBackend))
        ));

        let unknown = Datastore::load(DatastoreConfig::with_database("postgres"));
        assert!(matches!(
            unknown,
            Err(DatastoreError::Config(ConfigError::UnsupportedBackend(_)))
        ));

        assert_eq!(heap_store().backend_name().await, "heap");
    }

    #[tokio::test]
    async fn test_load_rejects_zero_quota() {
        let mut config = DatastoreConfig::with_database("heap");
        config.quota = 0;
        let result = Datastore::load(config);
        assert!(matches!(
            result,
            Err(DatastoreError::Config(ConfigError::InvalidValue(_)))
        ));
    }

    #[tokio::test]
    async fn test_put_get_and_usage() {
        let store = heap_store();
        let key = HashCode::of(b"key");
        let status = store
            .put(PutRequest::new(key, b"payload", BlockType(1)).anonymity(1))
            .await
            .unwrap();
        assert!(matches!(status, PutStatus::Stored(_)));

        let datum = store
            .get_key(0, false, Some(&key), None, BlockType::ANY, |_| Retain::Keep)
            .await
            .unwrap();
        assert_eq!(datum.data, b"payload");
        assert_eq!(datum.uid, status.uid());

        assert_eq!(store.estimate_size().await, 7);
        assert_eq!(store.usage().total_size_bytes, 7);
        assert!((store.utilization() - 0.007).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_put_rejection_is_storage_error() {
        let store = heap_store();
        let result = store.put(PutRequest::new(HashCode::of(b"k"), b"x", BlockType::ANY)).await;
        assert!(matches!(result, Err(DatastoreError::Storage(StorageError::InvalidType(_)))));
    }

    #[tokio::test]
    async fn test_retain_predicate_removes() {
        let store = heap_store();
        let key = HashCode::of(b"k");
        store.put(PutRequest::new(key, b"gone", BlockType(2))).await.unwrap();

        let taken = store.get_expiration(|_| Retain::Remove).await;
        assert!(taken.is_some());
        assert!(store.get_expiration(|_| Retain::Keep).await.is_none());
        assert_eq!(store.usage().total_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_remove_by_value() {
        let store = heap_store();
        let key = HashCode::of(b"k");
        store.put(PutRequest::new(key, b"one", BlockType(3))).await.unwrap();
        store.put(PutRequest::new(key, b"two", BlockType(3))).await.unwrap();

        assert!(matches!(
            store.remove(&key, b"one", BlockType(4)).await,
            Err(DatastoreError::Storage(StorageError::NotFound))
        ));
        store.remove(&key, b"one", BlockType(3)).await.unwrap();
        assert_eq!(store.keys().await, vec![(key, 1)]);

        store.remove_key(&key, b"two").await.unwrap();
        assert!(store.keys().await.is_empty());
        assert!(store.remove_key(&key, b"two").await.is_err());
    }

    #[tokio::test]
    async fn test_update_unknown_uid() {
        let store = heap_store();
        let result = store.update(99, 1, AbsoluteTime::FOREVER).await;
        assert!(matches!(result, Err(DatastoreError::Storage(StorageError::UnknownUid(99)))));
    }

    #[tokio::test]
    async fn test_drop_all_resets_usage() {
        let store = heap_store();
        store
            .put(PutRequest::new(HashCode::of(b"a"), b"abc", BlockType(1)))
            .await
            .unwrap();
        store.drop_all().await;
        assert_eq!(store.estimate_size().await, 0);
        assert_eq!(store.usage().total_size_bytes, 0);
        assert_eq!(store.usage().peak_size_bytes, 3);
    }
}
