//! Response store
//!
//! Keeps a bounded, per-user history of the replies the bot has sent so that
//! later button presses and commands can act on them. Two backends exist:
//! Cloudflare R2 / AWS S3 (one JSON document per user) and an in-memory map.

use crate::config::Settings;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error retrieving object from S3
    #[error("S3 Get error: {0}")]
    S3Get(Box<SdkError<GetObjectError>>),
    /// Error putting object into S3
    #[error("S3 put error: {0}")]
    S3Put(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error (missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// One stored bot reply
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ResponseEntry {
    /// Owner of the reply
    pub user_id: i64,
    /// Identifier carried in callback payloads
    pub response_id: i64,
    /// Reply body
    pub text: String,
    /// Language tag the reply is expressed in
    pub lang: String,
}

/// Interface for response store backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Stores a reply and returns its identifier, evicting the oldest entry
    /// when the user's partition is full
    async fn put(&self, user_id: i64, text: String, lang: String) -> Result<i64, StorageError>;
    /// Looks up a reply by identifier; `None` is a normal outcome
    async fn get_by_id(
        &self,
        user_id: i64,
        response_id: i64,
    ) -> Result<Option<ResponseEntry>, StorageError>;
    /// Returns the most recently stored reply for the user
    async fn get_latest(&self, user_id: i64) -> Result<Option<ResponseEntry>, StorageError>;
    /// Check connection to storage
    async fn check_connection(&self) -> Result<(), String>;
}

/// The stored replies of a single user, ordered by identifier
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct ResponsePartition {
    entries: Vec<ResponseEntry>,
}

impl ResponsePartition {
    /// Inserts a reply and trims the partition to `limit` entries.
    ///
    /// Identifiers are unix seconds, bumped past the newest stored id so two
    /// replies within the same second never share one.
    pub fn insert(
        &mut self,
        user_id: i64,
        now_secs: i64,
        text: String,
        lang: String,
        limit: usize,
    ) -> i64 {
        let response_id = self
            .entries
            .iter()
            .map(|e| e.response_id)
            .max()
            .map_or(now_secs, |last| now_secs.max(last + 1));

        self.entries.push(ResponseEntry {
            user_id,
            response_id,
            text,
            lang,
        });
        self.entries.sort_by_key(|e| e.response_id);

        let overflow = self.entries.len().saturating_sub(limit.max(1));
        if overflow > 0 {
            let evicted: Vec<i64> = self
                .entries
                .drain(..overflow)
                .map(|e| e.response_id)
                .collect();
            debug!(user_id, ?evicted, "Evicted oldest stored responses");
        }

        response_id
    }

    /// Returns the entry with the given identifier
    #[must_use]
    pub fn get(&self, response_id: i64) -> Option<&ResponseEntry> {
        self.entries.iter().find(|e| e.response_id == response_id)
    }

    /// Returns the newest entry
    #[must_use]
    pub fn latest(&self) -> Option<&ResponseEntry> {
        self.entries.iter().max_by_key(|e| e.response_id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<i64> {
        self.entries.iter().map(|e| e.response_id).collect()
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Per-user write locks so each partition has a single writer at a time
#[derive(Clone)]
pub struct UserLocks {
    locks: Cache<i64, Arc<Mutex<()>>>,
}

impl UserLocks {
    /// Creates a lock table holding at most `max_capacity` idle locks
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            locks: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_idle(std::time::Duration::from_secs(3600))
                .build(),
        }
    }

    /// Returns the lock guarding `user_id`'s partition
    pub async fn get(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .get_with(user_id, async { Arc::new(Mutex::new(())) })
            .await
    }
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// Process-local response store
pub struct InMemoryResponseStore {
    partitions: RwLock<HashMap<i64, ResponsePartition>>,
    limit: usize,
}

impl InMemoryResponseStore {
    /// Creates an empty store keeping `limit` responses per user
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            limit,
        }
    }

    #[cfg(test)]
    pub(crate) async fn count(&self, user_id: i64) -> usize {
        self.partitions
            .read()
            .await
            .get(&user_id)
            .map_or(0, ResponsePartition::len)
    }
}

#[async_trait]
impl ResponseStore for InMemoryResponseStore {
    async fn put(&self, user_id: i64, text: String, lang: String) -> Result<i64, StorageError> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(user_id).or_default();
        Ok(partition.insert(user_id, now_secs(), text, lang, self.limit))
    }

    async fn get_by_id(
        &self,
        user_id: i64,
        response_id: i64,
    ) -> Result<Option<ResponseEntry>, StorageError> {
        Ok(self
            .partitions
            .read()
            .await
            .get(&user_id)
            .and_then(|p| p.get(response_id))
            .cloned())
    }

    async fn get_latest(&self, user_id: i64) -> Result<Option<ResponseEntry>, StorageError> {
        Ok(self
            .partitions
            .read()
            .await
            .get(&user_id)
            .and_then(ResponsePartition::latest)
            .cloned())
    }

    async fn check_connection(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Response store backed by Cloudflare R2 / AWS S3
pub struct R2Storage {
    client: Client,
    bucket: String,
    locks: UserLocks,
    limit: usize,
}

impl R2Storage {
    /// Create a new R2 storage instance
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &Settings) -> Result<Self, StorageError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-storage");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.clone(),
            locks: UserLocks::default(),
            limit: settings.response_history_limit,
        })
    }

    /// Save data as JSON to R2
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization or S3 upload fails.
    pub async fn save_json<T: Serialize + Sync>(
        &self,
        key: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(data)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body.into_bytes()))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        Ok(())
    }

    /// Load data from JSON in R2
    ///
    /// # Errors
    ///
    /// Returns an error if S3 download or JSON deserialization fails.
    pub async fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
                let json_data = serde_json::from_slice(&data.into_bytes())?;
                Ok(Some(json_data))
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => Ok(None),
            Err(e) => Err(StorageError::S3Get(Box::new(e))),
        }
    }

    async fn load_partition(&self, user_id: i64) -> Result<ResponsePartition, StorageError> {
        Ok(self
            .load_json(&user_responses_key(user_id))
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl ResponseStore for R2Storage {
    async fn put(&self, user_id: i64, text: String, lang: String) -> Result<i64, StorageError> {
        let lock = self.locks.get(user_id).await;
        let _guard = lock.lock().await;

        let mut partition = self.load_partition(user_id).await?;
        let response_id = partition.insert(user_id, now_secs(), text, lang, self.limit);
        self.save_json(&user_responses_key(user_id), &partition)
            .await?;
        Ok(response_id)
    }

    async fn get_by_id(
        &self,
        user_id: i64,
        response_id: i64,
    ) -> Result<Option<ResponseEntry>, StorageError> {
        let partition = self.load_partition(user_id).await?;
        Ok(partition.get(response_id).cloned())
    }

    async fn get_latest(&self, user_id: i64) -> Result<Option<ResponseEntry>, StorageError> {
        let partition = self.load_partition(user_id).await?;
        Ok(partition.latest().cloned())
    }

    async fn check_connection(&self) -> Result<(), String> {
        match self.client.list_buckets().send().await {
            Ok(_) => {
                info!("Successfully connected to R2 storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}

/// Object key of a user's response partition
#[must_use]
pub fn user_responses_key(user_id: i64) -> String {
    format!("users/{user_id}/responses.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(partition: &mut ResponsePartition, count: i64, start: i64) {
        for i in 0..count {
            partition.insert(7, start + i, format!("reply {i}"), "en".to_string(), 20);
        }
    }

    #[test]
    fn test_partition_keeps_twenty_newest() {
        let mut partition = ResponsePartition::default();
        fill(&mut partition, 25, 1_000);

        assert_eq!(partition.len(), 20);
        let expected: Vec<i64> = (1_005..1_025).collect();
        assert_eq!(partition.ids(), expected);
    }

    #[test]
    fn test_evicted_id_is_not_found() {
        let mut partition = ResponsePartition::default();
        fill(&mut partition, 21, 1_000);

        assert!(partition.get(1_000).is_none());
        assert_eq!(
            partition.get(1_001).map(|e| e.text.as_str()),
            Some("reply 1")
        );
    }

    #[test]
    fn test_same_second_ids_do_not_collide() {
        let mut partition = ResponsePartition::default();
        let first = partition.insert(1, 500, "a".into(), "en".into(), 20);
        let second = partition.insert(1, 500, "b".into(), "en".into(), 20);
        let third = partition.insert(1, 499, "c".into(), "en".into(), 20);

        assert_eq!(first, 500);
        assert_eq!(second, 501);
        assert_eq!(third, 502);
        assert_eq!(partition.latest().map(|e| e.text.as_str()), Some("c"));
    }

    #[test]
    fn test_partition_json_layout() -> Result<(), Box<dyn std::error::Error>> {
        let mut partition = ResponsePartition::default();
        partition.insert(3, 10, "hola".into(), "es".into(), 20);

        let json = serde_json::to_value(&partition)?;
        assert_eq!(json["entries"][0]["response_id"], 10);
        assert_eq!(json["entries"][0]["lang"], "es");

        let back: ResponsePartition = serde_json::from_value(json)?;
        assert_eq!(back.get(10).map(|e| e.user_id), Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_store_bounds_each_user() -> Result<(), StorageError> {
        let store = InMemoryResponseStore::new(20);
        let mut ids = Vec::new();
        for i in 0..30 {
            ids.push(store.put(1, format!("u1 {i}"), "en".into()).await?);
        }
        store.put(2, "u2".into(), "fr".into()).await?;

        assert_eq!(store.count(1).await, 20);
        assert_eq!(store.count(2).await, 1);
        assert!(store.get_by_id(1, ids[9]).await?.is_none());
        assert!(store.get_by_id(1, ids[10]).await?.is_some());
        assert!(store.get_by_id(2, ids[29]).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_latest_follows_last_put() -> Result<(), StorageError> {
        let store = InMemoryResponseStore::new(20);
        assert!(store.get_latest(5).await?.is_none());

        store.put(5, "first".into(), "en".into()).await?;
        let id = store.put(5, "second".into(), "de".into()).await?;

        let latest = store.get_latest(5).await?;
        assert_eq!(latest.as_ref().map(|e| e.response_id), Some(id));
        assert_eq!(latest.map(|e| e.lang), Some("de".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_puts_respect_bound() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(InMemoryResponseStore::new(20));
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(9, format!("r{i}"), "en".into()).await
            }));
        }
        for handle in handles {
            handle.await??;
        }
        assert_eq!(store.count(9).await, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_user_locks_are_shared_per_user() {
        let locks = UserLocks::new(100);
        let a = locks.get(1).await;
        let b = locks.get(1).await;
        let c = locks.get(2).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_user_responses_key() {
        assert_eq!(user_responses_key(42), "users/42/responses.json");
    }
}
