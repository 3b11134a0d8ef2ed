// Session persistence - in-process cache backed by one JSON document per session
use super::state::{NewSession, SessionRecord, SessionUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed store of session records.
///
/// `update` and `append_upload` return `Ok(false)` for an unknown id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, new: NewSession) -> Result<String, StoreError>;
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;
    async fn update(&self, session_id: &str, update: SessionUpdate) -> Result<bool, StoreError>;
    async fn append_upload(
        &self,
        session_id: &str,
        video_path: PathBuf,
        frame_path: PathBuf,
    ) -> Result<bool, StoreError>;
    async fn is_complete(&self, session_id: &str) -> Result<bool, StoreError>;
    async fn remove(&self, session_id: &str) -> Result<bool, StoreError>;
}

/// Cache in front of `<sessions_dir>/<id>.json` files.
///
/// Mutations run under the cache's write lock, and each document is replaced
/// through a temporary file and rename. The credential never reaches disk.
pub struct FileSessionStore {
    sessions_dir: PathBuf,
    cache: RwLock<HashMap<String, SessionRecord>>,
}

impl FileSessionStore {
    pub async fn new(sessions_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let sessions_dir = sessions_dir.into();
        tokio::fs::create_dir_all(&sessions_dir).await?;
        info!("Session store ready at {}", sessions_dir.display());
        Ok(Self {
            sessions_dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", session_id))
    }

    async fn persist(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.session_id);
        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp_path, body).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        if !is_session_id(session_id) {
            return Ok(None);
        }
        let path = self.record_path(session_id);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<SessionRecord>(&body) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                error!("Failed to load session {}: {}", session_id, e);
                Ok(None)
            }
        }
    }

    /// Run `mutate` against the cached (or freshly loaded) record and persist it.
    async fn mutate<F>(&self, session_id: &str, mutate: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut SessionRecord) + Send,
    {
        let mut cache = self.cache.write().await;
        if !cache.contains_key(session_id) {
            match self.load(session_id).await? {
                Some(record) => {
                    cache.insert(session_id.to_string(), record);
                }
                None => return Ok(false),
            }
        }

        let Some(record) = cache.get_mut(session_id) else {
            return Ok(false);
        };
        let mut updated = record.clone();
        mutate(&mut updated);
        self.persist(&updated).await?;
        *record = updated;
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, new: NewSession) -> Result<String, StoreError> {
        let session_id = Uuid::new_v4().to_string();
        let prompt_count = new.prompts.len();
        let record = SessionRecord::new(session_id.clone(), new);

        let mut cache = self.cache.write().await;
        self.persist(&record).await?;
        cache.insert(session_id.clone(), record);

        info!("Created session {} with {} prompts", session_id, prompt_count);
        Ok(session_id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        if let Some(record) = self.cache.read().await.get(session_id) {
            return Ok(Some(record.clone()));
        }

        let mut cache = self.cache.write().await;
        if let Some(record) = cache.get(session_id) {
            return Ok(Some(record.clone()));
        }
        let loaded = self.load(session_id).await?;
        if let Some(record) = &loaded {
            cache.insert(session_id.to_string(), record.clone());
        }
        Ok(loaded)
    }

    async fn update(&self, session_id: &str, update: SessionUpdate) -> Result<bool, StoreError> {
        self.mutate(session_id, |record| record.apply_update(update)).await
    }

    async fn append_upload(
        &self,
        session_id: &str,
        video_path: PathBuf,
        frame_path: PathBuf,
    ) -> Result<bool, StoreError> {
        self.mutate(session_id, |record| record.record_upload(video_path, frame_path))
            .await
    }

    async fn is_complete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .get(session_id)
            .await?
            .map(|record| record.is_complete())
            .unwrap_or(false))
    }

    async fn remove(&self, session_id: &str) -> Result<bool, StoreError> {
        if !is_session_id(session_id) {
            return Ok(false);
        }
        let mut cache = self.cache.write().await;
        let cached = cache.remove(session_id).is_some();
        let on_disk = match tokio::fs::remove_file(self.record_path(session_id)).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        if cached || on_disk {
            warn!("Removed session {}", session_id);
        }
        Ok(cached || on_disk)
    }
}

/// Ids are generated uuids; anything else never names a record file.
pub fn is_session_id(session_id: &str) -> bool {
    Uuid::parse_str(session_id).is_ok()
}

/// One async mutex per session id, so at most one mutation of a session is
/// in flight at a time. An entry lives only while some caller holds or waits
/// on it.
#[derive(Default)]
pub struct SessionLocks {
    locks: Arc<std::sync::Mutex<LockMap>>,
}

type LockMap = HashMap<String, Arc<Mutex<()>>>;

fn lock_map(locks: &std::sync::Mutex<LockMap>) -> std::sync::MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        let lock = lock_map(&self.locks)
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.clone().lock_owned().await;
        SessionGuard {
            guard: Some(guard),
            lock,
            session_id: session_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// Number of ids with a live lock entry
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held session lock. Dropping the last holder removes the map entry.
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<Mutex<()>>,
    session_id: String,
    locks: Arc<std::sync::Mutex<LockMap>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock_map(&self.locks);
        // Clones are only taken under the map lock: two refs means the map and us
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_session(num_clips: usize) -> NewSession {
        NewSession {
            scene_description: "a cat exploring a garden".to_string(),
            starting_image_path: PathBuf::from("uploads/x/starting_image.jpg"),
            prompts: (1..=num_clips).map(|i| format!("clip {}", i)).collect(),
            num_clips,
            api_key: "sk-secret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();

        let id = store.create(new_session(3)).await.unwrap();
        let record = store.get(&id).await.unwrap().unwrap();

        assert_eq!(record.session_id, id);
        assert_eq!(record.current_step, 1);
        assert_eq!(record.prompts.len(), 3);
        assert_eq!(record.api_key, "sk-secret");
        assert!(dir.path().join(format!("{}.json", id)).exists());
    }

    #[tokio::test]
    async fn test_credential_never_written_to_disk() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();
        let id = store.create(new_session(2)).await.unwrap();

        let body = std::fs::read_to_string(dir.path().join(format!("{}.json", id))).unwrap();
        assert!(!body.contains("sk-secret"));
        assert!(body.contains("a cat exploring a garden"));
    }

    #[tokio::test]
    async fn test_get_falls_back_to_disk_and_repopulates() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = FileSessionStore::new(dir.path()).await.unwrap();
            let id = store.create(new_session(2)).await.unwrap();
            store
                .append_upload(&id, PathBuf::from("v1.mp4"), PathBuf::from("f1.jpg"))
                .await
                .unwrap();
            id
        };

        let fresh = FileSessionStore::new(dir.path()).await.unwrap();
        let record = fresh.get(&id).await.unwrap().unwrap();
        assert_eq!(record.current_step, 2);
        assert_eq!(record.uploaded_videos, vec![PathBuf::from("v1.mp4")]);
        assert_eq!(record.api_key, "");
        assert!(fresh.cache.read().await.contains_key(&id));
    }

    #[tokio::test]
    async fn test_unknown_session_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();

        assert!(store.get("missing").await.unwrap().is_none());
        assert!(!store.update("missing", SessionUpdate::new()).await.unwrap());
        assert!(!store
            .append_upload("missing", PathBuf::from("v.mp4"), PathBuf::from("f.jpg"))
            .await
            .unwrap());
        assert!(!store.is_complete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let id = Uuid::new_v4().to_string();
        std::fs::write(dir.path().join(format!("{}.json", id)), "{not json").unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();

        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_uuid_ids_never_touch_the_filesystem() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions")).await.unwrap();
        std::fs::write(dir.path().join("outside.json"), "{}").unwrap();

        assert!(store.get("../outside").await.unwrap().is_none());
        assert!(!store.remove("../outside").await.unwrap());
        assert!(dir.path().join("outside.json").exists());
    }

    #[tokio::test]
    async fn test_update_persists_named_fields() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();
        let id = store.create(new_session(2)).await.unwrap();

        let updated = store
            .update(&id, SessionUpdate::new().with_starting_image(PathBuf::from("real.jpg")))
            .await
            .unwrap();
        assert!(updated);

        let reloaded = FileSessionStore::new(dir.path()).await.unwrap();
        let record = reloaded.get(&id).await.unwrap().unwrap();
        assert_eq!(record.starting_image_path, PathBuf::from("real.jpg"));
        assert_eq!(record.prompts, vec!["clip 1", "clip 2"]);
    }

    #[tokio::test]
    async fn test_append_upload_keeps_lists_parallel_and_caps_step() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();
        let id = store.create(new_session(2)).await.unwrap();

        for i in 1..=2 {
            assert!(!store.is_complete(&id).await.unwrap());
            store
                .append_upload(
                    &id,
                    PathBuf::from(format!("v{}.mp4", i)),
                    PathBuf::from(format!("f{}.jpg", i)),
                )
                .await
                .unwrap();
            let record = store.get(&id).await.unwrap().unwrap();
            assert_eq!(record.uploaded_videos.len(), record.last_frames.len());
            assert_eq!(record.current_step, (record.uploaded_videos.len() + 1).min(2));
        }
        assert!(store.is_complete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_drops_cache_and_file() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();
        let id = store.create(new_session(1)).await.unwrap();

        assert!(store.remove(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(!dir.path().join(format!("{}.json", id)).exists());
        assert!(!store.remove(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_session_locks_serialize_same_id() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("a").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.acquire("a").await;
        });
        // A different id is not blocked
        let _b = locks.acquire("b").await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_session_locks_release_entries() {
        let locks = Arc::new(SessionLocks::new());
        for i in 0..100 {
            let _g = locks.acquire(&format!("bogus-{}", i)).await;
        }
        assert!(locks.is_empty());

        let guard = locks.acquire("a").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.acquire("a").await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(guard);
        // The waiter still holds the entry until it finishes
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
