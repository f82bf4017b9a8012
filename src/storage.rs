use async_trait::async_trait;
use reqwest::{
    Url,
    cookie::{CookieStore, Jar},
};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

/// StorageError
///
/// Failures of the browser-side stores. None of them is fatal to locale resolution or
/// navigation; callers log and carry on.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("persistent storage unavailable: {0}")]
    Unavailable(String),
    #[error("persistent storage I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("persistent storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("invalid cookie origin: {0}")]
    InvalidOrigin(String),
}

// 1. Long-lived Store Contract
/// KeyValueStore
///
/// The long-lived persisted store (the browser's local storage). Reads and writes
/// suspend at the storage boundary and may fail, e.g. in restricted browsing contexts.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// StoreState
///
/// The concrete type used to share the long-lived store across components.
pub type StoreState = Arc<dyn KeyValueStore>;

// 2. File-backed Implementation
/// FileStore
///
/// Persists a flat JSON object at `path`. Writes go to a sibling temp file and are
/// renamed into place so a crash never leaves a half-written map behind.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_map().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&map)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

// 3. The Mock Implementation
/// MemoryStore
///
/// In-memory store for tests. `new_failing()` rejects every operation, the way local
/// storage behaves under privacy mode or an exhausted quota.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Seeds a value without going through the async contract.
    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.should_fail {
            return Err(StorageError::Unavailable(
                "simulated storage failure".to_string(),
            ));
        }
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Unavailable(
                "simulated storage failure".to_string(),
            ));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// --- Navigation Cookies ---

/// SetCookie
///
/// A cookie write with the attributes the navigation context needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub max_age: Duration,
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path={}; Max-Age={}",
            self.name,
            self.value,
            self.path,
            self.max_age.as_secs()
        )
    }
}

/// CookieJar
///
/// The short-lived navigation store. Backed by the same `reqwest` jar the HTTP
/// transport uses, so a cookie written here is sent with the next API request exactly
/// as a browser would send it.
#[derive(Clone)]
pub struct CookieJar {
    jar: Arc<Jar>,
    origin: Url,
}

impl CookieJar {
    pub fn new(origin: &str) -> Result<Self, StorageError> {
        let origin =
            Url::parse(origin).map_err(|e| StorageError::InvalidOrigin(e.to_string()))?;
        Ok(Self {
            jar: Arc::new(Jar::default()),
            origin,
        })
    }

    /// The underlying jar, for wiring into the HTTP client.
    pub fn jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }

    pub fn set(&self, cookie: &SetCookie) {
        self.jar.add_cookie_str(&cookie.to_string(), &self.origin);
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        let raw = header.to_str().ok()?;
        raw.split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }
}
