//! Session persistence backends.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::state::SessionState;

/// Persistence for captured sessions.
///
/// `load` reports unreadable or corrupt state as absent rather than as an
/// error, so a damaged file degrades to a fresh interactive login instead
/// of failing the run.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist the state, replacing any previous session.
    async fn save(&self, state: &SessionState) -> Result<(), StoreError>;

    /// Load the persisted state, if any usable state exists.
    async fn load(&self) -> Option<SessionState>;

    /// Remove the persisted state. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemorySessionStore {
    state: RwLock<Option<SessionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }

    async fn load(&self) -> Option<SessionState> {
        self.state.read().await.clone()
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.state.write().await = None;
        Ok(())
    }
}

/// File-backed store keeping one pretty-printed JSON document.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;

        // Write-then-rename so a crash mid-save never truncates the
        // previous session.
        let tmp = self.temp_path();
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), cookies = state.cookies.len(), "session saved");
        Ok(())
    }

    async fn load(&self) -> Option<SessionState> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no saved session");
                return None;
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read session file");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt session file, ignoring");
                None
            }
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provis_driver::Cookie;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_state() -> SessionState {
        let mut storage = BTreeMap::new();
        storage.insert("console.locale".to_string(), "en".to_string());
        SessionState::new(
            vec![Cookie {
                name: "auth".to_string(),
                value: "token".to_string(),
                domain: ".example.com".to_string(),
                path: "/".to_string(),
                expires: Some(1893456000.0),
                secure: Some(true),
                http_only: Some(true),
                same_site: Some("Lax".to_string()),
            }],
            storage,
        )
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.json"));

        let state = sample_state();
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.json"));
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_returns_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "{not json at all").await.unwrap();

        let store = FileSessionStore::new(&path);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_load_wrong_shape_returns_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, r#"{"cookies": 42}"#).await.unwrap();

        let store = FileSessionStore::new(&path);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("session.json");
        let store = FileSessionStore::new(&path);

        store.save(&sample_state()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::new(&path);

        store.save(&sample_state()).await.unwrap();
        let mut second = sample_state();
        second.cookies[0].value = "rotated".to_string();
        store.save(&second).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.cookies[0].value, "rotated");
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_clear_removes_file_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::new(&path);

        store.save(&sample_state()).await.unwrap();
        store.clear().await.unwrap();
        assert!(!path.exists());

        // Clearing again is fine.
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySessionStore::new();
        assert!(store.load().await.is_none());

        store.save(&sample_state()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), sample_state());

        store.clear().await.unwrap();
        assert!(store.load().await.is_none());
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let store = FileSessionStore::new("/tmp/provis/session.json");
        assert_eq!(
            store.temp_path(),
            PathBuf::from("/tmp/provis/session.json.tmp")
        );
    }
}
