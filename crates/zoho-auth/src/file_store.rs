//! File-backed token store
//!
//! Persists `StoreState` as pretty-printed JSON. Writes go to a temp file in
//! the same directory which is then renamed over the target, so a crash
//! mid-write leaves the previous state intact. A tokio Mutex serializes
//! read-modify-write cycles within one process; nothing guards against a
//! second process writing the same file.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::{StoreFuture, StoreState, TokenStore};
use crate::token::{TokenRecord, TokenResponse, unix_now};

pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_state(&self) -> Result<StoreState> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "token file {} does not exist",
                    self.path.display()
                )));
            }
            Err(e) => return Err(Error::Io(format!("reading token file: {e}"))),
        };

        if contents.trim().is_empty() {
            return Err(Error::CorruptStore(format!(
                "token file {} is empty",
                self.path.display()
            )));
        }

        let state: StoreState = serde_json::from_str(&contents).map_err(|e| {
            Error::CorruptStore(format!("parsing {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), history = state.history.len(), "loaded token file");
        Ok(state)
    }
}

impl TokenStore for FileTokenStore {
    fn exists(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            match tokio::fs::File::open(&self.path).await {
                Ok(file) => file.metadata().await.map(|m| m.is_file()).unwrap_or(false),
                Err(_) => false,
            }
        })
    }

    fn load_all(&self) -> StoreFuture<'_, StoreState> {
        Box::pin(self.read_state())
    }

    fn save<'a>(&'a self, response: &'a TokenResponse) -> StoreFuture<'a, TokenRecord> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;

            let mut state = match self.read_state().await {
                Ok(state) => state,
                Err(Error::NotFound(_)) => {
                    info!(path = %self.path.display(), "creating token file");
                    StoreState::default()
                }
                Err(e) => return Err(e),
            };

            let record = state.append(response, unix_now());
            write_atomic(&self.path, &state).await?;
            Ok(record)
        })
    }
}

/// Write the store atomically with 0600 permissions.
///
/// The temp file is flushed to disk before the rename and removed again if
/// any step after its creation fails.
async fn write_atomic(path: &Path, state: &StoreState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| Error::Io(format!("serializing token store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token file path has no parent directory".into()))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::Io(format!("creating token directory: {e}")))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tokens.json".into());
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    let result = write_then_rename(&tmp_path, path, json.as_bytes()).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result?;

    debug!(path = %path.display(), history = state.history.len(), "persisted token file");
    Ok(())
}

async fn write_then_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(tmp_path)
        .await
        .map_err(|e| Error::Io(format!("creating temp token file: {e}")))?;
    file.write_all(bytes)
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Io(format!("syncing temp token file: {e}")))?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HISTORY_LIMIT;
    use std::sync::Arc;

    fn response(access: &str, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access.into(),
            refresh_token: refresh.map(Into::into),
            api_domain: Some("https://www.zohoapis.com".into()),
            token_type: Some("Bearer".into()),
            expires_in: Some(3600),
            error: None,
        }
    }

    #[tokio::test]
    async fn missing_file_is_not_found_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));

        assert!(!store.exists().await);
        assert!(matches!(store.load_all().await, Err(Error::NotFound(_))));
        assert!(matches!(store.load_latest().await, Err(Error::NotFound(_))));
        assert_eq!(store.current_refresh_token().await.unwrap(), "");
    }

    #[tokio::test]
    async fn roundtrip_save_load_latest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::new(path.clone());

        store.save(&response("A1", Some("R1"))).await.unwrap();
        assert!(store.exists().await);

        // A fresh instance reads the same state from disk
        let reopened = FileTokenStore::new(path);
        let latest = reopened.load_latest().await.unwrap();
        assert_eq!(latest.access_token().unwrap(), "A1");
        assert_eq!(latest.refresh_token().unwrap(), "R1");
        assert!(latest.issued_at().is_some());
        assert_eq!(reopened.current_refresh_token().await.unwrap(), "R1");
    }

    #[tokio::test]
    async fn save_carries_refresh_token_forward() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));

        store.save(&response("A1", Some("R1"))).await.unwrap();
        let record = store
            .save(&TokenResponse {
                access_token: "A2".into(),
                expires_in: Some(3600),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(store.current_refresh_token().await.unwrap(), "R1");
        assert_eq!(record.refresh_token().unwrap(), "R1");
        assert_eq!(
            store.load_latest().await.unwrap().access_token().unwrap(),
            "A2"
        );
    }

    #[tokio::test]
    async fn history_is_bounded_to_ten() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));

        for i in 0..12 {
            store
                .save(&response(&format!("at_{i}"), Some("rt")))
                .await
                .unwrap();
        }

        let state = store.load_all().await.unwrap();
        assert_eq!(state.history.len(), HISTORY_LIMIT);
        let tokens: Vec<&str> = state
            .history
            .iter()
            .map(|r| r.access_token().unwrap())
            .collect();
        assert_eq!(tokens.first(), Some(&"at_2"));
        assert_eq!(tokens.last(), Some(&"at_11"));
    }

    #[tokio::test]
    async fn corrupt_file_is_distinct_from_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let store = FileTokenStore::new(path);

        assert!(store.exists().await);
        assert!(matches!(store.load_all().await, Err(Error::CorruptStore(_))));
        assert!(matches!(
            store.current_refresh_token().await,
            Err(Error::CorruptStore(_))
        ));
    }

    #[tokio::test]
    async fn empty_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "").await.unwrap();
        let store = FileTokenStore::new(path);

        assert!(matches!(store.load_all().await, Err(Error::CorruptStore(_))));
    }

    #[tokio::test]
    async fn save_refuses_to_overwrite_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "garbage").await.unwrap();
        let store = FileTokenStore::new(path.clone());

        let result = store.save(&response("A1", Some("R1"))).await;
        assert!(matches!(result, Err(Error::CorruptStore(_))));

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "garbage", "corrupt file must be left for the operator");
    }

    #[tokio::test]
    async fn save_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("zoho").join("tokens.json");
        let store = FileTokenStore::new(path.clone());

        store.save(&response("A1", Some("R1"))).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        store.save(&response("A1", Some("R1"))).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = vec![];
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["tokens.json"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::new(path.clone());
        store.save(&response("A1", Some("R1"))).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_saves_dont_lose_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = Arc::new(FileTokenStore::new(path.clone()));

        let mut handles = vec![];
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save(&response(&format!("at_{i}"), Some("rt")))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: StoreState = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.history.len(), 8);
    }
}
