use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Errors from the persistence layer. Kept as a flat enum with manual
/// `Display`/`Error` impls, matching this workspace's existing error style
/// (`TransitionError`, `BacktestError`, `LedgerError`) rather than pulling
/// in a derive-macro error crate.
#[derive(Debug)]
pub enum PersistError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Serialize(serde_json::Error),
    /// A corrupt file could not be deleted after the bounded retry budget —
    /// a fatal condition — persistence is completely broken.
    SelfHealFailed {
        path: PathBuf,
    },
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io { path, source } => {
                write!(f, "persistence io error at {}: {source}", path.display())
            }
            PersistError::Serialize(e) => write!(f, "persistence serialization error: {e}"),
            PersistError::SelfHealFailed { path } => write!(
                f,
                "could not delete corrupt persisted file after retries: {}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for PersistError {}

const SELF_HEAL_ATTEMPTS: u32 = 5;
const SELF_HEAL_DELAY: Duration = Duration::from_secs(1);

/// One persistence handle over a single directory ("entity directory"):
/// every key under this handle lives as `{dir}/{key}.json`,
/// written via temp-then-rename, and the directory is self-healed
/// (corrupt-JSON files deleted) exactly once, on first access.
///
/// `JsonStore` instances are meant to be memoized per entity key by an
/// owning façade (`SignalStore`, `ActivePositionStore`) — see their
/// `*_handle` constructors — so that the one-shot init gate below is
/// actually shared across every caller for that key, not re-run per call.
pub struct JsonStore<T> {
    dir: PathBuf,
    initialized: OnceCell<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonStore {
            dir: dir.into(),
            initialized: OnceCell::new(),
            _marker: PhantomData,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Self-healing init: enumerate the directory, drop any file that
    /// doesn't parse as JSON (bounded retry on delete). Idempotent via the
    /// internal one-shot gate — subsequent calls are a no-op.
    async fn ensure_initialized(&self) -> Result<(), PersistError> {
        self.initialized
            .get_or_try_init(|| async {
                match tokio::fs::read_dir(&self.dir).await {
                    Ok(mut entries) => {
                        let mut bad_paths = Vec::new();
                        while let Some(entry) =
                            entries
                                .next_entry()
                                .await
                                .map_err(|source| PersistError::Io {
                                    path: self.dir.clone(),
                                    source,
                                })?
                        {
                            let path = entry.path();
                            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                                continue;
                            }
                            if read_json_file::<serde_json::Value>(&path).await.is_err() {
                                bad_paths.push(path);
                            }
                        }
                        for path in &bad_paths {
                            warn!(path = %path.display(), "deleting corrupt persisted file");
                            delete_with_retry(path).await?;
                        }
                        Ok(())
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        tokio::fs::create_dir_all(&self.dir)
                            .await
                            .map_err(|source| PersistError::Io {
                                path: self.dir.clone(),
                                source,
                            })?;
                        Ok(())
                    }
                    Err(source) => Err(PersistError::Io {
                        path: self.dir.clone(),
                        source,
                    }),
                }
            })
            .await
            .map(|_| ())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub async fn load(&self, key: &str) -> Result<Option<T>, PersistError> {
        self.ensure_initialized().await?;
        let path = self.path_for(key);
        match read_json_file(&path).await {
            Ok(v) => Ok(Some(v)),
            Err(PersistError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self, key: &str, value: &T) -> Result<(), PersistError> {
        self.ensure_initialized().await?;
        let path = self.path_for(key);
        atomic_write_json(&path, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.ensure_initialized().await?;
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistError::Io { path, source }),
        }
    }

    /// Every key with a currently-valid (parseable) persisted value. Used by
    /// the universal-invariant test ("after init, `list()` returns only
    /// valid entries").
    pub async fn list_valid_keys(&self) -> Result<Vec<String>, PersistError> {
        self.ensure_initialized().await?;
        let mut out = Vec::new();
        let mut entries =
            tokio::fs::read_dir(&self.dir)
                .await
                .map_err(|source| PersistError::Io {
                    path: self.dir.clone(),
                    source,
                })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| PersistError::Io {
                path: self.dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if read_json_file::<serde_json::Value>(&path).await.is_err() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                out.push(stem.to_string());
            }
        }
        Ok(out)
    }
}

async fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(PersistError::Serialize)
}

/// Atomic write: serialize, write to `{path}.tmp`, fsync, rename over
/// the final path. The rename is an atomic replace on the same filesystem,
/// so a crash between the temp write and the rename leaves the previous
/// final file untouched.
async fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(PersistError::Serialize)?;
    let tmp_path = tmp_path_for(path);
    {
        let mut file =
            tokio::fs::File::create(&tmp_path)
                .await
                .map_err(|source| PersistError::Io {
                    path: tmp_path.clone(),
                    source,
                })?;
        file.write_all(&bytes)
            .await
            .map_err(|source| PersistError::Io {
                path: tmp_path.clone(),
                source,
            })?;
        file.sync_all().await.map_err(|source| PersistError::Io {
            path: tmp_path.clone(),
            source,
        })?;
    }
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn delete_with_retry(path: &Path) -> Result<(), PersistError> {
    for attempt in 0..SELF_HEAL_ATTEMPTS {
        match tokio::fs::remove_file(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) if attempt + 1 < SELF_HEAL_ATTEMPTS => {
                debug!(path = %path.display(), attempt, error = %e, "retrying corrupt-file delete");
                tokio::time::sleep(SELF_HEAL_DELAY).await;
            }
            Err(_) => {
                warn!(path = %path.display(), "self-heal delete exhausted retry budget");
                return Err(PersistError::SelfHealFailed {
                    path: path.to_path_buf(),
                });
            }
        }
    }
    Err(PersistError::SelfHealFailed {
        path: path.to_path_buf(),
    })
}
