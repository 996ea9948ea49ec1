use super::{StatsError, StatsState};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

/// Durable home of the stats state.
#[async_trait]
pub trait StatsStorage: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<StatsState>, StatsError>;

    async fn save(&self, state: &StatsState) -> Result<(), StatsError>;
}

#[derive(Debug, Default)]
pub struct MemoryStatsStorage {
    state: Mutex<Option<StatsState>>,
    saves: AtomicU64,
}

impl MemoryStatsStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_state(state: StatsState) -> Self {
        Self { state: Mutex::new(Some(state)), saves: AtomicU64::new(0) }
    }

    #[must_use]
    pub fn saved(&self) -> Option<StatsState> {
        self.state.lock().clone()
    }

    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StatsStorage for MemoryStatsStorage {
    async fn load(&self) -> Result<Option<StatsState>, StatsError> {
        Ok(self.state.lock().clone())
    }

    async fn save(&self, state: &StatsState) -> Result<(), StatsError> {
        *self.state.lock() = Some(state.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// JSON file storage. Writes go to a sibling temp file which is then renamed
/// over the target, so a crash never leaves a half-written state file.
#[derive(Debug, Clone)]
pub struct FileStatsStorage {
    path: PathBuf,
}

impl FileStatsStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StatsStorage for FileStatsStorage {
    async fn load(&self) -> Result<Option<StatsState>, StatsError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &StatsState) -> Result<(), StatsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(state)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
