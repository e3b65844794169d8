use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::debug;

use super::Credential;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Persistence for the current credential.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores the credential as JSON in the cache directory.
pub struct FileTokenStore {
    cache_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<Credential>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let credential: Credential =
            serde_json::from_str(&contents).context("Failed to parse session file")?;

        if !credential.is_structurally_valid() {
            debug!(path = %path.display(), "Ignoring stored token with invalid shape");
            return Ok(None);
        }
        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(credential)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Keeps the credential in memory only.
#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self.slot.lock() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}
