//! Credential persistence.
//!
//! File format: `~/.modelgate/auth.json`
//! ```json
//! { "credentials": { "openai": { "provider": "openai", "access_token": "..." } } }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use modelgate_core::{utils, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credential::AuthCredential;

/// Persistence seam for credentials, keyed by provider family.
///
/// Implementations must be safe to share between concurrent callers;
/// the last successful `set` wins.
pub trait CredentialStore: Send + Sync {
    /// All stored credentials.
    fn load(&self) -> Result<HashMap<String, AuthCredential>>;

    fn get(&self, provider: &str) -> Result<Option<AuthCredential>> {
        Ok(self.load()?.remove(provider))
    }

    /// Replace the credential for `provider` entirely.
    fn set(&self, provider: &str, credential: AuthCredential) -> Result<()>;

    /// Remove one credential. Removing an absent one is not an error.
    fn delete(&self, provider: &str) -> Result<()>;

    fn delete_all(&self) -> Result<()>;
}

// ─────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────

/// Non-persistent store, for tests and embedders that manage storage themselves.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<String, AuthCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<HashMap<String, AuthCredential>> {
        Ok(self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn get(&self, provider: &str) -> Result<Option<AuthCredential>> {
        Ok(self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .cloned())
    }

    fn set(&self, provider: &str, credential: AuthCredential) -> Result<()> {
        self.credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), credential);
        Ok(())
    }

    fn delete(&self, provider: &str) -> Result<()> {
        self.credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(provider);
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

// ─────────────────────────────────────────────
// JSON file store
// ─────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthFile {
    #[serde(default)]
    credentials: BTreeMap<String, AuthCredential>,
}

/// JSON-file store. The file is the source of truth: reads go to disk, and
/// each mutation re-reads the file under a write lock before rewriting it,
/// so entries written by another process since `open` are preserved.
///
/// Every mutation rewrites the whole file through a temp file + rename,
/// so readers of the file never observe a partial write.
pub struct FileCredentialStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileCredentialStore {
    /// Open the store at `path`, validating it if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let credentials = read_file(&path)?;
        debug!(path = %path.display(), count = credentials.len(), "opened credential store");
        Ok(Self {
            path,
            lock: RwLock::new(()),
        })
    }

    /// Open `~/.modelgate/auth.json`.
    pub fn open_default() -> Result<Self> {
        Self::open(utils::get_auth_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate(&self, f: impl FnOnce(&mut HashMap<String, AuthCredential>)) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut current = read_file(&self.path)?;
        f(&mut current);
        write_file(&self.path, &current)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<HashMap<String, AuthCredential>> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        read_file(&self.path)
    }

    fn set(&self, provider: &str, credential: AuthCredential) -> Result<()> {
        self.mutate(|m| {
            m.insert(provider.to_string(), credential);
        })
    }

    fn delete(&self, provider: &str) -> Result<()> {
        self.mutate(|m| {
            m.remove(provider);
        })
    }

    fn delete_all(&self) -> Result<()> {
        self.mutate(|m| m.clear())
    }
}

fn read_file(path: &Path) -> Result<HashMap<String, AuthCredential>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let file: AuthFile = serde_json::from_str(&text)
        .map_err(|e| Error::Store(format!("{}: {e}", path.display())))?;
    Ok(file.credentials.into_iter().collect())
}

fn write_file(path: &Path, credentials: &HashMap<String, AuthCredential>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = AuthFile {
        credentials: credentials
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| Error::Store(e.to_string()))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    restrict_permissions(&tmp)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
