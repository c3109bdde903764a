//! Refresh credential persistence.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use zeroize::Zeroize;

/// Stores a single refresh credential across launches.
pub trait CredentialStore: Send + Sync {
    fn store(&self, token: &str) -> Result<()>;
    fn retrieve(&self) -> Result<Option<String>>;
    /// Remove the credential. Succeeds when nothing is stored.
    fn delete(&self) -> Result<()>;
}

/// Credential kept in a file readable only by the owner.
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn store(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        write_token_file(&self.path, token)
            .with_context(|| format!("write credential {}", self.path.display()))
    }

    fn retrieve(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(mut contents) => {
                let token = contents.trim().to_string();
                contents.zeroize();
                Ok((!token.is_empty()).then_some(token))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(anyhow!("read credential {}: {}", self.path.display(), err)),
        }
    }

    fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(anyhow!("remove credential {}: {}", self.path.display(), err)),
        }
    }
}

fn write_token_file(path: &Path, token: &str) -> Result<()> {
    std::fs::write(path, format!("{token}\n"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// Process-local store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn store(&self, token: &str) -> Result<()> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        if let Some(old) = slot.as_mut() {
            old.zeroize();
        }
        *slot = Some(token.to_string());
        Ok(())
    }

    fn retrieve(&self) -> Result<Option<String>> {
        let slot = self
            .token
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        Ok(slot.clone())
    }

    fn delete(&self) -> Result<()> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        if let Some(mut old) = slot.take() {
            old.zeroize();
        }
        Ok(())
    }
}
