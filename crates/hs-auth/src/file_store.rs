use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tokio::fs;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::crypto::{self, Envelope, SALT_LEN};
use crate::errors::{AuthError, Result};
use crate::key_manager::KeyManager;
use crate::secret::SecretProvider;
use crate::session::CredentialBundle;
use crate::store::TokenStore;

/// File-based encrypted token store
///
/// Holds a single credential bundle in the binary envelope described in
/// [`crate::crypto`]. A file that fails validation, decryption or parsing is
/// deleted on load, which forces a fresh sign-in instead of an error.
///
/// # Files
/// ```text
/// ~/.local/share/halo-stats/
/// ├── tokens.bin        # Encrypted credential bundle
/// └── tokens.bin.lock   # Advisory lock held while writing
/// ```
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock_file: PathBuf,
    key_manager: KeyManager,
}

impl FileTokenStore {
    /// Create a store backed by `path`
    ///
    /// The parent directory is created on first save.
    pub fn new(path: impl AsRef<Path>, secret_provider: Arc<dyn SecretProvider>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");

        Self {
            path,
            lock_file: PathBuf::from(lock_name),
            key_manager: KeyManager::new(secret_provider),
        }
    }

    /// Get default token file location for the current platform
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "halo-stats").ok_or_else(|| {
            AuthError::InvalidResponse("Could not determine data directory".to_string())
        })?;

        Ok(project_dirs.data_dir().join("tokens.bin"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire an exclusive lock on the storage
    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| AuthError::LockTimeout)?;

        Ok(lock_file)
    }

    async fn decode(&self, bytes: &[u8]) -> Result<CredentialBundle> {
        let envelope = Envelope::parse(bytes)?;
        let key = self.key_manager.key_for_salt(envelope.salt).await?;
        let mut plaintext = crypto::open(&key, &envelope)?;

        let bundle: serde_json::Result<CredentialBundle> = serde_json::from_slice(&plaintext);
        plaintext.zeroize();
        Ok(bundle?)
    }

    async fn discard(&self, reason: &AuthError) {
        warn!(
            "Discarding unreadable token file {}: {}",
            self.path.display(),
            reason
        );
        if let Err(e) = fs::remove_file(&self.path).await {
            warn!("Failed to delete token file {}: {}", self.path.display(), e);
        }
    }

    async fn write_atomically(&self, envelope: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to temp file, then rename
        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, envelope).await?;

        // Set secure permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            fs::set_permissions(&temp_path, perms).await?;
        }

        // Sync to disk
        let file = fs::File::open(&temp_path).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Option<CredentialBundle> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file at {}", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::error!("Failed to read token file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match self.decode(&bytes).await {
            Ok(bundle) => Some(bundle),
            // The file may be fine; it just cannot be opened from here
            Err(AuthError::SecretUnavailable(reason)) => {
                warn!("Token file key unavailable: {}", reason);
                None
            }
            Err(e) => {
                self.discard(&e).await;
                None
            }
        }
    }

    async fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        let salt: [u8; SALT_LEN] = crypto::random_bytes()?;
        let key = self.key_manager.key_for_salt(salt).await?;

        let mut plaintext = serde_json::to_vec(bundle)?;
        let sealed = crypto::seal(&key, &salt, &plaintext);
        plaintext.zeroize();
        let envelope = sealed?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let _lock = self.acquire_lock()?;
        self.write_atomically(&envelope).await?;

        debug!("Saved credential bundle to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if !fs::try_exists(&self.path).await? {
            return Ok(());
        }
        let _lock = self.acquire_lock()?;

        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
