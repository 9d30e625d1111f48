use std::sync::Arc;

use zeroize::Zeroize;

use crate::crypto::{EncryptionKey, SALT_LEN};
use crate::errors::{AuthError, Result};
use crate::secret::SecretProvider;

/// scrypt cost parameters: N = 2^14, r = 8, p = 1
pub const SCRYPT_LOG_N: u8 = 14;
pub const SCRYPT_R: u32 = 8;
pub const SCRYPT_P: u32 = 1;
const KEY_LEN: usize = 32;

/// Stretch a passphrase into an AES-256 key with scrypt
pub fn derive_key(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<EncryptionKey> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| AuthError::Crypto(format!("Invalid scrypt params: {}", e)))?;

    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(passphrase, salt, &params, &mut key)
        .map_err(|e| AuthError::Crypto(format!("Key derivation failed: {}", e)))?;

    let derived = EncryptionKey::from_bytes(key);
    key.zeroize();
    Ok(derived)
}

/// Derives per-envelope keys from the configured secret provider
#[derive(Clone)]
pub struct KeyManager {
    secret_provider: Arc<dyn SecretProvider>,
}

impl KeyManager {
    pub fn new(secret_provider: Arc<dyn SecretProvider>) -> Self {
        Self { secret_provider }
    }

    /// Derive the key for an envelope salt
    ///
    /// scrypt is CPU-bound, so it runs on the blocking pool.
    pub async fn key_for_salt(&self, salt: [u8; SALT_LEN]) -> Result<EncryptionKey> {
        let passphrase = self
            .secret_provider
            .get_passphrase()
            .await
            .ok_or_else(|| AuthError::SecretUnavailable("no passphrase".to_string()))?;

        tokio::task::spawn_blocking(move || derive_key(passphrase.as_bytes(), &salt))
            .await
            .map_err(|e| AuthError::Crypto(format!("Key derivation task failed: {}", e)))?
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("secret_provider", &"[REDACTED]")
            .finish()
    }
}
