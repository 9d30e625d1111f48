//! Binary envelope for the credential file.
//!
//! ```text
//! [magic 2][version 1][salt 16][nonce 12][tag 16][ciphertext ..]
//! ```
//!
//! The payload is sealed with AES-256-GCM under a key derived from the salt
//! (see [`crate::key_manager`]) and a fixed associated-data string.

use aes_gcm::{
    Aes256Gcm, Nonce, Tag,
    aead::{AeadInPlace, KeyInit},
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{AuthError, Result};

pub const MAGIC: [u8; 2] = *b"HX";
pub const FORMAT_VERSION: u8 = 1;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = MAGIC.len() + 1 + SALT_LEN + NONCE_LEN + TAG_LEN;

/// Associated data bound to every envelope of this format
pub const ASSOCIATED_DATA: &[u8] = b"halo-stats/token-envelope/v1";

/// AES-256 key (32 bytes)
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { key: bytes }
    }

    /// Get key bytes (use carefully - sensitive data)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Fill a fixed-size array from the OS random source
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::fill(&mut bytes)
        .map_err(|e| AuthError::Crypto(format!("OS random source failed: {}", e)))?;
    Ok(bytes)
}

/// Parsed view over an envelope's bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// Validate magic, version and length before any decryption is attempted
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(AuthError::CorruptedStore);
        }
        if bytes[..2] != MAGIC || bytes[2] != FORMAT_VERSION {
            return Err(AuthError::CorruptedStore);
        }

        let salt_start = MAGIC.len() + 1;
        let nonce_start = salt_start + SALT_LEN;
        let tag_start = nonce_start + NONCE_LEN;

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[salt_start..nonce_start]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[nonce_start..tag_start]);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[tag_start..HEADER_LEN]);

        Ok(Self {
            salt,
            nonce,
            tag,
            ciphertext: &bytes[HEADER_LEN..],
        })
    }
}

/// Encrypt `plaintext` into a complete envelope
pub fn seal(key: &EncryptionKey, salt: &[u8; SALT_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("Invalid key: {}", e)))?;

    let nonce_bytes: [u8; NONCE_LEN] = random_bytes()?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce_bytes), ASSOCIATED_DATA, &mut buffer)
        .map_err(|e| AuthError::Crypto(format!("Encryption failed: {}", e)))?;

    let mut envelope = Vec::with_capacity(HEADER_LEN + buffer.len());
    envelope.extend_from_slice(&MAGIC);
    envelope.push(FORMAT_VERSION);
    envelope.extend_from_slice(salt);
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(tag.as_slice());
    envelope.extend_from_slice(&buffer);

    buffer.zeroize();
    Ok(envelope)
}

/// Decrypt an envelope; any authentication failure is `CorruptedStore`
pub fn open(key: &EncryptionKey, envelope: &Envelope<'_>) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("Invalid key: {}", e)))?;

    let mut buffer = envelope.ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&envelope.nonce),
            ASSOCIATED_DATA,
            &mut buffer,
            Tag::from_slice(&envelope.tag),
        )
        .map_err(|_| AuthError::CorruptedStore)?;

    // Caller should zeroize the plaintext once parsed
    Ok(buffer)
}
