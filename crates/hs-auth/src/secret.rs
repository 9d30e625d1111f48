use zeroize::Zeroizing;

/// Source of the passphrase the token store key is derived from
#[async_trait::async_trait]
pub trait SecretProvider: Send + Sync {
    /// Get a passphrase for key derivation
    ///
    /// Returns None if no passphrase is available.
    /// The returned string will be automatically zeroized when dropped.
    async fn get_passphrase(&self) -> Option<Zeroizing<String>>;
}

/// Passphrase bound to this machine and OS account
///
/// Built from the local hostname and the current username, so a token file
/// copied to another machine or account cannot be opened.
#[derive(Debug, Clone, Default)]
pub struct MachineSecretProvider;

impl MachineSecretProvider {
    pub fn passphrase_for(hostname: &str, username: &str) -> Zeroizing<String> {
        Zeroizing::new(format!("{}:{}", hostname, username))
    }
}

#[async_trait::async_trait]
impl SecretProvider for MachineSecretProvider {
    async fn get_passphrase(&self) -> Option<Zeroizing<String>> {
        let hostname = match whoami::fallible::hostname() {
            Ok(hostname) => hostname,
            Err(e) => {
                tracing::warn!("Could not read hostname: {}", e);
                return None;
            }
        };
        let username = match whoami::fallible::username() {
            Ok(username) => username,
            Err(e) => {
                tracing::warn!("Could not read username: {}", e);
                return None;
            }
        };

        Some(Self::passphrase_for(&hostname, &username))
    }
}

/// Static secret provider for testing and explicitly configured passphrases
#[derive(Debug, Clone)]
pub struct StaticSecretProvider {
    secret: String,
}

impl StaticSecretProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait::async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_passphrase(&self) -> Option<Zeroizing<String>> {
        Some(Zeroizing::new(self.secret.clone()))
    }
}
