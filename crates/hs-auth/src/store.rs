use std::sync::{Arc, RwLock};

use crate::errors::{AuthError, Result};
use crate::session::CredentialBundle;

/// Durable home of the credential bundle
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the stored bundle
    ///
    /// Unreadable state is reported as `None`, never as an error.
    async fn load(&self) -> Option<CredentialBundle>;

    /// Replace the stored bundle
    async fn save(&self, bundle: &CredentialBundle) -> Result<()>;

    /// Forget the stored bundle
    async fn clear(&self) -> Result<()>;
}

/// In-memory token store for testing and simple use cases
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    bundle: Arc<RwLock<Option<CredentialBundle>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(bundle: CredentialBundle) -> Self {
        Self {
            bundle: Arc::new(RwLock::new(Some(bundle))),
        }
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Option<CredentialBundle> {
        self.bundle.read().ok()?.clone()
    }

    async fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        *self
            .bundle
            .write()
            .map_err(|_| AuthError::InvalidResponse("Lock poisoned".to_string()))? =
            Some(bundle.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self
            .bundle
            .write()
            .map_err(|_| AuthError::InvalidResponse("Lock poisoned".to_string()))? = None;
        Ok(())
    }
}
