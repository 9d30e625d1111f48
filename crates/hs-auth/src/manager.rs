//! Token lifecycle: session cache, stored bundle, refresh, interactive sign-in.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::Result;
use crate::session::{CredentialBundle, ServiceHandle, TokenGrant, now_ms};
use crate::store::TokenStore;

/// Progress sink for the interactive sign-in
pub type StatusCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Network side of the token lifecycle
#[async_trait::async_trait]
pub trait AuthFlow: Send + Sync {
    /// Trade a stored refresh token for a fresh grant
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;

    /// Browser sign-in through the local callback listener
    async fn authenticate_interactive(
        &self,
        status: Option<StatusCallback<'_>>,
    ) -> Result<TokenGrant>;

    /// Flight configuration id some Halo endpoints require
    async fn fetch_clearance(&self, handle: &ServiceHandle) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
struct CachedSession {
    handle: ServiceHandle,
}

/// Process-lifetime cache of the authenticated handle
///
/// Owned by whoever builds the [`TokenManager`]; clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SessionCache {
    slot: Arc<RwLock<Option<CachedSession>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle, unless it is within the grace window of expiry
    pub async fn get_fresh(&self, now_ms: i64) -> Option<ServiceHandle> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|cached| cached.handle.is_fresh(now_ms))
            .map(|cached| cached.handle.clone())
    }

    pub async fn replace(&self, handle: ServiceHandle) {
        *self.slot.write().await = Some(CachedSession { handle });
    }

    pub async fn clear(&self) {
        *self.slot.write().await = None;
    }
}

/// Produces ready-to-use service handles with the least network work
pub struct TokenManager {
    flow: Arc<dyn AuthFlow>,
    store: Arc<dyn TokenStore>,
    cache: SessionCache,
}

impl TokenManager {
    pub fn new(flow: Arc<dyn AuthFlow>, store: Arc<dyn TokenStore>, cache: SessionCache) -> Self {
        Self { flow, store, cache }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Return a valid handle: cache, then stored token, then refresh, then browser
    ///
    /// A failed refresh escalates to interactive sign-in instead of erroring.
    /// Failing to persist new credentials is logged; the handle is still
    /// cached and returned.
    #[instrument(skip(self, status))]
    pub async fn get_or_create_handle(
        &self,
        status: Option<StatusCallback<'_>>,
    ) -> Result<ServiceHandle> {
        if let Some(handle) = self.cache.get_fresh(now_ms()).await {
            debug!("Using cached session");
            return Ok(handle);
        }

        let base = match self.store.load().await {
            Some(bundle) if bundle.is_fresh(now_ms()) => {
                debug!("Stored Spartan token still valid");
                bundle.to_handle()
            }
            Some(bundle) => match self.refresh(&bundle).await {
                Some(handle) => handle,
                None => self.authenticate(status).await?,
            },
            None => {
                debug!("No stored credentials");
                self.authenticate(status).await?
            }
        };

        let handle = self.negotiate_clearance(base).await;
        self.cache.replace(handle.clone()).await;
        Ok(handle)
    }

    async fn refresh(&self, bundle: &CredentialBundle) -> Option<ServiceHandle> {
        info!("Spartan token expired or expiring, refreshing");
        match self.flow.refresh(&bundle.refresh_token).await {
            Ok(grant) => Some(self.persist(grant).await),
            Err(e) => {
                warn!("Refresh failed, falling back to interactive sign-in: {}", e);
                None
            }
        }
    }

    async fn authenticate(&self, status: Option<StatusCallback<'_>>) -> Result<ServiceHandle> {
        info!("Starting interactive sign-in");
        let grant = self.flow.authenticate_interactive(status).await?;
        Ok(self.persist(grant).await)
    }

    async fn persist(&self, grant: TokenGrant) -> ServiceHandle {
        let bundle = CredentialBundle::from_grant(grant, now_ms());
        if let Err(e) = self.store.save(&bundle).await {
            error!("Failed to persist credentials, next start will sign in again: {}", e);
        }
        bundle.to_handle()
    }

    async fn negotiate_clearance(&self, handle: ServiceHandle) -> ServiceHandle {
        match self.flow.fetch_clearance(&handle).await {
            Ok(Some(clearance)) => handle.with_clearance(clearance),
            Ok(None) => {
                debug!("No active flight configuration");
                handle
            }
            Err(e) => {
                warn!("Clearance lookup failed, continuing without it: {}", e);
                handle
            }
        }
    }

    /// Forget credentials on disk and in memory
    pub async fn sign_out(&self) -> Result<()> {
        self.cache.clear().await;
        self.store.clear().await
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AuthError;
    use crate::store::MemoryTokenStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFlow {
        refreshes: AtomicUsize,
        interactive: AtomicUsize,
        clearances: AtomicUsize,
        refresh_fails: bool,
        interactive_fails: bool,
        clearance_fails: bool,
        seen_refresh_tokens: Mutex<Vec<String>>,
    }

    fn grant(label: &str) -> TokenGrant {
        TokenGrant {
            refresh_token: format!("{label}-refresh"),
            spartan_token: format!("{label}-spartan"),
            xuid: "2533274800000001".to_string(),
            xbl_token: Some("XBL3.0 x=1;t".to_string()),
        }
    }

    #[async_trait::async_trait]
    impl AuthFlow for FakeFlow {
        async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.seen_refresh_tokens
                .lock()
                .unwrap()
                .push(refresh_token.to_string());
            if self.refresh_fails {
                return Err(AuthError::OAuthInvalidGrant);
            }
            Ok(grant("refreshed"))
        }

        async fn authenticate_interactive(
            &self,
            status: Option<StatusCallback<'_>>,
        ) -> Result<TokenGrant> {
            self.interactive.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = status {
                status("Opening your browser");
            }
            if self.interactive_fails {
                return Err(AuthError::CallbackTimeout(std::time::Duration::from_secs(1)));
            }
            Ok(grant("interactive"))
        }

        async fn fetch_clearance(&self, _handle: &ServiceHandle) -> Result<Option<String>> {
            self.clearances.fetch_add(1, Ordering::SeqCst);
            if self.clearance_fails {
                return Err(AuthError::InvalidResponse("flight service down".to_string()));
            }
            Ok(Some("flight-1".to_string()))
        }
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl TokenStore for FailingStore {
        async fn load(&self) -> Option<CredentialBundle> {
            None
        }

        async fn save(&self, _bundle: &CredentialBundle) -> Result<()> {
            Err(AuthError::Io(std::io::Error::other("disk full")))
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    fn manager(flow: Arc<FakeFlow>, store: Arc<dyn TokenStore>) -> TokenManager {
        TokenManager::new(flow, store, SessionCache::new())
    }

    fn stored(label: &str, expiry: i64) -> CredentialBundle {
        CredentialBundle {
            spartan_token_expiry: expiry,
            ..CredentialBundle::from_grant(grant(label), 0)
        }
    }

    #[tokio::test]
    async fn test_first_run_signs_in_and_persists() {
        let flow = Arc::new(FakeFlow::default());
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager(flow.clone(), store.clone());

        let messages = Mutex::new(Vec::new());
        let status = |message: &str| messages.lock().unwrap().push(message.to_string());
        let handle = manager.get_or_create_handle(Some(&status)).await.unwrap();

        assert_eq!(handle.spartan_token(), "interactive-spartan");
        assert_eq!(handle.clearance(), Some("flight-1"));
        assert_eq!(flow.interactive.load(Ordering::SeqCst), 1);
        assert_eq!(messages.lock().unwrap().len(), 1);

        let saved = store.load().await.unwrap();
        assert_eq!(saved.refresh_token, "interactive-refresh");
        assert!(saved.spartan_token_expiry > now_ms() + 3_500_000);
    }

    #[tokio::test]
    async fn test_second_call_uses_cache_without_network() {
        let flow = Arc::new(FakeFlow::default());
        let manager = manager(flow.clone(), Arc::new(MemoryTokenStore::new()));

        let first = manager.get_or_create_handle(None).await.unwrap();
        let second = manager.get_or_create_handle(None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(flow.interactive.load(Ordering::SeqCst), 1);
        assert_eq!(flow.clearances.load(Ordering::SeqCst), 1);
        assert_eq!(flow.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fresh_stored_token_is_reused() {
        let flow = Arc::new(FakeFlow::default());
        let store = Arc::new(MemoryTokenStore::with_bundle(stored(
            "disk",
            now_ms() + 30 * 60 * 1000,
        )));
        let manager = manager(flow.clone(), store);

        let handle = manager.get_or_create_handle(None).await.unwrap();
        assert_eq!(handle.spartan_token(), "disk-spartan");
        assert_eq!(flow.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(flow.interactive.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expiring_stored_token_is_refreshed() {
        let flow = Arc::new(FakeFlow::default());
        let store = Arc::new(MemoryTokenStore::with_bundle(stored(
            "disk",
            now_ms() + 60 * 1000,
        )));
        let manager = manager(flow.clone(), store.clone());

        let handle = manager.get_or_create_handle(None).await.unwrap();
        assert_eq!(handle.spartan_token(), "refreshed-spartan");
        assert_eq!(
            *flow.seen_refresh_tokens.lock().unwrap(),
            vec!["disk-refresh".to_string()]
        );
        assert_eq!(flow.interactive.load(Ordering::SeqCst), 0);
        assert_eq!(store.load().await.unwrap().refresh_token, "refreshed-refresh");
    }

    #[tokio::test]
    async fn test_refresh_failure_escalates_to_interactive() {
        let flow = Arc::new(FakeFlow {
            refresh_fails: true,
            ..FakeFlow::default()
        });
        let store = Arc::new(MemoryTokenStore::with_bundle(stored("disk", 0)));
        let manager = manager(flow.clone(), store.clone());

        let handle = manager.get_or_create_handle(None).await.unwrap();
        assert_eq!(handle.spartan_token(), "interactive-spartan");
        assert_eq!(flow.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(flow.interactive.load(Ordering::SeqCst), 1);
        assert_eq!(store.load().await.unwrap().refresh_token, "interactive-refresh");
    }

    #[tokio::test]
    async fn test_interactive_failure_surfaces() {
        let flow = Arc::new(FakeFlow {
            interactive_fails: true,
            ..FakeFlow::default()
        });
        let manager = manager(flow.clone(), Arc::new(MemoryTokenStore::new()));

        let result = manager.get_or_create_handle(None).await;
        assert!(matches!(result, Err(AuthError::CallbackTimeout(_))));
        assert!(manager.cache().get_fresh(now_ms()).await.is_none());
    }

    #[tokio::test]
    async fn test_clearance_failure_is_not_fatal() {
        let flow = Arc::new(FakeFlow {
            clearance_fails: true,
            ..FakeFlow::default()
        });
        let manager = manager(flow.clone(), Arc::new(MemoryTokenStore::new()));

        let handle = manager.get_or_create_handle(None).await.unwrap();
        assert_eq!(handle.clearance(), None);
        assert_eq!(handle.spartan_token(), "interactive-spartan");
    }

    #[tokio::test]
    async fn test_save_failure_still_caches_handle() {
        let flow = Arc::new(FakeFlow::default());
        let manager = manager(flow.clone(), Arc::new(FailingStore));

        let first = manager.get_or_create_handle(None).await.unwrap();
        let second = manager.get_or_create_handle(None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(flow.interactive.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_cache_entry_is_ignored() {
        let flow = Arc::new(FakeFlow::default());
        let cache = SessionCache::new();
        cache
            .replace(ServiceHandle::new(
                "stale".to_string(),
                "1".to_string(),
                now_ms() + 1_000,
            ))
            .await;
        let manager = TokenManager::new(flow.clone(), Arc::new(MemoryTokenStore::new()), cache);

        let handle = manager.get_or_create_handle(None).await.unwrap();
        assert_eq!(handle.spartan_token(), "interactive-spartan");
    }

    #[tokio::test]
    async fn test_separate_caches_do_not_leak() {
        let flow = Arc::new(FakeFlow::default());
        let store: Arc<dyn TokenStore> = Arc::new(FailingStore);

        manager(flow.clone(), store.clone())
            .get_or_create_handle(None)
            .await
            .unwrap();
        manager(flow.clone(), store)
            .get_or_create_handle(None)
            .await
            .unwrap();

        assert_eq!(flow.interactive.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sign_out_clears_everything() {
        let flow = Arc::new(FakeFlow::default());
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager(flow.clone(), store.clone());

        manager.get_or_create_handle(None).await.unwrap();
        manager.sign_out().await.unwrap();

        assert!(store.load().await.is_none());
        assert!(manager.cache().get_fresh(now_ms()).await.is_none());
    }
}
