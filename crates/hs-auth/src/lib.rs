//! Halo Infinite sign-in and token lifecycle
//!
//! This crate owns everything between "the user has a Microsoft account" and
//! "a request to a Halo service carries a valid Spartan token".
//!
//! # Authentication Flow
//!
//! 1. OAuth2 authorization with Microsoft (browser + local callback listener)
//! 2. Xbox Live authentication
//! 3. XSTS authorization for the Halo relying party
//! 4. Spartan token exchange with the Halo settings service
//! 5. XSTS authorization for Xbox Live (XUID and people-lookup credential)
//! 6. Clearance (flight configuration) lookup
//!
//! # Token Lifecycle
//!
//! [`TokenManager::get_or_create_handle`] prefers, in order: the in-process
//! [`SessionCache`], a still-valid stored bundle, a refresh exchange, and
//! finally the interactive browser flow.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hs_auth::{AuthConfig, FileTokenStore, HaloAuthClient, MachineSecretProvider, SessionCache, TokenManager};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AuthConfig::new("my-client-id", "http://localhost:8765/callback".parse()?);
//! let client = HaloAuthClient::new(config)?;
//! let store = FileTokenStore::new(FileTokenStore::default_path()?, Arc::new(MachineSecretProvider));
//! let manager = TokenManager::new(Arc::new(client), Arc::new(store), SessionCache::new());
//!
//! let handle = manager.get_or_create_handle(None).await?;
//! println!("Signed in as xuid {}", handle.xuid());
//! # Ok(())
//! # }
//! ```
//!
//! # Token Storage
//!
//! Credentials live in a single AES-256-GCM envelope whose key is derived
//! with scrypt from a per-machine, per-user passphrase. A corrupt or foreign
//! file is deleted on load and treated as "signed out".
//!
//! ## In-Memory Storage (Testing)
//!
//! ```
//! use hs_auth::{CredentialBundle, MemoryTokenStore, TokenGrant, TokenStore};
//!
//! # async fn example() -> hs_auth::Result<()> {
//! let store = MemoryTokenStore::new();
//! let grant = TokenGrant {
//!     refresh_token: "refresh".to_string(),
//!     spartan_token: "v4=spartan".to_string(),
//!     xuid: "2533274800000001".to_string(),
//!     xbl_token: None,
//! };
//! store.save(&CredentialBundle::from_grant(grant, 0)).await?;
//!
//! let bundle = store.load().await.expect("bundle was saved");
//! assert_eq!(bundle.to_handle().xuid(), "2533274800000001");
//! # Ok(())
//! # }
//! # tokio_test::block_on(example()).unwrap();
//! ```

pub mod callback;
pub mod client;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod file_store;
pub mod key_manager;
pub mod manager;
pub mod models;
pub mod secret;
pub mod session;
pub mod store;

// Re-export main types
pub use client::HaloAuthClient;
pub use config::{AuthConfig, AuthEndpoints, BrowserLauncher, GRACE_WINDOW};
pub use errors::{AuthError, Result, XstsError};
pub use file_store::FileTokenStore;
pub use manager::{AuthFlow, SessionCache, StatusCallback, TokenManager};
pub use secret::{MachineSecretProvider, SecretProvider, StaticSecretProvider};
pub use session::{CredentialBundle, ServiceHandle, TokenGrant};
pub use store::{MemoryTokenStore, TokenStore};
