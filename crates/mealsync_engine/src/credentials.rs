//! Access/refresh token storage.

use mealsync_protocol::TokenPair;
use mealsync_storage::KeyValueStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// Storage key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "auth.access_token";

/// Storage key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "auth.refresh_token";

/// Opaque holder of the session's token pair.
///
/// The gateway reads tokens to authorize calls and rotates or clears them
/// as part of the refresh flow. Implementations never fail; a missing
/// token reads as `None`.
pub trait CredentialProvider: Send + Sync {
    /// Returns the bearer token for API calls.
    fn access_token(&self) -> Option<String>;

    /// Returns the token used to obtain a new pair.
    fn refresh_token(&self) -> Option<String>;

    /// Stores a new token pair.
    fn set_tokens(&self, access: &str, refresh: &str);

    /// Forgets both tokens.
    fn clear_tokens(&self);
}

/// Process-local credentials.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemoryCredentials {
    /// Creates an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a holder signed in with the given pair.
    pub fn with_tokens(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            tokens: RwLock::new(Some(TokenPair {
                access_token: access.into(),
                refresh_token: refresh.into(),
            })),
        }
    }
}

impl CredentialProvider for MemoryCredentials {
    fn access_token(&self) -> Option<String> {
        self.tokens.read().as_ref().map(|t| t.access_token.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.read().as_ref().map(|t| t.refresh_token.clone())
    }

    fn set_tokens(&self, access: &str, refresh: &str) {
        *self.tokens.write() = Some(TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        });
    }

    fn clear_tokens(&self) {
        *self.tokens.write() = None;
    }
}

/// Credentials persisted in a [`KeyValueStore`].
pub struct StoredCredentials {
    store: Arc<dyn KeyValueStore>,
}

impl StoredCredentials {
    /// Creates a provider over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(bytes) => bytes
                .and_then(|b| String::from_utf8(b).ok())
                .filter(|token| !token.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "failed to read credential");
                None
            }
        }
    }
}

impl CredentialProvider for StoredCredentials {
    fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    fn set_tokens(&self, access: &str, refresh: &str) {
        for (key, value) in [(ACCESS_TOKEN_KEY, access), (REFRESH_TOKEN_KEY, refresh)] {
            if let Err(e) = self.store.put(key, value.as_bytes()) {
                warn!(key, error = %e, "failed to persist credential");
            }
        }
    }

    fn clear_tokens(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "failed to clear credential");
            }
        }
    }
}
