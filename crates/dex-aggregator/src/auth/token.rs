/*
[INPUT]:  Access tokens and optional expiration timestamps
[OUTPUT]: Token retrieval on demand for (re)connection
[POS]:    Auth layer - token lifecycle management
[UPDATE]: When adding token refresh or changing storage strategy
*/

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, PoisonError, RwLock};

use crate::http::{DexError, Result};

/// Source of the access token presented to the real-time service.
///
/// Called on every connection attempt, so a provider that returns a fresh
/// token lets the transport reconnect without caller involvement.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> Result<String>;
}

/// Fixed token that never changes
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn get_token(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(DexError::TokenExpired);
        }
        Ok(self.0.clone())
    }
}

/// Stored token data with metadata
#[derive(Debug, Clone)]
pub struct TokenData {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Thread-safe, replaceable access token
#[derive(Debug, Clone)]
pub struct AccessTokenStore {
    data: Arc<RwLock<Option<TokenData>>>,
}

impl AccessTokenStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a store holding a token without expiry
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set_token(token, None);
        store
    }

    /// Replace the current token
    pub fn set_token(&self, token: impl Into<String>, expires_seconds: Option<u64>) {
        // Lifetimes beyond chrono's range count as no expiry.
        let expires_at = expires_seconds
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        let token_data = TokenData {
            token: token.into(),
            expires_at,
        };

        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(token_data);
    }

    /// Get the current token if available
    pub fn token(&self) -> Option<String> {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|data| data.token.clone())
    }

    /// Check if token is expired; an empty store counts as expired
    pub fn is_expired(&self) -> bool {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(TokenData {
                expires_at: Some(expires_at),
                ..
            }) => Utc::now() > *expires_at,
            Some(_) => false,
            None => true,
        }
    }

    /// Get token data if available
    pub fn token_data(&self) -> Option<TokenData> {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }

    /// Clear the stored token
    pub fn clear(&self) {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }
}

impl Default for AccessTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for AccessTokenStore {
    async fn get_token(&self) -> Result<String> {
        if self.is_expired() {
            return Err(DexError::TokenExpired);
        }
        self.token().ok_or(DexError::TokenExpired)
    }
}
