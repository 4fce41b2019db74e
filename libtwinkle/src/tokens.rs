//! OAuth token lifecycle
//!
//! A single credential set moves through `None -> ShortLived ->
//! LongLived -> Expired`. The actual code/token exchanges are done by
//! an external [`TokenExchange`] collaborator; this module only owns
//! the state machine and the time-based expiry check. Token values
//! stay wrapped in [`SecretString`] and are never persisted here.

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{debug, info};

use crate::error::{Result, TokenError};

/// Where a credential set is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPhase {
    None,
    ShortLived,
    LongLived,
    Expired,
}

impl std::fmt::Display for TokenPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TokenPhase::None => "none",
            TokenPhase::ShortLived => "short-lived",
            TokenPhase::LongLived => "long-lived",
            TokenPhase::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// In-memory state for one credential set.
pub struct TokenState {
    pub phase: TokenPhase,
    pub value: Option<SecretString>,
    pub obtained_at: Option<i64>,
}

/// External collaborator that performs the actual credential
/// exchanges against the identity provider.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Trade an authorization code for a short-lived access token.
    /// `Ok(None)` means the provider answered without a token.
    async fn acquire(&self, code: &str) -> Result<Option<String>>;

    /// Trade a short-lived token for a long-lived one.
    async fn exchange(&self, short_lived: &SecretString) -> Result<Option<String>>;
}

/// An exchange that never yields tokens. Used when credentials are
/// supplied directly instead of negotiated.
pub struct NullExchange;

#[async_trait]
impl TokenExchange for NullExchange {
    async fn acquire(&self, _code: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn exchange(&self, _short_lived: &SecretString) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Owns the token state machine for one credential set.
pub struct TokenManager {
    state: TokenState,
    ttl_secs: i64,
    exchange: Box<dyn TokenExchange>,
}

impl TokenManager {
    pub fn new(exchange: Box<dyn TokenExchange>, ttl_secs: i64) -> Self {
        Self {
            state: TokenState {
                phase: TokenPhase::None,
                value: None,
                obtained_at: None,
            },
            ttl_secs,
            exchange,
        }
    }

    /// Start from an already long-lived token, as when the user
    /// supplies one through the environment.
    pub fn with_token(token: SecretString, ttl_secs: i64) -> Self {
        Self {
            state: TokenState {
                phase: TokenPhase::LongLived,
                value: Some(token),
                obtained_at: Some(chrono::Utc::now().timestamp()),
            },
            ttl_secs,
            exchange: Box::new(NullExchange),
        }
    }

    /// Current phase, after applying the lazy expiry check.
    pub fn phase(&mut self) -> TokenPhase {
        self.expire_if_elapsed();
        self.state.phase
    }

    /// Trade an authorization code for a short-lived token.
    pub async fn acquire(&mut self, code: &str) -> Result<()> {
        let token = self.exchange.acquire(code).await?.ok_or_else(|| {
            TokenError::AuthFailed("exchange returned no access token".to_string())
        })?;
        self.state = TokenState {
            phase: TokenPhase::ShortLived,
            value: Some(SecretString::from(token)),
            obtained_at: Some(chrono::Utc::now().timestamp()),
        };
        info!("Acquired short-lived token");
        Ok(())
    }

    /// Upgrade the short-lived token to a long-lived one.
    pub async fn exchange(&mut self) -> Result<()> {
        self.expire_if_elapsed();
        if self.state.phase != TokenPhase::ShortLived {
            return Err(TokenError::NoShortLivedToken.into());
        }
        let short = self
            .state
            .value
            .as_ref()
            .ok_or(TokenError::NoShortLivedToken)?;
        let token = self.exchange.exchange(short).await?.ok_or_else(|| {
            TokenError::AuthFailed("exchange returned no access token".to_string())
        })?;
        self.state = TokenState {
            phase: TokenPhase::LongLived,
            value: Some(SecretString::from(token)),
            obtained_at: Some(chrono::Utc::now().timestamp()),
        };
        info!("Exchanged for long-lived token");
        Ok(())
    }

    /// Credentials for a publish attempt. Fails with
    /// `CredentialsRequired` when no usable token is held; the
    /// scheduler treats that as non-retryable, since waiting never
    /// fixes a credentials problem.
    pub fn credentials(&mut self) -> Result<SecretString> {
        self.expire_if_elapsed();
        match self.state.phase {
            TokenPhase::ShortLived | TokenPhase::LongLived => self
                .state
                .value
                .clone()
                .ok_or_else(|| TokenError::CredentialsRequired.into()),
            _ => Err(TokenError::CredentialsRequired.into()),
        }
    }

    // Expiry is checked lazily at each use rather than on a timer.
    fn expire_if_elapsed(&mut self) {
        if self.state.phase != TokenPhase::LongLived {
            return;
        }
        if let Some(obtained_at) = self.state.obtained_at {
            let age = chrono::Utc::now().timestamp() - obtained_at;
            if age >= self.ttl_secs {
                debug!("Long-lived token expired after {}s", age);
                self.state.phase = TokenPhase::Expired;
                self.state.value = None;
            }
        }
    }
}
