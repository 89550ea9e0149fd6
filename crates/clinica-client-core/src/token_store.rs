use std::sync::Arc;

use chrono::Utc;

use crate::claims::{TokenClaims, decode_token_claims};
use crate::presence::PresenceTracker;
use crate::session::{AuthSession, SessionUser};
use crate::storage::{KeyValueStore, StorageError};

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const AUTH_USER_KEY: &str = "auth_user";

/// Bearer token and user profile kept in session-scoped storage.
///
/// Token inspection here is unverified: `is_valid` only checks shape and
/// expiry of the payload, never the signature.
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
    presence: Option<PresenceTracker>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            presence: None,
        }
    }

    /// Heartbeats of `presence` are stopped before credentials are erased.
    #[must_use]
    pub fn with_presence(mut self, presence: PresenceTracker) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn save(&self, token: &str, user: &SessionUser) -> Result<(), StorageError> {
        let encoded =
            serde_json::to_string(user).map_err(|error| StorageError::Encode(error.to_string()))?;
        self.store.set_item(AUTH_TOKEN_KEY, token)?;
        if let Err(error) = self.store.set_item(AUTH_USER_KEY, &encoded) {
            if let Err(rollback) = self.store.remove_item(AUTH_TOKEN_KEY) {
                tracing::error!(%rollback, "failed to roll back auth token after user write failed");
            }
            return Err(error);
        }
        tracing::info!(username = %user.username, rol = %user.rol, "credentials saved");
        Ok(())
    }

    pub fn get(&self) -> Option<AuthSession> {
        Some(AuthSession {
            token: self.token()?,
            user: self.user()?,
        })
    }

    pub fn token(&self) -> Option<String> {
        match self.store.get_item(AUTH_TOKEN_KEY) {
            Ok(token) => token.filter(|token| !token.trim().is_empty()),
            Err(error) => {
                tracing::error!(%error, "failed to read auth token");
                None
            }
        }
    }

    pub fn user(&self) -> Option<SessionUser> {
        let raw = match self.store.get_item(AUTH_USER_KEY) {
            Ok(raw) => raw?,
            Err(error) => {
                tracing::error!(%error, "failed to read auth user");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|error| tracing::warn!(%error, "stored auth user is unreadable"))
            .ok()
    }

    /// Stops presence tracking, then erases token and user together.
    pub fn clear(&self) -> Result<(), StorageError> {
        let user = self.user();
        if let Some(presence) = &self.presence {
            presence.stop_tracking(user.as_ref());
        }
        let token_result = self.store.remove_item(AUTH_TOKEN_KEY);
        let user_result = self.store.remove_item(AUTH_USER_KEY);
        token_result.and(user_result)?;
        tracing::info!(
            username = user.as_ref().map_or("<none>", |user| user.username.as_str()),
            "session closed"
        );
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some() && self.user().is_some_and(|user| user.has_id())
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().timestamp())
    }

    /// `false` for a missing or malformed token, or one whose `exp` is not after `now`.
    pub fn is_valid_at(&self, now_unix_secs: i64) -> bool {
        let Some(token) = self.token() else {
            return false;
        };
        match decode_token_claims(&token) {
            Ok(claims) if claims.is_expired_at(now_unix_secs) => {
                tracing::warn!(expires_at = ?claims.expires_at, "token expired");
                false
            }
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(%error, "token is malformed");
                false
            }
        }
    }

    /// Decoded payload of the stored token, recomputed on every call.
    pub fn claims(&self) -> Option<TokenClaims> {
        let token = self.token()?;
        decode_token_claims(&token)
            .map_err(|error| tracing::warn!(%error, "failed to decode token"))
            .ok()
    }
}
