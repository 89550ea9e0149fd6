use std::sync::Arc;

use crate::access::AccessGate;
use crate::config::ClientConfig;
use crate::feedback::FeedbackSurface;
use crate::navigation::Navigator;
use crate::presence::PresenceTracker;
use crate::storage::{KeyValueStore, StorageError};
use crate::token_store::TokenStore;

/// Everything one signed-in client shares: credentials, presence, navigation
/// and feedback. Construct once per client and pass it by `Arc`.
pub struct ClinicaSession {
    config: ClientConfig,
    tokens: Arc<TokenStore>,
    presence: PresenceTracker,
    navigator: Arc<dyn Navigator>,
    feedback: Arc<dyn FeedbackSurface>,
}

impl ClinicaSession {
    /// `session_store` holds the credentials of this client only;
    /// `shared_store` is visible to every client and holds the presence registry.
    pub fn new(
        config: ClientConfig,
        session_store: Arc<dyn KeyValueStore>,
        shared_store: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
        feedback: Arc<dyn FeedbackSurface>,
    ) -> Self {
        let presence = PresenceTracker::new(shared_store, config.presence.clone());
        let tokens = Arc::new(TokenStore::new(session_store).with_presence(presence.clone()));
        Self {
            config,
            tokens,
            presence,
            navigator,
            feedback,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn feedback(&self) -> &Arc<dyn FeedbackSurface> {
        &self.feedback
    }

    pub fn login_route(&self) -> &str {
        &self.config.access.login_route
    }

    pub fn access_gate(&self) -> AccessGate {
        AccessGate::new(
            Arc::clone(&self.tokens),
            Arc::clone(&self.navigator),
            Arc::clone(&self.feedback),
            self.config.access.clone(),
        )
    }

    /// Starts heartbeats for the stored user. `false` when nobody is signed in.
    pub fn start_presence(&self) -> bool {
        match self.tokens.user() {
            Some(user) => self.presence.start_tracking(&user),
            None => false,
        }
    }

    /// Stops presence and erases the stored credentials.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.tokens.clear()
    }

    /// Drops the credentials after the backend rejected them and sends the
    /// user to the login route.
    pub fn expire_session(&self) {
        if let Err(error) = self.clear() {
            tracing::error!(%error, "failed to clear expired session");
        }
        self.navigator.navigate(self.login_route());
    }

    /// Stops heartbeats and removes this client's presence entry while keeping
    /// the credentials, as when the client process exits.
    pub fn shutdown(&self) {
        let user = self.tokens.user();
        self.presence.stop_tracking(user.as_ref());
    }
}
