//! Client-side support layer for the clinica records backend.
//!
//! Covers credential storage, unverified token inspection, presence tracking
//! across clients, role-based access checks and user feedback widgets. HTTP
//! lives in `clinica-api-client`.

pub mod access;
pub mod claims;
pub mod config;
pub mod context;
pub mod feedback;
pub mod navigation;
pub mod presence;
pub mod roles;
pub mod session;
pub mod storage;
pub mod token_store;

pub use access::{AccessGate, ROLE_DENIED_MESSAGE, RequiredRoles};
pub use claims::{TokenClaims, TokenParseError, decode_token_claims};
pub use config::{AccessConfig, ApiConfig, ClientConfig, ConfigError, PresenceConfig};
pub use context::ClinicaSession;
pub use feedback::{
    AlertId, AlertSnapshot, DialogId, DialogSnapshot, FeedbackLayer, FeedbackSurface, Severity,
    format_date, format_date_time,
};
pub use navigation::{Navigator, RecordingNavigator, navigate_after};
pub use presence::{ACTIVE_USERS_KEY, ActiveUserRegistry, PresenceEntry, PresenceTracker};
pub use roles::{Role, UnknownRole};
pub use session::{AuthSession, SessionUser};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageError};
pub use token_store::TokenStore;
