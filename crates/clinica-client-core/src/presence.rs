//! Best-effort "who is online" tracking over a shared key-value store.
//!
//! Each signed-in client upserts `{lastSeen, rol}` under its user id in the
//! `activeUsers` registry on a fixed heartbeat. Readers drop entries older than
//! the user timeout and write the pruned registry back. Writers in different
//! processes race on the registry; a lost update only delays an entry until the
//! next heartbeat.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::PresenceConfig;
use crate::session::SessionUser;
use crate::storage::KeyValueStore;

pub const ACTIVE_USERS_KEY: &str = "activeUsers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    #[serde(rename = "lastSeen")]
    pub last_seen: i64,
    pub rol: String,
}

pub type ActiveUserRegistry = BTreeMap<String, PresenceEntry>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackedUser {
    id: i64,
    rol: String,
}

#[derive(Default)]
struct TrackerState {
    // Bumped on every start/stop; a heartbeat from an older generation is discarded.
    generation: u64,
    task: Option<JoinHandle<()>>,
    tracked: Option<TrackedUser>,
}

struct TrackerShared {
    store: Arc<dyn KeyValueStore>,
    state: Mutex<TrackerState>,
}

impl TrackerShared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct TrackerHandle {
    shared: Arc<TrackerShared>,
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.generation += 1;
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }
}

#[derive(Clone)]
pub struct PresenceTracker {
    handle: Arc<TrackerHandle>,
    config: PresenceConfig,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, config: PresenceConfig) -> Self {
        Self {
            handle: Arc::new(TrackerHandle {
                shared: Arc::new(TrackerShared {
                    store,
                    state: Mutex::new(TrackerState::default()),
                }),
            }),
            config,
        }
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    pub fn is_tracking(&self) -> bool {
        self.shared()
            .lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Writes a heartbeat now and every heartbeat interval until stopped.
    ///
    /// Returns `false` without side effects when the user has no id, the
    /// heartbeat interval is zero, or no tokio runtime is available to drive
    /// the timer.
    pub fn start_tracking(&self, user: &SessionUser) -> bool {
        if !user.has_id() {
            return false;
        }
        if self.config.heartbeat_interval_ms == 0 {
            tracing::warn!(user_id = user.id, "presence heartbeat interval is zero");
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(user_id = user.id, "presence tracking needs a tokio runtime");
            return false;
        };

        let shared = Arc::clone(self.shared());
        let tracked = TrackedUser {
            id: user.id,
            rol: user.rol.as_str().to_string(),
        };

        let mut state = shared.lock();
        state.generation += 1;
        if let Some(previous) = state.task.take() {
            previous.abort();
        }
        let generation = state.generation;
        write_heartbeat(shared.store.as_ref(), &tracked, now_ms());
        state.tracked = Some(tracked.clone());

        let period = self.config.heartbeat_interval();
        let task_shared = Arc::clone(&shared);
        state.task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let state = task_shared.lock();
                if state.generation != generation {
                    break;
                }
                write_heartbeat(task_shared.store.as_ref(), &tracked, now_ms());
            }
        }));
        drop(state);

        tracing::debug!(user_id = user.id, "presence tracking started");
        true
    }

    /// Cancels the heartbeat and removes the user's registry entry.
    ///
    /// `current_user` may be `None` when credentials were already erased; the
    /// id remembered by `start_tracking` is used instead.
    pub fn stop_tracking(&self, current_user: Option<&SessionUser>) {
        let shared = self.shared();
        let mut state = shared.lock();
        state.generation += 1;
        if let Some(task) = state.task.take() {
            task.abort();
        }
        let fallback = state.tracked.take().map(|tracked| tracked.id);
        let user_id = current_user
            .filter(|user| user.has_id())
            .map(|user| user.id)
            .or(fallback);

        let Some(user_id) = user_id else {
            return;
        };
        let mut registry = read_registry(shared.store.as_ref());
        if registry.remove(&user_id.to_string()).is_some() {
            write_registry(shared.store.as_ref(), &registry);
        }
        drop(state);

        tracing::debug!(user_id, "presence tracking stopped");
    }

    pub fn active_user_ids(&self) -> Vec<i64> {
        self.active_user_ids_at(now_ms())
    }

    /// Ids seen within the user timeout of `now_ms`; stale entries are pruned
    /// from the shared registry as a side effect of the read.
    pub fn active_user_ids_at(&self, now_ms: i64) -> Vec<i64> {
        let shared = self.shared();
        let _state = shared.lock();
        let registry = read_registry(shared.store.as_ref());
        let timeout_ms = self.config.user_timeout_ms as i64;

        let fresh = registry
            .iter()
            .filter(|(_, entry)| now_ms.saturating_sub(entry.last_seen) < timeout_ms)
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect::<ActiveUserRegistry>();

        if fresh.len() < registry.len() {
            tracing::debug!(
                pruned = registry.len() - fresh.len(),
                "pruning stale presence entries"
            );
            write_registry(shared.store.as_ref(), &fresh);
        }

        fresh.keys().filter_map(|id| id.parse::<i64>().ok()).collect()
    }

    pub fn registry(&self) -> ActiveUserRegistry {
        read_registry(self.shared().store.as_ref())
    }

    fn shared(&self) -> &Arc<TrackerShared> {
        &self.handle.shared
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn write_heartbeat(store: &dyn KeyValueStore, user: &TrackedUser, now_ms: i64) {
    let mut registry = read_registry(store);
    registry.insert(
        user.id.to_string(),
        PresenceEntry {
            last_seen: now_ms,
            rol: user.rol.clone(),
        },
    );
    write_registry(store, &registry);
}

fn read_registry(store: &dyn KeyValueStore) -> ActiveUserRegistry {
    let raw = match store.get_item(ACTIVE_USERS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return ActiveUserRegistry::new(),
        Err(error) => {
            tracing::error!(%error, "failed to read active users");
            return ActiveUserRegistry::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|error| {
        tracing::error!(%error, "active users registry is corrupt");
        ActiveUserRegistry::new()
    })
}

fn write_registry(store: &dyn KeyValueStore, registry: &ActiveUserRegistry) {
    let encoded = match serde_json::to_string(registry) {
        Ok(encoded) => encoded,
        Err(error) => {
            tracing::error!(%error, "failed to encode active users");
            return;
        }
    };
    if let Err(error) = store.set_item(ACTIVE_USERS_KEY, &encoded) {
        tracing::error!(%error, "failed to save active users");
    }
}
