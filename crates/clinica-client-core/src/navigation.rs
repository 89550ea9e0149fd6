use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Moves the user to another surface of the application (page, screen, prompt).
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigates after `delay` on the current tokio runtime, or immediately when
/// called outside of one.
pub fn navigate_after(navigator: Arc<dyn Navigator>, route: &str, delay: Duration) {
    if delay.is_zero() {
        navigator.navigate(route);
        return;
    }
    let route = route.to_string();
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                navigator.navigate(&route);
            });
        }
        Err(_) => navigator.navigate(&route),
    }
}

/// Navigator that only remembers where it was sent.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    visits: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count_for(&self, route: &str) -> usize {
        self.visits().iter().filter(|visit| *visit == route).count()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        tracing::debug!(route, "navigating");
        self.visits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(route.to_string());
    }
}
