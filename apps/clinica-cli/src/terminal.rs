use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clinica_client_core::{AlertId, FeedbackSurface, Navigator, Severity};

/// Alerts and the loading line go to stderr so stdout stays machine-readable.
#[derive(Debug, Default)]
pub struct TerminalFeedback {
    next_id: AtomicU64,
    loading: AtomicBool,
}

impl TerminalFeedback {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackSurface for TerminalFeedback {
    fn show_alert(&self, message: &str, severity: Severity, _duration: Duration) -> AlertId {
        eprintln!("{} {message}", severity.icon());
        AlertId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn confirm(&self, message: &str, title: &str) -> bool {
        eprint!("{}", confirm_prompt(message, title));
        let _ = std::io::stderr().flush();
        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => is_affirmative(&line),
            _ => false,
        }
    }

    fn show_loading(&self, message: &str) {
        if !self.loading.swap(true, Ordering::Relaxed) {
            eprintln!("⏳ {message}");
        }
    }

    fn hide_loading(&self) {
        self.loading.store(false, Ordering::Relaxed);
    }
}

pub fn confirm_prompt(message: &str, title: &str) -> String {
    format!("{title}: {message} [s/N] ")
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "s" | "si" | "sí" | "y" | "yes"
    )
}

/// Terminal sessions cannot switch pages; a redirect to the login route tells
/// the user how to sign in again.
#[derive(Debug, Clone)]
pub struct TerminalNavigator {
    login_route: String,
}

impl TerminalNavigator {
    pub fn new(login_route: impl Into<String>) -> Self {
        Self {
            login_route: login_route.into(),
        }
    }
}

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: &str) {
        tracing::debug!(route, "navigation requested");
        if route == self.login_route {
            eprintln!("🔒 Sesión finalizada. Ejecute `clinica login` para continuar.");
        } else {
            eprintln!("➡️  {route}");
        }
    }
}
