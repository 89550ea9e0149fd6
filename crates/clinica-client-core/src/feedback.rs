//! Transient user feedback: alerts, confirmation dialogs and a blocking loading overlay.
//!
//! [`FeedbackLayer`] is an in-memory model of the widgets. Front ends either
//! render its snapshots or provide their own [`FeedbackSurface`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tokio::sync::oneshot;

pub const ALERT_CONTAINER_ID: &str = "alertContainer";
pub const LOADING_OVERLAY_ID: &str = "loadingOverlay";
pub const DEFAULT_CONFIRM_TITLE: &str = "Confirmación";
pub const DEFAULT_LOADING_MESSAGE: &str = "Cargando...";
pub const DEFAULT_ALERT_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Success,
    Danger,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Danger => "danger",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Danger => "❌",
            Self::Warning => "⚠️",
            Self::Info => "ℹ️",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlertId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DialogId(pub u64);

#[async_trait]
pub trait FeedbackSurface: Send + Sync {
    /// `Duration::ZERO` keeps the alert until it is dismissed.
    fn show_alert(&self, message: &str, severity: Severity, duration: Duration) -> AlertId;

    /// Resolves `true` only when the user accepts; dismissal resolves `false`.
    async fn confirm(&self, message: &str, title: &str) -> bool;

    fn show_loading(&self, message: &str);

    fn hide_loading(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSnapshot {
    pub id: AlertId,
    pub severity: Severity,
    pub message: String,
}

impl AlertSnapshot {
    pub fn render(&self) -> String {
        format!("{} {}", self.severity.icon(), self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogSnapshot {
    pub id: DialogId,
    pub title: String,
    pub message: String,
}

struct PendingDialog {
    title: String,
    message: String,
    responder: oneshot::Sender<bool>,
}

#[derive(Default)]
struct LayerState {
    container_mounted: bool,
    next_id: u64,
    alerts: Vec<AlertSnapshot>,
    dialogs: BTreeMap<DialogId, PendingDialog>,
    overlay: Option<String>,
}

impl LayerState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct FeedbackLayer {
    state: Arc<Mutex<LayerState>>,
}

impl FeedbackLayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_alert_container(&self) -> bool {
        self.lock().container_mounted
    }

    pub fn alerts(&self) -> Vec<AlertSnapshot> {
        self.lock().alerts.clone()
    }

    pub fn dismiss_alert(&self, id: AlertId) -> bool {
        remove_alert(&self.state, id)
    }

    pub fn pending_dialogs(&self) -> Vec<DialogSnapshot> {
        self.lock()
            .dialogs
            .iter()
            .map(|(id, dialog)| DialogSnapshot {
                id: *id,
                title: dialog.title.clone(),
                message: dialog.message.clone(),
            })
            .collect()
    }

    pub fn accept_dialog(&self, id: DialogId) -> bool {
        self.resolve_dialog(id, true)
    }

    pub fn dismiss_dialog(&self, id: DialogId) -> bool {
        self.resolve_dialog(id, false)
    }

    pub fn loading_message(&self) -> Option<String> {
        self.lock().overlay.clone()
    }

    fn resolve_dialog(&self, id: DialogId, accepted: bool) -> bool {
        let Some(dialog) = self.lock().dialogs.remove(&id) else {
            return false;
        };
        // The confirm future may already be gone; the dialog is closed either way.
        let _ = dialog.responder.send(accepted);
        true
    }

    fn lock(&self) -> MutexGuard<'_, LayerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn remove_alert(state: &Mutex<LayerState>, id: AlertId) -> bool {
    let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let before = guard.alerts.len();
    guard.alerts.retain(|alert| alert.id != id);
    guard.alerts.len() != before
}

#[async_trait]
impl FeedbackSurface for FeedbackLayer {
    fn show_alert(&self, message: &str, severity: Severity, duration: Duration) -> AlertId {
        let id = {
            let mut state = self.lock();
            state.container_mounted = true;
            let id = AlertId(state.allocate_id());
            state.alerts.push(AlertSnapshot {
                id,
                severity,
                message: message.to_string(),
            });
            id
        };

        if !duration.is_zero() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let state = Arc::clone(&self.state);
                    handle.spawn(async move {
                        tokio::time::sleep(duration).await;
                        remove_alert(&state, id);
                    });
                }
                Err(_) => {
                    tracing::debug!(alert = id.0, "no runtime for alert expiry; alert persists");
                }
            }
        }
        id
    }

    async fn confirm(&self, message: &str, title: &str) -> bool {
        let (responder, outcome) = oneshot::channel();
        {
            let mut state = self.lock();
            let id = DialogId(state.allocate_id());
            state.dialogs.insert(
                id,
                PendingDialog {
                    title: title.to_string(),
                    message: message.to_string(),
                    responder,
                },
            );
        }
        outcome.await.unwrap_or(false)
    }

    fn show_loading(&self, message: &str) {
        self.lock().overlay = Some(message.to_string());
    }

    fn hide_loading(&self) {
        self.lock().overlay = None;
    }
}

/// `dd/mm/yyyy`, `N/A` for blank input, the input itself when it is not a date.
pub fn format_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "N/A".to_string();
    }
    parse_date_time(trimmed)
        .map(|at| at.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// `dd/mm/yyyy HH:MM`, with the same fallbacks as [`format_date`].
pub fn format_date_time(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "N/A".to_string();
    }
    parse_date_time(trimmed)
        .map(|at| at.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

fn parse_date_time(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.naive_local());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(at);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
