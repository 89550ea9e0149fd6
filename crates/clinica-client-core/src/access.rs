use std::sync::Arc;

use crate::config::AccessConfig;
use crate::feedback::{DEFAULT_ALERT_DURATION, FeedbackSurface, Severity};
use crate::navigation::{Navigator, navigate_after};
use crate::roles::Role;
use crate::token_store::TokenStore;

pub const ROLE_DENIED_MESSAGE: &str = "Acceso denegado. Rol insuficiente.";

/// One role or a set of roles accepted by [`AccessGate::require_role`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredRoles(Vec<Role>);

impl RequiredRoles {
    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn roles(&self) -> &[Role] {
        &self.0
    }
}

impl From<Role> for RequiredRoles {
    fn from(role: Role) -> Self {
        Self(vec![role])
    }
}

impl From<&[Role]> for RequiredRoles {
    fn from(roles: &[Role]) -> Self {
        Self(roles.to_vec())
    }
}

impl<const N: usize> From<[Role; N]> for RequiredRoles {
    fn from(roles: [Role; N]) -> Self {
        Self(roles.to_vec())
    }
}

impl From<Vec<Role>> for RequiredRoles {
    fn from(roles: Vec<Role>) -> Self {
        Self(roles)
    }
}

/// Synchronous checks against the stored user; denials redirect to the login route.
#[derive(Clone)]
pub struct AccessGate {
    tokens: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
    feedback: Arc<dyn FeedbackSurface>,
    config: AccessConfig,
}

impl AccessGate {
    pub fn new(
        tokens: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
        feedback: Arc<dyn FeedbackSurface>,
        config: AccessConfig,
    ) -> Self {
        Self {
            tokens,
            navigator,
            feedback,
            config,
        }
    }

    pub fn require_auth(&self) -> bool {
        if self.tokens.is_authenticated() {
            return true;
        }
        tracing::info!(route = %self.config.login_route, "authentication required");
        self.navigator.navigate(&self.config.login_route);
        false
    }

    /// A missing user redirects at once; a wrong role shows a denial alert and
    /// redirects after the configured delay so the alert can be read.
    pub fn require_role(&self, allowed: impl Into<RequiredRoles>) -> bool {
        let allowed = allowed.into();
        let Some(user) = self.tokens.user() else {
            self.navigator.navigate(&self.config.login_route);
            return false;
        };
        if allowed.contains(user.rol) {
            return true;
        }

        tracing::warn!(
            username = %user.username,
            rol = %user.rol,
            allowed = ?allowed.roles(),
            "role denied"
        );
        self.feedback
            .show_alert(ROLE_DENIED_MESSAGE, Severity::Danger, DEFAULT_ALERT_DURATION);
        navigate_after(
            Arc::clone(&self.navigator),
            &self.config.login_route,
            self.config.denial_redirect_delay(),
        );
        false
    }

    /// Staff may open any record; a patient only the record linked to their account.
    pub fn can_access_patient(&self, documento: &str) -> bool {
        let Some(user) = self.tokens.user() else {
            return false;
        };
        if user.rol.is_staff() {
            return true;
        }
        user.rol == Role::Paciente && user.documento_vinculado.as_deref() == Some(documento)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::feedback::FeedbackLayer;
    use crate::navigation::RecordingNavigator;
    use crate::session::SessionUser;
    use crate::storage::MemoryStore;

    struct Fixture {
        gate: AccessGate,
        tokens: Arc<TokenStore>,
        navigator: RecordingNavigator,
        feedback: FeedbackLayer,
    }

    fn fixture(user: Option<SessionUser>) -> Fixture {
        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStore::new())));
        if let Some(user) = user {
            tokens.save("a.b.c", &user).expect("save");
        }
        let navigator = RecordingNavigator::new();
        let feedback = FeedbackLayer::new();
        let gate = AccessGate::new(
            Arc::clone(&tokens),
            Arc::new(navigator.clone()),
            Arc::new(feedback.clone()),
            AccessConfig::default(),
        );
        Fixture {
            gate,
            tokens,
            navigator,
            feedback,
        }
    }

    #[test]
    fn require_auth_redirects_anonymous_users() {
        let anonymous = fixture(None);
        assert!(!anonymous.gate.require_auth());
        assert_eq!(anonymous.navigator.visits(), vec!["login.html".to_string()]);

        let signed_in = fixture(Some(SessionUser::new(1, "admin", Role::Admin)));
        assert!(signed_in.gate.require_auth());
        assert!(signed_in.navigator.visits().is_empty());
    }

    #[test]
    fn require_role_accepts_single_or_many() {
        let medico = fixture(Some(SessionUser::new(2, "dr_rodriguez", Role::Medico)));
        assert!(medico.gate.require_role(Role::Medico));
        assert!(medico.gate.require_role([Role::Admin, Role::Medico]));
        assert!(medico.gate.require_role(Role::STAFF.as_slice()));
        assert!(medico.navigator.visits().is_empty());
        assert!(medico.feedback.alerts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn require_role_denial_alerts_then_redirects_after_delay() {
        let paciente = fixture(Some(SessionUser::new(6, "paciente_juan", Role::Paciente)));
        assert!(!paciente.gate.require_role(vec![Role::Admin]));

        let alerts = paciente.feedback.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, ROLE_DENIED_MESSAGE);
        assert_eq!(alerts[0].severity, Severity::Danger);
        assert!(paciente.navigator.visits().is_empty());

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(paciente.navigator.count_for("login.html"), 1);
        assert!(paciente.tokens.is_authenticated());
    }

    #[test]
    fn require_role_without_user_redirects_immediately() {
        let anonymous = fixture(None);
        assert!(!anonymous.gate.require_role(Role::Admin));
        assert_eq!(anonymous.navigator.count_for("login.html"), 1);
        assert!(anonymous.feedback.alerts().is_empty());
    }

    #[test]
    fn staff_can_access_any_patient() {
        for role in Role::STAFF {
            let staff = fixture(Some(SessionUser::new(1, "staff", role)));
            assert!(staff.gate.can_access_patient("12345"));
            assert!(staff.gate.can_access_patient(""));
        }
    }

    #[test]
    fn paciente_can_access_only_linked_document() {
        let linked = fixture(Some(
            SessionUser::new(6, "paciente_juan", Role::Paciente).with_documento_vinculado("12345"),
        ));
        assert!(linked.gate.can_access_patient("12345"));
        assert!(!linked.gate.can_access_patient("67890"));

        let unlinked = fixture(Some(SessionUser::new(8, "paciente_x", Role::Paciente)));
        assert!(!unlinked.gate.can_access_patient("12345"));
    }

    #[test]
    fn anonymous_cannot_access_patients() {
        assert!(!fixture(None).gate.can_access_patient("12345"));
    }
}
