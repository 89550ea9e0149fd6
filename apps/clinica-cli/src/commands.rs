use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clinica_api_client::{
    ClinicaApiClient, PacientePage, PacienteSearch, UsuarioCreate, invalid_paciente_choice,
};
use clinica_client_core::feedback::{
    DEFAULT_ALERT_DURATION, DEFAULT_CONFIRM_TITLE, DEFAULT_LOADING_MESSAGE,
};
use clinica_client_core::{
    ClientConfig, ClinicaSession, JsonFileStore, RequiredRoles, Role, Severity, format_date_time,
};
use serde_json::{Value, json};

use crate::terminal::{TerminalFeedback, TerminalNavigator};
use crate::{ClinicaCli, Commands, PacientesCommand, UsuariosCommand};

const SESSION_FILE: &str = "session.json";
const SHARED_FILE: &str = "shared.json";

// Mirrors the role checks enforced by the backend routes.
const PACIENTE_WRITERS: [Role; 3] = [Role::Admin, Role::Medico, Role::Admisionista];
const PACIENTE_EDITORS: [Role; 2] = [Role::Admin, Role::Medico];

pub async fn execute(cli: ClinicaCli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let session = Arc::new(open_session(config, &cli.state_dir));
    let client = ClinicaApiClient::new(Arc::clone(&session))?;

    let outcome = dispatch(&client, cli.command).await;
    session.shutdown();
    outcome
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            ClientConfig::from_toml_str(&raw)?
        }
        None => ClientConfig::default(),
    };
    config.api.apply_env_overrides()?;
    // The process exits before a delayed redirect could fire.
    config.access.denial_redirect_delay_ms = 0;
    Ok(config.validated()?)
}

fn open_session(config: ClientConfig, state_dir: &Path) -> ClinicaSession {
    let navigator = Arc::new(TerminalNavigator::new(config.access.login_route.clone()));
    ClinicaSession::new(
        config,
        Arc::new(JsonFileStore::new(state_dir.join(SESSION_FILE))),
        Arc::new(JsonFileStore::new(state_dir.join(SHARED_FILE))),
        navigator,
        Arc::new(TerminalFeedback::new()),
    )
}

async fn dispatch(client: &ClinicaApiClient, command: Commands) -> Result<()> {
    let session = client.session();
    match command {
        Commands::Login(args) => {
            let token = loading(session, client.login(&args.username, &args.password)).await?;
            alert(
                session,
                &format!(
                    "Bienvenido, {} ({})",
                    token.user.display_name(),
                    token.user.rol
                ),
                Severity::Success,
            );
            Ok(())
        }
        Commands::Logout => {
            client.logout()?;
            alert(session, "Sesión cerrada", Severity::Info);
            Ok(())
        }
        Commands::Whoami => whoami(session),
        Commands::Me => {
            require_auth(session)?;
            let me = loading(session, client.me()).await?;
            print_optional(me.map(|user| json!(user)))
        }
        Commands::Health => print_optional(loading(session, client.health()).await?),
        Commands::Stats => {
            require_role(session, Role::Admin)?;
            print_optional(loading(session, client.estadisticas()).await?)
        }
        Commands::Pacientes(command) => pacientes(client, command).await,
        Commands::Usuarios(command) => usuarios(client, command).await,
        Commands::ActiveUsers => active_users(session),
        Commands::Track => track(session).await,
    }
}

async fn pacientes(client: &ClinicaApiClient, command: PacientesCommand) -> Result<()> {
    let session = client.session();
    match command {
        PacientesCommand::List { limit, offset } => {
            require_role(session, Role::STAFF.as_slice())?;
            let page = PacientePage::new(limit, offset);
            print_optional(loading(session, client.list_pacientes(page)).await?)
        }
        PacientesCommand::Get { documento } => {
            require_patient_access(session, &documento)?;
            print_optional(loading(session, client.get_paciente(&documento)).await?)
        }
        PacientesCommand::Search {
            nombre,
            documento,
            limit,
        } => {
            require_role(session, Role::STAFF.as_slice())?;
            if nombre.is_none() && documento.is_none() {
                bail!("indique --nombre o --documento");
            }
            let search = PacienteSearch {
                nombre,
                documento,
                limit,
            }
            .with_limit(limit);
            print_optional(loading(session, client.search_pacientes(&search)).await?)
        }
        PacientesCommand::Create { data } => {
            require_role(session, PACIENTE_WRITERS)?;
            let paciente = parse_paciente(&data)?;
            let created = loading(session, client.create_paciente(&paciente)).await?;
            if created.is_some() {
                alert(session, "Paciente creado", Severity::Success);
            }
            print_optional(created)
        }
        PacientesCommand::Update { documento, data } => {
            require_role(session, PACIENTE_EDITORS)?;
            let changes = parse_paciente(&data)?;
            let updated = loading(session, client.update_paciente(&documento, &changes)).await?;
            if updated.is_some() {
                alert(session, "Paciente actualizado", Severity::Success);
            }
            print_optional(updated)
        }
        PacientesCommand::Delete { documento, yes } => {
            require_role(session, Role::Admin)?;
            let confirmed = yes
                || session
                    .feedback()
                    .confirm(
                        &format!("¿Eliminar el paciente {documento}?"),
                        DEFAULT_CONFIRM_TITLE,
                    )
                    .await;
            if !confirmed {
                alert(session, "Operación cancelada", Severity::Warning);
                return Ok(());
            }
            if loading(session, client.delete_paciente(&documento))
                .await?
                .is_some()
            {
                alert(session, "Paciente eliminado", Severity::Success);
            }
            Ok(())
        }
        PacientesCommand::Pdf { documento, output } => {
            require_patient_access(session, &documento)?;
            let saved = loading(session, client.download_paciente_pdf(&documento, &output)).await?;
            if let Some(path) = saved {
                alert(
                    session,
                    &format!("Historia clínica guardada en {}", path.display()),
                    Severity::Success,
                );
            }
            Ok(())
        }
    }
}

async fn usuarios(client: &ClinicaApiClient, command: UsuariosCommand) -> Result<()> {
    let session = client.session();
    require_role(session, Role::Admin)?;
    match command {
        UsuariosCommand::List { limit } => {
            print_optional(loading(session, client.list_usuarios(limit)).await?)
        }
        UsuariosCommand::Create {
            username,
            password,
            rol,
            nombres,
            apellidos,
            documento_vinculado,
        } => {
            if rol == Role::Paciente && documento_vinculado.is_none() {
                bail!("un usuario paciente requiere --documento-vinculado");
            }
            let usuario = UsuarioCreate {
                username,
                password,
                rol,
                nombres,
                apellidos,
                documento_vinculado,
            };
            let created = loading(session, client.create_usuario(&usuario)).await?;
            if let Some(user) = &created {
                alert(
                    session,
                    &format!("Usuario {} creado", user.username),
                    Severity::Success,
                );
            }
            print_optional(created.map(|user| json!(user)))
        }
    }
}

fn whoami(session: &ClinicaSession) -> Result<()> {
    let Some(stored) = session.tokens().get() else {
        alert(session, "No hay sesión activa", Severity::Warning);
        return Ok(());
    };
    let claims = session.tokens().claims();
    let expires_at = claims
        .as_ref()
        .and_then(|claims| claims.expires_at_utc())
        .map(|at| format_date_time(&at.to_rfc3339()));
    print_json(&json!({
        "user": stored.user,
        "subject": claims.as_ref().and_then(|claims| claims.subject.clone()),
        "expires_at": expires_at,
        "valid": session.tokens().is_valid(),
    }))
}

fn active_users(session: &ClinicaSession) -> Result<()> {
    let ids = session.presence().active_user_ids();
    let registry = session.presence().registry();
    let users = ids
        .iter()
        .map(|id| {
            let entry = registry.get(&id.to_string());
            json!({
                "id": id,
                "rol": entry.map(|entry| entry.rol.clone()),
                "last_seen": entry.map(|entry| entry.last_seen),
            })
        })
        .collect::<Vec<_>>();
    print_json(&json!({ "total": ids.len(), "users": users }))
}

async fn track(session: &ClinicaSession) -> Result<()> {
    require_auth(session)?;
    if !session.start_presence() {
        bail!("no se pudo iniciar el seguimiento de presencia");
    }
    alert(
        session,
        "Sesión marcada como activa. Ctrl-C para salir.",
        Severity::Info,
    );
    tokio::signal::ctrl_c()
        .await
        .context("wait for ctrl-c")?;
    session.shutdown();
    Ok(())
}

fn require_auth(session: &ClinicaSession) -> Result<()> {
    if session.access_gate().require_auth() {
        Ok(())
    } else {
        Err(anyhow!("sesión requerida"))
    }
}

fn require_role(
    session: &ClinicaSession,
    allowed: impl Into<RequiredRoles>,
) -> Result<()> {
    if session.access_gate().require_role(allowed) {
        Ok(())
    } else {
        Err(anyhow!("acceso denegado"))
    }
}

fn require_patient_access(session: &ClinicaSession, documento: &str) -> Result<()> {
    require_auth(session)?;
    if session.access_gate().can_access_patient(documento) {
        return Ok(());
    }
    alert(
        session,
        "No tiene permiso para ver este paciente",
        Severity::Danger,
    );
    Err(anyhow!("acceso denegado al paciente {documento}"))
}

async fn loading<T>(session: &ClinicaSession, call: impl Future<Output = T>) -> T {
    session.feedback().show_loading(DEFAULT_LOADING_MESSAGE);
    let outcome = call.await;
    session.feedback().hide_loading();
    outcome
}

fn alert(session: &ClinicaSession, message: &str, severity: Severity) {
    session
        .feedback()
        .show_alert(message, severity, DEFAULT_ALERT_DURATION);
}

fn parse_object(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw).context("--data must be valid JSON")?;
    if !value.is_object() {
        bail!("--data must be a JSON object");
    }
    Ok(value)
}

fn parse_paciente(raw: &str) -> Result<Value> {
    let paciente = parse_object(raw)?;
    if let Some(choice) = invalid_paciente_choice(&paciente) {
        bail!(
            "{} inválido: {:?} (opciones: {})",
            choice.field,
            choice.value,
            choice.allowed.join(", ")
        );
    }
    Ok(paciente)
}

fn print_optional(value: Option<Value>) -> Result<()> {
    match value {
        Some(value) => print_json(&value),
        None => Ok(()),
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clinica_client_core::{SessionUser, TokenStore};

    use super::*;

    fn session_in(dir: &Path) -> ClinicaSession {
        open_session(ClientConfig::default(), dir)
    }

    #[test]
    fn parse_object_rejects_non_objects() {
        assert!(parse_object(r#"{"documento":"12345"}"#).is_ok());
        assert!(parse_object("[1,2]").is_err());
        assert!(parse_object("{oops").is_err());
    }

    #[test]
    fn parse_paciente_rejects_unknown_choices() {
        assert!(parse_paciente(r#"{"documento":"12345","tipo_documento":"CC","grupo_sanguineo":"O+"}"#).is_ok());

        let err = parse_paciente(r#"{"documento":"12345","grupo_sanguineo":"C+"}"#)
            .expect_err("unknown blood group");
        let message = err.to_string();
        assert!(message.starts_with("grupo_sanguineo inválido"), "{message}");
        assert!(message.contains("AB+"), "{message}");
    }

    #[tokio::test]
    async fn role_denial_redirects_before_the_command_returns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clinica.toml");
        std::fs::write(&path, "[access]\ndenial_redirect_delay_ms = 2000\n").expect("write config");
        let config = load_config(Some(&path)).expect("config");
        assert_eq!(config.access.denial_redirect_delay_ms, 0);

        let navigator = Arc::new(clinica_client_core::RecordingNavigator::new());
        let session = ClinicaSession::new(
            config,
            Arc::new(clinica_client_core::MemoryStore::new()),
            Arc::new(clinica_client_core::MemoryStore::new()),
            navigator.clone(),
            Arc::new(clinica_client_core::FeedbackLayer::new()),
        );
        session
            .tokens()
            .save("a.b.c", &SessionUser::new(6, "paciente_juan", Role::Paciente))
            .expect("save");

        assert!(require_role(&session, Role::Admin).is_err());
        assert_eq!(navigator.visits(), vec![session.login_route().to_string()]);
    }

    #[test]
    fn sessions_persist_across_processes_through_state_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let user = SessionUser::new(3, "admisionista1", Role::Admisionista);
        session_in(dir.path())
            .tokens()
            .save("a.b.c", &user)
            .expect("save");

        let reopened = session_in(dir.path());
        assert_eq!(reopened.tokens().user(), Some(user));
        assert!(dir.path().join(SESSION_FILE).exists());

        let standalone =
            TokenStore::new(Arc::new(JsonFileStore::new(dir.path().join(SESSION_FILE))));
        assert!(standalone.is_authenticated());
    }

    #[test]
    fn load_config_reads_toml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clinica.toml");
        std::fs::write(
            &path,
            "[api]\nBASE_URL = \"http://192.168.49.2:30800/\"\nRETRY_DELAY = 250\n",
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("config");
        assert_eq!(config.api.retry_delay_ms, 250);
        assert_eq!(config.api.base_url, "http://192.168.49.2:30800");
    }

    #[test]
    fn patient_access_is_checked_locally() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_in(dir.path());
        session
            .tokens()
            .save(
                "a.b.c",
                &SessionUser::new(6, "paciente_juan", Role::Paciente).with_documento_vinculado("12345"),
            )
            .expect("save");

        assert!(require_patient_access(&session, "12345").is_ok());
        assert!(require_patient_access(&session, "67890").is_err());
    }
}
