#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clinica_client_core::Role;

mod commands;
mod terminal;

pub use terminal::{TerminalFeedback, TerminalNavigator};

#[derive(Parser, Debug)]
#[command(name = "clinica")]
#[command(about = "Clinical records client: sessions, patients, users and presence")]
pub struct ClinicaCli {
    /// TOML config file with `[api]`, `[presence]` and `[access]` tables.
    #[arg(long, global = true, env = "CLINICA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding `session.json` and the shared `shared.json`.
    #[arg(long, global = true, env = "CLINICA_STATE_DIR", default_value = ".clinica")]
    pub state_dir: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and store the session token
    Login(LoginArgs),
    /// Erase the stored session
    Logout,
    /// Show the stored user, token claims and validity
    Whoami,
    /// Fetch the signed-in profile from the backend
    Me,
    /// Check backend health
    Health,
    /// Show system statistics (admin)
    Stats,
    /// Patient records
    #[command(subcommand)]
    Pacientes(PacientesCommand),
    /// User accounts (admin)
    #[command(subcommand)]
    Usuarios(UsuariosCommand),
    /// List users with a recent heartbeat
    ActiveUsers,
    /// Keep this session marked as online until Ctrl-C
    Track,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(short, long)]
    pub username: String,
    #[arg(short, long, env = "CLINICA_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand, Debug)]
pub enum PacientesCommand {
    List {
        #[arg(long, default_value_t = clinica_api_client::DEFAULT_PAGE_LIMIT)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    Get {
        documento: String,
    },
    Search {
        #[arg(long)]
        nombre: Option<String>,
        #[arg(long)]
        documento: Option<String>,
        #[arg(long, default_value_t = clinica_api_client::DEFAULT_PAGE_LIMIT)]
        limit: u32,
    },
    Create {
        /// Patient record as a JSON object.
        #[arg(long)]
        data: String,
    },
    Update {
        documento: String,
        /// Fields to change as a JSON object.
        #[arg(long)]
        data: String,
    },
    Delete {
        documento: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Download the clinical history PDF
    Pdf {
        documento: String,
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum UsuariosCommand {
    List {
        #[arg(long, default_value_t = clinica_api_client::DEFAULT_USUARIOS_LIMIT)]
        limit: u32,
    },
    Create {
        #[arg(long)]
        username: String,
        #[arg(long, env = "CLINICA_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        rol: Role,
        #[arg(long)]
        nombres: Option<String>,
        #[arg(long)]
        apellidos: Option<String>,
        #[arg(long)]
        documento_vinculado: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = ClinicaCli::parse();
    init_tracing(cli.json_logs);
    commands::execute(cli).await
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
