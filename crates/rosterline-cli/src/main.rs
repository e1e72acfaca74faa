//! rosterline - command-line client for the student roster API.
//!
//! Wires the core library together against a real server. Each command is
//! its own process, so unlike a browser tab's session storage the session is
//! persisted (in the cache directory, or the OS keychain with `--keychain`)
//! and survives between invocations until logout or expiry.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rosterline_core::api::{unauthorized_channel, ApiClient, ApiResponse, StudentsApi};
use rosterline_core::auth::{
    CredentialStore, FileStorage, KeyringStorage, Navigator, Route, SessionController,
    SessionOptions, SessionStorage,
};
use rosterline_core::cache::QueryCache;
use rosterline_core::config::Config;
use rosterline_core::models::{CreateStudentRequest, LoginRequest};

// ============================================================================
// Constants
// ============================================================================

/// Session file inside the cache directory.
const SESSION_FILE: &str = "session.json";

/// Keychain service name for the session.
const KEYCHAIN_SERVICE: &str = "rosterline";

/// Prefix of the daily log files.
const LOG_FILE_PREFIX: &str = "rosterline.log";

// ============================================================================
// Command line
// ============================================================================

#[derive(Parser)]
#[command(name = "rosterline")]
#[command(about = "Manage a student roster from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL. Overrides ROSTERLINE_API_URL and the saved config.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Also write logs to a daily file in the cache directory
    #[arg(long, global = true)]
    log_file: bool,

    /// Keep the session in the OS keychain instead of the cache directory
    #[arg(long, global = true)]
    keychain: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and keep the session for later commands
    Login {
        /// Account email. Defaults to the last one used.
        #[arg(short, long)]
        email: Option<String>,
    },
    /// End the current session
    Logout,
    /// List students
    Students {
        /// Skip the cache and fetch from the server
        #[arg(short, long)]
        refresh: bool,
    },
    /// Add a student
    AddStudent {
        name: String,
        /// Grade level, 0 for kindergarten
        grade: i32,
    },
    /// Check that the API is reachable
    Health,
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Navigation target of a terminal session: there are no screens, so a
/// forced return to the login view becomes a hint on stderr.
#[derive(Debug, Default)]
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: Route) {
        info!(route = route.path(), "Navigate");
        if route == Route::Login {
            eprintln!("Session ended. Run `rosterline login` to sign in again.");
        }
    }
}

struct App {
    config: Config,
    session: SessionController,
    students: StudentsApi,
}

impl App {
    fn new(mut config: Config, api_url: Option<String>, keychain: bool) -> Result<Self> {
        if api_url.is_some() {
            config.api_url = api_url;
        }
        let storage = session_storage(keychain, &config)?;
        let credentials = Arc::new(CredentialStore::with_fallback(storage));

        let api_config = config.api_config();
        let (notifier, signals) = unauthorized_channel();
        let client = ApiClient::new(&api_config, credentials, Arc::new(notifier))
            .context("Failed to create API client")?;

        let cache = Arc::new(QueryCache::default());
        let session = SessionController::start(
            client.clone(),
            Arc::new(TerminalNavigator),
            signals,
            SessionOptions {
                expiry_check_interval: api_config.expiry_check_interval(),
                query_cache: Some(cache.clone()),
            },
        );

        Ok(Self {
            config,
            session,
            students: StudentsApi::new(client, cache),
        })
    }

    async fn login(&mut self, email: Option<String>) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt_email()?,
        };
        let password = rpassword::prompt_password("Password: ")?;
        if email.is_empty() || password.is_empty() {
            bail!("Email and password required");
        }

        let outcome = self.session.login(&LoginRequest::new(email.clone(), password)).await;
        if !outcome.success {
            bail!(outcome.error.unwrap_or_else(|| "Login failed".to_string()));
        }

        self.config.last_email = Some(email.clone());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        match self.session.expiry() {
            Some(expiry) => println!("Logged in as {} until {}", email, expiry.to_rfc3339()),
            None => println!("Logged in as {}", email),
        }
        Ok(())
    }

    async fn logout(&self) {
        if self.session.is_authenticated() {
            self.session.logout_remote().await;
            println!("Logged out");
        } else {
            println!("Not logged in");
        }
    }

    async fn list_students(&self, refresh: bool) -> Result<()> {
        self.require_session()?;
        let response = if refresh {
            self.students.refresh_students().await
        } else {
            self.students.list_students().await
        };
        let list = into_data(response)?;

        if list.students.is_empty() {
            println!("No students");
            return Ok(());
        }
        println!("{:>6}  {:<30}  {}", "ID", "NAME", "GRADE");
        for student in list.students.iter().filter(|s| !s.is_deleted()) {
            println!(
                "{:>6}  {:<30}  {}",
                student.id,
                student.name,
                student.display_grade()
            );
        }
        println!("{} student(s)", list.count);
        Ok(())
    }

    async fn add_student(&self, name: String, grade: i32) -> Result<()> {
        self.require_session()?;
        let student = into_data(
            self.students
                .create_student(&CreateStudentRequest { name, grade })
                .await,
        )?;
        println!("Added {} ({}) with id {}", student.name, student.display_grade(), student.id);
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        let health = into_data(self.students.health().await)?;
        if !health.is_healthy() {
            bail!("API unhealthy: {}", health.status);
        }
        println!("API healthy at {} ({})", self.session.client().base_url(), health.timestamp);
        Ok(())
    }

    fn require_session(&self) -> Result<()> {
        if !self.session.is_authenticated() {
            bail!("Not logged in. Run `rosterline login` first.");
        }
        Ok(())
    }
}

fn session_storage(keychain: bool, config: &Config) -> Result<Arc<dyn SessionStorage>> {
    if keychain {
        return Ok(Arc::new(KeyringStorage::new(KEYCHAIN_SERVICE)));
    }
    let path = config.cache_dir()?.join(SESSION_FILE);
    Ok(Arc::new(FileStorage::new(path)))
}

fn into_data<T>(response: ApiResponse<T>) -> Result<T> {
    response.into_result().map_err(|e| anyhow::anyhow!(e.message))
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    Ok(email.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load().context("Failed to load config")?;

    let log_dir = if cli.log_file {
        Some(config.cache_dir()?)
    } else {
        None
    };
    let _guard = init_tracing(log_dir.as_deref());
    info!("rosterline starting");

    let mut app = App::new(config, cli.api_url, cli.keychain)?;

    match cli.command {
        Commands::Login { email } => app.login(email).await?,
        Commands::Logout => app.logout().await,
        Commands::Students { refresh } => app.list_students(refresh).await?,
        Commands::AddStudent { name, grade } => app.add_student(name, grade).await?,
        Commands::Health => app.health().await?,
    }

    Ok(())
}
