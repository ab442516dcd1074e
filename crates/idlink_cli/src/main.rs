//! Command-line entry point for idlink.
//!
//! # Responsibility
//! - Run one identification against a SQLite contact store.
//! - Print the consolidated contact as JSON (`{"contact": {...}}`).
//! - Provide a `ping` probe to verify core crate wiring.

use clap::{Parser, Subcommand};
use idlink_core::db::open_db;
use idlink_core::{
    init_logging, IdentifyError, IdentifyResponse, IdentityConfig, IdentityService,
    SqliteContactRepository,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "idlink", version, about = "Reconcile contact identities")]
struct Cli {
    /// SQLite database file. Overrides IDLINK_DATABASE_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level. Overrides IDLINK_LOG_LEVEL.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files. Overrides IDLINK_LOG_DIR.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Identify one email/phone observation and print the merged contact.
    Identify {
        #[arg(long)]
        email: Option<String>,
        #[arg(long = "phone")]
        phone_number: Option<String>,
    },
    /// Print core liveness and version.
    Ping,
}

#[derive(Serialize)]
struct ContactEnvelope<'a> {
    contact: &'a IdentifyResponse,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: &'a str,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Command::Ping => {
            println!("idlink_core ping={}", idlink_core::ping());
            println!("idlink_core version={}", idlink_core::core_version());
            ExitCode::SUCCESS
        }
        Command::Identify {
            ref email,
            ref phone_number,
        } => run_identify(&cli, email.as_deref(), phone_number.as_deref()),
    }
}

fn run_identify(cli: &Cli, email: Option<&str>, phone_number: Option<&str>) -> ExitCode {
    let config = match resolve_config(cli) {
        Ok(config) => config,
        Err(message) => return fail(&message, ExitCode::from(2)),
    };

    if let Some(log_dir) = &config.log_dir {
        if let Err(err) = init_logging(&config.log_level, &log_dir.to_string_lossy()) {
            eprintln!("idlink: logging disabled: {err}");
        }
    }

    let conn = match open_db(&config.database_path) {
        Ok(conn) => conn,
        Err(err) => return fail(&format!("failed to open contact store: {err}"), ExitCode::FAILURE),
    };
    let repo = match SqliteContactRepository::try_new(&conn) {
        Ok(repo) => repo,
        Err(err) => return fail(&format!("contact store not ready: {err}"), ExitCode::FAILURE),
    };

    match IdentityService::new(repo).identify(email, phone_number) {
        Ok(response) => print_json(&ContactEnvelope { contact: &response }),
        Err(IdentifyError::Validation(_)) => fail(
            "Either email or phoneNumber must be provided",
            ExitCode::from(2),
        ),
        Err(err) => {
            log::error!("event=cli_identify module=cli status=error error_code={}", err.code());
            fail("Internal server error", ExitCode::FAILURE)
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<IdentityConfig, String> {
    let lookup = |name: &str| std::env::var(name).ok();
    let overrides = [
        (
            idlink_core::config::DATABASE_PATH_VAR,
            cli.db.as_ref().map(|path| path.to_string_lossy().into_owned()),
        ),
        (idlink_core::config::LOG_LEVEL_VAR, cli.log_level.clone()),
        (
            idlink_core::config::LOG_DIR_VAR,
            cli.log_dir
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned()),
        ),
    ];

    IdentityConfig::from_lookup(|name| {
        overrides
            .iter()
            .find(|(var, value)| *var == name && value.is_some())
            .and_then(|(_, value)| value.clone())
            .or_else(|| lookup(name))
    })
    .map_err(|err| err.to_string())
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("idlink: failed to encode response: {err}");
            ExitCode::FAILURE
        }
    }
}

fn fail(message: &str, code: ExitCode) -> ExitCode {
    match serde_json::to_string(&ErrorEnvelope { error: message }) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("idlink: {message}"),
    }
    code
}
