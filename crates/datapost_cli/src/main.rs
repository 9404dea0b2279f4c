//! `datapost` command-line front-end.
//!
//! # Responsibility
//! - Expose criteria validation, recipient preview, transmission and
//!   acknowledgement over a SQLite database file.
//! - Map core errors to stable codes on stderr and a non-zero exit status.

use clap::{Parser, Subcommand};
use datapost_core::{
    core_version, init_cli_logging, load_config, open_db, validate_criteria, CoreConfig,
    PackageRepository, PackageService, Resolver, SqliteDirectory, SqlitePackageRepository,
    StaticAttachments, TransmissionService,
};
use log::info;
use serde_json::Value;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "datapost")]
#[command(about = "Route data packages to stream subscribers by delivery criteria")]
struct Cli {
    /// JSON config file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check a criteria document against the configured profile.
    Validate { criteria: PathBuf },
    /// List subscriptions a criteria document would reach on a stream.
    Preview {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        stream: Uuid,
        criteria: PathBuf,
    },
    /// Run the transmission saga for a draft package.
    Transmit {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        package: Uuid,
        /// Treat the package's attachments as completed.
        #[arg(long)]
        attachments_complete: bool,
    },
    /// Mark a transmitted package as acknowledged.
    Acknowledge {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        package: Uuid,
    },
    /// Print the core version.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let config = match cli.config.as_deref() {
        Some(path) => load_config(path)?,
        None => CoreConfig::default(),
    };
    if let Some(log_dir) = config.log_dir.as_deref() {
        init_cli_logging(&config.log_level, log_dir)?;
    }

    match cli.command {
        Command::Validate { criteria } => validate(&config, &criteria),
        Command::Preview {
            db,
            stream,
            criteria,
        } => preview(&config, db, stream, &criteria),
        Command::Transmit {
            db,
            package,
            attachments_complete,
        } => transmit(&config, db, package, attachments_complete),
        Command::Acknowledge { db, package } => acknowledge(&config, db, package),
        Command::Version => {
            println!("datapost {}", core_version());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn validate(config: &CoreConfig, criteria: &Path) -> Result<ExitCode, Box<dyn Error>> {
    let document = read_json(criteria)?;
    match validate_criteria(&document, &config.criteria) {
        Ok(()) => {
            println!("valid");
            Ok(ExitCode::SUCCESS)
        }
        Err(errors) => {
            for err in errors {
                eprintln!("{}: {err}", err.code());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn preview(
    config: &CoreConfig,
    db: Option<PathBuf>,
    stream: Uuid,
    criteria: &Path,
) -> Result<ExitCode, Box<dyn Error>> {
    let document = read_json(criteria)?;
    let conn = open_db(db_path(config, db))?;
    let directory = SqliteDirectory::new(&conn);
    let recipients = Resolver::new(&directory, &config.criteria)
        .resolve_value(Some(&document), stream)?;

    let ids: Vec<Uuid> = recipients.iter().copied().collect();
    for subscription in directory.list_subscriptions(&ids)? {
        println!(
            "{} organization={}",
            subscription.id, subscription.organization_id
        );
    }
    println!("recipients={}", recipients.len());
    Ok(ExitCode::SUCCESS)
}

fn transmit(
    config: &CoreConfig,
    db: Option<PathBuf>,
    package_id: Uuid,
    attachments_complete: bool,
) -> Result<ExitCode, Box<dyn Error>> {
    let mut conn = open_db(db_path(config, db))?;
    let package = SqlitePackageRepository::new(&conn).get_package(package_id)?;
    let Some(package) = package else {
        eprintln!("package_not_found: data package not found: {package_id}");
        return Ok(ExitCode::FAILURE);
    };

    let service = TransmissionService::new(
        StaticAttachments(attachments_complete),
        config.criteria.clone(),
    );
    match service.transmit(&mut conn, &package) {
        Ok(sent) => {
            info!("event=cli_transmit module=cli status=ok package_id={package_id}");
            println!(
                "{} state={} sent_at={}",
                sent.id,
                sent.state(),
                sent.sent_at.unwrap_or_default()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}: {err}", err.code());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn acknowledge(
    config: &CoreConfig,
    db: Option<PathBuf>,
    package_id: Uuid,
) -> Result<ExitCode, Box<dyn Error>> {
    let conn = open_db(db_path(config, db))?;
    let service = PackageService::new(
        SqlitePackageRepository::new(&conn),
        SqliteDirectory::new(&conn),
        config.criteria.clone(),
    );
    let package = service.acknowledge(package_id)?;
    println!(
        "{} state={} acknowledged_at={}",
        package.id,
        package.state(),
        package.acknowledged_at.unwrap_or_default()
    );
    Ok(ExitCode::SUCCESS)
}

fn db_path(config: &CoreConfig, db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(|| config.db_path.clone())
}

fn read_json(path: &Path) -> Result<Value, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read `{}`: {err}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}
