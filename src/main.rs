//! `auto_import` -- command-line front end over the import engine.
//!
//! # Environment variables
//!
//! | Variable                      | Required        | Description                                 |
//! |-------------------------------|-----------------|---------------------------------------------|
//! | `AUTO_IMPORT_SITE_URL`        | site commands   | Login page of the target system             |
//! | `AUTO_IMPORT_LOGIN`           | site commands   | UI login                                    |
//! | `AUTO_IMPORT_PASSWORD`        | site commands   | UI password                                 |
//! | `AUTO_IMPORT_SYSTEM_PASSWORD` | no              | Secret for the reference-data REST endpoint |
//! | `AUTO_IMPORT_CONFIG`          | no              | Config file instead of the platform default |
//!
//! `validate --prefetched` works offline and reads none of the site variables.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auto_import::export::{export_schema_template, exporter_for, Exporter};
use auto_import::models::{Credentials, ValidationReport};
use auto_import::{AppConfig, ImportWorkflow, Prefetched, WorkflowOutcome};

#[derive(Parser, Debug)]
#[command(name = "auto_import", version, about = "Validate spreadsheets and run rollback-mode bulk imports")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the login form over HTTP
    TestConnection,
    /// Log in and print the administration URL
    Admin,
    /// List the import formats
    Formats,
    /// Print a format's schema or write an import template
    Schema {
        format: String,
        /// Write an Excel import template instead of printing the schema
        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// Resolve reference lists for a format
    Lists {
        format: String,
        /// Save schema and lists as a bundle for `--prefetched`
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Validate a spreadsheet against a format
    Validate(FileArgs),
    /// Validate, then import a spreadsheet in rollback mode
    Import(FileArgs),
}

#[derive(clap::Args, Debug)]
struct FileArgs {
    format: String,
    file: PathBuf,
    /// Schema and lists bundle written by `lists --save`
    #[arg(long)]
    prefetched: Option<PathBuf>,
    /// Write the validation report (.xlsx, .csv or .json)
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Command {
    /// Whether the command has to reach the target system.
    fn needs_credentials(&self) -> bool {
        !matches!(self, Self::Validate(FileArgs { prefetched: Some(_), .. }))
    }
}

fn credentials_from_env() -> Result<Credentials> {
    let var = |name: &str| std::env::var(name).with_context(|| format!("{name} is not set"));

    let credentials = Credentials::new(
        var("AUTO_IMPORT_SITE_URL")?,
        var("AUTO_IMPORT_LOGIN")?,
        var("AUTO_IMPORT_PASSWORD")?,
        std::env::var("AUTO_IMPORT_SYSTEM_PASSWORD").unwrap_or_default(),
    );

    let problems = credentials.validate();
    if !problems.is_empty() {
        bail!("Invalid credentials: {}", problems.join(", "));
    }
    Ok(credentials)
}

fn load_config() -> Result<AppConfig> {
    let config = match std::env::var_os("AUTO_IMPORT_CONFIG") {
        Some(path) => AppConfig::load_from(Path::new(&path))?,
        None => AppConfig::load()?,
    };

    let problems = config.validate();
    if !problems.is_empty() {
        bail!("Invalid configuration:\n  {}", problems.join("\n  "));
    }
    Ok(config)
}

fn load_prefetched(path: Option<&Path>) -> Result<Option<Prefetched>> {
    path.map(|path| {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path:?}"))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {path:?}"))
    })
    .transpose()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(report: &ValidationReport, path: Option<&Path>) -> Result<()> {
    println!("{}", report.keys.message);
    println!("{}", report.lists.message);

    if let Some(path) = path {
        exporter_for(path)?
            .export(report, path)
            .with_context(|| format!("Failed to write report to {path:?}"))?;
        tracing::info!(path = %path.display(), "📄 Validation report written");
    }
    Ok(())
}

async fn run(workflow: &ImportWorkflow, command: &Command) -> Result<()> {
    let credentials = if command.needs_credentials() {
        Some(credentials_from_env()?)
    } else {
        None
    };
    let site = || credentials.as_ref().context("site credentials were not loaded");

    match command {
        Command::TestConnection => {
            let result = workflow.test_connection(site()?).await;
            print_json(&result)?;
            if !result.success {
                bail!("{}", result.message);
            }
        }
        Command::Admin => {
            let admin = workflow.navigate_admin(site()?).await?;
            println!("{}", admin.url);
        }
        Command::Formats => {
            for format in workflow.list_formats(site()?).await? {
                println!("{}", format.name);
            }
        }
        Command::Schema { format, template } => {
            let schema = workflow.extract_schema(site()?, format).await?;
            match template {
                Some(path) => {
                    export_schema_template(&schema, path)?;
                    tracing::info!(path = %path.display(), "📄 Import template written");
                }
                None => print_json(&schema)?,
            }
        }
        Command::Lists { format, save } => {
            let schema = workflow.extract_schema(site()?, format).await?;
            let (fields, lists) = workflow.resolve_reference_lists(site()?, &schema).await?;
            print_json(&fields)?;

            if let Some(path) = save {
                let bundle = serde_json::to_string_pretty(&Prefetched { schema, lists })?;
                std::fs::write(path, bundle).with_context(|| format!("Failed to write {path:?}"))?;
            }
        }
        Command::Validate(args) => {
            let Prefetched { schema, lists } = match load_prefetched(args.prefetched.as_deref())? {
                Some(prefetched) => prefetched,
                None => {
                    let schema = workflow.extract_schema(site()?, &args.format).await?;
                    let (_, lists) = workflow.resolve_reference_lists(site()?, &schema).await?;
                    Prefetched { schema, lists }
                }
            };

            let validation = workflow.validate(&args.file, &schema, &lists)?;
            report(&validation, args.report.as_deref())?;
            if !validation.is_valid() {
                bail!("{} finding(s)", validation.all_findings().len());
            }
        }
        Command::Import(args) => {
            let prefetched = load_prefetched(args.prefetched.as_deref())?;

            match workflow.run_import(site()?, &args.format, &args.file, prefetched).await? {
                WorkflowOutcome::Rejected(validation) => {
                    report(&validation, args.report.as_deref())?;
                    bail!("File rejected; nothing was imported");
                }
                WorkflowOutcome::Imported { report: validation, result } => {
                    report(&validation, args.report.as_deref())?;
                    print_json(&result)?;
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config()?;

    let default_filter = if config.debug_mode {
        "auto_import=debug"
    } else {
        "auto_import=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let workflow = ImportWorkflow::new(config);
    let outcome = run(&workflow, &cli.command).await;
    workflow.shutdown().await;
    outcome
}
