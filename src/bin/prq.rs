use std::{fs, path::Path, path::PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use purchase_request_core::{
    config::{self, AppConfig},
    errors::ServiceError,
    models::{CurrencyRates, RequestData},
    services::{
        drafts::{migrate_draft, request_from_value},
        grouping::group_items,
        items::{import_rows, parse_bulk_text},
        validation::validate_request,
        SubmissionService, ValidationRules,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        config::init_tracing("debug", false);
    }
    let cfg = config::load_config().context("failed to load configuration")?;

    match cli.command {
        Commands::Group(args) => handle_group(args, cli.json)?,
        Commands::Validate(args) => handle_validate(&cfg, args, cli.json)?,
        Commands::Compose(args) => handle_compose(&cfg, args, cli.json).await?,
        Commands::Import(args) => handle_import(args, cli.json)?,
        Commands::Migrate(args) => handle_migrate(args)?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "prq",
    about = "Group, validate and compose purchase requests from JSON documents",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[arg(short, long, global = true, action = ArgAction::SetTrue, help = "Enable debug logging")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge line items sharing code, name and unit
    Group(DocumentArgs),
    /// Run the pre-submission checks
    Validate(DocumentArgs),
    /// Build the submission payload
    Compose(ComposeArgs),
    /// Read tab, semicolon or comma separated rows
    Import(ImportArgs),
    /// Rewrite a saved draft with current field names
    Migrate(DocumentArgs),
}

#[derive(Args)]
struct DocumentArgs {
    /// Request or draft JSON document
    file: PathBuf,
}

#[derive(Args)]
struct ComposeArgs {
    file: PathBuf,
    /// JSON object of TRY-based rates, e.g. {"TRY": 1, "EUR": 0.025}
    #[arg(long)]
    rates: Option<PathBuf>,
    /// Compose a server-side draft instead: no validation, default header
    #[arg(long, action = ArgAction::SetTrue)]
    draft: bool,
}

#[derive(Args)]
struct ImportArgs {
    /// Delimited text; the first line is a header
    file: PathBuf,
    /// Request document to append the imported rows to
    #[arg(long)]
    into: Option<PathBuf>,
}

fn read_document(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn read_request(path: &Path) -> Result<RequestData> {
    let document = read_document(path)?;
    Ok(request_from_value(document)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_group(args: DocumentArgs, json: bool) -> Result<()> {
    let data = read_request(&args.file)?;
    let grouped = match group_items(&data.items) {
        Ok(grouped) => grouped,
        Err(ServiceError::ItemConflict(report)) => {
            if json {
                print_json(&report)?;
            } else {
                eprintln!("{}", report);
            }
            bail!("{} conflicting item group(s)", report.groups.len());
        }
        Err(err) => return Err(err.into()),
    };

    if json {
        return print_json(&grouped);
    }
    println!("{} rows -> {} items", data.items.len(), grouped.len());
    for item in &grouped.items {
        println!(
            "- {} {} • {} {} • jobs {}",
            item.code,
            item.name,
            item.quantity,
            item.unit,
            item.job_numbers().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(())
}

fn handle_validate(cfg: &AppConfig, args: DocumentArgs, json: bool) -> Result<()> {
    let data = read_request(&args.file)?;
    let report = validate_request(&data, &ValidationRules::from(&cfg.validation));

    if json {
        print_json(&report)?;
    } else if report.is_valid {
        println!("Request is valid");
    } else {
        for error in &report.errors {
            println!("- {}", error);
        }
    }

    if !report.is_valid {
        bail!("{} validation error(s)", report.errors.len());
    }
    Ok(())
}

async fn handle_compose(cfg: &AppConfig, args: ComposeArgs, json: bool) -> Result<()> {
    let data = read_request(&args.file)?;
    let rates: Option<CurrencyRates> = args
        .rates
        .as_deref()
        .map(|path| -> Result<CurrencyRates> { Ok(serde_json::from_value(read_document(path)?)?) })
        .transpose()?;

    let service = SubmissionService::new(
        cfg.submission.clone(),
        ValidationRules::from(&cfg.validation),
    );

    if args.draft {
        let draft = service
            .compose_server_draft(&data, rates.as_ref(), Utc::now().date_naive())
            .await?;
        return print_json(&draft);
    }

    let payload = service.compose(&data, rates.as_ref()).await?;
    if json {
        return print_json(&payload);
    }
    println!(
        "{} items • {} suppliers • total {} EUR{}",
        payload.items.len(),
        payload.suppliers.len(),
        payload.total_amount_eur,
        if payload.is_rolling_mill {
            " • rolling mill"
        } else {
            ""
        }
    );
    Ok(())
}

fn handle_import(args: ImportArgs, json: bool) -> Result<()> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let mut data = match &args.into {
        Some(path) => read_request(path)?,
        None => RequestData::default(),
    };

    let preview = parse_bulk_text(&text);
    let imported = import_rows(&mut data, &preview);

    if json {
        return print_json(&data);
    }
    for row in preview.rows.iter().filter(|row| !row.is_valid()) {
        println!(
            "line {}: {}",
            row.line,
            row.error.as_deref().unwrap_or_default()
        );
    }
    println!(
        "{} of {} rows imported ({} invalid)",
        imported, preview.total, preview.invalid
    );
    Ok(())
}

fn handle_migrate(args: DocumentArgs) -> Result<()> {
    let mut document = read_document(&args.file)?;
    let renamed = migrate_draft(&mut document);
    eprintln!("{} field(s) renamed", renamed);
    print_json(&document)
}
