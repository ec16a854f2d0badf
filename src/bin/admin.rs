use std::collections::VecDeque;
use std::path::PathBuf;

use sqlx::postgres::PgPoolOptions;

use provenance_registry::crypto::{fingerprint_file, ContentFingerprint};
use provenance_registry::domain::{OwnerId, RegistrationOutcome};
use provenance_registry::infra::{SqliteProofStore, StoragePolicy};
use provenance_registry::resolver::RegisterRequest;
use provenance_registry::server::{build_state, AppState, Config};
use provenance_registry::telemetry::{init_telemetry, TelemetryConfig};

fn print_help() {
    eprintln!(
        "\
provenance-admin

USAGE:
  provenance-admin <command> [options]

COMMANDS:
  migrate                         Run database migrations
  fingerprint <path>              Print the content fingerprint of a file
  check                           Check who owns a file
  register                        Register a file on the ledger and persist its proof
  lookup                          Show the proof record for a fingerprint
  verify-tx                       Check a ledger transaction
  reconcile                       Mirror journaled proofs into the primary store

COMMON OPTIONS:
  --database-url <postgres_url>    (defaults to env DATABASE_URL)

migrate OPTIONS:
  --sqlite <sqlite_url>           (optional) Also migrate a local secondary store

check OPTIONS:
  --file <path>                   (required)
  --requester <owner_id>          (required)

register OPTIONS:
  --file <path>                   (required)
  --requester <owner_id>          (required)
  --content-type <mime>           (default: application/octet-stream)
  --filename <name>               (default: file name of --file)
  --content-id <id>               (optional)

lookup OPTIONS:
  --fingerprint <hex>             (required) 64 hex characters

verify-tx OPTIONS:
  --tx <transaction_id>           (required)

ENV:
  APP_ENV                          production (default) or development
  SECONDARY_STORE                  memory | sqlite:<path> (development only)
  MIRROR_JOURNAL                   sqlite:<path> (default sqlite://mirror-journal.db?mode=rwc)
  LEDGER_RPC_URL / LEDGER_REGISTRY_ADDRESS / LEDGER_PRIVATE_KEY
"
    );
}

fn require_database_url(database_url: Option<String>) -> anyhow::Result<String> {
    database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (or pass --database-url)"))
}

fn next_value(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<String> {
    args.pop_front()
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

fn required<T>(value: Option<T>, flag: &str) -> anyhow::Result<T> {
    value.ok_or_else(|| anyhow::anyhow!("{flag} is required"))
}

/// Build the same resolver the server runs, without startup migrations.
async fn connect(database_url: Option<String>) -> anyhow::Result<AppState> {
    let mut config = Config::from_env()?;
    config.database_url = require_database_url(database_url)?;
    config.migrate_on_startup = false;

    let policy = StoragePolicy::from_env()?;
    build_state(&config, policy).await
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    init_telemetry(&TelemetryConfig::cli())?;

    match command.as_str() {
        "migrate" => {
            let mut database_url: Option<String> = None;
            let mut sqlite_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(next_value(&mut args, &arg)?),
                    "--sqlite" => sqlite_url = Some(next_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let database_url = require_database_url(database_url)?;
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;
            provenance_registry::migrations::run_postgres(&pool).await?;
            println!("ok: primary migrations applied");

            if let Some(url) = sqlite_url {
                let store = SqliteProofStore::from_path(&url).await?;
                provenance_registry::migrations::run_sqlite(store.pool()).await?;
                println!("ok: sqlite migrations applied ({url})");
            }
            Ok(())
        }
        "fingerprint" => {
            let path = match args.pop_front() {
                Some(p) if p == "-h" || p == "--help" => {
                    print_help();
                    return Ok(());
                }
                Some(p) => PathBuf::from(p),
                None => anyhow::bail!("fingerprint requires a file path"),
            };
            if let Some(extra) = args.pop_front() {
                anyhow::bail!("unexpected argument: {extra}");
            }

            let fingerprint = fingerprint_file(&path)?;
            println!("{fingerprint}  {}", path.display());
            Ok(())
        }
        "check" => {
            let mut database_url: Option<String> = None;
            let mut file: Option<PathBuf> = None;
            let mut requester: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(next_value(&mut args, &arg)?),
                    "--file" => file = Some(PathBuf::from(next_value(&mut args, &arg)?)),
                    "--requester" => requester = Some(next_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let file = required(file, "--file")?;
            let requester = OwnerId::new(required(requester, "--requester")?);
            let content = tokio::fs::read(&file).await?;

            let state = connect(database_url).await?;
            let result = state
                .resolver
                .check_ownership(&content, &requester)
                .await?;
            print_json(&result)
        }
        "register" => {
            let mut database_url: Option<String> = None;
            let mut file: Option<PathBuf> = None;
            let mut requester: Option<String> = None;
            let mut content_type: Option<String> = None;
            let mut filename: Option<String> = None;
            let mut content_id: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(next_value(&mut args, &arg)?),
                    "--file" => file = Some(PathBuf::from(next_value(&mut args, &arg)?)),
                    "--requester" => requester = Some(next_value(&mut args, &arg)?),
                    "--content-type" => content_type = Some(next_value(&mut args, &arg)?),
                    "--filename" => filename = Some(next_value(&mut args, &arg)?),
                    "--content-id" => content_id = Some(next_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let file = required(file, "--file")?;
            let requester = OwnerId::new(required(requester, "--requester")?);
            let content = tokio::fs::read(&file).await?;
            if content.is_empty() {
                anyhow::bail!("{} is empty", file.display());
            }

            let filename = filename.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "untitled".to_string())
            });

            let state = connect(database_url).await?;
            let outcome = state
                .resolver
                .register_proof(RegisterRequest {
                    content,
                    content_type: content_type
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    filename,
                    requester,
                    content_id,
                })
                .await?;

            print_json(&outcome)?;
            match outcome {
                RegistrationOutcome::Confirmed(_) => Ok(()),
                RegistrationOutcome::Rejected(reason) => {
                    anyhow::bail!("registration rejected: {}", reason.message())
                }
            }
        }
        "lookup" => {
            let mut database_url: Option<String> = None;
            let mut fingerprint: Option<ContentFingerprint> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(next_value(&mut args, &arg)?),
                    "--fingerprint" => {
                        let raw = next_value(&mut args, &arg)?;
                        fingerprint = Some(ContentFingerprint::from_hex(&raw)?);
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let fingerprint = required(fingerprint, "--fingerprint")?;
            let state = connect(database_url).await?;
            match state.resolver.lookup(&fingerprint).await? {
                Some(record) => print_json(&record),
                None => anyhow::bail!("no proof registered for {fingerprint}"),
            }
        }
        "verify-tx" => {
            let mut database_url: Option<String> = None;
            let mut tx: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(next_value(&mut args, &arg)?),
                    "--tx" => tx = Some(next_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let tx = required(tx, "--tx")?;
            let state = connect(database_url).await?;
            let verification = state.resolver.verify_transaction(&tx).await?;
            print_json(&verification)?;
            if !verification.confirmed {
                anyhow::bail!("transaction {tx} is not confirmed");
            }
            Ok(())
        }
        "reconcile" => {
            let mut database_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(next_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let state = connect(database_url).await?;
            let report = state.resolver.reconcile_unmirrored().await?;
            print_json(&report)?;
            if report.pending > 0 {
                anyhow::bail!("{} proof(s) still unmirrored", report.pending);
            }
            Ok(())
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}
