//! TrustVerify WORM audit trail: operator CLI
//!
//! Writes, reads, audits, and purges records in a WORM store configured from
//! the `WORM_*` environment or a TOML file.
//!
//! Usage:
//!   worm write --event-type login.success --data '{"userId":"u-1"}'
//!   worm read --from 2026-03-14 --to 2026-03-15 --event-type login.success
//!   worm audit --from 2026-03-01 --to 2026-03-31
//!   worm cleanup
//!   worm state

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use trustverify_contracts::{
    config::WormConfig,
    error::{WormError, WormResult},
    record::AuditEvent,
};
use trustverify_worm::{ChainViolation, WormStorage};

// ── CLI definition ────────────────────────────────────────────────────────────

/// TrustVerify WORM audit trail operator tool.
#[derive(Parser)]
#[command(
    name = "worm",
    about = "TrustVerify write-once audit trail",
    long_about = "Writes, reads, audits, and purges hash-chained audit records.\n\
                  Configuration comes from WORM_* environment variables unless\n\
                  --config points at a TOML file."
)]
struct Cli {
    /// TOML config file; overrides the WORM_* environment.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one audit event and print the stored record.
    Write {
        #[arg(long)]
        event_type: String,
        /// Event fields as a JSON object.
        #[arg(long)]
        data: Option<String>,
        /// Extra metadata stored under `data.metadata`.
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Print records in a date range as NDJSON.
    Read {
        #[arg(long)]
        from: NaiveDate,
        /// Defaults to `--from`.
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        event_type: Option<String>,
    },
    /// Verify hashes and links for every record in a date range.
    Audit {
        #[arg(long)]
        from: NaiveDate,
        /// Defaults to today (UTC).
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Delete day-partitions older than the retention window.
    Cleanup,
    /// Print the persisted chain head.
    State,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=info to see every write; the default only shows problems.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("worm: {}", e);
            std::process::exit(1);
        }
    }
}

/// Execute one command. `Ok(false)` means the command ran but found a
/// problem (an audit with violations).
fn run(cli: Cli) -> WormResult<bool> {
    let config = match &cli.config {
        Some(path) => WormConfig::from_file(path)?,
        None => WormConfig::from_env()?,
    };
    let store = WormStorage::open(config)?;

    match cli.command {
        Command::Write { event_type, data, metadata } => {
            let event = build_event(event_type, data.as_deref())?;
            let metadata = metadata.as_deref().map(serde_json::from_str::<Value>).transpose()?;
            let record = store.write_record(&event, metadata)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Command::Read { from, to, event_type } => {
            for record in store.read_records(from, to.unwrap_or(from), event_type.as_deref()) {
                println!("{}", serde_json::to_string(&record)?);
            }
        }

        Command::Audit { from, to } => {
            let to = to.unwrap_or_else(|| Utc::now().date_naive());
            let audit = store.audit_range(from, to);
            println!(
                "checked {} records (chain index {} to {})",
                audit.records_checked,
                fmt_index(audit.first_index),
                fmt_index(audit.last_index),
            );
            for violation in &audit.violations {
                println!("  VIOLATION {}", describe(violation));
            }
            if !audit.is_intact() {
                return Ok(false);
            }
            println!("chain intact");
        }

        Command::Cleanup => {
            let removed = store.cleanup_old_records()?;
            println!("removed {} expired partition(s)", removed);
        }

        Command::State => {
            println!("{}", serde_json::to_string_pretty(&store.chain_state()?)?);
        }
    }

    Ok(true)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn build_event(event_type: String, data: Option<&str>) -> WormResult<AuditEvent> {
    let fields = match data {
        None => Map::new(),
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            other => {
                return Err(WormError::ConfigError {
                    reason: format!("--data must be a JSON object, got {}", other),
                })
            }
        },
    };

    let mut event = AuditEvent { event_type, fields };
    // `eventType` comes from the flag, not the payload.
    event.fields.remove("eventType");
    Ok(event)
}

fn fmt_index(index: Option<u64>) -> String {
    index.map_or_else(|| "-".to_string(), |i| i.to_string())
}

fn describe(violation: &ChainViolation) -> String {
    match violation {
        ChainViolation::HashMismatch { chain_index, id } => {
            format!("#{}: stored hash does not match record {}", chain_index, id)
        }
        ChainViolation::BrokenLink { chain_index, expected, found } => format!(
            "#{}: previousHash {} does not link to {}",
            chain_index,
            found.as_deref().unwrap_or("<none>"),
            expected.as_deref().unwrap_or("<none>"),
        ),
        ChainViolation::Discontinuity { previous_index, chain_index } => {
            format!("#{} follows #{}: records missing or duplicated", chain_index, previous_index)
        }
    }
}
