//! shelterctl - command-line client for shelterd

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use shelter_api::{AggregateKind, AggregateQuery, Command, SensorRef, SensorReading};
use shelter_ipc::IpcClient;
use shelter_util::{ShelterId, default_socket_path, format_event_time};
use std::path::PathBuf;

/// shelterctl - talk to a running shelterd
#[derive(Parser, Debug)]
#[command(name = "shelterctl")]
#[command(about = "Command-line client for shelterd", long_about = None)]
struct Args {
    /// Socket path (or set SHELTER_SOCKET env var)
    #[arg(short, long, env = "SHELTER_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Submit one sensor reading
    Ingest {
        shelter_id: String,
        /// Sensor id (1 = entry, 2 = exit) or role name
        sensor: String,
        #[arg(long, default_value = "Obstacle")]
        status: String,
        /// Event time (default: now)
        #[arg(long)]
        timestamp: Option<String>,
        #[arg(long, env = "SHELTER_CREDENTIAL", hide_env_values = true)]
        credential: String,
    },

    /// Refresh a shelter's last activity
    Heartbeat {
        shelter_id: String,
        #[arg(long)]
        timestamp: Option<String>,
        #[arg(long, env = "SHELTER_CREDENTIAL", hide_env_values = true)]
        credential: String,
    },

    /// Current occupancy
    Current { shelter_id: String },

    /// Net crossings for one day (default: today)
    Daily {
        shelter_id: String,
        #[arg(long)]
        day: Option<NaiveDate>,
    },

    /// Net crossings per day over a range (default: trailing week)
    Weekly {
        shelter_id: String,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// In/out totals over a range (default: trailing week)
    Interval {
        shelter_id: String,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// List registered shelters
    Shelters,

    /// Rebuild a shelter's cached counter from its ledger
    Reconcile { shelter_id: String },

    /// Service health
    Health,

    /// Check the service is reachable
    Ping,

    /// Print the credential fingerprint for a secret (offline)
    Fingerprint { secret: String },
}

fn sensor_ref(sensor: &str) -> SensorRef {
    match sensor.trim().parse::<u32>() {
        Ok(id) => SensorRef::Id(id),
        Err(_) => SensorRef::Role(sensor.to_string()),
    }
}

fn timestamp_or_now(timestamp: Option<String>) -> String {
    timestamp.unwrap_or_else(|| format_event_time(&shelter_util::now().naive_local()))
}

/// Protocol command for a subcommand; `None` for offline subcommands
fn to_command(cmd: Cmd) -> Option<Command> {
    let command = match cmd {
        Cmd::Ingest {
            shelter_id,
            sensor,
            status,
            timestamp,
            credential,
        } => Command::IngestEvent(SensorReading {
            shelter_id: ShelterId::new(shelter_id),
            sensor_id: sensor_ref(&sensor),
            status,
            timestamp: timestamp_or_now(timestamp),
            credential,
        }),
        Cmd::Heartbeat {
            shelter_id,
            timestamp,
            credential,
        } => Command::Heartbeat {
            shelter_id: ShelterId::new(shelter_id),
            timestamp: timestamp_or_now(timestamp),
            credential,
        },
        Cmd::Current { shelter_id } => {
            Command::Query(AggregateQuery::new(AggregateKind::Current, shelter_id))
        }
        Cmd::Daily { shelter_id, day } => {
            let query = AggregateQuery::new(AggregateKind::Daily, shelter_id);
            Command::Query(match day {
                Some(day) => query.on_day(day),
                None => query,
            })
        }
        Cmd::Weekly {
            shelter_id,
            start,
            end,
        } => Command::Query(
            AggregateQuery::new(AggregateKind::WeeklyByDay, shelter_id).between(start, end),
        ),
        Cmd::Interval {
            shelter_id,
            start,
            end,
        } => Command::Query(
            AggregateQuery::new(AggregateKind::Interval, shelter_id).between(start, end),
        ),
        Cmd::Shelters => Command::ListShelters,
        Cmd::Reconcile { shelter_id } => Command::Reconcile {
            shelter_id: ShelterId::new(shelter_id),
        },
        Cmd::Health => Command::GetHealth,
        Cmd::Ping => Command::Ping,
        Cmd::Fingerprint { .. } => return None,
    };
    Some(command)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Cmd::Fingerprint { secret } = &args.command {
        println!("{}", shelter_core::fingerprint(secret));
        return Ok(());
    }

    let command = to_command(args.command).context("Subcommand does not use the service")?;

    let mut client = IpcClient::connect(&args.socket)
        .await
        .with_context(|| format!("Failed to connect to {:?}", args.socket))?;

    let payload = client.call(command).await.map_err(|e| {
        let hint = if e.is_retryable() { " (retryable)" } else { "" };
        anyhow!("{}{}", e, hint)
    })?;

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
