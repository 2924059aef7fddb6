//! shelterd - The shelter occupancy service
//!
//! This is the main entry point for the shelterd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization and shelter provisioning
//! - Startup reconciliation of cached counters
//! - Occupancy engine
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use shelter_api::{ClientInfo, Command, ErrorCode, ErrorInfo, Response, ResponsePayload};
use shelter_config::load_config;
use shelter_core::OccupancyEngine;
use shelter_ipc::{IpcServer, ServerMessage};
use shelter_store::{SqliteStore, Store};
use shelter_util::{ClientId, DATABASE_FILENAME, ShelterError, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// shelterd - Shelter occupancy counting service
#[derive(Parser, Debug)]
#[command(name = "shelterd")]
#[command(about = "Shelter occupancy counting service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/shelterd/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set SHELTER_SOCKET env var)
    #[arg(short, long, env = "SHELTER_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set SHELTER_DATA_DIR env var)
    #[arg(short, long, env = "SHELTER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// Main service state
struct Service {
    engine: Arc<OccupancyEngine>,
    ipc: Arc<IpcServer>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let settings = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            shelter_count = settings.shelters.len(),
            debounce_window_secs = settings.counting.debounce_window.as_secs(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| settings.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join(DATABASE_FILENAME);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path, settings.store.busy_timeout)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        let engine = OccupancyEngine::new(store, settings.counting.debounce_window);

        engine
            .provision(&settings.shelters)
            .context("Failed to provision shelters")?;

        for report in engine
            .reconcile_all()
            .context("Startup reconciliation failed")?
            .iter()
            .filter(|r| r.repaired)
        {
            warn!(
                shelter_id = %report.shelter_id,
                cached_count = report.cached_count,
                ledger_count = report.ledger_count,
                "Counter was out of sync with ledger at startup"
            );
        }

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            engine: Arc::new(engine),
            ipc: Arc::new(ipc),
        })
    }

    async fn run(self) -> Result<()> {
        let ipc_ref = self.ipc.clone();
        let mut ipc_messages = ipc_ref
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&self.engine, &ipc_ref, msg);
                }
            }
        }

        info!("Shutting down shelterd");
        ipc_ref.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    fn handle_ipc_message(engine: &Arc<OccupancyEngine>, ipc: &Arc<IpcServer>, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                // Each request runs on its own task so shelters proceed in parallel
                let engine = engine.clone();
                let ipc = ipc.clone();
                tokio::spawn(async move {
                    let response = Self::handle_command(
                        &engine,
                        &ipc,
                        &client_id,
                        request.request_id,
                        request.command,
                    )
                    .await;

                    if let Err(e) = ipc.send_response(&client_id, response).await {
                        debug!(client_id = %client_id, error = %e, "Response not delivered");
                    }
                });
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
            }
        }
    }

    async fn handle_command(
        engine: &Arc<OccupancyEngine>,
        ipc: &Arc<IpcServer>,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        debug!(client_id = %client_id, request_id, "Handling command");

        let result = match command {
            Command::IngestEvent(reading) => {
                blocking(engine, move |e| {
                    e.ingest_event(&reading).map(ResponsePayload::Ingested)
                })
                .await
            }

            Command::Heartbeat {
                shelter_id,
                timestamp,
                credential,
            } => {
                blocking(engine, move |e| {
                    e.record_heartbeat(&shelter_id, &timestamp, &credential)
                        .map(|_| ResponsePayload::HeartbeatRecorded)
                })
                .await
            }

            Command::Query(query) => {
                let today = shelter_util::today();
                blocking(engine, move |e| {
                    e.query(&query, today).map(ResponsePayload::Aggregate)
                })
                .await
            }

            Command::ListShelters => {
                blocking(engine, |e| {
                    e.list_shelters()
                        .map(|shelters| ResponsePayload::Shelters { shelters })
                })
                .await
            }

            Command::Reconcile { shelter_id } => {
                if !may_reconcile(ipc.get_client_info(client_id).await.as_ref()) {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
                    );
                }

                blocking(engine, move |e| {
                    e.reconcile(&shelter_id).map(ResponsePayload::Reconciled)
                })
                .await
            }

            Command::GetHealth => {
                blocking(engine, |e| Ok(ResponsePayload::Health(e.health()))).await
            }

            Command::Ping => Ok(ResponsePayload::Pong),
        };

        if let Err(e) = &result {
            debug!(client_id = %client_id, request_id, error = %e, "Command failed");
        }

        Response::from_result(request_id, result)
    }
}

/// Admin-only commands; a client we know nothing about is refused
fn may_reconcile(info: Option<&ClientInfo>) -> bool {
    info.is_some_and(|info| info.role.can_reconcile())
}

/// Run an engine call on the blocking pool
async fn blocking<F>(engine: &Arc<OccupancyEngine>, f: F) -> Result<ResponsePayload, ShelterError>
where
    F: FnOnce(&OccupancyEngine) -> Result<ResponsePayload, ShelterError> + Send + 'static,
{
    let engine = engine.clone();
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .unwrap_or_else(|e| Err(ShelterError::internal(format!("engine task failed: {}", e))))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "shelterd starting");

    if shelter_util::is_mock_time_active() {
        warn!(now = %shelter_util::now(), "Mock time active");
    }

    let service = Service::new(&args).await?;
    service.run().await
}
