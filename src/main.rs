use clap::Parser;
use miette::{IntoDiagnostic, Result};
use pi_engine::application::Engine;
use pi_engine::config::EngineConfig;
use pi_engine::domain::ids::PaymentInitiationId;
use pi_engine::domain::payment_initiation::PaymentInitiationType;
use pi_engine::domain::ports::{JournalRef, Storage, StorageRef};
use pi_engine::domain::workflow::{CreatePayout, CreateTransfer, ReversePayout, ReverseTransfer};
use pi_engine::infrastructure::events::LogEventSink;
use pi_engine::infrastructure::in_memory::{InMemoryJournal, InMemoryStorage};
use pi_engine::infrastructure::sandbox::SandboxPlugin;
use pi_engine::infrastructure::scheduler::{TokioScheduler, run_worker};
use pi_engine::interfaces::csv::instruction_reader::{Instruction, InstructionReader, InstructionType};
use pi_engine::interfaces::csv::ledger_writer::LedgerWriter;
use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input instructions CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Engine configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured stack name
    #[arg(long)]
    stack: Option<String>,

    /// Polling period of the sandbox connectors, in milliseconds
    #[arg(long)]
    polling_period_ms: Option<u64>,

    /// How long to wait for outstanding polls before printing the ledger
    #[arg(long, default_value_t = 10_000)]
    drain_timeout_ms: u64,
}

fn open_stores(db_path: Option<PathBuf>) -> Result<(StorageRef, JournalRef)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store =
            pi_engine::infrastructure::rocksdb::RocksDbStore::open(db_path).into_diagnostic()?;
        return Ok((Arc::new(store.clone()), Arc::new(store)));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok((
        Arc::new(InMemoryStorage::new()),
        Arc::new(InMemoryJournal::new()),
    ))
}

/// Seeds the object an instruction describes and runs its workflow.
async fn process(engine: &Engine, instruction: &Instruction) -> pi_engine::error::Result<()> {
    let now = chrono::Utc::now();
    let connector_id = instruction.connector_id();
    let task_id = instruction.task_id();
    match instruction.r#type {
        InstructionType::Transfer | InstructionType::Payout => {
            let pi = instruction.payment_initiation(now)?;
            let payment_initiation_id = pi.id.clone();
            engine.storage().store_payment_initiation(pi).await?;
            if instruction.r#type == InstructionType::Transfer {
                engine
                    .create_transfer(CreateTransfer {
                        task_id,
                        connector_id,
                        payment_initiation_id,
                    })
                    .await
            } else {
                engine
                    .create_payout(CreatePayout {
                        task_id,
                        connector_id,
                        payment_initiation_id,
                    })
                    .await
            }
        }
        InstructionType::Reverse => {
            let reversal = instruction.reversal(now)?;
            let reversal_id = reversal.id.clone();
            let pi = engine
                .storage()
                .get_payment_initiation(&reversal.payment_initiation_id)
                .await?;
            engine.storage().store_reversal(reversal).await?;
            match pi.kind {
                PaymentInitiationType::Transfer => {
                    engine
                        .reverse_transfer(ReverseTransfer {
                            task_id,
                            connector_id,
                            reversal_id,
                        })
                        .await
                }
                PaymentInitiationType::Payout => {
                    engine
                        .reverse_payout(ReversePayout {
                            task_id,
                            connector_id,
                            reversal_id,
                        })
                        .await
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };
    if let Some(stack) = cli.stack {
        config.stack = stack;
    }
    let polling_period = cli.polling_period_ms.map(Duration::from_millis);

    let (storage, journal) = open_stores(cli.db_path)?;
    let (scheduler, triggers) = TokioScheduler::new(64);
    let engine = Arc::new(Engine::new(
        storage,
        journal,
        Arc::new(scheduler.clone()),
        Arc::new(LogEventSink),
        config,
    ));
    let worker = tokio::spawn(run_worker(engine.clone(), triggers));

    let file = File::open(&cli.input).into_diagnostic()?;
    let mut instructions = Vec::new();
    for result in InstructionReader::new(file).instructions() {
        match result {
            Ok(instruction) => instructions.push(instruction),
            Err(e) => eprintln!("Error reading instruction: {}", e),
        }
    }
    // Connectors must be registered before recovery resumes their workflows.
    let mut connectors = HashSet::new();
    for instruction in &instructions {
        let connector_id = instruction.connector_id();
        if connectors.insert(connector_id.clone()) {
            engine
                .register_connector(connector_id, Arc::new(SandboxPlugin::new()), polling_period)
                .await;
        }
    }

    let recovered = engine.recover().await.into_diagnostic()?;
    if recovered > 0 {
        tracing::info!(recovered, "resumed interrupted workflows");
    }

    // Process instructions
    let mut seen = Vec::new();
    for instruction in &instructions {
        if let Err(e) = process(&engine, instruction).await {
            eprintln!("Error processing instruction: {}", e);
        }
        if instruction.r#type != InstructionType::Reverse {
            let id = PaymentInitiationId::new(
                instruction.reference.as_str(),
                instruction.connector_id(),
            );
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
    }

    // Let outstanding polls settle
    let deadline = tokio::time::Instant::now() + Duration::from_millis(cli.drain_timeout_ms);
    while scheduler.active().await > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let outstanding = scheduler.active().await;
    if outstanding > 0 {
        tracing::warn!(outstanding, "polling schedules still active at exit");
    }
    scheduler.shutdown().await;
    worker.abort();

    // Output the adjustment ledger
    let stdout = io::stdout();
    let mut writer = LedgerWriter::new(stdout.lock());
    for id in &seen {
        let log = engine.ledger().history(id).await.into_diagnostic()?;
        writer.write_adjustments(&log).into_diagnostic()?;
    }

    Ok(())
}
