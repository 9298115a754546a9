mod config;

use crate::config::{Config, StoreBackend};
use anyhow::{Context, Result};
use dispatch_rust_core::clients::telegram::Update;
use dispatch_rust_core::clients::{
    DeliveryTransport, HttpSignalSource, SignalSource, TelegramClient,
};
use dispatch_rust_core::clock::SystemClock;
use dispatch_rust_core::store::{
    self, DedupStore, JsonFileDedupStore, JsonFileSubscriberStore, MemoryDedupStore,
    MemorySubscriberStore, RedisDedupStore, RedisSubscriberStore, SubscriberStore,
};
use dispatch_rust_core::{Command, CommandHandler, CycleOutcome, Orchestrator, Requester};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Long-poll timeout for Telegram getUpdates
const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting Signal Dispatcher...");

    let config = Config::from_env()?;
    info!(
        backend = ?config.store_backend,
        sources = config.sources.len(),
        symbols = config.orchestrator.symbols.len(),
        interval_secs = config.analysis_interval.as_secs(),
        "Configuration loaded"
    );

    let (subscribers, dedup) = build_stores(&config).await?;

    let telegram = Arc::new(TelegramClient::with_base_url(
        config.telegram_bot_token.clone(),
        config.telegram_api_base_url.clone(),
    ));

    let sources: Vec<Arc<dyn SignalSource>> = config
        .sources
        .iter()
        .map(|s| Arc::new(HttpSignalSource::new(&s.name, &s.base_url)) as Arc<dyn SignalSource>)
        .collect();

    let orchestrator = Arc::new(Orchestrator::new(
        config.orchestrator.clone(),
        sources.clone(),
        subscribers.clone(),
        dedup,
        telegram.clone(),
        Arc::new(SystemClock),
    ));

    let commands = Arc::new(CommandHandler::new(
        sources,
        subscribers,
        config.orchestrator.symbols.clone(),
        config.orchestrator.min_confidence,
    ));

    // Tasks
    let mut tasks = Vec::new();

    // 1. Scheduler
    tasks.push(tokio::spawn(run_scheduler(
        orchestrator.clone(),
        config.start_delay,
        config.analysis_interval,
    )));

    // 2. Command poller
    tasks.push(tokio::spawn(run_command_poller(telegram, commands)));

    info!(
        "Dispatcher running. Cycle every {}s (window {}-{} {})",
        config.analysis_interval.as_secs(),
        config.orchestrator.window.start.format("%H:%M"),
        config.orchestrator.window.cutoff.format("%H:%M"),
        config.orchestrator.window.timezone
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!(
        signals_sent = orchestrator.signals_sent_today(),
        "Shutdown signal received, stopping"
    );
    for task in tasks {
        task.abort();
    }
    Ok(())
}

async fn build_stores(config: &Config) -> Result<(Arc<dyn SubscriberStore>, Arc<dyn DedupStore>)> {
    Ok(match config.store_backend {
        StoreBackend::File => (
            Arc::new(JsonFileSubscriberStore::new(config.users_file.clone())),
            Arc::new(JsonFileDedupStore::new(config.last_signals_file.clone())),
        ),
        StoreBackend::Redis => {
            let conn = store::redis::connect(&config.redis_url)
                .await
                .context("Failed to connect to Redis")?;
            (
                Arc::new(RedisSubscriberStore::new(conn.clone())),
                Arc::new(RedisDedupStore::new(conn)),
            )
        }
        StoreBackend::Memory => {
            warn!("Using in-memory stores; subscribers are lost on restart");
            (
                Arc::new(MemorySubscriberStore::new()),
                Arc::new(MemoryDedupStore::new()),
            )
        }
    })
}

/// First cycle after `start_delay`, then one per `interval` from startup.
/// Each tick runs in its own task so a slow cycle makes the next tick a no-op.
async fn run_scheduler(orchestrator: Arc<Orchestrator>, start_delay: Duration, interval: Duration) {
    let first = orchestrator.clone();
    tokio::spawn(async move {
        tokio::time::sleep(start_delay).await;
        log_outcome(&first, first.run_cycle().await);
    });

    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Scheduler started (interval: {}s)", interval.as_secs());

    loop {
        ticker.tick().await;
        let orch = orchestrator.clone();
        tokio::spawn(async move {
            log_outcome(&orch, orch.run_cycle().await);
        });
    }
}

fn log_outcome(orchestrator: &Orchestrator, outcome: CycleOutcome) {
    let breaker = orchestrator.breaker_status();
    info!(
        ?outcome,
        signals_sent_today = orchestrator.signals_sent_today(),
        breaker_errors = breaker.consecutive_errors,
        breaker_cooldown = breaker.cooldown_pending,
        "Cycle done"
    );
}

async fn run_command_poller(telegram: Arc<TelegramClient>, commands: Arc<CommandHandler>) {
    info!("Listening for chat commands...");
    let mut offset = 0;

    loop {
        let updates = match telegram.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                error!("Polling Telegram failed: {:#}", e);
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Some((requester, command)) = parse_update(update) {
                tokio::spawn(handle_command(
                    telegram.clone(),
                    commands.clone(),
                    requester,
                    command,
                ));
            }
        }
    }
}

fn parse_update(update: Update) -> Option<(Requester, Command)> {
    let message = update.message?;
    let command = Command::parse(message.text.as_deref()?)?;
    let requester = Requester {
        chat_id: message.chat.id.to_string(),
        username: message.from.as_ref().and_then(|u| u.username.clone()),
        first_name: message.from.as_ref().and_then(|u| u.first_name.clone()),
    };
    Some((requester, command))
}

async fn handle_command(
    telegram: Arc<TelegramClient>,
    commands: Arc<CommandHandler>,
    requester: Requester,
    command: Command,
) {
    info!(chat_id = %requester.chat_id, ?command, "Command received");

    if let Some(ack) = commands.acknowledgement(&command) {
        if let Err(e) = telegram.send(&requester.chat_id, &ack).await {
            warn!(chat_id = %requester.chat_id, error = %e, "Failed to acknowledge command");
        }
    }

    for reply in commands.handle(&requester, command).await {
        if let Err(e) = telegram.send(&requester.chat_id, &reply).await {
            warn!(chat_id = %requester.chat_id, error = %e, "Failed to send reply");
        }
    }
}
