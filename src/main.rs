use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing_subscriber::EnvFilter;

use perpbot::api::{MarketDataSource, MexcClient, PaperGateway};
use perpbot::config::Settings;
use perpbot::engine::{
    command, Command, LoopDeps, NotificationLevel, StatusEvent, StatusPublisher, TradingLoop,
};
use perpbot::models::{Signal, Timeframe};
use perpbot::strategy::ConfluenceStrategy;

const INIT_FAILURE_EXIT_CODE: i32 = 2;

#[derive(Parser)]
#[command(
    name = "perpbot",
    about = "Leveraged futures trading loop with confluence signals"
)]
struct Args {
    /// TOML config file (defaults to ./perpbot.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Contract symbol, e.g. XRP_USDT
    #[arg(long)]
    symbol: Option<String>,

    /// Candle timeframe: 1m, 5m, 15m, 30m, 1h, 4h, 1d
    #[arg(long)]
    timeframe: Option<Timeframe>,

    /// tracing filter, overrides RUST_LOG
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    setup_logging(args.log_filter.as_deref());

    tracing::info!("🚀 perpbot starting");

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(symbol) = args.symbol {
        settings.trading.symbol = symbol;
    }
    if let Some(timeframe) = args.timeframe {
        settings.trading.timeframe = timeframe;
    }
    settings.validate()?;

    let trading = &settings.trading;
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {} ({})", trading.symbol, trading.timeframe);
    tracing::info!("  Trade Amount: {}", trading.trade_amount);
    tracing::info!("  Leverage: {}x", trading.leverage);
    tracing::info!(
        "  Stop Loss: {}% / Take Profit: {}%",
        trading.stop_loss_pct,
        trading.take_profit_pct
    );
    tracing::info!("  Mode: paper trading");

    let client = match MexcClient::new(&settings.exchange) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("💥 Initialization failed: {:#}", e);
            std::process::exit(INIT_FAILURE_EXIT_CODE);
        }
    };

    let publisher = StatusPublisher::new(settings.reporting.snapshot_capacity);
    let status_rx = publisher.subscribe();
    let (command_tx, command_rx) = command::channel(settings.trading.command_queue_capacity);

    let deps = LoopDeps {
        market: Arc::new(client.clone()) as Arc<dyn MarketDataSource>,
        strategy: Arc::new(ConfluenceStrategy::default()),
        gateway: Arc::new(PaperGateway::new(client)),
        commands: command_rx,
        publisher,
    };

    let trading_loop =
        match TradingLoop::initialize(settings.trading.clone(), &settings.reporting, deps).await {
            Ok(trading_loop) => trading_loop,
            Err(e) => {
                tracing::error!("💥 Initialization failed: {}", e);
                std::process::exit(INIT_FAILURE_EXIT_CODE);
            }
        };

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);

    let status_task = tokio::spawn(render_status(status_rx));
    let input_task = tokio::spawn(read_commands(command_tx, stop_tx.clone()));
    let signal_task = {
        let stop_tx = stop_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                let _ = stop_tx.send(true);
            }
        })
    };

    tracing::info!("⌨️  Commands: long | short | close | refresh | set <name> <value> | quit");

    let stats = tokio::spawn(trading_loop.run(stop_rx)).await?;

    input_task.abort();
    signal_task.abort();
    status_task.abort();

    tracing::info!(
        "📈 Session: {} trades, {} wins, realized P&L {}",
        stats.trades,
        stats.wins,
        stats.realized_pnl
    );

    Ok(())
}

fn setup_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("perpbot=info"))
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Presentation side of the command queue: one command per stdin line
async fn read_commands(commands: mpsc::Sender<Command>, stop: Arc<watch::Sender<bool>>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            let _ = stop.send(true);
            return;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("⚠️  {}", e);
                continue;
            }
        };

        match commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                tracing::warn!("⚠️  Command queue full, dropped {:?}", command);
            }
            Err(TrySendError::Closed(_)) => return,
        }
    }
}

/// Subscriber rendering status events as log lines
async fn render_status(mut events: broadcast::Receiver<StatusEvent>) {
    let mut last_signal = Signal::None;
    let mut was_open = false;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Status subscriber skipped {} events", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        match event {
            StatusEvent::Metrics(snapshot) => {
                let is_open = snapshot.position.is_some();
                if snapshot.signal != last_signal || is_open != was_open {
                    tracing::info!(
                        "📊 {} price: {} signal: {} RSI: {} position: {} PnL: {}",
                        snapshot.symbol,
                        snapshot
                            .current_price
                            .map_or_else(|| "-".to_string(), |p| p.to_string()),
                        snapshot.signal,
                        snapshot
                            .rsi
                            .map_or_else(|| "-".to_string(), |r| format!("{:.1}", r)),
                        snapshot
                            .position
                            .as_ref()
                            .map_or_else(|| "flat".to_string(), |p| p.side.to_string()),
                        snapshot
                            .unrealized_pnl_pct
                            .map_or_else(|| "-".to_string(), |p| format!("{:.2}%", p)),
                    );
                    last_signal = snapshot.signal;
                    was_open = is_open;
                } else if tracing::enabled!(tracing::Level::DEBUG) {
                    match serde_json::to_string(&*snapshot) {
                        Ok(json) => tracing::debug!("metrics {}", json),
                        Err(e) => tracing::debug!("Unserializable metrics snapshot: {}", e),
                    }
                }
            }
            StatusEvent::Notification { level, message } => match level {
                NotificationLevel::Info => tracing::info!("🔔 {}", message),
                NotificationLevel::Warning => tracing::warn!("🔔 {}", message),
                NotificationLevel::Error => tracing::error!("🔔 {}", message),
            },
            StatusEvent::Connection(status) => {
                tracing::info!("📡 Exchange connection: {:?}", status);
            }
            StatusEvent::PositionClosed(trade) => {
                tracing::info!(
                    "📒 Closed {} {} entry {} exit {} P&L {}",
                    trade.position.side,
                    trade.position.symbol,
                    trade.position.entry_price,
                    trade
                        .exit_price
                        .map_or_else(|| "-".to_string(), |p| p.to_string()),
                    trade
                        .realized_pnl
                        .map_or_else(|| "-".to_string(), |p| p.to_string()),
                );
            }
        }
    }
}
