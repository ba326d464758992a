use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use broker_trait::BrokerClient;
use entry_strategy::{EntryCalculator, InstrumentSpec};
use mt5_bridge::Mt5BridgeClient;
use serde_json::json;
use signal_parser::SignalParser;
use tokio::signal::unix::SignalKind;
use tokio::sync::Mutex;

mod commands;
mod config;
mod executor;
mod health;
mod metrics;
mod notifier;
mod position_manager;
mod telegram;
#[cfg(test)]
mod test_support;

use commands::CommandDetector;
use config::AgentConfig;
use executor::TradeExecutor;
use health::HealthState;
use metrics::AgentMetrics;
use notifier::WebhookNotifier;
use position_manager::PositionManager;
use telegram::{IncomingMessage, TelegramListener};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting MT5 Signal Agent");

    // 2. Load configuration
    let config = AgentConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Symbol: {}", config.symbol);
    tracing::info!("  Entry strategy: {}", config.entry_strategy.as_str());
    tracing::info!("  Default volume: {}", config.strategy.default_volume);
    tracing::info!("  Magic number: {}", config.magic_number);
    tracing::info!("  Min market distance: ${}", config.min_market_distance);

    // 3. Connect to the MT5 bridge; an unreachable terminal is fatal
    let bridge = Mt5BridgeClient::new(
        config.mt5_bridge_url.clone(),
        config.mt5_bridge_api_key.clone(),
    )?;
    let status = bridge
        .terminal_status()
        .await
        .map_err(|e| anyhow::anyhow!("MT5 bridge connectivity check failed: {}", e))?;
    if !status.connected {
        anyhow::bail!("MT5 terminal is not connected to its trade server");
    }
    tracing::info!(
        "Startup check: MT5 bridge OK (server {}, balance {:.2}, equity {:.2})",
        status.server.as_deref().unwrap_or("<unknown>"),
        status.balance,
        status.equity
    );

    // 4. Resolve instrument precision; an unknown symbol degrades to the
    //    4-decimal default rather than refusing to start
    let instrument = match bridge.symbol_info(&config.symbol).await {
        Ok(info) => {
            tracing::info!(
                "Instrument {}: {} digits, min volume {}",
                config.symbol,
                info.digits,
                info.volume_min.unwrap_or_default()
            );
            InstrumentSpec::new(info.digits)
        }
        Err(e) => {
            tracing::warn!(
                "Could not resolve instrument {}: {} (using default precision)",
                config.symbol,
                e
            );
            InstrumentSpec::unknown()
        }
    };
    let broker: Arc<dyn BrokerClient> = Arc::new(bridge);

    // 5. Verify the Telegram token before entering the poll loop
    let mut listener = TelegramListener::new(
        &config.telegram_bot_token,
        config.telegram_chat_id,
        config.telegram_poll_timeout_secs,
    )?;
    let bot_name = listener.get_me().await?;
    tracing::info!(
        "Startup check: Telegram OK (bot @{}, chat {})",
        bot_name,
        config.telegram_chat_id
    );

    // 6. Build the pipeline
    let parser = SignalParser::new(config.parser_config())?;
    let detector = CommandDetector::new()?;
    let calculator = EntryCalculator::new(config.entry_strategy, &config.strategy, instrument);
    let executor = TradeExecutor::new(
        Arc::clone(&broker),
        instrument,
        config.symbol.clone(),
        config.magic_number,
        config.min_market_distance,
        config.entry_strategy,
    );
    let notifier = Arc::new(WebhookNotifier::new(config.webhook_url.clone())?);
    let position_manager = PositionManager::new(
        Arc::clone(&broker),
        Arc::clone(&notifier),
        config.be_partial_volume_for(config.entry_strategy),
        config.partials_volume_for(config.entry_strategy),
        config.be_tolerance,
    );

    // 7. Metrics + health endpoint
    let agent_metrics = Arc::new(Mutex::new(AgentMetrics::new(config.metrics_log_interval)));
    let health_state = Arc::new(HealthState {
        broker: Arc::clone(&broker),
        metrics: Arc::clone(&agent_metrics),
        strategy: config.entry_strategy.as_str().to_string(),
        symbol: config.symbol.clone(),
    });
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_state, health_port).await {
            tracing::error!("health server exited: {}", e);
        }
    });

    // 8. Startup notification
    notifier
        .send(
            "agent_started",
            "MT5 signal agent started",
            json!({
                "symbol": config.symbol,
                "strategy": config.entry_strategy.as_str(),
                "server": status.server,
                "balance": status.balance,
            }),
        )
        .await;

    tracing::info!("Agent is now listening. Press Ctrl+C to stop.");

    // 9. Message loop with graceful shutdown (SIGINT + SIGTERM)
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            batch = listener.poll() => {
                let messages = match batch {
                    Ok(messages) => messages,
                    Err(e) => {
                        tracing::warn!("Telegram poll failed: {} (retrying in 5s)", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };
                for message in messages {
                    if let Err(e) = handle_message(
                        &message,
                        &parser,
                        &detector,
                        &calculator,
                        &executor,
                        &position_manager,
                        &broker,
                        &notifier,
                        &config,
                        &agent_metrics,
                    )
                    .await
                    {
                        tracing::error!(message = message.id, "error handling message: {}", e);
                        notifier
                            .send(
                                "agent_error",
                                "Message handling failed",
                                json!({ "message_id": message.id, "error": e.to_string() }),
                            )
                            .await;
                    }
                    agent_metrics.lock().await.finish_message();
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                agent_metrics.lock().await.log_metrics();
                notifier
                    .send("agent_stopped", "MT5 signal agent stopped", json!({}))
                    .await;
                break;
            }
        }
    }

    tracing::info!("Signal agent shut down.");
    Ok(())
}

/// Process one chat message end to end: management commands first, then
/// signal parsing and order placement.
#[allow(clippy::too_many_arguments)]
async fn handle_message(
    message: &IncomingMessage,
    parser: &SignalParser,
    detector: &CommandDetector,
    calculator: &EntryCalculator,
    executor: &TradeExecutor,
    position_manager: &PositionManager,
    broker: &Arc<dyn BrokerClient>,
    notifier: &WebhookNotifier,
    config: &AgentConfig,
    metrics: &Arc<Mutex<AgentMetrics>>,
) -> Result<()> {
    // Audit line for every message, before any decision is taken.
    tracing::info!(
        message = message.id,
        sender = message.sender.as_deref().unwrap_or("<unknown>"),
        media = message.has_media,
        preview = %message.text.chars().take(80).collect::<String>(),
        "message received"
    );

    // 1. Management commands take priority over signal parsing.
    let command = detector.detect(&message.text);
    if command.any() {
        let handled = position_manager.dispatch(&command).await?;
        if handled {
            metrics.lock().await.commands_executed += 1;
        }
        return Ok(());
    }

    // 2. Try to read the message as an entry signal.
    let Some(signal) = parser.parse(&message.text) else {
        metrics.lock().await.signals_ignored += 1;
        tracing::debug!(message = message.id, "not a signal, ignored");
        return Ok(());
    };
    metrics.lock().await.signals_parsed += 1;
    tracing::info!(
        direction = ?signal.direction,
        range_start = signal.range_start,
        range_end = signal.range_end,
        stop_loss = signal.stop_loss,
        take_profit = signal.take_profit,
        "signal parsed"
    );

    // 3. One signal at a time: live exposure suppresses new entries.
    if position_manager.has_active_exposure().await? {
        metrics.lock().await.signals_suppressed += 1;
        tracing::info!("open exposure exists, suppressing new signal");
        notifier
            .send(
                "signal_suppressed",
                "Signal ignored while positions or orders are open",
                json!({ "message_id": message.id }),
            )
            .await;
        return Ok(());
    }

    // 4. Plan the entries against the current market, then hand the plan to
    //    the executor. A missing quote here is fine; the strategy degrades
    //    and the executor re-checks market data before placing anything.
    let quote = broker.get_quote(&config.symbol).await.unwrap_or_else(|e| {
        tracing::warn!("quote fetch for planning failed: {}", e);
        None
    });
    let plan = calculator.calculate(&signal, quote.as_ref());
    tracing::info!(
        strategy = config.entry_strategy.as_str(),
        legs = plan.legs.len().max(1),
        representative_price = plan.representative_price,
        "entry plan computed"
    );

    let result = executor.execute(&signal, &plan).await;

    {
        let mut m = metrics.lock().await;
        m.orders_placed += result.legs.iter().filter(|l| l.accepted).count() as u64;
        m.orders_failed += result.legs.iter().filter(|l| !l.accepted).count() as u64;
    }

    if let Some(reason) = &result.abort_reason {
        tracing::error!("signal execution aborted: {}", reason);
        notifier
            .send(
                "signal_failed",
                "Signal execution aborted",
                json!({ "message_id": message.id, "reason": reason }),
            )
            .await;
        return Ok(());
    }

    notifier
        .send(
            if result.overall_success() {
                "signal_executed"
            } else {
                "signal_failed"
            },
            "Signal processed",
            json!({
                "message_id": message.id,
                "direction": format!("{:?}", signal.direction),
                "outcome": format!("{:?}", result.outcome),
                "volume": result.aggregate_volume(),
                "entry_prices": result.entry_prices(),
            }),
        )
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBroker;
    use broker_trait::OrderSide;
    use entry_strategy::{StrategyConfig, StrategyKind};

    fn test_config() -> AgentConfig {
        AgentConfig {
            telegram_bot_token: String::new(),
            telegram_chat_id: 0,
            telegram_poll_timeout_secs: 25,
            mt5_bridge_url: String::new(),
            mt5_bridge_api_key: None,
            symbol: "XAUUSD.p".to_string(),
            entry_strategy: StrategyKind::Midpoint,
            strategy: StrategyConfig::default(),
            be_partial_volume: 0.01,
            be_partial_volume_multi: 0.01,
            partials_volume: 0.02,
            partials_volume_multi: 0.01,
            be_tolerance: 0.00001,
            magic_number: 123456,
            min_market_distance: 1.0,
            min_message_length: 10,
            range_ceiling: 50_000.0,
            extra_ignore_phrases: vec![],
            webhook_url: String::new(),
            health_port: 8080,
            metrics_log_interval: 0,
        }
    }

    fn message(text: &str) -> IncomingMessage {
        IncomingMessage {
            id: 1,
            text: text.to_string(),
            sender: None,
            has_media: false,
        }
    }

    async fn handle(broker: Arc<FakeBroker>, text: &str) {
        let config = test_config();
        let parser = SignalParser::new(config.parser_config()).unwrap();
        let detector = CommandDetector::new().unwrap();
        let instrument = InstrumentSpec::new(2);
        let calculator = EntryCalculator::new(config.entry_strategy, &config.strategy, instrument);
        let broker_dyn: Arc<dyn BrokerClient> = broker;
        let executor = TradeExecutor::new(
            Arc::clone(&broker_dyn),
            instrument,
            config.symbol.clone(),
            config.magic_number,
            config.min_market_distance,
            config.entry_strategy,
        );
        let notifier = Arc::new(WebhookNotifier::new(String::new()).unwrap());
        let position_manager = PositionManager::new(
            Arc::clone(&broker_dyn),
            Arc::clone(&notifier),
            config.be_partial_volume,
            config.partials_volume,
            config.be_tolerance,
        );
        let metrics = Arc::new(Mutex::new(AgentMetrics::new(0)));

        handle_message(
            &message(text),
            &parser,
            &detector,
            &calculator,
            &executor,
            &position_manager,
            &broker_dyn,
            &notifier,
            &config,
            &metrics,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn open_exposure_suppresses_new_signal() {
        let broker = Arc::new(FakeBroker::with_quote(3994.8, 3995.0));
        broker.add_position(1, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);

        handle(
            broker.clone(),
            "\u{1F7E2} RANGE: 3980-3990 SL: 3960 TP: 4050",
        )
        .await;

        assert!(broker.calls().is_empty());
    }

    #[tokio::test]
    async fn flat_account_places_the_signal() {
        let broker = Arc::new(FakeBroker::with_quote(3994.8, 3995.0));

        handle(
            broker.clone(),
            "\u{1F7E2} RANGE: 3980-3990 SL: 3960 TP: 4050",
        )
        .await;

        assert_eq!(broker.calls().len(), 1);
    }
}
