use anyhow::{bail, Context, Result};
use entry_strategy::{StrategyConfig, StrategyKind};
use signal_parser::{ParserConfig, SymbolRule, DEFAULT_IGNORE_PHRASES};
use std::env;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    // Telegram transport
    pub telegram_bot_token: String,
    pub telegram_chat_id: i64,
    pub telegram_poll_timeout_secs: u64,

    // MT5 bridge
    pub mt5_bridge_url: String,
    pub mt5_bridge_api_key: Option<String>,

    // Instrument
    pub symbol: String,

    // Entry strategy
    pub entry_strategy: StrategyKind,
    pub strategy: StrategyConfig,

    // Position management volumes. Multi-leg strategies open many small
    // positions, so their management slices are smaller too.
    pub be_partial_volume: f64,
    pub be_partial_volume_multi: f64,
    pub partials_volume: f64,
    pub partials_volume_multi: f64,
    pub be_tolerance: f64,

    // Execution
    pub magic_number: i64,
    pub min_market_distance: f64,

    // Parser gates
    pub min_message_length: usize,
    pub range_ceiling: f64,
    pub extra_ignore_phrases: Vec<String>,

    // Infra
    pub webhook_url: String,
    pub health_port: u16,
    pub metrics_log_interval: u64,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN")
                .context("TELEGRAM_BOT_TOKEN not set")?,
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID")
                .context("TELEGRAM_CHAT_ID not set")?
                .parse()
                .context("TELEGRAM_CHAT_ID must be a numeric chat id")?,
            telegram_poll_timeout_secs: env::var("TELEGRAM_POLL_TIMEOUT")
                .unwrap_or_else(|_| "25".to_string())
                .parse()?,

            mt5_bridge_url: env::var("MT5_BRIDGE_URL").context("MT5_BRIDGE_URL not set")?,
            mt5_bridge_api_key: env::var("MT5_BRIDGE_API_KEY").ok(),

            symbol: env::var("TRADE_SYMBOL").unwrap_or_else(|_| "XAUUSD.p".to_string()),

            entry_strategy: env::var("ENTRY_STRATEGY")
                .unwrap_or_else(|_| "adaptive".to_string())
                .parse()
                .context("ENTRY_STRATEGY is not a known strategy")?,
            strategy: StrategyConfig {
                default_volume: env_f64("DEFAULT_VOLUME", 0.09)?,
                unit_volume: env_f64("DEFAULT_VOLUME_MULTI", 0.01)?,
                dual_leg_volume: env_f64("DUAL_LEG_VOLUME", 0.07)?,
                adaptive_offset_pips: env_f64("ADAPTIVE_OFFSET_PIPS", 2.0)?,
                multi_tp_pips: env_f64_list("MULTI_TP_PIPS", &[200.0, 400.0, 600.0, 800.0])?,
                multi_tp_volumes: env_f64_list("MULTI_TP_VOLUMES", &[0.01; 5])?,
                multi_position_count: env::var("NUMBER_POSITIONS_MULTI")
                    .unwrap_or_else(|_| "9".to_string())
                    .parse()?,
                position_volume: env_f64("POSITION_VOLUME_MULTI", 0.01)?,
            },

            be_partial_volume: env_f64("BE_PARTIAL_VOLUME", 0.01)?,
            be_partial_volume_multi: env_f64("BE_PARTIAL_VOLUME_MULTI", 0.01)?,
            partials_volume: env_f64("PARTIALS_VOLUME", 0.02)?,
            partials_volume_multi: env_f64("PARTIALS_VOLUME_MULTI", 0.01)?,
            be_tolerance: env_f64("BE_TOLERANCE", 0.00001)?,

            magic_number: env::var("MAGIC_NUMBER")
                .unwrap_or_else(|_| "123456".to_string())
                .parse()?,
            min_market_distance: env_f64("MIN_MARKET_DISTANCE", 1.0)?,

            min_message_length: env::var("MIN_MESSAGE_LENGTH")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            range_ceiling: env_f64("RANGE_CEILING", 50_000.0)?,
            extra_ignore_phrases: env::var("IGNORE_PHRASES")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            webhook_url: env::var("N8N_WEBHOOK_URL").unwrap_or_default(),
            health_port: env::var("HEALTH_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            metrics_log_interval: env::var("METRICS_LOG_INTERVAL")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.strategy.default_volume <= 0.0 || self.strategy.unit_volume <= 0.0 {
            bail!("trade volumes must be positive");
        }
        if self.strategy.multi_tp_volumes.is_empty() {
            bail!("MULTI_TP_VOLUMES must name at least one leg");
        }
        if self.strategy.multi_position_count == 0 {
            bail!("NUMBER_POSITIONS_MULTI must be at least 1");
        }
        if self.min_market_distance <= 0.0 {
            bail!("MIN_MARKET_DISTANCE must be positive");
        }
        Ok(())
    }

    /// Partial-close slice for the active strategy family.
    pub fn partials_volume_for(&self, kind: StrategyKind) -> f64 {
        if kind.is_multi_leg() {
            self.partials_volume_multi
        } else {
            self.partials_volume
        }
    }

    /// Break-even partial-close slice for the active strategy family.
    pub fn be_partial_volume_for(&self, kind: StrategyKind) -> f64 {
        if kind.is_multi_leg() {
            self.be_partial_volume_multi
        } else {
            self.be_partial_volume
        }
    }

    pub fn parser_config(&self) -> ParserConfig {
        let mut ignore_phrases: Vec<String> = DEFAULT_IGNORE_PHRASES
            .iter()
            .map(|s| s.to_string())
            .collect();
        ignore_phrases.extend(self.extra_ignore_phrases.iter().cloned());
        ParserConfig {
            min_length: self.min_message_length,
            ignore_phrases,
            range_ceiling: self.range_ceiling,
            default_volume: self.strategy.default_volume,
            symbol: SymbolRule::Fixed(self.symbol.clone()),
        }
    }
}

fn env_f64(name: &str, default: f64) -> Result<f64> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("{} must be a number", name))
}

fn env_f64_list(name: &str, default: &[f64]) -> Result<Vec<f64>> {
    match env::var(name) {
        Ok(raw) => raw
            .split(',')
            .map(|s| {
                s.trim()
                    .parse::<f64>()
                    .with_context(|| format!("{} must be a comma-separated number list", name))
            })
            .collect(),
        Err(_) => Ok(default.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn management_volumes_follow_strategy_family() {
        let config = AgentConfig {
            telegram_bot_token: String::new(),
            telegram_chat_id: 0,
            telegram_poll_timeout_secs: 25,
            mt5_bridge_url: String::new(),
            mt5_bridge_api_key: None,
            symbol: "XAUUSD.p".to_string(),
            entry_strategy: StrategyKind::Adaptive,
            strategy: StrategyConfig::default(),
            be_partial_volume: 0.01,
            be_partial_volume_multi: 0.005,
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
            metrics_log_interval: 50,
        };
        assert_eq!(config.partials_volume_for(StrategyKind::Adaptive), 0.02);
        assert_eq!(config.partials_volume_for(StrategyKind::TripleEntry), 0.01);
        assert_eq!(config.be_partial_volume_for(StrategyKind::Midpoint), 0.01);
        assert_eq!(config.be_partial_volume_for(StrategyKind::MultiTpEntry), 0.005);
    }
}
