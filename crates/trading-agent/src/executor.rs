use std::sync::Arc;

use broker_trait::{
    BrokerClient, MarketOrderRequest, OrderSide, PendingKind, PendingOrderRequest, Quote,
};
use entry_strategy::{EntryPlan, InstrumentSpec, Leg, StrategyKind};
use signal_parser::{Direction, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every leg was accepted.
    Full,
    /// At least one leg was accepted; the rest are listed as failures.
    Partial,
    /// Nothing was placed.
    Failed,
}

#[derive(Debug, Clone)]
pub struct LegResult {
    pub label: String,
    pub accepted: bool,
    pub price: f64,
    pub volume: f64,
    pub take_profit: f64,
    pub converted_to_market: bool,
    pub order_id: Option<u64>,
    pub deal_id: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub outcome: BatchOutcome,
    pub legs: Vec<LegResult>,
    /// Set when the batch never started (no market data).
    pub abort_reason: Option<String>,
}

impl ExecutionResult {
    pub fn overall_success(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Full | BatchOutcome::Partial)
    }

    pub fn aggregate_volume(&self) -> f64 {
        self.legs
            .iter()
            .filter(|l| l.accepted)
            .map(|l| l.volume)
            .sum()
    }

    pub fn entry_prices(&self) -> Vec<f64> {
        self.legs
            .iter()
            .filter(|l| l.accepted)
            .map(|l| l.price)
            .collect()
    }

    fn aborted(reason: String) -> Self {
        Self {
            outcome: BatchOutcome::Failed,
            legs: Vec::new(),
            abort_reason: Some(reason),
        }
    }
}

/// Turns an entry plan into broker submissions. Every internal fault becomes
/// a failed result; nothing here ever propagates an error to the message loop.
pub struct TradeExecutor {
    broker: Arc<dyn BrokerClient>,
    instrument: InstrumentSpec,
    symbol: String,
    magic: i64,
    /// Absolute price distance below which a resting order would sit on the
    /// wrong side of the market and get rejected; such legs deal at market.
    min_market_distance: f64,
    comment: String,
}

impl TradeExecutor {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        instrument: InstrumentSpec,
        symbol: String,
        magic: i64,
        min_market_distance: f64,
        strategy: StrategyKind,
    ) -> Self {
        Self {
            broker,
            instrument,
            symbol,
            magic,
            min_market_distance,
            comment: format!("TG Limit {}", strategy.as_str()),
        }
    }

    pub async fn execute(&self, signal: &Signal, plan: &EntryPlan) -> ExecutionResult {
        let side = match signal.direction {
            Direction::Buy => OrderSide::Buy,
            Direction::Sell => OrderSide::Sell,
        };

        // 1. One quote up front; without it the per-leg distance checks are
        //    meaningless, so the whole batch aborts before anything rests.
        let mut quote = match self.broker.get_quote(&self.symbol).await {
            Ok(Some(q)) => q,
            Ok(None) => {
                tracing::error!(symbol = %self.symbol, "no market data, aborting batch");
                return ExecutionResult::aborted("no market data for symbol".to_string());
            }
            Err(e) => {
                tracing::error!(symbol = %self.symbol, "quote fetch failed: {}", e);
                return ExecutionResult::aborted(format!("quote fetch failed: {}", e));
            }
        };

        // 2. Single-entry plans become one synthetic leg with the signal's
        //    own volume and take-profit.
        let legs: Vec<Leg> = if plan.legs.is_empty() {
            vec![Leg {
                price: plan.representative_price,
                volume: signal.volume,
                take_profit_pips: None,
                label: "entry".to_string(),
                zone: None,
            }]
        } else {
            plan.legs.clone()
        };

        // 3. Submit each leg independently; a failed sibling never stops the
        //    rest of the batch.
        let mut results = Vec::with_capacity(legs.len());
        for (i, leg) in legs.iter().enumerate() {
            if i > 0 {
                // Prices move between legs; refresh, but fall back to the
                // last tick rather than dropping the leg.
                match self.broker.get_quote(&self.symbol).await {
                    Ok(Some(q)) => quote = q,
                    Ok(None) | Err(_) => {
                        tracing::warn!(leg = %leg.label, "quote refresh failed, using last tick");
                    }
                }
            }
            results.push(self.submit_leg(signal, side, leg, &quote).await);
        }

        // 4. Classify the batch.
        let accepted = results.iter().filter(|r| r.accepted).count();
        let outcome = if accepted == results.len() {
            BatchOutcome::Full
        } else if accepted > 0 {
            tracing::warn!(
                accepted,
                total = results.len(),
                "partial batch: some legs were rejected"
            );
            BatchOutcome::Partial
        } else {
            tracing::error!(total = results.len(), "every leg was rejected");
            BatchOutcome::Failed
        };

        ExecutionResult {
            outcome,
            legs: results,
            abort_reason: None,
        }
    }

    /// Take-profit for a leg comes off that leg's own entry price when it
    /// carries a pip distance; otherwise the signal's target applies.
    fn leg_take_profit(&self, signal: &Signal, side: OrderSide, leg: &Leg, entry: f64) -> f64 {
        match leg.take_profit_pips {
            Some(pips) => {
                let distance = pips * self.instrument.pip();
                let tp = match side {
                    OrderSide::Buy => entry + distance,
                    OrderSide::Sell => entry - distance,
                };
                self.instrument.round_price(tp)
            }
            None => signal.take_profit,
        }
    }

    async fn submit_leg(
        &self,
        signal: &Signal,
        side: OrderSide,
        leg: &Leg,
        quote: &Quote,
    ) -> LegResult {
        let market = quote.entry_side(side);
        let distance = (leg.price - market).abs();

        if distance <= self.min_market_distance {
            // Too close to rest: deal at market, with the take-profit
            // recomputed from the market price actually dealt at.
            let take_profit = self.leg_take_profit(signal, side, leg, market);
            tracing::info!(
                leg = %leg.label,
                intended = leg.price,
                market,
                "leg within minimum distance, converting to market order"
            );
            let request = MarketOrderRequest {
                symbol: self.symbol.clone(),
                side,
                volume: leg.volume,
                stop_loss: signal.stop_loss,
                take_profit,
                comment: self.comment.clone(),
                magic: self.magic,
            };
            match self.broker.submit_market_order(&request).await {
                Ok(ack) => LegResult {
                    label: leg.label.clone(),
                    accepted: ack.accepted,
                    price: ack.price.unwrap_or(market),
                    volume: leg.volume,
                    take_profit,
                    converted_to_market: true,
                    order_id: ack.order_id,
                    deal_id: ack.deal_id,
                    error: (!ack.accepted)
                        .then(|| format!("retcode {}: {}", ack.retcode, ack.reason)),
                },
                Err(e) => self.errored_leg(leg, market, take_profit, true, e.to_string()),
            }
        } else {
            // A buy below the market (or sell above) rests as a limit; the
            // breakout side rests as a stop.
            let kind = match side {
                OrderSide::Buy if leg.price < market => PendingKind::Limit,
                OrderSide::Buy => PendingKind::Stop,
                OrderSide::Sell if leg.price > market => PendingKind::Limit,
                OrderSide::Sell => PendingKind::Stop,
            };
            let take_profit = self.leg_take_profit(signal, side, leg, leg.price);
            let request = PendingOrderRequest {
                symbol: self.symbol.clone(),
                side,
                kind,
                volume: leg.volume,
                price: leg.price,
                stop_loss: signal.stop_loss,
                take_profit,
                comment: self.comment.clone(),
                magic: self.magic,
            };
            match self.broker.submit_pending_order(&request).await {
                Ok(ack) => LegResult {
                    label: leg.label.clone(),
                    accepted: ack.accepted,
                    price: leg.price,
                    volume: leg.volume,
                    take_profit,
                    converted_to_market: false,
                    order_id: ack.order_id,
                    deal_id: ack.deal_id,
                    error: (!ack.accepted)
                        .then(|| format!("retcode {}: {}", ack.retcode, ack.reason)),
                },
                Err(e) => self.errored_leg(leg, leg.price, take_profit, false, e.to_string()),
            }
        }
    }

    fn errored_leg(
        &self,
        leg: &Leg,
        price: f64,
        take_profit: f64,
        converted: bool,
        error: String,
    ) -> LegResult {
        tracing::warn!(leg = %leg.label, "leg submission failed: {}", error);
        LegResult {
            label: leg.label.clone(),
            accepted: false,
            price,
            volume: leg.volume,
            take_profit,
            converted_to_market: converted,
            order_id: None,
            deal_id: None,
            error: Some(error),
        }
    }
}
