use std::sync::Arc;

use anyhow::Result;
use broker_trait::BrokerClient;
use serde_json::json;

use crate::commands::{CommandMatch, PartialTrigger};
use crate::notifier::WebhookNotifier;

/// Per-command tally. Nothing is persisted; the broker book is re-read on
/// every invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManagementOutcome {
    pub touched: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ManagementOutcome {
    fn as_json(&self) -> serde_json::Value {
        json!({
            "touched": self.touched,
            "skipped": self.skipped,
            "failed": self.failed,
        })
    }
}

/// Executes management commands against the live broker state. Stateless
/// between invocations; every flow starts by listing positions/orders fresh.
pub struct PositionManager {
    broker: Arc<dyn BrokerClient>,
    notifier: Arc<WebhookNotifier>,
    be_partial_volume: f64,
    partial_volume: f64,
    be_tolerance: f64,
}

impl PositionManager {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        notifier: Arc<WebhookNotifier>,
        be_partial_volume: f64,
        partial_volume: f64,
        be_tolerance: f64,
    ) -> Self {
        Self {
            broker,
            notifier,
            be_partial_volume,
            partial_volume,
            be_tolerance,
        }
    }

    /// True when any position or pending order is live, in which case new
    /// signals are suppressed and only management commands act.
    pub async fn has_active_exposure(&self) -> Result<bool> {
        let positions = self.broker.list_open_positions().await?;
        if !positions.is_empty() {
            return Ok(true);
        }
        let orders = self.broker.list_open_orders().await?;
        Ok(!orders.is_empty())
    }

    /// Run every matched command in the fixed order: break-even, partial,
    /// full close, cancel-all, TP extension. Returns false when the match
    /// does not open dispatch at all.
    pub async fn dispatch(&self, cmd: &CommandMatch) -> Result<bool> {
        if cmd.tp_hit {
            // Detection stays logged, but TP-hit phrasing alone does not
            // cancel anything. Current production behavior.
            tracing::info!("TP-hit phrasing detected; cancel-all does not fire on its own");
        }
        if !cmd.triggers_dispatch() {
            return Ok(false);
        }

        if cmd.break_even {
            let outcome = self.move_to_break_even(true).await?;
            tracing::info!(
                moved = outcome.touched,
                skipped = outcome.skipped,
                failed = outcome.failed,
                "break-even pass complete"
            );
            self.notifier
                .send("break_even", "Stops moved to entry", outcome.as_json())
                .await;
        }

        if let Some(trigger) = &cmd.partial {
            let outcome = self.take_partial_profit(trigger).await?;
            self.notifier
                .send("partial_profit", "Partial profits taken", outcome.as_json())
                .await;
        }

        if cmd.full_close {
            let outcome = self.close_all_positions().await?;
            self.notifier
                .send("full_close", "All positions closed", outcome.as_json())
                .await;
        }

        if cmd.tp_hit {
            let cancelled = self.cancel_pending_orders().await?;
            self.notifier
                .send(
                    "cancel_pending",
                    "Pending orders cancelled",
                    json!({ "cancelled": cancelled }),
                )
                .await;
        }

        if let Some(price) = cmd.extend_tp {
            let outcome = self.extend_take_profit(price).await?;
            self.notifier
                .send(
                    "extend_tp",
                    "Take-profit extended",
                    json!({ "price": price, "outcome": outcome.as_json() }),
                )
                .await;
        }

        Ok(true)
    }

    /// Move every position's stop to its entry price. Positions already at
    /// break-even (within tolerance) are left alone. Any trigger also sweeps
    /// away resting entries: once a position is secured, stale pending
    /// orders for the same signal must not fill later.
    async fn move_to_break_even(&self, include_partial_close: bool) -> Result<ManagementOutcome> {
        let positions = self.broker.list_open_positions().await?;
        let mut outcome = ManagementOutcome::default();

        for position in positions {
            if (position.stop_loss - position.entry_price).abs() <= self.be_tolerance {
                tracing::debug!(position = position.id, "stop already at entry, skipping");
                outcome.skipped += 1;
                continue;
            }

            if include_partial_close && position.volume > self.be_partial_volume {
                match self
                    .broker
                    .close_position(position.id, self.be_partial_volume)
                    .await
                {
                    Ok(ack) if ack.accepted => {
                        tracing::info!(
                            position = position.id,
                            volume = self.be_partial_volume,
                            "banked break-even partial"
                        );
                    }
                    Ok(ack) => {
                        tracing::warn!(
                            position = position.id,
                            retcode = ack.retcode,
                            "break-even partial close rejected: {}",
                            ack.reason
                        );
                    }
                    Err(e) => {
                        tracing::warn!(position = position.id, "break-even partial close failed: {}", e);
                    }
                }
            }

            match self
                .broker
                .modify_position(position.id, position.entry_price, position.take_profit)
                .await
            {
                Ok(ack) if ack.accepted => outcome.touched += 1,
                Ok(ack) => {
                    tracing::warn!(
                        position = position.id,
                        retcode = ack.retcode,
                        "stop relocation rejected: {}",
                        ack.reason
                    );
                    outcome.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(position = position.id, "stop relocation failed: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        let cancelled = self.cancel_pending_orders().await?;
        if cancelled > 0 {
            tracing::info!(cancelled, "pending orders swept after break-even");
        }

        Ok(outcome)
    }

    /// Close the configured slice of every position large enough to give it
    /// up. A TP1-level trigger chains into break-even afterwards, but with
    /// the partial-close portion skipped: only the stop relocation runs.
    async fn take_partial_profit(&self, trigger: &PartialTrigger) -> Result<ManagementOutcome> {
        let positions = self.broker.list_open_positions().await?;
        let mut outcome = ManagementOutcome::default();

        for position in positions {
            if position.volume <= self.partial_volume {
                tracing::debug!(
                    position = position.id,
                    volume = position.volume,
                    "too small for a partial close, skipping"
                );
                outcome.skipped += 1;
                continue;
            }
            match self
                .broker
                .close_position(position.id, self.partial_volume)
                .await
            {
                Ok(ack) if ack.accepted => outcome.touched += 1,
                Ok(ack) => {
                    tracing::warn!(
                        position = position.id,
                        retcode = ack.retcode,
                        "partial close rejected: {}",
                        ack.reason
                    );
                    outcome.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(position = position.id, "partial close failed: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        if trigger.level == Some(1) {
            tracing::info!("TP1 partial banked, relocating stops to entry");
            self.move_to_break_even(false).await?;
        }

        Ok(outcome)
    }

    async fn close_all_positions(&self) -> Result<ManagementOutcome> {
        let positions = self.broker.list_open_positions().await?;
        let mut outcome = ManagementOutcome::default();

        for position in positions {
            match self
                .broker
                .close_position(position.id, position.volume)
                .await
            {
                Ok(ack) if ack.accepted => outcome.touched += 1,
                Ok(ack) => {
                    tracing::warn!(
                        position = position.id,
                        retcode = ack.retcode,
                        "full close rejected: {}",
                        ack.reason
                    );
                    outcome.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(position = position.id, "full close failed: {}", e);
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn cancel_pending_orders(&self) -> Result<usize> {
        let orders = self.broker.list_open_orders().await?;
        let mut cancelled = 0;
        for order in orders {
            match self.broker.cancel_order(order.id).await {
                Ok(ack) if ack.accepted => cancelled += 1,
                Ok(ack) => {
                    tracing::warn!(order = order.id, retcode = ack.retcode, "cancel rejected: {}", ack.reason);
                }
                Err(e) => {
                    tracing::warn!(order = order.id, "cancel failed: {}", e);
                }
            }
        }
        Ok(cancelled)
    }

    /// Rewrite every position's take-profit to the given price, stops
    /// untouched. Broker rejections are logged per position and skipped.
    async fn extend_take_profit(&self, price: f64) -> Result<ManagementOutcome> {
        let positions = self.broker.list_open_positions().await?;
        let mut outcome = ManagementOutcome::default();

        for position in positions {
            match self
                .broker
                .modify_position(position.id, position.stop_loss, price)
                .await
            {
                Ok(ack) if ack.accepted => outcome.touched += 1,
                Ok(ack) => {
                    tracing::warn!(
                        position = position.id,
                        retcode = ack.retcode,
                        "take-profit extension rejected: {}",
                        ack.reason
                    );
                    outcome.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(position = position.id, "take-profit extension failed: {}", e);
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandDetector;
    use crate::test_support::{BrokerCall, FakeBroker};
    use broker_trait::OrderSide;

    fn manager(broker: Arc<FakeBroker>) -> PositionManager {
        let notifier = Arc::new(WebhookNotifier::new(String::new()).unwrap());
        PositionManager::new(broker, notifier, 0.01, 0.02, 0.00001)
    }

    async fn dispatch(broker: &Arc<FakeBroker>, text: &str) -> bool {
        let cmd = CommandDetector::new().unwrap().detect(text);
        manager(broker.clone()).dispatch(&cmd).await.unwrap()
    }

    #[tokio::test]
    async fn break_even_moves_stop_and_sweeps_pending_orders() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_position(1, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);
        broker.add_order(7, OrderSide::Buy, 3982.0);

        assert!(dispatch(&broker, "move sl to entry").await);

        let calls = broker.calls();
        assert_eq!(calls.len(), 3);
        // Partial first (0.09 > 0.01), then the relocation, then the sweep.
        match &calls[0] {
            BrokerCall::Close { position_id, volume } => {
                assert_eq!(*position_id, 1);
                assert_eq!(*volume, 0.01);
            }
            other => panic!("expected partial close, got {:?}", other),
        }
        match &calls[1] {
            BrokerCall::Modify {
                position_id,
                stop_loss,
                take_profit,
            } => {
                assert_eq!(*position_id, 1);
                assert_eq!(*stop_loss, 3985.0);
                assert_eq!(*take_profit, 4050.0);
            }
            other => panic!("expected modify, got {:?}", other),
        }
        match &calls[2] {
            BrokerCall::Cancel { order_id } => assert_eq!(*order_id, 7),
            other => panic!("expected cancel, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn break_even_twice_touches_once() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_position(1, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);

        dispatch(&broker, "breakeven").await;
        dispatch(&broker, "breakeven").await;

        let modifies = broker
            .calls()
            .iter()
            .filter(|c| matches!(c, BrokerCall::Modify { .. }))
            .count();
        // The second pass finds the stop already at entry and skips.
        assert_eq!(modifies, 1);
    }

    #[tokio::test]
    async fn break_even_small_position_skips_partial_close() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_position(1, OrderSide::Sell, 0.01, 3985.0, 4010.0, 3950.0);

        dispatch(&broker, "breakeven").await;

        assert!(broker
            .calls()
            .iter()
            .all(|c| !matches!(c, BrokerCall::Close { .. })));
        assert!(broker
            .calls()
            .iter()
            .any(|c| matches!(c, BrokerCall::Modify { .. })));
    }

    #[tokio::test]
    async fn partial_close_volume_guard() {
        let broker = Arc::new(FakeBroker::new());
        // At or below the 0.02 slice: never selected.
        broker.add_position(1, OrderSide::Buy, 0.01, 3985.0, 3960.0, 4050.0);
        broker.add_position(2, OrderSide::Buy, 0.02, 3985.0, 3960.0, 4050.0);
        broker.add_position(3, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);

        dispatch(&broker, "take partials here").await;

        let closes: Vec<_> = broker
            .calls()
            .iter()
            .filter_map(|c| match c {
                BrokerCall::Close { position_id, volume } => Some((*position_id, *volume)),
                _ => None,
            })
            .collect();
        assert_eq!(closes, vec![(3, 0.02)]);
        // No position ever goes to zero through the partial path.
        for p in broker.positions.lock().unwrap().iter() {
            assert!(p.volume > 0.0);
        }
    }

    #[tokio::test]
    async fn tp1_partial_chains_into_stop_relocation_only() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_position(1, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);

        dispatch(&broker, "TP1 hit").await;

        let calls = broker.calls();
        let closes: Vec<f64> = calls
            .iter()
            .filter_map(|c| match c {
                BrokerCall::Close { volume, .. } => Some(*volume),
                _ => None,
            })
            .collect();
        // Exactly one close: the partial slice. The chained break-even must
        // not bank a second one.
        assert_eq!(closes, vec![0.02]);
        assert!(calls.iter().any(|c| matches!(
            c,
            BrokerCall::Modify { stop_loss, .. } if *stop_loss == 3985.0
        )));
    }

    #[tokio::test]
    async fn full_close_takes_entire_volume() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_position(1, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);
        broker.add_position(2, OrderSide::Buy, 0.03, 3983.0, 3960.0, 4050.0);

        dispatch(&broker, "close everything now").await;

        assert!(broker.positions.lock().unwrap().is_empty());
        let closed: f64 = broker
            .calls()
            .iter()
            .filter_map(|c| match c {
                BrokerCall::Close { volume, .. } => Some(*volume),
                _ => None,
            })
            .sum();
        assert!((closed - 0.12).abs() < 1e-9);
    }

    #[tokio::test]
    async fn tp_hit_alone_does_not_cancel_anything() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_order(7, OrderSide::Buy, 3982.0);

        let handled = dispatch(&broker, "all tps hit, cancel orders").await;

        assert!(!handled);
        assert!(broker.calls().is_empty());
        assert_eq!(broker.orders.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tp_hit_cancels_when_dispatch_is_open() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_position(1, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);
        broker.add_order(7, OrderSide::Buy, 3982.0);

        let handled = dispatch(&broker, "close everything and cancel orders").await;

        assert!(handled);
        assert!(broker
            .calls()
            .iter()
            .any(|c| matches!(c, BrokerCall::Cancel { order_id: 7 })));
    }

    #[tokio::test]
    async fn extend_tp_keeps_stop_loss() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_position(1, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);

        dispatch(&broker, "extend tp to 4100").await;

        assert!(broker.calls().iter().any(|c| matches!(
            c,
            BrokerCall::Modify { stop_loss, take_profit, .. }
                if *stop_loss == 3960.0 && *take_profit == 4100.0
        )));
    }

    #[tokio::test]
    async fn extend_tp_survives_broker_rejection() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_position(1, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);
        *broker.reject_modify.lock().unwrap() = true;

        // Rejection is logged and skipped, never an error.
        assert!(dispatch(&broker, "move tp 4100").await);
    }

    #[tokio::test]
    async fn active_exposure_reflects_positions_and_orders() {
        let broker = Arc::new(FakeBroker::new());
        let m = manager(broker.clone());
        assert!(!m.has_active_exposure().await.unwrap());

        broker.add_order(7, OrderSide::Buy, 3982.0);
        assert!(m.has_active_exposure().await.unwrap());

        broker.orders.lock().unwrap().clear();
        broker.add_position(1, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);
        assert!(m.has_active_exposure().await.unwrap());
    }
}
