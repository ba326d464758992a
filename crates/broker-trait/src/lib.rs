use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Unified broker types (broker-agnostic)
// ---------------------------------------------------------------------------

/// MT5 "request done" retcode.
pub const RETCODE_DONE: i64 = 10009;
/// MT5 "pending order placed" retcode.
pub const RETCODE_PLACED: i64 = 10008;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    /// Price on the side a new trade would deal at: ask for buy, bid for sell.
    pub fn entry_side(&self, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => self.ask,
            OrderSide::Sell => self.bid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// How a resting order sits relative to the market: limit waits for the price
/// to come back, stop waits for it to break through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingKind {
    Limit,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: PendingKind,
    pub volume: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub comment: String,
    pub magic: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub comment: String,
    pub magic: i64,
}

/// Outcome of any mutating broker call. `retcode`/`reason` carry the
/// terminal's verdict verbatim so failures can be reported without guessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub accepted: bool,
    pub retcode: i64,
    pub reason: String,
    pub order_id: Option<u64>,
    pub deal_id: Option<u64>,
    pub price: Option<f64>,
}

impl OrderAck {
    pub fn from_retcode(retcode: i64, reason: impl Into<String>) -> Self {
        Self {
            accepted: retcode == RETCODE_DONE || retcode == RETCODE_PLACED,
            retcode,
            reason: reason.into(),
            order_id: None,
            deal_id: None,
            price: None,
        }
    }
}

/// An open (filled) position as reported by the terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub profit: f64,
}

/// A resting (unfilled) pending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: PendingKind,
    pub volume: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

// ---------------------------------------------------------------------------
// Broker trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Place a resting limit/stop order.
    async fn submit_pending_order(&self, order: &PendingOrderRequest) -> Result<OrderAck>;

    /// Deal immediately at the current market price.
    async fn submit_market_order(&self, order: &MarketOrderRequest) -> Result<OrderAck>;

    /// Rewrite a position's stop-loss and take-profit in place.
    async fn modify_position(
        &self,
        position_id: u64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<OrderAck>;

    /// Close `volume` lots of a position with an opposite-side deal.
    /// Passing the position's full volume closes it entirely.
    async fn close_position(&self, position_id: u64, volume: f64) -> Result<OrderAck>;

    /// Delete a resting pending order.
    async fn cancel_order(&self, order_id: u64) -> Result<OrderAck>;

    /// All pending orders on the account.
    async fn list_open_orders(&self) -> Result<Vec<BrokerOrder>>;

    /// All open positions on the account.
    async fn list_open_positions(&self) -> Result<Vec<BrokerPosition>>;

    /// Best bid/ask, or None when the symbol has no current tick.
    async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>>;

    /// Broker name for logging
    fn broker_name(&self) -> &str;
}
