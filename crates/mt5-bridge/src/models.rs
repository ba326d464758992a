//! Wire types for the REST bridge running beside the MT5 terminal. The
//! bridge exposes the terminal's order_send/positions_get surface as JSON;
//! field names follow the terminal's own vocabulary (ticket, price_open,
//! retcode) so bridge logs and bot logs line up.

use broker_trait::{OrderSide, PendingKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct PendingOrderPayload {
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub volume: f64,
    pub price: f64,
    pub sl: f64,
    pub tp: f64,
    pub comment: String,
    pub magic: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketOrderPayload {
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub volume: f64,
    pub sl: f64,
    pub tp: f64,
    pub comment: String,
    pub magic: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModifyPositionPayload {
    pub sl: f64,
    pub tp: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClosePositionPayload {
    pub volume: f64,
}

/// The terminal's order_send result, relayed verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeResult {
    pub retcode: i64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub order: Option<u64>,
    #[serde(default)]
    pub deal: Option<u64>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalPosition {
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub position_type: String,
    pub volume: f64,
    pub price_open: f64,
    #[serde(default)]
    pub sl: f64,
    #[serde(default)]
    pub tp: f64,
    #[serde(default)]
    pub profit: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalOrder {
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub volume_current: f64,
    pub price_open: f64,
    #[serde(default)]
    pub sl: f64,
    #[serde(default)]
    pub tp: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalQuote {
    pub bid: f64,
    pub ask: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub digits: u32,
    pub point: f64,
    #[serde(default)]
    pub volume_min: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalStatus {
    pub connected: bool,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub equity: f64,
    #[serde(default)]
    pub server: Option<String>,
}

pub fn pending_type_str(side: OrderSide, kind: PendingKind) -> &'static str {
    match (side, kind) {
        (OrderSide::Buy, PendingKind::Limit) => "buy_limit",
        (OrderSide::Buy, PendingKind::Stop) => "buy_stop",
        (OrderSide::Sell, PendingKind::Limit) => "sell_limit",
        (OrderSide::Sell, PendingKind::Stop) => "sell_stop",
    }
}

pub fn parse_side(s: &str) -> Option<OrderSide> {
    if s.starts_with("buy") {
        Some(OrderSide::Buy)
    } else if s.starts_with("sell") {
        Some(OrderSide::Sell)
    } else {
        None
    }
}

pub fn parse_pending_kind(s: &str) -> Option<PendingKind> {
    if s.ends_with("limit") {
        Some(PendingKind::Limit)
    } else if s.ends_with("stop") {
        Some(PendingKind::Stop)
    } else {
        None
    }
}
