use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use broker_trait::{
    BrokerClient, BrokerOrder, BrokerPosition, MarketOrderRequest, OrderAck, OrderSide,
    PendingKind, PendingOrderRequest, Quote,
};
use reqwest::{header, Client};

use crate::models::*;

/// HTTP client for the REST bridge colocated with the MT5 terminal on the
/// VPS. One bridge serves one terminal/account.
pub struct Mt5BridgeClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl Mt5BridgeClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Create client from environment variables (MT5_BRIDGE_URL, optional
    /// MT5_BRIDGE_API_KEY).
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("MT5_BRIDGE_URL").map_err(|_| anyhow!("MT5_BRIDGE_URL not set"))?;
        let api_key = std::env::var("MT5_BRIDGE_API_KEY").ok();

        Self::new(base_url, api_key)
    }

    fn auth_headers(&self) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        if let Some(key) = &self.api_key {
            if let Ok(value) = header::HeaderValue::from_str(key) {
                headers.insert("X-API-Key", value);
            }
        }
        headers
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers())
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("MT5 bridge error on {}: {}", path, error_text));
        }

        Ok(response.json::<T>().await?)
    }

    async fn post_trade<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<TradeResult> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers())
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("MT5 bridge trade failed on {}: {}", path, error_text));
        }

        Ok(response.json::<TradeResult>().await?)
    }

    /// Terminal/account health, used by the startup connectivity check.
    pub async fn terminal_status(&self) -> Result<TerminalStatus> {
        self.get_json("/terminal").await
    }

    /// Native precision and tick size for a symbol.
    pub async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo> {
        self.get_json(&format!("/symbols/{}", symbol)).await
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers: bridge types -> unified BrokerClient types
// ---------------------------------------------------------------------------

fn result_to_ack(r: TradeResult) -> OrderAck {
    let mut ack = OrderAck::from_retcode(r.retcode, r.comment);
    ack.order_id = r.order;
    ack.deal_id = r.deal;
    ack.price = r.price;
    ack
}

fn position_to_broker(p: TerminalPosition) -> Option<BrokerPosition> {
    Some(BrokerPosition {
        id: p.ticket,
        symbol: p.symbol,
        side: parse_side(&p.position_type)?,
        volume: p.volume,
        entry_price: p.price_open,
        stop_loss: p.sl,
        take_profit: p.tp,
        profit: p.profit,
    })
}

fn order_to_broker(o: TerminalOrder) -> Option<BrokerOrder> {
    Some(BrokerOrder {
        id: o.ticket,
        symbol: o.symbol,
        side: parse_side(&o.order_type)?,
        kind: parse_pending_kind(&o.order_type)?,
        volume: o.volume_current,
        price: o.price_open,
        stop_loss: o.sl,
        take_profit: o.tp,
    })
}

#[async_trait]
impl BrokerClient for Mt5BridgeClient {
    async fn submit_pending_order(&self, order: &PendingOrderRequest) -> Result<OrderAck> {
        let payload = PendingOrderPayload {
            symbol: order.symbol.clone(),
            order_type: pending_type_str(order.side, order.kind).to_string(),
            volume: order.volume,
            price: order.price,
            sl: order.stop_loss,
            tp: order.take_profit,
            comment: order.comment.clone(),
            magic: order.magic,
        };

        tracing::info!(
            symbol = %payload.symbol,
            order_type = %payload.order_type,
            price = payload.price,
            volume = payload.volume,
            "submitting pending order"
        );
        let result = self.post_trade("/orders", &payload).await?;
        Ok(result_to_ack(result))
    }

    async fn submit_market_order(&self, order: &MarketOrderRequest) -> Result<OrderAck> {
        let payload = MarketOrderPayload {
            symbol: order.symbol.clone(),
            order_type: order.side.as_str().to_string(),
            volume: order.volume,
            sl: order.stop_loss,
            tp: order.take_profit,
            comment: order.comment.clone(),
            magic: order.magic,
        };

        tracing::info!(
            symbol = %payload.symbol,
            side = %payload.order_type,
            volume = payload.volume,
            "submitting market order"
        );
        let result = self.post_trade("/orders/market", &payload).await?;
        Ok(result_to_ack(result))
    }

    async fn modify_position(
        &self,
        position_id: u64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<OrderAck> {
        let payload = ModifyPositionPayload {
            sl: stop_loss,
            tp: take_profit,
        };
        let result = self
            .post_trade(&format!("/positions/{}/modify", position_id), &payload)
            .await?;
        Ok(result_to_ack(result))
    }

    async fn close_position(&self, position_id: u64, volume: f64) -> Result<OrderAck> {
        let payload = ClosePositionPayload { volume };
        let result = self
            .post_trade(&format!("/positions/{}/close", position_id), &payload)
            .await?;
        Ok(result_to_ack(result))
    }

    async fn cancel_order(&self, order_id: u64) -> Result<OrderAck> {
        let url = format!("{}/orders/{}", self.base_url, order_id);

        let response = self
            .client
            .delete(&url)
            .headers(self.auth_headers())
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Failed to cancel order {}: {}", order_id, error_text));
        }

        let result = response.json::<TradeResult>().await?;
        tracing::info!(order_id, "pending order cancelled");
        Ok(result_to_ack(result))
    }

    async fn list_open_orders(&self) -> Result<Vec<BrokerOrder>> {
        let orders: Vec<TerminalOrder> = self.get_json("/orders").await?;
        Ok(orders.into_iter().filter_map(order_to_broker).collect())
    }

    async fn list_open_positions(&self) -> Result<Vec<BrokerPosition>> {
        let positions: Vec<TerminalPosition> = self.get_json("/positions").await?;
        Ok(positions.into_iter().filter_map(position_to_broker).collect())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let url = format!("{}/quote/{}", self.base_url, symbol);

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers())
            .send()
            .await?;

        // No current tick for the symbol (market closed, bad symbol).
        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Failed to get quote: {}", error_text));
        }

        let quote = response.json::<TerminalQuote>().await?;
        Ok(Some(Quote {
            bid: quote.bid,
            ask: quote.ask,
        }))
    }

    fn broker_name(&self) -> &str {
        "mt5-bridge"
    }
}
