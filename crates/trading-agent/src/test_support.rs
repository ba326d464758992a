use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use broker_trait::{
    BrokerClient, BrokerOrder, BrokerPosition, MarketOrderRequest, OrderAck, OrderSide,
    PendingKind, PendingOrderRequest, Quote, RETCODE_DONE,
};

#[derive(Debug, Clone)]
pub enum BrokerCall {
    Pending(PendingOrderRequest),
    Market(MarketOrderRequest),
    Modify {
        position_id: u64,
        stop_loss: f64,
        take_profit: f64,
    },
    Close {
        position_id: u64,
        volume: f64,
    },
    Cancel {
        order_id: u64,
    },
}

/// Scriptable in-memory broker. Mutating calls are recorded and applied to
/// the in-memory book so repeated commands observe their own effects.
pub struct FakeBroker {
    pub quote: Mutex<Option<Quote>>,
    pub positions: Mutex<Vec<BrokerPosition>>,
    pub orders: Mutex<Vec<BrokerOrder>>,
    pub calls: Mutex<Vec<BrokerCall>>,
    /// 0-based indices of pending submissions to reject.
    pub reject_pending_at: Mutex<Vec<usize>>,
    pub reject_modify: Mutex<bool>,
    pending_count: Mutex<usize>,
    next_ticket: Mutex<u64>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self {
            quote: Mutex::new(None),
            positions: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            reject_pending_at: Mutex::new(Vec::new()),
            reject_modify: Mutex::new(false),
            pending_count: Mutex::new(0),
            next_ticket: Mutex::new(1000),
        }
    }

    pub fn with_quote(bid: f64, ask: f64) -> Self {
        let broker = Self::new();
        *broker.quote.lock().unwrap() = Some(Quote { bid, ask });
        broker
    }

    pub fn add_position(
        &self,
        id: u64,
        side: OrderSide,
        volume: f64,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
    ) {
        self.positions.lock().unwrap().push(BrokerPosition {
            id,
            symbol: "XAUUSD.p".to_string(),
            side,
            volume,
            entry_price,
            stop_loss,
            take_profit,
            profit: 0.0,
        });
    }

    pub fn add_order(&self, id: u64, side: OrderSide, price: f64) {
        self.orders.lock().unwrap().push(BrokerOrder {
            id,
            symbol: "XAUUSD.p".to_string(),
            side,
            kind: PendingKind::Limit,
            volume: 0.01,
            price,
            stop_loss: 0.0,
            take_profit: 0.0,
        });
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_ticket(&self) -> u64 {
        let mut ticket = self.next_ticket.lock().unwrap();
        *ticket += 1;
        *ticket
    }

    fn accepted_ack(&self, order: bool) -> OrderAck {
        let ticket = self.next_ticket();
        OrderAck {
            accepted: true,
            retcode: RETCODE_DONE,
            reason: "Request executed".to_string(),
            order_id: Some(ticket),
            deal_id: if order { None } else { Some(ticket) },
            price: None,
        }
    }

    fn rejected_ack() -> OrderAck {
        OrderAck {
            accepted: false,
            retcode: 10016,
            reason: "Invalid stops".to_string(),
            order_id: None,
            deal_id: None,
            price: None,
        }
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    async fn submit_pending_order(&self, order: &PendingOrderRequest) -> Result<OrderAck> {
        self.calls
            .lock()
            .unwrap()
            .push(BrokerCall::Pending(order.clone()));
        let index = {
            let mut count = self.pending_count.lock().unwrap();
            let i = *count;
            *count += 1;
            i
        };
        if self.reject_pending_at.lock().unwrap().contains(&index) {
            return Ok(Self::rejected_ack());
        }
        Ok(self.accepted_ack(true))
    }

    async fn submit_market_order(&self, order: &MarketOrderRequest) -> Result<OrderAck> {
        self.calls
            .lock()
            .unwrap()
            .push(BrokerCall::Market(order.clone()));
        Ok(self.accepted_ack(false))
    }

    async fn modify_position(
        &self,
        position_id: u64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<OrderAck> {
        self.calls.lock().unwrap().push(BrokerCall::Modify {
            position_id,
            stop_loss,
            take_profit,
        });
        if *self.reject_modify.lock().unwrap() {
            return Ok(Self::rejected_ack());
        }
        let mut positions = self.positions.lock().unwrap();
        if let Some(position) = positions.iter_mut().find(|p| p.id == position_id) {
            position.stop_loss = stop_loss;
            position.take_profit = take_profit;
        }
        Ok(self.accepted_ack(true))
    }

    async fn close_position(&self, position_id: u64, volume: f64) -> Result<OrderAck> {
        self.calls.lock().unwrap().push(BrokerCall::Close {
            position_id,
            volume,
        });
        let mut positions = self.positions.lock().unwrap();
        if let Some(index) = positions.iter().position(|p| p.id == position_id) {
            if volume + 1e-9 >= positions[index].volume {
                positions.remove(index);
            } else {
                positions[index].volume -= volume;
            }
        }
        Ok(self.accepted_ack(false))
    }

    async fn cancel_order(&self, order_id: u64) -> Result<OrderAck> {
        self.calls
            .lock()
            .unwrap()
            .push(BrokerCall::Cancel { order_id });
        self.orders.lock().unwrap().retain(|o| o.id != order_id);
        Ok(self.accepted_ack(true))
    }

    async fn list_open_orders(&self) -> Result<Vec<BrokerOrder>> {
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn list_open_positions(&self) -> Result<Vec<BrokerPosition>> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn get_quote(&self, _symbol: &str) -> Result<Option<Quote>> {
        Ok(*self.quote.lock().unwrap())
    }

    fn broker_name(&self) -> &str {
        "fake"
    }
}
