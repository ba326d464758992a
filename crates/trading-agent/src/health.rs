use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use broker_trait::BrokerClient;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::metrics::AgentMetrics;

/// Shared state behind the health endpoints.
pub struct HealthState {
    pub broker: Arc<dyn BrokerClient>,
    pub metrics: Arc<Mutex<AgentMetrics>>,
    pub strategy: String,
    pub symbol: String,
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/alive", get(alive))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: Arc<HealthState>, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "health server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Cheap liveness probe, no broker round-trip.
async fn alive() -> &'static str {
    "ok"
}

async fn health(State(state): State<Arc<HealthState>>) -> Json<Value> {
    // One broker round-trip per probe; a dead bridge still answers degraded.
    let positions = state.broker.list_open_positions().await;
    let orders = state.broker.list_open_orders().await;
    let broker_reachable = positions.is_ok() && orders.is_ok();

    let metrics = state.metrics.lock().await.to_json();

    Json(json!({
        "status": if broker_reachable { "healthy" } else { "degraded" },
        "broker": state.broker.broker_name(),
        "broker_reachable": broker_reachable,
        "open_positions": positions.map(|p| p.len()).unwrap_or(0),
        "pending_orders": orders.map(|o| o.len()).unwrap_or(0),
        "strategy": state.strategy,
        "symbol": state.symbol,
        "metrics": metrics,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBroker;
    use broker_trait::OrderSide;

    #[tokio::test]
    async fn health_reports_open_exposure() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_position(1, OrderSide::Buy, 0.09, 3985.0, 3960.0, 4050.0);
        broker.add_order(7, OrderSide::Buy, 3982.0);

        let state = Arc::new(HealthState {
            broker,
            metrics: Arc::new(Mutex::new(AgentMetrics::new(0))),
            strategy: "adaptive".to_string(),
            symbol: "XAUUSD.p".to_string(),
        });

        let Json(body) = health(State(state)).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["open_positions"], 1);
        assert_eq!(body["pending_orders"], 1);
        assert_eq!(body["strategy"], "adaptive");
    }
}
