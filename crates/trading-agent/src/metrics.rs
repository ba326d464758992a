use std::time::Instant;

/// Structured telemetry for the signal agent.
/// Counters cover the whole message pipeline from poll to broker ack.
pub struct AgentMetrics {
    pub messages_seen: u64,
    pub signals_parsed: u64,
    pub signals_ignored: u64,
    pub signals_suppressed: u64,
    pub commands_executed: u64,
    pub orders_placed: u64,
    pub orders_failed: u64,

    started_at: Instant,
    log_interval_messages: u64,
}

impl AgentMetrics {
    pub fn new(log_interval_messages: u64) -> Self {
        Self {
            messages_seen: 0,
            signals_parsed: 0,
            signals_ignored: 0,
            signals_suppressed: 0,
            commands_executed: 0,
            orders_placed: 0,
            orders_failed: 0,
            started_at: Instant::now(),
            log_interval_messages,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Count one processed message and periodically emit the summary line.
    pub fn finish_message(&mut self) {
        self.messages_seen += 1;
        if self.log_interval_messages > 0
            && self.messages_seen.is_multiple_of(self.log_interval_messages)
        {
            self.log_metrics();
        }
    }

    /// Emit structured telemetry via tracing
    pub fn log_metrics(&self) {
        tracing::info!(
            messages = self.messages_seen,
            signals_parsed = self.signals_parsed,
            signals_ignored = self.signals_ignored,
            signals_suppressed = self.signals_suppressed,
            commands_executed = self.commands_executed,
            orders_placed = self.orders_placed,
            orders_failed = self.orders_failed,
            uptime_secs = self.uptime_secs(),
            "Agent metrics summary"
        );
    }

    /// Serialize counters for the health endpoint
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "messages_seen": self.messages_seen,
            "signals_parsed": self.signals_parsed,
            "signals_ignored": self.signals_ignored,
            "signals_suppressed": self.signals_suppressed,
            "commands_executed": self.commands_executed,
            "orders_placed": self.orders_placed,
            "orders_failed": self.orders_failed,
            "uptime_secs": self.uptime_secs(),
        })
    }
}
