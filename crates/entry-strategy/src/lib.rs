use std::str::FromStr;

use broker_trait::{PendingKind, Quote};
use serde::{Deserialize, Serialize};
use signal_parser::Signal;

mod multi;
mod single;

pub use multi::{DualEntry, MultiPositionEntry, MultiTpEntry, TripleEntry};
pub use single::{Adaptive, Midpoint, Momentum, RangeBreak};

/// One independent order inside a multi-order plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub price: f64,
    pub volume: f64,
    /// Take-profit distance in pips from this leg's own entry price.
    /// None means the signal's take-profit is used verbatim.
    pub take_profit_pips: Option<f64>,
    pub label: String,
    pub zone: Option<String>,
}

/// What the calculator hands to the execution engine. Plans are always limit
/// orders; the engine may downgrade individual legs to market at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPlan {
    pub representative_price: f64,
    pub order_kind: PendingKind,
    pub legs: Vec<Leg>,
}

impl EntryPlan {
    pub fn single(price: f64) -> Self {
        Self {
            representative_price: price,
            order_kind: PendingKind::Limit,
            legs: Vec::new(),
        }
    }

    pub fn with_legs(price: f64, legs: Vec<Leg>) -> Self {
        Self {
            representative_price: price,
            order_kind: PendingKind::Limit,
            legs,
        }
    }

    pub fn total_volume(&self, single_volume: f64) -> f64 {
        if self.legs.is_empty() {
            single_volume
        } else {
            self.legs.iter().map(|l| l.volume).sum()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Midpoint,
    RangeBreak,
    Momentum,
    Adaptive,
    DualEntry,
    TripleEntry,
    MultiTpEntry,
    MultiPositionEntry,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Midpoint => "midpoint",
            StrategyKind::RangeBreak => "range_break",
            StrategyKind::Momentum => "momentum",
            StrategyKind::Adaptive => "adaptive",
            StrategyKind::DualEntry => "dual_entry",
            StrategyKind::TripleEntry => "triple_entry",
            StrategyKind::MultiTpEntry => "multi_tp_entry",
            StrategyKind::MultiPositionEntry => "multi_position_entry",
        }
    }

    /// Multi-leg strategies size their management actions (partials,
    /// break-even partial close) with the smaller multi-entry volumes.
    pub fn is_multi_leg(self) -> bool {
        matches!(
            self,
            StrategyKind::DualEntry
                | StrategyKind::TripleEntry
                | StrategyKind::MultiTpEntry
                | StrategyKind::MultiPositionEntry
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown entry strategy: {0}")]
pub struct UnknownStrategy(String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "midpoint" => Ok(StrategyKind::Midpoint),
            "range_break" => Ok(StrategyKind::RangeBreak),
            "momentum" => Ok(StrategyKind::Momentum),
            "adaptive" => Ok(StrategyKind::Adaptive),
            "dual_entry" => Ok(StrategyKind::DualEntry),
            "triple_entry" => Ok(StrategyKind::TripleEntry),
            "multi_tp_entry" => Ok(StrategyKind::MultiTpEntry),
            "multi_position_entry" => Ok(StrategyKind::MultiPositionEntry),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// Volumes and ladders shared by the strategies. Injected at construction so
/// a strategy is a pure function of (signal, quote).
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Lot size for single-entry orders when the signal carries no override.
    pub default_volume: f64,
    /// Base lot unit for the triple-entry volume multiples.
    pub unit_volume: f64,
    /// Per-leg lot size for dual entry.
    pub dual_leg_volume: f64,
    /// Offset in pips applied when the adaptive strategy chases a
    /// favorable-side market.
    pub adaptive_offset_pips: f64,
    /// Ascending take-profit ladder in pips; the leg after the last rung
    /// falls back to the signal's take-profit.
    pub multi_tp_pips: Vec<f64>,
    /// Per-leg lot sizes for the multi-TP strategy; its length sets the leg count.
    pub multi_tp_volumes: Vec<f64>,
    /// Total leg count for the multi-position distribution strategy.
    pub multi_position_count: usize,
    /// Per-leg lot size for the multi-position strategy.
    pub position_volume: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            default_volume: 0.09,
            unit_volume: 0.01,
            dual_leg_volume: 0.07,
            adaptive_offset_pips: 2.0,
            multi_tp_pips: vec![200.0, 400.0, 600.0, 800.0],
            multi_tp_volumes: vec![0.01; 5],
            multi_position_count: 9,
            position_volume: 0.01,
        }
    }
}

/// Native precision of the traded instrument. When the terminal has not
/// reported digits yet, prices pass through unrounded and pip math assumes a
/// four-decimal instrument.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentSpec {
    pub digits: Option<u32>,
}

impl InstrumentSpec {
    pub fn new(digits: u32) -> Self {
        Self { digits: Some(digits) }
    }

    pub fn unknown() -> Self {
        Self { digits: None }
    }

    /// Pip size from digits: a tenth of a point on 3/5-digit quotes, one
    /// point otherwise.
    pub fn pip(&self) -> f64 {
        match self.digits {
            Some(d) => {
                let point = 10f64.powi(-(d as i32));
                if d == 3 || d == 5 {
                    point * 10.0
                } else {
                    point
                }
            }
            None => 0.0001,
        }
    }

    pub fn round_price(&self, price: f64) -> f64 {
        match self.digits {
            Some(d) => {
                let factor = 10f64.powi(d as i32);
                (price * factor).round() / factor
            }
            None => price,
        }
    }
}

/// A strategy is a pure function of signal plus optional live quote; it may
/// not consult broker state or anything mutable.
pub trait EntryStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;
    fn compute(&self, signal: &Signal, quote: Option<&Quote>) -> EntryPlan;
}

pub fn build_strategy(
    kind: StrategyKind,
    config: &StrategyConfig,
    instrument: InstrumentSpec,
) -> Box<dyn EntryStrategy> {
    match kind {
        StrategyKind::Midpoint => Box::new(Midpoint),
        StrategyKind::RangeBreak => Box::new(RangeBreak),
        StrategyKind::Momentum => Box::new(Momentum),
        StrategyKind::Adaptive => Box::new(Adaptive::new(config, instrument)),
        StrategyKind::DualEntry => Box::new(DualEntry::new(config)),
        StrategyKind::TripleEntry => Box::new(TripleEntry::new(config)),
        StrategyKind::MultiTpEntry => Box::new(MultiTpEntry::new(config, instrument)),
        StrategyKind::MultiPositionEntry => Box::new(MultiPositionEntry::new(config)),
    }
}

/// Owns the selected strategy plus the instrument precision and rounds every
/// computed price before the plan leaves this crate.
pub struct EntryCalculator {
    strategy: Box<dyn EntryStrategy>,
    instrument: InstrumentSpec,
}

impl EntryCalculator {
    pub fn new(kind: StrategyKind, config: &StrategyConfig, instrument: InstrumentSpec) -> Self {
        Self {
            strategy: build_strategy(kind, config, instrument),
            instrument,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn instrument(&self) -> InstrumentSpec {
        self.instrument
    }

    pub fn calculate(&self, signal: &Signal, quote: Option<&Quote>) -> EntryPlan {
        let mut plan = self.strategy.compute(signal, quote);
        plan.representative_price = self.instrument.round_price(plan.representative_price);
        for leg in &mut plan.legs {
            leg.price = self.instrument.round_price(leg.price);
        }
        plan
    }
}
