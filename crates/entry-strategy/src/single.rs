use broker_trait::Quote;
use signal_parser::{Direction, Signal};

use crate::{EntryPlan, EntryStrategy, InstrumentSpec, StrategyConfig, StrategyKind};

/// Enter at the middle of the signalled zone.
pub struct Midpoint;

impl EntryStrategy for Midpoint {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Midpoint
    }

    fn compute(&self, signal: &Signal, _quote: Option<&Quote>) -> EntryPlan {
        EntryPlan::single(signal.range_midpoint())
    }
}

/// Wait for the zone's far side: the lower bound for buys, the upper bound
/// for sells. Conservative fill, better price.
pub struct RangeBreak;

impl EntryStrategy for RangeBreak {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RangeBreak
    }

    fn compute(&self, signal: &Signal, _quote: Option<&Quote>) -> EntryPlan {
        let price = match signal.direction {
            Direction::Buy => signal.range_end,
            Direction::Sell => signal.range_start,
        };
        EntryPlan::single(price)
    }
}

/// Enter at the near side of the zone, first touch. Aggressive fill, worse
/// price.
pub struct Momentum;

impl EntryStrategy for Momentum {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Momentum
    }

    fn compute(&self, signal: &Signal, _quote: Option<&Quote>) -> EntryPlan {
        let price = match signal.direction {
            Direction::Buy => signal.range_start,
            Direction::Sell => signal.range_end,
        };
        EntryPlan::single(price)
    }
}

/// Place the entry relative to where the market actually is:
/// - market beyond the zone on the unfavorable side: clamp to the nearer
///   boundary and rest there;
/// - market beyond the zone on the favorable side: chase with a small fixed
///   offset (the execution engine converts this to a market order when the
///   distance is inside the minimum-distance band);
/// - market inside the zone: take the current price.
///
/// Without a live quote this degrades to the midpoint.
pub struct Adaptive {
    offset: f64,
}

impl Adaptive {
    pub fn new(config: &StrategyConfig, instrument: InstrumentSpec) -> Self {
        Self {
            offset: config.adaptive_offset_pips * instrument.pip(),
        }
    }

    pub(crate) fn entry_price(&self, signal: &Signal, quote: Option<&Quote>) -> f64 {
        let Some(quote) = quote else {
            return signal.range_midpoint();
        };
        match signal.direction {
            Direction::Buy => {
                let market = quote.ask;
                if market > signal.range_start {
                    signal.range_start
                } else if market < signal.range_end {
                    market + self.offset
                } else {
                    market
                }
            }
            Direction::Sell => {
                let market = quote.bid;
                if market < signal.range_end {
                    signal.range_end
                } else if market > signal.range_start {
                    market - self.offset
                } else {
                    market
                }
            }
        }
    }
}

impl EntryStrategy for Adaptive {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Adaptive
    }

    fn compute(&self, signal: &Signal, quote: Option<&Quote>) -> EntryPlan {
        EntryPlan::single(self.entry_price(signal, quote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::signal;
    use crate::EntryCalculator;
    use signal_parser::Direction;

    fn calc(kind: StrategyKind) -> EntryCalculator {
        EntryCalculator::new(kind, &StrategyConfig::default(), InstrumentSpec::new(2))
    }

    #[test]
    fn midpoint_of_example_range() {
        let plan = calc(StrategyKind::Midpoint).calculate(&signal(Direction::Buy), None);
        assert_eq!(plan.representative_price, 3985.0);
        assert!(plan.legs.is_empty());
    }

    #[test]
    fn range_break_uses_far_side() {
        let c = calc(StrategyKind::RangeBreak);
        assert_eq!(c.calculate(&signal(Direction::Buy), None).representative_price, 3980.0);
        assert_eq!(c.calculate(&signal(Direction::Sell), None).representative_price, 3990.0);
    }

    #[test]
    fn momentum_uses_near_side() {
        let c = calc(StrategyKind::Momentum);
        assert_eq!(c.calculate(&signal(Direction::Buy), None).representative_price, 3990.0);
        assert_eq!(c.calculate(&signal(Direction::Sell), None).representative_price, 3980.0);
    }

    #[test]
    fn adaptive_without_quote_is_midpoint() {
        let plan = calc(StrategyKind::Adaptive).calculate(&signal(Direction::Buy), None);
        assert_eq!(plan.representative_price, 3985.0);
    }

    #[test]
    fn adaptive_clamps_unfavorable_side() {
        let c = calc(StrategyKind::Adaptive);
        // Buy with the market above the zone rests at the upper bound.
        let q = Quote { bid: 3994.8, ask: 3995.0 };
        assert_eq!(c.calculate(&signal(Direction::Buy), Some(&q)).representative_price, 3990.0);
        // Sell with the market below the zone rests at the lower bound.
        let q = Quote { bid: 3975.0, ask: 3975.2 };
        assert_eq!(c.calculate(&signal(Direction::Sell), Some(&q)).representative_price, 3980.0);
    }

    #[test]
    fn adaptive_chases_favorable_side_with_offset() {
        let c = calc(StrategyKind::Adaptive);
        // 2 pips on a 2-digit instrument is 0.02.
        let q = Quote { bid: 3974.8, ask: 3975.0 };
        assert_eq!(c.calculate(&signal(Direction::Buy), Some(&q)).representative_price, 3975.02);
        let q = Quote { bid: 3995.0, ask: 3995.2 };
        assert_eq!(c.calculate(&signal(Direction::Sell), Some(&q)).representative_price, 3994.98);
    }

    #[test]
    fn adaptive_inside_zone_takes_market() {
        let c = calc(StrategyKind::Adaptive);
        let q = Quote { bid: 3984.8, ask: 3985.0 };
        assert_eq!(c.calculate(&signal(Direction::Buy), Some(&q)).representative_price, 3985.0);
        assert_eq!(c.calculate(&signal(Direction::Sell), Some(&q)).representative_price, 3984.8);
    }
}
