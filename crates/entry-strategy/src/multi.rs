use broker_trait::Quote;
use signal_parser::{Direction, Signal};

use crate::{
    Adaptive, EntryPlan, EntryStrategy, InstrumentSpec, Leg, StrategyConfig, StrategyKind,
};

/// Two equal-volume legs at one third and two thirds of the range.
pub struct DualEntry {
    leg_volume: f64,
}

impl DualEntry {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            leg_volume: config.dual_leg_volume,
        }
    }
}

impl EntryStrategy for DualEntry {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DualEntry
    }

    fn compute(&self, signal: &Signal, _quote: Option<&Quote>) -> EntryPlan {
        let third = signal.range_size() / 3.0;
        let lower = signal.range_end + third;
        let upper = signal.range_end + 2.0 * third;
        let legs = vec![
            Leg {
                price: lower,
                volume: self.leg_volume,
                take_profit_pips: None,
                label: "leg 1/2".to_string(),
                zone: None,
            },
            Leg {
                price: upper,
                volume: self.leg_volume,
                take_profit_pips: None,
                label: "leg 2/2".to_string(),
                zone: None,
            },
        ];
        EntryPlan::with_legs(lower, legs)
    }
}

/// Three legs across the zone with volumes 1x/2x/3x of the base unit. The
/// smallest leg sits where the market reaches first and the largest where it
/// reaches last, so a shallow touch risks the least volume.
pub struct TripleEntry {
    unit_volume: f64,
}

impl TripleEntry {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            unit_volume: config.unit_volume,
        }
    }
}

impl EntryStrategy for TripleEntry {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TripleEntry
    }

    fn compute(&self, signal: &Signal, _quote: Option<&Quote>) -> EntryPlan {
        let mid = signal.range_midpoint();
        let prices = match signal.direction {
            Direction::Buy => [signal.range_end, mid, signal.range_start],
            Direction::Sell => [signal.range_start, mid, signal.range_end],
        };
        let legs = prices
            .iter()
            .enumerate()
            .map(|(i, price)| Leg {
                price: *price,
                volume: self.unit_volume * (i + 1) as f64,
                take_profit_pips: None,
                label: format!("leg {}/3", i + 1),
                zone: None,
            })
            .collect();
        EntryPlan::with_legs(prices[0], legs)
    }
}

/// Five legs at one adaptive entry price, each with its own take-profit rung
/// from the configured ladder; the last leg runs to the signal's target.
pub struct MultiTpEntry {
    adaptive: Adaptive,
    volumes: Vec<f64>,
    tp_pips: Vec<f64>,
}

impl MultiTpEntry {
    pub fn new(config: &StrategyConfig, instrument: InstrumentSpec) -> Self {
        Self {
            adaptive: Adaptive::new(config, instrument),
            volumes: config.multi_tp_volumes.clone(),
            tp_pips: config.multi_tp_pips.clone(),
        }
    }
}

impl EntryStrategy for MultiTpEntry {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MultiTpEntry
    }

    fn compute(&self, signal: &Signal, quote: Option<&Quote>) -> EntryPlan {
        let entry = self.adaptive.entry_price(signal, quote);
        let total = self.volumes.len();
        let legs = self
            .volumes
            .iter()
            .enumerate()
            .map(|(i, volume)| Leg {
                price: entry,
                volume: *volume,
                take_profit_pips: self.tp_pips.get(i).copied(),
                label: format!("TP{}/{}", i + 1, total),
                zone: None,
            })
            .collect();
        EntryPlan::with_legs(entry, legs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Start,
    Mid,
    End,
}

impl Zone {
    fn label(self) -> &'static str {
        match self {
            Zone::Start => "start",
            Zone::Mid => "mid",
            Zone::End => "end",
        }
    }

    fn price(self, signal: &Signal) -> f64 {
        match self {
            Zone::Start => signal.range_start,
            Zone::Mid => signal.range_midpoint(),
            Zone::End => signal.range_end,
        }
    }
}

/// N small legs spread over the three zone levels (range start, midpoint,
/// range end). The dominant zone is whichever boundary is nearer the live
/// quote on the trade side; without a quote, buys lean on range_end and
/// sells on range_start. The dominant zone gets the larger leg count, its
/// first leg double volume, and legs inside a zone climb the take-profit
/// ladder in order, running to the signal's target once the ladder is spent.
pub struct MultiPositionEntry {
    count: usize,
    position_volume: f64,
    tp_pips: Vec<f64>,
}

impl MultiPositionEntry {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            count: config.multi_position_count,
            position_volume: config.position_volume,
            tp_pips: config.multi_tp_pips.clone(),
        }
    }

    fn dominant_zone(&self, signal: &Signal, quote: Option<&Quote>) -> Zone {
        if let Some(quote) = quote {
            let market = match signal.direction {
                Direction::Buy => quote.ask,
                Direction::Sell => quote.bid,
            };
            let to_start = (market - signal.range_start).abs();
            let to_end = (market - signal.range_end).abs();
            if to_start < to_end {
                return Zone::Start;
            }
            if to_end < to_start {
                return Zone::End;
            }
        }
        match signal.direction {
            Direction::Buy => Zone::End,
            Direction::Sell => Zone::Start,
        }
    }

    /// Even thirds, remainder to the dominant zone, then one leg shifted
    /// from the far zone to the dominant one (9 -> 4/3/2).
    fn zone_counts(n: usize) -> (usize, usize, usize) {
        let base = n / 3;
        let mut dominant = base + n % 3;
        let mut far = base;
        if far > 0 {
            far -= 1;
            dominant += 1;
        }
        (dominant, base, far)
    }
}

impl EntryStrategy for MultiPositionEntry {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MultiPositionEntry
    }

    fn compute(&self, signal: &Signal, quote: Option<&Quote>) -> EntryPlan {
        let dominant = self.dominant_zone(signal, quote);
        let far = match dominant {
            Zone::Start => Zone::End,
            _ => Zone::Start,
        };
        let (dominant_count, mid_count, far_count) = Self::zone_counts(self.count);

        let mut legs = Vec::with_capacity(self.count);
        for (zone, count) in [
            (dominant, dominant_count),
            (Zone::Mid, mid_count),
            (far, far_count),
        ] {
            for i in 0..count {
                // Double volume on the first leg of the dominant zone.
                let volume = if zone == dominant && i == 0 {
                    self.position_volume * 2.0
                } else {
                    self.position_volume
                };
                legs.push(Leg {
                    price: zone.price(signal),
                    volume,
                    take_profit_pips: self.tp_pips.get(i).copied(),
                    label: format!("{}-{}", zone.label(), i + 1),
                    zone: Some(zone.label().to_string()),
                });
            }
        }
        EntryPlan::with_legs(signal.range_midpoint(), legs)
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

    fn total_volume(plan: &EntryPlan) -> f64 {
        plan.legs.iter().map(|l| l.volume).sum()
    }

    #[test]
    fn dual_entry_thirds_of_example_range() {
        let plan = calc(StrategyKind::DualEntry).calculate(&signal(Direction::Buy), None);
        assert_eq!(plan.legs.len(), 2);
        assert_eq!(plan.legs[0].price, 3983.33);
        assert_eq!(plan.legs[1].price, 3986.67);
        assert_eq!(plan.representative_price, 3983.33);
        for leg in &plan.legs {
            assert_eq!(leg.volume, 0.07);
        }
        assert!((total_volume(&plan) - 0.14).abs() < 1e-9);
    }

    #[test]
    fn triple_entry_volume_ordering() {
        let c = calc(StrategyKind::TripleEntry);

        let buy = c.calculate(&signal(Direction::Buy), None);
        assert_eq!(buy.legs.len(), 3);
        let smallest = buy
            .legs
            .iter()
            .min_by(|a, b| a.volume.partial_cmp(&b.volume).unwrap())
            .unwrap();
        assert_eq!(smallest.price, 3980.0);
        let largest = buy
            .legs
            .iter()
            .max_by(|a, b| a.volume.partial_cmp(&b.volume).unwrap())
            .unwrap();
        assert_eq!(largest.price, 3990.0);
        assert_eq!(buy.representative_price, 3980.0);

        let sell = c.calculate(&signal(Direction::Sell), None);
        let smallest = sell
            .legs
            .iter()
            .min_by(|a, b| a.volume.partial_cmp(&b.volume).unwrap())
            .unwrap();
        assert_eq!(smallest.price, 3990.0);
        assert_eq!(sell.representative_price, 3990.0);
    }

    #[test]
    fn triple_entry_volume_conservation() {
        let plan = calc(StrategyKind::TripleEntry).calculate(&signal(Direction::Buy), None);
        // 1x + 2x + 3x of the 0.01 unit.
        assert!((total_volume(&plan) - 0.06).abs() < 1e-9);
    }

    #[test]
    fn multi_tp_ladder() {
        let q = Quote { bid: 3984.8, ask: 3985.0 };
        let plan = calc(StrategyKind::MultiTpEntry).calculate(&signal(Direction::Buy), Some(&q));
        assert_eq!(plan.legs.len(), 5);
        for leg in &plan.legs {
            assert_eq!(leg.price, 3985.0);
        }
        let pips: Vec<Option<f64>> = plan.legs.iter().map(|l| l.take_profit_pips).collect();
        assert_eq!(
            pips,
            vec![Some(200.0), Some(400.0), Some(600.0), Some(800.0), None]
        );
        assert_eq!(plan.legs[4].label, "TP5/5");
        assert!((total_volume(&plan) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn multi_position_zone_distribution() {
        // Market near the lower bound: end zone dominates.
        let q = Quote { bid: 3980.8, ask: 3981.0 };
        let plan =
            calc(StrategyKind::MultiPositionEntry).calculate(&signal(Direction::Buy), Some(&q));
        assert_eq!(plan.legs.len(), 9);
        assert_eq!(plan.representative_price, 3985.0);

        let count = |zone: &str| plan.legs.iter().filter(|l| l.zone.as_deref() == Some(zone)).count();
        assert_eq!(count("end"), 4);
        assert_eq!(count("mid"), 3);
        assert_eq!(count("start"), 2);

        // First dominant-zone leg carries double volume.
        let first_end = plan
            .legs
            .iter()
            .find(|l| l.zone.as_deref() == Some("end"))
            .unwrap();
        assert_eq!(first_end.volume, 0.02);
        // 9 legs at 0.01 plus one doubled.
        assert!((total_volume(&plan) - 0.10).abs() < 1e-9);
    }

    #[test]
    fn multi_position_dominant_follows_quote() {
        let c = calc(StrategyKind::MultiPositionEntry);
        // Market near the upper bound flips dominance to the start zone.
        let q = Quote { bid: 3989.5, ask: 3989.7 };
        let plan = c.calculate(&signal(Direction::Buy), Some(&q));
        let starts = plan
            .legs
            .iter()
            .filter(|l| l.zone.as_deref() == Some("start"))
            .count();
        assert_eq!(starts, 4);
    }

    #[test]
    fn multi_position_fallback_without_quote() {
        let c = calc(StrategyKind::MultiPositionEntry);
        let buy = c.calculate(&signal(Direction::Buy), None);
        assert_eq!(
            buy.legs
                .iter()
                .filter(|l| l.zone.as_deref() == Some("end"))
                .count(),
            4
        );
        let sell = c.calculate(&signal(Direction::Sell), None);
        assert_eq!(
            sell.legs
                .iter()
                .filter(|l| l.zone.as_deref() == Some("start"))
                .count(),
            4
        );
    }

    #[test]
    fn multi_position_tp_tiers_ascend_within_zone() {
        let plan = calc(StrategyKind::MultiPositionEntry).calculate(&signal(Direction::Buy), None);
        let end_tps: Vec<Option<f64>> = plan
            .legs
            .iter()
            .filter(|l| l.zone.as_deref() == Some("end"))
            .map(|l| l.take_profit_pips)
            .collect();
        assert_eq!(
            end_tps,
            vec![Some(200.0), Some(400.0), Some(600.0), Some(800.0)]
        );
        let start_tps: Vec<Option<f64>> = plan
            .legs
            .iter()
            .filter(|l| l.zone.as_deref() == Some("start"))
            .map(|l| l.take_profit_pips)
            .collect();
        assert_eq!(start_tps, vec![Some(200.0), Some(400.0)]);
    }
}
