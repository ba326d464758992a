use anyhow::Result;
use regex::Regex;

/// Break-even phrasings seen in the feed.
const BREAK_EVEN_PHRASES: &[&str] = &[
    "break even",
    "breakeven",
    "break-even",
    "move sl to entry",
    "sl to entry",
    "sl to be",
    "move to be",
    "set be",
    "risk free",
    "risk-free",
];

const PARTIAL_PHRASES: &[&str] = &["partial", "partials"];

/// Verbs that make a pip count read as "bank some profit now".
const PARTIAL_PIP_CONTEXT: &[&str] = &["secure", "take", "lock", "bank"];

const FULL_CLOSE_PHRASES: &[&str] = &[
    "close all",
    "close everything",
    "full close",
    "close full",
    "exit all",
    "close position",
    "close positions",
    "close trade",
    "close the trade",
    "close now",
];

const TP_HIT_PHRASES: &[&str] = &[
    "cancel all",
    "cancel orders",
    "cancel order",
    "cancel pending",
    "all tp hit",
    "all tps hit",
];

const EXTEND_TP_PHRASES: &[&str] = &["extend tp", "move tp", "new tp", "tp to"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialTrigger {
    /// TP level 1-3 when the message names one ("tp1 hit").
    pub level: Option<u8>,
    /// Pip count when the message phrases it as "secure 50 pips".
    pub pips: Option<f64>,
}

/// Every command detected in one message. Detections are independent; a
/// single message may trigger several actions.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMatch {
    pub break_even: bool,
    pub partial: Option<PartialTrigger>,
    pub full_close: bool,
    pub tp_hit: bool,
    pub extend_tp: Option<f64>,
}

impl CommandMatch {
    /// Whether this match opens command dispatch at all. TP-hit detection is
    /// deliberately excluded: it is logged, and its cancel action only runs
    /// when some other command opened dispatch for the same message.
    pub fn triggers_dispatch(&self) -> bool {
        self.break_even || self.partial.is_some() || self.full_close || self.extend_tp.is_some()
    }

    pub fn any(&self) -> bool {
        self.triggers_dispatch() || self.tp_hit
    }
}

pub struct CommandDetector {
    re_tp_level: Regex,
    re_pips: Regex,
    re_number: Regex,
}

impl CommandDetector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // "TP1", "tp 2 hit" — the word boundary keeps "TP 1050" out.
            re_tp_level: Regex::new(r"(?i)\btp\s*([1-3])\b")?,
            re_pips: Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*pips?\b")?,
            re_number: Regex::new(r"\d+(?:\.\d+)?")?,
        })
    }

    pub fn detect(&self, text: &str) -> CommandMatch {
        let lowered = text.to_lowercase();
        let contains_any = |phrases: &[&str]| phrases.iter().any(|p| lowered.contains(p));

        let level = self
            .re_tp_level
            .captures(&lowered)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok());
        let pips = self
            .re_pips
            .captures(&lowered)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok());

        let partial = if contains_any(PARTIAL_PHRASES)
            || level.is_some()
            || (pips.is_some() && contains_any(PARTIAL_PIP_CONTEXT))
        {
            Some(PartialTrigger { level, pips })
        } else {
            None
        };

        let extend_tp = if contains_any(EXTEND_TP_PHRASES) {
            self.re_number
                .find(text)
                .and_then(|m| m.as_str().parse::<f64>().ok())
        } else {
            None
        };

        CommandMatch {
            break_even: contains_any(BREAK_EVEN_PHRASES),
            partial,
            full_close: contains_any(FULL_CLOSE_PHRASES),
            tp_hit: contains_any(TP_HIT_PHRASES),
            extend_tp,
        }
    }
}
