use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Chat phrases that mark a message as channel noise rather than a signal.
/// Case-insensitive substring match; extendable through configuration.
pub const DEFAULT_IGNORE_PHRASES: &[&str] = &[
    "reason for",
    "looking at",
    "weekly trading summary",
    "weekly journals",
    "elite trader",
    "analysis",
    "strategy",
    "summary",
    "haha",
    "lol",
    "livestream",
    "stream",
    "twitch",
    "youtube",
    "discord",
    "zoom",
    "channel",
    "batch",
    "how to",
    "recap",
    "recaps",
    "w in the chat",
    "vip discussion",
    "how to split risk",
    "btc",
    "btcusd",
    "bitcoin",
    "gbpjpy",
    "nzdjpy",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }
}

/// One parsed trading instruction. Immutable; `range_start` is always the
/// larger of the two extracted bounds and `range_end` the smaller, whichever
/// order they appeared in and whatever the direction is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub range_start: f64,
    pub range_end: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub volume: f64,
    pub raw_text: String,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn range_midpoint(&self) -> f64 {
        (self.range_start + self.range_end) / 2.0
    }

    pub fn range_size(&self) -> f64 {
        self.range_start - self.range_end
    }
}

/// Where the instrument name comes from: a single configured symbol (the
/// deployed setup trades one gold contract), or an uppercase token pulled
/// out of the message itself.
#[derive(Debug, Clone)]
pub enum SymbolRule {
    Fixed(String),
    Extract { min_len: usize },
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub min_length: usize,
    pub ignore_phrases: Vec<String>,
    pub range_ceiling: f64,
    pub default_volume: f64,
    pub symbol: SymbolRule,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            min_length: 10,
            ignore_phrases: DEFAULT_IGNORE_PHRASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            range_ceiling: 50_000.0,
            default_volume: 0.09,
            symbol: SymbolRule::Fixed("XAUUSD.p".to_string()),
        }
    }
}

/// Permissive-then-filtering parser: extract everything plausible from the
/// message, then validate. Upstream formats drift, so every extraction rule
/// has a fallback chain and any miss degrades to "not a signal" instead of
/// producing wrong numbers.
pub struct SignalParser {
    config: ParserConfig,
    re_number: Regex,
    re_direction_word: Regex,
    re_range: Regex,
    re_stop_loss: Regex,
    re_take_profit: Regex,
    re_volume: Regex,
    re_symbol: Regex,
}

impl SignalParser {
    pub fn new(config: ParserConfig) -> Result<Self> {
        Ok(Self {
            re_number: Regex::new(r"\d+(?:\.\d+)?")?,
            re_direction_word: Regex::new(r"(?i)\b(buy|sell)\b")?,
            // A range reads "RANGE: 3980-3990", "RANGE 3980 – 3990", or just
            // ": 3980~3990" after some label.
            re_range: Regex::new(
                r"(?i)(?:range\s*:?|:)\s*(\d+(?:\.\d+)?)\s*[-–~]\s*(\d+(?:\.\d+)?)",
            )?,
            re_stop_loss: Regex::new(r"(?i)\bsl\s*:?\s*(\d+(?:\.\d+)?)")?,
            // Some senders type "TP: /4050"; tolerate the stray slash.
            re_take_profit: Regex::new(r"(?i)\btp\s*:?\s*/?\s*(\d+(?:\.\d+)?)")?,
            re_volume: Regex::new(r"(?i)\b(?:lots?|volume)\s*[:=]?\s*(\d+(?:\.\d+)?)")?,
            re_symbol: Regex::new(r"[A-Z]{2,}(?:[A-Z.]*[A-Z])?")?,
            config,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(ParserConfig::default())
    }

    /// Parse one message. Returns None for anything that is not a complete,
    /// sane signal; never errors out to the caller.
    pub fn parse(&self, text: &str) -> Option<Signal> {
        let trimmed = text.trim();
        if trimmed.len() < self.config.min_length {
            return None;
        }
        if !trimmed.chars().any(|c| c.is_alphanumeric()) {
            return None;
        }

        let lowered = trimmed.to_lowercase();
        if let Some(phrase) = self
            .config
            .ignore_phrases
            .iter()
            .find(|p| lowered.contains(p.as_str()))
        {
            tracing::debug!(phrase = %phrase, "message matched ignore phrase");
            return None;
        }

        let direction = self.extract_direction(trimmed)?;

        let numbers: Vec<f64> = self
            .re_number
            .find_iter(trimmed)
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .collect();
        // Two range bounds plus SL plus TP is the minimum for a full signal.
        if numbers.len() < 4 {
            return None;
        }

        let (bound_a, bound_b) = match self.re_range.captures(trimmed) {
            Some(caps) => (
                caps.get(1)?.as_str().parse::<f64>().ok()?,
                caps.get(2)?.as_str().parse::<f64>().ok()?,
            ),
            None => (numbers[0], numbers[1]),
        };
        let range_start = bound_a.max(bound_b);
        let range_end = bound_a.min(bound_b);

        let stop_loss = self.capture_number(&self.re_stop_loss, trimmed)?;
        let take_profit = self.capture_number(&self.re_take_profit, trimmed)?;

        let volume = self
            .capture_number(&self.re_volume, trimmed)
            .unwrap_or(self.config.default_volume);

        // A differently-scaled instrument (index points, crypto) can slip
        // through the number patterns; refuse rather than trade it.
        if range_start > self.config.range_ceiling || range_end > self.config.range_ceiling {
            tracing::warn!(range_start, range_end, "range above sanity ceiling, dropping");
            return None;
        }

        let symbol = match &self.config.symbol {
            SymbolRule::Fixed(s) => s.clone(),
            SymbolRule::Extract { min_len } => self
                .re_symbol
                .find_iter(trimmed)
                .map(|m| m.as_str())
                .find(|s| s.len() >= *min_len)?
                .to_string(),
        };

        Some(Signal {
            symbol,
            direction,
            range_start,
            range_end,
            stop_loss,
            take_profit,
            volume,
            raw_text: trimmed.to_string(),
            timestamp: Utc::now(),
        })
    }

    fn extract_direction(&self, text: &str) -> Option<Direction> {
        // Emoji markers win over words: a red circle means sell even if the
        // commentary says "buyers are trapped".
        if text.contains('\u{1F534}') {
            return Some(Direction::Sell);
        }
        if text.contains('\u{1F7E2}') {
            return Some(Direction::Buy);
        }
        match self
            .re_direction_word
            .captures(text)?
            .get(1)?
            .as_str()
            .to_lowercase()
            .as_str()
        {
            "buy" => Some(Direction::Buy),
            "sell" => Some(Direction::Sell),
            _ => None,
        }
    }

    fn capture_number(&self, re: &Regex, text: &str) -> Option<f64> {
        re.captures(text)?.get(1)?.as_str().parse::<f64>().ok()
    }
}
