// Shared models for the dispatch core
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Signals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
    Neutral,
    NoTrade,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
            Direction::Neutral => "NEUTRAL",
            Direction::NoTrade => "NO_TRADE",
        }
    }

    /// Whether this verdict asks for a position at all
    pub fn is_actionable(&self) -> bool {
        matches!(self, Direction::Long | Direction::Short)
    }
}

/// Verdict produced by a signal source for one symbol.
///
/// Ephemeral: only the dispatch timestamp of a signal is ever persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    /// 0-100
    pub confidence: f64,
    pub entry: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub risk_reward: Option<f64>,
    /// Name of the analyzer that produced this verdict
    pub source: String,
    /// Why the analyzer declined to trade, when it did
    #[serde(default)]
    pub reason: Option<String>,
}

impl Signal {
    /// True when the signal is actionable and meets the confidence floor.
    pub fn qualifies(&self, min_confidence: f64) -> bool {
        self.direction.is_actionable() && self.confidence >= min_confidence
    }
}

// ============================================================================
// Subscribers & dedup records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Opaque recipient identity (a chat id for Telegram)
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "first_name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(alias = "addedAt")]
    pub added_at: DateTime<Utc>,
}

/// Older records store numeric ids
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

impl Subscriber {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            username: None,
            added_at: Utc::now(),
        }
    }
}

/// Normalize a symbol to the dedup key form.
pub fn dedup_key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(direction: Direction, confidence: f64) -> Signal {
        Signal {
            symbol: "BTCUSDT".to_string(),
            direction,
            confidence,
            entry: Some(100.0),
            stop_loss: Some(95.0),
            take_profit: Some(110.0),
            risk_reward: Some(2.0),
            source: "test".to_string(),
            reason: None,
        }
    }

    #[test]
    fn test_qualifies() {
        assert!(signal(Direction::Long, 75.0).qualifies(60.0));
        assert!(signal(Direction::Short, 60.0).qualifies(60.0));
        assert!(!signal(Direction::Long, 59.9).qualifies(60.0));
        assert!(!signal(Direction::Neutral, 95.0).qualifies(60.0));
        assert!(!signal(Direction::NoTrade, 95.0).qualifies(60.0));
    }

    #[test]
    fn test_direction_wire_format() {
        let json = serde_json::to_string(&Direction::NoTrade).unwrap();
        assert_eq!(json, "\"NO_TRADE\"");
        let parsed: Direction = serde_json::from_str("\"LONG\"").unwrap();
        assert_eq!(parsed, Direction::Long);
    }

    #[test]
    fn test_subscriber_reads_legacy_record() {
        let raw = r#"{"id": 12345, "username": null, "first_name": "Lan", "addedAt": "2024-05-01T10:00:00.000Z"}"#;
        let sub: Subscriber = serde_json::from_str(raw).unwrap();

        assert_eq!(sub.id, "12345");
        assert_eq!(sub.display_name.as_deref(), Some("Lan"));
        assert_eq!(sub.added_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_dedup_key_uppercases() {
        assert_eq!(dedup_key(" btcusdt "), "BTCUSDT");
    }
}
