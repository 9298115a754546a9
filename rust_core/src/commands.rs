//! Inbound chat commands
//!
//! Commands mutate the subscriber store or query sources on behalf of a
//! single requester. They never touch the dedup window, the circuit breaker
//! or the broadcast path; failures come back as plain-text replies.

use crate::clients::SignalSource;
use crate::formatters::{
    format_no_signal, format_scan_summary, format_signal_message, format_subscriber_list,
    format_unsubscribed, format_welcome, SignalIndex,
};
use crate::models::{Signal, Subscriber};
use crate::store::SubscriberStore;
use chrono::Utc;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Max signals listed by a full scan
pub const SCAN_RESULT_LIMIT: usize = 20;
/// Max subscribers listed by `/users`
pub const USER_LIST_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    AnalyzeSymbol(String),
    AnalyzeAll,
    Users,
}

impl Command {
    /// Parse a chat message. Accepts the `/cmd@BotName` form.
    pub fn parse(text: &str) -> Option<Command> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let (head, rest) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        match name.as_str() {
            "/start" => Some(Command::Start),
            "/stop" => Some(Command::Stop),
            "/analyzesymbol" => Some(Command::AnalyzeSymbol(rest.to_string())),
            "/analyzeall" => Some(Command::AnalyzeAll),
            "/users" => Some(Command::Users),
            _ => None,
        }
    }
}

/// Who sent the command
#[derive(Debug, Clone)]
pub struct Requester {
    pub chat_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// Uppercase and append the quote asset when missing
pub fn normalize_symbol(raw: &str) -> String {
    let symbol = raw.trim().to_uppercase();
    if symbol.ends_with("USDT") {
        symbol
    } else {
        format!("{symbol}USDT")
    }
}

pub struct CommandHandler {
    sources: Vec<Arc<dyn SignalSource>>,
    subscribers: Arc<dyn SubscriberStore>,
    symbols: Vec<String>,
    min_confidence: f64,
    scan_delay: Duration,
}

impl CommandHandler {
    pub fn new(
        sources: Vec<Arc<dyn SignalSource>>,
        subscribers: Arc<dyn SubscriberStore>,
        symbols: Vec<String>,
        min_confidence: f64,
    ) -> Self {
        Self {
            sources,
            subscribers,
            symbols,
            min_confidence,
            scan_delay: Duration::from_millis(1200),
        }
    }

    pub fn with_scan_delay(mut self, scan_delay: Duration) -> Self {
        self.scan_delay = scan_delay;
        self
    }

    /// Immediate reply for slow commands, sent before the real answer
    pub fn acknowledgement(&self, command: &Command) -> Option<String> {
        match command {
            Command::AnalyzeSymbol(raw) if !raw.trim().is_empty() => {
                Some(format!("⏳ Analyzing {}...", normalize_symbol(raw)))
            }
            Command::AnalyzeAll => Some(format!(
                "⏳ Analyzing {} coins... This can take a few minutes.",
                self.symbols.len()
            )),
            _ => None,
        }
    }

    /// Execute `command` and return the replies for the requester, in order.
    pub async fn handle(&self, requester: &Requester, command: Command) -> Vec<String> {
        match command {
            Command::Start => vec![self.subscribe(requester).await],
            Command::Stop => vec![self.unsubscribe(&requester.chat_id).await],
            Command::AnalyzeSymbol(raw) if raw.trim().is_empty() => {
                vec!["Usage: /analyzesymbol SYMBOL (e.g. /analyzesymbol BTC)".to_string()]
            }
            Command::AnalyzeSymbol(raw) => self.manual_analyze(&raw).await,
            Command::AnalyzeAll => vec![self.analyze_all().await],
            Command::Users => vec![self.list_users().await],
        }
    }

    /// Idempotent: re-subscribing overwrites the existing record.
    pub async fn subscribe(&self, requester: &Requester) -> String {
        let subscriber = Subscriber {
            id: requester.chat_id.clone(),
            display_name: requester.first_name.clone(),
            username: requester.username.clone(),
            added_at: Utc::now(),
        };

        match self.subscribers.add(subscriber).await {
            Ok(()) => {
                info!(chat_id = %requester.chat_id, username = ?requester.username, "Subscribed");
                format_welcome(requester.first_name.as_deref())
            }
            Err(e) => {
                warn!(chat_id = %requester.chat_id, error = %e, "Subscribe failed");
                format!("❌ Could not subscribe: {e}")
            }
        }
    }

    pub async fn unsubscribe(&self, chat_id: &str) -> String {
        match self.subscribers.remove(chat_id).await {
            Ok(existed) => {
                if existed {
                    info!(chat_id = %chat_id, "Unsubscribed");
                }
                format_unsubscribed(existed)
            }
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Unsubscribe failed");
                format!("❌ Could not unsubscribe: {e}")
            }
        }
    }

    /// Ask every source about one symbol. Only the direction filter applies.
    pub async fn manual_analyze(&self, raw_symbol: &str) -> Vec<String> {
        let symbol = normalize_symbol(raw_symbol);
        let mut replies = Vec::new();
        let mut reason: Option<String> = None;
        let mut last_error: Option<String> = None;

        for source in &self.sources {
            match source.analyze(&symbol).await {
                Ok(signal) if signal.direction.is_actionable() => {
                    replies.push(format_signal_message(&signal, SignalIndex::Manual));
                }
                Ok(signal) => {
                    reason = signal.reason.or_else(|| Some(signal.direction.as_str().to_string()));
                }
                Err(e) => {
                    warn!(
                        symbol = %symbol,
                        source = source.name(),
                        error = %e,
                        "Manual analysis failed"
                    );
                    last_error = Some(e.to_string());
                }
            }
        }

        if !replies.is_empty() {
            return replies;
        }
        match (reason, last_error) {
            (None, Some(err)) => vec![format!("❌ Analysis of {symbol} failed: {err}")],
            (reason, _) => vec![format_no_signal(&symbol, reason.as_deref())],
        }
    }

    /// Scan the whole universe across every source and summarize the best
    /// qualifying signals.
    pub async fn analyze_all(&self) -> String {
        let mut results: Vec<Signal> = Vec::new();

        for symbol in &self.symbols {
            for source in &self.sources {
                match source.analyze(symbol).await {
                    Ok(signal) if signal.qualifies(self.min_confidence) => results.push(signal),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            symbol = %symbol,
                            source = source.name(),
                            error = %e,
                            "Scan analysis failed"
                        )
                    }
                }
                tokio::time::sleep(self.scan_delay).await;
            }
        }

        results.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        results.truncate(SCAN_RESULT_LIMIT);

        info!(found = results.len(), "Full scan finished");
        format_scan_summary(&results, self.min_confidence)
    }

    pub async fn list_users(&self) -> String {
        match self.subscribers.list_all().await {
            Ok(all) => {
                let shown = &all[..all.len().min(USER_LIST_LIMIT)];
                format_subscriber_list(all.len(), shown)
            }
            Err(e) => {
                warn!(error = %e, "Failed to list subscribers");
                format!("❌ Could not load subscribers: {e}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::models::Direction;
    use crate::store::MemorySubscriberStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Source answering from a fixed table of (direction, confidence)
    struct TableSource {
        name: String,
        table: HashMap<String, (Direction, f64)>,
    }

    impl TableSource {
        fn new(name: &str, rows: &[(&str, Direction, f64)]) -> Arc<dyn SignalSource> {
            Arc::new(Self {
                name: name.to_string(),
                table: rows
                    .iter()
                    .map(|(s, d, c)| (s.to_string(), (*d, *c)))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl SignalSource for TableSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn analyze(&self, symbol: &str) -> Result<Signal, SourceError> {
            let (direction, confidence) = self
                .table
                .get(symbol)
                .copied()
                .ok_or_else(|| SourceError::Other(format!("unknown symbol {symbol}")))?;
            Ok(Signal {
                symbol: symbol.to_string(),
                direction,
                confidence,
                entry: Some(1.5),
                stop_loss: Some(1.4),
                take_profit: Some(1.8),
                risk_reward: Some(3.0),
                source: self.name.clone(),
                reason: (!direction.is_actionable()).then(|| "Sideways market".to_string()),
            })
        }
    }

    fn requester(id: &str) -> Requester {
        Requester {
            chat_id: id.to_string(),
            username: Some("trader".to_string()),
            first_name: Some("Lan".to_string()),
        }
    }

    fn handler(
        sources: Vec<Arc<dyn SignalSource>>,
    ) -> (Arc<MemorySubscriberStore>, CommandHandler) {
        let store = Arc::new(MemorySubscriberStore::new());
        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string(), "SOLUSDT".to_string()];
        let handler = CommandHandler::new(sources, store.clone(), symbols, 60.0)
            .with_scan_delay(Duration::ZERO);
        (store, handler)
    }

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/stop@SignalBot"), Some(Command::Stop));
        assert_eq!(
            Command::parse("/analyzesymbol  btc "),
            Some(Command::AnalyzeSymbol("btc".to_string()))
        );
        assert_eq!(Command::parse("/analyzeall"), Some(Command::AnalyzeAll));
        assert_eq!(Command::parse("/users"), Some(Command::Users));
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("hello"), None);
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("btc"), "BTCUSDT");
        assert_eq!(normalize_symbol(" ethusdt "), "ETHUSDT");
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let (store, handler) = handler(vec![]);

        let reply = handler.handle(&requester("1"), Command::Start).await;
        assert!(reply[0].contains("Hi Lan"));
        handler.handle(&requester("1"), Command::Start).await;

        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_replies_either_way() {
        let (store, handler) = handler(vec![]);
        handler.subscribe(&requester("1")).await;

        assert_eq!(handler.unsubscribe("1").await, format_unsubscribed(true));
        assert_eq!(handler.unsubscribe("1").await, format_unsubscribed(false));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_manual_analyze_ignores_confidence() {
        let source = TableSource::new("ai", &[("BTCUSDT", Direction::Long, 40.0)]);
        let (_, handler) = handler(vec![source]);

        let replies = handler.manual_analyze("btc").await;

        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with("🤖 Signal [MANUAL]"));
    }

    #[tokio::test]
    async fn test_manual_analyze_no_signal_reason() {
        let source = TableSource::new("ai", &[("ETHUSDT", Direction::NoTrade, 80.0)]);
        let (_, handler) = handler(vec![source]);

        let replies = handler.manual_analyze("ETH").await;
        assert_eq!(replies, vec![format_no_signal("ETHUSDT", Some("Sideways market"))]);
    }

    #[tokio::test]
    async fn test_manual_analyze_error_reply() {
        let source = TableSource::new("ai", &[]);
        let (_, handler) = handler(vec![source]);

        let replies = handler.manual_analyze("XRP").await;
        assert!(replies[0].starts_with("❌ Analysis of XRPUSDT failed"));
    }

    #[tokio::test]
    async fn test_analyze_all_filters_and_sorts() {
        let ai = TableSource::new(
            "ai",
            &[
                ("BTCUSDT", Direction::Long, 70.0),
                ("ETHUSDT", Direction::Neutral, 90.0),
                ("SOLUSDT", Direction::Short, 85.0),
            ],
        );
        let rsi = TableSource::new("rsi", &[("BTCUSDT", Direction::Short, 55.0)]);
        let (_, handler) = handler(vec![ai, rsi]);

        let text = handler.analyze_all().await;

        assert!(text.contains("2 signals"));
        let sol = text.find("#SOL").unwrap();
        let btc = text.find("#BTC").unwrap();
        assert!(sol < btc);
        assert!(!text.contains("#ETH"));
    }

    #[tokio::test]
    async fn test_list_users() {
        let (_, handler) = handler(vec![]);
        handler.subscribe(&requester("1")).await;
        handler.subscribe(&requester("2")).await;

        let text = handler.handle(&requester("1"), Command::Users).await;
        assert!(text[0].starts_with("📊 Subscribers: 2"));
        assert!(text[0].contains("- 2 (@trader)"));
    }
}
