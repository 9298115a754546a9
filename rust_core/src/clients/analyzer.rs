//! HTTP Analyzer Client
//!
//! Queries an external analysis service for a trading verdict:
//! `GET {base_url}/analyze?symbol=BTCUSDT`.
//!
//! Throttling from the analyzer (HTTP 429/418, or those codes embedded in an
//! error body relayed from the exchange) is reported as rate-limited.

use super::signal_source::SignalSource;
use crate::error::SourceError;
use crate::models::{Direction, Signal};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct AnalyzerMeta {
    confidence: Option<f64>,
}

/// Wire format of the analyzer response
#[derive(Debug, Deserialize)]
struct AnalyzerResponse {
    symbol: Option<String>,
    /// Absent or null means the analyzer had nothing to say
    #[serde(default)]
    direction: Option<Direction>,
    confidence: Option<f64>,
    entry: Option<f64>,
    #[serde(alias = "sl")]
    stop_loss: Option<f64>,
    #[serde(alias = "tp")]
    take_profit: Option<f64>,
    #[serde(alias = "rr")]
    risk_reward: Option<f64>,
    reason: Option<String>,
    meta: Option<AnalyzerMeta>,
}

impl AnalyzerResponse {
    fn into_signal(self, requested_symbol: &str, source: &str) -> Signal {
        // Older analyzers only report confidence inside `meta`
        let confidence = self
            .confidence
            .or_else(|| self.meta.as_ref().and_then(|m| m.confidence))
            .unwrap_or(0.0);

        Signal {
            symbol: self
                .symbol
                .unwrap_or_else(|| requested_symbol.to_string()),
            direction: self.direction.unwrap_or(Direction::NoTrade),
            confidence,
            entry: self.entry,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            risk_reward: self.risk_reward,
            source: source.to_string(),
            reason: self.reason,
        }
    }
}

pub struct HttpSignalSource {
    name: String,
    base_url: String,
    http: Client,
}

impl HttpSignalSource {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl SignalSource for HttpSignalSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, symbol: &str) -> Result<Signal, SourceError> {
        let url = format!("{}/analyze", self.base_url.trim_end_matches('/'));

        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| SourceError::Other(format!("{} request failed: {}", self.name, e)))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let err = SourceError::from_status(&self.name, status.as_u16(), &body);
            if err.is_rate_limited() {
                return Err(err);
            }
            return Err(SourceError::from_message(
                &self.name,
                &format!("status {}: {}", status.as_u16(), body),
            ));
        }

        let parsed: AnalyzerResponse = serde_json::from_str(&body).map_err(|e| {
            SourceError::Other(format!("{} returned unreadable verdict: {}", self.name, e))
        })?;

        debug!(
            source = %self.name,
            symbol = %symbol,
            direction = ?parsed.direction,
            "Analyzer verdict"
        );
        Ok(parsed.into_signal(symbol, &self.name))
    }
}
