use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dispatch_rust_core::clients::telegram::DEFAULT_API_BASE_URL;
use dispatch_rust_core::{
    BreakerConfig, OperatingWindow, OrchestratorConfig, PacingConfig, RetryPolicy,
};

const DEFAULT_SYMBOLS: &[&str] = &[
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT", "AVAXUSDT", "DOTUSDT",
    "LINKUSDT", "MATICUSDT", "LTCUSDT", "BCHUSDT", "ATOMUSDT", "ETCUSDT", "XLMUSDT", "FILUSDT",
    "ALGOUSDT", "NEARUSDT", "UNIUSDT", "DOGEUSDT", "ZECUSDT", "PEPEUSDT", "ZENUSDT", "HYPEUSDT",
    "WIFUSDT", "MEMEUSDT", "BOMEUSDT", "POPCATUSDT", "MYROUSDT", "DOGUSDT", "TOSHIUSDT",
    "MOGUSDT", "TURBOUSDT", "PEOPLEUSDT", "ARCUSDT", "DASHUSDT", "APTUSDT", "ARBUSDT", "OPUSDT",
    "SUIUSDT", "SEIUSDT", "TIAUSDT", "INJUSDT", "RNDRUSDT", "FETUSDT", "AGIXUSDT", "OCEANUSDT",
    "JASMYUSDT", "GALAUSDT", "SANDUSDT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StoreBackend::File),
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("Invalid STORE_BACKEND: {other} (expected file|redis|memory)")),
        }
    }
}

/// A named analyzer endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub telegram_api_base_url: String,

    pub store_backend: StoreBackend,
    pub users_file: PathBuf,
    pub last_signals_file: PathBuf,
    pub redis_url: String,

    pub sources: Vec<SourceSpec>,

    pub analysis_interval: Duration,
    pub start_delay: Duration,

    pub orchestrator: OrchestratorConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let telegram_bot_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let telegram_api_base_url = env::var("TELEGRAM_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());

        let store_backend: StoreBackend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "file".to_string())
            .parse()?;
        let users_file =
            PathBuf::from(env::var("USERS_FILE").unwrap_or_else(|_| "users.json".to_string()));
        let last_signals_file = PathBuf::from(
            env::var("LAST_SIGNALS_FILE").unwrap_or_else(|_| "last_signals.json".to_string()),
        );
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let sources = parse_sources(
            &env::var("SIGNAL_SOURCES")
                .context("SIGNAL_SOURCES must be set (name=url,name=url)")?,
        )?;

        let symbols = match env::var("TARGET_SYMBOLS") {
            Ok(raw) => parse_symbols(&raw)?,
            Err(_) => DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        };

        let analysis_interval =
            Duration::from_secs(parse_positive_u64_env("ANALYSIS_INTERVAL_SECS", 5400)?);
        let start_delay = Duration::from_secs(parse_u64_env("START_DELAY_SECS", 10)?);

        let timezone_str =
            env::var("OPERATING_TIMEZONE").unwrap_or_else(|_| "Asia/Ho_Chi_Minh".to_string());
        let timezone = Tz::from_str(&timezone_str).map_err(|_| {
            anyhow!(
                "Invalid OPERATING_TIMEZONE: {} (expected IANA tz like Asia/Ho_Chi_Minh)",
                timezone_str
            )
        })?;
        let window = OperatingWindow {
            timezone,
            start: parse_time_env("OPERATING_START", "04:00")?,
            cutoff: parse_time_env("OPERATING_CUTOFF", "23:30")?,
        };

        let min_confidence = parse_f64_env("MIN_CONFIDENCE", 60.0)?;
        let dedup_window = Duration::from_secs(parse_u64_env("DEDUP_WINDOW_SECS", 3600)?);

        let breaker = BreakerConfig {
            max_consecutive_errors: parse_positive_u32_env("BREAKER_THRESHOLD", 5)?,
            cooldown_duration: Duration::from_secs(parse_u64_env("BREAKER_COOLDOWN_SECS", 600)?),
        };

        let pacing = PacingConfig {
            pair_delay: Duration::from_millis(parse_u64_env("PAIR_DELAY_MS", 2000)?),
            pair_delay_growth: Duration::from_millis(parse_u64_env("PAIR_DELAY_GROWTH_MS", 1000)?),
            jitter: Duration::from_millis(parse_u64_env("PAIR_JITTER_MS", 500)?),
            dispatch_delay: Duration::from_millis(parse_u64_env("DISPATCH_DELAY_MS", 3000)?),
        };

        let retry = RetryPolicy {
            max_attempts: parse_positive_u32_env("DELIVERY_MAX_ATTEMPTS", 3)?,
            base_backoff: Duration::from_millis(parse_u64_env("DELIVERY_BACKOFF_MS", 1000)?),
            inter_message_delay: Duration::from_millis(parse_u64_env("DELIVERY_GAP_MS", 80)?),
        };

        Ok(Self {
            telegram_bot_token,
            telegram_api_base_url,
            store_backend,
            users_file,
            last_signals_file,
            redis_url,
            sources,
            analysis_interval,
            start_delay,
            orchestrator: OrchestratorConfig {
                symbols,
                min_confidence,
                window,
                pacing,
                breaker,
                retry,
                dedup_window,
            },
        })
    }
}

/// `name=url,name=url`
fn parse_sources(raw: &str) -> Result<Vec<SourceSpec>> {
    let mut sources = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, url) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid SIGNAL_SOURCES entry: {entry} (expected name=url)"))?;
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            return Err(anyhow!("Invalid SIGNAL_SOURCES entry: {entry} (expected name=url)"));
        }
        sources.push(SourceSpec {
            name: name.to_string(),
            base_url: url.to_string(),
        });
    }
    if sources.is_empty() {
        return Err(anyhow!("SIGNAL_SOURCES must contain at least one source"));
    }
    Ok(sources)
}

fn parse_symbols(raw: &str) -> Result<Vec<String>> {
    let symbols: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if symbols.is_empty() {
        return Err(anyhow!("TARGET_SYMBOLS must contain at least one symbol"));
    }
    Ok(symbols)
}

fn parse_time_env(key: &str, default: &str) -> Result<NaiveTime> {
    let raw = env_or(key, default);
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .with_context(|| format!("Invalid {key}: {raw} (expected HH:MM)"))
}

fn parse_u64(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("Invalid {key}: {raw} (expected integer)"))
}

fn parse_positive_u64(key: &str, raw: &str) -> Result<u64> {
    match parse_u64(key, raw)? {
        0 => Err(anyhow!("Invalid {key}: {raw} (must be greater than zero)")),
        value => Ok(value),
    }
}

fn parse_positive_u32(key: &str, raw: &str) -> Result<u32> {
    let value = parse_positive_u64(key, raw)?;
    u32::try_from(value).with_context(|| format!("Invalid {key}: {raw} (at most {})", u32::MAX))
}

fn env_or(key: &str, default: impl ToString) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_u64_env(key: &str, default: u64) -> Result<u64> {
    parse_u64(key, &env_or(key, default))
}

fn parse_positive_u64_env(key: &str, default: u64) -> Result<u64> {
    parse_positive_u64(key, &env_or(key, default))
}

fn parse_positive_u32_env(key: &str, default: u32) -> Result<u32> {
    parse_positive_u32(key, &env_or(key, default))
}

fn parse_f64_env(key: &str, default: f64) -> Result<f64> {
    let raw = env_or(key, default);
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("Invalid {key}: {raw} (expected number)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        let sources = parse_sources("ai=http://ai:8000, rsi = http://rsi:8001/").unwrap();
        assert_eq!(
            sources,
            vec![
                SourceSpec {
                    name: "ai".to_string(),
                    base_url: "http://ai:8000".to_string()
                },
                SourceSpec {
                    name: "rsi".to_string(),
                    base_url: "http://rsi:8001/".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_sources_rejects_bad_entries() {
        assert!(parse_sources("").is_err());
        assert!(parse_sources("http://ai:8000").is_err());
        assert!(parse_sources("ai=").is_err());
    }

    #[test]
    fn test_parse_symbols() {
        assert_eq!(parse_symbols("btcusdt, ETHUSDT,,").unwrap(), vec!["BTCUSDT", "ETHUSDT"]);
        assert!(parse_symbols(" , ").is_err());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert_eq!(parse_positive_u64("ANALYSIS_INTERVAL_SECS", "5400").unwrap(), 5400);
        let err = parse_positive_u64("ANALYSIS_INTERVAL_SECS", "0").unwrap_err();
        assert!(err.to_string().contains("ANALYSIS_INTERVAL_SECS"));
        assert!(parse_positive_u64("ANALYSIS_INTERVAL_SECS", "-5").is_err());
    }

    #[test]
    fn test_counts_out_of_u32_range_are_rejected() {
        assert_eq!(parse_positive_u32("BREAKER_THRESHOLD", " 5 ").unwrap(), 5);
        assert_eq!(parse_positive_u32("BREAKER_THRESHOLD", "4294967295").unwrap(), u32::MAX);
        assert!(parse_positive_u32("BREAKER_THRESHOLD", "4294967296").is_err());
        assert!(parse_positive_u32("DELIVERY_MAX_ATTEMPTS", "0").is_err());
    }

    #[test]
    fn test_store_backend() {
        assert_eq!("Redis".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert_eq!("file".parse::<StoreBackend>().unwrap(), StoreBackend::File);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_default_universe() {
        assert_eq!(DEFAULT_SYMBOLS.len(), 50);
        assert_eq!(DEFAULT_SYMBOLS[0], "BTCUSDT");
    }
}
