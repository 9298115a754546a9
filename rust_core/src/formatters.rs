use crate::models::{Direction, Signal, Subscriber};

const DISCLAIMER: &str = "⚠️ Always follow risk management: risk at most 2-3% per trade. \
Signals are for reference only; stop for the day after 3 winning trades.";

/// Position of a signal in the day's sequence, or a manual query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalIndex {
    Daily(u64),
    Manual,
}

impl std::fmt::Display for SignalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalIndex::Daily(n) => write!(f, "#{n} today"),
            SignalIndex::Manual => write!(f, "MANUAL"),
        }
    }
}

/// Price formatting: thousands separators and 2-4 decimals above 1,
/// up to 8 significant decimals below.
pub fn fmt_num(value: Option<f64>) -> String {
    let v = match value {
        Some(v) if v.is_finite() => v,
        _ => return "N/A".to_string(),
    };

    if v >= 1.0 {
        let fixed = format!("{v:.4}");
        let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
        let mut frac = frac_part.trim_end_matches('0').to_string();
        while frac.len() < 2 {
            frac.push('0');
        }
        format!("{}.{}", group_thousands(int_part), frac)
    } else {
        let fixed = format!("{v:.8}");
        let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
        if trimmed.is_empty() || trimmed == "-" {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Whole confidences print without decimals
fn fmt_confidence(confidence: f64) -> String {
    if confidence.fract() == 0.0 {
        format!("{confidence:.0}%")
    } else {
        format!("{confidence:.1}%")
    }
}

fn short_symbol(symbol: &str) -> String {
    symbol.replace("USDT", "")
}

pub fn format_signal_message(signal: &Signal, index: SignalIndex) -> String {
    let icon = match signal.direction {
        Direction::Long => "🟢",
        _ => "🔴",
    };
    let rr = signal
        .risk_reward
        .map(|rr| rr.to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut out = String::new();
    out.push_str(&format!("🤖 Signal [{index}]\n"));
    out.push_str(&format!(
        "#{} – [{}] 📌\n\n",
        short_symbol(&signal.symbol),
        signal.direction.as_str()
    ));
    out.push_str(&format!("{icon} Entry: {}\n", fmt_num(signal.entry)));
    out.push_str(&format!("🆗 Take Profit: {}\n", fmt_num(signal.take_profit)));
    out.push_str(&format!("🙅 Stop-Loss: {}\n", fmt_num(signal.stop_loss)));
    out.push_str(&format!(
        "🪙 RR: {rr} (Conf: {})\n\n",
        fmt_confidence(signal.confidence)
    ));
    out.push_str(&format!("🧠 Source: {}\n\n", signal.source));
    out.push_str(DISCLAIMER);
    out
}

pub fn format_no_signal(symbol: &str, reason: Option<&str>) -> String {
    format!(
        "❌ No signal for {symbol}\nReason: {}",
        reason.unwrap_or("No trade")
    )
}

/// Summary for an on-demand scan over the whole universe
pub fn format_scan_summary(results: &[Signal], min_confidence: f64) -> String {
    if results.is_empty() {
        return format!(
            "❌ No signals (confidence ≥ {}) across the whole list.",
            fmt_confidence(min_confidence)
        );
    }

    let mut out = format!(
        "🔍 FULL SCAN RESULTS ({} signals, best first)\n\n",
        results.len()
    );
    for r in results {
        out.push_str(&format!(
            "#{} - {} - Conf: {} ({})\nEntry: {} | SL: {} | TP: {}\n\n",
            short_symbol(&r.symbol),
            r.direction.as_str(),
            fmt_confidence(r.confidence),
            r.source,
            fmt_num(r.entry),
            fmt_num(r.stop_loss),
            fmt_num(r.take_profit),
        ));
    }
    out
}

pub fn format_subscriber_list(total: usize, shown: &[Subscriber]) -> String {
    let mut out = format!("📊 Subscribers: {total}\n\n");
    for s in shown {
        let handle = s
            .username
            .as_ref()
            .map(|u| format!(" (@{u})"))
            .unwrap_or_default();
        out.push_str(&format!(
            "- {}{} added: {}\n",
            s.id,
            handle,
            s.added_at.to_rfc3339()
        ));
    }
    out
}

pub fn format_welcome(first_name: Option<&str>) -> String {
    format!(
        "👋 Hi {}!\n\n\
         You are now subscribed to automatic trading signals.\n\
         Keep the chat open and wait for signals. For a manual check, use /analyzesymbol SYMBOL\n\n\
         ⚠️ Signals are for reference only; always follow risk management.",
        first_name.unwrap_or("Trader")
    )
}

pub fn format_unsubscribed(was_subscribed: bool) -> String {
    if was_subscribed {
        "🗑️ You have unsubscribed from signals. Send /start to subscribe again.".to_string()
    } else {
        "You are not subscribed. Send /start to subscribe.".to_string()
    }
}
