//! Operating-hours gate.
//!
//! Cycles only evaluate symbols while the local time in the reference zone
//! falls inside `[start, cutoff)`.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct OperatingWindow {
    pub timezone: Tz,
    pub start: NaiveTime,
    pub cutoff: NaiveTime,
}

impl Default for OperatingWindow {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Ho_Chi_Minh,
            start: NaiveTime::from_hms_opt(4, 0, 0).unwrap_or(NaiveTime::MIN),
            cutoff: NaiveTime::from_hms_opt(23, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl OperatingWindow {
    /// Local time of `now` in the reference zone
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.timezone).time()
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = self.local_time(now);

        // start > cutoff means the window wraps midnight
        if self.start > self.cutoff {
            local >= self.start || local < self.cutoff
        } else {
            local >= self.start && local < self.cutoff
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// UTC instant for a Ho Chi Minh local time (UTC+7, no DST)
    fn hcm(hour: u32, minute: u32) -> DateTime<Utc> {
        chrono_tz::Asia::Ho_Chi_Minh
            .with_ymd_and_hms(2024, 3, 10, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_default_window_bounds() {
        let window = OperatingWindow::default();

        assert!(!window.is_open(hcm(3, 59)));
        assert!(window.is_open(hcm(4, 0)));
        assert!(window.is_open(hcm(12, 0)));
        assert!(window.is_open(hcm(23, 29)));
        assert!(!window.is_open(hcm(23, 30)));
        assert!(!window.is_open(hcm(23, 45)));
        assert!(!window.is_open(hcm(0, 15)));
    }

    #[test]
    fn test_uses_reference_zone_not_utc() {
        let window = OperatingWindow::default();
        // 22:00 UTC is 05:00 next day in Ho Chi Minh
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 22, 0, 0).unwrap();
        assert!(window.is_open(now));
        // 20:00 UTC is 03:00 local
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 20, 0, 0).unwrap();
        assert!(!window.is_open(now));
    }

    #[test]
    fn test_overnight_window() {
        let window = OperatingWindow {
            timezone: chrono_tz::UTC,
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            cutoff: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        };
        assert!(window.is_open(Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap()));
        assert!(window.is_open(Utc.with_ymd_and_hms(2024, 1, 1, 1, 59, 0).unwrap()));
        assert!(!window.is_open(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()));
    }
}
