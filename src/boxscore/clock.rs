//! Game clock parsing

use crate::config::NormalizeConfig;
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

fn iso_clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^PT(?:(\d+)M)?(\d+(?:\.\d+)?)S$").expect("static regex"))
}

fn colon_clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{1,2}(?:\.\d+)?)$").expect("static regex"))
}

/// Seconds remaining from a clock string (`MM:SS`, `MM:SS.s` or `PT11M32.00S`)
pub fn parse_clock(clock: &str) -> Option<f64> {
    let clock = clock.trim();
    let caps = iso_clock_re()
        .captures(clock)
        .or_else(|| colon_clock_re().captures(clock))?;

    let minutes = match caps.get(1) {
        Some(m) => m.as_str().parse::<f64>().ok()?,
        None => 0.0,
    };
    let seconds: f64 = caps.get(2)?.as_str().parse().ok()?;
    if seconds >= 60.0 {
        return None;
    }
    Some(minutes * 60.0 + seconds)
}

/// Period lengths used to turn a countdown clock into elapsed time
#[derive(Debug, Clone, Copy)]
pub struct PeriodClock {
    pub period_seconds: u32,
    pub overtime_seconds: u32,
    pub regulation_periods: u32,
}

impl From<&NormalizeConfig> for PeriodClock {
    fn from(config: &NormalizeConfig) -> Self {
        Self {
            period_seconds: config.period_seconds,
            overtime_seconds: config.overtime_seconds,
            regulation_periods: config.regulation_periods,
        }
    }
}

impl PeriodClock {
    pub fn period_length(&self, period: u32) -> f64 {
        if period > self.regulation_periods {
            f64::from(self.overtime_seconds)
        } else {
            f64::from(self.period_seconds)
        }
    }

    /// Seconds elapsed in `period` when the clock shows `clock`
    pub fn elapsed(&self, period: u32, clock: &str) -> Result<f64> {
        let remaining = parse_clock(clock)
            .ok_or_else(|| Error::Malformed(format!("unparseable clock '{}'", clock)))?;
        Ok((self.period_length(period) - remaining).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock_formats() {
        assert_eq!(parse_clock("12:00"), Some(720.0));
        assert_eq!(parse_clock("5:07"), Some(307.0));
        assert_eq!(parse_clock("00:04.5"), Some(4.5));
        assert_eq!(parse_clock("PT11M32.00S"), Some(692.0));
        assert_eq!(parse_clock("PT45.20S"), Some(45.2));
        assert_eq!(parse_clock("12:75"), None);
        assert_eq!(parse_clock("halftime"), None);
    }

    #[test]
    fn test_overtime_periods_are_shorter() {
        let clock = PeriodClock {
            period_seconds: 720,
            overtime_seconds: 300,
            regulation_periods: 4,
        };
        assert_eq!(clock.elapsed(4, "02:00").unwrap(), 600.0);
        assert_eq!(clock.elapsed(5, "02:00").unwrap(), 180.0);
        assert!(clock.elapsed(1, "").is_err());
    }
}
