//! Closing-date parsing and the drill-down policy.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

static PORTAL_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2})/(\d{2})/(\d{4})\s*(\d{2}):(\d{2})").expect("valid portal datetime pattern")
});

/// Parse a portal `DD/MM/YYYY HH:MM` closing date (seconds become `:00`).
///
/// Returns `None` for anything else, including dates without a time and
/// impossible calendar values.
pub fn parse_closing_date(raw: &str) -> Option<NaiveDateTime> {
    let caps = PORTAL_DATETIME.captures(raw)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let date = NaiveDate::from_ymd_opt(num(3)? as i32, num(2)?, num(1)?)?;
    date.and_hms_opt(num(4)?, num(5)?, 0)
}

/// Whether a record warrants a drill-down.
///
/// Always when `force` is set; otherwise only when the closing date is
/// known and strictly after `now`.
pub fn should_explore(closing_date: Option<NaiveDateTime>, force: bool, now: NaiveDateTime) -> bool {
    force || closing_date.is_some_and(|closing| closing > now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn parses_portal_format() {
        assert_eq!(parse_closing_date("15/03/2030 09:05"), Some(at("2030-03-15 09:05:00")));
        assert_eq!(parse_closing_date("15/03/203009:05"), Some(at("2030-03-15 09:05:00")));
        assert_eq!(
            parse_closing_date("Encerra em 01/12/2024 18:00 (Brasília)"),
            Some(at("2024-12-01 18:00:00"))
        );
    }

    #[test]
    fn rejects_unparseable_dates() {
        assert_eq!(parse_closing_date(""), None);
        assert_eq!(parse_closing_date("15/03/2030"), None);
        assert_eq!(parse_closing_date("31/02/2030 10:00"), None);
        assert_eq!(parse_closing_date("2030-03-15 10:00"), None);
    }

    #[test]
    fn explore_policy() {
        let now = at("2025-06-01 12:00:00");
        assert!(should_explore(Some(at("2025-06-01 12:00:01")), false, now));
        assert!(!should_explore(Some(now), false, now));
        assert!(!should_explore(Some(at("2025-01-01 00:00:00")), false, now));
        assert!(!should_explore(None, false, now));
        assert!(should_explore(None, true, now));
        assert!(should_explore(Some(at("2020-01-01 00:00:00")), true, now));
    }
}
