//! Stored date representation and player-facing date formatting.
//!
//! Dates are stored as fixed-width UTC text (`YYYY-MM-DD HH:MM:SS`) so that
//! string comparison orders them chronologically on every backend. Rows
//! written by older releases may hold a bare `YYYY-MM-DD`.

use chrono::{DateTime, Locale, NaiveDate, NaiveDateTime, Utc};

pub const STORED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current time in stored form.
pub fn now_stored() -> String {
    Utc::now().format(STORED_FORMAT).to_string()
}

/// Lower bound for "received after" filters.
///
/// `start_millis <= 0` is the epoch sentinel meaning "all records" and yields
/// `None`.
///
/// Comparison is against the full stored timestamp at one-second precision,
/// not whole days: a start in the middle of a day excludes records from
/// earlier that same day.
pub fn stored_start(start_millis: i64) -> Option<String> {
    if start_millis <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(start_millis)
        .map(|start| start.format(STORED_FORMAT).to_string())
}

/// Parse a stored date, accepting the legacy date-only form.
pub fn parse_stored(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, STORED_FORMAT)
        .ok()
        .or_else(|| value.parse::<NaiveDateTime>().ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Formats stored dates for display, in the configured locale.
#[derive(Debug, Clone)]
pub struct DateFormatter {
    locale: Locale,
    pattern: &'static str,
}

impl DateFormatter {
    pub fn new(locale: &str, with_time: bool) -> Self {
        let (locale, english) = match resolve_locale(locale) {
            Some((locale, language)) => (locale, language == "en"),
            None => (Locale::POSIX, true),
        };
        let pattern = match (english, with_time) {
            (true, false) => "%b %-d, %Y",
            (true, true) => "%b %-d, %Y, %H:%M",
            (false, false) => "%-d %b %Y",
            (false, true) => "%-d %b %Y %H:%M",
        };
        Self { locale, pattern }
    }

    pub fn format(&self, date: NaiveDateTime) -> String {
        date.and_utc()
            .format_localized(self.pattern, self.locale)
            .to_string()
    }

    /// Format a stored value; unparsable values are returned as stored.
    pub fn format_stored(&self, value: &str) -> String {
        match parse_stored(value) {
            Some(date) => self.format(date),
            None => {
                tracing::warn!(value, "Unrecognised stored date, displaying raw value");
                value.to_string()
            }
        }
    }
}

/// Map a configured language tag (`en`, `fr`, `pt-BR`, `de_DE`) onto a
/// known locale and its language code.
fn resolve_locale(tag: &str) -> Option<(Locale, String)> {
    let tag = tag.trim().replace('-', "_");
    let language = tag.split('_').next().unwrap_or("").to_ascii_lowercase();
    let candidates = [
        tag.clone(),
        format!("{language}_{}", language.to_ascii_uppercase()),
        format!("{language}_US"),
    ];
    candidates
        .iter()
        .find_map(|candidate| Locale::try_from(candidate.as_str()).ok())
        .map(|locale| (locale, language))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap()
    }

    #[test]
    fn test_stored_form_sorts_chronologically() {
        let earlier = sample().format(STORED_FORMAT).to_string();
        let later = (sample() + chrono::Duration::days(40))
            .format(STORED_FORMAT)
            .to_string();
        assert_eq!(earlier, "2024-03-07 14:05:09");
        assert!(earlier < later);
    }

    #[test]
    fn test_parse_stored_accepts_legacy_date_only() {
        assert_eq!(parse_stored("2024-03-07 14:05:09"), Some(sample()));
        let legacy = parse_stored("2024-03-07").unwrap();
        assert_eq!(legacy.date(), sample().date());
        assert_eq!(parse_stored("yesterday"), None);
    }

    #[test]
    fn test_stored_start_epoch_sentinel() {
        assert_eq!(stored_start(0), None);
        assert_eq!(stored_start(-5), None);
        // 2024-01-01T00:00:00Z
        assert_eq!(
            stored_start(1_704_067_200_000).as_deref(),
            Some("2024-01-01 00:00:00")
        );
    }

    #[test]
    fn test_stored_start_keeps_time_of_day() {
        // 2024-01-01T12:00:00Z
        let start = stored_start(1_704_110_400_000).unwrap();
        assert_eq!(start, "2024-01-01 12:00:00");
        // A record from the morning of the same day does not count.
        assert!("2024-01-01 09:00:00" < start.as_str());
        assert!("2024-01-01 12:00:01" > start.as_str());
    }

    #[test]
    fn test_english_date_only() {
        let formatter = DateFormatter::new("en", false);
        assert_eq!(formatter.format(sample()), "Mar 7, 2024");
    }

    #[test]
    fn test_english_with_time() {
        let formatter = DateFormatter::new("en", true);
        assert_eq!(formatter.format(sample()), "Mar 7, 2024, 14:05");
    }

    #[test]
    fn test_unknown_locale_falls_back() {
        let formatter = DateFormatter::new("xx-not-a-locale", false);
        assert_eq!(formatter.format(sample()), "Mar 7, 2024");
    }

    #[test]
    fn test_format_stored_keeps_unparsable_value() {
        let formatter = DateFormatter::new("en", false);
        assert_eq!(formatter.format_stored("2024-03-07"), "Mar 7, 2024");
        assert_eq!(formatter.format_stored("garbage"), "garbage");
    }
}
