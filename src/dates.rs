//! Timestamp rendering for table and detail output.
//!
//! The API reports RFC 3339 timestamps; humans get a short local form whose
//! precision drops as the date moves further from today:
//! - same day: "3:04 PM"
//! - same year: "Jan 2, 3:04 PM"
//! - otherwise: "Jan 2, 2006 3:04 PM"

use chrono::{DateTime, Datelike, Local, TimeZone};

/// Formats `value` relative to the current local time.
pub fn format_time(value: &str) -> String {
    format_time_at(value, &Local::now())
}

/// Formats `value` in the timezone of `now`.
///
/// Strings that are not RFC 3339 are returned unchanged, empty input included.
pub fn format_time_at<Tz>(value: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let Ok(parsed) = DateTime::parse_from_rfc3339(value) else {
        return value.to_string();
    };
    let local = parsed.with_timezone(&now.timezone());

    if local.date_naive() == now.date_naive() {
        local.format("%-I:%M %p").to_string()
    } else if local.year() == now.year() {
        local.format("%b %-d, %-I:%M %p").to_string()
    } else {
        local.format("%b %-d, %Y %-I:%M %p").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn test_now() -> DateTime<Utc> {
        // Wednesday, January 28, 2026, 15:04:05 UTC
        Utc.with_ymd_and_hms(2026, 1, 28, 15, 4, 5)
            .single()
            .expect("valid datetime")
    }

    #[test]
    fn today_shows_only_the_clock() {
        assert_eq!(format_time_at("2026-01-28T09:30:00Z", &test_now()), "9:30 AM");
        assert_eq!(format_time_at("2026-01-28T15:04:05.123456Z", &test_now()), "3:04 PM");
    }

    #[test]
    fn same_year_adds_the_date() {
        assert_eq!(format_time_at("2026-01-02T15:04:00Z", &test_now()), "Jan 2, 3:04 PM");
    }

    #[test]
    fn other_years_add_the_year() {
        assert_eq!(
            format_time_at("2006-01-02T15:04:05Z", &test_now()),
            "Jan 2, 2006 3:04 PM"
        );
    }

    #[test]
    fn converts_into_the_reference_timezone() {
        let tokyo = FixedOffset::east_opt(9 * 3600).expect("offset");
        let now = test_now().with_timezone(&tokyo);
        // 20:00 UTC on the 28th is already the 29th in Tokyo, a different day.
        assert_eq!(format_time_at("2026-01-28T20:00:00Z", &now), "Jan 29, 5:00 AM");
    }

    #[test]
    fn unparseable_input_is_returned_unchanged() {
        assert_eq!(format_time_at("yesterday-ish", &test_now()), "yesterday-ish");
        assert_eq!(format_time_at("", &test_now()), "");
        assert_eq!(format_time_at("2026-01-28", &test_now()), "2026-01-28");
    }
}
