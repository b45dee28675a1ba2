//! Natural-Language Schedule Parser (C12, spec.md §4.12). Pure function: no
//! I/O, case-insensitive, tried against patterns in priority order.

use chrono::Datelike;
use chrono::Duration as ChronoDuration;
use chrono::Local;
use chrono::Timelike;
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSchedule {
    pub success: bool,
    pub cron_expression: Option<String>,
    pub fire_once: Option<bool>,
    pub explanation: Option<String>,
    pub error: Option<String>,
}

impl ParsedSchedule {
    fn ok(cron: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            success: true,
            cron_expression: Some(cron.into()),
            fire_once: Some(false),
            explanation: Some(explanation.into()),
            error: None,
        }
    }

    fn ok_fire_once(cron: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            success: true,
            cron_expression: Some(cron.into()),
            fire_once: Some(true),
            explanation: Some(explanation.into()),
            error: None,
        }
    }

    fn failure() -> Self {
        Self {
            success: false,
            cron_expression: None,
            fire_once: None,
            explanation: None,
            error: Some(
                "could not parse schedule; supported patterns include \"every day at 9am\", \
                 \"every weekday at 2:30pm\", \"every 5 minutes\", and \"in 5 minutes\""
                    .to_string(),
            ),
        }
    }
}

static EVERY_N_MINUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^every (\d+) minutes?$").unwrap());
static DAILY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(every day|daily)(?: at (.+))?$").unwrap());
static WEEKDAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(every weekday|monday to friday)(?: at (.+))?$").unwrap());
static WEEKEND: Lazy<Regex> = Lazy::new(|| Regex::new(r"^every weekend(?: at (.+))?$").unwrap());
static SPECIFIC_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^every (mon|tue|wed|thu|fri|sat|sun)[a-z]*(?: at (.+))?$").unwrap()
});
static MONTHLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(monthly|first day of (?:the )?month)(?: at (.+))?$").unwrap()
});
static RELATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^in (\d+) (minute|hour|day)s?$").unwrap());
static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$").unwrap());

/// Maps a phrase to a 5-field cron expression (spec.md §4.12's table).
pub fn parse_natural_language_schedule(phrase: &str) -> ParsedSchedule {
    let phrase = phrase.trim().to_lowercase();

    if phrase == "every minute" {
        return ParsedSchedule::ok("* * * * *", "runs every minute");
    }
    if let Some(caps) = EVERY_N_MINUTES.captures(&phrase) {
        let n = &caps[1];
        return ParsedSchedule::ok(format!("*/{n} * * * *"), format!("runs every {n} minutes"));
    }
    if phrase == "every hour" || phrase == "hourly" {
        return ParsedSchedule::ok("0 * * * *", "runs every hour on the hour");
    }
    if let Some(caps) = DAILY.captures(&phrase) {
        let Some((minute, hour)) = resolve_time(caps.get(2).map(|m| m.as_str())) else {
            return ParsedSchedule::failure();
        };
        return ParsedSchedule::ok(
            format!("{minute} {hour} * * *"),
            format!("runs daily at {hour:02}:{minute:02}"),
        );
    }
    if let Some(caps) = WEEKDAY.captures(&phrase) {
        let Some((minute, hour)) = resolve_time(caps.get(2).map(|m| m.as_str())) else {
            return ParsedSchedule::failure();
        };
        return ParsedSchedule::ok(
            format!("{minute} {hour} * * 1-5"),
            format!("runs weekdays at {hour:02}:{minute:02}"),
        );
    }
    if let Some(caps) = WEEKEND.captures(&phrase) {
        let Some((minute, hour)) = resolve_time(caps.get(1).map(|m| m.as_str())) else {
            return ParsedSchedule::failure();
        };
        return ParsedSchedule::ok(
            format!("{minute} {hour} * * 0,6"),
            format!("runs weekends at {hour:02}:{minute:02}"),
        );
    }
    if let Some(caps) = SPECIFIC_DAY.captures(&phrase) {
        let Some(weekday) = weekday_number(&caps[1]) else {
            return ParsedSchedule::failure();
        };
        let Some((minute, hour)) = resolve_time(caps.get(2).map(|m| m.as_str())) else {
            return ParsedSchedule::failure();
        };
        return ParsedSchedule::ok(
            format!("{minute} {hour} * * {weekday}"),
            format!("runs every week on day {weekday} at {hour:02}:{minute:02}"),
        );
    }
    if let Some(caps) = MONTHLY.captures(&phrase) {
        let Some((minute, hour)) = resolve_time(caps.get(2).map(|m| m.as_str())) else {
            return ParsedSchedule::failure();
        };
        return ParsedSchedule::ok(
            format!("{minute} {hour} 1 * *"),
            format!("runs on the 1st of each month at {hour:02}:{minute:02}"),
        );
    }
    if let Some(caps) = RELATIVE.captures(&phrase) {
        let amount: i64 = caps[1].parse().unwrap_or(0);
        let unit = &caps[2];
        let duration = match unit {
            "minute" => ChronoDuration::minutes(amount),
            "hour" => ChronoDuration::hours(amount),
            "day" => ChronoDuration::days(amount),
            _ => return ParsedSchedule::failure(),
        };
        let fire_at = Local::now() + duration;
        let cron = format!(
            "{} {} {} {} *",
            fire_at.minute(),
            fire_at.hour(),
            fire_at.day(),
            fire_at.month()
        );
        return ParsedSchedule::ok_fire_once(cron, format!("fires once in {amount} {unit}(s)"));
    }

    ParsedSchedule::failure()
}

/// `TIME` grammar (spec.md §4.12): `Hh`, `H[:MM](am|pm)?`, `noon`,
/// `midnight`. Returns `(minute, hour)`, defaulting to 09:00 when absent.
fn resolve_time(raw: Option<&str>) -> Option<(u32, u32)> {
    let Some(raw) = raw else {
        return Some((0, 9));
    };
    let raw = raw.trim();
    if raw == "noon" {
        return Some((0, 12));
    }
    if raw == "midnight" {
        return Some((0, 0));
    }
    let raw = raw.trim_end_matches('h');
    let caps = TIME.captures(raw)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps
        .get(2)
        .map(|m| m.as_str().parse().unwrap_or(0))
        .unwrap_or(0);
    match caps.get(3).map(|m| m.as_str()) {
        Some("am") => {
            if hour == 12 {
                hour = 0;
            }
        }
        Some("pm") => {
            if hour != 12 {
                hour += 12;
            }
        }
        _ => {}
    }
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((minute, hour))
}

fn weekday_number(abbrev: &str) -> Option<u32> {
    match abbrev {
        "sun" => Some(0),
        "mon" => Some(1),
        "tue" => Some(2),
        "wed" => Some(3),
        "thu" => Some(4),
        "fri" => Some(5),
        "sat" => Some(6),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn parses_weekday_with_pm_time() {
        let result = parse_natural_language_schedule("every weekday at 2:30pm");
        assert!(result.success);
        assert_eq!(result.cron_expression.as_deref(), Some("30 14 * * 1-5"));
    }

    #[test]
    fn parses_relative_minutes_as_fire_once() {
        let result = parse_natural_language_schedule("in 5 minutes");
        assert!(result.success);
        assert_eq!(result.fire_once, Some(true));
        let cron = result.cron_expression.unwrap();
        assert_eq!(cron.split_whitespace().count(), 5);
        assert!(cron.ends_with(" *"));
    }

    #[test]
    fn bogus_phrase_fails_with_helpful_error() {
        let result = parse_natural_language_schedule("bogus");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("every day at 9am"));
    }

    #[test]
    fn daily_defaults_to_nine_am() {
        let result = parse_natural_language_schedule("every day");
        assert_eq!(result.cron_expression.as_deref(), Some("0 9 * * *"));
    }

    #[test]
    fn noon_and_midnight_resolve_correctly() {
        assert_eq!(
            parse_natural_language_schedule("daily at noon").cron_expression.as_deref(),
            Some("0 12 * * *")
        );
        assert_eq!(
            parse_natural_language_schedule("daily at midnight")
                .cron_expression
                .as_deref(),
            Some("0 0 * * *")
        );
    }
}
