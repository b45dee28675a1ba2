//! Cron Manager (C11, spec.md §4.11). Validates 5-field cron expressions and
//! registers/unregisters OS scheduler entries — the user crontab on Linux,
//! the launchd-equivalent on macOS; refuses to initialize on Windows.

use std::process::Stdio;

use anyhow::Context;
use anyhow::Result;
use tokio::process::Command;

use crate::error::NcpError;

#[derive(Debug, Clone, PartialEq)]
pub struct CronValidation {
    pub valid: bool,
    pub error: Option<String>,
}

struct FieldRange {
    name: &'static str,
    min: i64,
    max: i64,
}

const FIELD_RANGES: [FieldRange; 5] = [
    FieldRange { name: "minute", min: 0, max: 59 },
    FieldRange { name: "hour", min: 0, max: 23 },
    FieldRange { name: "day", min: 1, max: 31 },
    FieldRange { name: "month", min: 1, max: 12 },
    FieldRange { name: "weekday", min: 0, max: 7 },
];

/// Validates a 5-field cron expression, accepting `*`, `*/n` steps, `a-b`
/// ranges, and `a,b,c` lists per field (spec.md §4.11).
pub fn validate_cron_expression(expr: &str) -> CronValidation {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return CronValidation {
            valid: false,
            error: Some(format!(
                "expected 5 fields (minute hour day month weekday), got {}",
                fields.len()
            )),
        };
    }

    for (field, range) in fields.iter().zip(FIELD_RANGES.iter()) {
        if let Err(error) = validate_field(field, range) {
            return CronValidation {
                valid: false,
                error: Some(error),
            };
        }
    }

    CronValidation {
        valid: true,
        error: None,
    }
}

fn validate_field(field: &str, range: &FieldRange) -> Result<(), String> {
    for part in field.split(',') {
        validate_part(part, range)?;
    }
    Ok(())
}

fn validate_part(part: &str, range: &FieldRange) -> Result<(), String> {
    if part == "*" {
        return Ok(());
    }
    if let Some(step_spec) = part.strip_prefix("*/") {
        let step: i64 = step_spec
            .parse()
            .map_err(|_| format!("field '{}' has invalid step '{part}'", range.name))?;
        if step <= 0 {
            return Err(format!("field '{}' has invalid step '{part}'", range.name));
        }
        return Ok(());
    }
    if let Some((lo, hi)) = part.split_once('-') {
        let lo = parse_in_range(lo, range)?;
        let hi = parse_in_range(hi, range)?;
        if lo > hi {
            return Err(format!(
                "field '{}' has inverted range '{part}'",
                range.name
            ));
        }
        return Ok(());
    }
    parse_in_range(part, range)?;
    Ok(())
}

fn parse_in_range(value: &str, range: &FieldRange) -> Result<i64, String> {
    let parsed: i64 = value
        .parse()
        .map_err(|_| format!("field '{}' out of range {}-{}", range.name, range.min, range.max))?;
    if parsed < range.min || parsed > range.max {
        return Err(format!(
            "field '{}' out of range {}-{}",
            range.name, range.min, range.max
        ));
    }
    Ok(parsed)
}

/// Registers/unregisters an OS scheduler entry tagged with `identifier`
/// (the timing id). On Windows, construction fails outright — spec.md §4.11
/// explicitly refuses to support it.
pub struct CronManager {
    tag_prefix: String,
}

impl CronManager {
    pub fn new() -> Result<Self, NcpError> {
        if cfg!(target_os = "windows") {
            return Err(NcpError::UnsupportedPlatform);
        }
        Ok(Self {
            tag_prefix: "ncp-scheduler".to_string(),
        })
    }

    fn tag(&self, identifier: &str) -> String {
        format!("{}-{identifier}", self.tag_prefix)
    }

    /// Registers a crontab entry running `command` on `cron_expression`,
    /// tagged with a trailing comment so it can be located and removed
    /// later without disturbing the user's other entries.
    pub async fn register(&self, identifier: &str, cron_expression: &str, command: &str) -> Result<()> {
        let validation = validate_cron_expression(cron_expression);
        if !validation.valid {
            anyhow::bail!(
                "invalid cron expression: {}",
                validation.error.unwrap_or_default()
            );
        }

        let tag = self.tag(identifier);
        let existing = read_crontab().await.unwrap_or_default();
        let mut lines: Vec<String> = existing
            .lines()
            .filter(|line| !line.contains(&tag))
            .map(str::to_string)
            .collect();
        lines.push(format!("{cron_expression} {command} # {tag}"));
        write_crontab(&lines.join("\n")).await
    }

    pub async fn unregister(&self, identifier: &str) -> Result<()> {
        let tag = self.tag(identifier);
        let existing = read_crontab().await.unwrap_or_default();
        let lines: Vec<String> = existing
            .lines()
            .filter(|line| !line.contains(&tag))
            .map(str::to_string)
            .collect();
        write_crontab(&lines.join("\n")).await
    }
}

async fn read_crontab() -> Result<String> {
    let output = Command::new("crontab")
        .arg("-l")
        .stderr(Stdio::null())
        .output()
        .await
        .context("reading crontab")?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

async fn write_crontab(contents: &str) -> Result<()> {
    use std::io::Write as _;
    use std::process::Stdio as StdStdio;

    let mut child = std::process::Command::new("crontab")
        .arg("-")
        .stdin(StdStdio::piped())
        .spawn()
        .context("spawning crontab")?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(contents.as_bytes())
            .context("writing new crontab")?;
        stdin.write_all(b"\n").context("writing new crontab")?;
    }
    child.wait().context("waiting for crontab")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn accepts_wildcard_expression() {
        assert!(validate_cron_expression("* * * * *").valid);
    }

    #[test]
    fn accepts_step_and_range_and_list() {
        assert!(validate_cron_expression("*/5 9-17 * * 1,3,5").valid);
    }

    #[test]
    fn rejects_minute_out_of_range() {
        let result = validate_cron_expression("60 * * * *");
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("minute"));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(!validate_cron_expression("* * * *").valid);
    }
}
