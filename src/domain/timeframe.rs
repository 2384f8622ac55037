//! Parsing of `<integer><unit>` timeframe expressions.
//!
//! Units: `m` (minutes), `h` (hours), `d` (days). An empty expression means
//! the default window of one hour.

use chrono::Duration;

/// Window used when no timeframe is given.
pub fn default_timeframe() -> Duration {
    Duration::hours(1)
}

/// Longest window a timeframe may cover.
pub fn max_timeframe() -> Duration {
    Duration::days(365)
}

/// Errors produced by [`parse_timeframe`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeframeError {
    #[error("Timeframe '{0}' must start with a number")]
    MissingAmount(String),

    #[error("Timeframe '{0}' has an unknown unit (expected m, h or d)")]
    UnknownUnit(String),

    #[error("Timeframe '{0}' must be greater than zero")]
    NotPositive(String),

    #[error("Timeframe '{0}' is too large")]
    OutOfRange(String),
}

/// Parses a timeframe strictly.
///
/// # Errors
///
/// Returns [`TimeframeError`] when the expression has no leading digits,
/// an unrecognised unit, a zero amount, or exceeds [`max_timeframe`].
///
/// # Examples
///
/// ```
/// use admetric::domain::timeframe::parse_timeframe;
/// use chrono::Duration;
///
/// assert_eq!(parse_timeframe("37m").unwrap(), Duration::minutes(37));
/// assert_eq!(parse_timeframe("").unwrap(), Duration::hours(1));
/// assert!(parse_timeframe("5x").is_err());
/// ```
pub fn parse_timeframe(expr: &str) -> Result<Duration, TimeframeError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(default_timeframe());
    }

    let split = expr
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(expr.len());
    let (digits, unit) = expr.split_at(split);

    if digits.is_empty() {
        return Err(TimeframeError::MissingAmount(expr.to_string()));
    }

    let amount: i64 = digits
        .parse()
        .map_err(|_| TimeframeError::OutOfRange(expr.to_string()))?;

    if amount == 0 {
        return Err(TimeframeError::NotPositive(expr.to_string()));
    }

    let duration = match unit {
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        _ => return Err(TimeframeError::UnknownUnit(expr.to_string())),
    };

    duration
        .filter(|window| *window <= max_timeframe())
        .ok_or_else(|| TimeframeError::OutOfRange(expr.to_string()))
}

/// Parses a timeframe, falling back to [`default_timeframe`] on any error.
///
/// Used by the aggregate analytics path, which never rejects a request
/// because of its window.
pub fn parse_timeframe_or_default(expr: &str) -> Duration {
    parse_timeframe(expr).unwrap_or_else(|_| default_timeframe())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_timeframe("37m").unwrap(), Duration::minutes(37));
        assert_eq!(parse_timeframe("7h").unwrap(), Duration::hours(7));
        assert_eq!(parse_timeframe("3d").unwrap(), Duration::days(3));
    }

    #[test]
    fn test_empty_defaults_to_one_hour() {
        assert_eq!(parse_timeframe("").unwrap(), Duration::hours(1));
        assert_eq!(parse_timeframe("   ").unwrap(), Duration::hours(1));
    }

    #[test]
    fn test_no_digits_is_error() {
        assert_eq!(
            parse_timeframe("abc"),
            Err(TimeframeError::MissingAmount("abc".to_string()))
        );
        assert!(matches!(
            parse_timeframe("h"),
            Err(TimeframeError::MissingAmount(_))
        ));
    }

    #[test]
    fn test_unknown_unit_is_error() {
        assert_eq!(
            parse_timeframe("5x"),
            Err(TimeframeError::UnknownUnit("5x".to_string()))
        );
        assert!(matches!(
            parse_timeframe("5"),
            Err(TimeframeError::UnknownUnit(_))
        ));
        assert!(matches!(
            parse_timeframe("5hh"),
            Err(TimeframeError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_zero_and_overflow() {
        assert!(matches!(
            parse_timeframe("0h"),
            Err(TimeframeError::NotPositive(_))
        ));
        assert!(matches!(
            parse_timeframe("99999999999999999999d"),
            Err(TimeframeError::OutOfRange(_))
        ));
        assert!(matches!(
            parse_timeframe("9223372036854775807d"),
            Err(TimeframeError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_window_is_capped_at_one_year() {
        assert_eq!(parse_timeframe("365d").unwrap(), Duration::days(365));
        assert_eq!(parse_timeframe("8760h").unwrap(), Duration::days(365));
        assert!(matches!(
            parse_timeframe("366d"),
            Err(TimeframeError::OutOfRange(_))
        ));
        assert!(matches!(
            parse_timeframe("100000000d"),
            Err(TimeframeError::OutOfRange(_))
        ));
        assert!(matches!(
            parse_timeframe("525601m"),
            Err(TimeframeError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_lenient_parser_defaults_quietly() {
        assert_eq!(parse_timeframe_or_default("100000000d"), Duration::hours(1));
        assert_eq!(parse_timeframe_or_default("abc"), Duration::hours(1));
        assert_eq!(parse_timeframe_or_default("5x"), Duration::hours(1));
        assert_eq!(parse_timeframe_or_default("2d"), Duration::days(2));
    }
}
