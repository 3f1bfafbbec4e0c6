use std::time::Duration;

use crate::error::AppError;

/// Parses a time with an optional unit (s, m, h) into seconds
pub fn parse_time(time_str: &str) -> Result<f64, AppError> {
    let time_str = time_str.trim();
    if time_str.is_empty() {
        return Err(AppError::ParseError("Invalid format: empty string".to_string()));
    }

    // Plain number of seconds
    if let Ok(seconds) = time_str.parse::<f64>() {
        return Ok(seconds);
    }

    let split_index = time_str
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(time_str.len());

    let numeric_part = &time_str[..split_index];
    let unit_part = time_str[split_index..].trim().to_lowercase();

    let value = numeric_part
        .parse::<f64>()
        .map_err(|_| AppError::ParseError(format!("Invalid number: '{time_str}'")))?;

    match unit_part.as_str() {
        "s" => Ok(value),
        "m" => Ok(value * 60.0),
        "h" => Ok(value * 3600.0),
        _ => Err(AppError::ParseError(format!("Invalid unit: '{unit_part}'"))),
    }
}

/// Parses an optional timeout; zero means no timeout
pub fn parse_timeout(time_str: &str) -> Result<Option<Duration>, AppError> {
    let seconds = parse_time(time_str)?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(AppError::ParseError(format!("Invalid timeout: '{time_str}'")));
    }
    Ok((seconds > 0.0).then(|| Duration::from_secs_f64(seconds)))
}

/// Formats a media duration in seconds as `H:MM:SS`
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    format!("{hours}:{minutes:02}:{secs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("90").unwrap(), 90.0);
        assert_eq!(parse_time("1.5m").unwrap(), 90.0);
        assert_eq!(parse_time("2h").unwrap(), 7200.0);
        assert!(parse_time("").is_err());
        assert!(parse_time("10d").is_err());
        assert!(parse_time("m").is_err());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("0").unwrap(), None);
        assert_eq!(parse_timeout("60s").unwrap(), Some(Duration::from_secs(60)));
        assert!(parse_timeout("-5").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00:00");
        assert_eq!(format_duration(65.4), "0:01:05");
        assert_eq!(format_duration(3725.0), "1:02:05");
    }
}
