use std::time::Duration;

use crate::error::ModelError;

pub const DEFAULT_RUNNER_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Parses a short duration string like `"30m"`, `"2h"`, `"90s"` into a
/// [`Duration`]. Only a single unit suffix is supported (`s`, `m`, `h`),
/// matching the grammar `spec.runner.timeout` accepts.
pub fn parse_duration(input: &str) -> Result<Duration, ModelError> {
    let input = input.trim();
    let (number, unit) = input.split_at(
        input
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| ModelError::InvalidEncoding(format!("missing unit in duration {input:?}")))?,
    );
    let value: u64 = number
        .parse()
        .map_err(|_| ModelError::InvalidEncoding(format!("invalid duration {input:?}")))?;
    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        other => {
            return Err(ModelError::InvalidEncoding(format!(
                "unsupported duration unit {other:?} in {input:?}"
            )));
        }
    };
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_duration("thirty minutes").is_err());
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("30x").is_err());
    }
}
