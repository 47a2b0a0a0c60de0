//! Parsing of locale-formatted (pt-BR) numeric values.

/// Convert a pt-BR formatted amount into a float.
///
/// Thousands are separated by `.`, decimals by `,`, and negative values may
/// come with a space-padded hyphen (`" - 978,67"`). Empty input yields `0.0`.
/// Input that still fails to parse after normalization also yields `0.0`
/// and logs a warning; a single bad value must not stop a partition.
///
/// # Examples
/// ```
/// use transparencia_harvester::value::parse_amount;
///
/// assert_eq!(parse_amount("2.250,00"), 2250.0);
/// assert_eq!(parse_amount(" - 978,67"), -978.67);
/// assert_eq!(parse_amount(""), 0.0);
/// assert_eq!(parse_amount("abc"), 0.0);
/// ```
pub fn parse_amount(raw: &str) -> f64 {
    if raw.is_empty() {
        return 0.0;
    }

    let normalized = raw
        .trim()
        .replace(" - ", "-")
        .replace("- ", "-")
        .replace('.', "")
        .replace(',', ".");

    match normalized.parse::<f64>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(raw, normalized = %normalized, "invalid amount, using 0.0");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousands_and_decimals() {
        assert_eq!(parse_amount("2.250,00"), 2250.0);
        assert_eq!(parse_amount("1.234.567,89"), 1_234_567.89);
        assert_eq!(parse_amount("89,00"), 89.0);
        assert_eq!(parse_amount("600"), 600.0);
    }

    #[test]
    fn test_negative_variants() {
        assert_eq!(parse_amount(" - 978,67"), -978.67);
        assert_eq!(parse_amount("- 978,67"), -978.67);
        assert_eq!(parse_amount("-978,67"), -978.67);
        assert_eq!(parse_amount("-1.000,50"), -1000.5);
    }

    #[test]
    fn test_surrounding_whitespace() {
        assert_eq!(parse_amount("  150,25 \n"), 150.25);
    }

    #[test]
    fn test_empty_and_garbage_degrade_to_zero() {
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("   "), 0.0);
        assert_eq!(parse_amount("abc"), 0.0);
        assert_eq!(parse_amount("R$ 10,00"), 0.0);
        assert_eq!(parse_amount("1,2,3"), 0.0);
    }
}
