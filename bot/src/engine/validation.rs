/// Maximum command prefix length.
pub const MAX_PREFIX_LENGTH: usize = 8;

/// Maximum social account name length.
pub const MAX_SOCIAL_NAME_LENGTH: usize = 100;

/// Validate a command prefix. Must be 1-8 chars with no whitespace.
pub fn validate_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() {
        return Err("Please provide a valid Prefix.".into());
    }
    if prefix.chars().count() > MAX_PREFIX_LENGTH {
        return Err(format!(
            "Prefix too long (max {} characters).",
            MAX_PREFIX_LENGTH
        ));
    }
    if prefix.chars().any(char::is_whitespace) {
        return Err("Prefix cannot contain spaces.".into());
    }
    Ok(())
}

/// Parse a priority argument. Accepts any signed integer.
pub fn parse_priority(raw: &str) -> Result<i64, String> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| "Please provide a valid priority.".to_string())
}

/// Validate a social account name. Must be non-empty and under the length limit.
pub fn validate_social_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Please provide a valid Name".into());
    }
    if name.chars().count() > MAX_SOCIAL_NAME_LENGTH {
        return Err(format!(
            "Name too long (max {} characters).",
            MAX_SOCIAL_NAME_LENGTH
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_prefixes() {
        assert!(validate_prefix("~").is_ok());
        assert!(validate_prefix("!vi").is_ok());
    }

    #[test]
    fn test_invalid_prefixes() {
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("a b").is_err());
        assert!(validate_prefix(&"!".repeat(9)).is_err());
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!(parse_priority("10"), Ok(10));
        assert_eq!(parse_priority("-3"), Ok(-3));
        assert_eq!(parse_priority(" 4 "), Ok(4));
        assert!(parse_priority("ten").is_err());
        assert!(parse_priority("1.5").is_err());
        assert!(parse_priority("").is_err());
    }

    #[test]
    fn test_social_names() {
        assert!(validate_social_name("Some Streamer").is_ok());
        assert!(validate_social_name("   ").is_err());
        assert!(validate_social_name(&"x".repeat(101)).is_err());
    }
}
