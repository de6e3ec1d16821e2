//! Credential redaction for logs
//!
//! API keys must never appear in full in log output. This helper keeps just
//! enough of a key to correlate log lines with the operator dashboard.

/// Redact a credential, keeping a 4-character prefix and suffix.
///
/// Short keys are fully masked since prefix and suffix would overlap.
///
/// # Example
/// ```
/// use gemini_key_gateway::utils::redact_key;
///
/// assert_eq!(redact_key("AIzaSyA1234567890abcdef"), "AIza...cdef");
/// assert_eq!(redact_key("tiny"), "***");
/// ```
pub fn redact_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_long_key() {
        assert_eq!(redact_key("AIzaSyA1234567890abcdef"), "AIza...cdef");
    }

    #[test]
    fn test_redact_short_key() {
        assert_eq!(redact_key(""), "***");
        assert_eq!(redact_key("12345678"), "***");
    }

    #[test]
    fn test_redact_boundary() {
        // 9 characters is the shortest key that keeps any material
        assert_eq!(redact_key("123456789"), "1234...6789");
    }

    #[test]
    fn test_redact_unicode() {
        // must not panic on multi-byte characters
        let redacted = redact_key("ключключключ");
        assert_eq!(redacted, "ключ...ключ");
    }
}
