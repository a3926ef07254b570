//! Caller identity used as the ledger key.

/// Opaque identifier of a ledger owner, taken from the `X-User-Id` header.
///
/// Surrounding whitespace is trimmed and blank identifiers are rejected,
/// so every `UserId` names exactly one row in `user_credits`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Build a user id, returning `None` for a blank value.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let id = UserId::parse("  u1 ").unwrap();
        assert_eq!(id.as_str(), "u1");
        assert_eq!(id.to_string(), "u1");
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!(UserId::parse("").is_none());
        assert!(UserId::parse("   ").is_none());
    }

    #[test]
    fn test_equality_after_normalization() {
        assert_eq!(UserId::parse("abc"), UserId::parse(" abc"));
    }
}
