//! Operator search queries.
//!
//! Search input comes straight from the station keyboard. Only a narrow
//! alphabet is accepted, which keeps `LIKE` wildcards (`%`, `_`) and quoting
//! characters out of store queries entirely.

/// A search query that passed the station's character whitelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery(String);

impl SearchQuery {
    /// Accept `input` if it is non-empty and made only of `[0-9a-zA-Z@.-]`.
    ///
    /// Anything else yields `None`, which stores treat as "no results".
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '-');
        (!input.is_empty() && input.chars().all(allowed)).then(|| Self(input.to_string()))
    }

    /// The raw query text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `LIKE` pattern for a substring match.
    #[must_use]
    pub fn like_pattern(&self) -> String {
        format!("%{}%", self.0)
    }

    /// Case-insensitive substring test, for stores that match in memory.
    #[must_use]
    pub fn matches(&self, field: &str) -> bool {
        field
            .to_ascii_lowercase()
            .contains(&self.0.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;

    #[test]
    fn accepts_names_and_emails() {
        assert!(SearchQuery::parse("lovelace").is_some());
        assert!(SearchQuery::parse("ada.l-ove@example.com").is_some());
        assert!(SearchQuery::parse("12345").is_some());
    }

    #[test]
    fn rejects_pattern_and_quote_characters() {
        for input in ["", "a;b", "50%", "o'brien", "a_b", "a b", "x\"", "ümlaut", "a*"] {
            assert!(SearchQuery::parse(input).is_none(), "input {input:?}");
        }
    }

    #[test]
    fn matching_ignores_ascii_case() {
        let q = SearchQuery::parse("LoVe").unwrap();
        assert!(q.matches("Lovelace"));
        assert!(!q.matches("Babbage"));
        assert_eq!(q.like_pattern(), "%LoVe%");
    }
}
