//! Destination model
//!
//! A destination groups the dialable prefixes that share one tariff entry.

use serde::{Deserialize, Serialize};

/// Destination entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Destination ID referenced by rating plans
    pub id: String,

    /// Dialable prefixes belonging to this destination
    pub prefixes: Vec<String>,
}

impl Destination {
    pub fn new(id: impl Into<String>, prefixes: &[&str]) -> Self {
        Self {
            id: id.into(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Normalize a dialed number for prefix matching
    ///
    /// Strips whitespace and a leading `+`.
    pub fn normalize(destination: &str) -> String {
        let trimmed: String = destination.chars().filter(|c| !c.is_whitespace()).collect();
        trimmed.strip_prefix('+').unwrap_or(&trimmed).to_string()
    }

    /// Generate all candidate prefixes, longest first
    ///
    /// # Arguments
    /// * `destination` - Dialed destination
    /// * `min_len` - Shortest prefix to generate (at least 1)
    ///
    /// # Example
    /// `split_prefix("0256", 2)` returns `["0256", "025", "02"]`
    pub fn split_prefix(destination: &str, min_len: usize) -> Vec<String> {
        let normalized = Self::normalize(destination);
        let boundaries: Vec<usize> = normalized
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .collect();
        let min_len = min_len.max(1);

        boundaries
            .iter()
            .enumerate()
            .rev()
            .take_while(|(count, _)| count + 1 >= min_len)
            .map(|(_, end)| normalized[..*end].to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_prefix() {
        assert_eq!(
            Destination::split_prefix("0256", 1),
            vec!["0256", "025", "02", "0"]
        );
        assert_eq!(Destination::split_prefix("+4917", 3), vec!["4917", "491"]);
    }

    #[test]
    fn test_split_prefix_shorter_than_minimum() {
        assert!(Destination::split_prefix("49", 3).is_empty());
        assert!(Destination::split_prefix("", 1).is_empty());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(Destination::normalize(" +49 151 "), "49151");
        assert_eq!(Destination::normalize("0723"), "0723");
    }
}
