// 🔢 Identifier Validator - MST normalization
//
// A TaxIdentifier can only be built through `parse`, so every value of this
// type has already passed validation.

use crate::error::IntegrationError;
use serde::{Serialize, Serializer};
use std::fmt;

/// Accepted lengths: 10 digits (enterprise) or 13 digits (branch units)
pub const ACCEPTED_LENGTHS: [usize; 2] = [10, 13];

/// Characters stripped before validation
const SEPARATORS: [char; 4] = ['-', '.', '/', '_'];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaxIdentifier(String);

impl TaxIdentifier {
    /// Normalize and validate a raw MST string.
    ///
    /// ```
    /// use mst_integration::TaxIdentifier;
    ///
    /// let id = TaxIdentifier::parse(" 0101-234-567 ").unwrap();
    /// assert_eq!(id.as_str(), "0101234567");
    /// assert!(TaxIdentifier::parse("12").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, IntegrationError> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && !SEPARATORS.contains(c))
            .collect();

        if normalized.is_empty() {
            return Err(IntegrationError::invalid_format(raw, "empty identifier"));
        }

        if let Some(bad) = normalized.chars().find(|c| !c.is_ascii_digit()) {
            return Err(IntegrationError::invalid_format(
                raw,
                format!("unexpected character {:?}", bad),
            ));
        }

        if !ACCEPTED_LENGTHS.contains(&normalized.len()) {
            return Err(IntegrationError::invalid_format(
                raw,
                format!("expected 10 or 13 digits, got {}", normalized.len()),
            ));
        }

        Ok(TaxIdentifier(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 13-digit identifiers belong to dependent units of a parent enterprise
    pub fn is_branch(&self) -> bool {
        self.0.len() == 13
    }

    /// The 10-digit enterprise part (the whole identifier for parents)
    pub fn parent(&self) -> &str {
        &self.0[..10]
    }
}

impl fmt::Display for TaxIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TaxIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ten_and_thirteen_digits() {
        assert_eq!(TaxIdentifier::parse("0101234567").unwrap().as_str(), "0101234567");

        let branch = TaxIdentifier::parse("0101234567-001").unwrap();
        assert_eq!(branch.as_str(), "0101234567001");
        assert!(branch.is_branch());
        assert_eq!(branch.parent(), "0101234567");
    }

    #[test]
    fn test_strips_whitespace_and_separators() {
        let id = TaxIdentifier::parse(" 01.01/23 45_67\t").unwrap();
        assert_eq!(id.as_str(), "0101234567");
        assert!(!id.is_branch());
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        for raw in ["12", "012345678", "01234567890", "012345678901", "01234567890123"] {
            let err = TaxIdentifier::parse(raw).unwrap_err();
            assert!(err.is_user_error(), "{} should be InvalidFormat", raw);
        }
    }

    #[test]
    fn test_rejects_non_digits() {
        assert!(TaxIdentifier::parse("01012345A7").is_err());
        assert!(TaxIdentifier::parse("０１０１２３４５６７").is_err()); // full-width digits
        assert!(TaxIdentifier::parse("").is_err());
        assert!(TaxIdentifier::parse(" - . ").is_err());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = TaxIdentifier::parse("0312345678").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"0312345678\"");
    }
}
