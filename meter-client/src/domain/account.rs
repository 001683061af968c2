use std::fmt;

use serde::Serialize;

const DIGIT_PREFIX: &str = "U_";

/// Decimal digits: ASCII and the Thai digits the portal's users may type.
fn is_decimal_digit(c: char) -> bool {
    c.is_ascii_digit() || ('\u{0E50}'..='\u{0E59}').contains(&c)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("account identifier {0:?} has no usable characters")]
pub struct InvalidAccountKey(pub String);

/// Sanitized identifier that partitions all persisted readings.
///
/// Only letters, decimal digits and `_` survive; other numerals such as `½`
/// are dropped. A key that would start with a digit gets a `U_` prefix so it
/// is always a valid storage name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AccountKey(String);

impl AccountKey {
    pub fn new(raw: &str) -> Result<Self, InvalidAccountKey> {
        let sanitized: String = raw
            .chars()
            .filter(|&c| c.is_alphabetic() || is_decimal_digit(c) || c == '_')
            .collect();

        match sanitized.chars().next() {
            None => Err(InvalidAccountKey(raw.to_string())),
            Some(first) if is_decimal_digit(first) => Ok(Self(format!("{DIGIT_PREFIX}{sanitized}"))),
            Some(_) => Ok(Self(sanitized)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Portal-side identifiers of one logged-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountIdentity {
    pub account_id: String,
    pub account_code: String,
    pub meter_point_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_whitespace() {
        let key = AccountKey::new("jane.doe@example com").unwrap();
        assert_eq!(key.as_str(), "janedoeexamplecom");
    }

    #[test]
    fn keeps_underscores() {
        let key = AccountKey::new("plant_7-b").unwrap();
        assert_eq!(key.as_str(), "plant_7b");
    }

    #[test]
    fn prefixes_leading_digit() {
        let key = AccountKey::new("020012345678").unwrap();
        assert_eq!(key.as_str(), "U_020012345678");
    }

    #[test]
    fn only_decimal_digits_get_the_prefix() {
        assert_eq!(AccountKey::new("½plant").unwrap().as_str(), "plant");
        assert_eq!(AccountKey::new("Ⅻ7").unwrap().as_str(), "Ⅻ7");
        assert_eq!(AccountKey::new("๑๒a").unwrap().as_str(), "U_๑๒a");
        assert!(AccountKey::new("½¾").is_err());
    }

    #[test]
    fn rejects_identifier_without_usable_characters() {
        assert!(AccountKey::new("").is_err());
        assert!(AccountKey::new("--//").is_err());
    }
}
