//! ISO 3166-1 alpha-2 country codes and the shipping allow-list.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors that can occur when parsing a [`CountryCode`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CountryError {
    /// Not two ASCII letters.
    #[error("invalid country code: {0:?}")]
    Invalid(String),
}

/// An uppercase two-letter country code (e.g. `BE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    /// Parse a country code, accepting any letter case.
    ///
    /// # Errors
    ///
    /// Returns `CountryError::Invalid` unless the trimmed input is exactly two
    /// ASCII letters.
    pub fn parse(s: &str) -> Result<Self, CountryError> {
        match s.trim().as_bytes() {
            [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
                Ok(Self([a.to_ascii_uppercase(), b.to_ascii_uppercase()]))
            }
            _ => Err(CountryError::Invalid(s.to_string())),
        }
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Both bytes are ASCII letters by construction
        core::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.as_str().to_string()
    }
}

impl<'de> Deserialize<'de> for CountryCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for CountryCode {
    type Err = CountryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Countries the store ships to.
///
/// Enforced before shipping rates are requested, before a payment intent is
/// created with shipping data, and passed to hosted checkout sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCountries(Vec<CountryCode>);

impl AllowedCountries {
    /// Default destinations: Benelux, France and Germany.
    pub const DEFAULT: &'static str = "BE,NL,LU,FR,DE";

    /// Parse a comma-separated list such as `"BE,NL,LU"`.
    ///
    /// Blank entries are skipped and duplicates collapsed.
    ///
    /// # Errors
    ///
    /// Returns `CountryError::Invalid` for the first malformed entry, or when
    /// the list is empty.
    pub fn parse_list(list: &str) -> Result<Self, CountryError> {
        let mut codes: Vec<CountryCode> = Vec::new();
        for entry in list.split(',').filter(|e| !e.trim().is_empty()) {
            let code = CountryCode::parse(entry)?;
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        if codes.is_empty() {
            return Err(CountryError::Invalid(list.to_string()));
        }
        Ok(Self(codes))
    }

    /// Whether the store ships to `code`.
    #[must_use]
    pub fn contains(&self, code: CountryCode) -> bool {
        self.0.contains(&code)
    }

    /// The allowed codes, in configuration order.
    #[must_use]
    pub fn codes(&self) -> &[CountryCode] {
        &self.0
    }
}

impl Default for AllowedCountries {
    fn default() -> Self {
        Self(
            ["BE", "NL", "LU", "FR", "DE"]
                .into_iter()
                .filter_map(|c| CountryCode::parse(c).ok())
                .collect(),
        )
    }
}
