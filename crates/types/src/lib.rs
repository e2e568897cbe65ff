//! # NME Types
//!
//! Validated value types shared across the claims workspace.
//!
//! - [`NonEmptyText`]: trimmed text that is guaranteed to contain something.
//! - [`PatientKey`]: the deterministic patient identifier (`paciente_clave`).

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Returns
    ///
    /// Returns `Ok(NonEmptyText)` if the trimmed input is non-empty,
    /// or `Err(TextError::Empty)` if it's empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Patient key
// ============================================================================

/// Errors raised while deriving or parsing a [`PatientKey`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("country code must be two ASCII letters, got '{0}'")]
    InvalidCountry(String),
    #[error("document type must be 1-3 ASCII letters, got '{0}'")]
    InvalidDocumentType(String),
    #[error("document number must be alphanumeric and non-empty")]
    InvalidDocumentNumber,
    #[error("patient key is not in canonical form: '{0}'")]
    NotCanonical(String),
}

/// Deterministic patient identifier (`paciente_clave`).
///
/// Built as `<country><document type><document number>`, upper-cased with separators
/// removed, e.g. `CO` + `CC` + `39.287.966` gives `COCC39287966`.
///
/// The same person always maps to the same key, which is what lets the claim store find
/// an existing record when a new prescription arrives for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatientKey(String);

impl PatientKey {
    /// Derives a key from its identity parts.
    ///
    /// # Arguments
    ///
    /// * `country` - ISO 3166-1 alpha-2 code, e.g. `CO`
    /// * `document_type` - document type code, e.g. `CC`, `TI`, `CE`
    /// * `document_number` - the number as typed; dots, dashes and spaces are dropped
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] naming the part that failed validation.
    pub fn derive(
        country: &str,
        document_type: &str,
        document_number: &str,
    ) -> Result<Self, KeyError> {
        let country = country.trim().to_ascii_uppercase();
        if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(KeyError::InvalidCountry(country));
        }

        let document_type = document_type.trim().to_ascii_uppercase();
        if document_type.is_empty()
            || document_type.len() > 3
            || !document_type.bytes().all(|b| b.is_ascii_alphabetic())
        {
            return Err(KeyError::InvalidDocumentType(document_type));
        }

        let number: String = document_number
            .chars()
            .filter(|c| !matches!(c, '.' | '-' | ' ' | ','))
            .collect::<String>()
            .to_ascii_uppercase();
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(KeyError::InvalidDocumentNumber);
        }

        Ok(Self(format!("{country}{document_type}{number}")))
    }

    /// Validates a key that was produced elsewhere (store rows, request paths).
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotCanonical`] unless [`PatientKey::is_canonical`] holds.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        if Self::is_canonical(input) {
            return Ok(Self(input.to_owned()));
        }
        Err(KeyError::NotCanonical(input.to_owned()))
    }

    /// Returns true if `input` is an upper-case alphanumeric key with a two-letter country
    /// prefix and at least one further character.
    pub fn is_canonical(input: &str) -> bool {
        input.len() > 3
            && input
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            && input.bytes().take(2).all(|b| b.is_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase hex SHA-256 of the key.
    ///
    /// Used as the on-disk directory name so identity numbers never appear in paths.
    pub fn storage_id(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }

    /// Returns `parent_dir/<s1>/<s2>/<storage_id>/`.
    ///
    /// `s1` and `s2` are the first and second pairs of hex characters of the storage id.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let id = self.storage_id();
        let s1 = &id[0..2];
        let s2 = &id[2..4];
        parent_dir.join(s1).join(s2).join(&id)
    }
}

impl fmt::Display for PatientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PatientKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatientKey::parse(s)
    }
}

impl serde::Serialize for PatientKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PatientKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PatientKey::parse(&s).map_err(serde::de::Error::custom)
    }
}
