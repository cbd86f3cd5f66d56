//! ISBN normalization, validation and display formatting.
//!
//! Every ISBN that enters the resolver is reduced to its 13-digit form here.
//! ISBN-10 input is converted by prefixing `978` and recomputing the check digit.

mod ranges;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_with::skip_serializing_none;
use thiserror::Error;
use utoipa::ToSchema;

/// Reasons an input string is not a usable ISBN
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsbnError {
    #[error("Invalid ISBN: empty input")]
    Empty,

    #[error("Invalid ISBN: unexpected character '{0}'")]
    UnexpectedCharacter(char),

    #[error("Invalid ISBN: expected 10 or 13 digits, got {0}")]
    InvalidLength(usize),

    #[error("Invalid ISBN: checksum mismatch")]
    ChecksumMismatch,
}

/// A checksum-valid ISBN in normalized 13-digit form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Isbn(String);

impl Isbn {
    /// Parse raw user input (hyphens, spaces and ISBN-10 accepted)
    pub fn parse(raw: &str) -> Result<Self, IsbnError> {
        let cleaned: Vec<char> = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .map(|c| if c == 'x' { 'X' } else { c })
            .collect();

        if cleaned.is_empty() {
            return Err(IsbnError::Empty);
        }

        let last = cleaned.len() - 1;
        for (idx, c) in cleaned.iter().enumerate() {
            let allowed = c.is_ascii_digit() || (*c == 'X' && idx == last);
            if !allowed {
                return Err(IsbnError::UnexpectedCharacter(*c));
            }
        }

        match cleaned.len() {
            10 => {
                let digits = isbn10_values(&cleaned)?;
                if weighted_isbn10(&digits) % 11 != 0 {
                    return Err(IsbnError::ChecksumMismatch);
                }
                Ok(Self(isbn10_to_isbn13(&digits[..9])))
            }
            13 => {
                let digits = cleaned
                    .iter()
                    .map(|c| c.to_digit(10).ok_or(IsbnError::UnexpectedCharacter(*c)))
                    .collect::<Result<Vec<u32>, _>>()?;
                if isbn13_check_digit(&digits[..12]) != digits[12] {
                    return Err(IsbnError::ChecksumMismatch);
                }
                Ok(Self(cleaned.into_iter().collect()))
            }
            n => Err(IsbnError::InvalidLength(n)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ISBN-10 form, only defined for the `978` prefix
    pub fn to_isbn10(&self) -> Option<String> {
        if !self.0.starts_with("978") {
            return None;
        }
        let body: Vec<u32> = self.0[3..12].chars().filter_map(|c| c.to_digit(10)).collect();
        let sum: u32 = body
            .iter()
            .enumerate()
            .map(|(idx, d)| (10 - idx as u32) * d)
            .sum();
        let check = (11 - sum % 11) % 11;
        let mut out: String = self.0[3..12].to_string();
        if check == 10 {
            out.push('X');
        } else {
            out.push(char::from_digit(check, 10)?);
        }
        Some(out)
    }

    /// Hyphenated display form, e.g. `978-0-13-468599-1`
    pub fn hyphenated(&self) -> String {
        ranges::hyphenate(&self.0)
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Isbn {
    type Err = IsbnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Isbn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn isbn10_values(chars: &[char]) -> Result<Vec<u32>, IsbnError> {
    chars
        .iter()
        .map(|c| match c {
            'X' => Ok(10),
            c => c.to_digit(10).ok_or(IsbnError::UnexpectedCharacter(*c)),
        })
        .collect()
}

fn weighted_isbn10(values: &[u32]) -> u32 {
    values
        .iter()
        .enumerate()
        .map(|(idx, v)| (10 - idx as u32) * v)
        .sum()
}

fn isbn13_check_digit(first_twelve: &[u32]) -> u32 {
    let sum: u32 = first_twelve
        .iter()
        .enumerate()
        .map(|(idx, d)| if idx % 2 == 0 { *d } else { d * 3 })
        .sum();
    (10 - sum % 10) % 10
}

fn isbn10_to_isbn13(first_nine: &[u32]) -> String {
    let mut digits = vec![9, 7, 8];
    digits.extend_from_slice(first_nine);
    let check = isbn13_check_digit(&digits);
    digits.push(check);
    digits
        .into_iter()
        .filter_map(|d| char::from_digit(d, 10))
        .collect()
}

/// Result of validating a raw ISBN string
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IsbnValidation {
    pub is_valid: bool,
    /// 13-digit normalized form when valid
    pub normalized_isbn: Option<String>,
    /// Human-readable reason when invalid
    pub error: Option<String>,
}

/// Validate a raw ISBN without failing
pub fn validate(raw: &str) -> IsbnValidation {
    match Isbn::parse(raw) {
        Ok(isbn) => IsbnValidation {
            is_valid: true,
            normalized_isbn: Some(isbn.0),
            error: None,
        },
        Err(e) => IsbnValidation {
            is_valid: false,
            normalized_isbn: None,
            error: Some(e.to_string()),
        },
    }
}

/// Format a raw ISBN for display
pub fn format(raw: &str) -> Result<String, IsbnError> {
    Isbn::parse(raw).map(|isbn| isbn.hyphenated())
}
