//! Room code generation and validation.
//!
//! A room code is the sole correlation key between a sender and a receiver on
//! the relay.
//!
//! ## Code Format
//!
//! Codes are exactly six decimal digits drawn uniformly from
//! `100000..=999999`. No uniqueness check is made against rooms already in
//! use; two concurrent senders can collide, which is accepted.
//!
//! ## Example
//!
//! ```
//! use relaydrop_core::code::RoomCode;
//!
//! let code = RoomCode::generate();
//! assert!(RoomCode::is_complete(code.as_str()));
//!
//! assert!(RoomCode::parse("12345").is_err());
//! assert!(RoomCode::parse("123456").is_ok());
//! ```

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Length of a room code
pub const CODE_LENGTH: usize = 6;

/// Smallest code that can be generated.
pub const CODE_MIN: u32 = 100_000;

/// Largest code that can be generated.
pub const CODE_MAX: u32 = 999_999;

/// A validated room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode {
    code: String,
}

impl RoomCode {
    /// Draw a fresh random room code.
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;

        let value = rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX);
        Self {
            code: value.to_string(),
        }
    }

    /// Returns true iff `candidate` is exactly six ASCII decimal digits.
    ///
    /// No trimming is applied: leading, trailing or embedded whitespace makes
    /// the candidate incomplete.
    #[must_use]
    pub fn is_complete(candidate: &str) -> bool {
        candidate.len() == CODE_LENGTH && candidate.bytes().all(|b| b.is_ascii_digit())
    }

    /// Parse and validate a room code from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not exactly six decimal digits.
    pub fn parse(input: &str) -> Result<Self> {
        if !Self::is_complete(input) {
            return Err(Error::InvalidCodeFormat(format!(
                "expected {CODE_LENGTH} digits, got '{input}'"
            )));
        }

        Ok(Self {
            code: input.to_string(),
        })
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.code
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl FromStr for RoomCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for RoomCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code)
    }
}

impl<'de> Deserialize<'de> for RoomCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
