//! Identifier types: UUID-backed connection ids and human-typeable
//! session codes.
//!
//! Using distinct types prevents accidentally passing a connection id
//! where a session code is expected.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::AppError;

/// Macro to define a newtype ID wrapper around `Uuid`.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a live transport connection.
    ConnectionId
);

/// Letters used in session codes. `I`, `L` and `O` are left out because
/// they read like `1` and `0` on a phone screen.
pub const CODE_LETTERS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ";

/// Digits used in session codes. `0` and `1` are left out for the same
/// reason.
pub const CODE_DIGITS: &[u8] = b"23456789";

/// Separator between the letter and digit halves.
pub const CODE_SEPARATOR: char = '-';

const HALF_LEN: usize = 3;
const CODE_LEN: usize = HALF_LEN * 2 + 1;

/// Short human-typeable session identifier, e.g. `KTX-482`.
///
/// Always stored uppercase. Parsing trims surrounding whitespace and
/// uppercases the input before validating it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionCode(String);

impl SessionCode {
    /// Draw a random code from the restricted alphabet.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let mut code = String::with_capacity(CODE_LEN);
        for _ in 0..HALF_LEN {
            code.push(CODE_LETTERS[rng.gen_range(0..CODE_LETTERS.len())] as char);
        }
        code.push(CODE_SEPARATOR);
        for _ in 0..HALF_LEN {
            code.push(CODE_DIGITS[rng.gen_range(0..CODE_DIGITS.len())] as char);
        }
        Self(code)
    }

    /// Normalize and validate user input.
    pub fn parse(input: &str) -> Result<Self, AppError> {
        let normalized = input.trim().to_ascii_uppercase();
        let bytes = normalized.as_bytes();

        if bytes.len() != CODE_LEN {
            return Err(AppError::validation(format!(
                "Session id must look like ABC-234, got '{}'",
                input.trim()
            )));
        }

        let letters_ok = bytes[..HALF_LEN].iter().all(|b| CODE_LETTERS.contains(b));
        let separator_ok = bytes[HALF_LEN] == CODE_SEPARATOR as u8;
        let digits_ok = bytes[HALF_LEN + 1..]
            .iter()
            .all(|b| CODE_DIGITS.contains(b));

        if !(letters_ok && separator_ok && digits_ok) {
            return Err(AppError::validation(format!(
                "Session id '{}' contains invalid characters",
                input.trim()
            )));
        }

        Ok(Self(normalized))
    }

    /// Borrow the normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of distinct codes the alphabet can produce.
    pub fn space_size() -> u64 {
        (CODE_LETTERS.len() as u64).pow(HALF_LEN as u32)
            * (CODE_DIGITS.len() as u64).pow(HALF_LEN as u32)
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionCode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SessionCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SessionCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(|e| serde::de::Error::custom(e.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_connection_id_from_str() {
        let uuid = Uuid::new_v4();
        let id: ConnectionId = uuid.to_string().parse().expect("should parse");
        assert_eq!(id.0, uuid);
    }

    #[test]
    fn test_generated_codes_parse() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let code = SessionCode::generate(&mut rng);
            let reparsed = SessionCode::parse(code.as_str()).expect("generated code is valid");
            assert_eq!(code, reparsed);
        }
    }

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let code = SessionCode::parse("  ktx-482\n").expect("valid");
        assert_eq!(code.as_str(), "KTX-482");
    }

    #[test]
    fn test_parse_rejects_ambiguous_characters() {
        assert!(SessionCode::parse("KOX-482").is_err());
        assert!(SessionCode::parse("KTX-402").is_err());
        assert!(SessionCode::parse("KIX-482").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_shape() {
        assert!(SessionCode::parse("").is_err());
        assert!(SessionCode::parse("KTX482").is_err());
        assert!(SessionCode::parse("KTX_482").is_err());
        assert!(SessionCode::parse("KTXX-482").is_err());
    }

    #[test]
    fn test_serde_uses_normalized_form() {
        let code: SessionCode = serde_json::from_str("\"abc-234\"").expect("deserialize");
        assert_eq!(serde_json::to_string(&code).expect("serialize"), "\"ABC-234\"");
    }

    #[test]
    fn test_space_size() {
        assert_eq!(SessionCode::space_size(), 23 * 23 * 23 * 8 * 8 * 8);
    }
}
