//! Human-shareable order numbers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kart_core::{DomainError, DomainResult, ValueObject};

const ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Shortest and longest number the generator will produce.
pub const MIN_LENGTH: usize = 4;
pub const MAX_LENGTH: usize = 12;

/// Taken candidates tolerated before generation fails.
pub const MAX_ATTEMPTS: usize = 64;

/// The order identifier customers see, quote to support and find in URLs.
///
/// Non-empty, lowercase ASCII letters and digits only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl ValueObject for OrderNumber {}

impl OrderNumber {
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::invalid_id("order number must not be empty"));
        }
        if !value.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(DomainError::invalid_id(format!(
                "order number {value:?} must be lowercase letters and digits"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<OrderNumber> for String {
    fn from(value: OrderNumber) -> Self {
        value.0
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces random fixed-length order numbers.
///
/// Candidates come from the low bits of a UUIDv7 (random seed plus
/// per-process counter), so they are not ordered by time. Uniqueness is settled against storage by
/// [`OrderNumberGenerator::generate_unique`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderNumberGenerator {
    length: usize,
}

impl Default for OrderNumberGenerator {
    fn default() -> Self {
        Self { length: 10 }
    }
}

impl OrderNumberGenerator {
    pub fn new(length: usize) -> DomainResult<Self> {
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
            return Err(DomainError::validation(format!(
                "order number length must be between {MIN_LENGTH} and {MAX_LENGTH}, got {length}"
            )));
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// One random candidate; may collide with an existing order.
    pub fn candidate(&self) -> OrderNumber {
        // rand_b: the low 62 bits of a v7 UUID.
        let mut n = (Uuid::now_v7().as_u128() as u64) & ((1u64 << 62) - 1);
        let mut out = vec![b'a'; self.length];
        for slot in out.iter_mut().rev() {
            *slot = ALPHABET[(n % 36) as usize];
            n /= 36;
        }
        OrderNumber(String::from_utf8_lossy(&out).into_owned())
    }

    /// Draw candidates until `is_taken` reports a free one.
    ///
    /// Gives up with `Conflict` after [`MAX_ATTEMPTS`] taken candidates, which
    /// means the configured length is too short for the stored orders.
    pub fn generate_unique<E>(
        &self,
        mut is_taken: impl FnMut(&OrderNumber) -> Result<bool, E>,
    ) -> Result<OrderNumber, E>
    where
        E: From<DomainError>,
    {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = self.candidate();
            if !is_taken(&candidate)? {
                return Ok(candidate);
            }
        }
        Err(DomainError::conflict(format!(
            "no free order number of length {} after {MAX_ATTEMPTS} attempts",
            self.length
        ))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn candidates_have_configured_length_and_alphabet() {
        let generator = OrderNumberGenerator::new(8).unwrap();
        for _ in 0..100 {
            let n = generator.candidate();
            assert_eq!(n.as_str().len(), 8);
            assert!(OrderNumber::parse(n.as_str()).is_ok());
        }
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        assert!(OrderNumberGenerator::new(3).is_err());
        assert!(OrderNumberGenerator::new(13).is_err());
        assert!(OrderNumberGenerator::new(MAX_LENGTH).is_ok());
    }

    #[test]
    fn generate_unique_skips_taken_numbers() {
        let generator = OrderNumberGenerator::default();
        let mut rejected = HashSet::new();
        let mut calls = 0;

        let number = generator
            .generate_unique::<DomainError>(|candidate| {
                calls += 1;
                if calls <= 3 {
                    rejected.insert(candidate.clone());
                    return Ok(true);
                }
                Ok(false)
            })
            .unwrap();

        assert_eq!(calls, 4);
        assert!(!rejected.contains(&number));
    }

    #[test]
    fn generate_unique_propagates_lookup_errors() {
        let generator = OrderNumberGenerator::default();
        let err = generator
            .generate_unique(|_| Err::<bool, _>(DomainError::validation("storage down")))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("storage down"));
    }

    #[test]
    fn generate_unique_gives_up_when_every_candidate_is_taken() {
        let generator = OrderNumberGenerator::new(MIN_LENGTH).unwrap();
        let mut calls = 0;

        let err = generator
            .generate_unique::<DomainError>(|_| {
                calls += 1;
                Ok(true)
            })
            .unwrap_err();

        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(calls, MAX_ATTEMPTS);
    }

    #[test]
    fn order_number_validation() {
        assert!(OrderNumber::parse("").is_err());
        assert!(OrderNumber::parse("ABC123").is_err());
        assert!(OrderNumber::parse("abc-123").is_err());
        assert_eq!(OrderNumber::parse("a1b2c3").unwrap().to_string(), "a1b2c3");
    }
}
