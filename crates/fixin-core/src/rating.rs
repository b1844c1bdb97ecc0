//! # Ratings
//!
//! Star ratings exchanged between client and agent when a job completes.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A star rating in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Create a rating, rejecting values outside `1..=5`.
    pub fn new(stars: i64) -> Result<Self, ValidationError> {
        if !(i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&stars) {
            return Err(ValidationError::OutOfRange {
                field: "rating",
                value: stars.to_string(),
            });
        }
        Ok(Self(stars as u8))
    }

    pub fn stars(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> Self {
        r.0
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_one_through_five() {
        for stars in 1..=5 {
            assert_eq!(Rating::new(stars).unwrap().stars() as i64, stars);
        }
    }

    #[test]
    fn rejects_zero_and_six() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
    }

    #[test]
    fn deserializes_from_integer() {
        let r: Rating = serde_json::from_str("4").unwrap();
        assert_eq!(r.stars(), 4);
        assert!(serde_json::from_str::<Rating>("9").is_err());
    }
}
