// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Session tokens for a single partition key range.

use std::{cmp, fmt, str::FromStr};

use super::{SessionTokenError, VectorSessionToken};
use crate::{Lsn, PartitionKeyRangeId};

/// The progress recorded for one partition key range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTokenValue {
    /// A single LSN, as returned by single-write-region accounts, e.g. `100`.
    Simple(Lsn),
    /// A vector token, e.g. `1#100#3=90`.
    Vector(VectorSessionToken),
}

impl SessionTokenValue {
    /// The global LSN recorded by this value.
    pub fn global_lsn(&self) -> Lsn {
        match self {
            SessionTokenValue::Simple(lsn) => *lsn,
            SessionTokenValue::Vector(vector) => vector.global_lsn,
        }
    }

    /// Merges two values, keeping the higher progress.
    ///
    /// Values that can't be merged field by field fall back to the higher global LSN, with ties
    /// broken by the textual form so the result doesn't depend on argument order.
    pub fn merge(self, other: SessionTokenValue) -> SessionTokenValue {
        match (self, other) {
            (SessionTokenValue::Simple(a), SessionTokenValue::Simple(b)) => {
                SessionTokenValue::Simple(cmp::max(a, b))
            }
            (SessionTokenValue::Vector(a), SessionTokenValue::Vector(b)) => {
                match a.clone().merge(b.clone()) {
                    Ok(merged) => SessionTokenValue::Vector(merged),
                    Err(e) => {
                        tracing::debug!(error = %e, "falling back to highest global LSN");
                        Self::pick_higher(
                            SessionTokenValue::Vector(a),
                            SessionTokenValue::Vector(b),
                        )
                    }
                }
            }
            (a, b) => Self::pick_higher(a, b),
        }
    }

    fn pick_higher(a: SessionTokenValue, b: SessionTokenValue) -> SessionTokenValue {
        match a.global_lsn().cmp(&b.global_lsn()) {
            cmp::Ordering::Greater => a,
            cmp::Ordering::Less => b,
            cmp::Ordering::Equal if a.to_string() >= b.to_string() => a,
            cmp::Ordering::Equal => b,
        }
    }
}

impl FromStr for SessionTokenValue {
    type Err = SessionTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SessionTokenError::MissingComponents);
        }
        if s.contains('#') {
            return s.parse().map(SessionTokenValue::Vector);
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionTokenError::InvalidLsn(s.to_string()));
        }
        s.parse()
            .map(|lsn| SessionTokenValue::Simple(Lsn::new(lsn)))
            .map_err(|_| SessionTokenError::InvalidLsn(s.to_string()))
    }
}

impl fmt::Display for SessionTokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionTokenValue::Simple(lsn) => write!(f, "{}", lsn.value()),
            SessionTokenValue::Vector(vector) => fmt::Display::fmt(vector, f),
        }
    }
}

/// A partition-local session token: `{pkrange_id}:{value}`, e.g. `0:100` or `42:1#123#4=500`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSessionToken {
    pub pkrange_id: PartitionKeyRangeId,
    pub value: SessionTokenValue,
}

impl PartitionSessionToken {
    /// Merges two tokens for the same partition key range.
    pub fn merge(self, other: PartitionSessionToken) -> PartitionSessionToken {
        debug_assert_eq!(self.pkrange_id, other.pkrange_id);
        PartitionSessionToken {
            pkrange_id: self.pkrange_id,
            value: self.value.merge(other.value),
        }
    }
}

impl FromStr for PartitionSessionToken {
    type Err = SessionTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SessionTokenError::EmptyInput);
        }
        let (pkrange_part, value_part) = s
            .split_once(':')
            .ok_or(SessionTokenError::MissingComponents)?;
        if pkrange_part.is_empty() {
            return Err(SessionTokenError::MissingComponents);
        }

        Ok(PartitionSessionToken {
            pkrange_id: PartitionKeyRangeId::new(pkrange_part.to_string()),
            value: value_part.parse()?,
        })
    }
}

impl fmt::Display for PartitionSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pkrange_id.value(), self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> PartitionSessionToken {
        s.parse().unwrap()
    }

    #[test]
    fn parse_simple_and_vector_tokens() {
        let simple = token("0:150");
        assert_eq!(simple.pkrange_id.value(), "0");
        assert_eq!(simple.value, SessionTokenValue::Simple(Lsn::new(150)));

        let vector = token("42:1#123#4=500#5=600");
        assert_eq!(vector.pkrange_id.value(), "42");
        assert_eq!(vector.value.global_lsn(), Lsn::new(123));
        assert_eq!(vector.to_string(), "42:1#123#4=500#5=600");
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            "".parse::<PartitionSessionToken>().unwrap_err(),
            SessionTokenError::EmptyInput
        );
        assert_eq!(
            "42#1#123".parse::<PartitionSessionToken>().unwrap_err(),
            SessionTokenError::MissingComponents
        );
        assert_eq!(
            ":1#123".parse::<PartitionSessionToken>().unwrap_err(),
            SessionTokenError::MissingComponents
        );
        assert_eq!(
            "42:".parse::<PartitionSessionToken>().unwrap_err(),
            SessionTokenError::MissingComponents
        );
        assert_eq!(
            "42:abc".parse::<PartitionSessionToken>().unwrap_err(),
            SessionTokenError::InvalidLsn("abc".into())
        );
    }

    #[test]
    fn simple_merge_keeps_max() {
        assert_eq!(token("0:150").merge(token("0:100")), token("0:150"));
        assert_eq!(token("0:80").merge(token("0:100")), token("0:100"));
    }

    #[test]
    fn incompatible_vectors_fall_back_to_global_lsn() {
        let a = token("0:2#1000#100=500");
        let b = token("0:2#1200#200=600");
        assert_eq!(a.clone().merge(b.clone()), b);
        assert_eq!(b.clone().merge(a), b);
    }

    #[test]
    fn mixed_merge_is_commutative() {
        let simple = token("0:100");
        let vector = token("0:1#100");
        assert_eq!(
            simple.clone().merge(vector.clone()),
            vector.clone().merge(simple.clone())
        );
        assert_eq!(token("0:99").merge(vector.clone()), vector);
    }
}
