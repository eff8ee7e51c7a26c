// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Vector session tokens, used by accounts with multiple write regions.

use std::{cmp, collections::BTreeMap, fmt, str::FromStr};

use super::SessionTokenError;
use crate::{Lsn, RegionId};

/// A vector session token: `{version}#{global_lsn}#{region_id}={region_lsn}...`.
///
/// The version increases whenever the account's region topology changes; regional LSNs track
/// progress in each write region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSessionToken {
    pub version: u64,
    pub global_lsn: Lsn,
    pub regional_lsns: BTreeMap<RegionId, Lsn>,
}

/// Parses an unsigned decimal number, rejecting signs and whitespace that `str::parse` would allow.
fn parse_digits<T: FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for VectorSessionToken {
    type Err = SessionTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SessionTokenError::EmptyInput);
        }

        let mut components = s.split('#');
        let version_str = components.next().unwrap_or_default();
        let Some(global_lsn_str) = components.next() else {
            return Err(SessionTokenError::MissingComponents);
        };
        let version = parse_digits(version_str)
            .ok_or_else(|| SessionTokenError::InvalidVersion(version_str.to_string()))?;
        if global_lsn_str.is_empty() {
            return Err(SessionTokenError::MissingComponents);
        }
        let global_lsn = parse_digits(global_lsn_str)
            .map(Lsn::new)
            .ok_or_else(|| SessionTokenError::InvalidLsn(global_lsn_str.to_string()))?;

        let mut regional_lsns = BTreeMap::new();
        for component in components {
            let malformed = || SessionTokenError::MalformedRegionalComponent(component.to_string());
            let (region_id_str, region_lsn_str) = component.split_once('=').ok_or_else(malformed)?;
            if region_id_str.is_empty() || region_lsn_str.is_empty() {
                return Err(malformed());
            }
            let region_id = parse_digits(region_id_str)
                .map(RegionId::new)
                .ok_or_else(|| SessionTokenError::InvalidRegionId(region_id_str.to_string()))?;
            let region_lsn = parse_digits(region_lsn_str)
                .map(Lsn::new)
                .ok_or_else(|| SessionTokenError::InvalidRegionLsn(region_lsn_str.to_string()))?;
            regional_lsns.insert(region_id, region_lsn);
        }

        Ok(VectorSessionToken {
            version,
            global_lsn,
            regional_lsns,
        })
    }
}

impl VectorSessionToken {
    /// Returns `true` if `other` represents progress at least as far as `self`.
    ///
    /// Tokens of the same version must name the same regions.
    pub fn can_advance_to(&self, other: &VectorSessionToken) -> Result<bool, SessionTokenError> {
        match other.version.cmp(&self.version) {
            cmp::Ordering::Greater => Ok(true),
            cmp::Ordering::Less => Ok(false),
            cmp::Ordering::Equal => {
                if !self.regional_lsns.keys().eq(other.regional_lsns.keys()) {
                    return Err(SessionTokenError::InvalidRegions {
                        current: self.to_string(),
                        other: other.to_string(),
                    });
                }
                let regions_advance = self
                    .regional_lsns
                    .iter()
                    .zip(other.regional_lsns.values())
                    .all(|((_, current), next)| next >= current);
                Ok(other.global_lsn >= self.global_lsn && regions_advance)
            }
        }
    }

    /// Merges this token with another, keeping the highest progress from both.
    ///
    /// This operation is commutative. Tokens of the same version must name the same regions.
    pub fn merge(self, other: VectorSessionToken) -> Result<VectorSessionToken, SessionTokenError> {
        let (higher, lower) = if self.version >= other.version {
            (self, other)
        } else {
            (other, self)
        };

        if higher.version == lower.version {
            if !higher.regional_lsns.keys().eq(lower.regional_lsns.keys()) {
                return Err(SessionTokenError::TokensCannotBeMerged(
                    "tokens have same version but different regions".to_string(),
                ));
            }

            let regional_lsns = higher
                .regional_lsns
                .iter()
                .zip(lower.regional_lsns.values())
                .map(|((region, a), b)| (*region, cmp::max(*a, *b)))
                .collect();
            return Ok(VectorSessionToken {
                version: higher.version,
                global_lsn: cmp::max(higher.global_lsn, lower.global_lsn),
                regional_lsns,
            });
        }

        // The higher version's region set wins; regions both tokens know take the larger LSN.
        let mut regional_lsns = higher.regional_lsns;
        for (region, lower_lsn) in lower.regional_lsns {
            if let Some(lsn) = regional_lsns.get_mut(&region) {
                *lsn = cmp::max(*lsn, lower_lsn);
            }
        }

        Ok(VectorSessionToken {
            version: higher.version,
            global_lsn: higher.global_lsn,
            regional_lsns,
        })
    }
}

impl fmt::Display for VectorSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.version, self.global_lsn.value())?;
        for (region_id, region_lsn) in &self.regional_lsns {
            write!(f, "#{}={}", region_id.value(), region_lsn.value())?;
        }
        Ok(())
    }
}
