//! Data-plane version parsing and ordering.
//!
//! Versions look like `A.B.C[.D][-suffix]`. They are ordered by their
//! numeric encoding `A*10^9 + B*10^6 + C*10^3 + D`; at equal numbers a
//! pre-release sorts before the release. The `enterprise-edition` suffix
//! marks a release build, not a pre-release.

use std::cmp::Ordering;
use std::fmt;

use crate::CompatError;

const COMPONENT_LIMIT: u64 = 1000;
const RELEASE_SUFFIXES: [&str; 2] = ["enterprise-edition", "enterprise"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataPlaneVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: Option<u64>,
    /// Pre-release tag; `None` for releases
    pub pre_release: Option<String>,
}

impl DataPlaneVersion {
    pub const fn new(
        major: u64,
        minor: u64,
        patch: u64,
    ) -> Self {
        Self {
            major,
            minor,
            patch,
            build: None,
            pre_release: None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CompatError> {
        let bad = |reason: &str| CompatError::BadDataPlaneVersion(format!("{raw:?}: {reason}"));

        let raw = raw.trim();
        if raw.is_empty() {
            return Err(bad("empty version"));
        }

        let (core, suffix) = match raw.split_once('-') {
            Some((core, suffix)) => (core, Some(suffix)),
            None => (raw, None),
        };
        if let Some(suffix) = suffix {
            if suffix.is_empty() {
                return Err(bad("empty suffix"));
            }
        }

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(bad("expected three or four dot separated components"));
        }

        let mut numbers = Vec::with_capacity(parts.len());
        for part in &parts {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad("components must be non-negative integers"));
            }
            let n: u64 = part.parse().map_err(|_| bad("component out of range"))?;
            numbers.push(n);
        }

        if numbers[1..].iter().any(|n| *n >= COMPONENT_LIMIT) {
            return Err(bad("minor, patch and build must be below 1000"));
        }
        if numbers[0] >= 1_000_000 {
            return Err(bad("major component out of range"));
        }

        let pre_release = suffix
            .filter(|s| !RELEASE_SUFFIXES.contains(s))
            .map(str::to_string);

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            build: numbers.get(3).copied(),
            pre_release,
        })
    }

    /// Numeric encoding shared with change ceilings
    pub fn number(&self) -> u64 {
        self.major * 1_000_000_000
            + self.minor * 1_000_000
            + self.patch * COMPONENT_LIMIT
            + self.build.unwrap_or(0)
    }

    /// True when a change whose ceiling is `ceiling` must be applied to
    /// this version (`ceiling > self`).
    pub fn is_below(
        &self,
        ceiling: u64,
    ) -> bool {
        let number = self.number();
        number < ceiling || (number == ceiling && self.pre_release.is_some())
    }

    pub fn is_pre_release(&self) -> bool {
        self.pre_release.is_some()
    }
}

impl Ord for DataPlaneVersion {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        self.number().cmp(&other.number()).then_with(|| {
            match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            }
        })
    }
}

impl PartialOrd for DataPlaneVersion {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DataPlaneVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(build) = self.build {
            write!(f, ".{build}")?;
        }
        if let Some(pre) = &self.pre_release {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

/// Encodes `major.minor.patch` the way change ceilings are written
pub const fn version_number(
    major: u64,
    minor: u64,
    patch: u64,
) -> u64 {
    major * 1_000_000_000 + minor * 1_000_000 + patch * COMPONENT_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_and_four_components() {
        let v = DataPlaneVersion::parse("2.8.1").unwrap();
        assert_eq!((v.major, v.minor, v.patch, v.build), (2, 8, 1, None));
        assert_eq!(v.number(), 2_008_001_000);

        let v = DataPlaneVersion::parse("2.8.1.3").unwrap();
        assert_eq!(v.build, Some(3));
        assert_eq!(v.number(), 2_008_001_003);
    }

    #[test]
    fn enterprise_suffix_is_a_release() {
        let v = DataPlaneVersion::parse("2.8.1.1-enterprise-edition").unwrap();
        assert!(!v.is_pre_release());
        assert!(!v.is_below(version_number(2, 8, 1)));
    }

    #[test]
    fn pre_release_orders_before_release() {
        let beta = DataPlaneVersion::parse("3.0.0-beta1").unwrap();
        let release = DataPlaneVersion::parse("3.0.0").unwrap();
        assert!(beta < release);
        assert!(beta.is_below(version_number(3, 0, 0)));
        assert!(!release.is_below(version_number(3, 0, 0)));
    }

    #[test]
    fn rejects_malformed_versions() {
        for raw in ["", "3", "3.0", "3.0.0.0.0", "3.a.0", "3.1000.0", "3.0.1000", "3.0.0.1000", "3.0.0-", "-3.0.0"] {
            assert!(
                matches!(DataPlaneVersion::parse(raw), Err(CompatError::BadDataPlaneVersion(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips() {
        for raw in ["2.5.0", "2.8.1.3", "3.0.0-rc.1"] {
            assert_eq!(DataPlaneVersion::parse(raw).unwrap().to_string(), raw);
        }
    }
}
