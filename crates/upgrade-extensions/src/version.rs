//! Version parsing and constraint checking.
//!
//! Extension manifests carry .NET-style versions (`1.0`, `1.2.3`, `1.2.3.4`).
//! They are normalized to [`semver::Version`]:
//!
//! - `major.minor` gets a `.0` patch
//! - a fourth `revision` component is kept as build metadata, so it never
//!   affects ordering
//!
//! Registrations may also pin a constraint on installed versions, e.g.
//! `>=1.0,<2.0`.
//!
//! # Examples
//!
//! ```
//! use upgrade_extensions::version::{VersionConstraint, parse_version};
//!
//! let v = parse_version("1.2").unwrap();
//! assert_eq!(v, semver::Version::new(1, 2, 0));
//!
//! let constraint = VersionConstraint::parse(">=1.0,<2.0").unwrap();
//! assert!(constraint.satisfies("1.4.2"));
//! assert!(!constraint.satisfies("2.0"));
//! ```

use std::cmp::Ordering;
use std::fmt;

use semver::{BuildMetadata, Version};

use crate::error::{Error, Result};

/// Comparison applied by one clause of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Ne,
}

/// Operator tokens, longest first so `>=` is not read as `>`.
const OPERATORS: [(&str, CompareOp); 6] = [
    (">=", CompareOp::Gte),
    ("<=", CompareOp::Lte),
    ("!=", CompareOp::Ne),
    ("==", CompareOp::Eq),
    (">", CompareOp::Gt),
    ("<", CompareOp::Lt),
];

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Gte => ordering.is_ge(),
            CompareOp::Gt => ordering.is_gt(),
            CompareOp::Lte => ordering.is_le(),
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Eq => ordering.is_eq(),
            CompareOp::Ne => ordering.is_ne(),
        }
    }
}

#[derive(Debug, Clone)]
struct Clause {
    op: CompareOp,
    version: Version,
}

impl Clause {
    fn parse(text: &str) -> Result<Self> {
        let (op, rest) = OPERATORS
            .iter()
            .find_map(|(token, op)| text.strip_prefix(token).map(|rest| (*op, rest)))
            .unwrap_or((CompareOp::Eq, text));

        let version = parse_version(rest).map_err(|_| Error::VersionConstraintParse {
            constraint: text.to_string(),
            reason: format!("invalid version: {}", rest.trim()),
        })?;
        Ok(Self { op, version })
    }

    /// Build metadata (the .NET revision) never takes part in the comparison.
    fn matches(&self, candidate: &Version) -> bool {
        self.op.accepts(candidate.cmp_precedence(&self.version))
    }
}

/// Constraint on installed extension versions, such as `>=1.0,<2.0`.
///
/// Clauses are comma-separated and must all hold. A bare version means `==`.
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    clauses: Vec<Clause>,
    text: String,
}

impl VersionConstraint {
    pub fn parse(constraint: &str) -> Result<Self> {
        let clauses = constraint
            .split(',')
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .map(Clause::parse)
            .collect::<Result<Vec<_>>>()?;

        if clauses.is_empty() {
            return Err(Error::VersionConstraintParse {
                constraint: constraint.to_string(),
                reason: "no clauses".to_string(),
            });
        }
        Ok(Self {
            clauses,
            text: constraint.to_string(),
        })
    }

    /// `false` for strings that are not versions at all.
    pub fn satisfies(&self, version: &str) -> bool {
        parse_version(version).is_ok_and(|v| self.satisfies_version(&v))
    }

    pub fn satisfies_version(&self, version: &Version) -> bool {
        self.clauses.iter().all(|clause| clause.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parse a .NET-style or semver version string.
///
/// - `"3.12"` -> `3.12.0`
/// - `"3.12.1"` -> `3.12.1`
/// - `"3.12.1.7"` -> `3.12.1+7`
/// - `"3"` -> error
pub fn parse_version(s: &str) -> Result<Version> {
    let s = s.trim();

    if let Ok(v) = Version::parse(s) {
        return Ok(v);
    }

    let invalid = |reason: String| Error::InvalidVersion {
        version: s.to_string(),
        reason,
    };

    let parts: Vec<&str> = s.split('.').collect();
    if !(2..=4).contains(&parts.len()) {
        return Err(invalid(
            "expected major.minor[.patch[.revision]]".to_string(),
        ));
    }

    let mut numbers = [0u64; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| invalid(format!("component '{part}' is not a number")))?;
    }

    let mut version = Version::new(numbers[0], numbers[1], numbers[2]);
    if parts.len() == 4 {
        version.build = BuildMetadata::new(&numbers[3].to_string())
            .map_err(|e| invalid(e.to_string()))?;
    }
    Ok(version)
}

/// Whether `current` is at least `minimum`, ignoring build metadata.
pub fn meets_minimum(minimum: &Version, current: &Version) -> bool {
    current.cmp_precedence(minimum).is_ge()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(">=1.0,<2.0", "1.0.0", true)]
    #[case(">=1.0,<2.0", "1.9.9", true)]
    #[case(">=1.0,<2.0", "0.9", false)]
    #[case(">=1.0,<2.0", "2.0", false)]
    #[case("1.2.0", "1.2", true)]
    #[case("1.2.0", "1.2.1", false)]
    #[case("!=1.1", "1.2", true)]
    #[case("!=1.1", "1.1.0", false)]
    #[case("==1.2.3", "1.2.3.99", true)]
    #[case("> 1.0", "1.0.1", true)]
    #[case(">=1.0", "not-a-version", false)]
    fn test_satisfies(#[case] constraint: &str, #[case] version: &str, #[case] expected: bool) {
        let constraint = VersionConstraint::parse(constraint).unwrap();
        assert_eq!(constraint.satisfies(version), expected);
    }

    #[rstest]
    #[case("")]
    #[case(" , ")]
    #[case(">=abc")]
    #[case(">=1.0,<")]
    fn test_invalid_constraints(#[case] constraint: &str) {
        assert!(matches!(
            VersionConstraint::parse(constraint),
            Err(Error::VersionConstraintParse { .. })
        ));
    }

    #[test]
    fn test_constraint_keeps_text() {
        let constraint = VersionConstraint::parse(">=1.0, <2.0").unwrap();
        assert_eq!(constraint.clauses.len(), 2);
        assert_eq!(constraint.to_string(), ">=1.0, <2.0");
    }

    #[rstest]
    #[case("99.0", Version::new(99, 0, 0))]
    #[case("1.2.3", Version::new(1, 2, 3))]
    #[case(" 4.5 ", Version::new(4, 5, 0))]
    fn test_parse_version(#[case] text: &str, #[case] expected: Version) {
        assert_eq!(parse_version(text).unwrap(), expected);
    }

    #[test]
    fn test_parse_version_revision_is_build_metadata() {
        let v = parse_version("1.2.3.4").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
        assert_eq!(v.build.as_str(), "4");
    }

    #[test]
    fn test_parse_version_semver_prerelease() {
        let v = parse_version("1.0.0-preview.1").unwrap();
        assert_eq!(v.pre.as_str(), "preview.1");
    }

    #[rstest]
    #[case("3")]
    #[case("1.2.3.4.5")]
    #[case("1.x")]
    fn test_parse_version_rejects(#[case] text: &str) {
        assert!(matches!(parse_version(text), Err(Error::InvalidVersion { .. })));
    }

    #[test]
    fn test_meets_minimum() {
        let current = parse_version("1.0").unwrap();
        assert!(meets_minimum(&parse_version("0.9").unwrap(), &current));
        assert!(meets_minimum(&parse_version("1.0.0.5").unwrap(), &current));
        assert!(!meets_minimum(&parse_version("99.0").unwrap(), &current));
    }
}
