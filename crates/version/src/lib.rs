//! Package versions.
//!
//! Versions have up to four numeric components (`major.minor.patch.revision`)
//! and an optional prerelease label introduced by the first hyphen. Build
//! metadata (anything after `+`) is accepted and discarded.
//!
//! Ordering follows semantic versioning: numeric components compare
//! numerically, a release sorts above any prerelease of the same numbers, and
//! prerelease labels compare segment by segment. Strings that fail to parse
//! can still be compared through [`compare`], which degrades to a
//! case-insensitive lexical ordering and says so in its [`Outcome`].

mod compare;
pub mod error;

pub use crate::compare::{Outcome, compare, in_range, is_prerelease, max_version, sort_versions};
use crate::error::{Error, ErrorKind, Result};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// A single dot-separated segment of a prerelease label.
#[derive(Debug, Clone)]
enum Segment {
    Numeric(u64),
    Alpha(String),
}
impl Segment {
    fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return None;
        }
        // Digit runs too long for a u64 still sort sensibly as text.
        Some(match raw.bytes().all(|b| b.is_ascii_digit()) {
            true => raw.parse().map(Self::Numeric).unwrap_or_else(|_| Self::Alpha(raw.to_string())),
            false => Self::Alpha(raw.to_string()),
        })
    }
}
impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::Alpha(_)) => Ordering::Less,
            (Self::Alpha(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Alpha(a), Self::Alpha(b)) => {
                a.bytes().map(|c| c.to_ascii_lowercase()).cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
            },
        }
    }
}
impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Segment {}
impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Alpha(s) => f.write_str(s),
        }
    }
}

/// A parsed package version.
///
/// Equality and ordering ignore the case of prerelease labels, so
/// `1.0.0-Beta` and `1.0.0-beta` are the same version.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    prerelease: Vec<Segment>,
}

impl Version {
    /// Parse a version string.
    ///
    /// ```
    /// use nupack_version::Version;
    ///
    /// assert_eq!(Version::parse("1.0").unwrap().to_string(), "1.0.0");
    /// assert_eq!(Version::parse("01.2.3.0-rc.1+sha.5").unwrap().to_string(), "1.2.3-rc.1");
    /// assert_eq!(Version::parse("1.2.3.4").unwrap().to_string(), "1.2.3.4");
    /// assert!(Version::parse("1.x").is_err());
    /// assert!(Version::parse("1.0.0-").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let without_metadata = trimmed.split_once('+').map_or(trimmed, |(head, _)| head);
        if without_metadata.is_empty() {
            exn::bail!(ErrorKind::Empty);
        }
        let (numbers, label) = match without_metadata.split_once('-') {
            Some((numbers, label)) => (numbers, Some(label)),
            None => (without_metadata, None),
        };

        let components = numbers.split('.').collect::<Vec<_>>();
        if components.is_empty() || components.len() > 4 {
            exn::bail!(ErrorKind::ComponentCount(components.len()));
        }
        let mut parsed = [0u64; 4];
        for (slot, raw) in parsed.iter_mut().zip(&components) {
            if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                exn::bail!(ErrorKind::InvalidNumber(raw.to_string()));
            }
            *slot = raw.parse().map_err(|_| Error::from(ErrorKind::InvalidNumber(raw.to_string())))?;
        }

        let prerelease = match label {
            None => Vec::new(),
            Some(label) => label
                .split('.')
                .map(|segment| Segment::parse(segment).ok_or_else(|| ErrorKind::InvalidLabel(label.to_string())))
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };

        let [major, minor, patch, revision] = parsed;
        Ok(Self { major, minor, patch, revision, prerelease })
    }

    /// Whether this version carries a prerelease label.
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// The prerelease label as written (without the leading hyphen).
    pub fn prerelease(&self) -> Option<String> {
        match self.prerelease.is_empty() {
            true => None,
            false => Some(self.prerelease.iter().map(ToString::to_string).collect::<Vec<_>>().join(".")),
        }
    }

    /// The lowercase normalized form used in URLs and storage keys.
    pub fn to_lowercase(&self) -> String {
        self.to_string().to_lowercase()
    }

    fn numbers(&self) -> (u64, u64, u64, u64) {
        (self.major, self.minor, self.patch, self.revision)
    }
}

impl FromStr for Version {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for Version {
    /// Normalized form: three components, a fourth only when non-zero, then
    /// the prerelease label. Build metadata is never included.
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        if let Some(label) = self.prerelease() {
            write!(f, "-{label}")?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numbers().cmp(&other.numbers()).then_with(|| {
            match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
                (true, true) => Ordering::Equal,
                // A release outranks every prerelease of the same numbers.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                // Lexicographic over segments: a shorter label that is a
                // prefix of a longer one sorts first.
                (false, false) => self.prerelease.cmp(&other.prerelease),
            }
        })
    }
}
impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Version {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", "1.0.0")]
    #[case("1.0", "1.0.0")]
    #[case("1.0.0", "1.0.0")]
    #[case("1.0.0.0", "1.0.0")]
    #[case("1.0.0.7", "1.0.0.7")]
    #[case("001.002.003", "1.2.3")]
    #[case(" 2.0.0-beta ", "2.0.0-beta")]
    #[case("2.0.0-Beta.01", "2.0.0-Beta.1")]
    #[case("1.0.0+build.42", "1.0.0")]
    #[case("1.0.0-rc-1+build", "1.0.0-rc-1")]
    fn test_normalized(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(Version::parse(input).unwrap().to_string(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("+meta")]
    #[case("1.2.3.4.5")]
    #[case("a.b.c")]
    #[case("1..0")]
    #[case("1.0.0-")]
    #[case("1.0.0-beta..1")]
    #[case("1.0.0-beta_1")]
    #[case("99999999999999999999999.0")]
    fn test_invalid(#[case] input: &str) {
        assert!(Version::parse(input).is_err(), "{input:?} should not parse");
    }

    #[rstest]
    #[case("1.0.0", "2.0.0", Ordering::Less)]
    #[case("1.10.0", "1.9.0", Ordering::Greater)]
    #[case("1.0.0.1", "1.0.0", Ordering::Greater)]
    #[case("1.0", "1.0.0.0", Ordering::Equal)]
    #[case("1.0.0-beta", "1.0.0", Ordering::Less)]
    #[case("2.0.0-beta", "1.0.0", Ordering::Greater)]
    #[case("1.0.0-alpha", "1.0.0-beta", Ordering::Less)]
    #[case("1.0.0-BETA", "1.0.0-beta", Ordering::Equal)]
    #[case("1.0.0-beta.2", "1.0.0-beta.10", Ordering::Less)]
    #[case("1.0.0-beta", "1.0.0-beta.1", Ordering::Less)]
    #[case("1.0.0-1", "1.0.0-alpha", Ordering::Less)]
    #[case("1.0.0-rc.1", "1.0.0-beta.11", Ordering::Greater)]
    fn test_ordering(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        let a = Version::parse(a).unwrap();
        let b = Version::parse(b).unwrap();
        assert_eq!(a.cmp(&b), expected);
        assert_eq!(b.cmp(&a), expected.reverse());
    }

    #[test]
    fn test_prerelease_label() {
        let version = Version::parse("3.1.0-preview.2+abc").unwrap();
        assert!(version.is_prerelease());
        assert_eq!(version.prerelease().as_deref(), Some("preview.2"));
        assert!(!Version::parse("3.1.0").unwrap().is_prerelease());
    }

    #[test]
    fn test_lowercase() {
        assert_eq!(Version::parse("1.0.0-RC.1").unwrap().to_lowercase(), "1.0.0-rc.1");
    }

    #[test]
    fn test_error_kind() {
        let err = Version::parse("1.2.3.4.5").unwrap_err();
        assert_eq!(*err, ErrorKind::ComponentCount(5));
        let err = Version::parse("1.0.0-").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidLabel(_)));
    }
}
