//! String-level comparison with graceful degradation.
//!
//! Callers mostly hold versions as strings (file names, manifest values, URL
//! segments). These helpers parse on the fly and, when a string is not a
//! valid version, fall back to case-insensitive lexical ordering instead of
//! failing the whole listing. The fallback is reported through
//! [`Outcome::degraded`] so callers can log it.

use crate::Version;
use std::cmp::Ordering;

/// A result that may have been computed with the lexical fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    /// `true` if at least one input failed to parse.
    pub degraded: bool,
}
impl<T> Outcome<T> {
    fn exact(value: T) -> Self {
        Self { value, degraded: false }
    }

    fn degraded(value: T) -> Self {
        Self { value, degraded: true }
    }
}

fn lexical(a: &str, b: &str) -> Ordering {
    a.chars().flat_map(char::to_lowercase).cmp(b.chars().flat_map(char::to_lowercase))
}

/// Whether a version string denotes a prerelease.
///
/// Any hyphen counts, parsed or not:
///
/// ```
/// assert!(nupack_version::is_prerelease("2.0.0-beta"));
/// assert!(!nupack_version::is_prerelease("2.0.0"));
/// ```
pub fn is_prerelease(version: &str) -> bool {
    version.contains('-')
}

/// Compare two version strings.
///
/// ```
/// use std::cmp::Ordering;
/// use nupack_version::compare;
///
/// assert_eq!(compare("1.0.0", "2.0.0-beta").value, Ordering::Less);
/// assert!(!compare("1.0.0", "2.0.0-beta").degraded);
///
/// let fallback = compare("nightly", "1.0.0");
/// assert!(fallback.degraded);
/// assert_eq!(fallback.value, Ordering::Greater);
/// ```
pub fn compare(a: &str, b: &str) -> Outcome<Ordering> {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => Outcome::exact(a.cmp(&b)),
        _ => Outcome::degraded(lexical(a, b)),
    }
}

/// `lower <= version <= upper`, using [`compare`] for both bounds.
pub fn in_range(version: &str, lower: &str, upper: &str) -> Outcome<bool> {
    let low = compare(version, lower);
    let high = compare(version, upper);
    Outcome {
        value: low.value != Ordering::Less && high.value != Ordering::Greater,
        degraded: low.degraded || high.degraded,
    }
}

/// Sort items ascending by the version string that `key` extracts.
///
/// Mixing parsed and lexical comparisons inside one sort does not give a
/// total order, so if any key fails to parse the whole slice is ordered
/// lexically instead and the outcome is marked degraded.
pub fn sort_versions<T>(items: &mut [T], key: impl Fn(&T) -> &str) -> Outcome<()> {
    if items.iter().all(|item| Version::parse(key(item)).is_ok()) {
        // Every key parses, so the cached keys are all `Some`.
        items.sort_by_cached_key(|item| Version::parse(key(item)).ok());
        return Outcome::exact(());
    }
    tracing::debug!(count = items.len(), "Unparseable version in listing; ordering lexically");
    items.sort_by(|a, b| lexical(key(a), key(b)));
    Outcome::degraded(())
}

/// The item with the highest version, under the same rules as [`sort_versions`].
pub fn max_version<T>(items: impl IntoIterator<Item = T>, key: impl Fn(&T) -> &str) -> Outcome<Option<T>> {
    let mut items = items.into_iter().collect::<Vec<_>>();
    let outcome = sort_versions(&mut items, &key);
    Outcome { value: items.pop(), degraded: outcome.degraded }
}
