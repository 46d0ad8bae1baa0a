//! Semantic version validation for install versions.

use regex::Regex;
use std::{cmp::Ordering, sync::OnceLock};

// From https://semver.org/#is-there-a-suggested-regular-expression-regex-to-check-a-semver-string
const SEMVER_REGEX: &str = r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$";

/// Returns true if `version` is a valid semantic version, including pre-release and build
/// metadata.
pub fn is_valid(version: &str) -> bool {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(SEMVER_REGEX).expect("semver regex must compile"))
        .is_match(version)
}

/// Orders versions by their numeric release components, falling back to a lexical comparison
/// of the full strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    fn release(v: &str) -> Vec<u64> {
        v.split(['-', '+'])
            .next()
            .unwrap_or_default()
            .split('.')
            .map(|c| c.parse().unwrap_or(0))
            .collect()
    }

    release(a).cmp(&release(b)).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_release_prerelease_and_metadata() {
        for v in [
            "4.12.25",
            "4.14.0-0.nightly-2024-01-01-000000",
            "4.14.16+installerref-abcdef",
            "4.16.0-rc.1",
        ] {
            assert!(is_valid(v), "{v}");
        }
    }

    #[test]
    fn rejects_invalid_versions() {
        for v in ["", "4.14", "not-a-valid-version", "04.1.2", "4.1.2-"] {
            assert!(!is_valid(v), "{v}");
        }
    }

    #[test]
    fn compares_numerically() {
        let mut versions = vec!["4.9.2", "4.10.0", "4.10.0-rc.1", "4.2.10"];
        versions.sort_by(|a, b| compare(a, b));
        assert_eq!(versions, vec!["4.2.10", "4.9.2", "4.10.0", "4.10.0-rc.1"]);
    }
}
