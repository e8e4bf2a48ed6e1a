//! PHP major version arithmetic for compatibility reports

use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

/// Every PHP major version a package can be reported compatible with
pub const PHP_MAJOR_VERSIONS: [&str; 14] = [
    "5.2", "5.3", "5.4", "5.5", "5.6", "7.0", "7.1", "7.2", "7.3", "7.4", "8.0", "8.1", "8.2", "8.3",
];

static OR_EARLIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)PHP (?:version )?(\d+\.\d+) (?:or|and) (?:earlier|lower|below)").unwrap()
});
static PRIOR_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:prior to|before|not present in) PHP (?:version )?(\d+\.\d+)(?: or| and)?(?: earlier| lower| below)?").unwrap()
});
static REMOVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:removed|forbidden|no longer supported)\b[^.]*?\b(?:since|in|as of) PHP (?:version )?(\d+\.\d+)").unwrap()
});

pub fn php_major_versions() -> Vec<String> {
    PHP_MAJOR_VERSIONS.iter().map(|v| v.to_string()).collect()
}

fn version_key(version: &str) -> (u32, u32) {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

fn compare(a: &str, b: &str) -> Ordering {
    version_key(a).cmp(&version_key(b))
}

fn known_where(pred: impl Fn(Ordering) -> bool, pivot: &str) -> Vec<String> {
    PHP_MAJOR_VERSIONS
        .iter()
        .filter(|v| pred(compare(v, pivot)))
        .map(|v| v.to_string())
        .collect()
}

/// Known versions a rule violation makes the code incompatible with.
///
/// Derived from the violation message: "PHP X or earlier" breaks every
/// version up to and including X, "prior to PHP X" / "not present in PHP
/// version X" breaks every version below X, and "removed / forbidden / no
/// longer supported since PHP X" breaks X and everything after it.
/// Deprecations alone break nothing.
pub fn breaks_versions(message: &str) -> Vec<String> {
    let mut broken = Vec::new();

    for caps in OR_EARLIER.captures_iter(message) {
        broken = merge_versions(&broken, &known_where(|o| o != Ordering::Greater, &caps[1]));
    }
    for caps in PRIOR_TO.captures_iter(message) {
        // "not present in PHP version X or earlier" is the inclusive form
        let matched = caps[0].to_ascii_lowercase();
        let inclusive = ["earlier", "lower", "below"].iter().any(|w| matched.ends_with(w));
        let pivot = &caps[1];
        let versions = if inclusive {
            known_where(|o| o != Ordering::Greater, pivot)
        } else {
            known_where(|o| o == Ordering::Less, pivot)
        };
        broken = merge_versions(&broken, &versions);
    }
    for caps in REMOVED.captures_iter(message) {
        broken = merge_versions(&broken, &known_where(|o| o != Ordering::Less, &caps[1]));
    }

    broken
}

/// Sorted union without duplicates
pub fn merge_versions(a: &[String], b: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = a.iter().chain(b).cloned().collect();
    merged.sort_by(|x, y| compare(x, y));
    merged.dedup();
    merged
}

/// `versions` minus `excluded`, keeping the order of `versions`
pub fn exclude_versions(versions: &[String], excluded: &[String]) -> Vec<String> {
    versions
        .iter()
        .filter(|v| !excluded.contains(v))
        .cloned()
        .collect()
}
