//! Version string comparison.

use std::cmp::Ordering;
use std::sync::Arc;

/// Caller-supplied comparator over two version strings (`self`, `other`).
pub type VersionComparator = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

const OCTETS: usize = 3;

/// Default comparison: exactly three dot-separated octets, each compared
/// numerically when both sides parse as integers and lexicographically otherwise.
///
/// If either side does not have exactly three octets the result is `Greater`,
/// so a manifest with an unrecognised version is treated as the newer one.
pub fn default_compare(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.split('.').collect();
    let right: Vec<&str> = b.split('.').collect();
    if left.len() != OCTETS || right.len() != OCTETS {
        return Ordering::Greater;
    }
    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l.trim().parse::<u64>(), r.trim().parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => l.cmp(r),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_octets_compare_numerically() {
        assert_eq!(default_compare("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(default_compare("1.0.0", "1.1.0"), Ordering::Less);
        assert_eq!(default_compare("2.0.3", "2.0.3"), Ordering::Equal);
    }

    #[test]
    fn non_numeric_octet_falls_back_to_lexicographic() {
        assert_eq!(default_compare("1.0.b", "1.0.a"), Ordering::Greater);
        assert_eq!(default_compare("1.0.1a", "1.0.1b"), Ordering::Less);
    }

    #[test]
    fn malformed_versions_compare_greater() {
        assert_eq!(default_compare("1.0", "1.0.0"), Ordering::Greater);
        assert_eq!(default_compare("1.0.0", "1.0.0.1"), Ordering::Greater);
        assert_eq!(default_compare("", ""), Ordering::Greater);
    }
}
