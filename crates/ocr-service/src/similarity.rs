//! Ratcliff/Obershelp string similarity.
//!
//! `ratio` returns `2·M / T` where `T` is the total number of characters in
//! both strings and `M` the number of characters in the matching blocks found
//! by recursively taking the longest common substring. Two empty strings are
//! identical (`1.0`).

/// Similarity ratio of two strings in `[0, 1]`, compared by `char`
pub fn ratio(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f32 / total as f32
}

/// Fraction of positions holding the same character.
///
/// Returns `None` when the strings differ in length.
pub fn positional_ratio(a: &str, b: &str) -> Option<f32> {
    let len = a.chars().count();
    if len == 0 || len != b.chars().count() {
        return None;
    }
    let same = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();
    Some(same as f32 / len as f32)
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut ranges = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = ranges.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            ranges.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            ranges.push((i + k, ahi, j + k, bhi));
        }
    }

    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`.
///
/// Ties resolve to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];

    for i in alo..ahi {
        let mut cur = vec![0usize; width + 1];
        for j in blo..bhi {
            if a[i] == b[j] {
                let k = prev[j - blo] + 1;
                cur[j - blo + 1] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            }
        }
        prev = cur;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_ratio_of_identical_and_disjoint_strings() {
        assert!(close(ratio("AB-123", "AB-123"), 1.0));
        assert!(close(ratio("abc", "xyz"), 0.0));
        assert!(close(ratio("", ""), 1.0));
        assert!(close(ratio("abc", ""), 0.0));
    }

    #[test]
    fn test_ratio_counts_recursive_blocks() {
        // "abcd" / "bcda": longest block "bcd" (3), nothing left on either side
        assert!(close(ratio("abcd", "bcda"), 0.75));
        // "AB-123" / "AB-128": block "AB-12" (5) => 10 / 12
        assert!(close(ratio("AB-123", "AB-128"), 10.0 / 12.0));
        // blocks on both sides of the longest match are counted
        assert!(close(ratio("xAByCD", "zABwCD"), 8.0 / 12.0));
    }

    #[test]
    fn test_positional_ratio_requires_equal_length() {
        assert_eq!(positional_ratio("ABC", "ABD"), Some(2.0 / 3.0));
        assert_eq!(positional_ratio("ABC", "AB"), None);
        assert_eq!(positional_ratio("", ""), None);
    }
}
