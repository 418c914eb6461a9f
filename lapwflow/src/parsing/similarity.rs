//! Normalized indel similarity between two strings.

/// Returns `2·LCS(a, b) / (|a| + |b|)` as a rounded percentage.
///
/// Lengths are counted in characters. Two empty strings are identical.
#[must_use]
pub fn similarity(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100;
    }
    let lcs = longest_common_subsequence(&a, &b);
    // Round half up on integers.
    let percent = (200 * lcs * 2 + total) / (2 * total);
    u8::try_from(percent).unwrap_or(100)
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut previous = vec![0_usize; b.len() + 1];
    let mut current = vec![0_usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                current[j].max(previous[j + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_and_disjoint() {
        assert_eq!(similarity("abc", "abc"), 100);
        assert_eq!(similarity("abc", "xyz"), 0);
        assert_eq!(similarity("", ""), 100);
        assert_eq!(similarity("abc", ""), 0);
    }

    #[test]
    fn test_partial_overlap() {
        // LCS("abcd", "abed") = 3, 2*3/8 = 75%
        assert_eq!(similarity("abcd", "abed"), 75);
    }

    #[test]
    fn test_symmetric() {
        let a = ":WAR : VK-COUL not well converged";
        let b = "VK-COUL not well converged: Increase GMAX or decrease NCON";
        assert_eq!(similarity(a, b), similarity(b, a));
    }

    #[test]
    fn test_init_lapw_status_line() {
        assert_eq!(similarity("> init_lapw finished ok", "init_lapw finished ok"), 95);
        assert!(similarity("stop error", "init_lapw finished ok") < 50);
    }
}
