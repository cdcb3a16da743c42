//! Label similarity.
//!
//! The composite score is the maximum of two metric families: Jaro-Winkler
//! (edit-based) and I-Sub (substring-based, Stoilos et al. 2005). Both work on
//! Unicode scalar values on both sides.

/// Scores a pair of labels.
///
/// Implementations must be pure and return values in `[0.0, 1.0]`; workers
/// call them concurrently without synchronization.
pub trait LabelScorer: Send + Sync {
    /// Similarity of two labels.
    fn score(&self, a: &str, b: &str) -> f64;
}

impl<F> LabelScorer for F
where
    F: Fn(&str, &str) -> f64 + Send + Sync,
{
    fn score(&self, a: &str, b: &str) -> f64 {
        self(a, b)
    }
}

/// `max(jaro_winkler, isub)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompositeScorer;

impl LabelScorer for CompositeScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        label_similarity(a, b)
    }
}

/// Composite label similarity in `[0.0, 1.0]`.
///
/// Empty input on either side scores `0.0`.
///
/// # Examples
///
/// ```
/// use lexalign::similarity::label_similarity;
///
/// assert_eq!(label_similarity("heart", "heart"), 1.0);
/// assert_eq!(label_similarity("", "heart"), 0.0);
/// assert!(label_similarity("cardiac muscle", "cardiac_muscle") > 0.9);
/// ```
#[must_use]
pub fn label_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    // Canonical order keeps greedy tie-breaking from breaking symmetry.
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    jaro_winkler(a, b).max(isub(a, b)).clamp(0.0, 1.0)
}

/// Jaro-Winkler similarity (prefix scale 0.1, prefix capped at 4).
#[must_use]
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(a, b)
}

const ISUB_HAMACHER_P: f64 = 0.6;
const WINKLER_PREFIX_CAP: usize = 4;
const WINKLER_SCALE: f64 = 0.1;

/// I-Sub similarity rescaled from `[-1, 1]` to `[0, 1]`.
///
/// Case-insensitive; `.`, `_` and spaces are ignored when looking for common
/// substrings. Only common substrings longer than two characters count.
#[must_use]
pub fn isub(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut s1 = isub_normalize(a);
    let mut s2 = isub_normalize(b);
    let len1 = s1.len();
    let len2 = s2.len();

    if len1 == 0 && len2 == 0 {
        return 1.0;
    }
    if len1 == 0 || len2 == 0 {
        return 0.0;
    }

    let mut common = 0usize;
    loop {
        let Some((start1, start2, best)) = longest_common_substring(&s1, &s2) else {
            break;
        };
        s1.drain(start1..start1 + best);
        s2.drain(start2..start2 + best);
        if best <= 2 {
            break;
        }
        common += best;
        if s1.is_empty() || s2.is_empty() {
            break;
        }
    }

    let l1 = len1 as f64;
    let l2 = len2 as f64;
    let common = common as f64;

    let commonality = 2.0 * common / (l1 + l2);
    let winkler = winkler_improvement(a, b, commonality);

    let unmatched1 = (l1 - common).max(0.0) / l1;
    let unmatched2 = (l2 - common).max(0.0) / l2;
    let sum = unmatched1 + unmatched2;
    let product = unmatched1 * unmatched2;
    let dissimilarity = if sum - product == 0.0 {
        0.0
    } else {
        product / (ISUB_HAMACHER_P + (1.0 - ISUB_HAMACHER_P) * (sum - product))
    };

    let raw = commonality - dissimilarity + winkler;
    ((raw + 1.0) / 2.0).clamp(0.0, 1.0)
}

fn isub_normalize(s: &str) -> Vec<char> {
    s.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | '_' | ' '))
        .collect()
}

/// First-found longest common substring: `(start in s1, start in s2, length)`.
///
/// Returns `None` when the strings share no character.
fn longest_common_substring(s1: &[char], s2: &[char]) -> Option<(usize, usize, usize)> {
    let mut best = 0usize;
    let mut found = (0usize, 0usize);

    for i in 0..s1.len() {
        if s1.len() - i <= best {
            break;
        }
        let mut j = 0usize;
        while s2.len() - j > best {
            let mut k = i;
            while j < s2.len() && s1[k] != s2[j] {
                j += 1;
            }
            if j == s2.len() {
                break;
            }
            let p = j;
            j += 1;
            k += 1;
            while j < s2.len() && k < s1.len() && s1[k] == s2[j] {
                j += 1;
                k += 1;
            }
            if k - i > best {
                best = k - i;
                found = (i, p);
            }
        }
    }

    (best > 0).then_some((found.0, found.1, best))
}

fn winkler_improvement(a: &str, b: &str, commonality: f64) -> f64 {
    let prefix = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .take(WINKLER_PREFIX_CAP)
        .count();
    prefix as f64 * WINKLER_SCALE * (1.0 - commonality)
}

/// The best-scoring label combination of two label lists.
///
/// Returns `None` if either list is empty.
#[must_use]
pub fn best_label_pair<'a, S: LabelScorer + ?Sized>(
    scorer: &S,
    left: &'a [String],
    right: &'a [String],
) -> Option<LabelPairScore<'a>> {
    let mut best: Option<LabelPairScore<'a>> = None;
    for a in left {
        for b in right {
            let score = scorer.score(a, b);
            if best.as_ref().map_or(true, |cur| score > cur.score) {
                best = Some(LabelPairScore {
                    left: a,
                    right: b,
                    score,
                });
            }
        }
    }
    best
}

/// Score of one label combination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPairScore<'a> {
    /// Label of the source entity.
    pub left: &'a str,
    /// Label of the target entity.
    pub right: &'a str,
    /// Their similarity.
    pub score: f64,
}
