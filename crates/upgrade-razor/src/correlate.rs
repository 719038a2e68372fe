//! Pairing original sub-texts with their updated content.
//!
//! A code fix may delete mapped regions but never adds new ones, so there are
//! at most as many updated texts as originals. When some were deleted, every
//! placement of the missing slots is scored by character edit distance and
//! the cheapest placement wins.

use similar::{ChangeTag, TextDiff};

use crate::mapping::MappedSubText;
use crate::replacement::TextReplacement;

/// Upper bound on placements tried before falling back to positional pairing.
pub const MAX_ARRANGEMENTS: usize = 10_000;

/// Characters inserted plus characters deleted to turn `a` into `b`.
pub fn edit_distance(a: &str, b: &str) -> usize {
    TextDiff::from_chars(a, b)
        .iter_all_changes()
        .filter(|change| change.tag() != ChangeTag::Equal)
        .count()
}

/// Pair `originals` with `updated` and return the replacements that change
/// something.
///
/// # Panics
///
/// If `updated` is longer than `originals`.
pub fn correlate<S: AsRef<str>>(originals: &[MappedSubText], updated: &[S]) -> Vec<TextReplacement> {
    let n = originals.len();
    let m = updated.len();
    assert!(
        m <= n,
        "{m} updated sub-texts cannot be correlated with {n} originals"
    );

    let updated: Vec<&str> = updated.iter().map(AsRef::as_ref).collect();
    let paired = if m == n {
        updated
    } else if m == 0 {
        vec![""; n]
    } else {
        best_arrangement(originals, &updated)
    };

    originals
        .iter()
        .zip(paired)
        .map(|(original, updated)| TextReplacement::new(original.clone(), updated))
        .filter(|replacement| !replacement.is_noop())
        .collect()
}

/// Spread `updated` over `originals.len()` slots, leaving the rest empty.
fn best_arrangement<'a>(originals: &[MappedSubText], updated: &[&'a str]) -> Vec<&'a str> {
    let n = originals.len();
    let m = updated.len();
    let empty_slots = n - m;

    let arrangements = binomial(n, empty_slots);
    if arrangements > MAX_ARRANGEMENTS {
        tracing::warn!(
            originals = n,
            updated = m,
            arrangements,
            "Too many arrangements to score, pairing positionally"
        );
        return updated
            .iter()
            .copied()
            .chain(std::iter::repeat_n("", empty_slots))
            .collect();
    }

    let pair_cost: Vec<Vec<usize>> = originals
        .iter()
        .map(|o| updated.iter().map(|u| edit_distance(&o.text, u)).collect())
        .collect();
    let empty_cost: Vec<usize> = originals.iter().map(|o| o.text.chars().count()).collect();

    let score = |empty: &[usize]| -> usize {
        let mut next_updated = 0;
        let mut next_empty = empty.iter().peekable();
        (0..n)
            .map(|i| {
                if next_empty.next_if_eq(&&i).is_some() {
                    empty_cost[i]
                } else {
                    next_updated += 1;
                    pair_cost[i][next_updated - 1]
                }
            })
            .sum()
    };

    let mut combinations = Combinations::new(n, empty_slots);
    let mut best = combinations.current().to_vec();
    let mut best_score = score(&best);
    while let Some(empty) = combinations.advance() {
        let candidate = score(empty);
        if candidate < best_score {
            best_score = candidate;
            best = empty.to_vec();
        }
    }
    tracing::trace!(?best, best_score, "Chose arrangement");

    let mut remaining = updated.iter().copied();
    (0..n)
        .map(|i| {
            if best.contains(&i) {
                ""
            } else {
                remaining.next().unwrap_or("")
            }
        })
        .collect()
}

/// `n` choose `k`, saturating at `usize::MAX`.
fn binomial(n: usize, k: usize) -> usize {
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 1..=k {
        result = result * (n - k + i) as u128 / i as u128;
        if result > usize::MAX as u128 {
            return usize::MAX;
        }
    }
    result as usize
}

/// `k`-subsets of `0..n` in lexicographic order.
struct Combinations {
    n: usize,
    indices: Vec<usize>,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
        }
    }

    fn current(&self) -> &[usize] {
        &self.indices
    }

    fn advance(&mut self) -> Option<&[usize]> {
        let k = self.indices.len();
        let i = (0..k).rev().find(|&i| self.indices[i] < self.n - k + i)?;
        self.indices[i] += 1;
        for j in i + 1..k {
            self.indices[j] = self.indices[j - 1] + 1;
        }
        Some(&self.indices)
    }
}
