use std::collections::{BTreeSet, HashMap};

use super::{round3, Score, ORDER_CORRECTNESS};
use crate::domain::order::OrderLine;

/// Weights for the per-line comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    /// Weight for a case-insensitive name match (default: 0.40)
    pub name: f64,
    /// Weight for quantity closeness, `min/max` of the two quantities (default: 0.30)
    pub quantity: f64,
    /// Weight for modifier-set Jaccard similarity (default: 0.20)
    pub modifiers: f64,
    /// Weight for an exact size match (default: 0.10)
    pub size: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { name: 0.4, quantity: 0.3, modifiers: 0.2, size: 0.1 }
    }
}

impl ScoringWeights {
    /// Similarity of two lines in `[0.0, 1.0]` under these weights.
    pub fn line_score(&self, expected: &OrderLine, actual: &OrderLine) -> f64 {
        let mut score = 0.0;

        if expected.name.trim().eq_ignore_ascii_case(actual.name.trim()) {
            score += self.name;
        }

        let high = expected.quantity.max(actual.quantity);
        if high > 0 {
            score += self.quantity * f64::from(expected.quantity.min(actual.quantity)) / f64::from(high);
        }

        score += self.modifiers * modifier_jaccard(expected, actual);

        if expected.size == actual.size {
            score += self.size;
        }

        score
    }
}

fn modifier_jaccard(expected: &OrderLine, actual: &OrderLine) -> f64 {
    let left: BTreeSet<&str> = expected.modifiers.iter().map(|m| m.modifier_id.as_str()).collect();
    let right: BTreeSet<&str> = actual.modifiers.iter().map(|m| m.modifier_id.as_str()).collect();
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    shared as f64 / union as f64
}

pub fn order_correctness(expected: &[OrderLine], actual: &[OrderLine]) -> Score {
    order_correctness_with(expected, actual, &ScoringWeights::default())
}

/// Order-independent match of produced lines against expected lines.
///
/// Lines pair up by `item_id`; when several lines share an id, each expected
/// line takes the unclaimed candidate it is most similar to. Every pair and
/// every leftover line on either side is one slot.
pub fn order_correctness_with(
    expected: &[OrderLine],
    actual: &[OrderLine],
    weights: &ScoringWeights,
) -> Score {
    match (expected.is_empty(), actual.is_empty()) {
        (true, true) => return Score::new(ORDER_CORRECTNESS, 1.0, "Correctly added no items"),
        (true, false) => {
            return Score::new(
                ORDER_CORRECTNESS,
                0.0,
                format!("Expected no items but got: {}", names(actual)),
            )
        }
        (false, true) => {
            return Score::new(
                ORDER_CORRECTNESS,
                0.0,
                format!("Expected {} but order is empty", names(expected)),
            )
        }
        (false, false) => {}
    }

    let mut candidates: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, line) in actual.iter().enumerate() {
        candidates.entry(line.item_id.as_str()).or_default().push(index);
    }

    let mut claimed = vec![false; actual.len()];
    let mut total = 0.0;
    let mut slots = 0_usize;
    let mut details = Vec::new();

    for line in expected {
        slots += 1;
        let best = candidates
            .get(line.item_id.as_str())
            .into_iter()
            .flatten()
            .copied()
            .filter(|index| !claimed[*index])
            .map(|index| (index, weights.line_score(line, &actual[index])))
            .fold(None, |best: Option<(usize, f64)>, candidate| match best {
                Some((_, score)) if score >= candidate.1 => best,
                _ => Some(candidate),
            });

        match best {
            Some((index, score)) => {
                claimed[index] = true;
                total += score;
                details.push(format!("{}: {score:.2}/1.0", line.name));
            }
            None => details.push(format!("{}: MISSING from order", line.name)),
        }
    }

    for (line, _) in actual.iter().zip(&claimed).filter(|(_, claimed)| !**claimed) {
        slots += 1;
        details.push(format!("{}: UNEXPECTED in order", line.name));
    }

    Score::new(ORDER_CORRECTNESS, round3(total / slots as f64), details.join("; "))
}

fn names(lines: &[OrderLine]) -> String {
    let names: Vec<&str> = lines.iter().map(|line| line.name.as_str()).collect();
    format!("[{}]", names.join(", "))
}
