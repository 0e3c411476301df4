//! Weighted random draws.
//!
//! The prize wheel needs a two-stage draw: first the prize *value* is chosen
//! by summed weight across every segment carrying that value, then one
//! segment among the tied entries is chosen by its individual weight. The
//! second stage exists so the caller learns which wheel segment lit up, not
//! just the value won.

use rand::Rng;

use crate::config::PrizeEntry;

/// Pick an index by weight. Returns `None` when no weight is positive.
pub fn weighted_pick<R: Rng + ?Sized>(rng: &mut R, weights: &[f64]) -> Option<usize> {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    let mut roll = rng.gen_range(0.0..total);
    for (idx, weight) in weights.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        if roll < *weight {
            return Some(idx);
        }
        roll -= weight;
    }
    // Float accumulation can leave roll a hair past the last bucket.
    weights.iter().rposition(|w| *w > 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrizeDraw {
    pub value: i64,
    /// Index into the configured prize table, i.e. the wheel segment.
    pub segment: usize,
}

pub fn draw_prize<R: Rng + ?Sized>(rng: &mut R, prizes: &[PrizeEntry]) -> Option<PrizeDraw> {
    // Stage one: distinct values weighted by their summed segment weights,
    // in first-appearance order.
    let mut values: Vec<i64> = Vec::new();
    let mut group_weights: Vec<f64> = Vec::new();
    for prize in prizes {
        match values.iter().position(|v| *v == prize.value) {
            Some(idx) => group_weights[idx] += prize.weight.max(0.0),
            None => {
                values.push(prize.value);
                group_weights.push(prize.weight.max(0.0));
            }
        }
    }
    let value = values[weighted_pick(rng, &group_weights)?];

    // Stage two: one segment among the entries sharing the drawn value.
    let tied: Vec<(usize, f64)> = prizes
        .iter()
        .enumerate()
        .filter(|(_, p)| p.value == value)
        .map(|(idx, p)| (idx, p.weight.max(0.0)))
        .collect();
    let tied_weights: Vec<f64> = tied.iter().map(|(_, w)| *w).collect();
    let segment = tied[weighted_pick(rng, &tied_weights)?].0;

    Some(PrizeDraw { value, segment })
}
