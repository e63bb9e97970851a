//! Per-point probability math applied to interpolated logits.

use crate::ClassIndex;

/// Numerically stable softmax over one logit vector, in place.
pub fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f64;
    for value in values.iter_mut() {
        let e = ((*value - max) as f64).exp();
        *value = e as f32;
        sum += e;
    }
    if sum > 0.0 {
        for value in values.iter_mut() {
            *value = (*value as f64 / sum) as f32;
        }
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let mut probabilities = logits.to_vec();
    softmax_in_place(&mut probabilities);
    probabilities
}

/// Index of the largest value. The first maximum wins on ties.
pub fn argmax(values: &[f32]) -> Option<ClassIndex> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index as ClassIndex)
}

/// Shannon entropy in nats. Zero probabilities contribute nothing.
pub fn entropy(probabilities: &[f32]) -> f64 {
    probabilities
        .iter()
        .map(|&p| p as f64)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.ln())
        .sum()
}
