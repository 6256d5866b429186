//! Logits to ranked, labelled predictions.

use serde::{Deserialize, Serialize};

use crate::labels::LabelTable;

/// One ranked classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 1-based position, 1 being the most likely class.
    pub rank: usize,
    pub class_id: usize,
    pub label: String,
    pub prob: f32,
}

/// Numerically stable softmax over a flat score vector.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// The `k` highest scores as `(class_id, score)`, best first.
///
/// Equal scores keep ascending class order. Returns fewer than `k` entries
/// only when there are fewer than `k` scores.
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

/// Select the top `k` probabilities and attach ranks and labels.
pub fn decode(probs: &[f32], k: usize, labels: &LabelTable) -> Vec<Prediction> {
    top_k(probs, k)
        .into_iter()
        .enumerate()
        .map(|(i, (class_id, prob))| Prediction {
            rank: i + 1,
            class_id,
            label: labels.label(class_id),
            prob,
        })
        .collect()
}
