//! Ranked per-feature explanations for a single score.

use serde::{Deserialize, Serialize};

use crate::model::{ExplanationKind, LoadedModel};
use crate::schema::FeatureVector;

/// One explained feature. Linear models fill `weight` and `contribution`;
/// importance-based models fill `importance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: String,
    pub value: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contribution: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f32>,
}

/// Top `top_k` features behind the score of `x`.
///
/// Linear models rank by `|weight * value|`; importance models rank by
/// `importance * |value|` and report the importance. Ties keep the lower
/// feature index first. Models with neither yield an empty list. Names
/// missing from `names` fall back to `f<index>`.
pub fn explain(
    model: &LoadedModel,
    x: &FeatureVector,
    names: &[String],
    top_k: usize,
) -> Vec<Contribution> {
    let classifier = model.classifier();
    let explained = match model.capabilities().explanation {
        Some(ExplanationKind::LinearWeights) => classifier
            .coefficients()
            .map(|w| linear_contributions(w, x, names, top_k)),
        Some(ExplanationKind::FeatureImportances) => classifier
            .feature_importances()
            .map(|imp| importance_contributions(imp, x, names, top_k)),
        None => None,
    };

    explained.unwrap_or_else(|| {
        tracing::debug!(model = model.name(), "no explanation available");
        Vec::new()
    })
}

fn feature_name(names: &[String], i: usize) -> String {
    names.get(i).cloned().unwrap_or_else(|| format!("f{i}"))
}

/// Indices sorted by descending `key`, stable on ties, truncated to `top_k`.
fn top_indices(keys: &[f32], top_k: usize) -> Vec<usize> {
    let mut idxs: Vec<usize> = (0..keys.len()).collect();
    idxs.sort_by(|&a, &b| keys[b].total_cmp(&keys[a]));
    idxs.truncate(top_k);
    idxs
}

fn linear_contributions(
    weights: &[f32],
    x: &FeatureVector,
    names: &[String],
    top_k: usize,
) -> Vec<Contribution> {
    let dim = weights.len().min(x.len());
    let contrib: Vec<f32> = (0..dim).map(|i| weights[i] * x[i]).collect();
    let magnitude: Vec<f32> = contrib.iter().map(|c| c.abs()).collect();

    top_indices(&magnitude, top_k)
        .into_iter()
        .map(|i| Contribution {
            feature: feature_name(names, i),
            value: x[i],
            weight: Some(weights[i]),
            contribution: Some(contrib[i]),
            importance: None,
        })
        .collect()
}

fn importance_contributions(
    importances: &[f32],
    x: &FeatureVector,
    names: &[String],
    top_k: usize,
) -> Vec<Contribution> {
    let dim = importances.len().min(x.len());
    let proxy: Vec<f32> = (0..dim).map(|i| importances[i] * x[i].abs()).collect();

    top_indices(&proxy, top_k)
        .into_iter()
        .map(|i| Contribution {
            feature: feature_name(names, i),
            value: x[i],
            weight: None,
            contribution: None,
            importance: Some(importances[i]),
        })
        .collect()
}
