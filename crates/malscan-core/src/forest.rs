//! Random forest over flat, pre-order node arrays.
//!
//! Each tree stores parallel arrays indexed by node id. A node is a leaf
//! when `left[i] == -1`; otherwise samples with `x[feature[i]] <= threshold[i]`
//! go left. `value[i]` holds the positive-class fraction at the node.
//! Children always have a larger id than their parent, so traversal ends.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{MalscanError, Result};
use crate::model::{Classifier, OutputKind};

const LEAF: i32 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub left: Vec<i32>,
    pub right: Vec<i32>,
    pub feature: Vec<i32>,
    pub threshold: Vec<f32>,
    pub value: Vec<f32>,
}

impl DecisionTree {
    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        let n = self.left.len();
        if n == 0 {
            return Err("tree has no nodes".into());
        }
        if [
            self.right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.value.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err("tree node arrays differ in length".into());
        }

        for i in 0..n {
            let (l, r) = (self.left[i], self.right[i]);
            if l == LEAF {
                if r != LEAF {
                    return Err(format!("node {i} has only one child"));
                }
                if !(0.0..=1.0).contains(&self.value[i]) {
                    return Err(format!("leaf {i} value is not a probability"));
                }
                continue;
            }
            for child in [l, r] {
                if child <= i as i32 || child as usize >= n {
                    return Err(format!("node {i} has invalid child {child}"));
                }
            }
            if self.feature[i] < 0 || self.feature[i] as usize >= n_features {
                return Err(format!("node {i} splits on unknown feature {}", self.feature[i]));
            }
        }
        Ok(())
    }

    /// Positive-class fraction at the leaf `x` falls into.
    fn leaf_value(&self, x: &ArrayView1<'_, f32>) -> f32 {
        let mut node = 0usize;
        while self.left[node] != LEAF {
            let f = self.feature[node] as usize;
            node = if x[f] <= self.threshold[node] {
                self.left[node] as usize
            } else {
                self.right[node] as usize
            };
        }
        self.value[node]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
    #[serde(default)]
    pub feature_importances: Option<Vec<f32>>,
}

impl RandomForest {
    /// Structural checks run once at load so prediction can index freely.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".into());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("tree {t}: {e}"))?;
        }
        if let Some(imp) = &self.feature_importances {
            if imp.len() != self.n_features {
                return Err(format!(
                    "{} feature importances for {} features",
                    imp.len(),
                    self.n_features
                ));
            }
        }
        Ok(())
    }
}

impl Classifier for RandomForest {
    fn kind(&self) -> &str {
        "random_forest"
    }

    fn output(&self) -> Option<OutputKind> {
        Some(OutputKind::Probability)
    }

    /// Mean of the trees' leaf probabilities.
    fn predict_proba(&self, x: ArrayView1<'_, f32>) -> Result<f64> {
        if x.len() != self.n_features {
            return Err(MalscanError::DimensionMismatch {
                expected: self.n_features,
                actual: x.len(),
            });
        }
        let total: f64 = self.trees.iter().map(|t| t.leaf_value(&x) as f64).sum();
        Ok(total / self.trees.len() as f64)
    }

    fn feature_importances(&self) -> Option<&[f32]> {
        self.feature_importances.as_deref()
    }
}
