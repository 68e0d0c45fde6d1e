//! Linear classifiers: logistic regression and linear SVM.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{MalscanError, Result};
use crate::model::{sigmoid, Classifier, OutputKind};

/// Weight vector plus intercept, as exported from a fitted linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coef: Vec<f32>,
    #[serde(default)]
    pub intercept: f32,
}

impl LinearModel {
    /// `w · x + b`, accumulated in f64.
    pub fn margin(&self, x: ArrayView1<'_, f32>) -> Result<f64> {
        if x.len() != self.coef.len() {
            return Err(MalscanError::DimensionMismatch {
                expected: self.coef.len(),
                actual: x.len(),
            });
        }
        let mut sum = self.intercept as f64;
        for (w, v) in self.coef.iter().zip(x.iter()) {
            sum += *w as f64 * *v as f64;
        }
        Ok(sum)
    }
}

#[derive(Debug, Clone)]
pub struct LinearClassifier {
    model: LinearModel,
    output: OutputKind,
}

impl LinearClassifier {
    /// Logistic regression: probability = sigmoid(margin).
    pub fn logistic(model: LinearModel) -> std::result::Result<Self, String> {
        Self::checked(model, OutputKind::Probability)
    }

    /// Linear SVM: only a decision score is available.
    pub fn svm(model: LinearModel) -> std::result::Result<Self, String> {
        Self::checked(model, OutputKind::DecisionScore)
    }

    fn checked(model: LinearModel, output: OutputKind) -> std::result::Result<Self, String> {
        if model.coef.is_empty() {
            return Err("linear model has no coefficients".into());
        }
        if let Some(i) = model.coef.iter().position(|w| !w.is_finite()) {
            return Err(format!("coefficient {i} is not finite"));
        }
        if !model.intercept.is_finite() {
            return Err("intercept is not finite".into());
        }
        Ok(Self { model, output })
    }
}

impl Classifier for LinearClassifier {
    fn kind(&self) -> &str {
        match self.output {
            OutputKind::Probability => "logistic_regression",
            OutputKind::DecisionScore => "linear_svm",
        }
    }

    fn output(&self) -> Option<OutputKind> {
        Some(self.output)
    }

    fn predict_proba(&self, x: ArrayView1<'_, f32>) -> Result<f64> {
        match self.output {
            OutputKind::Probability => Ok(sigmoid(self.model.margin(x)?)),
            OutputKind::DecisionScore => {
                Err(MalscanError::UnsupportedModelKind(self.kind().to_string()))
            }
        }
    }

    fn decision_function(&self, x: ArrayView1<'_, f32>) -> Result<f64> {
        self.model.margin(x)
    }

    fn coefficients(&self) -> Option<&[f32]> {
        Some(&self.model.coef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn lm(coef: Vec<f32>, intercept: f32) -> LinearModel {
        LinearModel { coef, intercept }
    }

    #[test]
    fn margin_includes_intercept() {
        let m = lm(vec![2.0, -1.0], 0.5);
        assert_eq!(m.margin(array![1.0, 3.0].view()).unwrap(), -0.5);
    }

    #[test]
    fn wrong_dimension_is_an_error() {
        let m = lm(vec![1.0, 1.0], 0.0);
        let err = m.margin(array![1.0].view()).unwrap_err();
        assert!(matches!(
            err,
            MalscanError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn logistic_probability() {
        let clf = LinearClassifier::logistic(lm(vec![1.0], 0.0)).unwrap();
        let p = clf.predict_proba(array![2.0].view()).unwrap();
        assert!((p - 0.880_797).abs() < 1e-6);
    }

    #[test]
    fn svm_has_no_probability() {
        let clf = LinearClassifier::svm(lm(vec![1.0], 0.0)).unwrap();
        assert_eq!(clf.output(), Some(OutputKind::DecisionScore));
        assert!(clf.predict_proba(array![2.0].view()).is_err());
        assert_eq!(clf.decision_function(array![2.0].view()).unwrap(), 2.0);
    }

    #[test]
    fn empty_or_non_finite_weights_are_rejected() {
        assert!(LinearClassifier::logistic(lm(vec![], 0.0)).is_err());
        assert!(LinearClassifier::logistic(lm(vec![f32::NAN], 0.0)).is_err());
        assert!(LinearClassifier::svm(lm(vec![1.0], f32::INFINITY)).is_err());
    }
}
