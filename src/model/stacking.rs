//! Stacked ensemble: a linear meta-model over the two tuned base learners.
//! The meta-model is fit on out-of-fold base predictions so the training
//! labels never leak into their own meta inputs.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::boosting::{BoostParams, BoostedTrees};
use super::forest::{ForestParams, RandomForest};
use super::search::fold_bounds;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearMeta {
    pub intercept: f64,
    pub boost_weight: f64,
    pub forest_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackedEnsemble {
    boost: BoostedTrees,
    forest: RandomForest,
    meta: LinearMeta,
}

impl StackedEnsemble {
    /// Fit both base learners and the meta-model on the training split.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        boost_params: BoostParams,
        forest_params: ForestParams,
        folds: usize,
    ) -> Self {
        let n = x.len();
        let mut oof_boost = vec![f64::NAN; n];
        let mut oof_forest = vec![f64::NAN; n];

        for &(start, end) in &fold_bounds(n, folds) {
            let mut train_x: Vec<Vec<f64>> = Vec::with_capacity(n - (end - start));
            let mut train_y: Vec<f64> = Vec::with_capacity(n - (end - start));
            for i in (0..start).chain(end..n) {
                train_x.push(x[i].clone());
                train_y.push(y[i]);
            }

            let mut fold_boost = BoostedTrees::new(boost_params.clone());
            fold_boost.fit(&train_x, &train_y);
            let mut fold_forest = RandomForest::new(forest_params.clone());
            fold_forest.fit(&train_x, &train_y);

            for i in start..end {
                oof_boost[i] = fold_boost.predict_one(&x[i]);
                oof_forest[i] = fold_forest.predict_one(&x[i]);
            }
        }

        let meta = fit_meta(&oof_boost, &oof_forest, y);

        // Base learners are refit on the full training split for inference.
        let mut boost = BoostedTrees::new(boost_params);
        boost.fit(x, y);
        let mut forest = RandomForest::new(forest_params);
        forest.fit(x, y);

        Self {
            boost,
            forest,
            meta,
        }
    }

    /// Pure, side-effect-free prediction for one feature row.
    pub fn predict_one(&self, features: &[f64]) -> f64 {
        self.meta.intercept
            + self.meta.boost_weight * self.boost.predict_one(features)
            + self.meta.forest_weight * self.forest.predict_one(features)
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }

    pub fn meta(&self) -> &LinearMeta {
        &self.meta
    }

    pub fn boost_params(&self) -> &BoostParams {
        self.boost.params()
    }

    pub fn forest_params(&self) -> &ForestParams {
        self.forest.params()
    }
}

/// Largest coefficient magnitude still considered a sane blend. Base
/// learners that agree too closely make the normal equations
/// ill-conditioned and blow the weights up.
const MAX_META_COEF: f64 = 25.0;

/// Ordinary least squares for y ~ intercept + a*p1 + b*p2, solved from the
/// 3x3 normal equations. A singular or ill-conditioned system (collinear
/// base predictions) falls back to an even blend.
fn fit_meta(p1: &[f64], p2: &[f64], y: &[f64]) -> LinearMeta {
    let n = y.len() as f64;
    let s1: f64 = p1.iter().sum();
    let s2: f64 = p2.iter().sum();
    let sy: f64 = y.iter().sum();
    let s11: f64 = p1.iter().map(|v| v * v).sum();
    let s22: f64 = p2.iter().map(|v| v * v).sum();
    let s12: f64 = p1.iter().zip(p2.iter()).map(|(a, b)| a * b).sum();
    let s1y: f64 = p1.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
    let s2y: f64 = p2.iter().zip(y.iter()).map(|(a, b)| a * b).sum();

    let a = [[n, s1, s2], [s1, s11, s12], [s2, s12, s22]];
    let b = [sy, s1y, s2y];

    match solve_3x3(a, b) {
        Some([intercept, boost_weight, forest_weight])
            if boost_weight.abs() <= MAX_META_COEF && forest_weight.abs() <= MAX_META_COEF =>
        {
            LinearMeta {
                intercept,
                boost_weight,
                forest_weight,
            }
        }
        _ => {
            warn!("degenerate meta-model system; falling back to even blend");
            LinearMeta {
                intercept: 0.0,
                boost_weight: 0.5,
                forest_weight: 0.5,
            }
        }
    }
}

fn solve_3x3(a: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    let det = det_3x3(&a);
    if det.abs() < 1e-12 || !det.is_finite() {
        return None;
    }
    let mut out = [0.0; 3];
    for (col, slot) in out.iter_mut().enumerate() {
        let mut m = a;
        for row in 0..3 {
            m[row][col] = b[row];
        }
        *slot = det_3x3(&m) / det;
    }
    if out.iter().all(|v| v.is_finite()) {
        Some(out)
    } else {
        None
    }
}

fn det_3x3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn meta_recovers_exact_linear_combination() {
        let p1: Vec<f64> = (0..50).map(|i| i as f64 / 10.0).collect();
        let p2: Vec<f64> = (0..50).map(|i| ((i as f64) / 5.0).sin()).collect();
        let y: Vec<f64> = p1
            .iter()
            .zip(p2.iter())
            .map(|(a, b)| 0.3 + 0.6 * a + 0.4 * b)
            .collect();

        let meta = fit_meta(&p1, &p2, &y);
        assert_relative_eq!(meta.intercept, 0.3, epsilon = 1e-9);
        assert_relative_eq!(meta.boost_weight, 0.6, epsilon = 1e-9);
        assert_relative_eq!(meta.forest_weight, 0.4, epsilon = 1e-9);
    }

    #[test]
    fn collinear_predictions_fall_back_to_even_blend() {
        let p1 = vec![1.0; 10];
        let p2 = vec![1.0; 10];
        let y = vec![2.0; 10];
        let meta = fit_meta(&p1, &p2, &y);
        assert_relative_eq!(meta.boost_weight, 0.5);
        assert_relative_eq!(meta.forest_weight, 0.5);
    }

    #[test]
    fn stacked_fit_tracks_a_simple_trend() {
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64 / 10.0]).collect();
        let y: Vec<f64> = x.iter().map(|row| 0.5 * row[0]).collect();

        let ensemble = StackedEnsemble::fit(
            &x,
            &y,
            BoostParams {
                n_trees: 20,
                max_depth: 3,
                ..Default::default()
            },
            ForestParams {
                n_trees: 10,
                ..Default::default()
            },
            3,
        );

        assert!(ensemble.predict_one(&[1.0]) < ensemble.predict_one(&[5.0]));
    }
}
