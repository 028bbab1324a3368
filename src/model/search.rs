//! Randomized hyperparameter search scored by negative mean squared error
//! under contiguous k-fold cross-validation. Chronological order is kept
//! throughout; no shuffling of rows ever happens here.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::boosting::{BoostParams, BoostedTrees};
use super::forest::{ForestParams, MaxFeatures, RandomForest};
use super::metrics::mean_squared_error;

#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    /// Random parameter draws per base learner.
    pub iterations: usize,
    pub folds: usize,
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iterations: 20,
            folds: 3,
            seed: 42,
        }
    }
}

const BOOST_N_TREES: [usize; 4] = [50, 100, 200, 300];
const BOOST_LEARNING_RATE: [f64; 4] = [0.01, 0.05, 0.1, 0.2];
const BOOST_MAX_DEPTH: [usize; 4] = [3, 5, 7, 10];
const BOOST_SUBSAMPLE: [f64; 3] = [0.6, 0.8, 1.0];
const BOOST_COLSAMPLE: [f64; 3] = [0.6, 0.8, 1.0];
const BOOST_LAMBDA: [f64; 3] = [0.1, 1.0, 10.0];

const FOREST_N_TREES: [usize; 4] = [50, 100, 200, 300];
const FOREST_MAX_DEPTH: [usize; 4] = [10, 20, 30, 40];
const FOREST_MIN_SPLIT: [usize; 3] = [2, 5, 10];
const FOREST_MIN_LEAF: [usize; 3] = [1, 2, 4];
const FOREST_MAX_FEATURES: [MaxFeatures; 3] =
    [MaxFeatures::All, MaxFeatures::Sqrt, MaxFeatures::Log2];
const FOREST_BOOTSTRAP: [bool; 2] = [true, false];

/// Contiguous fold boundaries: fold i owns rows [i*size, (i+1)*size)
/// with the final fold absorbing the remainder.
pub fn fold_bounds(n: usize, folds: usize) -> Vec<(usize, usize)> {
    if n < 2 {
        return Vec::new();
    }
    let folds = folds.max(2).min(n);
    let size = n / folds;
    (0..folds)
        .map(|i| {
            let start = i * size;
            let end = if i == folds - 1 { n } else { start + size };
            (start, end)
        })
        .collect()
}

fn cv_score<F>(x: &[Vec<f64>], y: &[f64], folds: usize, fit_predict: F) -> f64
where
    F: Fn(&[Vec<f64>], &[f64], &[Vec<f64>]) -> Vec<f64>,
{
    let mut total = 0.0;
    let bounds = fold_bounds(x.len(), folds);
    for &(start, end) in &bounds {
        let mut train_x: Vec<Vec<f64>> = Vec::with_capacity(x.len() - (end - start));
        let mut train_y: Vec<f64> = Vec::with_capacity(x.len() - (end - start));
        for i in (0..start).chain(end..x.len()) {
            train_x.push(x[i].clone());
            train_y.push(y[i]);
        }
        let test_x = &x[start..end];
        let test_y = &y[start..end];

        let preds = fit_predict(&train_x, &train_y, test_x);
        total += mean_squared_error(test_y, &preds);
    }
    // Negative MSE: higher is better.
    -(total / bounds.len() as f64)
}

pub fn tune_boost(x: &[Vec<f64>], y: &[f64], config: &SearchConfig) -> BoostParams {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut best_params = BoostParams {
        seed: config.seed,
        ..Default::default()
    };
    let mut best_score = f64::NEG_INFINITY;

    for draw in 0..config.iterations {
        let candidate = BoostParams {
            n_trees: *choose(&BOOST_N_TREES, &mut rng),
            learning_rate: *choose(&BOOST_LEARNING_RATE, &mut rng),
            max_depth: *choose(&BOOST_MAX_DEPTH, &mut rng),
            subsample: *choose(&BOOST_SUBSAMPLE, &mut rng),
            colsample: *choose(&BOOST_COLSAMPLE, &mut rng),
            lambda: *choose(&BOOST_LAMBDA, &mut rng),
            seed: config.seed,
        };

        let score = cv_score(x, y, config.folds, |train_x, train_y, test_x| {
            let mut model = BoostedTrees::new(candidate.clone());
            model.fit(train_x, train_y);
            model.predict(test_x)
        });

        debug!(draw, score, ?candidate, "boost candidate scored");
        if score > best_score {
            best_score = score;
            best_params = candidate;
        }
    }

    best_params
}

pub fn tune_forest(x: &[Vec<f64>], y: &[f64], config: &SearchConfig) -> ForestParams {
    // Offset keeps the forest's draw sequence independent of the booster's.
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(1));
    let mut best_params = ForestParams {
        seed: config.seed,
        ..Default::default()
    };
    let mut best_score = f64::NEG_INFINITY;

    for draw in 0..config.iterations {
        let candidate = ForestParams {
            n_trees: *choose(&FOREST_N_TREES, &mut rng),
            max_depth: *choose(&FOREST_MAX_DEPTH, &mut rng),
            min_samples_split: *choose(&FOREST_MIN_SPLIT, &mut rng),
            min_samples_leaf: *choose(&FOREST_MIN_LEAF, &mut rng),
            max_features: *choose(&FOREST_MAX_FEATURES, &mut rng),
            bootstrap: *choose(&FOREST_BOOTSTRAP, &mut rng),
            seed: config.seed,
        };

        let score = cv_score(x, y, config.folds, |train_x, train_y, test_x| {
            let mut model = RandomForest::new(candidate.clone());
            model.fit(train_x, train_y);
            test_x.iter().map(|row| model.predict_one(row)).collect()
        });

        debug!(draw, score, ?candidate, "forest candidate scored");
        if score > best_score {
            best_score = score;
            best_params = candidate;
        }
    }

    best_params
}

fn choose<'a, T, R: rand::Rng>(options: &'a [T], rng: &mut R) -> &'a T {
    options.choose(rng).expect("non-empty option grid")
}
