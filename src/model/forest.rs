//! Random forest of regression trees, fit in parallel.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::{RegressionTree, TreeParams};

/// Feature subsampling rule per split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
        };
        n.clamp(1, n_features)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) {
        let n_features = x.first().map(|row| row.len()).unwrap_or(0);
        let max_features = self.params.max_features.resolve(n_features);

        self.trees = (0..self.params.n_trees)
            .into_par_iter()
            .map(|i| {
                let tree_seed = self.params.seed.wrapping_add(i as u64);
                let tree_params = TreeParams {
                    max_depth: self.params.max_depth,
                    min_samples_split: self.params.min_samples_split,
                    min_samples_leaf: self.params.min_samples_leaf,
                    max_features: Some(max_features),
                    leaf_lambda: 0.0,
                    seed: tree_seed,
                };
                let mut tree = RegressionTree::new(tree_params);

                if self.params.bootstrap {
                    let (bx, by) = bootstrap_sample(x, y, tree_seed);
                    tree.fit(&bx, &by);
                } else {
                    tree.fit(x, y);
                }
                tree
            })
            .collect();
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_one(features)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.par_iter().map(|row| self.predict_one(row)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn bootstrap_sample(x: &[Vec<f64>], y: &[f64], seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
    let n = x.len();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut bx = Vec::with_capacity(n);
    let mut by = Vec::with_capacity(n);
    for _ in 0..n {
        let i = rng.gen_range(0..n);
        bx.push(x[i].clone());
        by.push(y[i]);
    }
    (bx, by)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_linear(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![i as f64 / 20.0, ((i as f64) / 10.0).sin()])
            .collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, row)| row[0] + 2.0 * row[1] + 0.1 * (i % 5) as f64)
            .collect();
        (x, y)
    }

    #[test]
    fn fits_requested_number_of_trees() {
        let (x, y) = noisy_linear(200);
        let mut forest = RandomForest::new(ForestParams {
            n_trees: 10,
            max_depth: 5,
            ..Default::default()
        });
        forest.fit(&x, &y);
        assert_eq!(forest.n_trees(), 10);
    }

    #[test]
    fn tracks_the_underlying_trend() {
        let (x, y) = noisy_linear(200);
        let mut forest = RandomForest::new(ForestParams {
            n_trees: 20,
            ..Default::default()
        });
        forest.fit(&x, &y);

        // Low-x rows should predict lower than high-x rows.
        assert!(forest.predict_one(&x[5]) < forest.predict_one(&x[195]));
    }

    #[test]
    fn seeded_fits_are_reproducible() {
        let (x, y) = noisy_linear(120);
        let params = ForestParams {
            n_trees: 8,
            seed: 99,
            ..Default::default()
        };
        let mut a = RandomForest::new(params.clone());
        let mut b = RandomForest::new(params);
        a.fit(&x, &y);
        b.fit(&x, &y);
        for row in x.iter().take(20) {
            assert_eq!(a.predict_one(row), b.predict_one(row));
        }
    }

    #[test]
    fn max_features_resolution_bounds() {
        assert_eq!(MaxFeatures::All.resolve(12), 12);
        assert_eq!(MaxFeatures::Sqrt.resolve(12), 4);
        assert_eq!(MaxFeatures::Log2.resolve(12), 4);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
    }
}
