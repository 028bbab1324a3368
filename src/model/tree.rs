//! Regression tree base learner shared by the forest and the booster.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split (None = all).
    pub max_features: Option<usize>,
    /// L2 term added to the leaf denominator; 0 gives the plain mean.
    pub leaf_lambda: f64,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            leaf_lambda: 0.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    params: TreeParams,
    root: Option<Node>,
}

impl RegressionTree {
    pub fn new(params: TreeParams) -> Self {
        Self { params, root: None }
    }

    /// Fit on row-major features against targets. Row count must match.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) {
        debug_assert_eq!(x.len(), y.len());
        let indices: Vec<usize> = (0..x.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        self.root = Some(self.build(x, y, &indices, 0, &mut rng));
    }

    fn build(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Node {
        let labels: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
        let impurity = variance(&labels);

        if depth >= self.params.max_depth
            || indices.len() < self.params.min_samples_split
            || impurity < 1e-12
        {
            return self.leaf(&labels);
        }

        match self.best_split(x, y, indices, impurity, rng) {
            Some((feature_idx, threshold, left_idx, right_idx)) => {
                if left_idx.len() < self.params.min_samples_leaf
                    || right_idx.len() < self.params.min_samples_leaf
                {
                    return self.leaf(&labels);
                }
                let left = self.build(x, y, &left_idx, depth + 1, rng);
                let right = self.build(x, y, &right_idx, depth + 1, rng);
                Node::Split {
                    feature_idx,
                    threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            None => self.leaf(&labels),
        }
    }

    fn leaf(&self, labels: &[f64]) -> Node {
        let value = if labels.is_empty() {
            0.0
        } else {
            labels.iter().sum::<f64>() / (labels.len() as f64 + self.params.leaf_lambda)
        };
        Node::Leaf {
            value,
            n_samples: labels.len(),
        }
    }

    fn best_split(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<(usize, f64, Vec<usize>, Vec<usize>)> {
        let n_features = x.first().map(|row| row.len())?;
        let max_features = self.params.max_features.unwrap_or(n_features).max(1);

        let mut feature_indices: Vec<usize> = (0..n_features).collect();
        feature_indices.shuffle(rng);
        feature_indices.truncate(max_features);
        // Stable order so equal-gain ties resolve deterministically.
        feature_indices.sort_unstable();

        let mut best_gain = 0.0;
        let mut best: Option<(usize, f64, Vec<usize>, Vec<usize>)> = None;

        for &feature_idx in &feature_indices {
            let mut values: Vec<f64> = indices.iter().map(|&i| x[i][feature_idx]).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            values.dedup();

            for window in values.windows(2) {
                let threshold = (window[0] + window[1]) / 2.0;
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[i][feature_idx] <= threshold);

                if left_idx.is_empty() || right_idx.is_empty() {
                    continue;
                }

                let left_labels: Vec<f64> = left_idx.iter().map(|&i| y[i]).collect();
                let right_labels: Vec<f64> = right_idx.iter().map(|&i| y[i]).collect();
                let n_left = left_labels.len() as f64;
                let n_right = right_labels.len() as f64;
                let weighted = (n_left * variance(&left_labels)
                    + n_right * variance(&right_labels))
                    / (n_left + n_right);

                let gain = parent_impurity - weighted;
                if gain > best_gain {
                    best_gain = gain;
                    best = Some((feature_idx, threshold, left_idx, right_idx));
                }
            }
        }

        best
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        let mut node = match &self.root {
            Some(root) => root,
            None => return 0.0,
        };
        loop {
            match node {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn node_depth(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map(node_depth).unwrap_or(0)
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}
