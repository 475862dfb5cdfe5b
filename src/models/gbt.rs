//! Gradient-boosted regression trees
//!
//! Least-squares boosting over depth-limited regression trees with
//! per-sample weights, seeded row/feature subsampling and optional
//! early stopping against a validation set. Deterministic for a fixed
//! seed.

use crate::error::{ForecastError, Result};
use crate::models::{FittedRegressor, Regressor};
use crate::split::Dataset;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

const MIN_SPLIT_GAIN: f64 = 1e-12;

/// Hyperparameters of the boosted-tree model
#[derive(Debug, Clone)]
pub struct GbtParams {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Shrinkage applied to every tree's contribution
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum number of rows in a leaf
    pub min_samples_leaf: usize,
    /// Fraction of rows sampled per tree
    pub subsample: f64,
    /// Fraction of features sampled per tree
    pub colsample: f64,
    /// L2 regularization added to leaf denominators
    pub lambda: f64,
    /// Stop after this many rounds without validation improvement
    pub early_stopping_rounds: Option<usize>,
    /// Seed for the row/feature sampler
    pub seed: u64,
}

impl Default for GbtParams {
    fn default() -> Self {
        Self {
            n_estimators: 600,
            learning_rate: 0.03,
            max_depth: 6,
            min_samples_leaf: 2,
            subsample: 0.8,
            colsample: 0.8,
            lambda: 2.0,
            early_stopping_rounds: Some(50),
            seed: 42,
        }
    }
}

impl GbtParams {
    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForecastError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(ForecastError::InvalidParameter(
                "learning_rate must be positive".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(ForecastError::InvalidParameter(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.subsample <= 0.0 || self.subsample > 1.0 {
            return Err(ForecastError::InvalidParameter(
                "subsample must be in (0, 1]".to_string(),
            ));
        }
        if self.colsample <= 0.0 || self.colsample > 1.0 {
            return Err(ForecastError::InvalidParameter(
                "colsample must be in (0, 1]".to_string(),
            ));
        }
        if self.lambda < 0.0 {
            return Err(ForecastError::InvalidParameter(
                "lambda must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Gradient-boosted regression trees (unfitted)
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    name: String,
    params: GbtParams,
}

impl GradientBoostedTrees {
    /// Create a model with the given hyperparameters
    pub fn new(params: GbtParams) -> Self {
        Self {
            name: format!(
                "Gradient Boosted Trees (trees={}, depth={})",
                params.n_estimators, params.max_depth
            ),
            params,
        }
    }
}

/// A fitted boosted-tree ensemble
#[derive(Debug, Clone)]
pub struct FittedGbt {
    name: String,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<Tree>,
}

impl FittedGbt {
    /// Number of trees kept after fitting (and early stopping)
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for GradientBoostedTrees {
    type Fitted = FittedGbt;

    fn fit(&self, train: &Dataset, valid: Option<&Dataset>) -> Result<Self::Fitted> {
        self.params.validate()?;
        validate_dataset(train)?;

        let n = train.len();
        let n_features = train.features[0].len();
        let valid = valid.filter(|v| !v.is_empty());

        let weight_sum: f64 = train.weights.iter().sum();
        let base_score = train
            .targets
            .iter()
            .zip(train.weights.iter())
            .map(|(y, w)| y * w)
            .sum::<f64>()
            / weight_sum;

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut preds = vec![base_score; n];
        let mut valid_preds: Vec<f64> = valid.map(|v| vec![base_score; v.len()]).unwrap_or_default();
        let mut trees: Vec<Tree> = Vec::new();

        let mut best_rmse = f64::INFINITY;
        let mut best_len = 0usize;
        let mut rounds_since_best = 0usize;

        let row_sample = ((n as f64 * self.params.subsample).round() as usize).clamp(1, n);
        let feature_sample =
            ((n_features as f64 * self.params.colsample).round() as usize).clamp(1, n_features);

        for _ in 0..self.params.n_estimators {
            let mut rows: Vec<usize> = (0..n).collect();
            rows.shuffle(&mut rng);
            rows.truncate(row_sample);

            let mut features: Vec<usize> = (0..n_features).collect();
            features.shuffle(&mut rng);
            features.truncate(feature_sample);
            features.sort_unstable();

            let residuals: Vec<f64> = train
                .targets
                .iter()
                .zip(preds.iter())
                .map(|(y, p)| y - p)
                .collect();

            let mut grower = TreeGrower {
                x: &train.features,
                residuals: &residuals,
                weights: &train.weights,
                features: &features,
                min_samples_leaf: self.params.min_samples_leaf,
                max_depth: self.params.max_depth,
                lambda: self.params.lambda,
                nodes: Vec::new(),
            };
            grower.grow(rows, 0);
            let tree = Tree { nodes: grower.nodes };

            for (pred, row) in preds.iter_mut().zip(train.features.iter()) {
                *pred += self.params.learning_rate * tree.predict(row);
            }

            trees.push(tree);

            if let Some(valid) = valid {
                let tree = trees.last().expect("tree just pushed");
                for (pred, row) in valid_preds.iter_mut().zip(valid.features.iter()) {
                    *pred += self.params.learning_rate * tree.predict(row);
                }
                let rmse = rmse(&valid.targets, &valid_preds);
                if rmse < best_rmse {
                    best_rmse = rmse;
                    best_len = trees.len();
                    rounds_since_best = 0;
                } else {
                    rounds_since_best += 1;
                }
                if let Some(patience) = self.params.early_stopping_rounds {
                    if rounds_since_best >= patience {
                        break;
                    }
                }
            }
        }

        if valid.is_some() && self.params.early_stopping_rounds.is_some() && best_len > 0 {
            trees.truncate(best_len);
        }
        debug!(
            trees = trees.len(),
            base_score, "fitted gradient boosted trees"
        );

        Ok(FittedGbt {
            name: self.name.clone(),
            base_score,
            learning_rate: self.params.learning_rate,
            trees,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl FittedRegressor for FittedGbt {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(rows
            .iter()
            .map(|row| {
                self.base_score
                    + self.learning_rate
                        * self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>()
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn validate_dataset(train: &Dataset) -> Result<()> {
    if train.is_empty() {
        return Err(ForecastError::EmptyTrainingSet);
    }
    let width = train.features[0].len();
    if width == 0 || train.features.iter().any(|row| row.len() != width) {
        return Err(ForecastError::InvalidParameter(
            "Training rows must be non-empty and rectangular".to_string(),
        ));
    }
    if train.features.len() != train.targets.len() || train.weights.len() != train.targets.len() {
        return Err(ForecastError::InvalidParameter(
            "Features, targets and weights must have equal lengths".to_string(),
        ));
    }
    if train.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(ForecastError::InvalidParameter(
            "Sample weights must be finite and non-negative".to_string(),
        ));
    }
    if train.weights.iter().sum::<f64>() <= 0.0 {
        return Err(ForecastError::InvalidParameter(
            "Sample weights must not all be zero".to_string(),
        ));
    }
    Ok(())
}

fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().max(1) as f64;
    (actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n)
        .sqrt()
}

struct TreeGrower<'a> {
    x: &'a [Vec<f64>],
    residuals: &'a [f64],
    weights: &'a [f64],
    features: &'a [usize],
    min_samples_leaf: usize,
    max_depth: usize,
    lambda: f64,
    nodes: Vec<Node>,
}

impl TreeGrower<'_> {
    fn leaf_value(&self, rows: &[usize]) -> f64 {
        let mut weight = 0.0;
        let mut sum = 0.0;
        for &i in rows {
            weight += self.weights[i];
            sum += self.weights[i] * self.residuals[i];
        }
        sum / (weight + self.lambda)
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        if depth >= self.max_depth || rows.len() < 2 * self.min_samples_leaf {
            self.nodes.push(Node::Leaf {
                value: self.leaf_value(&rows),
            });
            return self.nodes.len() - 1;
        }

        let best = self.best_split(&rows);
        let (feature, threshold) = match best {
            Some(split) => split,
            None => {
                self.nodes.push(Node::Leaf {
                    value: self.leaf_value(&rows),
                });
                return self.nodes.len() - 1;
            }
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.x[i][feature] <= threshold);

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[index] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        index
    }

    /// Exhaustive scan for the weighted variance-reduction split with
    /// the highest gain over the sampled features
    fn best_split(&self, rows: &[usize]) -> Option<(usize, f64)> {
        let mut total_weight = 0.0;
        let mut total_sum = 0.0;
        for &i in rows {
            total_weight += self.weights[i];
            total_sum += self.weights[i] * self.residuals[i];
        }
        let parent_score = total_sum * total_sum / (total_weight + self.lambda);

        let mut best: Option<(usize, f64)> = None;
        let mut best_gain = MIN_SPLIT_GAIN;

        for &feature in self.features {
            let mut order = rows.to_vec();
            order.sort_by(|&a, &b| {
                self.x[a][feature]
                    .partial_cmp(&self.x[b][feature])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let mut left_weight = 0.0;
            let mut left_sum = 0.0;
            for k in 1..order.len() {
                let i = order[k - 1];
                left_weight += self.weights[i];
                left_sum += self.weights[i] * self.residuals[i];

                if k < self.min_samples_leaf || order.len() - k < self.min_samples_leaf {
                    continue;
                }
                let here = self.x[order[k - 1]][feature];
                let next = self.x[order[k]][feature];
                if here == next {
                    continue;
                }

                let right_weight = total_weight - left_weight;
                let right_sum = total_sum - left_sum;
                let gain = left_sum * left_sum / (left_weight + self.lambda)
                    + right_sum * right_sum / (right_weight + self.lambda)
                    - parent_score;
                if gain > best_gain {
                    best_gain = gain;
                    best = Some((feature, (here + next) / 2.0));
                }
            }
        }
        best
    }
}
