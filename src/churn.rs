//! Churn model: gradient-boosted regression stumps over RFM features.
//!
//! Illustrative machine-learning glue, not a designed algorithm. A user is
//! labeled churned when their recency exceeds a threshold; the model is fit
//! on a stratified 75/25 split with a fixed seed and evaluated with ROC-AUC
//! on the held-out quarter.

use anyhow::bail;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::analytics::RfmRecord;

/// Training configuration. The defaults are the model's "default
/// hyperparameters": 100 boosting rounds of depth-1 trees at a 0.1
/// learning rate.
#[derive(Debug, Clone)]
pub struct ChurnParams {
    pub n_rounds: usize,
    pub learning_rate: f64,
    /// Seed for the stratified split; the stump search itself is
    /// exhaustive and fully deterministic.
    pub seed: u64,
    pub test_fraction: f64,
    /// Recency above this many days labels a user as churned.
    pub churn_threshold_days: i64,
}

impl Default for ChurnParams {
    fn default() -> Self {
        ChurnParams {
            n_rounds: 100,
            learning_rate: 0.1,
            seed: 42,
            test_fraction: 0.25,
            churn_threshold_days: 90,
        }
    }
}

/// One regression stump: a single threshold on a single feature.
#[derive(Debug, Clone)]
struct Stump {
    feature: usize,
    threshold: f64,
    left: f64,
    right: f64,
}

impl Stump {
    fn response(&self, row: ArrayView1<f64>) -> f64 {
        if row[self.feature] <= self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

/// Fitted gradient-boosted stump ensemble.
#[derive(Debug, Clone)]
pub struct ChurnModel {
    stumps: Vec<Stump>,
    learning_rate: f64,
}

impl ChurnModel {
    /// Fit on a feature matrix (rows = users, columns = recency,
    /// frequency, monetary) and 0/1 labels.
    pub fn fit(features: &Array2<f64>, labels: &Array1<f64>, params: &ChurnParams) -> Self {
        let n = features.nrows();
        let mut predictions = vec![0.5; n];
        let mut stumps = Vec::with_capacity(params.n_rounds);

        for _ in 0..params.n_rounds {
            let residuals: Vec<f64> = labels
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .collect();
            let Some(stump) = best_stump(features, &residuals) else {
                break;
            };
            for (i, prediction) in predictions.iter_mut().enumerate() {
                *prediction = (*prediction
                    + params.learning_rate * stump.response(features.row(i)))
                .clamp(0.0, 1.0);
            }
            stumps.push(stump);
        }

        ChurnModel {
            stumps,
            learning_rate: params.learning_rate,
        }
    }

    /// Churn probability per row, each in [0, 1].
    pub fn predict_proba(&self, features: &Array2<f64>) -> Array1<f64> {
        Array1::from_iter(features.outer_iter().map(|row| {
            let mut p = 0.5;
            for stump in &self.stumps {
                p = (p + self.learning_rate * stump.response(row)).clamp(0.0, 1.0);
            }
            p
        }))
    }

    pub fn n_stumps(&self) -> usize {
        self.stumps.len()
    }
}

/// Exhaustive least-squares search for the best single split. Candidate
/// thresholds are the observed feature values; a cut is only valid between
/// two distinct values.
fn best_stump(features: &Array2<f64>, residuals: &[f64]) -> Option<Stump> {
    let n = residuals.len();
    if n < 2 {
        return None;
    }
    let total: f64 = residuals.iter().sum();

    let mut best: Option<(f64, Stump)> = None;
    for feature in 0..features.ncols() {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            features[[a, feature]]
                .partial_cmp(&features[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        for (k, &i) in order.iter().enumerate().take(n - 1) {
            left_sum += residuals[i];
            let value = features[[i, feature]];
            if features[[order[k + 1], feature]] <= value {
                continue;
            }
            let n_left = (k + 1) as f64;
            let n_right = (n - k - 1) as f64;
            let right_sum = total - left_sum;
            // Maximizing this is equivalent to minimizing the split SSE.
            let score = left_sum * left_sum / n_left + right_sum * right_sum / n_right;
            if best.as_ref().map_or(true, |(s, _)| score > *s + 1e-12) {
                best = Some((
                    score,
                    Stump {
                        feature,
                        threshold: value,
                        left: left_sum / n_left,
                        right: right_sum / n_right,
                    },
                ));
            }
        }
    }
    best.map(|(_, stump)| stump)
}

/// A user's predicted churn probability.
#[derive(Debug, Clone, PartialEq)]
pub struct ChurnScore {
    pub user_id: i64,
    pub churn_prob: f64,
}

/// Result of a training run: the fitted model, held-out ROC-AUC, and all
/// users scored and ranked by descending churn probability.
#[derive(Debug, Clone)]
pub struct ChurnOutcome {
    pub model: ChurnModel,
    pub auc: f64,
    pub scores: Vec<ChurnScore>,
}

/// Train with the default parameters (seed 42, 90-day churn threshold).
pub fn train_churn_model(rfm: &[RfmRecord]) -> crate::Result<ChurnOutcome> {
    train_churn_model_with(rfm, &ChurnParams::default())
}

pub fn train_churn_model_with(
    rfm: &[RfmRecord],
    params: &ChurnParams,
) -> crate::Result<ChurnOutcome> {
    if rfm.is_empty() {
        bail!("cannot train a churn model on an empty RFM table");
    }

    let features = Array2::from_shape_fn((rfm.len(), 3), |(i, j)| match j {
        0 => rfm[i].recency as f64,
        1 => rfm[i].frequency as f64,
        _ => rfm[i].monetary,
    });
    let labels = Array1::from_iter(
        rfm.iter()
            .map(|r| (r.recency > params.churn_threshold_days) as i64 as f64),
    );

    let (train_idx, test_idx) = stratified_split(&labels, params.test_fraction, params.seed)?;
    let train_x = features.select(Axis(0), &train_idx);
    let train_y = labels.select(Axis(0), &train_idx);
    let test_x = features.select(Axis(0), &test_idx);
    let test_y = labels.select(Axis(0), &test_idx);

    let model = ChurnModel::fit(&train_x, &train_y, params);
    let auc = roc_auc(&test_y, &model.predict_proba(&test_x));

    let probabilities = model.predict_proba(&features);
    let mut scores: Vec<ChurnScore> = rfm
        .iter()
        .zip(probabilities.iter())
        .map(|(record, &churn_prob)| ChurnScore {
            user_id: record.user_id,
            churn_prob,
        })
        .collect();
    scores.sort_by(|a, b| {
        b.churn_prob
            .partial_cmp(&a.churn_prob)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.user_id.cmp(&b.user_id))
    });

    Ok(ChurnOutcome { model, auc, scores })
}

/// Stratified split: shuffle each class with a seeded RNG and hold out
/// `test_fraction` of it (at least one sample on each side).
fn stratified_split(
    labels: &Array1<f64>,
    test_fraction: f64,
    seed: u64,
) -> crate::Result<(Vec<usize>, Vec<usize>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [0.0, 1.0] {
        let mut indices: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &y)| y == class)
            .map(|(i, _)| i)
            .collect();
        if indices.len() < 2 {
            bail!(
                "label class {} has {} sample(s); at least 2 are needed for a stratified split",
                class,
                indices.len()
            );
        }
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64 * test_fraction).round() as usize)
            .clamp(1, indices.len() - 1);
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }
    Ok((train, test))
}

/// Tie-aware trapezoid ROC-AUC. Returns 0.5 when only one class is present.
pub fn roc_auc(labels: &Array1<f64>, scores: &Array1<f64>) -> f64 {
    let mut pairs: Vec<(f64, bool)> = scores
        .iter()
        .zip(labels.iter())
        .map(|(&s, &y)| (s, y >= 0.5))
        .collect();
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let n_pos = pairs.iter().filter(|(_, y)| *y).count() as f64;
    let n_neg = pairs.len() as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return 0.5;
    }

    let mut true_pos = 0.0;
    let mut auc = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let score = pairs[i].0;
        let mut tied_pos = 0.0;
        let mut tied_neg = 0.0;
        while i < pairs.len() && (pairs[i].0 - score).abs() < 1e-12 {
            if pairs[i].1 {
                tied_pos += 1.0;
            } else {
                tied_neg += 1.0;
            }
            i += 1;
        }
        auc += (tied_neg / n_neg) * (true_pos + tied_pos / 2.0) / n_pos;
        true_pos += tied_pos;
    }
    auc
}
