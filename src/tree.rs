use std::cmp::Ordering;

use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::features::FeatureRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
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

/// Binary tree stored as a flat node array, root at index 0.
/// Rows with `x[feature] <= threshold` go left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    pub fn predict(&self, row: &FeatureRow) -> f64 {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Some(TreeNode::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(TreeNode::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Node statistics and scoring used while growing a tree.
///
/// The gain of a split is `score(left) + score(right) - score(parent)`.
pub(crate) trait SplitCriterion {
    type Stats: Copy + Default;

    fn sample_stats(&self, row: usize) -> Self::Stats;
    fn add(a: Self::Stats, b: Self::Stats) -> Self::Stats;
    fn sub(a: Self::Stats, b: Self::Stats) -> Self::Stats;
    fn score(&self, stats: &Self::Stats) -> f64;
    fn leaf_value(&self, stats: &Self::Stats) -> f64;

    fn child_allowed(&self, _stats: &Self::Stats) -> bool {
        true
    }

    fn is_pure(&self, _stats: &Self::Stats) -> bool {
        false
    }

    fn min_gain(&self) -> f64 {
        0.0
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

pub(crate) enum FeatureSampling<'a> {
    /// Every split considers the same feature set.
    Fixed(&'a [usize]),
    /// Every split draws `k` features from the pool without replacement.
    PerNode { pool: &'a [usize], k: usize },
}

const GAIN_EPS: f64 = 1e-12;

/// Grow one tree over `rows` (indices into `x`; duplicates allowed, as in a
/// bootstrap sample).
pub(crate) fn grow<C, R>(
    criterion: &C,
    x: &[FeatureRow],
    mut rows: Vec<usize>,
    params: GrowParams,
    sampling: FeatureSampling<'_>,
    rng: &mut R,
) -> DecisionTree
where
    C: SplitCriterion,
    R: Rng,
{
    let mut builder = Builder {
        criterion,
        x,
        params,
        sampling,
        nodes: Vec::new(),
    };
    builder.build(&mut rows, 0, rng);
    DecisionTree {
        nodes: builder.nodes,
    }
}

struct Builder<'a, C: SplitCriterion> {
    criterion: &'a C,
    x: &'a [FeatureRow],
    params: GrowParams,
    sampling: FeatureSampling<'a>,
    nodes: Vec<TreeNode>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl<C: SplitCriterion> Builder<'_, C> {
    fn build<R: Rng>(&mut self, rows: &mut [usize], depth: usize, rng: &mut R) -> usize {
        let total = rows.iter().fold(C::Stats::default(), |acc, r| {
            C::add(acc, self.criterion.sample_stats(*r))
        });
        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: self.criterion.leaf_value(&total),
        });

        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        if depth_reached
            || rows.len() < self.params.min_samples_split.max(2)
            || rows.len() < 2 * self.params.min_samples_leaf.max(1)
            || self.criterion.is_pure(&total)
        {
            return node_idx;
        }

        let features = self.candidate_features(rng);
        let Some(best) = self.best_split(rows, &total, &features) else {
            return node_idx;
        };

        let split_at = partition(rows, |r| self.x[r][best.feature] <= best.threshold);
        if split_at == 0 || split_at == rows.len() {
            return node_idx;
        }
        let (left_rows, right_rows) = rows.split_at_mut(split_at);
        let left = self.build(left_rows, depth + 1, rng);
        let right = self.build(right_rows, depth + 1, rng);
        self.nodes[node_idx] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_idx
    }

    fn candidate_features<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
        match self.sampling {
            FeatureSampling::Fixed(features) => features.to_vec(),
            FeatureSampling::PerNode { pool, k } => {
                let k = k.clamp(1, pool.len().max(1));
                if k >= pool.len() {
                    return pool.to_vec();
                }
                index::sample(rng, pool.len(), k)
                    .into_iter()
                    .map(|i| pool[i])
                    .collect()
            }
        }
    }

    fn best_split(
        &self,
        rows: &[usize],
        total: &C::Stats,
        features: &[usize],
    ) -> Option<BestSplit> {
        let parent_score = self.criterion.score(total);
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;
        let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(rows.len());

        for &feature in features {
            sorted.clear();
            sorted.extend(rows.iter().map(|r| (self.x[*r][feature], *r)));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = C::Stats::default();
            for i in 0..sorted.len() - 1 {
                left = C::add(left, self.criterion.sample_stats(sorted[i].1));
                let (value, next) = (sorted[i].0, sorted[i + 1].0);
                if value.total_cmp(&next) == Ordering::Equal {
                    continue;
                }
                let n_left = i + 1;
                if n_left < min_leaf || sorted.len() - n_left < min_leaf {
                    continue;
                }
                let right = C::sub(*total, left);
                if !self.criterion.child_allowed(&left) || !self.criterion.child_allowed(&right) {
                    continue;
                }
                let gain =
                    self.criterion.score(&left) + self.criterion.score(&right) - parent_score;
                if gain <= self.criterion.min_gain() + GAIN_EPS {
                    continue;
                }
                if best.as_ref().is_none_or(|b| gain > b.gain) {
                    let mid = value + (next - value) / 2.0;
                    let threshold = if mid < next { mid } else { value };
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// In-place partition; returns the count of rows satisfying `pred`, which end
/// up at the front.
fn partition<F>(rows: &mut [usize], pred: F) -> usize
where
    F: Fn(usize) -> bool,
{
    let mut front = 0usize;
    for i in 0..rows.len() {
        if pred(rows[i]) {
            rows.swap(front, i);
            front += 1;
        }
    }
    front
}

/// Gini impurity on binary labels; leaves hold the fraction of positives.
pub(crate) struct GiniCriterion<'a> {
    pub labels: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ClassCounts {
    n: f64,
    pos: f64,
}

impl SplitCriterion for GiniCriterion<'_> {
    type Stats = ClassCounts;

    fn sample_stats(&self, row: usize) -> ClassCounts {
        ClassCounts {
            n: 1.0,
            pos: f64::from(self.labels[row]),
        }
    }

    fn add(a: ClassCounts, b: ClassCounts) -> ClassCounts {
        ClassCounts {
            n: a.n + b.n,
            pos: a.pos + b.pos,
        }
    }

    fn sub(a: ClassCounts, b: ClassCounts) -> ClassCounts {
        ClassCounts {
            n: a.n - b.n,
            pos: a.pos - b.pos,
        }
    }

    // Negative weighted impurity: n * gini = 2 * pos * neg / n.
    fn score(&self, s: &ClassCounts) -> f64 {
        if s.n <= 0.0 {
            return 0.0;
        }
        -2.0 * s.pos * (s.n - s.pos) / s.n
    }

    fn leaf_value(&self, s: &ClassCounts) -> f64 {
        if s.n <= 0.0 { 0.5 } else { s.pos / s.n }
    }

    fn is_pure(&self, s: &ClassCounts) -> bool {
        s.pos <= 0.0 || s.pos >= s.n
    }
}

/// Second-order criterion for boosting on logistic loss.
pub(crate) struct NewtonCriterion<'a> {
    pub grad: &'a [f64],
    pub hess: &'a [f64],
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub min_child_weight: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct GradStats {
    g: f64,
    h: f64,
}

impl NewtonCriterion<'_> {
    fn thresholded(&self, g: f64) -> f64 {
        if g > self.reg_alpha {
            g - self.reg_alpha
        } else if g < -self.reg_alpha {
            g + self.reg_alpha
        } else {
            0.0
        }
    }
}

impl SplitCriterion for NewtonCriterion<'_> {
    type Stats = GradStats;

    fn sample_stats(&self, row: usize) -> GradStats {
        GradStats {
            g: self.grad[row],
            h: self.hess[row],
        }
    }

    fn add(a: GradStats, b: GradStats) -> GradStats {
        GradStats {
            g: a.g + b.g,
            h: a.h + b.h,
        }
    }

    fn sub(a: GradStats, b: GradStats) -> GradStats {
        GradStats {
            g: a.g - b.g,
            h: a.h - b.h,
        }
    }

    fn score(&self, s: &GradStats) -> f64 {
        let g = self.thresholded(s.g);
        0.5 * g * g / (s.h + self.reg_lambda).max(1e-12)
    }

    fn leaf_value(&self, s: &GradStats) -> f64 {
        -self.thresholded(s.g) / (s.h + self.reg_lambda).max(1e-12)
    }

    fn child_allowed(&self, s: &GradStats) -> bool {
        s.h >= self.min_child_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_COUNT;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn row(v: f64) -> FeatureRow {
        let mut r = [0.0; FEATURE_COUNT];
        r[0] = v;
        r
    }

    #[test]
    fn gini_tree_separates_threshold_data() {
        let x = (0..40).map(|i| row(i as f64)).collect::<Vec<_>>();
        let labels = (0..40).map(|i| u8::from(i >= 25)).collect::<Vec<_>>();
        let criterion = GiniCriterion { labels: &labels };
        let mut rng = StdRng::seed_from_u64(1);
        let tree = grow(
            &criterion,
            &x,
            (0..40).collect(),
            GrowParams {
                max_depth: Some(4),
                min_samples_split: 2,
                min_samples_leaf: 1,
            },
            FeatureSampling::Fixed(&[0]),
            &mut rng,
        );
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&row(3.0)), 0.0);
        assert_eq!(tree.predict(&row(30.0)), 1.0);
        assert_eq!(tree.predict(&row(24.4)), 0.0);
        assert_eq!(tree.predict(&row(24.6)), 1.0);
    }

    #[test]
    fn depth_limit_is_respected() {
        let x = (0..64).map(|i| row(i as f64)).collect::<Vec<_>>();
        let labels = (0..64).map(|i| (i % 2) as u8).collect::<Vec<_>>();
        let criterion = GiniCriterion { labels: &labels };
        let mut rng = StdRng::seed_from_u64(1);
        let tree = grow(
            &criterion,
            &x,
            (0..64).collect(),
            GrowParams {
                max_depth: Some(3),
                min_samples_split: 2,
                min_samples_leaf: 1,
            },
            FeatureSampling::Fixed(&[0]),
            &mut rng,
        );
        assert!(tree.depth() <= 3);
    }

    #[test]
    fn newton_leaves_follow_gradient_sign() {
        let x = (0..20).map(|i| row(i as f64)).collect::<Vec<_>>();
        let grad = (0..20).map(|i| if i < 10 { 0.5 } else { -0.5 }).collect::<Vec<_>>();
        let hess = vec![0.25; 20];
        let criterion = NewtonCriterion {
            grad: &grad,
            hess: &hess,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            min_child_weight: 1.0,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let tree = grow(
            &criterion,
            &x,
            (0..20).collect(),
            GrowParams {
                max_depth: Some(2),
                min_samples_split: 2,
                min_samples_leaf: 1,
            },
            FeatureSampling::Fixed(&[0]),
            &mut rng,
        );
        assert!(tree.predict(&row(2.0)) < 0.0);
        assert!(tree.predict(&row(15.0)) > 0.0);
    }
}
