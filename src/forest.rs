//! Isolation forest training and scoring
//!
//! Trees are grown over random subsamples drawn without replacement and
//! stopped at the conventional average isolation depth `ceil(log2(n))`;
//! depth-limited leaves keep their residual subsample size so scoring can add
//! the expected path length of the unexplored subtree. Nodes live in a flat
//! arena with integer child indices, which keeps trees serializable and
//! cheap to share across scoring threads.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::DetectorConfig;
use crate::error::{DetectError, Result};
use crate::features::FeatureMatrix;

/// Euler–Mascheroni constant, for the harmonic-number approximation
const EULER_GAMMA: f32 = 0.5772156649;

/// Expected path length of an unsuccessful BST search over `n` points:
/// `c(n) = 2·H(n−1) − 2(n−1)/n`, with `H(i) ≈ ln(i) + γ`. Defined as 1 for
/// `n ≤ 1` so it is always usable as a score denominator.
pub(crate) fn c_factor(n: usize) -> f32 {
    if n <= 1 {
        return 1.0;
    }
    let n = n as f32;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}

/// Node in the tree arena
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    /// Internal split; samples with `value < threshold` go left
    Split {
        feature: u32,
        threshold: f32,
        left: u32,
        right: u32,
    },
    /// Terminal node holding the residual subsample size
    Leaf { size: u32 },
}

/// A single isolation tree over one training subsample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
    root: u32,
}

impl IsolationTree {
    /// Grow a tree from a seeded RNG over a fresh subsample of `matrix`
    fn grow(matrix: &FeatureMatrix, subsample: usize, max_depth: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let indices = rand::seq::index::sample(&mut rng, matrix.nrows(), subsample).into_vec();

        let mut nodes = Vec::new();
        let root = Self::grow_node(&mut nodes, matrix, &indices, 0, max_depth, &mut rng);
        Self { nodes, root }
    }

    fn grow_node(
        nodes: &mut Vec<Node>,
        matrix: &FeatureMatrix,
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> u32 {
        if depth >= max_depth || indices.len() <= 1 {
            return Self::push(nodes, Node::Leaf { size: indices.len() as u32 });
        }

        // Per-feature value ranges over this node's subsample; only features
        // with spread are split candidates
        let ncols = matrix.ncols();
        let mut ranges = vec![(f32::INFINITY, f32::NEG_INFINITY); ncols];
        for &i in indices {
            for (col, &value) in matrix.row(i).iter().enumerate() {
                let (min, max) = &mut ranges[col];
                *min = min.min(value);
                *max = max.max(value);
            }
        }

        let candidates: Vec<usize> = (0..ncols).filter(|&c| ranges[c].1 > ranges[c].0).collect();
        if candidates.is_empty() {
            return Self::push(nodes, Node::Leaf { size: indices.len() as u32 });
        }

        let feature = candidates[rng.random_range(0..candidates.len())];
        let (min, max) = ranges[feature];
        let threshold = rng.random_range(min..max);

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| matrix.row(i)[feature] < threshold);

        // Degenerate split (threshold landed on the minimum)
        if left_indices.is_empty() || right_indices.is_empty() {
            return Self::push(nodes, Node::Leaf { size: indices.len() as u32 });
        }

        let left = Self::grow_node(nodes, matrix, &left_indices, depth + 1, max_depth, rng);
        let right = Self::grow_node(nodes, matrix, &right_indices, depth + 1, max_depth, rng);

        Self::push(
            nodes,
            Node::Split {
                feature: feature as u32,
                threshold,
                left,
                right,
            },
        )
    }

    fn push(nodes: &mut Vec<Node>, node: Node) -> u32 {
        nodes.push(node);
        (nodes.len() - 1) as u32
    }

    /// Edges from root to the landing leaf, plus the `c(m)` correction for
    /// leaves that still held `m > 1` samples when growth stopped
    pub fn path_length(&self, sample: &[f32]) -> f32 {
        let mut depth = 0u32;
        let mut current = self.root;
        loop {
            match &self.nodes[current as usize] {
                Node::Leaf { size } => {
                    let correction = if *size > 1 { c_factor(*size as usize) } else { 0.0 };
                    return depth as f32 + correction;
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    current = if sample[*feature as usize] < *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1;
                }
            }
        }
    }

    /// Number of arena nodes (diagnostics)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Trained ensemble of isolation trees plus the schema width it was fit on.
///
/// Immutable after [`IsolationForest::fit`]; scoring takes `&self` and is safe
/// to run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample: usize,
    n_features: usize,
    /// c(subsample), the expected-path-length normalizer
    normalizer: f32,
}

impl IsolationForest {
    /// Train an ensemble on a feature matrix.
    ///
    /// Fails with [`DetectError::InsufficientData`] on a matrix with zero rows
    /// or zero columns. With a fixed seed the resulting model scores
    /// identically across runs, with or without the `parallel` feature:
    /// per-tree seeds are drawn sequentially from the master RNG and trees are
    /// collected in seed order.
    pub fn fit(matrix: &FeatureMatrix, config: &DetectorConfig) -> Result<Self> {
        config.validate()?;
        if matrix.is_empty() || matrix.ncols() == 0 {
            return Err(DetectError::InsufficientData);
        }

        let rows = matrix.nrows();
        let subsample = config.subsample.resolve(rows);
        let max_depth = (subsample as f32).log2().ceil() as usize;

        let mut master = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::rng().random()),
        };
        let seeds: Vec<u64> = (0..config.num_trees).map(|_| master.random()).collect();

        #[cfg(feature = "parallel")]
        let trees: Vec<IsolationTree> = seeds
            .par_iter()
            .map(|&seed| IsolationTree::grow(matrix, subsample, max_depth, seed))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let trees: Vec<IsolationTree> = seeds
            .iter()
            .map(|&seed| IsolationTree::grow(matrix, subsample, max_depth, seed))
            .collect();

        Ok(Self {
            trees,
            subsample,
            n_features: matrix.ncols(),
            normalizer: c_factor(subsample),
        })
    }

    /// Raw anomaly score for one feature vector: `2^(−E(h(x)) / c(n))`,
    /// in (0, 1], higher = more anomalous
    pub fn score(&self, sample: &[f32]) -> Result<f32> {
        if self.trees.is_empty() {
            return Err(DetectError::Untrained);
        }
        if sample.len() != self.n_features {
            return Err(DetectError::SchemaMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }

        let total: f32 = self.trees.iter().map(|t| t.path_length(sample)).sum();
        let avg_path = total / self.trees.len() as f32;
        Ok(2.0_f32.powf(-avg_path / self.normalizer))
    }

    /// Row-wise scores for a whole matrix; empty input yields empty output
    pub fn score_batch(&self, matrix: &FeatureMatrix) -> Result<Vec<f32>> {
        if self.trees.is_empty() {
            return Err(DetectError::Untrained);
        }
        if matrix.is_empty() {
            return Ok(Vec::new());
        }
        if matrix.ncols() != self.n_features {
            return Err(DetectError::SchemaMismatch {
                expected: self.n_features,
                got: matrix.ncols(),
            });
        }

        #[cfg(feature = "parallel")]
        let scores = matrix
            .rows()
            .par_iter()
            .map(|row| self.score(row))
            .collect::<Result<Vec<f32>>>()?;

        #[cfg(not(feature = "parallel"))]
        let scores = matrix
            .rows()
            .iter()
            .map(|row| self.score(row))
            .collect::<Result<Vec<f32>>>()?;

        Ok(scores)
    }

    /// Number of trees in the ensemble
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Subsample size the forest was trained with
    pub fn subsample(&self) -> usize {
        self.subsample
    }

    /// Schema width the forest expects when scoring
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}
