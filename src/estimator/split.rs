//! Train/validation splitting when no validation data is supplied

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// Targets of a tabular dataset
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    Classes(Vec<i64>),
    Values(Vec<f64>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Classes(c) => c.len(),
            Targets::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct class labels in ascending order; empty for continuous targets
    pub fn classes(&self) -> Vec<i64> {
        match self {
            Targets::Classes(c) => c.iter().copied().collect::<BTreeSet<_>>().into_iter().collect(),
            Targets::Values(_) => Vec::new(),
        }
    }

    pub fn select(&self, indices: &[usize]) -> Targets {
        match self {
            Targets::Classes(c) => Targets::Classes(indices.iter().map(|&i| c[i]).collect()),
            Targets::Values(v) => Targets::Values(indices.iter().map(|&i| v[i]).collect()),
        }
    }
}

/// Row indices of each side of a split, in ascending order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Split rows into train and validation sets.
///
/// Class targets are split per class so every class with at least two rows
/// keeps a row on both sides. Continuous targets get a uniform random split
/// of `floor(fraction * n)` validation rows.
pub fn validation_split<R: Rng>(targets: &Targets, fraction: f64, rng: &mut R) -> SplitIndices {
    let fraction = fraction.clamp(0.0, 1.0);
    let (mut train, mut valid) = match targets {
        Targets::Classes(classes) => stratified(classes, fraction, rng),
        Targets::Values(values) => random(values.len(), fraction, rng),
    };
    train.sort_unstable();
    valid.sort_unstable();
    SplitIndices { train, valid }
}

fn stratified<R: Rng>(classes: &[i64], fraction: f64, rng: &mut R) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &class) in classes.iter().enumerate() {
        by_class.entry(class).or_default().push(i);
    }

    let mut train = Vec::with_capacity(classes.len());
    let mut valid = Vec::new();
    for (_, mut rows) in by_class {
        rows.shuffle(rng);
        let n = rows.len();
        let mut n_valid = (n as f64 * fraction).round() as usize;
        if n >= 2 {
            n_valid = n_valid.clamp(1, n - 1);
        } else {
            n_valid = 0;
        }
        valid.extend_from_slice(&rows[..n_valid]);
        train.extend_from_slice(&rows[n_valid..]);
    }
    (train, valid)
}

fn random<R: Rng>(n: usize, fraction: f64, rng: &mut R) -> (Vec<usize>, Vec<usize>) {
    let n_valid = (fraction * n as f64) as usize;
    let mut rows: Vec<usize> = (0..n).collect();
    rows.shuffle(rng);
    let train = rows.split_off(n_valid);
    (train, rows)
}
