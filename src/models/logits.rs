//! Logits processing for the sequence model output.
//!
//! Handles the softmax, the sparse categorical cross-entropy and greedy
//! token selection.

use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};

use ndarray::{Array2, ArrayView1, Axis};

/// Wrapper around a `(batch, vocab)` logits array with processing methods.
pub struct Logits(Array2<f32>);

impl Deref for Logits {
    type Target = Array2<f32>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Logits {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Debug for Logits {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Logits({:?})", self.0.dim())
    }
}

impl From<Array2<f32>> for Logits {
    fn from(arr: Array2<f32>) -> Self {
        Self(arr)
    }
}

impl Logits {
    /// Row-wise softmax, shifted by the row maximum for stability.
    pub fn softmax(&self) -> Array2<f32> {
        let mut probs = self.0.clone();
        for mut row in probs.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        probs
    }

    /// Index of the largest logit per row. Ties resolve to the lowest index.
    pub fn argmax(&self) -> Vec<u32> {
        self.0
            .axis_iter(Axis(0))
            .map(|row| argmax_row(row) as u32)
            .collect()
    }

    /// Mean sparse categorical cross-entropy against `targets`, together
    /// with its gradient with respect to the logits.
    ///
    /// # Panics
    ///
    /// Panics if `targets` does not have one entry per row or holds an
    /// index outside the vocabulary.
    pub fn cross_entropy(&self, targets: ArrayView1<'_, u32>) -> (f32, Array2<f32>) {
        let (batch, _) = self.0.dim();
        assert_eq!(batch, targets.len(), "one target per logits row");

        let mut grad = self.softmax();
        let mut loss = 0.0f32;
        for (mut row, &target) in grad.axis_iter_mut(Axis(0)).zip(targets.iter()) {
            let p = row[target as usize];
            loss -= p.max(f32::MIN_POSITIVE).ln();
            row[target as usize] -= 1.0;
        }

        let scale = 1.0 / batch.max(1) as f32;
        grad.mapv_inplace(|g| g * scale);
        (loss * scale, grad)
    }

    /// Number of rows whose arg-max equals the target.
    pub fn correct(&self, targets: ArrayView1<'_, u32>) -> usize {
        self.argmax()
            .iter()
            .zip(targets.iter())
            .filter(|(predicted, target)| predicted == target)
            .count()
    }
}

fn argmax_row(row: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &v) in row.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    #[test]
    fn softmax_rows_sum_to_one() {
        let logits = Logits(array![[1.0, 2.0, 3.0], [1000.0, 1000.0, -1000.0]]);
        let probs = logits.softmax();
        for row in probs.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert!((probs[[1, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        let logits = Logits(array![[0.1, 0.7, 0.7], [5.0, -1.0, 0.0]]);
        assert_eq!(logits.argmax(), vec![1, 0]);
    }

    #[test]
    fn cross_entropy_of_uniform_logits() {
        let logits = Logits(Array::zeros((2, 4)));
        let (loss, grad) = logits.cross_entropy(array![0u32, 3].view());
        assert!((loss - 4.0f32.ln()).abs() < 1e-5);
        // (0.25 - 1) / 2 on the target, 0.25 / 2 elsewhere
        assert!((grad[[0, 0]] + 0.375).abs() < 1e-6);
        assert!((grad[[0, 1]] - 0.125).abs() < 1e-6);
        for row in grad.axis_iter(Axis(0)) {
            assert!(row.sum().abs() < 1e-6);
        }
    }

    #[test]
    fn counts_correct_predictions() {
        let logits = Logits(array![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0]]);
        assert_eq!(logits.correct(array![1u32, 1, 1].view()), 2);
    }
}
