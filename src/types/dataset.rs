//! Windowed training dataset.

use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{PipelineError, Result};

/// Parallel input windows and next-token targets.
///
/// Row `i` of `inputs` holds the indices `[i, i + L)` of the token stream
/// and `targets[i]` the index at `i + L`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowedDataset {
    inputs: Array2<u32>,
    targets: Array1<u32>,
}

impl WindowedDataset {
    /// Pairs input windows with targets, rejecting a row-count mismatch.
    pub fn new(inputs: Array2<u32>, targets: Array1<u32>) -> Result<Self> {
        if inputs.nrows() != targets.len() {
            return Err(PipelineError::shape_mismatch(format!(
                "{} input windows but {} targets",
                inputs.nrows(),
                targets.len()
            )));
        }
        Ok(Self { inputs, targets })
    }

    /// Input windows, shape `(N, L)`.
    pub fn inputs(&self) -> &Array2<u32> {
        &self.inputs
    }

    /// Targets, length `N`.
    pub fn targets(&self) -> &Array1<u32> {
        &self.targets
    }

    /// One input window.
    pub fn window(&self, row: usize) -> ArrayView1<'_, u32> {
        self.inputs.row(row)
    }

    /// Window length `L`.
    pub fn window_len(&self) -> usize {
        self.inputs.ncols()
    }

    /// Number of training pairs `N`.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns true if there are no training pairs.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Splits into the two tensors.
    pub fn into_parts(self) -> (Array2<u32>, Array1<u32>) {
        (self.inputs, self.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rejects_mismatched_rows() {
        let inputs = Array2::<u32>::zeros((3, 2));
        let targets = Array1::<u32>::zeros(2);
        assert!(WindowedDataset::new(inputs, targets).is_err());
    }

    #[test]
    fn accessors() {
        let ds = WindowedDataset::new(array![[0, 1], [1, 2]], array![2, 0]).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.window_len(), 2);
        assert_eq!(ds.window(1).to_vec(), vec![1, 2]);
        assert!(!ds.is_empty());
    }
}
