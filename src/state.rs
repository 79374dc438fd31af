//! Hidden state threaded between steps and between sequences.

use ndarray::Array2;

use crate::error::{Result, RsmError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The `(x_b, phi, psi)` triple, each shaped `(batch, total_cells)`.
///
/// This is the only state that survives a step. A fresh sequence starts from
/// [`HiddenState::zeros`]; a continued sequence starts from the state a
/// previous forward pass returned.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HiddenState {
    /// Recurrent input for the next step.
    pub x_b: Array2<f32>,
    /// Inhibition trace.
    pub phi: Array2<f32>,
    /// Memory trace.
    pub psi: Array2<f32>,
}

impl HiddenState {
    /// Build a state from explicit tensors; all three must share a shape.
    pub fn new(x_b: Array2<f32>, phi: Array2<f32>, psi: Array2<f32>) -> Result<Self> {
        let state = Self { x_b, phi, psi };
        state.check(state.batch_size(), state.total_cells())?;
        Ok(state)
    }

    /// All-zero state for `batch` sequences of `total_cells` cells.
    pub fn zeros(batch: usize, total_cells: usize) -> Self {
        Self {
            x_b: Array2::zeros((batch, total_cells)),
            phi: Array2::zeros((batch, total_cells)),
            psi: Array2::zeros((batch, total_cells)),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.x_b.nrows()
    }

    pub fn total_cells(&self) -> usize {
        self.x_b.ncols()
    }

    /// Verify every tensor is `(batch, total_cells)`.
    pub fn check(&self, batch: usize, total_cells: usize) -> Result<()> {
        for (what, tensor) in [
            ("recurrent input", &self.x_b),
            ("inhibition trace", &self.phi),
            ("memory trace", &self.psi),
        ] {
            if tensor.nrows() != batch {
                return Err(RsmError::mismatch(what, batch, tensor.nrows()));
            }
            if tensor.ncols() != total_cells {
                return Err(RsmError::mismatch(what, total_cells, tensor.ncols()));
            }
        }
        Ok(())
    }
}
