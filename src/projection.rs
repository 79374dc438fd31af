//! Grouped projection: the dense potential `sigma` for every cell.

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;

use crate::error::{Result, RsmError};
use crate::nn::{Dropout, LinearMap};

/// Feed-forward map shared per group plus recurrent map per cell.
///
/// The feed-forward map produces one value per group (`d_in -> m`) which is
/// repeated for each of the `n` cells of that group. The recurrent map
/// (`total_cells -> total_cells`) reads the previous step's recurrent input.
#[derive(Debug)]
pub struct GroupedProjection {
    feedforward: Box<dyn LinearMap>,
    recurrent: Box<dyn LinearMap>,
    dropout: Dropout,
    cells_per_group: usize,
}

impl GroupedProjection {
    /// Build a projection with `cells_per_group` cells in each group.
    ///
    /// The group count is the feed-forward map's output width; the recurrent
    /// map must be square over `groups * cells_per_group`.
    pub fn new(
        feedforward: Box<dyn LinearMap>,
        recurrent: Box<dyn LinearMap>,
        cells_per_group: usize,
        dropout: Dropout,
    ) -> Result<Self> {
        let total_cells = feedforward.out_dim() * cells_per_group;
        RsmError::check("recurrent map input", total_cells, recurrent.in_dim())?;
        RsmError::check("recurrent map output", total_cells, recurrent.out_dim())?;

        Ok(Self {
            feedforward,
            recurrent,
            dropout,
            cells_per_group,
        })
    }

    /// Swap the recurrent map, keeping everything else.
    pub fn with_recurrent(self, recurrent: Box<dyn LinearMap>) -> Result<Self> {
        Self::new(self.feedforward, recurrent, self.cells_per_group, self.dropout)
    }

    pub fn d_in(&self) -> usize {
        self.feedforward.in_dim()
    }

    pub fn groups(&self) -> usize {
        self.feedforward.out_dim()
    }

    pub fn cells_per_group(&self) -> usize {
        self.cells_per_group
    }

    pub fn total_cells(&self) -> usize {
        self.groups() * self.cells_per_group
    }

    /// Compute `sigma` of shape `(batch, total_cells)`.
    ///
    /// `dropout_rng` is only drawn from when present; pass `None` to run the
    /// recurrent input through unchanged.
    pub fn forward(
        &self,
        x_a: ArrayView2<'_, f32>,
        x_b: ArrayView2<'_, f32>,
        dropout_rng: Option<&mut StdRng>,
    ) -> Result<Array2<f32>> {
        RsmError::check("input features", self.d_in(), x_a.ncols())?;
        RsmError::check("recurrent input cells", self.total_cells(), x_b.ncols())?;
        RsmError::check("recurrent input batch", x_a.nrows(), x_b.nrows())?;

        let z_a = self.feedforward.forward(x_a);
        let x_b = self.dropout.apply(x_b, dropout_rng);
        let mut sigma = self.recurrent.forward(x_b.view());

        let n = self.cells_per_group;
        for (mut row, group_row) in sigma.rows_mut().into_iter().zip(z_a.rows()) {
            for (cell, value) in row.iter_mut().enumerate() {
                *value += group_row[cell / n];
            }
        }

        Ok(sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Linear;
    use ndarray::{array, Array1};

    fn identity(dim: usize) -> Box<dyn LinearMap> {
        Box::new(Linear::from_parts(Array2::eye(dim), None).unwrap())
    }

    #[test]
    fn test_feedforward_broadcast_per_group() {
        // 2 inputs -> 3 groups of 2 cells
        let ff = Linear::from_parts(
            array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
            Some(Array1::zeros(3)),
        )
        .unwrap();
        let rec = Linear::from_parts(Array2::zeros((6, 6)), None).unwrap();
        let proj =
            GroupedProjection::new(Box::new(ff), Box::new(rec), 2, Dropout::new(0.0)).unwrap();

        let sigma = proj
            .forward(array![[2.0, 3.0]].view(), Array2::zeros((1, 6)).view(), None)
            .unwrap();

        assert_eq!(sigma, array![[2.0, 2.0, 3.0, 3.0, 5.0, 5.0]]);
    }

    #[test]
    fn test_recurrent_adds_per_cell() {
        let ff = Linear::from_parts(Array2::zeros((2, 1)), None).unwrap();
        let proj = GroupedProjection::new(Box::new(ff), identity(4), 2, Dropout::new(0.0)).unwrap();

        let x_b = array![[0.1, 0.2, 0.3, 0.4], [1.0, 0.0, 0.0, 0.0]];
        let sigma = proj
            .forward(Array2::zeros((2, 1)).view(), x_b.view(), None)
            .unwrap();

        assert_eq!(sigma, x_b);
    }

    #[test]
    fn test_rejects_non_square_recurrent() {
        let ff = Linear::from_parts(Array2::zeros((2, 1)), None).unwrap();
        let result = GroupedProjection::new(Box::new(ff), identity(3), 2, Dropout::new(0.0));
        assert!(matches!(
            result,
            Err(RsmError::DimensionMismatch { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn test_rejects_wrong_input_width() {
        let ff = Linear::from_parts(Array2::zeros((2, 3)), None).unwrap();
        let proj = GroupedProjection::new(Box::new(ff), identity(4), 2, Dropout::new(0.0)).unwrap();

        let result = proj.forward(
            Array2::zeros((1, 2)).view(),
            Array2::zeros((1, 4)).view(),
            None,
        );
        assert!(result.is_err());
    }
}
