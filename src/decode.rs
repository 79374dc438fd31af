//! Readouts: the per-step bottleneck decoder and the predictor head.

use ndarray::{Array2, ArrayView2, ArrayView3};
use rand::Rng;

use crate::error::{Result, RsmError};
use crate::nn::{leaky_relu, Linear, LinearMap};
use crate::select::group_max;

/// Linear readout from the sparse activity to the next-step prediction.
///
/// With `from_full_memory == false` the activity is first pooled to one
/// value per group, forcing the prediction through an `m`-wide bottleneck.
#[derive(Debug, Clone)]
pub struct DecodeBottleneck {
    linear: Linear,
    cells_per_group: usize,
    from_full_memory: bool,
}

impl DecodeBottleneck {
    pub fn new(linear: Linear, cells_per_group: usize, from_full_memory: bool) -> Result<Self> {
        if cells_per_group == 0 {
            return Err(RsmError::InvalidConfig(
                "decoder needs at least one cell per group".into(),
            ));
        }
        Ok(Self {
            linear,
            cells_per_group,
            from_full_memory,
        })
    }

    pub fn from_full_memory(&self) -> bool {
        self.from_full_memory
    }

    /// Width of the decoder input.
    pub fn in_dim(&self) -> usize {
        self.linear.in_dim()
    }

    pub fn out_dim(&self) -> usize {
        self.linear.out_dim()
    }

    /// Predict from activity `(batch, total_cells)`.
    pub fn forward(&self, activity: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        if self.from_full_memory {
            RsmError::check("decoder input", self.in_dim(), activity.ncols())?;
            Ok(self.linear.forward(activity))
        } else {
            let pooled = group_max(activity, self.cells_per_group);
            RsmError::check("decoder groups", self.in_dim(), pooled.ncols())?;
            Ok(self.linear.forward(pooled.view()))
        }
    }
}

/// Two-layer feed-forward head over the memory trace.
///
/// `Linear -> leaky ReLU -> Linear -> leaky ReLU`, applied independently to
/// every `(step, sequence)` row.
#[derive(Debug, Clone)]
pub struct RsmPredictor {
    hidden: Linear,
    output: Linear,
}

impl RsmPredictor {
    pub fn new<R: Rng>(d_in: usize, d_out: usize, hidden_size: usize, rng: &mut R) -> Self {
        Self {
            hidden: Linear::new(d_in, hidden_size, true, rng),
            output: Linear::new(hidden_size, d_out, true, rng),
        }
    }

    pub fn from_parts(hidden: Linear, output: Linear) -> Result<Self> {
        RsmError::check("predictor hidden width", hidden.out_dim(), output.in_dim())?;
        Ok(Self { hidden, output })
    }

    pub fn d_in(&self) -> usize {
        self.hidden.in_dim()
    }

    pub fn d_out(&self) -> usize {
        self.output.out_dim()
    }

    /// Map `(seq_len, batch, d_in)` to `(seq_len * batch, d_out)`.
    pub fn forward(&self, memory: ArrayView3<'_, f32>) -> Result<Array2<f32>> {
        let (seq_len, batch, cells) = memory.dim();
        RsmError::check("predictor input", self.d_in(), cells)?;

        let rows = memory
            .to_owned()
            .into_shape_with_order((seq_len * batch, cells))
            .map_err(|_| RsmError::mismatch("predictor rows", seq_len * batch, memory.len()))?;

        let hidden = self.hidden.forward(rows.view()).mapv(leaky_relu);
        Ok(self.output.forward(hidden.view()).mapv(leaky_relu))
    }
}
