//! Inhibition and memory traces - decay then saturate
//!
//! Both traces follow the same one-sided leaky rule:
//!
//! ```text
//! trace' = max(trace * retention, y)
//! ```
//!
//! A trace never falls below its decayed previous value, and a fresh
//! activation larger than that value replaces it. The inhibition trace
//! (`phi`, retention `gamma`) suppresses recently active cells; the memory
//! trace (`psi`, retention `eps`) becomes the next recurrent input.

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, RsmError};
use crate::state::HiddenState;

/// Guard added to the memory mass before normalizing the recurrent input.
pub const NORM_EPSILON: f32 = 1e-9;

/// Decay every value by `retention`, then saturate against `activity`.
pub fn decay_saturate(trace: &mut Array2<f32>, retention: f32, activity: ArrayView2<'_, f32>) {
    trace.zip_mut_with(&activity, |t, &y| *t = (*t * retention).max(y));
}

/// Updates `(phi, psi)` from a step's activity and derives `x_b`.
#[derive(Clone, Debug, PartialEq)]
pub struct InhibitionMemoryTracker {
    /// Inhibition retention per step.
    gamma: f32,
    /// Memory retention per step.
    eps: f32,
    pred_gain: f32,
    x_b_norm: bool,
}

impl InhibitionMemoryTracker {
    pub fn new(gamma: f32, eps: f32) -> Self {
        Self {
            gamma,
            eps,
            pred_gain: 1.0,
            x_b_norm: false,
        }
    }

    /// Scale the recurrent input by `pred_gain`, after L1 normalization per
    /// sequence when `x_b_norm` is set.
    pub fn with_recurrent_gain(mut self, pred_gain: f32, x_b_norm: bool) -> Self {
        self.pred_gain = pred_gain;
        self.x_b_norm = x_b_norm;
        self
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn eps(&self) -> f32 {
        self.eps
    }

    /// Recurrent input derived from the memory trace.
    pub fn recurrent_input(&self, psi: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut x_b = psi.mapv(|v| v * self.pred_gain);
        if self.x_b_norm {
            for (mut row, psi_row) in x_b.rows_mut().into_iter().zip(psi.rows()) {
                let mass = psi_row.sum() + NORM_EPSILON;
                row.mapv_inplace(|v| v / mass);
            }
        }
        x_b
    }

    /// Advance the hidden state past a step whose activity was `activity`.
    pub fn advance(
        &self,
        activity: ArrayView2<'_, f32>,
        hidden: HiddenState,
    ) -> Result<HiddenState> {
        hidden.check(activity.nrows(), activity.ncols())?;

        let HiddenState {
            x_b: _,
            mut phi,
            mut psi,
        } = hidden;

        decay_saturate(&mut psi, self.eps, activity);
        decay_saturate(&mut phi, self.gamma, activity);
        let x_b = self.recurrent_input(psi.view());

        Ok(HiddenState { x_b, phi, psi })
    }

    /// Decay-then-saturate both traces without touching `x_b`.
    pub fn update(
        &self,
        activity: ArrayView2<'_, f32>,
        mut phi: Array2<f32>,
        mut psi: Array2<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        RsmError::check("inhibition trace cells", activity.ncols(), phi.ncols())?;
        RsmError::check("memory trace cells", activity.ncols(), psi.ncols())?;
        RsmError::check("inhibition trace batch", activity.nrows(), phi.nrows())?;
        RsmError::check("memory trace batch", activity.nrows(), psi.nrows())?;

        decay_saturate(&mut phi, self.gamma, activity);
        decay_saturate(&mut psi, self.eps, activity);
        Ok((phi, psi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_decay_saturate() {
        let mut trace = array![[1.0, 0.2, 0.0]];
        decay_saturate(&mut trace, 0.5, array![[0.0, 0.9, -0.3]].view());
        assert_eq!(trace, array![[0.5, 0.9, 0.0]]);
    }

    #[test]
    fn test_update_independent_decays() {
        let tracker = InhibitionMemoryTracker::new(0.5, 0.25);
        let (phi, psi) = tracker
            .update(
                array![[0.0, 0.6]].view(),
                array![[0.8, 0.8]],
                array![[0.8, 0.8]],
            )
            .unwrap();

        assert_relative_eq!(phi[[0, 0]], 0.4);
        assert_relative_eq!(psi[[0, 0]], 0.2);
        assert_relative_eq!(phi[[0, 1]], 0.6);
        assert_relative_eq!(psi[[0, 1]], 0.6);
    }

    #[test]
    fn test_zero_decay_tracks_activity() {
        let tracker = InhibitionMemoryTracker::new(0.0, 0.0);
        let y = array![[0.3, 0.0, 0.7]];
        let (phi, psi) = tracker
            .update(y.view(), Array2::ones((1, 3)), Array2::ones((1, 3)))
            .unwrap();
        assert_eq!(phi, y);
        assert_eq!(psi, y);
    }

    #[test]
    fn test_recurrent_input_gain() {
        let tracker = InhibitionMemoryTracker::new(0.5, 0.5).with_recurrent_gain(2.0, false);
        let x_b = tracker.recurrent_input(array![[0.25, 0.5]].view());
        assert_eq!(x_b, array![[0.5, 1.0]]);
    }

    #[test]
    fn test_recurrent_input_normalized_sums_to_gain() {
        let tracker = InhibitionMemoryTracker::new(0.5, 0.5).with_recurrent_gain(3.0, true);
        let x_b = tracker.recurrent_input(array![[0.2, 0.3, 0.5], [0.1, 0.0, 0.0]].view());

        assert_relative_eq!(x_b.row(0).sum(), 3.0, epsilon = 1e-5);
        assert_relative_eq!(x_b.row(1).sum(), 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_recurrent_input_normalized_empty_memory() {
        let tracker = InhibitionMemoryTracker::new(0.5, 0.5).with_recurrent_gain(1.0, true);
        let x_b = tracker.recurrent_input(Array2::zeros((1, 4)).view());
        assert!(x_b.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_advance_rejects_wrong_batch() {
        let tracker = InhibitionMemoryTracker::new(0.5, 0.5);
        let result = tracker.advance(Array2::zeros((2, 4)).view(), HiddenState::zeros(1, 4));
        assert!(result.is_err());
    }
}
