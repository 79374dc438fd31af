//! Adaptive column boosting.
//!
//! A [`GroupGate`] turns per-group potentials into a binary group mask. The
//! stock [`KWinnersGate`] boosts groups that have been winning less often
//! than the target density, so that over time every group takes part in the
//! code.

use std::fmt;

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::select::top_k;

/// Maps a `(batch, groups)` potential to a binary `(batch, groups)` mask.
pub trait GroupGate: fmt::Debug + Send + Sync {
    /// Number of groups this gate was built for.
    fn groups(&self) -> usize;

    /// Select winning groups. Gates may adapt internal statistics when
    /// `training` is set; with `training == false` they must be pure.
    fn select(&mut self, lambda: ArrayView2<'_, f32>, training: bool) -> Array2<f32>;
}

/// k-winners with duty-cycle boosting.
///
/// `boost = exp((target_density - duty_cycle) * boost_strength)` where
/// `target_density = k / groups`. Winners are the top `k` of
/// `lambda * boost` for each row.
#[derive(Debug, Clone)]
pub struct KWinnersGate {
    k: usize,
    boost_strength: f32,
    duty_cycle_period: usize,
    duty_cycles: Array1<f32>,
    rows_seen: usize,
}

impl KWinnersGate {
    pub fn new(groups: usize, k: usize, boost_strength: f32, duty_cycle_period: usize) -> Self {
        Self {
            k,
            boost_strength,
            duty_cycle_period,
            duty_cycles: Array1::zeros(groups),
            rows_seen: 0,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn target_density(&self) -> f32 {
        self.k as f32 / self.duty_cycles.len().max(1) as f32
    }

    /// Running fraction of rows in which each group won.
    pub fn duty_cycles(&self) -> &Array1<f32> {
        &self.duty_cycles
    }

    pub fn boost_factors(&self) -> Array1<f32> {
        let target = self.target_density();
        let strength = self.boost_strength;
        self.duty_cycles.mapv(|duty| ((target - duty) * strength).exp())
    }

    fn update_duty_cycles(&mut self, mask: ArrayView2<'_, f32>) {
        let batch = mask.nrows();
        if batch == 0 {
            return;
        }
        self.rows_seen += batch;

        let period = self.duty_cycle_period.min(self.rows_seen).max(batch) as f32;
        let carried = (period - batch as f32).max(0.0);
        let active = mask.sum_axis(Axis(0));

        self.duty_cycles
            .zip_mut_with(&active, |duty, &wins| *duty = (*duty * carried + wins) / period);
    }
}

impl GroupGate for KWinnersGate {
    fn groups(&self) -> usize {
        self.duty_cycles.len()
    }

    fn select(&mut self, lambda: ArrayView2<'_, f32>, training: bool) -> Array2<f32> {
        let boost = self.boost_factors();
        let mut mask = Array2::zeros(lambda.raw_dim());

        for (row, mut mask_row) in lambda.rows().into_iter().zip(mask.rows_mut()) {
            let boosted = &row * &boost;
            for group in top_k(boosted.iter(), self.k) {
                mask_row[group] = 1.0;
            }
        }

        if training {
            self.update_duty_cycles(mask.view());
        }
        mask
    }
}
