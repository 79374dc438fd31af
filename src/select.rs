//! Competitive selection: inhibited k-winners over groups and cells.
//!
//! # Algorithm
//!
//! ```text
//! pi      = (1 - phi) * (sigma - min(sigma) + 1)      per sequence
//! M_cell  = top k_winner_cells of pi inside each group
//! lambda  = max of pi inside each group
//! M_group = top k groups of lambda   (or a boosting gate)
//! y       = act(M_cell * M_group * sigma)
//! ```
//!
//! The masks are computed from plain values and are constants as far as
//! any gradient is concerned. Only the surviving `sigma` entries and the
//! nonlinearity carry gradient; see [`Selection::backward`].
//!
//! Order among exactly equal potentials is unspecified.

use ndarray::{s, Array2, ArrayView2, Zip};

use crate::boost::GroupGate;
use crate::error::{Result, RsmError};
use crate::nn::Activation;

/// Indices of the `k` largest values, in unspecified order.
pub(crate) fn top_k<'a, I>(values: I, k: usize) -> Vec<usize>
where
    I: IntoIterator<Item = &'a f32>,
{
    let mut indexed: Vec<(usize, f32)> = values.into_iter().copied().enumerate().collect();
    if k == 0 {
        return Vec::new();
    }
    if k < indexed.len() {
        indexed.select_nth_unstable_by(k - 1, |a, b| b.1.total_cmp(&a.1));
        indexed.truncate(k);
    }
    indexed.into_iter().map(|(i, _)| i).collect()
}

/// Maximum of each group of `cells_per_group` consecutive cells.
///
/// Input `(batch, groups * cells_per_group)`, output `(batch, groups)`.
///
/// # Panics
///
/// Panics if `cells_per_group` is zero.
pub fn group_max(activity: ArrayView2<'_, f32>, cells_per_group: usize) -> Array2<f32> {
    let groups = activity.ncols() / cells_per_group;
    Array2::from_shape_fn((activity.nrows(), groups), |(row, group)| {
        let start = group * cells_per_group;
        activity
            .slice(s![row, start..start + cells_per_group])
            .fold(f32::NEG_INFINITY, |acc, &v| acc.max(v))
    })
}

/// Inhibition-adjusted, strictly shifted potential.
///
/// The shift uses each row's own minimum so sequences in a batch never
/// influence each other's selection.
pub fn inhibited_potential(sigma: ArrayView2<'_, f32>, phi: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut pi = sigma.to_owned();
    for (mut row, phi_row) in pi.rows_mut().into_iter().zip(phi.rows()) {
        let min = row.fold(f32::INFINITY, |acc, &v| acc.min(v));
        row.zip_mut_with(&phi_row, |p, &inhibition| {
            *p = (1.0 - inhibition) * (*p - min + 1.0)
        });
    }
    pi
}

/// How winning groups are picked.
#[derive(Debug)]
pub enum GroupSelector {
    /// Top `k` groups by inhibited group maximum.
    Inhibition { k: usize },
    /// Delegate to an adaptive gate.
    Boosting(Box<dyn GroupGate>),
}

impl GroupSelector {
    fn select(&mut self, lambda: ArrayView2<'_, f32>, training: bool) -> Result<Array2<f32>> {
        match self {
            Self::Inhibition { k } => {
                let mut mask = Array2::zeros(lambda.raw_dim());
                for (row, mut mask_row) in lambda.rows().into_iter().zip(mask.rows_mut()) {
                    for group in top_k(row.iter(), *k) {
                        mask_row[group] = 1.0;
                    }
                }
                Ok(mask)
            }
            Self::Boosting(gate) => {
                let mask = gate.select(lambda, training);
                RsmError::check("group gate rows", lambda.nrows(), mask.nrows())?;
                RsmError::check("group gate groups", lambda.ncols(), mask.ncols())?;
                Ok(mask)
            }
        }
    }
}

/// Result of one competitive selection.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Inhibited potential `pi` after output-cell overrides.
    pub potential: Array2<f32>,
    /// Binary cell mask (group mask applied).
    pub mask: Array2<f32>,
    /// `mask * sigma`.
    pub pre_activation: Array2<f32>,
    /// `act(pre_activation)`, the step's sparse activity `y`.
    pub activity: Array2<f32>,
    activation: Activation,
    cells_per_group: usize,
}

impl Selection {
    /// Gradient of a loss with respect to `sigma`, given its gradient with
    /// respect to `activity`. The mask is held constant.
    pub fn backward(&self, grad_activity: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        RsmError::check("gradient batch", self.mask.nrows(), grad_activity.nrows())?;
        RsmError::check("gradient cells", self.mask.ncols(), grad_activity.ncols())?;

        let activation = self.activation;
        let mut grad_sigma = Array2::zeros(self.mask.raw_dim());
        Zip::from(&mut grad_sigma)
            .and(&grad_activity)
            .and(&self.pre_activation)
            .and(&self.mask)
            .for_each(|out, &grad, &pre, &mask| {
                *out = grad * activation.derivative(pre) * mask;
            });
        Ok(grad_sigma)
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn cells_per_group(&self) -> usize {
        self.cells_per_group
    }

    /// Winning groups of batch row `row`, ascending. Empty when `row` is
    /// outside the batch.
    pub fn winning_groups(&self, row: usize) -> Vec<usize> {
        if row >= self.mask.nrows() {
            return Vec::new();
        }
        group_max(self.mask.slice(s![row..row + 1, ..]), self.cells_per_group)
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > 0.0)
            .map(|(g, _)| g)
            .collect()
    }

    /// Winning cells of batch row `row` as flat indices, ascending. Empty
    /// when `row` is outside the batch.
    pub fn winning_cells(&self, row: usize) -> Vec<usize> {
        if row >= self.mask.nrows() {
            return Vec::new();
        }
        self.mask
            .row(row)
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > 0.0)
            .map(|(c, _)| c)
            .collect()
    }
}

/// Group and cell k-winner competition with history-dependent inhibition.
#[derive(Debug)]
pub struct CompetitiveSelector {
    groups: usize,
    cells_per_group: usize,
    k_winner_cells: usize,
    output_cells: usize,
    activation: Activation,
    group_selector: GroupSelector,
}

impl CompetitiveSelector {
    pub fn new(
        groups: usize,
        cells_per_group: usize,
        k_winner_cells: usize,
        activation: Activation,
        group_selector: GroupSelector,
    ) -> Result<Self> {
        if groups == 0 || cells_per_group == 0 {
            return Err(RsmError::InvalidConfig(
                "selector needs at least one group and one cell per group".into(),
            ));
        }
        if k_winner_cells == 0 || k_winner_cells > cells_per_group {
            return Err(RsmError::InvalidConfig(format!(
                "k_winner_cells must be in 1..={cells_per_group} (got {k_winner_cells})"
            )));
        }
        if let GroupSelector::Boosting(gate) = &group_selector {
            RsmError::check("group gate groups", groups, gate.groups())?;
        }
        Ok(Self {
            groups,
            cells_per_group,
            k_winner_cells,
            output_cells: 0,
            activation,
            group_selector,
        })
    }

    /// Reserve the last `cells` cells of every group as always-on output cells.
    pub fn with_output_cells(mut self, cells: usize) -> Self {
        self.output_cells = cells.min(self.cells_per_group);
        self
    }

    pub fn total_cells(&self) -> usize {
        self.groups * self.cells_per_group
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn group_selector(&self) -> &GroupSelector {
        &self.group_selector
    }

    /// Route group selection through `gate` from now on.
    pub fn set_group_gate(&mut self, gate: Box<dyn GroupGate>) -> Result<()> {
        RsmError::check("group gate groups", self.groups, gate.groups())?;
        self.group_selector = GroupSelector::Boosting(gate);
        Ok(())
    }

    /// Select the sparse activity for potential `sigma` under inhibition `phi`.
    pub fn select(
        &mut self,
        sigma: ArrayView2<'_, f32>,
        phi: ArrayView2<'_, f32>,
        training: bool,
    ) -> Result<Selection> {
        let total_cells = self.total_cells();
        RsmError::check("potential cells", total_cells, sigma.ncols())?;
        RsmError::check("inhibition cells", total_cells, phi.ncols())?;
        RsmError::check("inhibition batch", sigma.nrows(), phi.nrows())?;

        let n = self.cells_per_group;
        let forced = self.output_cells;
        let free = n - forced;
        let free_slots = self.k_winner_cells.saturating_sub(forced);

        let mut potential = inhibited_potential(sigma, phi);
        let mut mask = Array2::<f32>::zeros(sigma.raw_dim());

        for (mut pi_row, mut mask_row) in potential.rows_mut().into_iter().zip(mask.rows_mut()) {
            for group in 0..self.groups {
                let start = group * n;
                let mut pi_group = pi_row.slice_mut(s![start..start + n]);

                if forced > 0 {
                    let max = pi_group.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
                    pi_group.slice_mut(s![free..]).fill(max);
                    mask_row.slice_mut(s![start + free..start + n]).fill(1.0);
                }

                for cell in top_k(pi_group.slice(s![..free]).iter(), free_slots) {
                    mask_row[start + cell] = 1.0;
                }
            }
        }

        let lambda = group_max(potential.view(), n);
        let group_mask = self.group_selector.select(lambda.view(), training)?;

        for (mut mask_row, groups_row) in mask.rows_mut().into_iter().zip(group_mask.rows()) {
            for (cell, m) in mask_row.iter_mut().enumerate() {
                *m *= groups_row[cell / n];
            }
        }

        let pre_activation = &mask * &sigma;
        let activation = self.activation;
        let activity = pre_activation.mapv(|x| activation.apply(x));

        Ok(Selection {
            potential,
            mask,
            pre_activation,
            activity,
            activation,
            cells_per_group: n,
        })
    }
}
