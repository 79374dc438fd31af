//! Layer configuration

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, RsmError};
use crate::nn::Activation;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How winning groups are chosen from the per-group potentials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BoostStrategy {
    /// Top-k groups by inhibited potential.
    #[default]
    RsmInhibition,
    /// Top-k groups after duty-cycle boosting.
    ColBoosting,
}

impl BoostStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RsmInhibition => "rsm_inhibition",
            Self::ColBoosting => "col_boosting",
        }
    }
}

impl fmt::Display for BoostStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoostStrategy {
    type Err = RsmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rsm_inhibition" => Ok(Self::RsmInhibition),
            "col_boosting" => Ok(Self::ColBoosting),
            other => Err(RsmError::UnknownBoostStrategy(other.to_string())),
        }
    }
}

/// Configuration for an RSM layer.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RsmConfig {
    /// Input dimension per step.
    pub d_in: usize,

    /// Prediction dimension per step.
    pub d_out: usize,

    /// Number of groups.
    pub m: usize,

    /// Cells per group.
    pub n: usize,

    /// Winning groups per step.
    pub k: usize,

    /// Winning cells inside each winning group.
    pub k_winner_cells: usize,

    /// Inhibition trace decay (0.0 = no inhibition memory, 1.0 = no decay).
    pub gamma: f32,

    /// Memory trace decay (0.0 = no integration, 1.0 = no decay).
    pub eps: f32,

    /// Nonlinearity applied to masked potentials.
    pub activation_fn: Activation,

    /// Group selection strategy.
    pub boost_strat: BoostStrategy,

    /// Decode from every cell instead of the per-group maximum.
    pub decode_from_full_memory: bool,

    /// Scalar gain on the recurrent input.
    pub pred_gain: f32,

    /// L1-normalize the recurrent input per sequence.
    pub x_b_norm: bool,

    /// Trailing cells of each group that always fire.
    pub col_output_cells: Option<usize>,

    /// Learn bias terms in every linear map.
    pub use_bias: bool,

    /// Dropout probability on the recurrent input while training.
    pub dropout_p: f32,

    /// Boosting strength for `col_boosting`.
    pub boost_strength: f32,

    /// Duty cycle averaging window for `col_boosting`, in rows seen.
    pub duty_cycle_period: usize,

    /// Seed for weight initialization and dropout.
    pub seed: u64,
}

impl RsmConfig {
    /// Create a configuration with the given shape and default dynamics.
    pub fn new(d_in: usize, d_out: usize, m: usize, n: usize, k: usize) -> Self {
        Self {
            d_in,
            d_out,
            m,
            n,
            k,
            k_winner_cells: 1,
            gamma: 0.5,
            eps: 0.5,
            activation_fn: Activation::Tanh,
            boost_strat: BoostStrategy::RsmInhibition,
            decode_from_full_memory: false,
            pred_gain: 1.0,
            x_b_norm: false,
            col_output_cells: None,
            use_bias: true,
            dropout_p: 0.0,
            boost_strength: 1.0,
            duty_cycle_period: 1000,
            seed: 0,
        }
    }

    pub fn with_k_winner_cells(mut self, k_winner_cells: usize) -> Self {
        self.k_winner_cells = k_winner_cells;
        self
    }

    /// Set inhibition (`gamma`) and memory (`eps`) decay rates.
    pub fn with_decay(mut self, gamma: f32, eps: f32) -> Self {
        self.gamma = gamma;
        self.eps = eps;
        self
    }

    pub fn with_activation(mut self, activation_fn: Activation) -> Self {
        self.activation_fn = activation_fn;
        self
    }

    pub fn with_boost_strategy(mut self, boost_strat: BoostStrategy) -> Self {
        self.boost_strat = boost_strat;
        self
    }

    pub fn with_full_memory_decode(mut self, decode_from_full_memory: bool) -> Self {
        self.decode_from_full_memory = decode_from_full_memory;
        self
    }

    /// Set recurrent gain and whether the recurrent input is L1-normalized.
    pub fn with_recurrent_gain(mut self, pred_gain: f32, x_b_norm: bool) -> Self {
        self.pred_gain = pred_gain;
        self.x_b_norm = x_b_norm;
        self
    }

    pub fn with_output_cells(mut self, col_output_cells: usize) -> Self {
        self.col_output_cells = Some(col_output_cells);
        self
    }

    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn with_dropout(mut self, dropout_p: f32) -> Self {
        self.dropout_p = dropout_p;
        self
    }

    pub fn with_boosting(mut self, boost_strength: f32, duty_cycle_period: usize) -> Self {
        self.boost_strength = boost_strength;
        self.duty_cycle_period = duty_cycle_period;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Total number of cells (`m * n`).
    pub fn total_cells(&self) -> usize {
        self.m * self.n
    }

    /// Width of the decoder input.
    pub fn decode_width(&self) -> usize {
        if self.decode_from_full_memory {
            self.total_cells()
        } else {
            self.m
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Result<()> {
            Err(RsmError::InvalidConfig(msg))
        }

        if self.d_in == 0 || self.d_out == 0 {
            return invalid("d_in and d_out must be > 0".into());
        }
        if self.m == 0 || self.n == 0 {
            return invalid("m and n must be > 0".into());
        }
        if self.k == 0 || self.k > self.m {
            return invalid(format!("k must be in 1..={} (got {})", self.m, self.k));
        }
        if self.k_winner_cells == 0 || self.k_winner_cells > self.n {
            return invalid(format!(
                "k_winner_cells must be in 1..={} (got {})",
                self.n, self.k_winner_cells
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return invalid(format!("gamma must be in [0, 1] (got {})", self.gamma));
        }
        if !(0.0..=1.0).contains(&self.eps) {
            return invalid(format!("eps must be in [0, 1] (got {})", self.eps));
        }
        if !(0.0..1.0).contains(&self.dropout_p) {
            return invalid(format!("dropout_p must be in [0, 1) (got {})", self.dropout_p));
        }
        if !self.pred_gain.is_finite() {
            return invalid(format!("pred_gain must be finite (got {})", self.pred_gain));
        }
        if let Some(cells) = self.col_output_cells {
            if cells > self.n {
                return invalid(format!(
                    "col_output_cells must be <= n = {} (got {})",
                    self.n, cells
                ));
            }
        }
        if self.boost_strat == BoostStrategy::ColBoosting {
            if self.duty_cycle_period == 0 {
                return invalid("duty_cycle_period must be > 0".into());
            }
            if !self.boost_strength.is_finite() || self.boost_strength < 0.0 {
                return invalid(format!(
                    "boost_strength must be finite and >= 0 (got {})",
                    self.boost_strength
                ));
            }
        }
        Ok(())
    }
}

impl Default for RsmConfig {
    fn default() -> Self {
        Self::new(28 * 28, 28 * 28, 200, 6, 25)
    }
}
