//! Dense building blocks: linear maps, dropout, nonlinearities.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::{Result, RsmError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Negative slope of [`leaky_relu`].
pub const LEAKY_RELU_SLOPE: f32 = 0.01;

/// Anything that maps a `(batch, in_dim)` tensor to `(batch, out_dim)`.
///
/// The recurrent projection is held behind this trait so a gated
/// sub-layer (for example an active-dendrite layer) can replace the plain
/// dense map without the projection knowing about it.
pub trait LinearMap: fmt::Debug + Send + Sync {
    fn in_dim(&self) -> usize;

    fn out_dim(&self) -> usize;

    /// Apply the map to every row of `input`.
    fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32>;
}

/// Dense affine map `y = x W^T + b`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Linear {
    /// Shape `(out_dim, in_dim)`.
    weights: Array2<f32>,
    bias: Option<Array1<f32>>,
}

impl Linear {
    /// Create a layer with weights and bias drawn from
    /// `U(-1/sqrt(in_dim), 1/sqrt(in_dim))`.
    pub fn new<R: Rng>(input_dim: usize, output_dim: usize, use_bias: bool, rng: &mut R) -> Self {
        let bound = 1.0 / (input_dim.max(1) as f32).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);

        let weights = Array2::from_shape_fn((output_dim, input_dim), |_| dist.sample(rng));
        let bias = use_bias.then(|| Array1::from_shape_fn(output_dim, |_| dist.sample(rng)));

        Self { weights, bias }
    }

    /// Build a layer from explicit weights `(out_dim, in_dim)` and bias.
    pub fn from_parts(weights: Array2<f32>, bias: Option<Array1<f32>>) -> Result<Self> {
        if let Some(b) = &bias {
            RsmError::check("linear bias", weights.nrows(), b.len())?;
        }
        Ok(Self { weights, bias })
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }
}

impl LinearMap for Linear {
    fn in_dim(&self) -> usize {
        self.weights.ncols()
    }

    fn out_dim(&self) -> usize {
        self.weights.nrows()
    }

    fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut output = input.dot(&self.weights.t());
        if let Some(bias) = &self.bias {
            output += bias;
        }
        output
    }
}

/// Inverted dropout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    p: f32,
}

impl Dropout {
    pub fn new(p: f32) -> Self {
        Self { p }
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    /// Zero each element with probability `p` and rescale survivors by
    /// `1 / (1 - p)`. Without an RNG (evaluation) the input is returned as is.
    pub fn apply(&self, input: ArrayView2<'_, f32>, rng: Option<&mut StdRng>) -> Array2<f32> {
        match rng {
            Some(rng) if self.p > 0.0 => {
                let scale = 1.0 / (1.0 - self.p);
                input.mapv(|v| {
                    if rng.gen::<f32>() < self.p {
                        0.0
                    } else {
                        v * scale
                    }
                })
            }
            _ => input.to_owned(),
        }
    }
}

/// Nonlinearity applied to the masked potential.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Activation {
    #[default]
    Tanh,
    Relu,
}

impl Activation {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Tanh => x.tanh(),
            Self::Relu => x.max(0.0),
        }
    }

    /// Derivative with respect to the pre-activation `x`.
    #[inline]
    pub fn derivative(self, x: f32) -> f32 {
        match self {
            Self::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Self::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tanh => "tanh",
            Self::Relu => "relu",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Activation {
    type Err = RsmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tanh" => Ok(Self::Tanh),
            "relu" => Ok(Self::Relu),
            other => Err(RsmError::UnknownActivation(other.to_string())),
        }
    }
}

#[inline]
pub fn leaky_relu(x: f32) -> f32 {
    if x >= 0.0 {
        x
    } else {
        x * LEAKY_RELU_SLOPE
    }
}
