//! RSM Cell - recurrent sparse memory with inhibited k-winner competition
//!
//! A stateful layer that keeps a sparse distributed activity pattern over
//! time. Each step combines bottom-up input with a decaying memory of its own
//! past activity and predicts the next input.
//!
//! # Core Types
//!
//! - **RsmLayer**: The recurrence driver, one step per input row
//! - **CompetitiveSelector**: Group and cell k-winners under inhibition
//! - **InhibitionMemoryTracker**: The two decaying traces `phi` and `psi`
//! - **HiddenState**: `(x_b, phi, psi)`, the only state carried across steps
//!
//! # Architecture: Project / Compete / Remember
//!
//! 1. **Project** - `sigma` = feed-forward potential (shared by the `n`
//!    cells of a group) + recurrent potential (per cell)
//! 2. **Compete** - inhibited potential `pi`, top cells per group, top
//!    groups, then the nonlinearity on the surviving `sigma`
//! 3. **Remember** - traces decay then saturate against the new activity;
//!    the memory trace becomes the next recurrent input
//!
//! A bottleneck decoder reads each step's activity to emit a prediction.
//! Observers can subscribe to completed steps; they never take part in the
//! computation.
//!
//! # Example
//!
//! ```rust
//! use rsm_cell::{RsmConfig, RsmLayer};
//! use ndarray::Array3;
//!
//! // 8 inputs, 8 outputs, 10 groups of 3 cells, 2 winning groups
//! let config = RsmConfig::new(8, 8, 10, 3, 2).with_decay(0.5, 0.8);
//! let mut layer = RsmLayer::new(config).unwrap();
//! layer.eval();
//!
//! // (seq_len, batch, d_in)
//! let input = Array3::from_shape_fn((4, 2, 8), |(t, b, d)| ((t + b + d) % 3) as f32);
//! let hidden = layer.init_hidden(2);
//!
//! let output = layer.forward(input.view(), hidden).unwrap();
//! assert_eq!(output.predictions.dim(), (4, 2, 8));
//! assert_eq!(output.recurrent_inputs.dim(), (4, 2, 30));
//!
//! // Continue with the next chunk of the same sequences
//! let more = layer.forward(input.view(), output.hidden).unwrap();
//! assert_eq!(more.hidden.batch_size(), 2);
//! ```

mod boost;
mod config;
mod decode;
mod error;
mod layer;
mod nn;
mod observer;
mod projection;
mod select;
mod state;
mod trace;

pub use boost::{GroupGate, KWinnersGate};
pub use config::{BoostStrategy, RsmConfig};
pub use decode::{DecodeBottleneck, RsmPredictor};
pub use error::{Result, RsmError};
pub use layer::{RsmLayer, RsmOutput, StepOutput};
pub use nn::{leaky_relu, Activation, Dropout, Linear, LinearMap, LEAKY_RELU_SLOPE};
pub use observer::{ChannelObserver, FnObserver, StepEvent, StepObserver, StepSummary};
pub use projection::GroupedProjection;
pub use select::{group_max, inhibited_potential, CompetitiveSelector, GroupSelector, Selection};
pub use state::HiddenState;
pub use trace::{decay_saturate, InhibitionMemoryTracker, NORM_EPSILON};
