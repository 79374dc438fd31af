//! The recurrent driver: one RSM layer run across a sequence.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::boost::{GroupGate, KWinnersGate};
use crate::config::{BoostStrategy, RsmConfig};
use crate::decode::DecodeBottleneck;
use crate::error::{Result, RsmError};
use crate::nn::{Dropout, Linear, LinearMap};
use crate::observer::{StepEvent, StepObserver};
use crate::projection::GroupedProjection;
use crate::select::{CompetitiveSelector, GroupSelector, Selection};
use crate::state::HiddenState;
use crate::trace::InhibitionMemoryTracker;

/// Everything one step produced.
#[derive(Clone, Debug)]
pub struct StepOutput {
    pub step: usize,
    /// Dense potential `(batch, total_cells)`.
    pub sigma: Array2<f32>,
    pub selection: Selection,
    /// Next-step prediction `(batch, d_out)`.
    pub prediction: Array2<f32>,
    /// State after this step.
    pub hidden: HiddenState,
}

impl StepOutput {
    pub fn event(&self) -> StepEvent<'_> {
        StepEvent {
            step: self.step,
            sigma: self.sigma.view(),
            selection: &self.selection,
            prediction: self.prediction.view(),
            hidden: &self.hidden,
        }
    }
}

/// Result of running a whole sequence.
#[derive(Clone, Debug)]
pub struct RsmOutput {
    /// `(seq_len, batch, d_out)`.
    pub predictions: Array3<f32>,
    /// State after the last step, ready to continue into the next sequence.
    pub hidden: HiddenState,
    /// Recurrent input after every step, `(seq_len, batch, total_cells)`.
    pub recurrent_inputs: Array3<f32>,
}

/// Recurrent sparse memory layer.
///
/// Each step computes the grouped potential, runs the inhibited k-winner
/// competition, decodes a prediction and advances the traces. Only the
/// [`HiddenState`] passed in and handed back survives between steps.
pub struct RsmLayer {
    config: RsmConfig,
    projection: GroupedProjection,
    selector: CompetitiveSelector,
    tracker: InhibitionMemoryTracker,
    decoder: DecodeBottleneck,
    observers: Vec<Arc<dyn StepObserver>>,
    rng: StdRng,
    training: bool,
}

impl RsmLayer {
    /// Build a layer with freshly initialized weights seeded from `config.seed`.
    pub fn new(config: RsmConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let total_cells = config.total_cells();

        let feedforward = Linear::new(config.d_in, config.m, config.use_bias, &mut rng);
        let recurrent = Linear::new(total_cells, total_cells, config.use_bias, &mut rng);
        let readout = Linear::new(config.decode_width(), config.d_out, config.use_bias, &mut rng);

        let projection = GroupedProjection::new(
            Box::new(feedforward),
            Box::new(recurrent),
            config.n,
            Dropout::new(config.dropout_p),
        )?;
        let decoder = DecodeBottleneck::new(readout, config.n, config.decode_from_full_memory)?;

        Self::assemble(config, projection, decoder, rng)
    }

    /// Build a layer around an existing projection and decoder.
    pub fn from_parts(
        config: RsmConfig,
        projection: GroupedProjection,
        decoder: DecodeBottleneck,
    ) -> Result<Self> {
        config.validate()?;

        RsmError::check("projection input", config.d_in, projection.d_in())?;
        RsmError::check("projection groups", config.m, projection.groups())?;
        RsmError::check("projection cells per group", config.n, projection.cells_per_group())?;
        if decoder.from_full_memory() != config.decode_from_full_memory {
            return Err(RsmError::InvalidConfig(
                "decoder and config disagree on decode_from_full_memory".into(),
            ));
        }
        RsmError::check("decoder input", config.decode_width(), decoder.in_dim())?;
        RsmError::check("decoder output", config.d_out, decoder.out_dim())?;

        let rng = StdRng::seed_from_u64(config.seed);
        Self::assemble(config, projection, decoder, rng)
    }

    fn assemble(
        config: RsmConfig,
        projection: GroupedProjection,
        decoder: DecodeBottleneck,
        rng: StdRng,
    ) -> Result<Self> {
        let group_selector = match config.boost_strat {
            BoostStrategy::RsmInhibition => GroupSelector::Inhibition { k: config.k },
            BoostStrategy::ColBoosting => GroupSelector::Boosting(Box::new(KWinnersGate::new(
                config.m,
                config.k,
                config.boost_strength,
                config.duty_cycle_period,
            ))),
        };

        let mut selector = CompetitiveSelector::new(
            config.m,
            config.n,
            config.k_winner_cells,
            config.activation_fn,
            group_selector,
        )?;
        if let Some(cells) = config.col_output_cells {
            selector = selector.with_output_cells(cells);
        }

        let tracker = InhibitionMemoryTracker::new(config.gamma, config.eps)
            .with_recurrent_gain(config.pred_gain, config.x_b_norm);

        debug!(
            m = config.m,
            n = config.n,
            k = config.k,
            k_winner_cells = config.k_winner_cells,
            boost_strat = %config.boost_strat,
            activation = %config.activation_fn,
            "rsm layer ready"
        );

        Ok(Self {
            config,
            projection,
            selector,
            tracker,
            decoder,
            observers: Vec::new(),
            rng,
            training: true,
        })
    }

    /// Replace the recurrent map, e.g. with a dendritic gating layer.
    pub fn with_recurrent_map(mut self, recurrent: Box<dyn LinearMap>) -> Result<Self> {
        self.projection = self.projection.with_recurrent(recurrent)?;
        Ok(self)
    }

    /// Select groups through `gate` instead of the configured strategy.
    pub fn with_group_gate(mut self, gate: Box<dyn GroupGate>) -> Result<Self> {
        self.selector.set_group_gate(gate)?;
        Ok(self)
    }

    /// Notify `observer` after every step.
    pub fn subscribe(&mut self, observer: Arc<dyn StepObserver>) {
        self.observers.push(observer);
    }

    /// Enable dropout and boosting adaptation.
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Disable dropout and boosting adaptation; forwards become deterministic.
    pub fn eval(&mut self) {
        self.training = false;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn config(&self) -> &RsmConfig {
        &self.config
    }

    pub fn projection(&self) -> &GroupedProjection {
        &self.projection
    }

    pub fn selector(&self) -> &CompetitiveSelector {
        &self.selector
    }

    pub fn tracker(&self) -> &InhibitionMemoryTracker {
        &self.tracker
    }

    pub fn decoder(&self) -> &DecodeBottleneck {
        &self.decoder
    }

    /// Zeroed hidden state for `batch` sequences.
    pub fn init_hidden(&self, batch: usize) -> HiddenState {
        HiddenState::zeros(batch, self.config.total_cells())
    }

    /// Run one transition: potential, competition, prediction, trace update.
    ///
    /// `step` is the position within the sequence, reported to observers.
    pub fn step(
        &mut self,
        step: usize,
        x_a: ArrayView2<'_, f32>,
        hidden: HiddenState,
    ) -> Result<StepOutput> {
        hidden.check(x_a.nrows(), self.config.total_cells())?;

        let dropout_rng = self.training.then_some(&mut self.rng);
        let sigma = self.projection.forward(x_a, hidden.x_b.view(), dropout_rng)?;
        let selection = self
            .selector
            .select(sigma.view(), hidden.phi.view(), self.training)?;
        let prediction = self.decoder.forward(selection.activity.view())?;
        let hidden = self.tracker.advance(selection.activity.view(), hidden)?;

        let output = StepOutput {
            step,
            sigma,
            selection,
            prediction,
            hidden,
        };

        if !self.observers.is_empty() {
            let event = output.event();
            for observer in &self.observers {
                observer.on_step(&event);
            }
        }
        trace!(step, memory_mass = output.hidden.psi.sum(), "rsm step");

        Ok(output)
    }

    /// Run `input` of shape `(seq_len, batch, d_in)` starting from `hidden`.
    pub fn forward(
        &mut self,
        input: ArrayView3<'_, f32>,
        hidden: HiddenState,
    ) -> Result<RsmOutput> {
        let (seq_len, batch, d_in) = input.dim();
        let total_cells = self.config.total_cells();
        RsmError::check("input features", self.config.d_in, d_in)?;
        hidden.check(batch, total_cells)?;

        debug!(seq_len, batch, training = self.training, "rsm forward");

        let mut predictions = Array3::zeros((seq_len, batch, self.config.d_out));
        let mut recurrent_inputs = Array3::zeros((seq_len, batch, total_cells));
        let mut hidden = hidden;

        for (t, x_a) in input.axis_iter(Axis(0)).enumerate() {
            let output = self.step(t, x_a, hidden)?;
            predictions
                .index_axis_mut(Axis(0), t)
                .assign(&output.prediction);
            recurrent_inputs
                .index_axis_mut(Axis(0), t)
                .assign(&output.hidden.x_b);
            hidden = output.hidden;
        }

        Ok(RsmOutput {
            predictions,
            hidden,
            recurrent_inputs,
        })
    }
}

impl fmt::Debug for RsmLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsmLayer")
            .field("config", &self.config)
            .field("training", &self.training)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
