//! Step observers - read-only hooks after every recurrence step
//!
//! Observers see each step once it is complete: the potential, the
//! selection, the prediction and the advanced hidden state. They receive
//! borrowed views and cannot alter the recurrence.

use std::sync::mpsc::Sender;

use ndarray::ArrayView2;

use crate::select::{group_max, Selection};
use crate::state::HiddenState;

/// Everything produced by one step, borrowed for the duration of the callback.
#[derive(Clone, Copy, Debug)]
pub struct StepEvent<'a> {
    /// Position in the current sequence.
    pub step: usize,
    /// Dense potential before competition.
    pub sigma: ArrayView2<'a, f32>,
    /// Masks and sparse activity.
    pub selection: &'a Selection,
    /// Next-step prediction.
    pub prediction: ArrayView2<'a, f32>,
    /// State after the step's trace update.
    pub hidden: &'a HiddenState,
}

impl StepEvent<'_> {
    pub fn summary(&self) -> StepSummary {
        let mask = &self.selection.mask;
        let cells_per_group = self.selection.cells_per_group();
        StepSummary {
            step: self.step,
            active_cells: mask.iter().filter(|&&m| m > 0.0).count(),
            active_groups: group_max(mask.view(), cells_per_group)
                .iter()
                .filter(|&&m| m > 0.0)
                .count(),
            memory_mass: self.hidden.psi.sum(),
            inhibition_mass: self.hidden.phi.sum(),
        }
    }
}

/// Owned digest of a step, summed over the batch.
#[derive(Clone, Debug, PartialEq)]
pub struct StepSummary {
    pub step: usize,
    /// Selected cells.
    pub active_cells: usize,
    /// Selected groups.
    pub active_groups: usize,
    /// Sum of the memory trace.
    pub memory_mass: f32,
    /// Sum of the inhibition trace.
    pub inhibition_mass: f32,
}

/// Observer that receives every completed step
pub trait StepObserver: Send + Sync {
    fn on_step(&self, event: &StepEvent<'_>);
}

/// Function-based observer for simple cases
pub struct FnObserver<F: Fn(&StepEvent<'_>) + Send + Sync>(pub F);

impl<F: Fn(&StepEvent<'_>) + Send + Sync> StepObserver for FnObserver<F> {
    fn on_step(&self, event: &StepEvent<'_>) {
        (self.0)(event);
    }
}

/// Channel-based observer - sends step summaries to a channel
pub struct ChannelObserver {
    sender: Sender<StepSummary>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<StepSummary>) -> Self {
        Self { sender }
    }
}

impl StepObserver for ChannelObserver {
    fn on_step(&self, event: &StepEvent<'_>) {
        let _ = self.sender.send(event.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Activation;
    use crate::select::{CompetitiveSelector, GroupSelector};
    use ndarray::{array, Array2};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn event_parts() -> (Array2<f32>, Selection, Array2<f32>, HiddenState) {
        let mut selector =
            CompetitiveSelector::new(2, 2, 1, Activation::Relu, GroupSelector::Inhibition { k: 1 })
                .unwrap();
        let sigma = array![[0.5, 0.0, 0.1, 2.0]];
        let selection = selector
            .select(sigma.view(), Array2::zeros((1, 4)).view(), false)
            .unwrap();
        let hidden = HiddenState::new(
            selection.activity.clone(),
            selection.activity.clone(),
            array![[0.25, 0.0, 0.0, 2.0]],
        )
        .unwrap();
        (sigma, selection, Array2::zeros((1, 3)), hidden)
    }

    #[test]
    fn test_summary_counts() {
        let (sigma, selection, prediction, hidden) = event_parts();
        let event = StepEvent {
            step: 7,
            sigma: sigma.view(),
            selection: &selection,
            prediction: prediction.view(),
            hidden: &hidden,
        };

        let summary = event.summary();
        assert_eq!(summary.step, 7);
        assert_eq!(summary.active_cells, 1);
        assert_eq!(summary.active_groups, 1);
        assert_eq!(summary.memory_mass, 2.25);
        assert_eq!(summary.inhibition_mass, 2.0);
    }

    #[test]
    fn test_fn_and_channel_observers() {
        let (sigma, selection, prediction, hidden) = event_parts();
        let event = StepEvent {
            step: 0,
            sigma: sigma.view(),
            selection: &selection,
            prediction: prediction.view(),
            hidden: &hidden,
        };

        let calls = AtomicUsize::new(0);
        let counter = FnObserver(|_: &StepEvent<'_>| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        counter.on_step(&event);
        counter.on_step(&event);
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        let (tx, rx) = mpsc::channel();
        ChannelObserver::new(tx).on_step(&event);
        assert_eq!(rx.try_recv().unwrap(), event.summary());
    }
}
