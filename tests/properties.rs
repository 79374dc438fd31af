//! Property-based tests using proptest
//!
//! Invariants of the competition and the trace update that must hold for any
//! potential, inhibition and memory values.

use ndarray::Array2;
use proptest::prelude::*;
use rsm_cell::{
    decay_saturate, group_max, inhibited_potential, Activation, CompetitiveSelector,
    GroupSelector, InhibitionMemoryTracker,
};

// ============================================================================
// Strategies
// ============================================================================

/// `(m, n, k, k_winner_cells, sigma, phi)` for a single row.
fn selection_case(
) -> impl Strategy<Value = (usize, usize, usize, usize, Vec<f32>, Vec<f32>)> {
    (2usize..7, 1usize..5).prop_flat_map(|(m, n)| {
        (
            Just(m),
            Just(n),
            1..=m,
            1..=n,
            prop::collection::vec(-5.0f32..5.0, m * n),
            prop::collection::vec(0.0f32..0.99, m * n),
        )
    })
}

fn trace_case() -> impl Strategy<Value = (Vec<f32>, Vec<f32>, f32)> {
    (1usize..24).prop_flat_map(|len| {
        (
            prop::collection::vec(0.0f32..2.0, len),
            prop::collection::vec(-1.0f32..1.0, len),
            0.0f32..=1.0,
        )
    })
}

fn row(values: Vec<f32>) -> Array2<f32> {
    let len = values.len();
    Array2::from_shape_vec((1, len), values).unwrap()
}

// ============================================================================
// Competition Properties
// ============================================================================

proptest! {
    // Property: exactly k groups win, each with exactly k_winner_cells cells
    #[test]
    fn test_selection_counts((m, n, k, kwc, sigma, phi) in selection_case()) {
        let mut selector = CompetitiveSelector::new(
            m, n, kwc, Activation::Tanh, GroupSelector::Inhibition { k },
        ).unwrap();
        let selection = selector.select(row(sigma).view(), row(phi).view(), false).unwrap();

        prop_assert_eq!(selection.winning_groups(0).len(), k);
        for group in 0..m {
            let cells = selection.mask.row(0).iter().skip(group * n).take(n)
                .filter(|&&v| v > 0.0).count();
            let expected = if selection.winning_groups(0).contains(&group) { kwc } else { 0 };
            prop_assert_eq!(cells, expected);
        }
    }

    // Property: winners dominate losers on the inhibited potential
    #[test]
    fn test_winners_dominate((m, n, k, kwc, sigma, phi) in selection_case()) {
        let mut selector = CompetitiveSelector::new(
            m, n, kwc, Activation::Tanh, GroupSelector::Inhibition { k },
        ).unwrap();
        let selection = selector.select(row(sigma).view(), row(phi).view(), false).unwrap();
        let pi = selection.potential.row(0);
        let lambda = group_max(selection.potential.view(), n);
        let groups = selection.winning_groups(0);

        for g in 0..m {
            for h in 0..m {
                if groups.contains(&g) && !groups.contains(&h) {
                    prop_assert!(lambda[[0, g]] >= lambda[[0, h]]);
                }
            }
        }

        for &g in &groups {
            let cells: Vec<usize> = (g * n..(g + 1) * n).collect();
            for &won in cells.iter().filter(|&&c| selection.mask[[0, c]] > 0.0) {
                for &lost in cells.iter().filter(|&&c| selection.mask[[0, c]] == 0.0) {
                    prop_assert!(pi[won] >= pi[lost]);
                }
            }
        }
    }

    // Property: activity is the nonlinearity of sigma on the mask, zero elsewhere
    #[test]
    fn test_activity_follows_mask((m, n, k, kwc, sigma, phi) in selection_case()) {
        let mut selector = CompetitiveSelector::new(
            m, n, kwc, Activation::Relu, GroupSelector::Inhibition { k },
        ).unwrap();
        let sigma = row(sigma);
        let selection = selector.select(sigma.view(), row(phi).view(), false).unwrap();

        for (i, &y) in selection.activity.iter().enumerate() {
            let expected = if selection.mask[[0, i]] > 0.0 { sigma[[0, i]].max(0.0) } else { 0.0 };
            prop_assert_eq!(y, expected);
        }
    }

    // Property: without inhibition the shifted potential is at least one
    #[test]
    fn test_uninhibited_potential_floor(sigma in prop::collection::vec(-50.0f32..50.0, 1..32)) {
        let len = sigma.len();
        let pi = inhibited_potential(row(sigma).view(), Array2::zeros((1, len)).view());
        prop_assert!(pi.iter().all(|&p| p >= 1.0 - 1e-4));
    }
}

// ============================================================================
// Trace Properties
// ============================================================================

proptest! {
    // Property: the new trace is the larger of the decayed trace and the activity
    #[test]
    fn test_decay_saturate_law((trace, activity, retention) in trace_case()) {
        let before = row(trace);
        let activity = row(activity);
        let mut after = before.clone();
        decay_saturate(&mut after, retention, activity.view());

        for ((&new, &old), &y) in after.iter().zip(before.iter()).zip(activity.iter()) {
            let decayed = old * retention;
            prop_assert!(new >= decayed && new >= y);
            prop_assert!(new == decayed || new == y);
        }
    }

    // Property: normalized recurrent input sums to the gain
    #[test]
    fn test_normalized_input_mass(
        psi in prop::collection::vec(0.0f32..1.0, 1..32),
        gain in 0.1f32..4.0,
    ) {
        let psi = row(psi);
        let mass = psi.sum();
        prop_assume!(mass > 1e-3);

        let tracker = InhibitionMemoryTracker::new(0.5, 0.5).with_recurrent_gain(gain, true);
        let x_b = tracker.recurrent_input(psi.view());

        prop_assert!((x_b.sum() - gain).abs() <= gain * 1e-3);
    }
}
