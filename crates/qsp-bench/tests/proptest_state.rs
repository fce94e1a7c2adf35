//! Property-based tests for target-state generation.

use proptest::prelude::*;
use qsp_bench::state::{AmplitudeMode, StateGenerator};

fn arb_mode() -> impl Strategy<Value = AmplitudeMode> {
    prop_oneof![
        Just(AmplitudeMode::Uniform),
        Just(AmplitudeMode::Randomized),
        Just(AmplitudeMode::RandomizedComplex),
    ]
}

/// Valid `(n, cardinality)` pairs with `1 <= cardinality <= 2^n`.
fn arb_shape() -> impl Strategy<Value = (u32, u64)> {
    (1_u32..=10).prop_flat_map(|n| (Just(n), 1_u64..=(1u64 << n)))
}

proptest! {
    #[test]
    fn generated_state_has_requested_shape(
        (n, cardinality) in arb_shape(),
        seed in any::<u64>(),
        mode in arb_mode(),
    ) {
        let state = StateGenerator::generate(n, cardinality, seed, mode).unwrap();
        prop_assert_eq!(state.len(), 1usize << n);
        prop_assert_eq!(state.cardinality() as u64, cardinality);
        prop_assert!((state.norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn generation_is_deterministic(
        (n, cardinality) in arb_shape(),
        seed in any::<u64>(),
        mode in arb_mode(),
    ) {
        let a = StateGenerator::generate(n, cardinality, seed, mode).unwrap();
        let b = StateGenerator::generate(n, cardinality, seed, mode).unwrap();
        for (x, y) in a.amplitudes().iter().zip(b.amplitudes()) {
            prop_assert_eq!(x.re.to_bits(), y.re.to_bits());
            prop_assert_eq!(x.im.to_bits(), y.im.to_bits());
        }
    }

    #[test]
    fn oversized_cardinality_is_rejected(n in 1_u32..=10, extra in 1_u64..100) {
        let cardinality = (1u64 << n) + extra;
        prop_assert!(!StateGenerator::is_valid(n, cardinality));
        prop_assert!(StateGenerator::generate(n, cardinality, 0, AmplitudeMode::Uniform).is_err());
    }
}
