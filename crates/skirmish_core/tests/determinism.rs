//! Same seed and tuning, same match.

use proptest::prelude::*;
use skirmish_core::simulation::Match;
use skirmish_test_utils::determinism::{
    find_first_divergence, hash_trace, verify_determinism, verify_match_determinism,
};
use skirmish_test_utils::fixtures::{small_match, small_tuning};
use skirmish_test_utils::strategies::arb_seed;

#[test]
fn test_full_match_is_reproducible() {
    let result = verify_determinism(
        3,
        1500,
        || small_match(1234),
        |game| {
            game.step();
        },
        Match::state_hash,
    );
    result.assert_deterministic();
}

#[test]
fn test_traces_agree_tick_by_tick() {
    let first = hash_trace(&mut small_match(99), 600);
    let second = hash_trace(&mut small_match(99), 600);
    assert_eq!(first, second);
}

#[test]
fn test_restart_replays_the_same_match() {
    let mut game = small_match(5);
    let first = hash_trace(&mut game, 400);
    game.restart(Some(5));
    let replay = hash_trace(&mut game, 400);
    assert_eq!(first, replay);
}

#[test]
fn test_snapshots_serialize_identically() {
    let mut a = small_match(77);
    let mut b = small_match(77);
    a.run(500);
    b.run(500);
    let a = ron::to_string(&a.snapshot()).unwrap();
    let b = ron::to_string(&b.snapshot()).unwrap();
    assert_eq!(a, b);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn test_any_seed_is_deterministic(seed in arb_seed()) {
        prop_assert!(verify_match_determinism(|| small_match(seed), 200));
        prop_assert_eq!(find_first_divergence(|| small_match(seed), 50), None);
    }

    #[test]
    fn test_tuning_round_trips_through_ron(seed in arb_seed()) {
        let tuning = small_tuning();
        let text = ron::to_string(&tuning).unwrap();
        let parsed = skirmish_core::tuning::Tuning::from_ron_str(&text, "roundtrip").unwrap();
        let mut original = Match::new(seed, tuning).unwrap();
        let mut reparsed = Match::new(seed, parsed).unwrap();
        original.run(100);
        reparsed.run(100);
        prop_assert_eq!(original.state_hash(), reparsed.state_hash());
    }
}
