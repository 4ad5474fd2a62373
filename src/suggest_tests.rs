use super::*;

use std::str::FromStr;

use shakmaty::{san::SanPlus, Position};

use crate::advice::Score;
use crate::engine::MoveOrigin;

fn after(sans: &[&str]) -> Chess {
    let mut pos = Chess::default();
    for san in sans {
        let m = SanPlus::from_str(san).unwrap().san.to_move(&pos).unwrap();
        pos.play_unchecked(&m);
    }
    pos
}

fn uci(text: &str) -> Uci {
    Uci::from_str(text).unwrap()
}

fn book(entries: &[(&str, u32)]) -> Vec<BookEntry> {
    entries
        .iter()
        .map(|(m, weight)| BookEntry {
            uci: uci(m),
            weight: *weight,
        })
        .collect()
}

fn pv(m: &str, score: Score) -> PrincipalVariation {
    PrincipalVariation {
        best: uci(m),
        score,
    }
}

fn engine_result(pos: &Chess, best: &str, eval: i32, second: Option<(&str, i32)>) -> SearchResult {
    SearchResult {
        best_move: Some(Ply::parse(pos, best).unwrap()),
        evaluation: eval,
        depth: 3,
        runner_up: second.map(|(m, s)| (Ply::parse(pos, m).unwrap(), s)),
        nodes: 1,
        generation: 0,
        origin: MoveOrigin::Search,
    }
}

fn assert_close(a: f32, b: f32) {
    assert!((a - b).abs() < 1e-4, "{a} != {b}");
}

#[test]
fn test_book_weights_normalize_two_to_one() {
    let pos = after(&["e4", "e5"]);
    let key = PositionKey::from_position(&pos);
    let entries = book(&[("f1c4", 5), ("g1f3", 10)]);
    let settings = SuggestionSettings {
        cloud_enabled: false,
        book_enabled: true,
    };

    let inputs = AdviceInputs {
        book: Some(&entries),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &settings);

    assert_eq!(picked.len(), 2);
    assert_eq!(picked[0].ply.san, "Nf3");
    assert_eq!(picked[1].ply.san, "Bc4");
    assert_eq!((picked[0].rank, picked[1].rank), (0, 1));
    assert!(picked.iter().all(|s| s.source == SuggestionSource::Book));
    assert!(picked.iter().all(|s| s.key == key));
    assert_close(picked[0].weight + picked[1].weight, 1.0);
    assert_close(picked[0].weight / picked[1].weight, 2.0);
}

#[test]
fn test_book_keeps_only_top_two() {
    let pos = after(&["e4", "e5"]);
    let key = PositionKey::from_position(&pos);
    let entries = book(&[("g1f3", 10), ("f1c4", 5), ("b1c3", 2)]);
    let inputs = AdviceInputs {
        book: Some(&entries),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked.len(), 2);
    assert_close(picked[0].weight, 10.0 / 15.0);
}

#[test]
fn test_book_skips_illegal_entries() {
    let pos = after(&["e4", "e5"]);
    let key = PositionKey::from_position(&pos);
    let entries = book(&[("e2e4", 50), ("g1f3", 10)]);
    let inputs = AdviceInputs {
        book: Some(&entries),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].ply.san, "Nf3");
    assert_close(picked[0].weight, 1.0);
}

#[test]
fn test_zero_weight_book_splits_evenly() {
    let pos = Chess::default();
    let key = PositionKey::from_position(&pos);
    let entries = book(&[("e2e4", 0), ("d2d4", 0)]);
    let inputs = AdviceInputs {
        book: Some(&entries),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked.len(), 2);
    assert_close(picked[0].weight, 0.5);
    assert_close(picked[1].weight, 0.5);
}

#[test]
fn test_equal_cloud_evals_split_evenly() {
    let pos = Chess::default();
    let key = PositionKey::from_position(&pos);
    let pvs = vec![pv("e2e4", Score::Centipawns(30)), pv("d2d4", Score::Centipawns(30))];
    let inputs = AdviceInputs {
        cloud: Some(&pvs),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked.len(), 2);
    assert!(picked.iter().all(|s| s.source == SuggestionSource::Cloud));
    assert_close(picked[0].weight, 0.5);
    assert_close(picked[1].weight, 0.5);
}

#[test]
fn test_cloud_orders_by_evaluation_and_skews_weight() {
    let pos = Chess::default();
    let key = PositionKey::from_position(&pos);
    let pvs = vec![
        pv("a2a3", Score::Centipawns(-400)),
        pv("e2e4", Score::Centipawns(35)),
        pv("g2g4", Score::Centipawns(-600)),
    ];
    let inputs = AdviceInputs {
        cloud: Some(&pvs),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked[0].ply.san, "e4");
    assert_eq!(picked[1].ply.san, "a3");
    assert_close(picked[0].weight, 0.9);
    assert_close(picked[1].weight, 0.1);
}

#[test]
fn test_cloud_mate_outranks_centipawns() {
    let pos = after(&["f3", "e5"]);
    let key = PositionKey::from_position(&pos);
    let pvs = vec![pv("e2e4", Score::Centipawns(-100)), pv("g2g4", Score::Mate(-1))];
    let inputs = AdviceInputs {
        cloud: Some(&pvs),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked[0].ply.san, "e4");
    assert_eq!(picked[1].ply.san, "g4");
}

#[test]
fn test_cloud_wins_over_book_and_sources_never_mix() {
    let pos = Chess::default();
    let key = PositionKey::from_position(&pos);
    let pvs = vec![pv("d2d4", Score::Centipawns(20))];
    let entries = book(&[("e2e4", 10), ("c2c4", 3)]);
    let inputs = AdviceInputs {
        cloud: Some(&pvs),
        book: Some(&entries),
        engine: None,
    };

    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].source, SuggestionSource::Cloud);
    assert_close(picked[0].weight, 1.0);

    let no_cloud = SuggestionSettings {
        cloud_enabled: false,
        book_enabled: true,
    };
    let picked = aggregate(&pos, &key, &inputs, &no_cloud);
    assert!(picked.iter().all(|s| s.source == SuggestionSource::Book));
}

#[test]
fn test_empty_cloud_falls_through_to_book() {
    let pos = Chess::default();
    let key = PositionKey::from_position(&pos);
    let pvs: Vec<PrincipalVariation> = Vec::new();
    let entries = book(&[("e2e4", 10)]);
    let inputs = AdviceInputs {
        cloud: Some(&pvs),
        book: Some(&entries),
        engine: None,
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked[0].source, SuggestionSource::Book);
}

#[test]
fn test_engine_fallback_offers_comparable_runner_up() {
    let pos = Chess::default();
    let key = PositionKey::from_position(&pos);
    let result = engine_result(&pos, "e4", 40, Some(("d4", 30)));
    let inputs = AdviceInputs {
        engine: Some(&result),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked.len(), 2);
    assert!(picked.iter().all(|s| s.source == SuggestionSource::Engine));
    assert!(picked[0].weight > picked[1].weight);
    assert_close(picked[0].weight + picked[1].weight, 1.0);
}

#[test]
fn test_engine_drops_distant_runner_up() {
    let pos = Chess::default();
    let key = PositionKey::from_position(&pos);
    let result = engine_result(&pos, "e4", 40, Some(("a3", 40 - COMPARABLE_CP - 1)));
    let inputs = AdviceInputs {
        engine: Some(&result),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked.len(), 1);
    assert_close(picked[0].weight, 1.0);
}

#[test]
fn test_engine_ranks_stronger_move_first_after_noisy_pick() {
    let pos = Chess::default();
    let key = PositionKey::from_position(&pos);
    let result = engine_result(&pos, "d4", 20, Some(("e4", 45)));
    let inputs = AdviceInputs {
        engine: Some(&result),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked.len(), 2);
    assert_eq!(picked[0].ply.uci.to_string(), "e2e4");
    assert_eq!(picked[0].rank, 0);
    assert!(picked[0].weight > picked[1].weight);
}

#[test]
fn test_engine_drops_noisy_pick_far_below_runner_up() {
    let pos = Chess::default();
    let key = PositionKey::from_position(&pos);
    let result = engine_result(&pos, "a3", -40, Some(("e4", 40)));
    let inputs = AdviceInputs {
        engine: Some(&result),
        ..Default::default()
    };
    let picked = aggregate(&pos, &key, &inputs, &SuggestionSettings::default());
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].ply.uci.to_string(), "e2e4");
}

#[test]
fn test_nothing_in_nothing_out() {
    let pos = Chess::default();
    let key = PositionKey::from_position(&pos);
    assert!(aggregate(&pos, &key, &AdviceInputs::default(), &SuggestionSettings::default()).is_empty());
}

#[test]
fn test_gap_weights_saturate() {
    assert_eq!(gap_weights(10, 10), (0.5, 0.5));
    let (w0, w1) = gap_weights(1_000, 0);
    assert_close(w0, 0.9);
    assert_close(w1, 0.1);
    let (w0, _) = gap_weights(0, 50);
    assert_close(w0, 0.5);
}
