//! E2E tests against the canonical recursive STA/LTA reference
//!
//! The fixture holds 10,000 samples of seeded Gaussian noise (seed 42,
//! std 0.1) with a 5.0 amplitude sinusoidal burst over [5000, 5500), and the
//! reference ratio for nsta = 50, nlta = 200.

use approx::assert_abs_diff_eq;
use seistrigger::config::LtaUpdate;
use seistrigger::trigger::stalta::EnergyTrigger;
use seistrigger::trigger::SampleProcessor;
use seistrigger::{Harness, LTA_FLOOR};
use serde::Deserialize;

const NSTA: usize = 50;
const NLTA: usize = 200;

#[derive(Debug, Deserialize)]
struct Row {
    input: f64,
    ratio: f64,
}

fn load_fixture() -> (Vec<f64>, Vec<f64>) {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/stalta_reference.csv");
    let mut reader = csv::Reader::from_path(path).expect("fixture should exist");
    let rows: Vec<Row> = reader
        .deserialize()
        .collect::<Result<_, _>>()
        .expect("fixture should parse");
    rows.into_iter().map(|r| (r.input, r.ratio)).unzip()
}

#[test]
fn test_fixture_shape() {
    let (input, reference) = load_fixture();
    assert_eq!(input.len(), 10_000);
    assert_eq!(reference.len(), 10_000);
    assert!(reference[..NLTA].iter().all(|&r| r == 0.0));
}

#[test]
fn test_symmetric_matches_reference() {
    let (input, reference) = load_fixture();
    let mut trigger = EnergyTrigger::with_lengths(NSTA, NLTA, LtaUpdate::Symmetric);
    let ratios = trigger.process_buffer(&input);

    let result = Harness::default().compare_ratios(&reference, &ratios);
    assert!(
        result.passed(),
        "max diff {} at {:?}, first mismatches {:?}",
        result.max_abs_diff,
        result.max_diff_index,
        result.mismatches
    );
    assert!(result.max_abs_diff < 1e-6);
}

#[test]
fn test_seconds_constructor_matches_reference() {
    // 0.5 s and 2.0 s at 100 Hz are the same 50 / 200 sample windows
    let (input, reference) = load_fixture();
    let mut trigger = EnergyTrigger::new(0.5, 2.0, 100.0, LtaUpdate::Symmetric);
    let ratios = trigger.process_buffer(&input);

    let max_diff = reference
        .iter()
        .zip(&ratios)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(max_diff < 1e-6, "max diff {}", max_diff);
}

#[test]
fn test_warmup_and_floor_on_reference_stream() {
    let (input, _) = load_fixture();
    let mut trigger = EnergyTrigger::with_lengths(NSTA, NLTA, LtaUpdate::Symmetric);

    for (i, &x) in input.iter().enumerate() {
        let ratio = trigger.process(x);
        assert!(trigger.lta() >= LTA_FLOOR, "lta below floor at {}", i);
        if i < NLTA {
            assert_eq!(ratio, 0.0, "warm-up output at {}", i);
        }
    }
}

#[test]
fn test_burst_peak_location() {
    let (input, reference) = load_fixture();
    let mut trigger = EnergyTrigger::with_lengths(NSTA, NLTA, LtaUpdate::Symmetric);
    let ratios = trigger.process_buffer(&input);

    let (peak_index, peak) = ratios
        .iter()
        .enumerate()
        .fold((0, 0.0), |best, (i, &r)| if r > best.1 { (i, r) } else { best });

    assert!((5000..5500).contains(&peak_index), "peak at {}", peak_index);
    assert_abs_diff_eq!(peak, 3.309, epsilon = 1e-3);
    assert_abs_diff_eq!(ratios[NLTA], reference[NLTA], epsilon = 1e-9);
}

#[test]
fn test_delayed_variant_diverges_from_reference() {
    let (input, reference) = load_fixture();
    let mut trigger = EnergyTrigger::with_lengths(NSTA, NLTA, LtaUpdate::Delayed);
    let ratios = trigger.process_buffer(&input);

    let result = Harness::default().compare_ratios(&reference, &ratios);
    assert!(!result.passed());
    assert!(result.exceed_count > 0);
}
