use std::collections::BTreeMap;

use event_based_models::{
    Algorithm, EbmFitOptions, EbmInput, MeasurementRecord, evaluate_against_ground_truth,
    fit_ebm_input, fit_ebm_input_with_trace,
};

/// Deterministic synthetic cohort with a known generating order.
///
/// Healthy participants sit near zero on every biomarker. Diseased
/// participant `d` is placed at stage `(d % n) + 1`: biomarkers ranked
/// at or below that stage take clearly abnormal values near ten.
fn staged_records(biomarkers: &[&str], n_healthy: usize, n_diseased: usize) -> Vec<MeasurementRecord> {
    let n = biomarkers.len();
    let jitter = |participant: usize, biomarker: usize| {
        let phase = (participant * 7 + biomarker * 3) % 11;
        (phase as f64 - 5.0) * 0.05
    };

    let mut records = Vec::new();
    for participant in 0..n_healthy {
        for (col, name) in biomarkers.iter().enumerate() {
            records.push(MeasurementRecord::new(
                participant as u64,
                name,
                jitter(participant, col),
                false,
            ));
        }
    }
    for d in 0..n_diseased {
        let participant = n_healthy + d;
        let stage = (d % n) + 1;
        for (col, name) in biomarkers.iter().enumerate() {
            // Generating order: column order is the true rank order.
            let rank = col + 1;
            let base = if rank <= stage { 10.0 } else { 0.0 };
            records.push(MeasurementRecord::new(
                participant as u64,
                name,
                base + jitter(participant, col),
                true,
            ));
        }
    }
    records
}

fn generating_truth(biomarkers: &[&str]) -> BTreeMap<String, usize> {
    biomarkers
        .iter()
        .enumerate()
        .map(|(col, name)| ((*name).to_owned(), col + 1))
        .collect()
}

#[test]
fn conjugate_priors_recovers_a_three_biomarker_order() {
    let biomarkers = ["a", "b", "c"];
    let input =
        EbmInput::from_records(&staged_records(&biomarkers, 10, 10)).expect("valid records");
    let options = EbmFitOptions {
        iterations: 500,
        n_shuffle: 2,
        burn_in: 200,
        thinning: 5,
        seed: 42,
        algorithm: Algorithm::ConjugatePriors,
    };

    let (model, report) = fit_ebm_input(&input, options).expect("fit should succeed");
    assert_eq!(model.n_biomarkers, 3);
    assert_eq!(model.n_stages, 3);

    let truth = generating_truth(&biomarkers);
    assert_eq!(report.most_likely_order, truth);

    // The separation is wide enough that retained samples sit at the
    // generating order almost always.
    for (name, stage) in &truth {
        let frequency = report
            .stage_frequency_of(name, *stage)
            .expect("frequency available");
        assert!(
            frequency >= 0.9,
            "biomarker {name} at stage {stage} has retained frequency {frequency}"
        );
    }
}

#[test]
fn ground_truth_evaluation_reaches_perfect_tau() {
    let biomarkers = ["a", "b", "c", "d", "e"];
    let input =
        EbmInput::from_records(&staged_records(&biomarkers, 12, 15)).expect("valid records");
    let options = EbmFitOptions {
        iterations: 800,
        n_shuffle: 2,
        burn_in: 400,
        thinning: 4,
        seed: 7,
        algorithm: Algorithm::ConjugatePriors,
    };

    let (_model, report) = fit_ebm_input(&input, options).expect("fit should succeed");
    let truth = generating_truth(&biomarkers);
    let evaluation = evaluate_against_ground_truth(&report, &truth).expect("matching biomarkers");

    assert!((evaluation.most_likely.tau - 1.0).abs() < 1.0e-12);
    assert!(evaluation.most_likely.p_value < 0.05);
    assert!((evaluation.max_likelihood.tau - 1.0).abs() < 1.0e-12);
}

#[test]
fn identical_seeds_reproduce_identical_traces() {
    let biomarkers = ["a", "b", "c", "d"];
    let input =
        EbmInput::from_records(&staged_records(&biomarkers, 8, 8)).expect("valid records");
    let options = EbmFitOptions {
        iterations: 120,
        n_shuffle: 2,
        burn_in: 40,
        thinning: 4,
        seed: 99,
        algorithm: Algorithm::Mle,
    };

    let (_, report_a, trace_a) =
        fit_ebm_input_with_trace(&input, options).expect("first fit");
    let (_, report_b, trace_b) =
        fit_ebm_input_with_trace(&input, options).expect("second fit");

    assert_eq!(trace_a.len(), trace_b.len());
    for (a, b) in trace_a.entries().iter().zip(trace_b.entries()) {
        assert_eq!(a.order, b.order);
        assert_eq!(a.log_likelihood.to_bits(), b.log_likelihood.to_bits());
    }
    assert_eq!(report_a.most_likely_order, report_b.most_likely_order);
}

#[test]
fn different_seeds_still_recover_a_separated_order() {
    let biomarkers = ["a", "b", "c"];
    let input =
        EbmInput::from_records(&staged_records(&biomarkers, 10, 10)).expect("valid records");
    let truth = generating_truth(&biomarkers);

    for seed in [1, 2, 3] {
        let options = EbmFitOptions {
            iterations: 400,
            burn_in: 200,
            thinning: 4,
            seed,
            ..EbmFitOptions::default()
        };
        let (_, report) = fit_ebm_input(&input, options).expect("fit should succeed");
        assert_eq!(report.most_likely_order, truth, "seed {seed}");
    }
}

#[test]
fn every_algorithm_completes_and_reports() {
    let biomarkers = ["a", "b", "c"];
    let input =
        EbmInput::from_records(&staged_records(&biomarkers, 8, 9)).expect("valid records");

    for algorithm in Algorithm::all() {
        let options = EbmFitOptions {
            iterations: 100,
            n_shuffle: 2,
            burn_in: 50,
            thinning: 5,
            seed: 11,
            algorithm,
        };
        let (model, report, trace) =
            fit_ebm_input_with_trace(&input, options).expect("fit should succeed");

        assert_eq!(model.algorithm, algorithm);
        assert_eq!(trace.len(), 100);
        assert_eq!(report.diagnostics.iterations_completed, 100);
        assert_eq!(report.diagnostics.acceptance.proposed, 100);
        assert_eq!(report.most_likely_order.len(), 3);
        assert_eq!(report.stage_posteriors.nrows(), input.n_participants());
        assert_eq!(report.stage_posteriors.ncols(), 4);
        assert!(report.max_log_likelihood.is_finite(), "{algorithm}");
    }
}
