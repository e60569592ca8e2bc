//! CodeBlue Headless Simulation Harness
//!
//! Validates the clinical kernel and the bundled scenario data without any
//! UI, audio or dialogue layer. Runs entirely in-process.
//!
//! Usage:
//!   cargo run -p codeblue-simtest
//!   cargo run -p codeblue-simtest -- --verbose
//!   cargo run -p codeblue-simtest -- --seed 42 --trials 20000 --json

use codeblue_logic::deterioration::{self, DeteriorationStage};
use codeblue_logic::dosing::{calculate_drug_dose, calculate_energy, Drug, EnergyKind};
use codeblue_logic::events::ClinicalEvent;
use codeblue_logic::intervention::{
    process_intervention, resolve_transient_state, transient_due, InterventionOutcome,
    InterventionRequest, InterventionType, ResultDetail,
};
use codeblue_logic::patient::{apply_result, PatientState, Rhythm, Stability};
use codeblue_logic::random::{RandomSource, DEFAULT_SEED};
use codeblue_logic::safety::{evaluate_adenosine_order, evaluate_cardioversion_order, NurseAction};
use codeblue_logic::scenario::{validate_scenario, ScenarioDefinition};
use serde::Serialize;

// ── Scenario data (same JSON a session host loads) ──────────────────────
const SCENARIO_JSON: &str = include_str!("../../../data/scenarios/pediatric_svt.json");

const DEFAULT_TRIALS: u32 = 10_000;

// ── Test harness ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

#[derive(Serialize)]
struct Summary<'a> {
    seed: u64,
    trials: u32,
    passed: usize,
    failed: usize,
    results: &'a [TestResult],
}

struct Options {
    verbose: bool,
    json: bool,
    seed: u64,
    trials: u32,
}

impl Options {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let value_of = |flag: &str| {
            args.windows(2)
                .find(|w| w[0] == flag)
                .and_then(|w| w[1].parse::<u64>().ok())
        };
        Self {
            verbose: args.iter().any(|a| a == "--verbose"),
            json: args.iter().any(|a| a == "--json"),
            seed: value_of("--seed").unwrap_or(DEFAULT_SEED),
            trials: value_of("--trials")
                .map(|t| t.clamp(1, u32::MAX as u64) as u32)
                .unwrap_or(DEFAULT_TRIALS),
        }
    }
}

fn main() {
    let opts = Options::from_args();
    if !opts.json {
        println!("=== CodeBlue Simulation Harness ===\n");
    }

    let mut results = Vec::new();

    // 1. Scenario data
    results.extend(validate_scenario_data(&opts));

    // 2. Dose and energy tables
    results.extend(validate_dosing(&opts));

    // 3. Safety gate sweep
    results.extend(validate_safety_gate(&opts));

    // 4. Seeded outcome rates
    results.extend(validate_outcome_rates(&opts));

    // 5. Deterioration and recovery curves
    results.extend(validate_deterioration(&opts));

    // 6. Full session replay
    results.extend(validate_replay(&opts));

    // ── Summary ──
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    if opts.json {
        let summary = Summary {
            seed: opts.seed,
            trials: opts.trials,
            passed,
            failed,
            results: &results,
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("failed to serialize summary: {}", e),
        }
    } else {
        println!();
        for r in &results {
            let icon = if r.passed { "✓" } else { "✗" };
            if !r.passed || opts.verbose {
                println!("  {} {}: {}", icon, r.name, r.detail);
            }
        }
        println!(
            "\n=== RESULT: {}/{} passed, {} failed ===",
            passed, total, failed
        );
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

fn section(opts: &Options, title: &str) {
    if !opts.json {
        println!("--- {} ---", title);
    }
}

fn svt_with_iv() -> PatientState {
    let mut state = ScenarioDefinition::pediatric_svt().initial_state();
    state.iv_access = true;
    state
}

// ── 1. Scenario Data ────────────────────────────────────────────────────

fn validate_scenario_data(opts: &Options) -> Vec<TestResult> {
    section(opts, "Scenario Data");
    let mut results = Vec::new();

    let scenario = match ScenarioDefinition::from_json_str(SCENARIO_JSON) {
        Ok(s) => s,
        Err(e) => {
            results.push(TestResult {
                name: "scenario_parse".into(),
                passed: false,
                detail: format!("{}", e),
            });
            return results;
        }
    };

    results.push(TestResult {
        name: "scenario_valid".into(),
        passed: validate_scenario(&scenario).is_empty(),
        detail: format!(
            "{}: {} kg, {} y, {:?}",
            scenario.id,
            scenario.patient.weight_kg,
            scenario.patient.age_years,
            scenario.initial_rhythm
        ),
    });

    // The bundled file and the built-in default must agree
    let builtin = ScenarioDefinition::pediatric_svt();
    results.push(TestResult {
        name: "scenario_matches_builtin".into(),
        passed: scenario == builtin,
        detail: "data/scenarios/pediatric_svt.json == pediatric_svt()".into(),
    });

    let state = scenario.initial_state();
    results.push(TestResult {
        name: "scenario_initial_state".into(),
        passed: state.rhythm == Rhythm::Svt
            && state.vitals.heart_rate == 220
            && !state.has_vascular_access()
            && state.transient.is_none(),
        detail: format!(
            "HR {} BP {}/{} SpO2 {}",
            state.vitals.heart_rate, state.vitals.systolic, state.vitals.diastolic, state.vitals.spo2
        ),
    });

    results
}

// ── 2. Dosing ───────────────────────────────────────────────────────────

fn validate_dosing(opts: &Options) -> Vec<TestResult> {
    section(opts, "Dosing");
    let mut results = Vec::new();
    let weight = ScenarioDefinition::pediatric_svt().patient.weight_kg;

    let dose = |drug, second| {
        calculate_drug_dose(drug, weight, second)
            .map(|d| d.calculated_dose)
            .unwrap_or(f64::NAN)
    };
    let energy = |kind, attempt| {
        calculate_energy(kind, weight, attempt)
            .map(|d| d.calculated_dose)
            .unwrap_or(f64::NAN)
    };

    let checks = [
        ("dose_adenosine_first", dose(Drug::Adenosine, false), 1.85),
        ("dose_adenosine_second", dose(Drug::Adenosine, true), 3.7),
        ("dose_amiodarone", dose(Drug::Amiodarone, false), 92.5),
        ("dose_procainamide", dose(Drug::Procainamide, false), 277.5),
        ("energy_cardioversion_first", energy(EnergyKind::SynchronizedCardioversion, 1), 9.0),
        ("energy_cardioversion_second", energy(EnergyKind::SynchronizedCardioversion, 2), 37.0),
        ("energy_defibrillation_first", energy(EnergyKind::Defibrillation, 1), 37.0),
    ];
    for (name, got, expected) in checks {
        results.push(TestResult {
            name: name.into(),
            passed: (got - expected).abs() < 1e-9,
            detail: format!("{} (expected {})", got, expected),
        });
    }

    // Caps hold for an adult-sized patient
    let capped = Drug::ALL.iter().all(|&drug| {
        calculate_drug_dose(drug, 150.0, true)
            .map(|d| d.calculated_dose <= d.max_dose)
            .unwrap_or(false)
    });
    results.push(TestResult {
        name: "dose_caps".into(),
        passed: capped,
        detail: "all drugs capped at 150 kg".into(),
    });

    let invalid = calculate_drug_dose(Drug::Adenosine, f64::NAN, false).is_none()
        && calculate_drug_dose(Drug::Adenosine, -1.0, false).is_none();
    results.push(TestResult {
        name: "dose_invalid_weight".into(),
        passed: invalid,
        detail: "NaN and negative weights yield no dose".into(),
    });

    results
}

// ── 3. Safety Gate ──────────────────────────────────────────────────────

fn validate_safety_gate(opts: &Options) -> Vec<TestResult> {
    section(opts, "Safety Gate");
    let mut results = Vec::new();
    let weight = 18.5;

    // Cardioversion never allowed unsedated, in sinus, or in asystole
    let mut leaks = Vec::new();
    for tenth_joules in 0..=3_000u32 {
        let energy = f64::from(tenth_joules) / 10.0;
        for (rhythm, sedated) in [
            (Rhythm::Svt, false),
            (Rhythm::SinusRhythm, true),
            (Rhythm::Asystole, true),
        ] {
            let eval = evaluate_cardioversion_order(energy, 1, weight, rhythm, sedated);
            if eval.allowed {
                leaks.push(format!("{:?}/{} at {} J", rhythm, sedated, energy));
            }
        }
    }
    results.push(TestResult {
        name: "safety_cardioversion_gates".into(),
        passed: leaks.is_empty(),
        detail: if leaks.is_empty() {
            "3001 energies in 3 blocked contexts refused".into()
        } else {
            format!("{} leaks, first: {}", leaks.len(), leaks[0])
        },
    });

    // Third adenosine dose always refused
    let third_allowed = (0..=120)
        .map(|tenth_mg| evaluate_adenosine_order(f64::from(tenth_mg) / 10.0, 2, weight))
        .filter(|e| e.allowed)
        .count();
    results.push(TestResult {
        name: "safety_adenosine_third_dose".into(),
        passed: third_allowed == 0,
        detail: format!("{} third-dose orders allowed", third_allowed),
    });

    // Protocol dose goes straight through
    let correct = evaluate_adenosine_order(1.85, 0, weight);
    results.push(TestResult {
        name: "safety_adenosine_protocol_dose".into(),
        passed: correct.allowed && correct.action == NurseAction::Confirm,
        detail: format!("{:?}: {}", correct.action, correct.message),
    });

    // Gross overdose never reaches the engine unchanged
    let overdose = evaluate_adenosine_order(18.5, 0, weight);
    results.push(TestResult {
        name: "safety_adenosine_overdose".into(),
        passed: !overdose.allowed || overdose.corrected_dose.is_some(),
        detail: format!("{:?}: {}", overdose.action, overdose.message),
    });

    // VF gets pointed at the defibrillator
    let vf = evaluate_cardioversion_order(9.0, 1, weight, Rhythm::VentricularFibrillation, true);
    results.push(TestResult {
        name: "safety_vf_needs_defibrillation".into(),
        passed: !vf.allowed,
        detail: vf.message,
    });

    results
}

// ── 4. Outcome Rates ────────────────────────────────────────────────────

fn sweep(
    opts: &Options,
    state: &PatientState,
    req: &InterventionRequest,
    hit: fn(&ResultDetail, InterventionOutcome) -> bool,
) -> f64 {
    let mut rng = RandomSource::new(opts.seed);
    let hits = (0..opts.trials)
        .filter(|_| {
            let r = process_intervention(state, req, &mut rng);
            hit(&r.detail, r.outcome)
        })
        .count();
    hits as f64 / f64::from(opts.trials)
}

fn converted(_: &ResultDetail, outcome: InterventionOutcome) -> bool {
    outcome == InterventionOutcome::Converted
}

fn will_convert(detail: &ResultDetail, _: InterventionOutcome) -> bool {
    matches!(detail, ResultDetail::PendingConversion { will_convert: true, .. })
}

fn validate_outcome_rates(opts: &Options) -> Vec<TestResult> {
    section(opts, "Outcome Rates");
    let mut results = Vec::new();

    let svt = svt_with_iv();
    let mut second = svt.clone();
    second.history.adenosine_doses = 1;
    let mut sedated = svt.clone();
    sedated.sedated = true;

    type Case<'a> = (
        &'static str,
        &'a PatientState,
        InterventionRequest,
        fn(&ResultDetail, InterventionOutcome) -> bool,
        (f64, f64),
    );
    let cases: [Case; 4] = [
        (
            "rate_vagal",
            &svt,
            InterventionRequest::new(InterventionType::VagalManeuver, 0),
            converted,
            (0.15, 0.35),
        ),
        (
            "rate_adenosine_first",
            &svt,
            InterventionRequest::new(InterventionType::Adenosine, 0).with_dose(1.85),
            will_convert,
            (0.45, 0.75),
        ),
        (
            "rate_adenosine_second",
            &second,
            InterventionRequest::new(InterventionType::Adenosine, 0).with_dose(3.7),
            will_convert,
            (0.65, 0.95),
        ),
        (
            "rate_cardioversion",
            &sedated,
            InterventionRequest::new(InterventionType::SynchronizedCardioversion, 0).with_dose(9.0),
            converted,
            (0.80, 0.99),
        ),
    ];

    for (name, state, req, hit, (lo, hi)) in cases {
        let rate = sweep(opts, state, &req, hit);
        results.push(TestResult {
            name: name.into(),
            passed: (lo..=hi).contains(&rate),
            detail: format!(
                "{:.1}% over {} trials (expected {:.0}-{:.0}%)",
                rate * 100.0,
                opts.trials,
                lo * 100.0,
                hi * 100.0
            ),
        });
    }

    // Adenosine shows asystole every time, whatever the draw
    let mut rng = RandomSource::new(opts.seed);
    let req = InterventionRequest::new(InterventionType::Adenosine, 0).with_dose(1.85);
    let always_transient = (0..opts.trials.min(1_000)).all(|_| {
        let r = process_intervention(&svt, &req, &mut rng);
        r.outcome == InterventionOutcome::TransientResponse
            && r.new_state.rhythm == Some(Rhythm::Asystole)
    });
    results.push(TestResult {
        name: "adenosine_always_transient".into(),
        passed: always_transient,
        detail: "every adenosine push produced transient asystole".into(),
    });

    results
}

// ── 5. Deterioration ────────────────────────────────────────────────────

fn validate_deterioration(opts: &Options) -> Vec<TestResult> {
    section(opts, "Deterioration");
    let mut results = Vec::new();

    let mut monotonic = true;
    let mut last = DeteriorationStage::Compensated;
    for ms in (0..600_000).step_by(250) {
        let stage = DeteriorationStage::for_elapsed(ms);
        if stage < last {
            monotonic = false;
        }
        last = stage;
    }
    results.push(TestResult {
        name: "deterioration_monotonic".into(),
        passed: monotonic,
        detail: format!("ends at {:?}", last),
    });

    // No hard jump at any stage boundary
    let max_jump = (1_000..600_000u64)
        .step_by(1_000)
        .map(|ms| {
            let a = deterioration::snapshot_vitals(ms - 1);
            let b = deterioration::snapshot_vitals(ms);
            (i32::from(a.heart_rate) - i32::from(b.heart_rate)).abs()
        })
        .max()
        .unwrap_or(0);
    results.push(TestResult {
        name: "deterioration_smooth".into(),
        passed: max_jump <= 6,
        detail: format!("largest 1 ms HR step {} bpm", max_jump),
    });

    // Untreated SVT decompensates over five minutes
    let mut state = ScenarioDefinition::pediatric_svt().initial_state();
    let mut rng = RandomSource::new(opts.seed);
    for _ in 0..300 {
        state = apply_result(&state, &deterioration::step(&state, 1_000, &mut rng));
    }
    results.push(TestResult {
        name: "deterioration_untreated_svt".into(),
        passed: state.deterioration_stage == DeteriorationStage::Critical
            && state.stability == Stability::Critical,
        detail: format!(
            "{:?} after 300 s, BP {}/{}",
            state.deterioration_stage, state.vitals.systolic, state.vitals.diastolic
        ),
    });

    let spo2 = deterioration::calculate_asystole_vitals(120_000).spo2;
    results.push(TestResult {
        name: "asystole_floor".into(),
        passed: spo2 == 70,
        detail: format!("SpO2 {} after 2 min", spo2),
    });

    results
}

// ── 6. Replay ───────────────────────────────────────────────────────────

/// Drive a scripted session and return its log and final state.
fn run_session(seed: u64) -> (Vec<ClinicalEvent>, PatientState) {
    let mut state = svt_with_iv();
    let mut rng = RandomSource::new(seed);
    let mut log = Vec::new();
    let mut pending = None;
    let mut now_ms = 0u64;

    let script = [
        (5_000, InterventionType::VagalManeuver, None),
        (15_000, InterventionType::Adenosine, Some(1.85)),
        (30_000, InterventionType::Adenosine, Some(3.7)),
        (45_000, InterventionType::Sedation, None),
        (50_000, InterventionType::SynchronizedCardioversion, Some(9.0)),
    ];
    let mut next = 0;

    while now_ms < 90_000 {
        now_ms += 500;
        if let Some(&(at, kind, dose)) = script.get(next) {
            if now_ms >= at {
                next += 1;
                let mut req = InterventionRequest::new(kind, now_ms);
                req.dose = dose;
                let r = process_intervention(&state, &req, &mut rng);
                state = apply_result(&state, &r.new_state);
                log.extend(r.events);
                if let ResultDetail::PendingConversion { will_convert, .. } = r.detail {
                    pending = Some(will_convert);
                }
                continue;
            }
        }
        if transient_due(&state, now_ms) {
            let will_convert = pending.take().unwrap_or(false);
            let res = resolve_transient_state(&state, will_convert, now_ms, &mut rng);
            state = apply_result(&state, &res.delta);
            log.extend(res.events);
        } else {
            state = apply_result(&state, &deterioration::step(&state, 500, &mut rng));
        }
    }

    (log, state)
}

fn validate_replay(opts: &Options) -> Vec<TestResult> {
    section(opts, "Replay");
    let mut results = Vec::new();

    let (log_a, state_a) = run_session(opts.seed);
    let (log_b, state_b) = run_session(opts.seed);
    results.push(TestResult {
        name: "replay_deterministic".into(),
        passed: log_a == log_b && state_a == state_b,
        detail: format!("{} events, final rhythm {:?}", log_a.len(), state_a.rhythm),
    });

    let serialized = serde_json::to_string(&log_a);
    results.push(TestResult {
        name: "replay_log_serializes".into(),
        passed: serialized.is_ok(),
        detail: serialized
            .map(|s| format!("{} bytes of JSON", s.len()))
            .unwrap_or_else(|e| e.to_string()),
    });

    let ordered = log_a.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms);
    results.push(TestResult {
        name: "replay_log_ordered".into(),
        passed: ordered,
        detail: "event timestamps non-decreasing".into(),
    });

    results
}
