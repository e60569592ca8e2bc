//! Seeded statistical checks on the engine's success rates.

use codeblue_logic::intervention::{
    process_intervention, InterventionOutcome, InterventionRequest, InterventionType, ResultDetail,
};
use codeblue_logic::patient::{PatientState, Rhythm};
use codeblue_logic::random::{RandomSource, DEFAULT_SEED};
use codeblue_logic::scenario::ScenarioDefinition;

const TRIALS: u32 = 10_000;

fn svt() -> PatientState {
    let mut state = ScenarioDefinition::pediatric_svt().initial_state();
    state.iv_access = true;
    state
}

/// Fraction of trials for which `success` holds, all drawn from one seeded stream.
fn rate(
    state: &PatientState,
    req: &InterventionRequest,
    success: impl Fn(&ResultDetail, InterventionOutcome) -> bool,
) -> f64 {
    let mut rng = RandomSource::new(DEFAULT_SEED);
    let hits = (0..TRIALS)
        .filter(|_| {
            let result = process_intervention(state, req, &mut rng);
            success(&result.detail, result.outcome)
        })
        .count();
    hits as f64 / TRIALS as f64
}

fn in_rhythm(rhythm: Rhythm) -> PatientState {
    let mut scenario = ScenarioDefinition::pediatric_svt();
    scenario.initial_rhythm = rhythm;
    scenario.iv_access = true;
    scenario.initial_state()
}

/// Like [`rate`] for conversions, also checking every landing heart rate
/// falls in `band` (half-open).
fn conversion_rate(state: &PatientState, req: &InterventionRequest, band: (u16, u16)) -> f64 {
    let mut rng = RandomSource::new(DEFAULT_SEED);
    let mut hits = 0;
    for _ in 0..TRIALS {
        let result = process_intervention(state, req, &mut rng);
        if result.outcome == InterventionOutcome::Converted {
            hits += 1;
            assert_eq!(result.new_state.rhythm, Some(Rhythm::SinusRhythm));
            let hr = result.new_state.vitals.map(|v| v.heart_rate).unwrap_or(0);
            assert!(
                (band.0..band.1).contains(&hr),
                "{:?} landed at {} bpm",
                req.intervention,
                hr
            );
        }
    }
    hits as f64 / TRIALS as f64
}

fn access_placed(_: &ResultDetail, outcome: InterventionOutcome) -> bool {
    outcome == InterventionOutcome::PartialResponse
}

fn converted(_: &ResultDetail, outcome: InterventionOutcome) -> bool {
    outcome == InterventionOutcome::Converted
}

fn will_convert(detail: &ResultDetail, _: InterventionOutcome) -> bool {
    matches!(detail, ResultDetail::PendingConversion { will_convert: true, .. })
}

#[test]
fn vagal_maneuver_rate() {
    let r = rate(&svt(), &InterventionRequest::new(InterventionType::VagalManeuver, 0), converted);
    assert!((0.15..=0.35).contains(&r), "vagal rate {}", r);
}

#[test]
fn first_adenosine_rate() {
    let req = InterventionRequest::new(InterventionType::Adenosine, 0).with_dose(1.85);
    let r = rate(&svt(), &req, will_convert);
    assert!((0.45..=0.75).contains(&r), "first adenosine rate {}", r);
}

#[test]
fn second_adenosine_rate() {
    let mut state = svt();
    state.history.adenosine_doses = 1;
    let req = InterventionRequest::new(InterventionType::Adenosine, 0).with_dose(3.7);
    let r = rate(&state, &req, will_convert);
    assert!((0.65..=0.95).contains(&r), "second adenosine rate {}", r);
}

#[test]
fn underdosed_adenosine_rarely_works() {
    let req = InterventionRequest::new(InterventionType::Adenosine, 0).with_dose(0.3);
    let r = rate(&svt(), &req, will_convert);
    assert!(r < 0.15, "underdosed adenosine rate {}", r);
}

#[test]
fn cardioversion_rate() {
    let mut state = svt();
    state.sedated = true;
    let req = InterventionRequest::new(InterventionType::SynchronizedCardioversion, 0).with_dose(9.0);
    let r = rate(&state, &req, converted);
    assert!((0.80..=0.99).contains(&r), "cardioversion rate {}", r);
}

#[test]
fn defibrillation_rate_in_shockable_arrest() {
    let req = InterventionRequest::new(InterventionType::Defibrillation, 0);
    for rhythm in [Rhythm::VentricularFibrillation, Rhythm::PulselessVentricularTachycardia] {
        let r = conversion_rate(&in_rhythm(rhythm), &req, (80, 105));
        assert!((0.65..=0.75).contains(&r), "defibrillation rate in {:?}: {}", rhythm, r);
    }
}

#[test]
fn epinephrine_return_of_circulation_rate() {
    let req = InterventionRequest::new(InterventionType::Epinephrine, 0);
    for rhythm in [Rhythm::Asystole, Rhythm::Pea] {
        let r = conversion_rate(&in_rhythm(rhythm), &req, (90, 120));
        assert!((0.26..=0.34).contains(&r), "epinephrine rate in {:?}: {}", rhythm, r);
    }
}

#[test]
fn antiarrhythmic_conversion_rate() {
    for kind in [InterventionType::Amiodarone, InterventionType::Procainamide] {
        let r = conversion_rate(&svt(), &InterventionRequest::new(kind, 0), (85, 105));
        assert!((0.45..=0.55).contains(&r), "{:?} rate {}", kind, r);
    }
}

#[test]
fn vascular_access_placement_rates() {
    let state = ScenarioDefinition::pediatric_svt().initial_state();
    let iv = rate(&state, &InterventionRequest::new(InterventionType::EstablishIv, 0), access_placed);
    assert!((0.82..=0.88).contains(&iv), "IV placement rate {}", iv);
    let io = rate(&state, &InterventionRequest::new(InterventionType::EstablishIo, 0), access_placed);
    assert!((0.93..=0.97).contains(&io), "IO placement rate {}", io);
}
