//! Intervention engine: turns a request into an outcome, a state delta and
//! an event log.
//!
//! Every handler runs the same gauntlet:
//!
//! 1. hard prerequisites (vascular access, sedation): failing returns
//!    [`InterventionOutcome::PrerequisiteMissing`] with `executed = false`;
//! 2. contraindications (route, drug interactions):
//!    [`InterventionOutcome::Contraindicated`], `executed = false`;
//! 3. rhythm applicability: an inapplicable rhythm is
//!    [`InterventionOutcome::NoEffect`] with `executed = true`;
//! 4. one draw from the session's [`RandomSource`] against
//!    `base_rate × dose-accuracy multiplier`.
//!
//! Adenosine always produces a 3–7 s drug-induced asystole. The eventual
//! outcome is drawn up front and carried in
//! [`ResultDetail::PendingConversion`]; the caller reveals it with
//! [`resolve_transient_state`] once the pause has elapsed (or early, to
//! cancel it).
//!
//! ```
//! use codeblue_logic::intervention::{process_intervention, InterventionRequest, InterventionType, InterventionOutcome};
//! use codeblue_logic::patient::Rhythm;
//! use codeblue_logic::random::RandomSource;
//! use codeblue_logic::scenario::ScenarioDefinition;
//!
//! let mut state = ScenarioDefinition::pediatric_svt().initial_state();
//! state.iv_access = true;
//! let mut rng = RandomSource::new(42);
//!
//! let req = InterventionRequest::new(InterventionType::Adenosine, 10_000).with_dose(1.85);
//! let result = process_intervention(&state, &req, &mut rng);
//! assert_eq!(result.outcome, InterventionOutcome::TransientResponse);
//! assert_eq!(result.new_state.rhythm, Some(Rhythm::Asystole));
//! ```

use serde::{Deserialize, Serialize};

use crate::deterioration::{self, DeteriorationStage};
use crate::dosing::{evaluate_dose_accuracy, reference_dose, DoseAccuracy, Route};
use crate::events::{ClinicalEvent, EventKind};
use crate::patient::{
    InterventionHistory, MentalStatus, PatientState, Rhythm, SkinColor, Stability, StateDelta,
    TransientChange, TransientEffect, TransientState,
};
use crate::random::RandomSource;
use crate::safety::{
    adenosine_success_multiplier, cardioversion_success_multiplier, drug_success_multiplier,
};

/// Base conversion rates at protocol-correct dosing.
pub mod rates {
    pub const VAGAL: f64 = 0.25;
    pub const ADENOSINE_FIRST: f64 = 0.60;
    pub const ADENOSINE_REPEAT: f64 = 0.80;
    pub const SYNC_CARDIOVERSION: f64 = 0.92;
    pub const DEFIBRILLATION: f64 = 0.70;
    pub const ANTIARRHYTHMIC: f64 = 0.50;
    pub const EPINEPHRINE_ROSC: f64 = 0.30;
    pub const IV_PLACEMENT: f64 = 0.85;
    pub const IO_PLACEMENT: f64 = 0.95;
}

/// Adenosine pause: `MIN + [0, SPAN)` milliseconds.
const ADENOSINE_PAUSE_MIN_MS: i32 = 3_000;
const ADENOSINE_PAUSE_SPAN_MS: u32 = 4_000;

/// Heart-rate landing band after a drug or vagal conversion: `base + [0, span)`.
const DRUG_CONVERSION_HR: (i32, u32) = (85, 20);
/// Landing band after an electrical conversion.
const SHOCK_CONVERSION_HR: (i32, u32) = (80, 25);
/// Landing band after return of circulation.
const ROSC_HR: (i32, u32) = (90, 30);

const MAX_HEART_RATE: u16 = 280;

/// Every action the operator can order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterventionType {
    VagalManeuver,
    Adenosine,
    SynchronizedCardioversion,
    Defibrillation,
    Amiodarone,
    Procainamide,
    Epinephrine,
    EstablishIv,
    EstablishIo,
    Sedation,
    Oxygen,
    FluidBolus,
    PositionOptimization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterventionOutcome {
    Converted,
    TransientResponse,
    NoEffect,
    PartialResponse,
    AdverseEffect,
    PrerequisiteMissing,
    Contraindicated,
}

/// An order that already passed the safety gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRequest {
    pub intervention: InterventionType,
    /// Dose (drug units) or energy (J). `None` means the protocol amount.
    pub dose: Option<f64>,
    pub route: Option<Route>,
    pub timestamp_ms: u64,
    /// What the operator said. Audit only.
    pub spoken: Option<String>,
}

impl InterventionRequest {
    pub fn new(intervention: InterventionType, timestamp_ms: u64) -> Self {
        Self {
            intervention,
            dose: None,
            route: None,
            timestamp_ms,
            spoken: None,
        }
    }

    pub fn with_dose(mut self, dose: f64) -> Self {
        self.dose = Some(dose);
        self
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }

    pub fn with_spoken(mut self, spoken: impl Into<String>) -> Self {
        self.spoken = Some(spoken.into());
        self
    }
}

/// Typed payload riding along with a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultDetail {
    None,
    /// A dosed intervention whose outcome is already final.
    Dosed {
        accuracy: DoseAccuracy,
        success_probability: f64,
    },
    /// The visible effect is transient; the true outcome is revealed later.
    PendingConversion {
        will_convert: bool,
        resolve_at_ms: u64,
        accuracy: DoseAccuracy,
        success_probability: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionResult {
    /// The intervention did what it was meant to.
    pub success: bool,
    /// `false` when the order was stopped before anything was done.
    pub executed: bool,
    pub reason: Option<String>,
    pub outcome: InterventionOutcome,
    /// Only the fields that change.
    pub new_state: StateDelta,
    pub events: Vec<ClinicalEvent>,
    pub detail: ResultDetail,
}

impl InterventionResult {
    fn not_executed(req: &InterventionRequest, outcome: InterventionOutcome, reason: String) -> Self {
        log::warn!("{:?} not executed: {}", req.intervention, reason);
        Self {
            success: false,
            executed: false,
            events: vec![ClinicalEvent::new(
                req.timestamp_ms,
                EventKind::InterventionNotExecuted {
                    intervention: req.intervention,
                    outcome,
                    reason: reason.clone(),
                },
            )],
            reason: Some(reason),
            outcome,
            new_state: StateDelta::default(),
            detail: ResultDetail::None,
        }
    }

    fn prerequisite_missing(req: &InterventionRequest, reason: &str) -> Self {
        Self::not_executed(req, InterventionOutcome::PrerequisiteMissing, reason.to_string())
    }

    fn contraindicated(req: &InterventionRequest, reason: String) -> Self {
        Self::not_executed(req, InterventionOutcome::Contraindicated, reason)
    }

    /// An executed intervention. The execution event is placed first.
    fn executed(
        req: &InterventionRequest,
        dose: Option<f64>,
        outcome: InterventionOutcome,
        success: bool,
        new_state: StateDelta,
        mut events: Vec<ClinicalEvent>,
    ) -> Self {
        events.insert(
            0,
            ClinicalEvent::new(
                req.timestamp_ms,
                EventKind::InterventionExecuted {
                    intervention: req.intervention,
                    dose,
                    outcome,
                    spoken: req.spoken.clone(),
                },
            ),
        );
        Self {
            success,
            executed: true,
            reason: None,
            outcome,
            new_state,
            events,
            detail: ResultDetail::None,
        }
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    fn with_detail(mut self, detail: ResultDetail) -> Self {
        self.detail = detail;
        self
    }
}

/// Process one validated request against the current state.
pub fn process_intervention(
    state: &PatientState,
    req: &InterventionRequest,
    rng: &mut RandomSource,
) -> InterventionResult {
    log::debug!(
        "processing {:?} at {} ms (rhythm {:?}, dose {:?})",
        req.intervention,
        req.timestamp_ms,
        state.rhythm,
        req.dose
    );

    use InterventionType::*;
    match req.intervention {
        VagalManeuver => vagal_maneuver(state, req, rng),
        Adenosine => adenosine(state, req, rng),
        SynchronizedCardioversion => synchronized_cardioversion(state, req, rng),
        Defibrillation => defibrillation(state, req, rng),
        Amiodarone | Procainamide => antiarrhythmic(state, req, rng),
        Epinephrine => epinephrine(state, req, rng),
        EstablishIv | EstablishIo => establish_access(state, req, rng),
        Sedation => sedation(state, req),
        Oxygen | FluidBolus | PositionOptimization => supportive(state, req),
    }
}

// ── Shared checks ───────────────────────────────────────────────────────

/// Vascular access matching the requested route (any access if no route).
fn access_missing(state: &PatientState, req: &InterventionRequest) -> Option<&'static str> {
    match req.route {
        Some(Route::Iv) if !state.iv_access => Some("No IV access. Establish an IV first."),
        Some(Route::Io) if !state.io_access => Some("No IO access. Place an IO first."),
        Some(_) => None,
        None if !state.has_vascular_access() => {
            Some("No vascular access. Establish IV or IO access first.")
        }
        None => None,
    }
}

/// Drugs can only go by routes their protocol lists.
fn route_contraindication(req: &InterventionRequest) -> Option<String> {
    let route = req.route?;
    let reference = reference_dose(req.intervention, 1.0, 1)?;
    if reference.routes.is_empty() || reference.routes.contains(&route) {
        None
    } else {
        Some(format!("{} cannot be given by the {:?} route.", reference.name, route))
    }
}

/// Requested dose (or the protocol dose) with its accuracy.
fn dose_with_accuracy(
    state: &PatientState,
    req: &InterventionRequest,
    sequence: u32,
) -> (f64, DoseAccuracy) {
    let weight = state.profile.weight_kg;
    let dose = req.dose.unwrap_or_else(|| {
        reference_dose(req.intervention, weight, sequence)
            .map(|d| d.calculated_dose)
            .unwrap_or(0.0)
    });
    (
        dose,
        evaluate_dose_accuracy(req.intervention, dose, weight, sequence),
    )
}

fn clamp_hr(hr: i32) -> u16 {
    hr.clamp(0, MAX_HEART_RATE as i32) as u16
}

fn rhythm_change(timestamp_ms: u64, from: Rhythm, to: Rhythm) -> ClinicalEvent {
    ClinicalEvent::new(timestamp_ms, EventKind::RhythmChange { from, to })
}

/// Delta for a conversion to sinus rhythm at `heart_rate`.
fn converted_delta(heart_rate: u16) -> StateDelta {
    StateDelta {
        rhythm: Some(Rhythm::SinusRhythm),
        vitals: Some(deterioration::post_conversion_vitals(heart_rate)),
        stability: Some(Stability::Recovering),
        rhythm_elapsed_ms: Some(0),
        deterioration_stage: Some(DeteriorationStage::Compensated),
        recovery_target_hr: Some(heart_rate),
        ..Default::default()
    }
}

fn convert(
    state: &PatientState,
    req: &InterventionRequest,
    dose: Option<f64>,
    band: (i32, u32),
    mut delta: StateDelta,
    rng: &mut RandomSource,
) -> InterventionResult {
    let hr = clamp_hr(rng.uniform_int(band.0, band.1));
    let converted = converted_delta(hr);
    delta.rhythm = converted.rhythm;
    delta.vitals = converted.vitals;
    delta.stability = converted.stability;
    delta.rhythm_elapsed_ms = converted.rhythm_elapsed_ms;
    delta.deterioration_stage = converted.deterioration_stage;
    delta.recovery_target_hr = converted.recovery_target_hr;

    log::info!(
        "{:?} converted {:?} to sinus at {} bpm",
        req.intervention,
        state.rhythm,
        hr
    );
    InterventionResult::executed(
        req,
        dose,
        InterventionOutcome::Converted,
        true,
        delta,
        vec![rhythm_change(req.timestamp_ms, state.rhythm, Rhythm::SinusRhythm)],
    )
}

fn no_effect(
    req: &InterventionRequest,
    dose: Option<f64>,
    delta: StateDelta,
    reason: impl Into<String>,
) -> InterventionResult {
    InterventionResult::executed(
        req,
        dose,
        InterventionOutcome::NoEffect,
        false,
        delta,
        Vec::new(),
    )
    .with_reason(reason)
}

fn history_delta(
    state: &PatientState,
    update: impl FnOnce(&mut InterventionHistory),
) -> StateDelta {
    let mut history = state.history;
    update(&mut history);
    StateDelta {
        history: Some(history),
        ..Default::default()
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

fn vagal_maneuver(
    state: &PatientState,
    req: &InterventionRequest,
    rng: &mut RandomSource,
) -> InterventionResult {
    if state.rhythm != Rhythm::Svt {
        return no_effect(
            req,
            None,
            StateDelta::default(),
            format!("Vagal maneuvers do not terminate {:?}.", state.rhythm),
        );
    }

    if rng.chance(rates::VAGAL) {
        convert(state, req, None, DRUG_CONVERSION_HR, StateDelta::default(), rng)
    } else {
        no_effect(req, None, StateDelta::default(), "SVT persists after vagal maneuver.")
    }
}

fn adenosine(
    state: &PatientState,
    req: &InterventionRequest,
    rng: &mut RandomSource,
) -> InterventionResult {
    if let Some(reason) = access_missing(state, req) {
        return InterventionResult::prerequisite_missing(req, reason);
    }
    if let Some(reason) = route_contraindication(req) {
        return InterventionResult::contraindicated(req, reason);
    }

    let sequence = u32::from(state.history.adenosine_doses) + 1;
    let (dose, accuracy) = dose_with_accuracy(state, req, sequence);
    let mut delta = history_delta(state, |h| {
        h.adenosine_doses = h.adenosine_doses.saturating_add(1)
    });

    if state.rhythm != Rhythm::Svt {
        return no_effect(
            req,
            Some(dose),
            delta,
            format!("Adenosine has no effect on {:?}.", state.rhythm),
        )
        .with_detail(ResultDetail::Dosed {
            accuracy,
            success_probability: 0.0,
        });
    }

    let base = if sequence >= 2 {
        rates::ADENOSINE_REPEAT
    } else {
        rates::ADENOSINE_FIRST
    };
    let probability = base * adenosine_success_multiplier(accuracy.accuracy);
    let will_convert = rng.chance(probability);
    let duration_ms = rng.uniform_int(ADENOSINE_PAUSE_MIN_MS, ADENOSINE_PAUSE_SPAN_MS) as u64;

    let transient = TransientState {
        effect: TransientEffect::DrugInducedAsystole,
        started_at_ms: req.timestamp_ms,
        duration_ms,
        restore_rhythm: state.rhythm,
        restore_heart_rate: state.vitals.heart_rate,
        restore_elapsed_ms: state.rhythm_elapsed_ms,
    };
    let mut vitals = state.vitals;
    vitals.heart_rate = 0;
    delta.rhythm = Some(Rhythm::Asystole);
    delta.vitals = Some(vitals);
    delta.rhythm_elapsed_ms = Some(0);
    delta.transient = Some(TransientChange::Start(transient));

    log::info!(
        "adenosine {} mg (accuracy {:.2}): transient asystole for {} ms, p={:.2}",
        dose,
        accuracy.accuracy,
        duration_ms,
        probability
    );

    InterventionResult::executed(
        req,
        Some(dose),
        InterventionOutcome::TransientResponse,
        true,
        delta,
        vec![
            ClinicalEvent::new(
                req.timestamp_ms,
                EventKind::TransientStart {
                    effect: TransientEffect::DrugInducedAsystole,
                    duration_ms,
                },
            ),
            rhythm_change(req.timestamp_ms, state.rhythm, Rhythm::Asystole),
        ],
    )
    .with_detail(ResultDetail::PendingConversion {
        will_convert,
        resolve_at_ms: transient.ends_at_ms(),
        accuracy,
        success_probability: probability,
    })
}

fn synchronized_cardioversion(
    state: &PatientState,
    req: &InterventionRequest,
    rng: &mut RandomSource,
) -> InterventionResult {
    if !state.sedated {
        return InterventionResult::prerequisite_missing(
            req,
            "Patient is not sedated. Sedate before synchronized cardioversion.",
        );
    }

    let sequence = u32::from(state.history.cardioversion_attempts) + 1;
    let (energy, accuracy) = dose_with_accuracy(state, req, sequence);
    let delta = history_delta(state, |h| {
        h.cardioversion_attempts = h.cardioversion_attempts.saturating_add(1)
    });

    if !state.rhythm.is_synchronizable() {
        return no_effect(
            req,
            Some(energy),
            delta,
            format!("No R waves to synchronize to in {:?}.", state.rhythm),
        );
    }

    let probability = rates::SYNC_CARDIOVERSION * cardioversion_success_multiplier(accuracy.accuracy);
    let detail = ResultDetail::Dosed {
        accuracy,
        success_probability: probability,
    };
    if rng.chance(probability) {
        convert(state, req, Some(energy), SHOCK_CONVERSION_HR, delta, rng).with_detail(detail)
    } else {
        no_effect(
            req,
            Some(energy),
            delta,
            format!("{:?} persists after {} J.", state.rhythm, energy),
        )
        .with_detail(detail)
    }
}

fn defibrillation(
    state: &PatientState,
    req: &InterventionRequest,
    rng: &mut RandomSource,
) -> InterventionResult {
    let sequence = u32::from(state.history.defibrillation_attempts) + 1;
    let (energy, accuracy) = dose_with_accuracy(state, req, sequence);
    let mut delta = history_delta(state, |h| {
        h.defibrillation_attempts = h.defibrillation_attempts.saturating_add(1)
    });

    if state.rhythm.is_defibrillatable() {
        let probability = rates::DEFIBRILLATION * cardioversion_success_multiplier(accuracy.accuracy);
        let detail = ResultDetail::Dosed {
            accuracy,
            success_probability: probability,
        };
        return if rng.chance(probability) {
            convert(state, req, Some(energy), SHOCK_CONVERSION_HR, delta, rng).with_detail(detail)
        } else {
            no_effect(
                req,
                Some(energy),
                delta,
                format!("{:?} persists after {} J.", state.rhythm, energy),
            )
            .with_detail(detail)
        };
    }

    if state.rhythm.is_synchronizable() {
        // Unsynchronized shock into a perfusing rhythm.
        delta.mental_status = Some(state.mental_status.lowered());
        return InterventionResult::executed(
            req,
            Some(energy),
            InterventionOutcome::AdverseEffect,
            false,
            delta,
            Vec::new(),
        )
        .with_reason("Unsynchronized shock delivered to a patient with a pulse.");
    }

    no_effect(
        req,
        Some(energy),
        delta,
        format!("{:?} is not a shockable rhythm.", state.rhythm),
    )
}

fn antiarrhythmic(
    state: &PatientState,
    req: &InterventionRequest,
    rng: &mut RandomSource,
) -> InterventionResult {
    if let Some(reason) = access_missing(state, req) {
        return InterventionResult::prerequisite_missing(req, reason);
    }
    if let Some(reason) = route_contraindication(req) {
        return InterventionResult::contraindicated(req, reason);
    }

    let is_amiodarone = req.intervention == InterventionType::Amiodarone;
    let conflicting = if is_amiodarone {
        state.history.procainamide_given
    } else {
        state.history.amiodarone_given
    };
    if conflicting {
        return InterventionResult::contraindicated(
            req,
            "Amiodarone and procainamide must not be combined (QT prolongation).".to_string(),
        );
    }

    let (dose, accuracy) = dose_with_accuracy(state, req, 1);
    let delta = history_delta(state, |h| {
        if is_amiodarone {
            h.amiodarone_given = true;
        } else {
            h.procainamide_given = true;
        }
    });

    if !state.rhythm.is_synchronizable() {
        return no_effect(
            req,
            Some(dose),
            delta,
            format!("{:?} does not respond to antiarrhythmic infusion.", state.rhythm),
        );
    }

    let probability = rates::ANTIARRHYTHMIC * drug_success_multiplier(accuracy.accuracy);
    let detail = ResultDetail::Dosed {
        accuracy,
        success_probability: probability,
    };
    if rng.chance(probability) {
        convert(state, req, Some(dose), DRUG_CONVERSION_HR, delta, rng).with_detail(detail)
    } else {
        no_effect(req, Some(dose), delta, format!("{:?} persists.", state.rhythm)).with_detail(detail)
    }
}

fn epinephrine(
    state: &PatientState,
    req: &InterventionRequest,
    rng: &mut RandomSource,
) -> InterventionResult {
    if let Some(reason) = access_missing(state, req) {
        return InterventionResult::prerequisite_missing(req, reason);
    }
    if let Some(reason) = route_contraindication(req) {
        return InterventionResult::contraindicated(req, reason);
    }

    let (dose, accuracy) = dose_with_accuracy(state, req, 1);

    if state.transient_active() {
        return no_effect(
            req,
            Some(dose),
            StateDelta::default(),
            "The pause is adenosine-induced. Wait for it to resolve.",
        );
    }

    match state.rhythm {
        Rhythm::Asystole | Rhythm::Pea => {
            let probability = rates::EPINEPHRINE_ROSC * drug_success_multiplier(accuracy.accuracy);
            let detail = ResultDetail::Dosed {
                accuracy,
                success_probability: probability,
            };
            if rng.chance(probability) {
                convert(state, req, Some(dose), ROSC_HR, StateDelta::default(), rng)
                    .with_detail(detail)
            } else {
                no_effect(req, Some(dose), StateDelta::default(), "No return of circulation.")
                    .with_detail(detail)
            }
        }
        rhythm if rhythm.is_pulseless() => no_effect(
            req,
            Some(dose),
            StateDelta::default(),
            format!("{:?} needs defibrillation.", rhythm),
        ),
        _ => {
            let mut vitals = state.vitals;
            vitals.heart_rate = clamp_hr(i32::from(vitals.heart_rate) + rng.uniform_int(15, 11));
            InterventionResult::executed(
                req,
                Some(dose),
                InterventionOutcome::AdverseEffect,
                false,
                StateDelta {
                    vitals: Some(vitals),
                    ..Default::default()
                },
                Vec::new(),
            )
            .with_reason("Epinephrine in a perfusing patient drives the rate higher.")
        }
    }
}

fn establish_access(
    state: &PatientState,
    req: &InterventionRequest,
    rng: &mut RandomSource,
) -> InterventionResult {
    let is_iv = req.intervention == InterventionType::EstablishIv;
    let (present, probability, label) = if is_iv {
        (state.iv_access, rates::IV_PLACEMENT, "IV")
    } else {
        (state.io_access, rates::IO_PLACEMENT, "IO")
    };

    if present {
        return InterventionResult::not_executed(
            req,
            InterventionOutcome::NoEffect,
            format!("{} access is already in place.", label),
        );
    }

    if !rng.chance(probability) {
        return no_effect(req, None, StateDelta::default(), format!("{} attempt missed.", label));
    }

    let delta = StateDelta {
        iv_access: is_iv.then_some(true),
        io_access: (!is_iv).then_some(true),
        ..Default::default()
    };
    InterventionResult::executed(
        req,
        None,
        InterventionOutcome::PartialResponse,
        true,
        delta,
        vec![ClinicalEvent::new(
            req.timestamp_ms,
            EventKind::AccessEstablished {
                intervention: req.intervention,
            },
        )],
    )
}

fn sedation(state: &PatientState, req: &InterventionRequest) -> InterventionResult {
    if req.route != Some(Route::Intranasal) {
        if let Some(reason) = access_missing(state, req) {
            return InterventionResult::prerequisite_missing(req, reason);
        }
    }
    if let Some(reason) = route_contraindication(req) {
        return InterventionResult::contraindicated(req, reason);
    }
    if state.sedated {
        return InterventionResult::not_executed(
            req,
            InterventionOutcome::NoEffect,
            "Patient is already sedated.".to_string(),
        );
    }

    let (dose, _) = dose_with_accuracy(state, req, 1);
    let delta = StateDelta {
        sedated: Some(true),
        mental_status: Some(MentalStatus::Pain.max(state.mental_status)),
        ..Default::default()
    };
    InterventionResult::executed(
        req,
        Some(dose),
        InterventionOutcome::PartialResponse,
        true,
        delta,
        Vec::new(),
    )
}

fn supportive(state: &PatientState, req: &InterventionRequest) -> InterventionResult {
    let mut flags = state.flags;
    let already = match req.intervention {
        InterventionType::Oxygen => std::mem::replace(&mut flags.oxygen, true),
        InterventionType::PositionOptimization => {
            std::mem::replace(&mut flags.position_optimized, true)
        }
        _ => {
            if let Some(reason) = access_missing(state, req) {
                return InterventionResult::prerequisite_missing(req, reason);
            }
            flags.iv_fluids = true;
            // boluses can be repeated
            false
        }
    };

    if already {
        return InterventionResult::not_executed(
            req,
            InterventionOutcome::NoEffect,
            format!("{:?} is already in place.", req.intervention),
        );
    }

    let dose = (req.intervention == InterventionType::FluidBolus)
        .then(|| dose_with_accuracy(state, req, 1).0);
    let mut delta = StateDelta {
        flags: Some(flags),
        ..Default::default()
    };
    if req.intervention == InterventionType::Oxygen && state.skin_color == SkinColor::Cyanotic {
        delta.skin_color = Some(SkinColor::Pale);
    }
    InterventionResult::executed(
        req,
        dose,
        InterventionOutcome::PartialResponse,
        true,
        delta,
        Vec::new(),
    )
}

// ── Transient resolution ────────────────────────────────────────────────

/// Outcome of closing a transient excursion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientResolution {
    /// `Converted` on success, `NoEffect` on reversion or when nothing was pending.
    pub outcome: InterventionOutcome,
    pub delta: StateDelta,
    pub events: Vec<ClinicalEvent>,
}

/// Whether the active transient has run its full duration by `now_ms`.
pub fn transient_due(state: &PatientState, now_ms: u64) -> bool {
    state
        .transient
        .map(|t| now_ms >= t.ends_at_ms())
        .unwrap_or(false)
}

/// Reveal the outcome decided when the transient began.
///
/// May be called before the transient's duration has elapsed to force
/// resolution. With no transient active this returns an empty delta.
pub fn resolve_transient_state(
    state: &PatientState,
    will_convert: bool,
    now_ms: u64,
    rng: &mut RandomSource,
) -> TransientResolution {
    let Some(transient) = state.transient else {
        return TransientResolution {
            outcome: InterventionOutcome::NoEffect,
            delta: StateDelta::default(),
            events: Vec::new(),
        };
    };

    let end = ClinicalEvent::new(
        now_ms,
        EventKind::TransientEnd {
            effect: transient.effect,
            converted: will_convert,
        },
    );

    if will_convert {
        let hr = clamp_hr(rng.uniform_int(DRUG_CONVERSION_HR.0, DRUG_CONVERSION_HR.1));
        let mut delta = converted_delta(hr);
        delta.transient = Some(TransientChange::Clear);

        log::info!("transient resolved: converted to sinus at {} bpm", hr);
        return TransientResolution {
            outcome: InterventionOutcome::Converted,
            delta,
            events: vec![
                end,
                rhythm_change(now_ms, state.rhythm, Rhythm::SinusRhythm),
            ],
        };
    }

    let drop = rng.uniform_int(0, 11);
    let hr = clamp_hr(i32::from(transient.restore_heart_rate) - drop);
    let elapsed = transient.restore_elapsed_ms + now_ms.saturating_sub(transient.started_at_ms);
    let mut vitals = deterioration::snapshot_vitals(elapsed);
    vitals.heart_rate = hr;

    log::info!(
        "transient resolved: reverted to {:?} at {} bpm",
        transient.restore_rhythm,
        hr
    );
    TransientResolution {
        outcome: InterventionOutcome::NoEffect,
        delta: StateDelta {
            rhythm: Some(transient.restore_rhythm),
            vitals: Some(vitals),
            rhythm_elapsed_ms: Some(elapsed),
            transient: Some(TransientChange::Clear),
            ..Default::default()
        },
        events: vec![
            end,
            rhythm_change(now_ms, state.rhythm, transient.restore_rhythm),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::apply_result;
    use crate::scenario::ScenarioDefinition;

    fn svt() -> PatientState {
        ScenarioDefinition::pediatric_svt().initial_state()
    }

    fn svt_with_iv() -> PatientState {
        let mut s = svt();
        s.iv_access = true;
        s
    }

    fn req(kind: InterventionType) -> InterventionRequest {
        InterventionRequest::new(kind, 5_000)
    }

    #[test]
    fn adenosine_without_access_is_not_attempted() {
        let mut rng = RandomSource::new(1);
        let r = process_intervention(&svt(), &req(InterventionType::Adenosine), &mut rng);
        assert_eq!(r.outcome, InterventionOutcome::PrerequisiteMissing);
        assert!(!r.executed);
        assert!(r.new_state.is_empty());
        assert_eq!(r.events.len(), 1);
    }

    #[test]
    fn adenosine_always_transient() {
        for seed in 0..200 {
            let mut rng = RandomSource::new(seed);
            let r = process_intervention(
                &svt_with_iv(),
                &req(InterventionType::Adenosine).with_dose(1.85),
                &mut rng,
            );
            assert_eq!(r.outcome, InterventionOutcome::TransientResponse);
            assert_eq!(r.new_state.rhythm, Some(Rhythm::Asystole));
            let Some(TransientChange::Start(t)) = r.new_state.transient else {
                panic!("no transient started");
            };
            assert!((3_000..7_000).contains(&t.duration_ms));
            assert_eq!(t.restore_rhythm, Rhythm::Svt);
            match r.detail {
                ResultDetail::PendingConversion { resolve_at_ms, .. } => {
                    assert_eq!(resolve_at_ms, 5_000 + t.duration_ms)
                }
                other => panic!("unexpected detail {:?}", other),
            }
        }
    }

    #[test]
    fn adenosine_counts_doses() {
        let mut rng = RandomSource::new(2);
        let r = process_intervention(&svt_with_iv(), &req(InterventionType::Adenosine), &mut rng);
        assert_eq!(r.new_state.history.map(|h| h.adenosine_doses), Some(1));
        match r.detail {
            ResultDetail::PendingConversion { accuracy, .. } => assert_eq!(accuracy.accuracy, 1.0),
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn adenosine_im_contraindicated() {
        let mut rng = RandomSource::new(3);
        let r = process_intervention(
            &svt_with_iv(),
            &req(InterventionType::Adenosine).with_route(Route::Im),
            &mut rng,
        );
        assert_eq!(r.outcome, InterventionOutcome::Contraindicated);
        assert!(!r.executed);
    }

    #[test]
    fn adenosine_in_sinus_has_no_effect() {
        let mut state = svt_with_iv();
        state.rhythm = Rhythm::SinusRhythm;
        let mut rng = RandomSource::new(4);
        let r = process_intervention(&state, &req(InterventionType::Adenosine), &mut rng);
        assert_eq!(r.outcome, InterventionOutcome::NoEffect);
        assert!(r.executed);
        assert!(!r.success);
    }

    #[test]
    fn resolve_converts_to_sinus_band() {
        let state = svt_with_iv();
        for seed in 0..100 {
            let mut rng = RandomSource::new(seed);
            let r = process_intervention(&state, &req(InterventionType::Adenosine), &mut rng);
            let paused = apply_result(&state, &r.new_state);
            assert_eq!(paused.rhythm, Rhythm::Asystole);
            assert_eq!(paused.vitals.heart_rate, 0);

            let res = resolve_transient_state(&paused, true, 9_000, &mut rng);
            assert_eq!(res.outcome, InterventionOutcome::Converted);
            let after = apply_result(&paused, &res.delta);
            assert_eq!(after.rhythm, Rhythm::SinusRhythm);
            assert!((85..105).contains(&after.vitals.heart_rate));
            assert!(after.transient.is_none());
            assert_eq!(after.stability, Stability::Recovering);
        }
    }

    #[test]
    fn resolve_reverts_to_prior_rhythm_band() {
        let state = svt_with_iv();
        let prior_hr = state.vitals.heart_rate;
        for seed in 0..100 {
            let mut rng = RandomSource::new(seed);
            let r = process_intervention(&state, &req(InterventionType::Adenosine), &mut rng);
            let paused = apply_result(&state, &r.new_state);
            let res = resolve_transient_state(&paused, false, 9_000, &mut rng);
            let after = apply_result(&paused, &res.delta);
            assert_eq!(after.rhythm, Rhythm::Svt);
            assert!(after.vitals.heart_rate <= prior_hr);
            assert!(after.vitals.heart_rate >= prior_hr - 10);
            assert!(after.vitals.systolic > 0);
            assert!(after.transient.is_none());
        }
    }

    #[test]
    fn resolve_without_transient_is_noop() {
        let mut rng = RandomSource::new(5);
        let res = resolve_transient_state(&svt(), true, 0, &mut rng);
        assert!(res.delta.is_empty());
        assert!(res.events.is_empty());
    }

    #[test]
    fn transient_due_after_duration() {
        let state = svt_with_iv();
        let mut rng = RandomSource::new(6);
        let r = process_intervention(&state, &req(InterventionType::Adenosine), &mut rng);
        let paused = apply_result(&state, &r.new_state);
        let end = paused.transient.unwrap().ends_at_ms();
        assert!(!transient_due(&paused, end - 1));
        assert!(transient_due(&paused, end));
        assert!(!transient_due(&state, end));
    }

    #[test]
    fn cardioversion_requires_sedation() {
        let mut rng = RandomSource::new(7);
        let r = process_intervention(
            &svt_with_iv(),
            &req(InterventionType::SynchronizedCardioversion).with_dose(9.0),
            &mut rng,
        );
        assert_eq!(r.outcome, InterventionOutcome::PrerequisiteMissing);
        assert!(!r.executed);
    }

    #[test]
    fn cardioversion_converts_in_hr_band() {
        let mut state = svt_with_iv();
        state.sedated = true;
        let mut converted = 0;
        for seed in 0..50 {
            let mut rng = RandomSource::new(seed);
            let r = process_intervention(
                &state,
                &req(InterventionType::SynchronizedCardioversion).with_dose(9.0),
                &mut rng,
            );
            assert!(r.executed);
            assert_eq!(r.new_state.history.map(|h| h.cardioversion_attempts), Some(1));
            if r.outcome == InterventionOutcome::Converted {
                converted += 1;
                let hr = r.new_state.vitals.unwrap().heart_rate;
                assert!((80..105).contains(&hr));
            }
        }
        assert!(converted > 30);
    }

    #[test]
    fn cardioversion_on_asystole_is_inert() {
        let mut state = svt_with_iv();
        state.sedated = true;
        state.rhythm = Rhythm::Asystole;
        let mut rng = RandomSource::new(8);
        let r = process_intervention(&state, &req(InterventionType::SynchronizedCardioversion), &mut rng);
        assert_eq!(r.outcome, InterventionOutcome::NoEffect);
        assert!(r.executed);
    }

    #[test]
    fn vagal_only_affects_svt() {
        let mut state = svt();
        state.rhythm = Rhythm::AtrialFlutter;
        let mut rng = RandomSource::new(9);
        let r = process_intervention(&state, &req(InterventionType::VagalManeuver), &mut rng);
        assert_eq!(r.outcome, InterventionOutcome::NoEffect);
        assert!(r.executed);
    }

    #[test]
    fn vagal_success_lands_in_band() {
        let state = svt();
        for seed in 0..200 {
            let mut rng = RandomSource::new(seed);
            let r = process_intervention(&state, &req(InterventionType::VagalManeuver), &mut rng);
            if r.success {
                assert_eq!(r.outcome, InterventionOutcome::Converted);
                let hr = r.new_state.vitals.unwrap().heart_rate;
                assert!((85..105).contains(&hr));
                assert!(matches!(
                    r.events[1].kind,
                    EventKind::RhythmChange {
                        from: Rhythm::Svt,
                        to: Rhythm::SinusRhythm
                    }
                ));
            } else {
                assert_eq!(r.outcome, InterventionOutcome::NoEffect);
            }
        }
    }

    #[test]
    fn same_seed_same_result() {
        let state = svt_with_iv();
        let a = process_intervention(&state, &req(InterventionType::Adenosine), &mut RandomSource::new(77));
        let b = process_intervention(&state, &req(InterventionType::Adenosine), &mut RandomSource::new(77));
        assert_eq!(a, b);
    }

    #[test]
    fn amiodarone_after_procainamide_contraindicated() {
        let mut state = svt_with_iv();
        state.history = InterventionHistory {
            procainamide_given: true,
            ..Default::default()
        };
        let mut rng = RandomSource::new(10);
        let r = process_intervention(&state, &req(InterventionType::Amiodarone), &mut rng);
        assert_eq!(r.outcome, InterventionOutcome::Contraindicated);
        assert!(!r.executed);
    }

    #[test]
    fn epinephrine_in_svt_is_adverse() {
        let state = svt_with_iv();
        let mut rng = RandomSource::new(11);
        let r = process_intervention(&state, &req(InterventionType::Epinephrine), &mut rng);
        assert_eq!(r.outcome, InterventionOutcome::AdverseEffect);
        let hr = r.new_state.vitals.unwrap().heart_rate;
        assert!(hr >= state.vitals.heart_rate + 15);
        assert!(hr <= state.vitals.heart_rate + 25);
    }

    #[test]
    fn epinephrine_ignores_adenosine_pause() {
        let state = svt_with_iv();
        let mut rng = RandomSource::new(12);
        let r = process_intervention(&state, &req(InterventionType::Adenosine), &mut rng);
        let paused = apply_result(&state, &r.new_state);
        let e = process_intervention(&paused, &req(InterventionType::Epinephrine), &mut rng);
        assert_eq!(e.outcome, InterventionOutcome::NoEffect);
        assert!(e.new_state.is_empty());
    }

    #[test]
    fn defibrillating_svt_is_adverse() {
        let state = svt();
        let mut rng = RandomSource::new(13);
        let r = process_intervention(&state, &req(InterventionType::Defibrillation), &mut rng);
        assert_eq!(r.outcome, InterventionOutcome::AdverseEffect);
        assert_eq!(r.new_state.mental_status, Some(state.mental_status.lowered()));
    }

    #[test]
    fn access_and_sedation() {
        let state = svt();
        let mut rng = RandomSource::new(14);
        let sed = process_intervention(&state, &req(InterventionType::Sedation), &mut rng);
        assert_eq!(sed.outcome, InterventionOutcome::PrerequisiteMissing);

        let io = process_intervention(&state, &req(InterventionType::EstablishIo), &mut RandomSource::new(0));
        if io.success {
            assert_eq!(io.new_state.io_access, Some(true));
            assert_eq!(io.new_state.iv_access, None);
        }

        let with_iv = svt_with_iv();
        let again = process_intervention(&with_iv, &req(InterventionType::EstablishIv), &mut rng);
        assert!(!again.executed);

        let sed = process_intervention(&with_iv, &req(InterventionType::Sedation), &mut rng);
        assert!(sed.success);
        assert_eq!(sed.new_state.sedated, Some(true));
        assert_eq!(sed.new_state.mental_status, Some(MentalStatus::Pain));
    }

    #[test]
    fn intranasal_sedation_needs_no_access() {
        let mut rng = RandomSource::new(15);
        let r = process_intervention(
            &svt(),
            &req(InterventionType::Sedation).with_route(Route::Intranasal),
            &mut rng,
        );
        assert!(r.success);
    }

    #[test]
    fn supportive_flags_set_once() {
        let state = svt();
        let mut rng = RandomSource::new(16);
        let r = process_intervention(&state, &req(InterventionType::Oxygen), &mut rng);
        assert_eq!(r.outcome, InterventionOutcome::PartialResponse);
        let next = apply_result(&state, &r.new_state);
        assert!(next.flags.oxygen);
        let again = process_intervention(&next, &req(InterventionType::Oxygen), &mut rng);
        assert!(!again.executed);

        let fluids = process_intervention(&state, &req(InterventionType::FluidBolus), &mut rng);
        assert_eq!(fluids.outcome, InterventionOutcome::PrerequisiteMissing);
    }

    #[test]
    fn spoken_text_kept_in_log() {
        let mut rng = RandomSource::new(17);
        let r = process_intervention(
            &svt(),
            &req(InterventionType::VagalManeuver).with_spoken("Blow through the straw for me"),
            &mut rng,
        );
        match &r.events[0].kind {
            EventKind::InterventionExecuted { spoken, .. } => {
                assert_eq!(spoken.as_deref(), Some("Blow through the straw for me"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
