//! Patient data model and the state reducer.
//!
//! [`PatientState`] is created once per session (see [`crate::scenario`])
//! and afterwards only replaced by [`apply_result`], which overlays a
//! [`StateDelta`] produced by the intervention engine or the deterioration
//! model and re-establishes the cross-field invariants.

use serde::{Deserialize, Serialize};

use crate::deterioration::DeteriorationStage;

/// Immutable patient identity, fixed at scenario start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub name: String,
    pub age_years: u8,
    pub weight_kg: f64,
    pub sex: Sex,
    pub chief_complaint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Female,
    Male,
}

/// Cardiac rhythm shown on the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rhythm {
    SinusRhythm,
    SinusTachycardia,
    SinusBradycardia,
    Svt,
    AtrialFlutter,
    AtrialFibrillation,
    /// Ventricular tachycardia with a pulse.
    VentricularTachycardia,
    PulselessVentricularTachycardia,
    VentricularFibrillation,
    Asystole,
    Pea,
}

impl Rhythm {
    pub fn is_sinus(self) -> bool {
        matches!(
            self,
            Self::SinusRhythm | Self::SinusTachycardia | Self::SinusBradycardia
        )
    }

    /// No palpable pulse: arrest rhythms.
    pub fn is_pulseless(self) -> bool {
        matches!(
            self,
            Self::PulselessVentricularTachycardia
                | Self::VentricularFibrillation
                | Self::Asystole
                | Self::Pea
        )
    }

    /// Organized tachyarrhythmia with a pulse; a synchronized shock can track its R waves.
    pub fn is_synchronizable(self) -> bool {
        matches!(
            self,
            Self::Svt
                | Self::AtrialFlutter
                | Self::AtrialFibrillation
                | Self::VentricularTachycardia
        )
    }

    /// Shockable arrest rhythm.
    pub fn is_defibrillatable(self) -> bool {
        matches!(
            self,
            Self::VentricularFibrillation | Self::PulselessVentricularTachycardia
        )
    }

    pub fn is_crisis(self) -> bool {
        !self.is_sinus()
    }
}

/// Vital signs. Integer fields are whole clinical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub heart_rate: u16,
    pub systolic: u16,
    pub diastolic: u16,
    pub respiratory_rate: u16,
    pub spo2: u8,
    pub temperature_c: f32,
    /// Capillary refill time in seconds.
    pub cap_refill_s: f32,
}

/// AVPU mental status scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MentalStatus {
    Alert,
    Verbal,
    Pain,
    Unresponsive,
}

impl MentalStatus {
    /// One step further down the AVPU scale.
    pub fn lowered(self) -> Self {
        match self {
            Self::Alert => Self::Verbal,
            Self::Verbal => Self::Pain,
            Self::Pain | Self::Unresponsive => Self::Unresponsive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Perfusion {
    Normal,
    Delayed,
    Poor,
    Absent,
}

impl Perfusion {
    pub fn from_cap_refill(seconds: f32) -> Self {
        if seconds <= 2.0 {
            Self::Normal
        } else if seconds <= 3.0 {
            Self::Delayed
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stability {
    Stable,
    Compensated,
    Unstable,
    Critical,
    /// Freshly converted; vitals are climbing back toward baseline.
    Recovering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkinColor {
    Pink,
    Pale,
    Mottled,
    Cyanotic,
}

/// Kind of temporary physiological excursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransientEffect {
    /// AV-nodal block after rapid adenosine push.
    DrugInducedAsystole,
}

impl TransientEffect {
    /// Rhythm displayed while the excursion is active.
    pub fn rhythm(self) -> Rhythm {
        match self {
            Self::DrugInducedAsystole => Rhythm::Asystole,
        }
    }
}

/// An active excursion and what to fall back to if it resolves unfavorably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientState {
    pub effect: TransientEffect,
    pub started_at_ms: u64,
    pub duration_ms: u64,
    pub restore_rhythm: Rhythm,
    pub restore_heart_rate: u16,
    /// Time already spent in `restore_rhythm` when the excursion began.
    pub restore_elapsed_ms: u64,
}

impl TransientState {
    pub fn ends_at_ms(&self) -> u64 {
        self.started_at_ms + self.duration_ms
    }
}

/// Counters the engine needs to pick first-dose vs repeat protocols.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterventionHistory {
    pub adenosine_doses: u8,
    pub cardioversion_attempts: u8,
    pub defibrillation_attempts: u8,
    pub amiodarone_given: bool,
    pub procainamide_given: bool,
}

/// Supportive measures that soften deterioration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterventionFlags {
    pub oxygen: bool,
    pub iv_fluids: bool,
    pub position_optimized: bool,
}

/// Full physiological state of the simulated patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientState {
    pub profile: PatientProfile,
    pub rhythm: Rhythm,
    pub vitals: Vitals,
    pub mental_status: MentalStatus,
    pub perfusion: Perfusion,
    pub stability: Stability,
    pub skin_color: SkinColor,
    pub iv_access: bool,
    pub io_access: bool,
    pub sedated: bool,
    pub intubated: bool,
    /// Time spent in the current rhythm.
    pub rhythm_elapsed_ms: u64,
    pub deterioration_stage: DeteriorationStage,
    pub transient: Option<TransientState>,
    pub history: InterventionHistory,
    pub flags: InterventionFlags,
    /// Heart rate the recovery ramp converges on after a conversion.
    pub recovery_target_hr: Option<u16>,
}

impl PatientState {
    pub fn has_vascular_access(&self) -> bool {
        self.iv_access || self.io_access
    }

    pub fn transient_active(&self) -> bool {
        self.transient.is_some()
    }
}

/// Starting or clearing the transient slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransientChange {
    Start(TransientState),
    Clear,
}

/// Partial update: only the `Some` fields change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythm: Option<Rhythm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<Vitals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mental_status: Option<MentalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<Stability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_color: Option<SkinColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sedated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intubated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythm_elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deterioration_stage: Option<DeteriorationStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient: Option<TransientChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<InterventionHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<InterventionFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_target_hr: Option<u16>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Overlay `delta` on `state` and return the resulting state.
///
/// Invariants restored here:
/// - an active transient dictates the displayed rhythm;
/// - pulseless rhythms have no heart rate, no blood pressure and absent perfusion;
/// - otherwise perfusion follows capillary refill.
pub fn apply_result(state: &PatientState, delta: &StateDelta) -> PatientState {
    let mut next = state.clone();

    if let Some(rhythm) = delta.rhythm {
        next.rhythm = rhythm;
    }
    if let Some(vitals) = delta.vitals {
        next.vitals = vitals;
    }
    if let Some(mental_status) = delta.mental_status {
        next.mental_status = mental_status;
    }
    if let Some(stability) = delta.stability {
        next.stability = stability;
    }
    if let Some(skin_color) = delta.skin_color {
        next.skin_color = skin_color;
    }
    if let Some(iv) = delta.iv_access {
        next.iv_access = iv;
    }
    if let Some(io) = delta.io_access {
        next.io_access = io;
    }
    if let Some(sedated) = delta.sedated {
        next.sedated = sedated;
    }
    if let Some(intubated) = delta.intubated {
        next.intubated = intubated;
    }
    if let Some(elapsed) = delta.rhythm_elapsed_ms {
        next.rhythm_elapsed_ms = elapsed;
    }
    if let Some(stage) = delta.deterioration_stage {
        next.deterioration_stage = stage;
    }
    match delta.transient {
        Some(TransientChange::Start(transient)) => next.transient = Some(transient),
        Some(TransientChange::Clear) => next.transient = None,
        None => {}
    }
    if let Some(history) = delta.history {
        next.history = history;
    }
    if let Some(flags) = delta.flags {
        next.flags = flags;
    }
    if let Some(target) = delta.recovery_target_hr {
        next.recovery_target_hr = Some(target);
    }

    if let Some(transient) = next.transient {
        next.rhythm = transient.effect.rhythm();
    }
    if next.rhythm.is_pulseless() {
        next.vitals.heart_rate = 0;
        next.vitals.systolic = 0;
        next.vitals.diastolic = 0;
        next.perfusion = Perfusion::Absent;
    } else {
        next.perfusion = Perfusion::from_cap_refill(next.vitals.cap_refill_s);
    }

    next
}
